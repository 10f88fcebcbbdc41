//! Shared RPC utilities for interacting with Ethereum JSON-RPC endpoints.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// Default timeout for RPC requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default interval between polling attempts when waiting for a result.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum RpcError {
    /// The request never got a response (connection refused, DNS, timeout).
    #[error("failed to send {method} request: {source}")]
    Transport {
        method: String,
        #[source]
        source: reqwest::Error,
    },
    /// The node answered with a JSON-RPC error object.
    #[error("{method} returned error {code}: {message}")]
    Response {
        method: String,
        code: i64,
        message: String,
    },
    #[error("failed to decode {method} response: {reason}")]
    Decode { method: String, reason: String },
    #[error("timeout waiting for {name} after {after:?}")]
    Timeout { name: String, after: Duration },
}

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client() -> Result<reqwest::Client, RpcError> {
    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .map_err(|source| RpcError::Transport {
            method: "client".to_string(),
            source,
        })
}

/// Make a JSON-RPC call and deserialize the result.
///
/// # Arguments
/// * `client` - The HTTP client to use
/// * `url` - The RPC endpoint URL
/// * `method` - The RPC method name
/// * `params` - The method parameters
///
/// # Returns
/// The deserialized result, or an error if the request failed or returned an error response.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Vec<Value>,
) -> Result<T, RpcError> {
    let transport = |source| RpcError::Transport {
        method: method.to_string(),
        source,
    };
    let decode = |reason: String| RpcError::Decode {
        method: method.to_string(),
        reason,
    };

    let response = client
        .post(url)
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .map_err(transport)?;

    let result: Value = response.json().await.map_err(transport)?;

    if let Some(error) = result.get("error") {
        return Err(RpcError::Response {
            method: method.to_string(),
            code: error.get("code").and_then(|c| c.as_i64()).unwrap_or_default(),
            message: error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown")
                .to_string(),
        });
    }

    let result_value = result
        .get("result")
        .ok_or_else(|| decode("no result in response".to_string()))?
        .clone();

    serde_json::from_value(result_value).map_err(|e| decode(e.to_string()))
}

/// Poll `check_fn` until it yields a value.
///
/// # Arguments
/// * `name` - What is being waited for (for error messages)
/// * `timeout` - Maximum time to wait
/// * `check_fn` - Returns `Ok(Some(_))` when done, `Ok(None)` to keep polling
///
/// Errors returned by `check_fn` abort the wait immediately.
pub async fn wait_for<T, F, Fut>(name: &str, timeout: Duration, check_fn: F) -> Result<T, RpcError>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<Option<T>, RpcError>>,
{
    let start = std::time::Instant::now();

    loop {
        if start.elapsed() > timeout {
            return Err(RpcError::Timeout {
                name: name.to_string(),
                after: timeout,
            });
        }

        match check_fn().await? {
            Some(value) => return Ok(value),
            None => {
                tracing::trace!(target_name = %name, "Not ready yet, polling again...");
            }
        }

        tokio::time::sleep(DEFAULT_POLL_INTERVAL).await;
    }
}
