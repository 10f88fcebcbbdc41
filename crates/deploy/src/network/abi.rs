//! ABI encoding helpers shared by the network backends.

use alloy_core::dyn_abi::{DynSolType, DynSolValue, JsonAbiExt, Specifier};
use alloy_core::json_abi::Param;

use super::NetworkError;
use crate::blueprint::ContractBlueprint;
use crate::value::Value;

pub(crate) fn to_sol_values(params: &[Param], args: &[Value]) -> Result<Vec<DynSolValue>, NetworkError> {
    if params.len() != args.len() {
        return Err(NetworkError::Rejected(format!(
            "expected {} argument(s), got {}",
            params.len(),
            args.len()
        )));
    }

    params
        .iter()
        .zip(args)
        .map(|(param, arg)| {
            let ty = param
                .resolve()
                .map_err(|e| NetworkError::Rejected(e.to_string()))?;
            arg.to_sol(&ty).map_err(NetworkError::Rejected)
        })
        .collect()
}

pub(crate) fn from_sol_values(values: Vec<DynSolValue>) -> Result<Vec<Value>, NetworkError> {
    values
        .into_iter()
        .map(|v| Value::from_sol(v).map_err(NetworkError::Decode))
        .collect()
}

/// Encoded constructor arguments, without the creation bytecode.
pub(crate) fn encode_constructor_args(
    blueprint: &ContractBlueprint,
    args: &[Value],
) -> Result<Vec<u8>, NetworkError> {
    match &blueprint.abi.constructor {
        Some(constructor) => {
            let values = to_sol_values(&constructor.inputs, args)?;
            constructor
                .abi_encode_input(&values)
                .map_err(|e| NetworkError::Rejected(e.to_string()))
        }
        None if args.is_empty() => Ok(Vec::new()),
        None => Err(NetworkError::Rejected(format!(
            "{} takes no constructor arguments",
            blueprint.name
        ))),
    }
}

/// Selector-prefixed call data for `method`.
pub(crate) fn encode_call(
    blueprint: &ContractBlueprint,
    method: &str,
    args: &[Value],
) -> Result<Vec<u8>, NetworkError> {
    let function = blueprint
        .function(method)
        .map_err(|e| NetworkError::Rejected(e.to_string()))?;
    let values = to_sol_values(&function.inputs, args)?;
    function
        .abi_encode_input(&values)
        .map_err(|e| NetworkError::Rejected(e.to_string()))
}

/// Decode an ABI parameter sequence of the given types.
pub(crate) fn decode_params(
    types: Vec<DynSolType>,
    data: &[u8],
) -> Result<Vec<DynSolValue>, NetworkError> {
    match DynSolType::Tuple(types).abi_decode_params(data) {
        Ok(DynSolValue::Tuple(values)) => Ok(values),
        Ok(other) => Err(NetworkError::Decode(format!("expected a tuple, got {other:?}"))),
        Err(e) => Err(NetworkError::Decode(e.to_string())),
    }
}
