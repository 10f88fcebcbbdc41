//! Contract blueprints and the registry they are resolved from.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use alloy_core::dyn_abi::{DynSolType, Specifier};
use alloy_core::json_abi::{Event, Function, JsonAbi, Param};
use alloy_core::primitives::Bytes;
use anyhow::Context;
use derive_more::{Deref, Display};
use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};
use crate::value::Value;

/// Name a blueprint is registered under, e.g. `AccountLedger`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Deref, Display)]
#[serde(transparent)]
pub struct BlueprintName(String);

impl From<&str> for BlueprintName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for BlueprintName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// A named, compiled contract definition with a fixed constructor signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractBlueprint {
    pub name: BlueprintName,
    pub abi: JsonAbi,
    /// Creation bytecode. Empty for blueprints backed by in-memory stand-ins.
    pub bytecode: Bytes,
}

/// The subset of a Hardhat or Foundry artifact this crate cares about.
///
/// Foundry artifacts carry no `contractName` and nest the bytecode under
/// `bytecode.object`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArtifactFile {
    contract_name: Option<String>,
    abi: JsonAbi,
    #[serde(default)]
    bytecode: ArtifactBytecode,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ArtifactBytecode {
    Hex(Bytes),
    Object { object: Bytes },
}

impl Default for ArtifactBytecode {
    fn default() -> Self {
        ArtifactBytecode::Hex(Bytes::new())
    }
}

impl From<ArtifactBytecode> for Bytes {
    fn from(bytecode: ArtifactBytecode) -> Self {
        match bytecode {
            ArtifactBytecode::Hex(bytes) | ArtifactBytecode::Object { object: bytes } => bytes,
        }
    }
}

impl ContractBlueprint {
    /// Build a blueprint from human-readable ABI signatures, such as
    /// `"constructor(address ledger)"` or `"event Foo(uint256 indexed a)"`.
    pub fn from_signatures(name: &str, signatures: &[&str]) -> anyhow::Result<Self> {
        let abi = JsonAbi::parse(signatures.iter().copied())
            .with_context(|| format!("Failed to parse ABI signatures for {name}"))?;

        Ok(Self {
            name: name.into(),
            abi,
            bytecode: Bytes::new(),
        })
    }

    /// Parse a Hardhat artifact (`contractName`, `abi`, `bytecode`).
    pub fn from_artifact_json(json: &str) -> anyhow::Result<Self> {
        Self::from_artifact_json_named(json, None)
    }

    /// Parse a Hardhat or Foundry artifact, naming it `fallback_name` when the
    /// artifact does not carry a `contractName`.
    pub fn from_artifact_json_named(json: &str, fallback_name: Option<&str>) -> anyhow::Result<Self> {
        let artifact: ArtifactFile =
            serde_json::from_str(json).context("Failed to parse contract artifact")?;

        let name = artifact
            .contract_name
            .or_else(|| fallback_name.map(str::to_string))
            .context("Contract artifact has no contractName")?;

        Ok(Self {
            name: name.into(),
            abi: artifact.abi,
            bytecode: artifact.bytecode.into(),
        })
    }

    /// Constructor parameters; empty when the contract declares no constructor.
    pub fn constructor_params(&self) -> &[Param] {
        self.abi
            .constructor
            .as_ref()
            .map(|c| c.inputs.as_slice())
            .unwrap_or_default()
    }

    pub fn function(&self, method: &str) -> Result<&Function> {
        self.abi
            .function(method)
            .and_then(|overloads| overloads.first())
            .ok_or_else(|| {
                HarnessError::invalid_args(
                    format!("{}.{method}", self.name),
                    "no such function in the contract ABI",
                )
            })
    }

    pub fn event(&self, name: &str) -> Option<&Event> {
        self.abi.event(name).and_then(|overloads| overloads.first())
    }

    /// Check `args` against the constructor signature.
    pub fn check_constructor_args(&self, args: &[Value]) -> Result<()> {
        check_args(&format!("{} constructor", self.name), self.constructor_params(), args)
    }

    /// Check `args` against the signature of `method`.
    pub fn check_call_args(&self, method: &str, args: &[Value]) -> Result<&Function> {
        let function = self.function(method)?;
        check_args(&format!("{}.{method}", self.name), &function.inputs, args)?;
        Ok(function)
    }
}

/// Resolve the ABI types of a parameter list.
pub(crate) fn resolve_types(target: &str, params: &[Param]) -> Result<Vec<DynSolType>> {
    params
        .iter()
        .map(|p| {
            p.resolve()
                .map_err(|e| HarnessError::invalid_args(target, format!("parameter {}: {e}", p.name)))
        })
        .collect()
}

fn check_args(target: &str, params: &[Param], args: &[Value]) -> Result<()> {
    if params.len() != args.len() {
        return Err(HarnessError::invalid_args(
            target,
            format!("expected {} argument(s), got {}", params.len(), args.len()),
        ));
    }

    let types = resolve_types(target, params)?;
    for (i, (ty, arg)) in types.iter().zip(args).enumerate() {
        if !arg.conforms_to(ty) {
            return Err(HarnessError::invalid_args(
                target,
                format!("argument {i} ({arg}) is not a valid {ty}"),
            ));
        }
    }

    Ok(())
}

/// Blueprints available to a run, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct BlueprintRegistry {
    blueprints: BTreeMap<BlueprintName, Arc<ContractBlueprint>>,
}

impl BlueprintRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, blueprint: ContractBlueprint) {
        self.blueprints
            .insert(blueprint.name.clone(), Arc::new(blueprint));
    }

    pub fn with(mut self, blueprint: ContractBlueprint) -> Self {
        self.insert(blueprint);
        self
    }

    pub fn get(&self, name: &str) -> Result<Arc<ContractBlueprint>> {
        self.blueprints
            .get(&BlueprintName::from(name))
            .cloned()
            .ok_or_else(|| HarnessError::UnknownBlueprint(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &BlueprintName> {
        self.blueprints.keys()
    }

    pub fn len(&self) -> usize {
        self.blueprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blueprints.is_empty()
    }

    /// Load every artifact found under `dir`, recursively.
    ///
    /// Hardhat lays artifacts out as `artifacts/contracts/<File>.sol/<Name>.json`
    /// next to `*.dbg.json` debug files, which are skipped, as are JSON files that
    /// are not contract artifacts (build-info and the like). Foundry uses
    /// `out/<File>.sol/<Name>.json`; those artifacts are named after the file stem.
    pub fn load_artifacts(dir: &Path) -> anyhow::Result<Self> {
        if !dir.is_dir() {
            anyhow::bail!("Artifacts directory not found: {}", dir.display());
        }

        let mut registry = Self::new();
        let mut pending = vec![dir.to_path_buf()];

        while let Some(current) = pending.pop() {
            let entries = std::fs::read_dir(&current)
                .with_context(|| format!("Failed to read directory {}", current.display()))?;

            for entry in entries {
                let path = entry
                    .with_context(|| format!("Failed to read entry in {}", current.display()))?
                    .path();

                if path.is_dir() {
                    pending.push(path);
                    continue;
                }

                let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
                if !file_name.ends_with(".json") || file_name.ends_with(".dbg.json") {
                    continue;
                }

                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;

                let stem = path.file_stem().and_then(|n| n.to_str());
                match ContractBlueprint::from_artifact_json_named(&content, stem) {
                    Ok(blueprint) => {
                        tracing::debug!(
                            name = %blueprint.name,
                            path = %path.display(),
                            "Loaded contract artifact"
                        );
                        registry.insert(blueprint);
                    }
                    Err(e) => {
                        tracing::debug!(path = %path.display(), error = %e, "Skipping non-artifact JSON file");
                    }
                }
            }
        }

        tracing::info!(
            count = registry.len(),
            dir = %dir.display(),
            "Loaded contract artifacts"
        );

        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_core::primitives::Address;

    const CUSTODY_ARTIFACT: &str = r#"{
        "_format": "hh-sol-artifact-1",
        "contractName": "Custody",
        "sourceName": "contracts/Custody.sol",
        "abi": [
            {
                "inputs": [{ "internalType": "address", "name": "ledger_", "type": "address" }],
                "stateMutability": "nonpayable",
                "type": "constructor"
            },
            {
                "inputs": [],
                "name": "ledger",
                "outputs": [{ "internalType": "address", "name": "", "type": "address" }],
                "stateMutability": "view",
                "type": "function"
            }
        ],
        "bytecode": "0x6080604052",
        "deployedBytecode": "0x6080",
        "linkReferences": {},
        "deployedLinkReferences": {}
    }"#;

    #[test]
    fn test_parse_hardhat_artifact() {
        let blueprint = ContractBlueprint::from_artifact_json(CUSTODY_ARTIFACT).unwrap();
        assert_eq!(blueprint.name.as_str(), "Custody");
        assert_eq!(blueprint.constructor_params().len(), 1);
        assert_eq!(blueprint.bytecode.len(), 5);
        assert!(blueprint.function("ledger").is_ok());
        assert!(blueprint.function("owner").is_err());
    }

    #[test]
    fn test_constructor_arg_checks() {
        let blueprint = ContractBlueprint::from_artifact_json(CUSTODY_ARTIFACT).unwrap();

        assert!(
            blueprint
                .check_constructor_args(&[Value::Address(Address::repeat_byte(1))])
                .is_ok()
        );
        assert!(matches!(
            blueprint.check_constructor_args(&[]),
            Err(HarnessError::InvalidArguments { .. })
        ));
        assert!(matches!(
            blueprint.check_constructor_args(&[Value::from("not an address")]),
            Err(HarnessError::InvalidArguments { .. })
        ));
    }

    #[test]
    fn test_signature_blueprint_without_constructor() {
        let blueprint = ContractBlueprint::from_signatures("M1_ECDSA", &[]).unwrap();
        assert!(blueprint.constructor_params().is_empty());
        assert!(blueprint.check_constructor_args(&[]).is_ok());
    }

    const FOUNDRY_LIVE_GIFTS_ARTIFACT: &str = r#"{
        "abi": [
            {
                "type": "function",
                "name": "sendGift",
                "inputs": [
                    { "name": "receiver", "type": "address", "internalType": "address" },
                    { "name": "message", "type": "string", "internalType": "string" }
                ],
                "outputs": [],
                "stateMutability": "payable"
            }
        ],
        "bytecode": { "object": "0x608060405234", "sourceMap": "", "linkReferences": {} },
        "deployedBytecode": { "object": "0x6080", "sourceMap": "", "linkReferences": {} },
        "methodIdentifiers": { "sendGift(address,string)": "c2ed4ac4" }
    }"#;

    #[test]
    fn test_parse_foundry_artifact() {
        assert!(ContractBlueprint::from_artifact_json(FOUNDRY_LIVE_GIFTS_ARTIFACT).is_err());

        let blueprint =
            ContractBlueprint::from_artifact_json_named(FOUNDRY_LIVE_GIFTS_ARTIFACT, Some("LiveGifts"))
                .unwrap();
        assert_eq!(blueprint.name.as_str(), "LiveGifts");
        assert_eq!(blueprint.bytecode.len(), 6);
        assert!(blueprint.check_call_args("sendGift", &[Value::Address(Address::ZERO), Value::from("hi")]).is_ok());
    }

    #[test]
    fn test_load_foundry_out_directory() {
        let dir = tempdir::TempDir::new("gantry-foundry").unwrap();
        let contract_dir = dir.path().join("LiveGifts.sol");
        std::fs::create_dir_all(&contract_dir).unwrap();
        std::fs::write(contract_dir.join("LiveGifts.json"), FOUNDRY_LIVE_GIFTS_ARTIFACT).unwrap();
        std::fs::create_dir_all(dir.path().join("build-info")).unwrap();
        std::fs::write(dir.path().join("build-info/abc123.json"), r#"{"id": "abc123"}"#).unwrap();

        let registry = BlueprintRegistry::load_artifacts(dir.path()).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("LiveGifts").unwrap().bytecode.len(), 6);
    }

    #[test]
    fn test_load_artifacts_directory() {
        let dir = tempdir::TempDir::new("gantry-artifacts").unwrap();
        let contract_dir = dir.path().join("contracts/Custody.sol");
        std::fs::create_dir_all(&contract_dir).unwrap();
        std::fs::write(contract_dir.join("Custody.json"), CUSTODY_ARTIFACT).unwrap();
        std::fs::write(contract_dir.join("Custody.dbg.json"), r#"{"buildInfo": "x"}"#).unwrap();
        std::fs::write(dir.path().join("notes.json"), r#"{"hello": 1}"#).unwrap();

        let registry = BlueprintRegistry::load_artifacts(dir.path()).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.get("Custody").is_ok());
        assert!(matches!(
            registry.get("LiveGifts"),
            Err(HarnessError::UnknownBlueprint(_))
        ));
    }
}
