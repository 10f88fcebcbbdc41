//! Declarative deployment plans.
//!
//! A plan is a TOML list of steps:
//!
//! ```toml
//! [[steps]]
//! blueprint = "AccountLedger"
//! label = "ledger"
//!
//! [[steps]]
//! blueprint = "Custody"
//! args = [{ deployed = "ledger" }]
//! ```
//!
//! Arguments are literals (strings, integers, booleans) coerced against the
//! constructor parameter types, `{ deployed = "<label>" }` for the address of an
//! earlier step, or `{ signer = <index> }` for the address of a network signer.

use std::collections::HashSet;
use std::path::Path;

use alloy_core::dyn_abi::DynSolType;
use alloy_core::primitives::U256;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::blueprint::{BlueprintRegistry, resolve_types};
use crate::error::{HarnessError, Result};
use crate::network::Signer;
use crate::network::memory::{ACCOUNT_LEDGER, CUSTODY, LIVE_GIFTS, M1_ECDSA};
use crate::orchestrator::{DeployStep, Deployments};
use crate::value::Value;

/// A literal argument as written in a plan file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Bool(bool),
    Int(u64),
    Text(String),
}

/// One constructor argument of a plan step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgSpec {
    /// Address of the contract deployed by an earlier step.
    Deployed { deployed: String },
    /// Address of the network signer at this index.
    Signer { signer: usize },
    Literal(Literal),
}

impl ArgSpec {
    pub fn deployed(label: impl Into<String>) -> Self {
        ArgSpec::Deployed {
            deployed: label.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub blueprint: String,
    /// Defaults to the blueprint name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<ArgSpec>,
}

impl PlanStep {
    pub fn new(blueprint: &str) -> Self {
        Self {
            blueprint: blueprint.to_string(),
            label: None,
            args: Vec::new(),
        }
    }

    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.blueprint)
    }
}

/// An ordered list of deployment steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentPlan {
    #[serde(default)]
    pub steps: Vec<PlanStep>,
}

/// An argument after type coercion, waiting for the run's deployments.
#[derive(Debug, Clone)]
enum ResolvedArg {
    Fixed(Value),
    Deployed(String),
}

impl DeploymentPlan {
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).context("Failed to parse deployment plan")
    }

    /// Load a plan from a TOML file.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            anyhow::bail!("Deployment plan does not exist: {}", path.display());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read deployment plan from {}", path.display()))?;

        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid deployment plan {}", path.display()))
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize deployment plan")
    }

    /// SHA-256 of the plan's JSON form, hex encoded.
    ///
    /// Identical plans always produce the same digest.
    pub fn digest(&self) -> anyhow::Result<String> {
        let json = serde_json::to_string(self).context("Failed to serialize deployment plan")?;
        Ok(hex::encode(Sha256::digest(json.as_bytes())))
    }

    /// Check the plan against `registry` and turn it into runnable steps.
    ///
    /// Unknown blueprints, wrong arities, ill-typed literals, duplicate labels and
    /// references to steps that do not come earlier are all reported here, before
    /// anything is submitted.
    pub fn into_steps(&self, registry: &BlueprintRegistry, signers: &[Signer]) -> Result<Vec<DeployStep>> {
        let mut seen = HashSet::new();
        let mut steps = Vec::with_capacity(self.steps.len());

        for step in &self.steps {
            let label = step.label().to_string();
            let blueprint = registry.get(&step.blueprint)?;
            let target = format!("{} constructor", blueprint.name);

            let params = blueprint.constructor_params();
            if params.len() != step.args.len() {
                return Err(HarnessError::invalid_args(
                    target,
                    format!("expected {} argument(s), got {}", params.len(), step.args.len()),
                ));
            }

            let types = resolve_types(&target, params)?;
            let resolved = types
                .iter()
                .zip(&step.args)
                .map(|(ty, arg)| resolve_arg(&target, ty, arg, &seen, signers))
                .collect::<Result<Vec<_>>>()?;

            if !seen.insert(label.clone()) {
                return Err(HarnessError::InvalidPlan(format!("duplicate step label '{label}'")));
            }

            steps.push(
                DeployStep::new(blueprint.name.clone())
                    .label(label)
                    .with_args_from(move |deployments: &Deployments| {
                        resolved
                            .iter()
                            .map(|arg| match arg {
                                ResolvedArg::Fixed(value) => Ok(value.clone()),
                                ResolvedArg::Deployed(label) => {
                                    deployments.address_of(label).map(Value::Address)
                                }
                            })
                            .collect()
                    }),
            );
        }

        Ok(steps)
    }
}

fn resolve_arg(
    target: &str,
    ty: &DynSolType,
    arg: &ArgSpec,
    earlier: &HashSet<String>,
    signers: &[Signer],
) -> Result<ResolvedArg> {
    let expect_address = |what: &str| {
        if *ty == DynSolType::Address {
            Ok(())
        } else {
            Err(HarnessError::invalid_args(target, format!("{what} is an address, parameter is {ty}")))
        }
    };

    match arg {
        ArgSpec::Deployed { deployed } => {
            expect_address(&format!("deployed '{deployed}'"))?;
            if !earlier.contains(deployed) {
                return Err(HarnessError::UnresolvedDependency(deployed.clone()));
            }
            Ok(ResolvedArg::Deployed(deployed.clone()))
        }
        ArgSpec::Signer { signer } => {
            expect_address(&format!("signer {signer}"))?;
            signers
                .get(*signer)
                .map(|s| ResolvedArg::Fixed(Value::Address(s.address)))
                .ok_or_else(|| HarnessError::InvalidPlan(format!("no signer at index {signer}")))
        }
        ArgSpec::Literal(literal) => {
            let value = match (literal, ty) {
                (Literal::Int(n), DynSolType::Uint(_)) => Ok(Value::Uint(U256::from(*n))),
                (Literal::Int(n), _) => Value::parse_as(&n.to_string(), ty),
                (Literal::Bool(b), _) => Value::parse_as(&b.to_string(), ty),
                (Literal::Text(text), _) => Value::parse_as(text, ty),
            }
            .map_err(|reason| HarnessError::invalid_args(target, reason))?;
            Ok(ResolvedArg::Fixed(value))
        }
    }
}

/// The deployment configurations shipped with the harness. They are independent
/// of each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum BuiltinPlan {
    /// A single `M1_ECDSA` deployment.
    M1Ecdsa,
    /// `AccountLedger`, then `Custody` bound to that ledger.
    LedgerCustody,
    /// A single `LiveGifts` deployment.
    LiveGifts,
}

impl BuiltinPlan {
    pub fn plan(&self) -> DeploymentPlan {
        let steps = match self {
            BuiltinPlan::M1Ecdsa => vec![PlanStep::new(M1_ECDSA)],
            BuiltinPlan::LedgerCustody => vec![
                PlanStep::new(ACCOUNT_LEDGER),
                PlanStep {
                    args: vec![ArgSpec::deployed(ACCOUNT_LEDGER)],
                    ..PlanStep::new(CUSTODY)
                },
            ],
            BuiltinPlan::LiveGifts => vec![PlanStep::new(LIVE_GIFTS)],
        };

        DeploymentPlan { steps }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprint::ContractBlueprint;
    use crate::network::memory::stock_registry;
    use alloy_core::primitives::Address;
    use std::str::FromStr;

    fn registry() -> BlueprintRegistry {
        stock_registry().unwrap().with(
            ContractBlueprint::from_signatures(
                "Vault",
                &["constructor(address owner, uint256 cap, bool open, string tag)"],
            )
            .unwrap(),
        )
    }

    fn signers() -> Vec<Signer> {
        vec![Signer {
            index: 0,
            address: Address::repeat_byte(0xaa),
        }]
    }

    #[test]
    fn test_builtin_names() {
        assert_eq!(BuiltinPlan::from_str("ledger-custody").unwrap(), BuiltinPlan::LedgerCustody);
        assert_eq!(BuiltinPlan::M1Ecdsa.to_string(), "m1-ecdsa");
        assert!(BuiltinPlan::from_str("everything").is_err());
    }

    #[test]
    fn test_toml_plan_matches_builtin() {
        let plan = DeploymentPlan::from_toml_str(
            r#"
            [[steps]]
            blueprint = "AccountLedger"

            [[steps]]
            blueprint = "Custody"
            args = [{ deployed = "AccountLedger" }]
            "#,
        )
        .unwrap();

        assert_eq!(plan, BuiltinPlan::LedgerCustody.plan());
        assert_eq!(plan.digest().unwrap(), BuiltinPlan::LedgerCustody.plan().digest().unwrap());
        assert_ne!(plan.digest().unwrap(), BuiltinPlan::LiveGifts.plan().digest().unwrap());
    }

    #[test]
    fn test_toml_round_trip() {
        let plan = BuiltinPlan::LedgerCustody.plan();
        let text = plan.to_toml_string().unwrap();
        assert_eq!(DeploymentPlan::from_toml_str(&text).unwrap(), plan);
    }

    #[test]
    fn test_literals_are_coerced() {
        let plan = DeploymentPlan::from_toml_str(
            r#"
            [[steps]]
            blueprint = "Vault"
            args = [{ signer = 0 }, "1.5 ether", true, "main"]
            "#,
        )
        .unwrap();

        let steps = plan.into_steps(&registry(), &signers()).unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].label, "Vault");

        let args = (steps[0].args)(&Deployments::default()).unwrap();
        assert_eq!(
            args,
            vec![
                Value::Address(Address::repeat_byte(0xaa)),
                Value::ether("1.5").unwrap(),
                Value::Bool(true),
                Value::from("main"),
            ]
        );
    }

    #[test]
    fn test_integer_literal_for_uint() {
        let plan = DeploymentPlan::from_toml_str(
            r#"
            [[steps]]
            blueprint = "Vault"
            args = ["0x00000000000000000000000000000000000000aa", 42, false, "t"]
            "#,
        )
        .unwrap();

        let steps = plan.into_steps(&registry(), &signers()).unwrap();
        let args = (steps[0].args)(&Deployments::default()).unwrap();
        assert_eq!(args[1], Value::from(42u64));
    }

    #[test]
    fn test_plan_errors_before_submission() {
        let registry = registry();

        let unknown = DeploymentPlan {
            steps: vec![PlanStep::new("Nope")],
        };
        assert!(matches!(
            unknown.into_steps(&registry, &signers()),
            Err(HarnessError::UnknownBlueprint(_))
        ));

        let dangling = DeploymentPlan {
            steps: vec![PlanStep {
                args: vec![ArgSpec::deployed("ledger")],
                ..PlanStep::new(CUSTODY)
            }],
        };
        assert!(matches!(
            dangling.into_steps(&registry, &signers()),
            Err(HarnessError::UnresolvedDependency(_))
        ));

        let duplicate = DeploymentPlan {
            steps: vec![PlanStep::new(M1_ECDSA), PlanStep::new(M1_ECDSA)],
        };
        assert!(matches!(
            duplicate.into_steps(&registry, &signers()),
            Err(HarnessError::InvalidPlan(_))
        ));

        let arity = DeploymentPlan {
            steps: vec![PlanStep::new(CUSTODY)],
        };
        assert!(matches!(
            arity.into_steps(&registry, &signers()),
            Err(HarnessError::InvalidArguments { .. })
        ));

        let ill_typed = DeploymentPlan {
            steps: vec![PlanStep {
                args: vec![ArgSpec::Literal(Literal::Text("not an address".into()))],
                ..PlanStep::new(CUSTODY)
            }],
        };
        assert!(matches!(
            ill_typed.into_steps(&registry, &signers()),
            Err(HarnessError::InvalidArguments { .. })
        ));

        let no_signer = DeploymentPlan {
            steps: vec![PlanStep {
                args: vec![ArgSpec::Signer { signer: 5 }],
                ..PlanStep::new(CUSTODY)
            }],
        };
        assert!(matches!(
            no_signer.into_steps(&registry, &signers()),
            Err(HarnessError::InvalidPlan(_))
        ));
    }
}
