//! Declarative resource descriptions.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which configured account an argument should resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountRole {
    Deployer,
    Owner,
}

/// One constructor or step argument as written in a manifest.
///
/// References are resolved by the deployer at the moment the argument is
/// needed, so `address_of` sees addresses assigned earlier in the same run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgSpec {
    /// Address of another resource; implies a dependency on it.
    AddressOf { address_of: String },
    /// Value taken from the parameter override document.
    Param { param: String },
    /// One of the configured accounts.
    Account { account: AccountRole },
    /// Passed through unchanged.
    Literal(Value),
}

impl ArgSpec {
    pub fn address_of(name: impl Into<String>) -> Self {
        Self::AddressOf {
            address_of: name.into(),
        }
    }

    pub fn param(key: impl Into<String>) -> Self {
        Self::Param { param: key.into() }
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    /// Resource this argument points at, if any.
    #[must_use]
    pub fn referenced_resource(&self) -> Option<&str> {
        match self {
            Self::AddressOf { address_of } => Some(address_of),
            _ => None,
        }
    }
}

/// A deployable unit: name, compiled artifact, constructor inputs and the
/// resources it must come after.
///
/// Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub name: String,
    #[serde(rename = "source")]
    pub artifact_name: String,
    #[serde(default, rename = "args")]
    pub constructor_args: Vec<ArgSpec>,
    #[serde(default)]
    pub dependencies: BTreeSet<String>,
    /// Deploy even when a recorded address exists.
    #[serde(default, rename = "force")]
    pub force_redeploy: bool,
}

impl ResourceSpec {
    pub fn new(name: impl Into<String>, artifact_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            artifact_name: artifact_name.into(),
            constructor_args: Vec::new(),
            dependencies: BTreeSet::new(),
            force_redeploy: false,
        }
    }

    #[must_use]
    pub fn with_arg(mut self, arg: ArgSpec) -> Self {
        self.constructor_args.push(arg);
        self
    }

    #[must_use]
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.dependencies.insert(name.into());
        self
    }

    #[must_use]
    pub fn forced(mut self) -> Self {
        self.force_redeploy = true;
        self
    }

    /// Declared dependencies plus every resource referenced by `address_of`.
    #[must_use]
    pub fn all_dependencies(&self) -> BTreeSet<&str> {
        self.dependencies
            .iter()
            .map(String::as_str)
            .chain(
                self.constructor_args
                    .iter()
                    .filter_map(ArgSpec::referenced_resource),
            )
            .collect()
    }
}
