//! Turning manifest arguments into concrete values.

use std::collections::BTreeMap;

use ledgerline_executor::Address;
use ledgerline_planner::{AccountRole, ArgSpec};
use serde_json::Value;

use crate::error::{DeployError, DeployResult};
use crate::record::DeploymentRecord;

/// Accounts that `{"account": ...}` arguments resolve to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accounts {
    pub deployer: Address,
    pub owner: Address,
}

impl Accounts {
    /// Owner falls back to the deployer when unset.
    pub fn new(deployer: Address, owner: Option<Address>) -> Self {
        let owner = owner.unwrap_or_else(|| deployer.clone());
        Self { deployer, owner }
    }

    #[must_use]
    pub const fn get(&self, role: AccountRole) -> &Address {
        match role {
            AccountRole::Deployer => &self.deployer,
            AccountRole::Owner => &self.owner,
        }
    }
}

/// Resolves [`ArgSpec`]s against the record as it stands right now.
pub struct ArgResolver<'a> {
    record: &'a DeploymentRecord,
    params: &'a BTreeMap<String, Value>,
    accounts: &'a Accounts,
}

impl<'a> ArgResolver<'a> {
    pub const fn new(
        record: &'a DeploymentRecord,
        params: &'a BTreeMap<String, Value>,
        accounts: &'a Accounts,
    ) -> Self {
        Self {
            record,
            params,
            accounts,
        }
    }

    /// Resolve one argument on behalf of `owner`, which is named in errors.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for unknown parameters, unset accounts
    /// and references to resources without an address.
    pub fn resolve(&self, owner: &str, arg: &ArgSpec) -> DeployResult<Value> {
        match arg {
            ArgSpec::AddressOf { address_of } => self
                .record
                .address_of(address_of)
                .map(Address::to_value)
                .ok_or_else(|| DeployError::unresolved_address(owner, address_of)),
            ArgSpec::Param { param } => self.param(owner, param).cloned(),
            ArgSpec::Account { account } => {
                let address = self.accounts.get(*account);
                if address.is_empty() {
                    return Err(DeployError::MissingAccount {
                        role: format!("{account:?}").to_lowercase(),
                    });
                }
                Ok(address.to_value())
            }
            ArgSpec::Literal(value) => Ok(value.clone()),
        }
    }

    /// # Errors
    ///
    /// Fails on the first argument that cannot be resolved.
    pub fn resolve_all(&self, owner: &str, args: &[ArgSpec]) -> DeployResult<Vec<Value>> {
        args.iter().map(|arg| self.resolve(owner, arg)).collect()
    }

    /// Check every `param` argument without touching addresses.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::MissingParam`] for the first unknown key.
    pub fn check_params(&self, owner: &str, args: &[ArgSpec]) -> DeployResult<()> {
        args.iter()
            .filter_map(|arg| match arg {
                ArgSpec::Param { param } => Some(param),
                _ => None,
            })
            .try_for_each(|key| self.param(owner, key).map(|_| ()))
    }

    fn param(&self, owner: &str, key: &str) -> DeployResult<&Value> {
        self.params
            .get(key)
            .ok_or_else(|| DeployError::missing_param(owner, key))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::record::Target;

    fn fixtures() -> (DeploymentRecord, BTreeMap<String, Value>, Accounts) {
        let mut record = DeploymentRecord::default();
        record.upsert(
            Target {
                name: "Resolver".to_string(),
                address: Address::new("0x0A"),
                source: "AddressResolver".to_string(),
                link: None,
                timestamp: Utc::now(),
                txn: None,
            },
            json!([]),
        );
        let params = BTreeMap::from([("fee".to_string(), json!(30))]);
        let accounts = Accounts::new(Address::new("0xd0"), None);
        (record, params, accounts)
    }

    #[test]
    fn test_resolves_every_kind() {
        let (record, params, accounts) = fixtures();
        let resolver = ArgResolver::new(&record, &params, &accounts);

        let values = resolver
            .resolve_all(
                "Issuer",
                &[
                    ArgSpec::address_of("Resolver"),
                    ArgSpec::param("fee"),
                    ArgSpec::Account {
                        account: AccountRole::Owner,
                    },
                    ArgSpec::literal("sUSD"),
                ],
            )
            .unwrap();

        assert_eq!(values, vec![json!("0x0a"), json!(30), json!("0xd0"), json!("sUSD")]);
    }

    #[test]
    fn test_unknown_param_names_resource() {
        let (record, params, accounts) = fixtures();
        let resolver = ArgResolver::new(&record, &params, &accounts);
        let err = resolver
            .check_params("Issuer", &[ArgSpec::param("missing")])
            .unwrap_err();
        assert!(err.to_string().contains("Issuer"));
    }

    #[test]
    fn test_unresolved_address() {
        let (record, params, accounts) = fixtures();
        let resolver = ArgResolver::new(&record, &params, &accounts);
        assert!(matches!(
            resolver.resolve("Issuer", &ArgSpec::address_of("Nowhere")),
            Err(DeployError::UnresolvedAddress { .. })
        ));
    }
}
