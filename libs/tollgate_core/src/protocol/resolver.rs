use crate::{
    accounting::account::SmartAccountStatus,
    config::NetworkConfig,
    contracts::factory::counterfactual_address,
    nodes::node::Node,
    primitives::{
        calls::{Call, EntryPointCall},
        errors::ExecutionError,
        Address,
    },
};

/// Salt of the one account each owner gets.
pub const DEFAULT_SALT: u64 = 0;

/// Finds the smart account an owner acts through, whether or not it has
/// been deployed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountResolver {
    factory: Address,
    entry_point: Address,
}

impl AccountResolver {
    pub fn new(factory: Address, entry_point: Address) -> Self {
        AccountResolver { factory, entry_point }
    }

    pub fn from_config(config: &NetworkConfig) -> Self {
        Self::new(config.contracts.factory, config.contracts.entry_point)
    }

    pub fn factory(&self) -> &Address {
        &self.factory
    }

    pub fn resolve(&self, owner: &Address) -> Address {
        self.resolve_with_salt(owner, DEFAULT_SALT)
    }

    pub fn resolve_with_salt(&self, owner: &Address, salt: u64) -> Address {
        counterfactual_address(&self.factory, &self.entry_point, owner, salt)
    }

    /// Address, deployment and next nonce of `owner`'s account.
    pub async fn account_status(&self, node: &Node, owner: &Address) -> Result<SmartAccountStatus, ExecutionError> {
        let address = self.resolve(owner);
        let deployed = node.has_code(&address).await;
        let nonce = node
            .view(&self.entry_point, &Call::EntryPoint(EntryPointCall::GetNonce { sender: address, key: 0 }))
            .await?
            .into_nonce()?;
        Ok(SmartAccountStatus { owner: *owner, address, deployed, nonce })
    }
}
