use tollgate_crypto::{signing::SigFunction, types::short_hex};
use tracing::instrument;

use crate::{
    accounting::{account::SmartAccountStatus, wallet::Wallet},
    config::NetworkConfig,
    nodes::node::Node,
    primitives::{
        block::Receipt,
        calls::{AccountCall, Call, EntryPointCall},
        errors::ExecutionError,
        events::Event,
        operation::{InitCode, Operation},
        Address,
    },
};

use super::{
    resolver::{AccountResolver, DEFAULT_SALT},
    transactions::send_and_confirm,
};

/// Assembles signed operations for an owner's smart account using the gas
/// defaults and sponsor of a network.
pub struct OperationBuilder<'a> {
    config: &'a NetworkConfig,
    resolver: AccountResolver,
    paymaster: Option<Address>,
}

impl<'a> OperationBuilder<'a> {
    pub fn new(config: &'a NetworkConfig) -> Self {
        OperationBuilder {
            config,
            resolver: AccountResolver::from_config(config),
            paymaster: Some(config.contracts.paymaster),
        }
    }

    /// Pay for gas from the account's own deposit instead of the paymaster.
    pub fn unsponsored(mut self) -> Self {
        self.paymaster = None;
        self
    }

    /// An unsigned operation that makes the account call `target` with
    /// `call`.
    pub fn assemble(&self, status: &SmartAccountStatus, target: Address, call: &Call) -> Result<Operation, ExecutionError> {
        let call_data = Call::Account(AccountCall::Execute { target, value: 0, data: call.encode()? }).encode()?;
        let gas = &self.config.gas;
        Ok(Operation {
            sender: status.address,
            nonce_key: 0,
            nonce: status.nonce,
            init_code: (!status.deployed).then(|| InitCode {
                factory: *self.resolver.factory(),
                owner: status.owner,
                salt: DEFAULT_SALT,
            }),
            call_data,
            call_gas_limit: gas.call_gas_limit,
            verification_gas_limit: gas.verification_gas_limit,
            pre_verification_gas: gas.pre_verification_gas,
            max_fee_per_gas: gas.max_fee_per_gas(),
            max_priority_fee_per_gas: gas.max_priority_fee_per_gas(),
            paymaster: self.paymaster,
            signature: [0u8; 64],
        })
    }

    /// Read the account's state from `node`, assemble, and sign with the
    /// owner key.
    pub async fn build(
        &self,
        node: &Node,
        owner: &mut impl SigFunction,
        target: Address,
        call: &Call,
    ) -> Result<Operation, ExecutionError> {
        let status = self.resolver.account_status(node, &owner.public_key()).await?;
        let mut op = self.assemble(&status, target, call)?;
        op.sign(&self.config.contracts.entry_point, self.config.chain_id, owner);
        Ok(op)
    }
}

/// Find the outcome of the operation with `operation_hash` in a receipt.
fn operation_outcome(receipt: &Receipt, hash: &[u8; 32]) -> Result<(), ExecutionError> {
    let outcome = receipt.events().find_map(|event| match event {
        Event::OperationExecuted { operation_hash, success, revert_reason, .. } if operation_hash == hash => {
            Some((*success, revert_reason.clone()))
        }
        _ => None,
    });
    match outcome {
        Some((true, _)) => Ok(()),
        Some((false, reason)) => {
            Err(reason.unwrap_or_else(|| ExecutionError::validation("execute", "operation reverted")))
        }
        None => Err(ExecutionError::validation("handle_ops", "operation was not executed")),
    }
}

/// Perform a privileged write as `owner`'s smart account. The relayer
/// submits the operation and collects its gas charge. Networks without
/// account abstraction get a direct transaction from the owner instead.
#[instrument(skip_all, name = "execute_via_smart_account", fields(
    owner = %short_hex(&owner.address),
    target = %short_hex(&target),
    method = call.name()
))]
pub async fn execute_via_smart_account(
    node: &Node,
    config: &NetworkConfig,
    relayer: &mut Wallet,
    owner: &mut Wallet,
    target: Address,
    call: &Call,
) -> Result<Receipt, ExecutionError> {
    if !config.account_abstraction_supported {
        tracing::debug!("account abstraction unsupported, sending directly");
        return send_and_confirm(node, config, owner, target, 0, Some(call)).await;
    }
    let op = OperationBuilder::new(config).build(node, owner, target, call).await?;
    let operation_hash = op.hash(&config.contracts.entry_point, config.chain_id);
    tracing::debug!("operation {} with nonce {}", short_hex(&operation_hash), op.nonce);

    let handle_ops = Call::EntryPoint(EntryPointCall::HandleOps { ops: vec![op], beneficiary: relayer.address });
    let receipt = send_and_confirm(node, config, relayer, config.contracts.entry_point, 0, Some(&handle_ops)).await?;
    operation_outcome(&receipt, &operation_hash)?;
    Ok(receipt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::NodeConfig, primitives::GWEI, protocol::genesis::{bootstrap, genesis_chain}};

    fn network() -> NetworkConfig {
        let node_config = NodeConfig { genesis_timestamp: 1_000, ..Default::default() };
        let mut chain = genesis_chain(&node_config);
        bootstrap(&mut chain, &[0xd0u8; 32], &node_config).unwrap()
    }

    #[test]
    fn test_assemble_uses_defaults_and_init_code() {
        let config = network();
        let owner = [3u8; 32];
        let address = AccountResolver::from_config(&config).resolve(&owner);
        let status = SmartAccountStatus { owner, address, deployed: false, nonce: 0 };
        let call = Call::Ledger(crate::primitives::calls::LedgerCall::NextUnitId);

        let op = OperationBuilder::new(&config).assemble(&status, config.contracts.ledger, &call).unwrap();
        assert_eq!(op.sender, address);
        assert_eq!(op.init_code, Some(InitCode { factory: config.contracts.factory, owner, salt: 0 }));
        assert_eq!(op.call_gas_limit, 2_000_000);
        assert_eq!(op.verification_gas_limit, 500_000);
        assert_eq!(op.pre_verification_gas, 100_000);
        assert_eq!(op.max_fee_per_gas, 80 * GWEI);
        assert_eq!(op.max_priority_fee_per_gas, 80 * GWEI);
        assert_eq!(op.paymaster, Some(config.contracts.paymaster));
        match Call::decode(&op.call_data).unwrap() {
            Call::Account(AccountCall::Execute { target, value, data }) => {
                assert_eq!(target, config.contracts.ledger);
                assert_eq!(value, 0);
                assert_eq!(Call::decode(&data).unwrap(), call);
            }
            other => panic!("unexpected call data {other:?}"),
        }

        let deployed = SmartAccountStatus { deployed: true, nonce: 4, ..status };
        let op = OperationBuilder::new(&config).unsponsored().assemble(&deployed, config.contracts.ledger, &call).unwrap();
        assert_eq!(op.init_code, None);
        assert_eq!(op.nonce, 4);
        assert_eq!(op.paymaster, None);
    }
}
