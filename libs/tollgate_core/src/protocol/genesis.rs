use tracing::instrument;

use crate::{
    blockchain::chain::Chain,
    config::{ContractAddresses, NetworkConfig, NodeConfig},
    contracts::{
        access_ledger::AccessLedger, entry_point::EntryPoint, factory::AccountFactory, paymaster::Paymaster,
        token::Token,
    },
    primitives::{
        calls::{Call, EntryPointCall},
        errors::ExecutionError,
        Address,
    },
};

/// An empty chain as described by `config`. A genesis timestamp of 0 means
/// now.
pub fn genesis_chain(config: &NodeConfig) -> Chain {
    let timestamp = match config.genesis_timestamp {
        0 => chrono::Utc::now().timestamp().max(1) as u64,
        t => t,
    };
    Chain::new(config.chain_id, timestamp, config.block_interval_secs, config.base_fee())
}

/// Install the singleton contracts, fund the paymaster's deposit and
/// describe the result. `deployer` owns the paymaster.
#[instrument(skip_all, name = "genesis::bootstrap", fields(chain_id = chain.chain_id))]
pub fn bootstrap(chain: &mut Chain, deployer: &Address, config: &NodeConfig) -> Result<NetworkConfig, ExecutionError> {
    let entry_point = chain.install_contract(deployer, EntryPoint::new(chain.chain_id))?;
    let factory = chain.install_contract(deployer, AccountFactory::new(entry_point))?;
    let token = chain.install_contract(deployer, Token::new(&config.token_symbol))?;
    let ledger = chain.install_contract(deployer, AccessLedger::default())?;
    let paymaster = chain.install_contract(deployer, Paymaster::new(*deployer, entry_point))?;

    let deposit = config.paymaster_deposit();
    if deposit > 0 {
        chain.fund(deployer, deposit)?;
        chain.system_call(*deployer, entry_point, deposit, &Call::EntryPoint(EntryPointCall::DepositTo { account: paymaster }))?;
    }
    tracing::info!("genesis contracts installed, paymaster deposit {}", deposit);

    Ok(NetworkConfig {
        chain_id: chain.chain_id,
        account_abstraction_supported: config.account_abstraction_supported,
        receipt_timeout_ms: config.receipt_timeout_ms,
        poll_interval_ms: config.poll_interval_ms,
        contracts: ContractAddresses { ledger, token, entry_point, factory, paymaster },
        gas: config.gas,
    })
}
