use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tollgate_crypto::types::{short_hex, StdByteArray, ZERO_ARRAY};
use tracing::instrument;

use crate::{
    accounting::state::{BlockEnv, WorldState},
    contracts::{create_address, Contract},
    primitives::{
        block::{Block, BlockHeader, Receipt},
        calls::{Call, Response},
        errors::{ChainStateError, ExecutionError},
        transaction::Transaction,
        Address, Amount,
    },
    protocol::serialization::TollSerialize,
};

/// The host ledger: a single totally ordered sequence of blocks, one per
/// included transaction, over one world state.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Chain {
    pub chain_id: u64,
    state: WorldState,
    /// The blocks in the chain, genesis first.
    blocks: Vec<Block>,
    receipts: HashMap<StdByteArray, Receipt>,
    /// seconds between consecutive blocks
    block_interval: u64,
    base_fee: Amount,
    // contracts installed outside of transactions
    installed: u64,
    // overrides the time of the next block
    #[serde(skip)]
    next_timestamp: Option<u64>,
}

impl Chain {
    /// Creates a new chain with a genesis block at `genesis_timestamp`.
    pub fn new(chain_id: u64, genesis_timestamp: u64, block_interval: u64, base_fee: Amount) -> Self {
        let genesis_timestamp = genesis_timestamp.max(1);
        let genesis = Block::new(BlockHeader::new(0, ZERO_ARRAY, genesis_timestamp, ZERO_ARRAY), vec![]);
        let mut state = WorldState::new();
        state.set_env(BlockEnv { height: 0, timestamp: genesis_timestamp, base_fee });
        Chain {
            chain_id,
            state,
            blocks: vec![genesis],
            receipts: HashMap::new(),
            block_interval,
            base_fee,
            installed: 0,
            next_timestamp: None,
        }
    }

    pub fn height(&self) -> u64 {
        self.latest_block().header.height
    }

    pub fn latest_block(&self) -> &Block {
        // a chain always holds its genesis block
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn block(&self, height: u64) -> Option<&Block> {
        self.blocks.get(height as usize)
    }

    pub fn receipt(&self, transaction_hash: &StdByteArray) -> Option<&Receipt> {
        self.receipts.get(transaction_hash)
    }

    pub fn state(&self) -> &WorldState {
        &self.state
    }

    pub fn nonce(&self, address: &Address) -> u64 {
        self.state.nonce(address)
    }

    pub fn balance(&self, address: &Address) -> Amount {
        self.state.balance(address)
    }

    pub fn has_code(&self, address: &Address) -> bool {
        self.state.has_code(address)
    }

    /// Fix the timestamp of the next block. Times never go backwards.
    pub fn set_next_timestamp(&mut self, timestamp: u64) {
        self.next_timestamp = Some(timestamp);
    }

    /// Mint native value, outside of any transaction.
    pub fn fund(&mut self, address: &Address, amount: Amount) -> Result<(), ExecutionError> {
        self.state.credit(address, amount)
    }

    /// Place a contract at an address derived from `deployer`, outside of
    /// any transaction.
    pub fn install_contract(&mut self, deployer: &Address, contract: impl Into<Contract>) -> Result<Address, ExecutionError> {
        let address = create_address(deployer, self.installed);
        self.state.install(address, contract)?;
        self.installed += 1;
        Ok(address)
    }

    /// Run a call as `caller` outside of any transaction, keeping its
    /// effects only if it succeeds. Used to set up genesis.
    pub fn system_call(&mut self, caller: Address, target: Address, value: Amount, call: &Call) -> Result<Response, ExecutionError> {
        let result = self.state.call_or_revert(caller, target, value, call);
        self.state.take_logs();
        result
    }

    pub fn view(&self, target: &Address, call: &Call) -> Result<Response, ExecutionError> {
        self.state.view(target, call)
    }

    /// Check that a transaction may be included. A rejected transaction
    /// gets no block and no receipt.
    fn validate_transaction(&self, transaction: &Transaction) -> Result<(), ExecutionError> {
        let header = &transaction.header;
        if header.chain_id != self.chain_id {
            return Err(ExecutionError::validation(
                "submit",
                format!("transaction is for chain {}, this is chain {}", header.chain_id, self.chain_id),
            ));
        }
        if !transaction.hash_is_valid() {
            return Err(ExecutionError::validation("submit", "hash does not match the header"));
        }
        if !transaction.verify_signature() {
            return Err(ExecutionError::authorization("submit", header.sender, "invalid transaction signature"));
        }
        if self.receipts.contains_key(&transaction.hash) {
            return Err(ExecutionError::validation("submit", "transaction already included"));
        }
        let expected = self.state.nonce(&header.sender);
        if header.nonce != expected {
            return Err(ChainStateError::NonceMismatch { sender: header.sender, expected, actual: header.nonce }.into());
        }
        Ok(())
    }

    /// Include a transaction in a new block and execute it. The sender's
    /// nonce advances even when the call fails; every other change of a
    /// failed call is discarded.
    #[instrument(skip_all, name = "Chain::apply_transaction", fields(transaction = %short_hex(&transaction.hash)))]
    pub fn apply_transaction(&mut self, transaction: Transaction) -> Result<Receipt, ExecutionError> {
        if let Err(e) = self.validate_transaction(&transaction) {
            tracing::warn!("rejected transaction: {}", e);
            return Err(e);
        }
        let header = &transaction.header;

        let previous = self.latest_block().header.clone();
        let timestamp = self
            .next_timestamp
            .take()
            .unwrap_or(previous.timestamp + self.block_interval)
            .max(previous.timestamp)
            .max(1);
        let height = previous.height + 1;
        self.state.set_env(BlockEnv { height, timestamp, base_fee: self.base_fee });
        self.state.increment_nonce(&header.sender);

        let snapshot = self.state.clone();
        let outcome = if header.data.is_empty() {
            self.state
                .transfer_native(&header.sender, &header.receiver, header.value, "transfer")
                .map(|_| Response::Empty)
        } else {
            transaction
                .decode_call()
                .and_then(|call| self.state.call(header.sender, header.receiver, header.value, &call))
        };
        let logs = match &outcome {
            Ok(_) => self.state.take_logs(),
            Err(e) => {
                tracing::info!("transaction reverted: {}", e);
                self.state = snapshot;
                vec![]
            }
        };

        let block = Block::new(
            BlockHeader::new(height, self.latest_block().hash, timestamp, transaction.hash),
            vec![transaction.clone()],
        );
        let receipt = Receipt {
            transaction_hash: transaction.hash,
            block_hash: block.hash,
            block_height: height,
            block_timestamp: timestamp,
            outcome,
            logs,
        };
        tracing::debug!("sealed block {} at {}", height, timestamp);
        self.blocks.push(block);
        self.receipts.insert(transaction.hash, receipt.clone());
        Ok(receipt)
    }
}

impl TollSerialize for Chain {}
