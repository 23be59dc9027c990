use serde::{Deserialize, Serialize};
use tollgate_crypto::{
    hashing::{DefaultHash, HashFunction, Hashable},
    types::StdByteArray,
};

use crate::protocol::serialization::TollSerialize;

use super::{
    calls::Response,
    errors::ExecutionError,
    events::{Event, Log},
    transaction::Transaction,
    UnitId,
};

/// The host chain seals one block per included transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub hash: StdByteArray,
    // empty for the genesis block
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub height: u64,
    pub previous_hash: StdByteArray,
    pub timestamp: u64,
    pub transaction_hash: StdByteArray,
}

impl BlockHeader {
    pub fn new(height: u64, previous_hash: StdByteArray, timestamp: u64, transaction_hash: StdByteArray) -> Self {
        BlockHeader { height, previous_hash, timestamp, transaction_hash }
    }
}

impl Hashable for BlockHeader {
    fn hash(&self, hasher: &mut impl HashFunction) -> StdByteArray {
        hasher.update(self.height.to_le_bytes());
        hasher.update(self.previous_hash);
        hasher.update(self.timestamp.to_le_bytes());
        hasher.update(self.transaction_hash);
        hasher.digest()
    }
}

impl Block {
    pub fn new(header: BlockHeader, transactions: Vec<Transaction>) -> Self {
        let hash = header.hash(&mut DefaultHash::with_domain("tollgate.block"));
        Block { header, hash, transactions }
    }
}

/// The result of an included transaction. A failed call still produces a
/// receipt; its state changes and logs were discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub transaction_hash: StdByteArray,
    pub block_hash: StdByteArray,
    pub block_height: u64,
    pub block_timestamp: u64,
    pub outcome: Result<Response, ExecutionError>,
    pub logs: Vec<Log>,
}

impl Receipt {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.logs.iter().map(|log| &log.event)
    }

    /// The id announced by the first `UnitCreated` event.
    pub fn created_unit(&self) -> Option<UnitId> {
        self.events().find_map(|event| match event {
            Event::UnitCreated { unit_id, .. } => Some(*unit_id),
            _ => None,
        })
    }
}

impl TollSerialize for Receipt {}
