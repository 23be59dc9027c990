use flume::{Receiver, Sender};
use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::Duration,
};
use tokio::sync::Mutex;
use tollgate_crypto::types::{short_hex, StdByteArray};
use tracing::instrument;

use crate::{
    blockchain::chain::Chain,
    persistence::{Datastore, EmptyDatastore},
    primitives::{
        block::Receipt,
        calls::{Call, Response},
        errors::{ChainStateError, ExecutionError},
        transaction::Transaction,
        Address, Amount,
    },
};

/// How many rejected transactions a node remembers.
pub const MAX_REJECTIONS: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeState {
    Stopped,
    Serving,
}

impl NodeState {
    /// If a state is_consume, submitted transactions are applied to the chain.
    pub fn is_consume(&self) -> bool {
        matches!(self, NodeState::Serving)
    }
}

/// Transactions the chain refused, oldest first. Full means the oldest is
/// forgotten.
#[derive(Default)]
struct Rejections {
    errors: HashMap<StdByteArray, ExecutionError>,
    order: VecDeque<StdByteArray>,
}

impl Rejections {
    fn insert(&mut self, hash: StdByteArray, error: ExecutionError) {
        if self.errors.insert(hash, error).is_none() {
            self.order.push_back(hash);
        }
        while self.order.len() > MAX_REJECTIONS {
            if let Some(oldest) = self.order.pop_front() {
                self.errors.remove(&oldest);
            }
        }
    }

    fn get(&self, hash: &StdByteArray) -> Option<ExecutionError> {
        self.errors.get(hash).cloned()
    }

    fn len(&self) -> usize {
        self.errors.len()
    }
}

pub struct NodeInner {
    // the blockchain
    pub chain: Mutex<Chain>,
    /// A queue of transactions which are to be settled to the chain
    settle_sender: Sender<Transaction>,
    settle_receiver: Receiver<Transaction>,
    rejections: Mutex<Rejections>,
    /// the datastore
    pub datastore: Arc<dyn Datastore>,
    pub state: Mutex<NodeState>,
}

/// A handle on the host chain. Clones share the same chain; writes are
/// applied one at a time, in the order they were submitted.
#[derive(Clone)]
pub struct Node {
    pub inner: Arc<NodeInner>,
    /// kill handle
    kill_settle: Option<flume::Sender<()>>,
}

impl Node {
    /// Create a new node over `chain`.
    #[instrument(name = "Node::new", skip_all, fields(chain_id = chain.chain_id, height = chain.height()))]
    pub fn new(chain: Chain, datastore: Option<Arc<dyn Datastore>>) -> Self {
        let datastore: Arc<dyn Datastore> = match datastore {
            Some(datastore) => datastore,
            None => {
                tracing::warn!("Node created without a database. This will not persist the chain.");
                Arc::new(EmptyDatastore::new())
            }
        };
        let (settle_sender, settle_receiver) = flume::unbounded();
        Node {
            inner: NodeInner {
                chain: Mutex::new(chain),
                settle_sender,
                settle_receiver,
                rejections: Mutex::new(Rejections::default()),
                datastore,
                state: Mutex::new(NodeState::Stopped),
            }
            .into(),
            kill_settle: None,
        }
    }

    /// Resume from the chain saved in `datastore`, if there is one.
    pub fn restore(datastore: Arc<dyn Datastore>) -> Result<Option<Self>, std::io::Error> {
        let chain = datastore.load_chain()?;
        Ok(chain.map(|chain| {
            tracing::info!("restored chain at height {}", chain.height());
            Node::new(chain, Some(datastore))
        }))
    }

    /// Start applying submitted transactions on a background task.
    #[instrument(skip_all, name = "Node::serve")]
    pub async fn serve(&mut self) {
        let mut state = self.inner.state.lock().await;
        if state.is_consume() {
            tracing::warn!("Node is already serving.");
            return;
        }
        let settle_killer = flume::bounded(1);
        let _ = tokio::spawn(transaction_settle_consumer(self.clone(), settle_killer.1));
        self.kill_settle = Some(settle_killer.0);
        *state = NodeState::Serving;
        tracing::info!("Node is serving. Settle task is now running.");
    }

    #[instrument(skip_all, name = "Node::stop")]
    pub async fn stop(&mut self) {
        if let Some(killer) = self.kill_settle.take() {
            let _ = killer.send(());
            tracing::debug!("Kill signal sent.");
        }
        *self.inner.state.lock().await = NodeState::Stopped;
        tracing::info!("Node stopping.");
    }

    /// Queue a signed transaction. Returns its hash without waiting for
    /// inclusion.
    #[instrument(skip_all, name = "Node::submit_transaction", fields(transaction = %short_hex(&transaction.hash)))]
    pub async fn submit_transaction(&self, transaction: Transaction) -> Result<StdByteArray, ExecutionError> {
        if !self.inner.state.lock().await.is_consume() {
            return Err(ExecutionError::network("node is not running"));
        }
        let hash = transaction.hash;
        self.inner
            .settle_sender
            .send(transaction)
            .map_err(|e| ExecutionError::network(format!("settle queue closed: {e}")))?;
        tracing::debug!("transaction queued");
        Ok(hash)
    }

    /// Poll until `hash` has a receipt or was rejected, for at most `timeout`.
    #[instrument(skip_all, name = "Node::wait_for_receipt", fields(transaction = %short_hex(hash)))]
    pub async fn wait_for_receipt(
        &self,
        hash: &StdByteArray,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Receipt, ExecutionError> {
        let poll = async {
            loop {
                match self.lookup(hash).await {
                    Err(ExecutionError::ChainState(ChainStateError::UnknownTransaction(_))) => {
                        tokio::time::sleep(poll_interval).await
                    }
                    settled => return settled,
                }
            }
        };
        tokio::time::timeout(timeout, poll).await.map_err(|_| {
            tracing::warn!("no receipt after {:?}", timeout);
            ExecutionError::network(format!("no receipt for {} after {}ms", short_hex(hash), timeout.as_millis()))
        })?
    }

    pub async fn receipt(&self, hash: &StdByteArray) -> Option<Receipt> {
        self.inner.chain.lock().await.receipt(hash).cloned()
    }

    /// The receipt of `hash`, or the error the chain refused it with. A
    /// transaction that is still queued, or was never seen, is
    /// `UnknownTransaction`.
    pub async fn lookup(&self, hash: &StdByteArray) -> Result<Receipt, ExecutionError> {
        if let Some(receipt) = self.receipt(hash).await {
            return Ok(receipt);
        }
        match self.inner.rejections.lock().await.get(hash) {
            Some(rejection) => Err(rejection),
            None => Err(ChainStateError::UnknownTransaction(*hash).into()),
        }
    }

    /// Number of rejections currently remembered.
    pub async fn rejection_count(&self) -> usize {
        self.inner.rejections.lock().await.len()
    }

    #[instrument(skip_all, name = "Node::view", fields(target = %short_hex(target), method = call.name()))]
    pub async fn view(&self, target: &Address, call: &Call) -> Result<Response, ExecutionError> {
        self.inner.chain.lock().await.view(target, call)
    }

    pub async fn nonce(&self, address: &Address) -> u64 {
        self.inner.chain.lock().await.nonce(address)
    }

    pub async fn balance(&self, address: &Address) -> Amount {
        self.inner.chain.lock().await.balance(address)
    }

    pub async fn has_code(&self, address: &Address) -> bool {
        self.inner.chain.lock().await.has_code(address)
    }

    pub async fn height(&self) -> u64 {
        self.inner.chain.lock().await.height()
    }

    pub async fn chain_id(&self) -> u64 {
        self.inner.chain.lock().await.chain_id
    }

    /// Fix the timestamp of the next block.
    pub async fn set_next_timestamp(&self, timestamp: u64) {
        self.inner.chain.lock().await.set_next_timestamp(timestamp);
    }

    /// Apply one transaction and persist the chain.
    async fn settle(&self, transaction: Transaction) {
        let hash = transaction.hash;
        let mut chain = self.inner.chain.lock().await;
        match chain.apply_transaction(transaction) {
            Ok(receipt) => {
                tracing::info!("Settled transaction {} in block {}.", short_hex(&hash), receipt.block_height);
                if let Err(e) = self.inner.datastore.save_chain(&chain) {
                    tracing::error!("Failed to save chain: {}", e);
                }
            }
            Err(e) => {
                drop(chain);
                self.inner.rejections.lock().await.insert(hash, e);
            }
        }
    }
}

/// Applies queued transactions in arrival order until stopped.
async fn transaction_settle_consumer(node: Node, stop_signal: Receiver<()>) {
    loop {
        tokio::select! {
            _ = stop_signal.recv_async() => break,
            received = node.inner.settle_receiver.recv_async() => match received {
                Ok(transaction) => node.settle(transaction).await,
                Err(_) => break,
            },
        }
    }
    tracing::debug!("Settle task finished.");
}
