use tollgate_crypto::types::{short_hex, StdByteArray};
use tracing::instrument;

use crate::{
    accounting::wallet::Wallet,
    config::NetworkConfig,
    nodes::node::Node,
    primitives::{
        block::Receipt,
        calls::Call,
        errors::ExecutionError,
        transaction::{Transaction, TransactionHeader},
        Address, Amount,
    },
};

fn now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// Sign and queue a transaction from `wallet`. `call` of `None` is a plain
/// native transfer.
///
/// # Returns
/// * `Ok(hash)` - the transaction was queued; it may still be rejected
/// * `Err(e)` - the call could not be encoded or the node is not running
pub async fn submit_transaction(
    node: &Node,
    wallet: &mut Wallet,
    receiver: Address,
    value: Amount,
    call: Option<&Call>,
    chain_id: u64,
) -> Result<StdByteArray, ExecutionError> {
    let nonce = wallet.next_nonce();
    let mut transaction = match call {
        Some(call) => Transaction::call(wallet.address, receiver, value, call, nonce, now(), chain_id)?,
        None => Transaction::new(TransactionHeader::new(wallet.address, receiver, value, vec![], nonce, now(), chain_id)),
    };
    transaction.sign(wallet);
    node.submit_transaction(transaction).await
}

/// Submit and wait for the receipt. A transaction the chain refused leaves
/// the sender's nonce unused, so the wallet is resynchronised from the
/// chain. A receipt with a failed outcome is returned as that error.
#[instrument(skip_all, name = "send_and_confirm", fields(
    sender = %short_hex(&wallet.address),
    receiver = %short_hex(&receiver),
    method = call.map(Call::name).unwrap_or("transfer")
))]
pub async fn send_and_confirm(
    node: &Node,
    config: &NetworkConfig,
    wallet: &mut Wallet,
    receiver: Address,
    value: Amount,
    call: Option<&Call>,
) -> Result<Receipt, ExecutionError> {
    let hash = match submit_transaction(node, wallet, receiver, value, call, config.chain_id).await {
        Ok(hash) => hash,
        Err(e) => {
            *wallet.nonce_mut() = node.nonce(&wallet.address).await;
            return Err(e);
        }
    };
    let receipt = match node.wait_for_receipt(&hash, config.receipt_timeout(), config.poll_interval()).await {
        Ok(receipt) => receipt,
        Err(e) => {
            if !e.is_network() {
                *wallet.nonce_mut() = node.nonce(&wallet.address).await;
            }
            return Err(e);
        }
    };
    match &receipt.outcome {
        Ok(_) => {
            tracing::debug!("confirmed in block {}", receipt.block_height);
            Ok(receipt)
        }
        Err(e) => Err(e.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::NodeConfig,
        primitives::{
            calls::{Response, TokenCall},
            errors::ChainStateError,
        },
        protocol::genesis::{bootstrap, genesis_chain},
    };

    async fn running_node() -> (Node, NetworkConfig) {
        let node_config = NodeConfig { genesis_timestamp: 1_000, poll_interval_ms: 5, ..Default::default() };
        let mut chain = genesis_chain(&node_config);
        let config = bootstrap(&mut chain, &[0xd0u8; 32], &node_config).unwrap();
        let mut node = Node::new(chain, None);
        node.serve().await;
        (node, config)
    }

    #[tokio::test]
    async fn test_confirmed_call_and_failed_outcome() {
        let (node, config) = running_node().await;
        let token = config.contracts.token;
        let mut wallet = Wallet::generate_random();

        let mint = Call::Token(TokenCall::Mint { amount: 5 });
        let receipt = send_and_confirm(&node, &config, &mut wallet, token, 0, Some(&mint)).await.unwrap();
        assert_eq!(receipt.outcome, Ok(Response::Empty));

        let overdraw = Call::Token(TokenCall::Transfer { to: [9u8; 32], amount: 6 });
        let err = send_and_confirm(&node, &config, &mut wallet, token, 0, Some(&overdraw)).await.unwrap_err();
        assert!(err.is_insufficient_funds());
        // included, so the nonce was spent
        assert_eq!(node.nonce(&wallet.address).await, 2);
        assert_eq!(wallet.nonce(), 2);
    }

    #[tokio::test]
    async fn test_stale_nonce_is_rejected_and_resynced() {
        let (node, config) = running_node().await;
        let mut wallet = Wallet::generate_random();
        *wallet.nonce_mut() = 4;

        let mint = Call::Token(TokenCall::Mint { amount: 1 });
        let err = send_and_confirm(&node, &config, &mut wallet, config.contracts.token, 0, Some(&mint))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ExecutionError::ChainState(ChainStateError::NonceMismatch { sender: wallet.address, expected: 0, actual: 4 })
        );
        assert_eq!(wallet.nonce(), 0);
        send_and_confirm(&node, &config, &mut wallet, config.contracts.token, 0, Some(&mint)).await.unwrap();
    }

    #[tokio::test]
    async fn test_stopped_node_is_a_network_error() {
        let (mut node, config) = running_node().await;
        node.stop().await;
        let mut wallet = Wallet::generate_random();
        let err = send_and_confirm(&node, &config, &mut wallet, [1u8; 32], 0, None).await.unwrap_err();
        assert!(err.is_network());
        assert_eq!(wallet.nonce(), 0);
    }
}
