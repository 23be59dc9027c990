use std::{path::Path, sync::Arc};

use axum::{
    extract::{Path as UrlPath, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tollgate_core::{
    accounting::wallet::Wallet,
    config::{NetworkConfig, NodeConfig},
    contracts::token::UNLIMITED_ALLOWANCE,
    nodes::node::Node,
    persistence::{Datastore, SledDatastore},
    primitives::{
        block::Receipt,
        calls::{self, Call, LedgerCall, TokenCall},
        errors::{ChainStateError, ExecutionError},
        transaction::Transaction,
        Address, Amount,
    },
    protocol::{
        genesis::{bootstrap, genesis_chain},
        operations::execute_via_smart_account,
        resolver::AccountResolver,
        transactions::send_and_confirm,
    },
};
use tollgate_crypto::types::{from_hex, short_hex, to_hex, StdByteArray};

use crate::log_stream::stream_logs;

async fn token_balance(node: &Node, config: &NetworkConfig, owner: Address) -> Result<Amount, ExecutionError> {
    node.view(&config.contracts.token, &Call::Token(TokenCall::BalanceOf { owner }))
        .await?
        .into_amount()
}

/// Create a unit, price it, pay for it from a second user and withdraw the
/// proceeds to a third, logging each step.
pub async fn run_sandbox(node_config: &NodeConfig) -> Result<(), ExecutionError> {
    let operator = Wallet::generate_random();
    let mut chain = genesis_chain(node_config);
    let config = bootstrap(&mut chain, &operator.address, node_config)?;
    let mut node = Node::new(chain, None);
    node.serve().await;

    let mut relayer = Wallet::generate_random();
    let mut owner = Wallet::generate_random();
    let mut user = Wallet::generate_random();
    let third_party = Wallet::generate_random().address;
    let (ledger, token) = (config.contracts.ledger, config.contracts.token);
    let account = AccountResolver::from_config(&config).resolve(&owner.address);
    tracing::info!("owner {} acts through account {}", short_hex(&owner.address), short_hex(&account));

    let create = Call::Ledger(LedgerCall::Create { metadata_uri: "ipfs://1".into() });
    let receipt = execute_via_smart_account(&node, &config, &mut relayer, &mut owner, ledger, &create).await?;
    let unit_id = receipt
        .created_unit()
        .ok_or_else(|| ExecutionError::validation("create", "no unit was created"))?;
    tracing::info!("created unit {}", unit_id);

    let set_params = Call::Ledger(LedgerCall::SetParams { unit_id, cost: 2, token });
    execute_via_smart_account(&node, &config, &mut relayer, &mut owner, ledger, &set_params).await?;
    tracing::info!("unit {} costs 2", unit_id);

    let mint = Call::Token(TokenCall::Mint { amount: 10 });
    send_and_confirm(&node, &config, &mut user, token, 0, Some(&mint)).await?;
    let approve = Call::Token(TokenCall::Approve { spender: ledger, amount: UNLIMITED_ALLOWANCE });
    send_and_confirm(&node, &config, &mut user, token, 0, Some(&approve)).await?;
    let unlock = Call::Ledger(LedgerCall::Unlock { unit_id });
    send_and_confirm(&node, &config, &mut user, ledger, 0, Some(&unlock)).await?;
    let is_user = node
        .view(&ledger, &Call::Ledger(LedgerCall::IsUser { unit_id, user: user.address }))
        .await?
        .into_bool()?;
    tracing::info!(
        "user {} unlocked unit {}: is_user={}, balance={}",
        short_hex(&user.address),
        unit_id,
        is_user,
        token_balance(&node, &config, user.address).await?
    );

    let withdraw = Call::Ledger(LedgerCall::Withdraw { unit_id, to: third_party });
    execute_via_smart_account(&node, &config, &mut relayer, &mut owner, ledger, &withdraw).await?;
    let params = node
        .view(&ledger, &Call::Ledger(LedgerCall::GetParams { unit_id }))
        .await?
        .into_params()?;
    tracing::info!(
        "withdrew to {}: received={}, unit balance={}, revenue={}",
        short_hex(&third_party),
        token_balance(&node, &config, third_party).await?,
        params.balance,
        params.revenue
    );
    tracing::info!("relayer earned {} in gas", node.balance(&relayer.address).await);

    node.stop().await;
    Ok(())
}

#[derive(Clone)]
struct AppState {
    node: Node,
    config: Arc<NetworkConfig>,
}

#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

struct ApiError(StatusCode, String);

impl From<ExecutionError> for ApiError {
    fn from(e: ExecutionError) -> Self {
        let status = match &e {
            ExecutionError::Validation { .. } => StatusCode::BAD_REQUEST,
            ExecutionError::Authorization { .. } => StatusCode::FORBIDDEN,
            ExecutionError::InsufficientFunds { .. } => StatusCode::PAYMENT_REQUIRED,
            ExecutionError::ChainState(ChainStateError::UnknownTransaction(_)) => StatusCode::NOT_FOUND,
            ExecutionError::ChainState(_) => StatusCode::CONFLICT,
            ExecutionError::Network(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        ApiError(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()> { success: false, data: None, error: Some(self.1) };
        (self.0, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn respond<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse { success: true, data: Some(data), error: None }))
}

fn parse_bytes(text: &str) -> Result<StdByteArray, ApiError> {
    from_hex(text).map_err(|e| ApiError(StatusCode::BAD_REQUEST, format!("bad hex {text}: {e}")))
}

/// Queue a transaction signed by the client. Returns its hash.
async fn post_transaction(State(state): State<AppState>, Json(transaction): Json<Transaction>) -> ApiResult<String> {
    let hash = state.node.submit_transaction(transaction).await?;
    respond(to_hex(&hash))
}

/// The receipt of a settled transaction. A transaction the chain refused
/// answers with its rejection; one not settled yet is 404.
async fn get_receipt(State(state): State<AppState>, UrlPath(hash): UrlPath<String>) -> ApiResult<Receipt> {
    let hash = parse_bytes(&hash)?;
    respond(state.node.lookup(&hash).await?)
}

async fn post_view(
    State(state): State<AppState>,
    UrlPath(target): UrlPath<String>,
    Json(call): Json<Call>,
) -> ApiResult<calls::Response> {
    let target = parse_bytes(&target)?;
    respond(state.node.view(&target, &call).await?)
}

async fn get_config(State(state): State<AppState>) -> ApiResult<NetworkConfig> {
    respond(state.config.as_ref().clone())
}

/// Resume the chain stored under `db_path`, or run genesis into it, and
/// serve it on `127.0.0.1:port`.
pub async fn launch_node(node_config: &NodeConfig, db_path: &Path, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let datastore: Arc<dyn Datastore> = Arc::new(SledDatastore::open(db_path)?);
    let (mut node, config) = match (Node::restore(datastore.clone())?, datastore.load_network_config()?) {
        (Some(node), Some(config)) => (node, config),
        _ => {
            let operator = Wallet::generate_random();
            let key_path = db_path.with_file_name("operator.key");
            std::fs::write(&key_path, to_hex(&operator.private_key()))?;
            tracing::info!("operator {} key written to {}", short_hex(&operator.address), key_path.display());

            let mut chain = genesis_chain(node_config);
            let config = bootstrap(&mut chain, &operator.address, node_config)?;
            datastore.save_network_config(&config)?;
            datastore.save_chain(&chain)?;
            (Node::new(chain, Some(datastore)), config)
        }
    };
    node.serve().await;

    let state = AppState { node, config: Arc::new(config) };
    let app = Router::new()
        .route("/transactions", post(post_transaction))
        .route("/receipts/:hash", get(get_receipt))
        .route("/view/:target", post(post_view))
        .route("/config", get(get_config))
        .route("/logs", get(stream_logs))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
    tracing::info!("serving on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tollgate_core::protocol::transactions::submit_transaction;

    async fn receipt_status(state: &AppState, hash: &StdByteArray) -> StatusCode {
        match get_receipt(State(state.clone()), UrlPath(to_hex(hash))).await {
            Ok(_) => StatusCode::OK,
            Err(ApiError(status, _)) => status,
        }
    }

    #[tokio::test]
    async fn test_receipt_route_reports_rejections() {
        let node_config = NodeConfig { genesis_timestamp: 1_000, poll_interval_ms: 5, ..Default::default() };
        let mut chain = genesis_chain(&node_config);
        let config = bootstrap(&mut chain, &[0xd0u8; 32], &node_config).unwrap();
        let mut node = Node::new(chain, None);
        node.serve().await;
        let state = AppState { node: node.clone(), config: Arc::new(config.clone()) };

        let mut user = Wallet::generate_random();
        let mint = Call::Token(TokenCall::Mint { amount: 1 });
        let settled = submit_transaction(&node, &mut user, config.contracts.token, 0, Some(&mint), config.chain_id)
            .await
            .unwrap();
        *user.nonce_mut() = 9;
        let rejected = submit_transaction(&node, &mut user, config.contracts.token, 0, Some(&mint), config.chain_id)
            .await
            .unwrap();
        let _ = node.wait_for_receipt(&rejected, config.receipt_timeout(), config.poll_interval()).await;

        assert_eq!(receipt_status(&state, &settled).await, StatusCode::OK);
        assert_eq!(receipt_status(&state, &rejected).await, StatusCode::CONFLICT);
        // still there on a second read
        assert_eq!(receipt_status(&state, &rejected).await, StatusCode::CONFLICT);
        assert_eq!(receipt_status(&state, &[7u8; 32]).await, StatusCode::NOT_FOUND);
    }
}
