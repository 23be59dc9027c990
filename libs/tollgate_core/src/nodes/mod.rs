pub mod node;

#[cfg(test)]
mod tests {

    use chrono::Local;
    use tracing::level_filters::LevelFilter;
    use tracing_subscriber::{
        Layer, Registry,
        fmt::{self, writer::BoxMakeWriter},
        layer::SubscriberExt,
        util::SubscriberInitExt,
    };

    use crate::{
        accounting::wallet::Wallet,
        config::{NetworkConfig, NodeConfig},
        contracts::{access_ledger::UnitParams, token::UNLIMITED_ALLOWANCE},
        primitives::{
            Address, Amount,
            block::Receipt,
            calls::{Call, EntryPointCall, LedgerCall, Response, TokenCall},
            errors::{ChainStateError, ExecutionError},
            events::Event,
        },
        protocol::{
            genesis::{bootstrap, genesis_chain},
            operations::{OperationBuilder, execute_via_smart_account},
            resolver::AccountResolver,
            transactions::{send_and_confirm, submit_transaction},
        },
    };

    use super::node::Node;

    use std::fs::File;

    // always setup tracing first
    #[ctor::ctor]
    fn setup() {
        // === Setup folder structure under ./test_output/{timestamp} ===
        let timestamp = Local::now().format("%d_%H-%M-%S").to_string();
        let log_dir = format!("./test_output/{}", timestamp);
        std::fs::create_dir_all(&log_dir).expect("failed to create log directory");

        let filename = format!("{log_dir}/output.log");
        let file = File::create(filename).expect("failed to create log file");

        let console_layer = fmt::layer()
            .with_ansi(true)
            .with_level(true)
            .with_filter(LevelFilter::ERROR);

        let file_layer = fmt::layer()
            .with_writer(BoxMakeWriter::new(file))
            .with_ansi(false)
            .with_level(true)
            .with_filter(LevelFilter::DEBUG);

        let _ = Registry::default()
            .with(file_layer)
            .with(console_layer)
            .try_init();
    }

    const OPERATOR: Address = [0xd0u8; 32];

    struct Network {
        node: Node,
        config: NetworkConfig,
        relayer: Wallet,
    }

    impl Network {
        async fn start(node_config: NodeConfig) -> Self {
            let mut chain = genesis_chain(&node_config);
            let config = bootstrap(&mut chain, &OPERATOR, &node_config).unwrap();
            let mut node = Node::new(chain, None);
            node.serve().await;
            Network { node, config, relayer: Wallet::generate_random() }
        }

        async fn default() -> Self {
            Self::start(NodeConfig { genesis_timestamp: 1_000, poll_interval_ms: 5, ..Default::default() }).await
        }

        fn ledger(&self) -> Address {
            self.config.contracts.ledger
        }

        fn token(&self) -> Address {
            self.config.contracts.token
        }

        async fn privileged(&mut self, owner: &mut Wallet, call: LedgerCall) -> Result<Receipt, ExecutionError> {
            let ledger = self.ledger();
            execute_via_smart_account(&self.node, &self.config, &mut self.relayer, owner, ledger, &Call::Ledger(call)).await
        }

        async fn direct(&self, wallet: &mut Wallet, target: Address, call: Call) -> Result<Response, ExecutionError> {
            send_and_confirm(&self.node, &self.config, wallet, target, 0, Some(&call))
                .await
                .map(|receipt| receipt.outcome.unwrap_or(Response::Empty))
        }

        async fn view(&self, target: Address, call: Call) -> Response {
            self.node.view(&target, &call).await.unwrap()
        }

        async fn token_balance(&self, owner: Address) -> Amount {
            self.view(self.token(), Call::Token(TokenCall::BalanceOf { owner })).await.into_amount().unwrap()
        }

        async fn params(&self, unit_id: u64) -> UnitParams {
            self.view(self.ledger(), Call::Ledger(LedgerCall::GetParams { unit_id })).await.into_params().unwrap()
        }

        async fn paymaster_deposit(&self) -> Amount {
            let account = self.config.contracts.paymaster;
            self.view(self.config.contracts.entry_point, Call::EntryPoint(EntryPointCall::GetDepositInfo { account }))
                .await
                .into_deposit()
                .unwrap()
                .deposit
        }
    }

    #[tokio::test]
    async fn test_unlock_and_withdraw_end_to_end() {
        let mut network = Network::default().await;
        let mut owner = Wallet::generate_random();
        let mut user = Wallet::generate_random();
        let third_party = Wallet::generate_random().address;
        let (ledger, token) = (network.ledger(), network.token());

        let resolver = AccountResolver::from_config(&network.config);
        let account = resolver.resolve(&owner.address);
        assert!(!network.node.has_code(&account).await);
        let deposit_before = network.paymaster_deposit().await;

        // owner creates and prices a unit through its smart account
        let receipt = network
            .privileged(&mut owner, LedgerCall::Create { metadata_uri: "ipfs://1".into() })
            .await
            .unwrap();
        let unit_id = receipt.created_unit().unwrap();
        assert!(receipt.events().any(|event| matches!(event, Event::AccountDeployed { account: a, .. } if *a == account)));
        assert_eq!(resolver.resolve(&owner.address), account);
        assert_eq!(
            network.view(ledger, Call::Ledger(LedgerCall::OwnerOf { unit_id })).await,
            Response::Address(account)
        );
        network
            .privileged(&mut owner, LedgerCall::SetParams { unit_id, cost: 2, token })
            .await
            .unwrap();

        // a second user pays
        network.direct(&mut user, token, Call::Token(TokenCall::Mint { amount: 10 })).await.unwrap();
        network
            .direct(&mut user, token, Call::Token(TokenCall::Approve { spender: ledger, amount: UNLIMITED_ALLOWANCE }))
            .await
            .unwrap();
        network.node.set_next_timestamp(50_000).await;
        network.direct(&mut user, ledger, Call::Ledger(LedgerCall::Unlock { unit_id })).await.unwrap();

        assert_eq!(network.token_balance(user.address).await, 8);
        assert_eq!(network.token_balance(ledger).await, 2);
        assert_eq!(
            network.view(ledger, Call::Ledger(LedgerCall::IsUser { unit_id, user: user.address })).await,
            Response::Bool(true)
        );
        assert_eq!(
            network.view(ledger, Call::Ledger(LedgerCall::GetPaymentDate { unit_id, user: user.address })).await,
            Response::Timestamp(50_000)
        );
        let params = network.params(unit_id).await;
        assert_eq!((params.balance, params.revenue), (2, 2));

        // owner withdraws to a third party
        network
            .privileged(&mut owner, LedgerCall::Withdraw { unit_id, to: third_party })
            .await
            .unwrap();
        assert_eq!(network.token_balance(third_party).await, 2);
        assert_eq!(network.token_balance(ledger).await, 0);
        let params = network.params(unit_id).await;
        assert_eq!((params.balance, params.revenue), (0, 2));

        // the relayer was paid exactly what the paymaster spent
        let relayer_earned = network.node.balance(&network.relayer.address).await;
        assert!(relayer_earned > 0);
        assert_eq!(network.paymaster_deposit().await, deposit_before - relayer_earned);

        let status = resolver.account_status(&network.node, &owner.address).await.unwrap();
        assert!(status.deployed);
        assert_eq!(status.address, account);
        assert_eq!(status.nonce, 3);
    }

    #[tokio::test]
    async fn test_privileged_failures_surface() {
        let mut network = Network::default().await;
        let mut owner = Wallet::generate_random();
        let mut stranger = Wallet::generate_random();
        let token = network.token();

        let unit_id = network
            .privileged(&mut owner, LedgerCall::Create { metadata_uri: "ipfs://1".into() })
            .await
            .unwrap()
            .created_unit()
            .unwrap();

        let err = network
            .privileged(&mut stranger, LedgerCall::SetParams { unit_id, cost: 2, token })
            .await
            .unwrap_err();
        assert!(err.is_authorization());
        let err = network
            .privileged(&mut owner, LedgerCall::SetParams { unit_id, cost: 0, token })
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(network.params(unit_id).await.cost, 0);

        // inner failures still consume the nonce
        let status = AccountResolver::from_config(&network.config)
            .account_status(&network.node, &owner.address)
            .await
            .unwrap();
        assert_eq!(status.nonce, 2);
    }

    #[tokio::test]
    async fn test_stale_operation_nonce_is_rejected() {
        let mut network = Network::default().await;
        let mut owner = Wallet::generate_random();
        let ledger = network.ledger();
        network
            .privileged(&mut owner, LedgerCall::Create { metadata_uri: "ipfs://0".into() })
            .await
            .unwrap();

        // built against nonce 1, but submitted after another operation used it
        let create = Call::Ledger(LedgerCall::Create { metadata_uri: "ipfs://1".into() });
        let stale = OperationBuilder::new(&network.config)
            .build(&network.node, &mut owner, ledger, &create)
            .await
            .unwrap();
        assert_eq!(stale.nonce, 1);
        network
            .privileged(&mut owner, LedgerCall::Create { metadata_uri: "ipfs://2".into() })
            .await
            .unwrap();

        let handle_ops = Call::EntryPoint(EntryPointCall::HandleOps { ops: vec![stale], beneficiary: network.relayer.address });
        let err = send_and_confirm(
            &network.node,
            &network.config,
            &mut network.relayer,
            network.config.contracts.entry_point,
            0,
            Some(&handle_ops),
        )
        .await
        .unwrap_err();
        let sender = AccountResolver::from_config(&network.config).resolve(&owner.address);
        assert_eq!(
            err,
            ExecutionError::ChainState(ChainStateError::NonceMismatch { sender, expected: 2, actual: 1 })
        );
        assert_eq!(network.view(ledger, Call::Ledger(LedgerCall::NextUnitId)).await, Response::UnitId(2));
    }

    #[tokio::test]
    async fn test_overflowing_operation_does_not_stall_node() {
        let mut network = Network::default().await;
        let mut owner = Wallet::generate_random();
        let mut user = Wallet::generate_random();
        let (ledger, entry_point) = (network.ledger(), network.config.contracts.entry_point);

        let create = Call::Ledger(LedgerCall::Create { metadata_uri: "ipfs://1".into() });
        let mut op = OperationBuilder::new(&network.config)
            .build(&network.node, &mut owner, ledger, &create)
            .await
            .unwrap();
        op.pre_verification_gas = u64::MAX;
        op.max_fee_per_gas = 0;
        op.max_priority_fee_per_gas = 0;
        op.sign(&entry_point, network.config.chain_id, &mut owner);

        let handle_ops = Call::EntryPoint(EntryPointCall::HandleOps { ops: vec![op], beneficiary: network.relayer.address });
        let err = send_and_confirm(&network.node, &network.config, &mut network.relayer, entry_point, 0, Some(&handle_ops))
            .await
            .unwrap_err();
        assert!(err.is_validation());

        // later writes still settle
        network.direct(&mut user, network.token(), Call::Token(TokenCall::Mint { amount: 1 })).await.unwrap();
        assert_eq!(network.token_balance(user.address).await, 1);
        assert_eq!(network.view(ledger, Call::Ledger(LedgerCall::NextUnitId)).await, Response::UnitId(0));
    }

    #[tokio::test]
    async fn test_rejection_is_reported_by_lookup() {
        let network = Network::default().await;
        let mut user = Wallet::generate_random();
        *user.nonce_mut() = 9;
        let mint = Call::Token(TokenCall::Mint { amount: 1 });
        let hash = submit_transaction(&network.node, &mut user, network.token(), 0, Some(&mint), network.config.chain_id)
            .await
            .unwrap();

        let rejection = ExecutionError::ChainState(ChainStateError::NonceMismatch {
            sender: user.address,
            expected: 0,
            actual: 9,
        });
        let waited = network
            .node
            .wait_for_receipt(&hash, network.config.receipt_timeout(), network.config.poll_interval())
            .await;
        assert_eq!(waited, Err(rejection.clone()));
        // reading does not consume it
        assert_eq!(network.node.lookup(&hash).await, Err(rejection));
        assert_eq!(network.node.rejection_count().await, 1);

        let unknown = [7u8; 32];
        assert_eq!(
            network.node.lookup(&unknown).await,
            Err(ExecutionError::ChainState(ChainStateError::UnknownTransaction(unknown)))
        );
    }

    #[tokio::test]
    async fn test_direct_path_without_account_abstraction() {
        let mut network = Network::start(NodeConfig {
            genesis_timestamp: 1_000,
            poll_interval_ms: 5,
            account_abstraction_supported: false,
            ..Default::default()
        })
        .await;
        let mut owner = Wallet::generate_random();
        let ledger = network.ledger();

        let unit_id = network
            .privileged(&mut owner, LedgerCall::Create { metadata_uri: "ipfs://1".into() })
            .await
            .unwrap()
            .created_unit()
            .unwrap();
        assert_eq!(
            network.view(ledger, Call::Ledger(LedgerCall::OwnerOf { unit_id })).await,
            Response::Address(owner.address)
        );
        assert_eq!(network.node.balance(&network.relayer.address).await, 0);
    }

    #[tokio::test]
    async fn test_chain_is_saved_after_each_transaction() {
        let network = Network::default().await;
        let mut user = Wallet::generate_random();
        network.direct(&mut user, network.token(), Call::Token(TokenCall::Mint { amount: 3 })).await.unwrap();

        let saved = network.node.inner.datastore.load_chain().unwrap().unwrap();
        assert_eq!(saved.height(), network.node.height().await);
        let restored = Node::new(saved, None);
        assert_eq!(
            restored.view(&network.token(), &Call::Token(TokenCall::BalanceOf { owner: user.address })).await,
            Ok(Response::Amount(3))
        );
    }
}
