//! Contracts hosted by the chain.
//!
//! A contract is plain data stored in the [`WorldState`]. Each module
//! exposes a `dispatch` function taking the world state, the call context
//! and its typed call; nested calls go back through [`WorldState::call`]
//! so depth limits and value transfers apply uniformly.

pub mod access_ledger;
pub mod entry_point;
pub mod factory;
pub mod paymaster;
pub mod smart_account;
pub mod token;

use serde::{Deserialize, Serialize};
use tollgate_crypto::hashing::{DefaultHash, HashFunction};

use crate::{
    accounting::state::WorldState,
    primitives::{
        calls::{Call, Response},
        errors::ExecutionError,
        Address, Amount,
    },
};

use self::{
    access_ledger::AccessLedger, entry_point::EntryPoint, factory::AccountFactory, paymaster::Paymaster,
    smart_account::SmartAccount, token::Token,
};

/// Who is calling, on which contract, with how much native value, at what
/// block time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    pub caller: Address,
    pub this: Address,
    pub value: Amount,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Contract {
    Ledger(AccessLedger),
    Token(Token),
    Account(SmartAccount),
    Factory(AccountFactory),
    EntryPoint(EntryPoint),
    Paymaster(Paymaster),
}

/// Typed access to one kind of contract stored behind [`Contract`].
pub trait ContractKind: Sized {
    const NAME: &'static str;

    fn from_contract(contract: &Contract) -> Option<&Self>;
    fn from_contract_mut(contract: &mut Contract) -> Option<&mut Self>;
}

macro_rules! contract_kinds {
    ($($variant:ident => $ty:ident),* $(,)?) => {
        $(
            impl ContractKind for $ty {
                const NAME: &'static str = stringify!($ty);

                fn from_contract(contract: &Contract) -> Option<&Self> {
                    match contract {
                        Contract::$variant(inner) => Some(inner),
                        _ => None,
                    }
                }

                fn from_contract_mut(contract: &mut Contract) -> Option<&mut Self> {
                    match contract {
                        Contract::$variant(inner) => Some(inner),
                        _ => None,
                    }
                }
            }

            impl From<$ty> for Contract {
                fn from(inner: $ty) -> Self {
                    Contract::$variant(inner)
                }
            }
        )*

        impl Contract {
            pub fn kind_name(&self) -> &'static str {
                match self {
                    $(Contract::$variant(_) => <$ty as ContractKind>::NAME,)*
                }
            }
        }
    };
}

contract_kinds! {
    Ledger => AccessLedger,
    Token => Token,
    Account => SmartAccount,
    Factory => AccountFactory,
    EntryPoint => EntryPoint,
    Paymaster => Paymaster,
}

/// Route a call to the module that implements it. The target's kind is
/// checked by the module when it loads its storage.
pub(crate) fn dispatch(state: &mut WorldState, ctx: &CallContext, call: &Call) -> Result<Response, ExecutionError> {
    match call {
        Call::Ledger(call) => access_ledger::dispatch(state, ctx, call),
        Call::Token(call) => token::dispatch(state, ctx, call),
        Call::Account(call) => smart_account::dispatch(state, ctx, call),
        Call::Factory(call) => factory::dispatch(state, ctx, call),
        Call::EntryPoint(call) => entry_point::dispatch(state, ctx, call),
        Call::Paymaster(call) => paymaster::dispatch(state, ctx, call),
    }
}

/// Address of the `index`-th contract installed by `deployer` outside of a
/// factory.
pub fn create_address(deployer: &Address, index: u64) -> Address {
    let mut hasher = DefaultHash::with_domain("tollgate.create");
    hasher.update(deployer);
    hasher.update(index.to_le_bytes());
    hasher.digest()
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::{
        accounting::state::{BlockEnv, WorldState},
        primitives::{
            calls::{Call, Response},
            errors::ExecutionError,
            events::Event,
            Address, Amount, GWEI,
        },
    };

    use super::{
        access_ledger::AccessLedger, create_address, entry_point::EntryPoint, factory::AccountFactory,
        paymaster::Paymaster, token::Token,
    };

    pub const CHAIN_ID: u64 = 31337;
    pub const START: u64 = 1_000;

    /// A world state with one of each contract installed.
    pub struct Fixture {
        pub state: WorldState,
        pub deployer: Address,
        pub token: Address,
        pub ledger: Address,
        pub entry_point: Address,
        pub factory: Address,
        pub paymaster: Address,
        /// Events of the last successful call.
        pub events: Vec<Event>,
    }

    impl Fixture {
        pub fn new() -> Self {
            let deployer = [0xd0u8; 32];
            let mut state = WorldState::new();
            state.set_env(BlockEnv { height: 1, timestamp: START, base_fee: GWEI });

            let entry_point = create_address(&deployer, 0);
            let factory = create_address(&deployer, 1);
            let token = create_address(&deployer, 2);
            let ledger = create_address(&deployer, 3);
            let paymaster = create_address(&deployer, 4);
            state.install(entry_point, EntryPoint::new(CHAIN_ID)).unwrap();
            state.install(factory, AccountFactory::new(entry_point)).unwrap();
            state.install(token, Token::new("TOLL")).unwrap();
            state.install(ledger, AccessLedger::default()).unwrap();
            state.install(paymaster, Paymaster::new(deployer, entry_point)).unwrap();

            Fixture { state, deployer, token, ledger, entry_point, factory, paymaster, events: vec![] }
        }

        /// Run a write the way the chain does: all or nothing.
        pub fn call(&mut self, caller: Address, target: Address, call: Call) -> Result<Response, ExecutionError> {
            self.call_with_value(caller, target, 0, call)
        }

        pub fn call_with_value(
            &mut self,
            caller: Address,
            target: Address,
            value: Amount,
            call: Call,
        ) -> Result<Response, ExecutionError> {
            let result = self.state.call_or_revert(caller, target, value, &call);
            self.events = self.state.take_logs().into_iter().map(|log| log.event).collect();
            result
        }

        pub fn view(&self, target: Address, call: Call) -> Response {
            self.state.view(&target, &call).unwrap()
        }

        pub fn advance(&mut self, seconds: u64) {
            let mut env = self.state.env();
            env.height += 1;
            env.timestamp += seconds;
            self.state.set_env(env);
        }
    }
}
