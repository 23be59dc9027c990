//! Where a node keeps its chain and network configuration between runs.

use std::{path::Path, sync::Mutex};

use crate::{blockchain::chain::Chain, config::NetworkConfig, protocol::serialization::TollSerialize};

const CHAIN_KEY: &[u8] = b"chain";
const NETWORK_CONFIG_KEY: &[u8] = b"network_config";

pub trait Datastore: Send + Sync {
    /// The last saved chain, if any.
    fn load_chain(&self) -> Result<Option<Chain>, std::io::Error>;

    fn save_chain(&self, chain: &Chain) -> Result<(), std::io::Error>;

    fn load_network_config(&self) -> Result<Option<NetworkConfig>, std::io::Error>;

    fn save_network_config(&self, config: &NetworkConfig) -> Result<(), std::io::Error>;
}

/// Keeps the latest values in memory only.
#[derive(Default)]
pub struct EmptyDatastore {
    chain: Mutex<Option<Vec<u8>>>,
    network_config: Mutex<Option<Vec<u8>>>,
}

impl EmptyDatastore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_poisoned<T>(_: T) -> std::io::Error {
    std::io::Error::other("datastore lock poisoned")
}

impl Datastore for EmptyDatastore {
    fn load_chain(&self) -> Result<Option<Chain>, std::io::Error> {
        let stored = self.chain.lock().map_err(lock_poisoned)?;
        stored.as_deref().map(Chain::deserialize_compressed).transpose()
    }

    fn save_chain(&self, chain: &Chain) -> Result<(), std::io::Error> {
        let bytes = chain.serialize_compressed()?;
        *self.chain.lock().map_err(lock_poisoned)? = Some(bytes);
        Ok(())
    }

    fn load_network_config(&self) -> Result<Option<NetworkConfig>, std::io::Error> {
        let stored = self.network_config.lock().map_err(lock_poisoned)?;
        stored.as_deref().map(NetworkConfig::deserialize_toll).transpose()
    }

    fn save_network_config(&self, config: &NetworkConfig) -> Result<(), std::io::Error> {
        let bytes = config.serialize_toll()?;
        *self.network_config.lock().map_err(lock_poisoned)? = Some(bytes);
        Ok(())
    }
}

/// A sled database on disk. The chain is stored lz4 compressed under a
/// single key and flushed on every save.
pub struct SledDatastore {
    db: sled::Db,
}

impl SledDatastore {
    pub fn open(path: &Path) -> Result<Self, std::io::Error> {
        let db = sled::open(path).map_err(std::io::Error::other)?;
        tracing::info!("opened datastore at {}", path.display());
        Ok(SledDatastore { db })
    }

    fn get(&self, key: &[u8]) -> Result<Option<sled::IVec>, std::io::Error> {
        self.db.get(key).map_err(std::io::Error::other)
    }

    fn put(&self, key: &[u8], value: Vec<u8>) -> Result<(), std::io::Error> {
        self.db.insert(key, value).map_err(std::io::Error::other)?;
        self.db.flush().map_err(std::io::Error::other)?;
        Ok(())
    }
}

impl Datastore for SledDatastore {
    fn load_chain(&self) -> Result<Option<Chain>, std::io::Error> {
        self.get(CHAIN_KEY)?
            .map(|bytes| Chain::deserialize_compressed(&bytes))
            .transpose()
    }

    fn save_chain(&self, chain: &Chain) -> Result<(), std::io::Error> {
        self.put(CHAIN_KEY, chain.serialize_compressed()?)
    }

    fn load_network_config(&self) -> Result<Option<NetworkConfig>, std::io::Error> {
        self.get(NETWORK_CONFIG_KEY)?
            .map(|bytes| NetworkConfig::deserialize_toll(&bytes))
            .transpose()
    }

    fn save_network_config(&self, config: &NetworkConfig) -> Result<(), std::io::Error> {
        self.put(NETWORK_CONFIG_KEY, config.serialize_toll()?)
    }
}
