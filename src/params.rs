//! Network parameters of the Hemis chain.
//!
//! The tables are immutable. They are published through a process-wide
//! registry that is initialised once on first use; every later read is a
//! plain shared reference.

use crate::parser::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Network magic of the main network.
pub const MAINNET_MAGIC: u32 = 0x99dd_14a0;
/// Network magic of the test network.
pub const TESTNET_MAGIC: u32 = 0xcad5_e6f5;

/// Selects one of the registered parameter tables.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Main,
    Test,
}

impl Network {
    /// Parameters of this network from the process-wide registry.
    pub fn params(self) -> &'static ChainParams {
        let registry = registry();
        match self {
            Network::Main => &registry.main,
            Network::Test => &registry.test,
        }
    }
}

impl FromStr for Network {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "main" | "mainnet" => Ok(Network::Main),
            "test" | "testnet" => Ok(Network::Test),
            other => Err(Error::UnknownNetwork(other.to_string())),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Main => f.write_str("main"),
            Network::Test => f.write_str("test"),
        }
    }
}

/// Address encoding magics of a single network.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct ChainParams {
    pub network: Network,
    pub magic: u32,
    /// Version byte of pay-to-pubkey-hash addresses.
    pub pubkey_hash_addr_id: u8,
    /// Version byte of pay-to-script-hash addresses.
    pub script_hash_addr_id: u8,
    pub private_key_id: u8,
}

impl ChainParams {
    /// Main network, P2PKH addresses start with `H`.
    pub const MAIN: ChainParams = ChainParams {
        network: Network::Main,
        magic: MAINNET_MAGIC,
        pubkey_hash_addr_id: 40,
        script_hash_addr_id: 13,
        private_key_id: 212,
    };

    /// Test network, P2PKH addresses start with `x` or `y`.
    pub const TEST: ChainParams = ChainParams {
        network: Network::Test,
        magic: TESTNET_MAGIC,
        pubkey_hash_addr_id: 139,
        script_hash_addr_id: 19,
        private_key_id: 239,
    };
}

struct Registry {
    main: ChainParams,
    test: ChainParams,
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(|| {
        log::debug!(
            "registering chain params (main magic {:#010x}, test magic {:#010x})",
            MAINNET_MAGIC,
            TESTNET_MAGIC
        );
        Registry {
            main: ChainParams::MAIN,
            test: ChainParams::TEST,
        }
    })
}

/// Registers the parameter tables. Calling it again is a no-op.
pub fn register() {
    registry();
}

/// Whether the registry has been initialised in this process.
pub fn is_registered() -> bool {
    REGISTRY.get().is_some()
}

/// Looks up parameters by chain name, `"test"` selects the test network and
/// every other name the main network.
pub fn get_chain_params(chain: &str) -> &'static ChainParams {
    match chain {
        "test" => Network::Test.params(),
        _ => Network::Main.params(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_is_idempotent() {
        register();
        let first = Network::Main.params() as *const ChainParams;
        register();
        assert!(is_registered());
        assert_eq!(first, Network::Main.params() as *const ChainParams);
    }

    #[test]
    fn test_concurrent_first_use() {
        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(|| Network::Test.params() as *const ChainParams as usize))
            .collect();
        let ptrs: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(ptrs.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_chain_lookup() {
        assert_eq!(get_chain_params("main").pubkey_hash_addr_id, 40);
        assert_eq!(get_chain_params("test").pubkey_hash_addr_id, 139);
        assert_eq!(get_chain_params("regtest").network, Network::Main);
        assert_eq!(get_chain_params("test").magic, TESTNET_MAGIC);
    }

    #[test]
    fn test_network_from_str() {
        assert_eq!("main".parse::<Network>().unwrap(), Network::Main);
        assert_eq!("testnet".parse::<Network>().unwrap(), Network::Test);
        assert!(matches!(
            "signet".parse::<Network>(),
            Err(Error::UnknownNetwork(_))
        ));
    }
}
