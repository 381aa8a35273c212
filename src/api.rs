//! Crates APIs, essential structs, functions, methods are all here!
//!
//! To quickly understand how to use this crate, have a look at the
//! documentation for `hemis_parser::HemisParser`.
//!
//! # Example
//!
//! ```rust
//! use hemis_parser::{HemisParser, Network};
//!
//! let parser = HemisParser::for_network(Network::Main);
//! let (addresses, single) = parser.get_addresses_from_addr_desc(&[]);
//! assert!(addresses.is_empty() && !single);
//! ```

use crate::params::{ChainParams, Network};
use crate::parser::error::Result;
use crate::parser::script::{address_to_script, evaluate_script, script_to_addresses, ScriptInfo};
use crate::parser::{block, json, pack, transaction};
use serde::{Deserialize, Serialize};

// re-exports
pub use crate::parser::block::{Block, BlockHeader, BlockSkeleton, TxSkeleton};
pub use crate::parser::pack::TxRecord;
pub use crate::parser::script::ScriptType;
pub use crate::parser::transaction::{Input, Output, Transaction};

/// Length of the placeholder descriptor of inputs without a script.
const UNKNOWN_INPUT_DESC_LEN: usize = 10;

/// Parser settings, usually read from the indexer's coin configuration.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
#[serde(default)]
pub struct ParserConfig {
    pub network: Network,
    /// Resolve output addresses while decoding blocks.
    pub resolve_block_addresses: bool,
    /// Decode block transactions on the rayon pool.
    pub parallel_blocks: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            network: Network::Main,
            resolve_block_addresses: false,
            parallel_blocks: false,
        }
    }
}

/// This is the main struct of this crate!! Click and read the doc.
///
/// Holds the parameters of one network. Every method is a pure function of
/// its input, so a parser can be shared between threads.
///
/// # Example
///
/// ```rust
/// use hemis_parser::{HemisParser, ParserConfig, Network};
///
/// let config = ParserConfig {
///     network: Network::Test,
///     ..Default::default()
/// };
/// let parser = HemisParser::new(config);
/// ```
#[derive(Clone, Debug)]
pub struct HemisParser {
    params: &'static ChainParams,
    config: ParserConfig,
}

impl HemisParser {
    pub fn new(config: ParserConfig) -> Self {
        Self {
            params: config.network.params(),
            config,
        }
    }

    /// Parser with default settings for `network`.
    pub fn for_network(network: Network) -> Self {
        Self::new(ParserConfig {
            network,
            ..Default::default()
        })
    }

    pub fn params(&self) -> &'static ChainParams {
        self.params
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Parses a raw block.
    ///
    /// Output addresses are only resolved when
    /// [`ParserConfig::resolve_block_addresses`] is set.
    pub fn parse_block(&self, bytes: &[u8]) -> Result<Block> {
        let resolve = self.config.resolve_block_addresses;
        if self.config.parallel_blocks {
            block::decode_block_parallel(bytes, self.params, resolve)
        } else {
            block::decode_block(bytes, self.params, resolve)
        }
    }

    /// Locates the transactions of a raw block without decoding them.
    pub fn parse_block_skeleton(&self, bytes: &[u8]) -> Result<BlockSkeleton> {
        block::decode_block_skeleton(bytes)
    }

    /// Parses a raw transaction, resolving output addresses and keeping its hex.
    pub fn parse_tx(&self, bytes: &[u8]) -> Result<Transaction> {
        transaction::parse_transaction(bytes, self.params)
    }

    /// Parses a transaction in the node's JSON representation.
    pub fn parse_tx_from_json(&self, msg: &str) -> Result<Transaction> {
        json::parse_tx_from_json(msg, self.params)
    }

    /// Packs a transaction for storage.
    pub fn pack_tx(&self, tx: &Transaction, height: u32, block_time: i64) -> Result<Vec<u8>> {
        pack::pack_tx(tx, height, block_time)
    }

    /// Unpacks a stored transaction and its block height.
    pub fn unpack_tx(&self, buf: &[u8]) -> Result<(Transaction, u32)> {
        pack::unpack_tx(buf)
    }

    /// Unpacks a stored transaction with height and block time.
    pub fn unpack_record(&self, buf: &[u8]) -> Result<TxRecord> {
        pack::unpack_record(buf)
    }

    /// Addresses of a locking script and whether it is a single-address script.
    pub fn get_addresses_from_addr_desc(&self, desc: &[u8]) -> (Vec<String>, bool) {
        script_to_addresses(desc, self.params)
    }

    /// Addresses of a locking script together with its pattern.
    pub fn evaluate_script(&self, script: &[u8]) -> ScriptInfo {
        evaluate_script(script, self.params)
    }

    /// Locking script of an address.
    pub fn get_addr_desc_from_address(&self, address: &str) -> Result<Vec<u8>> {
        address_to_script(address, self.params)
    }

    /// Descriptor used for an input whose spent output is unknown: its
    /// script, or a zeroed placeholder when it has none.
    pub fn get_addr_desc_for_unknown_input(&self, tx: &Transaction, input: usize) -> Vec<u8> {
        match tx.inputs.get(input) {
            Some(vin) if !vin.script().is_empty() => vin.script().to_vec(),
            _ => vec![0u8; UNKNOWN_INPUT_DESC_LEN],
        }
    }
}
