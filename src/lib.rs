//! # Introduction
//!
//! Codec for blocks and transactions of the Hemis chain, as needed by a
//! blockchain indexer:
//!
//! - decode raw blocks and transactions, including the version-gated
//!   extensions of the chain,
//! - resolve output scripts to addresses and addresses back to scripts,
//! - pack transactions into a dense storage record and unpack them again,
//! - read transactions from the node's JSON representation.
//!
//! Start from [`HemisParser`].

pub mod api;
pub mod params;
pub mod parser;

pub use api::*;
pub use params::{ChainParams, Network};
pub use parser::error::{Error, Result};
