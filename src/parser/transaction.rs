//! Transactions as stored by the indexer, and their wire decoder.
//!
//! Wire layout:
//!
//! - version (4 bytes, signed), the low 16 bits are the tx type
//! - inputs: CompactSize count, then prev hash, prev index, script, sequence
//! - outputs: CompactSize count, then value (8 bytes, signed), script
//! - lock time (4 bytes)
//! - tx type >= 3 only: 9 + 64 opaque bytes
//!
//! The txid covers everything up to and including the lock time.

use crate::params::ChainParams;
use crate::parser::error::{Error, Result};
use crate::parser::reader::BlockchainRead;
use crate::parser::script::script_to_addresses;
use bitcoin::hashes::hex::DisplayHex;
use bitcoin::hashes::{sha256d, Hash};
use bitcoin::Txid;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// Prev index of a coinbase input.
pub const COINBASE_PREV_INDEX: u32 = 0xFFFF_FFFF;

/// Transactions of this type or newer carry the opaque extension.
pub const EXTENDED_TX_TYPE: u32 = 3;

/// Opaque value balance following the lock time of extended transactions.
pub const VALUE_BALANCE_LEN: usize = 9;

/// Opaque binding signature following the value balance.
pub const BINDING_SIG_LEN: usize = 64;

/// prev hash + prev index + empty script + sequence
pub(crate) const MIN_INPUT_LEN: usize = 32 + 4 + 1 + 4;

/// value + empty script
pub(crate) const MIN_OUTPUT_LEN: usize = 8 + 1;

/// Low 16 bits of the version.
#[inline]
pub fn tx_type(version: i32) -> u32 {
    version as u32 & 0xFFFF
}

/// A decoded transaction.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct Transaction {
    /// Double SHA256 of the canonical encoding, in display byte order.
    pub txid: String,
    pub version: i32,
    pub lock_time: u32,
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
    /// Raw transaction, lowercase hex. Set when decoding a standalone tx.
    pub hex: Option<String>,
}

impl Transaction {
    pub fn tx_type(&self) -> u32 {
        tx_type(self.version)
    }

    pub fn is_coinbase(&self) -> bool {
        matches!(self.inputs.first(), Some(Input::Coinbase { .. }))
    }
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub enum Input {
    Coinbase {
        payload: Vec<u8>,
        sequence: u32,
    },
    Spend {
        /// Spent transaction, display byte order.
        prev_txid: String,
        prev_index: u32,
        script_sig: Vec<u8>,
        sequence: u32,
    },
}

impl Input {
    pub fn sequence(&self) -> u32 {
        match self {
            Input::Coinbase { sequence, .. } | Input::Spend { sequence, .. } => *sequence,
        }
    }

    /// The signature script, or the coinbase payload.
    pub fn script(&self) -> &[u8] {
        match self {
            Input::Coinbase { payload, .. } => payload,
            Input::Spend { script_sig, .. } => script_sig,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct Output {
    /// Amount in satoshis.
    pub value: BigUint,
    pub n: u32,
    pub script_pubkey: Vec<u8>,
    pub addresses: Vec<String>,
    /// The script maps to a single well-known address type.
    pub is_single_address: bool,
}

/// Decodes a transaction from `r`.
///
/// Output addresses are resolved only when `resolve_addresses` is set.
pub fn decode_transaction<T: AsRef<[u8]>>(
    r: &mut Cursor<T>,
    params: &ChainParams,
    resolve_addresses: bool,
) -> Result<Transaction> {
    let start = r.offset();
    let version = r.read_i32("tx version")?;

    let n_in = r.read_compact_size("input count")?;
    let n_in = r.check_count(n_in, MIN_INPUT_LEN, "input count")?;
    let mut inputs = Vec::with_capacity(n_in);
    for _ in 0..n_in {
        inputs.push(decode_input(r)?);
    }

    let n_out = r.read_compact_size("output count")?;
    let n_out = r.check_count(n_out, MIN_OUTPUT_LEN, "output count")?;
    let mut outputs = Vec::with_capacity(n_out);
    for n in 0..n_out {
        outputs.push(decode_output(r, n as u32, params, resolve_addresses)?);
    }

    let lock_time = r.read_u32("lock time")?;
    let end = r.offset();

    if tx_type(version) >= EXTENDED_TX_TYPE {
        r.skip(VALUE_BALANCE_LEN, "value balance")?;
        r.skip(BINDING_SIG_LEN, "binding signature")?;
    }

    let txid = compute_txid(&r.get_ref().as_ref()[start..end]);
    log::trace!(
        "decoded tx {} ({} inputs, {} outputs)",
        txid,
        inputs.len(),
        outputs.len()
    );

    Ok(Transaction {
        txid,
        version,
        lock_time,
        inputs,
        outputs,
        hex: None,
    })
}

/// Decodes a standalone transaction and keeps its hex.
pub fn parse_transaction(bytes: &[u8], params: &ChainParams) -> Result<Transaction> {
    let mut r = Cursor::new(bytes);
    let mut tx = decode_transaction(&mut r, params, true)?;
    tx.hex = Some(bytes.to_lower_hex_string());
    Ok(tx)
}

/// Walks over a transaction without decoding it. Returns its version.
pub(crate) fn skip_transaction<T: AsRef<[u8]>>(r: &mut Cursor<T>) -> Result<i32> {
    let version = r.read_i32("tx version")?;

    let n_in = r.read_compact_size("input count")?;
    let n_in = r.check_count(n_in, MIN_INPUT_LEN, "input count")?;
    for _ in 0..n_in {
        r.skip(36, "prev outpoint")?;
        r.skip_var_bytes("script sig")?;
        r.skip(4, "sequence")?;
    }

    let n_out = r.read_compact_size("output count")?;
    let n_out = r.check_count(n_out, MIN_OUTPUT_LEN, "output count")?;
    for _ in 0..n_out {
        r.skip(8, "output value")?;
        r.skip_var_bytes("script pubkey")?;
    }

    r.skip(4, "lock time")?;
    if tx_type(version) >= EXTENDED_TX_TYPE {
        r.skip(VALUE_BALANCE_LEN, "value balance")?;
        r.skip(BINDING_SIG_LEN, "binding signature")?;
    }
    Ok(version)
}

fn decode_input<T: AsRef<[u8]>>(r: &mut Cursor<T>) -> Result<Input> {
    let prev_hash = r.read_u256("prev hash")?;
    let prev_index = r.read_u32("prev index")?;
    let script = r.read_var_bytes("script sig")?;
    let sequence = r.read_u32("sequence")?;

    if prev_index == COINBASE_PREV_INDEX && prev_hash == [0u8; 32] {
        Ok(Input::Coinbase {
            payload: script,
            sequence,
        })
    } else {
        Ok(Input::Spend {
            prev_txid: Txid::from_byte_array(prev_hash).to_string(),
            prev_index,
            script_sig: script,
            sequence,
        })
    }
}

fn decode_output<T: AsRef<[u8]>>(
    r: &mut Cursor<T>,
    n: u32,
    params: &ChainParams,
    resolve_addresses: bool,
) -> Result<Output> {
    let value = r.read_i64("output value")?;
    if value < 0 {
        return Err(Error::malformed(
            "output value",
            format!("negative amount {value}"),
        ));
    }
    let script_pubkey = r.read_var_bytes("script pubkey")?;
    let (addresses, is_single_address) = if resolve_addresses {
        script_to_addresses(&script_pubkey, params)
    } else {
        (Vec::new(), false)
    };
    Ok(Output {
        value: BigUint::from(value as u64),
        n,
        script_pubkey,
        addresses,
        is_single_address,
    })
}

/// Double SHA256 of `raw` in display byte order.
pub fn compute_txid(raw: &[u8]) -> String {
    Txid::from_raw_hash(sha256d::Hash::hash(raw)).to_string()
}
