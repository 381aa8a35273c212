//! Dense storage encoding of transactions.
//!
//! ┌─ byte 0 ─┬────────────── body depends on that tag ──────────────┐
//! │ format   │ height, block time, txid, version, lock time, hex?,  │
//! │          │ inputs, outputs                                      │
//! └──────────┴──────────────────────────────────────────────────────┘
//!
//! Integers are Bitcoin Core style VARINTs, signed ones zig-zag mapped
//! first. Hashes are stored as 32 raw bytes in internal byte order. Output
//! values are the minimal big-endian magnitude, zero is the empty string.
//!
//! Records are independent of the wire format, the block position (height
//! and time) travels with the record.

use crate::parser::error::{Error, Result};
use crate::parser::reader::{zigzag_decode, zigzag_encode, BlockchainRead, BlockchainWrite};
use crate::parser::transaction::{Input, Output, Transaction};
use bitcoin::hashes::hex::{DisplayHex, FromHex};
use bitcoin::hashes::Hash;
use bitcoin::Txid;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::str::FromStr;

/// Format tags.
pub mod version {
    /// Tag byte for records encoded with the *v1* layout.
    pub const V1: u8 = 1;
}

const FLAG_HEX: u8 = 0x01;

const KIND_SPEND: u8 = 0;
const KIND_COINBASE: u8 = 1;

/// kind + empty script + sequence
const MIN_PACKED_INPUT_LEN: usize = 3;

/// n + empty value + empty script + flag + address count
const MIN_PACKED_OUTPUT_LEN: usize = 5;

/// An unpacked record.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct TxRecord {
    pub tx: Transaction,
    pub height: u32,
    pub block_time: i64,
}

/// Packs `tx` with its block position.
pub fn pack_tx(tx: &Transaction, height: u32, block_time: i64) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(64 + tx.hex.as_ref().map_or(0, |h| h.len() / 2));
    buf.write_u8(version::V1);
    buf.write_varint(height as u64);
    buf.write_varint(zigzag_encode(block_time));
    buf.write_slice(&txid_bytes(&tx.txid)?);
    buf.write_varint(zigzag_encode(tx.version as i64));
    buf.write_varint(tx.lock_time as u64);

    match &tx.hex {
        Some(hex) => {
            buf.write_u8(FLAG_HEX);
            buf.write_var_bytes(&Vec::from_hex(hex)?);
        }
        None => buf.write_u8(0),
    }

    buf.write_varint(tx.inputs.len() as u64);
    for input in &tx.inputs {
        match input {
            Input::Coinbase { payload, .. } => {
                buf.write_u8(KIND_COINBASE);
                buf.write_var_bytes(payload);
            }
            Input::Spend {
                prev_txid,
                prev_index,
                script_sig,
                ..
            } => {
                buf.write_u8(KIND_SPEND);
                buf.write_slice(&txid_bytes(prev_txid)?);
                buf.write_varint(*prev_index as u64);
                buf.write_var_bytes(script_sig);
            }
        }
        buf.write_varint(input.sequence() as u64);
    }

    buf.write_varint(tx.outputs.len() as u64);
    for output in &tx.outputs {
        buf.write_varint(output.n as u64);
        buf.write_var_bytes(&value_bytes(&output.value));
        buf.write_var_bytes(&output.script_pubkey);
        buf.write_u8(output.is_single_address as u8);
        buf.write_varint(output.addresses.len() as u64);
        for address in &output.addresses {
            buf.write_var_bytes(address.as_bytes());
        }
    }
    Ok(buf)
}

/// Unpacks a record, returning the transaction and its height.
pub fn unpack_tx(buf: &[u8]) -> Result<(Transaction, u32)> {
    let record = unpack_record(buf)?;
    Ok((record.tx, record.height))
}

/// Unpacks a record including the block time.
pub fn unpack_record(buf: &[u8]) -> Result<TxRecord> {
    let mut r = Cursor::new(buf);
    let record = match r.read_u8("format tag").map_err(Error::into_corrupt)? {
        version::V1 => decode_v1(&mut r).map_err(Error::into_corrupt)?,
        tag => {
            return Err(Error::CorruptEncoding(format!(
                "unsupported format tag {tag}"
            )))
        }
    };
    if r.remaining() > 0 {
        return Err(Error::CorruptEncoding(format!(
            "{} trailing bytes",
            r.remaining()
        )));
    }
    Ok(record)
}

fn decode_v1(r: &mut Cursor<&[u8]>) -> Result<TxRecord> {
    let height = read_u32_varint(r, "height")?;
    let block_time = zigzag_decode(r.read_varint("block time")?);
    let txid = read_txid(r, "txid")?;
    let version = i32::try_from(zigzag_decode(r.read_varint("version")?))
        .map_err(|_| corrupt("version out of range"))?;
    let lock_time = read_u32_varint(r, "lock time")?;

    let hex = match r.read_u8("flags")? {
        0 => None,
        FLAG_HEX => Some(read_bytes(r, "hex")?.to_lower_hex_string()),
        flags => return Err(corrupt(format!("unknown flags {flags:#04x}"))),
    };

    let n_in = r.read_varint("input count")?;
    let n_in = r.check_count(n_in, MIN_PACKED_INPUT_LEN, "input count")?;
    let mut inputs = Vec::with_capacity(n_in);
    for _ in 0..n_in {
        inputs.push(decode_input(r)?);
    }

    let n_out = r.read_varint("output count")?;
    let n_out = r.check_count(n_out, MIN_PACKED_OUTPUT_LEN, "output count")?;
    let mut outputs = Vec::with_capacity(n_out);
    for _ in 0..n_out {
        outputs.push(decode_output(r)?);
    }

    Ok(TxRecord {
        tx: Transaction {
            txid,
            version,
            lock_time,
            inputs,
            outputs,
            hex,
        },
        height,
        block_time,
    })
}

fn decode_input(r: &mut Cursor<&[u8]>) -> Result<Input> {
    match r.read_u8("input kind")? {
        KIND_COINBASE => {
            let payload = read_bytes(r, "coinbase")?;
            let sequence = read_u32_varint(r, "sequence")?;
            Ok(Input::Coinbase { payload, sequence })
        }
        KIND_SPEND => {
            let prev_txid = read_txid(r, "prev txid")?;
            let prev_index = read_u32_varint(r, "prev index")?;
            let script_sig = read_bytes(r, "script sig")?;
            let sequence = read_u32_varint(r, "sequence")?;
            Ok(Input::Spend {
                prev_txid,
                prev_index,
                script_sig,
                sequence,
            })
        }
        kind => Err(corrupt(format!("unknown input kind {kind}"))),
    }
}

fn decode_output(r: &mut Cursor<&[u8]>) -> Result<Output> {
    let n = read_u32_varint(r, "output index")?;
    let magnitude = read_bytes(r, "value")?;
    if magnitude.first() == Some(&0) {
        return Err(corrupt("value has leading zero byte"));
    }
    let value = BigUint::from_bytes_be(&magnitude);
    let script_pubkey = read_bytes(r, "script pubkey")?;
    let is_single_address = match r.read_u8("single address flag")? {
        0 => false,
        1 => true,
        flag => return Err(corrupt(format!("single address flag {flag}"))),
    };

    let n_addr = r.read_varint("address count")?;
    let n_addr = r.check_count(n_addr, 1, "address count")?;
    let mut addresses = Vec::with_capacity(n_addr);
    for _ in 0..n_addr {
        let raw = read_bytes(r, "address")?;
        let address = String::from_utf8(raw).map_err(|e| corrupt(e.to_string()))?;
        addresses.push(address);
    }

    Ok(Output {
        value,
        n,
        script_pubkey,
        addresses,
        is_single_address,
    })
}

fn corrupt(msg: impl Into<String>) -> Error {
    Error::CorruptEncoding(msg.into())
}

fn read_bytes(r: &mut Cursor<&[u8]>, field: &'static str) -> Result<Vec<u8>> {
    let len = r.read_varint(field)?;
    r.read_u8_vec(len, field)
}

fn read_u32_varint(r: &mut Cursor<&[u8]>, field: &'static str) -> Result<u32> {
    let v = r.read_varint(field)?;
    u32::try_from(v).map_err(|_| corrupt(format!("{field} {v} out of range")))
}

fn read_txid(r: &mut Cursor<&[u8]>, field: &'static str) -> Result<String> {
    Ok(Txid::from_byte_array(r.read_u256(field)?).to_string())
}

fn txid_bytes(txid: &str) -> Result<[u8; 32]> {
    Ok(Txid::from_str(txid)?.to_byte_array())
}

/// Minimal big-endian magnitude, empty for zero.
fn value_bytes(value: &BigUint) -> Vec<u8> {
    if value.bits() == 0 {
        Vec::new()
    } else {
        value.to_bytes_be()
    }
}
