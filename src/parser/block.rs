//! Block decoding.
//!
//! A block is an 80-byte header, a 32-byte commitment root for header
//! versions above 7, a CompactSize transaction count and the transactions.

use crate::params::ChainParams;
use crate::parser::error::{Error, Result};
use crate::parser::reader::BlockchainRead;
use crate::parser::transaction::{decode_transaction, skip_transaction, tx_type, Transaction};
use bitcoin::hashes::Hash;
use bitcoin::{BlockHash, TxMerkleNode};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::ops::Range;

/// Largest block payload accepted on the wire.
pub const MAX_BLOCK_PAYLOAD: usize = 4_000_000;

/// Upper bound on the declared transaction count of a block.
pub const MAX_TX_PER_BLOCK: u64 = (MAX_BLOCK_PAYLOAD / 10) as u64 + 1;

/// Header versions above this carry the commitment root.
pub const COMMITMENT_ROOT_MIN_VERSION: i32 = 8;

const COMMITMENT_ROOT_LEN: usize = 32;

#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_blockhash: BlockHash,
    pub merkle_root: TxMerkleNode,
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    /// Reads the fixed header fields and skips the version-gated extension.
    pub fn decode<T: AsRef<[u8]>>(r: &mut Cursor<T>) -> Result<Self> {
        let header = Self {
            version: r.read_i32("block version")?,
            prev_blockhash: BlockHash::from_byte_array(r.read_u256("prev block hash")?),
            merkle_root: TxMerkleNode::from_byte_array(r.read_u256("merkle root")?),
            time: r.read_u32("block time")?,
            bits: r.read_u32("bits")?,
            nonce: r.read_u32("nonce")?,
        };
        if header.version >= COMMITMENT_ROOT_MIN_VERSION {
            r.skip(COMMITMENT_ROOT_LEN, "commitment root")?;
        }
        Ok(header)
    }
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct Block {
    pub header: BlockHeader,
    /// Length of the raw block.
    pub size: usize,
    /// Header timestamp, seconds since epoch.
    pub time: i64,
    pub txs: Vec<Transaction>,
}

/// A transaction located but not decoded.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct TxSkeleton {
    pub version: i32,
    pub tx_type: u32,
    /// Byte range of the transaction within the block.
    pub span: Range<usize>,
}

impl TxSkeleton {
    /// Raw bytes of this transaction, `None` when `block` is too short to
    /// hold the span.
    pub fn raw<'a>(&self, block: &'a [u8]) -> Option<&'a [u8]> {
        block.get(self.span.clone())
    }
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct BlockSkeleton {
    pub header: BlockHeader,
    pub size: usize,
    pub time: i64,
    pub txs: Vec<TxSkeleton>,
}

/// Reads the transaction count, refusing counts no block could hold.
fn read_tx_count<T: AsRef<[u8]>>(r: &mut Cursor<T>) -> Result<usize> {
    let count = r.read_compact_size("tx count")?;
    if count > MAX_TX_PER_BLOCK {
        return Err(Error::TooManyTransactions {
            count,
            max: MAX_TX_PER_BLOCK,
        });
    }
    Ok(count as usize)
}

fn log_trailing<T: AsRef<[u8]>>(r: &Cursor<T>) {
    let trailing = r.remaining();
    if trailing > 0 {
        log::debug!("ignoring {} trailing bytes after last transaction", trailing);
    }
}

/// Decodes a block and every transaction in it.
pub fn decode_block(bytes: &[u8], params: &ChainParams, resolve_addresses: bool) -> Result<Block> {
    let mut r = Cursor::new(bytes);
    let header = BlockHeader::decode(&mut r)?;
    let count = read_tx_count(&mut r)?;

    let mut txs = Vec::with_capacity(count.min(r.remaining() / 10));
    for _ in 0..count {
        txs.push(decode_transaction(&mut r, params, resolve_addresses)?);
    }
    log_trailing(&r);
    log::trace!("decoded block of {} bytes with {} txs", bytes.len(), txs.len());

    Ok(Block {
        time: header.time as i64,
        header,
        size: bytes.len(),
        txs,
    })
}

/// Locates the transactions of a block without decoding them.
pub fn decode_block_skeleton(bytes: &[u8]) -> Result<BlockSkeleton> {
    let mut r = Cursor::new(bytes);
    let header = BlockHeader::decode(&mut r)?;
    let count = read_tx_count(&mut r)?;

    let mut txs = Vec::with_capacity(count.min(r.remaining() / 10));
    for _ in 0..count {
        let start = r.offset();
        let version = skip_transaction(&mut r)?;
        txs.push(TxSkeleton {
            version,
            tx_type: tx_type(version),
            span: start..r.offset(),
        });
    }
    log_trailing(&r);

    Ok(BlockSkeleton {
        time: header.time as i64,
        header,
        size: bytes.len(),
        txs,
    })
}

/// Same result as [`decode_block`], transactions are decoded on the rayon pool.
pub fn decode_block_parallel(
    bytes: &[u8],
    params: &ChainParams,
    resolve_addresses: bool,
) -> Result<Block> {
    let skeleton = decode_block_skeleton(bytes)?;
    let txs = skeleton
        .txs
        .par_iter()
        .map(|tx| {
            let raw = tx.raw(bytes).ok_or(Error::TruncatedInput { field: "tx" })?;
            decode_transaction(&mut Cursor::new(raw), params, resolve_addresses)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Block {
        header: skeleton.header,
        size: skeleton.size,
        time: skeleton.time,
        txs,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::parser::transaction::tests::{TX1_HEX, TX1_ID};
    use crate::parser::transaction::Input;
    use bitcoin::hashes::hex::FromHex;

    pub(crate) const COINBASE_HEX: &str = concat!(
        "01000000",
        "01",
        "0000000000000000000000000000000000000000000000000000000000000000",
        "ffffffff",
        "0403253602",
        "ffffffff",
        "01",
        "00e1f50500000000",
        "1976a91498833c37aabb0d983c94370ed5450ed55d41b67888ac",
        "00000000"
    );

    pub(crate) const BLOCK_TIME: u32 = 1715323245;

    /// Header with the given version, timestamp 1715323245.
    pub(crate) fn header_bytes(version: i32) -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(&version.to_le_bytes());
        b.extend_from_slice(&[0x11; 32]);
        b.extend_from_slice(&[0x22; 32]);
        b.extend_from_slice(&BLOCK_TIME.to_le_bytes());
        b.extend_from_slice(&0x1b0ffff0u32.to_le_bytes());
        b.extend_from_slice(&7u32.to_le_bytes());
        if version >= COMMITMENT_ROOT_MIN_VERSION {
            b.extend_from_slice(&[0x33; 32]);
        }
        b
    }

    pub(crate) fn block_bytes(version: i32) -> Vec<u8> {
        let mut b = header_bytes(version);
        b.push(2);
        b.extend(Vec::from_hex(COINBASE_HEX).unwrap());
        b.extend(Vec::from_hex(TX1_HEX).unwrap());
        b
    }

    fn params() -> &'static ChainParams {
        crate::Network::Main.params()
    }

    #[test]
    fn test_decode_block() {
        for version in [4, 8, 10] {
            let raw = block_bytes(version);
            let block = decode_block(&raw, params(), false).unwrap();
            assert_eq!(block.size, raw.len());
            assert_eq!(block.time, BLOCK_TIME as i64);
            assert_eq!(block.header.version, version);
            assert_eq!(block.header.nonce, 7);
            assert_eq!(block.txs.len(), 2);
            assert!(block.txs[0].is_coinbase());
            assert_eq!(block.txs[1].txid, TX1_ID);
            assert!(matches!(block.txs[1].inputs[0], Input::Spend { .. }));
            assert!(block.txs[0].outputs[0].addresses.is_empty());
        }
    }

    #[test]
    fn test_decode_block_with_addresses() {
        let raw = block_bytes(4);
        let block = decode_block(&raw, params(), true).unwrap();
        assert_eq!(
            block.txs[0].outputs[0].addresses,
            vec!["HLRYJtL33LLp6bDHohdZecYnuavvdq7cfT".to_string()]
        );
    }

    #[test]
    fn test_commitment_root_is_version_gated() {
        // a version 7 header followed by 32 extra bytes is not a valid block
        let mut raw = header_bytes(7);
        raw.extend_from_slice(&[0x33; 32]);
        raw.push(1);
        raw.extend(Vec::from_hex(TX1_HEX).unwrap());
        assert!(decode_block(&raw, params(), false).is_err());
    }

    #[test]
    fn test_too_many_transactions() {
        let mut raw = header_bytes(4);
        // 400_002 as CompactSize
        raw.push(0xfe);
        raw.extend_from_slice(&((MAX_TX_PER_BLOCK + 1) as u32).to_le_bytes());
        match decode_block(&raw, params(), false) {
            Err(Error::TooManyTransactions { count, max }) => {
                assert_eq!(count, 400_002);
                assert_eq!(max, 400_001);
            }
            other => panic!("unexpected result {other:?}"),
        }
        assert!(matches!(
            decode_block_skeleton(&raw),
            Err(Error::TooManyTransactions { .. })
        ));
    }

    #[test]
    fn test_count_at_bound_is_truncated_not_rejected() {
        let mut raw = header_bytes(4);
        raw.push(0xfe);
        raw.extend_from_slice(&(MAX_TX_PER_BLOCK as u32).to_le_bytes());
        assert!(matches!(
            decode_block(&raw, params(), false),
            Err(Error::TruncatedInput { .. })
        ));
    }

    #[test]
    fn test_truncated_header() {
        let raw = header_bytes(4);
        assert!(matches!(
            decode_block(&raw[..50], params(), false),
            Err(Error::TruncatedInput { .. })
        ));
        let raw = header_bytes(8);
        assert!(matches!(
            decode_block(&raw[..90], params(), false),
            Err(Error::TruncatedInput {
                field: "commitment root"
            })
        ));
    }

    #[test]
    fn test_skeleton() {
        let raw = block_bytes(8);
        let skeleton = decode_block_skeleton(&raw).unwrap();
        assert_eq!(skeleton.txs.len(), 2);
        assert_eq!(skeleton.time, BLOCK_TIME as i64);
        assert_eq!(skeleton.txs[0].version, 1);
        assert_eq!(skeleton.txs[1].tx_type, 1);
        assert_eq!(skeleton.txs[1].span.end, raw.len());
        assert_eq!(
            skeleton.txs[1].raw(&raw),
            Some(&Vec::from_hex(TX1_HEX).unwrap()[..])
        );
        assert_eq!(skeleton.txs[1].raw(&raw[..raw.len() - 1]), None);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let raw = block_bytes(8);
        assert_eq!(
            decode_block_parallel(&raw, params(), true).unwrap(),
            decode_block(&raw, params(), true).unwrap()
        );
    }
}
