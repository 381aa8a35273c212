//! Recognise output script patterns and decode addresses from them.
//!
//! Addresses are base58check strings parameterised by [`ChainParams`].
//! Public key outputs (bare P2PK, raw public key descriptors, bare
//! multisig) are rendered in their pay-to-pubkey-hash form.

use crate::params::ChainParams;
use crate::parser::error::{Error, Result};
use bitcoin::base58;
use bitcoin::hashes::hex::DisplayHex;
use bitcoin::hashes::{hash160, Hash};
use bitcoin::script::Instruction;
use bitcoin::{PubkeyHash, Script, ScriptBuf, ScriptHash};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub enum ScriptType {
    OpReturn,
    Pay2MultiSig,
    Pay2PublicKey,
    Pay2PublicKeyHash,
    Pay2ScriptHash,
    NotRecognised,
}

impl ScriptType {
    /// Whether the pattern maps to exactly one well-known address type.
    pub fn is_single_address(self) -> bool {
        matches!(
            self,
            ScriptType::Pay2PublicKeyHash | ScriptType::Pay2ScriptHash
        )
    }
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct ScriptInfo {
    pub addresses: Vec<String>,
    pub pattern: ScriptType,
}

impl ScriptInfo {
    fn new(addresses: Vec<String>, pattern: ScriptType) -> Self {
        Self { addresses, pattern }
    }

    fn not_recognised() -> Self {
        Self::new(Vec::new(), ScriptType::NotRecognised)
    }
}

/// Classify a locking script and decode its addresses.
pub fn evaluate_script(script: &[u8], params: &ChainParams) -> ScriptInfo {
    let script = Script::from_bytes(script);
    let bytes = script.as_bytes();
    if script.is_p2pkh() {
        return ScriptInfo::new(
            vec![encode_address(params.pubkey_hash_addr_id, &bytes[3..23])],
            ScriptType::Pay2PublicKeyHash,
        );
    }
    if script.is_p2sh() {
        return ScriptInfo::new(
            vec![encode_address(params.script_hash_addr_id, &bytes[2..22])],
            ScriptType::Pay2ScriptHash,
        );
    }
    if let Some(pubkey) = p2pk_pubkey(script).or_else(|| raw_pubkey(bytes)) {
        return ScriptInfo::new(
            vec![pubkey_address(pubkey, params)],
            ScriptType::Pay2PublicKey,
        );
    }
    if let Some(pubkeys) = multisig_pubkeys(script) {
        let addresses = pubkeys
            .into_iter()
            .map(|pk| pubkey_address(pk, params))
            .collect();
        return ScriptInfo::new(addresses, ScriptType::Pay2MultiSig);
    }
    if let Some(data) = op_return_data(script) {
        return ScriptInfo::new(vec![op_return_text(data)], ScriptType::OpReturn);
    }
    ScriptInfo::not_recognised()
}

/// Addresses of a locking script and whether it is a single-address script.
///
/// Never fails: an unrecognised script yields no addresses.
pub fn script_to_addresses(script: &[u8], params: &ChainParams) -> (Vec<String>, bool) {
    let info = evaluate_script(script, params);
    let single = info.pattern.is_single_address();
    (info.addresses, single)
}

/// Locking script paying to a base58check address of the given network.
pub fn address_to_script(address: &str, params: &ChainParams) -> Result<Vec<u8>> {
    let payload = base58::decode_check(address)?;
    let (version, hash) = match payload.split_first() {
        Some((&version, hash)) if hash.len() == 20 => (version, hash),
        _ => {
            return Err(Error::InvalidAddress(format!(
                "{address}: payload of {} bytes, expected 21",
                payload.len()
            )))
        }
    };
    let mut hash_bytes = [0u8; 20];
    hash_bytes.copy_from_slice(hash);

    let script = if version == params.pubkey_hash_addr_id {
        ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array(hash_bytes))
    } else if version == params.script_hash_addr_id {
        ScriptBuf::new_p2sh(&ScriptHash::from_byte_array(hash_bytes))
    } else {
        return Err(Error::InvalidAddress(format!(
            "{address}: version byte {version} is not used by the {} network",
            params.network
        )));
    };
    Ok(script.into_bytes())
}

fn encode_address(version: u8, hash: &[u8]) -> String {
    let mut payload = Vec::with_capacity(1 + hash.len());
    payload.push(version);
    payload.extend_from_slice(hash);
    base58::encode_check(&payload)
}

fn pubkey_address(pubkey: &[u8], params: &ChainParams) -> String {
    let hash = hash160::Hash::hash(pubkey);
    encode_address(params.pubkey_hash_addr_id, hash.as_byte_array())
}

fn is_pubkey(data: &[u8]) -> bool {
    match data.first() {
        Some(0x02) | Some(0x03) => data.len() == 33,
        Some(0x04) => data.len() == 65,
        _ => false,
    }
}

fn p2pk_pubkey(script: &Script) -> Option<&[u8]> {
    if !script.is_p2pk() {
        return None;
    }
    match script.instructions().next() {
        Some(Ok(Instruction::PushBytes(pk))) if is_pubkey(pk.as_bytes()) => Some(pk.as_bytes()),
        _ => None,
    }
}

/// Public key outputs are indexed by the key itself.
fn raw_pubkey(bytes: &[u8]) -> Option<&[u8]> {
    if is_pubkey(bytes) {
        Some(bytes)
    } else {
        None
    }
}

fn multisig_pubkeys(script: &Script) -> Option<Vec<&[u8]>> {
    if !script.is_multisig() {
        return None;
    }
    let mut pubkeys = Vec::new();
    for instruction in script.instructions() {
        if let Instruction::PushBytes(pk) = instruction.ok()? {
            if !is_pubkey(pk.as_bytes()) {
                return None;
            }
            pubkeys.push(pk.as_bytes());
        }
    }
    Some(pubkeys)
}

/// Concatenated data pushes following `OP_RETURN`.
fn op_return_data(script: &Script) -> Option<Vec<u8>> {
    if !script.is_op_return() {
        return None;
    }
    let mut data = Vec::new();
    for instruction in script.instructions().skip(1) {
        match instruction.ok()? {
            Instruction::PushBytes(push) => data.extend_from_slice(push.as_bytes()),
            Instruction::Op(_) => return None,
        }
    }
    Some(data)
}

fn op_return_text(data: Vec<u8>) -> String {
    let printable = !data.is_empty() && data.iter().all(|b| (0x20..0x7f).contains(b));
    if printable {
        format!("OP_RETURN ({})", String::from_utf8_lossy(&data))
    } else {
        format!("OP_RETURN {}", data.to_lower_hex_string())
    }
}
