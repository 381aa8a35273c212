//! Transactions in the node's JSON representation.
//!
//! Amounts arrive as decimal text (a string or a JSON number whose text is
//! kept verbatim) and are converted to satoshis before the model is built.

use crate::params::ChainParams;
use crate::parser::error::{Error, Result};
use crate::parser::script::script_to_addresses;
use crate::parser::transaction::{Input, Output, Transaction};
use bitcoin::hashes::hex::FromHex;
use num_bigint::BigUint;
use serde::Deserialize;
use serde_json::Value;

/// Decimal places of one coin.
pub const AMOUNT_DECIMAL_POINT: usize = 8;

#[derive(Deserialize)]
struct JsonTx {
    #[serde(default)]
    hex: Option<String>,
    txid: String,
    version: i32,
    #[serde(rename = "locktime", default)]
    lock_time: u32,
    vin: Vec<JsonVin>,
    vout: Vec<JsonVout>,
}

#[derive(Deserialize)]
struct JsonVin {
    #[serde(default)]
    coinbase: Option<String>,
    #[serde(default)]
    txid: Option<String>,
    #[serde(default)]
    vout: Option<u32>,
    #[serde(rename = "scriptSig", default)]
    script_sig: Option<JsonScript>,
    sequence: u32,
}

#[derive(Deserialize)]
struct JsonVout {
    /// Temporary textual amount, dropped after conversion.
    value: Value,
    n: u32,
    #[serde(rename = "scriptPubKey")]
    script_pubkey: JsonScript,
}

#[derive(Deserialize)]
struct JsonScript {
    #[serde(default)]
    hex: String,
    #[serde(default)]
    addresses: Option<Vec<String>>,
}

/// Parses a JSON transaction.
pub fn parse_tx_from_json(msg: &str, params: &ChainParams) -> Result<Transaction> {
    let tx: JsonTx = serde_json::from_str(msg)?;

    let inputs = tx
        .vin
        .into_iter()
        .map(convert_input)
        .collect::<Result<Vec<_>>>()?;
    let outputs = tx
        .vout
        .into_iter()
        .map(|vout| convert_output(vout, params))
        .collect::<Result<Vec<_>>>()?;

    Ok(Transaction {
        txid: tx.txid,
        version: tx.version,
        lock_time: tx.lock_time,
        inputs,
        outputs,
        hex: tx.hex.filter(|h| !h.is_empty()),
    })
}

fn convert_input(vin: JsonVin) -> Result<Input> {
    if let Some(coinbase) = vin.coinbase {
        return Ok(Input::Coinbase {
            payload: Vec::from_hex(&coinbase)?,
            sequence: vin.sequence,
        });
    }
    let prev_txid = vin
        .txid
        .ok_or_else(|| Error::malformed("vin", "missing txid"))?;
    let prev_index = vin
        .vout
        .ok_or_else(|| Error::malformed("vin", "missing vout"))?;
    let script_sig = match vin.script_sig {
        Some(s) => Vec::from_hex(&s.hex)?,
        None => Vec::new(),
    };
    Ok(Input::Spend {
        prev_txid,
        prev_index,
        script_sig,
        sequence: vin.sequence,
    })
}

fn convert_output(vout: JsonVout, params: &ChainParams) -> Result<Output> {
    let text = match &vout.value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => return Err(Error::InvalidAmount(other.to_string())),
    };
    let value = amount_to_big_int(&text, AMOUNT_DECIMAL_POINT)?;
    let script_pubkey = Vec::from_hex(&vout.script_pubkey.hex)?;
    let (_, is_single_address) = script_to_addresses(&script_pubkey, params);
    Ok(Output {
        value,
        n: vout.n,
        script_pubkey,
        addresses: vout.script_pubkey.addresses.unwrap_or_default(),
        is_single_address,
    })
}

/// Converts a decimal amount to base units with `decimals` places.
///
/// Digits beyond `decimals` are truncated.
pub fn amount_to_big_int(amount: &str, decimals: usize) -> Result<BigUint> {
    let (int_part, frac_part) = match amount.split_once('.') {
        Some((i, f)) => (i, f),
        None => (amount, ""),
    };
    let is_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    let empty = int_part.is_empty() && frac_part.is_empty();
    if empty || !is_digits(int_part) || !is_digits(frac_part) {
        return Err(Error::InvalidAmount(amount.to_string()));
    }

    let mut digits = String::with_capacity(int_part.len() + decimals);
    digits.push_str(int_part);
    if frac_part.len() >= decimals {
        digits.push_str(&frac_part[..decimals]);
    } else {
        digits.push_str(frac_part);
        digits.extend(std::iter::repeat('0').take(decimals - frac_part.len()));
    }
    if digits.is_empty() {
        return Ok(BigUint::default());
    }
    BigUint::parse_bytes(digits.as_bytes(), 10)
        .ok_or_else(|| Error::InvalidAmount(amount.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> &'static ChainParams {
        crate::Network::Main.params()
    }

    #[test]
    fn test_amount_to_big_int() {
        let cases = [
            ("0", 0u64),
            ("0.00000001", 1),
            ("84.9257496", 8492574960),
            ("84.92574960", 8492574960),
            ("1", 100_000_000),
            ("1.", 100_000_000),
            (".5", 50_000_000),
            ("0.123456789", 12345678),
        ];
        for (text, want) in cases {
            assert_eq!(
                amount_to_big_int(text, AMOUNT_DECIMAL_POINT).unwrap(),
                BigUint::from(want),
                "amount {text}"
            );
        }
        assert_eq!(amount_to_big_int("12", 0).unwrap(), BigUint::from(12u32));
    }

    #[test]
    fn test_amount_beyond_u64() {
        let v = amount_to_big_int("1000000000000000.5", AMOUNT_DECIMAL_POINT).unwrap();
        assert_eq!(v.to_string(), "100000000000000050000000");
    }

    #[test]
    fn test_invalid_amounts() {
        for text in ["", ".", "-1", "1e-8", "1.2.3", "abc", " 1"] {
            assert!(
                matches!(
                    amount_to_big_int(text, AMOUNT_DECIMAL_POINT),
                    Err(Error::InvalidAmount(_))
                ),
                "amount {text:?}"
            );
        }
    }

    #[test]
    fn test_parse_tx_from_json() {
        let msg = r#"{
            "hex": "",
            "txid": "64f626e9f7ff3d37c1332f138f4abbb3624678e63f23111539cc4e385ac38655",
            "version": 1,
            "locktime": 0,
            "vin": [{
                "txid": "400522dec366e254b337f230794c4e824c7d23a01f8c1782c42a956624af9d85",
                "vout": 5,
                "scriptSig": {"asm": "", "hex": "0102"},
                "sequence": 4294967295
            }],
            "vout": [
                {"value": 0.00000000, "n": 0, "scriptPubKey": {"hex": ""}},
                {"value": 84.92574960, "n": 1, "scriptPubKey": {
                    "hex": "76a91434d5cd5bc462727c3f7ed1b28a0e3c65b43e5cd588ac",
                    "addresses": ["HBLVeZAwf7BNqUZLXcqFzUF3GLazvFfuMc"]
                }}
            ]
        }"#;
        let tx = parse_tx_from_json(msg, params()).unwrap();
        assert_eq!(tx.hex, None);
        assert_eq!(tx.outputs[0].value, BigUint::from(0u32));
        assert!(tx.outputs[0].addresses.is_empty());
        assert_eq!(tx.outputs[1].value, BigUint::from(8492574960u64));
        assert!(tx.outputs[1].is_single_address);
        assert_eq!(
            tx.inputs[0],
            Input::Spend {
                prev_txid: "400522dec366e254b337f230794c4e824c7d23a01f8c1782c42a956624af9d85"
                    .into(),
                prev_index: 5,
                script_sig: vec![1, 2],
                sequence: 0xFFFF_FFFF,
            }
        );
    }

    #[test]
    fn test_coinbase_and_string_amount() {
        let msg = r#"{
            "txid": "62b30b5b09da27ee57631b142fe9a0e87e098438710776ab01b617ee4939bee2",
            "version": 1,
            "locktime": 0,
            "vin": [{"coinbase": "03256d02", "sequence": 4294967295}],
            "vout": [{"value": "12.5", "n": 0, "scriptPubKey": {"hex": "6a"}}]
        }"#;
        let tx = parse_tx_from_json(msg, params()).unwrap();
        assert!(tx.is_coinbase());
        assert_eq!(tx.inputs[0].script(), &[0x03, 0x25, 0x6d, 0x02]);
        assert_eq!(tx.outputs[0].value, BigUint::from(1_250_000_000u64));
    }

    #[test]
    fn test_bad_json() {
        assert!(matches!(
            parse_tx_from_json("{", params()),
            Err(Error::Json(_))
        ));
        let msg = r#"{"txid": "00", "version": 1, "vin": [],
            "vout": [{"value": true, "n": 0, "scriptPubKey": {"hex": ""}}]}"#;
        assert!(matches!(
            parse_tx_from_json(msg, params()),
            Err(Error::InvalidAmount(_))
        ));
    }
}
