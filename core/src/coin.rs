// Copyright (c) 2022-2023 The MobileCoin Foundation

use bitcoin::{Amount, OutPoint, Script, ScriptBuf, Transaction, TxOut, Txid};
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::Error;

/// Output script classes relevant to signing
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum CoinType {
    PubkeyHash,
    ScriptHash,
    WitnessPubkeyHash,
    WitnessScriptHash,
    NullData,
    Nonstandard,
}

impl CoinType {
    /// Classify an output script
    pub fn from_script(script: &Script) -> Self {
        if script.is_p2pkh() {
            CoinType::PubkeyHash
        } else if script.is_p2sh() {
            CoinType::ScriptHash
        } else if script.is_p2wpkh() {
            CoinType::WitnessPubkeyHash
        } else if script.is_p2wsh() {
            CoinType::WitnessScriptHash
        } else if script.is_op_return() {
            CoinType::NullData
        } else {
            CoinType::Nonstandard
        }
    }

    /// Whether spends of this type are native segwit
    pub fn is_segwit(&self) -> bool {
        matches!(self, CoinType::WitnessPubkeyHash | CoinType::WitnessScriptHash)
    }
}

/// An unspent output being spent by a transaction input
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CoinJson", into = "CoinJson")]
pub struct Coin {
    pub outpoint: OutPoint,
    pub output: TxOut,
}

impl Coin {
    /// Create a coin from an outpoint and output
    pub fn new(outpoint: OutPoint, output: TxOut) -> Self {
        Self { outpoint, output }
    }

    /// Create a coin from output `vout` of a funding transaction
    pub fn from_tx(tx: &Transaction, vout: u32) -> Result<Self, Error> {
        let output = tx.output.get(vout as usize).cloned().ok_or_else(|| {
            Error::InvalidInput(format!(
                "output {vout} not found in {}",
                tx.compute_txid()
            ))
        })?;

        Ok(Self {
            outpoint: OutPoint::new(tx.compute_txid(), vout),
            output,
        })
    }

    /// Coin value
    pub fn value(&self) -> Amount {
        self.output.value
    }

    /// Coin output script
    pub fn script(&self) -> &ScriptBuf {
        &self.output.script_pubkey
    }

    /// Classify the coin output script
    pub fn coin_type(&self) -> CoinType {
        CoinType::from_script(&self.output.script_pubkey)
    }
}

/// JSON carry for [Coin]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct CoinJson {
    pub hash: Txid,
    pub index: u32,
    pub value: u64,
    pub script: String,
}

impl From<Coin> for CoinJson {
    fn from(c: Coin) -> Self {
        Self {
            hash: c.outpoint.txid,
            index: c.outpoint.vout,
            value: c.output.value.to_sat(),
            script: hex::encode(c.output.script_pubkey.as_bytes()),
        }
    }
}

impl TryFrom<CoinJson> for Coin {
    type Error = Error;

    fn try_from(c: CoinJson) -> Result<Self, Self::Error> {
        Ok(Self {
            outpoint: OutPoint::new(c.hash, c.index),
            output: TxOut {
                value: Amount::from_sat(c.value),
                script_pubkey: ScriptBuf::from_bytes(hex::decode(&c.script)?),
            },
        })
    }
}
