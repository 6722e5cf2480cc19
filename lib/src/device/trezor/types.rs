// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Trezor session request and response messages
//!
//! These mirror the session library message shapes, byte fields are hex
//! encoded and transaction hashes use display (reversed) byte order.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use hwsigner_core::{
    bitcoin::{
        absolute::LockTime,
        bip32::Xpub,
        consensus::encode::serialize,
        transaction::Version,
        Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness,
    },
    xkey, Network,
};

use crate::Error;

/// Session library coin name for a network
///
/// Only main and testnet are recognised, other test networks use testnet.
pub fn coin_name(network: Network) -> &'static str {
    match network {
        Network::Main => "Bitcoin",
        _ => "Testnet",
    }
}

/// Address encoding network for a network
pub fn address_network(network: Network) -> hwsigner_core::bitcoin::Network {
    match network {
        Network::Main => hwsigner_core::bitcoin::Network::Bitcoin,
        _ => hwsigner_core::bitcoin::Network::Testnet,
    }
}

/// Input spend type
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InputScriptType {
    /// Legacy P2PKH
    SpendAddress,
    /// Legacy P2SH multisig
    SpendMultisig,
    /// Input not owned by this device
    External,
    /// Native witness
    SpendWitness,
    /// Witness nested in P2SH
    SpendP2shWitness,
}

/// Output type
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutputScriptType {
    PayToAddress,
    PayToOpReturn,
}

/// BIP32 node
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HDNodeType {
    pub depth: u32,
    /// Parent fingerprint
    pub fingerprint: u32,
    pub child_num: u32,
    pub chain_code: String,
    pub public_key: String,
}

impl HDNodeType {
    /// Build a node from an extended public key
    pub fn from_xpub(xpub: &Xpub) -> Self {
        let data = xpub.encode();

        Self {
            depth: xpub.depth as u32,
            fingerprint: u32::from_be_bytes([data[5], data[6], data[7], data[8]]),
            child_num: u32::from(xpub.child_number),
            chain_code: hex::encode(&data[13..45]),
            public_key: hex::encode(xpub.public_key.serialize()),
        }
    }

    /// Convert to an extended public key
    pub fn to_xpub(&self, network: Network) -> Result<Xpub, Error> {
        let depth = u8::try_from(self.depth).map_err(|_| Error::UnexpectedResponse)?;

        let mut chain_code = [0u8; 32];
        hex::decode_to_slice(&self.chain_code, &mut chain_code)
            .map_err(|_| Error::UnexpectedResponse)?;

        let public_key = hex::decode(&self.public_key)
            .ok()
            .and_then(|b| hwsigner_core::bitcoin::secp256k1::PublicKey::from_slice(&b).ok())
            .ok_or(Error::UnexpectedResponse)?;

        Ok(xkey::build_xpub(
            network,
            depth,
            self.fingerprint.to_be_bytes(),
            self.child_num,
            chain_code,
            &public_key,
        )?)
    }
}

/// Node and relative path for a multisig cosigner
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HDNodePathType {
    pub node: HDNodeType,
    pub address_n: Vec<u32>,
}

/// Multisig descriptor, `signatures` aligned with `pubkeys` (hex DER
/// without sighash type, empty where absent)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultisigRedeemScriptType {
    pub pubkeys: Vec<HDNodePathType>,
    pub signatures: Vec<String>,
    pub m: u32,
}

/// Transaction input
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInputType {
    pub address_n: Vec<u32>,
    pub prev_hash: String,
    pub prev_index: u32,
    pub script_type: InputScriptType,
    pub sequence: u32,
    /// Spent amount, required for witness inputs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multisig: Option<MultisigRedeemScriptType>,
}

impl TxInputType {
    /// Spent outpoint
    pub fn prevout(&self) -> Result<OutPoint, Error> {
        let txid = Txid::from_str(&self.prev_hash)
            .map_err(|_| Error::InvalidRequest(format!("invalid prev_hash {}", self.prev_hash)))?;
        Ok(OutPoint::new(txid, self.prev_index))
    }
}

/// Transaction output
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutputType {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub amount: u64,
    pub script_type: OutputScriptType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op_return_data: Option<String>,
}

/// Input of a reference transaction
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefTxInput {
    pub prev_hash: String,
    pub prev_index: u32,
    pub script_sig: String,
    pub sequence: u32,
}

/// Output of a reference transaction
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefTxOutput {
    pub amount: u64,
    pub script_pubkey: String,
}

/// Reference (previous) transaction for legacy inputs
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefTransaction {
    pub hash: String,
    pub version: i32,
    pub lock_time: u32,
    pub inputs: Vec<RefTxInput>,
    pub bin_outputs: Vec<RefTxOutput>,
    /// Witness data, hex per input, retained for txid recomputation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub witnesses: Vec<Vec<String>>,
}

impl From<&Transaction> for RefTransaction {
    fn from(tx: &Transaction) -> Self {
        let has_witness = tx.input.iter().any(|i| !i.witness.is_empty());

        Self {
            hash: tx.compute_txid().to_string(),
            version: tx.version.0,
            lock_time: tx.lock_time.to_consensus_u32(),
            inputs: tx
                .input
                .iter()
                .map(|i| RefTxInput {
                    prev_hash: i.previous_output.txid.to_string(),
                    prev_index: i.previous_output.vout,
                    script_sig: hex::encode(i.script_sig.as_bytes()),
                    sequence: i.sequence.0,
                })
                .collect(),
            bin_outputs: tx
                .output
                .iter()
                .map(|o| RefTxOutput {
                    amount: o.value.to_sat(),
                    script_pubkey: hex::encode(o.script_pubkey.as_bytes()),
                })
                .collect(),
            witnesses: match has_witness {
                true => tx
                    .input
                    .iter()
                    .map(|i| i.witness.iter().map(hex::encode).collect())
                    .collect(),
                false => vec![],
            },
        }
    }
}

impl TryFrom<&RefTransaction> for Transaction {
    type Error = Error;

    fn try_from(r: &RefTransaction) -> Result<Self, Self::Error> {
        let bad = |f: &str| Error::InvalidRequest(format!("invalid reference transaction {f}"));

        let mut input = Vec::with_capacity(r.inputs.len());
        for (n, i) in r.inputs.iter().enumerate() {
            let txid = Txid::from_str(&i.prev_hash).map_err(|_| bad("prev_hash"))?;
            let script_sig = hex::decode(&i.script_sig).map_err(|_| bad("script_sig"))?;

            let witness = match r.witnesses.get(n) {
                Some(w) => {
                    let items = w
                        .iter()
                        .map(hex::decode)
                        .collect::<Result<Vec<_>, _>>()
                        .map_err(|_| bad("witness"))?;
                    Witness::from_slice(&items)
                }
                None => Witness::new(),
            };

            input.push(TxIn {
                previous_output: OutPoint::new(txid, i.prev_index),
                script_sig: ScriptBuf::from_bytes(script_sig),
                sequence: Sequence(i.sequence),
                witness,
            });
        }

        let mut output = Vec::with_capacity(r.bin_outputs.len());
        for o in &r.bin_outputs {
            let script = hex::decode(&o.script_pubkey).map_err(|_| bad("script_pubkey"))?;
            output.push(TxOut {
                value: Amount::from_sat(o.amount),
                script_pubkey: ScriptBuf::from_bytes(script),
            });
        }

        let tx = Transaction {
            version: Version(r.version),
            lock_time: LockTime::from_consensus(r.lock_time),
            input,
            output,
        };

        if tx.compute_txid().to_string() != r.hash {
            return Err(bad("hash"));
        }

        Ok(tx)
    }
}

/// Transaction signing request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignTxRequest {
    pub coin: String,
    pub inputs: Vec<TxInputType>,
    pub outputs: Vec<TxOutputType>,
    #[serde(rename = "refTxs", default)]
    pub ref_txs: Vec<RefTransaction>,
    pub version: i32,
    pub lock_time: u32,
}

/// Transaction signing response
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignTxResponse {
    /// Hex DER signatures (without sighash type) aligned with inputs, empty
    /// for inputs not signed
    pub signatures: Vec<String>,
    /// Hex serialized transaction with scripts applied
    pub serialized_tx: String,
}

/// Public key response
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicNode {
    pub node: HDNodeType,
    pub xpub: String,
}

/// Message signature response
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSignature {
    pub address: String,
    /// Hex compact recoverable signature
    pub signature: String,
}

/// Serialize a transaction for a response
pub fn serialize_tx(tx: &Transaction) -> String {
    hex::encode(serialize(tx))
}
