// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Vendor-independent signing helpers
//!
//! Input lookup, redeem script synthesis, keyring construction and the
//! template / apply step used to merge signatures into transactions.

use std::collections::HashMap;

use bitcoin::{
    hashes::Hash,
    script::{PushBytesBuf, ScriptBuf},
    OutPoint, Script, ScriptHash, Transaction, WScriptHash,
};

use crate::{Error, InputData};

mod keyring;
pub use keyring::{Keyring, KeyringKind};

mod multisig;
pub use multisig::{cosigner_keys, parse_multisig, redeem_script, sort_keys};

mod apply;
pub use apply::{apply_cosigner_signatures, apply_multisig, apply_scripts, apply_single};

/// Input data indexed by spent outpoint
pub type InputMap<'a> = HashMap<OutPoint, &'a InputData>;

/// Build an input lookup keyed by spent outpoint
pub fn input_map(inputs: &[InputData]) -> Result<InputMap<'_>, Error> {
    let mut map = HashMap::with_capacity(inputs.len());

    for i in inputs {
        if map.insert(i.key(), i).is_some() {
            return Err(Error::InvalidInput(format!("duplicate input {}", i.key())));
        }
    }

    Ok(map)
}

/// Locate the transaction input index spending `input`
pub fn input_index(tx: &Transaction, input: &InputData) -> Result<usize, Error> {
    tx.input
        .iter()
        .position(|i| i.previous_output == input.key())
        .ok_or_else(|| {
            Error::Consistency(format!("transaction does not spend {}", input.key()))
        })
}

/// Pair each transaction input with its input data (if any)
pub fn match_inputs<'a>(
    tx: &Transaction,
    map: &InputMap<'a>,
) -> Vec<Option<&'a InputData>> {
    tx.input
        .iter()
        .map(|i| map.get(&i.previous_output).copied())
        .collect()
}

/// P2SH output script for a redeem script
pub fn p2sh(redeem: &Script) -> ScriptBuf {
    ScriptBuf::new_p2sh(&ScriptHash::hash(redeem.as_bytes()))
}

/// P2WSH output script for a witness script
pub fn p2wsh(witness_script: &Script) -> ScriptBuf {
    ScriptBuf::new_p2wsh(&WScriptHash::hash(witness_script.as_bytes()))
}

/// Whether a scripthash coin nests a v0 witness program for this input
pub fn is_nested(coin: &Script, redeem: Option<&Script>, witness: bool) -> bool {
    if !coin.is_p2sh() || !witness {
        return false;
    }

    match redeem {
        Some(r) => coin == p2sh(&p2wsh(r)).as_script(),
        None => true,
    }
}

/// Whether a coin is a native witness output
pub fn is_segwit(coin: &Script) -> bool {
    coin.is_p2wpkh() || coin.is_p2wsh()
}

pub(crate) fn push_bytes(b: &[u8]) -> Result<PushBytesBuf, Error> {
    PushBytesBuf::try_from(b.to_vec())
        .map_err(|_| Error::InvalidInput(format!("push of {} bytes exceeds limit", b.len())))
}
