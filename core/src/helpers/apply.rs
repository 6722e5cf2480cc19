// Copyright (c) 2022-2023 The MobileCoin Foundation

use bitcoin::{
    ecdsa,
    script::{Builder, Instruction, ScriptBuf},
    Transaction, Witness,
};
use log::debug;

use super::{input_index, push_bytes, Keyring, KeyringKind};
use crate::{Error, InputData};

/// Apply a signature for a single-key input (P2PKH, P2WPKH, P2SH-P2WPKH)
pub fn apply_single(
    tx: &mut Transaction,
    index: usize,
    ring: &Keyring,
    sig: &ecdsa::Signature,
) -> Result<(), Error> {
    let input = tx
        .input
        .get_mut(index)
        .ok_or_else(|| Error::Consistency(format!("input {index} out of range")))?;

    let sig = sig.to_vec();
    let pk = ring.public_key().to_bytes();

    match ring.kind() {
        KeyringKind::PubkeyHash => {
            input.script_sig = Builder::new()
                .push_slice(push_bytes(&sig)?)
                .push_slice(push_bytes(&pk)?)
                .into_script();
            input.witness = Witness::new();
        }
        KeyringKind::WitnessPubkeyHash | KeyringKind::NestedWitnessPubkeyHash => {
            input.script_sig = match ring.nested_program()? {
                Some(p) => Builder::new().push_slice(push_bytes(p.as_bytes())?).into_script(),
                None => ScriptBuf::new(),
            };
            input.witness = Witness::from_slice(&[sig, pk]);
        }
        k => {
            return Err(Error::InvalidInput(format!(
                "{k} keyring requires multisig application"
            )))
        }
    }

    Ok(())
}

/// Apply a signature into the multisig template for an input
///
/// Signatures are slotted by the position of `ring`'s key in the redeem
/// script, existing signatures are kept. Once `m` signatures are present
/// the template is finalised, placeholders are removed and the first `m`
/// signatures in key order retained. Returns whether the input is complete.
pub fn apply_multisig(
    tx: &mut Transaction,
    index: usize,
    ring: &Keyring,
    sig: &ecdsa::Signature,
) -> Result<bool, Error> {
    let redeem = ring
        .redeem()
        .ok_or_else(|| Error::InvalidInput(format!("{} keyring is not multisig", ring.kind())))?
        .to_owned();

    let slot = ring
        .keys()
        .iter()
        .position(|k| k == ring.public_key())
        .ok_or_else(|| Error::InvalidInput("signing key not in redeem script".to_string()))?;

    let input = tx
        .input
        .get_mut(index)
        .ok_or_else(|| Error::Consistency(format!("input {index} out of range")))?;

    let n = ring.keys().len();
    let m = ring.m();

    // Read existing template state
    let items: Vec<Vec<u8>> = match ring.is_witness() {
        true => input.witness.to_vec(),
        false => {
            let mut items = Vec::new();
            for i in input.script_sig.instructions() {
                match i.map_err(|e| Error::InvalidInput(e.to_string()))? {
                    Instruction::PushBytes(b) => items.push(b.as_bytes().to_vec()),
                    Instruction::Op(op) => {
                        return Err(Error::InvalidInput(format!(
                            "unexpected {op:?} in multisig script_sig"
                        )))
                    }
                }
            }
            items
        }
    };

    let mut slots: Vec<Option<Vec<u8>>> = match items.len() {
        0 => vec![None; n],
        l if l == n + 2 && items[l - 1] == redeem.as_bytes() => items[1..=n]
            .iter()
            .map(|s| match s.is_empty() {
                true => None,
                false => Some(s.clone()),
            })
            .collect(),
        _ => {
            debug!("input {index} multisig already finalised");
            return Ok(true);
        }
    };

    slots[slot] = Some(sig.to_vec());

    let filled = slots.iter().filter(|s| s.is_some()).count();
    let complete = filled >= m;

    let stack: Vec<Vec<u8>> = match complete {
        true => slots.into_iter().flatten().take(m).collect(),
        false => slots.into_iter().map(|s| s.unwrap_or_default()).collect(),
    };

    match ring.is_witness() {
        true => {
            let mut w = Witness::new();
            w.push(Vec::<u8>::new());
            for s in &stack {
                w.push(s);
            }
            w.push(redeem.as_bytes());

            input.witness = w;
            input.script_sig = match ring.nested_program()? {
                Some(p) => Builder::new().push_slice(push_bytes(p.as_bytes())?).into_script(),
                None => ScriptBuf::new(),
            };
        }
        false => {
            let mut b = Builder::new().push_slice(push_bytes(&[])?);
            for s in &stack {
                b = b.push_slice(push_bytes(s)?);
            }
            input.script_sig = b.push_slice(push_bytes(redeem.as_bytes())?).into_script();
            input.witness = Witness::new();
        }
    }

    Ok(complete)
}

/// Apply every cosigner signature carried in the input data's multisig
/// descriptor
pub fn apply_cosigner_signatures(tx: &mut Transaction, input: &InputData) -> Result<(), Error> {
    let multisig = match input.multisig() {
        Some(m) => m,
        None => return Ok(()),
    };

    let index = input_index(tx, input)?;

    for (info, sig) in multisig.signatures() {
        let ring = Keyring::new(input, info.derive()?)?;
        apply_multisig(tx, index, &ring, sig)?;
    }

    Ok(())
}

/// Copy scripts and witnesses from `source` into `target`
///
/// Both transactions must spend identical prevouts in identical order.
pub fn apply_scripts(target: &mut Transaction, source: &Transaction) -> Result<(), Error> {
    if target.input.len() != source.input.len() {
        return Err(Error::Consistency(format!(
            "input count mismatch ({} != {})",
            target.input.len(),
            source.input.len()
        )));
    }

    for (i, (t, s)) in target.input.iter().zip(source.input.iter()).enumerate() {
        if t.previous_output != s.previous_output {
            return Err(Error::Consistency(format!(
                "input {i} prevout mismatch ({} != {})",
                t.previous_output, s.previous_output
            )));
        }
    }

    for (t, s) in target.input.iter_mut().zip(source.input.iter()) {
        t.script_sig = s.script_sig.clone();
        t.witness = s.witness.clone();
    }

    Ok(())
}
