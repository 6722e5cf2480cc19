// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Script verification for signed inputs
//!
//! Supports the standard templates produced by the signing helpers:
//! P2PKH, P2WPKH, P2SH-P2WPKH and bare multisig under P2SH, P2WSH and
//! P2SH-P2WSH. Signatures are checked against recomputed sighashes, multisig
//! signatures must appear in key order as `OP_CHECKMULTISIG` requires.

use bitcoin::{
    ecdsa,
    script::Instruction,
    CompressedPublicKey, PublicKey, Script, ScriptBuf, Transaction, TxOut,
};

use crate::{
    helpers::{p2sh, p2wsh, parse_multisig},
    secp,
    signing::signature_hash,
    Error,
};

/// Verify every input of `tx` against the outputs it spends
pub fn verify_transaction(tx: &Transaction, spent: &[TxOut]) -> Result<(), Error> {
    if spent.len() != tx.input.len() {
        return Err(Error::Consistency(format!(
            "expected {} spent outputs, got {}",
            tx.input.len(),
            spent.len()
        )));
    }

    for (i, o) in spent.iter().enumerate() {
        verify_input(tx, i, o)?;
    }

    Ok(())
}

/// Verify a single input against the output it spends
pub fn verify_input(tx: &Transaction, index: usize, spent: &TxOut) -> Result<(), Error> {
    let fail = |reason: &str| Error::ScriptVerify {
        index,
        reason: reason.to_string(),
    };

    let input = tx.input.get(index).ok_or_else(|| fail("input out of range"))?;
    let spk = &spent.script_pubkey;
    let witness = input.witness.to_vec();

    if spk.is_p2pkh() {
        let items = pushes(&input.script_sig).map_err(|e| fail(&e))?;
        if items.len() != 2 || !witness.is_empty() {
            return Err(fail("malformed p2pkh spend"));
        }

        let pk = PublicKey::from_slice(&items[1]).map_err(|e| fail(&e.to_string()))?;
        if ScriptBuf::new_p2pkh(&pk.pubkey_hash()) != *spk {
            return Err(fail("public key hash mismatch"));
        }

        return check_sig(tx, index, spk, spent, false, &items[0], &pk).map_err(|e| fail(&e));
    }

    if spk.is_p2wpkh() {
        if !input.script_sig.is_empty() {
            return Err(fail("non-empty script_sig for native witness spend"));
        }
        return verify_wpkh(tx, index, spent, &witness).map_err(|e| fail(&e));
    }

    if spk.is_p2wsh() {
        if !input.script_sig.is_empty() {
            return Err(fail("non-empty script_sig for native witness spend"));
        }
        return verify_wsh(tx, index, spent, &witness).map_err(|e| fail(&e));
    }

    if spk.is_p2sh() {
        let items = pushes(&input.script_sig).map_err(|e| fail(&e))?;
        let redeem = match items.last() {
            Some(r) => ScriptBuf::from_bytes(r.clone()),
            None => return Err(fail("missing redeem script")),
        };

        if p2sh(&redeem) != *spk {
            return Err(fail("redeem script hash mismatch"));
        }

        if redeem.is_p2wpkh() && items.len() == 1 {
            let nested = TxOut {
                value: spent.value,
                script_pubkey: redeem,
            };
            return verify_wpkh(tx, index, &nested, &witness).map_err(|e| fail(&e));
        }

        if redeem.is_p2wsh() && items.len() == 1 {
            let nested = TxOut {
                value: spent.value,
                script_pubkey: redeem,
            };
            return verify_wsh(tx, index, &nested, &witness).map_err(|e| fail(&e));
        }

        if !witness.is_empty() {
            return Err(fail("unexpected witness for legacy p2sh spend"));
        }

        return check_multisig(tx, index, &redeem, spent, false, &items[..items.len() - 1])
            .map_err(|e| fail(&e));
    }

    Err(fail("unsupported output script"))
}

fn verify_wpkh(tx: &Transaction, index: usize, spent: &TxOut, witness: &[Vec<u8>]) -> Result<(), String> {
    if witness.len() != 2 {
        return Err("malformed p2wpkh witness".to_string());
    }

    let pk = CompressedPublicKey::from_slice(&witness[1]).map_err(|e| e.to_string())?;
    if ScriptBuf::new_p2wpkh(&pk.wpubkey_hash()) != spent.script_pubkey {
        return Err("witness public key hash mismatch".to_string());
    }

    let script_code = ScriptBuf::new_p2pkh(&pk.pubkey_hash());
    check_sig(tx, index, &script_code, spent, true, &witness[0], &PublicKey::new(pk.0))
}

fn verify_wsh(tx: &Transaction, index: usize, spent: &TxOut, witness: &[Vec<u8>]) -> Result<(), String> {
    let ws = match witness.last() {
        Some(w) => ScriptBuf::from_bytes(w.clone()),
        None => return Err("empty witness".to_string()),
    };

    if p2wsh(&ws) != spent.script_pubkey {
        return Err("witness script hash mismatch".to_string());
    }

    check_multisig(tx, index, &ws, spent, true, &witness[..witness.len() - 1])
}

/// CHECKMULTISIG over `stack` (dummy element then signatures)
fn check_multisig(
    tx: &Transaction,
    index: usize,
    script: &Script,
    spent: &TxOut,
    witness: bool,
    stack: &[Vec<u8>],
) -> Result<(), String> {
    let (m, keys) = parse_multisig(script).map_err(|e| e.to_string())?;

    match stack.first() {
        Some(d) if d.is_empty() => (),
        _ => return Err("missing multisig dummy element".to_string()),
    }

    let sigs = &stack[1..];
    if sigs.len() != m {
        return Err(format!("expected {m} signatures, found {}", sigs.len()));
    }

    // Each signature must match a key at or after the previous match
    let mut k = 0;
    for s in sigs {
        loop {
            if k >= keys.len() {
                return Err("signature does not match any remaining key".to_string());
            }
            let ok = check_sig(tx, index, script, spent, witness, s, &keys[k]).is_ok();
            k += 1;
            if ok {
                break;
            }
        }
    }

    Ok(())
}

fn check_sig(
    tx: &Transaction,
    index: usize,
    script_code: &Script,
    spent: &TxOut,
    witness: bool,
    sig: &[u8],
    pk: &PublicKey,
) -> Result<(), String> {
    let sig = ecdsa::Signature::from_slice(sig).map_err(|e| e.to_string())?;

    let msg = signature_hash(tx, index, script_code, spent.value, witness, sig.sighash_type)
        .map_err(|e| e.to_string())?;

    secp()
        .verify_ecdsa(&msg, &sig.signature, &pk.inner)
        .map_err(|e| e.to_string())
}

/// Collect script_sig push data, rejecting non-push opcodes
fn pushes(script: &Script) -> Result<Vec<Vec<u8>>, String> {
    let mut items = Vec::new();
    for i in script.instructions() {
        match i.map_err(|e| e.to_string())? {
            Instruction::PushBytes(b) => items.push(b.as_bytes().to_vec()),
            Instruction::Op(op) => return Err(format!("non-push opcode {op:?} in script_sig")),
        }
    }
    Ok(items)
}
