// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Build session signing requests from transactions and input data

use std::collections::BTreeMap;

use log::trace;

use hwsigner_core::{
    bitcoin::{script::Instruction, Address, Transaction, TxIn, TxOut},
    helpers::{input_map, match_inputs},
    xkey, CoinType, InputData, Multisig, Network,
};

use super::types::*;
use crate::Error;

/// Map an input to its session request form
pub fn build_input(txin: &TxIn, input: Option<&InputData>) -> Result<TxInputType, Error> {
    let mut r = TxInputType {
        address_n: vec![],
        prev_hash: txin.previous_output.txid.to_string(),
        prev_index: txin.previous_output.vout,
        script_type: InputScriptType::External,
        sequence: txin.sequence.0,
        amount: None,
        multisig: None,
    };

    let input = match input {
        Some(i) => i,
        None => return Ok(r),
    };

    r.address_n = input.path().to_list();

    let witness_amount = Some(input.value().to_sat());

    match (input.coin_type(), input.witness(), input.multisig()) {
        (CoinType::PubkeyHash, _, None) => {
            r.script_type = InputScriptType::SpendAddress;
        }
        (CoinType::WitnessPubkeyHash, _, None) => {
            r.script_type = InputScriptType::SpendWitness;
            r.amount = witness_amount;
        }
        (CoinType::ScriptHash, true, multisig) => {
            r.script_type = InputScriptType::SpendP2shWitness;
            r.amount = witness_amount;
            r.multisig = multisig.map(build_multisig).transpose()?;
        }
        (CoinType::ScriptHash, false, Some(multisig)) => {
            r.script_type = InputScriptType::SpendMultisig;
            r.multisig = Some(build_multisig(multisig)?);
        }
        (CoinType::WitnessScriptHash, _, _) => {
            return Err(Error::UnsupportedInput(format!(
                "witness script hash input {} not supported",
                input.key()
            )))
        }
        (t, _, _) => {
            return Err(Error::UnsupportedInput(format!(
                "{t} input {} not supported",
                input.key()
            )))
        }
    }

    Ok(r)
}

/// Map a multisig descriptor, cosigners are ordered to match the redeem
/// script
pub fn build_multisig(multisig: &Multisig) -> Result<MultisigRedeemScriptType, Error> {
    let mut keys = Vec::with_capacity(multisig.n());

    for k in &multisig.pubkeys {
        let (_n, xpub) = xkey::parse_xpub(&k.xpub)?;
        let derived = k.derive()?;

        keys.push((
            derived.to_bytes(),
            HDNodePathType {
                node: HDNodeType::from_xpub(&xpub),
                address_n: k.path.clone(),
            },
            k.signature
                .map(|s| hex::encode(s.signature.serialize_der()))
                .unwrap_or_default(),
        ));
    }

    keys.sort_by(|a, b| a.0.cmp(&b.0));

    let (pubkeys, signatures) = keys.into_iter().map(|(_, p, s)| (p, s)).unzip();

    Ok(MultisigRedeemScriptType {
        pubkeys,
        signatures,
        m: multisig.m as u32,
    })
}

/// Map an output to its session request form
pub fn build_output(o: &TxOut, network: Network) -> Result<TxOutputType, Error> {
    let script = &o.script_pubkey;

    if script.is_op_return() {
        let mut data = Vec::new();
        for i in script.instructions().skip(1) {
            match i {
                Ok(Instruction::PushBytes(b)) => data.extend_from_slice(b.as_bytes()),
                _ => {
                    return Err(Error::UnsupportedInput(format!(
                        "unsupported null data output {script}"
                    )))
                }
            }
        }

        return Ok(TxOutputType {
            address: None,
            amount: o.value.to_sat(),
            script_type: OutputScriptType::PayToOpReturn,
            op_return_data: Some(hex::encode(data)),
        });
    }

    let address = Address::from_script(script, address_network(network))
        .map_err(|_| Error::UnsupportedInput(format!("unsupported output script {script}")))?;

    Ok(TxOutputType {
        address: Some(address.to_string()),
        amount: o.value.to_sat(),
        script_type: OutputScriptType::PayToAddress,
        op_return_data: None,
    })
}

/// Build a signing request for `tx`
///
/// Inputs without input data are passed as external inputs. Legacy inputs
/// require the previous transaction, which is attached as a reference
/// transaction.
pub fn build_request(
    tx: &Transaction,
    inputs: &[InputData],
    network: Network,
) -> Result<SignTxRequest, Error> {
    let map = input_map(inputs)?;

    let mut req_inputs = Vec::with_capacity(tx.input.len());
    let mut ref_txs = BTreeMap::new();

    for (txin, input) in tx.input.iter().zip(match_inputs(tx, &map)) {
        let r = build_input(txin, input)?;

        let legacy = matches!(
            r.script_type,
            InputScriptType::SpendAddress | InputScriptType::SpendMultisig
        );

        if let (true, Some(input)) = (legacy, input) {
            let prev_tx = input.prev_tx().ok_or_else(|| {
                Error::InvalidRequest(format!(
                    "previous transaction required for legacy input {}",
                    input.key()
                ))
            })?;

            let rt = RefTransaction::from(prev_tx);
            ref_txs.insert(rt.hash.clone(), rt);
        }

        trace!("input {}:{} as {}", r.prev_hash, r.prev_index, r.script_type);
        req_inputs.push(r);
    }

    let outputs = tx
        .output
        .iter()
        .map(|o| build_output(o, network))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(SignTxRequest {
        coin: coin_name(network).to_string(),
        inputs: req_inputs,
        outputs,
        ref_txs: ref_txs.into_values().collect(),
        version: tx.version.0,
        lock_time: tx.lock_time.to_consensus_u32(),
    })
}
