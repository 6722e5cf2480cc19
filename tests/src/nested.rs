// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Tests for nested witness (P2SH-P2WPKH) spends

use hwsigner::Signing;
use hwsigner_core::{
    bitcoin::{PublicKey, ScriptBuf},
    helpers::{is_nested, p2sh},
    verify::verify_transaction,
    Network,
};

use crate::fixtures::*;

fn p2sh_p2wpkh(pk: &PublicKey) -> ScriptBuf {
    p2sh(&p2wpkh(pk))
}

/// Sign a P2SH-P2WPKH spend and check the result is script-valid
pub async fn test<D: Signing + ?Sized>(
    d: &D,
    phrase: &str,
    network: Network,
) -> anyhow::Result<()> {
    let master = master(phrase, network)?;
    let account = account_path(49, network, 0)?;

    let paths = [child_path(&account, 0, 2)?];
    let s = single_key_spend(&master, network, &paths, p2sh_p2wpkh, true, false)?;

    let coin = s.inputs[0].coin();
    assert!(is_nested(coin.script(), None, true));

    let signed = d.sign_transaction(&s.tx, &s.inputs).await?;

    verify_transaction(&signed, &s.spent)?;

    // Redeem program in the script sig, signature and key in the witness
    let (_, pk) = key_at(&master, &paths[0])?;
    let program = p2wpkh(&pk);
    let pushed: Vec<_> = signed.input[0]
        .script_sig
        .instructions()
        .filter_map(|i| i.ok().and_then(|i| i.push_bytes().map(|b| b.as_bytes().to_vec())))
        .collect();
    assert_eq!(pushed, vec![program.to_bytes()]);
    assert_eq!(signed.input[0].witness.len(), 2);

    Ok(())
}
