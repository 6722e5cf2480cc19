// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Tests for m-of-n multisig spends across independent signers
//!
//! Each cosigner signs independently via `get_signatures`, signatures are
//! then merged into the redeem script template and the result verified.

use hwsigner::Signing;
use hwsigner_core::{
    bitcoin::{Amount, ScriptBuf, Transaction},
    helpers::{apply_cosigner_signatures, p2sh, p2wsh, redeem_script},
    input_data::PrevTx,
    verify::verify_transaction,
    xkey, Coin, InputData, InputDataOptions, Multisig, Network, PublicKeyInfo,
};
use log::debug;
use strum::{Display, EnumIter, EnumString};

use crate::fixtures::*;

/// Redeem script wrapping
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, EnumString, EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum Wrapping {
    /// P2SH
    Legacy,
    /// P2WSH
    Witness,
    /// P2SH-P2WSH
    Nested,
}

impl Wrapping {
    pub fn script(&self, redeem: &ScriptBuf) -> ScriptBuf {
        match self {
            Wrapping::Legacy => p2sh(redeem),
            Wrapping::Witness => p2wsh(redeem),
            Wrapping::Nested => p2sh(&p2wsh(redeem)),
        }
    }

    pub fn witness(&self) -> bool {
        *self != Wrapping::Legacy
    }
}

/// Sign an n-of-n spend with every cosigner and check the merged
/// transaction carries exactly n signatures in key order
pub async fn test<D: Signing + ?Sized>(
    cosigners: &[&D],
    network: Network,
    wrap: Wrapping,
) -> anyhow::Result<()> {
    let n = cosigners.len();
    let account = account_path(48, network, 0)?;
    let path = child_path(&account, 0, 0)?;

    // Account keys as reported by each cosigner
    let mut pubkeys = Vec::with_capacity(n);
    for d in cosigners {
        let xpub = d.get_public_key(&account, true).await?;
        pubkeys.push(PublicKeyInfo::new(xkey::encode_xpub(&xpub, network), &[0, 0]));
    }

    let multisig = Multisig::new(n, pubkeys)?;
    let redeem = redeem_script(&multisig)?;

    let fund = funding_tx(wrap.script(&redeem), Amount::from_sat(50_000_000), 3);
    let coin = Coin::from_tx(&fund, 0)?;
    let tx = spend_tx(&[&coin], p2sh(&redeem));

    let input = InputData::new(InputDataOptions {
        path: Some(path),
        witness: wrap.witness(),
        coin: Some(coin.clone()),
        prev_tx: Some(PrevTx::Tx(fund)),
        multisig: Some(multisig.clone()),
        ..Default::default()
    })?;

    // Collect signatures independently
    let mut merged = multisig;
    for (i, d) in cosigners.iter().enumerate() {
        let sigs = d.get_signatures(&tx, &[input.clone()]).await?;
        assert_eq!(sigs.len(), 1);

        let sig = sigs[0]
            .ok_or_else(|| anyhow::anyhow!("cosigner {i} returned no signature"))?;
        debug!("cosigner {i}: {}", sig);

        merged.pubkeys[i].signature = Some(sig);
    }

    let input = input.with_multisig(merged)?;

    let mut signed = tx.clone();
    apply_cosigner_signatures(&mut signed, &input)?;

    verify_transaction(&signed, &[coin.output.clone()])?;

    let sigs = signatures(&signed, wrap);
    assert_eq!(sigs.len(), n, "expected {n} signatures");
    for (i, s) in sigs.iter().enumerate() {
        assert!(!sigs[..i].contains(s), "duplicate signature");
    }

    Ok(())
}

/// Sign with the last cosigner after merging the others' signatures into
/// the input data, the device completes the template
pub async fn test_complete<D: Signing + ?Sized>(
    cosigners: &[&D],
    network: Network,
    wrap: Wrapping,
) -> anyhow::Result<Transaction> {
    let n = cosigners.len();
    let account = account_path(48, network, 0)?;
    let path = child_path(&account, 0, 1)?;

    let mut pubkeys = Vec::with_capacity(n);
    for d in cosigners {
        let xpub = d.get_public_key(&account, true).await?;
        pubkeys.push(PublicKeyInfo::new(xkey::encode_xpub(&xpub, network), &[0, 1]));
    }

    let multisig = Multisig::new(n, pubkeys)?;
    let redeem = redeem_script(&multisig)?;

    let fund = funding_tx(wrap.script(&redeem), Amount::from_sat(20_000_000), 4);
    let coin = Coin::from_tx(&fund, 0)?;
    let tx = spend_tx(&[&coin], p2sh(&redeem));

    let mut input = InputData::new(InputDataOptions {
        path: Some(path),
        witness: wrap.witness(),
        coin: Some(coin.clone()),
        prev_tx: Some(PrevTx::Tx(fund)),
        multisig: Some(multisig.clone()),
        ..Default::default()
    })?;

    let (last, others) = cosigners
        .split_last()
        .ok_or_else(|| anyhow::anyhow!("no cosigners"))?;

    let mut merged = multisig;
    for (i, d) in others.iter().enumerate() {
        let sigs = d.get_signatures(&tx, &[input.clone()]).await?;
        merged.pubkeys[i].signature = sigs[0];
    }
    input = input.with_multisig(merged)?;

    let signed = last.sign_transaction(&tx, &[input]).await?;

    verify_transaction(&signed, &[coin.output.clone()])?;
    assert_eq!(signatures(&signed, wrap).len(), n);

    Ok(signed)
}

/// Non-empty signature pushes for the first input
fn signatures(tx: &Transaction, wrap: Wrapping) -> Vec<Vec<u8>> {
    let i = &tx.input[0];

    let elements: Vec<Vec<u8>> = match wrap {
        Wrapping::Legacy => i
            .script_sig
            .instructions()
            .filter_map(|i| i.ok().and_then(|i| i.push_bytes().map(|b| b.as_bytes().to_vec())))
            .collect(),
        _ => i.witness.iter().map(|w| w.to_vec()).collect(),
    };

    // Drop the leading dummy and trailing redeem script
    match elements.len() {
        0..=2 => vec![],
        l => elements[1..l - 1]
            .iter()
            .filter(|e| !e.is_empty())
            .cloned()
            .collect(),
    }
}
