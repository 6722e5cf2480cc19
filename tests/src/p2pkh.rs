// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Tests for legacy pay-to-pubkey-hash spends

use hwsigner::Signing;
use hwsigner_core::{verify::verify_transaction, Network};
use log::debug;

use crate::fixtures::*;

/// Sign a two-input P2PKH spend and check the result is script-valid
pub async fn test<D: Signing + ?Sized>(
    d: &D,
    phrase: &str,
    network: Network,
) -> anyhow::Result<()> {
    let master = master(phrase, network)?;
    let account = account_path(44, network, 0)?;

    let paths = [child_path(&account, 0, 0)?, child_path(&account, 0, 1)?];
    let s = single_key_spend(&master, network, &paths, p2pkh, false, true)?;

    // Unsigned spends must not verify
    assert!(verify_transaction(&s.tx, &s.spent).is_err());

    let signed = d.sign_transaction(&s.tx, &s.inputs).await?;
    debug!("signed: {}", signed.compute_txid());

    verify_transaction(&signed, &s.spent)?;

    // Only scripts change
    assert_eq!(signed.output, s.tx.output);
    for (a, b) in signed.input.iter().zip(s.tx.input.iter()) {
        assert_eq!(a.previous_output, b.previous_output);
        assert!(!a.script_sig.is_empty());
        assert!(a.witness.is_empty());
    }

    // Signatures align with inputs
    let sigs = d.get_signatures(&s.tx, &s.inputs).await?;
    assert_eq!(sigs.len(), s.tx.input.len());
    assert!(sigs.iter().all(|s| s.is_some()));

    Ok(())
}
