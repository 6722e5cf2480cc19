// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Tests for native witness (P2WPKH) spends

use hwsigner::Signing;
use hwsigner_core::{
    bitcoin::{Amount, TxOut},
    verify::{verify_input, verify_transaction},
    Network,
};

use crate::fixtures::*;

/// Sign a P2WPKH spend without previous transactions and check BIP143
/// validity
pub async fn test<D: Signing + ?Sized>(
    d: &D,
    phrase: &str,
    network: Network,
) -> anyhow::Result<()> {
    let master = master(phrase, network)?;
    let account = account_path(84, network, 0)?;

    let paths = [child_path(&account, 0, 0)?, child_path(&account, 0, 5)?];
    let s = single_key_spend(&master, network, &paths, p2wpkh, true, false)?;

    let signed = d.sign_transaction(&s.tx, &s.inputs).await?;

    verify_transaction(&signed, &s.spent)?;

    for i in &signed.input {
        assert!(i.script_sig.is_empty());
        assert_eq!(i.witness.len(), 2);
    }

    // Signatures commit to the spent value
    let wrong = TxOut {
        value: Amount::from_sat(s.spent[0].value.to_sat() - 1),
        ..s.spent[0].clone()
    };
    assert!(verify_input(&signed, 0, &wrong).is_err());

    Ok(())
}
