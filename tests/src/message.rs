// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Tests for Bitcoin signed-message signatures

use hwsigner::Signing;
use hwsigner_core::{signing::verify_message, Network};

use crate::fixtures::*;

/// Messages signed per device
pub const MESSAGES: &[&[u8]] = &[b"hello world", b"", &[0xab; 300]];

/// Sign messages and check they recover to the expected key
pub async fn test<D: Signing + ?Sized>(
    d: &D,
    phrase: &str,
    network: Network,
) -> anyhow::Result<()> {
    let master = master(phrase, network)?;
    let path = child_path(&account_path(44, network, 0)?, 0, 0)?;
    let (_, pk) = key_at(&master, &path)?;

    for m in MESSAGES {
        let sig = d.sign_message(&path, m).await?;

        assert!(
            verify_message(m, &sig, &pk.inner)?,
            "signature for {} byte message does not recover",
            m.len()
        );

        // Different message, different key
        assert!(!verify_message(b"other", &sig, &pk.inner)?);
    }

    Ok(())
}
