// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Tests for extended public key derivation

use hwsigner::Signing;
use hwsigner_core::{xkey, Network, Path};
use log::debug;

use crate::fixtures::*;

/// Account purposes checked per device
pub const PURPOSES: &[u32] = &[44, 48, 49, 84];

/// Check account and child public keys match software derivation
pub async fn test<D: Signing + ?Sized>(
    d: &D,
    phrase: &str,
    network: Network,
) -> anyhow::Result<()> {
    let master = master(phrase, network)?;

    for purpose in PURPOSES {
        let path = account_path(*purpose, network, 0)?;
        let expected = xpub_at(&master, &path)?;

        let xpub = d.get_public_key(&path, true).await?;
        debug!("{path}: {}", xkey::encode_xpub(&xpub, network));

        assert!(xkey::same_key(&xpub, &expected), "key mismatch at {path}");
        assert_eq!(xpub.depth, 3, "depth mismatch at {path}");
        assert_eq!(
            xpub.parent_fingerprint, expected.parent_fingerprint,
            "parent fingerprint mismatch at {path}"
        );

        // Leaves below the account
        let child = child_path(&path, 0, 7)?;
        let xpub = d.get_public_key(&child, false).await?;
        assert!(
            xkey::same_key(&xpub, &xpub_at(&master, &child)?),
            "key mismatch at {child}"
        );
    }

    // Fixture for the default mnemonic
    if phrase == MNEMONIC {
        let (fixture, p) = match network {
            Network::Main => (ACCOUNT_XPUB_MAIN, "m/44'/0'/0'"),
            _ => (ACCOUNT_XPUB_TEST, "m/44'/1'/0'"),
        };

        let xpub = d.get_public_key(&path(p)?, true).await?;
        let (_, expected) = xkey::parse_xpub(fixture)?;
        assert!(xkey::same_key(&xpub, &expected), "fixture mismatch at {p}");

        if network == Network::Main || network == Network::Testnet {
            assert_eq!(xkey::encode_xpub(&xpub, network), fixture);
        }
    }

    Ok(())
}

/// Check the account path recovered from an account key
pub async fn account_path_from_key<D: Signing + ?Sized>(
    d: &D,
    network: Network,
) -> anyhow::Result<()> {
    let path = account_path(44, network, 3)?;
    let xpub = d.get_public_key(&path, true).await?;

    let recovered = Path::from_account_public_key(&xkey::encode_xpub(&xpub, network))?;
    assert_eq!(recovered, path);

    Ok(())
}
