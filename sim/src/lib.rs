// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Software emulations of hardware signer backends
//!
//! - [SimLedger] / [SimLedgerProvider] emulate the APDU Bitcoin
//!   application and device attach / detach
//! - [SimTrezor] / [SimTrezorBridge] emulate a session device and its
//!   event bus
//! - [MemoryWallet] / [MemoryMultisigWallet] provide wallet collaborators
//!
//! Each emulated device shares a [SimControl] used to inject rejections,
//! locked states and response delays.

use std::sync::{Mutex, MutexGuard};

use hwsigner::Error;
use hwsigner_core::{
    bitcoin::{
        bip32::{ChildNumber, Xpriv},
        secp256k1::SecretKey,
    },
    secp, Network,
};

mod control;
pub use control::SimControl;

mod ledger;
pub use ledger::{SimLedger, SimLedgerProvider};

mod trezor;
pub use trezor::{SimTrezor, SimTrezorBridge};

mod wallet;
pub use wallet::{MemoryMultisigWallet, MemoryWallet};

/// Default test mnemonic
pub const TEST_PHRASE: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

/// Lock a mutex, recovering from poisoning
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

/// Build a master key from a mnemonic
pub(crate) fn master_from_phrase(
    phrase: &str,
    network: Network,
) -> Result<Xpriv, Error> {
    let m = bip39::Mnemonic::parse_normalized(phrase)
        .map_err(|e| Error::Config(format!("invalid mnemonic: {e}")))?;

    Xpriv::new_master(network.kind(), &m.to_seed(""))
        .map_err(|e| Error::Config(format!("invalid seed: {e}")))
}

/// Derive the private key at `path`
pub(crate) fn derive(master: &Xpriv, path: &[u32]) -> Result<Xpriv, Error> {
    let path: Vec<ChildNumber> = path.iter().map(|i| ChildNumber::from(*i)).collect();

    master
        .derive_priv(secp(), &path)
        .map_err(|e| Error::InvalidRequest(format!("derivation failed: {e}")))
}

/// Secret key at `path`
pub(crate) fn secret_key(master: &Xpriv, path: &[u32]) -> Result<SecretKey, Error> {
    Ok(derive(master, path)?.private_key)
}
