// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Vendor-neutral Bitcoin signing core
//!
//! This provides the data model shared by every signer backend:
//!
//! - [Path] BIP32 derivation paths with BIP44 slot semantics
//! - [InputData] per-input signing metadata consumed by backend adapters
//! - [helpers] for building redeem scripts and keyrings, and for applying
//!   signatures and scripts to transactions
//! - [signing] and [verify] for software signing and script checks, used by
//!   the in-memory signer and the simulators
//!
//! Nothing in this crate performs I/O, device interaction lives in `hwsigner`.

mod error;
pub use error::{Error, ErrorKind};

mod network;
pub use network::Network;

pub mod path;
pub use path::{harden, Path, PathOptions, HARDENED};

pub mod xkey;

mod coin;
pub use coin::{Coin, CoinType};

pub mod input_data;
pub use input_data::{InputData, InputDataOptions, Multisig, PublicKeyInfo};

pub mod helpers;

pub mod signing;

pub mod verify;

/// Re-export `bitcoin` for consumers
pub use bitcoin;

/// Shared secp256k1 context
pub(crate) static SECP: once_cell::sync::Lazy<bitcoin::secp256k1::Secp256k1<bitcoin::secp256k1::All>> =
    once_cell::sync::Lazy::new(bitcoin::secp256k1::Secp256k1::new);

/// Fetch the shared secp256k1 context
pub fn secp() -> &'static bitcoin::secp256k1::Secp256k1<bitcoin::secp256k1::All> {
    &SECP
}
