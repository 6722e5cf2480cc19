// Copyright (c) 2022-2023 The MobileCoin Foundation

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::xkey::KEY_VERSIONS;

/// Networks supported by the signer
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Main,
    Testnet,
    Regtest,
    Simnet,
}

impl Network {
    /// BIP44 coin type for this network
    pub fn coin_type(&self) -> u32 {
        match self {
            Network::Main => 0,
            Network::Testnet | Network::Regtest | Network::Simnet => 1,
        }
    }

    /// Extended public key version bytes for this network, from
    /// [KEY_VERSIONS](crate::xkey::KEY_VERSIONS)
    pub fn xpub_version(&self) -> [u8; 4] {
        // Table entries follow variant order
        KEY_VERSIONS[*self as usize].0
    }

    /// Map to [bitcoin::Network] for address encoding
    ///
    /// Simnet has no upstream equivalent and uses testnet encodings.
    pub fn to_bitcoin(&self) -> bitcoin::Network {
        match self {
            Network::Main => bitcoin::Network::Bitcoin,
            Network::Testnet | Network::Simnet => bitcoin::Network::Testnet,
            Network::Regtest => bitcoin::Network::Regtest,
        }
    }

    /// Network kind for BIP32 encodings
    pub fn kind(&self) -> bitcoin::NetworkKind {
        match self {
            Network::Main => bitcoin::NetworkKind::Main,
            _ => bitcoin::NetworkKind::Test,
        }
    }

    /// Whether this is the main network
    pub fn is_main(&self) -> bool {
        *self == Network::Main
    }
}
