// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Signer configuration
//!
//! Options load from JSON or TOML, for example:
//!
//! ```toml
//! network = "testnet"
//! vendor = "LEDGER,MEMORY"
//!
//! [LEDGER]
//! timeout = 5000
//!
//! [MEMORY]
//! phrase = "abandon abandon ..."
//! ```

use std::{collections::BTreeSet, path::Path as FsPath, time::Duration};

use serde::{Deserialize, Deserializer, Serialize};
use zeroize::Zeroize;

use hwsigner_core::Network;

use crate::{vendor::parse_vendors, Error, Vendor};

/// Default Ledger transport timeout
pub const DEFAULT_LEDGER_TIMEOUT_MS: u32 = 5_000;

/// Signer construction options
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignerOptions {
    /// Network for address prefixes and coin type
    #[serde(default)]
    pub network: Network,

    /// Enabled vendors
    #[serde(default = "Vendor::all", deserialize_with = "vendor_list")]
    pub vendor: BTreeSet<Vendor>,

    #[serde(rename = "LEDGER", default)]
    pub ledger: LedgerOptions,

    #[serde(rename = "TREZOR", default)]
    pub trezor: TrezorOptions,

    #[serde(rename = "MEMORY", default)]
    pub memory: MemoryOptions,
}

impl Default for SignerOptions {
    fn default() -> Self {
        Self {
            network: Network::default(),
            vendor: Vendor::all(),
            ledger: LedgerOptions::default(),
            trezor: TrezorOptions::default(),
            memory: MemoryOptions::default(),
        }
    }
}

impl SignerOptions {
    /// Parse options from JSON
    pub fn from_json(s: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(s)?)
    }

    /// Parse options from TOML
    pub fn from_toml(s: &str) -> Result<Self, Error> {
        Ok(toml::from_str(s)?)
    }

    /// Load options from a `.json` or `.toml` file
    pub fn load(path: impl AsRef<FsPath>) -> Result<Self, Error> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&s),
            Some("toml") => Self::from_toml(&s),
            _ => Err(Error::Config(format!(
                "unrecognised config format: {}",
                path.display()
            ))),
        }
    }

    /// Check whether a vendor is enabled
    pub fn enabled(&self, vendor: Vendor) -> bool {
        self.vendor.contains(&vendor)
    }
}

/// Ledger (APDU) device options
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerOptions {
    /// Transport timeout in milliseconds
    #[serde(default = "default_ledger_timeout")]
    pub timeout: u32,
}

impl Default for LedgerOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_LEDGER_TIMEOUT_MS,
        }
    }
}

impl LedgerOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout as u64)
    }
}

fn default_ledger_timeout() -> u32 {
    DEFAULT_LEDGER_TIMEOUT_MS
}

/// Trezor (session) device options
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrezorOptions {
    /// Enable the debug link / emulator bridge
    #[serde(rename = "debugTrezor", default)]
    pub debug_trezor: bool,
}

/// In-memory signer options, one of `phrase` or `key`
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryOptions {
    /// BIP39 mnemonic phrase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phrase: Option<String>,

    /// Base58 extended private key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl MemoryOptions {
    /// Whether key material is configured
    pub fn is_configured(&self) -> bool {
        self.phrase.is_some() || self.key.is_some()
    }
}

impl std::fmt::Debug for MemoryOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryOptions")
            .field("phrase", &self.phrase.as_ref().map(|_| "<redacted>"))
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Drop for MemoryOptions {
    fn drop(&mut self) {
        self.phrase.zeroize();
        self.key.zeroize();
    }
}

/// Vendors as a single (comma-separated) string or a list
#[derive(Deserialize)]
#[serde(untagged)]
enum VendorList {
    One(String),
    Many(Vec<String>),
}

fn vendor_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BTreeSet<Vendor>, D::Error> {
    let v = match VendorList::deserialize(deserializer)? {
        VendorList::One(s) => vec![s],
        VendorList::Many(l) => l,
    };

    parse_vendors(v).map_err(serde::de::Error::custom)
}
