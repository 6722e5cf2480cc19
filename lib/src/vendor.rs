// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Vendor identifiers and parsing

use std::{collections::BTreeSet, str::FromStr};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

use crate::Error;

/// Wildcard vendor identifier, expands to all known vendors
pub const ANY: &str = "ANY";

/// Supported device vendors
#[derive(
    Copy,
    Clone,
    Debug,
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
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[serde(rename_all = "UPPERCASE")]
pub enum Vendor {
    /// Ledger-style APDU devices
    Ledger,
    /// Trezor-style session devices
    Trezor,
    /// In-memory software signer
    Memory,
}

impl Vendor {
    /// All known vendors
    pub fn all() -> BTreeSet<Vendor> {
        Vendor::iter().collect()
    }
}

/// Parse vendor identifiers
///
/// Each item may be a single identifier or a comma-separated list,
/// [ANY] expands to every known vendor.
pub fn parse_vendors<I, S>(items: I) -> Result<BTreeSet<Vendor>, Error>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut vendors = BTreeSet::new();

    for item in items {
        for v in item.as_ref().split(',') {
            let v = v.trim();
            if v.is_empty() {
                continue;
            }

            if v.eq_ignore_ascii_case(ANY) {
                vendors.extend(Vendor::iter());
                continue;
            }

            let vendor =
                Vendor::from_str(v).map_err(|_| Error::UnknownVendor(v.to_string()))?;
            vendors.insert(vendor);
        }
    }

    Ok(vendors)
}
