// Copyright (c) 2022-2023 The MobileCoin Foundation

//! BIP32 derivation paths with BIP44 slot semantics
//!
//! A [Path] is an ordered list of up to [MAX_DEPTH] `u32` components, where
//! hardened components carry the [HARDENED] bit. The first five components
//! are exposed as the conventional `purpose / coin / account / branch / index`
//! slots.
//!
//! Paths created in strict mode are frozen once they reach a depth of five,
//! after which any mutation fails. Cloning a path produces an independent,
//! mutable copy.

use std::{fmt::Display, str::FromStr};

use bitcoin::bip32::{ChildNumber, DerivationPath};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{xkey, Error, Network};

/// Hardened derivation flag
pub const HARDENED: u32 = 0x8000_0000;

/// Maximum number of path components
pub const MAX_DEPTH: usize = 256;

/// Depth at which strict paths are frozen
pub const STRICT_DEPTH: usize = 5;

/// Slot indices for BIP44 path components
pub const PURPOSE: usize = 0;
pub const COIN: usize = 1;
pub const ACCOUNT: usize = 2;
pub const BRANCH: usize = 3;
pub const INDEX: usize = 4;

/// Apply the hardened flag to a path component
pub const fn harden(index: u32) -> u32 {
    index | HARDENED
}

/// Check whether a path component is hardened
pub const fn is_hardened(index: u32) -> bool {
    index & HARDENED != 0
}

/// BIP32 derivation path
#[derive(Debug, Default, Eq)]
pub struct Path {
    list: Vec<u32>,
    strict: bool,
    frozen: bool,
}

/// Options for building a [Path] via [Path::from_options]
///
/// `purpose`, `coin` and `account` are provided without the hardened flag
/// and hardened by the builder, `branch` and `index` are used as-is.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PathOptions {
    pub purpose: Option<u32>,
    pub coin: Option<u32>,
    pub network: Option<Network>,
    pub account: Option<u32>,
    pub branch: Option<u32>,
    pub index: Option<u32>,
    /// Freeze the path once it reaches full BIP44 depth
    pub strict: bool,
}

impl Path {
    /// Create a new (root) path
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new strict (root) path, frozen on reaching depth 5
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Default::default()
        }
    }

    /// Parse a path string, `hardened` controls whether hardened
    /// components are permitted
    pub fn parse(s: &str, hardened: bool) -> Result<Self, Error> {
        let mut parts = s.split('/');

        match parts.next() {
            Some("m") | Some("M") | Some("m'") | Some("M'") => (),
            _ => return Err(Error::InvalidPath(format!("invalid root in '{s}'"))),
        }

        let mut list = Vec::new();
        for p in parts {
            let (digits, hard) = match p.strip_suffix('\'').or_else(|| p.strip_suffix('h')) {
                Some(d) => (d, true),
                None => (p, false),
            };

            if digits.is_empty()
                || digits.len() > 10
                || !digits.bytes().all(|b| b.is_ascii_digit())
            {
                return Err(Error::InvalidPath(format!("invalid component '{p}' in '{s}'")));
            }

            let value: u64 = digits
                .parse()
                .map_err(|_| Error::InvalidPath(format!("invalid component '{p}' in '{s}'")))?;

            let mut index = u32::try_from(value)
                .map_err(|_| Error::InvalidPath(format!("component '{p}' out of range")))?;

            if hard {
                if is_hardened(index) {
                    return Err(Error::InvalidPath(format!("component '{p}' out of range")));
                }
                index = harden(index);
            }

            if !hardened && is_hardened(index) {
                return Err(Error::InvalidPath(format!(
                    "hardened component '{p}' not permitted"
                )));
            }

            list.push(index);
        }

        Self::from_list(&list, false)
    }

    /// Build a path from a list of components, optionally hardening all
    pub fn from_list(list: &[u32], harden_all: bool) -> Result<Self, Error> {
        if list.len() > MAX_DEPTH {
            return Err(Error::InvalidPath(format!(
                "depth {} exceeds maximum {MAX_DEPTH}",
                list.len()
            )));
        }

        let list = match harden_all {
            true => list.iter().map(|i| harden(*i)).collect(),
            false => list.to_vec(),
        };

        Ok(Self {
            list,
            ..Default::default()
        })
    }

    /// Build a path from [PathOptions]
    pub fn from_options(opts: &PathOptions) -> Result<Self, Error> {
        let purpose = opts
            .purpose
            .ok_or_else(|| Error::InvalidPath("purpose is required".to_string()))?;

        let coin = match (opts.coin, opts.network) {
            (Some(c), _) => c,
            (None, Some(n)) => n.coin_type(),
            (None, None) => {
                return Err(Error::InvalidPath(
                    "coin or network is required".to_string(),
                ))
            }
        };

        let account = opts
            .account
            .ok_or_else(|| Error::InvalidPath("account is required".to_string()))?;

        for (name, v) in [("purpose", purpose), ("coin", coin), ("account", account)] {
            if is_hardened(v) {
                return Err(Error::InvalidPath(format!("{name} {v:#x} out of range")));
            }
        }

        let mut p = match opts.strict {
            true => Self::strict(),
            false => Self::new(),
        };

        p.set_purpose(harden(purpose))?;
        p.set_coin(harden(coin))?;
        p.set_account(harden(account))?;

        match (opts.branch, opts.index) {
            (Some(b), Some(i)) => {
                p.set_branch(b)?;
                p.set_index(i)?;
            }
            (None, None) => (),
            _ => {
                return Err(Error::InvalidPath(
                    "branch and index must be provided together".to_string(),
                ))
            }
        }

        Ok(p)
    }

    /// Build an account-level path from an extended public key
    ///
    /// The key version selects the purpose and coin slots, the key's
    /// child index is used as the account slot. Only depth 3 keys are
    /// accepted.
    pub fn from_account_public_key(xpub: &str) -> Result<Self, Error> {
        let data = bitcoin::base58::decode_check(xpub)
            .map_err(|e| Error::InvalidPath(format!("invalid extended key: {e}")))?;

        if data.len() != xkey::XKEY_LEN {
            return Err(Error::InvalidPath(format!(
                "invalid extended key length: {}",
                data.len()
            )));
        }

        let mut version = [0u8; 4];
        version.copy_from_slice(&data[..4]);

        let (purpose, coin) = xkey::version_prefix(&version).ok_or_else(|| {
            Error::InvalidPath(format!("unknown key prefix: {}", hex::encode(version)))
        })?;

        let depth = data[4];
        if depth != 3 {
            return Err(Error::InvalidPath(format!(
                "expected account key (depth 3), got depth {depth}"
            )));
        }

        let mut child = [0u8; 4];
        child.copy_from_slice(&data[9..13]);

        Self::from_list(&[purpose, coin, u32::from_be_bytes(child)], false)
    }

    /// Path depth (number of components)
    pub fn depth(&self) -> usize {
        self.list.len()
    }

    /// Path components
    pub fn as_slice(&self) -> &[u32] {
        &self.list
    }

    /// Copy path components to a list
    pub fn to_list(&self) -> Vec<u32> {
        self.list.clone()
    }

    /// Whether this path has been frozen
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Whether this path was built in strict mode
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Freeze the path, preventing further mutation
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Return a new path with an additional component
    pub fn push(&self, index: u32, hardened: bool) -> Result<Self, Error> {
        self.check_mutable()?;

        let mut p = self.clone();
        p.append(index, hardened)?;
        Ok(p)
    }

    /// Append a component in place
    pub fn append(&mut self, index: u32, hardened: bool) -> Result<&mut Self, Error> {
        self.check_mutable()?;

        if self.list.len() >= MAX_DEPTH {
            return Err(Error::InvalidPath(format!(
                "depth exceeds maximum {MAX_DEPTH}"
            )));
        }

        let index = match hardened {
            true if is_hardened(index) => {
                return Err(Error::InvalidPath(format!("component {index} out of range")))
            }
            true => harden(index),
            false => index,
        };

        self.list.push(index);
        self.update_frozen();

        Ok(self)
    }

    /// Purpose slot
    pub fn purpose(&self) -> Option<u32> {
        self.list.get(PURPOSE).copied()
    }

    /// Coin type slot
    pub fn coin(&self) -> Option<u32> {
        self.list.get(COIN).copied()
    }

    /// Account slot
    pub fn account(&self) -> Option<u32> {
        self.list.get(ACCOUNT).copied()
    }

    /// Branch (change) slot
    pub fn branch(&self) -> Option<u32> {
        self.list.get(BRANCH).copied()
    }

    /// Address index slot
    pub fn index(&self) -> Option<u32> {
        self.list.get(INDEX).copied()
    }

    pub fn set_purpose(&mut self, v: u32) -> Result<&mut Self, Error> {
        self.set_slot(PURPOSE, v)
    }

    pub fn set_coin(&mut self, v: u32) -> Result<&mut Self, Error> {
        self.set_slot(COIN, v)
    }

    pub fn set_account(&mut self, v: u32) -> Result<&mut Self, Error> {
        self.set_slot(ACCOUNT, v)
    }

    pub fn set_branch(&mut self, v: u32) -> Result<&mut Self, Error> {
        self.set_slot(BRANCH, v)
    }

    pub fn set_index(&mut self, v: u32) -> Result<&mut Self, Error> {
        self.set_slot(INDEX, v)
    }

    /// Write a slot, extending depth by one where `slot == depth`
    pub fn set_slot(&mut self, slot: usize, v: u32) -> Result<&mut Self, Error> {
        self.check_mutable()?;

        match slot.cmp(&self.list.len()) {
            std::cmp::Ordering::Less => self.list[slot] = v,
            std::cmp::Ordering::Equal if slot < MAX_DEPTH => self.list.push(v),
            _ => {
                return Err(Error::InvalidPath(format!(
                    "cannot set slot {slot} on path of depth {}",
                    self.list.len()
                )))
            }
        }

        self.update_frozen();

        Ok(self)
    }

    /// Account-level prefix (first three components) of this path
    pub fn account_path(&self) -> Option<Self> {
        match self.list.len() >= 3 {
            true => Some(Self {
                list: self.list[..3].to_vec(),
                ..Default::default()
            }),
            false => None,
        }
    }

    /// Child numbers for BIP32 derivation
    pub fn child_numbers(&self) -> Vec<ChildNumber> {
        self.list.iter().map(|i| ChildNumber::from(*i)).collect()
    }

    /// Convert to a [DerivationPath]
    pub fn to_derivation_path(&self) -> DerivationPath {
        DerivationPath::from(self.child_numbers())
    }

    fn check_mutable(&self) -> Result<(), Error> {
        match self.frozen {
            true => Err(Error::InvalidPath(format!("path {self} is frozen"))),
            false => Ok(()),
        }
    }

    fn update_frozen(&mut self) {
        if self.strict && self.list.len() >= STRICT_DEPTH {
            self.frozen = true;
        }
    }
}

/// Clones are independent and mutable
impl Clone for Path {
    fn clone(&self) -> Self {
        Self {
            list: self.list.clone(),
            strict: self.strict,
            frozen: false,
        }
    }
}

/// Paths compare by components only
impl PartialEq for Path {
    fn eq(&self, other: &Self) -> bool {
        self.list == other.list
    }
}

impl std::hash::Hash for Path {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.list.hash(state)
    }
}

impl Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "m")?;
        for i in &self.list {
            match is_hardened(*i) {
                true => write!(f, "/{}'", i & !HARDENED)?,
                false => write!(f, "/{i}")?,
            }
        }
        Ok(())
    }
}

impl FromStr for Path {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s, true)
    }
}

impl TryFrom<&[u32]> for Path {
    type Error = Error;

    fn try_from(list: &[u32]) -> Result<Self, Self::Error> {
        Self::from_list(list, false)
    }
}

impl From<&Path> for DerivationPath {
    fn from(p: &Path) -> Self {
        p.to_derivation_path()
    }
}

impl Serialize for Path {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Path {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Path::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_mixed_hardening() {
        let p = Path::from_str("m/44h/0'/5").unwrap();
        assert_eq!(p.to_list(), vec![0x8000002C, 0x80000000, 5]);
        assert_eq!(p.to_string(), "m/44'/0'/5");
    }

    #[test]
    fn parse_roots() {
        for r in ["m", "M", "m'", "M'"] {
            let p = Path::from_str(r).unwrap();
            assert_eq!(p.depth(), 0);
            assert_eq!(p.to_string(), "m");
        }

        for r in ["", "x/1", "/1", "n'/0", "m/", "m//1"] {
            assert!(Path::from_str(r).is_err(), "'{r}' should be rejected");
        }
    }

    #[test]
    fn parse_rejects_malformed_components() {
        let bad = [
            "m/a",
            "m/1a",
            "m/-1",
            "m/12345678901",
            "m/4294967296",
            "m/2147483648'",
            "m/1''",
            "m/1H",
        ];

        for s in bad {
            assert!(Path::from_str(s).is_err(), "'{s}' should be rejected");
        }
    }

    #[test]
    fn parse_raw_hardened_values() {
        let p = Path::from_str("m/2147483692").unwrap();
        assert_eq!(p.to_list(), vec![harden(44)]);

        assert!(Path::parse("m/2147483692", false).is_err());
        assert!(Path::parse("m/44'/0", false).is_err());
        assert_eq!(Path::parse("m/0/1", false).unwrap().to_list(), vec![0, 1]);
    }

    #[test]
    fn slots_track_components() {
        let mut p = Path::new();
        assert_eq!(p.purpose(), None);

        p.set_purpose(harden(44)).unwrap();
        p.set_coin(harden(1)).unwrap();
        assert_eq!(p.depth(), 2);

        // Cannot skip a slot
        assert!(p.set_branch(0).is_err());

        p.set_account(harden(0)).unwrap();
        p.set_branch(1).unwrap();
        p.set_index(7).unwrap();

        assert_eq!(p.purpose(), Some(harden(44)));
        assert_eq!(p.coin(), Some(harden(1)));
        assert_eq!(p.account(), Some(harden(0)));
        assert_eq!(p.branch(), Some(1));
        assert_eq!(p.index(), Some(7));
        assert_eq!(p.to_string(), "m/44'/1'/0'/1/7");

        // Overwrite an existing slot in a non-strict path
        p.set_account(harden(3)).unwrap();
        assert_eq!(p.to_string(), "m/44'/1'/3'/1/7");
    }

    #[test]
    fn strict_paths_freeze_at_depth_five() {
        let mut p = Path::strict();
        for i in [harden(44), harden(1), harden(0), 0] {
            p.append(i, false).unwrap();
        }
        assert!(!p.is_frozen());

        p.append(3, false).unwrap();
        assert!(p.is_frozen());

        assert!(p.append(1, false).is_err());
        assert!(p.push(1, false).is_err());
        assert!(p.set_index(4).is_err());
        assert!(p.set_purpose(harden(49)).is_err());
        assert_eq!(p.to_string(), "m/44'/1'/0'/0/3");

        // Clones are mutable copies
        let mut c = p.clone();
        assert!(!c.is_frozen());
        c.set_index(4).unwrap();
        assert_eq!(p.index(), Some(3));
        assert_eq!(c.index(), Some(4));
    }

    #[test]
    fn push_returns_new_path() {
        let base = Path::from_str("m/44'/1'/0'").unwrap();
        let p = base.push(1, false).unwrap().push(9, false).unwrap();

        assert_eq!(base.depth(), 3);
        assert_eq!(p.to_string(), "m/44'/1'/0'/1/9");

        let h = base.push(5, true).unwrap();
        assert_eq!(h.to_string(), "m/44'/1'/0'/5'");
        assert!(base.push(HARDENED, true).is_err());
    }

    #[test]
    fn build_from_options() {
        let p = Path::from_options(&PathOptions {
            purpose: Some(44),
            network: Some(Network::Testnet),
            account: Some(2),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(p.to_string(), "m/44'/1'/2'");

        let p = Path::from_options(&PathOptions {
            purpose: Some(48),
            coin: Some(0),
            account: Some(0),
            branch: Some(1),
            index: Some(3),
            strict: true,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(p.to_string(), "m/48'/0'/0'/1/3");
        assert!(p.is_frozen());

        // Missing required fields
        let missing = [
            PathOptions {
                coin: Some(0),
                account: Some(0),
                ..Default::default()
            },
            PathOptions {
                purpose: Some(44),
                account: Some(0),
                ..Default::default()
            },
            PathOptions {
                purpose: Some(44),
                coin: Some(0),
                ..Default::default()
            },
        ];
        for o in missing {
            assert!(Path::from_options(&o).is_err(), "{o:?} should be rejected");
        }

        // Branch without index
        let half = PathOptions {
            purpose: Some(44),
            coin: Some(0),
            account: Some(0),
            branch: Some(0),
            ..Default::default()
        };
        assert!(Path::from_options(&half).is_err());

        let half = PathOptions {
            index: Some(0),
            branch: None,
            ..half
        };
        assert!(Path::from_options(&half).is_err());
    }

    #[test]
    fn round_trips() {
        for s in ["m", "m/0", "m/44'/0'/0'", "m/84'/1'/3'/1/1234", "m/1/2/3/4/5/6/7'"] {
            let p = Path::from_str(s).unwrap();
            assert_eq!(Path::from_str(&p.to_string()).unwrap(), p);
            assert_eq!(Path::from_list(&p.to_list(), false).unwrap(), p);
            assert_eq!(p.to_string(), s);
        }

        let h = Path::from_list(&[44, 0, 0], true).unwrap();
        assert_eq!(h.to_string(), "m/44'/0'/0'");
    }

    #[test]
    fn depth_limit() {
        let list = vec![1u32; MAX_DEPTH];
        let mut p = Path::from_list(&list, false).unwrap();
        assert!(p.append(1, false).is_err());
        assert!(Path::from_list(&vec![1u32; MAX_DEPTH + 1], false).is_err());
    }

    #[test]
    fn serde_as_string() {
        let p = Path::from_str("m/44'/1'/0'/0/1").unwrap();
        let s = serde_json::to_string(&p).unwrap();
        assert_eq!(s, "\"m/44'/1'/0'/0/1\"");
        assert_eq!(serde_json::from_str::<Path>(&s).unwrap(), p);
    }
}
