// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Extended public key version tables and encodings
//!
//! `bitcoin` only understands the main and test `xpub` / `tpub` versions,
//! regtest and simnet keys are re-tagged on the way in and out.

use bitcoin::bip32::{ChainCode, ChildNumber, Fingerprint, Xpub};

use crate::{path::harden, Error, Network};

/// Serialized extended key length
pub const XKEY_LEN: usize = 78;

/// Extended public key versions and their networks
pub const KEY_VERSIONS: [([u8; 4], Network); 4] = [
    ([0x04, 0x88, 0xb2, 0x1e], Network::Main),
    ([0x04, 0x35, 0x87, 0xcf], Network::Testnet),
    ([0xea, 0xb4, 0xfa, 0x05], Network::Regtest),
    ([0x04, 0x20, 0xbd, 0x3a], Network::Simnet),
];

/// Resolve the network for extended key version bytes
pub fn version_network(version: &[u8; 4]) -> Option<Network> {
    KEY_VERSIONS
        .iter()
        .find(|(v, _)| v == version)
        .map(|(_, n)| *n)
}

/// Resolve `[hardened purpose, hardened coin]` for extended key version bytes
pub fn version_prefix(version: &[u8; 4]) -> Option<(u32, u32)> {
    version_network(version).map(|n| (harden(44), harden(n.coin_type())))
}

/// Parse a base58 extended public key for any supported network
pub fn parse_xpub(s: &str) -> Result<(Network, Xpub), Error> {
    let mut data = bitcoin::base58::decode_check(s)
        .map_err(|e| Error::InvalidInput(format!("invalid extended key: {e}")))?;

    if data.len() != XKEY_LEN {
        return Err(Error::InvalidInput(format!(
            "invalid extended key length: {}",
            data.len()
        )));
    }

    let mut version = [0u8; 4];
    version.copy_from_slice(&data[..4]);

    let network = version_network(&version).ok_or_else(|| {
        Error::InvalidInput(format!("unknown key prefix: {}", hex::encode(version)))
    })?;

    // Re-tag regtest / simnet keys for decoding
    if network != Network::Main {
        data[..4].copy_from_slice(&Network::Testnet.xpub_version());
    }

    let xpub = Xpub::decode(&data)?;

    Ok((network, xpub))
}

/// Encode an extended public key with the version bytes for `network`
pub fn encode_xpub(xpub: &Xpub, network: Network) -> String {
    let mut data = xpub.encode();
    data[..4].copy_from_slice(&network.xpub_version());
    bitcoin::base58::encode_check(&data)
}

/// Build an extended public key from raw components
pub fn build_xpub(
    network: Network,
    depth: u8,
    parent_fingerprint: [u8; 4],
    child_number: u32,
    chain_code: [u8; 32],
    public_key: &bitcoin::secp256k1::PublicKey,
) -> Result<Xpub, Error> {
    let mut data = [0u8; XKEY_LEN];
    data[..4].copy_from_slice(&network.kind_version());
    data[4] = depth;
    data[5..9].copy_from_slice(&parent_fingerprint);
    data[9..13].copy_from_slice(&child_number.to_be_bytes());
    data[13..45].copy_from_slice(&chain_code);
    data[45..78].copy_from_slice(&public_key.serialize());

    Ok(Xpub::decode(&data)?)
}

/// Fingerprint of a public key (first four bytes of HASH160)
pub fn fingerprint(public_key: &bitcoin::secp256k1::PublicKey) -> [u8; 4] {
    use bitcoin::hashes::{hash160, Hash};

    let h = hash160::Hash::hash(&public_key.serialize()).to_byte_array();
    let mut f = [0u8; 4];
    f.copy_from_slice(&h[..4]);
    f
}

/// Strip the parent fingerprint from an extended key
///
/// Backends disagree on whether this is populated, comparisons across
/// backends ignore it.
pub fn without_parent_fingerprint(xpub: &Xpub) -> Xpub {
    Xpub {
        parent_fingerprint: Fingerprint::from([0u8; 4]),
        ..*xpub
    }
}

/// Compare two extended keys ignoring parent fingerprints
pub fn same_key(a: &Xpub, b: &Xpub) -> bool {
    a.public_key == b.public_key
        && a.chain_code == b.chain_code
        && a.depth == b.depth
        && a.child_number == b.child_number
}

/// Derive a non-hardened child key along `path`
pub fn derive_child(xpub: &Xpub, path: &[u32]) -> Result<Xpub, Error> {
    let path: Vec<ChildNumber> = path
        .iter()
        .map(|i| ChildNumber::from_normal_idx(*i))
        .collect::<Result<_, _>>()?;

    Ok(xpub.derive_pub(crate::secp(), &path)?)
}

impl Network {
    /// Version bytes understood by `bitcoin` for this network kind
    pub(crate) fn kind_version(&self) -> [u8; 4] {
        match self {
            Network::Main => Network::Main.xpub_version(),
            _ => Network::Testnet.xpub_version(),
        }
    }
}

/// Access chain code bytes
pub fn chain_code_bytes(c: &ChainCode) -> [u8; 32] {
    let mut b = [0u8; 32];
    b.copy_from_slice(c.as_bytes());
    b
}
