// Copyright (c) 2022-2023 The MobileCoin Foundation

//! In-memory software signer
//!
//! Holds a BIP32 master private key derived from a BIP39 mnemonic (or
//! provided directly), deriving a child key per operation. Signatures are
//! deterministic for a given key and input.

use std::str::FromStr;

use async_trait::async_trait;
use log::debug;
use zeroize::Zeroize;

use hwsigner_core::{
    bitcoin::{
        bip32::{Xpriv, Xpub},
        ecdsa, PublicKey, Transaction,
    },
    helpers::{input_map, match_inputs, Keyring},
    secp, signing, xkey, InputData, Network, Path,
};

use super::{
    align_signatures, apply_signatures, check_inputs, Device, DeviceInfo, DeviceState,
    InputSignature, Signing,
};
use crate::{config::MemoryOptions, Error, Vendor};

/// In-memory signing device
pub struct MemoryDevice {
    info: DeviceInfo,
    master: Xpriv,
    state: DeviceState,
}

impl MemoryDevice {
    /// Create a device from a BIP39 mnemonic phrase
    pub fn from_phrase(phrase: &str, network: Network) -> Result<Self, Error> {
        let m = bip39::Mnemonic::parse_normalized(phrase)
            .map_err(|e| Error::Config(format!("invalid mnemonic: {e}")))?;

        let mut seed = m.to_seed("");
        let r = Self::from_seed(&seed, network);
        seed.zeroize();

        r
    }

    /// Create a device from a BIP32 seed
    pub fn from_seed(seed: &[u8], network: Network) -> Result<Self, Error> {
        let master = Xpriv::new_master(network.kind(), seed)
            .map_err(|e| Error::Config(format!("invalid seed: {e}")))?;

        Ok(Self::from_master(master))
    }

    /// Create a device from a base58 extended private key
    pub fn from_key(key: &str) -> Result<Self, Error> {
        let master = Xpriv::from_str(key.trim())
            .map_err(|e| Error::Config(format!("invalid extended private key: {e}")))?;

        Ok(Self::from_master(master))
    }

    /// Create a device from configuration, preferring the phrase
    pub fn from_options(opts: &MemoryOptions, network: Network) -> Result<Self, Error> {
        match (&opts.phrase, &opts.key) {
            (Some(p), _) => Self::from_phrase(p, network),
            (None, Some(k)) => Self::from_key(k),
            (None, None) => Err(Error::Config(
                "memory signer requires a phrase or key".to_string(),
            )),
        }
    }

    fn from_master(master: Xpriv) -> Self {
        let id = master.fingerprint(secp()).to_string();

        let info = DeviceInfo {
            vendor: Vendor::Memory,
            handle: id.clone(),
            key: id.clone(),
            model: Some("memory".to_string()),
            label: None,
        };

        Self {
            info,
            master,
            state: DeviceState::new(format!("{}:{id}", Vendor::Memory)),
        }
    }

    fn derive(&self, path: &Path) -> Result<Xpriv, Error> {
        self.master
            .derive_priv(secp(), &path.to_derivation_path())
            .map_err(|e| Error::Core(e.into()))
    }

    fn sign_inputs(
        &self,
        tx: &Transaction,
        inputs: &[InputData],
    ) -> Result<Vec<InputSignature>, Error> {
        check_inputs(tx, inputs)?;

        let map = input_map(inputs)?;
        let mut signed = Vec::with_capacity(inputs.len());

        for (index, input) in match_inputs(tx, &map).into_iter().enumerate() {
            let input = match input {
                Some(i) => i,
                None => continue,
            };

            let k = self.derive(input.path())?;
            let public_key = PublicKey::new(k.private_key.public_key(secp()));

            let ring = Keyring::new(input, public_key)?;
            let signature = signing::sign_input(tx, index, input, &ring, &k.private_key)?;

            debug!("signed input {index} ({}) at {}", ring.kind(), input.path());

            signed.push(InputSignature {
                index,
                ring,
                signature,
            });
        }

        Ok(signed)
    }
}

impl std::fmt::Debug for MemoryDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryDevice")
            .field("info", &self.info)
            .field("master", &"<redacted>")
            .field("state", &self.state)
            .finish()
    }
}

#[async_trait]
impl Signing for MemoryDevice {
    async fn get_public_key(&self, path: &Path, parent_fingerprint: bool) -> Result<Xpub, Error> {
        let _g = self.state.acquire().await?;

        let xpub = Xpub::from_priv(secp(), &self.derive(path)?);

        match parent_fingerprint {
            true => Ok(xpub),
            false => Ok(xkey::without_parent_fingerprint(&xpub)),
        }
    }

    async fn sign_transaction(
        &self,
        tx: &Transaction,
        inputs: &[InputData],
    ) -> Result<Transaction, Error> {
        let _g = self.state.acquire().await?;

        let signed = self.sign_inputs(tx, inputs)?;
        apply_signatures(tx, inputs, &signed)
    }

    async fn get_signatures(
        &self,
        tx: &Transaction,
        inputs: &[InputData],
    ) -> Result<Vec<Option<ecdsa::Signature>>, Error> {
        let _g = self.state.acquire().await?;

        let signed = self.sign_inputs(tx, inputs)?;
        Ok(align_signatures(tx, &signed))
    }

    async fn sign_message(&self, path: &Path, message: &[u8]) -> Result<[u8; 65], Error> {
        let _g = self.state.acquire().await?;

        let k = self.derive(path)?;
        Ok(signing::sign_message(message, &k.private_key))
    }
}

#[async_trait]
impl Device for MemoryDevice {
    fn info(&self) -> DeviceInfo {
        self.info.clone()
    }

    fn is_open(&self) -> bool {
        self.state.is_open()
    }

    fn is_destroyed(&self) -> bool {
        self.state.is_destroyed()
    }

    async fn open(&self) -> Result<(), Error> {
        self.state.open().await
    }

    async fn close(&self) -> Result<(), Error> {
        self.state.close().await;
        Ok(())
    }

    async fn destroy(&self) -> Result<(), Error> {
        self.state.destroy().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use hwsigner_core::bitcoin::bip32::Fingerprint;

    use super::*;

    const PHRASE: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[tokio::test]
    async fn lifecycle() {
        let d = MemoryDevice::from_phrase(PHRASE, Network::Testnet).unwrap();
        let path = Path::from_str("m/44'/1'/0'").unwrap();

        // Operations require an open device
        assert!(matches!(
            d.get_public_key(&path, false).await,
            Err(Error::NotOpen(_))
        ));

        d.open().await.unwrap();
        let a = d.get_public_key(&path, false).await.unwrap();

        // Reopen yields the same key
        d.close().await.unwrap();
        d.open().await.unwrap();
        let b = d.get_public_key(&path, false).await.unwrap();
        assert_eq!(a, b);

        // Destroyed devices cannot be reopened
        d.destroy().await.unwrap();
        assert!(d.is_destroyed());
        assert!(!d.is_open());
        assert!(matches!(d.open().await, Err(Error::Destroyed(_))));
    }

    #[tokio::test]
    async fn parent_fingerprint() {
        let d = MemoryDevice::from_phrase(PHRASE, Network::Testnet).unwrap();
        d.open().await.unwrap();

        let path = Path::from_str("m/44'/1'/0'").unwrap();
        let with = d.get_public_key(&path, true).await.unwrap();
        let without = d.get_public_key(&path, false).await.unwrap();

        let parent_path = Path::from_str("m/44'/1'").unwrap();
        let parent = Xpub::from_priv(secp(), &d.derive(&parent_path).unwrap());
        assert_eq!(with.parent_fingerprint, parent.fingerprint());
        assert_eq!(without.parent_fingerprint, Fingerprint::from([0u8; 4]));
        assert!(xkey::same_key(&with, &without));
    }

    #[test]
    fn debug_redacts_key() {
        let d = MemoryDevice::from_phrase(PHRASE, Network::Testnet).unwrap();
        let s = format!("{d:?}");
        assert!(s.contains("redacted"));
        assert!(!s.contains("tprv"));
    }

    #[test]
    fn rejects_invalid_phrase() {
        assert!(MemoryDevice::from_phrase("abandon abandon", Network::Main).is_err());
        assert!(MemoryDevice::from_options(&MemoryOptions::default(), Network::Main).is_err());
    }
}
