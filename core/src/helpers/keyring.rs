// Copyright (c) 2022-2023 The MobileCoin Foundation

use bitcoin::{CompressedPublicKey, PublicKey, Script, ScriptBuf};
use strum::Display;

use super::{multisig::parse_multisig, p2sh, p2wsh, redeem_script};
use crate::{Error, InputData};

/// Spend template for a keyring
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display)]
pub enum KeyringKind {
    PubkeyHash,
    WitnessPubkeyHash,
    NestedWitnessPubkeyHash,
    Multisig,
    WitnessMultisig,
    NestedWitnessMultisig,
}

impl KeyringKind {
    pub fn is_witness(&self) -> bool {
        !matches!(self, KeyringKind::PubkeyHash | KeyringKind::Multisig)
    }

    pub fn is_nested(&self) -> bool {
        matches!(
            self,
            KeyringKind::NestedWitnessPubkeyHash | KeyringKind::NestedWitnessMultisig
        )
    }

    pub fn is_multisig(&self) -> bool {
        matches!(
            self,
            KeyringKind::Multisig | KeyringKind::WitnessMultisig | KeyringKind::NestedWitnessMultisig
        )
    }
}

/// Signing keyring for one input
///
/// Binds the signer's public key to the spend template implied by the coin,
/// the witness flag and (for multisig inputs) the redeem script.
#[derive(Clone, Debug, PartialEq)]
pub struct Keyring {
    public_key: PublicKey,
    kind: KeyringKind,
    redeem: Option<ScriptBuf>,
    m: usize,
    keys: Vec<PublicKey>,
}

impl Keyring {
    /// Build a keyring for `input` signed by `public_key`
    pub fn new(input: &InputData, public_key: PublicKey) -> Result<Self, Error> {
        let coin = input.coin().script();

        let r = match input.multisig() {
            Some(multisig) => {
                let redeem = redeem_script(multisig)?;
                let (m, keys) = parse_multisig(&redeem)?;

                if !keys.contains(&public_key) {
                    return Err(Error::InvalidInput(format!(
                        "key {public_key} is not a cosigner of {}",
                        input.key()
                    )));
                }

                let kind = if coin.is_p2wsh() {
                    KeyringKind::WitnessMultisig
                } else if coin.is_p2sh() && input.witness() {
                    KeyringKind::NestedWitnessMultisig
                } else if coin.is_p2sh() {
                    KeyringKind::Multisig
                } else {
                    return Err(Error::UnsupportedInput(format!(
                        "multisig input {} with coin {coin}",
                        input.key()
                    )));
                };

                Self {
                    public_key,
                    kind,
                    redeem: Some(redeem),
                    m,
                    keys,
                }
            }
            None => {
                let kind = if coin.is_p2pkh() {
                    KeyringKind::PubkeyHash
                } else if coin.is_p2wpkh() {
                    KeyringKind::WitnessPubkeyHash
                } else if coin.is_p2sh() && input.witness() {
                    KeyringKind::NestedWitnessPubkeyHash
                } else {
                    return Err(Error::UnsupportedInput(format!(
                        "input {} with coin {coin}",
                        input.key()
                    )));
                };

                Self {
                    public_key,
                    kind,
                    redeem: None,
                    m: 1,
                    keys: vec![public_key],
                }
            }
        };

        if r.script_pubkey()? != *coin {
            return Err(Error::InvalidInput(format!(
                "key {public_key} does not match coin {}",
                input.key()
            )));
        }

        Ok(r)
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn kind(&self) -> KeyringKind {
        self.kind
    }

    pub fn is_witness(&self) -> bool {
        self.kind.is_witness()
    }

    pub fn is_nested(&self) -> bool {
        self.kind.is_nested()
    }

    /// Multisig redeem (or witness) script
    pub fn redeem(&self) -> Option<&Script> {
        self.redeem.as_deref()
    }

    /// Signature threshold
    pub fn m(&self) -> usize {
        self.m
    }

    /// Keys in script order
    pub fn keys(&self) -> &[PublicKey] {
        &self.keys
    }

    /// Script committed to by the signature hash
    pub fn script_code(&self) -> Result<ScriptBuf, Error> {
        match &self.redeem {
            Some(r) => Ok(r.clone()),
            None => Ok(ScriptBuf::new_p2pkh(&self.public_key.pubkey_hash())),
        }
    }

    /// Nested witness program revealed in the script_sig
    pub fn nested_program(&self) -> Result<Option<ScriptBuf>, Error> {
        match (self.kind, &self.redeem) {
            (KeyringKind::NestedWitnessPubkeyHash, _) => {
                Ok(Some(ScriptBuf::new_p2wpkh(&self.compressed()?.wpubkey_hash())))
            }
            (KeyringKind::NestedWitnessMultisig, Some(r)) => Ok(Some(p2wsh(r))),
            _ => Ok(None),
        }
    }

    /// Output script this keyring can spend
    pub fn script_pubkey(&self) -> Result<ScriptBuf, Error> {
        let s = match (self.kind, &self.redeem) {
            (KeyringKind::PubkeyHash, _) => ScriptBuf::new_p2pkh(&self.public_key.pubkey_hash()),
            (KeyringKind::WitnessPubkeyHash, _) => {
                ScriptBuf::new_p2wpkh(&self.compressed()?.wpubkey_hash())
            }
            (KeyringKind::NestedWitnessPubkeyHash, _) => {
                p2sh(&ScriptBuf::new_p2wpkh(&self.compressed()?.wpubkey_hash()))
            }
            (KeyringKind::Multisig, Some(r)) => p2sh(r),
            (KeyringKind::WitnessMultisig, Some(r)) => p2wsh(r),
            (KeyringKind::NestedWitnessMultisig, Some(r)) => p2sh(&p2wsh(r)),
            (k, None) => {
                return Err(Error::InvalidInput(format!("{k} keyring without redeem script")))
            }
        };

        Ok(s)
    }

    fn compressed(&self) -> Result<CompressedPublicKey, Error> {
        match self.public_key.compressed {
            true => Ok(CompressedPublicKey(self.public_key.inner)),
            false => Err(Error::InvalidInput(
                "witness spends require compressed keys".to_string(),
            )),
        }
    }
}
