// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Per-input signing metadata
//!
//! [InputData] carries everything a backend adapter needs to sign one
//! transaction input: the derivation path of the signing key, the coin being
//! spent, the funding transaction where the backend requires it, and for
//! multisig inputs the cosigner descriptors used to rebuild the redeem script.

use bitcoin::{
    consensus::encode::{deserialize, serialize},
    ecdsa, Amount, OutPoint, Transaction, TxOut,
};
use serde::{Deserialize, Serialize};

use crate::{xkey, Coin, CoinType, Error, Path};

/// Maximum number of multisig cosigners
pub const MAX_MULTISIG_KEYS: usize = 16;

/// Cosigner descriptor for a multisig input
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKeyInfo {
    /// Cosigner account-level extended public key (base58)
    pub xpub: String,
    /// Relative derivation path from the account key, usually `[branch, index]`
    pub path: Vec<u32>,
    /// Signature provided by this cosigner, if any
    pub signature: Option<ecdsa::Signature>,
}

impl PublicKeyInfo {
    /// Create a descriptor without a signature
    pub fn new(xpub: impl Into<String>, path: &[u32]) -> Self {
        Self {
            xpub: xpub.into(),
            path: path.to_vec(),
            signature: None,
        }
    }

    /// Attach a cosigner signature
    pub fn with_signature(mut self, signature: ecdsa::Signature) -> Self {
        self.signature = Some(signature);
        self
    }

    /// Derive the cosigner child public key for this input
    pub fn derive(&self) -> Result<bitcoin::PublicKey, Error> {
        let (_n, xpub) = xkey::parse_xpub(&self.xpub)?;
        let child = xkey::derive_child(&xpub, &self.path)?;
        Ok(bitcoin::PublicKey::new(child.public_key))
    }
}

/// Multisig descriptor, `m` of `pubkeys.len()`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Multisig {
    pub m: usize,
    pub pubkeys: Vec<PublicKeyInfo>,
}

impl Multisig {
    /// Create and validate a multisig descriptor
    pub fn new(m: usize, pubkeys: Vec<PublicKeyInfo>) -> Result<Self, Error> {
        let v = Self { m, pubkeys };
        v.validate()?;
        Ok(v)
    }

    /// Number of cosigners
    pub fn n(&self) -> usize {
        self.pubkeys.len()
    }

    /// Check threshold and key bounds, and that every key derives
    pub fn validate(&self) -> Result<(), Error> {
        if self.pubkeys.is_empty() {
            return Err(Error::InvalidInput("multisig requires public keys".to_string()));
        }

        if self.m < 1 || self.m > MAX_MULTISIG_KEYS {
            return Err(Error::InvalidInput(format!(
                "multisig threshold {} out of range",
                self.m
            )));
        }

        if self.pubkeys.len() > MAX_MULTISIG_KEYS || self.m > self.pubkeys.len() {
            return Err(Error::InvalidInput(format!(
                "invalid multisig {}-of-{}",
                self.m,
                self.pubkeys.len()
            )));
        }

        for k in &self.pubkeys {
            k.derive()?;
        }

        Ok(())
    }

    /// Signatures already provided by cosigners
    pub fn signatures(&self) -> impl Iterator<Item = (&PublicKeyInfo, &ecdsa::Signature)> {
        self.pubkeys
            .iter()
            .filter_map(|k| k.signature.as_ref().map(|s| (k, s)))
    }
}

/// Previous transaction source, raw bytes, hex or decoded
#[derive(Clone, Debug, PartialEq)]
pub enum PrevTx {
    Raw(Vec<u8>),
    Hex(String),
    Tx(Transaction),
}

impl PrevTx {
    /// Decode to a [Transaction]
    pub fn decode(self) -> Result<Transaction, Error> {
        match self {
            PrevTx::Raw(b) => Ok(deserialize(&b)?),
            PrevTx::Hex(s) => Ok(deserialize(&hex::decode(s.trim())?)?),
            PrevTx::Tx(t) => Ok(t),
        }
    }
}

impl From<Transaction> for PrevTx {
    fn from(t: Transaction) -> Self {
        PrevTx::Tx(t)
    }
}

/// Options for constructing [InputData]
///
/// Either `coin`, or `prevout` together with `output` or `prev_tx`, must
/// be provided.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InputDataOptions {
    pub path: Option<Path>,
    pub witness: bool,
    pub prevout: Option<OutPoint>,
    pub output: Option<TxOut>,
    pub coin: Option<Coin>,
    pub prev_tx: Option<PrevTx>,
    pub multisig: Option<Multisig>,
}

/// Signing metadata for a single transaction input
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "InputDataJson", into = "InputDataJson")]
pub struct InputData {
    path: Path,
    witness: bool,
    coin: Coin,
    prev_tx: Option<Transaction>,
    multisig: Option<Multisig>,
}

impl InputData {
    /// Build input data from options, validating all fields
    pub fn new(opts: InputDataOptions) -> Result<Self, Error> {
        let InputDataOptions {
            path,
            witness,
            prevout,
            output,
            coin,
            prev_tx,
            multisig,
        } = opts;

        let path = path.ok_or_else(|| Error::InvalidInput("path is required".to_string()))?;

        let prev_tx = prev_tx.map(PrevTx::decode).transpose()?;

        let coin = match (coin, prevout, output) {
            (Some(c), None, None) => c,
            (Some(c), Some(p), None) if c.outpoint == p => c,
            (Some(_), _, _) => {
                return Err(Error::InvalidInput(
                    "coin and prevout / output are mutually exclusive".to_string(),
                ))
            }
            (None, Some(p), Some(o)) => Coin::new(p, o),
            (None, Some(p), None) => match &prev_tx {
                Some(tx) => Coin::from_tx(tx, p.vout)?,
                None => {
                    return Err(Error::InvalidInput(format!(
                        "output for {p} is required"
                    )))
                }
            },
            (None, None, _) => {
                return Err(Error::InvalidInput("coin or prevout is required".to_string()))
            }
        };

        if let Some(tx) = &prev_tx {
            let txid = tx.compute_txid();
            if txid != coin.outpoint.txid {
                return Err(Error::InvalidInput(format!(
                    "previous transaction {txid} does not fund {}",
                    coin.outpoint
                )));
            }

            match tx.output.get(coin.outpoint.vout as usize) {
                Some(o) if o == &coin.output => (),
                _ => {
                    return Err(Error::InvalidInput(format!(
                        "previous transaction output does not match coin {}",
                        coin.outpoint
                    )))
                }
            }
        }

        if let Some(m) = &multisig {
            m.validate()?;
        }

        Ok(Self {
            path,
            witness,
            coin,
            prev_tx,
            multisig,
        })
    }

    /// Parse input data from JSON
    pub fn from_json(s: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(s)?)
    }

    /// Serialize input data to JSON
    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }

    /// Lookup key for this input (the spent outpoint)
    pub fn key(&self) -> OutPoint {
        self.coin.outpoint
    }

    /// Signing key derivation path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the input is spent via the witness
    pub fn witness(&self) -> bool {
        self.witness
    }

    pub fn coin(&self) -> &Coin {
        &self.coin
    }

    pub fn prevout(&self) -> OutPoint {
        self.coin.outpoint
    }

    pub fn output(&self) -> &TxOut {
        &self.coin.output
    }

    pub fn value(&self) -> Amount {
        self.coin.output.value
    }

    /// Funding transaction, where provided
    pub fn prev_tx(&self) -> Option<&Transaction> {
        self.prev_tx.as_ref()
    }

    pub fn multisig(&self) -> Option<&Multisig> {
        self.multisig.as_ref()
    }

    pub fn is_multisig(&self) -> bool {
        self.multisig.is_some()
    }

    /// Classify the spent output
    pub fn coin_type(&self) -> CoinType {
        self.coin.coin_type()
    }

    /// Return a copy with cosigner signatures replaced
    pub fn with_multisig(&self, multisig: Multisig) -> Result<Self, Error> {
        multisig.validate()?;

        Ok(Self {
            multisig: Some(multisig),
            ..self.clone()
        })
    }
}

/// JSON carry for [PublicKeyInfo], signatures are hex with `""` for none
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct PublicKeyInfoJson {
    xpub: String,
    path: Vec<u32>,
    #[serde(default)]
    signature: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct MultisigJson {
    m: usize,
    pubkeys: Vec<PublicKeyInfoJson>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct InputDataJson {
    path: Path,
    witness: bool,
    coin: Coin,
    #[serde(rename = "prevTX", default)]
    prev_tx: Option<String>,
    #[serde(default)]
    multisig: Option<MultisigJson>,
}

impl From<InputData> for InputDataJson {
    fn from(d: InputData) -> Self {
        Self {
            path: d.path,
            witness: d.witness,
            coin: d.coin,
            prev_tx: d.prev_tx.map(|t| hex::encode(serialize(&t))),
            multisig: d.multisig.map(|m| MultisigJson {
                m: m.m,
                pubkeys: m
                    .pubkeys
                    .into_iter()
                    .map(|k| PublicKeyInfoJson {
                        xpub: k.xpub,
                        path: k.path,
                        signature: k
                            .signature
                            .map(|s| hex::encode(s.to_vec()))
                            .unwrap_or_default(),
                    })
                    .collect(),
            }),
        }
    }
}

impl TryFrom<InputDataJson> for InputData {
    type Error = Error;

    fn try_from(j: InputDataJson) -> Result<Self, Self::Error> {
        let multisig = match j.multisig {
            Some(m) => {
                let mut pubkeys = Vec::with_capacity(m.pubkeys.len());
                for k in m.pubkeys {
                    let signature = match k.signature.is_empty() {
                        true => None,
                        false => Some(ecdsa::Signature::from_slice(&hex::decode(&k.signature)?)?),
                    };
                    pubkeys.push(PublicKeyInfo {
                        xpub: k.xpub,
                        path: k.path,
                        signature,
                    });
                }
                Some(Multisig { m: m.m, pubkeys })
            }
            None => None,
        };

        InputData::new(InputDataOptions {
            path: Some(j.path),
            witness: j.witness,
            coin: Some(j.coin),
            prev_tx: j.prev_tx.map(PrevTx::Hex),
            multisig,
            ..Default::default()
        })
    }
}
