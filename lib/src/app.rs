// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Application operations
//!
//! Helpers combining a [Signing] device with wallet collaborators:
//! authentication tokens, input data preparation for single-key and
//! multisig wallets, and account path discovery.

use std::collections::BTreeMap;

use async_trait::async_trait;
use blake2::{digest::typenum, Blake2b, Digest};
use log::debug;
use serde::{Deserialize, Serialize};

use hwsigner_core::{
    bitcoin::{Script, Transaction, Txid},
    harden,
    input_data::PrevTx,
    xkey, Coin, InputData, InputDataOptions, Multisig, Network, Path, PublicKeyInfo,
};

use crate::{Error, Signing};

type Blake2b256 = Blake2b<typenum::U32>;

/// Default wallet account name
pub const DEFAULT_ACCOUNT: &str = "default";

/// Account purposes tried by [get_known_paths]
pub const KNOWN_PURPOSES: [u32; 2] = [44, 48];

fn invalid(msg: impl Into<String>) -> Error {
    hwsigner_core::Error::InvalidInput(msg.into()).into()
}

/// Compute an authentication token for a device
///
/// The token is the Blake2b-256 hash of the compressed public key at
/// `path`.
pub async fn generate_token<S: Signing + ?Sized>(
    dev: &S,
    path: Option<&Path>,
) -> Result<[u8; 32], Error> {
    let path = path.ok_or_else(|| invalid("token path is required"))?;

    let xpub = dev.get_public_key(path, false).await?;

    let mut h = Blake2b256::new();
    h.update(xpub.public_key.serialize());

    let mut token = [0u8; 32];
    token.copy_from_slice(&h.finalize());
    Ok(token)
}

/// Compute an authentication token as lowercase hex
pub async fn generate_token_hex<S: Signing + ?Sized>(
    dev: &S,
    path: Option<&Path>,
) -> Result<String, Error> {
    generate_token(dev, path).await.map(hex::encode)
}

/// Wallet account information
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountInfo {
    pub name: String,
    /// Account extended public key (base58)
    pub account_key: String,
    /// Whether account addresses are witness addresses
    pub witness: bool,
}

/// Wallet key metadata for an owned script
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyInfo {
    pub branch: u32,
    pub index: u32,
    pub witness: bool,
}

/// Single-key wallet collaborator
#[async_trait]
pub trait Wallet: Send + Sync {
    /// Fetch account information
    async fn account(&self, name: &str) -> Result<AccountInfo, Error>;

    /// List account names
    async fn accounts(&self) -> Result<Vec<String>, Error>;

    /// Fetch a transaction known to the wallet
    async fn transaction(&self, txid: &Txid) -> Result<Option<Transaction>, Error>;

    /// Lookup key metadata for an owned output script
    async fn key(&self, script: &Script) -> Result<Option<KeyInfo>, Error>;

    /// Account extended public keys for every account
    async fn account_keys(&self) -> Result<Vec<String>, Error> {
        let mut keys = vec![];
        for name in self.accounts().await? {
            keys.push(self.account(&name).await?.account_key);
        }
        Ok(keys)
    }
}

/// Multisig cosigner
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CosignerInfo {
    pub name: String,
    pub account_key: String,
}

/// Multisig wallet information
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultisigInfo {
    pub m: usize,
    pub n: usize,
    pub witness: bool,
    /// Account key for this cosigner
    pub account_key: String,
    /// Every cosigner, including this one
    pub cosigners: Vec<CosignerInfo>,
}

/// Relative path of an owned input under the account key
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PathTail {
    pub branch: u32,
    pub index: u32,
}

/// Multisig spending proposal
#[derive(Clone, Debug, PartialEq)]
pub struct ProposalInfo {
    /// Unsigned transaction
    pub tx: Transaction,
    /// Path tails aligned with `tx` inputs, `None` for external inputs
    pub paths: Vec<Option<PathTail>>,
    /// Funding transactions
    pub txs: Vec<Transaction>,
}

/// Multisig wallet collaborator
#[async_trait]
pub trait MultisigWallet: Send + Sync {
    /// Fetch wallet information
    async fn info(&self) -> Result<MultisigInfo, Error>;

    /// Fetch a proposal by id
    async fn proposal(&self, id: u64) -> Result<ProposalInfo, Error>;
}

/// Options for [prepare_sign]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PrepareSignOptions {
    /// Account-level path used for every input
    pub path: Option<Path>,
    /// Full paths aligned with transaction inputs, used verbatim
    pub paths: Option<Vec<Path>>,
    /// Wallet account, used where neither path is provided
    pub account: Option<String>,
    pub network: Network,
}

/// Check an account-level path matches the network coin type
fn check_account_path(path: &Path, network: Network) -> Result<(), Error> {
    if path.depth() != 3 {
        return Err(invalid(format!(
            "account path {path} must have depth 3"
        )));
    }

    if path.coin() != Some(harden(network.coin_type())) {
        return Err(invalid(format!(
            "account path {path} does not match network {network}"
        )));
    }

    Ok(())
}

/// Build [InputData] for every input of `tx` using a wallet collaborator
pub async fn prepare_sign(
    tx: &Transaction,
    wallet: &dyn Wallet,
    opts: &PrepareSignOptions,
) -> Result<Vec<InputData>, Error> {
    if let Some(paths) = &opts.paths {
        if paths.len() != tx.input.len() {
            return Err(invalid(format!(
                "{} paths for {} inputs",
                paths.len(),
                tx.input.len()
            )));
        }
    }

    let base = match (&opts.paths, &opts.path) {
        (Some(_), _) => None,
        (None, Some(p)) if p.depth() == 3 => {
            check_account_path(p, opts.network)?;
            Some(p.clone())
        }
        (None, p) => {
            if let Some(p) = p {
                debug!("{p} is not an account path, using wallet account");
            }

            let name = opts.account.as_deref().unwrap_or(DEFAULT_ACCOUNT);
            let account = wallet.account(name).await?;
            let p = Path::from_account_public_key(&account.account_key)?;
            check_account_path(&p, opts.network)?;
            Some(p)
        }
    };

    let mut inputs = Vec::with_capacity(tx.input.len());

    for (i, txin) in tx.input.iter().enumerate() {
        let prevout = txin.previous_output;

        let prev = wallet
            .transaction(&prevout.txid)
            .await?
            .ok_or_else(|| invalid(format!("missing previous transaction for {prevout}")))?;

        let coin = Coin::from_tx(&prev, prevout.vout)?;
        let key = wallet.key(coin.script()).await?;

        let (path, witness) = match (&opts.paths, &base, key) {
            (Some(paths), _, key) => {
                let witness = match key {
                    Some(k) => k.witness,
                    None => coin.coin_type().is_segwit(),
                };
                (paths[i].clone(), witness)
            }
            (None, Some(base), Some(k)) => (
                base.push(k.branch, false)?.push(k.index, false)?,
                k.witness,
            ),
            (None, _, _) => {
                return Err(invalid(format!("no wallet key for input {prevout}")));
            }
        };

        debug!("input {i}: {prevout} path: {path} witness: {witness}");

        inputs.push(InputData::new(InputDataOptions {
            path: Some(path),
            witness,
            coin: Some(coin),
            prev_tx: Some(PrevTx::Tx(prev)),
            ..Default::default()
        })?);
    }

    Ok(inputs)
}

/// Build the unsigned transaction and [InputData] for a multisig proposal
pub async fn prepare_sign_multisig(
    wallet: &dyn MultisigWallet,
    id: u64,
    path: &Path,
    network: Network,
) -> Result<(Transaction, Vec<InputData>), Error> {
    check_account_path(path, network)?;

    let info = wallet.info().await?;
    if info.cosigners.len() != info.n {
        return Err(invalid(format!(
            "expected {} cosigners, wallet lists {}",
            info.n,
            info.cosigners.len()
        )));
    }

    let proposal = wallet.proposal(id).await?;
    let tx = proposal.tx;

    let mut inputs = Vec::with_capacity(tx.input.len());

    for (i, txin) in tx.input.iter().enumerate() {
        let prevout = txin.previous_output;

        let tail = match proposal.paths.get(i) {
            Some(Some(t)) => *t,
            _ => {
                return Err(hwsigner_core::Error::UnsupportedInput(format!(
                    "external input {prevout}"
                ))
                .into())
            }
        };

        let prev = proposal
            .txs
            .iter()
            .find(|t| t.compute_txid() == prevout.txid)
            .cloned()
            .ok_or_else(|| invalid(format!("missing previous transaction for {prevout}")))?;

        let coin = Coin::from_tx(&prev, prevout.vout)?;

        let pubkeys = info
            .cosigners
            .iter()
            .map(|c| PublicKeyInfo::new(c.account_key.clone(), &[tail.branch, tail.index]))
            .collect();

        inputs.push(InputData::new(InputDataOptions {
            path: Some(path.push(tail.branch, false)?.push(tail.index, false)?),
            witness: info.witness,
            coin: Some(coin),
            prev_tx: Some(PrevTx::Tx(prev)),
            multisig: Some(Multisig::new(info.m, pubkeys)?),
            ..Default::default()
        })?);
    }

    Ok((tx, inputs))
}

/// Find the first account key derivable from the device
///
/// Each key is mapped to an account path via its version prefix, only
/// keys for the network coin type are tried.
pub async fn guess_path<S: Signing + ?Sized>(
    dev: &S,
    account_keys: &[String],
    network: Network,
) -> Result<Option<Path>, Error> {
    for k in account_keys {
        let path = match Path::from_account_public_key(k) {
            Ok(p) => p,
            Err(e) => {
                debug!("skipping account key {k}: {e}");
                continue;
            }
        };

        if path.coin() != Some(harden(network.coin_type())) {
            continue;
        }

        let (_, expected) = xkey::parse_xpub(k)?;
        let xpub = dev.get_public_key(&path, false).await?;

        if xkey::same_key(&xpub, &expected) {
            return Ok(Some(path));
        }
    }

    Ok(None)
}

/// Resolve device paths for account keys, trying each known purpose
///
/// Keys that do not parse or match no purpose map to `None`.
pub async fn get_known_paths<S: Signing + ?Sized>(
    dev: &S,
    account_keys: &[String],
) -> Result<BTreeMap<String, Option<String>>, Error> {
    let mut paths = BTreeMap::new();

    for k in account_keys {
        let (network, expected) = match xkey::parse_xpub(k) {
            Ok(v) => v,
            Err(e) => {
                debug!("unresolved account key {k}: {e}");
                paths.insert(k.clone(), None);
                continue;
            }
        };

        let mut found = None;

        if expected.depth == 3 {
            for purpose in KNOWN_PURPOSES {
                let path = Path::from_list(
                    &[
                        harden(purpose),
                        harden(network.coin_type()),
                        u32::from(expected.child_number),
                    ],
                    false,
                )?;

                let xpub = dev.get_public_key(&path, false).await?;
                if xkey::same_key(&xpub, &expected) {
                    found = Some(path.to_string());
                    break;
                }
            }
        }

        paths.insert(k.clone(), found);
    }

    Ok(paths)
}

/// Signing options
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignOptions {
    /// Request the caller broadcast the signed transaction
    #[serde(default)]
    pub broadcast: bool,
}

/// Signed transaction with the caller's broadcast request
#[derive(Clone, Debug, PartialEq)]
pub struct SignedTx {
    pub tx: Transaction,
    pub broadcast: bool,
}

/// Sign a transaction, returning it with the broadcast flag
pub async fn sign<S: Signing + ?Sized>(
    dev: &S,
    tx: &Transaction,
    inputs: &[InputData],
    opts: &SignOptions,
) -> Result<SignedTx, Error> {
    let tx = dev.sign_transaction(tx, inputs).await?;

    Ok(SignedTx {
        tx,
        broadcast: opts.broadcast,
    })
}
