// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Ledger APDU devices
//!
//! [LedgerDevice] adapts [InputData] to the per-input records the Bitcoin
//! application expects and drives any [LedgerApp] implementation, usually
//! [LedgerBtc] over a connected transport.

use std::sync::Arc;

use async_trait::async_trait;
use log::debug;

use hwsigner_core::{
    bitcoin::{bip32::Xpub, ecdsa, secp256k1, Amount, OutPoint, PublicKey, ScriptBuf, Transaction},
    helpers::{input_map, is_nested, is_segwit, match_inputs, redeem_script, Keyring},
    xkey, InputData, Network, Path,
};

use super::{
    align_signatures, apply_signatures, check_inputs, Device, DeviceInfo, DeviceState,
    InputSignature, Signing,
};
use crate::Error;

mod btc;
pub use btc::LedgerBtc;

/// Public key and chain code reported by the device
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LedgerPublicKey {
    pub public_key: secp256k1::PublicKey,
    pub chain_code: [u8; 32],
}

/// Per-input record for the Bitcoin application
#[derive(Clone, Debug, PartialEq)]
pub struct LedgerInput {
    /// Signing key derivation path
    pub path: Vec<u32>,
    pub prevout: OutPoint,
    pub value: Amount,
    /// Funding transaction, required for legacy inputs
    pub prev_tx: Option<Transaction>,
    /// Script committed to by the signature
    pub script_code: ScriptBuf,
    /// Spend via the witness (native or nested)
    pub witness: bool,
}

impl LedgerInput {
    /// Compute the witness flag for an input
    pub fn witness_flag(input: &InputData) -> Result<bool, Error> {
        let coin = input.coin().script();
        let redeem = input.multisig().map(redeem_script).transpose()?;

        Ok(is_segwit(coin) || is_nested(coin, redeem.as_deref(), input.witness()))
    }

    /// Build an input record from input data and the signing keyring
    pub fn new(input: &InputData, ring: &Keyring) -> Result<Self, Error> {
        let witness = Self::witness_flag(input)?;

        if !witness && input.prev_tx().is_none() {
            return Err(Error::InvalidRequest(format!(
                "previous transaction required for legacy input {}",
                input.key()
            )));
        }

        Ok(Self {
            path: input.path().to_list(),
            prevout: input.prevout(),
            value: input.value(),
            prev_tx: input.prev_tx().cloned(),
            script_code: ring.script_code()?,
            witness,
        })
    }
}

/// Check input records against a transaction prior to signing
pub(crate) fn check_ledger_inputs(tx: &Transaction, inputs: &[LedgerInput]) -> Result<(), Error> {
    if inputs.len() != tx.input.len() {
        return Err(Error::InvalidRequest(format!(
            "{} inputs provided for {} transaction inputs",
            inputs.len(),
            tx.input.len()
        )));
    }

    for (i, (txin, li)) in tx.input.iter().zip(inputs).enumerate() {
        if txin.previous_output != li.prevout {
            return Err(Error::InvalidRequest(format!(
                "input {i} does not spend {}",
                li.prevout
            )));
        }

        if !li.witness && li.prev_tx.is_none() {
            return Err(Error::InvalidRequest(format!(
                "previous transaction required for legacy input {}",
                li.prevout
            )));
        }
    }

    let witness = inputs.iter().filter(|i| i.witness).count();
    if witness != 0 && witness != inputs.len() {
        return Err(Error::UnsupportedInput(
            "mixed legacy and witness inputs".to_string(),
        ));
    }

    Ok(())
}

/// Bitcoin application operations
#[async_trait]
pub trait LedgerApp: Send + Sync {
    /// Fetch the application version
    async fn app_version(&self) -> Result<String, Error>;

    /// Fetch the public key and chain code at `path`
    async fn get_public_key(&self, path: &[u32]) -> Result<LedgerPublicKey, Error>;

    /// Sign every input of `tx`, `inputs` must align with `tx.input`
    async fn sign_transaction(
        &self,
        tx: &Transaction,
        inputs: &[LedgerInput],
    ) -> Result<Vec<ecdsa::Signature>, Error>;

    /// Sign a message, returning a compact recoverable signature
    async fn sign_message(&self, path: &[u32], message: &[u8]) -> Result<[u8; 65], Error>;
}

/// APDU signing device
pub struct LedgerDevice {
    info: DeviceInfo,
    network: Network,
    app: Arc<dyn LedgerApp>,
    state: DeviceState,
}

impl LedgerDevice {
    pub fn new(info: DeviceInfo, network: Network, app: Arc<dyn LedgerApp>) -> Self {
        let state = DeviceState::new(info.id());
        Self {
            info,
            network,
            app,
            state,
        }
    }

    async fn public_key(&self, path: &Path, parent_fingerprint: bool) -> Result<Xpub, Error> {
        let k = self.app.get_public_key(path.as_slice()).await?;

        let list = path.as_slice();
        let depth = u8::try_from(list.len())
            .map_err(|_| Error::InvalidRequest(format!("path {path} too deep")))?;

        let fingerprint = match (parent_fingerprint, list.split_last()) {
            (true, Some((_, parent))) => {
                let p = self.app.get_public_key(parent).await?;
                xkey::fingerprint(&p.public_key)
            }
            _ => [0u8; 4],
        };

        let child = list.last().copied().unwrap_or(0);

        Ok(xkey::build_xpub(
            self.network,
            depth,
            fingerprint,
            child,
            k.chain_code,
            &k.public_key,
        )?)
    }

    async fn sign_inputs(
        &self,
        tx: &Transaction,
        inputs: &[InputData],
    ) -> Result<Vec<InputSignature>, Error> {
        check_inputs(tx, inputs)?;

        let map = input_map(inputs)?;
        let matched = match_inputs(tx, &map);

        // Validate before any transport interaction
        let mut witness = 0;
        for (index, input) in matched.iter().enumerate() {
            let input = input.ok_or_else(|| {
                Error::InvalidRequest(format!("input data required for input {index}"))
            })?;

            match LedgerInput::witness_flag(input)? {
                true => witness += 1,
                false if input.prev_tx().is_none() => {
                    return Err(Error::InvalidRequest(format!(
                        "previous transaction required for legacy input {}",
                        input.key()
                    )))
                }
                false => (),
            }
        }
        if witness != 0 && witness != matched.len() {
            return Err(Error::UnsupportedInput(
                "mixed legacy and witness inputs".to_string(),
            ));
        }

        let mut rings = Vec::with_capacity(matched.len());
        let mut records = Vec::with_capacity(matched.len());

        for input in matched.iter().flatten() {
            let k = self.app.get_public_key(input.path().as_slice()).await?;
            let ring = Keyring::new(input, PublicKey::new(k.public_key))?;

            records.push(LedgerInput::new(input, &ring)?);
            rings.push(ring);
        }

        debug!("signing {} inputs on {}", records.len(), self.info.id());

        let sigs = self.app.sign_transaction(tx, &records).await?;
        if sigs.len() != records.len() {
            return Err(Error::UnexpectedResponse);
        }

        Ok(rings
            .into_iter()
            .zip(sigs)
            .enumerate()
            .map(|(index, (ring, signature))| InputSignature {
                index,
                ring,
                signature,
            })
            .collect())
    }
}

impl std::fmt::Debug for LedgerDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerDevice")
            .field("info", &self.info)
            .field("network", &self.network)
            .field("state", &self.state)
            .finish()
    }
}

#[async_trait]
impl Signing for LedgerDevice {
    async fn get_public_key(&self, path: &Path, parent_fingerprint: bool) -> Result<Xpub, Error> {
        let _g = self.state.acquire().await?;
        self.public_key(path, parent_fingerprint).await
    }

    async fn sign_transaction(
        &self,
        tx: &Transaction,
        inputs: &[InputData],
    ) -> Result<Transaction, Error> {
        let _g = self.state.acquire().await?;

        let signed = self.sign_inputs(tx, inputs).await?;
        apply_signatures(tx, inputs, &signed)
    }

    async fn get_signatures(
        &self,
        tx: &Transaction,
        inputs: &[InputData],
    ) -> Result<Vec<Option<ecdsa::Signature>>, Error> {
        let _g = self.state.acquire().await?;

        let signed = self.sign_inputs(tx, inputs).await?;
        Ok(align_signatures(tx, &signed))
    }

    async fn sign_message(&self, path: &Path, message: &[u8]) -> Result<[u8; 65], Error> {
        let _g = self.state.acquire().await?;
        self.app.sign_message(path.as_slice(), message).await
    }
}

#[async_trait]
impl Device for LedgerDevice {
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
        self.state.open().await?;

        match self.app.app_version().await {
            Ok(v) => debug!("{} bitcoin app version {v}", self.info.id()),
            Err(e) => debug!("{} app version unavailable: {e}", self.info.id()),
        }

        Ok(())
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
