// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Trezor session devices
//!
//! [TrezorDevice] translates [InputData] into session library requests
//! (see [adapter]) and drives an acquired [TrezorSession].

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use log::debug;

use hwsigner_core::{
    bitcoin::{
        bip32::Xpub, consensus::encode::deserialize, ecdsa, secp256k1, sighash::EcdsaSighashType,
        Transaction,
    },
    helpers::{apply_scripts, input_map, match_inputs},
    xkey, InputData, Network, Path,
};

use super::{check_inputs, Device, DeviceInfo, DeviceState, Signing};
use crate::Error;

pub mod adapter;

pub mod types;
use types::*;

/// Acquired session with a Trezor device
#[async_trait]
pub trait TrezorSession: Send + Sync {
    /// Fetch the public node at `path`
    async fn get_public_key(&self, path: &[u32], coin: &str) -> Result<PublicNode, Error>;

    /// Sign a transaction
    async fn sign_transaction(&self, req: &SignTxRequest) -> Result<SignTxResponse, Error>;

    /// Sign a message with the key at `path`
    async fn sign_message(
        &self,
        path: &[u32],
        message: &[u8],
        coin: &str,
    ) -> Result<MessageSignature, Error>;

    /// Release the session
    async fn release(&self) -> Result<(), Error>;
}

/// Session signing device
pub struct TrezorDevice {
    info: RwLock<DeviceInfo>,
    network: Network,
    session: Arc<dyn TrezorSession>,
    state: DeviceState,
}

impl TrezorDevice {
    pub fn new(info: DeviceInfo, network: Network, session: Arc<dyn TrezorSession>) -> Self {
        let state = DeviceState::new(info.id());
        Self {
            info: RwLock::new(info),
            network,
            session,
            state,
        }
    }

    /// Update device attributes in place (label, model)
    pub fn update(&self, label: Option<String>, model: Option<String>) {
        let mut i = match self.info.write() {
            Ok(i) => i,
            Err(p) => p.into_inner(),
        };

        if label.is_some() {
            i.label = label;
        }
        if model.is_some() {
            i.model = model;
        }
    }

    fn coin(&self) -> &'static str {
        coin_name(self.network)
    }

    async fn sign(
        &self,
        tx: &Transaction,
        inputs: &[InputData],
    ) -> Result<SignTxResponse, Error> {
        check_inputs(tx, inputs)?;

        let req = adapter::build_request(tx, inputs, self.network)?;

        debug!(
            "signing {} inputs ({} reference transactions) on {}",
            req.inputs.len(),
            req.ref_txs.len(),
            self.info().id()
        );

        let resp = self.session.sign_transaction(&req).await?;

        if resp.signatures.len() != tx.input.len() {
            return Err(Error::UnexpectedResponse);
        }

        Ok(resp)
    }
}

impl std::fmt::Debug for TrezorDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrezorDevice")
            .field("info", &self.info())
            .field("network", &self.network)
            .field("state", &self.state)
            .finish()
    }
}

#[async_trait]
impl Signing for TrezorDevice {
    async fn get_public_key(&self, path: &Path, parent_fingerprint: bool) -> Result<Xpub, Error> {
        let _g = self.state.acquire().await?;

        let n = self
            .session
            .get_public_key(path.as_slice(), self.coin())
            .await?;
        let xpub = n.node.to_xpub(self.network)?;

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

        let resp = self.sign(tx, inputs).await?;

        let raw = hex::decode(&resp.serialized_tx).map_err(|_| Error::UnexpectedResponse)?;
        let signed: Transaction = deserialize(&raw).map_err(|_| Error::UnexpectedResponse)?;

        let mut out = tx.clone();
        apply_scripts(&mut out, &signed)?;

        Ok(out)
    }

    async fn get_signatures(
        &self,
        tx: &Transaction,
        inputs: &[InputData],
    ) -> Result<Vec<Option<ecdsa::Signature>>, Error> {
        let _g = self.state.acquire().await?;

        let resp = self.sign(tx, inputs).await?;

        let map = input_map(inputs)?;
        let mut sigs = Vec::with_capacity(tx.input.len());

        for (input, s) in match_inputs(tx, &map).into_iter().zip(&resp.signatures) {
            let sig = match (input, s.is_empty()) {
                (Some(_), false) => {
                    let der = hex::decode(s).map_err(|_| Error::UnexpectedResponse)?;
                    let signature = secp256k1::ecdsa::Signature::from_der(&der)
                        .map_err(|_| Error::UnexpectedResponse)?;
                    Some(ecdsa::Signature {
                        signature,
                        sighash_type: EcdsaSighashType::All,
                    })
                }
                _ => None,
            };
            sigs.push(sig);
        }

        Ok(sigs)
    }

    async fn sign_message(&self, path: &Path, message: &[u8]) -> Result<[u8; 65], Error> {
        let _g = self.state.acquire().await?;

        let r = self
            .session
            .sign_message(path.as_slice(), message, self.coin())
            .await?;

        let mut sig = [0u8; 65];
        hex::decode_to_slice(&r.signature, &mut sig).map_err(|_| Error::UnexpectedResponse)?;

        Ok(sig)
    }
}

#[async_trait]
impl Device for TrezorDevice {
    fn info(&self) -> DeviceInfo {
        match self.info.read() {
            Ok(i) => i.clone(),
            Err(p) => p.into_inner().clone(),
        }
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

        if let Err(e) = self.session.release().await {
            debug!("{} session release failed: {e}", self.info().id());
        }

        Ok(())
    }
}
