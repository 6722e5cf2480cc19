// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Bitcoin application client for connected APDU devices
//!
//! This is generic over [Exchange] to support different transports, and
//! implements [LedgerApp] using the requests from [ledger_btc_apdu].

use std::{fmt::Display, sync::Arc, time::Duration};

use async_trait::async_trait;
use encdec::DecodeOwned;
use ledger_transport::Exchange;
use log::debug;
use tokio::sync::Mutex;

use hwsigner_core::bitcoin::{ecdsa, secp256k1, Transaction, TxOut};
use ledger_btc_apdu::prelude::*;

use super::{LedgerApp, LedgerInput, LedgerPublicKey};
use crate::{config::DEFAULT_LEDGER_TIMEOUT_MS, Error};

/// SIGHASH_ALL
const SIGHASH_ALL: u8 = 0x01;

/// Compact signature header offset for compressed keys
const COMPACT_HEADER: u8 = 27 + 4;

/// Bitcoin application handle for a connected [Exchange] device
#[derive(Clone)]
pub struct LedgerBtc<T: Exchange> {
    /// Transport for communication
    t: Arc<Mutex<T>>,
    /// Timeout for APDU requests, including user interaction
    timeout: Duration,
}

/// Create a [LedgerBtc] wrapper from a type implementing [Exchange]
impl<T: Exchange> From<T> for LedgerBtc<T> {
    fn from(t: T) -> Self {
        Self {
            t: Arc::new(Mutex::new(t)),
            timeout: Duration::from_millis(DEFAULT_LEDGER_TIMEOUT_MS as u64),
        }
    }
}

impl<T> LedgerBtc<T>
where
    T: Exchange + Send + Sync,
    T::Error: Display,
{
    /// Create a new handle with the provided request timeout
    pub fn new(t: T, timeout: Duration) -> Self {
        Self {
            t: Arc::new(Mutex::new(t)),
            timeout,
        }
    }

    /// Issue a request, returning the response payload
    async fn exchange<R: ApduReq + Sync>(&self, req: &R) -> Result<Vec<u8>, Error> {
        let cmd = req.command()?;

        debug!(
            "{} p1: {:02x} p2: {:02x} ({} bytes)",
            R::INS,
            cmd.p1,
            cmd.p2,
            cmd.data.len()
        );

        let t = self.t.lock().await;

        let resp = tokio::time::timeout(self.timeout, t.exchange(&cmd))
            .await?
            .map_err(|e| Error::Transport(e.to_string()))?;

        match resp.retcode() {
            0x9000 => Ok(resp.data().to_vec()),
            sw => {
                debug!("{} failed with status {:04x}", R::INS, sw);
                Err(Error::from_status(sw))
            }
        }
    }

    /// Issue a request and decode the response
    async fn request<R, A>(&self, req: &R) -> Result<A, Error>
    where
        R: ApduReq + Sync,
        A: DecodeOwned<Output = A, Error = ApduError>,
    {
        let data = self.exchange(req).await?;
        let (v, _n) = A::decode_owned(&data)?;
        Ok(v)
    }

    /// Fetch a trusted input for output `vout` of `prev_tx`
    async fn trusted_input(&self, prev_tx: &Transaction, vout: u32) -> Result<TrustedInput, Error> {
        let mut data = None;
        for r in TrustedInputReq::chunks(prev_tx, vout) {
            data = Some(self.exchange(&r).await?);
        }

        let data = data.ok_or(Error::UnexpectedResponse)?;
        let (t, _n) = TrustedInput::decode_owned(&data)?;

        if t.vout() != vout {
            return Err(Error::UnexpectedResponse);
        }

        Ok(t)
    }

    /// Hash transaction inputs, optionally followed by outputs
    async fn hash_inputs(
        &self,
        version: i32,
        inputs: &[HashInput],
        mode: HashMode,
        outputs: Option<&[TxOut]>,
    ) -> Result<(), Error> {
        for r in HashInputStartReq::chunks(version, inputs, mode) {
            self.exchange(&r).await?;
        }

        if let Some(o) = outputs {
            for r in HashInputFinalizeReq::chunks(o) {
                self.exchange(&r).await?;
            }
        }

        Ok(())
    }

    /// Sign the hashed transaction with the key at `path`
    async fn hash_sign(&self, path: &[u32], lock_time: u32) -> Result<ecdsa::Signature, Error> {
        let r = HashSignReq::new(path, lock_time, SIGHASH_ALL);
        let der: DerSignature = self.request(&r).await?;

        let sig = ecdsa::Signature::from_slice(&der.data).map_err(hwsigner_core::Error::from)?;
        Ok(sig)
    }

    async fn sign_legacy(
        &self,
        tx: &Transaction,
        inputs: &[LedgerInput],
    ) -> Result<Vec<ecdsa::Signature>, Error> {
        let mut trusted = Vec::with_capacity(inputs.len());
        for (txin, li) in tx.input.iter().zip(inputs) {
            let prev_tx = li.prev_tx.as_ref().ok_or_else(|| {
                Error::InvalidRequest(format!("previous transaction required for {}", li.prevout))
            })?;
            trusted.push(self.trusted_input(prev_tx, txin.previous_output.vout).await?);
        }

        let mut sigs = Vec::with_capacity(inputs.len());

        for (i, li) in inputs.iter().enumerate() {
            debug!("signing legacy input {i} at {:x?}", li.path);

            let hash_inputs: Vec<_> = tx
                .input
                .iter()
                .zip(&trusted)
                .enumerate()
                .map(|(j, (txin, t))| HashInput {
                    kind: HashInputKind::Trusted(t.clone()),
                    script: match j == i {
                        true => li.script_code.to_bytes(),
                        false => vec![],
                    },
                    sequence: txin.sequence.0,
                })
                .collect();

            let mode = match i {
                0 => HashMode::NewLegacy,
                _ => HashMode::Continue,
            };

            self.hash_inputs(tx.version.0, &hash_inputs, mode, Some(&tx.output))
                .await?;

            sigs.push(
                self.hash_sign(&li.path, tx.lock_time.to_consensus_u32())
                    .await?,
            );
        }

        Ok(sigs)
    }

    async fn sign_segwit(
        &self,
        tx: &Transaction,
        inputs: &[LedgerInput],
    ) -> Result<Vec<ecdsa::Signature>, Error> {
        let hash_input = |i: usize, script: Vec<u8>| HashInput {
            kind: HashInputKind::Segwit {
                prevout: tx.input[i].previous_output,
                value: inputs[i].value,
            },
            script,
            sequence: tx.input[i].sequence.0,
        };

        // Commit to every input and output
        let all: Vec<_> = (0..inputs.len()).map(|i| hash_input(i, vec![])).collect();
        self.hash_inputs(tx.version.0, &all, HashMode::NewSegwit, Some(&tx.output))
            .await?;

        // Then sign each input alone
        let mut sigs = Vec::with_capacity(inputs.len());
        for (i, li) in inputs.iter().enumerate() {
            debug!("signing witness input {i} at {:x?}", li.path);

            let single = [hash_input(i, li.script_code.to_bytes())];
            self.hash_inputs(tx.version.0, &single, HashMode::Continue, None)
                .await?;

            sigs.push(
                self.hash_sign(&li.path, tx.lock_time.to_consensus_u32())
                    .await?,
            );
        }

        Ok(sigs)
    }
}

#[async_trait]
impl<T> LedgerApp for LedgerBtc<T>
where
    T: Exchange + Send + Sync,
    T::Error: Display,
{
    async fn app_version(&self) -> Result<String, Error> {
        let v: FirmwareVersion = self.request(&FirmwareVersionReq {}).await?;
        Ok(v.to_string())
    }

    async fn get_public_key(&self, path: &[u32]) -> Result<LedgerPublicKey, Error> {
        let r: WalletPublicKey = self.request(&WalletPublicKeyReq::new(path)).await?;

        let public_key = secp256k1::PublicKey::from_slice(&r.public_key)
            .map_err(|_| Error::UnexpectedResponse)?;

        Ok(LedgerPublicKey {
            public_key,
            chain_code: r.chain_code,
        })
    }

    async fn sign_transaction(
        &self,
        tx: &Transaction,
        inputs: &[LedgerInput],
    ) -> Result<Vec<ecdsa::Signature>, Error> {
        super::check_ledger_inputs(tx, inputs)?;

        match inputs.iter().all(|i| i.witness) {
            true => self.sign_segwit(tx, inputs).await,
            false => self.sign_legacy(tx, inputs).await,
        }
    }

    async fn sign_message(&self, path: &[u32], message: &[u8]) -> Result<[u8; 65], Error> {
        for r in SignMessagePrepareReq::chunks(path, message)? {
            self.exchange(&r).await?;
        }

        let der: DerSignature = self.request(&SignMessageReq {}).await?;

        let sig = secp256k1::ecdsa::Signature::from_der(&der.data)
            .map_err(|_| Error::UnexpectedResponse)?;

        let mut out = [0u8; 65];
        out[0] = COMPACT_HEADER + der.parity;
        out[1..].copy_from_slice(&sig.serialize_compact());

        Ok(out)
    }
}
