// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Signing devices
//!
//! Every backend implements [Signing] for the four signing operations and
//! [Device] for lifecycle, [GenericDevice] closes over the supported
//! variants for enum dispatch.
//!
//! Operations on a device are serialised by a per-device FIFO mutex,
//! a call only begins once every previously issued call has completed.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};

use hwsigner_core::{
    bitcoin::{bip32::Xpub, ecdsa, Transaction},
    helpers::{
        apply_cosigner_signatures, apply_multisig, apply_single, input_map, match_inputs, Keyring,
    },
    InputData, Path,
};

use crate::{Error, Vendor};

pub mod ledger;
pub use ledger::LedgerDevice;

pub mod trezor;
pub use trezor::TrezorDevice;

mod memory;
pub use memory::MemoryDevice;

/// Device descriptor
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub vendor: Vendor,
    /// Transport-scoped handle, valid while connected
    pub handle: String,
    /// Device-scoped identifier, stable across reconnections
    pub key: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
}

impl DeviceInfo {
    /// Handle prefixed by vendor, unique across managers
    pub fn id(&self) -> String {
        format!("{}:{}", self.vendor, self.handle)
    }
}

impl std::fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:8} {:16} ({}",
            self.vendor,
            self.model.as_deref().unwrap_or("UNKNOWN"),
            self.key
        )?;

        if let Some(l) = &self.label {
            write!(f, ", {l}")?;
        }

        write!(f, ")")
    }
}

/// Signing operations, provided by devices and by anything forwarding to
/// a selected device
#[async_trait]
pub trait Signing: Send + Sync {
    /// Fetch the extended public key at `path`, the parent fingerprint is
    /// only populated when `parent_fingerprint` is set
    async fn get_public_key(&self, path: &Path, parent_fingerprint: bool) -> Result<Xpub, Error>;

    /// Sign a transaction, returning a copy with scripts and witnesses
    /// populated for the inputs described by `inputs`
    async fn sign_transaction(
        &self,
        tx: &Transaction,
        inputs: &[InputData],
    ) -> Result<Transaction, Error>;

    /// Fetch signatures aligned with `tx.input`, `None` where no input data
    /// is provided
    async fn get_signatures(
        &self,
        tx: &Transaction,
        inputs: &[InputData],
    ) -> Result<Vec<Option<ecdsa::Signature>>, Error>;

    /// Sign a message, returning a 65-byte compact recoverable signature
    async fn sign_message(&self, path: &Path, message: &[u8]) -> Result<[u8; 65], Error>;
}

/// Device lifecycle
#[async_trait]
pub trait Device: Signing {
    /// Device descriptor
    fn info(&self) -> DeviceInfo;

    fn is_open(&self) -> bool;

    fn is_destroyed(&self) -> bool;

    /// Open the device, fails once destroyed
    async fn open(&self) -> Result<(), Error>;

    /// Close the device, waiting for any in-flight operation
    async fn close(&self) -> Result<(), Error>;

    /// Destroy the device, waiting for any in-flight operation, subsequent
    /// operations fail
    async fn destroy(&self) -> Result<(), Error>;
}

/// Generic device (enum dispatch over supported backends)
#[derive(Debug)]
pub enum GenericDevice {
    Ledger(LedgerDevice),
    Trezor(TrezorDevice),
    Memory(MemoryDevice),
}

macro_rules! dispatch {
    ($s:ident, $d:ident => $e:expr) => {
        match $s {
            GenericDevice::Ledger($d) => $e,
            GenericDevice::Trezor($d) => $e,
            GenericDevice::Memory($d) => $e,
        }
    };
}

impl GenericDevice {
    pub fn vendor(&self) -> Vendor {
        match self {
            GenericDevice::Ledger(_) => Vendor::Ledger,
            GenericDevice::Trezor(_) => Vendor::Trezor,
            GenericDevice::Memory(_) => Vendor::Memory,
        }
    }

    pub fn handle(&self) -> String {
        self.info().handle
    }
}

#[async_trait]
impl Signing for GenericDevice {
    async fn get_public_key(&self, path: &Path, parent_fingerprint: bool) -> Result<Xpub, Error> {
        dispatch!(self, d => d.get_public_key(path, parent_fingerprint).await)
    }

    async fn sign_transaction(
        &self,
        tx: &Transaction,
        inputs: &[InputData],
    ) -> Result<Transaction, Error> {
        dispatch!(self, d => d.sign_transaction(tx, inputs).await)
    }

    async fn get_signatures(
        &self,
        tx: &Transaction,
        inputs: &[InputData],
    ) -> Result<Vec<Option<ecdsa::Signature>>, Error> {
        dispatch!(self, d => d.get_signatures(tx, inputs).await)
    }

    async fn sign_message(&self, path: &Path, message: &[u8]) -> Result<[u8; 65], Error> {
        dispatch!(self, d => d.sign_message(path, message).await)
    }
}

#[async_trait]
impl Device for GenericDevice {
    fn info(&self) -> DeviceInfo {
        dispatch!(self, d => d.info())
    }

    fn is_open(&self) -> bool {
        dispatch!(self, d => d.is_open())
    }

    fn is_destroyed(&self) -> bool {
        dispatch!(self, d => d.is_destroyed())
    }

    async fn open(&self) -> Result<(), Error> {
        dispatch!(self, d => d.open().await)
    }

    async fn close(&self) -> Result<(), Error> {
        dispatch!(self, d => d.close().await)
    }

    async fn destroy(&self) -> Result<(), Error> {
        dispatch!(self, d => d.destroy().await)
    }
}

impl From<LedgerDevice> for GenericDevice {
    fn from(d: LedgerDevice) -> Self {
        GenericDevice::Ledger(d)
    }
}

impl From<TrezorDevice> for GenericDevice {
    fn from(d: TrezorDevice) -> Self {
        GenericDevice::Trezor(d)
    }
}

impl From<MemoryDevice> for GenericDevice {
    fn from(d: MemoryDevice) -> Self {
        GenericDevice::Memory(d)
    }
}

/// Shared lifecycle state and operation lock for a device
#[derive(Debug)]
pub(crate) struct DeviceState {
    id: String,
    opened: AtomicBool,
    destroyed: AtomicBool,
    lock: Mutex<()>,
}

impl DeviceState {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            opened: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
            lock: Mutex::new(()),
        }
    }

    pub fn is_open(&self) -> bool {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Acquire the operation lock, checking the device is usable
    pub async fn acquire(&self) -> Result<MutexGuard<'_, ()>, Error> {
        let g = self.lock.lock().await;

        if self.is_destroyed() {
            return Err(Error::Destroyed(self.id.clone()));
        }
        if !self.is_open() {
            return Err(Error::NotOpen(self.id.clone()));
        }

        Ok(g)
    }

    pub async fn open(&self) -> Result<(), Error> {
        let _g = self.lock.lock().await;

        if self.is_destroyed() {
            return Err(Error::Destroyed(self.id.clone()));
        }

        debug!("open device {}", self.id);
        self.opened.store(true, Ordering::SeqCst);

        Ok(())
    }

    pub async fn close(&self) {
        let _g = self.lock.lock().await;

        debug!("close device {}", self.id);
        self.opened.store(false, Ordering::SeqCst);
    }

    pub async fn destroy(&self) {
        // Mark first so queued operations fail once they acquire the lock
        self.destroyed.store(true, Ordering::SeqCst);

        let _g = self.lock.lock().await;

        debug!("destroy device {}", self.id);
        self.opened.store(false, Ordering::SeqCst);
    }
}

/// Device signature for one input
#[derive(Clone, Debug)]
pub(crate) struct InputSignature {
    pub index: usize,
    pub ring: Keyring,
    pub signature: ecdsa::Signature,
}

/// Signatures aligned with transaction inputs
pub(crate) fn align_signatures(
    tx: &Transaction,
    signed: &[InputSignature],
) -> Vec<Option<ecdsa::Signature>> {
    let mut out = vec![None; tx.input.len()];
    for s in signed {
        if let Some(o) = out.get_mut(s.index) {
            *o = Some(s.signature);
        }
    }
    out
}

/// Apply device and cosigner signatures to a copy of `tx`
pub(crate) fn apply_signatures(
    tx: &Transaction,
    inputs: &[InputData],
    signed: &[InputSignature],
) -> Result<Transaction, Error> {
    let map = input_map(inputs)?;
    let matched = match_inputs(tx, &map);

    let mut out = tx.clone();

    for s in signed {
        match s.ring.kind().is_multisig() {
            true => {
                apply_multisig(&mut out, s.index, &s.ring, &s.signature)?;
            }
            false => apply_single(&mut out, s.index, &s.ring, &s.signature)?,
        }
    }

    for input in matched.into_iter().flatten() {
        apply_cosigner_signatures(&mut out, input)?;
    }

    Ok(out)
}

/// Check every input data entry is spent by `tx`
pub(crate) fn check_inputs(tx: &Transaction, inputs: &[InputData]) -> Result<(), Error> {
    let map = input_map(inputs)?;
    let matched = match_inputs(tx, &map).into_iter().flatten().count();

    if matched != inputs.len() {
        return Err(Error::InvalidRequest(format!(
            "{} input data entries do not match transaction inputs",
            inputs.len() - matched
        )));
    }

    Ok(())
}
