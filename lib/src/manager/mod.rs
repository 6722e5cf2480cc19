// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Per-vendor device managers
//!
//! Each manager enumerates devices for one vendor, caches them by handle,
//! emits [DeviceEvent]s and tracks a single selected device.
//!
//! ```text
//!   closed ──open()──▶ idle ──select_device()──▶ selected
//!                       ▲   ◀─deselect_device()─┘
//!                       └──close()──▶ closed
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::sync::{broadcast, Mutex};

use hwsigner_core::{
    bitcoin::{bip32::Xpub, ecdsa, Transaction},
    InputData, Path,
};

use crate::{
    event::{DeviceEvent, EventSink},
    Device, DeviceInfo, Error, GenericDevice, Signing, Vendor,
};

mod ledger;
pub use ledger::{LedgerDescriptor, LedgerManager, LedgerProvider, ProviderEvent};

mod trezor;
pub use trezor::{TrezorBridge, TrezorDescriptor, TrezorEvent, TrezorManager};

mod memory;
pub use memory::MemoryManager;

/// Device selector, returns the index of the device to select
pub type Selector = Arc<dyn Fn(&[DeviceInfo]) -> Option<usize> + Send + Sync>;

/// Default selector, picks the first device
pub fn first_device() -> Selector {
    Arc::new(|d: &[DeviceInfo]| match d.is_empty() {
        true => None,
        false => Some(0),
    })
}

#[derive(Default)]
struct CoreState {
    opened: bool,
    /// Devices in connection order
    devices: Vec<Arc<GenericDevice>>,
    selected: Option<Arc<GenericDevice>>,
}

/// Device cache, selection and events shared by all managers
pub(crate) struct ManagerCore {
    vendor: Vendor,
    state: Mutex<CoreState>,
    events: EventSink,
    selector: Selector,
}

impl ManagerCore {
    pub fn new(
        vendor: Vendor,
        upstream: Option<broadcast::Sender<DeviceEvent>>,
        selector: Selector,
    ) -> Self {
        Self {
            vendor,
            state: Mutex::new(CoreState::default()),
            events: EventSink::new(upstream),
            selector,
        }
    }

    pub fn vendor(&self) -> Vendor {
        self.vendor
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }

    pub async fn is_open(&self) -> bool {
        self.state.lock().await.opened
    }

    /// Mark open, returning whether the manager was previously closed
    pub async fn open(&self) -> bool {
        let mut s = self.state.lock().await;
        let was_closed = !s.opened;
        s.opened = true;
        was_closed
    }

    /// Deselect and close every device, marking the manager closed
    pub async fn close(&self) -> Result<(), Error> {
        self.deselect().await?;

        let devices = {
            let mut s = self.state.lock().await;
            s.opened = false;
            s.devices.clone()
        };

        for d in devices {
            if d.is_open() {
                d.close().await?;
            }
        }

        Ok(())
    }

    /// Destroy and drop every cached device without events
    pub async fn clear(&self) {
        let devices = {
            let mut s = self.state.lock().await;
            s.selected = None;
            std::mem::take(&mut s.devices)
        };

        for d in devices {
            if let Err(e) = d.destroy().await {
                warn!("destroy {} failed: {e}", d.info().id());
            }
        }
    }

    /// Add a device to the cache, returns false for known handles
    pub async fn add(&self, device: GenericDevice) -> bool {
        let info = device.info();

        {
            let mut s = self.state.lock().await;
            if s.devices.iter().any(|d| d.handle() == info.handle) {
                debug!("device {} already connected", info.id());
                return false;
            }
            s.devices.push(Arc::new(device));
        }

        debug!("connect {}", info.id());
        self.events.emit(DeviceEvent::Connect(info));

        true
    }

    /// Remove a disconnected device
    ///
    /// The device is destroyed once any in-flight operation completes, and
    /// the selection cleared if it was selected.
    pub async fn remove(&self, handle: &str) -> Option<DeviceInfo> {
        let device = {
            let mut s = self.state.lock().await;

            let i = s.devices.iter().position(|d| d.handle() == handle)?;
            let d = s.devices.remove(i);

            if matches!(&s.selected, Some(sel) if Arc::ptr_eq(sel, &d)) {
                s.selected = None;
            }

            d
        };

        let info = device.info();

        if let Err(e) = device.destroy().await {
            warn!("destroy {} failed: {e}", info.id());
        }

        debug!("disconnect {}", info.id());
        self.events.emit(DeviceEvent::Disconnect(info.clone()));

        Some(info)
    }

    /// Find a cached device by handle
    pub async fn find(&self, handle: &str) -> Option<Arc<GenericDevice>> {
        let s = self.state.lock().await;
        s.devices.iter().find(|d| d.handle() == handle).cloned()
    }

    /// Cached devices in connection order
    pub async fn devices(&self) -> Vec<DeviceInfo> {
        let s = self.state.lock().await;
        s.devices.iter().map(|d| d.info()).collect()
    }

    /// Find the device a selection would target
    fn lookup(
        &self,
        s: &CoreState,
        device: Option<&DeviceInfo>,
    ) -> Result<Arc<GenericDevice>, Error> {
        if !s.opened {
            return Err(Error::Closed);
        }

        match device {
            Some(info) if info.vendor != self.vendor => {
                Err(Error::VendorMismatch(self.vendor, info.vendor))
            }
            Some(info) => s
                .devices
                .iter()
                .find(|d| d.handle() == info.handle)
                .cloned()
                .ok_or_else(|| Error::UnknownDevice(info.id())),
            None => {
                let infos: Vec<_> = s.devices.iter().map(|d| d.info()).collect();
                let i = (self.selector)(&infos).ok_or(Error::NoDevice)?;
                s.devices.get(i).cloned().ok_or(Error::NoDevice)
            }
        }
    }

    /// Resolve the device a selection would target, without selecting it
    pub async fn resolve(&self, device: Option<&DeviceInfo>) -> Result<DeviceInfo, Error> {
        let s = self.state.lock().await;
        self.lookup(&s, device).map(|d| d.info())
    }

    /// Select a device, or use the selector where none is specified
    pub async fn select(&self, device: Option<&DeviceInfo>) -> Result<DeviceInfo, Error> {
        let (target, previous) = {
            let mut s = self.state.lock().await;

            let target = self.lookup(&s, device)?;

            if let Some(sel) = &s.selected {
                if Arc::ptr_eq(sel, &target) {
                    return Ok(target.info());
                }
            }

            (target, s.selected.take())
        };

        if let Some(p) = previous {
            self.release(&p).await?;
        }

        target.open().await?;

        let info = target.info();
        self.state.lock().await.selected = Some(target);

        debug!("select {}", info.id());
        self.events.emit(DeviceEvent::Select(info.clone()));

        Ok(info)
    }

    /// Deselect the current device, if any
    pub async fn deselect(&self) -> Result<(), Error> {
        let previous = self.state.lock().await.selected.take();

        if let Some(p) = previous {
            self.release(&p).await?;
        }

        Ok(())
    }

    async fn release(&self, d: &GenericDevice) -> Result<(), Error> {
        if d.is_open() {
            d.close().await?;
        }

        let info = d.info();
        debug!("deselect {}", info.id());
        self.events.emit(DeviceEvent::Deselect(info));

        Ok(())
    }

    /// Currently selected device
    pub async fn selected(&self) -> Option<Arc<GenericDevice>> {
        self.state.lock().await.selected.clone()
    }

    /// Currently selected device, failing where none is selected
    pub async fn selected_device(&self) -> Result<Arc<GenericDevice>, Error> {
        let s = self.state.lock().await;

        if !s.opened {
            return Err(Error::Closed);
        }

        s.selected.clone().ok_or(Error::NoDeviceSelected)
    }
}

/// Generic device manager (enum dispatch over supported vendors)
pub enum DeviceManager {
    Ledger(LedgerManager),
    Trezor(TrezorManager),
    Memory(MemoryManager),
}

macro_rules! dispatch {
    ($s:ident, $m:ident => $e:expr) => {
        match $s {
            DeviceManager::Ledger($m) => $e,
            DeviceManager::Trezor($m) => $e,
            DeviceManager::Memory($m) => $e,
        }
    };
}

impl DeviceManager {
    fn core(&self) -> &ManagerCore {
        dispatch!(self, m => m.core())
    }

    pub fn vendor(&self) -> Vendor {
        self.core().vendor()
    }

    /// Open the manager, enumerating devices and subscribing to
    /// connection events
    pub async fn open(&self) -> Result<(), Error> {
        dispatch!(self, m => m.open().await)
    }

    /// Close the manager and every device
    pub async fn close(&self) -> Result<(), Error> {
        dispatch!(self, m => m.close().await)
    }

    pub async fn is_open(&self) -> bool {
        self.core().is_open().await
    }

    /// Subscribe to device events
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.core().subscribe()
    }

    async fn flush(&self) {
        if let DeviceManager::Memory(m) = self {
            m.flush().await;
        }
    }

    /// Cached devices in connection order
    pub async fn devices(&self) -> Vec<DeviceInfo> {
        self.flush().await;
        self.core().devices().await
    }

    /// Resolve the device [DeviceManager::select_device] would select
    pub async fn resolve_device(&self, device: Option<&DeviceInfo>) -> Result<DeviceInfo, Error> {
        self.flush().await;
        self.core().resolve(device).await
    }

    /// Select a device, see [ManagerCore::select]
    pub async fn select_device(&self, device: Option<&DeviceInfo>) -> Result<DeviceInfo, Error> {
        self.flush().await;
        self.core().select(device).await
    }

    pub async fn deselect_device(&self) -> Result<(), Error> {
        self.core().deselect().await
    }

    /// Currently selected device
    pub async fn selected(&self) -> Option<Arc<GenericDevice>> {
        self.core().selected().await
    }
}

impl From<LedgerManager> for DeviceManager {
    fn from(m: LedgerManager) -> Self {
        DeviceManager::Ledger(m)
    }
}

impl From<TrezorManager> for DeviceManager {
    fn from(m: TrezorManager) -> Self {
        DeviceManager::Trezor(m)
    }
}

impl From<MemoryManager> for DeviceManager {
    fn from(m: MemoryManager) -> Self {
        DeviceManager::Memory(m)
    }
}

/// Signing operations forward to the selected device
#[async_trait]
impl Signing for DeviceManager {
    async fn get_public_key(&self, path: &Path, parent_fingerprint: bool) -> Result<Xpub, Error> {
        let d = self.core().selected_device().await?;
        d.get_public_key(path, parent_fingerprint).await
    }

    async fn sign_transaction(
        &self,
        tx: &Transaction,
        inputs: &[InputData],
    ) -> Result<Transaction, Error> {
        let d = self.core().selected_device().await?;
        d.sign_transaction(tx, inputs).await
    }

    async fn get_signatures(
        &self,
        tx: &Transaction,
        inputs: &[InputData],
    ) -> Result<Vec<Option<ecdsa::Signature>>, Error> {
        let d = self.core().selected_device().await?;
        d.get_signatures(tx, inputs).await
    }

    async fn sign_message(&self, path: &Path, message: &[u8]) -> Result<[u8; 65], Error> {
        let d = self.core().selected_device().await?;
        d.sign_message(path, message).await
    }
}
