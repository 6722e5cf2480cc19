// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Multi-vendor signer
//!
//! [Signer] owns one [DeviceManager] per enabled vendor, aggregates their
//! lifecycle and events, and keeps at most one device selected across all
//! vendors. Signing operations forward to the selected device.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use async_trait::async_trait;
use futures::future::try_join_all;
use log::{debug, info};
use tokio::sync::{broadcast, Mutex};

use hwsigner_core::{
    bitcoin::{bip32::Xpub, ecdsa, Transaction},
    InputData, Network, Path,
};

use crate::{
    config::SignerOptions,
    event::{DeviceEvent, EVENT_CAPACITY},
    manager::{
        first_device, DeviceManager, LedgerManager, LedgerProvider, MemoryManager, Selector,
        TrezorBridge, TrezorManager,
    },
    DeviceInfo, Error, GenericDevice, MemoryDevice, Signing, Vendor,
};

/// Builder for [Signer], injecting vendor backends alongside options
pub struct SignerBuilder {
    opts: SignerOptions,
    ledger: Option<Arc<dyn LedgerProvider>>,
    trezor: Option<Arc<dyn TrezorBridge>>,
    memory: Vec<MemoryDevice>,
    selector: Selector,
}

impl SignerBuilder {
    /// Set the Ledger device provider
    pub fn ledger_provider(mut self, p: Arc<dyn LedgerProvider>) -> Self {
        self.ledger = Some(p);
        self
    }

    /// Set the Trezor bridge
    pub fn trezor_bridge(mut self, b: Arc<dyn TrezorBridge>) -> Self {
        self.trezor = Some(b);
        self
    }

    /// Add a memory device in addition to any configured by options
    pub fn memory_device(mut self, d: MemoryDevice) -> Self {
        self.memory.push(d);
        self
    }

    /// Set the device selector used by every manager
    pub fn selector(mut self, s: Selector) -> Self {
        self.selector = s;
        self
    }

    /// Build the signer
    pub fn build(self) -> Result<Signer, Error> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let network = self.opts.network;

        let mut managers = BTreeMap::new();

        for v in &self.opts.vendor {
            let m: DeviceManager = match v {
                Vendor::Ledger => {
                    let provider = match self.ledger.clone() {
                        Some(p) => p,
                        None => default_ledger_provider()?,
                    };

                    LedgerManager::new(
                        network,
                        self.opts.ledger.timeout(),
                        provider,
                        Some(events.clone()),
                        self.selector.clone(),
                    )
                    .into()
                }
                Vendor::Trezor => {
                    let bridge = self.trezor.clone().ok_or_else(|| {
                        Error::Config("TREZOR enabled without a bridge".to_string())
                    })?;

                    TrezorManager::new(
                        network,
                        self.opts.trezor.debug_trezor,
                        bridge,
                        Some(events.clone()),
                        self.selector.clone(),
                    )
                    .into()
                }
                Vendor::Memory => {
                    MemoryManager::new(Some(events.clone()), self.selector.clone()).into()
                }
            };

            managers.insert(*v, m);
        }

        if let Some(DeviceManager::Memory(m)) = managers.get(&Vendor::Memory) {
            let mut devices = vec![];
            if self.opts.memory.is_configured() {
                devices.push(MemoryDevice::from_options(&self.opts.memory, network)?);
            }
            devices.extend(self.memory);

            if devices.is_empty() {
                return Err(Error::Config(
                    "MEMORY enabled without a phrase or key".to_string(),
                ));
            }

            for d in devices {
                m.add_device(d)?;
            }
        }

        info!(
            "signer for {network} with vendors: {:?}",
            managers.keys().collect::<Vec<_>>()
        );

        Ok(Signer {
            network,
            managers,
            selected: Mutex::new(None),
            events,
        })
    }
}

#[cfg(feature = "transport_hid")]
fn default_ledger_provider() -> Result<Arc<dyn LedgerProvider>, Error> {
    Ok(Arc::new(crate::transport::HidProvider::new()?))
}

#[cfg(not(feature = "transport_hid"))]
fn default_ledger_provider() -> Result<Arc<dyn LedgerProvider>, Error> {
    Err(Error::Config(
        "LEDGER enabled without a provider".to_string(),
    ))
}

/// Multi-vendor signer
pub struct Signer {
    network: Network,
    managers: BTreeMap<Vendor, DeviceManager>,
    /// Vendor of the selected device, held across selection changes and
    /// checked against the manager on read
    selected: Mutex<Option<Vendor>>,
    events: broadcast::Sender<DeviceEvent>,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("network", &self.network)
            .field("vendors", &self.managers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Signer {
    /// Create a [SignerBuilder] from options
    pub fn builder(opts: SignerOptions) -> SignerBuilder {
        SignerBuilder {
            opts,
            ledger: None,
            trezor: None,
            memory: vec![],
            selector: first_device(),
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Enabled vendors
    pub fn vendors(&self) -> impl Iterator<Item = Vendor> + '_ {
        self.managers.keys().copied()
    }

    /// Fetch the manager for a vendor
    pub fn manager(&self, vendor: Vendor) -> Result<&DeviceManager, Error> {
        self.managers
            .get(&vendor)
            .ok_or(Error::VendorNotEnabled(vendor))
    }

    /// Subscribe to events from every manager
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }

    /// Open every manager
    pub async fn open(&self) -> Result<(), Error> {
        let opening = self.managers.iter().map(|(v, m)| {
            debug!("open {v}");
            m.open()
        });

        try_join_all(opening).await?;

        Ok(())
    }

    /// Close every manager, clearing the selection
    pub async fn close(&self) -> Result<(), Error> {
        let mut selected = self.selected.lock().await;

        for (v, m) in &self.managers {
            debug!("close {v}");
            m.close().await?;
        }

        *selected = None;

        Ok(())
    }

    /// Cached devices across vendors, keyed by `VENDOR:handle`
    pub async fn devices(&self) -> HashMap<String, DeviceInfo> {
        let mut devices = HashMap::new();

        for m in self.managers.values() {
            for d in m.devices().await {
                devices.insert(d.id(), d);
            }
        }

        devices
    }

    /// Select a device
    ///
    /// Where both `vendor` and `device` are provided they must agree,
    /// without a device the vendor manager's selector chooses one. Any
    /// device selected on another vendor is deselected first.
    pub async fn select_device(
        &self,
        vendor: Option<Vendor>,
        device: Option<&DeviceInfo>,
    ) -> Result<DeviceInfo, Error> {
        let vendor = match (vendor, device) {
            (Some(v), Some(d)) if v != d.vendor => return Err(Error::VendorMismatch(v, d.vendor)),
            (_, Some(d)) => d.vendor,
            (Some(v), None) => v,
            (None, None) => return Err(Error::VendorRequired),
        };

        let m = self.manager(vendor)?;

        let mut selected = self.selected.lock().await;

        // Resolve first so a failed select leaves other vendors untouched
        let target = m.resolve_device(device).await?;

        if let Some(prev) = *selected {
            if prev != vendor {
                self.manager(prev)?.deselect_device().await?;
                *selected = None;
            }
        }

        let info = m.select_device(Some(&target)).await?;
        *selected = Some(vendor);

        Ok(info)
    }

    /// Deselect the selected device, if any
    pub async fn deselect_device(&self) -> Result<(), Error> {
        let mut selected = self.selected.lock().await;

        if let Some(v) = selected.take() {
            self.manager(v)?.deselect_device().await?;
        }

        Ok(())
    }

    /// Vendor of the selected device
    ///
    /// Managers drop their selection when the selected device disconnects,
    /// the vendor slot is cleared to match.
    pub async fn selected_vendor(&self) -> Option<Vendor> {
        let mut selected = self.selected.lock().await;
        let v = (*selected)?;

        match self.manager(v) {
            Ok(m) if m.selected().await.is_some() => Some(v),
            _ => {
                debug!("{v} selection cleared by manager");
                *selected = None;
                None
            }
        }
    }

    /// Currently selected device
    pub async fn selected(&self) -> Option<Arc<GenericDevice>> {
        let v = (*self.selected.lock().await)?;
        self.managers.get(&v)?.selected().await
    }

    /// Add a memory device at runtime
    pub fn add_memory_device(&self, d: MemoryDevice) -> Result<(), Error> {
        match self.manager(Vendor::Memory)? {
            DeviceManager::Memory(m) => m.add_device(d),
            _ => Err(Error::VendorNotEnabled(Vendor::Memory)),
        }
    }

    async fn selected_manager(&self) -> Result<&DeviceManager, Error> {
        let v = self
            .selected
            .lock()
            .await
            .ok_or(Error::NoDeviceSelected)?;
        self.manager(v)
    }
}

#[async_trait]
impl Signing for Signer {
    async fn get_public_key(&self, path: &Path, parent_fingerprint: bool) -> Result<Xpub, Error> {
        self.selected_manager()
            .await?
            .get_public_key(path, parent_fingerprint)
            .await
    }

    async fn sign_transaction(
        &self,
        tx: &Transaction,
        inputs: &[InputData],
    ) -> Result<Transaction, Error> {
        self.selected_manager()
            .await?
            .sign_transaction(tx, inputs)
            .await
    }

    async fn get_signatures(
        &self,
        tx: &Transaction,
        inputs: &[InputData],
    ) -> Result<Vec<Option<ecdsa::Signature>>, Error> {
        self.selected_manager()
            .await?
            .get_signatures(tx, inputs)
            .await
    }

    async fn sign_message(&self, path: &Path, message: &[u8]) -> Result<[u8; 65], Error> {
        self.selected_manager()
            .await?
            .sign_message(path, message)
            .await
    }
}
