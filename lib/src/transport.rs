// Copyright (c) 2022-2023 The MobileCoin Foundation

//! USB HID transport for Ledger devices
//!
//! [HidProvider] lists devices via `hidapi` and connects using
//! [TransportNativeHID]. HID has no hotplug notifications, so attach and
//! detach events are produced by [HidProvider::poll], which may be run
//! periodically with [HidProvider::monitor].

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use hidapi::HidApi;
use log::{debug, warn};
use tokio::{sync::broadcast, task::JoinHandle};

pub use ledger_transport_hid::{LedgerHIDError, TransportNativeHID};

use crate::{
    device::ledger::{LedgerApp, LedgerBtc},
    event::EVENT_CAPACITY,
    manager::{LedgerDescriptor, LedgerProvider, ProviderEvent},
    Error,
};

/// Default interval for HID device polling
pub const HID_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Ledger provider using USB HID
pub struct HidProvider {
    hid_api: Mutex<HidApi>,
    known: Mutex<BTreeMap<String, LedgerDescriptor>>,
    events: broadcast::Sender<ProviderEvent>,
}

impl HidProvider {
    /// Create a new HID provider
    /// NOTE: only one provider should exist at a time (global HID context on macos)
    pub fn new() -> Result<Self, Error> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            hid_api: Mutex::new(HidApi::new()?),
            known: Mutex::new(BTreeMap::new()),
            events,
        })
    }

    fn scan(&self) -> Result<Vec<LedgerDescriptor>, Error> {
        let mut api = self.hid_api.lock().unwrap_or_else(|p| p.into_inner());
        api.refresh_devices()?;

        let devices = TransportNativeHID::list_ledgers(&api)
            .map(|d| LedgerDescriptor {
                handle: d.path().to_string_lossy().to_string(),
                key: format!(
                    "{:04x}:{:04x}:{}",
                    d.vendor_id(),
                    d.product_id(),
                    d.serial_number().unwrap_or("")
                ),
                model: d.product_string().map(|s| s.to_string()),
            })
            .collect();

        Ok(devices)
    }

    /// Rescan devices, emitting attach / detach events for changes
    pub fn poll(&self) -> Result<(), Error> {
        let devices = self.scan()?;
        let mut known = self.known.lock().unwrap_or_else(|p| p.into_inner());

        let detached: Vec<_> = known
            .values()
            .filter(|k| !devices.iter().any(|d| d.handle == k.handle))
            .cloned()
            .collect();

        for d in detached {
            known.remove(&d.handle);
            let _ = self.events.send(ProviderEvent::Detach(d));
        }

        for d in devices {
            if known.contains_key(&d.handle) {
                continue;
            }
            known.insert(d.handle.clone(), d.clone());
            let _ = self.events.send(ProviderEvent::Attach(d));
        }

        Ok(())
    }

    /// Spawn a task polling for device changes
    pub fn monitor(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let p = self.clone();

        tokio::task::spawn(async move {
            let mut t = tokio::time::interval(interval);
            loop {
                t.tick().await;
                if let Err(e) = p.poll() {
                    warn!("HID poll failed: {e}");
                }
            }
        })
    }
}

#[async_trait]
impl LedgerProvider for HidProvider {
    async fn list(&self) -> Result<Vec<LedgerDescriptor>, Error> {
        let devices = self.scan()?;

        let mut known = self.known.lock().unwrap_or_else(|p| p.into_inner());
        for d in &devices {
            known.insert(d.handle.clone(), d.clone());
        }

        debug!("found {} HID devices", devices.len());

        Ok(devices)
    }

    async fn connect(
        &self,
        desc: &LedgerDescriptor,
        timeout: Duration,
    ) -> Result<Arc<dyn LedgerApp>, Error> {
        let api = self.hid_api.lock().unwrap_or_else(|p| p.into_inner());

        let info = TransportNativeHID::list_ledgers(&api)
            .find(|d| d.path().to_string_lossy() == desc.handle)
            .ok_or(Error::NoDevice)?;

        let t = TransportNativeHID::open_device(&api, info)?;

        Ok(Arc::new(LedgerBtc::new(t, timeout)))
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }
}
