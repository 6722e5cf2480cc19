// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Trezor device manager

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};

use hwsigner_core::Network;

use super::{ManagerCore, Selector};
use crate::{
    device::trezor::{TrezorDevice, TrezorSession},
    event::DeviceEvent,
    DeviceInfo, Error, GenericDevice, Vendor,
};

/// Trezor device descriptor, as reported by a [TrezorBridge]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrezorDescriptor {
    /// Bridge path (unique while connected)
    pub path: String,
    /// Device identifier
    pub device_id: String,
    /// User assigned label
    pub label: Option<String>,
    /// Device model
    pub model: Option<String>,
    /// Whether the device may be acquired by this client
    pub acquired: bool,
}

impl TrezorDescriptor {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            vendor: Vendor::Trezor,
            handle: self.path.clone(),
            key: self.device_id.clone(),
            model: self.model.clone(),
            label: self.label.clone(),
        }
    }
}

/// Device events from a [TrezorBridge]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrezorEvent {
    Connect(TrezorDescriptor),
    Disconnect(TrezorDescriptor),
    Changed(TrezorDescriptor),
    ConnectUnacquired(TrezorDescriptor),
}

/// Trezor bridge, enumerates devices and opens signing sessions
#[async_trait]
pub trait TrezorBridge: Send + Sync {
    /// Enumerate connected devices
    async fn enumerate(&self) -> Result<Vec<TrezorDescriptor>, Error>;

    /// Acquire a session with a device
    async fn acquire(&self, desc: &TrezorDescriptor) -> Result<Arc<dyn TrezorSession>, Error>;

    /// Subscribe to device events
    fn subscribe(&self) -> broadcast::Receiver<TrezorEvent>;
}

struct Inner {
    core: ManagerCore,
    network: Network,
    debug: bool,
    bridge: Arc<dyn TrezorBridge>,
}

impl Inner {
    async fn attach(&self, desc: &TrezorDescriptor) {
        if self.core.find(&desc.path).await.is_some() {
            return;
        }

        let session = match self.bridge.acquire(desc).await {
            Ok(v) => v,
            Err(e) => {
                warn!("acquire trezor {} failed: {e}", desc.path);
                return;
            }
        };

        let d = TrezorDevice::new(desc.info(), self.network, session);
        self.core.add(d.into()).await;
    }

    async fn handle_event(&self, e: TrezorEvent) {
        match self.debug {
            true => info!("bridge event: {e:?}"),
            false => debug!("bridge event: {e:?}"),
        }

        match e {
            TrezorEvent::Connect(d) => self.attach(&d).await,
            TrezorEvent::Disconnect(d) => {
                self.core.remove(&d.path).await;
            }
            TrezorEvent::Changed(d) => match self.core.find(&d.path).await {
                Some(existing) => {
                    if let GenericDevice::Trezor(t) = existing.as_ref() {
                        t.update(d.label.clone(), d.model.clone());
                    }
                }
                None if d.acquired => self.attach(&d).await,
                None => (),
            },
            // Devices held by another client are not usable
            TrezorEvent::ConnectUnacquired(_) => (),
        }
    }
}

/// Trezor device manager
pub struct TrezorManager {
    inner: Arc<Inner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TrezorManager {
    /// Create a new trezor manager using the provided bridge
    pub fn new(
        network: Network,
        debug: bool,
        bridge: Arc<dyn TrezorBridge>,
        upstream: Option<broadcast::Sender<DeviceEvent>>,
        selector: Selector,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                core: ManagerCore::new(Vendor::Trezor, upstream, selector),
                network,
                debug,
                bridge,
            }),
            task: Mutex::new(None),
        }
    }

    pub(crate) fn core(&self) -> &ManagerCore {
        &self.inner.core
    }

    /// Open the manager, acquiring available devices and listening for
    /// bridge events
    pub async fn open(&self) -> Result<(), Error> {
        if !self.inner.core.open().await {
            return Ok(());
        }

        let mut rx = self.inner.bridge.subscribe();

        let devices = match self.inner.bridge.enumerate().await {
            Ok(v) => v,
            Err(e) => {
                self.inner.core.close().await?;
                return Err(e);
            }
        };

        debug!("found {} trezor devices", devices.len());

        for d in devices.iter().filter(|d| d.acquired) {
            self.inner.attach(d).await;
        }

        let inner = self.inner.clone();
        let task = tokio::task::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(e) => inner.handle_event(e).await,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("trezor listener lagged, {n} events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        *self.task.lock().await = Some(task);

        Ok(())
    }

    /// Close the manager, releasing sessions and dropping cached devices
    pub async fn close(&self) -> Result<(), Error> {
        if let Some(t) = self.task.lock().await.take() {
            t.abort();
        }

        self.inner.core.close().await?;
        self.inner.core.clear().await;

        Ok(())
    }
}
