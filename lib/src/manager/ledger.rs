// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Ledger device manager

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use log::{debug, warn};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};

use hwsigner_core::Network;

use super::{ManagerCore, Selector};
use crate::{
    device::ledger::{LedgerApp, LedgerDevice},
    event::DeviceEvent,
    DeviceInfo, Error, Vendor,
};

/// Ledger device descriptor, as reported by a [LedgerProvider]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerDescriptor {
    /// Transport handle (unique while connected)
    pub handle: String,
    /// Stable device key (serial where available)
    pub key: String,
    /// Device model / product name
    pub model: Option<String>,
}

impl LedgerDescriptor {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            vendor: Vendor::Ledger,
            handle: self.handle.clone(),
            key: self.key.clone(),
            model: self.model.clone(),
            label: None,
        }
    }
}

/// Connection events from a [LedgerProvider]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProviderEvent {
    Attach(LedgerDescriptor),
    Detach(LedgerDescriptor),
}

/// Ledger provider, discovers and connects to ledger devices
#[async_trait]
pub trait LedgerProvider: Send + Sync {
    /// List currently attached devices
    async fn list(&self) -> Result<Vec<LedgerDescriptor>, Error>;

    /// Connect to the bitcoin application on a device
    async fn connect(
        &self,
        desc: &LedgerDescriptor,
        timeout: Duration,
    ) -> Result<Arc<dyn LedgerApp>, Error>;

    /// Subscribe to attach / detach events
    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent>;
}

struct Inner {
    core: ManagerCore,
    network: Network,
    timeout: Duration,
    provider: Arc<dyn LedgerProvider>,
}

impl Inner {
    async fn attach(&self, desc: &LedgerDescriptor) {
        if self.core.find(&desc.handle).await.is_some() {
            return;
        }

        let app = match self.provider.connect(desc, self.timeout).await {
            Ok(v) => v,
            Err(e) => {
                warn!("connect to ledger {} failed: {e}", desc.handle);
                return;
            }
        };

        let d = LedgerDevice::new(desc.info(), self.network, app);
        self.core.add(d.into()).await;
    }

    async fn handle_event(&self, e: ProviderEvent) {
        debug!("provider event: {e:?}");

        match e {
            ProviderEvent::Attach(d) => self.attach(&d).await,
            ProviderEvent::Detach(d) => {
                self.core.remove(&d.handle).await;
            }
        }
    }
}

/// Ledger device manager
pub struct LedgerManager {
    inner: Arc<Inner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl LedgerManager {
    /// Create a new ledger manager using the provided device provider
    pub fn new(
        network: Network,
        timeout: Duration,
        provider: Arc<dyn LedgerProvider>,
        upstream: Option<broadcast::Sender<DeviceEvent>>,
        selector: Selector,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                core: ManagerCore::new(Vendor::Ledger, upstream, selector),
                network,
                timeout,
                provider,
            }),
            task: Mutex::new(None),
        }
    }

    pub(crate) fn core(&self) -> &ManagerCore {
        &self.inner.core
    }

    /// Open the manager, connecting attached devices and listening for
    /// attach / detach events
    pub async fn open(&self) -> Result<(), Error> {
        if !self.inner.core.open().await {
            return Ok(());
        }

        // Subscribe before listing so no attach is missed
        let mut rx = self.inner.provider.subscribe();

        let devices = match self.inner.provider.list().await {
            Ok(v) => v,
            Err(e) => {
                self.inner.core.close().await?;
                return Err(e);
            }
        };

        debug!("found {} ledger devices", devices.len());

        for d in &devices {
            self.inner.attach(d).await;
        }

        let inner = self.inner.clone();
        let task = tokio::task::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(e) => inner.handle_event(e).await,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("ledger listener lagged, {n} events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        *self.task.lock().await = Some(task);

        Ok(())
    }

    /// Close the manager, stop listening and drop cached devices
    pub async fn close(&self) -> Result<(), Error> {
        if let Some(t) = self.task.lock().await.take() {
            t.abort();
        }

        self.inner.core.close().await?;
        self.inner.core.clear().await;

        Ok(())
    }
}
