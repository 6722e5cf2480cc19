// Copyright (c) 2022-2023 The MobileCoin Foundation

//! In-memory device manager

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use log::debug;
use tokio::sync::{broadcast, Mutex as AsyncMutex};

use super::{ManagerCore, Selector};
use crate::{event::DeviceEvent, Device, Error, GenericDevice, MemoryDevice, Vendor};

/// Memory device manager
///
/// Devices are added explicitly and queued in call order. Queued devices
/// join the cache, emitting connect events, when the manager is opened or
/// queried, so subscribers registered after [MemoryManager::add_device]
/// still observe them. Additions to an open manager are flushed from a
/// spawned task.
pub struct MemoryManager {
    core: Arc<ManagerCore>,
    queue: Arc<Queue>,
    opened: AtomicBool,
}

#[derive(Default)]
struct Queue {
    pending: Mutex<Vec<GenericDevice>>,
    /// Held while draining so concurrent flushes keep call order
    flushing: AsyncMutex<()>,
}

impl Queue {
    fn push(&self, d: GenericDevice) {
        self.pending
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(d);
    }

    async fn drain(&self, core: &ManagerCore) {
        let _guard = self.flushing.lock().await;

        let pending = std::mem::take(&mut *self.pending.lock().unwrap_or_else(|p| p.into_inner()));

        for d in pending {
            core.add(d).await;
        }
    }
}

impl MemoryManager {
    pub fn new(upstream: Option<broadcast::Sender<DeviceEvent>>, selector: Selector) -> Self {
        Self {
            core: Arc::new(ManagerCore::new(Vendor::Memory, upstream, selector)),
            queue: Arc::new(Queue::default()),
            opened: AtomicBool::new(false),
        }
    }

    pub(crate) fn core(&self) -> &ManagerCore {
        &self.core
    }

    /// Queue a memory device for connection
    pub fn add_device(&self, device: MemoryDevice) -> Result<(), Error> {
        debug!("queue memory device {}", device.info().handle);
        self.queue.push(device.into());

        if !self.opened.load(Ordering::SeqCst) {
            return Ok(());
        }

        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                let (core, queue) = (self.core.clone(), self.queue.clone());
                rt.spawn(async move { queue.drain(&core).await });
            }
            Err(_) => debug!("no runtime, memory device connects on next query"),
        }

        Ok(())
    }

    /// Connect queued devices
    pub(crate) async fn flush(&self) {
        self.queue.drain(&self.core).await;
    }

    pub async fn open(&self) -> Result<(), Error> {
        self.core.open().await;
        self.opened.store(true, Ordering::SeqCst);
        self.flush().await;
        Ok(())
    }

    /// Close the manager, memory devices are kept for reopening
    pub async fn close(&self) -> Result<(), Error> {
        self.opened.store(false, Ordering::SeqCst);
        self.core.close().await
    }
}
