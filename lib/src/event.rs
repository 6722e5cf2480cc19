// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Device lifecycle events

use log::trace;
use tokio::sync::broadcast;

use crate::DeviceInfo;

/// Event channel capacity
pub const EVENT_CAPACITY: usize = 64;

/// Device lifecycle event, observable on managers and the signer
#[derive(Clone, Debug, PartialEq, strum::Display)]
pub enum DeviceEvent {
    /// Device connected and added to the manager cache
    Connect(DeviceInfo),
    /// Device disconnected and removed from the manager cache
    Disconnect(DeviceInfo),
    /// Device selected
    Select(DeviceInfo),
    /// Device deselected
    Deselect(DeviceInfo),
}

impl DeviceEvent {
    /// Device this event refers to
    pub fn info(&self) -> &DeviceInfo {
        match self {
            DeviceEvent::Connect(i)
            | DeviceEvent::Disconnect(i)
            | DeviceEvent::Select(i)
            | DeviceEvent::Deselect(i) => i,
        }
    }
}

/// Event fan-out for a manager, with an optional upstream (signer) channel
///
/// Events are delivered to the upstream synchronously with local delivery
/// so aggregate ordering matches call ordering.
#[derive(Clone, Debug)]
pub(crate) struct EventSink {
    local: broadcast::Sender<DeviceEvent>,
    upstream: Option<broadcast::Sender<DeviceEvent>>,
}

impl EventSink {
    pub fn new(upstream: Option<broadcast::Sender<DeviceEvent>>) -> Self {
        let (local, _) = broadcast::channel(EVENT_CAPACITY);
        Self { local, upstream }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.local.subscribe()
    }

    pub fn emit(&self, e: DeviceEvent) {
        trace!("event: {} {}", e, e.info().id());

        // Send errors only indicate no active receivers
        let _ = self.local.send(e.clone());

        if let Some(u) = &self.upstream {
            let _ = u.send(e);
        }
    }
}
