// Copyright (c) 2022-2023 The MobileCoin Foundation

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use log::trace;

use hwsigner::Error;

use crate::lock;

#[derive(Debug, Default)]
struct ControlState {
    reject: AtomicBool,
    locked: AtomicBool,
    delay_ms: AtomicU64,
    log: Mutex<Vec<String>>,
}

/// Shared control for an emulated device
///
/// Clones refer to the same device state.
#[derive(Clone, Debug, Default)]
pub struct SimControl(Arc<ControlState>);

impl SimControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject subsequent operations as if refused by the user
    pub fn set_reject(&self, reject: bool) {
        self.0.reject.store(reject, Ordering::SeqCst);
    }

    /// Report the device locked for subsequent operations
    pub fn set_locked(&self, locked: bool) {
        self.0.locked.store(locked, Ordering::SeqCst);
    }

    /// Delay each response, emulating user interaction
    pub fn set_delay(&self, delay: Duration) {
        self.0.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Operation log, `begin <op>` / `end <op>` entries in execution order
    pub fn log(&self) -> Vec<String> {
        lock(&self.0.log).clone()
    }

    pub fn clear_log(&self) {
        lock(&self.0.log).clear();
    }

    fn record(&self, entry: String) {
        trace!("sim: {entry}");
        lock(&self.0.log).push(entry);
    }

    /// Execute an operation under the configured delay and failure modes,
    /// failing with a timeout where the delay exceeds `timeout`
    pub(crate) async fn run<T>(
        &self,
        op: &str,
        timeout: Option<Duration>,
        f: impl FnOnce() -> Result<T, Error>,
    ) -> Result<T, Error> {
        self.record(format!("begin {op}"));

        let delay = Duration::from_millis(self.0.delay_ms.load(Ordering::SeqCst));
        if !delay.is_zero() {
            match timeout {
                Some(t) if delay > t => {
                    tokio::time::sleep(t).await;
                    self.record(format!("timeout {op}"));
                    return Err(Error::RequestTimeout);
                }
                _ => tokio::time::sleep(delay).await,
            }
        }

        let r = if self.0.locked.load(Ordering::SeqCst) {
            Err(Error::DeviceLocked)
        } else if self.0.reject.load(Ordering::SeqCst) {
            Err(Error::UserDenied)
        } else {
            f()
        };

        self.record(format!("end {op}"));

        r
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failure_modes() {
        let c = SimControl::new();

        assert_eq!(c.run("op", None, || Ok(1)).await.unwrap(), 1);

        c.set_locked(true);
        c.set_reject(true);
        assert!(matches!(c.run("op", None, || Ok(())).await, Err(Error::DeviceLocked)));

        c.set_locked(false);
        assert!(matches!(c.run("op", None, || Ok(())).await, Err(Error::UserDenied)));

        assert_eq!(c.log().len(), 6);
        c.clear_log();
        assert!(c.log().is_empty());
    }

    #[tokio::test]
    async fn delay_exceeding_timeout() {
        let c = SimControl::new();
        c.set_delay(Duration::from_millis(50));

        let r = c.run("slow", Some(Duration::from_millis(10)), || Ok(())).await;
        assert!(matches!(r, Err(Error::RequestTimeout)));
        assert_eq!(c.log(), vec!["begin slow", "timeout slow"]);

        // Within the timeout the operation completes
        let r = c.run("slow", Some(Duration::from_millis(500)), || Ok(())).await;
        assert!(r.is_ok());
    }
}
