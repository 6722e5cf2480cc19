#![allow(unused)]

use std::{future::Future, str::FromStr, time::Duration};

use log::LevelFilter;
use simplelog::SimpleLogger;
use tokio::sync::broadcast;

use hwsigner::DeviceEvent;

/// Setup logging from the `LOG_LEVEL` environment variable
pub fn setup() {
    let log_level = match std::env::var("LOG_LEVEL").map(|v| LevelFilter::from_str(&v)) {
        Ok(Ok(l)) => l,
        _ => LevelFilter::Debug,
    };

    let _ = SimpleLogger::init(log_level, simplelog::Config::default());
}

/// Await the next device event
pub async fn next_event(rx: &mut broadcast::Receiver<DeviceEvent>) -> DeviceEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timeout waiting for event")
        .expect("event channel closed")
}

/// Assert no event is pending
pub async fn no_event(rx: &mut broadcast::Receiver<DeviceEvent>) {
    let r = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
    assert!(r.is_err(), "unexpected event: {:?}", r);
}

/// Poll `f` until it returns true
pub async fn wait_for<F, Fut>(mut f: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if f().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    panic!("timeout waiting for condition");
}
