// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Multi-vendor Bitcoin hardware signer library (and CLI)
//!
//! A [Signer] owns one [DeviceManager] per enabled [Vendor]. Managers
//! enumerate devices, emit [DeviceEvent]s and track a selected device,
//! and every device implements [Signing] over the shared
//! [InputData](hwsigner_core::InputData) model.
//!
//! Hardware backends are abstracted behind [LedgerProvider] / [LedgerApp]
//! for APDU devices and [TrezorBridge] / [TrezorSession] for session-based
//! devices, with [MemoryDevice] providing a software signer.

// async traits not yet safe to use
// see https://github.com/rust-lang/rust/issues/91611
// #![feature(async_fn_in_trait)]

pub use ledger_transport::Exchange;

/// Re-export `hwsigner-core` for consumers
pub use hwsigner_core;

/// Re-export `ledger-btc-apdu` for consumers
pub use ledger_btc_apdu::{self as apdu};

mod error;
pub use error::{Error, ErrorKind};

mod vendor;
pub use vendor::{parse_vendors, Vendor, ANY};

pub mod config;
pub use config::SignerOptions;

mod event;
pub use event::{DeviceEvent, EVENT_CAPACITY};

pub mod device;
pub use device::{
    ledger::{LedgerApp, LedgerBtc, LedgerDevice},
    trezor::{TrezorDevice, TrezorSession},
    Device, DeviceInfo, GenericDevice, MemoryDevice, Signing,
};

pub mod manager;
pub use manager::{
    first_device, DeviceManager, LedgerProvider, MemoryManager, Selector, TrezorBridge,
};

mod signer;
pub use signer::{Signer, SignerBuilder};

pub mod app;

/// USB HID transport for Ledger devices
#[cfg(feature = "transport_hid")]
pub mod transport;
