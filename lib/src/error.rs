// Copyright (c) 2022-2023 The MobileCoin Foundation

use ledger_btc_apdu::{
    status::{classify, StatusClass},
    ApduError,
};
use tokio::time::error::Elapsed;

pub use hwsigner_core::ErrorKind;

use crate::Vendor;

/// Hardware signer API Error Type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Core data model error
    #[error(transparent)]
    Core(#[from] hwsigner_core::Error),

    /// APDU encoding error
    #[error("APDU error: {0}")]
    Apdu(#[from] ApduError),

    /// HID Init Error
    #[error("could not create HidApi instance")]
    HidInit,

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(String),

    /// Request timeout
    #[error("Timeout waiting for device response")]
    RequestTimeout,

    /// Device disconnected during request
    #[error("Device disconnected")]
    Disconnected,

    /// Unhandled device status word
    #[error("Device returned status {0:#06x}")]
    Status(u16),

    /// Unexpected response payload
    #[error("Unexpected device response")]
    UnexpectedResponse,

    /// User denied operation
    #[error("Operation rejected by user")]
    UserDenied,

    /// Device locked, PIN entry required
    #[error("Device locked")]
    DeviceLocked,

    /// Bitcoin application not open on device
    #[error("Bitcoin application not open")]
    AppNotOpen,

    /// Adapter-level request validation failed
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Input not supported by the backend
    #[error("Unsupported input: {0}")]
    UnsupportedInput(String),

    /// Manager is closed
    #[error("Device manager closed")]
    Closed,

    /// No devices available for selection
    #[error("No device available")]
    NoDevice,

    /// Device not present in the manager cache
    #[error("Unknown device '{0}'")]
    UnknownDevice(String),

    /// No device selected
    #[error("No device selected")]
    NoDeviceSelected,

    /// Device has been destroyed
    #[error("Device '{0}' destroyed")]
    Destroyed(String),

    /// Device is not open
    #[error("Device '{0}' not open")]
    NotOpen(String),

    /// Vendor not enabled on this signer
    #[error("Vendor {0} not enabled")]
    VendorNotEnabled(Vendor),

    /// Vendor and device disagree
    #[error("Vendor mismatch (requested: {0}, device: {1})")]
    VendorMismatch(Vendor, Vendor),

    /// Vendor identifier not recognised
    #[error("Unknown vendor '{0}'")]
    UnknownVendor(String),

    /// Vendor required for selection
    #[error("Vendor or device required")]
    VendorRequired,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration parse error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Map error to [ErrorKind]
    pub fn kind(&self) -> ErrorKind {
        use Error::*;

        match self {
            Core(e) => e.kind(),
            Apdu(_) | InvalidRequest(_) => ErrorKind::InvalidRequest,
            HidInit | Transport(_) | RequestTimeout | Disconnected | Status(_)
            | UnexpectedResponse | Io(_) => ErrorKind::Transport,
            UserDenied => ErrorKind::UserRejected,
            DeviceLocked => ErrorKind::DeviceLocked,
            UnsupportedInput(_) => ErrorKind::UnsupportedInput,
            AppNotOpen | Closed | NoDevice | UnknownDevice(_) | NoDeviceSelected
            | Destroyed(_) | NotOpen(_) | VendorNotEnabled(_) => ErrorKind::InvalidState,
            VendorMismatch(..) | UnknownVendor(_) | VendorRequired | Config(_) | Toml(_)
            | Json(_) => ErrorKind::InvalidInput,
        }
    }

    /// Map a non-success device status word to an error
    pub fn from_status(sw: u16) -> Self {
        match classify(sw) {
            StatusClass::UserRejected => Error::UserDenied,
            StatusClass::Locked => Error::DeviceLocked,
            StatusClass::AppNotOpen => Error::AppNotOpen,
            _ => Error::Status(sw),
        }
    }
}

impl From<Elapsed> for Error {
    fn from(_: Elapsed) -> Self {
        Error::RequestTimeout
    }
}

impl From<encdec::Error> for Error {
    fn from(_: encdec::Error) -> Self {
        Error::UnexpectedResponse
    }
}

#[cfg(feature = "transport_hid")]
impl From<ledger_transport_hid::LedgerHIDError> for Error {
    fn from(e: ledger_transport_hid::LedgerHIDError) -> Self {
        Error::Transport(format!("HID: {e}"))
    }
}

#[cfg(feature = "transport_hid")]
impl From<hidapi::HidError> for Error {
    fn from(_: hidapi::HidError) -> Self {
        Error::HidInit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_kinds() {
        assert_eq!(Error::from_status(0x6985).kind(), ErrorKind::UserRejected);
        assert_eq!(Error::from_status(0x6982).kind(), ErrorKind::DeviceLocked);
        assert_eq!(Error::from_status(0x5515).kind(), ErrorKind::DeviceLocked);
        assert_eq!(Error::from_status(0x6d00).kind(), ErrorKind::InvalidState);
        assert_eq!(Error::from_status(0x6e00).kind(), ErrorKind::InvalidState);
        assert_eq!(Error::from_status(0x6a80).kind(), ErrorKind::Transport);
    }

    #[test]
    fn core_kinds_pass_through() {
        let e = Error::from(hwsigner_core::Error::Consistency("x".to_string()));
        assert_eq!(e.kind(), ErrorKind::Consistency);

        let e = Error::from(hwsigner_core::Error::InvalidPath("x".to_string()));
        assert_eq!(e.kind(), ErrorKind::InvalidInput);
    }
}
