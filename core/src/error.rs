// Copyright (c) 2022-2023 The MobileCoin Foundation

/// Error kinds shared across the signing stack
///
/// Every error type in the workspace maps onto one of these so callers
/// can decide whether to retry, surface or abort.
#[derive(Copy, Clone, Debug, PartialEq, Eq, strum::Display)]
pub enum ErrorKind {
    /// Malformed path, input data or missing fields
    InvalidInput,
    /// Operation not valid in the current lifecycle state
    InvalidState,
    /// I/O failure, timeout or disconnection
    Transport,
    /// Explicit refusal on the device
    UserRejected,
    /// Device requires PIN entry
    DeviceLocked,
    /// Adapter-level request validation failed
    InvalidRequest,
    /// Input type has no mapping on the selected backend
    UnsupportedInput,
    /// Adapter detected mismatched transaction state
    Consistency,
}

/// Signing core error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid derivation path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Invalid or incomplete input data
    #[error("Invalid input data: {0}")]
    InvalidInput(String),

    /// Input type not supported by a backend
    #[error("Unsupported input: {0}")]
    UnsupportedInput(String),

    /// Source and target transactions disagree
    #[error("Inconsistent transactions: {0}")]
    Consistency(String),

    /// Extended key decoding or derivation failure
    #[error("BIP32 error: {0}")]
    Bip32(#[from] bitcoin::bip32::Error),

    /// Hex decoding failure
    #[error("Hex decode error: {0}")]
    Hex(#[from] hex::FromHexError),

    /// Transaction decoding failure
    #[error("Transaction decode error: {0}")]
    Decode(#[from] bitcoin::consensus::encode::Error),

    /// JSON encoding failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Signature hash computation failure
    #[error("Sighash error: {0}")]
    Sighash(String),

    /// Signature parsing or creation failure
    #[error("Signature error: {0}")]
    Signature(String),

    /// Script failed verification
    #[error("Script verification failed for input {index}: {reason}")]
    ScriptVerify { index: usize, reason: String },
}

impl Error {
    /// Map error to [ErrorKind]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnsupportedInput(_) => ErrorKind::UnsupportedInput,
            Error::Consistency(_) => ErrorKind::Consistency,
            Error::Sighash(_) | Error::ScriptVerify { .. } => ErrorKind::InvalidRequest,
            _ => ErrorKind::InvalidInput,
        }
    }
}

impl From<bitcoin::secp256k1::Error> for Error {
    fn from(e: bitcoin::secp256k1::Error) -> Self {
        Error::Signature(e.to_string())
    }
}

impl From<bitcoin::ecdsa::Error> for Error {
    fn from(e: bitcoin::ecdsa::Error) -> Self {
        Error::Signature(e.to_string())
    }
}
