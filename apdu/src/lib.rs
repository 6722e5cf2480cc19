// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Protocol / APDU definitions for Bitcoin hardware wallet app communication
//!
//! Requests implement [encdec::Encode] for their payload and [ApduReq] for
//! the APDU header, responses implement [encdec::DecodeOwned]. Multi-byte
//! integers are big-endian unless noted, transaction fragments use bitcoin
//! consensus encoding (little-endian) as the application expects.
//!
//! Signing a transaction is a sequence of exchanges:
//!
//! - legacy inputs are first converted to trusted inputs
//!   ([trusted_input::TrustedInputReq]), then for each input the full
//!   transaction is hashed ([hash_input::HashInputStartReq],
//!   [hash_input::HashInputFinalizeReq]) and signed ([sign::HashSignReq])
//! - witness inputs hash the full transaction once, then each input is
//!   re-hashed alone before signing

use core::fmt::Debug;

pub use ledger_apdu::{APDUAnswer, APDUCommand};

pub mod app_info;
pub mod hash_input;
pub mod message;
pub mod path;
pub mod sign;
pub mod status;
pub mod trusted_input;
pub mod wallet_key;

pub mod prelude;

/// Bitcoin application APDU class
pub const BTC_APDU_CLA: u8 = 0xe0;

/// Maximum APDU payload length
pub const MAX_APDU_DATA: usize = 255;

/// Bitcoin application instruction codes
#[derive(Copy, Clone, Debug, PartialEq, Eq, strum::Display)]
#[repr(u8)]
pub enum Instruction {
    /// Fetch public key, address and chain code for a path
    GetWalletPublicKey = 0x40,

    /// Convert a previous output into a trusted input
    GetTrustedInput = 0x42,

    /// Start hashing transaction inputs
    UntrustedHashTxInputStart = 0x44,

    /// Sign the hashed transaction
    UntrustedHashSign = 0x48,

    /// Provide outputs and finalise hashing
    UntrustedHashTxInputFinalizeFull = 0x4a,

    /// Prepare or sign a message
    SignMessage = 0x4e,

    /// Fetch application version
    GetFirmwareVersion = 0xc4,
}

/// APDU encoding / decoding errors
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ApduError {
    #[error("Invalid length")]
    InvalidLength,

    #[error("Invalid encoding")]
    InvalidEncoding,

    #[error("Invalid UTF8")]
    Utf8,

    #[error("Path depth {0} exceeds maximum")]
    PathDepth(usize),

    #[error("Payload length {0} exceeds maximum")]
    PayloadLength(usize),
}

impl From<encdec::Error> for ApduError {
    fn from(_e: encdec::Error) -> Self {
        ApduError::InvalidLength
    }
}

/// APDU request header and encoding
pub trait ApduReq: encdec::Encode<Error = ApduError> + Debug {
    /// Request instruction
    const INS: Instruction;

    /// Request P1 value
    fn p1(&self) -> u8 {
        0x00
    }

    /// Request P2 value
    fn p2(&self) -> u8 {
        0x00
    }

    /// Build an [APDUCommand] for this request
    fn command(&self) -> Result<APDUCommand<Vec<u8>>, ApduError> {
        let n = self.encode_len()?;
        if n > MAX_APDU_DATA {
            return Err(ApduError::PayloadLength(n));
        }

        let mut data = vec![0u8; n];
        let n = self.encode(&mut data)?;
        data.truncate(n);

        Ok(APDUCommand {
            cla: BTC_APDU_CLA,
            ins: Self::INS as u8,
            p1: self.p1(),
            p2: self.p2(),
            data,
        })
    }
}

/// Write a byte slice into a buffer at `index`, returning the new index
pub(crate) fn write_bytes(buff: &mut [u8], index: usize, b: &[u8]) -> Result<usize, ApduError> {
    if buff.len() < index + b.len() {
        return Err(ApduError::InvalidLength);
    }
    buff[index..][..b.len()].copy_from_slice(b);
    Ok(index + b.len())
}
