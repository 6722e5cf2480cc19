// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Application version APDUs

use encdec::{DecodeOwned, Encode};

use crate::{ApduError, ApduReq, Instruction};

/// Fetch application version APDU
#[derive(Copy, Clone, PartialEq, Debug, Default)]
pub struct FirmwareVersionReq {}

impl ApduReq for FirmwareVersionReq {
    const INS: Instruction = Instruction::GetFirmwareVersion;
}

impl Encode for FirmwareVersionReq {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(0)
    }

    fn encode(&self, _buff: &mut [u8]) -> Result<usize, Self::Error> {
        Ok(0)
    }
}

bitflags::bitflags! {
    /// Application feature flags
    pub struct FirmwareFlags: u8 {
        /// Public keys are returned compressed
        const COMPRESSED_KEYS = 1 << 0;
    }
}

/// Application version response APDU
///
/// ## Encoding
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |     FLAGS     |     ARCH      |     MAJOR     |     MINOR     |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |     PATCH     |
/// +-+-+-+-+-+-+-+-+
/// ```
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct FirmwareVersion {
    pub flags: FirmwareFlags,
    pub arch: u8,
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl core::fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl DecodeOwned for FirmwareVersion {
    type Output = Self;

    type Error = ApduError;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), Self::Error> {
        if buff.len() < 5 {
            return Err(ApduError::InvalidLength);
        }

        Ok((
            Self {
                flags: FirmwareFlags::from_bits_truncate(buff[0]),
                arch: buff[1],
                major: buff[2],
                minor: buff[3],
                patch: buff[4],
            },
            5,
        ))
    }
}
