// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Transaction signing APDUs

use encdec::{DecodeOwned, Encode};

use crate::{
    path::{encode_path, path_len},
    write_bytes, ApduError, ApduReq, Instruction,
};

/// Sign the hashed transaction for the key at `path`
///
/// ## Encoding:
/// ```text
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |    DEPTH      |            PATH COMPONENTS...                 /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  USER_CODE_LEN (0x00)         |     LOCK_TIME (u32 BE)...     /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  SIGHASH_TYPE |
/// +-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, PartialEq, Debug)]
pub struct HashSignReq {
    pub path: Vec<u32>,
    pub lock_time: u32,
    pub sighash_type: u8,
}

impl HashSignReq {
    pub fn new(path: &[u32], lock_time: u32, sighash_type: u8) -> Self {
        Self {
            path: path.to_vec(),
            lock_time,
            sighash_type,
        }
    }
}

impl ApduReq for HashSignReq {
    const INS: Instruction = Instruction::UntrustedHashSign;
}

impl Encode for HashSignReq {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(path_len(&self.path) + 1 + 4 + 1)
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        let mut index = encode_path(&self.path, buff)?;
        index = write_bytes(buff, index, &[0x00])?;
        index = write_bytes(buff, index, &self.lock_time.to_be_bytes())?;
        write_bytes(buff, index, &[self.sighash_type])
    }
}

/// DER signature response, the first byte carries the nonce parity in
/// its low bit and is normalised to the DER sequence tag on decode
#[derive(Clone, PartialEq, Debug)]
pub struct DerSignature {
    pub parity: u8,
    pub data: Vec<u8>,
}

impl DecodeOwned for DerSignature {
    type Output = Self;

    type Error = ApduError;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), Self::Error> {
        let tag = *buff.first().ok_or(ApduError::InvalidLength)?;
        if tag & 0xfe != 0x30 {
            return Err(ApduError::InvalidEncoding);
        }

        let mut data = buff.to_vec();
        data[0] = 0x30;

        Ok((
            Self {
                parity: tag & 0x01,
                data,
            },
            buff.len(),
        ))
    }
}
