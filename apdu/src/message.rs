// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Message signing APDUs
//!
//! Messages are first streamed to the device with [SignMessagePrepareReq]
//! fragments, then signed with [SignMessageReq]. The response is a
//! [crate::sign::DerSignature] carrying the recovery parity.

use encdec::Encode;

use crate::{
    path::{encode_path, path_len},
    write_bytes, ApduError, ApduReq, Instruction, MAX_APDU_DATA,
};

/// Maximum signable message length
pub const MAX_MESSAGE_LEN: usize = u16::MAX as usize;

/// Message preparation fragment
///
/// The first fragment carries the path and total message length.
#[derive(Clone, PartialEq, Debug)]
pub struct SignMessagePrepareReq {
    pub path: Option<Vec<u32>>,
    pub total_len: u16,
    pub data: Vec<u8>,
}

impl SignMessagePrepareReq {
    /// Split a message into preparation fragments
    pub fn chunks(path: &[u32], msg: &[u8]) -> Result<Vec<Self>, ApduError> {
        if msg.len() > MAX_MESSAGE_LEN {
            return Err(ApduError::PayloadLength(msg.len()));
        }

        let first_len = (MAX_APDU_DATA - path_len(path) - 2).min(msg.len());
        let (head, tail) = msg.split_at(first_len);

        let mut frames = vec![Self {
            path: Some(path.to_vec()),
            total_len: msg.len() as u16,
            data: head.to_vec(),
        }];

        frames.extend(tail.chunks(MAX_APDU_DATA).map(|c| Self {
            path: None,
            total_len: msg.len() as u16,
            data: c.to_vec(),
        }));

        Ok(frames)
    }
}

impl ApduReq for SignMessagePrepareReq {
    const INS: Instruction = Instruction::SignMessage;

    fn p1(&self) -> u8 {
        match self.path {
            Some(_) => 0x00,
            None => 0x80,
        }
    }

    fn p2(&self) -> u8 {
        0x01
    }
}

impl Encode for SignMessagePrepareReq {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        match &self.path {
            Some(p) => Ok(path_len(p) + 2 + self.data.len()),
            None => Ok(self.data.len()),
        }
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        let mut index = 0;
        if let Some(p) = &self.path {
            index = encode_path(p, buff)?;
            index = write_bytes(buff, index, &self.total_len.to_be_bytes())?;
        }
        write_bytes(buff, index, &self.data)
    }
}

/// Sign a prepared message
#[derive(Copy, Clone, PartialEq, Debug, Default)]
pub struct SignMessageReq {}

impl ApduReq for SignMessageReq {
    const INS: Instruction = Instruction::SignMessage;

    fn p1(&self) -> u8 {
        0x80
    }
}

impl Encode for SignMessageReq {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(1)
    }

    /// Empty user validation code
    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        write_bytes(buff, 0, &[0x00])
    }
}
