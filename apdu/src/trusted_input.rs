// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Trusted input APDUs
//!
//! Legacy inputs are signed against trusted inputs: the funding transaction
//! is streamed to the device, which returns an authenticated record of the
//! spent output (txid, index and amount). The transaction is sent in
//! fragments, the first carrying the output index.

use bitcoin::{
    consensus::encode::{serialize, VarInt},
    Transaction,
};
use encdec::{DecodeOwned, Encode};

use crate::{write_bytes, ApduError, ApduReq, Instruction, MAX_APDU_DATA};

/// Trusted input magic byte
pub const TRUSTED_INPUT_MAGIC: u8 = 0x32;

/// Encoded trusted input length
pub const TRUSTED_INPUT_LEN: usize = 56;

/// Trusted input request fragment
#[derive(Clone, PartialEq, Debug)]
pub struct TrustedInputReq {
    pub first: bool,
    pub data: Vec<u8>,
}

impl TrustedInputReq {
    /// Split a funding transaction into request fragments for output `vout`
    pub fn chunks(tx: &Transaction, vout: u32) -> Vec<Self> {
        let mut frames = Vec::new();

        let mut head = vout.to_be_bytes().to_vec();
        head.extend_from_slice(&tx.version.0.to_le_bytes());
        head.extend_from_slice(&serialize(&VarInt(tx.input.len() as u64)));
        frames.push(head);

        for i in &tx.input {
            let mut prefix = serialize(&i.previous_output);
            prefix.extend_from_slice(&serialize(&VarInt(i.script_sig.len() as u64)));
            frames.push(prefix);

            let mut body = i.script_sig.as_bytes().to_vec();
            body.extend_from_slice(&i.sequence.0.to_le_bytes());
            frames.extend(body.chunks(MAX_APDU_DATA).map(|c| c.to_vec()));
        }

        frames.push(serialize(&VarInt(tx.output.len() as u64)));

        for o in &tx.output {
            let mut prefix = o.value.to_sat().to_le_bytes().to_vec();
            prefix.extend_from_slice(&serialize(&VarInt(o.script_pubkey.len() as u64)));
            frames.push(prefix);

            frames.extend(
                o.script_pubkey
                    .as_bytes()
                    .chunks(MAX_APDU_DATA)
                    .map(|c| c.to_vec()),
            );
        }

        frames.push(tx.lock_time.to_consensus_u32().to_le_bytes().to_vec());

        frames
            .into_iter()
            .enumerate()
            .map(|(i, data)| Self {
                first: i == 0,
                data,
            })
            .collect()
    }
}

impl ApduReq for TrustedInputReq {
    const INS: Instruction = Instruction::GetTrustedInput;

    fn p1(&self) -> u8 {
        match self.first {
            true => 0x00,
            false => 0x80,
        }
    }
}

impl Encode for TrustedInputReq {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(self.data.len())
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        write_bytes(buff, 0, &self.data)
    }
}

/// Trusted input response
///
/// ## Encoding:
/// ```text
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  MAGIC (0x32) |     0x00      |            NONCE              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /                        TXID (32-byte)                         /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                      OUTPUT_INDEX (u32 LE)                    |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /                       AMOUNT (u64 LE)                         /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /                         HMAC (8-byte)                         /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, PartialEq, Debug)]
pub struct TrustedInput(pub Vec<u8>);

impl TrustedInput {
    /// Spent transaction id (internal byte order)
    pub fn txid(&self) -> [u8; 32] {
        let mut b = [0u8; 32];
        b.copy_from_slice(&self.0[4..36]);
        b
    }

    /// Spent output index
    pub fn vout(&self) -> u32 {
        u32::from_le_bytes([self.0[36], self.0[37], self.0[38], self.0[39]])
    }

    /// Spent output value in satoshis
    pub fn amount(&self) -> u64 {
        let mut b = [0u8; 8];
        b.copy_from_slice(&self.0[40..48]);
        u64::from_le_bytes(b)
    }
}

impl DecodeOwned for TrustedInput {
    type Output = Self;

    type Error = ApduError;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), Self::Error> {
        if buff.len() < TRUSTED_INPUT_LEN {
            return Err(ApduError::InvalidLength);
        }
        if buff[0] != TRUSTED_INPUT_MAGIC {
            return Err(ApduError::InvalidEncoding);
        }

        Ok((Self(buff[..TRUSTED_INPUT_LEN].to_vec()), TRUSTED_INPUT_LEN))
    }
}
