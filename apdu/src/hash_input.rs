// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Transaction hashing APDUs
//!
//! The transaction being signed is streamed to the device in two stages,
//! inputs via [HashInputStartReq] then outputs via [HashInputFinalizeReq].

use bitcoin::{
    consensus::encode::{serialize, VarInt},
    Amount, OutPoint, TxOut,
};
use encdec::Encode;

use crate::{trusted_input::TrustedInput, write_bytes, ApduError, ApduReq, Instruction, MAX_APDU_DATA};

/// Input hashing mode (`P2`)
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum HashMode {
    /// Start hashing a new legacy transaction
    NewLegacy = 0x00,
    /// Start hashing a new segwit transaction
    NewSegwit = 0x02,
    /// Continue hashing a previously started transaction
    Continue = 0x80,
}

/// Input reference used while hashing
#[derive(Clone, PartialEq, Debug)]
pub enum HashInputKind {
    /// Legacy input via a trusted input
    Trusted(TrustedInput),
    /// Witness input by outpoint and amount
    Segwit { prevout: OutPoint, value: Amount },
}

/// Input being hashed, with the script committed to for this pass
#[derive(Clone, PartialEq, Debug)]
pub struct HashInput {
    pub kind: HashInputKind,
    pub script: Vec<u8>,
    pub sequence: u32,
}

/// Input hashing request fragment
#[derive(Clone, PartialEq, Debug)]
pub struct HashInputStartReq {
    pub first: bool,
    pub mode: HashMode,
    pub data: Vec<u8>,
}

impl HashInputStartReq {
    /// Split transaction inputs into request fragments
    pub fn chunks(version: i32, inputs: &[HashInput], mode: HashMode) -> Vec<Self> {
        let mut frames = Vec::new();

        let mut head = version.to_le_bytes().to_vec();
        head.extend_from_slice(&serialize(&VarInt(inputs.len() as u64)));
        frames.push(head);

        for i in inputs {
            let mut prefix = match &i.kind {
                HashInputKind::Trusted(t) => {
                    let mut b = vec![0x01, t.0.len() as u8];
                    b.extend_from_slice(&t.0);
                    b
                }
                HashInputKind::Segwit { prevout, value } => {
                    let mut b = vec![0x02];
                    b.extend_from_slice(&serialize(prevout));
                    b.extend_from_slice(&value.to_sat().to_le_bytes());
                    b
                }
            };
            prefix.extend_from_slice(&serialize(&VarInt(i.script.len() as u64)));
            frames.push(prefix);

            let mut body = i.script.clone();
            body.extend_from_slice(&i.sequence.to_le_bytes());
            frames.extend(body.chunks(MAX_APDU_DATA).map(|c| c.to_vec()));
        }

        frames
            .into_iter()
            .enumerate()
            .map(|(n, data)| Self {
                first: n == 0,
                mode,
                data,
            })
            .collect()
    }
}

impl ApduReq for HashInputStartReq {
    const INS: Instruction = Instruction::UntrustedHashTxInputStart;

    fn p1(&self) -> u8 {
        match self.first {
            true => 0x00,
            false => 0x80,
        }
    }

    fn p2(&self) -> u8 {
        self.mode as u8
    }
}

impl Encode for HashInputStartReq {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(self.data.len())
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        write_bytes(buff, 0, &self.data)
    }
}

/// Output hashing request fragment, `P1` marks the final fragment
#[derive(Clone, PartialEq, Debug)]
pub struct HashInputFinalizeReq {
    pub last: bool,
    pub data: Vec<u8>,
}

impl HashInputFinalizeReq {
    /// Split serialized outputs into request fragments
    pub fn chunks(outputs: &[TxOut]) -> Vec<Self> {
        let mut b = serialize(&VarInt(outputs.len() as u64));
        for o in outputs {
            b.extend_from_slice(&serialize(o));
        }

        let n = b.chunks(MAX_APDU_DATA).count();
        b.chunks(MAX_APDU_DATA)
            .enumerate()
            .map(|(i, c)| Self {
                last: i + 1 == n,
                data: c.to_vec(),
            })
            .collect()
    }
}

impl ApduReq for HashInputFinalizeReq {
    const INS: Instruction = Instruction::UntrustedHashTxInputFinalizeFull;

    fn p1(&self) -> u8 {
        match self.last {
            true => 0x80,
            false => 0x00,
        }
    }
}

impl Encode for HashInputFinalizeReq {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(self.data.len())
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        write_bytes(buff, 0, &self.data)
    }
}
