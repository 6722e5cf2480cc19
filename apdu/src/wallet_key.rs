// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Wallet public key APDUs

use encdec::{DecodeOwned, Encode};

use crate::{
    path::{encode_path, path_len},
    write_bytes, ApduError, ApduReq, Instruction,
};

/// Address format for the returned address
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum AddressFormat {
    #[default]
    Legacy = 0x00,
    P2sh = 0x01,
    Bech32 = 0x02,
}

/// Wallet public key request APDU
///
/// `P1` requests on-device address display, `P2` selects the address format.
///
/// ## Encoding:
/// ```text
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |    DEPTH      |      PATH COMPONENTS...       /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, PartialEq, Debug)]
pub struct WalletPublicKeyReq {
    pub path: Vec<u32>,
    pub display: bool,
    pub format: AddressFormat,
}

impl WalletPublicKeyReq {
    pub fn new(path: &[u32]) -> Self {
        Self {
            path: path.to_vec(),
            display: false,
            format: AddressFormat::Legacy,
        }
    }
}

impl ApduReq for WalletPublicKeyReq {
    const INS: Instruction = Instruction::GetWalletPublicKey;

    fn p1(&self) -> u8 {
        self.display as u8
    }

    fn p2(&self) -> u8 {
        self.format as u8
    }
}

impl Encode for WalletPublicKeyReq {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(path_len(&self.path))
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        encode_path(&self.path, buff)
    }
}

/// Wallet public key response APDU
///
/// ## Encoding:
/// ```text
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |    PK_LEN     |   PUBLIC_KEY (65-byte uncompressed point)...  /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   ADDR_LEN    |           ADDRESS (ascii)...                  /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /                       CHAIN_CODE (32-byte)                    /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, PartialEq, Debug)]
pub struct WalletPublicKey {
    pub public_key: Vec<u8>,
    pub address: String,
    pub chain_code: [u8; 32],
}

impl Encode for WalletPublicKey {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(2 + self.public_key.len() + self.address.len() + 32)
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        let mut index = write_bytes(buff, 0, &[self.public_key.len() as u8])?;
        index = write_bytes(buff, index, &self.public_key)?;
        index = write_bytes(buff, index, &[self.address.len() as u8])?;
        index = write_bytes(buff, index, self.address.as_bytes())?;
        write_bytes(buff, index, &self.chain_code)
    }
}

impl DecodeOwned for WalletPublicKey {
    type Output = Self;

    type Error = ApduError;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), Self::Error> {
        let mut index = 0;

        let pk_len = *buff.first().ok_or(ApduError::InvalidLength)? as usize;
        index += 1;
        let public_key = buff
            .get(index..index + pk_len)
            .ok_or(ApduError::InvalidLength)?
            .to_vec();
        index += pk_len;

        let addr_len = *buff.get(index).ok_or(ApduError::InvalidLength)? as usize;
        index += 1;
        let address = buff
            .get(index..index + addr_len)
            .ok_or(ApduError::InvalidLength)?;
        let address = core::str::from_utf8(address)
            .map_err(|_| ApduError::Utf8)?
            .to_string();
        index += addr_len;

        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(
            buff.get(index..index + 32)
                .ok_or(ApduError::InvalidLength)?,
        );
        index += 32;

        Ok((
            Self {
                public_key,
                address,
                chain_code,
            },
            index,
        ))
    }
}
