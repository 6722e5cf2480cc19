// Copyright (c) 2022-2023 The MobileCoin Foundation

//! BIP32 path encoding
//!
//! ```text
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |    DEPTH      |            COMPONENT[0] (u32 BE)          |  COMPONENT[n]... /
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use crate::{write_bytes, ApduError};

/// Maximum path depth accepted by the application
pub const MAX_PATH_DEPTH: usize = 10;

/// Encoded length of a path
pub fn path_len(path: &[u32]) -> usize {
    1 + path.len() * 4
}

/// Encode a path into `buff`
pub fn encode_path(path: &[u32], buff: &mut [u8]) -> Result<usize, ApduError> {
    if path.len() > MAX_PATH_DEPTH {
        return Err(ApduError::PathDepth(path.len()));
    }

    let mut index = write_bytes(buff, 0, &[path.len() as u8])?;
    for c in path {
        index = write_bytes(buff, index, &c.to_be_bytes())?;
    }

    Ok(index)
}

/// Decode a path from `buff`
pub fn decode_path(buff: &[u8]) -> Result<(Vec<u32>, usize), ApduError> {
    let depth = *buff.first().ok_or(ApduError::InvalidLength)? as usize;
    if depth > MAX_PATH_DEPTH {
        return Err(ApduError::PathDepth(depth));
    }
    if buff.len() < 1 + depth * 4 {
        return Err(ApduError::InvalidLength);
    }

    let path = buff[1..][..depth * 4]
        .chunks_exact(4)
        .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    Ok((path, 1 + depth * 4))
}
