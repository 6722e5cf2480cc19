// Copyright (c) 2022-2023 The MobileCoin Foundation

use std::path::Path;

use base64::prelude::{Engine as _, BASE64_STANDARD};
use log::debug;
use serde::de::DeserializeOwned;

/// Variable length hex encoded argument
#[derive(Clone, PartialEq, Debug)]
pub struct HexData(pub Vec<u8>);

impl std::str::FromStr for HexData {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().trim_start_matches("0x");
        hex::decode(s).map(HexData)
    }
}

impl AsRef<[u8]> for HexData {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Encode a compact message signature for display
pub fn encode_signature(sig: &[u8]) -> String {
    BASE64_STANDARD.encode(sig)
}

/// Helper to read JSON input files
pub async fn read_input<T: DeserializeOwned>(file_name: &str) -> anyhow::Result<T> {
    debug!("Reading input from '{}'", file_name);

    let s = tokio::fs::read_to_string(file_name).await?;

    let p = Path::new(file_name);
    let v = match p.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&s)?,
        _ => return Err(anyhow::anyhow!("unsupported input file format")),
    };

    Ok(v)
}
