// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Tests for Bitcoin hardware signer backends
//!
//! Generic over [hwsigner::Signing] for reuse across device variants,
//! each routine derives expected values in software from the device
//! mnemonic.

pub mod fixtures;

pub mod pubkey;

pub mod p2pkh;

pub mod witness;

pub mod nested;

pub mod multisig;

pub mod message;
