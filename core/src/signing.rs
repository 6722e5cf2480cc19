// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Software signing for transaction inputs and messages
//!
//! Signatures are deterministic (RFC6979), given the same key and inputs
//! the same signature is produced.

use bitcoin::{
    consensus::encode::{serialize, VarInt},
    ecdsa,
    hashes::{sha256d, Hash},
    secp256k1::{Message, PublicKey, SecretKey},
    sighash::{EcdsaSighashType, SighashCache},
    sign_message::MessageSignature,
    Amount, Script, Transaction,
};

use crate::{helpers::Keyring, secp, Error, InputData};

/// Bitcoin signed message prefix
pub const MESSAGE_PREFIX: &[u8] = b"\x18Bitcoin Signed Message:\n";

/// Compute the signature hash for an input
///
/// Witness inputs use the BIP143 digest, all others the legacy digest.
pub fn signature_hash(
    tx: &Transaction,
    index: usize,
    script_code: &Script,
    value: Amount,
    witness: bool,
    sighash: EcdsaSighashType,
) -> Result<Message, Error> {
    let mut cache = SighashCache::new(tx);

    let digest = match witness {
        true => cache
            .p2wsh_signature_hash(index, script_code, value, sighash)
            .map_err(|e| Error::Sighash(e.to_string()))?
            .to_byte_array(),
        false => cache
            .legacy_signature_hash(index, script_code, sighash.to_u32())
            .map_err(|e| Error::Sighash(e.to_string()))?
            .to_byte_array(),
    };

    Ok(Message::from_digest(digest))
}

/// Sign a transaction input with SIGHASH_ALL
pub fn sign_input(
    tx: &Transaction,
    index: usize,
    input: &InputData,
    ring: &Keyring,
    key: &SecretKey,
) -> Result<ecdsa::Signature, Error> {
    match tx.input.get(index) {
        Some(i) if i.previous_output == input.key() => (),
        _ => {
            return Err(Error::Consistency(format!(
                "input {index} does not spend {}",
                input.key()
            )))
        }
    }

    if PublicKey::from_secret_key(secp(), key) != ring.public_key().inner {
        return Err(Error::InvalidInput("secret key does not match keyring".to_string()));
    }

    let sighash_type = EcdsaSighashType::All;
    let msg = signature_hash(
        tx,
        index,
        &ring.script_code()?,
        input.value(),
        ring.is_witness(),
        sighash_type,
    )?;

    Ok(ecdsa::Signature {
        signature: secp().sign_ecdsa(&msg, key),
        sighash_type,
    })
}

/// Compute the Bitcoin signed message digest
pub fn message_hash(msg: &[u8]) -> sha256d::Hash {
    let mut b = Vec::with_capacity(MESSAGE_PREFIX.len() + 9 + msg.len());
    b.extend_from_slice(MESSAGE_PREFIX);
    b.extend_from_slice(&serialize(&VarInt(msg.len() as u64)));
    b.extend_from_slice(msg);

    sha256d::Hash::hash(&b)
}

/// Sign a message, returning a 65-byte compact recoverable signature
pub fn sign_message(msg: &[u8], key: &SecretKey) -> [u8; 65] {
    let digest = Message::from_digest(message_hash(msg).to_byte_array());
    let sig = secp().sign_ecdsa_recoverable(&digest, key);

    MessageSignature::new(sig, true).serialize()
}

/// Verify a compact message signature against a public key
pub fn verify_message(msg: &[u8], sig: &[u8], public_key: &PublicKey) -> Result<bool, Error> {
    let sig = MessageSignature::from_slice(sig).map_err(|e| Error::Signature(e.to_string()))?;

    let recovered = sig
        .recover_pubkey(secp(), message_hash(msg))
        .map_err(|e| Error::Signature(e.to_string()))?;

    Ok(recovered.inner == *public_key)
}
