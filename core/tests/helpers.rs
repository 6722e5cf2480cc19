#![allow(unused)]

use std::str::FromStr;

use bip39::Mnemonic;
use bitcoin::{
    absolute::LockTime,
    bip32::{Xpriv, Xpub},
    secp256k1::SecretKey,
    transaction::Version,
    Amount, NetworkKind, OutPoint, PublicKey, ScriptBuf, Sequence, Transaction, TxIn, TxOut,
    Witness,
};

use hwsigner_core::{secp, xkey, Coin, Network, Path};

pub const MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

pub const COSIGNERS: [&str; 3] = [
    "legal winner thank year wave sausage worth useful legal winner thank yellow",
    "letter advice cage absurd amount doctor acoustic avoid letter advice cage above",
    "zoo zoo zoo zoo zoo zoo zoo zoo zoo zoo zoo wrong",
];

pub fn setup() {
    let _ = simplelog::SimpleLogger::init(log::LevelFilter::Debug, Default::default());
}

/// Master key for a mnemonic
pub fn master(phrase: &str) -> Xpriv {
    let m = Mnemonic::parse_normalized(phrase).unwrap();
    Xpriv::new_master(NetworkKind::Test, &m.to_seed_normalized("")).unwrap()
}

/// Signing key pair at `path`
pub fn key_at(master: &Xpriv, path: &str) -> (SecretKey, PublicKey) {
    let p = Path::from_str(path).unwrap();
    let k = master.derive_priv(secp(), &p.to_derivation_path()).unwrap();
    (k.private_key, PublicKey::new(k.private_key.public_key(secp())))
}

/// Testnet account extended public key at `path`
pub fn account_xpub(master: &Xpriv, path: &str) -> String {
    let p = Path::from_str(path).unwrap();
    let k = master.derive_priv(secp(), &p.to_derivation_path()).unwrap();
    xkey::encode_xpub(&Xpub::from_priv(secp(), &k), Network::Testnet)
}

/// Coinbase-style funding transaction paying `value` to `script`
pub fn funding_tx(script: ScriptBuf, value: Amount, tag: u8) -> Transaction {
    Transaction {
        version: Version::ONE,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::null(),
            script_sig: ScriptBuf::from_bytes(vec![0x01, tag]),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: vec![TxOut {
            value,
            script_pubkey: script,
        }],
    }
}

/// Unsigned transaction spending `coins` to `to`, less a fixed fee
pub fn spend_tx(coins: &[&Coin], to: ScriptBuf) -> Transaction {
    let total: u64 = coins.iter().map(|c| c.value().to_sat()).sum();

    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: coins
            .iter()
            .map(|c| TxIn {
                previous_output: c.outpoint,
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            })
            .collect(),
        output: vec![TxOut {
            value: Amount::from_sat(total - 10_000),
            script_pubkey: to,
        }],
    }
}
