// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Shared fixtures for signer tests

use std::str::FromStr;

use hwsigner_core::{
    bitcoin::{
        absolute::LockTime,
        bip32::{Xpriv, Xpub},
        secp256k1::SecretKey,
        transaction::Version,
        Amount, CompressedPublicKey, OutPoint, PublicKey, ScriptBuf, Sequence, Transaction, TxIn,
        TxOut, Witness,
    },
    input_data::PrevTx,
    secp, xkey, Coin, InputData, InputDataOptions, Network, Path,
};

/// Default test mnemonic
pub const MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

/// Cosigner mnemonics for multisig tests
pub const COSIGNERS: [&str; 3] = [
    "legal winner thank year wave sausage worth useful legal winner thank yellow",
    "letter advice cage absurd amount doctor acoustic avoid letter advice cage above",
    "zoo zoo zoo zoo zoo zoo zoo zoo zoo zoo zoo wrong",
];

/// `m/44'/0'/0'` for [MNEMONIC]
pub const ACCOUNT_XPUB_MAIN: &str = "xpub6BosfCnifzxcFwrSzQiqu2DBVTshkCXacvNsWGYJVVhhawA7d4R5WSWGFNbi8Aw6ZRc1brxMyWMzG3DSSSSoekkudhUd9yLb6qx39T9nMdj";

/// `m/44'/1'/0'` for [MNEMONIC]
pub const ACCOUNT_XPUB_TEST: &str = "tpubDC5FSnBiZDMmhiuCmWAYsLwgLYrrT9rAqvTySfuCCrgsWz8wxMXUS9Tb9iVMvcRbvFcAHGkMD5Kx8koh4GquNGNTfohfk7pgjhaPCdXpoba";

/// Master key for a mnemonic
pub fn master(phrase: &str, network: Network) -> anyhow::Result<Xpriv> {
    let m = bip39::Mnemonic::parse_normalized(phrase)?;
    Ok(Xpriv::new_master(network.kind(), &m.to_seed(""))?)
}

/// Account path for a network, `m/<purpose>'/<coin>'/<account>'`
pub fn account_path(purpose: u32, network: Network, account: u32) -> anyhow::Result<Path> {
    Ok(Path::from_list(
        &[purpose, network.coin_type(), account],
        true,
    )?)
}

/// Signing key pair at `path`
pub fn key_at(master: &Xpriv, path: &Path) -> anyhow::Result<(SecretKey, PublicKey)> {
    let k = master.derive_priv(secp(), &path.to_derivation_path())?;
    Ok((k.private_key, PublicKey::new(k.private_key.public_key(secp()))))
}

/// Extended public key at `path`
pub fn xpub_at(master: &Xpriv, path: &Path) -> anyhow::Result<Xpub> {
    let k = master.derive_priv(secp(), &path.to_derivation_path())?;
    Ok(Xpub::from_priv(secp(), &k))
}

/// Encoded account extended public key at `path`
pub fn account_xpub(master: &Xpriv, path: &Path, network: Network) -> anyhow::Result<String> {
    Ok(xkey::encode_xpub(&xpub_at(master, path)?, network))
}

/// Full path below an account path
pub fn child_path(account: &Path, branch: u32, index: u32) -> anyhow::Result<Path> {
    Ok(account.push(branch, false)?.push(index, false)?)
}

pub fn p2pkh(pk: &PublicKey) -> ScriptBuf {
    ScriptBuf::new_p2pkh(&pk.pubkey_hash())
}

pub fn p2wpkh(pk: &PublicKey) -> ScriptBuf {
    ScriptBuf::new_p2wpkh(&CompressedPublicKey(pk.inner).wpubkey_hash())
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

/// Change output script at `m/44'/<coin>'/0'/1/0`
pub fn change_script(master: &Xpriv, network: Network) -> anyhow::Result<ScriptBuf> {
    let p = child_path(&account_path(44, network, 0)?, 1, 0)?;
    let (_, pk) = key_at(master, &p)?;
    Ok(p2pkh(&pk))
}

/// Unsigned spend with per-input signing data
#[derive(Clone, Debug)]
pub struct Spend {
    pub tx: Transaction,
    pub inputs: Vec<InputData>,
    /// Outputs spent by `tx`, in input order
    pub spent: Vec<TxOut>,
}

/// Fund one coin per path, paying to `script(pk)`, and spend them all to
/// the change address
pub fn single_key_spend(
    master: &Xpriv,
    network: Network,
    paths: &[Path],
    script: fn(&PublicKey) -> ScriptBuf,
    witness: bool,
    with_prev_tx: bool,
) -> anyhow::Result<Spend> {
    let mut coins = Vec::with_capacity(paths.len());
    let mut funding = Vec::with_capacity(paths.len());

    for (i, p) in paths.iter().enumerate() {
        let (_, pk) = key_at(master, p)?;
        let fund = funding_tx(script(&pk), Amount::ONE_BTC, i as u8 + 1);
        coins.push(Coin::from_tx(&fund, 0)?);
        funding.push(fund);
    }

    let tx = spend_tx(&coins.iter().collect::<Vec<_>>(), change_script(master, network)?);

    let mut inputs = Vec::with_capacity(paths.len());
    for ((p, c), f) in paths.iter().zip(coins.iter()).zip(funding) {
        inputs.push(InputData::new(InputDataOptions {
            path: Some(p.clone()),
            witness,
            coin: Some(c.clone()),
            prev_tx: with_prev_tx.then_some(PrevTx::Tx(f)),
            ..Default::default()
        })?);
    }

    Ok(Spend {
        tx,
        inputs,
        spent: coins.into_iter().map(|c| c.output).collect(),
    })
}

/// Parse a path, for fixtures
pub fn path(s: &str) -> anyhow::Result<Path> {
    Ok(Path::from_str(s)?)
}
