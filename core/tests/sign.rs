//! Software signing, template application and script verification

use std::str::FromStr;

use bitcoin::{Amount, PublicKey, ScriptBuf, Transaction, TxOut};

use hwsigner_core::{
    helpers::{
        apply_cosigner_signatures, apply_multisig, apply_scripts, apply_single, input_map,
        is_nested, match_inputs, p2sh, p2wsh, redeem_script, Keyring, KeyringKind,
    },
    input_data::PrevTx,
    signing::sign_input,
    verify::{verify_input, verify_transaction},
    Coin, ErrorKind, InputData, InputDataOptions, Multisig, Path, PublicKeyInfo,
};

mod helpers;
use helpers::*;

/// Fund `script`, build a spend and its input data
fn single_fixture(
    script: ScriptBuf,
    path: &str,
    witness: bool,
) -> (Transaction, InputData, TxOut) {
    let fund = funding_tx(script, Amount::ONE_BTC, 1);
    let coin = Coin::from_tx(&fund, 0).unwrap();

    let (_sk, change) = key_at(&master(MNEMONIC), "m/44'/1'/0'/1/0");
    let tx = spend_tx(&[&coin], ScriptBuf::new_p2pkh(&change.pubkey_hash()));

    let input = InputData::new(InputDataOptions {
        path: Some(Path::from_str(path).unwrap()),
        witness,
        coin: Some(coin.clone()),
        prev_tx: match witness {
            true => None,
            false => Some(PrevTx::Tx(fund)),
        },
        ..Default::default()
    })
    .unwrap();

    (tx, input, coin.output)
}

fn sign_single(tx: &mut Transaction, input: &InputData) {
    let (sk, pk) = key_at(&master(MNEMONIC), &input.path().to_string());
    let ring = Keyring::new(input, pk).unwrap();
    let sig = sign_input(tx, 0, input, &ring, &sk).unwrap();
    apply_single(tx, 0, &ring, &sig).unwrap();
}

#[test]
fn p2pkh() {
    setup();

    let path = "m/44'/1'/0'/0/0";
    let (_sk, pk) = key_at(&master(MNEMONIC), path);
    let (mut tx, input, spent) =
        single_fixture(ScriptBuf::new_p2pkh(&pk.pubkey_hash()), path, false);

    // Unsigned inputs fail verification
    assert!(verify_input(&tx, 0, &spent).is_err());

    sign_single(&mut tx, &input);

    verify_transaction(&tx, &[spent]).unwrap();
    assert!(tx.input[0].witness.is_empty());
}

#[test]
fn p2wpkh() {
    setup();

    let path = "m/44'/1'/0'/0/1";
    let (_sk, pk) = key_at(&master(MNEMONIC), path);
    let wpkh = bitcoin::CompressedPublicKey(pk.inner).wpubkey_hash();
    let (mut tx, input, spent) = single_fixture(ScriptBuf::new_p2wpkh(&wpkh), path, true);

    sign_single(&mut tx, &input);

    verify_transaction(&tx, &[spent.clone()]).unwrap();
    assert!(tx.input[0].script_sig.is_empty());
    assert_eq!(tx.input[0].witness.len(), 2);

    // Altering the spent value invalidates a BIP143 signature
    let wrong = TxOut {
        value: Amount::from_sat(spent.value.to_sat() - 1),
        ..spent
    };
    assert!(verify_input(&tx, 0, &wrong).is_err());
}

#[test]
fn nested_p2wpkh() {
    setup();

    let path = "m/44'/1'/0'/0/2";
    let (_sk, pk) = key_at(&master(MNEMONIC), path);
    let wpkh = bitcoin::CompressedPublicKey(pk.inner).wpubkey_hash();
    let program = ScriptBuf::new_p2wpkh(&wpkh);
    let (mut tx, input, spent) = single_fixture(p2sh(&program), path, true);

    let ring = Keyring::new(&input, pk).unwrap();
    assert_eq!(ring.kind(), KeyringKind::NestedWitnessPubkeyHash);
    assert!(is_nested(input.coin().script(), None, input.witness()));

    sign_single(&mut tx, &input);

    verify_transaction(&tx, &[spent]).unwrap();
    assert!(!tx.input[0].script_sig.is_empty());
}

#[test]
fn keyring_rejects_wrong_key() {
    let path = "m/44'/1'/0'/0/0";
    let (_sk, pk) = key_at(&master(MNEMONIC), path);
    let (_tx, input, _spent) =
        single_fixture(ScriptBuf::new_p2pkh(&pk.pubkey_hash()), path, false);

    let (_sk, other) = key_at(&master(MNEMONIC), "m/44'/1'/0'/0/9");
    let e = Keyring::new(&input, other).unwrap_err();
    assert_eq!(e.kind(), ErrorKind::InvalidInput);
}

/// Cosigner fixture: input data for a 2-of-3 spend wrapped per `wrap`
fn multisig_fixture(
    wrap: fn(&ScriptBuf) -> ScriptBuf,
    witness: bool,
) -> (Transaction, InputData, TxOut) {
    let masters: Vec<_> = COSIGNERS.iter().map(|p| master(p)).collect();

    let keys: Vec<_> = masters
        .iter()
        .map(|m| PublicKeyInfo::new(account_xpub(m, "m/48'/1'/0'"), &[0, 3]))
        .collect();
    let multisig = Multisig::new(2, keys).unwrap();
    let redeem = redeem_script(&multisig).unwrap();

    let fund = funding_tx(wrap(&redeem), Amount::from_sat(50_000_000), 2);
    let coin = Coin::from_tx(&fund, 0).unwrap();
    let tx = spend_tx(&[&coin], p2sh(&redeem));

    let input = InputData::new(InputDataOptions {
        path: Some(Path::from_str("m/48'/1'/0'/0/3").unwrap()),
        witness,
        coin: Some(coin.clone()),
        prev_tx: Some(PrevTx::Tx(fund)),
        multisig: Some(multisig),
        ..Default::default()
    })
    .unwrap();

    (tx, input, coin.output)
}

fn cosign(tx: &Transaction, input: &InputData, cosigner: usize) -> (PublicKey, bitcoin::ecdsa::Signature) {
    let (sk, pk) = key_at(&master(COSIGNERS[cosigner]), "m/48'/1'/0'/0/3");
    let ring = Keyring::new(input, pk).unwrap();
    (pk, sign_input(tx, 0, input, &ring, &sk).unwrap())
}

fn check_multisig(wrap: fn(&ScriptBuf) -> ScriptBuf, witness: bool, kind: KeyringKind) {
    setup();

    let (unsigned, input, spent) = multisig_fixture(wrap, witness);

    // Apply in reverse order, signatures land in key order regardless
    for order in [[2usize, 0], [0, 1], [1, 2]] {
        let mut tx = unsigned.clone();

        let (pk, sig) = cosign(&unsigned, &input, order[0]);
        let ring = Keyring::new(&input, pk).unwrap();
        assert_eq!(ring.kind(), kind);

        let complete = apply_multisig(&mut tx, 0, &ring, &sig).unwrap();
        assert!(!complete);
        assert!(verify_input(&tx, 0, &spent).is_err());

        let (pk, sig) = cosign(&unsigned, &input, order[1]);
        let ring = Keyring::new(&input, pk).unwrap();
        let complete = apply_multisig(&mut tx, 0, &ring, &sig).unwrap();
        assert!(complete);

        verify_transaction(&tx, &[spent.clone()]).unwrap();
    }
}

fn bare(s: &ScriptBuf) -> ScriptBuf {
    p2sh(s)
}

fn wsh(s: &ScriptBuf) -> ScriptBuf {
    p2wsh(s)
}

fn sh_wsh(s: &ScriptBuf) -> ScriptBuf {
    p2sh(&p2wsh(s))
}

#[test]
fn multisig_p2sh() {
    check_multisig(bare, false, KeyringKind::Multisig);
}

#[test]
fn multisig_p2wsh() {
    check_multisig(wsh, true, KeyringKind::WitnessMultisig);
}

#[test]
fn multisig_p2sh_p2wsh() {
    check_multisig(sh_wsh, true, KeyringKind::NestedWitnessMultisig);
}

#[test]
fn cosigner_signatures_from_input_data() {
    setup();

    let (unsigned, input, spent) = multisig_fixture(wsh, true);

    // Two cosigners sign independently, signatures are carried in input data
    let (_, s0) = cosign(&unsigned, &input, 0);
    let (_, s2) = cosign(&unsigned, &input, 2);

    let mut multisig = input.multisig().unwrap().clone();
    multisig.pubkeys[0].signature = Some(s0);
    multisig.pubkeys[2].signature = Some(s2);
    let input = input.with_multisig(multisig).unwrap();

    let mut tx = unsigned.clone();
    apply_cosigner_signatures(&mut tx, &input).unwrap();

    verify_transaction(&tx, &[spent]).unwrap();
}

#[test]
fn apply_scripts_checks_prevouts() {
    let path = "m/44'/1'/0'/0/0";
    let (_sk, pk) = key_at(&master(MNEMONIC), path);
    let (mut signed, input, spent) =
        single_fixture(ScriptBuf::new_p2pkh(&pk.pubkey_hash()), path, false);
    let unsigned = signed.clone();

    sign_single(&mut signed, &input);

    let mut target = unsigned.clone();
    apply_scripts(&mut target, &signed).unwrap();
    verify_transaction(&target, &[spent]).unwrap();

    // Mismatched inputs are rejected
    let (other, _, _) = multisig_fixture(wsh, true);
    let mut target = other;
    let e = apply_scripts(&mut target, &signed).unwrap_err();
    assert_eq!(e.kind(), ErrorKind::Consistency);

    let mut target = unsigned;
    target.input.push(target.input[0].clone());
    let e = apply_scripts(&mut target, &signed).unwrap_err();
    assert_eq!(e.kind(), ErrorKind::Consistency);
}

#[test]
fn input_map_rejects_duplicates() {
    let path = "m/44'/1'/0'/0/0";
    let (_sk, pk) = key_at(&master(MNEMONIC), path);
    let (tx, input, _spent) = single_fixture(ScriptBuf::new_p2pkh(&pk.pubkey_hash()), path, false);

    let inputs = vec![input.clone()];
    let map = input_map(&inputs).unwrap();
    assert_eq!(match_inputs(&tx, &map), vec![Some(&inputs[0])]);

    assert!(input_map(&[input.clone(), input]).is_err());
}
