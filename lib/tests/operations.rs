use blake2::{digest::typenum::U32, Blake2b, Digest};

use hwsigner::{
    app::{
        self, AccountInfo, CosignerInfo, KeyInfo, MultisigInfo, MultisigWallet, PathTail,
        PrepareSignOptions, ProposalInfo, SignOptions,
    },
    device::{Device, MemoryDevice},
    hwsigner_core::{
        bitcoin::{Amount, OutPoint},
        helpers::{apply_cosigner_signatures, p2sh, p2wsh, redeem_script},
        verify::verify_transaction,
        Coin, Multisig, Network, Path, PublicKeyInfo,
    },
    ErrorKind, Signing,
};
use hwsigner_sim::{MemoryMultisigWallet, MemoryWallet};
use hwsigner_tests::fixtures::*;

mod helpers;
use helpers::setup;

const NETWORK: Network = Network::Testnet;

async fn device(phrase: &str) -> anyhow::Result<MemoryDevice> {
    let d = MemoryDevice::from_phrase(phrase, NETWORK)?;
    d.open().await?;
    Ok(d)
}

#[tokio::test(flavor = "multi_thread")]
async fn token() -> anyhow::Result<()> {
    setup();

    let d = device(MNEMONIC).await?;
    let p = path("m/44'/1'/0'/0/0")?;

    let (_, pk) = key_at(&master(MNEMONIC, NETWORK)?, &p)?;
    let expected = Blake2b::<U32>::digest(pk.inner.serialize());

    let token = app::generate_token(&d, Some(&p)).await?;
    assert_eq!(&token[..], &expected[..]);

    let token_hex = app::generate_token_hex(&d, Some(&p)).await?;
    assert_eq!(token_hex, hex::encode(expected));

    // Tokens differ per path
    let other = app::generate_token(&d, Some(&path("m/44'/1'/0'/0/1")?)).await?;
    assert_ne!(token, other);

    let e = app::generate_token(&d, None).await.unwrap_err();
    assert_eq!(e.kind(), ErrorKind::InvalidInput);

    Ok(())
}

/// Wallet owning two P2PKH coins and one P2WPKH coin on the default account
fn wallet(phrase: &str) -> anyhow::Result<(MemoryWallet, Vec<Coin>, Vec<Path>)> {
    let master = master(phrase, NETWORK)?;
    let account = account_path(44, NETWORK, 0)?;

    let keys = [(0, 0, false), (0, 1, false), (1, 3, true)];

    let mut w = MemoryWallet::new().with_account(AccountInfo {
        name: app::DEFAULT_ACCOUNT.to_string(),
        account_key: account_xpub(&master, &account, NETWORK)?,
        witness: false,
    });

    let mut coins = vec![];
    let mut paths = vec![];

    for (i, (branch, index, witness)) in keys.into_iter().enumerate() {
        let path = child_path(&account, branch, index)?;
        let (_, pk) = key_at(&master, &path)?;

        let script = match witness {
            true => p2wpkh(&pk),
            false => p2pkh(&pk),
        };

        let fund = funding_tx(script.clone(), Amount::ONE_BTC, i as u8 + 10);
        coins.push(Coin::from_tx(&fund, 0)?);
        paths.push(path);

        w = w.with_transaction(fund).with_key(
            script,
            KeyInfo {
                branch,
                index,
                witness,
            },
        );
    }

    Ok((w, coins, paths))
}

#[tokio::test(flavor = "multi_thread")]
async fn prepare_sign_from_account() -> anyhow::Result<()> {
    setup();

    let (w, coins, paths) = wallet(MNEMONIC)?;
    let master = master(MNEMONIC, NETWORK)?;

    // Legacy coins only
    let tx = spend_tx(&[&coins[0], &coins[1]], change_script(&master, NETWORK)?);

    let inputs = app::prepare_sign(
        &tx,
        &w,
        &PrepareSignOptions {
            network: NETWORK,
            ..Default::default()
        },
    )
    .await?;

    assert_eq!(inputs.len(), 2);
    for (i, input) in inputs.iter().enumerate() {
        assert_eq!(input.path(), &paths[i]);
        assert!(!input.witness());
        assert!(input.prev_tx().is_some());
    }

    // Paths below account level fall back to the wallet account
    let fallback = app::prepare_sign(
        &tx,
        &w,
        &PrepareSignOptions {
            path: Some(path("m/44'/1'/0'/0")?),
            network: NETWORK,
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(fallback, inputs);

    let d = device(MNEMONIC).await?;
    let signed = app::sign(&d, &tx, &inputs, &SignOptions { broadcast: true }).await?;
    assert!(signed.broadcast);

    verify_transaction(
        &signed.tx,
        &[coins[0].output.clone(), coins[1].output.clone()],
    )?;

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn prepare_sign_paths() -> anyhow::Result<()> {
    setup();

    let (w, coins, paths) = wallet(MNEMONIC)?;
    let master = master(MNEMONIC, NETWORK)?;
    let tx = spend_tx(&[&coins[2]], change_script(&master, NETWORK)?);

    // Explicit paths are used verbatim, witness from the wallet key
    let inputs = app::prepare_sign(
        &tx,
        &w,
        &PrepareSignOptions {
            paths: Some(vec![paths[2].clone()]),
            network: NETWORK,
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(inputs[0].path(), &paths[2]);
    assert!(inputs[0].witness());

    let d = device(MNEMONIC).await?;
    let signed = app::sign(&d, &tx, &inputs, &SignOptions::default()).await?;
    assert!(!signed.broadcast);
    verify_transaction(&signed.tx, &[coins[2].output.clone()])?;

    // Path counts must match inputs
    let e = app::prepare_sign(
        &tx,
        &w,
        &PrepareSignOptions {
            paths: Some(vec![paths[0].clone(), paths[1].clone()]),
            network: NETWORK,
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert_eq!(e.kind(), ErrorKind::InvalidInput);

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn prepare_sign_errors() -> anyhow::Result<()> {
    setup();

    let (w, coins, _) = wallet(MNEMONIC)?;
    let master = master(MNEMONIC, NETWORK)?;
    let tx = spend_tx(&[&coins[0]], change_script(&master, NETWORK)?);

    // Account path for the wrong network
    let e = app::prepare_sign(
        &tx,
        &w,
        &PrepareSignOptions {
            path: Some(path("m/44'/0'/0'")?),
            network: NETWORK,
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert_eq!(e.kind(), ErrorKind::InvalidInput);

    // Unknown account
    let e = app::prepare_sign(
        &tx,
        &w,
        &PrepareSignOptions {
            account: Some("savings".to_string()),
            network: NETWORK,
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert_eq!(e.kind(), ErrorKind::InvalidInput);

    // Unknown previous transaction
    let mut unknown = tx.clone();
    unknown.input[0].previous_output = OutPoint::new(unknown.compute_txid(), 0);
    let e = app::prepare_sign(
        &unknown,
        &w,
        &PrepareSignOptions {
            network: NETWORK,
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert_eq!(e.kind(), ErrorKind::InvalidInput);

    Ok(())
}

/// 2-of-3 multisig wallet over [COSIGNERS] with one funded proposal
fn multisig_wallet(witness: bool) -> anyhow::Result<(MemoryMultisigWallet, Coin)> {
    let account = account_path(48, NETWORK, 0)?;

    let mut cosigners = vec![];
    for (i, p) in COSIGNERS.iter().enumerate() {
        cosigners.push(CosignerInfo {
            name: format!("cosigner {i}"),
            account_key: account_xpub(&master(p, NETWORK)?, &account, NETWORK)?,
        });
    }

    let tail = PathTail {
        branch: 0,
        index: 4,
    };

    let pubkeys = cosigners
        .iter()
        .map(|c| PublicKeyInfo::new(c.account_key.clone(), &[tail.branch, tail.index]))
        .collect();
    let redeem = redeem_script(&Multisig::new(2, pubkeys)?)?;

    let script = match witness {
        true => p2wsh(&redeem),
        false => p2sh(&redeem),
    };
    let fund = funding_tx(script, Amount::from_sat(30_000_000), 20);
    let coin = Coin::from_tx(&fund, 0)?;

    let tx = spend_tx(&[&coin], p2sh(&redeem));

    let w = MemoryMultisigWallet::new(MultisigInfo {
        m: 2,
        n: 3,
        witness,
        account_key: cosigners[0].account_key.clone(),
        cosigners,
    })
    .with_proposal(
        1,
        ProposalInfo {
            tx,
            paths: vec![Some(tail)],
            txs: vec![fund],
        },
    );

    Ok((w, coin))
}

#[tokio::test(flavor = "multi_thread")]
async fn prepare_sign_multisig() -> anyhow::Result<()> {
    setup();

    let account = account_path(48, NETWORK, 0)?;

    for witness in [false, true] {
        let (w, coin) = multisig_wallet(witness)?;

        let (tx, inputs) = app::prepare_sign_multisig(&w, 1, &account, NETWORK).await?;
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].path(), &child_path(&account, 0, 4)?);
        assert_eq!(inputs[0].witness(), witness);

        // Two of three cosigners sign independently
        let mut multisig = inputs[0]
            .multisig()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("missing multisig"))?;

        for i in [2, 0] {
            let d = device(COSIGNERS[i]).await?;
            let sigs = d.get_signatures(&tx, &inputs).await?;
            multisig.pubkeys[i].signature = sigs[0];
        }

        let input = inputs[0].with_multisig(multisig)?;

        let mut signed = tx.clone();
        apply_cosigner_signatures(&mut signed, &input)?;
        verify_transaction(&signed, &[coin.output.clone()])?;
    }

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn prepare_sign_multisig_errors() -> anyhow::Result<()> {
    setup();

    let account = account_path(48, NETWORK, 0)?;
    let (w, _) = multisig_wallet(true)?;

    // Unknown proposal
    let e = app::prepare_sign_multisig(&w, 7, &account, NETWORK)
        .await
        .unwrap_err();
    assert_eq!(e.kind(), ErrorKind::InvalidInput);

    // Proposals with inputs outside the wallet
    let mut proposal = w.proposal(1).await?;
    proposal.paths = vec![None];
    let external = w.clone().with_proposal(2, proposal);

    let e = app::prepare_sign_multisig(&external, 2, &account, NETWORK)
        .await
        .unwrap_err();
    assert_eq!(e.kind(), ErrorKind::UnsupportedInput);

    // Account path depth
    let e = app::prepare_sign_multisig(&w, 1, &child_path(&account, 0, 4)?, NETWORK)
        .await
        .unwrap_err();
    assert_eq!(e.kind(), ErrorKind::InvalidInput);

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn guess_path() -> anyhow::Result<()> {
    setup();

    let d = device(MNEMONIC).await?;
    let own = master(MNEMONIC, NETWORK)?;
    let other = master(COSIGNERS[0], NETWORK)?;

    let keys = vec![
        // Mainnet keys are skipped on testnet
        ACCOUNT_XPUB_MAIN.to_string(),
        account_xpub(&other, &account_path(44, NETWORK, 0)?, NETWORK)?,
        "not a key".to_string(),
        account_xpub(&own, &account_path(44, NETWORK, 2)?, NETWORK)?,
    ];

    let p = app::guess_path(&d, &keys, NETWORK).await?;
    assert_eq!(p, Some(account_path(44, NETWORK, 2)?));

    let p = app::guess_path(&d, &keys[..3], NETWORK).await?;
    assert_eq!(p, None);

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn get_known_paths() -> anyhow::Result<()> {
    setup();

    let d = device(MNEMONIC).await?;
    let own = master(MNEMONIC, NETWORK)?;
    let other = master(COSIGNERS[1], NETWORK)?;

    let multisig_key = account_xpub(&own, &account_path(48, NETWORK, 1)?, NETWORK)?;
    let foreign_key = account_xpub(&other, &account_path(44, NETWORK, 0)?, NETWORK)?;

    let keys = vec![
        "xpubnope".to_string(),
        ACCOUNT_XPUB_TEST.to_string(),
        multisig_key.clone(),
        foreign_key.clone(),
    ];

    let paths = app::get_known_paths(&d, &keys).await?;

    assert_eq!(paths.len(), 4);
    assert_eq!(paths[ACCOUNT_XPUB_TEST].as_deref(), Some("m/44'/1'/0'"));
    assert_eq!(paths[&multisig_key].as_deref(), Some("m/48'/1'/1'"));
    assert_eq!(paths[&foreign_key], None);

    // Keys that do not parse are unresolved, later keys still resolve
    assert_eq!(paths["xpubnope"], None);

    Ok(())
}
