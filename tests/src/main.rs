// Copyright (c) 2022-2023 The MobileCoin Foundation

use std::collections::BTreeSet;

use clap::{Parser, ValueEnum};
use log::{debug, info, LevelFilter};
use strum::{Display, EnumString};

use hwsigner::{
    device::{Device, MemoryDevice},
    Signer, SignerOptions, Signing, Vendor,
};
use hwsigner_core::Network;
use hwsigner_tests::{fixtures::COSIGNERS, multisig::Wrapping, *};

/// Test CLI arguments
#[derive(Clone, Debug, Parser)]
pub struct Opts {
    #[clap(subcommand)]
    pub test: Tests,

    /// Target for test execution
    #[clap(long, value_enum, default_value = "memory", env)]
    pub target: Target,

    /// bip39 Mnemonic (must be shared between test util and target)
    #[clap(long, env, default_value = fixtures::MNEMONIC, hide_default_value = true)]
    pub mnemonic: String,

    /// Network for paths and key prefixes
    #[clap(long, default_value = "testnet", env)]
    pub network: Network,

    /// Log level
    #[clap(long, default_value = "debug", env)]
    pub log_level: LevelFilter,
}

/// Test modes
#[derive(Clone, PartialEq, Debug, Parser, Display)]
pub enum Tests {
    /// Test extended public key derivation
    PublicKey,
    /// Test P2PKH signing
    P2pkh,
    /// Test P2WPKH signing
    Witness,
    /// Test P2SH-P2WPKH signing
    Nested,
    /// Test message signing
    Message,
    /// Test n-of-n multisig with in-memory cosigners
    Multisig {
        /// Redeem script wrapping (legacy, witness, nested)
        #[clap(long, default_value = "legacy")]
        wrap: Wrapping,
    },
}

/// Test target
#[derive(Clone, Copy, PartialEq, Debug, ValueEnum, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[non_exhaustive]
pub enum Target {
    /// In-memory signer from the provided mnemonic
    Memory,
    /// First USB-HID ledger device
    Hid,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();

    let _ = simplelog::SimpleLogger::init(opts.log_level, simplelog::Config::default());

    debug!("test: {:?} target: {} network: {}", opts.test, opts.target, opts.network);

    info!("Running test '{}' via {}", opts.test, opts.target);

    // Multisig always runs against in-memory cosigners
    if let Tests::Multisig { wrap } = opts.test {
        let mut devices = Vec::with_capacity(COSIGNERS.len());
        for p in COSIGNERS {
            let d = MemoryDevice::from_phrase(p, opts.network)?;
            d.open().await?;
            devices.push(d);
        }

        let refs: Vec<_> = devices.iter().collect();
        multisig::test(&refs, opts.network, wrap).await?;

        info!("Test OK!");
        return Ok(());
    }

    match opts.target {
        Target::Memory => {
            let d = MemoryDevice::from_phrase(&opts.mnemonic, opts.network)?;
            d.open().await?;

            execute(&d, &opts).await?;
        }
        Target::Hid => {
            let signer = Signer::builder(SignerOptions {
                network: opts.network,
                vendor: BTreeSet::from([Vendor::Ledger]),
                ..Default::default()
            })
            .build()?;

            signer.open().await?;
            signer.select_device(Some(Vendor::Ledger), None).await?;

            let r = execute(&signer, &opts).await;

            signer.close().await?;
            r?;
        }
    }

    info!("Test OK!");

    Ok(())
}

/// Execute a test against the provided signer
async fn execute<D: Signing + ?Sized>(d: &D, opts: &Opts) -> anyhow::Result<()> {
    let (m, n) = (opts.mnemonic.as_str(), opts.network);

    match &opts.test {
        Tests::PublicKey => pubkey::test(d, m, n).await?,
        Tests::P2pkh => p2pkh::test(d, m, n).await?,
        Tests::Witness => witness::test(d, m, n).await?,
        Tests::Nested => nested::test(d, m, n).await?,
        Tests::Message => message::test(d, m, n).await?,
        Tests::Multisig { .. } => {
            return Err(anyhow::anyhow!("multisig requires in-memory cosigners"))
        }
    }

    Ok(())
}
