// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Command line utility for Bitcoin hardware signers

use clap::Parser;
use log::{debug, info, warn, LevelFilter};

use hwsigner::{
    app,
    hwsigner_core::{
        bitcoin::{consensus::encode, Transaction},
        InputData, Network, Path,
    },
    parse_vendors, DeviceInfo, Signer, SignerOptions, Signing, Vendor,
};

mod helpers;
use helpers::*;

/// Hardware signer command line utility
#[derive(Clone, PartialEq, Debug, Parser)]
struct Options {
    /// Network for key prefixes and coin type (overrides config)
    #[clap(long, env = "HWSIGNER_NETWORK")]
    network: Option<Network>,

    /// Enabled vendors, comma separated (LEDGER, TREZOR, MEMORY, ANY)
    #[clap(long, env = "HWSIGNER_VENDOR")]
    vendor: Option<String>,

    /// BIP39 mnemonic for the memory signer
    #[clap(long, env = "HWSIGNER_PHRASE", hide_env_values = true)]
    phrase: Option<String>,

    /// Configuration file (.json or .toml)
    #[clap(long)]
    config: Option<String>,

    /// Device to use (`VENDOR:handle`, see `list`)
    #[clap(long)]
    device: Option<String>,

    /// Subcommand to execute
    #[clap(subcommand)]
    cmd: Actions,

    /// Enable verbose logging
    #[clap(long, default_value = "info")]
    log_level: LevelFilter,
}

#[derive(Clone, PartialEq, Debug, Parser)]
#[non_exhaustive]
enum Actions {
    /// List available devices
    List,

    /// Fetch the extended public key for a path
    PublicKey {
        /// Derivation path (eg. m/44'/0'/0')
        #[clap(long)]
        path: Path,

        /// Populate the parent fingerprint
        #[clap(long)]
        parent_fingerprint: bool,
    },

    /// Sign a message, printing the base64 compact signature
    SignMessage {
        /// Derivation path of the signing key
        #[clap(long)]
        path: Path,

        /// Message to sign
        #[clap(long)]
        message: String,
    },

    /// Compute the authentication token for a path
    Token {
        /// Derivation path of the token key
        #[clap(long)]
        path: Path,
    },

    /// Sign a transaction, printing the signed transaction hex
    SignTx {
        /// Hex encoded unsigned transaction
        #[clap(long)]
        tx: HexData,

        /// JSON file containing input data for each input
        #[clap(long)]
        inputs: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Options::parse();

    // Setup logging
    simplelog::SimpleLogger::init(args.log_level, simplelog::Config::default())?;

    let opts = load_options(&args)?;
    debug!("Using vendors: {:?}", opts.vendor);

    let signer = Signer::builder(opts).build()?;
    signer.open().await?;

    let r = execute(&signer, &args).await;

    signer.close().await?;

    r
}

/// Build signer options from config file and arguments
fn load_options(args: &Options) -> anyhow::Result<SignerOptions> {
    let mut opts = match &args.config {
        Some(f) => SignerOptions::load(f)?,
        None => SignerOptions::default(),
    };

    if let Some(n) = args.network {
        opts.network = n;
    }
    if let Some(v) = &args.vendor {
        opts.vendor = parse_vendors([v])?;
    }
    if let Some(p) = &args.phrase {
        opts.memory.phrase = Some(p.clone());
    }

    // Drop vendors without a usable backend
    opts.vendor.retain(|v| {
        let available = match v {
            Vendor::Ledger => cfg!(feature = "transport_hid"),
            Vendor::Trezor => false,
            Vendor::Memory => opts.memory.is_configured(),
        };
        if !available {
            debug!("{v} unavailable");
        }
        available
    });

    if opts.vendor.is_empty() {
        return Err(anyhow::anyhow!("No usable vendors configured"));
    }

    Ok(opts)
}

/// Select the requested device, or the first available
async fn select(signer: &Signer, device: Option<&str>) -> anyhow::Result<DeviceInfo> {
    let devices = signer.devices().await;

    if let Some(id) = device {
        let d = devices
            .get(id)
            .ok_or_else(|| anyhow::anyhow!("Unknown device: {id}"))?;
        return Ok(signer.select_device(None, Some(d)).await?);
    }

    for v in signer.vendors() {
        match signer.select_device(Some(v), None).await {
            Ok(d) => return Ok(d),
            Err(e) => debug!("No {v} device: {e}"),
        }
    }

    Err(anyhow::anyhow!("No devices found"))
}

/// Execute a command with the provided signer
async fn execute(signer: &Signer, args: &Options) -> anyhow::Result<()> {
    debug!("Executing command: {:?}", args.cmd);

    if args.cmd == Actions::List {
        let mut devices: Vec<_> = signer.devices().await.into_iter().collect();
        devices.sort_by(|a, b| a.0.cmp(&b.0));

        info!("Devices:");
        for (id, d) in devices {
            info!("  {id}: {d}");
        }

        return Ok(());
    }

    let d = select(signer, args.device.as_deref()).await?;
    info!("Using device: {d}");

    match &args.cmd {
        Actions::PublicKey {
            path,
            parent_fingerprint,
        } => {
            let xpub = signer.get_public_key(path, *parent_fingerprint).await?;
            let xpub = hwsigner::hwsigner_core::xkey::encode_xpub(&xpub, signer.network());

            println!("{xpub}");
        }
        Actions::SignMessage { path, message } => {
            let sig = signer.sign_message(path, message.as_bytes()).await?;

            println!("{}", encode_signature(&sig));
        }
        Actions::Token { path } => {
            let token = app::generate_token_hex(signer, Some(path)).await?;

            println!("{token}");
        }
        Actions::SignTx { tx, inputs } => {
            let tx: Transaction = encode::deserialize(tx.as_ref())?;
            let inputs: Vec<InputData> = read_input(inputs).await?;

            if inputs.len() != tx.input.len() {
                warn!(
                    "{} input data for {} inputs",
                    inputs.len(),
                    tx.input.len()
                );
            }

            let signed = signer.sign_transaction(&tx, &inputs).await?;

            println!("{}", encode::serialize_hex(&signed));
        }
        Actions::List => unreachable!(),
    }

    Ok(())
}
