// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Emulated APDU Bitcoin application

use std::{collections::BTreeMap, sync::Arc, sync::Mutex, time::Duration};

use async_trait::async_trait;
use log::debug;
use tokio::sync::broadcast;

use hwsigner::{
    device::ledger::{LedgerInput, LedgerPublicKey},
    manager::{LedgerDescriptor, LedgerProvider, ProviderEvent},
    Error, LedgerApp, EVENT_CAPACITY,
};
use hwsigner_core::{
    bitcoin::{
        bip32::{Xpriv, Xpub},
        ecdsa,
        sighash::EcdsaSighashType,
        Transaction,
    },
    secp, signing, xkey, Network,
};

use crate::{derive, lock, master_from_phrase, secret_key, SimControl};

/// Emulated Bitcoin application
///
/// Follows the application's validation: legacy inputs require the
/// previous transaction, which must fund the input, and legacy and witness
/// inputs may not be mixed.
#[derive(Clone)]
pub struct SimLedger {
    master: Xpriv,
    control: SimControl,
    timeout: Option<Duration>,
}

impl SimLedger {
    /// Create an application from a mnemonic phrase
    pub fn from_phrase(phrase: &str, network: Network) -> Result<Self, Error> {
        Ok(Self {
            master: master_from_phrase(phrase, network)?,
            control: SimControl::new(),
            timeout: None,
        })
    }

    /// Control handle for this application
    pub fn control(&self) -> SimControl {
        self.control.clone()
    }

    /// Copy of this application with a response timeout applied
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..self.clone()
        }
    }

    fn public_key(&self, path: &[u32]) -> Result<LedgerPublicKey, Error> {
        let k = Xpub::from_priv(secp(), &derive(&self.master, path)?);

        Ok(LedgerPublicKey {
            public_key: k.public_key,
            chain_code: xkey::chain_code_bytes(&k.chain_code),
        })
    }

    fn sign_inputs(
        &self,
        tx: &Transaction,
        inputs: &[LedgerInput],
    ) -> Result<Vec<ecdsa::Signature>, Error> {
        if inputs.len() != tx.input.len() {
            return Err(Error::InvalidRequest(format!(
                "{} inputs for {} transaction inputs",
                inputs.len(),
                tx.input.len()
            )));
        }

        let witness = inputs.iter().filter(|i| i.witness).count();
        if witness != 0 && witness != inputs.len() {
            return Err(Error::UnsupportedInput(
                "mixed legacy and witness inputs".to_string(),
            ));
        }

        let mut sigs = Vec::with_capacity(inputs.len());

        for (index, (txin, i)) in tx.input.iter().zip(inputs).enumerate() {
            if txin.previous_output != i.prevout {
                return Err(Error::InvalidRequest(format!(
                    "input {index} does not spend {}",
                    i.prevout
                )));
            }

            // Trusted input checks
            if !i.witness {
                let prev = i.prev_tx.as_ref().ok_or_else(|| {
                    Error::InvalidRequest(format!("missing previous transaction for {}", i.prevout))
                })?;

                let funded = prev.compute_txid() == i.prevout.txid
                    && prev
                        .output
                        .get(i.prevout.vout as usize)
                        .map(|o| o.value == i.value)
                        .unwrap_or(false);
                if !funded {
                    return Err(Error::InvalidRequest(format!(
                        "previous transaction does not fund {}",
                        i.prevout
                    )));
                }
            }

            let sighash_type = EcdsaSighashType::All;
            let msg = signing::signature_hash(
                tx,
                index,
                &i.script_code,
                i.value,
                i.witness,
                sighash_type,
            )?;

            let key = secret_key(&self.master, &i.path)?;

            sigs.push(ecdsa::Signature {
                signature: secp().sign_ecdsa(&msg, &key),
                sighash_type,
            });
        }

        Ok(sigs)
    }
}

impl std::fmt::Debug for SimLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimLedger")
            .field("fingerprint", &self.master.fingerprint(secp()))
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[async_trait]
impl LedgerApp for SimLedger {
    async fn app_version(&self) -> Result<String, Error> {
        self.control
            .run("app_version", self.timeout, || Ok("2.1.0-sim".to_string()))
            .await
    }

    async fn get_public_key(&self, path: &[u32]) -> Result<LedgerPublicKey, Error> {
        self.control
            .run("get_public_key", self.timeout, || self.public_key(path))
            .await
    }

    async fn sign_transaction(
        &self,
        tx: &Transaction,
        inputs: &[LedgerInput],
    ) -> Result<Vec<ecdsa::Signature>, Error> {
        self.control
            .run("sign_transaction", self.timeout, || self.sign_inputs(tx, inputs))
            .await
    }

    async fn sign_message(&self, path: &[u32], message: &[u8]) -> Result<[u8; 65], Error> {
        self.control
            .run("sign_message", self.timeout, || {
                let key = secret_key(&self.master, path)?;
                Ok(signing::sign_message(message, &key))
            })
            .await
    }
}

/// Emulated device provider with plug / unplug events
pub struct SimLedgerProvider {
    devices: Mutex<BTreeMap<String, (LedgerDescriptor, SimLedger)>>,
    events: broadcast::Sender<ProviderEvent>,
}

impl Default for SimLedgerProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SimLedgerProvider {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            devices: Mutex::new(BTreeMap::new()),
            events,
        }
    }

    /// Attach an emulated device
    pub fn plug(&self, handle: &str, app: SimLedger) -> LedgerDescriptor {
        let desc = LedgerDescriptor {
            handle: handle.to_string(),
            key: format!("2c97:0001:sim-{handle}"),
            model: Some("Nano S Plus (sim)".to_string()),
        };

        debug!("plug {handle}");

        lock(&self.devices).insert(handle.to_string(), (desc.clone(), app));
        let _ = self.events.send(ProviderEvent::Attach(desc.clone()));

        desc
    }

    /// Detach an emulated device
    pub fn unplug(&self, handle: &str) -> Option<LedgerDescriptor> {
        debug!("unplug {handle}");

        let (desc, _) = lock(&self.devices).remove(handle)?;
        let _ = self.events.send(ProviderEvent::Detach(desc.clone()));

        Some(desc)
    }
}

#[async_trait]
impl LedgerProvider for SimLedgerProvider {
    async fn list(&self) -> Result<Vec<LedgerDescriptor>, Error> {
        Ok(lock(&self.devices).values().map(|(d, _)| d.clone()).collect())
    }

    async fn connect(
        &self,
        desc: &LedgerDescriptor,
        timeout: Duration,
    ) -> Result<Arc<dyn LedgerApp>, Error> {
        let devices = lock(&self.devices);
        let (_, app) = devices.get(&desc.handle).ok_or(Error::NoDevice)?;

        Ok(Arc::new(app.with_timeout(timeout)))
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }
}
