// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Emulated session device and device-event bridge

use std::{
    collections::BTreeMap,
    str::FromStr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use log::debug;
use tokio::sync::broadcast;

use hwsigner::{
    device::trezor::types::*,
    manager::{TrezorBridge, TrezorDescriptor, TrezorEvent},
    Error, TrezorSession, EVENT_CAPACITY,
};
use hwsigner_core::{
    bitcoin::{
        absolute::LockTime,
        bip32::{Xpriv, Xpub},
        ecdsa,
        opcodes::all::OP_RETURN,
        script::{Builder, PushBytesBuf},
        secp256k1,
        sighash::EcdsaSighashType,
        transaction::Version,
        Address, Amount, CompressedPublicKey, OutPoint, PublicKey, ScriptBuf, Sequence,
        Transaction, TxIn, TxOut, Txid, Witness,
    },
    helpers::{
        apply_cosigner_signatures, apply_multisig, apply_single, p2sh, p2wsh, redeem_script, Keyring,
    },
    input_data::PrevTx,
    secp, signing, xkey, Coin, InputData, InputDataOptions, Multisig, Network, Path,
    PublicKeyInfo,
};

use crate::{derive, lock, master_from_phrase, SimControl};

fn p2wpkh(public_key: &PublicKey) -> ScriptBuf {
    ScriptBuf::new_p2wpkh(&CompressedPublicKey(public_key.inner).wpubkey_hash())
}

/// Emulated session device
///
/// Rebuilds the transaction from each request as the device would:
/// legacy inputs require a reference transaction and witness inputs an
/// amount.
pub struct SimTrezor {
    master: Xpriv,
    network: Network,
    control: SimControl,
    released: AtomicBool,
}

impl SimTrezor {
    /// Create a device from a mnemonic phrase
    pub fn from_phrase(phrase: &str, network: Network) -> Result<Self, Error> {
        Ok(Self {
            master: master_from_phrase(phrase, network)?,
            network,
            control: SimControl::new(),
            released: AtomicBool::new(false),
        })
    }

    /// Control handle for this device
    pub fn control(&self) -> SimControl {
        self.control.clone()
    }

    /// Whether the session has been released
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    fn public_node(&self, path: &[u32]) -> Result<PublicNode, Error> {
        let xpub = Xpub::from_priv(secp(), &derive(&self.master, path)?);

        Ok(PublicNode {
            node: HDNodeType::from_xpub(&xpub),
            xpub: xkey::encode_xpub(&xpub, self.network),
        })
    }

    fn check_coin(&self, coin: &str) -> Result<(), Error> {
        match coin == coin_name(self.network) {
            true => Ok(()),
            false => Err(Error::InvalidRequest(format!("unexpected coin {coin}"))),
        }
    }

    /// Rebuild the unsigned transaction from a request
    fn build_tx(&self, req: &SignTxRequest) -> Result<Transaction, Error> {
        let mut input = Vec::with_capacity(req.inputs.len());
        for i in &req.inputs {
            input.push(TxIn {
                previous_output: i.prevout()?,
                script_sig: ScriptBuf::new(),
                sequence: Sequence(i.sequence),
                witness: Witness::new(),
            });
        }

        let mut output = Vec::with_capacity(req.outputs.len());
        for o in &req.outputs {
            let script_pubkey = match o.script_type {
                OutputScriptType::PayToOpReturn => {
                    let data = o.op_return_data.as_deref().unwrap_or("");
                    let data = hex::decode(data)
                        .map_err(|_| Error::InvalidRequest("invalid op_return_data".to_string()))?;

                    match data.is_empty() {
                        true => Builder::new().push_opcode(OP_RETURN).into_script(),
                        false => {
                            let b = PushBytesBuf::try_from(data).map_err(|_| {
                                Error::InvalidRequest("op_return_data too long".to_string())
                            })?;
                            ScriptBuf::new_op_return(b)
                        }
                    }
                }
                OutputScriptType::PayToAddress => {
                    let a = o.address.as_deref().ok_or_else(|| {
                        Error::InvalidRequest("output address required".to_string())
                    })?;
                    Address::from_str(a)
                        .map_err(|_| Error::InvalidRequest(format!("invalid address {a}")))?
                        .require_network(address_network(self.network))
                        .map_err(|_| Error::InvalidRequest(format!("wrong network for {a}")))?
                        .script_pubkey()
                }
            };

            output.push(TxOut {
                value: Amount::from_sat(o.amount),
                script_pubkey,
            });
        }

        Ok(Transaction {
            version: Version(req.version),
            lock_time: LockTime::from_consensus(req.lock_time),
            input,
            output,
        })
    }

    /// Rebuild the multisig descriptor carried by a request input
    fn multisig(&self, m: &MultisigRedeemScriptType) -> Result<Multisig, Error> {
        let mut pubkeys = Vec::with_capacity(m.pubkeys.len());

        for (n, p) in m.pubkeys.iter().enumerate() {
            let xpub = p.node.to_xpub(self.network)?;
            let mut k = PublicKeyInfo::new(xkey::encode_xpub(&xpub, self.network), &p.address_n);

            match m.signatures.get(n).map(|s| s.as_str()) {
                Some("") | None => (),
                Some(s) => {
                    let der = hex::decode(s)
                        .map_err(|_| Error::InvalidRequest("invalid signature".to_string()))?;
                    let signature = secp256k1::ecdsa::Signature::from_der(&der)
                        .map_err(|_| Error::InvalidRequest("invalid signature".to_string()))?;
                    k = k.with_signature(ecdsa::Signature {
                        signature,
                        sighash_type: EcdsaSighashType::All,
                    });
                }
            }

            pubkeys.push(k);
        }

        Ok(Multisig::new(m.m as usize, pubkeys)?)
    }

    /// Reconstruct input data for a request input
    fn input_data(
        &self,
        i: &TxInputType,
        prevout: OutPoint,
        public_key: &PublicKey,
        ref_txs: &BTreeMap<Txid, Transaction>,
    ) -> Result<InputData, Error> {
        let multisig = i.multisig.as_ref().map(|m| self.multisig(m)).transpose()?;

        let amount = || {
            i.amount.map(Amount::from_sat).ok_or_else(|| {
                Error::InvalidRequest(format!("amount required for witness input {prevout}"))
            })
        };
        let ref_tx = || {
            ref_txs.get(&prevout.txid).cloned().ok_or_else(|| {
                Error::InvalidRequest(format!("reference transaction required for {prevout}"))
            })
        };

        let (coin, witness, prev_tx) = match i.script_type {
            InputScriptType::SpendAddress | InputScriptType::SpendMultisig => {
                let tx = ref_tx()?;
                (Coin::from_tx(&tx, prevout.vout)?, false, Some(PrevTx::Tx(tx)))
            }
            InputScriptType::SpendWitness => {
                let script_pubkey = p2wpkh(public_key);
                let output = TxOut {
                    value: amount()?,
                    script_pubkey,
                };
                (Coin::new(prevout, output), true, None)
            }
            InputScriptType::SpendP2shWitness => {
                let program = match &multisig {
                    Some(m) => p2wsh(&redeem_script(m)?),
                    None => p2wpkh(public_key),
                };
                let output = TxOut {
                    value: amount()?,
                    script_pubkey: p2sh(&program),
                };
                (Coin::new(prevout, output), true, None)
            }
            InputScriptType::External => {
                return Err(Error::InvalidRequest(format!("external input {prevout}")))
            }
        };

        Ok(InputData::new(InputDataOptions {
            path: Some(Path::from_list(&i.address_n, false)?),
            witness,
            coin: Some(coin),
            prev_tx,
            multisig,
            ..Default::default()
        })?)
    }

    fn sign(&self, req: &SignTxRequest) -> Result<SignTxResponse, Error> {
        self.check_coin(&req.coin)?;

        let mut ref_txs = BTreeMap::new();
        for r in &req.ref_txs {
            let tx = Transaction::try_from(r)?;
            ref_txs.insert(tx.compute_txid(), tx);
        }

        let unsigned = self.build_tx(req)?;
        let mut tx = unsigned.clone();
        let mut signatures = Vec::with_capacity(req.inputs.len());

        for (index, i) in req.inputs.iter().enumerate() {
            if i.script_type == InputScriptType::External {
                signatures.push(String::new());
                continue;
            }

            let prevout = unsigned.input[index].previous_output;
            let key = derive(&self.master, &i.address_n)?;
            let public_key = PublicKey::new(key.private_key.public_key(secp()));

            let input = self.input_data(i, prevout, &public_key, &ref_txs)?;
            let ring = Keyring::new(&input, public_key)?;

            let sig = signing::sign_input(&unsigned, index, &input, &ring, &key.private_key)?;

            match input.is_multisig() {
                true => {
                    apply_multisig(&mut tx, index, &ring, &sig)?;
                    apply_cosigner_signatures(&mut tx, &input)?;
                }
                false => apply_single(&mut tx, index, &ring, &sig)?,
            }

            signatures.push(hex::encode(sig.signature.serialize_der()));
        }

        debug!("signed {} inputs", req.inputs.len());

        Ok(SignTxResponse {
            signatures,
            serialized_tx: serialize_tx(&tx),
        })
    }
}

impl std::fmt::Debug for SimTrezor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimTrezor")
            .field("fingerprint", &self.master.fingerprint(secp()))
            .field("network", &self.network)
            .finish()
    }
}

#[async_trait]
impl TrezorSession for SimTrezor {
    async fn get_public_key(&self, path: &[u32], coin: &str) -> Result<PublicNode, Error> {
        self.control
            .run("get_public_key", None, || {
                self.check_coin(coin)?;
                self.public_node(path)
            })
            .await
    }

    async fn sign_transaction(&self, req: &SignTxRequest) -> Result<SignTxResponse, Error> {
        self.control
            .run("sign_transaction", None, || self.sign(req))
            .await
    }

    async fn sign_message(
        &self,
        path: &[u32],
        message: &[u8],
        coin: &str,
    ) -> Result<MessageSignature, Error> {
        self.control
            .run("sign_message", None, || {
                self.check_coin(coin)?;

                let key = derive(&self.master, path)?.private_key;
                let public_key = CompressedPublicKey(key.public_key(secp()));

                Ok(MessageSignature {
                    address: Address::p2pkh(public_key, address_network(self.network)).to_string(),
                    signature: hex::encode(signing::sign_message(message, &key)),
                })
            })
            .await
    }

    async fn release(&self) -> Result<(), Error> {
        self.released.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Emulated device-event bridge
pub struct SimTrezorBridge {
    devices: Mutex<BTreeMap<String, (TrezorDescriptor, Arc<SimTrezor>)>>,
    events: broadcast::Sender<TrezorEvent>,
}

impl Default for SimTrezorBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl SimTrezorBridge {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            devices: Mutex::new(BTreeMap::new()),
            events,
        }
    }

    fn insert(&self, path: &str, device: Arc<SimTrezor>, acquired: bool) -> TrezorDescriptor {
        let desc = TrezorDescriptor {
            path: path.to_string(),
            device_id: format!("SIM{}", path.to_uppercase()),
            label: Some(format!("sim {path}")),
            model: Some("T".to_string()),
            acquired,
        };

        lock(&self.devices).insert(path.to_string(), (desc.clone(), device));

        desc
    }

    /// Connect a device available to this client
    pub fn connect(&self, path: &str, device: Arc<SimTrezor>) -> TrezorDescriptor {
        let desc = self.insert(path, device, true);
        let _ = self.events.send(TrezorEvent::Connect(desc.clone()));
        desc
    }

    /// Connect a device held by another client
    pub fn connect_unacquired(&self, path: &str, device: Arc<SimTrezor>) -> TrezorDescriptor {
        let desc = self.insert(path, device, false);
        let _ = self.events.send(TrezorEvent::ConnectUnacquired(desc.clone()));
        desc
    }

    /// Change device attributes, emitting a changed event
    pub fn change(
        &self,
        path: &str,
        label: Option<String>,
        acquired: bool,
    ) -> Option<TrezorDescriptor> {
        let desc = {
            let mut devices = lock(&self.devices);
            let (d, _) = devices.get_mut(path)?;
            d.label = label;
            d.acquired = acquired;
            d.clone()
        };

        let _ = self.events.send(TrezorEvent::Changed(desc.clone()));
        Some(desc)
    }

    /// Disconnect a device
    pub fn disconnect(&self, path: &str) -> Option<TrezorDescriptor> {
        let (desc, _) = lock(&self.devices).remove(path)?;
        let _ = self.events.send(TrezorEvent::Disconnect(desc.clone()));
        Some(desc)
    }
}

#[async_trait]
impl TrezorBridge for SimTrezorBridge {
    async fn enumerate(&self) -> Result<Vec<TrezorDescriptor>, Error> {
        Ok(lock(&self.devices).values().map(|(d, _)| d.clone()).collect())
    }

    async fn acquire(&self, desc: &TrezorDescriptor) -> Result<Arc<dyn TrezorSession>, Error> {
        let devices = lock(&self.devices);

        match devices.get(&desc.path) {
            Some((d, s)) if d.acquired => Ok(s.clone()),
            Some(_) => Err(Error::Transport(format!("device {} in use", desc.path))),
            None => Err(Error::NoDevice),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<TrezorEvent> {
        self.events.subscribe()
    }
}
