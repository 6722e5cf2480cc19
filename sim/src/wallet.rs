// Copyright (c) 2022-2023 The MobileCoin Foundation

//! In-memory wallet collaborators

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;

use hwsigner::{
    app::{AccountInfo, KeyInfo, MultisigInfo, MultisigWallet, ProposalInfo, Wallet},
    Error,
};
use hwsigner_core::{
    bitcoin::{Script, ScriptBuf, Transaction, Txid},
    Error::InvalidInput,
};

/// Single-key wallet backed by in-memory maps
#[derive(Clone, Debug, Default)]
pub struct MemoryWallet {
    accounts: BTreeMap<String, AccountInfo>,
    txs: HashMap<Txid, Transaction>,
    keys: HashMap<ScriptBuf, KeyInfo>,
}

impl MemoryWallet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an account
    pub fn with_account(mut self, account: AccountInfo) -> Self {
        self.accounts.insert(account.name.clone(), account);
        self
    }

    /// Add a known transaction
    pub fn with_transaction(mut self, tx: Transaction) -> Self {
        self.txs.insert(tx.compute_txid(), tx);
        self
    }

    /// Add key metadata for an owned output script
    pub fn with_key(mut self, script: ScriptBuf, key: KeyInfo) -> Self {
        self.keys.insert(script, key);
        self
    }
}

#[async_trait]
impl Wallet for MemoryWallet {
    async fn account(&self, name: &str) -> Result<AccountInfo, Error> {
        self.accounts
            .get(name)
            .cloned()
            .ok_or_else(|| InvalidInput(format!("unknown account {name}")).into())
    }

    async fn accounts(&self) -> Result<Vec<String>, Error> {
        Ok(self.accounts.keys().cloned().collect())
    }

    async fn transaction(&self, txid: &Txid) -> Result<Option<Transaction>, Error> {
        Ok(self.txs.get(txid).cloned())
    }

    async fn key(&self, script: &Script) -> Result<Option<KeyInfo>, Error> {
        Ok(self.keys.get(script).cloned())
    }
}

/// Multisig wallet backed by in-memory maps
#[derive(Clone, Debug)]
pub struct MemoryMultisigWallet {
    info: MultisigInfo,
    proposals: BTreeMap<u64, ProposalInfo>,
}

impl MemoryMultisigWallet {
    pub fn new(info: MultisigInfo) -> Self {
        Self {
            info,
            proposals: BTreeMap::new(),
        }
    }

    /// Add a proposal
    pub fn with_proposal(mut self, id: u64, proposal: ProposalInfo) -> Self {
        self.proposals.insert(id, proposal);
        self
    }
}

#[async_trait]
impl MultisigWallet for MemoryMultisigWallet {
    async fn info(&self) -> Result<MultisigInfo, Error> {
        Ok(self.info.clone())
    }

    async fn proposal(&self, id: u64) -> Result<ProposalInfo, Error> {
        self.proposals
            .get(&id)
            .cloned()
            .ok_or_else(|| InvalidInput(format!("unknown proposal {id}")).into())
    }
}
