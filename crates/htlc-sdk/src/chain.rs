//! Chain access for finding lockups and publishing sweeps.

use lwk_wollet::blocking::BlockchainBackend;
use lwk_wollet::elements::encode::deserialize;
use lwk_wollet::elements::{Script, Transaction, Txid};
use lwk_wollet::{ElectrumClient, ElectrumUrl};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

const GET_HISTORY: &str = "blockchain.scripthash.get_history";

/// A transaction touching a script, as reported by the chain backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptHistoryEntry {
    pub txid: Txid,
    /// 0 or negative while in the mempool.
    pub height: i32,
}

impl ScriptHistoryEntry {
    pub fn is_confirmed(&self) -> bool {
        self.height > 0
    }
}

/// What the swap service needs from a Liquid node or indexer.
pub trait ChainBackend {
    fn fetch_transaction(&self, txid: &Txid) -> Result<Transaction>;

    fn broadcast(&self, tx: &Transaction) -> Result<Txid>;

    /// Every transaction paying to or spending from `script_pubkey`,
    /// mempool included.
    fn get_script_history(&self, script_pubkey: &Script) -> Result<Vec<ScriptHistoryEntry>>;

    /// Decodes a hex transaction and broadcasts it.
    fn broadcast_hex(&self, tx_hex: &str) -> Result<Txid> {
        let bytes = hex::decode(tx_hex).map_err(|e| Error::Broadcast(format!("bad hex: {e}")))?;
        let tx: Transaction =
            deserialize(&bytes).map_err(|e| Error::Broadcast(format!("bad transaction: {e}")))?;
        self.broadcast(&tx)
    }
}

/// [`ChainBackend`] over an Electrum server. Opens a connection per call.
#[derive(Debug, Clone)]
pub struct ElectrumBackend {
    url: String,
}

#[derive(Deserialize)]
struct HistoryItem {
    tx_hash: String,
    height: i32,
}

impl ElectrumBackend {
    pub fn new(url: &str) -> Self {
        Self { url: url.to_owned() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn connect(&self) -> Result<ElectrumClient> {
        let url: ElectrumUrl = self
            .url
            .parse()
            .map_err(|e| Error::Electrum(format!("{e:?}")))?;
        ElectrumClient::new(&url).map_err(|e| Error::Electrum(e.to_string()))
    }

    fn raw_history(&self, script_pubkey: &Script) -> Result<serde_json::Value> {
        use electrum_client::{ElectrumApi, Param};

        let client =
            electrum_client::Client::new(&self.url).map_err(|e| Error::Electrum(e.to_string()))?;
        client
            .raw_call(GET_HISTORY, [Param::String(electrum_script_hash(script_pubkey))])
            .map_err(|e| Error::Electrum(e.to_string()))
    }
}

/// Scripthash Electrum indexes scripts by: SHA256 of the script, byte-reversed.
pub(crate) fn electrum_script_hash(script_pubkey: &Script) -> String {
    let mut digest = Sha256::digest(script_pubkey.as_bytes());
    digest.reverse();
    hex::encode(digest)
}

fn parse_history(response: serde_json::Value) -> Result<Vec<ScriptHistoryEntry>> {
    let items: Vec<HistoryItem> =
        serde_json::from_value(response).map_err(|e| Error::Query(format!("history: {e}")))?;
    items
        .into_iter()
        .map(|item| {
            let txid = item
                .tx_hash
                .parse()
                .map_err(|e| Error::Query(format!("bad tx_hash {}: {e}", item.tx_hash)))?;
            Ok(ScriptHistoryEntry {
                txid,
                height: item.height,
            })
        })
        .collect()
}

impl ChainBackend for ElectrumBackend {
    fn fetch_transaction(&self, txid: &Txid) -> Result<Transaction> {
        self.connect()?
            .get_transactions(&[*txid])
            .map_err(|e| Error::Electrum(e.to_string()))?
            .pop()
            .ok_or_else(|| Error::Query(format!("transaction {txid} not found")))
    }

    fn broadcast(&self, tx: &Transaction) -> Result<Txid> {
        let txid = self
            .connect()?
            .broadcast(tx)
            .map_err(|e| Error::Broadcast(e.to_string()))?;
        log::debug!("electrum accepted {txid}");
        Ok(txid)
    }

    fn get_script_history(&self, script_pubkey: &Script) -> Result<Vec<ScriptHistoryEntry>> {
        parse_history(self.raw_history(script_pubkey)?)
    }
}
