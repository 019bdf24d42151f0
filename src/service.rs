use htlc_sdk::elements::encode::serialize_hex;
use htlc_sdk::elements::secp256k1_zkp::PublicKey;
use htlc_sdk::elements::{Script, Transaction, Txid};
use htlc_sdk::{
    ChainBackend, ConfidentialContext, ElectrumBackend, OutputType, SwapInput, SwapOutput,
    SweepParams, construct_claim_transaction, construct_refund_transaction, detect_preimage,
    detect_swap, output_script, target_fee, target_fee_discounted,
};
use thiserror::Error;

use crate::SwapConfig;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("sdk error: {0}")]
    Sdk(#[from] htlc_sdk::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("transaction {0} has no output paying to the swap script")]
    NoSwapOutput(Txid),

    #[error("no preimage revealed for the swap script")]
    NoPreimage,
}

/// A transaction handed to the chain backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Broadcast {
    pub txid: Txid,
    pub hex: String,
}

/// Finds swap outputs on chain and sweeps them through a [`ChainBackend`].
pub struct SwapService<B: ChainBackend> {
    backend: B,
    config: SwapConfig,
    confidential: ConfidentialContext,
}

impl SwapService<ElectrumBackend> {
    /// Service talking to the configured Electrum server.
    pub fn electrum(config: SwapConfig) -> Self {
        let backend = ElectrumBackend::new(config.electrum_url());
        Self::new(backend, config)
    }
}

impl<B: ChainBackend> SwapService<B> {
    pub fn new(backend: B, config: SwapConfig) -> Self {
        Self {
            backend,
            config,
            confidential: ConfidentialContext::new(),
        }
    }

    pub fn config(&self) -> &SwapConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn confidential(&self) -> &ConfidentialContext {
        &self.confidential
    }

    /// Fetches `txid` and returns its output locked to `redeem_script`.
    pub fn find_lockup(
        &self,
        txid: &Txid,
        redeem_script: &Script,
    ) -> Result<SwapOutput, ServiceError> {
        let tx = self.backend.fetch_transaction(txid)?;
        detect_swap(redeem_script, &tx).ok_or(ServiceError::NoSwapOutput(*txid))
    }

    /// Claims `inputs` to `destination` at the configured fee rate and
    /// broadcasts the result.
    pub fn claim(
        &self,
        inputs: &[SwapInput],
        destination: &Script,
        blinding_pubkey: Option<PublicKey>,
    ) -> Result<Broadcast, ServiceError> {
        let tx = self.fee_targeted(|fee| {
            construct_claim_transaction(
                &self.confidential,
                inputs,
                &self.sweep_params(destination, fee, blinding_pubkey),
            )
        })?;
        self.broadcast(&tx)
    }

    /// Refunds `inputs` to `destination` with the transaction locked at
    /// `lock_height`.
    pub fn refund(
        &self,
        inputs: &[SwapInput],
        destination: &Script,
        lock_height: u32,
        blinding_pubkey: Option<PublicKey>,
    ) -> Result<Broadcast, ServiceError> {
        let tx = self.fee_targeted(|fee| {
            construct_refund_transaction(
                &self.confidential,
                inputs,
                &self.sweep_params(destination, fee, blinding_pubkey),
                lock_height,
            )
        })?;
        self.broadcast(&tx)
    }

    /// Preimage revealed by the transaction `spending_txid`.
    pub fn find_preimage(
        &self,
        spending_txid: &Txid,
        redeem_script: &Script,
    ) -> Result<Vec<u8>, ServiceError> {
        let tx = self.backend.fetch_transaction(spending_txid)?;
        detect_preimage(redeem_script, &tx).ok_or(ServiceError::NoPreimage)
    }

    /// Scans the history of the lockup script for a spend that reveals the
    /// preimage.
    pub fn watch_preimage(
        &self,
        redeem_script: &Script,
        output_type: OutputType,
    ) -> Result<Vec<u8>, ServiceError> {
        let script_pubkey = output_script(redeem_script, output_type)?;
        for entry in self.backend.get_script_history(&script_pubkey)? {
            let tx = self.backend.fetch_transaction(&entry.txid)?;
            if let Some(preimage) = detect_preimage(redeem_script, &tx) {
                log::debug!("preimage revealed in {}", entry.txid);
                return Ok(preimage);
            }
        }
        Err(ServiceError::NoPreimage)
    }

    fn sweep_params(
        &self,
        destination: &Script,
        fee: u64,
        blinding_pubkey: Option<PublicKey>,
    ) -> SweepParams {
        SweepParams {
            destination: destination.clone(),
            fee,
            rbf: self.config.rbf,
            asset_id: self.config.network.policy_asset(),
            blinding_pubkey,
        }
    }

    fn fee_targeted<F>(&self, build: F) -> Result<Transaction, ServiceError>
    where
        F: FnMut(u64) -> htlc_sdk::Result<Transaction>,
    {
        let tx = if self.config.discount_ct {
            target_fee_discounted(self.config.fee_rate, build)?
        } else {
            target_fee(self.config.fee_rate, build)?
        };
        Ok(tx)
    }

    fn broadcast(&self, tx: &Transaction) -> Result<Broadcast, ServiceError> {
        let hex = serialize_hex(tx);
        let txid = self.backend.broadcast_hex(&hex)?;
        log::info!("broadcast {txid} ({} bytes)", hex.len() / 2);
        Ok(Broadcast { txid, hex })
    }
}
