use lwk_wollet::elements::confidential::{Asset, Value};
use lwk_wollet::elements::{OutPoint, Script, Transaction, TxOut};

use crate::script::{OutputType, output_script};

/// A transaction output locked to a known swap script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapOutput {
    pub outpoint: OutPoint,
    pub output_type: OutputType,
    pub txout: TxOut,
}

impl SwapOutput {
    pub fn vout(&self) -> u32 {
        self.outpoint.vout
    }

    pub fn script_pubkey(&self) -> &Script {
        &self.txout.script_pubkey
    }

    /// Explicit amount or value commitment.
    pub fn value(&self) -> Value {
        self.txout.value
    }

    pub fn asset(&self) -> Asset {
        self.txout.asset
    }

    pub fn is_confidential(&self) -> bool {
        self.txout.value.is_confidential()
    }
}

/// Finds the first output of `tx` that pays to `redeem_script` under any of
/// the script-hash encodings.
pub fn detect_swap(redeem_script: &Script, tx: &Transaction) -> Option<SwapOutput> {
    let candidates: Vec<(OutputType, Script)> = OutputType::SCRIPT_HASH_TYPES
        .iter()
        .filter_map(|ty| Some((*ty, output_script(redeem_script, *ty).ok()?)))
        .collect();

    let txid = tx.txid();
    tx.output.iter().enumerate().find_map(|(vout, txout)| {
        let (output_type, _) = candidates
            .iter()
            .find(|(_, script)| *script == txout.script_pubkey)?;
        log::debug!("swap output {txid}:{vout} ({output_type:?})");
        Some(SwapOutput {
            outpoint: OutPoint::new(txid, vout as u32),
            output_type: *output_type,
            txout: txout.clone(),
        })
    })
}
