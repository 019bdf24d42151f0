use lwk_wollet::elements::confidential::{Asset, Nonce, Value as ConfValue};
use lwk_wollet::elements::pset::{Input, Output, PartiallySignedTransaction};
use lwk_wollet::elements::{AssetId, Script, Sequence, TxOut, TxOutWitness};

use crate::error::{Error, Result};
use crate::script::{OutputType, nested_redeem_script};
use crate::sweep::SwapInput;

/// Create a new empty PSET v2.
pub(crate) fn new_pset() -> PartiallySignedTransaction {
    PartiallySignedTransaction::new_v2()
}

/// Build an explicit (non-confidential) TxOut.
pub(crate) fn explicit_txout(asset_id: AssetId, amount: u64, script_pubkey: &Script) -> TxOut {
    TxOut {
        asset: Asset::Explicit(asset_id),
        value: ConfValue::Explicit(amount),
        nonce: Nonce::Null,
        script_pubkey: script_pubkey.clone(),
        witness: TxOutWitness::default(),
    }
}

/// Build a fee TxOut.
pub(crate) fn fee_txout(asset_id: AssetId, amount: u64) -> TxOut {
    TxOut::new_fee(amount, asset_id)
}

/// Add a swap input, carrying the previous-output data its encoding needs.
///
/// Legacy inputs get the full previous transaction, witness inputs get the
/// previous output (nested ones also carry the previous transaction when
/// known). Native inputs never embed it. The redeem script goes into `redeem_script` for P2SH and
/// `witness_script` for the witness encodings.
pub(crate) fn add_swap_input(
    pset: &mut PartiallySignedTransaction,
    index: usize,
    utxo: &SwapInput,
    sequence: Sequence,
) -> Result<()> {
    let mut input = Input {
        previous_txid: utxo.outpoint.txid,
        previous_output_index: utxo.outpoint.vout,
        sequence: Some(sequence),
        ..Default::default()
    };

    match utxo.output_type {
        OutputType::Legacy => {
            let prev_tx = utxo
                .previous_transaction
                .as_ref()
                .ok_or(Error::MissingPreviousTransaction(index))?;
            if prev_tx.txid() != utxo.outpoint.txid {
                return Err(Error::PreviousTransactionMismatch(index));
            }
            input.non_witness_utxo = Some(prev_tx.clone());
            input.redeem_script = Some(utxo.redeem_script.clone());
        }
        OutputType::NestedWitness => {
            if let Some(prev_tx) = &utxo.previous_transaction {
                if prev_tx.txid() != utxo.outpoint.txid {
                    return Err(Error::PreviousTransactionMismatch(index));
                }
                input.non_witness_utxo = Some(prev_tx.clone());
            }
            input.witness_utxo = Some(utxo.txout.clone());
            input.redeem_script = Some(nested_redeem_script(&utxo.redeem_script));
            input.witness_script = Some(utxo.redeem_script.clone());
        }
        OutputType::NativeWitness => {
            input.witness_utxo = Some(utxo.txout.clone());
            input.witness_script = Some(utxo.redeem_script.clone());
        }
        OutputType::Taproot => return Err(Error::UnsupportedEncoding(index)),
    }

    pset.add_input(input);
    Ok(())
}

/// Add an output to a PSET, keeping commitments and proofs when it is blinded.
pub(crate) fn add_pset_output(pset: &mut PartiallySignedTransaction, txout: TxOut) {
    pset.add_output(Output::from_txout(txout));
}
