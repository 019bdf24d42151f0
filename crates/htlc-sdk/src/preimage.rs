use lwk_wollet::elements::script::Instruction;
use lwk_wollet::elements::{Script, Transaction, TxIn};

use crate::script::nested_redeem_script;

/// Returns the preimage revealed by the input of `tx` that spends
/// `redeem_script`.
///
/// Every encoding ends its unlocking stack with `<sig> <selector> <redeem>`,
/// so the selector is read from the element before the redeem script. An
/// empty selector means the output was refunded and yields `None`.
pub fn detect_preimage(redeem_script: &Script, tx: &Transaction) -> Option<Vec<u8>> {
    let (vin, stack) = tx
        .input
        .iter()
        .enumerate()
        .find_map(|(vin, input)| unlocking_stack(redeem_script, input).map(|stack| (vin, stack)))?;

    let selector = stack.len().checked_sub(2).and_then(|i| stack.get(i))?;
    if selector.is_empty() {
        log::warn!("input {vin} of {} spends the swap through its refund path", tx.txid());
        return None;
    }
    Some(selector.clone())
}

/// The unlocking stack of `input` if it spends `redeem_script`.
fn unlocking_stack(redeem_script: &Script, input: &TxIn) -> Option<Vec<Vec<u8>>> {
    let redeem = redeem_script.as_bytes();
    let witness = &input.witness.script_witness;
    if witness.last().is_some_and(|last| last.as_slice() == redeem) {
        return Some(witness.clone());
    }

    let pushes = script_sig_pushes(&input.script_sig);
    if pushes.last().is_some_and(|last| last.as_slice() == redeem) {
        return Some(pushes);
    }

    // Nested spends put the witness program in the scriptSig; the stack itself
    // lives in the witness.
    let program = nested_redeem_script(redeem_script);
    if pushes.len() == 1 && pushes[0].as_slice() == program.as_bytes() {
        return Some(witness.clone());
    }
    None
}

fn script_sig_pushes(script_sig: &Script) -> Vec<Vec<u8>> {
    script_sig
        .instructions()
        .map_while(|instruction| match instruction {
            Ok(Instruction::PushBytes(data)) => Some(data.to_vec()),
            _ => None,
        })
        .collect()
}
