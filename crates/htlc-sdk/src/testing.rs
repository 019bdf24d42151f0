//! Test utilities: deterministic fixtures and an HTLC script evaluator.
//!
//! The evaluator runs a finalized input's unlocking data against its redeem
//! script with the opcode subset the swap scripts use, checking signatures
//! over the real sighash. That lets tests tell a failed hash check from a
//! failed locktime check without a node.

use lwk_wollet::elements::confidential::{AssetBlindingFactor, ValueBlindingFactor};
use lwk_wollet::elements::hashes::{Hash, hash160, sha256};
use lwk_wollet::elements::opcodes::all::{
    OP_CHECKSIG, OP_CLTV, OP_DROP, OP_ELSE, OP_ENDIF, OP_EQUAL, OP_EQUALVERIFY, OP_HASH160,
    OP_IF, OP_SIZE,
};
use lwk_wollet::elements::secp256k1_zkp::{
    Keypair, Message, PublicKey, Secp256k1, SecretKey, VerifyOnly, ecdsa,
};
use lwk_wollet::elements::script::{Builder, Instruction, read_scriptbool, read_scriptint};
use lwk_wollet::elements::sighash::SighashCache;
use lwk_wollet::elements::{
    AssetId, EcdsaSighashType, LockTime, OutPoint, Script, Sequence, Transaction, TxIn, TxOut,
    TxOutSecrets, Txid,
};

use crate::confidential::ConfidentialContext;
use crate::detector::{SwapOutput, detect_swap};
use crate::network::Network;
use crate::script::{
    OutputType, ScriptElement, ScriptTemplate, nested_unlocking_script, output_script,
};
use crate::sweep::{SwapInput, SweepParams};
use crate::swap_script::{SwapKind, SwapScriptParams};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Deterministic key pair; `seed` must be non-zero.
pub fn test_keypair(seed: u8) -> Keypair {
    let secp = Secp256k1::new();
    let sk = SecretKey::from_slice(&[seed; 32]).expect("valid secret key");
    Keypair::from_secret_key(&secp, &sk)
}

pub fn regtest_asset() -> AssetId {
    Network::LiquidRegtest.policy_asset()
}

/// Build a simple TxIn with no issuance.
pub fn simple_txin(outpoint: OutPoint) -> TxIn {
    TxIn {
        previous_output: outpoint,
        is_pegin: false,
        script_sig: Script::new(),
        sequence: Sequence::ENABLE_LOCKTIME_NO_RBF,
        asset_issuance: Default::default(),
        witness: Default::default(),
    }
}

/// A transaction paying `outputs` from a dummy input.
pub fn funding_transaction(outputs: Vec<TxOut>) -> Transaction {
    funding_transaction_from(OutPoint::new(Txid::all_zeros(), 0), outputs)
}

fn funding_transaction_from(outpoint: OutPoint, outputs: Vec<TxOut>) -> Transaction {
    Transaction {
        version: 2,
        lock_time: LockTime::ZERO,
        input: vec![simple_txin(outpoint)],
        output: outputs,
    }
}

/// Confidential output of `amount` regtest policy asset, blinded to
/// `blinding_pubkey` as if spent from a single explicit input.
pub fn confidential_txout(
    ctx: &ConfidentialContext,
    script_pubkey: &Script,
    amount: u64,
    blinding_pubkey: PublicKey,
) -> TxOut {
    let spent = TxOutSecrets {
        asset: regtest_asset(),
        asset_bf: AssetBlindingFactor::zero(),
        value: amount,
        value_bf: ValueBlindingFactor::zero(),
    };
    ctx.blind_output(
        &mut rand::thread_rng(),
        regtest_asset(),
        amount,
        script_pubkey,
        blinding_pubkey,
        &[spent],
        0,
    )
    .expect("blind funding output")
}

/// Explicit sweep parameters paying to a fixed P2WPKH-shaped script.
pub fn sweep_params(fee: u64) -> SweepParams {
    SweepParams {
        destination: destination_script(),
        fee,
        rbf: true,
        asset_id: regtest_asset(),
        blinding_pubkey: None,
    }
}

pub fn destination_script() -> Script {
    ScriptTemplate::new().number(0).push(&[0x77; 20]).serialize()
}

pub const FIXTURE_TIMEOUT: u32 = 500;

/// A funded swap: keys, script, and the lockup transaction paying to it.
#[derive(Debug, Clone)]
pub struct SwapFixture {
    pub kind: SwapKind,
    pub params: SwapScriptParams,
    pub claim_keys: Keypair,
    pub refund_keys: Keypair,
    pub preimage: Vec<u8>,
    pub redeem_script: Script,
    pub funding_tx: Transaction,
    pub swap_output: SwapOutput,
    pub blinding_key: Option<SecretKey>,
}

impl SwapFixture {
    /// Swap number `seed` (1..=80), locked at output index 1 of its funding
    /// transaction.
    pub fn new(
        seed: u8,
        kind: SwapKind,
        output_type: OutputType,
        amount: u64,
        blinded: bool,
    ) -> Self {
        Self::with_preimage(seed, kind, output_type, amount, blinded, vec![seed ^ 0xa5; 32])
    }

    pub fn with_preimage(
        seed: u8,
        kind: SwapKind,
        output_type: OutputType,
        amount: u64,
        blinded: bool,
        preimage: Vec<u8>,
    ) -> Self {
        let claim_keys = test_keypair(seed * 3);
        let refund_keys = test_keypair(seed * 3 + 1);
        let blinding = test_keypair(seed * 3 + 2);

        let payment_hash = sha256::Hash::hash(&preimage);
        let params = SwapScriptParams::new(
            payment_hash.as_byte_array(),
            claim_keys.public_key(),
            refund_keys.public_key(),
            FIXTURE_TIMEOUT,
        )
        .expect("valid params");
        let redeem_script = params.script(kind).serialize();
        let script_pubkey = output_script(&redeem_script, output_type).expect("encodable");

        let lockup = if blinded {
            confidential_txout(
                &ConfidentialContext::new(),
                &script_pubkey,
                amount,
                blinding.public_key(),
            )
        } else {
            let mut out = TxOut::new_fee(amount, regtest_asset());
            out.script_pubkey = script_pubkey;
            out
        };
        let change = TxOut::new_fee(1_000, regtest_asset());
        let funding_tx = funding_transaction_from(
            OutPoint::new(Txid::all_zeros(), u32::from(seed)),
            vec![change, lockup],
        );
        let swap_output = detect_swap(&redeem_script, &funding_tx).expect("lockup output");

        Self {
            kind,
            params,
            claim_keys,
            refund_keys,
            preimage,
            redeem_script,
            funding_tx,
            swap_output,
            blinding_key: blinded.then(|| blinding.secret_key()),
        }
    }

    fn input(&self, keys: Keypair) -> SwapInput {
        let mut input = SwapInput::new(&self.swap_output, self.redeem_script.clone(), keys);
        if self.swap_output.output_type != OutputType::NativeWitness {
            input = input.with_previous_transaction(self.funding_tx.clone());
        }
        if let Some(key) = self.blinding_key {
            input = input.with_blinding_key(key);
        }
        input
    }

    pub fn claim_input(&self) -> SwapInput {
        self.input(self.claim_keys).with_preimage(self.preimage.clone())
    }

    pub fn refund_input(&self) -> SwapInput {
        self.input(self.refund_keys).with_timeout(self.params.timeout_block_height)
    }

    pub fn prevout(&self) -> (TxOut, OutputType) {
        (self.swap_output.txout.clone(), self.swap_output.output_type)
    }
}

// ---------------------------------------------------------------------------
// Script evaluation
// ---------------------------------------------------------------------------

/// Why an input failed to satisfy its previous output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptFailure {
    /// The unlocking data does not commit to the previous output's script.
    UnlockingMismatch,
    StackUnderflow,
    /// `OP_EQUALVERIFY` saw different values.
    EqualVerify,
    /// `OP_CHECKLOCKTIMEVERIFY` was not satisfied.
    LockTime,
    /// Malformed signature, sighash type or public key.
    Signature,
    /// The script finished with a false value on top.
    EvalFalse,
    UnbalancedConditional,
    UnsupportedOpcode(u8),
    UnsupportedEncoding,
}

/// Runs input `index` of `tx` against `prevout`, locked under `output_type`.
pub fn verify_input(
    tx: &Transaction,
    index: usize,
    prevout: &TxOut,
    output_type: OutputType,
) -> Result<(), ScriptFailure> {
    let input = tx.input.get(index).ok_or(ScriptFailure::UnlockingMismatch)?;
    let witness = &input.witness.script_witness;

    let (redeem_script, stack) = match output_type {
        OutputType::NativeWitness | OutputType::NestedWitness => {
            let (redeem, stack) = witness.split_last().ok_or(ScriptFailure::StackUnderflow)?;
            let redeem = Script::from(redeem.clone());
            let expected_sig = match output_type {
                OutputType::NestedWitness => nested_unlocking_script(&redeem),
                _ => Script::new(),
            };
            if input.script_sig != expected_sig {
                return Err(ScriptFailure::UnlockingMismatch);
            }
            (redeem, stack.to_vec())
        }
        OutputType::Legacy => {
            if !witness.is_empty() {
                return Err(ScriptFailure::UnlockingMismatch);
            }
            let pushes = ScriptTemplate::parse(&input.script_sig)
                .ok_or(ScriptFailure::UnlockingMismatch)?
                .elements()
                .iter()
                .map(|element| match element {
                    ScriptElement::Push(data) => Ok(data.clone()),
                    _ => Err(ScriptFailure::UnlockingMismatch),
                })
                .collect::<Result<Vec<_>, _>>()?;
            let (redeem, stack) = pushes.split_last().ok_or(ScriptFailure::StackUnderflow)?;
            (Script::from(redeem.clone()), stack.to_vec())
        }
        OutputType::Taproot => return Err(ScriptFailure::UnsupportedEncoding),
    };

    let committed = output_script(&redeem_script, output_type)
        .map_err(|_| ScriptFailure::UnsupportedEncoding)?;
    if committed != prevout.script_pubkey {
        return Err(ScriptFailure::UnlockingMismatch);
    }

    let checker = Checker {
        secp: Secp256k1::verification_only(),
        tx,
        index,
        redeem_script: &redeem_script,
        prevout,
        legacy: output_type == OutputType::Legacy,
    };
    execute(&redeem_script, stack, &checker)
}

/// Verifies every input of `tx` against the matching entry of `prevouts`.
pub fn verify_transaction(
    tx: &Transaction,
    prevouts: &[(TxOut, OutputType)],
) -> Result<(), (usize, ScriptFailure)> {
    for (index, (prevout, output_type)) in prevouts.iter().enumerate() {
        verify_input(tx, index, prevout, *output_type).map_err(|failure| (index, failure))?;
    }
    Ok(())
}

struct Checker<'a> {
    secp: Secp256k1<VerifyOnly>,
    tx: &'a Transaction,
    index: usize,
    redeem_script: &'a Script,
    prevout: &'a TxOut,
    legacy: bool,
}

impl Checker<'_> {
    fn check_lock_time(&self, top: &[u8]) -> Result<(), ScriptFailure> {
        const THRESHOLD: i64 = 500_000_000;

        let required = read_scriptint(top)
            .ok()
            .filter(|n| *n >= 0)
            .ok_or(ScriptFailure::LockTime)?;
        let lock = i64::from(self.tx.lock_time.to_consensus_u32());
        let same_kind = (required < THRESHOLD) == (lock < THRESHOLD);
        let final_sequence = self.tx.input[self.index].sequence == Sequence::MAX;
        if !same_kind || final_sequence || required > lock {
            return Err(ScriptFailure::LockTime);
        }
        Ok(())
    }

    fn check_sig(&self, sig: &[u8], pubkey: &[u8]) -> Result<bool, ScriptFailure> {
        let Some((&hash_type, der)) = sig.split_last() else {
            return Ok(false);
        };
        if hash_type != EcdsaSighashType::All as u8 {
            return Err(ScriptFailure::Signature);
        }
        let signature = ecdsa::Signature::from_der(der).map_err(|_| ScriptFailure::Signature)?;
        let pubkey = PublicKey::from_slice(pubkey).map_err(|_| ScriptFailure::Signature)?;

        let mut cache = SighashCache::new(self.tx);
        let sighash = if self.legacy {
            cache.legacy_sighash(self.index, self.redeem_script, EcdsaSighashType::All)
        } else {
            cache.segwitv0_sighash(
                self.index,
                self.redeem_script,
                self.prevout.value,
                EcdsaSighashType::All,
            )
        };
        let message =
            Message::from_digest_slice(&sighash[..]).map_err(|_| ScriptFailure::Signature)?;
        Ok(self.secp.verify_ecdsa(&message, &signature, &pubkey).is_ok())
    }
}

fn pop(stack: &mut Vec<Vec<u8>>) -> Result<Vec<u8>, ScriptFailure> {
    stack.pop().ok_or(ScriptFailure::StackUnderflow)
}

/// Stack encoding of a script number.
fn scriptint(n: i64) -> Vec<u8> {
    let script = Builder::new().push_scriptint(n).into_script();
    match script.instructions().next() {
        Some(Ok(Instruction::PushBytes(data))) => data.to_vec(),
        _ => Vec::new(),
    }
}

fn bool_bytes(value: bool) -> Vec<u8> {
    if value { vec![1] } else { vec![] }
}

fn execute(
    redeem_script: &Script,
    mut stack: Vec<Vec<u8>>,
    checker: &Checker<'_>,
) -> Result<(), ScriptFailure> {
    let template = ScriptTemplate::parse(redeem_script).ok_or(ScriptFailure::UnlockingMismatch)?;
    let mut branches: Vec<bool> = Vec::new();

    for element in template.elements() {
        let executing = branches.iter().all(|taken| *taken);
        let op = match element {
            ScriptElement::Push(data) => {
                if executing {
                    stack.push(data.clone());
                }
                continue;
            }
            ScriptElement::Number(n) => {
                if executing {
                    stack.push(scriptint(*n));
                }
                continue;
            }
            ScriptElement::Op(op) => *op,
        };

        if op == OP_IF {
            let taken = executing && read_scriptbool(&pop(&mut stack)?);
            branches.push(taken);
        } else if op == OP_ELSE {
            let top = branches
                .last_mut()
                .ok_or(ScriptFailure::UnbalancedConditional)?;
            *top = !*top;
        } else if op == OP_ENDIF {
            branches.pop().ok_or(ScriptFailure::UnbalancedConditional)?;
        } else if !executing {
            continue;
        } else if let Some(n) = element.as_number() {
            stack.push(scriptint(n));
        } else if op == OP_SIZE {
            let len = stack.last().ok_or(ScriptFailure::StackUnderflow)?.len();
            stack.push(scriptint(len as i64));
        } else if op == OP_EQUAL || op == OP_EQUALVERIFY {
            let a = pop(&mut stack)?;
            let b = pop(&mut stack)?;
            if op == OP_EQUALVERIFY {
                if a != b {
                    return Err(ScriptFailure::EqualVerify);
                }
            } else {
                stack.push(bool_bytes(a == b));
            }
        } else if op == OP_HASH160 {
            let top = pop(&mut stack)?;
            stack.push(hash160::Hash::hash(&top).to_byte_array().to_vec());
        } else if op == OP_DROP {
            pop(&mut stack)?;
        } else if op == OP_CLTV {
            let top = stack.last().ok_or(ScriptFailure::StackUnderflow)?;
            checker.check_lock_time(top)?;
        } else if op == OP_CHECKSIG {
            let pubkey = pop(&mut stack)?;
            let sig = pop(&mut stack)?;
            stack.push(bool_bytes(checker.check_sig(&sig, &pubkey)?));
        } else {
            return Err(ScriptFailure::UnsupportedOpcode(op.into_u8()));
        }
    }

    if !branches.is_empty() {
        return Err(ScriptFailure::UnbalancedConditional);
    }
    match stack.last() {
        Some(top) if read_scriptbool(top) => Ok(()),
        _ => Err(ScriptFailure::EvalFalse),
    }
}
