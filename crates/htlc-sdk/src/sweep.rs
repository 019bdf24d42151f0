//! Claim and refund transactions spending one or more swap outputs.
//!
//! Both paths share one pipeline:
//!
//! 1. **Validate**: reject Taproot, mixed blinding, blinded legacy inputs and
//!    missing claim/refund material before anything is built.
//! 2. **Resolve**: sum the input amounts, unblinding confidential ones.
//! 3. **Build**: a PSET with every swap input, the destination output and an
//!    explicit fee output.
//! 4. **Sign**: one `SIGHASH_ALL` signature per input with its own key.
//! 5. **Finalize**: `<sig> <preimage | empty> <redeem>` per input, placed in
//!    the witness or scriptSig according to its encoding.

use lwk_wollet::elements::bitcoin::PublicKey as BitcoinPublicKey;
use lwk_wollet::elements::pset::PartiallySignedTransaction;
use lwk_wollet::elements::secp256k1_zkp::{Keypair, Message, PublicKey, SecretKey};
use lwk_wollet::elements::sighash::SighashCache;
use lwk_wollet::elements::{
    AssetId, EcdsaSighashType, LockTime, OutPoint, Script, Sequence, Transaction, TxOut,
    TxOutSecrets,
};

use crate::confidential::ConfidentialContext;
use crate::detector::SwapOutput;
use crate::error::{Error, Result};
use crate::pset::{add_pset_output, add_swap_input, explicit_txout, fee_txout, new_pset};
use crate::script::{OutputType, ScriptTemplate, nested_unlocking_script};

/// A swap output to spend, with everything needed to sign for it.
#[derive(Debug, Clone)]
pub struct SwapInput {
    pub outpoint: OutPoint,
    pub txout: TxOut,
    pub output_type: OutputType,
    pub redeem_script: Script,
    pub keys: Keypair,
    /// Required for legacy inputs; embedded for nested ones when present.
    pub previous_transaction: Option<Transaction>,
    pub blinding_key: Option<SecretKey>,
    /// Claim path only.
    pub preimage: Option<Vec<u8>>,
    /// Refund path only; checked against the refund lock height.
    pub timeout_block_height: Option<u32>,
}

impl SwapInput {
    pub fn new(detected: &SwapOutput, redeem_script: Script, keys: Keypair) -> Self {
        Self {
            outpoint: detected.outpoint,
            txout: detected.txout.clone(),
            output_type: detected.output_type,
            redeem_script,
            keys,
            previous_transaction: None,
            blinding_key: None,
            preimage: None,
            timeout_block_height: None,
        }
    }

    pub fn with_previous_transaction(mut self, tx: Transaction) -> Self {
        self.previous_transaction = Some(tx);
        self
    }

    pub fn with_blinding_key(mut self, key: SecretKey) -> Self {
        self.blinding_key = Some(key);
        self
    }

    pub fn with_preimage(mut self, preimage: Vec<u8>) -> Self {
        self.preimage = Some(preimage);
        self
    }

    pub fn with_timeout(mut self, timeout_block_height: u32) -> Self {
        self.timeout_block_height = Some(timeout_block_height);
        self
    }

    pub fn is_blinded(&self) -> bool {
        self.txout.value.is_confidential()
    }
}

/// Where the swept funds go and how the sweep is paid for.
#[derive(Debug, Clone)]
pub struct SweepParams {
    pub destination: Script,
    pub fee: u64,
    pub rbf: bool,
    pub asset_id: AssetId,
    /// Blinds the destination output; required exactly when the inputs are
    /// confidential.
    pub blinding_pubkey: Option<PublicKey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpendPath {
    Claim,
    Refund { lock_height: u32 },
}

/// Signed and finalized claim PSET.
pub fn build_claim_pset(
    ctx: &ConfidentialContext,
    inputs: &[SwapInput],
    params: &SweepParams,
) -> Result<PartiallySignedTransaction> {
    build_sweep_pset(ctx, inputs, params, SpendPath::Claim)
}

/// Signed and finalized refund PSET, locked at `lock_height`.
pub fn build_refund_pset(
    ctx: &ConfidentialContext,
    inputs: &[SwapInput],
    params: &SweepParams,
    lock_height: u32,
) -> Result<PartiallySignedTransaction> {
    build_sweep_pset(ctx, inputs, params, SpendPath::Refund { lock_height })
}

pub fn construct_claim_transaction(
    ctx: &ConfidentialContext,
    inputs: &[SwapInput],
    params: &SweepParams,
) -> Result<Transaction> {
    extract(&build_claim_pset(ctx, inputs, params)?)
}

pub fn construct_refund_transaction(
    ctx: &ConfidentialContext,
    inputs: &[SwapInput],
    params: &SweepParams,
    lock_height: u32,
) -> Result<Transaction> {
    extract(&build_refund_pset(ctx, inputs, params, lock_height)?)
}

fn extract(pset: &PartiallySignedTransaction) -> Result<Transaction> {
    pset.extract_tx().map_err(|e| Error::Pset(e.to_string()))
}

fn build_sweep_pset(
    ctx: &ConfidentialContext,
    inputs: &[SwapInput],
    params: &SweepParams,
    path: SpendPath,
) -> Result<PartiallySignedTransaction> {
    validate(inputs, params, path)?;

    // Resolve
    let mut input_secrets: Vec<TxOutSecrets> = Vec::new();
    let mut available: u64 = 0;
    for input in inputs {
        let resolved = ctx.resolve_amount(&input.txout, input.blinding_key.as_ref())?;
        available = available
            .checked_add(resolved.value)
            .ok_or(Error::AmountOverflow)?;
        input_secrets.extend(resolved.secrets);
    }
    let amount = available
        .checked_sub(params.fee)
        .filter(|amount| *amount > 0)
        .ok_or(Error::InsufficientFunds {
            available,
            fee: params.fee,
        })?;

    // Build
    let sequence = if params.rbf {
        Sequence::ENABLE_RBF_NO_LOCKTIME
    } else {
        Sequence::ENABLE_LOCKTIME_NO_RBF
    };
    let mut pset = new_pset();
    pset.global.tx_data.fallback_locktime = Some(match path {
        SpendPath::Claim => LockTime::ZERO,
        SpendPath::Refund { lock_height } => LockTime::from_consensus(lock_height),
    });
    for (index, input) in inputs.iter().enumerate() {
        add_swap_input(&mut pset, index, input, sequence)?;
    }

    let destination = match params.blinding_pubkey {
        Some(blinding_pubkey) => ctx.blind_output(
            &mut rand::thread_rng(),
            params.asset_id,
            amount,
            &params.destination,
            blinding_pubkey,
            &input_secrets,
            params.fee,
        )?,
        None => explicit_txout(params.asset_id, amount, &params.destination),
    };
    add_pset_output(&mut pset, destination);
    add_pset_output(&mut pset, fee_txout(params.asset_id, params.fee));

    // Sign
    let signatures = sign_inputs(ctx, &pset, inputs)?;
    for (input, (signature, swap_input)) in pset
        .inputs_mut()
        .iter_mut()
        .zip(signatures.iter().zip(inputs))
    {
        input.partial_sigs.insert(
            BitcoinPublicKey::new(swap_input.keys.public_key()),
            signature.clone(),
        );
    }

    // Finalize
    for (index, (signature, swap_input)) in signatures.into_iter().zip(inputs).enumerate() {
        let selector = match path {
            SpendPath::Claim => swap_input
                .preimage
                .clone()
                .ok_or(Error::MissingPreimage(index))?,
            SpendPath::Refund { .. } => Vec::new(),
        };
        let stack = vec![signature, selector, swap_input.redeem_script.to_bytes()];
        let input = &mut pset.inputs_mut()[index];
        match swap_input.output_type {
            OutputType::Legacy => {
                input.final_script_sig = Some(legacy_unlocking_script(&stack));
            }
            OutputType::NestedWitness => {
                input.final_script_sig = Some(nested_unlocking_script(&swap_input.redeem_script));
                input.final_script_witness = Some(stack);
            }
            OutputType::NativeWitness => {
                input.final_script_witness = Some(stack);
            }
            OutputType::Taproot => return Err(Error::UnsupportedEncoding(index)),
        }
    }

    log::debug!(
        "built {:?} spending {} swap input(s): {} to destination, fee {}",
        path,
        inputs.len(),
        amount,
        params.fee
    );
    Ok(pset)
}

/// Checks that need no key material. Runs before any input is resolved.
fn validate(inputs: &[SwapInput], params: &SweepParams, path: SpendPath) -> Result<()> {
    if inputs.is_empty() {
        return Err(Error::EmptyInputs);
    }
    if let Some(index) = inputs
        .iter()
        .position(|input| input.output_type == OutputType::Taproot)
    {
        return Err(Error::UnsupportedEncoding(index));
    }

    let blinded = inputs.iter().filter(|input| input.is_blinded()).count();
    let uniformly_blinded = blinded == inputs.len();
    if (blinded != 0 && !uniformly_blinded)
        || uniformly_blinded != params.blinding_pubkey.is_some()
    {
        return Err(Error::InconsistentBlinding);
    }
    if let Some(index) = inputs
        .iter()
        .position(|input| input.is_blinded() && !input.output_type.is_witness())
    {
        return Err(Error::EncodingMismatch(index));
    }

    for (index, input) in inputs.iter().enumerate() {
        match path {
            SpendPath::Claim => {
                if input.preimage.is_none() {
                    return Err(Error::MissingPreimage(index));
                }
            }
            SpendPath::Refund { lock_height } => match input.timeout_block_height {
                Some(required) if required > lock_height => {
                    return Err(Error::LockTimeNotReached {
                        index,
                        required,
                        lock_height,
                    });
                }
                _ => {}
            },
        }
        if input.output_type == OutputType::Legacy && input.previous_transaction.is_none() {
            return Err(Error::MissingPreviousTransaction(index));
        }
    }
    Ok(())
}

/// DER signatures with the sighash byte appended, one per input.
fn sign_inputs(
    ctx: &ConfidentialContext,
    pset: &PartiallySignedTransaction,
    inputs: &[SwapInput],
) -> Result<Vec<Vec<u8>>> {
    let unsigned = pset.extract_tx().map_err(|e| Error::Pset(e.to_string()))?;
    let mut cache = SighashCache::new(&unsigned);

    inputs
        .iter()
        .enumerate()
        .map(|(index, input)| {
            let sighash = match input.output_type {
                OutputType::Legacy => {
                    cache.legacy_sighash(index, &input.redeem_script, EcdsaSighashType::All)
                }
                OutputType::NativeWitness | OutputType::NestedWitness => cache.segwitv0_sighash(
                    index,
                    &input.redeem_script,
                    input.txout.value,
                    EcdsaSighashType::All,
                ),
                OutputType::Taproot => return Err(Error::UnsupportedEncoding(index)),
            };
            let message = Message::from_digest_slice(&sighash[..])
                .map_err(|e| Error::Signing(e.to_string()))?;
            let signature = ctx.secp().sign_ecdsa(&message, &input.keys.secret_key());

            let mut raw = signature.serialize_der().to_vec();
            raw.push(EcdsaSighashType::All as u8);
            Ok(raw)
        })
        .collect()
}

/// `<sig> <selector> <redeem>` as pushes; an empty selector becomes `OP_0`.
fn legacy_unlocking_script(stack: &[Vec<u8>]) -> Script {
    stack
        .iter()
        .fold(ScriptTemplate::new(), |template, item| template.push(item))
        .serialize()
}
