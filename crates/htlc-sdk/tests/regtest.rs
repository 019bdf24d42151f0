//! Claims and refunds broadcast to a regtest elementsd through Electrum.
//!
//! Requires `ELEMENTSD_EXEC` (and the electrs binary lwk_test_util expects)
//! to be set; otherwise every test returns early.

use std::time::Duration;

use htlc_sdk::elements::hashes::{Hash, sha256};
use htlc_sdk::elements::secp256k1_zkp::Keypair;
use htlc_sdk::elements::{Address, AddressParams, Script, Transaction, Txid};
use htlc_sdk::testing::{destination_script, test_keypair};
use htlc_sdk::{
    ChainBackend, ConfidentialContext, ElectrumBackend, Error, Network, OutputType,
    ScriptHistoryEntry, SwapInput, SwapKind, SwapScriptParams, SweepParams,
    construct_claim_transaction, construct_refund_transaction, detect_preimage, detect_swap,
    output_script, target_fee,
};
use lwk_test_util::{TestEnv, TestEnvBuilder};

const AMOUNT: u64 = 100_000;
const FEE_RATE: f64 = 1.0;

// ── Helpers ─────────────────────────────────────────────────────────────

fn regtest_env() -> Option<TestEnv> {
    if std::env::var_os("ELEMENTSD_EXEC").is_none() {
        eprintln!("ELEMENTSD_EXEC not set, skipping regtest test");
        return None;
    }
    Some(TestEnvBuilder::from_env().with_electrum().build())
}

fn wait_for_history(
    backend: &ElectrumBackend,
    script_pubkey: &Script,
    count: usize,
) -> Vec<ScriptHistoryEntry> {
    for _ in 0..120 {
        let history = backend.get_script_history(script_pubkey).expect("history");
        if history.len() >= count {
            return history;
        }
        std::thread::sleep(Duration::from_millis(500));
    }
    panic!("script history never reached {count} entries");
}

/// A swap locked on regtest by elementsd's wallet.
struct LockedSwap {
    claim_keys: Keypair,
    refund_keys: Keypair,
    preimage: Vec<u8>,
    timeout: u32,
    redeem_script: Script,
    script_pubkey: Script,
    blinding: Option<Keypair>,
    funding_tx: Option<Transaction>,
}

impl LockedSwap {
    fn new(seed: u8, kind: SwapKind, output_type: OutputType, timeout: u32, blinded: bool) -> Self {
        let claim_keys = test_keypair(seed * 3);
        let refund_keys = test_keypair(seed * 3 + 1);
        let preimage = vec![seed ^ 0x5a; 32];
        let params = SwapScriptParams::new(
            sha256::Hash::hash(&preimage).as_byte_array(),
            claim_keys.public_key(),
            refund_keys.public_key(),
            timeout,
        )
        .expect("params");
        let redeem_script = params.script(kind).serialize();
        let script_pubkey = output_script(&redeem_script, output_type).expect("encodable");

        Self {
            claim_keys,
            refund_keys,
            preimage,
            timeout,
            redeem_script,
            script_pubkey,
            blinding: blinded.then(|| test_keypair(seed * 3 + 2)),
            funding_tx: None,
        }
    }

    fn address(&self) -> Address {
        let blinder = self.blinding.map(|keys| keys.public_key());
        Address::from_script(&self.script_pubkey, blinder, &AddressParams::ELEMENTS)
            .expect("script has an address")
    }

    /// Pays `AMOUNT` to the swap from elementsd and waits for the indexer.
    fn lock(&mut self, env: &TestEnv, backend: &ElectrumBackend) {
        env.elementsd_sendtoaddress(&self.address(), AMOUNT, None);
        env.elementsd_generate(1);
        let history = wait_for_history(backend, &self.script_pubkey, 1);
        let tx = backend.fetch_transaction(&history[0].txid).expect("lockup");
        self.funding_tx = Some(tx);
    }

    fn input(&self, keys: Keypair) -> SwapInput {
        let funding_tx = self.funding_tx.clone().expect("locked");
        let lockup = detect_swap(&self.redeem_script, &funding_tx).expect("swap output");
        let mut input = SwapInput::new(&lockup, self.redeem_script.clone(), keys);
        if lockup.output_type != OutputType::NativeWitness {
            input = input.with_previous_transaction(funding_tx);
        }
        if let Some(blinding) = self.blinding {
            input = input.with_blinding_key(blinding.secret_key());
        }
        input
    }

    fn claim_input(&self) -> SwapInput {
        self.input(self.claim_keys).with_preimage(self.preimage.clone())
    }

    fn refund_input(&self) -> SwapInput {
        self.input(self.refund_keys).with_timeout(self.timeout)
    }
}

fn sweep_params(fee: u64, blinded: bool) -> SweepParams {
    SweepParams {
        destination: destination_script(),
        fee,
        rbf: true,
        asset_id: Network::LiquidRegtest.policy_asset(),
        blinding_pubkey: blinded.then(|| test_keypair(250).public_key()),
    }
}

fn claim(inputs: &[SwapInput], blinded: bool) -> Transaction {
    let ctx = ConfidentialContext::new();
    target_fee(FEE_RATE, |fee| {
        construct_claim_transaction(&ctx, inputs, &sweep_params(fee, blinded))
    })
    .expect("claim")
}

fn refund(inputs: &[SwapInput], lock_height: u32) -> Transaction {
    let ctx = ConfidentialContext::new();
    target_fee(FEE_RATE, |fee| {
        construct_refund_transaction(&ctx, inputs, &sweep_params(fee, false), lock_height)
    })
    .expect("refund")
}

fn confirm(env: &TestEnv, backend: &ElectrumBackend, swaps: &[LockedSwap], txid: &Txid) {
    env.elementsd_generate(1);
    for swap in swaps {
        let history = wait_for_history(backend, &swap.script_pubkey, 2);
        assert!(history.iter().any(|entry| entry.txid == *txid));
    }
}

// ── Tests ───────────────────────────────────────────────────────────────

#[test]
fn node_accepts_batched_claim_across_encodings() {
    let Some(env) = regtest_env() else { return };
    let backend = ElectrumBackend::new(&env.electrum_url());

    let mut swaps = [
        LockedSwap::new(1, SwapKind::Forward, OutputType::Legacy, 1, false),
        LockedSwap::new(2, SwapKind::Reverse, OutputType::NativeWitness, 1, false),
        LockedSwap::new(3, SwapKind::Reverse, OutputType::NestedWitness, 1, false),
    ];
    for swap in &mut swaps {
        swap.lock(&env, &backend);
    }

    let inputs: Vec<SwapInput> = swaps.iter().map(LockedSwap::claim_input).collect();
    let tx = claim(&inputs, false);
    let txid = backend.broadcast(&tx).expect("node accepts claim");
    confirm(&env, &backend, &swaps, &txid);

    let confirmed = backend.fetch_transaction(&txid).expect("claim on chain");
    for swap in &swaps {
        assert_eq!(
            detect_preimage(&swap.redeem_script, &confirmed),
            Some(swap.preimage.clone())
        );
    }
}

#[test]
fn node_accepts_batched_refund_across_encodings() {
    let Some(env) = regtest_env() else { return };
    let backend = ElectrumBackend::new(&env.electrum_url());

    let mut swaps = [
        LockedSwap::new(4, SwapKind::Reverse, OutputType::Legacy, 1, false),
        LockedSwap::new(5, SwapKind::Forward, OutputType::NativeWitness, 1, false),
        LockedSwap::new(6, SwapKind::Forward, OutputType::NestedWitness, 1, false),
    ];
    for swap in &mut swaps {
        swap.lock(&env, &backend);
    }

    let inputs: Vec<SwapInput> = swaps.iter().map(LockedSwap::refund_input).collect();
    let tx = refund(&inputs, 1);
    let txid = backend
        .broadcast_hex(&htlc_sdk::elements::encode::serialize_hex(&tx))
        .expect("node accepts refund");
    confirm(&env, &backend, &swaps, &txid);

    let confirmed = backend.fetch_transaction(&txid).expect("refund on chain");
    for swap in &swaps {
        assert_eq!(detect_preimage(&swap.redeem_script, &confirmed), None);
    }
}

#[test]
fn node_accepts_blinded_claim() {
    let Some(env) = regtest_env() else { return };
    let backend = ElectrumBackend::new(&env.electrum_url());

    let mut swaps = [
        LockedSwap::new(7, SwapKind::Reverse, OutputType::NativeWitness, 1, true),
        LockedSwap::new(8, SwapKind::Forward, OutputType::NestedWitness, 1, true),
    ];
    for swap in &mut swaps {
        swap.lock(&env, &backend);
    }

    let inputs: Vec<SwapInput> = swaps.iter().map(LockedSwap::claim_input).collect();
    assert!(inputs.iter().all(SwapInput::is_blinded));
    let tx = claim(&inputs, true);
    assert!(tx.output[0].value.is_confidential());

    let txid = backend.broadcast(&tx).expect("node accepts blinded claim");
    confirm(&env, &backend, &swaps, &txid);
}

#[test]
fn node_rejects_refund_before_timeout() {
    let Some(env) = regtest_env() else { return };
    let backend = ElectrumBackend::new(&env.electrum_url());

    let far = 100_000;
    let mut swap = LockedSwap::new(9, SwapKind::Forward, OutputType::NativeWitness, far, false);
    swap.lock(&env, &backend);

    let tx = refund(&[swap.refund_input()], far);
    assert!(matches!(backend.broadcast(&tx), Err(Error::Broadcast(_))));

    // The claim path stays open while the refund is locked.
    let tx = claim(&[swap.claim_input()], false);
    let txid = backend.broadcast(&tx).expect("node accepts claim");
    confirm(&env, &backend, std::slice::from_ref(&swap), &txid);
}
