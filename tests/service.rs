use std::cell::RefCell;
use std::collections::HashMap;

use htlc_sdk::elements::{Script, Transaction, Txid};
use htlc_sdk::testing::{
    FIXTURE_TIMEOUT, SwapFixture, destination_script, verify_input, verify_transaction,
};
use htlc_sdk::{ChainBackend, OutputType, ScriptHistoryEntry, SwapKind};
use htlc_swap::{Network, ServiceError, SwapConfig, SwapService};

/// In-memory chain: broadcasts are recorded and become fetchable.
#[derive(Default)]
struct MockChain {
    transactions: RefCell<HashMap<Txid, Transaction>>,
    broadcasts: RefCell<Vec<Txid>>,
}

impl MockChain {
    fn with(txs: &[&Transaction]) -> Self {
        let chain = Self::default();
        for tx in txs {
            chain.transactions.borrow_mut().insert(tx.txid(), (*tx).clone());
        }
        chain
    }
}

impl ChainBackend for MockChain {
    fn fetch_transaction(&self, txid: &Txid) -> htlc_sdk::Result<Transaction> {
        self.transactions
            .borrow()
            .get(txid)
            .cloned()
            .ok_or_else(|| htlc_sdk::Error::Query(format!("transaction {txid} not found")))
    }

    fn broadcast(&self, tx: &Transaction) -> htlc_sdk::Result<Txid> {
        let txid = tx.txid();
        self.transactions.borrow_mut().insert(txid, tx.clone());
        self.broadcasts.borrow_mut().push(txid);
        Ok(txid)
    }

    fn get_script_history(
        &self,
        script_pubkey: &Script,
    ) -> htlc_sdk::Result<Vec<ScriptHistoryEntry>> {
        let transactions = self.transactions.borrow();
        let mut history: Vec<ScriptHistoryEntry> = transactions
            .values()
            .filter(|tx| {
                tx.output.iter().any(|out| &out.script_pubkey == script_pubkey)
                    || tx.input.iter().any(|input| {
                        transactions.get(&input.previous_output.txid).is_some_and(|prev| {
                            prev.output
                                .get(input.previous_output.vout as usize)
                                .is_some_and(|out| &out.script_pubkey == script_pubkey)
                        })
                    })
            })
            .map(|tx| ScriptHistoryEntry {
                txid: tx.txid(),
                height: 0,
            })
            .collect();
        history.sort_by_key(|entry| entry.txid);
        Ok(history)
    }
}

fn regtest_config() -> SwapConfig {
    SwapConfig::new(Network::LiquidRegtest)
}

#[test]
fn finds_lockup_then_claims_and_reveals_preimage() {
    let swap = SwapFixture::new(1, SwapKind::Reverse, OutputType::NativeWitness, 80_000, false);
    let service = SwapService::new(MockChain::with(&[&swap.funding_tx]), regtest_config());

    let lockup = service
        .find_lockup(&swap.funding_tx.txid(), &swap.redeem_script)
        .expect("lockup");
    assert_eq!(lockup, swap.swap_output);

    let sent = service
        .claim(&[swap.claim_input()], &destination_script(), None)
        .expect("claim");
    assert_eq!(service.backend().broadcasts.borrow().as_slice(), &[sent.txid]);

    let tx = service.backend().fetch_transaction(&sent.txid).expect("stored");
    verify_input(&tx, 0, &swap.swap_output.txout, OutputType::NativeWitness).expect("valid");
    let fee = tx.output[1].value.explicit().expect("explicit fee");
    let paid = tx.output[0].value.explicit().expect("explicit destination");
    assert_eq!(fee + paid, 80_000);
    assert!(fee > 1);

    assert_eq!(
        service.find_preimage(&sent.txid, &swap.redeem_script).expect("preimage"),
        swap.preimage
    );
    assert_eq!(
        service
            .watch_preimage(&swap.redeem_script, OutputType::NativeWitness)
            .expect("preimage from history"),
        swap.preimage
    );
}

#[test]
fn refund_reveals_no_preimage() {
    let swaps = [
        SwapFixture::new(2, SwapKind::Forward, OutputType::Legacy, 40_000, false),
        SwapFixture::new(3, SwapKind::Forward, OutputType::NestedWitness, 60_000, false),
    ];
    let chain = MockChain::with(&[&swaps[0].funding_tx, &swaps[1].funding_tx]);
    let mut config = regtest_config();
    config.rbf = false;
    config.discount_ct = true;
    let service = SwapService::new(chain, config);

    let inputs: Vec<_> = swaps.iter().map(SwapFixture::refund_input).collect();
    let sent = service
        .refund(&inputs, &destination_script(), FIXTURE_TIMEOUT + 10, None)
        .expect("refund");

    let tx = service.backend().fetch_transaction(&sent.txid).expect("stored");
    let prevouts: Vec<_> = swaps.iter().map(SwapFixture::prevout).collect();
    verify_transaction(&tx, &prevouts).expect("valid");
    assert_eq!(tx.output.len(), 2);

    assert!(matches!(
        service.find_preimage(&sent.txid, &swaps[0].redeem_script),
        Err(ServiceError::NoPreimage)
    ));
}

#[test]
fn lookup_failures_are_service_errors() {
    let swap = SwapFixture::new(4, SwapKind::Reverse, OutputType::NativeWitness, 10_000, false);
    let other = SwapFixture::new(5, SwapKind::Reverse, OutputType::NativeWitness, 10_000, false);
    let service = SwapService::new(MockChain::with(&[&swap.funding_tx]), regtest_config());

    assert!(matches!(
        service.find_lockup(&swap.funding_tx.txid(), &other.redeem_script),
        Err(ServiceError::NoSwapOutput(_))
    ));
    assert!(matches!(
        service.find_lockup(&other.funding_tx.txid(), &other.redeem_script),
        Err(ServiceError::Sdk(htlc_sdk::Error::Query(_)))
    ));
    assert!(matches!(
        service.watch_preimage(&swap.redeem_script, OutputType::NativeWitness),
        Err(ServiceError::NoPreimage)
    ));

    let mut taproot = swap.claim_input();
    taproot.output_type = OutputType::Taproot;
    assert!(matches!(
        service.claim(&[taproot], &destination_script(), None),
        Err(ServiceError::Sdk(htlc_sdk::Error::UnsupportedEncoding(0)))
    ));
    assert!(service.backend().broadcasts.borrow().is_empty());
}
