//! Two-pass fee targeting.
//!
//! The transaction is built once with a placeholder fee to measure it, then
//! rebuilt with `ceil(size * rate)`. ECDSA signatures vary by a byte, so the
//! second build can differ slightly in size from the measured one; callers
//! that need an exact rate should leave headroom.

use lwk_wollet::elements::Transaction;

const PLACEHOLDER_FEE: u64 = 1;

/// Fee in satoshis for `vsize` virtual bytes at `sat_per_vbyte`.
pub fn fee_for_vsize(vsize: usize, sat_per_vbyte: f64) -> u64 {
    (vsize as f64 * sat_per_vbyte).ceil() as u64
}

/// Builds with a placeholder fee, measures the virtual size, and rebuilds with
/// the fee that hits `sat_per_vbyte`.
pub fn target_fee<F, E>(sat_per_vbyte: f64, build: F) -> Result<Transaction, E>
where
    F: FnMut(u64) -> Result<Transaction, E>,
{
    target_with(sat_per_vbyte, Transaction::vsize, build)
}

/// Same as [`target_fee`], but measured with the discounted virtual size that
/// weighs confidential-transaction witness data at a reduced rate.
pub fn target_fee_discounted<F, E>(sat_per_vbyte: f64, build: F) -> Result<Transaction, E>
where
    F: FnMut(u64) -> Result<Transaction, E>,
{
    target_with(sat_per_vbyte, Transaction::discount_vsize, build)
}

fn target_with<F, E>(
    sat_per_vbyte: f64,
    measure: fn(&Transaction) -> usize,
    mut build: F,
) -> Result<Transaction, E>
where
    F: FnMut(u64) -> Result<Transaction, E>,
{
    let draft = build(PLACEHOLDER_FEE)?;
    let vsize = measure(&draft);
    let fee = fee_for_vsize(vsize, sat_per_vbyte);
    log::debug!("draft vsize {vsize} at {sat_per_vbyte} sat/vB -> fee {fee}");
    build(fee)
}
