//! Unblinding of confidential swap outputs and blinding of the sweep output.

use lwk_wollet::elements::confidential::{Asset, AssetBlindingFactor, Value, ValueBlindingFactor};
use lwk_wollet::elements::secp256k1_zkp::{All, PublicKey, Secp256k1, SecretKey};
use lwk_wollet::elements::{
    AssetId, RangeProofMessage, Script, TxOut, TxOutSecrets, TxOutWitness,
};
use rand::{CryptoRng, RngCore};

use crate::error::{Error, Result};

/// Amount of an input, together with its blinding secrets when it was
/// confidential.
#[derive(Debug, Clone)]
pub struct ResolvedAmount {
    pub value: u64,
    pub secrets: Option<TxOutSecrets>,
}

/// Holds the secp context used for range proofs, surjection proofs and
/// signatures.
pub struct ConfidentialContext {
    secp: Secp256k1<All>,
}

impl Default for ConfidentialContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConfidentialContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfidentialContext").finish_non_exhaustive()
    }
}

impl ConfidentialContext {
    pub fn new() -> Self {
        Self {
            secp: Secp256k1::new(),
        }
    }

    pub fn secp(&self) -> &Secp256k1<All> {
        &self.secp
    }

    /// Opens a confidential output with its blinding key.
    pub fn unblind(&self, txout: &TxOut, blinding_key: &SecretKey) -> Result<TxOutSecrets> {
        txout
            .unblind(&self.secp, *blinding_key)
            .map_err(|e| Error::Unblind(e.to_string()))
    }

    /// Amount of `txout`, unblinding it when the value is committed.
    pub fn resolve_amount(
        &self,
        txout: &TxOut,
        blinding_key: Option<&SecretKey>,
    ) -> Result<ResolvedAmount> {
        match (txout.value, blinding_key) {
            (Value::Explicit(value), _) => Ok(ResolvedAmount {
                value,
                secrets: None,
            }),
            (Value::Confidential(_), Some(key)) => {
                let secrets = self.unblind(txout, key)?;
                Ok(ResolvedAmount {
                    value: secrets.value,
                    secrets: Some(secrets),
                })
            }
            (Value::Confidential(_), None) => {
                Err(Error::Unblind("confidential output without blinding key".into()))
            }
            (Value::Null, _) => Err(Error::Unblind("output has no value".into())),
        }
    }

    /// Builds a confidential output of `amount` of `asset_id` to
    /// `script_pubkey`, balanced against the blinded `inputs` and the explicit
    /// `fee` output.
    #[allow(clippy::too_many_arguments)]
    pub fn blind_output<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        asset_id: AssetId,
        amount: u64,
        script_pubkey: &Script,
        blinding_pubkey: PublicKey,
        inputs: &[TxOutSecrets],
        fee: u64,
    ) -> Result<TxOut> {
        let out_abf = AssetBlindingFactor::new(rng);
        let (asset, surjection_proof) = Asset::Explicit(asset_id)
            .blind(rng, &self.secp, out_abf, inputs)
            .map_err(|e| Error::Blinding(format!("{e:?}")))?;

        let input_factors: Vec<(u64, AssetBlindingFactor, ValueBlindingFactor)> = inputs
            .iter()
            .map(|s| (s.value, s.asset_bf, s.value_bf))
            .collect();
        let explicit_outputs = [(
            fee,
            AssetBlindingFactor::zero(),
            ValueBlindingFactor::zero(),
        )];
        let out_vbf = ValueBlindingFactor::last(
            &self.secp,
            amount,
            out_abf,
            &input_factors,
            &explicit_outputs,
        );

        let ephemeral_sk = SecretKey::new(rng);
        let message = RangeProofMessage {
            asset: asset_id,
            bf: out_abf,
        };
        let (value, nonce, rangeproof) = Value::Explicit(amount)
            .blind(
                &self.secp,
                out_vbf,
                blinding_pubkey,
                ephemeral_sk,
                script_pubkey,
                &message,
            )
            .map_err(|e| Error::Blinding(format!("{e:?}")))?;

        Ok(TxOut {
            asset,
            value,
            nonce,
            script_pubkey: script_pubkey.clone(),
            witness: TxOutWitness {
                surjection_proof: Some(Box::new(surjection_proof)),
                rangeproof: Some(Box::new(rangeproof)),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{confidential_txout, regtest_asset, test_keypair};
    use rand::thread_rng;

    #[test]
    fn unblinds_with_matching_key() {
        let ctx = ConfidentialContext::new();
        let blinding = test_keypair(7);
        let spk = Script::from(vec![0x51]);
        let txout = confidential_txout(&ctx, &spk, 42_000, blinding.public_key());

        let resolved = ctx
            .resolve_amount(&txout, Some(&blinding.secret_key()))
            .expect("resolve");
        assert_eq!(resolved.value, 42_000);
        let secrets = resolved.secrets.expect("secrets");
        assert_eq!(secrets.asset, regtest_asset());
    }

    #[test]
    fn wrong_key_fails_to_unblind() {
        let ctx = ConfidentialContext::new();
        let spk = Script::from(vec![0x51]);
        let txout = confidential_txout(&ctx, &spk, 42_000, test_keypair(7).public_key());

        let err = ctx.unblind(&txout, &test_keypair(8).secret_key()).unwrap_err();
        assert!(matches!(err, Error::Unblind(_)));
        assert!(matches!(
            ctx.resolve_amount(&txout, None),
            Err(Error::Unblind(_))
        ));
    }

    #[test]
    fn explicit_amount_needs_no_key() {
        let ctx = ConfidentialContext::new();
        let txout = TxOut::new_fee(1_000, regtest_asset());
        let resolved = ctx
            .resolve_amount(&txout, Some(&test_keypair(1).secret_key()))
            .expect("resolve");
        assert_eq!(resolved.value, 1_000);
        assert!(resolved.secrets.is_none());
    }

    #[test]
    fn blinded_output_opens_to_remaining_amount() {
        let ctx = ConfidentialContext::new();
        let lockup_key = test_keypair(7);
        let dest_key = test_keypair(9);
        let spk = Script::from(vec![0x51]);
        let lockup = confidential_txout(&ctx, &spk, 10_000, lockup_key.public_key());
        let input = ctx.unblind(&lockup, &lockup_key.secret_key()).expect("unblind");

        let out = ctx
            .blind_output(
                &mut thread_rng(),
                regtest_asset(),
                9_700,
                &spk,
                dest_key.public_key(),
                &[input],
                300,
            )
            .expect("blind");
        assert!(out.value.is_confidential());
        let opened = ctx.unblind(&out, &dest_key.secret_key()).expect("unblind");
        assert_eq!(opened.value, 9_700);
        assert_eq!(opened.asset, regtest_asset());
    }
}
