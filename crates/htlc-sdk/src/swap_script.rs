//! HTLC redeem scripts for forward (submarine) and reverse swaps.
//!
//! Forward:
//! ```text
//! OP_HASH160 <h> OP_EQUAL
//! OP_IF <claim_key>
//! OP_ELSE <timeout> OP_CHECKLOCKTIMEVERIFY OP_DROP <refund_key>
//! OP_ENDIF OP_CHECKSIG
//! ```
//!
//! Reverse:
//! ```text
//! OP_SIZE 32 OP_EQUAL
//! OP_IF OP_HASH160 <h> OP_EQUALVERIFY <claim_key>
//! OP_ELSE OP_DROP <timeout> OP_CHECKLOCKTIMEVERIFY OP_DROP <refund_key>
//! OP_ENDIF OP_CHECKSIG
//! ```
//!
//! `h` is the HASH160 of the preimage. A 32-byte SHA256 preimage hash is
//! reduced with RIPEMD160 first.

use lwk_wollet::elements::hashes::{Hash, ripemd160};
use lwk_wollet::elements::opcodes::all::{
    OP_CHECKSIG, OP_CLTV, OP_DROP, OP_ELSE, OP_ENDIF, OP_EQUAL, OP_EQUALVERIFY, OP_HASH160,
    OP_IF, OP_SIZE,
};
use lwk_wollet::elements::secp256k1_zkp::PublicKey;
use lwk_wollet::elements::Script;

use crate::error::{Error, Result};
use crate::script::{ScriptElement, ScriptTemplate};

/// Length the reverse script requires of a claiming preimage.
pub const PREIMAGE_LEN: i64 = 32;

/// Which side of the swap locks funds under the script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwapKind {
    /// User locks on-chain funds; the service claims them with the preimage.
    Forward,
    /// Service locks on-chain funds; the user claims them with the preimage.
    Reverse,
}

/// Parameters shared by both swap scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapScriptParams {
    /// HASH160 of the preimage.
    pub hashlock: [u8; 20],
    pub claim_public_key: PublicKey,
    pub refund_public_key: PublicKey,
    pub timeout_block_height: u32,
}

impl SwapScriptParams {
    /// Accepts either the 32-byte SHA256 or the 20-byte HASH160 of the preimage.
    pub fn new(
        preimage_hash: &[u8],
        claim_public_key: PublicKey,
        refund_public_key: PublicKey,
        timeout_block_height: u32,
    ) -> Result<Self> {
        Ok(Self {
            hashlock: normalize_preimage_hash(preimage_hash)?,
            claim_public_key,
            refund_public_key,
            timeout_block_height,
        })
    }

    pub fn script(&self, kind: SwapKind) -> ScriptTemplate {
        match kind {
            SwapKind::Forward => swap_script(self),
            SwapKind::Reverse => reverse_swap_script(self),
        }
    }

    /// Recovers the parameters from a serialized swap script, if it matches
    /// either template exactly.
    pub fn from_script(script: &Script) -> Option<(SwapKind, Self)> {
        let template = ScriptTemplate::parse(script)?;
        match template.elements() {
            [
                ScriptElement::Op(hash160),
                ScriptElement::Push(hashlock),
                ScriptElement::Op(equal),
                ScriptElement::Op(op_if),
                ScriptElement::Push(claim),
                ScriptElement::Op(op_else),
                timeout,
                ScriptElement::Op(cltv),
                ScriptElement::Op(drop),
                ScriptElement::Push(refund),
                ScriptElement::Op(endif),
                ScriptElement::Op(checksig),
            ] if [*hash160, *equal, *op_if, *op_else, *cltv, *drop, *endif, *checksig]
                == [
                    OP_HASH160, OP_EQUAL, OP_IF, OP_ELSE, OP_CLTV, OP_DROP, OP_ENDIF,
                    OP_CHECKSIG,
                ] =>
            {
                let params = Self::from_parts(hashlock, claim, timeout, refund)?;
                Some((SwapKind::Forward, params))
            }
            [
                ScriptElement::Op(size),
                size_len,
                ScriptElement::Op(equal),
                ScriptElement::Op(op_if),
                ScriptElement::Op(hash160),
                ScriptElement::Push(hashlock),
                ScriptElement::Op(equalverify),
                ScriptElement::Push(claim),
                ScriptElement::Op(op_else),
                ScriptElement::Op(drop_preimage),
                timeout,
                ScriptElement::Op(cltv),
                ScriptElement::Op(drop),
                ScriptElement::Push(refund),
                ScriptElement::Op(endif),
                ScriptElement::Op(checksig),
            ] if [
                *size,
                *equal,
                *op_if,
                *hash160,
                *equalverify,
                *op_else,
                *drop_preimage,
                *cltv,
                *drop,
                *endif,
                *checksig,
            ] == [
                OP_SIZE,
                OP_EQUAL,
                OP_IF,
                OP_HASH160,
                OP_EQUALVERIFY,
                OP_ELSE,
                OP_DROP,
                OP_CLTV,
                OP_DROP,
                OP_ENDIF,
                OP_CHECKSIG,
            ] && size_len.as_number() == Some(PREIMAGE_LEN) =>
            {
                let params = Self::from_parts(hashlock, claim, timeout, refund)?;
                Some((SwapKind::Reverse, params))
            }
            _ => None,
        }
    }

    fn from_parts(
        hashlock: &[u8],
        claim: &[u8],
        timeout: &ScriptElement,
        refund: &[u8],
    ) -> Option<Self> {
        Some(Self {
            hashlock: hashlock.try_into().ok()?,
            claim_public_key: PublicKey::from_slice(claim).ok()?,
            refund_public_key: PublicKey::from_slice(refund).ok()?,
            timeout_block_height: u32::try_from(timeout.as_number()?).ok()?,
        })
    }
}

/// Reduces a preimage hash to the 20-byte HASH160 the scripts commit to.
pub fn normalize_preimage_hash(preimage_hash: &[u8]) -> Result<[u8; 20]> {
    match preimage_hash.len() {
        32 => Ok(ripemd160::Hash::hash(preimage_hash).to_byte_array()),
        20 => {
            let mut out = [0u8; 20];
            out.copy_from_slice(preimage_hash);
            Ok(out)
        }
        n => Err(Error::InvalidPreimageHash(n)),
    }
}

/// Forward swap script: claim with the preimage, refund after the timeout.
pub fn swap_script(params: &SwapScriptParams) -> ScriptTemplate {
    ScriptTemplate::new()
        .op(OP_HASH160)
        .push(&params.hashlock)
        .op(OP_EQUAL)
        .op(OP_IF)
        .push(&params.claim_public_key.serialize())
        .op(OP_ELSE)
        .number(i64::from(params.timeout_block_height))
        .op(OP_CLTV)
        .op(OP_DROP)
        .push(&params.refund_public_key.serialize())
        .op(OP_ENDIF)
        .op(OP_CHECKSIG)
}

/// Reverse swap script. Only a 32-byte witness element takes the claim branch.
pub fn reverse_swap_script(params: &SwapScriptParams) -> ScriptTemplate {
    ScriptTemplate::new()
        .op(OP_SIZE)
        .number(PREIMAGE_LEN)
        .op(OP_EQUAL)
        .op(OP_IF)
        .op(OP_HASH160)
        .push(&params.hashlock)
        .op(OP_EQUALVERIFY)
        .push(&params.claim_public_key.serialize())
        .op(OP_ELSE)
        .op(OP_DROP)
        .number(i64::from(params.timeout_block_height))
        .op(OP_CLTV)
        .op(OP_DROP)
        .push(&params.refund_public_key.serialize())
        .op(OP_ENDIF)
        .op(OP_CHECKSIG)
}
