pub mod chain;
pub mod confidential;
pub mod detector;
pub mod error;
pub mod fee;
pub mod network;
pub mod preimage;
mod pset;
pub mod script;
pub mod swap_script;
pub mod sweep;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Core types
pub use chain::{ChainBackend, ElectrumBackend, ScriptHistoryEntry};
pub use confidential::{ConfidentialContext, ResolvedAmount};
pub use error::{Error, Result};
pub use network::Network;

// Scripts and encodings
pub use script::{
    OutputType, ScriptElement, ScriptTemplate, nested_redeem_script, nested_unlocking_script,
    output_script, p2sh_output, p2sh_p2wsh_output, p2wsh_output,
};
pub use swap_script::{
    SwapKind, SwapScriptParams, normalize_preimage_hash, reverse_swap_script, swap_script,
};

// Chain scanning
pub use detector::{SwapOutput, detect_swap};
pub use preimage::detect_preimage;

// Fees and transaction building
pub use fee::{fee_for_vsize, target_fee, target_fee_discounted};
pub use sweep::{
    SwapInput, SweepParams, build_claim_pset, build_refund_pset, construct_claim_transaction,
    construct_refund_transaction,
};

// Re-export LWK for app-layer use
pub use lwk_wollet;
pub use lwk_wollet::elements;
