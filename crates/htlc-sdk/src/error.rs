use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("taproot not supported (input {0})")]
    UnsupportedEncoding(usize),

    #[error("input {0}: only witness inputs supported when blinded")]
    EncodingMismatch(usize),

    #[error("all or none inputs and outputs have to be blinded")]
    InconsistentBlinding,

    #[error("cannot unblind output: {0}")]
    Unblind(String),

    #[error("preimage hash must be 20 or 32 bytes (got {0})")]
    InvalidPreimageHash(usize),

    #[error("claim input {0} has no preimage")]
    MissingPreimage(usize),

    #[error("input {0} needs its previous transaction")]
    MissingPreviousTransaction(usize),

    #[error("previous transaction of input {0} does not match its outpoint")]
    PreviousTransactionMismatch(usize),

    #[error("input {index} is locked until height {required} (transaction locktime {lock_height})")]
    LockTimeNotReached {
        index: usize,
        required: u32,
        lock_height: u32,
    },

    #[error("insufficient funds: inputs hold {available}, fee is {fee}")]
    InsufficientFunds { available: u64, fee: u64 },

    #[error("input amount overflow")]
    AmountOverflow,

    #[error("no inputs to spend")]
    EmptyInputs,

    #[error("blinding error: {0}")]
    Blinding(String),

    #[error("signing error: {0}")]
    Signing(String),

    #[error("PSET construction error: {0}")]
    Pset(String),

    #[error("electrum error: {0}")]
    Electrum(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("broadcast error: {0}")]
    Broadcast(String),
}

pub type Result<T> = std::result::Result<T, Error>;
