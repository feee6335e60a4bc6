// src/error.rs
use alloy::primitives::Address;
use thiserror::Error;

/// Failure taxonomy of the liquidation pipeline.
///
/// `Config` is fatal at startup. `MissingGasPrice` aborts one token.
/// Everything else is caught at the batch boundary and turned into a
/// `SubmissionOutcome::Failed`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("batch for token {token} contains flow of token {found}")]
    InvariantViolation { token: Address, found: Address },

    #[error("no current gas price available")]
    MissingGasPrice,

    #[error("gas estimation failed: {0}")]
    Estimation(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("broadcast failed: {0}")]
    Broadcast(String),

    #[error("transaction {hash} not confirmed: {reason}")]
    Confirmation { hash: String, reason: String },

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("flow source error: {0}")]
    FlowSource(String),

    #[error("price table error: {0}")]
    PriceTable(String),
}

pub type Result<T> = std::result::Result<T, Error>;
