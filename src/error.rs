//! Error types for creatorclaim-publisher

use thiserror::Error;

/// Errors raised by the publishing pipeline and its collaborators.
///
/// Funding-related variants are terminal for a run: once the wallet is known
/// to be empty or a funding transaction cannot be confirmed, retrying the
/// stage cannot succeed. `Persistence` is the one non-fatal variant; the
/// pipeline downgrades it to a warning after a successful mint.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Storage session not ready: {0}")]
    SessionNotReady(String),

    #[error("Asset is {size} bytes, over the {max} byte limit")]
    AssetTooLarge { size: u64, max: u64 },

    #[error("Wallet has no spendable balance to fund storage")]
    InsufficientSourceFunds,

    #[error("Wallet native balance is zero; fund the wallet before publishing")]
    NoWalletFunds,

    #[error("Funding submission failed: {0}")]
    FundingSubmission(String),

    #[error("Funding transaction was not confirmed; check the wallet and try again")]
    FundingNotConfirmed,

    #[error("Upload rejected: {0}")]
    Upload(String),

    #[error("Metadata document unreachable: {0}")]
    MetadataUnreachable(String),

    #[error("Certificate mint failed: {0}")]
    Mint(String),

    #[error("{stage} timed out")]
    Timeout { stage: String },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sled::Error),
}

/// Errors raised by the royalty stream client.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Connection error: {0}")]
    Connect(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Stream closed")]
    Closed,
}
