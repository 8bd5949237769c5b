//! CreatorClaim Publisher - asset publishing pipeline and royalty stream client
//!
//! Lets a creator publish a digital asset as an on-chain certificate: the
//! asset and its metadata document are uploaded to a content-addressed
//! storage network, storage is paid from a prepaid session balance (funded
//! on demand from the creator's wallet), the upload is verified, a
//! certificate token referencing the metadata is minted, and a local record
//! of the result is kept. A companion client streams real-time "royalty
//! paid" events to the creator over a long-lived WebSocket connection.
//!
//! ## Architecture
//!
//! ```text
//! PublishPipeline ──► StorageSession ──► StorageGateway (storage SDK)
//!        │                  │
//!        │                  └─► reservation ledger (single-owner task)
//!        ├──► ChainClient (chain RPC + mint library)
//!        ├──► MetadataProbe (HTTP GET)
//!        └──► MintRecordStore ──► KvStore (sled)
//!
//! RoyaltyStreamClient ──► royalty service (WebSocket), supervised reconnect
//! ```
//!
//! The SDKs for the storage network and the chain are collaborators behind
//! the traits above; this crate owns the workflow, the failure handling, and
//! the concurrency around the shared prepaid balance. Pipeline stages run
//! strictly in sequence within one run; runs are independent of each other
//! and of the royalty stream.

pub mod chain;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod records;
pub mod session;
pub mod stream;
pub mod types;

// Re-exports
pub use chain::{ChainClient, Signer};
pub use config::Config;
pub use error::{PublishError, StreamError};
pub use pipeline::{
    HttpMetadataProbe, MetadataProbe, PipelineConfig, PipelineStage, PipelineStatus,
    PublishOutcome, PublishPipeline, PublishRequest, StatusSeverity, VerificationPolicy,
};
pub use records::{KvStore, MintRecordStore, SledKvStore};
pub use session::{BalanceReservation, SessionConfig, StorageGateway, StorageSession};
pub use stream::{RoyaltyStreamClient, StreamConfig};
pub use types::{
    AssetAttribute, AssetMetadata, AssetSource, FundingQuote, PublishRecord, RoyaltyEvent, Tag,
    UploadReceipt,
};
