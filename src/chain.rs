//! Chain collaborator traits
//!
//! The chain RPC client and the NFT-minting library live outside this crate;
//! the pipeline only sees these seams. Implementations are expected to wrap
//! the embedding application's RPC connection and signer adapter.

use async_trait::async_trait;

use crate::error::PublishError;

/// Wallet identity capability. Signing itself is delegated here; the core
/// only ever reads the address (for upload tags, the royalty stream
/// registration, and native balance checks).
#[async_trait]
pub trait Signer: Send + Sync {
    /// The wallet's public address.
    fn address(&self) -> String;

    /// Sign and submit a prepared transaction, returning its id. Consumed by
    /// gateway and chain implementations, not by the pipeline directly.
    async fn sign_and_send(&self, transaction: &[u8]) -> Result<String, PublishError>;
}

/// Chain queries and the certificate mint capability.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Native balance of an address, in base units (lamports).
    async fn native_balance(&self, address: &str) -> Result<u64, PublishError>;

    /// Mint a certificate token referencing the metadata document.
    /// Returns the certificate's on-chain address.
    async fn create_certificate(
        &self,
        metadata_uri: &str,
        name: &str,
        royalty_basis_points: u16,
    ) -> Result<String, PublishError>;
}
