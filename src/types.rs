//! Shared data model for publishing and royalty streaming
//!
//! Everything here is plain data: constructed once, serialized verbatim,
//! never mutated after the fact. The metadata document and the royalty event
//! keep their external wire field names (`trait_type`, camelCase) so payloads
//! round-trip unchanged against the storage gateways and the royalty service.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

/// Application identifier attached to every storage upload as the `App-Name` tag.
pub const APP_NAME: &str = "CreatorClaim";

/// Version recorded on metadata uploads as the `Version` tag.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// One trait entry in the metadata document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetAttribute {
    pub trait_type: String,
    pub value: String,
}

/// The metadata document uploaded alongside an asset and referenced by the
/// minted certificate. Serialized verbatim; field order matters to nobody but
/// humans reading the gateway, so it mirrors the order creators see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetMetadata {
    pub name: String,
    pub description: String,
    pub image: String,
    pub attributes: Vec<AssetAttribute>,
}

impl AssetMetadata {
    /// Build the metadata document for an asset, recording the licence
    /// template the creator picked as a `Licence Template` attribute.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        image_uri: impl Into<String>,
        licence_template: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            image: image_uri.into(),
            attributes: vec![AssetAttribute {
                trait_type: "Licence Template".to_string(),
                value: licence_template.into(),
            }],
        }
    }
}

/// The binary payload handed to the pipeline.
#[derive(Debug, Clone)]
pub struct AssetSource {
    /// Original file name, used for progress text only.
    pub file_name: String,
    /// MIME type recorded as the upload's `Content-Type` tag.
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl AssetSource {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Key/value tag attached to a storage upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

impl Tag {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Result of one successful storage upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    /// Transaction id assigned by the storage network.
    pub content_id: String,
    /// Public gateway URI the content will be served from.
    pub uri: String,
}

/// Price and balance snapshot taken immediately before an upload.
///
/// Never cached across stages: the price depends on the payload size and the
/// balance moves underneath us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FundingQuote {
    pub price_atomic: U256,
    pub current_balance_atomic: U256,
}

impl FundingQuote {
    /// Whether the balance already covers the quoted price.
    pub fn covered(&self) -> bool {
        self.current_balance_atomic >= self.price_atomic
    }

    /// Amount missing from the balance, zero when covered.
    pub fn shortfall(&self) -> U256 {
        self.price_atomic
            .saturating_sub(self.current_balance_atomic)
    }
}

/// Local record of one completed publish, appended to the mint ledger after
/// the chain reports a successful mint. Field names match the ledger's JSON
/// document format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRecord {
    pub title: String,
    pub image_uri: String,
    pub metadata_uri: String,
    pub certificate_address: String,
    /// RFC 3339 timestamp of the mint.
    pub timestamp: String,
}

/// A royalty payment notification delivered by the royalty-distribution
/// service. Treated as an opaque feed item; the client never rewrites it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoyaltyEvent {
    pub id: String,
    pub timestamp: String,
    /// Decimal currency units, as sent by the service.
    pub amount: f64,
    pub source: String,
    pub certificate_id: String,
    pub certificate_title: String,
    pub recipient_wallet: String,
}

/// Render an atomic (lamport) amount as SOL for progress text.
pub fn display_sol(atomic: U256) -> String {
    match u128::try_from(atomic) {
        Ok(v) => format!("{} SOL", v as f64 / 1e9),
        Err(_) => format!("{atomic} lamports"),
    }
}
