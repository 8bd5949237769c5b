//! Local mint record ledger
//!
//! Append-only list of completed publishes, scoped to this device. Records
//! live under a single well-known key in a local key-value store as one JSON
//! document; an append reads the sequence, pushes, and writes it back. That
//! is not transactional against concurrent writers from other processes —
//! last writer wins — which is acceptable for user-initiated publishes that
//! happen serially.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::error::PublishError;
use crate::types::PublishRecord;

/// Well-known ledger key.
pub const MINT_RECORDS_KEY: &str = "mintRecords";

/// Local durable key-value store boundary.
pub trait KvStore: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, PublishError>;
    fn write(&self, key: &str, value: &[u8]) -> Result<(), PublishError>;
}

/// sled-backed key-value store.
pub struct SledKvStore {
    db: sled::Db,
}

impl SledKvStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PublishError> {
        let db = sled::open(path.as_ref())?;
        info!(path = %path.as_ref().display(), "Opened record database");
        Ok(Self { db })
    }
}

impl KvStore for SledKvStore {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, PublishError> {
        let value = self
            .db
            .get(key.as_bytes())
            .map_err(|e| PublishError::Persistence(e.to_string()))?;
        Ok(value.map(|v| v.to_vec()))
    }

    fn write(&self, key: &str, value: &[u8]) -> Result<(), PublishError> {
        self.db
            .insert(key.as_bytes(), value)
            .map_err(|e| PublishError::Persistence(e.to_string()))?;
        self.db
            .flush()
            .map_err(|e| PublishError::Persistence(e.to_string()))?;
        Ok(())
    }
}

/// Append-only ledger of completed publishes.
pub struct MintRecordStore {
    kv: Arc<dyn KvStore>,
}

impl MintRecordStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Append a record to the ledger.
    pub fn append(&self, record: &PublishRecord) -> Result<(), PublishError> {
        let mut records = self.list_all()?;
        records.push(record.clone());
        let bytes = serde_json::to_vec(&records)
            .map_err(|e| PublishError::Persistence(e.to_string()))?;
        self.kv.write(MINT_RECORDS_KEY, &bytes)?;
        info!(
            title = %record.title,
            certificate = %record.certificate_address,
            total = records.len(),
            "Saved mint record"
        );
        Ok(())
    }

    /// All records in append order, oldest first.
    pub fn list_all(&self) -> Result<Vec<PublishRecord>, PublishError> {
        match self.kv.read(MINT_RECORDS_KEY)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| PublishError::Persistence(e.to_string())),
            None => Ok(Vec::new()),
        }
    }
}
