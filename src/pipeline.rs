//! Asset publishing pipeline
//!
//! Drives one publish operation through a fixed sequence of stages:
//!
//! ```text
//! UploadingAsset ─► EnsuringAssetFunds ─► UploadingMetadataDoc
//!        ─► EnsuringMetadataFunds ─► VerifyingMetadata ─► Minting
//!        ─► Persisting ─► Complete
//! ```
//!
//! with `Failed` reachable from any stage. Stages are strictly sequential:
//! each depends on the previous stage's output (a content id, then a metadata
//! URI, then a certificate address). Before each upload the pipeline runs the
//! ensure-funds sub-protocol: quote the price, reserve it against the
//! session, and fund the shortfall from the wallet when the available balance
//! does not cover it, with bounded retries on the submission step only.
//!
//! Progress is reported as structured [`PipelineStatus`] values on a
//! broadcast channel. Each transition is published *before* the stage's
//! network operation, so an observer always sees "about to do X" rather than
//! a stale report during a long-running call. Completed stages are never
//! rolled back on a later failure — uploaded content and submitted funding
//! transactions are sunk cost, the storage network has no delete.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::chain::ChainClient;
use crate::error::PublishError;
use crate::records::MintRecordStore;
use crate::session::StorageSession;
use crate::types::{
    display_sol, AssetMetadata, AssetSource, FundingQuote, PublishRecord, Tag, UploadReceipt,
    APP_NAME, APP_VERSION,
};

/// Stages of one publish run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Idle,
    UploadingAsset,
    EnsuringAssetFunds,
    UploadingMetadataDoc,
    EnsuringMetadataFunds,
    VerifyingMetadata,
    Minting,
    Persisting,
    Complete,
    Failed,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::UploadingAsset => "uploading asset",
            Self::EnsuringAssetFunds => "ensuring asset funds",
            Self::UploadingMetadataDoc => "uploading metadata document",
            Self::EnsuringMetadataFunds => "ensuring metadata funds",
            Self::VerifyingMetadata => "verifying metadata",
            Self::Minting => "minting",
            Self::Persisting => "persisting",
            Self::Complete => "complete",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Severity of a status report. The UI contract: no prose parsing, the
/// severity alone decides how a report is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusSeverity {
    Info,
    Success,
    Warning,
    Error,
}

/// One structured progress report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStatus {
    pub stage: PipelineStage,
    pub severity: StatusSeverity,
    pub message: String,
}

impl PipelineStatus {
    fn idle() -> Self {
        Self {
            stage: PipelineStage::Idle,
            severity: StatusSeverity::Info,
            message: String::new(),
        }
    }
}

/// Gating policy for the metadata accessibility check.
///
/// `Warn` preserves the long-standing behavior: gateway propagation latency
/// is common and should not block certificate issuance, so an unreachable
/// document is surfaced as a warning and minting proceeds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationPolicy {
    #[default]
    Warn,
    Require,
}

/// Metadata document fetch boundary: a plain HTTP GET against the metadata
/// URI, where any non-success response means "not yet accessible".
#[async_trait]
pub trait MetadataProbe: Send + Sync {
    async fn probe(&self, uri: &str) -> Result<(), String>;
}

/// reqwest-backed probe.
#[derive(Default)]
pub struct HttpMetadataProbe {
    client: reqwest::Client,
}

#[async_trait]
impl MetadataProbe for HttpMetadataProbe {
    async fn probe(&self, uri: &str) -> Result<(), String> {
        let response = self
            .client
            .get(uri)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("gateway returned {}", response.status()))
        }
    }
}

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Largest accepted asset payload.
    pub max_asset_bytes: u64,
    /// Total funding submission attempts (not retries-after-first).
    pub funding_attempts: u32,
    /// Backoff unit; the delay after failed attempt N is `unit * 2^N`.
    pub funding_backoff_unit: Duration,
    /// Confirmation wait after funding for the asset upload.
    pub asset_confirmation_wait: Duration,
    /// Confirmation wait after funding for the metadata upload; shorter
    /// because metadata payloads are small and typically already covered.
    pub metadata_confirmation_wait: Duration,
    /// Gateway propagation wait before probing the metadata URI.
    pub propagation_wait: Duration,
    /// Upper bound on each stage's network call.
    pub stage_timeout: Duration,
    pub verification: VerificationPolicy,
    /// Creator royalty recorded on the certificate, in basis points.
    pub royalty_basis_points: u16,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_asset_bytes: 10 * 1024 * 1024,
            funding_attempts: 3,
            funding_backoff_unit: Duration::from_secs(1),
            asset_confirmation_wait: Duration::from_secs(15),
            metadata_confirmation_wait: Duration::from_secs(10),
            propagation_wait: Duration::from_secs(2),
            stage_timeout: Duration::from_secs(60),
            verification: VerificationPolicy::default(),
            royalty_basis_points: 0,
        }
    }
}

/// One user submission.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub title: String,
    pub description: String,
    /// Licence template identifier recorded in the metadata attributes.
    pub licence_template: String,
    pub asset: AssetSource,
}

/// Terminal result of a successful run.
#[derive(Debug, Clone)]
pub struct PublishOutcome {
    pub certificate_address: String,
    pub image_uri: String,
    pub metadata_uri: String,
    /// Whether the local mint record was written. The mint itself is the
    /// durable source of truth; a failed record write downgrades to a
    /// warning.
    pub record_persisted: bool,
    pub warnings: Vec<String>,
}

/// Orchestrates publish runs against one storage session.
pub struct PublishPipeline {
    session: Arc<StorageSession>,
    chain: Arc<dyn ChainClient>,
    records: Arc<MintRecordStore>,
    probe: Arc<dyn MetadataProbe>,
    config: PipelineConfig,
    status_tx: broadcast::Sender<PipelineStatus>,
    latest: RwLock<PipelineStatus>,
}

impl PublishPipeline {
    pub fn new(
        session: Arc<StorageSession>,
        chain: Arc<dyn ChainClient>,
        records: Arc<MintRecordStore>,
        probe: Arc<dyn MetadataProbe>,
        config: PipelineConfig,
    ) -> Self {
        let (status_tx, _) = broadcast::channel(64);
        Self {
            session,
            chain,
            records,
            probe,
            config,
            status_tx,
            latest: RwLock::new(PipelineStatus::idle()),
        }
    }

    /// Subscribe to every status report.
    pub fn subscribe_status(&self) -> broadcast::Receiver<PipelineStatus> {
        self.status_tx.subscribe()
    }

    /// Latest status report, for observers that poll.
    pub fn latest_status(&self) -> PipelineStatus {
        self.latest.read().map(|s| s.clone()).unwrap_or_else(|_| PipelineStatus::idle())
    }

    /// Run one publish operation to a terminal state.
    pub async fn publish(&self, request: PublishRequest) -> Result<PublishOutcome, PublishError> {
        info!(title = %request.title, size = request.asset.len(), "Starting publish");
        match self.run(&request).await {
            Ok(outcome) => {
                self.report(
                    PipelineStage::Complete,
                    StatusSeverity::Success,
                    format!(
                        "Certificate successfully minted! Address: {}",
                        outcome.certificate_address
                    ),
                );
                Ok(outcome)
            }
            Err(error) => {
                warn!(error = %error, "Publish failed");
                self.report(
                    PipelineStage::Failed,
                    StatusSeverity::Error,
                    format!("Processing failed: {error}"),
                );
                Err(error)
            }
        }
    }

    async fn run(&self, request: &PublishRequest) -> Result<PublishOutcome, PublishError> {
        let asset = &request.asset;
        if asset.is_empty() {
            return Err(PublishError::Upload("asset payload is empty".into()));
        }
        if asset.len() as u64 > self.config.max_asset_bytes {
            return Err(PublishError::AssetTooLarge {
                size: asset.len() as u64,
                max: self.config.max_asset_bytes,
            });
        }

        let mut warnings = Vec::new();

        // Asset upload, funding it first if the prepaid balance is short.
        let asset_tags = vec![
            Tag::new("Content-Type", &asset.content_type),
            Tag::new("App-Name", APP_NAME),
            Tag::new("Uploader", self.session.uploader_address()),
        ];
        self.report(
            PipelineStage::UploadingAsset,
            StatusSeverity::Info,
            format!("Estimating upload cost for {}...", asset.file_name),
        );
        let asset_receipt = self
            .upload_with_funds(
                asset.bytes.clone(),
                &asset_tags,
                PipelineStage::EnsuringAssetFunds,
                PipelineStage::UploadingAsset,
                self.config.asset_confirmation_wait,
                &asset.file_name,
            )
            .await?;
        self.report(
            PipelineStage::UploadingAsset,
            StatusSeverity::Info,
            format!("File uploaded! Storage tx: {}", asset_receipt.content_id),
        );

        // Metadata document upload.
        let metadata = AssetMetadata::new(
            &request.title,
            &request.description,
            &asset_receipt.uri,
            &request.licence_template,
        );
        let metadata_bytes = serde_json::to_vec(&metadata)?;
        let metadata_tags = vec![
            Tag::new("Content-Type", "application/json"),
            Tag::new("App-Name", APP_NAME),
            Tag::new("Version", APP_VERSION),
            Tag::new("Title", &request.title),
            Tag::new("Uploader", self.session.uploader_address()),
        ];
        self.report(
            PipelineStage::UploadingMetadataDoc,
            StatusSeverity::Info,
            "Estimating metadata upload cost...".to_string(),
        );
        let metadata_receipt = self
            .upload_with_funds(
                metadata_bytes,
                &metadata_tags,
                PipelineStage::EnsuringMetadataFunds,
                PipelineStage::UploadingMetadataDoc,
                self.config.metadata_confirmation_wait,
                "metadata JSON",
            )
            .await?;
        self.report(
            PipelineStage::UploadingMetadataDoc,
            StatusSeverity::Info,
            format!("Metadata uploaded! Storage tx: {}", metadata_receipt.content_id),
        );

        // Accessibility probe; gating is policy-controlled.
        self.verify_metadata(&metadata_receipt.uri, &mut warnings)
            .await?;

        // Mint. Not retried: mint failures are usually conditions a blind
        // retry will not fix (fee balance, signature rejection).
        self.report(
            PipelineStage::Minting,
            StatusSeverity::Info,
            "Creating certificate on chain...".to_string(),
        );
        let certificate_address = match timeout(
            self.config.stage_timeout,
            self.chain.create_certificate(
                &metadata_receipt.uri,
                &request.title,
                self.config.royalty_basis_points,
            ),
        )
        .await
        {
            Ok(Ok(address)) => address,
            Ok(Err(PublishError::Mint(reason))) => return Err(PublishError::Mint(reason)),
            Ok(Err(other)) => return Err(PublishError::Mint(other.to_string())),
            Err(_) => {
                return Err(PublishError::Timeout {
                    stage: PipelineStage::Minting.to_string(),
                })
            }
        };
        info!(certificate = %certificate_address, "Certificate created");

        // Persist locally, best-effort.
        self.report(
            PipelineStage::Persisting,
            StatusSeverity::Info,
            "Saving mint record...".to_string(),
        );
        let record = PublishRecord {
            title: request.title.clone(),
            image_uri: asset_receipt.uri.clone(),
            metadata_uri: metadata_receipt.uri.clone(),
            certificate_address: certificate_address.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        let record_persisted = match self.records.append(&record) {
            Ok(()) => true,
            Err(error) => {
                warn!(error = %error, "Failed to save mint record");
                let message = format!(
                    "Certificate minted, but the local record could not be saved: {error}"
                );
                self.report(PipelineStage::Persisting, StatusSeverity::Warning, message.clone());
                warnings.push(message);
                false
            }
        };

        Ok(PublishOutcome {
            certificate_address,
            image_uri: asset_receipt.uri,
            metadata_uri: metadata_receipt.uri,
            record_persisted,
            warnings,
        })
    }

    /// Ensure-funds sub-protocol followed by the upload itself.
    ///
    /// The quoted price is reserved against the session for the duration, so
    /// concurrent runs cannot count this run's share of the balance as their
    /// own. Funding is submitted only when the available balance falls short,
    /// and only after the wallet is known to have something to spend.
    async fn upload_with_funds(
        &self,
        bytes: Vec<u8>,
        tags: &[Tag],
        funds_stage: PipelineStage,
        upload_stage: PipelineStage,
        confirmation_wait: Duration,
        payload_label: &str,
    ) -> Result<UploadReceipt, PublishError> {
        let price = self
            .bounded(funds_stage, self.session.quote_price(bytes.len()))
            .await?;
        self.report(
            funds_stage,
            StatusSeverity::Info,
            format!("Upload cost: {}", display_sol(price)),
        );

        let reservation = self.session.reserve(price).await;

        self.report(
            funds_stage,
            StatusSeverity::Info,
            "Checking storage balance...".to_string(),
        );
        let available = self
            .bounded(funds_stage, self.session.available_balance(Some(&reservation)))
            .await?;
        let quote = FundingQuote {
            price_atomic: price,
            current_balance_atomic: available,
        };
        debug!(price = %price, available = %available, "Funding quote");

        if !quote.covered() {
            // A wallet with nothing to spend cannot fund; fail before any
            // submission.
            self.report(
                funds_stage,
                StatusSeverity::Info,
                "Checking wallet balance...".to_string(),
            );
            let native = self
                .bounded(funds_stage, self.session.wallet_native_balance())
                .await?;
            if native == 0 {
                return Err(PublishError::NoWalletFunds);
            }

            let mut attempt = 0u32;
            loop {
                attempt += 1;
                self.report(
                    funds_stage,
                    StatusSeverity::Info,
                    format!(
                        "Funding storage node with {} (attempt {attempt})...",
                        display_sol(price)
                    ),
                );
                match self.bounded(funds_stage, self.session.fund(price)).await {
                    Ok(tx_id) => {
                        debug!(tx_id = %tx_id, "Funding submission accepted");
                        break;
                    }
                    Err(
                        error @ (PublishError::InsufficientSourceFunds
                        | PublishError::NoWalletFunds),
                    ) => return Err(error),
                    Err(error) if attempt >= self.config.funding_attempts => {
                        return Err(match error {
                            submission @ PublishError::FundingSubmission(_) => submission,
                            other => PublishError::FundingSubmission(other.to_string()),
                        });
                    }
                    Err(error) => {
                        let delay = self.config.funding_backoff_unit * 2u32.pow(attempt);
                        warn!(error = %error, attempt, "Funding attempt failed");
                        self.report(
                            funds_stage,
                            StatusSeverity::Info,
                            format!(
                                "Funding attempt failed, retrying in {} seconds...",
                                delay.as_secs()
                            ),
                        );
                        sleep(delay).await;
                    }
                }
            }

            self.report(
                funds_stage,
                StatusSeverity::Info,
                format!(
                    "Funding transaction sent. Waiting for confirmation (approx {}s)...",
                    confirmation_wait.as_secs()
                ),
            );
            sleep(confirmation_wait).await;

            // One post-delay poll only; a stalled or dropped transaction must
            // not hang the run indefinitely.
            let after = self
                .bounded(funds_stage, self.session.available_balance(Some(&reservation)))
                .await?;
            if after < price {
                return Err(PublishError::FundingNotConfirmed);
            }
            self.report(
                funds_stage,
                StatusSeverity::Info,
                "Funding confirmed. Proceeding with upload...".to_string(),
            );
        } else {
            self.report(
                funds_stage,
                StatusSeverity::Info,
                "Sufficient balance. Starting upload...".to_string(),
            );
        }

        self.report(
            upload_stage,
            StatusSeverity::Info,
            format!("Uploading {payload_label}..."),
        );
        let receipt = self.bounded(upload_stage, self.session.upload(bytes, tags)).await;
        drop(reservation);
        receipt
    }

    async fn verify_metadata(
        &self,
        uri: &str,
        warnings: &mut Vec<String>,
    ) -> Result<(), PublishError> {
        self.report(
            PipelineStage::VerifyingMetadata,
            StatusSeverity::Info,
            format!("Verifying metadata accessibility at {uri}..."),
        );
        sleep(self.config.propagation_wait).await;

        let result = match timeout(self.config.stage_timeout, self.probe.probe(uri)).await {
            Ok(result) => result,
            Err(_) => Err("probe timed out".to_string()),
        };

        if let Err(reason) = result {
            match self.config.verification {
                VerificationPolicy::Warn => {
                    warn!(uri = %uri, reason = %reason, "Metadata not yet accessible");
                    let message =
                        format!("Metadata not yet accessible ({reason}); continuing to mint");
                    self.report(
                        PipelineStage::VerifyingMetadata,
                        StatusSeverity::Warning,
                        message.clone(),
                    );
                    warnings.push(message);
                }
                VerificationPolicy::Require => {
                    return Err(PublishError::MetadataUnreachable(reason));
                }
            }
        }
        Ok(())
    }

    /// Bound a stage's network call by the configured timeout.
    async fn bounded<T>(
        &self,
        stage: PipelineStage,
        operation: impl std::future::Future<Output = Result<T, PublishError>>,
    ) -> Result<T, PublishError> {
        match timeout(self.config.stage_timeout, operation).await {
            Ok(result) => result,
            Err(_) => Err(PublishError::Timeout {
                stage: stage.to_string(),
            }),
        }
    }

    fn report(&self, stage: PipelineStage, severity: StatusSeverity, message: String) {
        debug!(stage = %stage, ?severity, message = %message, "Pipeline status");
        let status = PipelineStatus {
            stage,
            severity,
            message,
        };
        if let Ok(mut latest) = self.latest.write() {
            *latest = status.clone();
        }
        if self.status_tx.receiver_count() > 0 {
            let _ = self.status_tx.send(status);
        }
    }
}
