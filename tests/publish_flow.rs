//! End-to-end publish pipeline scenarios against collaborator doubles
//!
//! All timing-sensitive tests run on the paused test clock, so the fixed
//! confirmation and backoff delays are observed exactly without real waits.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy_primitives::U256;
use async_trait::async_trait;
use creatorclaim_publisher::{
    AssetSource, ChainClient, KvStore, MetadataProbe, MintRecordStore, PipelineConfig,
    PipelineStage, PublishError, PublishPipeline, PublishRequest, SessionConfig, Signer,
    StatusSeverity, StorageGateway, StorageSession, VerificationPolicy,
};
use tokio::time::Instant;

struct MockGateway {
    price: U256,
    balance: Mutex<U256>,
    /// Balance observed after a successful funding submission confirms.
    balance_after_fund: Option<U256>,
    /// Number of leading fund submissions that fail.
    fund_failures: Mutex<u32>,
    fund_calls: Mutex<u32>,
    upload_calls: Mutex<Vec<usize>>,
}

impl MockGateway {
    fn new(price: u64, balance: u64) -> Self {
        Self {
            price: U256::from(price),
            balance: Mutex::new(U256::from(balance)),
            balance_after_fund: None,
            fund_failures: Mutex::new(0),
            fund_calls: Mutex::new(0),
            upload_calls: Mutex::new(Vec::new()),
        }
    }

    fn fund_calls(&self) -> u32 {
        *self.fund_calls.lock().unwrap()
    }

    fn upload_count(&self) -> usize {
        self.upload_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl StorageGateway for MockGateway {
    fn session_address(&self) -> Option<String> {
        Some("creator-wallet".to_string())
    }

    async fn price(&self, _byte_len: usize) -> Result<U256, PublishError> {
        Ok(self.price)
    }

    async fn balance(&self) -> Result<U256, PublishError> {
        Ok(*self.balance.lock().unwrap())
    }

    async fn fund(&self, _amount: U256) -> Result<String, PublishError> {
        *self.fund_calls.lock().unwrap() += 1;
        let mut failures = self.fund_failures.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(PublishError::FundingSubmission("rpc unavailable".into()));
        }
        if let Some(after) = self.balance_after_fund {
            *self.balance.lock().unwrap() = after;
        }
        Ok("fund-tx-1".to_string())
    }

    async fn upload(&self, bytes: Vec<u8>, _tags: &[creatorclaim_publisher::Tag]) -> Result<String, PublishError> {
        let mut calls = self.upload_calls.lock().unwrap();
        calls.push(bytes.len());
        Ok(format!("content-{}", calls.len()))
    }
}

struct MockSigner;

#[async_trait]
impl Signer for MockSigner {
    fn address(&self) -> String {
        "creator-wallet".to_string()
    }

    async fn sign_and_send(&self, _transaction: &[u8]) -> Result<String, PublishError> {
        Ok("sig-tx-1".to_string())
    }
}

struct MockChain {
    lamports: u64,
    mint_fails: bool,
    mint_calls: Mutex<u32>,
}

impl MockChain {
    fn new(lamports: u64) -> Self {
        Self {
            lamports,
            mint_fails: false,
            mint_calls: Mutex::new(0),
        }
    }

    fn mint_calls(&self) -> u32 {
        *self.mint_calls.lock().unwrap()
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn native_balance(&self, _address: &str) -> Result<u64, PublishError> {
        Ok(self.lamports)
    }

    async fn create_certificate(
        &self,
        _metadata_uri: &str,
        _name: &str,
        _royalty_basis_points: u16,
    ) -> Result<String, PublishError> {
        *self.mint_calls.lock().unwrap() += 1;
        if self.mint_fails {
            Err(PublishError::Mint("signature rejected".into()))
        } else {
            Ok("certMint111111111111111111111111".to_string())
        }
    }
}

struct MockProbe {
    reachable: bool,
    calls: Mutex<u32>,
}

#[async_trait]
impl MetadataProbe for MockProbe {
    async fn probe(&self, _uri: &str) -> Result<(), String> {
        *self.calls.lock().unwrap() += 1;
        if self.reachable {
            Ok(())
        } else {
            Err("gateway returned 404 Not Found".to_string())
        }
    }
}

#[derive(Default)]
struct MemoryKv {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl KvStore for MemoryKv {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, PublishError> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    fn write(&self, key: &str, value: &[u8]) -> Result<(), PublishError> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

struct FailingKv;

impl KvStore for FailingKv {
    fn read(&self, _key: &str) -> Result<Option<Vec<u8>>, PublishError> {
        Err(PublishError::Persistence("storage quota exceeded".into()))
    }

    fn write(&self, _key: &str, _value: &[u8]) -> Result<(), PublishError> {
        Err(PublishError::Persistence("storage quota exceeded".into()))
    }
}

struct Harness {
    gateway: Arc<MockGateway>,
    chain: Arc<MockChain>,
    session: Arc<StorageSession>,
    pipeline: PublishPipeline,
}

async fn harness_with(
    gateway: MockGateway,
    chain: MockChain,
    probe: MockProbe,
    kv: Arc<dyn KvStore>,
    config: PipelineConfig,
) -> Harness {
    let gateway = Arc::new(gateway);
    let chain = Arc::new(chain);
    let session = Arc::new(
        StorageSession::connect(
            gateway.clone(),
            Arc::new(MockSigner),
            chain.clone(),
            SessionConfig::default(),
        )
        .await
        .unwrap(),
    );
    let pipeline = PublishPipeline::new(
        session.clone(),
        chain.clone(),
        Arc::new(MintRecordStore::new(kv)),
        Arc::new(probe),
        config,
    );
    Harness {
        gateway,
        chain,
        session,
        pipeline,
    }
}

async fn harness(gateway: MockGateway, chain: MockChain) -> Harness {
    harness_with(
        gateway,
        chain,
        MockProbe {
            reachable: true,
            calls: Mutex::new(0),
        },
        Arc::new(MemoryKv::default()),
        PipelineConfig::default(),
    )
    .await
}

fn request() -> PublishRequest {
    PublishRequest {
        title: "Sunset Over Mountains".to_string(),
        description: "A study in orange".to_string(),
        licence_template: "0x01".to_string(),
        asset: AssetSource::new("sunset.png", "image/png", vec![7u8; 1024]),
    }
}

#[tokio::test(start_paused = true)]
async fn scenario_a_sufficient_balance_skips_funding() {
    let h = harness(MockGateway::new(100, 100), MockChain::new(1_000_000)).await;

    let outcome = h.pipeline.publish(request()).await.unwrap();

    assert_eq!(h.gateway.fund_calls(), 0);
    assert_eq!(h.gateway.upload_count(), 2);
    assert_eq!(h.chain.mint_calls(), 1);
    assert!(outcome.record_persisted);
    assert_eq!(outcome.image_uri, "https://arweave.net/content-1");
    assert_eq!(outcome.metadata_uri, "https://arweave.net/content-2");
}

#[tokio::test(start_paused = true)]
async fn scenario_b_empty_wallet_fails_before_any_submission() {
    let h = harness(MockGateway::new(500, 0), MockChain::new(0)).await;

    let error = h.pipeline.publish(request()).await.unwrap_err();

    assert!(matches!(error, PublishError::NoWalletFunds));
    assert_eq!(h.gateway.fund_calls(), 0);
    assert_eq!(h.gateway.upload_count(), 0);
    assert_eq!(h.chain.mint_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn scenario_c_funds_waits_and_uploads() {
    let mut gateway = MockGateway::new(500, 0);
    gateway.balance_after_fund = Some(U256::from(500u64));
    let h = harness(gateway, MockChain::new(1_000_000)).await;

    let started = Instant::now();
    let outcome = h.pipeline.publish(request()).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(h.gateway.fund_calls(), 1);
    assert_eq!(h.gateway.upload_count(), 2);
    assert!(outcome.warnings.is_empty());
    // 15s asset funding confirmation plus the 2s propagation wait; the
    // metadata upload is covered by the confirmed balance and adds no wait.
    assert_eq!(elapsed, Duration::from_secs(17));
}

#[tokio::test(start_paused = true)]
async fn funding_retries_are_bounded_with_exponential_backoff() {
    let gateway = MockGateway::new(500, 0);
    *gateway.fund_failures.lock().unwrap() = u32::MAX;
    let h = harness(gateway, MockChain::new(1_000_000)).await;

    let started = Instant::now();
    let error = h.pipeline.publish(request()).await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(error, PublishError::FundingSubmission(_)));
    assert_eq!(h.gateway.fund_calls(), 3);
    // Backoff after the first two failed attempts: 2s then 4s. The third
    // failure is terminal, so no further delay accrues.
    assert_eq!(elapsed, Duration::from_secs(6));
    assert_eq!(h.gateway.upload_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn funding_recovers_after_transient_submission_failure() {
    let mut gateway = MockGateway::new(500, 0);
    gateway.balance_after_fund = Some(U256::from(500u64));
    *gateway.fund_failures.lock().unwrap() = 1;
    let h = harness(gateway, MockChain::new(1_000_000)).await;

    h.pipeline.publish(request()).await.unwrap();

    assert_eq!(h.gateway.fund_calls(), 2);
    assert_eq!(h.gateway.upload_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn unconfirmed_funding_is_terminal_after_one_poll() {
    // Funding submission succeeds but the balance never moves.
    let h = harness(MockGateway::new(500, 0), MockChain::new(1_000_000)).await;

    let error = h.pipeline.publish(request()).await.unwrap_err();

    assert!(matches!(error, PublishError::FundingNotConfirmed));
    assert_eq!(h.gateway.fund_calls(), 1);
    assert_eq!(h.gateway.upload_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn unreachable_metadata_warns_but_still_mints() {
    let h = harness_with(
        MockGateway::new(100, 100),
        MockChain::new(1_000_000),
        MockProbe {
            reachable: false,
            calls: Mutex::new(0),
        },
        Arc::new(MemoryKv::default()),
        PipelineConfig::default(),
    )
    .await;

    let outcome = h.pipeline.publish(request()).await.unwrap();

    assert_eq!(h.chain.mint_calls(), 1);
    assert_eq!(outcome.warnings.len(), 1);
    assert!(outcome.warnings[0].contains("continuing to mint"));
}

#[tokio::test(start_paused = true)]
async fn require_policy_gates_on_unreachable_metadata() {
    let h = harness_with(
        MockGateway::new(100, 100),
        MockChain::new(1_000_000),
        MockProbe {
            reachable: false,
            calls: Mutex::new(0),
        },
        Arc::new(MemoryKv::default()),
        PipelineConfig {
            verification: VerificationPolicy::Require,
            ..PipelineConfig::default()
        },
    )
    .await;

    let error = h.pipeline.publish(request()).await.unwrap_err();

    assert!(matches!(error, PublishError::MetadataUnreachable(_)));
    assert_eq!(h.chain.mint_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn persistence_failure_downgrades_to_warning() {
    let h = harness_with(
        MockGateway::new(100, 100),
        MockChain::new(1_000_000),
        MockProbe {
            reachable: true,
            calls: Mutex::new(0),
        },
        Arc::new(FailingKv),
        PipelineConfig::default(),
    )
    .await;

    let outcome = h.pipeline.publish(request()).await.unwrap();

    assert_eq!(h.chain.mint_calls(), 1);
    assert!(!outcome.record_persisted);
    assert_eq!(outcome.certificate_address, "certMint111111111111111111111111");
    assert_eq!(outcome.warnings.len(), 1);
    assert!(outcome.warnings[0].contains("could not be saved"));
}

#[tokio::test(start_paused = true)]
async fn mint_failure_is_terminal_and_persists_nothing() {
    let mut chain = MockChain::new(1_000_000);
    chain.mint_fails = true;
    let kv = Arc::new(MemoryKv::default());
    let h = harness_with(
        MockGateway::new(100, 100),
        chain,
        MockProbe {
            reachable: true,
            calls: Mutex::new(0),
        },
        kv.clone(),
        PipelineConfig::default(),
    )
    .await;

    let error = h.pipeline.publish(request()).await.unwrap_err();

    assert!(matches!(error, PublishError::Mint(_)));
    assert_eq!(h.chain.mint_calls(), 1);
    // No partial record: the ledger key was never written.
    assert!(kv.entries.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn oversized_asset_is_rejected_before_any_network_call() {
    let h = harness(MockGateway::new(100, 100), MockChain::new(1_000_000)).await;

    let mut req = request();
    req.asset = AssetSource::new("huge.mp4", "video/mp4", vec![0u8; 11 * 1024 * 1024]);

    let error = h.pipeline.publish(req).await.unwrap_err();

    assert!(matches!(error, PublishError::AssetTooLarge { .. }));
    assert_eq!(h.gateway.upload_count(), 0);
    assert_eq!(h.gateway.fund_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn concurrent_reservation_forces_funding() {
    // Another run holds 100 of the 150 balance; this run's 100 quote no
    // longer fits and must fund even though the raw balance would cover it.
    let mut gateway = MockGateway::new(100, 150);
    gateway.balance_after_fund = Some(U256::from(250u64));
    let h = harness(gateway, MockChain::new(1_000_000)).await;

    let other_run = h.session.reserve(U256::from(100u64)).await;

    h.pipeline.publish(request()).await.unwrap();

    assert!(h.gateway.fund_calls() >= 1);
    drop(other_run);
}

#[tokio::test(start_paused = true)]
async fn statuses_carry_stage_and_severity() {
    let h = harness(MockGateway::new(100, 100), MockChain::new(1_000_000)).await;
    let mut status_rx = h.pipeline.subscribe_status();

    h.pipeline.publish(request()).await.unwrap();

    let mut statuses = Vec::new();
    while let Ok(status) = status_rx.try_recv() {
        statuses.push(status);
    }

    // Every stage announces itself before its network call runs.
    let stages: Vec<PipelineStage> = statuses.iter().map(|s| s.stage).collect();
    let position = |stage| stages.iter().position(|s| *s == stage).unwrap();
    assert!(position(PipelineStage::EnsuringAssetFunds) > position(PipelineStage::UploadingAsset));
    assert!(position(PipelineStage::Minting) > position(PipelineStage::VerifyingMetadata));
    assert!(position(PipelineStage::Persisting) > position(PipelineStage::Minting));

    // The terminal report is detected by severity, not by prose.
    let last = statuses.last().unwrap();
    assert_eq!(last.stage, PipelineStage::Complete);
    assert_eq!(last.severity, StatusSeverity::Success);
    assert!(statuses.iter().all(|s| s.severity != StatusSeverity::Error));

    // Polling observers see the same terminal report.
    let latest = h.pipeline.latest_status();
    assert_eq!(latest.stage, PipelineStage::Complete);
    assert_eq!(latest.severity, StatusSeverity::Success);
}

#[tokio::test(start_paused = true)]
async fn failed_run_reports_error_severity() {
    let h = harness(MockGateway::new(500, 0), MockChain::new(0)).await;
    let mut status_rx = h.pipeline.subscribe_status();

    h.pipeline.publish(request()).await.unwrap_err();

    let mut last = None;
    while let Ok(status) = status_rx.try_recv() {
        last = Some(status);
    }
    let last = last.unwrap();
    assert_eq!(last.stage, PipelineStage::Failed);
    assert_eq!(last.severity, StatusSeverity::Error);
}
