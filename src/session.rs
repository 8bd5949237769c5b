//! Funded storage session
//!
//! A `StorageSession` represents one authenticated, funded connection to the
//! content-addressed storage network, scoped to a single signer identity.
//! The network SDK itself sits behind the [`StorageGateway`] trait; the
//! session adds the pieces the pipeline needs on top of it: readiness
//! verification, the proactive wallet check before funding, gateway URI
//! derivation, and a reservation ledger over the shared prepaid balance.
//!
//! ## Reservations
//!
//! The prepaid balance is shared by every run uploading through the same
//! session. A run reserves its quoted price before uploading and releases the
//! reservation when it reaches a terminal state, so two concurrent runs can
//! never both count the same balance as available. The ledger is owned by a
//! single task and mutated only through its command channel.

use std::collections::HashMap;
use std::sync::Arc;

use alloy_primitives::U256;
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chain::{ChainClient, Signer};
use crate::error::PublishError;
use crate::types::{Tag, UploadReceipt};

/// The storage network SDK boundary.
///
/// Implementations wrap the real bundler/gateway client. All amounts are in
/// the network's atomic units.
#[async_trait]
pub trait StorageGateway: Send + Sync {
    /// Address of the funded session account, if the gateway is ready.
    fn session_address(&self) -> Option<String>;

    /// Quote the price of uploading `byte_len` bytes. Pure query.
    async fn price(&self, byte_len: usize) -> Result<U256, PublishError>;

    /// Current prepaid balance of the session account.
    async fn balance(&self) -> Result<U256, PublishError>;

    /// Submit a funding transaction moving `amount` from the wallet into the
    /// prepaid balance. The effect is only observable on-chain after
    /// confirmation, not upon return.
    async fn fund(&self, amount: U256) -> Result<String, PublishError>;

    /// Upload a tagged payload, returning the storage network's content id.
    async fn upload(&self, bytes: Vec<u8>, tags: &[Tag]) -> Result<String, PublishError>;
}

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Public gateway base the content will be served from.
    pub gateway_base_url: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            gateway_base_url: "https://arweave.net".to_string(),
        }
    }
}

enum LedgerCommand {
    Reserve {
        id: Uuid,
        amount: U256,
        ack: oneshot::Sender<()>,
    },
    Release {
        id: Uuid,
    },
    OutstandingExcept {
        except: Option<Uuid>,
        reply: oneshot::Sender<U256>,
    },
}

/// A live claim against the session's prepaid balance. Released on drop.
pub struct BalanceReservation {
    id: Uuid,
    amount: U256,
    ledger: mpsc::UnboundedSender<LedgerCommand>,
}

impl BalanceReservation {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn amount(&self) -> U256 {
        self.amount
    }
}

impl Drop for BalanceReservation {
    fn drop(&mut self) {
        let _ = self.ledger.send(LedgerCommand::Release { id: self.id });
    }
}

/// One funded session against the storage network.
pub struct StorageSession {
    gateway: Arc<dyn StorageGateway>,
    chain: Arc<dyn ChainClient>,
    config: SessionConfig,
    /// Signer address, used as the `Uploader` tag and for wallet checks.
    uploader: String,
    ledger: mpsc::UnboundedSender<LedgerCommand>,
}

impl StorageSession {
    /// Verify the gateway is ready and build a session for the signer.
    pub async fn connect(
        gateway: Arc<dyn StorageGateway>,
        signer: Arc<dyn Signer>,
        chain: Arc<dyn ChainClient>,
        config: SessionConfig,
    ) -> Result<Self, PublishError> {
        let session_address = gateway.session_address().ok_or_else(|| {
            PublishError::SessionNotReady("storage gateway reported no session address".into())
        })?;

        let uploader = signer.address();
        if session_address != uploader {
            warn!(
                session_address = %session_address,
                uploader = %uploader,
                "Gateway session address differs from signer address"
            );
        }

        let (ledger_tx, ledger_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_ledger(ledger_rx));

        info!(uploader = %uploader, "Storage session ready");

        Ok(Self {
            gateway,
            chain,
            config,
            uploader,
            ledger: ledger_tx,
        })
    }

    /// Address uploads are attributed to.
    pub fn uploader_address(&self) -> &str {
        &self.uploader
    }

    /// Quote the upload price for a payload size. Pure query.
    pub async fn quote_price(&self, byte_len: usize) -> Result<U256, PublishError> {
        self.gateway.price(byte_len).await
    }

    /// Raw prepaid balance, ignoring reservations.
    pub async fn current_balance(&self) -> Result<U256, PublishError> {
        self.gateway.balance().await
    }

    /// Prepaid balance minus reservations held by other runs. A run passes
    /// its own reservation so its claim does not count against itself.
    pub async fn available_balance(
        &self,
        own: Option<&BalanceReservation>,
    ) -> Result<U256, PublishError> {
        let balance = self.gateway.balance().await?;
        let reserved = self.outstanding_except(own.map(|r| r.id())).await;
        Ok(balance.saturating_sub(reserved))
    }

    /// Reserve `amount` against the prepaid balance until the guard drops.
    pub async fn reserve(&self, amount: U256) -> BalanceReservation {
        let id = Uuid::new_v4();
        let (ack_tx, ack_rx) = oneshot::channel();
        let _ = self.ledger.send(LedgerCommand::Reserve {
            id,
            amount,
            ack: ack_tx,
        });
        // The ledger task only stops when the session is dropped.
        let _ = ack_rx.await;
        debug!(reservation = %id, amount = %amount, "Reserved against prepaid balance");
        BalanceReservation {
            id,
            amount,
            ledger: self.ledger.clone(),
        }
    }

    /// Native balance of the signer wallet, in lamports.
    pub async fn wallet_native_balance(&self) -> Result<u64, PublishError> {
        self.chain.native_balance(&self.uploader).await
    }

    /// Submit a funding transaction for `amount`.
    ///
    /// The wallet's native balance is checked first; a wallet with nothing to
    /// spend fails without touching the network, since the submission would
    /// certainly fail.
    pub async fn fund(&self, amount: U256) -> Result<String, PublishError> {
        let native = self.wallet_native_balance().await?;
        debug!(lamports = native, "Wallet native balance");
        if native == 0 {
            return Err(PublishError::InsufficientSourceFunds);
        }

        let tx_id = self.gateway.fund(amount).await?;
        info!(tx_id = %tx_id, amount = %amount, "Funding transaction submitted");
        Ok(tx_id)
    }

    /// Upload a tagged payload and derive its public gateway URI.
    pub async fn upload(
        &self,
        bytes: Vec<u8>,
        tags: &[Tag],
    ) -> Result<UploadReceipt, PublishError> {
        let content_id = self.gateway.upload(bytes, tags).await?;
        let uri = format!(
            "{}/{}",
            self.config.gateway_base_url.trim_end_matches('/'),
            content_id
        );
        info!(content_id = %content_id, "Upload complete");
        Ok(UploadReceipt { content_id, uri })
    }

    async fn outstanding_except(&self, except: Option<Uuid>) -> U256 {
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self.ledger.send(LedgerCommand::OutstandingExcept {
            except,
            reply: reply_tx,
        });
        reply_rx.await.unwrap_or(U256::ZERO)
    }
}

/// Single-owner mutation loop for the reservation ledger.
async fn run_ledger(mut rx: mpsc::UnboundedReceiver<LedgerCommand>) {
    let mut reservations: HashMap<Uuid, U256> = HashMap::new();

    while let Some(command) = rx.recv().await {
        match command {
            LedgerCommand::Reserve { id, amount, ack } => {
                reservations.insert(id, amount);
                let _ = ack.send(());
            }
            LedgerCommand::Release { id } => {
                if reservations.remove(&id).is_some() {
                    debug!(reservation = %id, "Released reservation");
                }
            }
            LedgerCommand::OutstandingExcept { except, reply } => {
                let total = reservations
                    .iter()
                    .filter(|(id, _)| Some(**id) != except)
                    .fold(U256::ZERO, |acc, (_, amount)| acc.saturating_add(*amount));
                let _ = reply.send(total);
            }
        }
    }
}
