//! Royalty event stream client
//!
//! Maintains one long-lived WebSocket connection to the royalty-distribution
//! service per active wallet identity. On connect the client registers the
//! wallet so the server routes only that wallet's events to this connection,
//! then keeps the link alive with periodic pings and buffers incoming events
//! newest-first in a bounded feed.
//!
//! The connection is supervised: transport errors and server-initiated
//! closes trigger a reconnect with capped exponential backoff and jitter,
//! and the registration message is re-sent after every reconnect. The
//! supervisor stops only on [`RoyaltyStreamClient::shutdown`] — the
//! identity-unavailable transition — which closes the socket immediately and
//! clears the local feed.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::error::StreamError;
use crate::types::RoyaltyEvent;

type WsConnection = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Messages sent to the royalty service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    RegisterWallet {
        #[serde(rename = "walletAddress")]
        wallet_address: String,
    },
    Ping,
}

/// Messages received from the royalty service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    RoyaltyEvent { event: RoyaltyEvent },
    Connection { message: String },
}

/// Stream client configuration.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// WebSocket endpoint of the royalty service.
    pub endpoint: String,
    /// Keep-alive ping interval.
    pub ping_interval: Duration,
    /// First reconnect delay; doubles per failure up to the cap.
    pub initial_reconnect_delay: Duration,
    pub max_reconnect_delay: Duration,
    /// Feed capacity; oldest events are evicted on overflow.
    pub feed_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://localhost:3001".to_string(),
            ping_interval: Duration::from_secs(30),
            initial_reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(30),
            feed_capacity: 200,
        }
    }
}

/// Supervised royalty stream connection for one wallet.
pub struct RoyaltyStreamClient {
    wallet: String,
    feed: Arc<RwLock<VecDeque<RoyaltyEvent>>>,
    connected: Arc<RwLock<bool>>,
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl RoyaltyStreamClient {
    /// Start the supervised connection for a wallet address.
    pub fn connect(wallet: impl Into<String>, config: StreamConfig) -> Self {
        let wallet = wallet.into();
        let feed = Arc::new(RwLock::new(VecDeque::new()));
        let connected = Arc::new(RwLock::new(false));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(supervise(
            wallet.clone(),
            config,
            Arc::clone(&feed),
            Arc::clone(&connected),
            shutdown_rx,
        ));

        Self {
            wallet,
            feed,
            connected,
            shutdown_tx,
            task: Some(task),
        }
    }

    pub fn wallet(&self) -> &str {
        &self.wallet
    }

    pub async fn is_connected(&self) -> bool {
        *self.connected.read().await
    }

    /// Snapshot of the buffered events, newest first.
    pub async fn events(&self) -> Vec<RoyaltyEvent> {
        self.feed.read().await.iter().cloned().collect()
    }

    /// Close the connection and clear the local feed. Called when the wallet
    /// identity becomes unavailable; no further pings or reconnects happen
    /// after this returns.
    pub async fn shutdown(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        self.feed.write().await.clear();
        *self.connected.write().await = false;
        info!(wallet = %self.wallet, "Royalty stream shut down");
    }
}

fn endpoint_url(endpoint: &str, wallet: &str) -> Result<String, StreamError> {
    let mut url = url::Url::parse(endpoint)
        .map_err(|e| StreamError::Connect(format!("bad endpoint {endpoint}: {e}")))?;
    url.query_pairs_mut().append_pair("wallet", wallet);
    Ok(url.to_string())
}

fn jittered(base: Duration) -> Duration {
    let half = (base.as_millis() as u64 / 2).max(1);
    base + Duration::from_millis(rand::thread_rng().gen_range(0..half))
}

/// Supervision loop: connect, register, run the session, back off, repeat.
async fn supervise(
    wallet: String,
    config: StreamConfig,
    feed: Arc<RwLock<VecDeque<RoyaltyEvent>>>,
    connected: Arc<RwLock<bool>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let url = match endpoint_url(&config.endpoint, &wallet) {
        Ok(url) => url,
        Err(e) => {
            error!(error = %e, "Royalty stream endpoint is unusable");
            return;
        }
    };
    let register_frame = match serde_json::to_string(&ClientMessage::RegisterWallet {
        wallet_address: wallet.clone(),
    }) {
        Ok(frame) => frame,
        Err(e) => {
            error!(error = %e, "Failed to encode registration message");
            return;
        }
    };

    let mut reconnect_delay = config.initial_reconnect_delay;

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        info!(url = %url, "Connecting to royalty stream");
        match connect_async(url.as_str()).await {
            Ok((mut ws, _)) => {
                // Register so the server filters events to this wallet; the
                // registration is re-sent after every reconnect.
                if let Err(e) = ws.send(Message::Text(register_frame.clone())).await {
                    warn!(error = %e, "Failed to register wallet on royalty stream");
                } else {
                    info!(wallet = %wallet, "Royalty stream connected and registered");
                    *connected.write().await = true;
                    reconnect_delay = config.initial_reconnect_delay;

                    let shutdown = run_session(&mut ws, &feed, &config, &mut shutdown_rx).await;
                    *connected.write().await = false;

                    if shutdown {
                        let _ = ws.close(None).await;
                        break;
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Royalty stream connect failed");
            }
        }

        let delay = jittered(reconnect_delay);
        warn!(delay_ms = delay.as_millis() as u64, "Reconnecting to royalty stream");
        tokio::select! {
            _ = sleep(delay) => {}
            changed = shutdown_rx.changed() => {
                // A dropped handle counts as shutdown.
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
        reconnect_delay = (reconnect_delay * 2).min(config.max_reconnect_delay);
    }

    *connected.write().await = false;
}

/// One connected session. Returns true when shutdown was requested, false on
/// transport error or server close (the supervisor then reconnects).
async fn run_session(
    ws: &mut WsConnection,
    feed: &Arc<RwLock<VecDeque<RoyaltyEvent>>>,
    config: &StreamConfig,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> bool {
    let ping_frame = match serde_json::to_string(&ClientMessage::Ping) {
        Ok(frame) => frame,
        Err(_) => return false,
    };
    // First tick after one full interval, not immediately on connect.
    let mut ping = interval_at(Instant::now() + config.ping_interval, config.ping_interval);

    loop {
        tokio::select! {
            message = ws.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    handle_frame(&text, feed, config.feed_capacity).await;
                }
                Some(Ok(Message::Ping(payload))) => {
                    let _ = ws.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Close(frame))) => {
                    info!(?frame, "Royalty stream closed by server");
                    return false;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "Royalty stream transport error");
                    return false;
                }
                None => return false,
            },
            _ = ping.tick() => {
                // The send doubles as the open-check: a socket that closed
                // since the last tick errors here instead of racing a flag.
                if let Err(e) = ws.send(Message::Text(ping_frame.clone())).await {
                    warn!(error = %e, "Keep-alive ping failed");
                    return false;
                }
                debug!("Sent keep-alive ping");
            }
            changed = shutdown_rx.changed() => {
                // A dropped handle counts as shutdown.
                if changed.is_err() || *shutdown_rx.borrow() {
                    return true;
                }
            }
        }
    }
}

async fn handle_frame(
    text: &str,
    feed: &Arc<RwLock<VecDeque<RoyaltyEvent>>>,
    capacity: usize,
) {
    match serde_json::from_str::<ServerMessage>(text) {
        Ok(ServerMessage::RoyaltyEvent { event }) => {
            info!(
                id = %event.id,
                amount = event.amount,
                certificate = %event.certificate_title,
                "Received royalty event"
            );
            let mut feed = feed.write().await;
            feed.push_front(event);
            feed.truncate(capacity);
        }
        Ok(ServerMessage::Connection { message }) => {
            debug!(message = %message, "Royalty stream connection message");
        }
        Err(e) => {
            warn!(error = %e, "Unparseable royalty stream frame");
        }
    }
}
