//! Realtime change channel over WebSocket.
//!
//! Opens one channel subscription against the backend's realtime endpoint
//! (Phoenix v1 JSON framing) and streams status transitions plus row
//! changes through an unbounded [`tokio::sync::mpsc`] channel, in arrival
//! order. A subscription covers exactly one connection attempt: when it
//! times out, errors or closes, the terminal status is emitted and the task
//! ends. Re-subscription policy belongs to the caller.
//!
//! # Example
//!
//! ```rust,ignore
//! use stayboard_api::realtime::{ChannelSpec, RealtimeChannel, RealtimeConfig, RealtimeMessage};
//! use tokio_util::sync::CancellationToken;
//!
//! let spec = ChannelSpec::table("guests");
//! let mut sub = RealtimeChannel::open(url, spec, RealtimeConfig::default(), CancellationToken::new());
//!
//! while let Some(msg) = sub.recv().await {
//!     match msg {
//!         RealtimeMessage::Status(s) => println!("status: {s:?}"),
//!         RealtimeMessage::Change(c) => println!("{} on {}", c.event_type, c.table),
//!     }
//! }
//! ```

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::backend::RowFilter;
use crate::error::Error;
use crate::models::RowChange;

const HEARTBEAT_TOPIC: &str = "phoenix";

// ── Channel description ─────────────────────────────────────────────

/// What to subscribe to: one table, optionally filtered server-side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    pub schema: String,
    pub table: String,
    pub filter: Option<RowFilter>,
}

impl ChannelSpec {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            schema: "public".into(),
            table: table.into(),
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: RowFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Channel topic, e.g. `realtime:public:guests`.
    pub fn topic(&self) -> String {
        match self.filter {
            Some(ref f) => format!("realtime:{}:{}:{f}", self.schema, self.table),
            None => format!("realtime:{}:{}", self.schema, self.table),
        }
    }
}

// ── Configuration ───────────────────────────────────────────────────

/// Timing knobs for one realtime subscription.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// How long to wait for the join reply before reporting `TimedOut`.
    pub join_timeout: Duration,
    /// Interval between protocol heartbeats.
    pub heartbeat_interval: Duration,
    /// Access token sent with the join payload.
    pub access_token: Option<String>,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            join_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(30),
            access_token: None,
        }
    }
}

// ── Messages ────────────────────────────────────────────────────────

/// Channel lifecycle as seen by the subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStatus {
    Connecting,
    Subscribed,
    Error(String),
    TimedOut,
    Closed,
}

/// One item delivered on a subscription.
#[derive(Debug, Clone)]
pub enum RealtimeMessage {
    Status(ChannelStatus),
    Change(RowChange),
}

// ── Subscription handle ─────────────────────────────────────────────

/// Receiving end of one realtime subscription.
///
/// Dropping the subscription cancels the background task.
pub struct RealtimeSubscription {
    rx: mpsc::UnboundedReceiver<RealtimeMessage>,
    cancel: CancellationToken,
}

impl RealtimeSubscription {
    /// Next message, or `None` once the task has exited and the buffer
    /// is drained.
    pub async fn recv(&mut self) -> Option<RealtimeMessage> {
        self.rx.recv().await
    }

    /// Stop the background task. Idempotent.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for RealtimeSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Entry point for opening realtime subscriptions.
pub struct RealtimeChannel;

impl RealtimeChannel {
    /// Spawn a subscription task and return its receiving end.
    ///
    /// Returns immediately; the first message is `Status(Connecting)`.
    pub fn open(
        ws_url: Url,
        spec: ChannelSpec,
        config: RealtimeConfig,
        cancel: CancellationToken,
    ) -> RealtimeSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let task_cancel = cancel.clone();

        tokio::spawn(async move {
            let _ = tx.send(RealtimeMessage::Status(ChannelStatus::Connecting));
            let status = match run_channel(&ws_url, &spec, &config, &tx, &task_cancel).await {
                Ok(status) => status,
                Err(e) => {
                    tracing::warn!(error = %e, table = %spec.table, "realtime channel failed");
                    ChannelStatus::Error(e.to_string())
                }
            };
            tracing::debug!(?status, table = %spec.table, "realtime channel finished");
            let _ = tx.send(RealtimeMessage::Status(status));
        });

        RealtimeSubscription { rx, cancel }
    }
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Connect, join the channel and forward frames until the channel ends.
///
/// Returns the terminal status on a protocol-level outcome; transport
/// failures come back as `Err`.
async fn run_channel(
    url: &Url,
    spec: &ChannelSpec,
    config: &RealtimeConfig,
    tx: &mpsc::UnboundedSender<RealtimeMessage>,
    cancel: &CancellationToken,
) -> Result<ChannelStatus, Error> {
    tracing::info!(table = %spec.table, "connecting realtime channel");

    let (ws_stream, _response) = tokio::select! {
        biased;
        () = cancel.cancelled() => return Ok(ChannelStatus::Closed),
        res = tokio_tungstenite::connect_async(url.as_str()) => {
            res.map_err(|e| Error::RealtimeConnect(e.to_string()))?
        }
    };
    let (mut write, mut read) = ws_stream.split();

    let topic = spec.topic();
    let mut next_ref: u64 = 1;
    let join_ref = next_ref.to_string();
    write
        .send(tungstenite::Message::text(join_frame(
            &topic,
            spec,
            config.access_token.as_deref(),
            &join_ref,
        )))
        .await
        .map_err(|e| Error::RealtimeConnect(e.to_string()))?;

    let mut joined = false;
    let join_deadline = tokio::time::sleep(config.join_timeout);
    tokio::pin!(join_deadline);

    let mut heartbeat = tokio::time::interval(config.heartbeat_interval);
    heartbeat.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let _ = write.send(tungstenite::Message::Close(None)).await;
                return Ok(ChannelStatus::Closed);
            }
            () = &mut join_deadline, if !joined => {
                tracing::warn!(topic, "realtime join timed out");
                return Ok(ChannelStatus::TimedOut);
            }
            _ = heartbeat.tick() => {
                next_ref += 1;
                write
                    .send(tungstenite::Message::text(heartbeat_frame(&next_ref.to_string())))
                    .await
                    .map_err(|e| Error::RealtimeConnect(e.to_string()))?;
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        match parse_frame(&text, &topic) {
                            Inbound::JoinOk => {
                                if !joined {
                                    joined = true;
                                    let _ = tx.send(RealtimeMessage::Status(ChannelStatus::Subscribed));
                                }
                            }
                            Inbound::JoinRejected(reason) => return Ok(ChannelStatus::Error(reason)),
                            Inbound::Changes(changes) => {
                                for change in changes {
                                    let _ = tx.send(RealtimeMessage::Change(change));
                                }
                            }
                            Inbound::ChannelError(reason) => return Ok(ChannelStatus::Error(reason)),
                            Inbound::ChannelClosed => return Ok(ChannelStatus::Closed),
                            Inbound::Ignored => {}
                        }
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        if let Some(ref cf) = frame {
                            tracing::info!(code = %cf.code, reason = %cf.reason, "realtime close frame received");
                            return Err(Error::RealtimeClosed {
                                code: cf.code.into(),
                                reason: cf.reason.to_string(),
                            });
                        }
                        return Ok(ChannelStatus::Closed);
                    }
                    Some(Err(e)) => return Err(Error::RealtimeConnect(e.to_string())),
                    None => {
                        tracing::info!("realtime stream ended");
                        return Ok(ChannelStatus::Closed);
                    }
                    Some(Ok(_)) => {
                        // Binary, Ping, Pong, Frame -- ignore
                    }
                }
            }
        }
    }
}

// ── Frame encoding ──────────────────────────────────────────────────

fn join_frame(topic: &str, spec: &ChannelSpec, access_token: Option<&str>, msg_ref: &str) -> String {
    let mut change = json!({
        "event": "*",
        "schema": spec.schema,
        "table": spec.table,
    });
    if let Some(ref filter) = spec.filter {
        change["filter"] = json!(filter.to_string());
    }
    let mut payload = json!({
        "config": { "postgres_changes": [change] },
    });
    if let Some(token) = access_token {
        payload["access_token"] = json!(token);
    }
    json!({
        "topic": topic,
        "event": "phx_join",
        "payload": payload,
        "ref": msg_ref,
        "join_ref": msg_ref,
    })
    .to_string()
}

fn heartbeat_frame(msg_ref: &str) -> String {
    json!({
        "topic": HEARTBEAT_TOPIC,
        "event": "heartbeat",
        "payload": {},
        "ref": msg_ref,
    })
    .to_string()
}

// ── Frame parsing ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Envelope {
    topic: String,
    event: String,
    #[serde(default)]
    payload: serde_json::Value,
}

/// Classified inbound frame.
#[derive(Debug)]
enum Inbound {
    JoinOk,
    JoinRejected(String),
    Changes(Vec<RowChange>),
    ChannelError(String),
    ChannelClosed,
    Ignored,
}

/// Classify one text frame for the given channel topic.
fn parse_frame(text: &str, topic: &str) -> Inbound {
    let envelope: Envelope = match serde_json::from_str(text) {
        Ok(e) => e,
        Err(e) => {
            tracing::debug!(error = %e, "failed to parse realtime envelope");
            return Inbound::Ignored;
        }
    };
    if envelope.topic != topic {
        // Heartbeat replies and other channels on the same socket.
        return Inbound::Ignored;
    }

    match envelope.event.as_str() {
        "phx_reply" => {
            let status = envelope.payload["status"].as_str().unwrap_or("");
            if status == "ok" {
                Inbound::JoinOk
            } else {
                let reason = envelope.payload["response"]["reason"]
                    .as_str()
                    .unwrap_or(status)
                    .to_owned();
                Inbound::JoinRejected(reason)
            }
        }
        "postgres_changes" => {
            // Either a single change under `data` or a batch under `ids`/`data`.
            let data = &envelope.payload["data"];
            let items: Vec<serde_json::Value> = match data {
                serde_json::Value::Array(arr) => arr.clone(),
                serde_json::Value::Null => Vec::new(),
                other => vec![other.clone()],
            };
            let changes = items
                .into_iter()
                .filter_map(|v| match serde_json::from_value::<RowChange>(v) {
                    Ok(c) => Some(c),
                    Err(e) => {
                        tracing::debug!(error = %e, "undecodable row change skipped");
                        None
                    }
                })
                .collect();
            Inbound::Changes(changes)
        }
        "phx_error" => Inbound::ChannelError(
            envelope.payload["reason"]
                .as_str()
                .unwrap_or("channel error")
                .to_owned(),
        ),
        "phx_close" => Inbound::ChannelClosed,
        _ => Inbound::Ignored,
    }
}

// ── Tests ────────────────────────────────────────────────────────────
