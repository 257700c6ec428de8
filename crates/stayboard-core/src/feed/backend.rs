// ── Backend-backed change source ──

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use stayboard_api::{
    BackendClient, ChannelSpec, ChannelStatus, RealtimeChannel, RealtimeConfig, RealtimeMessage,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{ChangeSource, FeedMessage, Subscription, Topic};
use crate::config::RealtimeTuning;
use crate::convert::decode_change;
use crate::error::CoreError;

/// `ChangeSource` over the hosted backend's REST and realtime APIs.
#[derive(Clone)]
pub struct BackendChangeSource {
    client: Arc<BackendClient>,
    tuning: RealtimeTuning,
    /// Parent of every subscription this source opens.
    cancel: CancellationToken,
}

impl BackendChangeSource {
    pub fn new(client: Arc<BackendClient>, tuning: RealtimeTuning) -> Self {
        Self {
            client,
            tuning,
            cancel: CancellationToken::new(),
        }
    }

    /// Close every subscription opened through this source.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

#[async_trait]
impl ChangeSource for BackendChangeSource {
    async fn snapshot(&self, topic: &Topic) -> Result<Vec<Value>, CoreError> {
        let rows: Vec<Value> = self
            .client
            .select_rows(topic.kind.table(), topic.filter.as_ref())
            .await?;
        debug!(%topic, count = rows.len(), "snapshot fetched");
        Ok(rows)
    }

    async fn subscribe(&self, topic: &Topic) -> Result<Subscription, CoreError> {
        let ws_url = self.client.realtime_url()?;
        let mut spec = ChannelSpec::table(topic.kind.table());
        if let Some(filter) = &topic.filter {
            spec = spec.with_filter(filter.clone());
        }
        let config = RealtimeConfig {
            join_timeout: self.tuning.join_timeout,
            heartbeat_interval: self.tuning.heartbeat_interval,
            access_token: None,
        };

        let cancel = self.cancel.child_token();
        let mut channel = RealtimeChannel::open(ws_url, spec, config, cancel.clone());
        let (tx, rx) = mpsc::unbounded_channel();
        let task_cancel = cancel.clone();
        let table = topic.kind.table();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = task_cancel.cancelled() => break,
                    msg = channel.recv() => {
                        let forwarded = match msg {
                            Some(RealtimeMessage::Status(status)) => FeedMessage::Status(status),
                            Some(RealtimeMessage::Change(change)) => match decode_change(change) {
                                Ok(event) => FeedMessage::Change(event),
                                Err(e) => {
                                    warn!(table, error = %e, "dropping malformed change");
                                    continue;
                                }
                            },
                            None => {
                                let _ = tx.send(FeedMessage::Status(ChannelStatus::Closed));
                                break;
                            }
                        };
                        if tx.send(forwarded).is_err() {
                            break;
                        }
                    }
                }
            }
            channel.close();
        });

        Ok(Subscription::new(rx, cancel))
    }
}
