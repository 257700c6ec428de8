// ── Change feeds ──
//
// A `ChangeSource` provides two things per table: a one-shot snapshot
// of rows and a subscription to row changes. `LiveView` combines them
// into a reconciled, observable collection.

mod backend;
mod live_view;

use async_trait::async_trait;
use serde_json::Value;
use stayboard_api::{ChannelStatus, RowFilter};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::CoreError;
use crate::model::{ChangeEvent, EntityKind};

pub use backend::BackendChangeSource;
pub use live_view::{FeedStatus, LiveView};

/// What to fetch or subscribe to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub kind: EntityKind,
    pub filter: Option<RowFilter>,
}

impl Topic {
    pub fn table(kind: EntityKind) -> Self {
        Self { kind, filter: None }
    }

    #[must_use]
    pub fn with_filter(mut self, filter: Option<RowFilter>) -> Self {
        self.filter = filter;
        self
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.filter {
            Some(filter) => write!(f, "{}[{filter}]", self.kind.table()),
            None => f.write_str(self.kind.table()),
        }
    }
}

/// One item delivered on a subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    Status(ChannelStatus),
    Change(ChangeEvent<Value>),
}

/// Receiving end of one change subscription.
///
/// Closing is idempotent; dropping the subscription closes it.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<FeedMessage>,
    cancel: CancellationToken,
}

impl Subscription {
    /// Build a subscription from a channel and the token that stops
    /// whatever feeds it.
    pub fn new(rx: mpsc::UnboundedReceiver<FeedMessage>, cancel: CancellationToken) -> Self {
        Self { rx, cancel }
    }

    pub async fn recv(&mut self) -> Option<FeedMessage> {
        self.rx.recv().await
    }

    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Provider of table snapshots and change subscriptions.
#[async_trait]
pub trait ChangeSource: Send + Sync {
    /// Fetch the current rows of `topic` as raw records.
    async fn snapshot(&self, topic: &Topic) -> Result<Vec<Value>, CoreError>;

    /// Start receiving changes for `topic`. Events that arrive before
    /// the caller starts reading are buffered.
    async fn subscribe(&self, topic: &Topic) -> Result<Subscription, CoreError>;
}
