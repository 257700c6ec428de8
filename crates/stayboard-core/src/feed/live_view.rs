// ── Live views ──
//
// Subscribe first, then fetch the snapshot, then drain buffered and
// live events into a `ReactiveCollection`. Events that race the
// snapshot sit in the subscription buffer until the snapshot is loaded.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use stayboard_api::ChannelStatus;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ChangeSource, FeedMessage, Subscription, Topic};
use crate::access::Viewer;
use crate::config::ResubscribePolicy;
use crate::convert::decode_record;
use crate::error::CoreError;
use crate::model::{ChangeEvent, Entity, EntityId, EntityKind};
use crate::store::ReactiveCollection;
use crate::stream::EntityStream;

/// Subscription health of a live view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum FeedStatus {
    /// Waiting for the channel join to be acknowledged.
    Connecting,
    Subscribed,
    /// Lost the channel; a new one is being opened.
    Resubscribing,
    /// Gave up reconnecting. Data is frozen at its last known state.
    Stale,
    Closed,
}

/// A reconciled, observable view of one table for one viewer.
///
/// Dropping the view cancels its subscription; `close` additionally
/// waits for the background task to finish.
pub struct LiveView<T: Entity> {
    collection: Arc<ReactiveCollection<T>>,
    viewer: Arc<Viewer>,
    status: watch::Receiver<FeedStatus>,
    degraded: watch::Receiver<bool>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Entity> LiveView<T> {
    /// Open a live view. Fails if the subscription cannot be started or
    /// the initial snapshot cannot be fetched.
    pub async fn open(
        source: Arc<dyn ChangeSource>,
        viewer: Arc<Viewer>,
        policy: ResubscribePolicy,
    ) -> Result<Self, CoreError> {
        // Broadcast channels are table-wide; visibility is applied here.
        let topic = Topic::table(T::KIND);
        let collection = Arc::new(ReactiveCollection::new());
        let mut reconciler = Reconciler {
            collection: Arc::clone(&collection),
            viewer: Arc::clone(&viewer),
            tombstones: HashSet::new(),
        };

        let subscription = source.subscribe(&topic).await?;
        let ownership = viewer.directory().changes();
        let rows = fetch_snapshot(source.as_ref(), &viewer, &topic).await?;
        reconciler.load(rows);
        info!(%topic, count = collection.len(), "live view loaded");

        let (status_tx, status) = watch::channel(FeedStatus::Connecting);
        let (degraded_tx, degraded) = watch::channel(false);
        let cancel = CancellationToken::new();

        let task = FeedTask {
            source,
            topic,
            reconciler,
            policy,
            ownership,
            status: status_tx,
            degraded: degraded_tx,
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(task.run(subscription));

        Ok(Self {
            collection,
            viewer,
            status,
            degraded,
            cancel,
            task: Mutex::new(Some(handle)),
        })
    }

    pub fn collection(&self) -> &Arc<ReactiveCollection<T>> {
        &self.collection
    }

    pub fn all(&self) -> Arc<Vec<Arc<T>>> {
        self.collection.all()
    }

    pub fn get(&self, id: &EntityId) -> Option<Arc<T>> {
        self.collection.get(id)
    }

    pub fn subscribe(&self) -> EntityStream<T> {
        EntityStream::new(self.collection.subscribe())
    }

    pub fn status(&self) -> watch::Receiver<FeedStatus> {
        self.status.clone()
    }

    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Flips to `true` while the subscription is down.
    pub fn degraded(&self) -> watch::Receiver<bool> {
        self.degraded.clone()
    }

    /// Optimistically apply a local mutation before the backend echoes it.
    /// The echo, when it arrives, is reconciled like any other event.
    pub fn apply_local(&self, entity: T) {
        self.viewer.directory().observe(&entity);
        if self.viewer.can_see(&entity) {
            self.collection.upsert(entity);
        } else {
            self.collection.remove(entity.id());
        }
    }

    /// Stop the subscription and wait for the background task. Idempotent.
    pub async fn close(&self) {
        self.cancel.cancel();
        let handle = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

impl<T: Entity> Drop for LiveView<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn fetch_snapshot(
    source: &dyn ChangeSource,
    viewer: &Viewer,
    topic: &Topic,
) -> Result<Vec<Value>, CoreError> {
    let filtered = topic.clone().with_filter(viewer.fetch_filter(topic.kind));
    source.snapshot(&filtered).await
}

// ── Reconciliation ───────────────────────────────────────────────────

struct Reconciler<T: Entity> {
    collection: Arc<ReactiveCollection<T>>,
    viewer: Arc<Viewer>,
    /// Ids deleted since the last snapshot. Late updates for them are
    /// dropped.
    tombstones: HashSet<EntityId>,
}

impl<T: Entity> Reconciler<T> {
    /// Replace the collection with a fresh snapshot.
    fn load(&mut self, rows: Vec<Value>) {
        let directory = self.viewer.directory();
        let entities: Vec<T> = rows
            .into_iter()
            .filter_map(|row| {
                decode_record::<T>(row)
                    .map_err(|e| warn!(error = %e, "skipping undecodable row"))
                    .ok()
            })
            .inspect(|entity| directory.observe(entity))
            .collect();

        // A row present in the snapshot exists again; keep only deletes
        // the snapshot agrees with.
        let present: HashSet<&EntityId> = entities.iter().map(Entity::id).collect();
        self.tombstones.retain(|id| !present.contains(id));

        let visible = entities.into_iter().filter(|e| self.viewer.can_see(e));
        self.collection.replace_all(visible);
    }

    /// Drop rows the viewer can no longer see. Returns how many went.
    fn refilter(&self) -> usize {
        self.collection.retain(|entity| self.viewer.can_see(entity))
    }

    fn apply_raw(&mut self, event: ChangeEvent<Value>) {
        match event.decode::<T>() {
            Ok(event) => self.apply(event),
            Err(e) => warn!(kind = %T::KIND, error = %e, "dropping undecodable change"),
        }
    }

    fn apply(&mut self, event: ChangeEvent<T>) {
        match event {
            ChangeEvent::Insert(entity) => {
                self.viewer.directory().observe(&entity);
                self.tombstones.remove(entity.id());
                if self.viewer.can_see(&entity) {
                    self.collection.upsert(entity);
                }
            }
            ChangeEvent::Update {
                entity,
                previous_id,
            } => {
                if self.tombstones.contains(entity.id()) {
                    debug!(id = %entity.id(), "ignoring update for deleted row");
                    return;
                }
                self.viewer.directory().observe(&entity);
                if let Some(previous) = previous_id {
                    self.collection.remove(&previous);
                }
                if self.viewer.can_see(&entity) {
                    self.collection.upsert(entity);
                } else {
                    self.collection.remove(entity.id());
                }
            }
            ChangeEvent::Delete { id } => {
                if T::KIND == EntityKind::Listing {
                    self.viewer.directory().forget(&id);
                }
                self.collection.remove(&id);
                self.tombstones.insert(id);
            }
        }
    }
}

// ── Background task ──────────────────────────────────────────────────

enum Loss {
    /// Join was not acknowledged in time. Always retried.
    TimedOut,
    /// Error or close. Retried within the policy budget.
    Failed(String),
}

struct FeedTask<T: Entity> {
    source: Arc<dyn ChangeSource>,
    topic: Topic,
    reconciler: Reconciler<T>,
    policy: ResubscribePolicy,
    /// Listing ownership revisions from the viewer's directory.
    ownership: watch::Receiver<u64>,
    status: watch::Sender<FeedStatus>,
    degraded: watch::Sender<bool>,
    cancel: CancellationToken,
}

impl<T: Entity> FeedTask<T> {
    async fn run(mut self, mut subscription: Subscription) {
        let cancel = self.cancel.clone();
        let mut error_retries = 0u32;

        loop {
            let loss = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                loss = self.pump(&mut subscription, &mut error_retries) => loss,
            };
            subscription.close();
            self.degraded.send_replace(true);

            let mut pending = loss;
            subscription = loop {
                if let Loss::Failed(reason) = &pending {
                    if error_retries >= self.policy.max_error_retries {
                        warn!(topic = %self.topic, %reason, "subscription lost, view is stale");
                        self.status.send_replace(FeedStatus::Stale);
                        return;
                    }
                    error_retries += 1;
                }
                self.status.send_replace(FeedStatus::Resubscribing);
                info!(topic = %self.topic, delay = ?self.policy.delay, "resubscribing");

                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        self.status.send_replace(FeedStatus::Closed);
                        return;
                    }
                    () = tokio::time::sleep(self.policy.delay) => {}
                }

                match self.reopen().await {
                    Ok(next) => break next,
                    Err(e) => pending = Loss::Failed(e.to_string()),
                }
            };
        }

        subscription.close();
        self.status.send_replace(FeedStatus::Closed);
        debug!(topic = %self.topic, "live view closed");
    }

    /// Drain messages until the subscription is lost.
    async fn pump(&mut self, subscription: &mut Subscription, error_retries: &mut u32) -> Loss {
        loop {
            let message = tokio::select! {
                message = subscription.recv() => message,
                Ok(()) = self.ownership.changed() => {
                    self.ownership_changed().await;
                    continue;
                }
            };
            match message {
                Some(FeedMessage::Change(event)) => self.reconciler.apply_raw(event),
                Some(FeedMessage::Status(ChannelStatus::Connecting)) => {}
                Some(FeedMessage::Status(ChannelStatus::Subscribed)) => {
                    *error_retries = 0;
                    self.status.send_replace(FeedStatus::Subscribed);
                    self.degraded.send_replace(false);
                }
                Some(FeedMessage::Status(ChannelStatus::TimedOut)) => return Loss::TimedOut,
                Some(FeedMessage::Status(ChannelStatus::Error(reason))) => {
                    return Loss::Failed(reason);
                }
                Some(FeedMessage::Status(ChannelStatus::Closed)) | None => {
                    return Loss::Failed("channel closed".into());
                }
            }
        }
    }

    /// A listing changed owner. Rows that fell out of scope go at once;
    /// child tables also refetch, since rows that came into scope were
    /// never fetched.
    async fn ownership_changed(&mut self) {
        let dropped = self.reconciler.refilter();
        debug!(topic = %self.topic, dropped, "listing ownership changed");
        if T::KIND == EntityKind::Listing {
            return;
        }
        match fetch_snapshot(self.source.as_ref(), &self.reconciler.viewer, &self.topic).await {
            Ok(rows) => self.reconciler.load(rows),
            Err(e) => warn!(topic = %self.topic, error = %e, "resync after ownership change failed"),
        }
    }

    /// Open a new subscription and resync from a fresh snapshot.
    async fn reopen(&mut self) -> Result<Subscription, CoreError> {
        let subscription = self.source.subscribe(&self.topic).await?;
        let rows = fetch_snapshot(
            self.source.as_ref(),
            &self.reconciler.viewer,
            &self.topic,
        )
        .await?;
        self.reconciler.load(rows);
        Ok(subscription)
    }
}
