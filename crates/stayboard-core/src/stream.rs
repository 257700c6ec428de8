// ── Collection updates ──
//
// What a consumer holds to follow a live view: the snapshot it last saw
// and a receiver for the next one.

use std::sync::Arc;

use tokio::sync::watch;

type Snapshot<T> = Arc<Vec<Arc<T>>>;

/// Follows a collection one snapshot at a time.
pub struct EntityStream<T: Send + Sync + 'static> {
    seen: Snapshot<T>,
    updates: watch::Receiver<Snapshot<T>>,
}

impl<T: Send + Sync + 'static> EntityStream<T> {
    pub(crate) fn new(mut updates: watch::Receiver<Snapshot<T>>) -> Self {
        let seen = updates.borrow_and_update().clone();
        Self { seen, updates }
    }

    /// The snapshot returned by the last `changed()`, or the one current
    /// when the stream was created.
    pub fn current(&self) -> &Snapshot<T> {
        &self.seen
    }

    /// Wait for the collection to change. Intermediate snapshots are
    /// skipped. `None` once the collection is gone.
    pub async fn changed(&mut self) -> Option<Snapshot<T>> {
        self.updates.changed().await.ok()?;
        self.seen = self.updates.borrow_and_update().clone();
        Some(Arc::clone(&self.seen))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn changed_skips_to_latest_snapshot() {
        let (tx, rx) = watch::channel(Arc::new(vec![Arc::new(1)]));
        let mut stream = EntityStream::new(rx);
        assert_eq!(stream.current().len(), 1);

        tx.send_replace(Arc::new(vec![Arc::new(1), Arc::new(2)]));
        tx.send_replace(Arc::new(vec![Arc::new(1), Arc::new(2), Arc::new(3)]));
        let next = stream.changed().await.unwrap();
        assert_eq!(next.len(), 3);
        assert_eq!(stream.current().len(), 3);

        drop(tx);
        assert!(stream.changed().await.is_none());
    }
}
