use feed_db::{Change, Database};
use feed_ref::CollectionPath;
use log::warn;
use tokio::sync::broadcast::{
    error::{RecvError, TryRecvError},
    Receiver,
};

use crate::Error;

/// Number of documents in one collection, kept current from the change feed.
pub struct LiveCount {
    collection: CollectionPath,
    count: u64,
    stale: bool,
    changes: Receiver<Change>,
}

impl LiveCount {
    pub async fn subscribe(db: &mut Database, collection: CollectionPath) -> Result<Self, Error> {
        let changes = db.subscribe();
        let count = db.count_collection(&collection).await?;
        Ok(Self {
            collection,
            count,
            stale: false,
            changes,
        })
    }

    pub fn get(&self) -> u64 {
        self.count
    }

    /// True once changes were missed; [`LiveCount::resync`] recounts.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Applies every change published so far. Returns whether the count moved.
    pub fn poll(&mut self) -> bool {
        let before = self.count;
        loop {
            match self.changes.try_recv() {
                Ok(change) => {
                    self.apply(&change);
                }
                Err(TryRecvError::Lagged(skipped)) => self.lagged(skipped),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        self.count != before
    }

    /// Waits for the next change to the collection and returns the new count,
    /// or `None` once the database is gone.
    pub async fn changed(&mut self) -> Option<u64> {
        loop {
            match self.changes.recv().await {
                Ok(change) => {
                    if self.apply(&change) {
                        return Some(self.count);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    self.lagged(skipped);
                    return Some(self.count);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    pub async fn resync(&mut self, db: &mut Database) -> Result<u64, Error> {
        self.changes = db.subscribe();
        self.count = db.count_collection(&self.collection).await?;
        self.stale = false;
        Ok(self.count)
    }

    fn apply(&mut self, change: &Change) -> bool {
        let ours = change
            .doc_path()
            .map_or(false, |path| path.collection() == self.collection);
        if !ours {
            return false;
        }

        match change {
            Change::DocCreated(_) => self.count += 1,
            Change::DocDeleted(_) => self.count = self.count.saturating_sub(1),
            _ => return false,
        }
        true
    }

    fn lagged(&mut self, skipped: u64) {
        warn!(
            "Missed {} changes while counting {}, count is stale",
            skipped, self.collection
        );
        self.stale = true;
    }
}
