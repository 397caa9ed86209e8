//! Duplicators that record what they were asked to do.
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    duplication::{ContentDuplicator, SpaceDuplicator},
    storage::{StorageError, StorageResult},
};

/// Ordered list of `"<store> <operation> <space>[/<content>]"` entries,
/// shared by every duplicator of a test.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    fn push(&self, event: String) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    /// Recorded events, sorted so concurrent destinations compare stably.
    #[must_use]
    pub fn events(&self) -> Vec<String> {
        let mut events = self.0.lock().unwrap_or_else(PoisonError::into_inner).clone();
        events.sort();
        events
    }

    /// Number of events of an operation, across stores.
    #[must_use]
    pub fn count(&self, operation: &str) -> usize {
        self.events()
            .iter()
            .filter(|event| event.split(' ').nth(1) == Some(operation))
            .count()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

pub struct RecordingDuplicator {
    store_id: String,
    log: EventLog,
    fail: bool,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingDuplicator {
    #[must_use]
    pub fn new(store_id: &str, log: EventLog) -> Self {
        Self {
            store_id: store_id.to_string(),
            log,
            fail: false,
            delay: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Every operation is recorded, then fails.
    #[must_use]
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Every operation sleeps for `delay` before returning.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Highest number of operations that ran at the same time.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn record(&self, operation: &str, item: String) -> StorageResult<()> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        self.log
            .push(format!("{} {operation} {item}", self.store_id));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail {
            Err(StorageError::msg(format!(
                "{operation} failed on store {}",
                self.store_id
            )))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SpaceDuplicator for RecordingDuplicator {
    async fn create_space(&self, space_id: &str) -> StorageResult<()> {
        self.record("create_space", space_id.to_string()).await
    }

    async fn update_space(&self, space_id: &str) -> StorageResult<()> {
        self.record("update_space", space_id.to_string()).await
    }

    async fn update_space_acl(&self, space_id: &str) -> StorageResult<()> {
        self.record("update_space_acl", space_id.to_string()).await
    }

    async fn delete_space(&self, space_id: &str) -> StorageResult<()> {
        self.record("delete_space", space_id.to_string()).await
    }
}

#[async_trait]
impl ContentDuplicator for RecordingDuplicator {
    async fn create_content(
        &self,
        space_id: &str,
        content_id: &str,
    ) -> StorageResult<Option<String>> {
        self.record("create_content", format!("{space_id}/{content_id}"))
            .await
            .map(|()| Some(String::new()))
    }

    async fn update_content(&self, space_id: &str, content_id: &str) -> StorageResult<()> {
        self.record("update_content", format!("{space_id}/{content_id}"))
            .await
    }

    async fn delete_content(&self, space_id: &str, content_id: &str) -> StorageResult<()> {
        self.record("delete_content", format!("{space_id}/{content_id}"))
            .await
    }
}
