use std::{collections::HashMap, sync::Mutex};

use tokio::sync::Notify;
use tracing::{debug, warn};

use super::MonitorRequest;
use crate::types::{DateTime, Utc};

/// Pending receipt polls indexed by transaction id but kept sorted by
/// `next_retry`, so the head is always the next request due.
pub(crate) struct RetryList {
    inner: Mutex<Inner>,
    non_empty: Notify,
}

#[derive(Default)]
struct Inner {
    // Sorted by `next_retry`; equal timestamps keep insertion order.
    sorted: Vec<MonitorRequest>,
    // Transaction id -> the `next_retry` currently stored for it.
    ids: HashMap<u64, DateTime<Utc>>,
}

impl RetryList {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            non_empty: Notify::new(),
        }
    }

    /// Inserts the request at the position dictated by its `next_retry`.
    /// A request for the same transaction id already present makes this a
    /// no-op, whatever its timestamp.
    pub fn add(&self, request: MonitorRequest) -> bool {
        let mut inner = self.inner.lock().expect("retry list mutex poisoned");

        let id = request.l2_tx.id;
        if inner.ids.contains_key(&id) {
            return false;
        }

        // Strictly-greater comparison: equal `next_retry` values land after
        // the ones already queued, preserving arrival order.
        let index = inner
            .sorted
            .partition_point(|queued| queued.next_retry <= request.next_retry);

        debug!(
            "added monitor request for tx {} with next retry at {} to the retry list at index {index}",
            request.l2_tx.tag(),
            request.next_retry
        );

        inner.ids.insert(id, request.next_retry);
        inner.sorted.insert(index, request);

        if inner.sorted.len() == 1 {
            self.non_empty.notify_one();
        }

        true
    }

    /// Removes the request with the given transaction id, returning whether
    /// anything was removed.
    pub fn delete(&self, id: u64) -> bool {
        let mut inner = self.inner.lock().expect("retry list mutex poisoned");

        let Some(next_retry) = inner.ids.remove(&id) else {
            return false;
        };

        // The sort key is `next_retry`, not the id: binary search narrows
        // down to the run of equal timestamps, which is then scanned.
        let start = inner
            .sorted
            .partition_point(|queued| queued.next_retry < next_retry);
        let offset = inner.sorted[start..]
            .iter()
            .take_while(|queued| queued.next_retry == next_retry)
            .position(|queued| queued.l2_tx.id == id);

        match offset {
            Some(offset) => {
                inner.sorted.remove(start + offset);
                true
            }
            None => {
                // Unreachable as long as `ids` mirrors `sorted`.
                warn!("monitor request for tx id {id} missing from the sorted retry list");
                false
            }
        }
    }

    /// The earliest-`next_retry` request, without removing it.
    pub fn peek_head(&self) -> Option<MonitorRequest> {
        self.inner
            .lock()
            .expect("retry list mutex poisoned")
            .sorted
            .first()
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .expect("retry list mutex poisoned")
            .sorted
            .len()
    }

    /// Parks the caller until `add` turns the list non-empty. Only the
    /// scheduler waits here.
    pub async fn wait_non_empty(&self) {
        self.non_empty.notified().await;
    }
}
