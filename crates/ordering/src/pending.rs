//! Outstanding stock checks, keyed by correlation ID.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use common::CorrelationId;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::{OrderError, Result};

/// One stock check waiting for its reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub correlation_id: CorrelationId,
    /// Exclusive queue the reply is expected on.
    pub reply_queue: String,
    pub created_at: DateTime<Utc>,
}

impl PendingRequest {
    pub fn new(correlation_id: CorrelationId, reply_queue: impl Into<String>) -> Self {
        Self {
            correlation_id,
            reply_queue: reply_queue.into(),
            created_at: Utc::now(),
        }
    }
}

type Entries = Arc<Mutex<HashMap<CorrelationId, PendingRequest>>>;

fn lock(entries: &Entries) -> MutexGuard<'_, HashMap<CorrelationId, PendingRequest>> {
    entries.lock().unwrap_or_else(PoisonError::into_inner)
}

fn record_size(size: usize) {
    metrics::gauge!("pending_stock_checks").set(size as f64);
}

/// Bounded table of in-flight stock checks.
///
/// A caller first takes a [`PendingSlot`], waiting while the table is full,
/// then registers its request into it. The returned [`PendingGuard`] removes
/// the entry and frees the slot when dropped, whichever way the call ends.
///
/// Clones share the same table.
#[derive(Debug, Clone)]
pub struct PendingRequests {
    entries: Entries,
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl PendingRequests {
    /// Creates a table holding at most `capacity` requests (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Arc::default(),
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Waits for a free slot.
    ///
    /// Fails with [`OrderError::Closed`] once the table is closed.
    pub async fn acquire(&self) -> Result<PendingSlot> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| OrderError::Closed)?;

        Ok(PendingSlot {
            entries: self.entries.clone(),
            permit,
        })
    }

    /// Stops handing out slots. Registered requests run to completion.
    pub fn close(&self) {
        self.permits.close();
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }

    /// Returns the number of registered requests.
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Looks up a registered request.
    pub fn get(&self, correlation_id: &CorrelationId) -> Option<PendingRequest> {
        lock(&self.entries).get(correlation_id).cloned()
    }
}

/// A reserved place in the table, not yet bound to a request.
#[derive(Debug)]
pub struct PendingSlot {
    entries: Entries,
    permit: OwnedSemaphorePermit,
}

impl PendingSlot {
    /// Registers `request` in the reserved place.
    pub fn register(self, request: PendingRequest) -> PendingGuard {
        let correlation_id = request.correlation_id.clone();
        let size = {
            let mut entries = lock(&self.entries);
            entries.insert(correlation_id.clone(), request);
            entries.len()
        };
        record_size(size);

        PendingGuard {
            entries: self.entries,
            correlation_id,
            _permit: self.permit,
        }
    }
}

/// Keeps a request registered for as long as it lives.
#[derive(Debug)]
pub struct PendingGuard {
    entries: Entries,
    correlation_id: CorrelationId,
    _permit: OwnedSemaphorePermit,
}

impl PendingGuard {
    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let size = {
            let mut entries = lock(&self.entries);
            entries.remove(&self.correlation_id);
            entries.len()
        };
        record_size(size);
    }
}
