//! Feature queue: many sensor producers, one consumer.
//!
//! A FIFO of `FeatureObservation`s with an explicit overflow policy. The
//! internal lock is only held for the push/pop itself, never across an
//! `.await`; waiting is done on `Notify`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::types::FeatureObservation;

/// What a push does when a bounded queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Wait up to `timeout` for the consumer to make room, then reject.
    Block { timeout: Duration },
    /// Evict the oldest queued observation to make room.
    DropOldest,
}

/// Successful push result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Enqueued,
    /// Enqueued after evicting the oldest observation.
    DisplacedOldest,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("feature queue full after waiting {0:?}")]
    Full(Duration),

    #[error("feature queue closed")]
    Closed,
}

/// Point-in-time queue counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub depth: usize,
    pub enqueued: u64,
    pub displaced: u64,
    pub rejected: u64,
}

pub struct FeatureQueue {
    items: Mutex<VecDeque<FeatureObservation>>,
    capacity: Option<usize>,
    policy: OverflowPolicy,
    closed: AtomicBool,
    item_ready: Notify,
    space_ready: Notify,
    enqueued: AtomicU64,
    displaced: AtomicU64,
    rejected: AtomicU64,
}

impl FeatureQueue {
    /// Bounded queue. A capacity of 0 is treated as 1.
    pub fn bounded(capacity: usize, policy: OverflowPolicy) -> Self {
        Self::build(Some(capacity.max(1)), policy)
    }

    /// Unbounded queue; pushes never wait and never evict.
    pub fn unbounded() -> Self {
        Self::build(None, OverflowPolicy::DropOldest)
    }

    /// `None` capacity means unbounded.
    pub fn with_capacity(capacity: Option<usize>, policy: OverflowPolicy) -> Self {
        match capacity {
            Some(cap) => Self::bounded(cap, policy),
            None => Self::unbounded(),
        }
    }

    fn build(capacity: Option<usize>, policy: OverflowPolicy) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity.unwrap_or(64).min(4_096))),
            capacity,
            policy,
            closed: AtomicBool::new(false),
            item_ready: Notify::new(),
            space_ready: Notify::new(),
            enqueued: AtomicU64::new(0),
            displaced: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<FeatureObservation>> {
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Push an observation according to the overflow policy.
    ///
    /// Never waits longer than the block timeout.
    pub async fn push(&self, observation: FeatureObservation) -> Result<PushOutcome, QueueError> {
        let deadline = match self.policy {
            OverflowPolicy::Block { timeout } => Some((Instant::now() + timeout, timeout)),
            OverflowPolicy::DropOldest => None,
        };

        loop {
            if self.is_closed() {
                return Err(QueueError::Closed);
            }

            // Created before the capacity check so a pop in between still
            // leaves a permit behind.
            let space = self.space_ready.notified();

            {
                let mut items = self.lock();
                let full = self.capacity.is_some_and(|cap| items.len() >= cap);

                if !full {
                    items.push_back(observation);
                    drop(items);
                    self.enqueued.fetch_add(1, Ordering::Relaxed);
                    self.item_ready.notify_one();
                    return Ok(PushOutcome::Enqueued);
                }

                if deadline.is_none() {
                    items.pop_front();
                    items.push_back(observation);
                    drop(items);
                    self.enqueued.fetch_add(1, Ordering::Relaxed);
                    self.displaced.fetch_add(1, Ordering::Relaxed);
                    self.item_ready.notify_one();
                    return Ok(PushOutcome::DisplacedOldest);
                }
            }

            if let Some((deadline, waited)) = deadline {
                if tokio::time::timeout_at(deadline, space).await.is_err() {
                    self.rejected.fetch_add(1, Ordering::Relaxed);
                    return Err(QueueError::Full(waited));
                }
            }
        }
    }

    /// Take the oldest observation without waiting.
    pub fn try_pop(&self) -> Option<FeatureObservation> {
        let observation = self.lock().pop_front();
        if observation.is_some() {
            self.space_ready.notify_one();
        }
        observation
    }

    /// Wait up to `timeout` for an observation.
    ///
    /// Returns `None` on timeout, or once the queue is closed and empty.
    /// Cancel-safe: an observation is only removed synchronously, so dropping
    /// this future never loses one.
    pub async fn pop_timeout(&self, timeout: Duration) -> Option<FeatureObservation> {
        let deadline = Instant::now() + timeout;
        loop {
            let ready = self.item_ready.notified();
            if let Some(observation) = self.try_pop() {
                return Some(observation);
            }
            if self.is_closed() {
                return None;
            }
            if tokio::time::timeout_at(deadline, ready).await.is_err() {
                return self.try_pop();
            }
        }
    }

    /// Reject further pushes and wake every waiter.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.item_ready.notify_waiters();
        self.space_ready.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Remove and return everything still queued.
    pub fn drain(&self) -> Vec<FeatureObservation> {
        let drained: Vec<FeatureObservation> = self.lock().drain(..).collect();
        if !drained.is_empty() {
            self.space_ready.notify_waiters();
        }
        drained
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            depth: self.len(),
            enqueued: self.enqueued.load(Ordering::Relaxed),
            displaced: self.displaced.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for FeatureQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureQueue")
            .field("capacity", &self.capacity)
            .field("policy", &self.policy)
            .field("closed", &self.is_closed())
            .field("stats", &self.stats())
            .finish()
    }
}
