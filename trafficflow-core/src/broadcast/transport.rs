use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use serde::Serialize;

use crate::{SegmentId, SegmentState};

/// Change pushed to subscribers after a segment update
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    /// Broadcaster-wide publish order
    pub sequence: u64,
    pub segment_id: SegmentId,
    pub state: SegmentState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    /// The channel cannot take more right now; retry later
    Full,
    /// The channel is gone for good
    Closed,
}

/// Push channel a subscriber registers with.
///
/// Implementations must never block in `try_send`.
pub trait SubscriberTransport: Send + Sync {
    fn try_send(&self, notification: &Notification) -> SendOutcome;

    fn is_connected(&self) -> bool;
}

/// In-process bounded transport, for harnesses and local consumers
#[derive(Debug)]
pub struct MemoryTransport {
    capacity: usize,
    queue: Mutex<VecDeque<Notification>>,
    connected: AtomicBool,
}

impl MemoryTransport {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            connected: AtomicBool::new(true),
        }
    }

    /// Removes and returns everything delivered so far
    pub fn take_all(&self) -> Vec<Notification> {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }

    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::Release);
    }
}

impl SubscriberTransport for MemoryTransport {
    fn try_send(&self, notification: &Notification) -> SendOutcome {
        if !self.is_connected() {
            return SendOutcome::Closed;
        }
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        if queue.len() >= self.capacity {
            return SendOutcome::Full;
        }
        queue.push_back(notification.clone());
        SendOutcome::Delivered
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}
