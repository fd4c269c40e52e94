// Latest-wins channel
//
// Bounded, non-blocking on the send side. When the buffer is full the oldest
// pending value is dropped so a lagging consumer only ever sees the newest data.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

struct Shared<T> {
    queue: Mutex<VecDeque<T>>,
    capacity: usize,
    closed: AtomicBool,
    senders: AtomicUsize,
    notify: Notify,
}

impl<T> Shared<T> {
    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.notify.notify_one();
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Outcome of a latest-wins send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// Buffer was full; the oldest pending value was discarded
    DroppedOldest,
    /// Buffer had no room even after eviction; the new value was discarded
    DroppedNewest,
    Closed,
}

/// Create a latest-wins channel holding at most `capacity` pending values
///
/// Hand-rolled because `tokio::sync::broadcast` rounds its capacity up to a
/// power of two and the buffer here must hold exactly `capacity` values.
pub fn latest_channel<T>(capacity: usize) -> (LatestSender<T>, LatestReceiver<T>) {
    let shared = Arc::new(Shared {
        queue: Mutex::new(VecDeque::with_capacity(capacity)),
        capacity,
        closed: AtomicBool::new(false),
        senders: AtomicUsize::new(1),
        notify: Notify::new(),
    });

    (
        LatestSender {
            shared: shared.clone(),
        },
        LatestReceiver { shared },
    )
}

pub struct LatestSender<T> {
    shared: Arc<Shared<T>>,
}

impl<T> LatestSender<T> {
    /// Non-blocking send; evicts the oldest value on a full buffer
    pub fn enqueue_latest(&self, value: T) -> Delivery {
        if self.shared.is_closed() {
            return Delivery::Closed;
        }

        let delivery = {
            let mut queue = match self.shared.queue.lock() {
                Ok(queue) => queue,
                Err(poisoned) => poisoned.into_inner(),
            };

            if queue.len() < self.shared.capacity {
                queue.push_back(value);
                Delivery::Sent
            } else {
                queue.pop_front();
                if queue.len() < self.shared.capacity {
                    queue.push_back(value);
                    Delivery::DroppedOldest
                } else {
                    Delivery::DroppedNewest
                }
            }
        };

        self.shared.notify.notify_one();
        delivery
    }

    /// Close the channel; the receiver drains what is buffered, then sees `None`
    pub fn close(&self) {
        self.shared.close();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Identity comparison used by subscriber registries
    pub fn same_channel(&self, other: &LatestSender<T>) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl<T> Clone for LatestSender<T> {
    fn clone(&self) -> Self {
        self.shared.senders.fetch_add(1, Ordering::AcqRel);
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> Drop for LatestSender<T> {
    fn drop(&mut self) {
        if self.shared.senders.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.shared.close();
        }
    }
}

impl<T> std::fmt::Debug for LatestSender<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LatestSender")
            .field("capacity", &self.shared.capacity)
            .field("closed", &self.shared.is_closed())
            .finish()
    }
}

pub struct LatestReceiver<T> {
    shared: Arc<Shared<T>>,
}

impl<T> LatestReceiver<T> {
    fn pop(&self) -> Option<T> {
        let mut queue = match self.shared.queue.lock() {
            Ok(queue) => queue,
            Err(poisoned) => poisoned.into_inner(),
        };
        queue.pop_front()
    }

    /// Wait for the next value. Returns `None` once closed and drained.
    ///
    /// Cancel safe: a value is only removed when the future completes.
    pub async fn recv(&self) -> Option<T> {
        loop {
            if let Some(value) = self.pop() {
                return Some(value);
            }
            if self.shared.is_closed() {
                return self.pop();
            }
            self.shared.notify.notified().await;
        }
    }

    pub fn try_recv(&self) -> Option<T> {
        self.pop()
    }

    pub fn len(&self) -> usize {
        match self.shared.queue.lock() {
            Ok(queue) => queue.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }
}

impl<T> Drop for LatestReceiver<T> {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::Release);
    }
}
