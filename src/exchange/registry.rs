use crate::channel::{latest_channel, Delivery, LatestReceiver, LatestSender};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};

/// Default capacity of every per-subscriber channel
pub const SUBSCRIBER_CAPACITY: usize = 10;

type Channels<T> = RwLock<HashMap<String, Vec<LatestSender<T>>>>;

/// Per-symbol fan-out lists for one stream type
///
/// The registry is the only place a subscriber channel is closed, so a
/// publish can never race a close into a panic.
pub struct SubscriberRegistry<T> {
    channels: Arc<Channels<T>>,
    capacity: usize,
}

impl<T> Default for SubscriberRegistry<T> {
    fn default() -> Self {
        Self::new(SUBSCRIBER_CAPACITY)
    }
}

impl<T> SubscriberRegistry<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            capacity,
        }
    }

    /// Register a new bounded subscriber for `symbol`
    pub fn subscribe(&self, symbol: &str) -> Subscription<T> {
        let (sender, receiver) = latest_channel(self.capacity);
        {
            let mut channels = self.channels.write().unwrap_or_else(|e| e.into_inner());
            channels
                .entry(symbol.to_string())
                .or_default()
                .push(sender.clone());
        }

        Subscription {
            symbol: symbol.to_string(),
            receiver,
            sender: Some(sender),
            registry: Arc::downgrade(&self.channels),
        }
    }

    /// Latest-wins send to every subscriber of `symbol`
    ///
    /// Returns how many subscribers had to drop a value.
    pub fn publish(&self, symbol: &str, value: &T) -> usize
    where
        T: Clone,
    {
        let channels = self.channels.read().unwrap_or_else(|e| e.into_inner());
        let Some(subscribers) = channels.get(symbol) else {
            return 0;
        };

        subscribers
            .iter()
            .map(|tx| tx.enqueue_latest(value.clone()))
            .filter(|delivery| matches!(delivery, Delivery::DroppedOldest | Delivery::DroppedNewest))
            .count()
    }

    pub fn subscriber_count(&self, symbol: &str) -> usize {
        self.channels
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(symbol)
            .map_or(0, Vec::len)
    }

    /// Close and forget every subscriber
    pub fn close_all(&self) {
        let mut channels = self.channels.write().unwrap_or_else(|e| e.into_inner());
        for tx in channels.values().flatten() {
            tx.close();
        }
        channels.clear();
    }
}

/// A live subscription: the receiving end plus its idempotent cleanup
///
/// Dropping the subscription runs the cleanup.
pub struct Subscription<T> {
    symbol: String,
    receiver: LatestReceiver<T>,
    sender: Option<LatestSender<T>>,
    registry: Weak<Channels<T>>,
}

impl<T> Subscription<T> {
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Next value; `None` once the subscription has been closed and drained
    pub async fn recv(&self) -> Option<T> {
        self.receiver.recv().await
    }

    pub fn try_recv(&self) -> Option<T> {
        self.receiver.try_recv()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.receiver.capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.receiver.is_closed()
    }

    /// Remove exactly this channel from the registry and close it
    pub fn unsubscribe(&mut self) {
        let Some(sender) = self.sender.take() else {
            return;
        };

        if let Some(channels) = self.registry.upgrade() {
            let mut channels = channels.write().unwrap_or_else(|e| e.into_inner());
            if let Some(list) = channels.get_mut(&self.symbol) {
                list.retain(|tx| !tx.same_channel(&sender));
                if list.is_empty() {
                    channels.remove(&self.symbol);
                }
            }
        }
        sender.close();
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("symbol", &self.symbol)
            .field("pending", &self.receiver.len())
            .field("active", &self.sender.is_some())
            .finish()
    }
}
