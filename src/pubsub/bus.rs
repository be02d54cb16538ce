//! # Event Bus
//!
//! In-process publish/subscribe fan-out. `publish` snapshots the
//! subscribers registered on a channel at call time and invokes them
//! synchronously in registration order; there is no queueing, retry,
//! replay or persistence. A subscriber removed concurrently with a
//! publish loses the tie: its live flag is cleared before the list is
//! touched, so deliveries racing an unsubscribe are skipped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tokio::sync::mpsc;

/// Subscriber callback invoked with each published payload
pub type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Receiver half of a [`EventBus::connect`] bridge
pub type EventReceiver = mpsc::UnboundedReceiver<Value>;

struct Subscriber {
    id: u64,
    live: Arc<AtomicBool>,
    handler: Handler,
}

/// Proof of registration; pass it back to [`EventBus::unsubscribe`].
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    channel: String,
    id: u64,
    live: Arc<AtomicBool>,
}

impl SubscriptionHandle {
    /// The channel this subscription is registered on
    pub fn channel(&self) -> &str {
        &self.channel
    }
}

/// Explicit publish/subscribe instance, injected into the catalogs.
#[derive(Default)]
pub struct EventBus {
    channels: RwLock<HashMap<String, Vec<Arc<Subscriber>>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` on `channel`. Handlers are invoked in
    /// registration order on every publish while subscribed.
    pub fn subscribe(
        &self,
        channel: &str,
        handler: impl Fn(&Value) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let live = Arc::new(AtomicBool::new(true));
        let subscriber = Arc::new(Subscriber {
            id,
            live: Arc::clone(&live),
            handler: Arc::new(handler),
        });

        if let Ok(mut channels) = self.channels.write() {
            channels
                .entry(channel.to_string())
                .or_default()
                .push(subscriber);
        }

        SubscriptionHandle {
            channel: channel.to_string(),
            id,
            live,
        }
    }

    /// Remove a subscription. Safe to call from within a handler's own
    /// invocation; delivery iterates a snapshot, never the live list.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        // Clear the live flag first so a racing publish skips this
        // subscriber even before the list is updated.
        handle.live.store(false, Ordering::SeqCst);

        if let Ok(mut channels) = self.channels.write() {
            if let Some(subscribers) = channels.get_mut(&handle.channel) {
                subscribers.retain(|s| s.id != handle.id);
                if subscribers.is_empty() {
                    channels.remove(&handle.channel);
                }
            }
        }
    }

    /// Deliver `payload` to every current subscriber of `channel`, in
    /// registration order. Publishing to an empty channel is a no-op.
    /// Returns the number of handlers invoked.
    pub fn publish(&self, channel: &str, payload: &Value) -> usize {
        let snapshot: Vec<Arc<Subscriber>> = match self.channels.read() {
            Ok(channels) => channels.get(channel).cloned().unwrap_or_default(),
            Err(_) => return 0,
        };

        let mut delivered = 0;
        for subscriber in snapshot {
            if !subscriber.live.load(Ordering::SeqCst) {
                continue;
            }
            (subscriber.handler)(payload);
            delivered += 1;
        }
        delivered
    }

    /// Subscribe with a channel bridge instead of a callback: payloads
    /// published while subscribed are forwarded into the returned
    /// receiver, the shape a socket-forwarding gateway consumes. A
    /// dropped receiver makes the forward a no-op.
    pub fn connect(&self, channel: &str) -> (SubscriptionHandle, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = self.subscribe(channel, move |payload: &Value| {
            let _ = tx.send(payload.clone());
        });
        (handle, rx)
    }

    /// Current number of subscribers on `channel`
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .read()
            .map(|channels| channels.get(channel).map_or(0, Vec::len))
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let channels: Vec<String> = self
            .channels
            .read()
            .map(|c| c.keys().cloned().collect())
            .unwrap_or_default();
        f.debug_struct("EventBus").field("channels", &channels).finish()
    }
}
