//! Event bus - publish/subscribe for engine mutations
//!
//! Subscribers are served in subscription order. Dropping a `Subscription`
//! removes it from the bus.

use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use crate::core::{Order, Position, Realization, Symbol};

/// Mutations the engine reports to its collaborators
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EngineEvent {
    OrderPlaced(Order),
    OrderFilled { order: Order, delta: Decimal, price: Decimal },
    OrderCanceled(Order),
    OrderRejected { order: Order, reason: String },
    PositionChanged(Position),
    PositionClosed(Realization),
    LiquidationCrossed(Position),
    PriceApplied { symbol: Symbol, price: Decimal },
}

struct Subscribers<E> {
    next_id: u64,
    senders: BTreeMap<u64, flume::Sender<E>>,
}

pub struct EventBus<E> {
    inner: Arc<Mutex<Subscribers<E>>>,
}

impl<E: Clone> EventBus<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Subscribers {
                next_id: 0,
                senders: BTreeMap::new(),
            })),
        }
    }

    pub fn subscribe(&self) -> Subscription<E> {
        let (tx, rx) = flume::unbounded();
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.senders.insert(id, tx);

        Subscription {
            id,
            rx,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver to every live subscriber; returns how many received it.
    pub fn publish(&self, event: E) -> usize {
        let mut inner = self.inner.lock();
        let mut dead = Vec::new();
        let mut delivered = 0;

        for (id, tx) in inner.senders.iter() {
            if tx.send(event.clone()).is_ok() {
                delivered += 1;
            } else {
                dead.push(*id);
            }
        }
        for id in dead {
            inner.senders.remove(&id);
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().senders.len()
    }
}

impl<E: Clone> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving end of a bus subscription
pub struct Subscription<E> {
    id: u64,
    rx: flume::Receiver<E>,
    bus: Weak<Mutex<Subscribers<E>>>,
}

impl<E> Subscription<E> {
    pub fn try_recv(&self) -> Option<E> {
        self.rx.try_recv().ok()
    }

    pub async fn recv_async(&self) -> Option<E> {
        self.rx.recv_async().await.ok()
    }

    /// Everything queued so far, oldest first
    pub fn drain(&self) -> Vec<E> {
        self.rx.try_iter().collect()
    }
}

impl<E> Drop for Subscription<E> {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.lock().senders.remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_reaches_all_subscribers_in_order() {
        let bus: EventBus<u32> = EventBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();

        assert_eq!(bus.publish(1), 2);
        assert_eq!(bus.publish(2), 2);
        assert_eq!(a.drain(), vec![1, 2]);
        assert_eq!(b.drain(), vec![1, 2]);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let bus: EventBus<u32> = EventBus::new();
        let a = bus.subscribe();
        {
            let _b = bus.subscribe();
            assert_eq!(bus.subscriber_count(), 2);
        }
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(bus.publish(7), 1);
        assert_eq!(a.try_recv(), Some(7));
        assert_eq!(a.try_recv(), None);
    }

    #[test]
    fn test_subscription_outliving_bus() {
        let bus: EventBus<u32> = EventBus::new();
        let a = bus.subscribe();
        bus.publish(3);
        drop(bus);
        assert_eq!(a.drain(), vec![3]);
    }

    #[test]
    fn test_money_serializes_as_exact_strings() {
        let event = EngineEvent::PriceApplied {
            symbol: Symbol::new("BTC"),
            price: Decimal::new(3500010, 2),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "price_applied");
        assert_eq!(json["data"]["symbol"], "BTC");
        assert_eq!(json["data"]["price"], "35000.10");
    }
}
