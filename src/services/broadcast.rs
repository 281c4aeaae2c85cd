//! Live fan-out of price and alert events to connected viewers.
//!
//! Delivery is best-effort: there is no replay for late subscribers and no
//! acknowledgement. A subscriber that falls more than the channel capacity
//! behind skips the oldest events.

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

use crate::models::Event;

#[derive(Clone)]
pub struct Broadcaster {
    tx: broadcast::Sender<Event>,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Delivers to whoever is subscribed right now and returns how many that was.
    pub fn publish(&self, event: Event) -> usize {
        let topic = event.topic();
        match self.tx.send(event) {
            Ok(n) => n,
            Err(_) => {
                tracing::trace!("no subscribers for {}", topic);
                0
            }
        }
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// A connection's handle on the event stream. Dropping it (or calling
/// [`Subscription::unsubscribe`]) detaches the connection.
pub struct Subscription {
    rx: broadcast::Receiver<Event>,
}

impl Subscription {
    /// Next event, or `None` once the broadcaster is gone.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.recv().await {
                Ok(evt) => return Some(evt),
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!("subscriber lagged, {} events dropped", n);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`Subscription::recv`].
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.try_recv() {
                Ok(evt) => return Some(evt),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    pub fn unsubscribe(self) {}
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::models::{AlertTriggered, Condition, PriceUpdate};

    fn price_update(ts: i64) -> Event {
        Event::PriceUpdate(PriceUpdate {
            prices: BTreeMap::new(),
            timestamp: ts,
        })
    }

    #[tokio::test]
    async fn late_subscribers_get_no_replay() {
        let hub = Broadcaster::new(8);
        assert_eq!(hub.publish(price_update(1)), 0);

        let mut sub = hub.subscribe();
        assert!(sub.try_recv().is_none());

        assert_eq!(hub.publish(price_update(2)), 1);
        assert_eq!(sub.recv().await, Some(price_update(2)));
    }

    #[tokio::test]
    async fn every_subscriber_sees_events_in_publish_order() {
        let hub = Broadcaster::new(8);
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        let fired = Event::AlertTriggered(AlertTriggered {
            coin: "bitcoin".to_string(),
            price: 1.0,
            condition: Condition::Below,
            threshold: 2.0,
        });

        hub.publish(price_update(1));
        hub.publish(fired.clone());
        hub.publish(price_update(2));

        for sub in [&mut a, &mut b] {
            assert_eq!(sub.try_recv(), Some(price_update(1)));
            assert_eq!(sub.try_recv(), Some(fired.clone()));
            assert_eq!(sub.try_recv(), Some(price_update(2)));
            assert_eq!(sub.try_recv(), None);
        }
    }

    #[test]
    fn unsubscribe_detaches() {
        let hub = Broadcaster::new(4);
        let sub = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 1);

        sub.unsubscribe();
        assert_eq!(hub.subscriber_count(), 0);
        assert_eq!(hub.publish(price_update(1)), 0);
    }
}
