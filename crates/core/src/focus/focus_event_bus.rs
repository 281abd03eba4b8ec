use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::Sender;

use super::focus_event::FocusEvent;

/// Handle returned by [`FocusSource::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Where visibility and focus changes come from.
///
/// Subscribers receive every event published after they subscribe until
/// they unsubscribe. Unsubscribing an unknown id is a no-op.
pub trait FocusSource: Send + Sync {
    fn subscribe(&self, sender: Sender<FocusEvent>) -> SubscriptionId;

    fn unsubscribe(&self, id: SubscriptionId);
}

/// In-process fan-out of focus events.
///
/// Cloning shares the subscriber table, so one clone can be handed to the
/// monitor while another publishes from the host's event source.
#[derive(Clone, Default)]
pub struct FocusEventBus {
    subscribers: Arc<Mutex<HashMap<SubscriptionId, Sender<FocusEvent>>>>,
    next_id: Arc<AtomicU64>,
}

impl FocusEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `event` to every current subscriber. Subscribers whose
    /// receiver has gone away are dropped.
    pub fn publish(&self, event: FocusEvent) {
        let Ok(mut subscribers) = self.subscribers.lock() else {
            log::error!("Focus subscriber table poisoned; dropping {event}");
            return;
        };
        subscribers.retain(|id, sender| {
            let delivered = sender.send(event).is_ok();
            if !delivered {
                log::debug!("Dropping disconnected focus subscriber {id:?}");
            }
            delivered
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl FocusSource for FocusEventBus {
    fn subscribe(&self, sender: Sender<FocusEvent>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.insert(id, sender);
        }
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    #[test]
    fn test_publish_reaches_all_subscribers() {
        let bus = FocusEventBus::new();
        let (tx_a, rx_a) = unbounded();
        let (tx_b, rx_b) = unbounded();
        bus.subscribe(tx_a);
        bus.subscribe(tx_b);

        bus.publish(FocusEvent::FocusLost);

        assert_eq!(rx_a.try_recv().unwrap(), FocusEvent::FocusLost);
        assert_eq!(rx_b.try_recv().unwrap(), FocusEvent::FocusLost);
    }

    #[test]
    fn test_unsubscribed_receives_nothing() {
        let bus = FocusEventBus::new();
        let (tx, rx) = unbounded();
        let id = bus.subscribe(tx);
        bus.unsubscribe(id);

        bus.publish(FocusEvent::VisibilityHidden);

        assert!(rx.try_recv().is_err());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_unsubscribe_unknown_id_is_noop() {
        let bus = FocusEventBus::new();
        let (tx, _rx) = unbounded();
        let id = bus.subscribe(tx);
        bus.unsubscribe(id);
        bus.unsubscribe(id);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_disconnected_subscriber_is_pruned() {
        let bus = FocusEventBus::new();
        let (tx, rx) = unbounded();
        bus.subscribe(tx);
        drop(rx);

        bus.publish(FocusEvent::FocusGained);

        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_clones_share_subscribers() {
        let bus = FocusEventBus::new();
        let publisher = bus.clone();
        let (tx, rx) = unbounded();
        let first = bus.subscribe(tx.clone());
        let second = publisher.subscribe(tx);

        publisher.publish(FocusEvent::FocusLost);

        assert_ne!(first, second);
        assert_eq!(rx.try_iter().count(), 2);
    }
}
