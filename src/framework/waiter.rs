//! Short-lived listeners for gateway events.
//!
//! The runtime feeds every event through [`EventWaiter::dispatch`]; commands
//! subscribe with a predicate and receive matching events until they drop
//! the receiver. Closed listeners are pruned on the next dispatch.

use std::time::Duration;

use async_lock::Mutex;
use tracing::trace;

use crate::events::GatewayEvent;

type Predicate = Box<dyn Fn(&GatewayEvent) -> bool + Send + Sync>;

/// Matching events a listener may have queued before it is considered
/// too slow and starts missing events.
const LISTENER_CAPACITY: usize = 16;

struct Listener {
    predicate: Predicate,
    tx: async_channel::Sender<GatewayEvent>,
}

#[derive(Default)]
pub struct EventWaiter {
    listeners: Mutex<Vec<Listener>>,
}

impl EventWaiter {
    /// Receive every future event matching `predicate`.
    pub async fn subscribe<F>(&self, predicate: F) -> async_channel::Receiver<GatewayEvent>
    where
        F: Fn(&GatewayEvent) -> bool + Send + Sync + 'static,
    {
        let (tx, rx) = async_channel::bounded(LISTENER_CAPACITY);
        self.listeners.lock().await.push(Listener {
            predicate: Box::new(predicate),
            tx,
        });
        rx
    }

    /// Wait for the first event matching `predicate`, giving up after
    /// `timeout`.
    pub async fn wait_for<F>(&self, predicate: F, timeout: Duration) -> Option<GatewayEvent>
    where
        F: Fn(&GatewayEvent) -> bool + Send + Sync + 'static,
    {
        let rx = self.subscribe(predicate).await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Ok(event)) => Some(event),
            _ => None,
        }
    }

    /// Offer `event` to every live listener. Returns how many received it.
    pub async fn dispatch(&self, event: &GatewayEvent) -> usize {
        let mut listeners = self.listeners.lock().await;
        listeners.retain(|l| !l.tx.is_closed());

        let mut delivered = 0;
        for listener in listeners.iter() {
            if (listener.predicate)(event) && listener.tx.try_send(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        if delivered > 0 {
            trace!(event = event.name(), delivered, "delivered event to waiters");
        }
        delivered
    }

    pub async fn listener_count(&self) -> usize {
        self.listeners.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn unknown(name: &str) -> GatewayEvent {
        GatewayEvent::Unknown {
            event_name: Some(name.to_string()),
            op: 0,
            data: None,
        }
    }

    #[tokio::test]
    async fn wait_for_returns_matching_event() {
        let waiter = Arc::new(EventWaiter::default());
        let w = Arc::clone(&waiter);
        let task = tokio::spawn(async move {
            w.wait_for(|e| e.name() == "B", Duration::from_secs(5)).await
        });

        while waiter.listener_count().await == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(waiter.dispatch(&unknown("A")).await, 0);
        assert_eq!(waiter.dispatch(&unknown("B")).await, 1);

        let event = task.await.unwrap().expect("event delivered");
        assert_eq!(event.name(), "B");
    }

    #[tokio::test]
    async fn wait_for_times_out() {
        let waiter = EventWaiter::default();
        let event = waiter
            .wait_for(|_| true, Duration::from_millis(10))
            .await;
        assert!(event.is_none());
    }

    #[tokio::test]
    async fn dropped_listeners_are_pruned() {
        let waiter = EventWaiter::default();
        let rx = waiter.subscribe(|_| true).await;
        assert_eq!(waiter.listener_count().await, 1);
        drop(rx);
        assert_eq!(waiter.dispatch(&unknown("A")).await, 0);
        assert_eq!(waiter.listener_count().await, 0);
    }

    #[tokio::test]
    async fn subscription_receives_many_events() {
        let waiter = EventWaiter::default();
        let rx = waiter.subscribe(|e| e.name() != "skip").await;
        waiter.dispatch(&unknown("one")).await;
        waiter.dispatch(&unknown("skip")).await;
        waiter.dispatch(&unknown("two")).await;
        assert_eq!(rx.recv().await.unwrap().name(), "one");
        assert_eq!(rx.recv().await.unwrap().name(), "two");
        assert!(rx.is_empty());
    }
}
