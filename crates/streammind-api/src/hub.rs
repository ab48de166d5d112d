//! Live fan-out of ingested tokens to WebSocket subscribers.
//!
//! The registry is a `DashMap` keyed by session, so subscribe, unsubscribe
//! and publish only lock the shard holding that session. Publishing
//! snapshots the session's subscribers, releases the shard, then delivers
//! with `try_send` so a slow or dead subscriber never blocks the publisher.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use streammind_models::SessionId;

use crate::metrics;

pub type SubscriberId = u64;

/// Push capability of one live connection.
#[derive(Debug, Clone)]
pub struct Subscriber {
    sender: mpsc::Sender<String>,
}

impl Subscriber {
    /// Create a subscriber and the receiving half its connection drains.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<String>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (Self { sender }, receiver)
    }

    fn deliver(&self, content: &str) -> bool {
        match self.sender.try_send(content.to_string()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!("Subscriber send buffer full");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

/// Result of one publish call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOutcome {
    pub delivered: usize,
    pub evicted: usize,
}

/// Registry of live subscribers per session.
#[derive(Debug, Default)]
pub struct FanoutHub {
    sessions: DashMap<SessionId, HashMap<SubscriberId, Subscriber>>,
    next_id: AtomicU64,
    total: AtomicUsize,
}

impl FanoutHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, session_id: SessionId, subscriber: Subscriber) -> SubscriberId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.sessions.entry(session_id).or_default().insert(id, subscriber);
        let total = self.total.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::set_live_subscribers(total);
        debug!(session_id = %session_id, subscriber_id = id, "Subscriber registered");
        id
    }

    /// Remove a subscriber. Returns false if it was already gone.
    pub fn unsubscribe(&self, session_id: &SessionId, id: SubscriberId) -> bool {
        let removed = match self.sessions.get_mut(session_id) {
            Some(mut subscribers) => subscribers.remove(&id).is_some(),
            None => false,
        };
        self.sessions.remove_if(session_id, |_, subscribers| subscribers.is_empty());

        if removed {
            let total = self.total.fetch_sub(1, Ordering::SeqCst) - 1;
            metrics::set_live_subscribers(total);
            debug!(session_id = %session_id, subscriber_id = id, "Subscriber removed");
        }
        removed
    }

    /// Deliver `content` to every subscriber currently registered for the
    /// session. Subscribers whose channel is closed or full are evicted.
    pub fn publish(&self, session_id: &SessionId, content: &str) -> PublishOutcome {
        let snapshot: Vec<(SubscriberId, Subscriber)> = match self.sessions.get(session_id) {
            Some(subscribers) => subscribers
                .iter()
                .map(|(id, subscriber)| (*id, subscriber.clone()))
                .collect(),
            None => return PublishOutcome::default(),
        };

        let mut outcome = PublishOutcome::default();
        for (id, subscriber) in snapshot {
            if subscriber.deliver(content) {
                outcome.delivered += 1;
            } else if self.unsubscribe(session_id, id) {
                warn!(session_id = %session_id, subscriber_id = id, "Evicted unresponsive subscriber");
                outcome.evicted += 1;
            }
        }

        metrics::record_fanout(outcome.delivered, outcome.evicted);
        outcome
    }

    pub fn subscriber_count(&self, session_id: &SessionId) -> usize {
        self.sessions.get(session_id).map(|s| s.len()).unwrap_or(0)
    }

    /// Sessions with at least one live subscriber.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn total_subscribers(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut mpsc::Receiver<String>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[test]
    fn test_subscribers_receive_in_publish_order() {
        let hub = FanoutHub::new();
        let session = SessionId::new();
        let (a, mut rx_a) = Subscriber::channel(16);
        let (b, mut rx_b) = Subscriber::channel(16);
        hub.subscribe(session, a);
        hub.subscribe(session, b);

        for n in 0..5 {
            let outcome = hub.publish(&session, &format!("tok{}", n));
            assert_eq!(outcome, PublishOutcome { delivered: 2, evicted: 0 });
        }

        let expected: Vec<_> = (0..5).map(|n| format!("tok{}", n)).collect();
        assert_eq!(drain(&mut rx_a), expected);
        assert_eq!(drain(&mut rx_b), expected);
    }

    #[test]
    fn test_late_subscriber_gets_nothing_live() {
        let hub = FanoutHub::new();
        let session = SessionId::new();
        assert_eq!(hub.publish(&session, "early"), PublishOutcome::default());

        let (late, mut rx) = Subscriber::channel(4);
        hub.subscribe(session, late);
        assert!(drain(&mut rx).is_empty());

        hub.publish(&session, "next");
        assert_eq!(drain(&mut rx), vec!["next"]);
    }

    #[test]
    fn test_closed_subscriber_is_evicted_without_affecting_others() {
        let hub = FanoutHub::new();
        let session = SessionId::new();
        let (gone, rx_gone) = Subscriber::channel(4);
        let (alive, mut rx_alive) = Subscriber::channel(4);
        hub.subscribe(session, gone);
        hub.subscribe(session, alive);
        drop(rx_gone);

        let outcome = hub.publish(&session, "tok");
        assert_eq!(outcome, PublishOutcome { delivered: 1, evicted: 1 });
        assert_eq!(drain(&mut rx_alive), vec!["tok"]);
        assert_eq!(hub.subscriber_count(&session), 1);
    }

    #[test]
    fn test_full_subscriber_is_evicted() {
        let hub = FanoutHub::new();
        let session = SessionId::new();
        let (slow, mut rx) = Subscriber::channel(1);
        hub.subscribe(session, slow);

        assert_eq!(hub.publish(&session, "a").delivered, 1);
        assert_eq!(hub.publish(&session, "b").evicted, 1);
        assert_eq!(hub.subscriber_count(&session), 0);

        // Buffered message is still readable, then the channel ends.
        assert_eq!(rx.try_recv().unwrap(), "a");
        assert!(matches!(rx.try_recv(), Err(mpsc::error::TryRecvError::Disconnected)));
    }

    #[test]
    fn test_empty_sessions_are_removed() {
        let hub = FanoutHub::new();
        let a = SessionId::new();
        let b = SessionId::new();
        let (s1, _rx1) = Subscriber::channel(4);
        let (s2, _rx2) = Subscriber::channel(4);
        let id1 = hub.subscribe(a, s1);
        let id2 = hub.subscribe(b, s2);
        assert_eq!(hub.session_count(), 2);
        assert_eq!(hub.total_subscribers(), 2);

        assert!(hub.unsubscribe(&a, id1));
        assert!(!hub.unsubscribe(&a, id1));
        assert_eq!(hub.session_count(), 1);
        assert_eq!(hub.subscriber_count(&a), 0);

        assert!(hub.unsubscribe(&b, id2));
        assert_eq!(hub.session_count(), 0);
        assert_eq!(hub.total_subscribers(), 0);
    }

    #[test]
    fn test_sessions_are_isolated() {
        let hub = FanoutHub::new();
        let a = SessionId::new();
        let b = SessionId::new();
        let (sa, mut rx_a) = Subscriber::channel(4);
        let (sb, mut rx_b) = Subscriber::channel(4);
        hub.subscribe(a, sa);
        hub.subscribe(b, sb);

        hub.publish(&a, "for-a");
        assert_eq!(drain(&mut rx_a), vec!["for-a"]);
        assert!(drain(&mut rx_b).is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_subscribe_and_publish() {
        let hub = std::sync::Arc::new(FanoutHub::new());
        let session = SessionId::new();
        let mut handles = Vec::new();
        for _ in 0..20 {
            let hub = std::sync::Arc::clone(&hub);
            handles.push(tokio::spawn(async move {
                let (sub, _rx) = Subscriber::channel(64);
                let id = hub.subscribe(session, sub);
                hub.publish(&session, "x");
                hub.unsubscribe(&session, id);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(hub.session_count(), 0);
        assert_eq!(hub.total_subscribers(), 0);
    }
}
