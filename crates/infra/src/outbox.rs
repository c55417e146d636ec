//! Post-commit event relay.
//!
//! Services hand committed events to an [`OutboxPublisher`], which only enqueues.
//! A single relay thread drains the queue in order, stamps each event with its
//! per-entity sequence number and pushes it onto the [`EventBus`], retrying
//! failed publications with a linear backoff.
//!
//! Services enqueue from the store's commit hook, while the write lock is still
//! held, so the queue order is the commit order. One queue and one relay keep it.

use std::collections::HashMap;
use std::io;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use coa_core::EntityKind;
use coa_events::{EventBus, EventEnvelope, EventPublisher, OutboundEvent, PublishError};

use crate::config::AccountingConfig;

type Envelope = EventEnvelope<JsonValue>;

#[derive(Debug)]
enum RelayMessage {
    Event(OutboundEvent),
    Shutdown,
}

/// Counters reported by the relay when it stops.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct RelayStats {
    pub delivered: u64,
    /// Events given up on after exhausting every attempt.
    pub dropped: u64,
}

/// Enqueueing side of the outbox. Cheap to clone.
#[derive(Debug, Clone)]
pub struct OutboxPublisher {
    queue: mpsc::Sender<RelayMessage>,
}

impl EventPublisher for OutboxPublisher {
    fn publish(&self, event: OutboundEvent) -> Result<(), PublishError> {
        self.queue
            .send(RelayMessage::Event(event))
            .map_err(|_| PublishError::Closed)
    }
}

/// Handle to stop and join the relay thread.
#[derive(Debug)]
pub struct OutboxHandle {
    queue: mpsc::Sender<RelayMessage>,
    join: Option<thread::JoinHandle<RelayStats>>,
}

impl OutboxHandle {
    /// Deliver whatever is already queued, then stop the relay.
    pub fn shutdown(mut self) -> RelayStats {
        let _ = self.queue.send(RelayMessage::Shutdown);
        self.join
            .take()
            .and_then(|join| join.join().ok())
            .unwrap_or_default()
    }
}

#[derive(Debug, Copy, Clone)]
struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
    tick: Duration,
}

/// Spawns the relay.
#[derive(Debug)]
pub struct Outbox;

impl Outbox {
    pub fn spawn<B>(bus: B, config: &AccountingConfig) -> io::Result<(OutboxPublisher, OutboxHandle)>
    where
        B: EventBus<Envelope> + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let policy = RetryPolicy {
            max_attempts: config.publish_max_attempts.max(1),
            backoff: config.publish_retry_backoff(),
            tick: config.relay_poll_interval(),
        };

        let join = thread::Builder::new()
            .name("outbox-relay".to_string())
            .spawn(move || Relay::new(bus, policy).run(rx))?;

        Ok((
            OutboxPublisher { queue: tx.clone() },
            OutboxHandle {
                queue: tx,
                join: Some(join),
            },
        ))
    }
}

struct Relay<B> {
    bus: B,
    policy: RetryPolicy,
    sequences: HashMap<(EntityKind, String), u64>,
    stats: RelayStats,
}

impl<B> Relay<B>
where
    B: EventBus<Envelope>,
{
    fn new(bus: B, policy: RetryPolicy) -> Self {
        Self {
            bus,
            policy,
            sequences: HashMap::new(),
            stats: RelayStats::default(),
        }
    }

    fn run(mut self, queue: mpsc::Receiver<RelayMessage>) -> RelayStats {
        loop {
            match queue.recv_timeout(self.policy.tick) {
                Ok(RelayMessage::Event(event)) => self.relay(event),
                Ok(RelayMessage::Shutdown) => {
                    while let Ok(message) = queue.try_recv() {
                        if let RelayMessage::Event(event) = message {
                            self.relay(event);
                        }
                    }
                    break;
                }
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }

        info!(
            delivered = self.stats.delivered,
            dropped = self.stats.dropped,
            "outbox relay stopped"
        );
        self.stats
    }

    fn relay(&mut self, event: OutboundEvent) {
        // A dropped event still consumes its number, so subscribers can see the gap.
        let sequence = self
            .sequences
            .entry((event.entity_kind, event.entity_identifier.clone()))
            .and_modify(|n| *n += 1)
            .or_insert(1);
        let envelope = EventEnvelope::sequenced(event, *sequence);

        for attempt in 1..=self.policy.max_attempts {
            match self.bus.publish(envelope.clone()) {
                Ok(()) => {
                    debug!(
                        event_type = envelope.event_type(),
                        entity = envelope.entity_identifier(),
                        sequence = envelope.sequence_number(),
                        attempt,
                        "event relayed"
                    );
                    self.stats.delivered += 1;
                    return;
                }
                Err(err) => {
                    warn!(
                        event_type = envelope.event_type(),
                        entity = envelope.entity_identifier(),
                        attempt,
                        error = ?err,
                        "event bus publish failed"
                    );
                    if attempt < self.policy.max_attempts {
                        thread::sleep(self.policy.backoff * attempt);
                    }
                }
            }
        }

        warn!(
            event_type = envelope.event_type(),
            entity = envelope.entity_identifier(),
            sequence = envelope.sequence_number(),
            "event dropped after retries"
        );
        self.stats.dropped += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use chrono::Utc;
    use uuid::Uuid;

    use coa_events::{InMemoryEventBus, Subscription};

    fn event(kind: EntityKind, id: &str, event_type: &str) -> OutboundEvent {
        OutboundEvent {
            event_id: Uuid::now_v7(),
            event_type: event_type.to_string(),
            event_version: 1,
            entity_kind: kind,
            entity_identifier: id.to_string(),
            occurred_at: Utc::now(),
            payload: serde_json::json!({ "identifier": id }),
        }
    }

    fn fast_config() -> AccountingConfig {
        AccountingConfig {
            publish_retry_backoff_ms: 1,
            relay_poll_interval_ms: 10,
            ..AccountingConfig::default()
        }
    }

    /// Fails the first `failures` publications, then forwards to an in-memory bus.
    struct FlakyBus {
        failures: AtomicU32,
        inner: InMemoryEventBus<Envelope>,
    }

    impl EventBus<Envelope> for FlakyBus {
        type Error = String;

        fn publish(&self, message: Envelope) -> Result<(), Self::Error> {
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err("broker unavailable".to_string());
            }
            self.inner.publish(message).map_err(|e| e.to_string())
        }

        fn subscribe(&self) -> Subscription<Envelope> {
            self.inner.subscribe()
        }
    }

    #[test]
    fn sequences_are_per_entity_and_in_order() {
        let bus = Arc::new(InMemoryEventBus::new());
        let sub = bus.subscribe();
        let (publisher, handle) = Outbox::spawn(bus.clone(), &fast_config()).unwrap();

        publisher.publish(event(EntityKind::Ledger, "1000", "accounting.ledger.created")).unwrap();
        publisher.publish(event(EntityKind::Account, "1000", "accounting.account.created")).unwrap();
        publisher.publish(event(EntityKind::Ledger, "1000", "accounting.ledger.updated")).unwrap();

        let stats = handle.shutdown();
        assert_eq!(stats, RelayStats { delivered: 3, dropped: 0 });

        let seen: Vec<_> = std::iter::from_fn(|| sub.try_recv().ok())
            .map(|e| (e.entity_kind(), e.event_type().to_string(), e.sequence_number()))
            .collect();
        assert_eq!(
            seen,
            [
                (EntityKind::Ledger, "accounting.ledger.created".to_string(), 1),
                (EntityKind::Account, "accounting.account.created".to_string(), 1),
                (EntityKind::Ledger, "accounting.ledger.updated".to_string(), 2),
            ]
        );
    }

    #[test]
    fn transient_bus_failures_are_retried() {
        let bus = Arc::new(FlakyBus {
            failures: AtomicU32::new(2),
            inner: InMemoryEventBus::new(),
        });
        let sub = bus.subscribe();
        let (publisher, handle) = Outbox::spawn(bus.clone(), &fast_config()).unwrap();

        publisher.publish(event(EntityKind::Ledger, "1000", "accounting.ledger.created")).unwrap();
        let stats = handle.shutdown();

        assert_eq!(stats, RelayStats { delivered: 1, dropped: 0 });
        assert_eq!(sub.try_recv().unwrap().sequence_number(), 1);
    }

    #[test]
    fn exhausted_retries_drop_the_event_and_leave_a_gap() {
        let bus = Arc::new(FlakyBus {
            failures: AtomicU32::new(3),
            inner: InMemoryEventBus::new(),
        });
        let sub = bus.subscribe();
        let (publisher, handle) = Outbox::spawn(bus.clone(), &fast_config()).unwrap();

        publisher.publish(event(EntityKind::Ledger, "1000", "accounting.ledger.created")).unwrap();
        publisher.publish(event(EntityKind::Ledger, "1000", "accounting.ledger.updated")).unwrap();
        let stats = handle.shutdown();

        assert_eq!(stats, RelayStats { delivered: 1, dropped: 1 });
        let delivered = sub.try_recv().unwrap();
        assert_eq!(delivered.event_type(), "accounting.ledger.updated");
        assert_eq!(delivered.sequence_number(), 2);
    }

    #[test]
    fn publishing_after_shutdown_reports_closed() {
        let bus = Arc::new(InMemoryEventBus::<Envelope>::new());
        let (publisher, handle) = Outbox::spawn(bus, &fast_config()).unwrap();
        handle.shutdown();

        let err = publisher
            .publish(event(EntityKind::Ledger, "1000", "accounting.ledger.created"))
            .unwrap_err();
        assert_eq!(err, PublishError::Closed);
    }
}
