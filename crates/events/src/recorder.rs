//! Records envelopes seen on a bus so callers can wait for them.
//!
//! The recorder is passed around explicitly; there is no process-wide instance.
//! Typical use in tests:
//!
//! ```ignore
//! let recorder = EventRecorder::attach(&bus, Duration::from_secs(2))?;
//! service.create_ledger(&ctx, ledger)?;
//! assert!(recorder.wait("accounting.ledger.created", "1000"));
//! ```

use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value as JsonValue;

use crate::bus::EventBus;
use crate::envelope::EventEnvelope;

type Envelope = EventEnvelope<JsonValue>;

#[derive(Debug, Default)]
struct Recorded {
    envelopes: Mutex<Vec<Envelope>>,
    arrived: Condvar,
}

/// Subscriber that keeps every envelope it receives.
#[derive(Debug, Clone)]
pub struct EventRecorder {
    recorded: Arc<Recorded>,
    timeout: Duration,
}

impl EventRecorder {
    /// Subscribe to `bus` and record on a background thread.
    ///
    /// The subscription is taken before returning, so nothing published afterwards
    /// is missed. The thread ends when the bus goes away.
    pub fn attach<B>(bus: &B, timeout: Duration) -> std::io::Result<Self>
    where
        B: EventBus<Envelope> + ?Sized,
    {
        let subscription = bus.subscribe();
        let recorded = Arc::new(Recorded::default());
        let sink = Arc::clone(&recorded);

        thread::Builder::new()
            .name("event-recorder".to_string())
            .spawn(move || {
                while let Ok(envelope) = subscription.recv() {
                    tracing::debug!(
                        event_type = envelope.event_type(),
                        entity = envelope.entity_identifier(),
                        "event recorded"
                    );
                    let Ok(mut envelopes) = sink.envelopes.lock() else {
                        break;
                    };
                    envelopes.push(envelope);
                    sink.arrived.notify_all();
                }
            })?;

        Ok(Self { recorded, timeout })
    }

    /// Wait until an envelope of `event_type` for `entity_identifier` has been seen.
    ///
    /// Returns `false` if none shows up within the recorder's timeout.
    pub fn wait(&self, event_type: &str, entity_identifier: &str) -> bool {
        let deadline = Instant::now() + self.timeout;
        let Ok(mut envelopes) = self.recorded.envelopes.lock() else {
            return false;
        };

        loop {
            if envelopes
                .iter()
                .any(|e| e.event_type() == event_type && e.entity_identifier() == entity_identifier)
            {
                return true;
            }

            let now = Instant::now();
            if now >= deadline {
                return false;
            }

            envelopes = match self.recorded.arrived.wait_timeout(envelopes, deadline - now) {
                Ok((guard, _)) => guard,
                Err(_) => return false,
            };
        }
    }

    /// Everything recorded so far, in arrival order.
    pub fn recorded(&self) -> Vec<Envelope> {
        self.recorded
            .envelopes
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }

    /// Recorded envelopes for one entity, in arrival order.
    pub fn recorded_for(&self, entity_identifier: &str) -> Vec<Envelope> {
        self.recorded()
            .into_iter()
            .filter(|e| e.entity_identifier() == entity_identifier)
            .collect()
    }
}
