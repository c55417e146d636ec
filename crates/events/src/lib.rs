//! Event contracts shared by the chart-of-accounts services and their subscribers.
//!
//! - [`Event`]: typed domain event (implemented by the accounting crate)
//! - [`EventPublisher`]: the narrow, fire-and-forget port services publish through
//! - [`EventBus`]: fan-out transport consumed by subscribers
//! - [`EventRecorder`]: bus subscriber that records envelopes (tests/dev)

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;
pub mod publisher;
pub mod recorder;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use publisher::{EventPublisher, OutboundEvent, PublishError};
pub use recorder::EventRecorder;
