//! Event publishing/subscription abstraction (mechanics only).
//!
//! The bus distributes already-committed events to any number of subscribers
//! (broadcast semantics). It is the last hop after the outbox relay:
//!
//! ```text
//! Service → Store (commit) → EventPublisher (enqueue) → relay → EventBus → subscribers
//! ```
//!
//! ## Delivery contract
//!
//! - **At-least-once**: an envelope may arrive more than once; consumers must be
//!   idempotent (the per-entity `sequence_number` makes this cheap).
//! - **Per-entity ordering**: envelopes for the same entity identifier arrive in
//!   the order they were committed. Nothing is promised across entities.
//! - **No persistence**: the bus is for distribution, the store is the source of truth.

use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Duration;

/// A subscription to an event stream.
///
/// Each subscription receives a copy of every message published after it was
/// created. Intended for single-threaded consumption.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, std::sync::mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, std::sync::mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// Transport-agnostic pub/sub bus.
///
/// `publish()` may fail (bus full, broker unreachable). The outbox relay retries
/// failed publications; since the state change is already durable, retrying is safe.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
