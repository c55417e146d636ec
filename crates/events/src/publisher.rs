//! Outbound port the chart-of-accounts services publish committed changes through.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use coa_core::EntityKind;

use crate::event::Event;

/// A committed change on its way out, before the relay assigns a sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundEvent {
    pub event_id: Uuid,
    pub event_type: String,
    pub event_version: u32,
    pub entity_kind: EntityKind,
    pub entity_identifier: String,
    pub occurred_at: DateTime<Utc>,
    pub payload: JsonValue,
}

impl OutboundEvent {
    /// Build an outbound event from a typed domain event (serde payload).
    pub fn from_typed<E>(event: &E) -> Result<Self, PublishError>
    where
        E: Event + Serialize,
    {
        let payload = serde_json::to_value(event)
            .map_err(|e| PublishError::Serialize(e.to_string()))?;

        Ok(Self {
            event_id: Uuid::now_v7(),
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            entity_kind: event.entity_kind(),
            entity_identifier: event.entity_identifier().to_string(),
            occurred_at: event.occurred_at(),
            payload,
        })
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PublishError {
    #[error("event payload serialization failed: {0}")]
    Serialize(String),

    /// The outbound queue is gone (relay shut down).
    #[error("event publisher closed")]
    Closed,
}

/// Fire-and-forget publication of committed state changes.
///
/// Implementations must not block on subscribers. A returned error means the
/// event was not accepted for delivery; the state change it describes stays
/// committed regardless.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: OutboundEvent) -> Result<(), PublishError>;
}

impl<P> EventPublisher for Arc<P>
where
    P: EventPublisher + ?Sized,
{
    fn publish(&self, event: OutboundEvent) -> Result<(), PublishError> {
        (**self).publish(event)
    }
}
