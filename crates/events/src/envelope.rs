use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use coa_core::EntityKind;

use crate::publisher::OutboundEvent;

/// Envelope for a delivered event.
///
/// This is the unit subscribers receive from the bus.
///
/// - `sequence_number` is monotonically increasing per `(entity_kind, entity_identifier)`,
///   starting at 1. Subscribers may use it to drop redeliveries.
/// - `payload` is the serialized domain event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    event_type: String,
    event_version: u32,

    entity_kind: EntityKind,
    entity_identifier: String,

    sequence_number: u64,
    occurred_at: DateTime<Utc>,

    payload: E,
}

impl<E> EventEnvelope<E> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        event_id: Uuid,
        event_type: impl Into<String>,
        event_version: u32,
        entity_kind: EntityKind,
        entity_identifier: impl Into<String>,
        sequence_number: u64,
        occurred_at: DateTime<Utc>,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            event_type: event_type.into(),
            event_version,
            entity_kind,
            entity_identifier: entity_identifier.into(),
            sequence_number,
            occurred_at,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn event_version(&self) -> u32 {
        self.event_version
    }

    pub fn entity_kind(&self) -> EntityKind {
        self.entity_kind
    }

    pub fn entity_identifier(&self) -> &str {
        &self.entity_identifier
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}

impl EventEnvelope<serde_json::Value> {
    /// Seal an outbound event with its per-entity sequence number.
    pub fn sequenced(event: OutboundEvent, sequence_number: u64) -> Self {
        Self {
            event_id: event.event_id,
            event_type: event.event_type,
            event_version: event.event_version,
            entity_kind: event.entity_kind,
            entity_identifier: event.entity_identifier,
            sequence_number,
            occurred_at: event.occurred_at,
            payload: event.payload,
        }
    }
}
