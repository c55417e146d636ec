use chrono::{DateTime, Utc};

use coa_core::EntityKind;

/// A domain-agnostic event.
///
/// Events are:
/// - **immutable** (treat them as facts)
/// - **versioned** (schema evolution)
/// - **keyed** by the entity they describe; subscribers correlate on
///   `(entity_kind, entity_identifier)`
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier (e.g. "accounting.ledger.created").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the event occurred (business time).
    fn occurred_at(&self) -> DateTime<Utc>;

    /// Kind of entity the event is about.
    fn entity_kind(&self) -> EntityKind;

    /// Identifier of the affected entity (the correlation key).
    fn entity_identifier(&self) -> &str;
}
