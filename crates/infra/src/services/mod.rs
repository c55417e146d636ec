//! Command/query services over the chart store.
//!
//! Every command follows the same shape:
//!
//! ```text
//! validate → store.write_and_then(check + mutate, atomically) → commit → publish events
//! ```
//!
//! Publication happens strictly after the unit of work committed and is not part
//! of it: a publisher failure is logged and never undoes the change. Events are
//! handed over before the store lets the next writer in, so two commits on the
//! same entity reach the publisher in commit order.

pub mod account;
pub mod ledger;

pub use account::AccountLifecycleService;
pub use ledger::LedgerHierarchyService;

use tracing::warn;

use coa_accounting::{AccountingEvent, PageRequest};
use coa_events::{Event, EventPublisher, OutboundEvent};

use crate::config::AccountingConfig;
use crate::error::ServiceResult;
use crate::store::{ChartStore, UnitOfWork};

/// Page size policy taken from configuration.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct Paging {
    default_per_page: u32,
    max_per_page: u32,
}

impl Paging {
    pub(crate) fn from_config(config: &AccountingConfig) -> Self {
        Self {
            default_per_page: config.default_page_size,
            max_per_page: config.max_page_size,
        }
    }

    pub(crate) fn resolve(&self, request: PageRequest) -> PageRequest {
        request.normalized(self.default_per_page, self.max_per_page)
    }
}

/// Hand committed events to the publisher, in order. Failures are logged only.
fn publish_committed<P>(publisher: &P, events: Vec<AccountingEvent>)
where
    P: EventPublisher + ?Sized,
{
    for event in events {
        let outcome = OutboundEvent::from_typed(&event).and_then(|out| publisher.publish(out));
        if let Err(err) = outcome {
            warn!(
                event_type = event.event_type(),
                entity = event.entity_identifier(),
                error = %err,
                "event publication failed; state change stays committed"
            );
        }
    }
}

/// Run `work` as one unit of work and publish the events it produced, in order,
/// while the store still excludes other writers.
pub(crate) fn commit_and_publish<S, P, R>(
    store: &S,
    publisher: &P,
    work: impl FnOnce(&mut dyn UnitOfWork) -> ServiceResult<R>,
    events: impl FnOnce(&R) -> Vec<AccountingEvent>,
) -> ServiceResult<R>
where
    S: ChartStore,
    P: EventPublisher + ?Sized,
{
    store.write_and_then(work, |committed| publish_committed(publisher, events(committed)))
}
