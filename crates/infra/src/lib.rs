//! Infrastructure layer: chart store, services, outbox relay, configuration.
//!
//! ```text
//! caller → LedgerHierarchyService / AccountLifecycleService
//!        → ChartStore (atomic unit of work)
//!        → OutboxPublisher → relay thread → EventBus → subscribers
//! ```

pub mod config;
pub mod error;
pub mod outbox;
pub mod services;
pub mod store;

pub use config::{AccountingConfig, ConfigError};
pub use error::{ErrorKind, ServiceError, ServiceResult, StoreError};
pub use outbox::{Outbox, OutboxHandle, OutboxPublisher, RelayStats};
pub use services::{AccountLifecycleService, LedgerHierarchyService};
pub use store::{AccountStore, ChartStore, InMemoryChartStore, LedgerStore, UnitOfWork};
