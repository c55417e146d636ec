//! Durable storage boundary for ledgers and accounts.
//!
//! Services never touch storage outside a unit of work: every command runs
//! inside one [`ChartStore::write_and_then`] call, so its checks and its mutations see
//! the same state and either all land or none do.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryChartStore;
pub use r#trait::{AccountStore, ChartStore, LedgerStore, UnitOfWork};
