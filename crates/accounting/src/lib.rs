//! Chart-of-accounts domain: ledgers, accounts and their events.
//!
//! Pure domain logic only: no IO, no persistence, no transport.

pub mod account;
pub mod audit;
pub mod event;
pub mod hierarchy;
pub mod ledger;
pub mod query;

pub use account::{Account, AccountCommand, AccountDefinition, AccountState};
pub use audit::{Audit, CommandContext};
pub use event::{AccountChanged, AccountingEvent, LedgerChanged, LedgerDeleted, event_types};
pub use hierarchy::{LedgerForest, with_direct_children};
pub use ledger::{
    AccountKind, Ledger, LedgerDefinition, LedgerRecord, MAX_DESCRIPTION_LEN, MAX_NAME_LEN,
};
pub use query::{AccountQuery, Page, PageRequest};
