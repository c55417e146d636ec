use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use coa_core::{EntityKind, LedgerId};
use coa_events::Event;

use crate::account::{Account, AccountCommand};
use crate::ledger::LedgerRecord;

/// Stable event type names, as seen by subscribers.
pub mod event_types {
    pub const LEDGER_CREATED: &str = "accounting.ledger.created";
    pub const LEDGER_UPDATED: &str = "accounting.ledger.updated";
    pub const LEDGER_DELETED: &str = "accounting.ledger.deleted";
    pub const ACCOUNT_CREATED: &str = "accounting.account.created";
    pub const ACCOUNT_UPDATED: &str = "accounting.account.updated";
    pub const ACCOUNT_LOCKED: &str = "accounting.account.locked";
    pub const ACCOUNT_UNLOCKED: &str = "accounting.account.unlocked";
    pub const ACCOUNT_CLOSED: &str = "accounting.account.closed";
    pub const ACCOUNT_REOPENED: &str = "accounting.account.reopened";
}

/// Ledger snapshot after the change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerChanged {
    pub ledger: LedgerRecord,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerDeleted {
    pub identifier: LedgerId,
    pub occurred_at: DateTime<Utc>,
}

/// Account snapshot after the change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountChanged {
    pub account: Account,
    pub occurred_at: DateTime<Utc>,
}

/// Committed change in the chart of accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum AccountingEvent {
    LedgerCreated(LedgerChanged),
    LedgerUpdated(LedgerChanged),
    LedgerDeleted(LedgerDeleted),
    AccountCreated(AccountChanged),
    AccountUpdated(AccountChanged),
    AccountLocked(AccountChanged),
    AccountUnlocked(AccountChanged),
    AccountClosed(AccountChanged),
    AccountReopened(AccountChanged),
}

impl AccountingEvent {
    /// Event for an accepted lifecycle command.
    pub fn account_transitioned(command: AccountCommand, change: AccountChanged) -> Self {
        match command {
            AccountCommand::Lock => AccountingEvent::AccountLocked(change),
            AccountCommand::Unlock => AccountingEvent::AccountUnlocked(change),
            AccountCommand::Close => AccountingEvent::AccountClosed(change),
            AccountCommand::Reopen => AccountingEvent::AccountReopened(change),
        }
    }
}

impl Event for AccountingEvent {
    fn event_type(&self) -> &'static str {
        use event_types::*;

        match self {
            AccountingEvent::LedgerCreated(_) => LEDGER_CREATED,
            AccountingEvent::LedgerUpdated(_) => LEDGER_UPDATED,
            AccountingEvent::LedgerDeleted(_) => LEDGER_DELETED,
            AccountingEvent::AccountCreated(_) => ACCOUNT_CREATED,
            AccountingEvent::AccountUpdated(_) => ACCOUNT_UPDATED,
            AccountingEvent::AccountLocked(_) => ACCOUNT_LOCKED,
            AccountingEvent::AccountUnlocked(_) => ACCOUNT_UNLOCKED,
            AccountingEvent::AccountClosed(_) => ACCOUNT_CLOSED,
            AccountingEvent::AccountReopened(_) => ACCOUNT_REOPENED,
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            AccountingEvent::LedgerCreated(e) | AccountingEvent::LedgerUpdated(e) => e.occurred_at,
            AccountingEvent::LedgerDeleted(e) => e.occurred_at,
            AccountingEvent::AccountCreated(e)
            | AccountingEvent::AccountUpdated(e)
            | AccountingEvent::AccountLocked(e)
            | AccountingEvent::AccountUnlocked(e)
            | AccountingEvent::AccountClosed(e)
            | AccountingEvent::AccountReopened(e) => e.occurred_at,
        }
    }

    fn entity_kind(&self) -> EntityKind {
        match self {
            AccountingEvent::LedgerCreated(_)
            | AccountingEvent::LedgerUpdated(_)
            | AccountingEvent::LedgerDeleted(_) => EntityKind::Ledger,
            _ => EntityKind::Account,
        }
    }

    fn entity_identifier(&self) -> &str {
        match self {
            AccountingEvent::LedgerCreated(e) | AccountingEvent::LedgerUpdated(e) => {
                e.ledger.identifier.as_str()
            }
            AccountingEvent::LedgerDeleted(e) => e.identifier.as_str(),
            AccountingEvent::AccountCreated(e)
            | AccountingEvent::AccountUpdated(e)
            | AccountingEvent::AccountLocked(e)
            | AccountingEvent::AccountUnlocked(e)
            | AccountingEvent::AccountClosed(e)
            | AccountingEvent::AccountReopened(e) => e.account.identifier.as_str(),
        }
    }
}
