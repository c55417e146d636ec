use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use coa_core::Actor;

/// Who issued a command, and when.
///
/// Every mutating command carries one; it is the only source of audit stamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandContext {
    actor: Actor,
    occurred_at: DateTime<Utc>,
}

impl CommandContext {
    pub fn new(actor: Actor, occurred_at: DateTime<Utc>) -> Self {
        Self { actor, occurred_at }
    }

    /// Context stamped with the current wall-clock time.
    pub fn now(actor: Actor) -> Self {
        Self::new(actor, Utc::now())
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

/// Creation/modification trail shared by ledgers and accounts.
///
/// `created_*` is set once; `last_modified_*` stays empty until the first update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Audit {
    pub created_by: Actor,
    pub created_on: DateTime<Utc>,
    pub last_modified_by: Option<Actor>,
    pub last_modified_on: Option<DateTime<Utc>>,
}

impl Audit {
    pub fn created(ctx: &CommandContext) -> Self {
        Self {
            created_by: ctx.actor().clone(),
            created_on: ctx.occurred_at(),
            last_modified_by: None,
            last_modified_on: None,
        }
    }

    pub fn touch(&mut self, ctx: &CommandContext) {
        self.last_modified_by = Some(ctx.actor().clone());
        self.last_modified_on = Some(ctx.occurred_at());
    }
}
