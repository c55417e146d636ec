use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use coa_core::{AccountId, DomainError, DomainResult, Entity, EntityKind, LedgerId};

use crate::audit::{Audit, CommandContext};
use crate::ledger::{AccountKind, MAX_NAME_LEN, validate_name};

/// Operational lifecycle state of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccountState {
    Open,
    Locked,
    Closed,
}

impl AccountState {
    /// Lifecycle table: the state `command` leads to, or `None` if it is not
    /// defined from `self`.
    ///
    /// ```text
    /// OPEN   --lock-->   LOCKED
    /// LOCKED --unlock--> OPEN
    /// OPEN   --close-->  CLOSED
    /// LOCKED --close-->  CLOSED
    /// CLOSED --reopen--> OPEN
    /// ```
    pub fn after(self, command: AccountCommand) -> Option<AccountState> {
        use AccountCommand::*;
        use AccountState::*;

        match (self, command) {
            (Open, Lock) => Some(Locked),
            (Locked, Unlock) => Some(Open),
            (Open | Locked, Close) => Some(Closed),
            (Closed, Reopen) => Some(Open),
            _ => None,
        }
    }
}

impl core::fmt::Display for AccountState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            AccountState::Open => "OPEN",
            AccountState::Locked => "LOCKED",
            AccountState::Closed => "CLOSED",
        })
    }
}

/// Lifecycle commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccountCommand {
    Lock,
    Unlock,
    Close,
    Reopen,
}

impl core::fmt::Display for AccountCommand {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            AccountCommand::Lock => "lock",
            AccountCommand::Unlock => "unlock",
            AccountCommand::Close => "close",
            AccountCommand::Reopen => "reopen",
        })
    }
}

/// What a caller submits to create or modify an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDefinition {
    pub identifier: AccountId,
    #[serde(rename = "type")]
    pub kind: AccountKind,
    pub name: String,
    pub ledger: LedgerId,
    #[serde(default)]
    pub holders: BTreeSet<String>,
    #[serde(default)]
    pub signature_authorities: BTreeSet<String>,
    #[serde(default)]
    pub alternative_account_number: Option<String>,
    #[serde(default)]
    pub reference_account: Option<AccountId>,
}

impl AccountDefinition {
    pub fn new(identifier: AccountId, kind: AccountKind, name: impl Into<String>, ledger: LedgerId) -> Self {
        Self {
            identifier,
            kind,
            name: name.into(),
            ledger,
            holders: BTreeSet::new(),
            signature_authorities: BTreeSet::new(),
            alternative_account_number: None,
            reference_account: None,
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        validate_name(&self.name)?;
        if let Some(number) = &self.alternative_account_number {
            if number.chars().count() > MAX_NAME_LEN {
                return Err(DomainError::validation(format!(
                    "alternative account number must be at most {MAX_NAME_LEN} characters"
                )));
            }
        }
        if self.reference_account.as_ref() == Some(&self.identifier) {
            return Err(DomainError::validation("account cannot reference itself"));
        }
        Ok(())
    }
}

/// A persisted account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub identifier: AccountId,
    #[serde(rename = "type")]
    pub kind: AccountKind,
    pub name: String,
    pub ledger: LedgerId,
    pub holders: BTreeSet<String>,
    pub signature_authorities: BTreeSet<String>,
    pub alternative_account_number: Option<String>,
    pub reference_account: Option<AccountId>,
    pub state: AccountState,
    #[serde(flatten)]
    pub audit: Audit,
}

impl Account {
    /// New account in its initial `OPEN` state.
    pub fn open(definition: AccountDefinition, ctx: &CommandContext) -> DomainResult<Self> {
        definition.validate()?;
        Ok(Self {
            identifier: definition.identifier,
            kind: definition.kind,
            name: definition.name,
            ledger: definition.ledger,
            holders: definition.holders,
            signature_authorities: definition.signature_authorities,
            alternative_account_number: definition.alternative_account_number,
            reference_account: definition.reference_account,
            state: AccountState::Open,
            audit: Audit::created(ctx),
        })
    }

    /// Overwrite metadata from `definition`. The state is left untouched.
    pub fn modify(&mut self, definition: &AccountDefinition, ctx: &CommandContext) -> DomainResult<()> {
        if definition.identifier != self.identifier {
            return Err(DomainError::validation(format!(
                "account identifier '{}' cannot be changed to '{}'",
                self.identifier, definition.identifier
            )));
        }
        definition.validate()?;

        self.kind = definition.kind;
        self.name = definition.name.clone();
        self.ledger = definition.ledger.clone();
        self.holders = definition.holders.clone();
        self.signature_authorities = definition.signature_authorities.clone();
        self.alternative_account_number = definition.alternative_account_number.clone();
        self.reference_account = definition.reference_account.clone();
        self.audit.touch(ctx);
        Ok(())
    }

    /// Apply a lifecycle command, or reject it with `InvalidTransition`.
    pub fn transition(&mut self, command: AccountCommand, ctx: &CommandContext) -> DomainResult<AccountState> {
        let next = self.state.after(command).ok_or_else(|| {
            DomainError::invalid_transition(self.identifier.as_str(), self.state, command)
        })?;
        self.state = next;
        self.audit.touch(ctx);
        Ok(next)
    }
}

impl Entity for Account {
    type Id = AccountId;
    const KIND: EntityKind = EntityKind::Account;

    fn id(&self) -> &Self::Id {
        &self.identifier
    }
}
