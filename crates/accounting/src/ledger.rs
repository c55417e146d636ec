use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use coa_core::{DomainError, DomainResult, Entity, EntityKind, LedgerId};

use crate::audit::{Audit, CommandContext};

/// Longest accepted ledger/account name.
pub const MAX_NAME_LEN: usize = 256;
/// Longest accepted ledger description.
pub const MAX_DESCRIPTION_LEN: usize = 2048;

/// High-level classification of a chart entry (determines normal balance side).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccountKind {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

/// What a caller submits to create or modify a ledger.
///
/// `sub_ledgers` is only honoured on creation, where the whole subtree is
/// persisted in one go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerDefinition {
    pub identifier: LedgerId,
    #[serde(rename = "type")]
    pub kind: AccountKind,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub show_accounts_in_chart: bool,
    #[serde(default)]
    pub sub_ledgers: Vec<LedgerDefinition>,
}

impl LedgerDefinition {
    pub fn new(identifier: LedgerId, kind: AccountKind, name: impl Into<String>) -> Self {
        Self {
            identifier,
            kind,
            name: name.into(),
            description: None,
            show_accounts_in_chart: false,
            sub_ledgers: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_sub_ledger(mut self, sub_ledger: LedgerDefinition) -> Self {
        self.sub_ledgers.push(sub_ledger);
        self
    }

    /// Validate the mutable fields (not the nested subtree).
    pub fn validate(&self) -> DomainResult<()> {
        validate_name(&self.name)?;
        if let Some(description) = &self.description {
            if description.chars().count() > MAX_DESCRIPTION_LEN {
                return Err(DomainError::validation(format!(
                    "ledger description must be at most {MAX_DESCRIPTION_LEN} characters"
                )));
            }
        }
        Ok(())
    }

    /// Flatten this definition and its nested sub-ledgers into records, parents first.
    ///
    /// Every node is validated. An identifier that appears twice inside the payload
    /// is rejected as `AlreadyExists`; collisions with already persisted ledgers are
    /// the store's call.
    pub fn into_records(
        self,
        parent: Option<LedgerId>,
        ctx: &CommandContext,
    ) -> DomainResult<Vec<LedgerRecord>> {
        let mut records = Vec::new();
        let mut seen = HashSet::new();
        let mut pending = vec![(self, parent)];

        while let Some((mut definition, parent)) = pending.pop() {
            definition.validate()?;
            if !seen.insert(definition.identifier.clone()) {
                return Err(DomainError::already_exists(
                    EntityKind::Ledger,
                    definition.identifier.as_str(),
                ));
            }

            let children = std::mem::take(&mut definition.sub_ledgers);
            let id = definition.identifier.clone();
            // Reverse so siblings come off the stack in submission order.
            for child in children.into_iter().rev() {
                pending.push((child, Some(id.clone())));
            }
            records.push(LedgerRecord::create(definition, parent, ctx));
        }

        Ok(records)
    }
}

pub(crate) fn validate_name(name: &str) -> DomainResult<()> {
    if name.trim().is_empty() {
        return Err(DomainError::validation("name must not be blank"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(DomainError::validation(format!(
            "name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}

/// A persisted ledger node.
///
/// Holds only a weak back-reference to its parent; children are derived by the
/// store's parent index, never embedded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerRecord {
    pub identifier: LedgerId,
    #[serde(rename = "type")]
    pub kind: AccountKind,
    pub name: String,
    pub description: Option<String>,
    pub show_accounts_in_chart: bool,
    pub parent_ledger_identifier: Option<LedgerId>,
    #[serde(flatten)]
    pub audit: Audit,
}

impl LedgerRecord {
    fn create(definition: LedgerDefinition, parent: Option<LedgerId>, ctx: &CommandContext) -> Self {
        Self {
            identifier: definition.identifier,
            kind: definition.kind,
            name: definition.name,
            description: definition.description,
            show_accounts_in_chart: definition.show_accounts_in_chart,
            parent_ledger_identifier: parent,
            audit: Audit::created(ctx),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_ledger_identifier.is_none()
    }

    /// Overwrite type, name, description and the chart flag from `definition`, then
    /// stamp the modification.
    ///
    /// Identifier and parent never change; nested sub-ledgers are ignored.
    pub fn modify(&mut self, definition: &LedgerDefinition, ctx: &CommandContext) -> DomainResult<()> {
        if definition.identifier != self.identifier {
            return Err(DomainError::validation(format!(
                "ledger identifier '{}' cannot be changed to '{}'",
                self.identifier, definition.identifier
            )));
        }
        definition.validate()?;

        self.kind = definition.kind;
        self.name = definition.name.clone();
        self.description = definition.description.clone();
        self.show_accounts_in_chart = definition.show_accounts_in_chart;
        self.audit.touch(ctx);
        Ok(())
    }
}

impl Entity for LedgerRecord {
    type Id = LedgerId;
    const KIND: EntityKind = EntityKind::Ledger;

    fn id(&self) -> &Self::Id {
        &self.identifier
    }
}

/// Read view of a ledger with its sub-ledgers materialized.
///
/// How deep `sub_ledgers` goes depends on the read: one level for a single
/// lookup, the full subtree when fetching the whole chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ledger {
    pub identifier: LedgerId,
    #[serde(rename = "type")]
    pub kind: AccountKind,
    pub name: String,
    pub description: Option<String>,
    pub show_accounts_in_chart: bool,
    pub parent_ledger_identifier: Option<LedgerId>,
    pub sub_ledgers: Vec<Ledger>,
    #[serde(flatten)]
    pub audit: Audit,
}

impl Ledger {
    pub fn from_record(record: LedgerRecord, sub_ledgers: Vec<Ledger>) -> Self {
        Self {
            identifier: record.identifier,
            kind: record.kind,
            name: record.name,
            description: record.description,
            show_accounts_in_chart: record.show_accounts_in_chart,
            parent_ledger_identifier: record.parent_ledger_identifier,
            sub_ledgers,
            audit: record.audit,
        }
    }

    /// Leaf view (no sub-ledgers attached).
    pub fn leaf(record: LedgerRecord) -> Self {
        Self::from_record(record, Vec::new())
    }
}

impl Drop for Ledger {
    fn drop(&mut self) {
        // Detach descendants first so dropping a deep chain does not recurse.
        let mut pending = std::mem::take(&mut self.sub_ledgers);
        while let Some(mut ledger) = pending.pop() {
            pending.append(&mut ledger.sub_ledgers);
        }
    }
}
