use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;

use coa_accounting::{Account, AccountQuery, LedgerRecord, Page, PageRequest};
use coa_core::{AccountId, Entity, EntityKind, LedgerId};

use super::r#trait::{AccountStore, ChartStore, LedgerStore, UnitOfWork};
use crate::error::StoreError;

#[derive(Debug, Clone)]
struct StoredLedger {
    /// Creation order; keeps sibling order stable across rollbacks.
    position: u64,
    record: LedgerRecord,
}

/// Rows plus the secondary indexes derived from them.
#[derive(Debug, Default)]
struct ChartState {
    next_position: u64,
    ledgers: HashMap<LedgerId, StoredLedger>,
    children: HashMap<LedgerId, BTreeMap<u64, LedgerId>>,
    accounts: BTreeMap<AccountId, Account>,
    accounts_by_ledger: HashMap<LedgerId, BTreeSet<AccountId>>,
}

impl ChartState {
    /// Set (or clear) a ledger row and keep the parent index in step.
    fn put_ledger(&mut self, id: &LedgerId, row: Option<StoredLedger>) -> Option<StoredLedger> {
        let previous = self.ledgers.remove(id);
        if let Some(prev) = &previous {
            if let Some(parent) = &prev.record.parent_ledger_identifier {
                if let Some(siblings) = self.children.get_mut(parent) {
                    siblings.remove(&prev.position);
                    if siblings.is_empty() {
                        self.children.remove(parent);
                    }
                }
            }
        }

        if let Some(row) = row {
            if let Some(parent) = &row.record.parent_ledger_identifier {
                self.children
                    .entry(parent.clone())
                    .or_default()
                    .insert(row.position, id.clone());
            }
            self.ledgers.insert(id.clone(), row);
        }

        previous
    }

    /// Set (or clear) an account row and keep the ledger index in step.
    fn put_account(&mut self, id: &AccountId, row: Option<Account>) -> Option<Account> {
        let previous = self.accounts.remove(id);
        if let Some(prev) = &previous {
            if let Some(ids) = self.accounts_by_ledger.get_mut(&prev.ledger) {
                ids.remove(id);
                if ids.is_empty() {
                    self.accounts_by_ledger.remove(&prev.ledger);
                }
            }
        }

        if let Some(row) = row {
            self.accounts_by_ledger
                .entry(row.ledger.clone())
                .or_default()
                .insert(id.clone());
            self.accounts.insert(id.clone(), row);
        }

        previous
    }

    fn has_children(&self, id: &LedgerId) -> bool {
        self.children.get(id).is_some_and(|c| !c.is_empty())
    }

    fn account_count(&self, ledger: &LedgerId) -> usize {
        self.accounts_by_ledger.get(ledger).map_or(0, BTreeSet::len)
    }
}

fn duplicate<T: Entity>(row: &T) -> StoreError {
    StoreError::Duplicate {
        kind: T::KIND,
        identifier: row.id().to_string(),
    }
}

fn missing_ledger(id: &LedgerId) -> StoreError {
    StoreError::Missing {
        kind: EntityKind::Ledger,
        identifier: id.to_string(),
    }
}

fn missing_account(id: &AccountId) -> StoreError {
    StoreError::Missing {
        kind: EntityKind::Account,
        identifier: id.to_string(),
    }
}

// Direct, non-transactional access. Only reachable through `&ChartState` in
// reads or through `InMemoryTx` in writes.
impl LedgerStore for ChartState {
    fn ledger(&self, id: &LedgerId) -> Result<Option<LedgerRecord>, StoreError> {
        Ok(self.ledgers.get(id).map(|row| row.record.clone()))
    }

    fn ledger_exists(&self, id: &LedgerId) -> Result<bool, StoreError> {
        Ok(self.ledgers.contains_key(id))
    }

    fn children(&self, parent: &LedgerId) -> Result<Vec<LedgerRecord>, StoreError> {
        let Some(ids) = self.children.get(parent) else {
            return Ok(vec![]);
        };
        Ok(ids
            .values()
            .filter_map(|id| self.ledgers.get(id))
            .map(|row| row.record.clone())
            .collect())
    }

    fn ledgers(&self) -> Result<Vec<LedgerRecord>, StoreError> {
        let mut rows: Vec<&StoredLedger> = self.ledgers.values().collect();
        rows.sort_by_key(|row| row.position);
        Ok(rows.into_iter().map(|row| row.record.clone()).collect())
    }

    fn insert_ledger(&mut self, record: LedgerRecord) -> Result<(), StoreError> {
        if self.ledgers.contains_key(&record.identifier) {
            return Err(duplicate(&record));
        }
        if let Some(parent) = &record.parent_ledger_identifier {
            if !self.ledgers.contains_key(parent) {
                return Err(missing_ledger(parent));
            }
        }

        self.next_position += 1;
        let id = record.identifier.clone();
        let row = StoredLedger {
            position: self.next_position,
            record,
        };
        self.put_ledger(&id, Some(row));
        Ok(())
    }

    fn update_ledger(&mut self, record: LedgerRecord) -> Result<(), StoreError> {
        let id = record.identifier.clone();
        let Some(position) = self.ledgers.get(&id).map(|row| row.position) else {
            return Err(missing_ledger(&id));
        };
        self.put_ledger(&id, Some(StoredLedger { position, record }));
        Ok(())
    }

    fn delete_ledger(&mut self, id: &LedgerId) -> Result<LedgerRecord, StoreError> {
        if !self.ledgers.contains_key(id) {
            return Err(missing_ledger(id));
        }
        if self.has_children(id) {
            return Err(StoreError::Referenced {
                identifier: id.to_string(),
                reason: "sub-ledgers".to_string(),
            });
        }
        if self.account_count(id) > 0 {
            return Err(StoreError::Referenced {
                identifier: id.to_string(),
                reason: "accounts".to_string(),
            });
        }

        self.put_ledger(id, None)
            .map(|row| row.record)
            .ok_or_else(|| missing_ledger(id))
    }
}

impl AccountStore for ChartState {
    fn account(&self, id: &AccountId) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts.get(id).cloned())
    }

    fn account_exists(&self, id: &AccountId) -> Result<bool, StoreError> {
        Ok(self.accounts.contains_key(id))
    }

    fn accounts_by_ledger(&self, ledger: &LedgerId) -> Result<Vec<Account>, StoreError> {
        let Some(ids) = self.accounts_by_ledger.get(ledger) else {
            return Ok(vec![]);
        };
        Ok(ids.iter().filter_map(|id| self.accounts.get(id)).cloned().collect())
    }

    fn search_accounts(
        &self,
        query: &AccountQuery,
        page: PageRequest,
    ) -> Result<Page<Account>, StoreError> {
        // BTreeMap iteration is already identifier order.
        let matching = self
            .accounts
            .values()
            .filter(|account| query.matches(account))
            .cloned()
            .collect();
        Ok(Page::slice(matching, page))
    }

    fn insert_account(&mut self, account: Account) -> Result<(), StoreError> {
        if self.accounts.contains_key(&account.identifier) {
            return Err(duplicate(&account));
        }
        if !self.ledgers.contains_key(&account.ledger) {
            return Err(missing_ledger(&account.ledger));
        }

        let id = account.identifier.clone();
        self.put_account(&id, Some(account));
        Ok(())
    }

    fn update_account(&mut self, account: Account) -> Result<(), StoreError> {
        if !self.accounts.contains_key(&account.identifier) {
            return Err(missing_account(&account.identifier));
        }
        if !self.ledgers.contains_key(&account.ledger) {
            return Err(missing_ledger(&account.ledger));
        }

        let id = account.identifier.clone();
        self.put_account(&id, Some(account));
        Ok(())
    }
}

/// Prior image of a row touched inside a unit of work.
#[derive(Debug)]
enum Undo {
    Ledger(LedgerId, Option<StoredLedger>),
    Account(AccountId, Option<Account>),
}

/// Write-side unit of work: delegates to the state and journals prior images.
struct InMemoryTx<'a> {
    state: &'a mut ChartState,
    undo: Vec<Undo>,
}

impl InMemoryTx<'_> {
    fn remember_ledger(&mut self, id: &LedgerId) {
        let prior = self.state.ledgers.get(id).cloned();
        self.undo.push(Undo::Ledger(id.clone(), prior));
    }

    fn remember_account(&mut self, id: &AccountId) {
        let prior = self.state.accounts.get(id).cloned();
        self.undo.push(Undo::Account(id.clone(), prior));
    }

    fn rollback(self) {
        for entry in self.undo.into_iter().rev() {
            match entry {
                Undo::Ledger(id, prior) => {
                    self.state.put_ledger(&id, prior);
                }
                Undo::Account(id, prior) => {
                    self.state.put_account(&id, prior);
                }
            }
        }
    }
}

impl LedgerStore for InMemoryTx<'_> {
    fn ledger(&self, id: &LedgerId) -> Result<Option<LedgerRecord>, StoreError> {
        self.state.ledger(id)
    }

    fn ledger_exists(&self, id: &LedgerId) -> Result<bool, StoreError> {
        self.state.ledger_exists(id)
    }

    fn children(&self, parent: &LedgerId) -> Result<Vec<LedgerRecord>, StoreError> {
        self.state.children(parent)
    }

    fn ledgers(&self) -> Result<Vec<LedgerRecord>, StoreError> {
        self.state.ledgers()
    }

    fn insert_ledger(&mut self, record: LedgerRecord) -> Result<(), StoreError> {
        self.remember_ledger(&record.identifier);
        self.state.insert_ledger(record)
    }

    fn update_ledger(&mut self, record: LedgerRecord) -> Result<(), StoreError> {
        self.remember_ledger(&record.identifier);
        self.state.update_ledger(record)
    }

    fn delete_ledger(&mut self, id: &LedgerId) -> Result<LedgerRecord, StoreError> {
        self.remember_ledger(id);
        self.state.delete_ledger(id)
    }
}

impl AccountStore for InMemoryTx<'_> {
    fn account(&self, id: &AccountId) -> Result<Option<Account>, StoreError> {
        self.state.account(id)
    }

    fn account_exists(&self, id: &AccountId) -> Result<bool, StoreError> {
        self.state.account_exists(id)
    }

    fn accounts_by_ledger(&self, ledger: &LedgerId) -> Result<Vec<Account>, StoreError> {
        self.state.accounts_by_ledger(ledger)
    }

    fn search_accounts(
        &self,
        query: &AccountQuery,
        page: PageRequest,
    ) -> Result<Page<Account>, StoreError> {
        self.state.search_accounts(query, page)
    }

    fn insert_account(&mut self, account: Account) -> Result<(), StoreError> {
        self.remember_account(&account.identifier);
        self.state.insert_account(account)
    }

    fn update_account(&mut self, account: Account) -> Result<(), StoreError> {
        self.remember_account(&account.identifier);
        self.state.update_account(account)
    }
}

/// In-memory chart store.
///
/// Intended for tests/dev. One `RwLock` guards rows and indexes together, so a
/// write unit of work is serialized against every other one; rollback replays
/// the journaled prior images in reverse.
#[derive(Debug, Default)]
pub struct InMemoryChartStore {
    state: RwLock<ChartState>,
}

impl InMemoryChartStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChartStore for InMemoryChartStore {
    fn read<R, E>(&self, work: impl FnOnce(&dyn UnitOfWork) -> Result<R, E>) -> Result<R, E>
    where
        E: From<StoreError>,
    {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        work(&*state)
    }

    fn write_and_then<R, E>(
        &self,
        work: impl FnOnce(&mut dyn UnitOfWork) -> Result<R, E>,
        committed: impl FnOnce(&R),
    ) -> Result<R, E>
    where
        E: From<StoreError>,
    {
        let mut state = self.state.write().map_err(|_| StoreError::Poisoned)?;
        let mut tx = InMemoryTx {
            state: &mut *state,
            undo: Vec::new(),
        };

        match work(&mut tx) {
            Ok(value) => {
                // Still under the write guard.
                committed(&value);
                Ok(value)
            }
            Err(err) => {
                tx.rollback();
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coa_accounting::{
        AccountDefinition, AccountKind, AccountState, CommandContext, LedgerDefinition,
    };
    use coa_core::{Actor, DomainError};

    use crate::error::ServiceError;

    fn ctx() -> CommandContext {
        CommandContext::now(Actor::new("setna"))
    }

    fn lid(s: &str) -> LedgerId {
        LedgerId::new(s).unwrap()
    }

    fn record(id: &str, parent: Option<&str>) -> LedgerRecord {
        LedgerDefinition::new(lid(id), AccountKind::Asset, id)
            .into_records(parent.map(lid), &ctx())
            .unwrap()
            .remove(0)
    }

    fn account(id: &str, ledger: &str) -> Account {
        Account::open(
            AccountDefinition::new(AccountId::new(id).unwrap(), AccountKind::Asset, id, lid(ledger)),
            &ctx(),
        )
        .unwrap()
    }

    fn insert(store: &InMemoryChartStore, r: LedgerRecord) {
        store
            .write(|uow| uow.insert_ledger(r).map_err(ServiceError::from))
            .unwrap();
    }

    #[test]
    fn children_come_back_in_creation_order() {
        let store = InMemoryChartStore::new();
        insert(&store, record("p", None));
        for id in ["c3", "c1", "c2"] {
            insert(&store, record(id, Some("p")));
        }

        let children: Vec<String> = store
            .read(|uow| uow.children(&lid("p")).map_err(ServiceError::from))
            .unwrap()
            .into_iter()
            .map(|r| r.identifier.to_string())
            .collect();
        assert_eq!(children, ["c3", "c1", "c2"]);
    }

    #[test]
    fn duplicate_insert_is_refused_anywhere_in_the_forest() {
        let store = InMemoryChartStore::new();
        insert(&store, record("p", None));
        insert(&store, record("c", Some("p")));

        let err = store
            .write(|uow| uow.insert_ledger(record("c", None)).map_err(ServiceError::from))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::AlreadyExists { .. })));
    }

    #[test]
    fn failed_unit_of_work_rolls_back_every_mutation() {
        let store = InMemoryChartStore::new();
        insert(&store, record("p", None));

        let result: Result<(), ServiceError> = store.write(|uow| {
            uow.insert_ledger(record("a", Some("p")))?;
            uow.insert_ledger(record("b", Some("a")))?;
            uow.insert_account(account("acc", "b"))?;
            uow.delete_ledger(&lid("zzz"))?;
            Ok(())
        });
        assert!(result.is_err());

        store
            .read(|uow| {
                assert!(!uow.ledger_exists(&lid("a"))?);
                assert!(!uow.ledger_exists(&lid("b"))?);
                assert!(uow.children(&lid("p"))?.is_empty());
                assert!(!uow.account_exists(&AccountId::new("acc").unwrap())?);
                Ok::<_, ServiceError>(())
            })
            .unwrap();
    }

    #[test]
    fn commit_hook_runs_only_for_committed_work() {
        let store = InMemoryChartStore::new();
        let mut seen = Vec::new();

        store
            .write_and_then(
                |uow| {
                    uow.insert_ledger(record("p", None))?;
                    Ok::<_, ServiceError>("p")
                },
                |id| seen.push(id.to_string()),
            )
            .unwrap();

        let failed = store.write_and_then(
            |uow| {
                uow.insert_ledger(record("p", None))?;
                Ok::<_, ServiceError>("again")
            },
            |id| seen.push(id.to_string()),
        );
        assert!(failed.is_err());
        assert_eq!(seen, ["p"]);
    }

    #[test]
    fn commit_hook_runs_before_the_next_writer_gets_in() {
        let store = std::sync::Arc::new(InMemoryChartStore::new());
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();

        let first = {
            let store = store.clone();
            std::thread::spawn(move || {
                store
                    .write_and_then(
                        |uow| uow.insert_ledger(record("p", None)).map_err(ServiceError::from),
                        |_| {
                            entered_tx.send(()).unwrap();
                            release_rx.recv().unwrap();
                        },
                    )
                    .unwrap();
            })
        };
        entered_rx.recv().unwrap();

        let second = {
            let store = store.clone();
            std::thread::spawn(move || {
                store
                    .write(|uow| uow.delete_ledger(&lid("p")).map_err(ServiceError::from))
                    .unwrap();
            })
        };
        std::thread::sleep(std::time::Duration::from_millis(50));
        // The delete is parked on the lock while the hook is still running.
        assert!(!second.is_finished());

        release_tx.send(()).unwrap();
        first.join().unwrap();
        second.join().unwrap();
    }

    #[test]
    fn rollback_restores_deleted_ledger_in_its_old_position() {
        let store = InMemoryChartStore::new();
        insert(&store, record("p", None));
        insert(&store, record("c1", Some("p")));
        insert(&store, record("c2", Some("p")));

        let _ = store.write(|uow| {
            uow.delete_ledger(&lid("c1"))?;
            Err::<(), _>(ServiceError::Store("abort".to_string()))
        });

        let children: Vec<String> = store
            .read(|uow| uow.children(&lid("p")).map_err(ServiceError::from))
            .unwrap()
            .into_iter()
            .map(|r| r.identifier.to_string())
            .collect();
        assert_eq!(children, ["c1", "c2"]);
    }

    #[test]
    fn conditional_delete_refuses_referenced_ledgers() {
        let store = InMemoryChartStore::new();
        insert(&store, record("p", None));
        insert(&store, record("c", Some("p")));
        insert(&store, record("solo", None));
        store
            .write(|uow| uow.insert_account(account("acc", "solo")).map_err(ServiceError::from))
            .unwrap();

        for id in ["p", "solo"] {
            let err = store
                .write(|uow| uow.delete_ledger(&lid(id)).map_err(ServiceError::from))
                .unwrap_err();
            assert!(matches!(err, ServiceError::Domain(DomainError::ReferenceExists { .. })));
        }

        store
            .write(|uow| uow.delete_ledger(&lid("c")).map_err(ServiceError::from))
            .unwrap();
        store
            .write(|uow| uow.delete_ledger(&lid("p")).map_err(ServiceError::from))
            .unwrap();
    }

    #[test]
    fn moving_an_account_updates_the_ledger_index() {
        let store = InMemoryChartStore::new();
        insert(&store, record("a", None));
        insert(&store, record("b", None));
        store
            .write(|uow| uow.insert_account(account("acc", "a")).map_err(ServiceError::from))
            .unwrap();

        let mut moved = account("acc", "b");
        moved.state = AccountState::Locked;
        store
            .write(|uow| uow.update_account(moved).map_err(ServiceError::from))
            .unwrap();

        store
            .read(|uow| {
                assert!(uow.accounts_by_ledger(&lid("a"))?.is_empty());
                assert_eq!(uow.accounts_by_ledger(&lid("b"))?.len(), 1);
                Ok::<_, ServiceError>(())
            })
            .unwrap();
    }

    #[test]
    fn search_filters_by_term_and_excluded_state() {
        let store = InMemoryChartStore::new();
        insert(&store, record("l", None));
        for id in ["cash-1", "cash-2", "bank-1"] {
            store
                .write(|uow| uow.insert_account(account(id, "l")).map_err(ServiceError::from))
                .unwrap();
        }
        let mut closed = account("cash-2", "l");
        closed.state = AccountState::Closed;
        store
            .write(|uow| uow.update_account(closed).map_err(ServiceError::from))
            .unwrap();

        let query = AccountQuery {
            term: Some("cash".to_string()),
            excluded_state: Some(AccountState::Closed),
            page: PageRequest::default(),
        };
        let page = store
            .read(|uow| {
                uow.search_accounts(&query, PageRequest::new(1, 10))
                    .map_err(ServiceError::from)
            })
            .unwrap();

        let ids: Vec<_> = page.items.iter().map(|a| a.identifier.to_string()).collect();
        assert_eq!(ids, ["cash-1"]);
        assert_eq!(page.total_elements, 1);
    }
}
