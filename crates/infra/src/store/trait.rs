use std::sync::Arc;

use coa_accounting::{Account, AccountQuery, LedgerRecord, Page, PageRequest};
use coa_core::{AccountId, LedgerId};

use crate::error::StoreError;

/// Ledger persistence.
///
/// Implementations must:
/// - reject an insert whose identifier exists anywhere in the forest (`Duplicate`)
/// - reject an insert whose parent does not exist (`Missing`)
/// - refuse to delete a ledger that still has children or accounts (`Referenced`)
/// - return children in creation order
pub trait LedgerStore {
    fn ledger(&self, id: &LedgerId) -> Result<Option<LedgerRecord>, StoreError>;

    fn ledger_exists(&self, id: &LedgerId) -> Result<bool, StoreError>;

    /// Direct children of `parent`, in creation order.
    fn children(&self, parent: &LedgerId) -> Result<Vec<LedgerRecord>, StoreError>;

    /// Every ledger, in creation order.
    fn ledgers(&self) -> Result<Vec<LedgerRecord>, StoreError>;

    fn insert_ledger(&mut self, record: LedgerRecord) -> Result<(), StoreError>;

    /// Replace an existing ledger, keeping its position among its siblings.
    fn update_ledger(&mut self, record: LedgerRecord) -> Result<(), StoreError>;

    fn delete_ledger(&mut self, id: &LedgerId) -> Result<LedgerRecord, StoreError>;
}

/// Account persistence.
///
/// Implementations must reject accounts pointing at a ledger that does not exist.
pub trait AccountStore {
    fn account(&self, id: &AccountId) -> Result<Option<Account>, StoreError>;

    fn account_exists(&self, id: &AccountId) -> Result<bool, StoreError>;

    /// Accounts attached to `ledger` (any state), ordered by identifier.
    fn accounts_by_ledger(&self, ledger: &LedgerId) -> Result<Vec<Account>, StoreError>;

    /// Filtered, paged search ordered by identifier. `page` is already normalized.
    fn search_accounts(
        &self,
        query: &AccountQuery,
        page: PageRequest,
    ) -> Result<Page<Account>, StoreError>;

    fn insert_account(&mut self, account: Account) -> Result<(), StoreError>;

    fn update_account(&mut self, account: Account) -> Result<(), StoreError>;
}

/// Everything a command may touch inside one atomic unit of work.
pub trait UnitOfWork: LedgerStore + AccountStore {}

impl<T> UnitOfWork for T where T: LedgerStore + AccountStore {}

/// Transactional access to the chart of accounts.
///
/// - `read`: a consistent snapshot for queries
/// - `write_and_then`: exclusive, atomic unit of work; if `work` returns `Err`,
///   every mutation it made is rolled back. Once `work` succeeds, `committed`
///   runs before any other unit of work can start, so whatever it does follows
///   commit order.
pub trait ChartStore: Send + Sync {
    fn read<R, E>(&self, work: impl FnOnce(&dyn UnitOfWork) -> Result<R, E>) -> Result<R, E>
    where
        E: From<StoreError>;

    /// `committed` must not fail or block; it cannot undo the commit.
    fn write_and_then<R, E>(
        &self,
        work: impl FnOnce(&mut dyn UnitOfWork) -> Result<R, E>,
        committed: impl FnOnce(&R),
    ) -> Result<R, E>
    where
        E: From<StoreError>;

    fn write<R, E>(&self, work: impl FnOnce(&mut dyn UnitOfWork) -> Result<R, E>) -> Result<R, E>
    where
        E: From<StoreError>,
    {
        self.write_and_then(work, |_| {})
    }
}

impl<S> ChartStore for Arc<S>
where
    S: ChartStore,
{
    fn read<R, E>(&self, work: impl FnOnce(&dyn UnitOfWork) -> Result<R, E>) -> Result<R, E>
    where
        E: From<StoreError>,
    {
        (**self).read(work)
    }

    fn write_and_then<R, E>(
        &self,
        work: impl FnOnce(&mut dyn UnitOfWork) -> Result<R, E>,
        committed: impl FnOnce(&R),
    ) -> Result<R, E>
    where
        E: From<StoreError>,
    {
        (**self).write_and_then(work, committed)
    }
}
