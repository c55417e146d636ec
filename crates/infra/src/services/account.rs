use tracing::{debug, info};

use coa_accounting::{
    Account, AccountChanged, AccountCommand, AccountDefinition, AccountQuery, AccountingEvent,
    CommandContext, Page,
};
use coa_core::{AccountId, DomainError, EntityKind};
use coa_events::EventPublisher;

use super::{Paging, commit_and_publish};
use crate::config::AccountingConfig;
use crate::error::ServiceResult;
use crate::store::{AccountStore, ChartStore, LedgerStore, UnitOfWork};

/// Owns the account state machine and the account-to-ledger link.
#[derive(Debug)]
pub struct AccountLifecycleService<S, P> {
    store: S,
    publisher: P,
    paging: Paging,
}

impl<S, P> AccountLifecycleService<S, P> {
    pub fn new(store: S, publisher: P) -> Self {
        Self::with_config(store, publisher, &AccountingConfig::default())
    }

    pub fn with_config(store: S, publisher: P, config: &AccountingConfig) -> Self {
        Self {
            store,
            publisher,
            paging: Paging::from_config(config),
        }
    }
}

impl<S, P> AccountLifecycleService<S, P>
where
    S: ChartStore,
    P: EventPublisher,
{
    /// Open a new account under an existing ledger.
    pub fn create_account(
        &self,
        ctx: &CommandContext,
        account: AccountDefinition,
    ) -> ServiceResult<Account> {
        let account = Account::open(account, ctx)?;

        self.commit(
            |uow| {
                if !uow.ledger_exists(&account.ledger)? {
                    return Err(
                        DomainError::not_found(EntityKind::Ledger, account.ledger.as_str()).into(),
                    );
                }
                if uow.account_exists(&account.identifier)? {
                    return Err(DomainError::already_exists(
                        EntityKind::Account,
                        account.identifier.as_str(),
                    )
                    .into());
                }
                check_reference(uow, &account)?;
                uow.insert_account(account.clone())?;
                Ok(())
            },
            |_| {
                AccountingEvent::AccountCreated(AccountChanged {
                    account: account.clone(),
                    occurred_at: ctx.occurred_at(),
                })
            },
        )?;

        info!(
            account = %account.identifier,
            ledger = %account.ledger,
            actor = %ctx.actor(),
            "account created"
        );
        Ok(account)
    }

    pub fn find_account(&self, id: &AccountId) -> ServiceResult<Account> {
        self.store.read(|uow| require_account(uow, id))
    }

    /// Overwrite account metadata. The lifecycle state is never touched here.
    pub fn modify_account(
        &self,
        ctx: &CommandContext,
        id: &AccountId,
        account: AccountDefinition,
    ) -> ServiceResult<Account> {
        if *id != account.identifier {
            return Err(DomainError::validation(format!(
                "path identifier '{id}' does not match account identifier '{}'",
                account.identifier
            ))
            .into());
        }

        let updated = self.commit(
            |uow| {
                let mut current = require_account(uow, id)?;
                if !uow.ledger_exists(&account.ledger)? {
                    return Err(
                        DomainError::not_found(EntityKind::Ledger, account.ledger.as_str()).into(),
                    );
                }
                current.modify(&account, ctx)?;
                check_reference(uow, &current)?;
                uow.update_account(current.clone())?;
                Ok(current)
            },
            |updated| {
                AccountingEvent::AccountUpdated(AccountChanged {
                    account: updated.clone(),
                    occurred_at: ctx.occurred_at(),
                })
            },
        )?;

        info!(account = %id, ledger = %updated.ledger, actor = %ctx.actor(), "account modified");
        Ok(updated)
    }

    pub fn lock_account(&self, ctx: &CommandContext, id: &AccountId) -> ServiceResult<Account> {
        self.transition(ctx, id, AccountCommand::Lock)
    }

    pub fn unlock_account(&self, ctx: &CommandContext, id: &AccountId) -> ServiceResult<Account> {
        self.transition(ctx, id, AccountCommand::Unlock)
    }

    pub fn close_account(&self, ctx: &CommandContext, id: &AccountId) -> ServiceResult<Account> {
        self.transition(ctx, id, AccountCommand::Close)
    }

    pub fn reopen_account(&self, ctx: &CommandContext, id: &AccountId) -> ServiceResult<Account> {
        self.transition(ctx, id, AccountCommand::Reopen)
    }

    /// Accounts matching `query`, ordered by identifier.
    pub fn search_accounts(&self, query: &AccountQuery) -> ServiceResult<Page<Account>> {
        let page = self.paging.resolve(query.page);
        let result = self
            .store
            .read(|uow| -> ServiceResult<_> { Ok(uow.search_accounts(query, page)?) })?;
        debug!(
            term = ?query.term,
            excluded_state = ?query.excluded_state,
            page = result.page,
            total = result.total_elements,
            "account search"
        );
        Ok(result)
    }

    fn transition(
        &self,
        ctx: &CommandContext,
        id: &AccountId,
        command: AccountCommand,
    ) -> ServiceResult<Account> {
        let (from, account) = self.commit(
            |uow| {
                let mut account = require_account(uow, id)?;
                let from = account.state;
                account.transition(command, ctx)?;
                uow.update_account(account.clone())?;
                Ok((from, account))
            },
            |(_, account)| {
                AccountingEvent::account_transitioned(
                    command,
                    AccountChanged {
                        account: account.clone(),
                        occurred_at: ctx.occurred_at(),
                    },
                )
            },
        )?;

        info!(
            account = %id,
            %command,
            from = %from,
            to = %account.state,
            actor = %ctx.actor(),
            "account state changed"
        );
        Ok(account)
    }

    /// One unit of work whose single event is published as part of the commit.
    fn commit<R>(
        &self,
        work: impl FnOnce(&mut dyn UnitOfWork) -> ServiceResult<R>,
        event: impl FnOnce(&R) -> AccountingEvent,
    ) -> ServiceResult<R> {
        commit_and_publish(&self.store, &self.publisher, work, |committed| {
            vec![event(committed)]
        })
    }
}

fn require_account(uow: &dyn UnitOfWork, id: &AccountId) -> ServiceResult<Account> {
    uow.account(id)?
        .ok_or_else(|| DomainError::not_found(EntityKind::Account, id.as_str()).into())
}

fn check_reference(uow: &dyn UnitOfWork, account: &Account) -> ServiceResult<()> {
    match &account.reference_account {
        Some(reference) if !uow.account_exists(reference)? => Err(DomainError::validation(format!(
            "reference account '{reference}' does not exist"
        ))
        .into()),
        _ => Ok(()),
    }
}
