use tracing::{debug, info};

use coa_accounting::{
    Account, AccountingEvent, CommandContext, Ledger, LedgerChanged, LedgerDefinition,
    LedgerDeleted, LedgerForest, LedgerRecord, Page, PageRequest, with_direct_children,
};
use coa_core::{DomainError, EntityKind, LedgerId};
use coa_events::EventPublisher;

use super::{Paging, commit_and_publish};
use crate::config::AccountingConfig;
use crate::error::ServiceResult;
use crate::store::{AccountStore, ChartStore, LedgerStore, UnitOfWork};

/// Keeps the ledger forest consistent: globally unique identifiers, parents that
/// exist, and no deletion while anything still points at a ledger.
#[derive(Debug)]
pub struct LedgerHierarchyService<S, P> {
    store: S,
    publisher: P,
    paging: Paging,
}

impl<S, P> LedgerHierarchyService<S, P> {
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

impl<S, P> LedgerHierarchyService<S, P>
where
    S: ChartStore,
    P: EventPublisher,
{
    /// Create a root ledger, together with any nested sub-ledgers it carries.
    pub fn create_ledger(
        &self,
        ctx: &CommandContext,
        ledger: LedgerDefinition,
    ) -> ServiceResult<LedgerRecord> {
        let records = ledger.into_records(None, ctx)?;
        self.persist_tree(ctx, records)
    }

    /// Create `ledger` (and any nested sub-ledgers) under an existing parent.
    pub fn add_sub_ledger(
        &self,
        ctx: &CommandContext,
        parent: &LedgerId,
        ledger: LedgerDefinition,
    ) -> ServiceResult<LedgerRecord> {
        let records = ledger.into_records(Some(parent.clone()), ctx)?;
        self.persist_tree(ctx, records)
    }

    /// Ledger with its direct sub-ledgers.
    pub fn find_ledger(&self, id: &LedgerId) -> ServiceResult<Ledger> {
        self.store.read(|uow| {
            let record = require_ledger(uow, id)?;
            let children = uow.children(id)?;
            debug!(ledger = %id, sub_ledgers = children.len(), "ledger loaded");
            Ok(with_direct_children(record, children))
        })
    }

    /// Every root ledger with its full descendant tree.
    pub fn fetch_ledgers(&self) -> ServiceResult<Vec<Ledger>> {
        let records = self
            .store
            .read(|uow| -> ServiceResult<_> { Ok(uow.ledgers()?) })?;
        let count = records.len();
        let trees = LedgerForest::from_records(records).into_trees();
        debug!(ledgers = count, roots = trees.len(), "chart assembled");
        Ok(trees)
    }

    /// Overwrite type, name, description and chart flag.
    pub fn modify_ledger(
        &self,
        ctx: &CommandContext,
        id: &LedgerId,
        ledger: LedgerDefinition,
    ) -> ServiceResult<LedgerRecord> {
        if *id != ledger.identifier {
            return Err(DomainError::validation(format!(
                "path identifier '{id}' does not match ledger identifier '{}'",
                ledger.identifier
            ))
            .into());
        }

        let updated = commit_and_publish(
            &self.store,
            &self.publisher,
            |uow| {
                let mut record = require_ledger(uow, id)?;
                record.modify(&ledger, ctx)?;
                uow.update_ledger(record.clone())?;
                Ok(record)
            },
            |updated| {
                vec![AccountingEvent::LedgerUpdated(LedgerChanged {
                    ledger: updated.clone(),
                    occurred_at: ctx.occurred_at(),
                })]
            },
        )?;

        info!(ledger = %id, actor = %ctx.actor(), "ledger modified");
        Ok(updated)
    }

    /// Remove a leaf ledger that no account points to.
    pub fn delete_ledger(&self, ctx: &CommandContext, id: &LedgerId) -> ServiceResult<()> {
        commit_and_publish(
            &self.store,
            &self.publisher,
            |uow| {
                require_ledger(uow, id)?;
                let children = uow.children(id)?;
                if !children.is_empty() {
                    return Err(DomainError::reference_exists(
                        id.as_str(),
                        format!("{} sub-ledger(s)", children.len()),
                    )
                    .into());
                }
                let accounts = uow.accounts_by_ledger(id)?;
                if !accounts.is_empty() {
                    return Err(DomainError::reference_exists(
                        id.as_str(),
                        format!("{} account(s)", accounts.len()),
                    )
                    .into());
                }
                uow.delete_ledger(id)?;
                Ok(())
            },
            |_| {
                vec![AccountingEvent::LedgerDeleted(LedgerDeleted {
                    identifier: id.clone(),
                    occurred_at: ctx.occurred_at(),
                })]
            },
        )?;

        info!(ledger = %id, actor = %ctx.actor(), "ledger deleted");
        Ok(())
    }

    /// Accounts attached to a ledger, ordered by identifier.
    pub fn fetch_accounts_of_ledger(
        &self,
        id: &LedgerId,
        page: PageRequest,
    ) -> ServiceResult<Page<Account>> {
        let page = self.paging.resolve(page);
        self.store.read(|uow| {
            require_ledger(uow, id)?;
            Ok(Page::slice(uow.accounts_by_ledger(id)?, page))
        })
    }

    fn persist_tree(
        &self,
        ctx: &CommandContext,
        records: Vec<LedgerRecord>,
    ) -> ServiceResult<LedgerRecord> {
        let top = records
            .first()
            .cloned()
            .ok_or_else(|| DomainError::validation("nothing to create"))?;

        let nodes = records.len();
        commit_and_publish(
            &self.store,
            &self.publisher,
            |uow| {
                if let Some(parent) = &top.parent_ledger_identifier {
                    require_ledger(uow, parent)?;
                }
                for record in &records {
                    if uow.ledger_exists(&record.identifier)? {
                        return Err(DomainError::already_exists(
                            EntityKind::Ledger,
                            record.identifier.as_str(),
                        )
                        .into());
                    }
                }
                // The store's uniqueness check stays the final arbiter.
                for record in &records {
                    uow.insert_ledger(record.clone())?;
                }
                Ok(())
            },
            |_| {
                records
                    .iter()
                    .map(|ledger| {
                        AccountingEvent::LedgerCreated(LedgerChanged {
                            ledger: ledger.clone(),
                            occurred_at: ctx.occurred_at(),
                        })
                    })
                    .collect()
            },
        )?;

        info!(
            ledger = %top.identifier,
            parent = ?top.parent_ledger_identifier.as_ref().map(LedgerId::as_str),
            nodes,
            actor = %ctx.actor(),
            "ledger created"
        );
        Ok(top)
    }
}

fn require_ledger(uow: &dyn UnitOfWork, id: &LedgerId) -> ServiceResult<LedgerRecord> {
    uow.ledger(id)?
        .ok_or_else(|| DomainError::not_found(EntityKind::Ledger, id.as_str()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use coa_accounting::{AccountDefinition, AccountKind};
    use coa_core::{AccountId, Actor};
    use coa_events::{OutboundEvent, PublishError};

    use crate::error::{ErrorKind, ServiceError};
    use crate::services::AccountLifecycleService;
    use crate::store::InMemoryChartStore;

    #[derive(Debug, Default)]
    struct CapturingPublisher {
        events: Mutex<Vec<OutboundEvent>>,
    }

    impl CapturingPublisher {
        fn types_for(&self, id: &str) -> Vec<String> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.entity_identifier == id)
                .map(|e| e.event_type.clone())
                .collect()
        }
    }

    impl EventPublisher for CapturingPublisher {
        fn publish(&self, event: OutboundEvent) -> Result<(), PublishError> {
            self.events.lock().unwrap().push(event);
            Ok(())
        }
    }

    struct FailingPublisher;

    impl EventPublisher for FailingPublisher {
        fn publish(&self, _event: OutboundEvent) -> Result<(), PublishError> {
            Err(PublishError::Closed)
        }
    }

    type Service = LedgerHierarchyService<Arc<InMemoryChartStore>, Arc<CapturingPublisher>>;

    fn setup() -> (Service, Arc<CapturingPublisher>) {
        let publisher = Arc::new(CapturingPublisher::default());
        let service = LedgerHierarchyService::new(Arc::new(InMemoryChartStore::new()), publisher.clone());
        (service, publisher)
    }

    fn ctx() -> CommandContext {
        CommandContext::now(Actor::new("setna"))
    }

    fn lid(s: &str) -> LedgerId {
        LedgerId::new(s).unwrap()
    }

    fn definition(id: &str) -> LedgerDefinition {
        LedgerDefinition::new(lid(id), AccountKind::Asset, format!("Ledger {id}"))
            .with_description("test ledger")
    }

    #[test]
    fn created_ledger_is_found_without_modification_stamp() {
        let (service, publisher) = setup();
        service.create_ledger(&ctx(), definition("1000")).unwrap();

        let found = service.find_ledger(&lid("1000")).unwrap();
        assert_eq!(found.name, "Ledger 1000");
        assert_eq!(found.description.as_deref(), Some("test ledger"));
        assert_eq!(found.kind, AccountKind::Asset);
        assert!(found.sub_ledgers.is_empty());
        assert_eq!(found.audit.created_by, Actor::new("setna"));
        assert!(found.audit.last_modified_by.is_none());
        assert!(found.audit.last_modified_on.is_none());
        assert_eq!(publisher.types_for("1000"), ["accounting.ledger.created"]);
    }

    #[test]
    fn second_create_with_same_identifier_fails() {
        let (service, publisher) = setup();
        service.create_ledger(&ctx(), definition("1000")).unwrap();

        let err = service.create_ledger(&ctx(), definition("1000")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(publisher.types_for("1000").len(), 1);
    }

    #[test]
    fn nested_create_is_all_or_nothing() {
        let (service, _) = setup();
        service.create_ledger(&ctx(), definition("taken")).unwrap();

        let clash = definition("p").with_sub_ledger(definition("c").with_sub_ledger(definition("taken")));
        let err = service.create_ledger(&ctx(), clash).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        assert_eq!(service.find_ledger(&lid("p")).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(service.find_ledger(&lid("c")).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn sub_ledger_needs_existing_parent_and_fresh_identifier() {
        let (service, publisher) = setup();
        service.create_ledger(&ctx(), definition("1000")).unwrap();

        let err = service
            .add_sub_ledger(&ctx(), &lid("nope"), definition("1100"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = service
            .add_sub_ledger(&ctx(), &lid("1000"), definition("1000"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        let created = service
            .add_sub_ledger(&ctx(), &lid("1000"), definition("1100"))
            .unwrap();
        assert_eq!(created.parent_ledger_identifier, Some(lid("1000")));
        assert_eq!(publisher.types_for("1100"), ["accounting.ledger.created"]);

        let parent = service.find_ledger(&lid("1000")).unwrap();
        assert_eq!(parent.sub_ledgers.len(), 1);
        assert_eq!(parent.sub_ledgers[0].identifier, lid("1100"));
    }

    #[test]
    fn modify_checks_path_identifier_then_existence() {
        let (service, publisher) = setup();
        service.create_ledger(&ctx(), definition("1000")).unwrap();

        let err = service
            .modify_ledger(&ctx(), &lid("other"), definition("1000"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = service
            .modify_ledger(&ctx(), &lid("ghost"), definition("ghost"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let mut change = definition("1000");
        change.name = "n".repeat(256);
        change.description = Some("d".repeat(2048));
        change.kind = AccountKind::Equity;
        service.modify_ledger(&ctx(), &lid("1000"), change.clone()).unwrap();

        let found = service.find_ledger(&lid("1000")).unwrap();
        assert_eq!(found.name, change.name);
        assert_eq!(found.description, change.description);
        assert_eq!(found.kind, AccountKind::Equity);
        assert!(found.audit.last_modified_by.is_some());
        assert!(found.audit.last_modified_on.is_some());
        assert_eq!(
            publisher.types_for("1000"),
            ["accounting.ledger.created", "accounting.ledger.updated"]
        );
    }

    #[test]
    fn delete_is_blocked_by_sub_ledgers_and_accounts() {
        let store = Arc::new(InMemoryChartStore::new());
        let publisher = Arc::new(CapturingPublisher::default());
        let ledgers = LedgerHierarchyService::new(store.clone(), publisher.clone());
        let accounts = AccountLifecycleService::new(store, publisher.clone());

        ledgers
            .create_ledger(&ctx(), definition("p").with_sub_ledger(definition("c")))
            .unwrap();
        ledgers.create_ledger(&ctx(), definition("held")).unwrap();
        let account = accounts
            .create_account(
                &ctx(),
                AccountDefinition::new(AccountId::new("held.01").unwrap(), AccountKind::Asset, "Held", lid("held")),
            )
            .unwrap();
        accounts.close_account(&ctx(), &account.identifier).unwrap();

        for id in ["p", "held"] {
            let err = ledgers.delete_ledger(&ctx(), &lid(id)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ReferenceExists, "ledger {id}");
        }

        ledgers.delete_ledger(&ctx(), &lid("c")).unwrap();
        ledgers.delete_ledger(&ctx(), &lid("p")).unwrap();
        assert_eq!(ledgers.find_ledger(&lid("p")).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(
            publisher.types_for("p"),
            ["accounting.ledger.created", "accounting.ledger.deleted"]
        );
    }

    #[test]
    fn delete_unknown_ledger_fails_not_found() {
        let (service, publisher) = setup();
        let err = service.delete_ledger(&ctx(), &lid("ghost")).unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::NotFound { .. })));
        assert!(publisher.types_for("ghost").is_empty());
    }

    #[test]
    fn fetch_ledgers_materializes_every_level() {
        let (service, _) = setup();
        service.create_ledger(&ctx(), definition("p")).unwrap();
        service.add_sub_ledger(&ctx(), &lid("p"), definition("c")).unwrap();
        service.add_sub_ledger(&ctx(), &lid("c"), definition("g")).unwrap();
        service.add_sub_ledger(&ctx(), &lid("g"), definition("gg")).unwrap();
        service.create_ledger(&ctx(), definition("other")).unwrap();

        let roots = service.fetch_ledgers().unwrap();
        assert_eq!(roots.len(), 2);
        let p = roots.iter().find(|l| l.identifier == lid("p")).unwrap();
        let c = &p.sub_ledgers[0];
        let g = &c.sub_ledgers[0];
        let gg = &g.sub_ledgers[0];
        assert_eq!((p.sub_ledgers.len(), c.sub_ledgers.len(), g.sub_ledgers.len()), (1, 1, 1));
        assert_eq!(gg.identifier, lid("gg"));
        assert!(gg.sub_ledgers.is_empty());
    }

    #[test]
    fn publisher_failure_does_not_undo_the_commit() {
        let service = LedgerHierarchyService::new(InMemoryChartStore::new(), FailingPublisher);
        service.create_ledger(&ctx(), definition("1000")).unwrap();
        assert!(service.find_ledger(&lid("1000")).is_ok());
    }

    #[test]
    fn ledger_accounts_are_paged() {
        let store = Arc::new(InMemoryChartStore::new());
        let publisher = Arc::new(CapturingPublisher::default());
        let ledgers = LedgerHierarchyService::new(store.clone(), publisher.clone());
        let accounts = AccountLifecycleService::new(store, publisher);

        ledgers.create_ledger(&ctx(), definition("1000")).unwrap();
        for n in 1..=5 {
            accounts
                .create_account(
                    &ctx(),
                    AccountDefinition::new(
                        AccountId::new(format!("1000.0{n}")).unwrap(),
                        AccountKind::Asset,
                        "Cash",
                        lid("1000"),
                    ),
                )
                .unwrap();
        }

        let page = ledgers
            .fetch_accounts_of_ledger(&lid("1000"), PageRequest::new(2, 2))
            .unwrap();
        let ids: Vec<_> = page.items.iter().map(|a| a.identifier.to_string()).collect();
        assert_eq!(ids, ["1000.03", "1000.04"]);
        assert_eq!(page.total_elements, 5);
        assert_eq!(page.total_pages, 3);

        let err = ledgers
            .fetch_accounts_of_ledger(&lid("ghost"), PageRequest::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
