//! Materializing ledger trees from flat records.
//!
//! Records only know their parent. Trees are rebuilt from a parent-keyed index
//! built once per read, so assembling the whole chart costs O(nodes).

use std::collections::HashMap;

use coa_core::LedgerId;

use crate::ledger::{Ledger, LedgerRecord};

/// Flat ledger records indexed by parent.
#[derive(Debug, Default)]
pub struct LedgerForest {
    roots: Vec<LedgerRecord>,
    children: HashMap<LedgerId, Vec<LedgerRecord>>,
}

impl LedgerForest {
    /// Index `records`. Sibling order follows the iteration order of `records`.
    pub fn from_records(records: impl IntoIterator<Item = LedgerRecord>) -> Self {
        let mut forest = Self::default();
        for record in records {
            match record.parent_ledger_identifier.clone() {
                None => forest.roots.push(record),
                Some(parent) => forest.children.entry(parent).or_default().push(record),
            }
        }
        forest
    }

    /// Every root ledger with its full descendant tree.
    ///
    /// Walks with an explicit stack, so chain depth is bounded by memory only.
    pub fn into_trees(mut self) -> Vec<Ledger> {
        let roots = std::mem::take(&mut self.roots);
        let mut trees = Vec::with_capacity(roots.len());
        for root in roots {
            let mut stack = vec![self.open(root)];
            while let Some(frame) = stack.last_mut() {
                if let Some(child) = frame.pending.pop() {
                    let next = self.open(child);
                    stack.push(next);
                    continue;
                }
                let Some(frame) = stack.pop() else { break };
                let ledger = Ledger::from_record(frame.record, frame.done);
                match stack.last_mut() {
                    Some(parent) => parent.done.push(ledger),
                    None => trees.push(ledger),
                }
            }
        }
        trees
    }

    fn open(&mut self, record: LedgerRecord) -> Frame {
        // Each record is taken out of the index exactly once.
        let mut pending = self.children.remove(&record.identifier).unwrap_or_default();
        pending.reverse();
        Frame {
            record,
            pending,
            done: Vec::new(),
        }
    }
}

/// A node being assembled: children still to visit (last is next) and those built.
struct Frame {
    record: LedgerRecord,
    pending: Vec<LedgerRecord>,
    done: Vec<Ledger>,
}

/// A ledger with its direct children attached (one level deep).
pub fn with_direct_children(record: LedgerRecord, children: Vec<LedgerRecord>) -> Ledger {
    Ledger::from_record(record, children.into_iter().map(Ledger::leaf).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::CommandContext;
    use crate::ledger::{AccountKind, LedgerDefinition};
    use coa_core::Actor;

    fn id(s: &str) -> LedgerId {
        LedgerId::new(s).unwrap()
    }

    fn chain(ids: &[&str]) -> LedgerDefinition {
        let mut iter = ids.iter().rev();
        let mut node = LedgerDefinition::new(id(iter.next().unwrap()), AccountKind::Asset, "leaf");
        for parent in iter {
            node = LedgerDefinition::new(id(parent), AccountKind::Asset, "node").with_sub_ledger(node);
        }
        node
    }

    fn records(definition: LedgerDefinition) -> Vec<LedgerRecord> {
        definition
            .into_records(None, &CommandContext::now(Actor::new("setna")))
            .unwrap()
    }

    #[test]
    fn four_level_chain_is_rebuilt() {
        let forest = LedgerForest::from_records(records(chain(&["p", "c", "g", "gg"])));
        let trees = forest.into_trees();

        assert_eq!(trees.len(), 1);
        let parent = &trees[0];
        assert_eq!(parent.identifier.as_str(), "p");
        assert_eq!(parent.sub_ledgers.len(), 1);
        let child = &parent.sub_ledgers[0];
        assert_eq!(child.identifier.as_str(), "c");
        assert_eq!(child.sub_ledgers.len(), 1);
        let grand_child = &child.sub_ledgers[0];
        assert_eq!(grand_child.identifier.as_str(), "g");
        assert_eq!(grand_child.sub_ledgers.len(), 1);
        let leaf = &grand_child.sub_ledgers[0];
        assert_eq!(leaf.identifier.as_str(), "gg");
        assert!(leaf.sub_ledgers.is_empty());
    }

    #[test]
    fn record_order_does_not_matter_for_shape() {
        let mut all = records(chain(&["a", "a1", "a2"]));
        all.extend(records(chain(&["b", "b1"])));
        all.reverse();

        let trees = LedgerForest::from_records(all).into_trees();
        let roots: Vec<_> = trees.iter().map(|t| t.identifier.as_str()).collect();
        assert_eq!(roots, ["b", "a"]);
        assert_eq!(trees[1].sub_ledgers[0].sub_ledgers[0].identifier.as_str(), "a2");
    }

    #[test]
    fn very_deep_chain_is_rebuilt_and_dropped() {
        const DEPTH: usize = 100_000;
        let ctx = CommandContext::now(Actor::new("setna"));
        let mut all = Vec::with_capacity(DEPTH);
        let mut parent = None;
        for n in 0..DEPTH {
            let node = id(&format!("l{n}"));
            let definition = LedgerDefinition::new(node.clone(), AccountKind::Asset, "node");
            all.extend(definition.into_records(parent.replace(node), &ctx).unwrap());
        }

        let trees = LedgerForest::from_records(all).into_trees();
        assert_eq!(trees.len(), 1);
        let mut depth = 1;
        let mut node = &trees[0];
        while let Some(child) = node.sub_ledgers.first() {
            assert_eq!(node.sub_ledgers.len(), 1);
            depth += 1;
            node = child;
        }
        assert_eq!(depth, DEPTH);
        assert_eq!(node.identifier, id(&format!("l{}", DEPTH - 1)));
        drop(trees);
    }

    #[test]
    fn direct_children_stop_at_one_level() {
        let mut all = records(chain(&["p", "c", "g"]));
        let parent = all.remove(0);
        let child = all.remove(0);

        let view = with_direct_children(parent, vec![child]);
        assert_eq!(view.sub_ledgers.len(), 1);
        assert!(view.sub_ledgers[0].sub_ledgers.is_empty());
    }
}
