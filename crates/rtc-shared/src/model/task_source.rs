//! Split assignment — the per-plan-node bag of work a task is told about.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::task_id::{Lifespan, PlanNodeId};

/// A single unit of work assigned to a task, tagged with a
/// sequence id that is unique within the owning task.
///
/// `sequence_id` is the mechanism `TaskHandle` uses for exactly-once
/// delivery: a split is only ever sent once the controller has observed
/// (via an acknowledged update) that the worker has not already seen it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScheduledSplit {
    pub sequence_id: i64,
    pub connector_split: serde_json::Value,
    pub lifespan: Lifespan,
}

/// Everything a task has been told about one source plan node: the splits
/// to read from it, which lifespans are closed out, and whether more
/// splits will ever arrive.
///
/// Two `TaskSource`s for the same `plan_node_id` merge by set-union of
/// `splits` and `no_more_splits_for_lifespan`; `no_more_splits` only ever
/// moves `false -> true`, never back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSource {
    pub plan_node_id: PlanNodeId,
    pub splits: BTreeSet<ScheduledSplit>,
    pub no_more_splits_for_lifespan: BTreeSet<Lifespan>,
    pub no_more_splits: bool,
}

impl TaskSource {
    pub fn new(plan_node_id: PlanNodeId) -> Self {
        Self {
            plan_node_id,
            splits: BTreeSet::new(),
            no_more_splits_for_lifespan: BTreeSet::new(),
            no_more_splits: false,
        }
    }

    /// Union this source's splits and lifespan markers with `other`,
    /// honoring the monotonic `no_more_splits` rule. Panics if `other`
    /// targets a different plan node — callers are expected to have
    /// grouped sources by `plan_node_id` before merging.
    pub fn merge(&mut self, other: &TaskSource) {
        assert_eq!(
            self.plan_node_id, other.plan_node_id,
            "cannot merge TaskSource for different plan nodes"
        );
        self.splits.extend(other.splits.iter().cloned());
        self.no_more_splits_for_lifespan
            .extend(other.no_more_splits_for_lifespan.iter().cloned());
        self.no_more_splits = self.no_more_splits || other.no_more_splits;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(seq: i64) -> ScheduledSplit {
        ScheduledSplit {
            sequence_id: seq,
            connector_split: serde_json::json!({ "path": format!("part-{seq}") }),
            lifespan: Lifespan(0),
        }
    }

    #[test]
    fn merge_unions_splits() {
        let mut a = TaskSource::new(PlanNodeId::from("probe"));
        a.splits.insert(split(1));
        let mut b = TaskSource::new(PlanNodeId::from("probe"));
        b.splits.insert(split(2));

        a.merge(&b);
        assert_eq!(a.splits.len(), 2);
    }

    #[test]
    fn no_more_splits_is_monotonic() {
        let mut a = TaskSource::new(PlanNodeId::from("probe"));
        let mut b = TaskSource::new(PlanNodeId::from("probe"));
        b.no_more_splits = true;

        a.merge(&b);
        assert!(a.no_more_splits);

        // merging a stale "not done yet" view back in must not reopen it
        let stale = TaskSource::new(PlanNodeId::from("probe"));
        a.merge(&stale);
        assert!(a.no_more_splits);
    }
}
