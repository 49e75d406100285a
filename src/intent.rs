//! Locally recorded, not-yet-acknowledged desired state of a remote task —
//! the "intent" `UpdateSender` turns into `TaskUpdateRequest` bodies.
//!
//! Two different exactly-once disciplines apply here, per spec.md §4.4:
//! splits are drained the moment they're included in a snapshot and never
//! reconsidered, even if that snapshot's POST fails, because the worker is
//! contractually idempotent under `sequenceId`. No-more-splits markers are
//! the opposite: they stay pending until a reply actually acknowledges
//! them, because re-announcing one costs nothing on the wire but losing
//! one to a dropped request would violate monotonicity from the worker's
//! point of view.

use std::collections::BTreeMap;

use rtc_shared::model::{Lifespan, PlanNodeId, ScheduledSplit, TaskSource};

/// Per-plan-node staging area for one task's intent.
#[derive(Debug, Default, Clone)]
struct SourceIntent {
    unsent_splits: Vec<ScheduledSplit>,
    lifespans_to_send: Vec<Lifespan>,
    acked_lifespans: Vec<Lifespan>,
    no_more_splits_to_send: bool,
    no_more_splits_acked: bool,
}

impl SourceIntent {
    fn mark_no_more_splits_for_lifespan(&mut self, lifespan: Lifespan) {
        if !self.acked_lifespans.contains(&lifespan) && !self.lifespans_to_send.contains(&lifespan) {
            self.lifespans_to_send.push(lifespan);
        }
    }

    fn mark_no_more_splits(&mut self) {
        if !self.no_more_splits_acked {
            self.no_more_splits_to_send = true;
        }
    }

    fn has_pending_work(&self) -> bool {
        !self.unsent_splits.is_empty() || !self.lifespans_to_send.is_empty() || self.no_more_splits_to_send
    }

    /// Drain this source's pending work into the `TaskSource` that will go
    /// on the wire. Splits are gone for good; lifespan markers and the
    /// `no_more_splits` flag stay in `lifespans_to_send`/
    /// `no_more_splits_to_send` until [`Self::ack`] confirms delivery.
    fn snapshot(&mut self, plan_node_id: PlanNodeId) -> TaskSource {
        let splits = std::mem::take(&mut self.unsent_splits);
        let mut source = TaskSource::new(plan_node_id);
        source.splits.extend(splits);
        source.no_more_splits_for_lifespan.extend(self.lifespans_to_send.iter().copied());
        source.no_more_splits = self.no_more_splits_to_send;
        source
    }

    /// Record that a previously-sent snapshot's lifespan markers and
    /// `no_more_splits` flag were acknowledged by the worker.
    fn ack(&mut self, sent: &TaskSource) {
        for lifespan in &sent.no_more_splits_for_lifespan {
            if let Some(pos) = self.lifespans_to_send.iter().position(|l| l == lifespan) {
                self.lifespans_to_send.remove(pos);
            }
            if !self.acked_lifespans.contains(lifespan) {
                self.acked_lifespans.push(*lifespan);
            }
        }
        if sent.no_more_splits {
            self.no_more_splits_acked = true;
            self.no_more_splits_to_send = false;
        }
    }
}

/// Everything a `TaskHandle` needs to assemble the next `TaskUpdateRequest`.
#[derive(Debug, Default)]
pub struct PendingIntent {
    sources: BTreeMap<PlanNodeId, SourceIntent>,
}

impl PendingIntent {
    pub fn add_splits(&mut self, plan_node_id: PlanNodeId, splits: Vec<ScheduledSplit>) {
        self.sources.entry(plan_node_id).or_default().unsent_splits.extend(splits);
    }

    pub fn mark_no_more_splits_for_lifespan(&mut self, plan_node_id: PlanNodeId, lifespan: Lifespan) {
        self.sources
            .entry(plan_node_id)
            .or_default()
            .mark_no_more_splits_for_lifespan(lifespan);
    }

    pub fn mark_no_more_splits(&mut self, plan_node_id: PlanNodeId) {
        self.sources.entry(plan_node_id).or_default().mark_no_more_splits();
    }

    pub fn has_pending_work(&self) -> bool {
        self.sources.values().any(SourceIntent::has_pending_work)
    }

    /// Snapshot every source with pending work into wire-ready
    /// `TaskSource`s. Sources with nothing pending are omitted entirely —
    /// an empty `TaskSource` would be a no-op on the worker anyway.
    pub fn snapshot_sources(&mut self) -> Vec<TaskSource> {
        self.sources
            .iter_mut()
            .filter(|(_, intent)| intent.has_pending_work())
            .map(|(plan_node_id, intent)| intent.snapshot(plan_node_id.clone()))
            .collect()
    }

    pub fn ack_sources(&mut self, sent: &[TaskSource]) {
        for source in sent {
            if let Some(intent) = self.sources.get_mut(&source.plan_node_id) {
                intent.ack(source);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(seq: i64) -> ScheduledSplit {
        ScheduledSplit {
            sequence_id: seq,
            connector_split: serde_json::json!({ "part": seq }),
            lifespan: Lifespan(0),
        }
    }

    #[test]
    fn splits_are_gone_after_snapshot_even_without_ack() {
        let mut intent = PendingIntent::default();
        intent.add_splits(PlanNodeId::from("probe"), vec![split(1), split(2)]);

        let snapshot = intent.snapshot_sources();
        assert_eq!(snapshot[0].splits.len(), 2);

        // a second snapshot before any ack must not re-include the splits
        let second = intent.snapshot_sources();
        assert!(second.is_empty());
    }

    #[test]
    fn no_more_splits_stays_pending_until_acked() {
        let mut intent = PendingIntent::default();
        let node = PlanNodeId::from("probe");
        intent.mark_no_more_splits(node.clone());

        let first = intent.snapshot_sources();
        assert!(first[0].no_more_splits);

        // not yet acked: a retry snapshot still carries it
        let retry = intent.snapshot_sources();
        assert!(retry[0].no_more_splits);

        intent.ack_sources(&first);
        let after_ack = intent.snapshot_sources();
        assert!(after_ack.is_empty());
    }

    #[test]
    fn marking_no_more_splits_again_after_ack_is_a_noop() {
        let mut intent = PendingIntent::default();
        let node = PlanNodeId::from("probe");
        intent.mark_no_more_splits(node.clone());
        let sent = intent.snapshot_sources();
        intent.ack_sources(&sent);

        intent.mark_no_more_splits(node);
        assert!(!intent.has_pending_work());
    }

    #[test]
    fn lifespan_marker_survives_a_failed_attempt() {
        let mut intent = PendingIntent::default();
        let node = PlanNodeId::from("probe");
        intent.mark_no_more_splits_for_lifespan(node.clone(), Lifespan(3));

        // attempt 1: snapshot taken, but never acked (simulated failure)
        let attempt1 = intent.snapshot_sources();
        assert_eq!(attempt1[0].no_more_splits_for_lifespan.len(), 1);

        // attempt 2 must still carry the marker
        let attempt2 = intent.snapshot_sources();
        assert_eq!(attempt2[0].no_more_splits_for_lifespan.len(), 1);

        intent.ack_sources(&attempt2);
        assert!(!intent.has_pending_work());
    }
}
