//! Task, instance, plan-node, and lifespan identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies a single (stage, worker) task instantiation.
///
/// Total-ordered within a `(query_id, stage_id)` pair by `(partition_id,
/// attempt_id)` — the ordering planners rely on to schedule partitions in a
/// stable sequence.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId {
    pub query_id: String,
    pub stage_id: u32,
    pub partition_id: u32,
    pub attempt_id: u32,
}

impl TaskId {
    pub fn new(query_id: impl Into<String>, stage_id: u32, partition_id: u32, attempt_id: u32) -> Self {
        Self {
            query_id: query_id.into(),
            stage_id,
            partition_id,
            attempt_id,
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.query_id, self.stage_id, self.partition_id, self.attempt_id
        )
    }
}

/// Worker-assigned fencing token for a task.
///
/// A change in this value across two observations for the same [`TaskId`]
/// means the worker lost the task — most commonly a process restart. See
/// the mismatch-detection rule in `TaskHandle`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskInstanceId(pub String);

impl fmt::Display for TaskInstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TaskInstanceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for TaskInstanceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Identifies a source plan node a task reads splits from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlanNodeId(pub String);

impl fmt::Display for PlanNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PlanNodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for PlanNodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A scheduling group identifier for splits that must be processed together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Lifespan(pub u64);

impl fmt::Display for Lifespan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lifespan-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_id_orders_by_partition_then_attempt() {
        let a = TaskId::new("q", 1, 2, 0);
        let b = TaskId::new("q", 1, 2, 1);
        let c = TaskId::new("q", 1, 3, 0);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn task_id_display_is_stable() {
        let id = TaskId::new("q", 1, 2, 0);
        assert_eq!(id.to_string(), "q.1.2.0");
    }
}
