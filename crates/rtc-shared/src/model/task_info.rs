//! `TaskInfo` — the heavier, low-frequency view of worker state.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::output_buffers::OutputBuffers;
use super::task_id::PlanNodeId;
use super::task_status::TaskStatus;

/// Cumulative execution statistics carried alongside a [`TaskInfo`].
///
/// Deliberately coarse: the controller's job is to relay these, not
/// interpret them. Planner-side aggregation of per-task stats into
/// per-stage stats lives outside this crate's scope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskStats {
    pub total_scheduled_time_millis: u64,
    pub total_cpu_time_millis: u64,
    pub total_blocked_time_millis: u64,
    pub raw_input_rows: u64,
    pub raw_input_bytes: u64,
    pub processed_input_rows: u64,
    pub processed_input_bytes: u64,
    pub output_rows: u64,
    pub output_bytes: u64,
}

/// Worker-reported state of a task's output buffer, as carried in
/// [`TaskInfo`]. Kept intentionally opaque beyond what the controller needs
/// to decide `output_buffer_overutilized`-style backpressure — buffer
/// implementations are out of scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputBufferInfo {
    pub buffer_type: String,
    pub total_buffered_bytes: u64,
    pub total_rows_sent: u64,
    pub can_add_buffers: bool,
}

/// Superset of [`TaskStatus`] returned by `GET /{taskId}` and by the reply
/// to a `POST`/`DELETE`.
///
/// `needs_plan` mirrors the worker's acknowledgement of the query fragment:
/// once `false`, `UpdateSender` stops sending `fragment` on subsequent
/// requests (see the invariant in `TaskUpdateRequest`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInfo {
    pub status: TaskStatus,
    pub last_heartbeat: DateTime<Utc>,
    pub output_buffer_info: OutputBufferInfo,
    pub no_more_splits: HashSet<PlanNodeId>,
    pub stats: TaskStats,
    pub needs_plan: bool,
    pub output_buffers: OutputBuffers,
}

impl TaskInfo {
    /// Synthesize the info counterpart of a locally-failed task, used by
    /// `InfoFetcher` when the terminal cause was `RemoteTaskError` and the
    /// worker is not reachable to provide its own final snapshot.
    pub fn synthesized(status: TaskStatus, output_buffers: OutputBuffers) -> Self {
        Self {
            status,
            last_heartbeat: Utc::now(),
            output_buffer_info: OutputBufferInfo {
                buffer_type: "unknown".to_string(),
                total_buffered_bytes: 0,
                total_rows_sent: 0,
                can_add_buffers: false,
            },
            no_more_splits: HashSet::new(),
            stats: TaskStats::default(),
            needs_plan: false,
            output_buffers,
        }
    }
}
