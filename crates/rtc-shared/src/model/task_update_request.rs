//! The body of `POST /{taskId}` — the controller's outbound "here is
//! what you should be doing" message.

use serde::{Deserialize, Serialize};

use super::output_buffers::OutputBuffers;
use super::task_source::TaskSource;

/// An update sent to a worker.
///
/// `fragment` carries the query plan fragment for the task; once the
/// worker has acknowledged it (`TaskInfo::needs_plan == false`),
/// `UpdateSender` omits it from subsequent requests to keep the request
/// body small on a long-running task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskUpdateRequest {
    pub session: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fragment: Option<serde_json::Value>,
    pub sources: Vec<TaskSource>,
    pub output_buffers: OutputBuffers,
    pub total_partitions: u32,
}
