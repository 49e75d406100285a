//! Core data model for the remote task protocol.
//!
//! Every type here is a plain value type: `Clone`, `Debug`, and
//! `Serialize`/`Deserialize` so either wire codec (JSON today, a compact
//! binary framing tomorrow) can round-trip it. None of these types know how
//! they get to the wire — that's `rtc-client`'s job.

mod output_buffers;
mod task_id;
mod task_info;
mod task_source;
mod task_status;
mod task_update_request;

pub use output_buffers::{BufferType, OutputBufferDescriptor, OutputBuffers};
pub use task_id::{Lifespan, PlanNodeId, TaskId, TaskInstanceId};
pub use task_info::{OutputBufferInfo, TaskInfo, TaskStats};
pub use task_source::{ScheduledSplit, TaskSource};
pub use task_status::{TaskState, TaskStatus};
pub use task_update_request::TaskUpdateRequest;
