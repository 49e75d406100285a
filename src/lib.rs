//! Coordinator-side remote task controller.
//!
//! Drives one [`TaskHandle`] per remote task against a single worker: a
//! high-frequency status long-poll ([`status_fetcher`]), a lower-frequency
//! stats/output-buffer fetch ([`info_fetcher`]), and an intent-publishing
//! update sender ([`update_sender`]), all gated through
//! `TaskHandle::apply_status` so instance mismatches, version regressions,
//! and terminal stickiness are enforced in exactly one place. See
//! [`factory::RemoteTaskFactory`] for how handles get created.

pub mod clock;
pub mod factory;
pub mod handle;
pub mod listener;
pub mod retry;

mod info_fetcher;
mod intent;
mod status_fetcher;
mod update_sender;

pub use clock::{Clock, SystemClock};
pub use factory::{bootstrap_instance_id, reqwest_factory, RemoteTaskFactory, TaskSpec};
pub use handle::{SplitPayload, TaskHandle};
pub use listener::{ListenerRegistry, StateChangeListener};
pub use retry::ErrorDurationBreaker;

pub use rtc_client::{BinaryCodec, ClientError, ClientResult, Codec, JsonCodec, ReqwestTransport, RpcTransport, TaskRpcClient};
pub use rtc_shared::config::RemoteTaskConfig;
pub use rtc_shared::errors::{ErrorCode, Failure, RemoteTaskError, RemoteTaskResult};
pub use rtc_shared::model::{
    BufferType, Lifespan, OutputBufferDescriptor, OutputBuffers, PlanNodeId, ScheduledSplit, TaskId, TaskInfo,
    TaskInstanceId, TaskSource, TaskState, TaskStatus, TaskUpdateRequest,
};
