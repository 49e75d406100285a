//! `RemoteTaskFactory` — the single owner of the shared RPC plumbing
//! described in spec.md §4.5.
//!
//! One factory per coordinator process (or per worker pool, if a
//! deployment wants isolated stop switches per pool). Holds the
//! transport, the codec negotiated with workers, the clock every handle's
//! retry budget is measured against, and the [`CancellationToken`] that
//! `stop()` fires to unwind every loop currently in flight.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use url::Url;

use rtc_client::{Codec, RpcTransport, TaskRpcClient};
use rtc_shared::config::RemoteTaskConfig;
use rtc_shared::model::{OutputBuffers, TaskId, TaskInstanceId};

use crate::clock::{Clock, SystemClock};
use crate::handle::TaskHandle;

/// Everything `create_task_handle` needs about one task beyond its
/// identity: the scheduling fragment (if the worker still needs a plan),
/// the session properties to ship on every update, and the initial
/// output-buffer descriptor.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub task_id: TaskId,
    pub worker_base_uri: Url,
    pub session: serde_json::Value,
    pub fragment: Option<serde_json::Value>,
    pub total_partitions: u32,
    pub initial_output_buffers: OutputBuffers,
}

/// Creates and tracks [`TaskHandle`]s for one coordinator stage's worth of
/// remote tasks, all sharing one transport, one codec, and one stop
/// switch.
pub struct RemoteTaskFactory {
    transport: Arc<dyn RpcTransport>,
    codec: Arc<dyn Codec>,
    clock: Arc<dyn Clock>,
    config: RemoteTaskConfig,
    stop_token: CancellationToken,
    handles: Mutex<HashMap<TaskId, Arc<TaskHandle>>>,
}

impl std::fmt::Debug for RemoteTaskFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteTaskFactory")
            .field("config", &self.config)
            .field("tasks", &self.handles.lock().len())
            .field("stopped", &self.stop_token.is_cancelled())
            .finish()
    }
}

impl RemoteTaskFactory {
    pub fn new(transport: Arc<dyn RpcTransport>, codec: Arc<dyn Codec>, config: RemoteTaskConfig) -> Self {
        Self::with_clock(transport, codec, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        transport: Arc<dyn RpcTransport>,
        codec: Arc<dyn Codec>,
        config: RemoteTaskConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            transport,
            codec,
            clock,
            config,
            stop_token: CancellationToken::new(),
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Builds, registers, and starts a [`TaskHandle`] for `spec`, fencing
    /// it to `instance_id` as the worker's first-contact identity per
    /// spec.md §4.1. Replaces and supersedes any prior handle for the
    /// same `TaskId` — callers are expected to have already dropped the
    /// old one (an attempt retry creates a fresh task, never reuses a
    /// handle).
    pub fn create_task_handle(&self, spec: TaskSpec, instance_id: TaskInstanceId) -> Arc<TaskHandle> {
        let task_uri = self.build_task_uri(&spec.worker_base_uri, &spec.task_id);
        let client = TaskRpcClient::new(self.transport.clone(), self.codec.clone(), task_uri);

        let handle = TaskHandle::new(
            spec.task_id.clone(),
            instance_id,
            client,
            self.config.clone(),
            self.clock.clone(),
            self.stop_token.clone(),
            spec.session,
            spec.fragment,
            spec.total_partitions,
            spec.initial_output_buffers,
        );

        self.handles.lock().insert(spec.task_id, handle.clone());
        handle.start();
        handle
    }

    /// `{workerBaseUri}/task/{stageId}/{taskId}` — the worker-side routing
    /// convention every endpoint in rtc-client is relative to.
    fn build_task_uri(&self, worker_base_uri: &Url, task_id: &TaskId) -> Url {
        let mut uri = worker_base_uri.clone();
        {
            let mut segments = uri
                .path_segments_mut()
                .expect("worker base uri must be a base (not `data:` or similar)");
            segments.push("task");
            segments.push(&task_id.stage_id.to_string());
            segments.push(&task_id.to_string());
        }
        uri
    }

    pub fn handle(&self, task_id: &TaskId) -> Option<Arc<TaskHandle>> {
        self.handles.lock().get(task_id).cloned()
    }

    pub fn remove(&self, task_id: &TaskId) -> Option<Arc<TaskHandle>> {
        self.handles.lock().remove(task_id)
    }

    pub fn active_task_count(&self) -> usize {
        self.handles.lock().len()
    }

    /// Cancels the shared stop token (every loop's `tokio::select!` picks
    /// this up on its next iteration, per spec.md §5) and shuts down the
    /// transport so any in-flight or subsequent RPC is rejected rather
    /// than attempted.
    pub fn stop(&self) {
        self.stop_token.cancel();
        self.transport.shut_down();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop_token.is_cancelled()
    }
}

/// Mints a fresh instance id for a task's first attempt. Workers are
/// expected to echo it back unchanged for as long as the same process
/// owns the task; a later mismatch is what `TaskHandle::apply_status`
/// treats as `REMOTE_TASK_MISMATCH`.
pub fn bootstrap_instance_id() -> TaskInstanceId {
    TaskInstanceId::from(uuid::Uuid::new_v4().to_string())
}

/// Convenience constructor wiring a [`RemoteTaskFactory`] to a real
/// `reqwest` transport and the binary wire codec, the default pairing per
/// spec.md §6.
pub fn reqwest_factory(request_timeout: Duration, config: RemoteTaskConfig) -> rtc_client::ClientResult<RemoteTaskFactory> {
    let transport = Arc::new(rtc_client::ReqwestTransport::new(request_timeout)?);
    Ok(RemoteTaskFactory::new(transport, Arc::new(rtc_client::BinaryCodec), config))
}
