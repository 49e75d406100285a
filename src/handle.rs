//! `TaskHandle` — the per-task facade described in spec.md §4.1.
//!
//! Owns the authoritative client-side `TaskStatus`/`TaskInfo`, the staged
//! intent the planner has asked for, and orchestrates the three
//! long-running loops (`status_fetcher`, `info_fetcher`, `update_sender`)
//! through a single gate: [`TaskHandle::apply_status`]. Every fresher
//! status any loop observes passes through that gate before it's
//! published; nothing else in this module is allowed to touch
//! `state.status` directly.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use rtc_client::TaskRpcClient;
use rtc_shared::config::RemoteTaskConfig;
use rtc_shared::errors::{ErrorCode, Failure, RemoteTaskError, RemoteTaskResult};
use rtc_shared::model::{
    Lifespan, OutputBuffers, PlanNodeId, ScheduledSplit, TaskId, TaskInfo, TaskInstanceId, TaskSource, TaskState,
    TaskStatus, TaskUpdateRequest,
};

use crate::clock::Clock;
use crate::intent::PendingIntent;
use crate::listener::{ListenerRegistry, StateChangeListener};

/// One split's payload as the planner hands it to `TaskHandle::add_splits`,
/// before a sequence id has been assigned.
#[derive(Debug, Clone)]
pub struct SplitPayload {
    pub connector_split: serde_json::Value,
    pub lifespan: Lifespan,
}

struct SharedState {
    status: TaskStatus,
    info: Option<TaskInfo>,
    intent: PendingIntent,
    session: serde_json::Value,
    fragment: Option<serde_json::Value>,
    needs_plan: bool,
    output_buffers: OutputBuffers,
    total_partitions: u32,
    pending_update_count: u64,
    /// `Some(abort)` once `cancel`/`abort` was called, or once the task
    /// entered terminal some other way and a default cleanup `DELETE` was
    /// scheduled (see `TaskHandle::enter_terminal`).
    termination_abort: Option<bool>,
    final_delete_sent: bool,
    terminal_cause: Option<ErrorCode>,
}

/// Per-task facade. Created by [`crate::factory::RemoteTaskFactory`],
/// always held behind an `Arc` so the three loops can each hold a handle
/// back to it.
pub struct TaskHandle {
    task_id: TaskId,
    initial_instance_id: TaskInstanceId,
    client: TaskRpcClient,
    config: RemoteTaskConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<SharedState>,
    listeners: ListenerRegistry,
    terminal: AtomicBool,
    notify: Notify,
    sequence_counter: AtomicI64,
    started: AtomicBool,
    stop_token: CancellationToken,
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("task_id", &self.task_id)
            .field("terminal", &self.is_terminal())
            .field("started", &self.started.load(Ordering::Relaxed))
            .finish()
    }
}

impl TaskHandle {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        task_id: TaskId,
        initial_instance_id: TaskInstanceId,
        client: TaskRpcClient,
        config: RemoteTaskConfig,
        clock: Arc<dyn Clock>,
        stop_token: CancellationToken,
        session: serde_json::Value,
        fragment: Option<serde_json::Value>,
        total_partitions: u32,
        initial_output_buffers: OutputBuffers,
    ) -> Arc<Self> {
        let self_uri = client.task_uri().to_string();
        let status = TaskStatus::planned(task_id.clone(), initial_instance_id.clone(), self_uri);
        let needs_plan = fragment.is_some();
        Arc::new(Self {
            task_id,
            initial_instance_id,
            client,
            config,
            clock,
            state: Mutex::new(SharedState {
                status,
                info: None,
                intent: PendingIntent::default(),
                session,
                fragment,
                needs_plan,
                output_buffers: initial_output_buffers,
                total_partitions,
                pending_update_count: 0,
                termination_abort: None,
                final_delete_sent: false,
                terminal_cause: None,
            }),
            listeners: ListenerRegistry::default(),
            terminal: AtomicBool::new(false),
            notify: Notify::new(),
            sequence_counter: AtomicI64::new(0),
            started: AtomicBool::new(false),
            stop_token,
        })
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Idempotent: starts the three loops on first call, a no-op
    /// afterward (including after terminal).
    pub fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.is_terminal() {
            return;
        }
        tracing::debug!(task_id = %self.task_id, "starting task handle loops");
        tokio::spawn(crate::status_fetcher::run(self.clone()));
        tokio::spawn(crate::info_fetcher::run(self.clone()));
        tokio::spawn(crate::update_sender::run(self.clone()));
    }

    /// Extends pending intent with freshly-scheduled splits, assigning
    /// each a strictly increasing sequence id in call order. Fails
    /// silently once terminal, per spec.md §4.1.
    pub fn add_splits<I>(&self, batches: I)
    where
        I: IntoIterator<Item = (PlanNodeId, Vec<SplitPayload>)>,
    {
        if self.is_terminal() {
            return;
        }
        let mut guard = self.state.lock();
        for (plan_node_id, payloads) in batches {
            let splits: Vec<ScheduledSplit> = payloads
                .into_iter()
                .map(|payload| {
                    let sequence_id = self.sequence_counter.fetch_add(1, Ordering::SeqCst);
                    ScheduledSplit {
                        sequence_id,
                        connector_split: payload.connector_split,
                        lifespan: payload.lifespan,
                    }
                })
                .collect();
            guard.intent.add_splits(plan_node_id, splits);
        }
        guard.pending_update_count += 1;
        drop(guard);
        self.notify.notify_waiters();
    }

    /// Marks a single `(planNodeId, lifespan)` pair as done. Idempotent —
    /// safe to call repeatedly.
    pub fn no_more_splits_for_lifespan(&self, plan_node_id: PlanNodeId, lifespan: Lifespan) {
        if self.is_terminal() {
            return;
        }
        let mut guard = self.state.lock();
        guard.intent.mark_no_more_splits_for_lifespan(plan_node_id, lifespan);
        guard.pending_update_count += 1;
        drop(guard);
        self.notify.notify_waiters();
    }

    /// Marks an entire plan node as done. Idempotent.
    pub fn no_more_splits(&self, plan_node_id: PlanNodeId) {
        if self.is_terminal() {
            return;
        }
        let mut guard = self.state.lock();
        guard.intent.mark_no_more_splits(plan_node_id);
        guard.pending_update_count += 1;
        drop(guard);
        self.notify.notify_waiters();
    }

    /// Accepts `buffers` only if it is newer-or-equal to the currently
    /// held descriptor; discards stale ones silently.
    pub fn set_output_buffers(&self, buffers: OutputBuffers) {
        if self.is_terminal() {
            return;
        }
        let mut guard = self.state.lock();
        if !buffers.is_newer_or_equal(&guard.output_buffers) {
            return;
        }
        guard.output_buffers = buffers;
        guard.pending_update_count += 1;
        drop(guard);
        self.notify.notify_waiters();
    }

    /// Requests graceful termination. Non-blocking: marks intent and
    /// returns immediately, per spec.md §5.
    pub fn cancel(&self) {
        self.request_termination(false);
    }

    /// Requests forceful termination.
    pub fn abort(&self) {
        self.request_termination(true);
    }

    fn request_termination(&self, abort: bool) {
        if self.is_terminal() {
            return;
        }
        let mut guard = self.state.lock();
        guard.termination_abort = Some(abort);
        guard.pending_update_count += 1;
        drop(guard);
        self.notify.notify_waiters();
    }

    pub fn task_status(&self) -> TaskStatus {
        self.state.lock().status.clone()
    }

    pub fn task_info(&self) -> Option<TaskInfo> {
        self.state.lock().info.clone()
    }

    pub fn add_state_change_listener(&self, listener: Arc<dyn StateChangeListener>) {
        self.listeners.add(listener);
    }

    /// Planner-triggered failure. Idempotent: only the first call moves
    /// the task to `Failed`; later calls just append to `failures`.
    pub fn fail(&self, code: ErrorCode, cause: impl Into<String>) {
        let failure = Failure {
            code,
            message: cause.into(),
            task_id: Some(self.task_id.clone()),
            timestamp: Utc::now(),
        };
        let mut guard = self.state.lock();
        guard.status.failures.push(failure);
        if guard.status.state.is_done() {
            return;
        }
        guard.status.state = TaskState::Failed;
        guard.status.version += 1;
        let status = guard.status.clone();
        drop(guard);

        tracing::error!(task_id = %self.task_id, code = %code, "task failed locally");
        self.listeners.notify(&status);
        self.enter_terminal(Some(code));
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal.load(Ordering::Acquire)
    }

    /// The single gate every fresher `TaskStatus` — from any loop — must
    /// pass through before it's published. See spec.md §4.1.
    pub(crate) fn apply_status(&self, new_status: TaskStatus) -> RemoteTaskResult<()> {
        let mut guard = self.state.lock();
        if guard.status.state.is_done() {
            return Ok(());
        }

        let instance_changed = new_status.instance_id != guard.status.instance_id;
        if instance_changed {
            if guard.status.instance_id != self.initial_instance_id {
                let err = RemoteTaskError::InstanceMismatch {
                    task_id: self.task_id.clone(),
                    expected: guard.status.instance_id.to_string(),
                    actual: new_status.instance_id.to_string(),
                };
                drop(guard);
                return Err(err);
            }
            tracing::debug!(
                task_id = %self.task_id,
                instance_id = %new_status.instance_id,
                "first contact with worker instance"
            );
        } else if new_status.version < guard.status.version {
            let err = RemoteTaskError::VersionRegression {
                task_id: self.task_id.clone(),
                previous: guard.status.version,
                reported: new_status.version,
            };
            drop(guard);
            return Err(err);
        }

        guard.status = new_status.clone();
        let done = new_status.state.is_done();
        drop(guard);

        tracing::debug!(
            task_id = %self.task_id,
            instance_id = %new_status.instance_id,
            version = new_status.version,
            state = %new_status.state,
            "published task status"
        );
        self.listeners.notify(&new_status);
        if done {
            let cause = if new_status.state == TaskState::Failed {
                new_status.failures.last().map(|f| f.code)
            } else {
                None
            };
            self.enter_terminal(cause);
        }
        Ok(())
    }

    /// Applies a full `TaskInfo` reply: its embedded status passes through
    /// the same gate, and the info itself is kept only if it isn't stale
    /// relative to whatever status is now known (guards against a
    /// straggling reply applied out of order).
    pub(crate) fn apply_info(&self, info: TaskInfo) -> RemoteTaskResult<()> {
        self.apply_status(info.status.clone())?;

        let mut guard = self.state.lock();
        let stale = info.status.version < guard.status.version
            || (info.status.version == guard.status.version && info.status.instance_id != guard.status.instance_id);
        if stale {
            return Ok(());
        }
        if !info.needs_plan {
            guard.needs_plan = false;
            guard.fragment = None;
        }
        guard.info = Some(info);
        Ok(())
    }

    fn enter_terminal(&self, cause: Option<ErrorCode>) {
        if self.terminal.swap(true, Ordering::AcqRel) {
            return;
        }
        {
            let mut guard = self.state.lock();
            guard.termination_abort.get_or_insert(true);
            guard.terminal_cause = cause;
        }
        tracing::info!(task_id = %self.task_id, cause = ?cause, "task entered terminal state");
        self.notify.notify_waiters();
    }

    // -- internals consumed by the three loops --

    pub(crate) fn client(&self) -> &TaskRpcClient {
        &self.client
    }

    pub(crate) fn config(&self) -> &RemoteTaskConfig {
        &self.config
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub(crate) fn stop_token(&self) -> &CancellationToken {
        &self.stop_token
    }

    pub(crate) fn notify_handle(&self) -> &Notify {
        &self.notify
    }

    pub(crate) fn pending_update_count(&self) -> u64 {
        self.state.lock().pending_update_count
    }

    pub(crate) fn snapshot_for_send(&self) -> (TaskUpdateRequest, u64) {
        let mut guard = self.state.lock();
        let sources = guard.intent.snapshot_sources();
        let fragment = if guard.needs_plan { guard.fragment.clone() } else { None };
        let request = TaskUpdateRequest {
            session: guard.session.clone(),
            fragment,
            sources,
            output_buffers: guard.output_buffers.clone(),
            total_partitions: guard.total_partitions,
        };
        (request, guard.pending_update_count)
    }

    pub(crate) fn ack_snapshot(&self, sources: &[TaskSource]) {
        self.state.lock().intent.ack_sources(sources);
    }

    pub(crate) fn termination_abort(&self) -> Option<bool> {
        self.state.lock().termination_abort
    }

    pub(crate) fn final_delete_sent(&self) -> bool {
        self.state.lock().final_delete_sent
    }

    pub(crate) fn mark_final_delete_sent(&self) {
        self.state.lock().final_delete_sent = true;
    }

    pub(crate) fn terminal_cause(&self) -> Option<ErrorCode> {
        self.state.lock().terminal_cause
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtc_client::{BinaryCodec, ReqwestTransport};
    use rtc_shared::model::BufferType;
    use std::time::Duration;
    use url::Url;

    fn make_handle() -> Arc<TaskHandle> {
        let transport = Arc::new(ReqwestTransport::new(Duration::from_secs(1)).unwrap());
        let client = TaskRpcClient::new(
            transport,
            Arc::new(BinaryCodec),
            Url::parse("http://worker/task/n1/q.0.0.0").unwrap(),
        );
        TaskHandle::new(
            TaskId::new("q", 0, 0, 0),
            TaskInstanceId::from("initial"),
            client,
            RemoteTaskConfig::default(),
            Arc::new(crate::clock::SystemClock),
            CancellationToken::new(),
            serde_json::json!({}),
            Some(serde_json::json!({"plan": "p"})),
            4,
            OutputBuffers::empty(BufferType::Partitioned),
        )
    }

    fn status_with(handle: &TaskHandle, instance: &str, version: u64, state: TaskState) -> TaskStatus {
        let mut status = handle.task_status();
        status.instance_id = TaskInstanceId::from(instance);
        status.version = version;
        status.state = state;
        status
    }

    #[test]
    fn first_contact_instance_transition_is_accepted() {
        let handle = make_handle();
        let status = status_with(&handle, "worker-a", 1, TaskState::Running);
        handle.apply_status(status).unwrap();
        assert_eq!(handle.task_status().instance_id, TaskInstanceId::from("worker-a"));
    }

    #[test]
    fn instance_change_after_first_contact_is_mismatch() {
        let handle = make_handle();
        handle
            .apply_status(status_with(&handle, "worker-a", 1, TaskState::Running))
            .unwrap();

        let err = handle
            .apply_status(status_with(&handle, "worker-b", 2, TaskState::Running))
            .unwrap_err();
        assert!(matches!(err, RemoteTaskError::InstanceMismatch { .. }));
    }

    #[test]
    fn version_regression_with_same_instance_is_mismatch() {
        let handle = make_handle();
        handle
            .apply_status(status_with(&handle, "worker-a", 1_000_000, TaskState::Running))
            .unwrap();

        let err = handle
            .apply_status(status_with(&handle, "worker-a", 5, TaskState::Running))
            .unwrap_err();
        assert!(matches!(err, RemoteTaskError::VersionRegression { .. }));
    }

    #[test]
    fn applying_mismatch_through_fail_reaches_terminal_failed() {
        let handle = make_handle();
        handle
            .apply_status(status_with(&handle, "worker-a", 1, TaskState::Running))
            .unwrap();
        let err = handle
            .apply_status(status_with(&handle, "worker-b", 2, TaskState::Running))
            .unwrap_err();
        handle.fail(err.error_code(), err.to_string());

        assert!(handle.is_terminal());
        let status = handle.task_status();
        assert_eq!(status.state, TaskState::Failed);
        assert_eq!(status.failures.len(), 1);
        assert_eq!(status.failures[0].code, ErrorCode::RemoteTaskMismatch);
    }

    #[test]
    fn terminal_is_sticky_even_for_later_done_statuses() {
        let handle = make_handle();
        handle.fail(ErrorCode::RemoteTaskError, "boom");
        assert!(handle.is_terminal());

        handle
            .apply_status(status_with(&handle, "initial", 999, TaskState::Finished))
            .unwrap();
        assert_eq!(handle.task_status().state, TaskState::Failed);
    }

    #[test]
    fn late_stale_reply_after_terminal_does_not_rewind_version() {
        let handle = make_handle();
        handle
            .apply_status(status_with(&handle, "worker-a", 10, TaskState::Running))
            .unwrap();
        handle.fail(ErrorCode::RemoteTaskError, "timeout");
        let failed_version = handle.task_status().version;

        // a stale in-flight reply from before the failure arrives late
        handle
            .apply_status(status_with(&handle, "worker-a", 11, TaskState::Running))
            .unwrap();

        assert_eq!(handle.task_status().version, failed_version);
        assert_eq!(handle.task_status().state, TaskState::Failed);
    }

    #[test]
    fn fail_is_idempotent_about_state_but_appends_failures() {
        let handle = make_handle();
        handle.fail(ErrorCode::RemoteTaskError, "first");
        handle.fail(ErrorCode::RemoteTaskMismatch, "second");

        let status = handle.task_status();
        assert_eq!(status.state, TaskState::Failed);
        assert_eq!(status.failures.len(), 2);
    }

    #[test]
    fn add_splits_assigns_strictly_increasing_sequence_ids_in_call_order() {
        let handle = make_handle();
        let node = PlanNodeId::from("probe");
        handle.add_splits(vec![(
            node.clone(),
            vec![SplitPayload {
                connector_split: serde_json::json!({"a": 1}),
                lifespan: Lifespan(0),
            }],
        )]);
        handle.add_splits(vec![(
            node.clone(),
            vec![SplitPayload {
                connector_split: serde_json::json!({"a": 2}),
                lifespan: Lifespan(0),
            }],
        )]);

        let (request, _) = handle.snapshot_for_send();
        let seqs: Vec<i64> = request.sources[0].splits.iter().map(|s| s.sequence_id).collect();
        assert!(seqs[0] < seqs[1]);
    }

    #[test]
    fn add_splits_is_a_noop_once_terminal() {
        let handle = make_handle();
        handle.fail(ErrorCode::RemoteTaskError, "boom");
        handle.add_splits(vec![(
            PlanNodeId::from("probe"),
            vec![SplitPayload {
                connector_split: serde_json::json!({}),
                lifespan: Lifespan(0),
            }],
        )]);

        let (request, _) = handle.snapshot_for_send();
        assert!(request.sources.is_empty());
    }

    #[test]
    fn set_output_buffers_discards_stale_version() {
        let handle = make_handle();
        handle.set_output_buffers(OutputBuffers {
            version: 5,
            ..OutputBuffers::empty(BufferType::Partitioned)
        });
        handle.set_output_buffers(OutputBuffers {
            version: 2,
            ..OutputBuffers::empty(BufferType::Partitioned)
        });

        let (request, _) = handle.snapshot_for_send();
        assert_eq!(request.output_buffers.version, 5);
    }

    #[test]
    fn cancel_requests_graceful_termination() {
        let handle = make_handle();
        handle.cancel();
        assert_eq!(handle.termination_abort(), Some(false));
    }

    #[test]
    fn abort_requests_forceful_termination() {
        let handle = make_handle();
        handle.abort();
        assert_eq!(handle.termination_abort(), Some(true));
    }

    #[test]
    fn listeners_fire_on_every_published_transition() {
        use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

        let handle = make_handle();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        handle.add_state_change_listener(Arc::new(move |_: &TaskStatus| {
            count_clone.fetch_add(1, AtomicOrdering::SeqCst);
        }));

        handle
            .apply_status(status_with(&handle, "worker-a", 1, TaskState::Running))
            .unwrap();
        handle
            .apply_status(status_with(&handle, "worker-a", 2, TaskState::Finished))
            .unwrap();

        assert_eq!(count.load(AtomicOrdering::SeqCst), 2);
    }
}
