//! `UpdateSender` — the single-in-flight loop from spec.md §4.4.
//!
//! Publishes local intent as `TaskUpdateRequest`s, one at a time, and owns
//! the terminal `DELETE` handshake. A `cancel`/`abort` only sets
//! `termination_abort`; it does not itself move the handle to terminal, so
//! this loop still drains any already-staged splits/no-more-splits markers
//! with one more `POST` before it sends the `DELETE` — the ordering
//! Scenario A (addSplits -> noMoreSplits -> cancel) relies on. Once the
//! handle is *actually* terminal (worker-reported, mismatch, or a local
//! `fail()`), there's no longer a worker instance to deliver a POST to, so
//! the loop goes straight to the `DELETE` and drops any remaining staged
//! intent; resources still only get released exactly once (§1).

use std::sync::Arc;
use std::time::Duration;

use rtc_shared::errors::ErrorCode;

use crate::handle::TaskHandle;
use crate::retry::ErrorDurationBreaker;

pub(crate) async fn run(handle: Arc<TaskHandle>) {
    let breaker = Arc::new(ErrorDurationBreaker::new(
        format!("{}-update", handle.task_id()),
        handle.config().max_error_duration,
        handle.clock().clone(),
    ));
    let mut sent_update_count: u64 = 0;

    loop {
        if handle.final_delete_sent() {
            break;
        }

        let has_pending_update = handle.pending_update_count() > sent_update_count;

        // Drain any staged splits/no-more-splits markers before tearing
        // down, as long as there's still a worker instance to send them
        // to. Once the handle is actually terminal, the worker is either
        // done with the task already or not the instance we think it is,
        // so there's nothing left to deliver a POST for.
        if has_pending_update && !handle.is_terminal() {
            sent_update_count = send_pending_update(&handle, &breaker).await;
            continue;
        }

        let wants_delete = handle.is_terminal() || handle.termination_abort().is_some();
        if wants_delete {
            send_terminal_delete(&handle, &breaker).await;
            continue;
        }

        tokio::select! {
            _ = handle.notify_handle().notified() => {}
            _ = handle.stop_token().cancelled() => {
                if !handle.is_terminal() {
                    handle.fail(ErrorCode::RemoteTaskError, "rpc client stopped");
                }
            }
        }
    }

    tracing::debug!(task_id = %handle.task_id(), "update sender loop exiting");
}

async fn send_pending_update(handle: &Arc<TaskHandle>, breaker: &Arc<ErrorDurationBreaker>) -> u64 {
    let (request, update_count) = handle.snapshot_for_send();
    let sent_sources = request.sources.clone();

    tracing::debug!(
        task_id = %handle.task_id(),
        sources = sent_sources.len(),
        "sending task update"
    );

    match handle.client().send_update(&request).await {
        Ok(info) => {
            breaker.record_success(Duration::ZERO);
            // Splits are gone regardless of what happens next — the worker
            // is idempotent under sequenceId, so there's nothing to undo
            // on failure, but on success the no-more-splits bookkeeping
            // needs the ack.
            handle.ack_snapshot(&sent_sources);
            if let Err(err) = handle.apply_info(info) {
                handle.fail(err.error_code(), err.to_string());
            }
            update_count
        }
        Err(client_err) => {
            breaker.record_failure(Duration::ZERO);
            if !client_err.is_recoverable() {
                handle.fail(ErrorCode::RemoteTaskError, client_err.to_string());
            } else if breaker.is_exhausted() {
                handle.fail(
                    ErrorCode::RemoteTaskError,
                    format!(
                        "update send exhausted its error budget after {:?}: {client_err}",
                        breaker.streak_elapsed()
                    ),
                );
            } else {
                let delay = breaker.backoff_delay(breaker.attempt());
                tracing::warn!(
                    task_id = %handle.task_id(),
                    error = %client_err,
                    backoff_ms = delay.as_millis(),
                    "transient update send failure, backing off"
                );
                wait_or_stop(handle, delay).await;
            }
            // The snapshot was already drained from pending intent; a
            // failed send does not get a second attempt at the same
            // splits, so `sent_update_count` still advances to the
            // snapshot taken, not the original count before this call.
            update_count
        }
    }
}

async fn send_terminal_delete(handle: &Arc<TaskHandle>, breaker: &Arc<ErrorDurationBreaker>) {
    let abort = handle.termination_abort().unwrap_or(true);
    tracing::debug!(task_id = %handle.task_id(), abort, "sending terminal delete");

    match handle.client().terminate(abort).await {
        Ok(info) => {
            breaker.record_success(Duration::ZERO);
            let _ = handle.apply_info(info);
            handle.mark_final_delete_sent();
        }
        Err(client_err) => {
            breaker.record_failure(Duration::ZERO);
            let give_up = !client_err.is_recoverable() || breaker.is_exhausted();
            if give_up {
                if !handle.is_terminal() {
                    handle.fail(ErrorCode::RemoteTaskError, client_err.to_string());
                }
                handle.mark_final_delete_sent();
            } else {
                let delay = breaker.backoff_delay(breaker.attempt());
                tracing::warn!(
                    task_id = %handle.task_id(),
                    error = %client_err,
                    backoff_ms = delay.as_millis(),
                    "transient terminal delete failure, retrying"
                );
                wait_or_stop(handle, delay).await;
            }
        }
    }
}

async fn wait_or_stop(handle: &Arc<TaskHandle>, delay: Duration) {
    tokio::select! {
        _ = tokio::time::sleep(delay) => {}
        _ = handle.notify_handle().notified() => {}
        _ = handle.stop_token().cancelled() => {
            if !handle.is_terminal() {
                handle.fail(ErrorCode::RemoteTaskError, "rpc client stopped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::handle::SplitPayload;
    use rtc_client::{BinaryCodec, TaskRpcClient};
    use rtc_shared::config::RemoteTaskConfig;
    use rtc_shared::model::{BufferType, Lifespan, OutputBuffers, PlanNodeId, TaskId, TaskInstanceId, TaskState};
    use tokio_util::sync::CancellationToken;
    use url::Url;

    fn handle_against(server_url: &str) -> Arc<TaskHandle> {
        let transport = Arc::new(rtc_client::ReqwestTransport::new(Duration::from_secs(5)).unwrap());
        let uri = Url::parse(&format!("{server_url}/task/n1/q.0.0.0")).unwrap();
        let client = TaskRpcClient::new(transport, Arc::new(BinaryCodec), uri);
        TaskHandle::new(
            TaskId::new("q", 0, 0, 0),
            TaskInstanceId::from("initial"),
            client,
            RemoteTaskConfig {
                max_error_duration: Duration::from_millis(150),
                ..RemoteTaskConfig::default()
            },
            Arc::new(SystemClock),
            CancellationToken::new(),
            serde_json::json!({}),
            None,
            1,
            OutputBuffers::empty(BufferType::Partitioned),
        )
    }

    #[tokio::test]
    async fn pending_splits_with_unreachable_worker_eventually_fail_without_resend_loop_hang() {
        let handle = handle_against("http://127.0.0.1:1");
        handle.add_splits(vec![(
            PlanNodeId::from("probe"),
            vec![SplitPayload {
                connector_split: serde_json::json!({"a": 1}),
                lifespan: Lifespan(0),
            }],
        )]);

        run(handle.clone()).await;

        assert!(handle.is_terminal());
        assert_eq!(handle.task_status().state, TaskState::Failed);
    }

    #[tokio::test]
    async fn cancel_after_pending_splits_sends_the_post_before_the_delete() {
        use rtc_shared::model::{TaskInfo, TaskStatus};

        let mut server = mockito::Server::new_async().await;
        let self_uri = format!("{}/task/n1/q.0.0.0", server.url());

        let mut running = TaskStatus::planned(TaskId::new("q", 0, 0, 0), TaskInstanceId::from("w-1"), &self_uri);
        running.state = TaskState::Running;
        running.version = 1;
        let post_info = TaskInfo::synthesized(running.clone(), OutputBuffers::empty(BufferType::Partitioned));

        let post_mock = server
            .mock("POST", "/task/n1/q.0.0.0")
            .with_status(200)
            .with_body(serde_json::to_string(&post_info).unwrap())
            .create_async()
            .await;

        let mut canceled = running.clone();
        canceled.state = TaskState::Canceled;
        canceled.version = 2;
        let delete_info = TaskInfo::synthesized(canceled, OutputBuffers::empty(BufferType::Partitioned));
        let delete_mock = server
            .mock("DELETE", "/task/n1/q.0.0.0")
            .match_query(mockito::Matcher::UrlEncoded("abort".into(), "false".into()))
            .with_status(200)
            .with_body(serde_json::to_string(&delete_info).unwrap())
            .create_async()
            .await;

        let handle = handle_against(&server.url());
        handle.add_splits(vec![(
            PlanNodeId::from("probe"),
            vec![SplitPayload {
                connector_split: serde_json::json!({"a": 1}),
                lifespan: Lifespan(0),
            }],
        )]);
        // cancel() only stages intent; it does not itself flip the handle
        // to terminal, so the still-unsent split must go out in a POST
        // before the loop honors the DELETE.
        handle.cancel();

        run(handle.clone()).await;

        post_mock.assert_async().await;
        delete_mock.assert_async().await;
        assert!(handle.final_delete_sent());
    }

    #[tokio::test]
    async fn cancel_with_unreachable_worker_still_terminates() {
        let handle = handle_against("http://127.0.0.1:1");
        handle.cancel();

        run(handle.clone()).await;

        assert!(handle.is_terminal());
        assert!(handle.final_delete_sent());
    }

    #[tokio::test]
    async fn already_terminal_with_no_cancel_sends_one_cleanup_delete_attempt() {
        let handle = handle_against("http://127.0.0.1:1");
        handle.fail(ErrorCode::RemoteTaskMismatch, "worker moved on");

        run(handle.clone()).await;

        assert!(handle.final_delete_sent());
        // the original failure cause is preserved, not overwritten by the
        // delete attempt's own (also fatal) outcome
        assert_eq!(handle.task_status().failures[0].code, ErrorCode::RemoteTaskMismatch);
    }
}
