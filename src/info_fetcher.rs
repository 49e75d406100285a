//! `InfoFetcher` — the low-frequency `TaskInfo` loop from spec.md §4.3.
//!
//! Same retry shape as `status_fetcher`, targeting `GET {taskUri}` instead
//! of `/status`, paced to at least `info_update_interval` between
//! dispatches. After the main loop exits, it performs one final fetch to
//! capture the worker's last word on the task — unless the terminal cause
//! was `REMOTE_TASK_ERROR`, in which case the worker is assumed
//! unreachable and the locally synthesized info is left standing.

use std::sync::Arc;
use std::time::Duration;

use rtc_shared::errors::ErrorCode;

use crate::handle::TaskHandle;
use crate::retry::ErrorDurationBreaker;

pub(crate) async fn run(handle: Arc<TaskHandle>) {
    let breaker = Arc::new(ErrorDurationBreaker::new(
        format!("{}-info", handle.task_id()),
        handle.config().max_error_duration,
        handle.clock().clone(),
    ));

    while !handle.is_terminal() {
        let iteration_start = handle.clock().now();
        let current_state = handle.task_status().state;
        let max_wait = handle.config().task_info_refresh_max_wait;

        tracing::debug!(task_id = %handle.task_id(), state = %current_state, "polling task info");

        let rpc = handle.client().fetch_info(current_state, max_wait);
        let stopped = tokio::select! {
            biased;
            _ = handle.stop_token().cancelled() => true,
            result = rpc => {
                match result {
                    Ok(info) => {
                        breaker.record_success(Duration::ZERO);
                        if let Err(err) = handle.apply_info(info) {
                            tracing::warn!(task_id = %handle.task_id(), error = %err, "info update rejected");
                            handle.fail(err.error_code(), err.to_string());
                        }
                    }
                    Err(client_err) => {
                        breaker.record_failure(Duration::ZERO);
                        if !client_err.is_recoverable() {
                            handle.fail(ErrorCode::RemoteTaskError, client_err.to_string());
                        } else if breaker.is_exhausted() {
                            handle.fail(
                                ErrorCode::RemoteTaskError,
                                format!(
                                    "info polling exhausted its error budget after {:?}: {client_err}",
                                    breaker.streak_elapsed()
                                ),
                            );
                        } else {
                            let delay = breaker.backoff_delay(breaker.attempt());
                            tracing::warn!(
                                task_id = %handle.task_id(),
                                error = %client_err,
                                backoff_ms = delay.as_millis(),
                                "transient info poll failure, backing off"
                            );
                        }
                    }
                }
                false
            }
        };

        if stopped {
            handle.fail(ErrorCode::RemoteTaskError, "rpc client stopped");
            break;
        }
        if handle.is_terminal() {
            break;
        }

        // Enforce the minimum spacing between dispatches; the long-poll
        // itself may have returned well before `info_update_interval`
        // elapsed (an error, or a fast state change).
        let elapsed = handle.clock().now().saturating_duration_since(iteration_start);
        if let Some(remaining) = handle.config().info_update_interval.checked_sub(elapsed) {
            if !remaining.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(remaining) => {}
                    _ = handle.notify_handle().notified() => {}
                    _ = handle.stop_token().cancelled() => {}
                }
            }
        }
    }

    final_fetch(&handle).await;
    tracing::debug!(task_id = %handle.task_id(), "info fetcher loop exiting");
}

/// The one post-terminal reconciliation fetch described in spec.md §4.3.
async fn final_fetch(handle: &Arc<TaskHandle>) {
    if handle.terminal_cause() == Some(ErrorCode::RemoteTaskError) {
        tracing::debug!(
            task_id = %handle.task_id(),
            "skipping final info fetch, worker presumed unreachable"
        );
        return;
    }
    if handle.stop_token().is_cancelled() {
        return;
    }

    let current_state = handle.task_status().state;
    let max_wait = handle.config().task_info_refresh_max_wait;
    match handle.client().fetch_info(current_state, max_wait).await {
        Ok(info) => {
            tracing::debug!(task_id = %handle.task_id(), "captured final task info");
            let _ = handle.apply_info(info);
        }
        Err(err) => {
            tracing::warn!(task_id = %handle.task_id(), error = %err, "final info fetch failed, keeping local info");
        }
    }
}
