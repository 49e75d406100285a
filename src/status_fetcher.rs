//! `StatusFetcher` — the high-frequency long-poll loop from spec.md §4.2.
//!
//! Issues `GET {taskUri}/status` with the client's current state and
//! configured max-wait, feeds every reply through
//! [`TaskHandle::apply_status`], and classifies failures as transient
//! (retry with backoff) or fatal (`REMOTE_TASK_ERROR`).

use std::sync::Arc;
use std::time::Duration;

use rtc_shared::errors::ErrorCode;

use crate::handle::TaskHandle;
use crate::retry::ErrorDurationBreaker;

pub(crate) async fn run(handle: Arc<TaskHandle>) {
    let breaker = Arc::new(ErrorDurationBreaker::new(
        format!("{}-status", handle.task_id()),
        handle.config().max_error_duration,
        handle.clock().clone(),
    ));

    while !handle.is_terminal() {
        let current_state = handle.task_status().state;
        let max_wait = handle.config().status_refresh_max_wait;

        tracing::debug!(task_id = %handle.task_id(), state = %current_state, "polling task status");

        let rpc = handle.client().fetch_status(current_state, max_wait);
        tokio::select! {
            biased;
            _ = handle.stop_token().cancelled() => {
                handle.fail(ErrorCode::RemoteTaskError, "rpc client stopped");
                break;
            }
            result = rpc => {
                match result {
                    Ok(status) => {
                        breaker.record_success(Duration::ZERO);
                        if let Err(err) = handle.apply_status(status) {
                            tracing::warn!(task_id = %handle.task_id(), error = %err, "status update rejected");
                            handle.fail(err.error_code(), err.to_string());
                        }
                    }
                    Err(client_err) => {
                        breaker.record_failure(Duration::ZERO);
                        if !client_err.is_recoverable() {
                            handle.fail(ErrorCode::RemoteTaskError, client_err.to_string());
                            break;
                        }
                        if breaker.is_exhausted() {
                            handle.fail(
                                ErrorCode::RemoteTaskError,
                                format!(
                                    "status polling exhausted its error budget after {:?}: {client_err}",
                                    breaker.streak_elapsed()
                                ),
                            );
                            break;
                        }
                        let delay = breaker.backoff_delay(breaker.attempt());
                        tracing::warn!(
                            task_id = %handle.task_id(),
                            error = %client_err,
                            backoff_ms = delay.as_millis(),
                            "transient status poll failure, backing off"
                        );
                        wait_or_stop(&handle, delay).await;
                    }
                }
            }
        }
    }

    tracing::debug!(task_id = %handle.task_id(), "status fetcher loop exiting");
}

/// Sleep for `delay` unless the task becomes terminal or the factory
/// stops first, in which case return early.
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
