//! Header names and values the controller's long-poll protocol relies on.
//!
//! Per §6 of the external-interface contract, both GET long-polls MUST
//! carry the client's current view of task state and its requested
//! max-wait so the worker knows when it's allowed to hold the response.

use std::time::Duration;

use rtc_shared::model::TaskState;

pub const CURRENT_STATE: &str = "X-Presto-Current-State";
pub const MAX_WAIT: &str = "X-Presto-Max-Wait";

/// Render a [`TaskState`] the way the header expects it — the same
/// `SCREAMING_SNAKE_CASE` the wire JSON uses.
pub fn current_state_value(state: TaskState) -> String {
    state.to_string()
}

/// Render a max-wait duration in the `humantime`-ish form the worker's
/// long-poll parser accepts (`"2s"`, `"500ms"`).
pub fn max_wait_value(wait: Duration) -> String {
    let millis = wait.as_millis();
    if millis % 1000 == 0 {
        format!("{}s", millis / 1000)
    } else {
        format!("{millis}ms")
    }
}
