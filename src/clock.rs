//! Monotonic time, injected rather than read directly from the OS.
//!
//! Backoff and error-budget accounting need a clock; reading
//! [`tokio::time::Instant::now`] directly would make every retry test a
//! real-wallclock sleep. [`SystemClock`] returns `tokio::time::Instant`,
//! which respects `tokio::time::pause`/`advance` under `#[tokio::test]`,
//! so scripted scenarios (§8 of the remote-task protocol, e.g. "error
//! budget exhausted after N attempts") run instantly and deterministically
//! without a bespoke fake-clock type.

use std::fmt;

use tokio::time::Instant;

/// One of the three capabilities the controller is parameterized over
/// (alongside the RPC transport and the wire codec).
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn paused_clock_only_advances_on_demand() {
        let clock = SystemClock;
        let t0 = clock.now();
        tokio::time::advance(Duration::from_secs(5)).await;
        let t1 = clock.now();
        assert_eq!(t1 - t0, Duration::from_secs(5));
    }
}
