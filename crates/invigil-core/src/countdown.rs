//! Countdown timing for a live attempt.
//!
//! Remaining time is derived, never accumulated. [`remaining_seconds`]
//! anchors on the server-stamped start instant exactly once, at load; the
//! live ticker then runs off a monotonic deadline, so a stalled or
//! backgrounded process snaps to the correct value on the next tick instead
//! of drifting. The expiry signal fires exactly once.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::debug;

/// Whole seconds remaining at `now` for an attempt started at `started_at`.
///
/// Partially elapsed seconds count as remaining, and the result saturates
/// at zero once the limit has passed. A `now` before `started_at` (clock
/// skew between server and host) clamps to the full limit.
pub fn remaining_seconds(
    started_at: DateTime<Utc>,
    time_limit: Duration,
    now: DateTime<Utc>,
) -> u64 {
    let elapsed = now.signed_duration_since(started_at).num_seconds();
    if elapsed <= 0 {
        return time_limit.as_secs();
    }
    time_limit.as_secs().saturating_sub(elapsed as u64)
}

/// Lifecycle of a [`Countdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownState {
    Running,
    Expired,
}

/// A live countdown for one attempt.
///
/// Started with the remaining budget computed at load time. Publishes the
/// remaining whole seconds through a watch channel once per second and
/// flips to [`CountdownState::Expired`] exactly once when the deadline
/// passes. Dropping the handle stops the ticker.
pub struct Countdown {
    deadline: Instant,
    remaining_rx: watch::Receiver<u64>,
    state_rx: watch::Receiver<CountdownState>,
    ticker: JoinHandle<()>,
}

impl Countdown {
    /// Spawn the ticker. A zero `remaining` expires immediately without
    /// ever rendering a running timer.
    pub fn start(remaining: Duration) -> Self {
        let deadline = Instant::now() + remaining;
        let initial_state = if remaining.is_zero() {
            CountdownState::Expired
        } else {
            CountdownState::Running
        };
        let (remaining_tx, remaining_rx) = watch::channel(remaining.as_secs());
        let (state_tx, state_rx) = watch::channel(initial_state);
        let ticker = tokio::spawn(run_ticker(deadline, remaining_tx, state_tx));
        Self {
            deadline,
            remaining_rx,
            state_rx,
            ticker,
        }
    }

    /// Time left until the deadline, zero once passed.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn state(&self) -> CountdownState {
        *self.state_rx.borrow()
    }

    /// Watch the published whole-seconds value, for rendering.
    pub fn subscribe_remaining(&self) -> watch::Receiver<u64> {
        self.remaining_rx.clone()
    }

    /// A future that resolves `true` when the countdown expires, or `false`
    /// if it was cancelled first. Resolves immediately if already expired.
    pub fn expired(&self) -> impl Future<Output = bool> + Send + 'static {
        let mut rx = self.state_rx.clone();
        async move {
            rx.wait_for(|state| *state == CountdownState::Expired)
                .await
                .is_ok()
        }
    }

    /// Stop the ticker without expiring. Used when the attempt is submitted
    /// manually before the deadline.
    pub fn cancel(&self) {
        self.ticker.abort();
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.ticker.abort();
    }
}

async fn run_ticker(
    deadline: Instant,
    remaining_tx: watch::Sender<u64>,
    state_tx: watch::Sender<CountdownState>,
) {
    loop {
        let now = Instant::now();
        if now >= deadline {
            publish(&remaining_tx, 0);
            let _ = state_tx.send(CountdownState::Expired);
            debug!("countdown expired");
            // Task exits here, so the expiry publish cannot repeat.
            return;
        }
        let left = deadline - now;
        publish(&remaining_tx, ceil_secs(left));
        // Tick once per second, but never sleep past the deadline.
        let step = Duration::from_secs(1).min(left);
        time::sleep(step).await;
    }
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

/// Send only on change, so resumed or duplicate ticks do not wake renderers.
fn publish(tx: &watch::Sender<u64>, value: u64) {
    tx.send_if_modified(|current| {
        if *current == value {
            false
        } else {
            *current = value;
            true
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, h, m, s).unwrap()
    }

    #[test]
    fn full_budget_at_start() {
        let started = at(9, 0, 0);
        assert_eq!(
            remaining_seconds(started, Duration::from_secs(3600), started),
            3600
        );
    }

    #[test]
    fn resume_late_in_the_attempt() {
        // 59 of 60 minutes elapsed across a process restart.
        let started = at(9, 0, 0);
        let now = at(9, 59, 0);
        assert_eq!(remaining_seconds(started, Duration::from_secs(3600), now), 60);
    }

    #[test]
    fn saturates_at_zero_past_the_limit() {
        let started = at(9, 0, 0);
        let now = at(11, 30, 0);
        assert_eq!(remaining_seconds(started, Duration::from_secs(3600), now), 0);
    }

    #[test]
    fn clock_skew_clamps_to_full_limit() {
        // Server stamped a start instant slightly in our future.
        let started = at(9, 0, 30);
        let now = at(9, 0, 0);
        assert_eq!(
            remaining_seconds(started, Duration::from_secs(600), now),
            600
        );
    }

    #[tokio::test(start_paused = true)]
    async fn expires_after_the_budget() {
        let begin = Instant::now();
        let countdown = Countdown::start(Duration::from_secs(5));
        assert_eq!(countdown.state(), CountdownState::Running);

        assert!(countdown.expired().await);
        assert_eq!(begin.elapsed(), Duration::from_secs(5));
        assert_eq!(countdown.state(), CountdownState::Expired);
        assert_eq!(countdown.remaining(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_observed_once_per_waiter_and_stays_expired() {
        let countdown = Countdown::start(Duration::from_secs(2));
        assert!(countdown.expired().await);
        // A second waiter resolves immediately from the retained state.
        assert!(countdown.expired().await);
        assert_eq!(*countdown.subscribe_remaining().borrow(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_budget_expires_immediately() {
        let countdown = Countdown::start(Duration::ZERO);
        assert_eq!(countdown.state(), CountdownState::Expired);
        assert!(countdown.expired().await);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_suppresses_expiry() {
        let countdown = Countdown::start(Duration::from_secs(60));
        countdown.cancel();
        assert!(!countdown.expired().await);
        assert_eq!(countdown.state(), CountdownState::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn remaining_snaps_to_the_deadline_after_a_stall() {
        let countdown = Countdown::start(Duration::from_secs(60));
        // Jump well past several ticks at once, as a suspended laptop would.
        time::advance(Duration::from_secs(10)).await;
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        assert_eq!(countdown.remaining(), Duration::from_secs(50));
        assert_eq!(*countdown.subscribe_remaining().borrow(), 50);
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_decreasing_whole_seconds() {
        let countdown = Countdown::start(Duration::from_secs(3));
        let mut rx = countdown.subscribe_remaining();
        let mut seen = vec![*rx.borrow_and_update()];
        while rx.changed().await.is_ok() {
            seen.push(*rx.borrow_and_update());
        }
        assert_eq!(seen, vec![3, 2, 1, 0]);
    }
}
