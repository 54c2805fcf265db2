#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Cooperative, cancellable scheduling primitives driven by simulated time.
//!
//! Nothing here blocks or owns a thread. Every primitive is explicit state
//! advanced by the per-tick delta of the host loop, so tests can step a virtual
//! clock and inspect the result synchronously:
//!
//! * [`CancellationToken`] is polled at every suspension point.
//! * [`Delay`] resumes once at least its duration of simulated time elapsed.
//! * [`Periodic`] runs a fallible body on a fixed interval and backs off after a
//!   failure instead of retrying immediately.
//! * [`Timeline`] queues deferred actions (`yield_now` / `delay`) and releases
//!   them in due order, silently dropping those whose token was cancelled.

use std::{cell::Cell, fmt, rc::Rc, time::Duration};

use log::{debug, error};

/// Upper bound on catch-up runs a [`Periodic`] performs for a single oversized tick.
pub const MAX_CATCH_UP_RUNS: u32 = 16;

/// Backoff multiple applied to the interval when none is configured explicitly.
pub const DEFAULT_BACKOFF_FACTOR: u32 = 5;

/// Cooperative cancellation flag shared by an owner and its in-flight tasks.
///
/// Clones observe the same flag. A cancelled token stays cancelled forever;
/// owners that are reinitialised (for example pooled objects) must create a
/// fresh token rather than reuse it.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Rc<Cell<bool>>,
}

impl CancellationToken {
    /// Creates a live token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the token and every clone of it.
    pub fn cancel(&self) {
        self.cancelled.set(true);
    }

    /// Reports whether the token was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }

    /// Reports whether both tokens share the same flag.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.cancelled, &other.cancelled)
    }
}

/// Failure raised by the body of a scheduled task.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("task `{task}` failed: {reason}")]
pub struct TaskError {
    task: &'static str,
    reason: String,
}

impl TaskError {
    /// Creates a task failure.
    #[must_use]
    pub fn new(task: &'static str, reason: impl Into<String>) -> Self {
        Self {
            task,
            reason: reason.into(),
        }
    }

    /// Name of the failing task.
    #[must_use]
    pub const fn task(&self) -> &'static str {
        self.task
    }
}

/// Outcome of advancing a [`Delay`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DelayStatus {
    /// The delay is still running.
    Pending,
    /// The delay elapsed; the owner may resume.
    Elapsed,
    /// The owner's token was cancelled; the owner must not resume.
    Cancelled,
}

/// One-shot wait measured in simulated time.
#[derive(Clone, Debug)]
pub struct Delay {
    remaining: Duration,
    token: CancellationToken,
}

impl Delay {
    /// Starts a delay guarded by the provided token.
    #[must_use]
    pub fn new(duration: Duration, token: CancellationToken) -> Self {
        Self {
            remaining: duration,
            token,
        }
    }

    /// Consumes `dt` of simulated time.
    ///
    /// Cancellation is observed before the clock is consulted, so a delay whose
    /// owner was destroyed never reports [`DelayStatus::Elapsed`].
    pub fn advance(&mut self, dt: Duration) -> DelayStatus {
        if self.token.is_cancelled() {
            return DelayStatus::Cancelled;
        }
        self.remaining = self.remaining.saturating_sub(dt);
        if self.remaining.is_zero() {
            DelayStatus::Elapsed
        } else {
            DelayStatus::Pending
        }
    }

    /// Simulated time left before the delay elapses.
    #[must_use]
    pub const fn remaining(&self) -> Duration {
        self.remaining
    }
}

/// Summary of one [`Periodic::advance`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PeriodicReport {
    /// Bodies that completed successfully.
    pub completed: u32,
    /// Bodies that failed and triggered a backoff.
    pub failed: u32,
}

/// Fixed-interval loop: `while !cancelled { body()?; delay(interval) }`.
///
/// The first run happens on the first advance. A failing body is logged and
/// the next run waits for the backoff interval instead of the regular one.
#[derive(Clone, Debug)]
pub struct Periodic {
    label: &'static str,
    interval: Duration,
    backoff: Duration,
    wait: Duration,
    consecutive_failures: u32,
}

impl Periodic {
    /// Creates a loop that runs every `interval` and backs off for
    /// [`DEFAULT_BACKOFF_FACTOR`] intervals after a failure.
    #[must_use]
    pub fn new(label: &'static str, interval: Duration) -> Self {
        Self {
            label,
            interval,
            backoff: interval.saturating_mul(DEFAULT_BACKOFF_FACTOR),
            wait: Duration::ZERO,
            consecutive_failures: 0,
        }
    }

    /// Overrides the wait applied after a failure.
    #[must_use]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Regular interval between runs.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Simulated time left before the next run.
    #[must_use]
    pub const fn wait(&self) -> Duration {
        self.wait
    }

    /// Number of failures since the last success.
    #[must_use]
    pub const fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Makes the next advance run the body immediately.
    pub fn reset(&mut self) {
        self.wait = Duration::ZERO;
        self.consecutive_failures = 0;
    }

    /// Consumes `dt` and runs the body once per elapsed interval.
    ///
    /// A zero interval runs the body exactly once per advance, which is the
    /// `yield` cadence. Errors never escape: they are logged at the task
    /// boundary and converted into a backoff.
    pub fn advance<E, F>(&mut self, dt: Duration, token: &CancellationToken, mut body: F) -> PeriodicReport
    where
        E: fmt::Display,
        F: FnMut() -> Result<(), E>,
    {
        let mut report = PeriodicReport::default();
        if token.is_cancelled() {
            return report;
        }

        let mut budget = dt;
        let mut runs = 0;
        loop {
            if budget < self.wait {
                self.wait -= budget;
                break;
            }
            budget -= self.wait;
            self.wait = Duration::ZERO;

            if token.is_cancelled() {
                break;
            }
            if runs == MAX_CATCH_UP_RUNS {
                debug!("{}: dropping catch-up runs after {runs} iterations", self.label);
                self.wait = self.interval;
                break;
            }
            runs += 1;

            match body() {
                Ok(()) => {
                    report.completed += 1;
                    self.consecutive_failures = 0;
                    self.wait = self.interval;
                }
                Err(failure) => {
                    report.failed += 1;
                    self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                    error!(
                        "{}: {failure}; retrying in {:?} (failure #{})",
                        self.label, self.backoff, self.consecutive_failures
                    );
                    self.wait = self.backoff;
                }
            }

            if self.interval.is_zero() {
                break;
            }
        }
        report
    }
}

#[derive(Debug)]
struct TimelineEntry<A> {
    due: Duration,
    sequence: u64,
    token: CancellationToken,
    action: A,
}

/// Queue of deferred actions released by simulated time.
///
/// Actions are plain data describing what to do when they come due. Entries
/// that share a due time are released in the order they were scheduled.
#[derive(Debug)]
pub struct Timeline<A> {
    now: Duration,
    next_sequence: u64,
    entries: Vec<TimelineEntry<A>>,
}

impl<A> Default for Timeline<A> {
    fn default() -> Self {
        Self {
            now: Duration::ZERO,
            next_sequence: 0,
            entries: Vec::new(),
        }
    }
}

impl<A> Timeline<A> {
    /// Creates an empty timeline at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulated time accumulated so far.
    #[must_use]
    pub const fn now(&self) -> Duration {
        self.now
    }

    /// Number of pending entries, including cancelled ones not yet purged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Reports whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Releases `action` on the next advance.
    pub fn yield_now(&mut self, token: &CancellationToken, action: A) {
        self.delay(Duration::ZERO, token, action);
    }

    /// Releases `action` once at least `delay` of simulated time elapsed.
    pub fn delay(&mut self, delay: Duration, token: &CancellationToken, action: A) {
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        self.entries.push(TimelineEntry {
            due: self.now.saturating_add(delay),
            sequence,
            token: token.clone(),
            action,
        });
    }

    /// Advances the clock and moves every due, uncancelled action into `out`.
    ///
    /// Actions scheduled while the caller processes `out` are due on a later
    /// advance at the earliest.
    pub fn advance(&mut self, dt: Duration, out: &mut Vec<A>) {
        self.now = self.now.saturating_add(dt);
        self.entries.retain(|entry| !entry.token.is_cancelled());
        if self.entries.is_empty() {
            return;
        }

        let now = self.now;
        let (mut due, pending): (Vec<_>, Vec<_>) =
            self.entries.drain(..).partition(|entry| entry.due <= now);
        self.entries = pending;
        due.sort_by_key(|entry| (entry.due, entry.sequence));
        out.extend(due.into_iter().map(|entry| entry.action));
    }

    /// Drops every pending action.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_elapses_after_accumulated_time() {
        let token = CancellationToken::new();
        let mut delay = Delay::new(Duration::from_secs(2), token);
        assert_eq!(delay.advance(Duration::from_millis(1_500)), DelayStatus::Pending);
        assert_eq!(delay.remaining(), Duration::from_millis(500));
        assert_eq!(delay.advance(Duration::from_millis(500)), DelayStatus::Elapsed);
    }

    #[test]
    fn cancelled_delay_never_elapses() {
        let token = CancellationToken::new();
        let mut delay = Delay::new(Duration::from_millis(10), token.clone());
        token.cancel();
        assert_eq!(delay.advance(Duration::from_secs(1)), DelayStatus::Cancelled);
    }

    #[test]
    fn clones_share_cancellation_but_fresh_tokens_do_not() {
        let token = CancellationToken::new();
        let clone = token.clone();
        let fresh = CancellationToken::new();
        token.cancel();
        assert!(clone.is_cancelled());
        assert!(clone.same_as(&token));
        assert!(!fresh.is_cancelled());
        assert!(!fresh.same_as(&token));
    }

    #[test]
    fn periodic_runs_immediately_then_on_interval() {
        let token = CancellationToken::new();
        let mut periodic = Periodic::new("reheat", Duration::from_millis(250));
        let mut runs = 0;

        let mut tick = |dt: u64, runs: &mut u32| {
            periodic.advance(Duration::from_millis(dt), &token, || {
                *runs += 1;
                Ok::<(), TaskError>(())
            })
        };

        let _ = tick(16, &mut runs);
        assert_eq!(runs, 1);
        let _ = tick(200, &mut runs);
        assert_eq!(runs, 1);
        let _ = tick(50, &mut runs);
        assert_eq!(runs, 2);
        let report = tick(500, &mut runs);
        assert_eq!(report.completed, 2);
        assert_eq!(runs, 4);
    }

    #[test]
    fn failure_backs_off_instead_of_retrying_immediately() {
        let token = CancellationToken::new();
        let mut periodic =
            Periodic::new("flaky", Duration::from_millis(100)).with_backoff(Duration::from_secs(1));
        let mut attempts = 0;

        let report = periodic.advance(Duration::ZERO, &token, || {
            attempts += 1;
            Err(TaskError::new("flaky", "boom"))
        });
        assert_eq!(report.failed, 1);
        assert_eq!(periodic.wait(), Duration::from_secs(1));
        assert_eq!(periodic.consecutive_failures(), 1);

        let report = periodic.advance(Duration::from_millis(900), &token, || {
            attempts += 1;
            Ok::<(), TaskError>(())
        });
        assert_eq!(report, PeriodicReport::default());
        assert_eq!(attempts, 1);

        let report = periodic.advance(Duration::from_millis(100), &token, || {
            attempts += 1;
            Ok::<(), TaskError>(())
        });
        assert_eq!(report.completed, 1);
        assert_eq!(periodic.consecutive_failures(), 0);
        assert_eq!(attempts, 2);
    }

    #[test]
    fn cancelled_periodic_does_not_run() {
        let token = CancellationToken::new();
        token.cancel();
        let mut periodic = Periodic::new("stopped", Duration::from_millis(10));
        let report = periodic.advance(Duration::from_secs(1), &token, || -> Result<(), TaskError> {
            panic!("body must not run after cancellation")
        });
        assert_eq!(report, PeriodicReport::default());
    }

    #[test]
    fn catch_up_is_bounded() {
        let token = CancellationToken::new();
        let mut periodic = Periodic::new("bounded", Duration::from_millis(1));
        let report = periodic.advance(Duration::from_secs(10), &token, || Ok::<(), TaskError>(()));
        assert_eq!(report.completed, MAX_CATCH_UP_RUNS);
    }

    #[test]
    fn timeline_releases_in_due_then_schedule_order() {
        let token = CancellationToken::new();
        let mut timeline = Timeline::new();
        timeline.delay(Duration::from_millis(300), &token, "late");
        timeline.delay(Duration::from_millis(100), &token, "first");
        timeline.delay(Duration::from_millis(100), &token, "second");
        timeline.yield_now(&token, "yielded");

        let mut out = Vec::new();
        timeline.advance(Duration::ZERO, &mut out);
        assert_eq!(out, vec!["yielded"]);

        out.clear();
        timeline.advance(Duration::from_millis(150), &mut out);
        assert_eq!(out, vec!["first", "second"]);

        out.clear();
        timeline.advance(Duration::from_millis(150), &mut out);
        assert_eq!(out, vec!["late"]);
        assert!(timeline.is_empty());
    }

    #[test]
    fn timeline_discards_cancelled_entries() {
        let kept = CancellationToken::new();
        let dropped = CancellationToken::new();
        let mut timeline = Timeline::new();
        timeline.delay(Duration::from_millis(10), &dropped, 1);
        timeline.delay(Duration::from_millis(10), &kept, 2);
        dropped.cancel();

        let mut out = Vec::new();
        timeline.advance(Duration::from_millis(10), &mut out);
        assert_eq!(out, vec![2]);
        assert!(timeline.is_empty());
    }
}
