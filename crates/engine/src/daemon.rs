//! Repeating passes on a fixed interval.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// How often a worker walks its shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// A single pass, then stop.
    Once,
    /// Start a pass every interval. A pass that overruns the interval is
    /// followed immediately by the next one; the lost time is never made up.
    Every(Duration),
}

impl Schedule {
    /// How long to wait after a pass that took `elapsed`, or [`None`] if no
    /// further pass should run.
    pub fn delay_after(&self, elapsed: Duration) -> Option<Duration> {
        match self {
            Self::Once => None,
            Self::Every(interval) => Some(interval.saturating_sub(elapsed)),
        }
    }
}

/// Run `pass` according to `schedule` until it is exhausted or `cancel`
/// fires. Cancellation is observed between passes and while sleeping, never
/// in the middle of a pass.
///
/// Returns the number of passes that ran.
pub async fn run<F, Fut>(schedule: Schedule, cancel: &CancellationToken, mut pass: F) -> usize
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = ()>,
{
    let mut passes = 0;
    while !cancel.is_cancelled() {
        let start = Instant::now();
        pass(passes).await;
        passes += 1;
        let elapsed = start.elapsed();
        let Some(delay) = schedule.delay_after(elapsed) else {
            break;
        };
        if delay.is_zero() {
            tracing::debug!(elapsed = ?elapsed, "Pass overran its interval; starting the next one now");
            continue;
        }
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {},
        }
    }
    passes
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::{Arc, Mutex};

    #[rstest]
    #[case(Duration::from_secs(5), Some(Duration::from_secs(55)))]
    #[case(Duration::from_secs(60), Some(Duration::ZERO))]
    #[case(Duration::from_secs(70), Some(Duration::ZERO))]
    fn test_delay_after(#[case] elapsed: Duration, #[case] expected: Option<Duration>) {
        assert_eq!(Schedule::Every(Duration::from_secs(60)).delay_after(elapsed), expected);
    }

    #[test]
    fn test_once_never_repeats() {
        assert_eq!(Schedule::Once.delay_after(Duration::ZERO), None);
    }

    /// Run three passes of `pass_duration` each and return when every pass
    /// started, relative to the first.
    async fn pass_starts(schedule: Schedule, pass_duration: Duration) -> (usize, Vec<Duration>) {
        let cancel = CancellationToken::new();
        let starts = Arc::new(Mutex::new(Vec::new()));
        let origin = Instant::now();
        let passes = run(schedule, &cancel, |n| {
            let starts = starts.clone();
            let cancel = cancel.clone();
            async move {
                starts.lock().unwrap().push(origin.elapsed());
                tokio::time::sleep(pass_duration).await;
                if n == 2 {
                    cancel.cancel();
                }
            }
        })
        .await;
        let starts = starts.lock().unwrap().clone();
        (passes, starts)
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_pass_sleeps_remainder() {
        let (passes, starts) = pass_starts(Schedule::Every(Duration::from_secs(60)), Duration::from_secs(5)).await;
        assert_eq!(passes, 3);
        assert_eq!(starts, vec![Duration::ZERO, Duration::from_secs(60), Duration::from_secs(120)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_pass_runs_again_immediately() {
        let (passes, starts) = pass_starts(Schedule::Every(Duration::from_secs(60)), Duration::from_secs(70)).await;
        assert_eq!(passes, 3);
        assert_eq!(starts, vec![Duration::ZERO, Duration::from_secs(70), Duration::from_secs(140)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_once_runs_a_single_pass() {
        let (passes, starts) = pass_starts(Schedule::Once, Duration::from_secs(5)).await;
        assert_eq!(passes, 1);
        assert_eq!(starts.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_sleep() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            trigger.cancel();
        });
        let start = Instant::now();
        let passes = run(Schedule::Every(Duration::from_secs(3600)), &cancel, |_| async {}).await;
        assert_eq!(passes, 1);
        assert!(start.elapsed() < Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn test_cancelled_before_first_pass() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(run(Schedule::Once, &cancel, |_| async {}).await, 0);
    }
}
