//! Bounded retry executor.
//!
//! Every convergence step is expressed as an attempt closure run under an
//! [`AttemptPolicy`]. The executor does not look at error kinds: any error
//! returned by an attempt is treated as transient until the budget is spent,
//! and then the last error is returned unchanged.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::NgcError;

/// How many times an operation is attempted and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptPolicy {
    max_attempts: u32,
    interval: Duration,
    silent: bool,
}

impl AttemptPolicy {
    /// `max_attempts` is clamped to at least one attempt.
    pub const fn new(max_attempts: u32, interval_seconds: u64) -> Self {
        Self {
            max_attempts: if max_attempts == 0 { 1 } else { max_attempts },
            interval: Duration::from_secs(interval_seconds),
            silent: false,
        }
    }

    /// Suppress per-attempt progress. The final error is still returned.
    pub const fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub const fn interval(&self) -> Duration {
        self.interval
    }

    pub const fn is_silent(&self) -> bool {
        self.silent
    }
}

/// Run `attempt` until it succeeds or the policy's attempt budget is spent.
///
/// Sleeps `policy.interval()` between attempts, never after the last one or
/// after a success. On exhaustion the error from the final attempt is
/// returned.
pub async fn run<T, E, F, Fut>(label: &str, policy: &AttemptPolicy, mut attempt: F) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max = policy.max_attempts();
    let mut current = 1;

    loop {
        match attempt().await {
            Ok(value) => {
                report_success(label, policy, current);
                return Ok(value);
            }
            Err(err) if current >= max => {
                error!("{}: giving up after {} attempts: {}", label, max, err);
                return Err(err);
            }
            Err(err) => {
                report_failure(label, policy, current, &err);
                tokio::time::sleep(policy.interval()).await;
                current += 1;
            }
        }
    }
}

/// Like [`run`], but stops between attempts once `token` is cancelled.
///
/// An attempt already in flight is allowed to finish. Cancellation observed
/// before the next attempt yields [`NgcError::Cancelled`].
pub async fn run_until_cancelled<T, F, Fut>(
    label: &str,
    policy: &AttemptPolicy,
    token: &CancellationToken,
    mut attempt: F,
) -> Result<T, NgcError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, NgcError>>,
{
    let max = policy.max_attempts();
    let mut current = 1;

    loop {
        if token.is_cancelled() {
            return Err(NgcError::Cancelled(label.to_string()));
        }

        match attempt().await {
            Ok(value) => {
                report_success(label, policy, current);
                return Ok(value);
            }
            Err(err) if current >= max => {
                error!("{}: giving up after {} attempts: {}", label, max, err);
                return Err(err);
            }
            Err(err) => {
                report_failure(label, policy, current, &err);
                tokio::select! {
                    biased;
                    () = token.cancelled() => {
                        return Err(NgcError::Cancelled(label.to_string()));
                    }
                    () = tokio::time::sleep(policy.interval()) => {}
                }
                current += 1;
            }
        }
    }
}

fn report_success(label: &str, policy: &AttemptPolicy, attempt: u32) {
    if policy.is_silent() {
        debug!("{}: succeeded on attempt {}", label, attempt);
    } else {
        info!("{}: succeeded", label);
    }
}

fn report_failure<E: Display>(label: &str, policy: &AttemptPolicy, attempt: u32, err: &E) {
    if policy.is_silent() {
        debug!(
            "{}: attempt {} of {} failed: {}",
            label,
            attempt,
            policy.max_attempts(),
            err
        );
    } else {
        warn!(
            "{}: attempt {} of {} failed, next attempt in {}s: {}",
            label,
            attempt,
            policy.max_attempts(),
            policy.interval().as_secs(),
            err
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    use tokio::time::Instant;

    use super::*;

    /// Attempt closure that fails until call number `succeed_on`.
    fn flaky(
        calls: Arc<AtomicU32>,
        succeed_on: u32,
    ) -> impl FnMut() -> std::future::Ready<Result<u32, String>> {
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= succeed_on {
                std::future::ready(Ok(n))
            } else {
                std::future::ready(Err(format!("failure #{n}")))
            }
        }
    }

    #[test]
    fn test_policy_clamps_zero_attempts() {
        let policy = AttemptPolicy::new(0, 5);
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(policy.interval(), Duration::from_secs(5));
        assert!(!policy.is_silent());
    }

    #[test]
    fn test_policy_silent() {
        let policy = AttemptPolicy::new(45, 5).silent();
        assert!(policy.is_silent());
        assert_eq!(policy.max_attempts(), 45);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_first_attempt_succeeds_without_sleeping() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        let result = run("op", &AttemptPolicy::new(5, 10), flaky(calls.clone(), 1)).await;

        assert_eq!(result, Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_succeeds_on_third_of_three() {
        let calls = Arc::new(AtomicU32::new(0));

        let result = run("op", &AttemptPolicy::new(3, 0), flaky(calls.clone(), 3)).await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_sleeps_between_attempts_only() {
        // Success on attempt k means k invocations and k-1 sleeps
        for k in 1..=6 {
            let calls = Arc::new(AtomicU32::new(0));
            let start = Instant::now();

            let result = run("op", &AttemptPolicy::new(6, 15), flaky(calls.clone(), k)).await;

            assert_eq!(result, Ok(k));
            assert_eq!(calls.load(Ordering::SeqCst), k);
            assert_eq!(start.elapsed(), Duration::from_secs(15 * u64::from(k - 1)));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_exhausted_returns_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        let result: Result<u32, String> =
            run("op", &AttemptPolicy::new(4, 20), flaky(calls.clone(), u32::MAX)).await;

        assert_eq!(result, Err("failure #4".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // No sleep after the final attempt
        assert_eq!(start.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_silent_still_returns_error() {
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<u32, String> = run(
            "op",
            &AttemptPolicy::new(2, 5).silent(),
            flaky(calls.clone(), u32::MAX),
        )
        .await;

        assert_eq!(result, Err("failure #2".to_string()));
    }

    /// Collects formatted log output of the current thread.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn install(&self) -> tracing::subscriber::DefaultGuard {
            let writer = self.clone();
            let subscriber = tracing_subscriber::fmt()
                .with_writer(move || writer.clone())
                .with_max_level(tracing::Level::TRACE)
                .with_ansi(false)
                .without_time()
                .finish();
            tracing::subscriber::set_default(subscriber)
        }

        fn lines(&self) -> Vec<String> {
            String::from_utf8_lossy(&self.0.lock().unwrap())
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_reports_failed_attempts_at_warn() {
        let captured = Captured::default();
        let _guard = captured.install();
        let calls = Arc::new(AtomicU32::new(0));

        let result = run("Create thing", &AttemptPolicy::new(3, 5), flaky(calls, 3)).await;

        assert_eq!(result, Ok(3));
        let lines = captured.lines();
        let warnings: Vec<&String> = lines.iter().filter(|l| l.contains("WARN")).collect();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains(
            "Create thing: attempt 1 of 3 failed, next attempt in 5s: failure #1"
        ));
        assert!(warnings[1].contains("attempt 2 of 3 failed"));
        assert!(
            lines
                .iter()
                .any(|l| l.contains("INFO") && l.contains("Create thing: succeeded"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_silent_reports_nothing_above_debug() {
        let captured = Captured::default();
        let _guard = captured.install();
        let calls = Arc::new(AtomicU32::new(0));

        let result = run("op", &AttemptPolicy::new(3, 5).silent(), flaky(calls, 3)).await;

        assert_eq!(result, Ok(3));
        let lines = captured.lines();
        assert!(lines.iter().all(|l| !l.contains("WARN") && !l.contains("INFO")));
        // Attempts are still traceable at debug
        assert!(
            lines
                .iter()
                .any(|l| l.contains("DEBUG") && l.contains("attempt 1 of 3 failed"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_silent_exhaustion_still_logs_error() {
        let captured = Captured::default();
        let _guard = captured.install();
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<u32, String> =
            run("op", &AttemptPolicy::new(2, 5).silent(), flaky(calls, u32::MAX)).await;

        assert_eq!(result, Err("failure #2".to_string()));
        let lines = captured.lines();
        assert!(lines.iter().all(|l| !l.contains("WARN")));
        assert!(
            lines
                .iter()
                .any(|l| l.contains("ERROR") && l.contains("giving up after 2 attempts"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_single_attempt_policy() {
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<u32, String> =
            run("op", &AttemptPolicy::new(1, 30), flaky(calls.clone(), 2)).await;

        assert_eq!(result, Err("failure #1".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_cancelled_completes_without_cancel() {
        let token = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = run_until_cancelled("op", &AttemptPolicy::new(3, 1), &token, || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n == 2 {
                    Ok(n)
                } else {
                    Err(NgcError::KubernetesApi("boom".to_string()))
                }
            }
        })
        .await;

        assert_eq!(result.ok(), Some(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_cancelled_stops_between_attempts() {
        let token = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let canceller = token.clone();

        let result: Result<(), NgcError> =
            run_until_cancelled("op", &AttemptPolicy::new(100, 10), &token, || {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n == 3 {
                    canceller.cancel();
                }
                async { Err(NgcError::KubernetesApi("boom".to_string())) }
            })
            .await;

        assert!(matches!(result, Err(NgcError::Cancelled(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_cancelled_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), NgcError> =
            run_until_cancelled("op", &AttemptPolicy::new(5, 1), &token, || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;

        assert!(matches!(result, Err(NgcError::Cancelled(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
