use std::fmt;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::debug;

#[derive(Debug, Error)]
pub enum WaitError<E: std::error::Error + 'static> {
    #[error(
        "timeout while waiting for state to become '{}' (last state: '{}', timeout: {:?})",
        .target.join(", "),
        .last_state.as_deref().unwrap_or(""),
        .timeout
    )]
    Timeout {
        last_state: Option<String>,
        target:     Vec<String>,
        timeout:    Duration,
    },

    #[error("unexpected state '{state}', wanted target '{}'", .target.join(", "))]
    UnexpectedState { state: String, target: Vec<String> },

    #[error("refreshing state: {0}")]
    Refresh(#[source] E),
}

/// Polls a refresh probe until it reports one of `target` enough times in a
/// row, or until `timeout` elapses.
///
/// The probe returns an observed value plus a state label. A `pending` label
/// resets the consecutive-target count. A label in neither set, or a probe
/// error, stops the wait immediately.
#[derive(Debug, Clone)]
pub struct StateChangeConf<L> {
    pub pending:             Vec<L>,
    pub target:              Vec<L>,
    pub timeout:             Duration,
    /// Minimum time between the start of one probe and the next.
    pub min_interval:        Duration,
    /// Wait before the first probe.
    pub delay:               Duration,
    pub consecutive_targets: u32,
}

impl<L: PartialEq + fmt::Display> StateChangeConf<L> {
    fn target_names(&self) -> Vec<String> {
        self.target.iter().map(ToString::to_string).collect()
    }

    pub async fn wait_for_state<T, E, F, Fut>(&self, mut refresh: F) -> Result<T, WaitError<E>>
    where
        E: std::error::Error + 'static,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(T, L), E>>,
    {
        let started = Instant::now();
        let deadline = started + self.timeout;
        let required = self.consecutive_targets.max(1);
        let timed_out = |last_state: Option<String>| WaitError::Timeout {
            last_state,
            target: self.target_names(),
            timeout: self.timeout,
        };

        if !self.delay.is_zero() {
            sleep_until(deadline.min(started + self.delay)).await;
        }

        let mut last_state: Option<String> = None;
        let mut targets_seen = 0u32;
        let mut attempt = 0u32;
        let mut probe_started = Instant::now();
        loop {
            if attempt > 0 {
                let next = probe_started + self.min_interval;
                if next >= deadline {
                    sleep_until(deadline).await;
                    return Err(timed_out(last_state));
                }
                sleep_until(next).await;
            }
            if Instant::now() >= deadline {
                return Err(timed_out(last_state));
            }
            attempt += 1;
            probe_started = Instant::now();

            let (observed, label) = match timeout_at(deadline, refresh()).await {
                Ok(Ok(v)) => v,
                Ok(Err(e)) => return Err(WaitError::Refresh(e)),
                Err(_) => return Err(timed_out(last_state)),
            };
            debug!(attempt, state = %label, "refreshed state");
            last_state = Some(label.to_string());

            if self.target.contains(&label) {
                targets_seen += 1;
                if targets_seen >= required {
                    return Ok(observed);
                }
            } else if self.pending.contains(&label) {
                targets_seen = 0;
            } else {
                return Err(WaitError::UnexpectedState {
                    state:  label.to_string(),
                    target: self.target_names(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Phase {
        Waiting,
        Done,
        Bogus,
    }

    impl fmt::Display for Phase {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    fn conf(consecutive_targets: u32) -> StateChangeConf<Phase> {
        StateChangeConf {
            pending: vec![Phase::Waiting],
            target: vec![Phase::Done],
            timeout: Duration::from_secs(60),
            min_interval: Duration::from_secs(1),
            delay: Duration::ZERO,
            consecutive_targets,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_exact_consecutive_targets() {
        use Phase::*;
        let mut script = vec![Waiting, Done, Done, Waiting, Done, Done, Done, Done].into_iter();
        let mut probes = 0;
        let result = conf(3)
            .wait_for_state(|| {
                probes += 1;
                let n = probes;
                let next = script.next();
                async move { next.map(|p| (n, p)).ok_or_else(|| io::Error::other("script exhausted")) }
            })
            .await
            .unwrap();

        assert_eq!(result, 7, "the third Done after the reset must end the wait");
        assert_eq!(probes, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn probe_error_aborts_immediately() {
        let mut probes = 0;
        let err = conf(1)
            .wait_for_state(|| {
                probes += 1;
                let n = probes;
                async move {
                    if n == 2 {
                        Err(io::Error::other("boom"))
                    } else {
                        Ok(((), Phase::Waiting))
                    }
                }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, WaitError::Refresh(_)), "got: {}", err);
        assert_eq!(probes, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_without_probing_after_deadline() {
        let mut c = conf(1);
        c.timeout = Duration::from_secs(10);
        let started = Instant::now();
        let mut probe_times = Vec::new();

        let err = c
            .wait_for_state(|| {
                probe_times.push(Instant::now());
                async { Ok::<_, io::Error>(((), Phase::Waiting)) }
            })
            .await
            .unwrap_err();

        match err {
            WaitError::Timeout { last_state, timeout, .. } => {
                assert_eq!(last_state.as_deref(), Some("Waiting"));
                assert_eq!(timeout, Duration::from_secs(10));
            }
            other => panic!("expected timeout, got {}", other),
        }
        assert_eq!(probe_times.len(), 10);
        assert!(probe_times.iter().all(|t| *t < started + Duration::from_secs(10)));
        assert!(probe_times.windows(2).all(|w| w[1] - w[0] >= Duration::from_secs(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn interval_runs_from_probe_start_to_probe_start() {
        let mut c = conf(1);
        c.timeout = Duration::from_secs(5);
        let mut starts = Vec::new();

        let _ = c
            .wait_for_state(|| {
                starts.push(Instant::now());
                async {
                    tokio::time::sleep(Duration::from_millis(400)).await;
                    Ok::<_, io::Error>(((), Phase::Waiting))
                }
            })
            .await;

        assert_eq!(starts.len(), 5);
        assert!(starts.windows(2).all(|w| w[1] - w[0] == Duration::from_secs(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_probe_is_cancelled_at_deadline() {
        let mut c = conf(1);
        c.timeout = Duration::from_secs(5);
        let err = c
            .wait_for_state(|| async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok::<_, io::Error>(((), Phase::Done))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, WaitError::Timeout { last_state: None, .. }), "got: {}", err);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_state_is_reported() {
        let err = conf(1)
            .wait_for_state(|| async { Ok::<_, io::Error>(((), Phase::Bogus)) })
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "unexpected state 'Bogus', wanted target 'Done'");
    }

    #[tokio::test(start_paused = true)]
    async fn initial_delay_precedes_first_probe() {
        let mut c = conf(1);
        c.delay = Duration::from_secs(2);
        let started = Instant::now();
        let first = c
            .wait_for_state(|| {
                let at = Instant::now();
                async move { Ok::<_, io::Error>((at, Phase::Done)) }
            })
            .await
            .unwrap();

        assert!(first - started >= Duration::from_secs(2));
    }
}
