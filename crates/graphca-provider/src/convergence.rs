use std::fmt;
use std::future::Future;
use std::time::Duration;

use graphca_config::PollConfig;
use graphca_graph::GraphError;

use crate::wait::{StateChangeConf, WaitError};

// ── State labels ──────────────────────────────────────────────────────────────

/// Whether an object read back after a write matches what was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceState {
    Pending,
    Updated,
}

impl fmt::Display for ConvergenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConvergenceState::Pending => write!(f, "Pending"),
            ConvergenceState::Updated => write!(f, "Updated"),
        }
    }
}

/// Whether a deleted object is still visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionState {
    Waiting,
    Deleted,
}

impl fmt::Display for DeletionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeletionState::Waiting => write!(f, "Waiting"),
            DeletionState::Deleted => write!(f, "Deleted"),
        }
    }
}

// ── Checks ────────────────────────────────────────────────────────────────────

/// Compare the written record with the one read back. Both sides must be
/// normalized the same way before comparison.
pub fn convergence_state<T: PartialEq>(desired: &T, observed: &T) -> ConvergenceState {
    if desired == observed {
        ConvergenceState::Updated
    } else {
        ConvergenceState::Pending
    }
}

/// Classify the result of a non-retrying read issued after a delete.
pub fn deletion_state<T>(read: Result<T, GraphError>) -> Result<DeletionState, GraphError> {
    match read {
        Ok(_) => Ok(DeletionState::Waiting),
        Err(e) if e.is_not_found() => Ok(DeletionState::Deleted),
        Err(e) => Err(e),
    }
}

// ── Waiters ───────────────────────────────────────────────────────────────────

pub fn update_conf(timeout: Duration, polling: &PollConfig) -> StateChangeConf<ConvergenceState> {
    StateChangeConf {
        pending:             vec![ConvergenceState::Pending],
        target:              vec![ConvergenceState::Updated],
        timeout,
        min_interval:        polling.update_interval,
        delay:               Duration::ZERO,
        consecutive_targets: polling.update_occurrences,
    }
}

pub fn deletion_conf(timeout: Duration, polling: &PollConfig) -> StateChangeConf<DeletionState> {
    StateChangeConf {
        pending:             vec![DeletionState::Waiting],
        target:              vec![DeletionState::Deleted],
        timeout,
        min_interval:        polling.delete_interval,
        delay:               Duration::ZERO,
        consecutive_targets: polling.delete_occurrences,
    }
}

/// Re-read with `observe` until it returns `desired` on enough consecutive
/// reads.
pub async fn wait_for_convergence<T, F, Fut>(
    timeout: Duration,
    polling: &PollConfig,
    desired: &T,
    mut observe: F,
) -> Result<(), WaitError<GraphError>>
where
    T: PartialEq,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GraphError>>,
{
    update_conf(timeout, polling)
        .wait_for_state(|| {
            let read = observe();
            async move {
                let observed = read.await?;
                Ok::<_, GraphError>(((), convergence_state(desired, &observed)))
            }
        })
        .await
}

/// Re-read with `read` until it reports not-found on enough consecutive
/// reads. `read` must not retry 404s.
pub async fn wait_for_deletion<T, F, Fut>(
    timeout: Duration,
    polling: &PollConfig,
    mut read: F,
) -> Result<(), WaitError<GraphError>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GraphError>>,
{
    deletion_conf(timeout, polling)
        .wait_for_state(|| {
            let pending = read();
            async move { deletion_state(pending.await).map(|s| ((), s)) }
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Fields {
        a: u32,
        b: u32,
    }

    fn not_found() -> GraphError {
        GraphError::UnexpectedStatus {
            method:  "GET".into(),
            url:     "https://graph.test/v1.0/x".into(),
            status:  404,
            code:    "Request_ResourceNotFound".into(),
            message: "gone".into(),
        }
    }

    fn fast_polling() -> PollConfig {
        PollConfig {
            update_interval:    Duration::from_secs(1),
            update_occurrences: 2,
            delete_interval:    Duration::from_secs(1),
            delete_occurrences: 1,
        }
    }

    #[test]
    fn update_converges_once_all_fields_match() {
        let desired = Fields { a: 1, b: 2 };
        let states: Vec<_> = [Fields { a: 0, b: 2 }, Fields { a: 1, b: 2 }]
            .iter()
            .map(|observed| convergence_state(&desired, observed))
            .collect();
        assert_eq!(states, vec![ConvergenceState::Pending, ConvergenceState::Updated]);
    }

    #[test]
    fn delete_reports_deleted_only_on_not_found() {
        let reads: Vec<Result<(), GraphError>> = vec![Ok(()), Ok(()), Err(not_found())];
        let states: Vec<_> = reads.into_iter().map(|r| deletion_state(r).unwrap()).collect();
        assert_eq!(
            states,
            vec![DeletionState::Waiting, DeletionState::Waiting, DeletionState::Deleted]
        );
    }

    #[test]
    fn delete_check_propagates_other_errors() {
        let err = GraphError::Auth("expired".into());
        assert!(deletion_state::<()>(Err(err)).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn convergence_wait_requires_consecutive_matches() {
        let desired = Fields { a: 1, b: 2 };
        let mut script = vec![(0, 2), (1, 2), (0, 2), (1, 2), (1, 2)].into_iter();
        let mut reads = 0;
        wait_for_convergence(Duration::from_secs(60), &fast_polling(), &desired, || {
            reads += 1;
            let (a, b) = script.next().unwrap_or((1, 2));
            async move { Ok::<_, GraphError>(Fields { a, b }) }
        })
        .await
        .unwrap();
        assert_eq!(reads, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn deletion_wait_stops_at_not_found() {
        let mut reads = 0;
        wait_for_deletion(Duration::from_secs(60), &fast_polling(), || {
            reads += 1;
            let n = reads;
            async move { if n < 3 { Ok(()) } else { Err(not_found()) } }
        })
        .await
        .unwrap();
        assert_eq!(reads, 3);
    }
}
