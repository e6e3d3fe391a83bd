//! The transition table.
//!
//! [`reconcile`] is the only place a project's status may change. It is a
//! pure function: given the current snapshot and one observation it either
//! produces the next snapshot (plus any fetch the transition requires before
//! it is settled) or explains why the observation no longer applies.

use std::time::Duration;

use reframe_model::{JobId, JobStatus, ProjectStatus};

use super::observation::{FetchKind, Observation};
use super::snapshot::{PendingFetch, StatusSnapshot};

pub(crate) const JOB_FAILED_MESSAGE: &str = "generation job failed";

/// Fetch the controller must issue to settle an applied transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowUp {
    FetchPreview,
    FetchResults(JobId),
}

/// Why an observation was dropped without touching the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscardReason {
    /// `completed` and `failed` accept nothing further.
    Terminal(ProjectStatus),
    /// The observation does not fit the snapshot's current status.
    Stale {
        status: ProjectStatus,
        observation: &'static str,
    },
    /// A job observation for a job other than the active one.
    JobMismatch {
        active: Option<JobId>,
        observed: JobId,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reconciled {
    Applied {
        next: StatusSnapshot,
        follow_up: Option<FollowUp>,
    },
    Discarded(DiscardReason),
}

impl Reconciled {
    /// The snapshot to publish: `next` when applied, `current` otherwise.
    pub fn next_or(self, current: &StatusSnapshot) -> StatusSnapshot {
        match self {
            Reconciled::Applied { next, .. } => next,
            Reconciled::Discarded(_) => current.clone(),
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Reconciled::Applied { .. })
    }
}

fn applied(next: StatusSnapshot) -> Reconciled {
    Reconciled::Applied {
        next,
        follow_up: None,
    }
}

fn applied_with(next: StatusSnapshot, follow_up: FollowUp) -> Reconciled {
    Reconciled::Applied {
        next,
        follow_up: Some(follow_up),
    }
}

fn stale(current: &StatusSnapshot, observation: &'static str) -> Reconciled {
    Reconciled::Discarded(DiscardReason::Stale {
        status: current.status,
        observation,
    })
}

/// Abandon the active job and hand control back to the user.
fn roll_back_generation(next: &mut StatusSnapshot, message: String) {
    next.status = ProjectStatus::ReadyForReview;
    next.active_job_id = None;
    next.pending = None;
    next.progress = None;
    next.last_error = Some(message);
}

pub(crate) fn stall_message(status: ProjectStatus, waited: Duration) -> String {
    format!("still {status} after {}s", waited.as_secs())
}

/// Apply one observation to `current`.
pub fn reconcile(
    current: &StatusSnapshot,
    observation: Observation,
) -> Reconciled {
    if current.status.is_terminal() {
        return Reconciled::Discarded(DiscardReason::Terminal(current.status));
    }

    let mut next = current.clone();
    let result = match observation {
        Observation::FetchFailed { kind, message } => {
            if kind == FetchKind::Preview
                && next.pending == Some(PendingFetch::Preview)
            {
                next.pending = None;
            }
            next.last_error = Some(message);
            applied(next)
        }

        Observation::Stalled { waited } => {
            let polled = current.status.is_analysing()
                || current.status == ProjectStatus::Generating;
            if !polled {
                return stale(current, "stalled");
            }
            next.last_error = Some(stall_message(current.status, waited));
            applied(next)
        }

        Observation::ProjectStatusObserved { status, progress } => {
            return project_status(current, next, status, progress);
        }

        Observation::PreviewObserved(assets) => {
            if current.status != ProjectStatus::ReadyForReview
                || current.pending != Some(PendingFetch::Preview)
            {
                return stale(current, "preview");
            }
            next.review_assets = assets;
            next.pending = None;
            next.last_error = None;
            applied(next)
        }

        Observation::GenerationRequested => {
            if current.status != ProjectStatus::ReadyForReview
                || current.pending.is_some()
                || current.active_job_id.is_some()
            {
                return stale(current, "generation_requested");
            }
            next.pending = Some(PendingFetch::GenerationStart);
            next.last_error = None;
            applied(next)
        }

        Observation::GenerationStarted(job_id) => {
            if current.pending != Some(PendingFetch::GenerationStart) {
                return stale(current, "generation_started");
            }
            next.status = ProjectStatus::Generating;
            next.active_job_id = Some(job_id);
            next.pending = None;
            next.progress = None;
            next.last_error = None;
            applied(next)
        }

        Observation::GenerationStartFailed(message) => {
            if current.pending != Some(PendingFetch::GenerationStart) {
                return stale(current, "generation_start_failed");
            }
            next.pending = None;
            next.last_error = Some(message);
            applied(next)
        }

        Observation::JobStatusObserved {
            job_id,
            status,
            progress,
        } => {
            if current.status != ProjectStatus::Generating {
                return stale(current, "job_status");
            }
            if current.active_job_id.as_ref() != Some(&job_id) {
                return Reconciled::Discarded(DiscardReason::JobMismatch {
                    active: current.active_job_id.clone(),
                    observed: job_id,
                });
            }
            if matches!(current.pending, Some(PendingFetch::Results(_))) {
                return stale(current, "job_status");
            }
            match status {
                JobStatus::Pending | JobStatus::Running => {
                    next.progress = progress;
                    next.last_error = None;
                    applied(next)
                }
                JobStatus::Completed => {
                    next.progress = progress;
                    next.last_error = None;
                    next.pending = Some(PendingFetch::Results(job_id.clone()));
                    applied_with(next, FollowUp::FetchResults(job_id))
                }
                JobStatus::Failed => {
                    roll_back_generation(
                        &mut next,
                        JOB_FAILED_MESSAGE.to_string(),
                    );
                    applied(next)
                }
            }
        }

        Observation::JobResultsObserved { job_id, outcome } => {
            if current.status != ProjectStatus::Generating {
                return stale(current, "job_results");
            }
            if current.active_job_id.as_ref() != Some(&job_id) {
                return Reconciled::Discarded(DiscardReason::JobMismatch {
                    active: current.active_job_id.clone(),
                    observed: job_id,
                });
            }
            match outcome {
                Ok(assets) => {
                    next.status = ProjectStatus::Completed;
                    next.generated_assets = assets;
                    next.active_job_id = None;
                    next.pending = None;
                    next.progress = Some(100);
                    next.last_error = None;
                }
                Err(message) => roll_back_generation(&mut next, message),
            }
            applied(next)
        }
    };

    debug_assert_eq!(
        match &result {
            Reconciled::Applied { next, .. } => next.check_invariants(),
            Reconciled::Discarded(_) => Ok(()),
        },
        Ok(())
    );
    result
}

fn project_status(
    current: &StatusSnapshot,
    mut next: StatusSnapshot,
    observed: ProjectStatus,
    progress: Option<u8>,
) -> Reconciled {
    match current.status {
        ProjectStatus::Uploading | ProjectStatus::Processing => {
            next.last_error = None;
            next.progress = progress;
            match observed {
                ProjectStatus::Uploading => {}
                // No job id is known client-side for a generation started
                // elsewhere, so keep watching the project itself.
                ProjectStatus::Processing | ProjectStatus::Generating => {
                    next.status = ProjectStatus::Processing;
                }
                ProjectStatus::ReadyForReview => {
                    next.status = ProjectStatus::ReadyForReview;
                    next.pending = Some(PendingFetch::Preview);
                    next.progress = None;
                    return applied_with(next, FollowUp::FetchPreview);
                }
                ProjectStatus::Completed | ProjectStatus::Failed => {
                    next.status = observed;
                }
            }
            applied(next)
        }
        ProjectStatus::ReadyForReview
            if observed == ProjectStatus::ReadyForReview
                && current.pending.is_none()
                && current.review_assets.is_empty() =>
        {
            next.last_error = None;
            next.pending = Some(PendingFetch::Preview);
            applied_with(next, FollowUp::FetchPreview)
        }
        _ => stale(current, "project_status"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::{
        generated_asset, review_asset, snapshot_at,
    };
    use reframe_model::GeneratedAssets;

    fn apply(snapshot: &StatusSnapshot, observation: Observation) -> StatusSnapshot {
        reconcile(snapshot, observation).next_or(snapshot)
    }

    fn instagram_results() -> GeneratedAssets {
        GeneratedAssets::from([(
            "Instagram".to_string(),
            vec![generated_asset("g1", "Instagram")],
        )])
    }

    #[test]
    fn uploading_moves_to_processing() {
        let snapshot = snapshot_at("p1", ProjectStatus::Uploading, None);
        let next = apply(
            &snapshot,
            Observation::project_status(ProjectStatus::Processing),
        );
        assert_eq!(next.status(), ProjectStatus::Processing);
    }

    #[test]
    fn repeated_processing_only_clears_error() {
        let mut snapshot = snapshot_at("p1", ProjectStatus::Processing, None);
        snapshot.last_error = Some("network down".into());

        let once = apply(
            &snapshot,
            Observation::project_status(ProjectStatus::Processing),
        );
        let mut expected = snapshot.clone();
        expected.last_error = None;
        assert_eq!(once, expected);

        let twice = apply(
            &once,
            Observation::project_status(ProjectStatus::Processing),
        );
        assert_eq!(twice, once);
    }

    #[test]
    fn ready_for_review_requests_preview_before_settling() {
        let snapshot = snapshot_at("p1", ProjectStatus::Processing, None);
        let Reconciled::Applied { next, follow_up } = reconcile(
            &snapshot,
            Observation::project_status(ProjectStatus::ReadyForReview),
        ) else {
            panic!("expected transition");
        };
        assert_eq!(next.status(), ProjectStatus::ReadyForReview);
        assert_eq!(next.pending(), Some(&PendingFetch::Preview));
        assert_eq!(follow_up, Some(FollowUp::FetchPreview));

        let settled =
            apply(&next, Observation::PreviewObserved(vec![review_asset("a1")]));
        assert_eq!(settled.pending(), None);
        assert_eq!(settled.review_assets().len(), 1);
        assert_eq!(settled.review_assets()[0].id.as_str(), "a1");
    }

    #[test]
    fn preview_failure_keeps_ready_for_review_with_error() {
        let snapshot = snapshot_at("p1", ProjectStatus::Processing, None);
        let waiting = apply(
            &snapshot,
            Observation::project_status(ProjectStatus::ReadyForReview),
        );
        let failed = apply(
            &waiting,
            Observation::FetchFailed {
                kind: FetchKind::Preview,
                message: "preview unavailable".into(),
            },
        );
        assert_eq!(failed.status(), ProjectStatus::ReadyForReview);
        assert!(failed.review_assets().is_empty());
        assert_eq!(failed.last_error(), Some("preview unavailable"));
        assert_eq!(failed.pending(), None);

        // A later status observation retries the preview.
        let Reconciled::Applied { follow_up, .. } = reconcile(
            &failed,
            Observation::project_status(ProjectStatus::ReadyForReview),
        ) else {
            panic!("expected retry");
        };
        assert_eq!(follow_up, Some(FollowUp::FetchPreview));
    }

    #[test]
    fn preview_replaces_assets_wholesale() {
        let mut snapshot = snapshot_at("p1", ProjectStatus::ReadyForReview, None);
        snapshot.review_assets = vec![review_asset("old1"), review_asset("old2")];
        snapshot.pending = Some(PendingFetch::Preview);

        let next =
            apply(&snapshot, Observation::PreviewObserved(vec![review_asset("a1")]));
        let ids: Vec<_> =
            next.review_assets().iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a1"]);
    }

    #[test]
    fn analysis_failure_is_terminal() {
        let snapshot = snapshot_at("p1", ProjectStatus::Processing, None);
        let next =
            apply(&snapshot, Observation::project_status(ProjectStatus::Failed));
        assert_eq!(next.status(), ProjectStatus::Failed);

        for observation in [
            Observation::project_status(ProjectStatus::Processing),
            Observation::FetchFailed {
                kind: FetchKind::ProjectStatus,
                message: "boom".into(),
            },
            Observation::GenerationStarted(JobId::from("job1")),
        ] {
            assert_eq!(
                reconcile(&next, observation),
                Reconciled::Discarded(DiscardReason::Terminal(
                    ProjectStatus::Failed
                ))
            );
        }
    }

    #[test]
    fn rehydrated_statuses_map_onto_analysis() {
        let uploading = snapshot_at("p1", ProjectStatus::Uploading, None);

        let next =
            apply(&uploading, Observation::project_status(ProjectStatus::Uploading));
        assert_eq!(next.status(), ProjectStatus::Uploading);

        let next = apply(
            &uploading,
            Observation::project_status(ProjectStatus::Generating),
        );
        assert_eq!(next.status(), ProjectStatus::Processing);
        assert!(next.active_job_id().is_none());

        let next =
            apply(&uploading, Observation::project_status(ProjectStatus::Completed));
        assert_eq!(next.status(), ProjectStatus::Completed);
        assert!(next.generated_assets().is_empty());
    }

    #[test]
    fn fetch_failure_keeps_status_and_sets_error() {
        let snapshot = snapshot_at("p1", ProjectStatus::Processing, None);
        let next = apply(
            &snapshot,
            Observation::FetchFailed {
                kind: FetchKind::ProjectStatus,
                message: "connection refused".into(),
            },
        );
        assert_eq!(next.status(), ProjectStatus::Processing);
        assert_eq!(next.last_error(), Some("connection refused"));
    }

    #[test]
    fn generation_start_round_trip() {
        let snapshot = snapshot_at("p1", ProjectStatus::ReadyForReview, None);
        let requested = apply(&snapshot, Observation::GenerationRequested);
        assert_eq!(requested.display_status(), ProjectStatus::Generating);
        assert_eq!(requested.status(), ProjectStatus::ReadyForReview);

        let started =
            apply(&requested, Observation::GenerationStarted(JobId::from("job1")));
        assert_eq!(started.status(), ProjectStatus::Generating);
        assert_eq!(started.active_job_id().map(JobId::as_str), Some("job1"));

        let failed = apply(
            &requested,
            Observation::GenerationStartFailed("quota exceeded".into()),
        );
        assert_eq!(failed.status(), ProjectStatus::ReadyForReview);
        assert_eq!(failed.display_status(), ProjectStatus::ReadyForReview);
        assert_eq!(failed.last_error(), Some("quota exceeded"));
        assert!(failed.active_job_id().is_none());
    }

    #[test]
    fn generation_started_without_request_is_stale() {
        let snapshot = snapshot_at("p1", ProjectStatus::ReadyForReview, None);
        assert!(matches!(
            reconcile(&snapshot, Observation::GenerationStarted(JobId::from("j"))),
            Reconciled::Discarded(DiscardReason::Stale { .. })
        ));
    }

    #[test]
    fn job_completion_fetches_results_then_completes() {
        let snapshot = snapshot_at("p1", ProjectStatus::Generating, Some("job1"));

        let running = apply(
            &snapshot,
            Observation::JobStatusObserved {
                job_id: JobId::from("job1"),
                status: JobStatus::Running,
                progress: Some(40),
            },
        );
        assert_eq!(running.status(), ProjectStatus::Generating);
        assert_eq!(running.progress(), Some(40));

        let Reconciled::Applied { next, follow_up } = reconcile(
            &running,
            Observation::job_status("job1", JobStatus::Completed),
        ) else {
            panic!("expected transition");
        };
        assert_eq!(next.status(), ProjectStatus::Generating);
        assert_eq!(follow_up, Some(FollowUp::FetchResults(JobId::from("job1"))));

        let done = apply(
            &next,
            Observation::JobResultsObserved {
                job_id: JobId::from("job1"),
                outcome: Ok(instagram_results()),
            },
        );
        assert_eq!(done.status(), ProjectStatus::Completed);
        assert_eq!(done.generated_assets(), &instagram_results());
        assert!(done.active_job_id().is_none());
    }

    #[test]
    fn results_failure_rolls_back_to_review() {
        let snapshot = snapshot_at("p1", ProjectStatus::Generating, Some("job1"));
        let next = apply(
            &snapshot,
            Observation::JobResultsObserved {
                job_id: JobId::from("job1"),
                outcome: Err("results unavailable".into()),
            },
        );
        assert_eq!(next.status(), ProjectStatus::ReadyForReview);
        assert!(next.active_job_id().is_none());
        assert_eq!(next.last_error(), Some("results unavailable"));

        // The user can try again.
        assert!(reconcile(&next, Observation::GenerationRequested).is_applied());
    }

    #[test]
    fn failed_job_rolls_back_to_review() {
        let snapshot = snapshot_at("p1", ProjectStatus::Generating, Some("job1"));
        let next =
            apply(&snapshot, Observation::job_status("job1", JobStatus::Failed));
        assert_eq!(next.status(), ProjectStatus::ReadyForReview);
        assert_eq!(next.last_error(), Some(JOB_FAILED_MESSAGE));
    }

    #[test]
    fn results_for_another_job_are_discarded() {
        let snapshot = snapshot_at("p1", ProjectStatus::Generating, Some("J1"));
        let result = reconcile(
            &snapshot,
            Observation::JobResultsObserved {
                job_id: JobId::from("J2"),
                outcome: Ok(instagram_results()),
            },
        );
        assert_eq!(
            result,
            Reconciled::Discarded(DiscardReason::JobMismatch {
                active: Some(JobId::from("J1")),
                observed: JobId::from("J2"),
            })
        );
        assert_eq!(result.next_or(&snapshot), snapshot);
    }

    #[test]
    fn project_status_is_stale_once_reviewing_or_generating() {
        let generating = snapshot_at("p1", ProjectStatus::Generating, Some("job1"));
        assert!(!reconcile(
            &generating,
            Observation::project_status(ProjectStatus::Processing)
        )
        .is_applied());

        let mut reviewing = snapshot_at("p1", ProjectStatus::ReadyForReview, None);
        reviewing.review_assets = vec![review_asset("a1")];
        assert!(!reconcile(
            &reviewing,
            Observation::project_status(ProjectStatus::ReadyForReview)
        )
        .is_applied());
    }

    #[test]
    fn stall_sets_error_without_moving_status() {
        let snapshot = snapshot_at("p1", ProjectStatus::Processing, None);
        let next = apply(
            &snapshot,
            Observation::Stalled {
                waited: Duration::from_secs(600),
            },
        );
        assert_eq!(next.status(), ProjectStatus::Processing);
        assert_eq!(next.last_error(), Some("still processing after 600s"));

        let reviewing = snapshot_at("p1", ProjectStatus::ReadyForReview, None);
        assert!(!reconcile(
            &reviewing,
            Observation::Stalled {
                waited: Duration::from_secs(600)
            }
        )
        .is_applied());
    }

    fn observation_alphabet() -> Vec<Observation> {
        let mut alphabet: Vec<Observation> = ProjectStatus::ALL
            .into_iter()
            .map(Observation::project_status)
            .collect();
        alphabet.push(Observation::PreviewObserved(vec![review_asset("a1")]));
        for job in ["job1", "job2"] {
            for status in [
                JobStatus::Pending,
                JobStatus::Running,
                JobStatus::Completed,
                JobStatus::Failed,
            ] {
                alphabet.push(Observation::job_status(job, status));
            }
            alphabet.push(Observation::JobResultsObserved {
                job_id: JobId::from(job),
                outcome: Ok(instagram_results()),
            });
            alphabet.push(Observation::JobResultsObserved {
                job_id: JobId::from(job),
                outcome: Err("lost".into()),
            });
            alphabet.push(Observation::GenerationStarted(JobId::from(job)));
        }
        alphabet.push(Observation::GenerationRequested);
        alphabet.push(Observation::GenerationStartFailed("nope".into()));
        alphabet.push(Observation::FetchFailed {
            kind: FetchKind::Preview,
            message: "offline".into(),
        });
        alphabet.push(Observation::Stalled {
            waited: Duration::from_secs(1),
        });
        alphabet
    }

    #[test]
    fn generating_iff_active_job_over_all_short_sequences() {
        let alphabet = observation_alphabet();
        let mut frontier = vec![snapshot_at("p1", ProjectStatus::Uploading, None)];

        for _ in 0..4 {
            let mut next_frontier = Vec::new();
            for snapshot in &frontier {
                for observation in &alphabet {
                    let next = apply(snapshot, observation.clone());
                    assert_eq!(
                        next.status() == ProjectStatus::Generating,
                        next.active_job_id().is_some(),
                        "after {observation:?} from {snapshot:?}"
                    );
                    assert_eq!(next.check_invariants(), Ok(()));
                    if !next_frontier.contains(&next) {
                        next_frontier.push(next);
                    }
                }
            }
            frontier = next_frontier;
        }
    }
}
