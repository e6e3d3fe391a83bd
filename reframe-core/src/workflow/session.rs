use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use reframe_model::ProjectId;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::observation::{FetchKind, Observation};
use super::poller::PollTarget;
use super::reconciler::{FollowUp, Reconciled, reconcile};
use super::snapshot::StatusSnapshot;
use crate::gateway::{BackendGateway, GatewayError, GatewayResult};

pub(crate) type SnapshotSender = Arc<watch::Sender<Option<StatusSnapshot>>>;

/// Result of one status check against a poll target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The backend answered and the answer went through the reconciler.
    Observed,
    /// The call failed; the failure was recorded on the snapshot.
    TransportFailed(GatewayError),
    /// A check against the same target was already outstanding.
    Skipped,
    /// The session ended before the answer could be applied.
    Cancelled,
}

/// Why [`Session::apply`] left the snapshot alone. The discard reason is
/// logged where it is decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rejected {
    Cancelled,
    Discarded,
}

/// Run `work` on a task of its own and wait for it.
///
/// Work that writes a pending marker has to clear it again even when the
/// caller stops waiting, so it must not live inside the caller's future.
/// `None` means the task panicked or the runtime shut it down.
pub(crate) async fn run_detached<T, F>(work: F) -> Option<T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::spawn(work).await {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(error = %err, "detached workflow task did not finish");
            None
        }
    }
}

/// Await `call`, turning expiry of `limit` into [`GatewayError::Timeout`].
pub(crate) async fn with_timeout<T, F>(
    limit: Option<Duration>,
    call: F,
) -> GatewayResult<T>
where
    F: Future<Output = GatewayResult<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .unwrap_or(Err(GatewayError::Timeout(limit))),
        None => call.await,
    }
}

/// Poll targets with a request outstanding.
#[derive(Debug, Default)]
pub(crate) struct InFlight {
    targets: Mutex<HashSet<PollTarget>>,
}

pub(crate) struct InFlightGuard {
    set: Arc<InFlight>,
    target: PollTarget,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set
            .targets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.target);
    }
}

impl InFlight {
    pub(crate) fn try_acquire(
        self: &Arc<Self>,
        target: &PollTarget,
    ) -> Option<InFlightGuard> {
        let inserted = self
            .targets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(target.clone());
        inserted.then(|| InFlightGuard {
            set: Arc::clone(self),
            target: target.clone(),
        })
    }
}

/// One activation of the controller for one project.
///
/// Every write to the shared snapshot goes through [`Session::apply`], which
/// refuses to write once the session is cancelled or the published snapshot
/// belongs to another project. That is what keeps a late response from a
/// torn-down activation out of the view.
#[derive(Clone)]
pub(crate) struct Session {
    pub(crate) project_id: ProjectId,
    pub(crate) cancel: CancellationToken,
    state: SnapshotSender,
    gateway: Arc<dyn BackendGateway>,
    request_timeout: Option<Duration>,
    in_flight: Arc<InFlight>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("project_id", &self.project_id)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl Session {
    pub(crate) fn new(
        project_id: ProjectId,
        state: SnapshotSender,
        gateway: Arc<dyn BackendGateway>,
        request_timeout: Option<Duration>,
    ) -> Self {
        Self {
            project_id,
            cancel: CancellationToken::new(),
            state,
            gateway,
            request_timeout,
            in_flight: Arc::new(InFlight::default()),
        }
    }

    pub(crate) fn gateway(&self) -> &dyn BackendGateway {
        self.gateway.as_ref()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Option<StatusSnapshot>> {
        self.state.subscribe()
    }

    pub(crate) fn current(&self) -> Option<StatusSnapshot> {
        self.state
            .borrow()
            .as_ref()
            .filter(|snapshot| snapshot.project_id == self.project_id)
            .cloned()
    }

    /// Run one observation through the reconciler and publish the result.
    pub(crate) fn apply(
        &self,
        observation: Observation,
    ) -> Result<Option<FollowUp>, Rejected> {
        let mut outcome = Err(Rejected::Cancelled);
        self.state.send_if_modified(|slot| {
            if self.cancel.is_cancelled() {
                return false;
            }
            let Some(current) = slot.as_ref() else {
                return false;
            };
            if current.project_id != self.project_id {
                return false;
            }

            let kind = observation.kind();
            match reconcile(current, observation) {
                Reconciled::Applied { next, follow_up } => {
                    if next.status != current.status {
                        info!(
                            project_id = %self.project_id,
                            from = %current.status,
                            to = %next.status,
                            job_id = ?next.active_job_id,
                            "project status transition"
                        );
                    }
                    let changed = next != *current;
                    *slot = Some(next);
                    outcome = Ok(follow_up);
                    changed
                }
                Reconciled::Discarded(reason) => {
                    debug!(
                        project_id = %self.project_id,
                        observation = kind,
                        ?reason,
                        "discarded observation"
                    );
                    outcome = Err(Rejected::Discarded);
                    false
                }
            }
        });
        outcome
    }

    /// Await a gateway call under the request timeout, giving up early if
    /// the session is cancelled. `None` means cancelled.
    pub(crate) async fn call<T, F>(&self, call: F) -> Option<GatewayResult<T>>
    where
        F: Future<Output = GatewayResult<T>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = with_timeout(self.request_timeout, call) => Some(result),
        }
    }

    /// [`Session::check`] on its own task. Dropping the returned future stops
    /// the wait, not the check, so a preview or results fetch it starts
    /// always lands or fails on the snapshot.
    pub(crate) async fn check_detached(&self, target: PollTarget) -> CheckOutcome {
        let session = self.clone();
        run_detached(async move { session.check(&target).await })
            .await
            .unwrap_or(CheckOutcome::Cancelled)
    }

    /// One status check against `target`, including any fetch the answer
    /// requires before it settles. The target stays marked in flight until
    /// all of it has resolved.
    pub(crate) async fn check(&self, target: &PollTarget) -> CheckOutcome {
        let Some(_guard) = self.in_flight.try_acquire(target) else {
            debug!(
                project_id = %self.project_id,
                ?target,
                "status check already in flight, skipping"
            );
            return CheckOutcome::Skipped;
        };

        let (observation, failure) = match target {
            PollTarget::Project(project_id) => {
                let Some(result) = self
                    .call(self.gateway.fetch_project_status(project_id))
                    .await
                else {
                    return CheckOutcome::Cancelled;
                };
                match result {
                    Ok(response) => (
                        Observation::ProjectStatusObserved {
                            status: response.status,
                            progress: response.progress,
                        },
                        None,
                    ),
                    Err(err) => (
                        Observation::FetchFailed {
                            kind: FetchKind::ProjectStatus,
                            message: err.to_string(),
                        },
                        Some(err),
                    ),
                }
            }
            PollTarget::Job(job_id) => {
                let Some(result) =
                    self.call(self.gateway.fetch_job_status(job_id)).await
                else {
                    return CheckOutcome::Cancelled;
                };
                match result {
                    Ok(response) => (
                        Observation::JobStatusObserved {
                            job_id: job_id.clone(),
                            status: response.status,
                            progress: response.progress,
                        },
                        None,
                    ),
                    Err(err) => (
                        Observation::FetchFailed {
                            kind: FetchKind::JobStatus,
                            message: err.to_string(),
                        },
                        Some(err),
                    ),
                }
            }
        };

        if let Some(err) = &failure {
            warn!(
                project_id = %self.project_id,
                ?target,
                error = %err,
                "status check failed"
            );
        }

        match self.apply(observation) {
            Ok(Some(follow_up)) => {
                if !self.settle(follow_up).await {
                    return CheckOutcome::Cancelled;
                }
            }
            Ok(None) | Err(Rejected::Discarded) => {}
            Err(Rejected::Cancelled) => return CheckOutcome::Cancelled,
        }

        match failure {
            Some(err) => CheckOutcome::TransportFailed(err),
            None => CheckOutcome::Observed,
        }
    }

    /// Issue the fetches a transition asked for. Returns `false` if the
    /// session was cancelled along the way.
    async fn settle(&self, follow_up: FollowUp) -> bool {
        let mut next = Some(follow_up);
        while let Some(follow_up) = next.take() {
            let observation = match follow_up {
                FollowUp::FetchPreview => {
                    let Some(result) = self
                        .call(self.gateway.fetch_project_preview(&self.project_id))
                        .await
                    else {
                        return false;
                    };
                    match result {
                        Ok(assets) => Observation::PreviewObserved(assets),
                        Err(err) => {
                            warn!(
                                project_id = %self.project_id,
                                error = %err,
                                "preview fetch failed"
                            );
                            Observation::FetchFailed {
                                kind: FetchKind::Preview,
                                message: err.to_string(),
                            }
                        }
                    }
                }
                FollowUp::FetchResults(job_id) => {
                    let Some(result) =
                        self.call(self.gateway.fetch_job_results(&job_id)).await
                    else {
                        return false;
                    };
                    if let Err(err) = &result {
                        warn!(
                            project_id = %self.project_id,
                            job_id = %job_id,
                            error = %err,
                            "results fetch failed, rolling back generation"
                        );
                    }
                    Observation::JobResultsObserved {
                        job_id,
                        outcome: result.map_err(|err| err.to_string()),
                    }
                }
            };
            match self.apply(observation) {
                Ok(follow_up) => next = follow_up,
                Err(Rejected::Cancelled) => return false,
                Err(Rejected::Discarded) => {}
            }
        }
        true
    }
}
