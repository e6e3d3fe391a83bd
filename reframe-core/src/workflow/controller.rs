use std::sync::Arc;

use reframe_model::{
    AssetId, DownloadOptions, DownloadRequest, FormatCatalog, FormatId,
    GenerationStartRequest, JobId, ProjectId, ProjectStatus,
};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use super::generation::{FormatSelection, check_preconditions};
use super::observation::Observation;
use super::poller::{PollTarget, PollerConfig, StatusPoller};
use super::session::{
    CheckOutcome, Rejected, Session, SnapshotSender, run_detached, with_timeout,
};
use super::snapshot::StatusSnapshot;
use crate::error::{Result, WorkflowError};
use crate::gateway::{BackendGateway, DownloadedArchive, UploadFile};

struct ActiveSession {
    session: Session,
    poller: Option<StatusPoller>,
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        self.session.cancel.cancel();
    }
}

/// Owns the workflow of at most one project at a time.
///
/// Views read the current [`StatusSnapshot`] through [`snapshot`] or
/// [`subscribe`] and push intents through the async methods. The controller
/// keeps one poller per activation alive for as long as the project is not
/// terminal; the poller itself decides what to ask for on every tick.
///
/// [`snapshot`]: WorkflowController::snapshot
/// [`subscribe`]: WorkflowController::subscribe
pub struct WorkflowController {
    gateway: Arc<dyn BackendGateway>,
    config: PollerConfig,
    state: SnapshotSender,
    active: Mutex<Option<ActiveSession>>,
}

impl std::fmt::Debug for WorkflowController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowController")
            .field("config", &self.config)
            .field(
                "project_id",
                &self
                    .state
                    .borrow()
                    .as_ref()
                    .map(|snapshot| snapshot.project_id().clone()),
            )
            .finish()
    }
}

impl WorkflowController {
    pub fn new(gateway: Arc<dyn BackendGateway>, config: PollerConfig) -> Self {
        let (state, _) = watch::channel(None);
        Self {
            gateway,
            config,
            state: Arc::new(state),
            active: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Current snapshot, or `None` when no project is active.
    pub fn snapshot(&self) -> Option<StatusSnapshot> {
        self.state.borrow().clone()
    }

    /// Read-only projection of the snapshot for views. Carries `None` after
    /// [`reset`](Self::reset).
    pub fn subscribe(&self) -> watch::Receiver<Option<StatusSnapshot>> {
        self.state.subscribe()
    }

    /// Take ownership of `project_id`, tearing down any previous activation,
    /// and derive its snapshot from a fresh status fetch.
    pub async fn activate(&self, project_id: ProjectId) -> Result<StatusSnapshot> {
        let session = {
            let mut active = self.active.lock().await;
            if let Some(previous) = active.take() {
                info!(
                    project_id = %previous.session.project_id,
                    "deactivating project workflow"
                );
            }
            let session = Session::new(
                project_id.clone(),
                Arc::clone(&self.state),
                Arc::clone(&self.gateway),
                self.config.request_timeout,
            );
            self.state
                .send_replace(Some(StatusSnapshot::new(project_id.clone())));
            // The poller starts with the session so that an activation whose
            // caller stops waiting still leaves the project watched.
            *active = Some(ActiveSession {
                session: session.clone(),
                poller: Some(StatusPoller::spawn(session.clone(), self.config)),
            });
            session
        };
        info!(project_id = %project_id, "activated project workflow");

        let target = PollTarget::Project(project_id);
        if session.check_detached(target).await == CheckOutcome::Cancelled {
            return Err(WorkflowError::NotActive);
        }
        self.ensure_poller(&session).await;
        session.current().ok_or(WorkflowError::NotActive)
    }

    /// Upload a new project and activate it.
    pub async fn create_project(
        &self,
        name: &str,
        files: Vec<UploadFile>,
    ) -> Result<StatusSnapshot> {
        if files.is_empty() {
            return Err(WorkflowError::EmptyUpload);
        }
        let file_count = files.len();
        // Uploads are bounded by the HTTP client timeout only; large
        // batches legitimately outlast the status request timeout.
        let project_id = self.gateway.upload_project(name, files).await?;
        info!(
            project_id = %project_id,
            files = file_count,
            "created project"
        );
        self.activate(project_id).await
    }

    /// Start a generation job for the active project.
    ///
    /// The snapshot shows `generating` as soon as the request is issued. On
    /// success the job id is recorded and the poller moves to the job; on
    /// failure the snapshot returns to `ready_for_review` with the error.
    /// Dropping the returned future does not abandon the request; its outcome
    /// still lands on the snapshot.
    pub async fn start_generation(
        &self,
        formats: impl IntoIterator<Item = FormatId>,
        prompt: Option<String>,
    ) -> Result<JobId> {
        let selection = FormatSelection::new(formats)?;
        let session = self.current_session().await?;
        let snapshot = session.current().ok_or(WorkflowError::NotActive)?;
        check_preconditions(&snapshot)?;

        let request = selection.into_request(session.project_id.clone(), prompt);
        info!(
            project_id = %session.project_id,
            formats = request.format_ids.len(),
            "starting generation"
        );

        // The request and the snapshot update that resolves it run together
        // on their own task, so `generating` never outlives a dropped caller.
        let job_id = run_detached(submit_generation(session.clone(), request))
            .await
            .unwrap_or(Err(WorkflowError::NotActive))?;
        self.ensure_poller(&session).await;
        Ok(job_id)
    }

    /// Check status once now, outside the poller's cadence.
    ///
    /// From `ready_for_review` with no preview loaded this re-requests the
    /// preview. Shares the poller's in-flight guard, so it reports
    /// [`CheckOutcome::Skipped`] while a poll is outstanding.
    pub async fn refresh(&self) -> Result<CheckOutcome> {
        let session = self.current_session().await?;
        let snapshot = session.current().ok_or(WorkflowError::NotActive)?;

        let preview_missing = snapshot.status() == ProjectStatus::ReadyForReview
            && snapshot.pending().is_none()
            && snapshot.review_assets().is_empty();
        let target = PollTarget::for_snapshot(&snapshot).or_else(|| {
            preview_missing.then(|| PollTarget::Project(session.project_id.clone()))
        });
        let Some(target) = target else {
            debug!(
                project_id = %session.project_id,
                status = %snapshot.status(),
                "nothing to refresh"
            );
            return Ok(CheckOutcome::Skipped);
        };

        let outcome = session.check_detached(target).await;
        self.ensure_poller(&session).await;
        Ok(outcome)
    }

    /// Stop polling and discard the snapshot.
    pub async fn reset(&self) {
        let previous = self.active.lock().await.take();
        if let Some(previous) = previous {
            info!(
                project_id = %previous.session.project_id,
                "reset project workflow"
            );
            drop(previous);
        }
        self.state.send_replace(None);
    }

    pub async fn available_formats(&self) -> Result<FormatCatalog> {
        let catalog =
            with_timeout(self.config.request_timeout, self.gateway.fetch_formats())
                .await?;
        Ok(catalog)
    }

    pub async fn download_assets(
        &self,
        asset_ids: Vec<AssetId>,
        options: DownloadOptions,
    ) -> Result<DownloadedArchive> {
        if asset_ids.is_empty() {
            return Err(WorkflowError::EmptyAssetSelection);
        }
        let request = DownloadRequest::new(asset_ids, options);
        let archive = self.gateway.download_assets(&request).await?;
        info!(
            filename = %archive.filename,
            bytes = archive.bytes.len(),
            "downloaded assets"
        );
        Ok(archive)
    }

    async fn current_session(&self) -> Result<Session> {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|active| active.session.clone())
            .ok_or(WorkflowError::NotActive)
    }

    /// Make sure a poller runs for `session` while its project is not
    /// terminal. A no-op for sessions that have since been replaced.
    async fn ensure_poller(&self, session: &Session) {
        if session.cancel.is_cancelled() {
            return;
        }
        let mut active = self.active.lock().await;
        let Some(current) = active.as_mut() else {
            return;
        };
        if current.session.cancel.is_cancelled()
            || current.session.project_id != session.project_id
        {
            return;
        }
        if current.poller.as_ref().is_some_and(|poller| !poller.is_finished()) {
            return;
        }
        let Some(snapshot) = session.current() else {
            return;
        };
        if snapshot.is_terminal() {
            return;
        }
        current.poller = Some(StatusPoller::spawn(session.clone(), self.config));
    }
}

/// Issue the start request for the session's project and apply its outcome.
/// Marks the snapshot `generating` first; every path out of here either
/// records the job or rolls that back.
async fn submit_generation(
    session: Session,
    request: GenerationStartRequest,
) -> Result<JobId> {
    match session.apply(Observation::GenerationRequested) {
        Ok(_) => {}
        Err(Rejected::Cancelled) => return Err(WorkflowError::NotActive),
        Err(Rejected::Discarded) => {
            let status = session
                .current()
                .map_or(ProjectStatus::default(), |s| s.status());
            return Err(WorkflowError::NotReadyForGeneration { status });
        }
    }

    let Some(result) =
        session.call(session.gateway().start_generation(&request)).await
    else {
        return Err(WorkflowError::NotActive);
    };

    match result {
        Ok(job_id) => {
            if let Err(Rejected::Cancelled) =
                session.apply(Observation::GenerationStarted(job_id.clone()))
            {
                warn!(
                    job_id = %job_id,
                    "generation started after the project was deactivated"
                );
            }
            info!(
                project_id = %session.project_id,
                job_id = %job_id,
                "generation started"
            );
            Ok(job_id)
        }
        Err(err) => {
            warn!(
                project_id = %session.project_id,
                error = %err,
                "generation start failed"
            );
            let _ = session.apply(Observation::GenerationStartFailed(err.to_string()));
            Err(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{GatewayError, MockBackendGateway};
    use reframe_model::ProjectStatusResponse;
    use std::time::Duration;

    fn controller(mock: MockBackendGateway) -> WorkflowController {
        WorkflowController::new(
            Arc::new(mock),
            PollerConfig {
                interval: Duration::from_secs(3),
                backoff_max: Duration::from_secs(3),
                stall_after: None,
                request_timeout: None,
            },
        )
    }

    fn processing_backend() -> MockBackendGateway {
        let mut mock = MockBackendGateway::new();
        mock.expect_fetch_project_status().returning(|_| {
            Ok(ProjectStatusResponse {
                status: ProjectStatus::Processing,
                progress: Some(20),
            })
        });
        mock
    }

    #[tokio::test(start_paused = true)]
    async fn empty_format_selection_never_reaches_backend() {
        let mut mock = processing_backend();
        mock.expect_start_generation().never();
        let controller = controller(mock);
        controller.activate(ProjectId::from("p1")).await.unwrap();

        let err = controller
            .start_generation(Vec::<FormatId>::new(), None)
            .await
            .unwrap_err();
        assert_eq!(err, WorkflowError::EmptyFormatSelection);
    }

    #[tokio::test(start_paused = true)]
    async fn generation_outside_review_never_reaches_backend() {
        let mut mock = processing_backend();
        mock.expect_start_generation().never();
        let controller = controller(mock);
        let snapshot = controller.activate(ProjectId::from("p1")).await.unwrap();
        assert_eq!(snapshot.status(), ProjectStatus::Processing);
        assert_eq!(snapshot.progress(), Some(20));

        let err = controller
            .start_generation([FormatId::from("f1")], None)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            WorkflowError::NotReadyForGeneration {
                status: ProjectStatus::Processing
            }
        );
        assert_eq!(
            controller.snapshot().map(|s| s.status()),
            Some(ProjectStatus::Processing)
        );
    }

    #[tokio::test]
    async fn intents_without_activation_are_rejected() {
        let mut mock = MockBackendGateway::new();
        mock.expect_start_generation().never();
        mock.expect_fetch_project_status().never();
        let controller = controller(mock);

        assert_eq!(
            controller
                .start_generation([FormatId::from("f1")], None)
                .await
                .unwrap_err(),
            WorkflowError::NotActive
        );
        assert_eq!(controller.refresh().await.unwrap_err(), WorkflowError::NotActive);
        assert!(controller.snapshot().is_none());
    }

    #[tokio::test]
    async fn empty_download_is_rejected_locally() {
        let mut mock = MockBackendGateway::new();
        mock.expect_download_assets().never();
        let controller = controller(mock);

        let err = controller
            .download_assets(Vec::new(), DownloadOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err, WorkflowError::EmptyAssetSelection);
    }

    #[tokio::test]
    async fn empty_upload_is_rejected_locally() {
        let mut mock = MockBackendGateway::new();
        mock.expect_upload_project().never();
        let controller = controller(mock);

        let err = controller.create_project("Spring", Vec::new()).await.unwrap_err();
        assert_eq!(err, WorkflowError::EmptyUpload);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_first_fetch_keeps_placeholder_with_error() {
        let mut mock = MockBackendGateway::new();
        mock.expect_fetch_project_status()
            .returning(|_| Err(GatewayError::Transport("connection refused".into())));
        let controller = controller(mock);

        let snapshot = controller.activate(ProjectId::from("p1")).await.unwrap();
        assert_eq!(snapshot.status(), ProjectStatus::Uploading);
        assert_eq!(
            snapshot.last_error(),
            Some("transport error: connection refused")
        );
    }
}
