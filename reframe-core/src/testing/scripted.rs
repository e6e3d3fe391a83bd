use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use reframe_model::{
    DownloadRequest, FormatCatalog, GeneratedAssets, GenerationStartRequest,
    JobId, JobStatus, JobStatusResponse, ProjectId, ProjectStatus,
    ProjectStatusResponse, ReviewAsset,
};
use tokio::sync::{oneshot, watch};

use crate::gateway::{
    BackendGateway, DownloadedArchive, GatewayError, GatewayResult, UploadFile,
};

/// Gateway operations, for call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    ProjectStatus,
    ProjectPreview,
    StartGeneration,
    JobStatus,
    JobResults,
    Formats,
    Upload,
    Download,
}

/// One recorded call with the arguments it was made with.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    ProjectStatus(ProjectId),
    ProjectPreview(ProjectId),
    StartGeneration(GenerationStartRequest),
    JobStatus(JobId),
    JobResults(JobId),
    Formats,
    Upload { name: String, files: Vec<String> },
    Download(DownloadRequest),
}

impl GatewayCall {
    pub fn endpoint(&self) -> Endpoint {
        match self {
            GatewayCall::ProjectStatus(_) => Endpoint::ProjectStatus,
            GatewayCall::ProjectPreview(_) => Endpoint::ProjectPreview,
            GatewayCall::StartGeneration(_) => Endpoint::StartGeneration,
            GatewayCall::JobStatus(_) => Endpoint::JobStatus,
            GatewayCall::JobResults(_) => Endpoint::JobResults,
            GatewayCall::Formats => Endpoint::Formats,
            GatewayCall::Upload { .. } => Endpoint::Upload,
            GatewayCall::Download(_) => Endpoint::Download,
        }
    }
}

/// Completes a held call.
#[derive(Debug)]
pub struct Responder<T> {
    tx: oneshot::Sender<GatewayResult<T>>,
}

impl<T> Responder<T> {
    /// Returns `false` when the caller stopped waiting.
    pub fn respond(self, result: GatewayResult<T>) -> bool {
        self.tx.send(result).is_ok()
    }
}

enum Step<T> {
    Ready(GatewayResult<T>),
    Held(oneshot::Receiver<GatewayResult<T>>),
}

/// Queued answers for one endpoint. The last ready answer repeats once the
/// queue runs dry, which is what a steadily polled endpoint looks like.
struct Script<T> {
    steps: VecDeque<Step<T>>,
    sticky: Option<GatewayResult<T>>,
}

impl<T> Default for Script<T> {
    fn default() -> Self {
        Self {
            steps: VecDeque::new(),
            sticky: None,
        }
    }
}

impl<T: Clone> Script<T> {
    fn next(&mut self, endpoint: Endpoint) -> Step<T> {
        match self.steps.pop_front() {
            Some(Step::Ready(result)) => {
                if self.steps.is_empty() {
                    self.sticky = Some(result.clone());
                }
                Step::Ready(result)
            }
            Some(held) => held,
            None => Step::Ready(self.sticky.clone().unwrap_or_else(|| {
                Err(GatewayError::Transport(format!(
                    "no scripted response for {endpoint:?}"
                )))
            })),
        }
    }

    fn push(&mut self, result: GatewayResult<T>) {
        self.steps.push_back(Step::Ready(result));
    }

    fn hold(&mut self) -> Responder<T> {
        let (tx, rx) = oneshot::channel();
        self.steps.push_back(Step::Held(rx));
        Responder { tx }
    }
}

#[derive(Default)]
struct Scripts {
    project_status: Script<ProjectStatusResponse>,
    preview: Script<Vec<ReviewAsset>>,
    start_generation: Script<JobId>,
    job_status: Script<JobStatusResponse>,
    job_results: Script<GeneratedAssets>,
    formats: Script<FormatCatalog>,
    upload: Script<ProjectId>,
    download: Script<DownloadedArchive>,
}

#[derive(Default, Clone, Copy)]
struct InFlightCount {
    current: usize,
    max: usize,
}

/// [`BackendGateway`] answering from per-endpoint queues.
///
/// Every call is recorded. Answers can be queued up front (`push_*`) or held
/// open (`hold_*`) and released later from the test, which is how slow and
/// out-of-order responses are staged.
pub struct ScriptedGateway {
    scripts: Mutex<Scripts>,
    calls: Mutex<Vec<GatewayCall>>,
    in_flight: Mutex<HashMap<Endpoint, InFlightCount>>,
    call_count: watch::Sender<usize>,
}

impl std::fmt::Debug for ScriptedGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedGateway")
            .field("calls", &*self.call_count.borrow())
            .finish()
    }
}

impl Default for ScriptedGateway {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! scripted_endpoint {
    ($push:ident, $hold:ident, $field:ident, $ty:ty) => {
        pub fn $push(&self, result: GatewayResult<$ty>) -> &Self {
            self.scripts().$field.push(result);
            self
        }

        pub fn $hold(&self) -> Responder<$ty> {
            self.scripts().$field.hold()
        }
    };
}

struct InFlightGuard<'a> {
    gateway: &'a ScriptedGateway,
    endpoint: Endpoint,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut counts = self.gateway.counts();
        if let Some(count) = counts.get_mut(&self.endpoint) {
            count.current = count.current.saturating_sub(1);
        }
    }
}

impl ScriptedGateway {
    pub fn new() -> Self {
        let (call_count, _) = watch::channel(0);
        Self {
            scripts: Mutex::new(Scripts::default()),
            calls: Mutex::new(Vec::new()),
            in_flight: Mutex::new(HashMap::new()),
            call_count,
        }
    }

    fn scripts(&self) -> MutexGuard<'_, Scripts> {
        self.scripts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn counts(&self) -> MutexGuard<'_, HashMap<Endpoint, InFlightCount>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    scripted_endpoint!(
        push_project_status,
        hold_project_status,
        project_status,
        ProjectStatusResponse
    );
    scripted_endpoint!(push_preview, hold_preview, preview, Vec<ReviewAsset>);
    scripted_endpoint!(
        push_start_generation,
        hold_start_generation,
        start_generation,
        JobId
    );
    scripted_endpoint!(
        push_job_status,
        hold_job_status,
        job_status,
        JobStatusResponse
    );
    scripted_endpoint!(
        push_job_results,
        hold_job_results,
        job_results,
        GeneratedAssets
    );
    scripted_endpoint!(push_formats, hold_formats, formats, FormatCatalog);
    scripted_endpoint!(push_upload, hold_upload, upload, ProjectId);
    scripted_endpoint!(push_download, hold_download, download, DownloadedArchive);

    pub fn queue_project_status(&self, status: ProjectStatus) -> &Self {
        self.push_project_status(Ok(ProjectStatusResponse {
            status,
            progress: None,
        }))
    }

    pub fn queue_job_status(&self, status: JobStatus) -> &Self {
        self.push_job_status(Ok(JobStatusResponse {
            status,
            progress: None,
        }))
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn calls_to(&self, endpoint: Endpoint) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|call| call.endpoint() == endpoint)
            .count()
    }

    /// Highest number of simultaneously outstanding calls seen on `endpoint`.
    pub fn max_in_flight(&self, endpoint: Endpoint) -> usize {
        self.counts().get(&endpoint).map_or(0, |count| count.max)
    }

    pub fn in_flight(&self, endpoint: Endpoint) -> usize {
        self.counts().get(&endpoint).map_or(0, |count| count.current)
    }

    /// Resolves once `endpoint` has been called at least `count` times.
    pub async fn wait_for_calls(&self, endpoint: Endpoint, count: usize) {
        let mut rx = self.call_count.subscribe();
        let _ = rx.wait_for(|_| self.calls_to(endpoint) >= count).await;
    }

    fn enter(&self, call: GatewayCall) -> InFlightGuard<'_> {
        let endpoint = call.endpoint();
        {
            let mut counts = self.counts();
            let count = counts.entry(endpoint).or_default();
            count.current += 1;
            count.max = count.max.max(count.current);
        }
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
        self.call_count.send_modify(|count| *count += 1);
        InFlightGuard {
            gateway: self,
            endpoint,
        }
    }

    async fn resolve<T>(step: Step<T>) -> GatewayResult<T> {
        match step {
            Step::Ready(result) => result,
            Step::Held(rx) => rx.await.unwrap_or_else(|_| {
                Err(GatewayError::Transport("held response dropped".into()))
            }),
        }
    }
}

#[async_trait]
impl BackendGateway for ScriptedGateway {
    async fn fetch_project_status(
        &self,
        project_id: &ProjectId,
    ) -> GatewayResult<ProjectStatusResponse> {
        let _guard = self.enter(GatewayCall::ProjectStatus(project_id.clone()));
        let step = self.scripts().project_status.next(Endpoint::ProjectStatus);
        Self::resolve(step).await
    }

    async fn fetch_project_preview(
        &self,
        project_id: &ProjectId,
    ) -> GatewayResult<Vec<ReviewAsset>> {
        let _guard =
            self.enter(GatewayCall::ProjectPreview(project_id.clone()));
        let step = self.scripts().preview.next(Endpoint::ProjectPreview);
        Self::resolve(step).await
    }

    async fn start_generation(
        &self,
        request: &GenerationStartRequest,
    ) -> GatewayResult<JobId> {
        let _guard = self.enter(GatewayCall::StartGeneration(request.clone()));
        let step =
            self.scripts().start_generation.next(Endpoint::StartGeneration);
        Self::resolve(step).await
    }

    async fn fetch_job_status(
        &self,
        job_id: &JobId,
    ) -> GatewayResult<JobStatusResponse> {
        let _guard = self.enter(GatewayCall::JobStatus(job_id.clone()));
        let step = self.scripts().job_status.next(Endpoint::JobStatus);
        Self::resolve(step).await
    }

    async fn fetch_job_results(
        &self,
        job_id: &JobId,
    ) -> GatewayResult<GeneratedAssets> {
        let _guard = self.enter(GatewayCall::JobResults(job_id.clone()));
        let step = self.scripts().job_results.next(Endpoint::JobResults);
        Self::resolve(step).await
    }

    async fn fetch_formats(&self) -> GatewayResult<FormatCatalog> {
        let _guard = self.enter(GatewayCall::Formats);
        let step = self.scripts().formats.next(Endpoint::Formats);
        Self::resolve(step).await
    }

    async fn upload_project(
        &self,
        name: &str,
        files: Vec<UploadFile>,
    ) -> GatewayResult<ProjectId> {
        let _guard = self.enter(GatewayCall::Upload {
            name: name.to_string(),
            files: files.into_iter().map(|file| file.file_name).collect(),
        });
        let step = self.scripts().upload.next(Endpoint::Upload);
        Self::resolve(step).await
    }

    async fn download_assets(
        &self,
        request: &DownloadRequest,
    ) -> GatewayResult<DownloadedArchive> {
        let _guard = self.enter(GatewayCall::Download(request.clone()));
        let step = self.scripts().download.next(Endpoint::Download);
        Self::resolve(step).await
    }
}
