use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reframe_model::{
    DownloadRequest, ErrorBody, FormatCatalog, GeneratedAssets,
    GenerationStartRequest, GenerationStartResponse, JobId, JobStatusResponse,
    ProjectId, ProjectStatusResponse, ProjectUploadResponse, ReviewAsset,
};
use reqwest::{Client, RequestBuilder, Response, StatusCode, header, multipart};
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{
    BackendGateway, DownloadedArchive, GatewayError, GatewayResult, UploadFile,
};

/// Backend routes relative to the API prefix. Ids are opaque and always
/// percent-encoded into their path segment.
pub(crate) mod routes {
    use urlencoding::encode;

    pub const FORMATS: &str = "/formats";
    pub const GENERATE: &str = "/generate";
    pub const DOWNLOAD: &str = "/generate/download";
    pub const UPLOAD: &str = "/projects/upload";

    pub fn project_status(id: &str) -> String {
        format!("/projects/{}/status", encode(id))
    }

    pub fn project_preview(id: &str) -> String {
        format!("/projects/{}/preview", encode(id))
    }

    pub fn job_status(id: &str) -> String {
        format!("/generate/{}/status", encode(id))
    }

    pub fn job_results(id: &str) -> String {
        format!("/generate/{}/results", encode(id))
    }
}

const DEFAULT_ARCHIVE_NAME: &str = "reframe-assets.zip";

/// Connection settings for [`HttpGateway`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpGatewayConfig {
    pub base_url: String,
    pub api_prefix: String,
    pub access_token: Option<String>,
    pub request_timeout: Duration,
}

impl Default for HttpGatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            api_prefix: "/api/v1".to_string(),
            access_token: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// [`BackendGateway`] speaking JSON over HTTP with bearer authentication.
#[derive(Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: String,
    api_prefix: String,
    request_timeout: Duration,
    token_store: Arc<RwLock<Option<String>>>,
}

impl std::fmt::Debug for HttpGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGateway")
            .field("base_url", &self.base_url)
            .field("api_prefix", &self.api_prefix)
            .field(
                "has_token",
                &self
                    .token_store
                    .try_read()
                    .map(|t| t.is_some())
                    .unwrap_or(false),
            )
            .finish()
    }
}

/// Add `http://` when the scheme is missing and drop trailing slashes, so
/// `localhost:8000/` and `http://localhost:8000` address the same backend.
pub fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

fn normalize_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

impl HttpGateway {
    pub fn new(config: HttpGatewayConfig) -> GatewayResult<Self> {
        let base_url = normalize_base_url(&config.base_url);
        if base_url != config.base_url {
            warn!(
                from = %config.base_url,
                to = %base_url,
                "normalized backend base URL"
            );
        }
        url::Url::parse(&base_url).map_err(|err| {
            GatewayError::InvalidRequest(format!(
                "invalid base URL '{base_url}': {err}"
            ))
        })?;

        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        info!(base_url = %base_url, "created backend gateway");

        Ok(Self {
            client,
            base_url,
            api_prefix: normalize_prefix(&config.api_prefix),
            request_timeout: config.request_timeout,
            token_store: Arc::new(RwLock::new(config.access_token)),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build a versioned API URL
    pub fn build_url(&self, path: impl AsRef<str>) -> String {
        let path = path.as_ref();
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!(
            "{}{}/{}",
            self.base_url,
            self.api_prefix,
            path.trim_start_matches('/')
        )
    }

    pub async fn set_token(&self, token: Option<String>) {
        *self.token_store.write().await = token;
    }

    async fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.token_store.read().await.as_deref() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn map_send_error(&self, err: reqwest::Error) -> GatewayError {
        if err.is_timeout() {
            GatewayError::Timeout(self.request_timeout)
        } else {
            err.into()
        }
    }

    /// Send the request and hand back the response if the status is a
    /// success; any other status becomes a [`GatewayError`].
    async fn send(&self, request: RequestBuilder) -> GatewayResult<Response> {
        let request = self.authorize(request).await;
        let response = request
            .send()
            .await
            .map_err(|err| self.map_send_error(err))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(GatewayError::Unauthorized);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .ok()
            .and_then(|body| body.message().map(str::to_string))
            .filter(|message| !message.is_empty())
            .or_else(|| (!text.trim().is_empty()).then(|| text.trim().to_string()))
            .unwrap_or_else(|| {
                format!("request failed with status {}", status.as_u16())
            });

        debug!(status = status.as_u16(), %message, "backend rejected request");
        Err(GatewayError::Status {
            status: status.as_u16(),
            message,
        })
    }

    /// Decode a JSON body. A `204 No Content` reads as JSON `null`, so it
    /// succeeds for unit and `Option` targets and is a decode error for
    /// anything that needs fields.
    async fn execute_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> GatewayResult<T> {
        let response = self.send(request).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return serde_json::from_value(serde_json::Value::Null).map_err(|err| {
                GatewayError::Decode(format!(
                    "empty response from server (204 No Content): {err}"
                ))
            });
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|err| self.map_send_error(err))?;
        serde_json::from_slice(&bytes)
            .map_err(|err| GatewayError::Decode(err.to_string()))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> GatewayResult<T> {
        let url = self.build_url(path);
        debug!(%url, "GET");
        self.execute_json(self.client.get(&url)).await
    }
}

/// Pull the archive name out of a `Content-Disposition` header, preferring
/// the RFC 5987 `filename*` form when present.
pub(crate) fn attachment_filename(value: &str) -> Option<String> {
    let mut plain = None;
    for param in value.split(';').map(str::trim) {
        let Some((key, raw)) = param.split_once('=') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                let encoded = raw.trim().trim_matches('"');
                let name = encoded
                    .split_once("''")
                    .map(|(_, name)| name)
                    .unwrap_or(encoded);
                if let Ok(decoded) = urlencoding::decode(name)
                    && !decoded.is_empty()
                {
                    return Some(decoded.into_owned());
                }
            }
            "filename" => {
                let name = raw.trim().trim_matches('"');
                if !name.is_empty() {
                    plain = Some(name.to_string());
                }
            }
            _ => {}
        }
    }
    plain
}

#[async_trait]
impl BackendGateway for HttpGateway {
    async fn fetch_project_status(
        &self,
        project_id: &ProjectId,
    ) -> GatewayResult<ProjectStatusResponse> {
        self.get(&routes::project_status(project_id.as_str())).await
    }

    async fn fetch_project_preview(
        &self,
        project_id: &ProjectId,
    ) -> GatewayResult<Vec<ReviewAsset>> {
        self.get(&routes::project_preview(project_id.as_str())).await
    }

    async fn start_generation(
        &self,
        request: &GenerationStartRequest,
    ) -> GatewayResult<JobId> {
        let url = self.build_url(routes::GENERATE);
        debug!(%url, project_id = %request.project_id, "POST generation");
        let response: GenerationStartResponse = self
            .execute_json(self.client.post(&url).json(request))
            .await?;
        Ok(response.job_id)
    }

    async fn fetch_job_status(
        &self,
        job_id: &JobId,
    ) -> GatewayResult<JobStatusResponse> {
        self.get(&routes::job_status(job_id.as_str())).await
    }

    async fn fetch_job_results(
        &self,
        job_id: &JobId,
    ) -> GatewayResult<GeneratedAssets> {
        self.get(&routes::job_results(job_id.as_str())).await
    }

    async fn fetch_formats(&self) -> GatewayResult<FormatCatalog> {
        self.get(routes::FORMATS).await
    }

    async fn upload_project(
        &self,
        name: &str,
        files: Vec<UploadFile>,
    ) -> GatewayResult<ProjectId> {
        let mut form =
            multipart::Form::new().text("projectName", name.to_string());
        for file in files {
            let mut part =
                multipart::Part::bytes(file.bytes).file_name(file.file_name);
            if let Some(content_type) = file.content_type {
                part = part.mime_str(&content_type)?;
            }
            form = form.part("files", part);
        }

        let url = self.build_url(routes::UPLOAD);
        debug!(%url, project_name = name, "POST upload");
        let response: ProjectUploadResponse = self
            .execute_json(self.client.post(&url).multipart(form))
            .await?;
        Ok(response.project_id)
    }

    async fn download_assets(
        &self,
        request: &DownloadRequest,
    ) -> GatewayResult<DownloadedArchive> {
        let url = self.build_url(routes::DOWNLOAD);
        debug!(%url, assets = request.asset_ids.len(), "POST download");
        let response = self.send(self.client.post(&url).json(request)).await?;

        let filename = response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .and_then(attachment_filename)
            .unwrap_or_else(|| DEFAULT_ARCHIVE_NAME.to_string());
        let bytes = response
            .bytes()
            .await
            .map_err(|err| self.map_send_error(err))?;

        Ok(DownloadedArchive {
            filename,
            bytes: bytes.to_vec(),
        })
    }
}
