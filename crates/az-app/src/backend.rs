pub mod schemas;

use async_trait::async_trait;
use az_core::{FieldValue, SubmissionBody};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Url};
use tracing::{debug, trace};
use crate::error::AppError;
use crate::job::{Credentials, JobSubmission};

pub const ANALYSIS_ENDPOINT: &str = "/analysis/";
pub const MODELS_ENDPOINT: &str = "/analysis/models";

/// Status, content type and raw body of one HTTP exchange. Interpreting the
/// status is the poller's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_json(&self) -> bool {
        self.content_type.as_deref().is_some_and(|ct| ct.contains("json"))
    }
}

/// The two requests the client ever makes. Only transport failures are errors
/// here; any status code the service answers with comes back as a reply.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    async fn submit(&self, job: &JobSubmission) -> Result<HttpReply, AppError>;

    /// GET `endpoint`, either absolute or relative to the server root.
    async fn fetch(&self, endpoint: &str, credentials: &Credentials) -> Result<HttpReply, AppError>;
}

pub struct HttpBackend {
    client: Client,
    base_url: Url,
}

impl HttpBackend {
    pub fn new(server_url: &str) -> Result<Self, AppError> {
        let base_url = Url::parse(server_url)
            .map_err(|e| AppError::Input(format!("Invalid server url '{}': {}", server_url, e)))?;

        Ok(Self {
            client: Client::new(),
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> Result<Url, AppError> {
        self.base_url
            .join(endpoint)
            .map_err(|e| AppError::Input(format!("Invalid endpoint '{}': {}", endpoint, e)))
    }

    async fn send(request: RequestBuilder, credentials: &Credentials) -> Result<HttpReply, AppError> {
        let request = match &credentials.username {
            Some(username) => request.basic_auth(username, credentials.password.as_ref()),
            None => request,
        };

        let response = request.send().await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?.to_vec();

        trace!("HTTP {} ({} bytes, {:?})", status, body.len(), content_type);

        Ok(HttpReply {
            status,
            content_type,
            body,
        })
    }
}

#[async_trait]
impl AnalysisBackend for HttpBackend {
    async fn submit(&self, job: &JobSubmission) -> Result<HttpReply, AppError> {
        let url = self.url(ANALYSIS_ENDPOINT)?;
        debug!("[{}] POST {} with {} images", job.id, url, job.body.image_count());

        let form = to_multipart(&job.body)?;
        Self::send(self.client.post(url).multipart(form), &job.credentials).await
    }

    async fn fetch(&self, endpoint: &str, credentials: &Credentials) -> Result<HttpReply, AppError> {
        let url = self.url(endpoint)?;
        trace!("GET {}", url);

        Self::send(self.client.get(url), credentials).await
    }
}

/// Rebuilt for every send, since a reqwest form is consumed by the request.
fn to_multipart(body: &SubmissionBody) -> Result<Form, AppError> {
    let mut form = Form::new();

    for field in body.fields() {
        form = match &field.value {
            FieldValue::Text(text) => form.text(field.name, text.clone()),
            FieldValue::File { file_name, mime_type, data } => {
                let part = Part::bytes(data.to_vec())
                    .file_name(file_name.clone())
                    .mime_str(mime_type)
                    .map_err(|e| AppError::Input(format!("Invalid MIME type '{}': {}", mime_type, e)))?;
                form.part(field.name, part)
            }
        };
    }

    Ok(form)
}
