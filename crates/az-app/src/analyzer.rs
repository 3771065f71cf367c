use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use az_core::model_bundle;
use az_core::output_path::resolve_output_path;
use az_core::{bundler, packager, submission};
use az_core::{AssociatedBatch, ModelSelection, ResultSet};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};
use crate::backend::schemas::{self, Listing};
use crate::backend::{AnalysisBackend, HttpBackend, ANALYSIS_ENDPOINT, MODELS_ENDPOINT};
use crate::cancel::CancelToken;
use crate::config::ClientConfig;
use crate::error::AppError;
use crate::events::JobEvent;
use crate::ingest;
use crate::job::JobSubmission;
use crate::poller::{parse_json, JobPoller};

pub struct Analyzer {
    backend: Arc<dyn AnalysisBackend>,
    poller: JobPoller,
    config: ClientConfig,
}

impl Analyzer {
    pub fn new(config: ClientConfig, events: Option<UnboundedSender<JobEvent>>) -> Result<Self, AppError> {
        let backend = HttpBackend::new(&config.server_url)?;
        info!("Using analysis service at {}", backend.base_url());

        Ok(Self::with_backend(Arc::new(backend), config, events))
    }

    pub fn with_backend(
        backend: Arc<dyn AnalysisBackend>,
        config: ClientConfig,
        events: Option<UnboundedSender<JobEvent>>,
    ) -> Self {
        let mut poller = JobPoller::new(backend.clone()).with_max_resubmissions(config.max_resubmissions);
        if let Some(events) = events {
            poller = poller.with_events(events);
        }

        Self {
            backend,
            poller,
            config,
        }
    }

    /// Preset pipelines offered by the service.
    pub async fn list_models(&self) -> Result<Vec<String>, AppError> {
        let mut reply = self.backend.fetch(MODELS_ENDPOINT, &self.config.credentials).await?;
        if matches!(reply.status, 404 | 405) {
            debug!("{} answered {}, trying {}", MODELS_ENDPOINT, reply.status, ANALYSIS_ENDPOINT);
            reply = self.backend.fetch(ANALYSIS_ENDPOINT, &self.config.credentials).await?;
        }

        match reply.status {
            200..=299 => Ok(parse_json::<Listing<String>>(&reply)?.into_items()),
            403 => Err(AppError::Auth(
                schemas::error_message(&reply.body).unwrap_or_else(|| "Invalid username or password".into()),
            )),
            status => Err(AppError::server(
                Some(status),
                schemas::error_message(&reply.body).unwrap_or_else(|| "could not list models".into()),
            )),
        }
    }

    /// The uploaded model when one is configured, the preset pipeline otherwise.
    pub async fn select_model(&self) -> Result<ModelSelection, AppError> {
        if let Some(path) = &self.config.custom_model {
            let files = blocking({
                let path = path.clone();
                move || ingest::read_model_files(&path)
            })
            .await?;

            let bundle = model_bundle::validate(&files, &self.config.model_extensions)?;
            let upload = packager::package(&bundle)?;
            info!("Custom model {} ({} bytes)", upload.file_name, upload.payload.len());

            return Ok(ModelSelection::Custom(self.config.custom_model(upload)));
        }

        match &self.config.pipeline {
            Some(pipeline) => Ok(ModelSelection::Preset(pipeline.clone())),
            None => Err(AppError::Input("Please select a model".into())),
        }
    }

    /// Reads the input directory, pairs masks and runs one job to completion.
    pub async fn analyze(&self, cancel: &CancelToken) -> Result<ResultSet, AppError> {
        let dir = self
            .config
            .input_dir
            .clone()
            .ok_or_else(|| AppError::Input("Please select a file or folder to upload".into()))?;

        let entries = blocking(move || ingest::read_input_dir(&dir)).await?;
        let mut batch = AssociatedBatch::new();
        let accepted = batch.associate(&entries, &self.config.association);
        info!("{} images selected, {} with masks", accepted, batch.mask_count());

        let form = self.config.form(self.select_model().await?);
        let body = submission::build_from_batch(&batch, &form)?;

        for image in batch.images() {
            debug!(
                "{} -> {}",
                image.relative_path(),
                resolve_output_path(image.relative_path(), &form.predictions_output_path)
            );
        }

        if !self.config.credentials.is_set() {
            warn!("No credentials configured, the service may refuse the request");
        }

        let job = JobSubmission::new(body, self.config.credentials.clone());
        info!("[{}] Submitting {} images", job.id, job.body.image_count());
        self.poller.run(&job, cancel).await
    }

    /// Writes every result and the metrics report into the configured archive.
    pub async fn write_results(&self, results: &ResultSet) -> Result<PathBuf, AppError> {
        self.write_selected(results, &(0..results.len()).collect()).await
    }

    pub async fn write_selected(&self, results: &ResultSet, selection: &BTreeSet<usize>) -> Result<PathBuf, AppError> {
        let bytes = bundler::bundle_selected(results, selection)?;
        let path = self.config.output_archive.clone();
        tokio::fs::write(&path, &bytes).await?;

        info!("Wrote {} results to {} ({} bytes)", selection.len(), path.display(), bytes.len());
        Ok(path)
    }

    pub fn output_archive(&self) -> &Path {
        &self.config.output_archive
    }
}

async fn blocking<T, F>(work: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| AppError::Io(std::io::Error::other(e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use async_trait::async_trait;
    use az_core::submission::fields;
    use serde_json::json;
    use crate::backend::HttpReply;
    use crate::cancel;
    use crate::job::Credentials;

    /// Answers POSTs with a finished job and GETs from a route table.
    #[derive(Default)]
    struct FakeService {
        routes: HashMap<&'static str, HttpReply>,
        submitted: Mutex<Vec<JobSubmission>>,
    }

    #[async_trait]
    impl AnalysisBackend for FakeService {
        async fn submit(&self, job: &JobSubmission) -> Result<HttpReply, AppError> {
            self.submitted.lock().unwrap().push(job.clone());
            let results: Vec<_> = (0..job.body.image_count() * job.body.result_block_size())
                .map(|i| json!({"filename": format!("out_{}.png", i), "data": "aGVsbG8="}))
                .collect();
            Ok(json_reply(200, json!(results)))
        }

        async fn fetch(&self, endpoint: &str, _credentials: &Credentials) -> Result<HttpReply, AppError> {
            Ok(self
                .routes
                .get(endpoint)
                .cloned()
                .unwrap_or_else(|| json_reply(404, json!({"detail": "Not found."}))))
        }
    }

    fn json_reply(status: u16, body: serde_json::Value) -> HttpReply {
        HttpReply {
            status,
            content_type: Some("application/json".into()),
            body: serde_json::to_vec(&body).unwrap(),
        }
    }

    fn config(vars: &[(&str, String)]) -> ClientConfig {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        ClientConfig::from_lookup(|key| vars.get(key).cloned()).unwrap()
    }

    fn write(root: &Path, relative: &str, data: &[u8]) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, data).unwrap();
    }

    #[tokio::test]
    async fn test_list_models_falls_back_to_analysis_root() {
        let mut service = FakeService::default();
        service.routes.insert(ANALYSIS_ENDPOINT, json_reply(200, json!(["cellpose", "unet"])));
        let analyzer = Analyzer::with_backend(Arc::new(service), config(&[]), None);

        assert_eq!(analyzer.list_models().await.unwrap(), vec!["cellpose", "unet"]);
    }

    #[tokio::test]
    async fn test_list_models_auth_failure() {
        let mut service = FakeService::default();
        service
            .routes
            .insert(MODELS_ENDPOINT, json_reply(403, json!({"detail": "Authentication credentials were not provided."})));
        let analyzer = Analyzer::with_backend(Arc::new(service), config(&[]), None);

        assert!(matches!(analyzer.list_models().await, Err(AppError::Auth(_))));
    }

    #[tokio::test]
    async fn test_missing_model_is_input_error() {
        let analyzer = Analyzer::with_backend(Arc::new(FakeService::default()), config(&[]), None);
        assert!(matches!(analyzer.select_model().await, Err(AppError::Input(_))));
    }

    #[tokio::test]
    async fn test_invalid_model_directory_never_submits() {
        let tmp = tempfile::tempdir().unwrap();
        let model = tmp.path().join("broken_model");
        write(&model, "saved_model.pb", b"pb");
        write(&model, "variables/variables.index", b"idx");
        write(tmp.path(), "Run/Images/a.png", b"a");
        write(tmp.path(), "Run/Mask/a.png", b"m");

        let service = Arc::new(FakeService::default());
        let analyzer = Analyzer::with_backend(
            service.clone(),
            config(&[
                ("AZ_CUSTOM_MODEL", model.display().to_string()),
                ("AZ_INPUT_DIR", tmp.path().join("Run/Images").display().to_string()),
            ]),
            None,
        );

        let err = analyzer.analyze(&cancel::pair().1).await.unwrap_err();
        assert!(matches!(err, AppError::Bundle(az_core::BundleError::MissingVariablesData)));
        assert!(service.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_zipped_model_needs_configured_extension() {
        let tmp = tempfile::tempdir().unwrap();
        let model = tmp.path().join("exported.zip");
        write(tmp.path(), "exported.zip", b"PK");

        let analyzer = Analyzer::with_backend(
            Arc::new(FakeService::default()),
            config(&[("AZ_CUSTOM_MODEL", model.display().to_string())]),
            None,
        );
        assert!(matches!(
            analyzer.select_model().await,
            Err(AppError::Bundle(az_core::BundleError::UnsupportedExtension(ext))) if ext == "zip"
        ));

        let analyzer = Analyzer::with_backend(
            Arc::new(FakeService::default()),
            config(&[
                ("AZ_CUSTOM_MODEL", model.display().to_string()),
                ("AZ_MODEL_EXTENSIONS", "h5,keras,zip".into()),
            ]),
            None,
        );
        match analyzer.select_model().await.unwrap() {
            ModelSelection::Custom(custom) => assert_eq!(custom.upload.file_name, "exported.zip"),
            other => panic!("expected a custom model, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_analyze_end_to_end() {
        let tmp = tempfile::tempdir().unwrap();
        let run = tmp.path().join("Run");
        write(&run, "Cornea/Images/a.png", b"a");
        write(&run, "Cornea/Images/b.png", b"b");
        write(&run, "Mask/a.png", b"ma");
        write(&run, "Mask/b.png", b"mb");

        let service = Arc::new(FakeService::default());
        let analyzer = Analyzer::with_backend(
            service.clone(),
            config(&[
                ("AZ_INPUT_DIR", run.display().to_string()),
                ("AZ_PIPELINE", "cellpose".into()),
                ("AZ_OUTPUT_ARCHIVE", tmp.path().join("out.zip").display().to_string()),
            ]),
            None,
        );

        let results = analyzer.analyze(&cancel::pair().1).await.unwrap();
        assert_eq!(results.len(), 6);

        let submitted = service.submitted.lock().unwrap().clone();
        let paths: Vec<&str> = submitted[0].body.texts(fields::INPUT_PATHS).collect();
        assert_eq!(paths, vec!["Run/Cornea/Images/a.png", "Run/Cornea/Images/b.png"]);
        assert_eq!(submitted[0].body.texts(fields::PIPELINE).collect::<Vec<_>>(), vec!["cellpose"]);

        let path = analyzer.write_results(&results).await.unwrap();
        assert_eq!(path, analyzer.output_archive());
        let members = az_core::read_archive(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(members.len(), 6);
    }
}
