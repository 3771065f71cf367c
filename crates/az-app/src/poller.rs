use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use az_core::{AnalysisResult, ResultSet};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};
use uuid::Uuid;
use crate::backend::schemas::{self, Envelope, JobAccepted, JobStatusResponse, Listing};
use crate::backend::{AnalysisBackend, HttpReply};
use crate::cancel::CancelToken;
use crate::error::AppError;
use crate::events::JobEvent;
use crate::job::{JobState, JobSubmission, ServerState};

pub const DEFAULT_MAX_RESUBMISSIONS: u32 = 3;

/// Where and how often to poll one accepted job.
#[derive(Debug, Clone, PartialEq)]
pub struct PollingSession {
    pub endpoint: String,
    pub interval: Duration,
    pub last_status: Option<ServerState>,
}

impl PollingSession {
    pub fn new(accepted: JobAccepted) -> Self {
        Self {
            endpoint: accepted.polling_endpoint,
            // Negative, NaN or absurd intervals poll immediately.
            interval: Duration::try_from_secs_f64(accepted.polling_interval).unwrap_or(Duration::ZERO),
            last_status: None,
        }
    }

    /// Records `status` and tells whether it is the pending-after-started
    /// regression that calls for a fresh submission.
    pub fn observe(&mut self, status: &ServerState) -> bool {
        let regressed = *status == ServerState::Pending && self.last_status == Some(ServerState::Started);
        self.last_status = if status.is_terminal() { None } else { Some(status.clone()) };
        regressed
    }
}

enum Step {
    Done(ResultSet),
    Resubmit,
}

/// Runs analysis jobs: submits, follows the polling endpoint and hands back
/// the results. One job at a time.
pub struct JobPoller {
    backend: Arc<dyn AnalysisBackend>,
    max_resubmissions: u32,
    in_flight: AtomicBool,
    events: Option<UnboundedSender<JobEvent>>,
}

impl JobPoller {
    pub fn new(backend: Arc<dyn AnalysisBackend>) -> Self {
        Self {
            backend,
            max_resubmissions: DEFAULT_MAX_RESUBMISSIONS,
            in_flight: AtomicBool::new(false),
            events: None,
        }
    }

    pub fn with_max_resubmissions(mut self, max_resubmissions: u32) -> Self {
        self.max_resubmissions = max_resubmissions;
        self
    }

    pub fn with_events(mut self, events: UnboundedSender<JobEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub async fn run(&self, job: &JobSubmission, cancel: &CancelToken) -> Result<ResultSet, AppError> {
        let _guard = InFlightGuard::acquire(&self.in_flight)?;

        let outcome = self.drive(job, cancel).await;
        match &outcome {
            Ok(results) => {
                info!("[{}] Job finished with {} results", job.id, results.len());
                self.transition(job.id, JobState::Succeeded);
            }
            Err(e) => {
                warn!("[{}] Job failed: {}", job.id, e);
                self.transition(job.id, JobState::Failed);
            }
        }
        outcome
    }

    async fn drive(&self, job: &JobSubmission, cancel: &CancelToken) -> Result<ResultSet, AppError> {
        let mut resubmissions = 0;

        loop {
            self.transition(job.id, JobState::Submitting);
            let reply = cancel.run(self.backend.submit(job)).await??;

            let session = match reply.status {
                202 => {
                    self.transition(job.id, JobState::Accepted);
                    let accepted: Envelope<JobAccepted> = parse_json(&reply)?;
                    PollingSession::new(accepted.data)
                }
                200..=299 => return synchronous_results(job, &reply),
                _ => {
                    self.transition(job.id, JobState::Rejected);
                    return Err(rejection(&reply));
                }
            };

            info!(
                "[{}] Job accepted, polling {} every {:?}",
                job.id, session.endpoint, session.interval
            );
            self.transition(job.id, JobState::Polling);

            match self.poll(job, session, cancel).await? {
                Step::Done(results) => return Ok(results),
                Step::Resubmit if resubmissions < self.max_resubmissions => {
                    resubmissions += 1;
                    warn!(
                        "[{}] Job went back to pending after starting, resubmitting ({}/{})",
                        job.id, resubmissions, self.max_resubmissions
                    );
                    self.emit(JobEvent::Resubmitting {
                        job_id: job.id,
                        attempt: resubmissions,
                    });
                }
                Step::Resubmit => {
                    return Err(AppError::server(
                        None,
                        format!(
                            "job went back to pending after starting {} times",
                            resubmissions + 1
                        ),
                    ));
                }
            }
        }
    }

    async fn poll(&self, job: &JobSubmission, mut session: PollingSession, cancel: &CancelToken) -> Result<Step, AppError> {
        loop {
            cancel.run(tokio::time::sleep(session.interval)).await?;
            let reply = cancel
                .run(self.backend.fetch(&session.endpoint, &job.credentials))
                .await??;

            if !reply.is_success() {
                return Err(AppError::server(
                    Some(reply.status),
                    schemas::error_message(&reply.body).unwrap_or_else(|| "polling failed".into()),
                ));
            }

            let status: Envelope<JobStatusResponse> = parse_json(&reply)?;
            let status = status.data;
            let state = ServerState::parse(&status.state);
            debug!("[{}] Job state: {}", job.id, state);
            self.emit(JobEvent::Polled {
                job_id: job.id,
                status: state.clone(),
            });

            if session.observe(&state) {
                return Ok(Step::Resubmit);
            }

            match state {
                ServerState::Success => {
                    return Ok(Step::Done(ResultSet::new(
                        status.results.unwrap_or_default(),
                        status.metrics.unwrap_or_default(),
                        job.body.result_block_size(),
                    )));
                }
                ServerState::Failure => {
                    return Err(AppError::server(None, status.error.unwrap_or_else(|| state.to_string())));
                }
                _ => {}
            }
        }
    }

    fn transition(&self, job_id: Uuid, state: JobState) {
        debug!("[{}] -> {:?}", job_id, state);
        self.emit(JobEvent::StateChanged { job_id, state });
    }

    fn emit(&self, event: JobEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, AppError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| AppError::SubmissionInFlight)?;
        Ok(Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub(crate) fn parse_json<T: DeserializeOwned>(reply: &HttpReply) -> Result<T, AppError> {
    serde_json::from_slice(&reply.body).map_err(|e| {
        AppError::server(Some(reply.status), format!("Malformed response body: {}", e))
    })
}

fn rejection(reply: &HttpReply) -> AppError {
    match reply.status {
        400 => AppError::Validation(schemas::field_errors(&reply.body)),
        403 => AppError::Auth(
            schemas::error_message(&reply.body).unwrap_or_else(|| "Invalid username or password".into()),
        ),
        status => AppError::server(
            Some(status),
            schemas::error_message(&reply.body).unwrap_or_else(|| "request failed".into()),
        ),
    }
}

/// A deployment answering the POST directly: a JSON result list or a zip of
/// the output images.
fn synchronous_results(job: &JobSubmission, reply: &HttpReply) -> Result<ResultSet, AppError> {
    let results = if reply.is_json() {
        parse_json::<Listing<AnalysisResult>>(reply)?.into_items()
    } else {
        az_core::read_archive(&reply.body)
            .map_err(|e| AppError::server(Some(reply.status), format!("Malformed result archive: {}", e)))?
            .into_iter()
            .map(|(filename, payload)| AnalysisResult { filename, payload })
            .collect()
    };

    info!("[{}] Synchronous reply with {} results", job.id, results.len());
    Ok(ResultSet::new(results, Vec::new(), job.body.result_block_size()))
}
