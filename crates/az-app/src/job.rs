use std::fmt;
use az_core::SubmissionBody;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Client side lifecycle of one submission.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Idle,
    Submitting,
    Rejected,
    Accepted,
    Polling,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Submitting | Self::Accepted | Self::Polling)
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// State label reported by the status endpoint. The label set belongs to the
/// service; anything unknown counts as still running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerState {
    Pending,
    Started,
    Success,
    Failure,
    Other(String),
}

impl ServerState {
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "pending" => Self::Pending,
            "started" => Self::Started,
            "success" => Self::Success,
            "failure" => Self::Failure,
            _ => Self::Other(label.trim().to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Started => f.write_str("started"),
            Self::Success => f.write_str("success"),
            Self::Failure => f.write_str("failure"),
            Self::Other(label) => f.write_str(label),
        }
    }
}

#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Credentials {
    pub fn is_set(&self) -> bool {
        self.username.is_some()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Everything needed to (re)issue one analysis request, frozen when the form
/// is submitted.
#[derive(Debug, Clone)]
pub struct JobSubmission {
    pub id: Uuid,
    pub body: SubmissionBody,
    pub credentials: Credentials,
}

impl JobSubmission {
    pub fn new(body: SubmissionBody, credentials: Credentials) -> Self {
        Self {
            id: Uuid::new_v4(),
            body,
            credentials,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_state_labels() {
        assert_eq!(ServerState::parse("PENDING"), ServerState::Pending);
        assert_eq!(ServerState::parse("started"), ServerState::Started);
        assert_eq!(ServerState::parse("Success"), ServerState::Success);
        assert_eq!(ServerState::parse("FAILURE"), ServerState::Failure);
        assert_eq!(ServerState::parse("RETRY"), ServerState::Other("RETRY".into()));
        assert!(!ServerState::parse("RETRY").is_terminal());
    }

    #[test]
    fn test_job_state_groups() {
        assert!(JobState::Polling.is_active());
        assert!(!JobState::Idle.is_active());
        assert!(JobState::Failed.is_complete());
        assert!(!JobState::Rejected.is_complete());
    }

    #[test]
    fn test_password_not_printed() {
        let creds = Credentials {
            username: Some("user".into()),
            password: Some("secret".into()),
        };
        assert!(!format!("{:?}", creds).contains("secret"));
    }
}
