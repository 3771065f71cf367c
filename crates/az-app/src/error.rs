use az_core::error::describe_fields;
use az_core::{BundleError, CoreError, FieldErrors};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// Nothing to submit, or no model chosen. Never reaches the network.
    #[error("{0}")]
    Input(String),

    #[error("Invalid model upload: {0}")]
    Bundle(#[from] BundleError),

    /// Field-level rejection, either from the service (400) or from the local
    /// pre-flight check.
    #[error("Validation failed: {}", describe_fields(.0))]
    Validation(FieldErrors),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Error from backend ({}): {message}", status_label(.status))]
    Server { status: Option<u16>, message: String },

    #[error("A submission is already in flight")]
    SubmissionInFlight,

    #[error("Job cancelled")]
    Cancelled,

    #[error("{0}")]
    Core(CoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    pub fn server(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Server { status, message: message.into() }
    }

    /// Whether the error was produced locally, before anything was sent.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Input(_) | Self::Bundle(_) | Self::Core(_) | Self::Io(_) | Self::SubmissionInFlight)
    }
}

impl From<CoreError> for AppError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Input(msg) => Self::Input(msg),
            CoreError::Bundle(e) => Self::Bundle(e),
            CoreError::InvalidForm(fields) => Self::Validation(fields),
            other => Self::Core(other),
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

fn status_label(status: &Option<u16>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "job".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_map_onto_taxonomy() {
        assert!(matches!(AppError::from(CoreError::Input("x".into())), AppError::Input(_)));
        assert!(matches!(
            AppError::from(CoreError::Bundle(BundleError::MissingManifest)),
            AppError::Bundle(BundleError::MissingManifest)
        ));
        assert!(matches!(
            AppError::from(CoreError::InvalidForm(FieldErrors::new())),
            AppError::Validation(_)
        ));
    }

    #[test]
    fn test_validation_message_matches_core_form_error() {
        let mut fields = FieldErrors::new();
        fields.insert("masks".into(), vec!["Not a valid image.".into()]);

        assert_eq!(
            AppError::Validation(fields.clone()).to_string(),
            "Validation failed: masks: Not a valid image."
        );
        assert_eq!(CoreError::InvalidForm(fields).to_string(), "Invalid form: masks: Not a valid image.");
    }

    #[test]
    fn test_server_message() {
        assert_eq!(
            AppError::server(Some(500), "Internal Server Error").to_string(),
            "Error from backend (500): Internal Server Error"
        );
        assert_eq!(AppError::server(None, "boom").to_string(), "Error from backend (job): boom");
    }
}
