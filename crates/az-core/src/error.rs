use std::collections::BTreeMap;
use thiserror::Error;

/// Field name -> human readable messages, the shape the analysis service uses for
/// request validation failures.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("{0}")]
    Input(String),

    #[error("Invalid entry: {0}")]
    InvalidEntry(String),

    #[error("Invalid model bundle: {0}")]
    Bundle(#[from] BundleError),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Result index {index} out of range ({len} results)")]
    SelectionOutOfRange { index: usize, len: usize },

    #[error("Invalid form: {}", describe_fields(.0))]
    InvalidForm(FieldErrors),
}

/// Reasons an uploaded model is rejected before anything is sent to the service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BundleError {
    #[error("no model files selected")]
    Empty,

    #[error("unsupported model file extension '{0}'")]
    UnsupportedExtension(String),

    #[error("model directory has no saved_model.pb at its root")]
    MissingManifest,

    #[error("model directory has no variables/*.index file")]
    MissingVariablesIndex,

    #[error("model directory has no variables/*.data-NNNNN-of-NNNNN shard")]
    MissingVariablesData,

    #[error("model file '{0}' has no path below its top-level folder")]
    EmptyPath(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// One `field: messages` clause per field, joined by `; `.
pub fn describe_fields(fields: &FieldErrors) -> String {
    fields
        .iter()
        .map(|(field, messages)| format!("{}: {}", field, messages.join(" ")))
        .collect::<Vec<_>>()
        .join("; ")
}
