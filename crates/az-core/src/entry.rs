use std::fmt;
use std::sync::Arc;
use crate::error::{CoreError, Result};

/// One uploaded file of an analysis batch.
///
/// The relative path is the entry's identity inside the batch: it is what mask
/// lookup matches against and what the service receives in `input_paths`.
/// Payloads are shared, so snapshotting a batch for resubmission is cheap.
#[derive(Clone, PartialEq, Eq)]
pub struct InputEntry {
    relative_path: String,
    mime_type: String,
    payload: Arc<[u8]>,
}

impl InputEntry {
    /// Checks the required fields once, at ingestion.
    pub fn new(
        relative_path: impl Into<String>,
        mime_type: impl Into<String>,
        payload: impl Into<Arc<[u8]>>,
    ) -> Result<Self> {
        let relative_path = relative_path.into();
        let mime_type = mime_type.into();

        if relative_path.is_empty() {
            return Err(CoreError::InvalidEntry("entry has an empty relative path".into()));
        }
        if mime_type.is_empty() {
            return Err(CoreError::InvalidEntry(format!(
                "entry '{}' has no MIME type",
                relative_path
            )));
        }

        Ok(Self {
            relative_path,
            mime_type,
            payload: payload.into(),
        })
    }

    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub(crate) fn shared_payload(&self) -> Arc<[u8]> {
        Arc::clone(&self.payload)
    }

    /// Last path component, used as the multipart file name.
    pub fn file_name(&self) -> &str {
        self.relative_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.relative_path)
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

impl fmt::Debug for InputEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputEntry")
            .field("relative_path", &self.relative_path)
            .field("mime_type", &self.mime_type)
            .field("len", &self.payload.len())
            .finish()
    }
}

/// One file of a user supplied model, either the whole model or a member of a
/// SavedModel directory.
#[derive(Clone, PartialEq, Eq)]
pub struct ModelFileEntry {
    relative_path: String,
    payload: Arc<[u8]>,
}

impl ModelFileEntry {
    pub fn new(relative_path: impl Into<String>, payload: impl Into<Arc<[u8]>>) -> Result<Self> {
        let relative_path = relative_path.into();
        if relative_path.is_empty() {
            return Err(CoreError::InvalidEntry("model file has an empty relative path".into()));
        }

        Ok(Self {
            relative_path,
            payload: payload.into(),
        })
    }

    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub(crate) fn shared_payload(&self) -> Arc<[u8]> {
        Arc::clone(&self.payload)
    }

    pub fn file_name(&self) -> &str {
        self.relative_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.relative_path)
    }

    /// Lowercased text after the last dot of the file name, empty when there is none.
    pub fn extension(&self) -> String {
        let name = self.file_name();
        match name.rfind('.') {
            Some(pos) if pos > 0 => name[pos + 1..].to_ascii_lowercase(),
            _ => String::new(),
        }
    }
}

impl fmt::Debug for ModelFileEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelFileEntry")
            .field("relative_path", &self.relative_path)
            .field("len", &self.payload.len())
            .finish()
    }
}
