use std::sync::Arc;
use log::info;
use crate::archive::write_archive;
use crate::error::Result;
use crate::model_bundle::ModelBundle;

/// File name given to a zipped SavedModel directory.
pub const PACKAGED_MODEL_NAME: &str = "saved_model.zip";

/// A model ready to be sent as the single `custom_model` form field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelUpload {
    pub file_name: String,
    pub mime_type: String,
    pub payload: Arc<[u8]>,
}

/// Single files pass through untouched; a SavedModel directory becomes one zip
/// whose member names are the normalized relative paths, so the service can
/// unpack the original layout.
pub fn package(bundle: &ModelBundle) -> Result<ModelUpload> {
    match bundle {
        ModelBundle::SingleFile { file_name, payload, .. } => Ok(ModelUpload {
            file_name: file_name.clone(),
            mime_type: "application/octet-stream".into(),
            payload: Arc::clone(payload),
        }),
        ModelBundle::DirectoryBundle { entries } => {
            let bytes = write_archive(entries.iter().map(|(path, data)| (path.as_str(), &data[..])))?;
            info!("Packaged {} model files into {} ({} bytes)", entries.len(), PACKAGED_MODEL_NAME, bytes.len());

            Ok(ModelUpload {
                file_name: PACKAGED_MODEL_NAME.into(),
                mime_type: "application/zip".into(),
                payload: bytes.into(),
            })
        }
    }
}
