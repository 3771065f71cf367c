//! Validation of user supplied models.
//!
//! A model arrives either as one native file (`.h5`, `.keras`, optionally an
//! archive) or as the files of a TensorFlow SavedModel directory.

use std::collections::BTreeMap;
use std::sync::Arc;
use log::{debug, warn};
use crate::entry::ModelFileEntry;
use crate::error::BundleError;

pub const SAVED_MODEL_MANIFEST: &str = "saved_model.pb";
pub const VARIABLES_DIR: &str = "variables/";

/// Extensions accepted for a single-file model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedExtensions(Vec<String>);

impl AllowedExtensions {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        )
    }

    /// The native Keras formats plus a zipped SavedModel.
    pub fn with_archive() -> Self {
        Self::new(["h5", "keras", "zip"])
    }

    pub fn contains(&self, extension: &str) -> bool {
        self.0.iter().any(|e| e.eq_ignore_ascii_case(extension))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl Default for AllowedExtensions {
    fn default() -> Self {
        Self::new(["h5", "keras"])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelBundle {
    SingleFile {
        file_name: String,
        extension: String,
        payload: Arc<[u8]>,
    },
    /// Normalized relative path -> file contents.
    DirectoryBundle { entries: BTreeMap<String, Arc<[u8]>> },
}

impl ModelBundle {
    pub fn is_directory(&self) -> bool {
        matches!(self, Self::DirectoryBundle { .. })
    }
}

/// Strips the top-level folder a directory selection reports in front of every
/// path, `my_model/variables/variables.index` becoming `variables/variables.index`.
/// Paths without a folder are kept as they are.
pub fn normalize_bundle_path(relative_path: &str) -> &str {
    match relative_path.split_once('/') {
        Some((_, rest)) => rest,
        None => relative_path,
    }
}

/// Whether `name` (relative to `variables/`) is a checkpoint data shard such as
/// `variables.data-00000-of-00001`.
pub fn is_data_shard(name: &str) -> bool {
    let Some((stem, counts)) = name.rsplit_once(".data-") else {
        return false;
    };
    if stem.is_empty() {
        return false;
    }
    let Some((part, total)) = counts.split_once("-of-") else {
        return false;
    };

    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    all_digits(part) && all_digits(total)
}

/// Decides what kind of model the selected files form, without modifying them.
pub fn validate(entries: &[ModelFileEntry], allowed: &AllowedExtensions) -> Result<ModelBundle, BundleError> {
    match entries {
        [] => {
            warn!("Model validation failed: no files");
            Err(BundleError::Empty)
        }
        [single] => {
            let extension = single.extension();
            debug!("Validating single model file {} ({})", single.relative_path(), extension);

            if !allowed.contains(&extension) {
                warn!("Model validation failed: unsupported extension '{}'", extension);
                return Err(BundleError::UnsupportedExtension(extension));
            }

            Ok(ModelBundle::SingleFile {
                file_name: single.file_name().to_string(),
                extension,
                payload: single.shared_payload(),
            })
        }
        many => validate_saved_model(many),
    }
}

fn validate_saved_model(entries: &[ModelFileEntry]) -> Result<ModelBundle, BundleError> {
    let mut normalized = BTreeMap::new();
    let mut has_manifest = false;
    let mut has_index = false;
    let mut has_data = false;

    for entry in entries {
        let path = normalize_bundle_path(entry.relative_path());
        if path.is_empty() {
            return Err(BundleError::EmptyPath(entry.relative_path().to_string()));
        }
        debug!("Model file {} -> {}", entry.relative_path(), path);

        if path == SAVED_MODEL_MANIFEST {
            has_manifest = true;
        } else if let Some(var) = path.strip_prefix(VARIABLES_DIR) {
            if var.ends_with(".index") {
                has_index = true;
            } else if is_data_shard(var) {
                has_data = true;
            }
        }

        normalized.insert(path.to_string(), entry.shared_payload());
    }

    if !has_manifest {
        warn!("Model validation failed: no {}", SAVED_MODEL_MANIFEST);
        return Err(BundleError::MissingManifest);
    }
    if !has_index {
        warn!("Model validation failed: no variables index");
        return Err(BundleError::MissingVariablesIndex);
    }
    if !has_data {
        warn!("Model validation failed: no variables data");
        return Err(BundleError::MissingVariablesData);
    }

    Ok(ModelBundle::DirectoryBundle { entries: normalized })
}
