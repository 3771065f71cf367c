use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use anyhow::{anyhow, Context};
use az_core::bundler::RESULTS_ARCHIVE_NAME;
use az_core::form::{DEFAULT_LABELLED_PATH, DEFAULT_OVERLAYED_PATH, DEFAULT_PREDICTIONS_PATH};
use az_core::{AllowedExtensions, AssociationOptions, CustomModel, CustomPipeline, FormConfiguration, ModelSelection, ModelUpload};
use crate::job::Credentials;
use crate::poller::DEFAULT_MAX_RESUBMISSIONS;

pub const DEFAULT_SERVER_URL: &str = "http://localhost:8000";
pub const DEFAULT_THRESHOLD: f32 = 0.1;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_url: String,
    pub credentials: Credentials,
    pub input_dir: Option<PathBuf>,
    pub pipeline: Option<String>,
    pub custom_model: Option<PathBuf>,
    pub custom_pipeline: CustomPipeline,
    /// Extensions accepted for a single-file custom model.
    pub model_extensions: AllowedExtensions,
    pub threshold: f32,
    pub target_height: Option<u32>,
    pub target_width: Option<u32>,
    pub downsampling_factor: Option<u32>,
    pub association: AssociationOptions,
    pub area_per_pixel: f64,
    pub predictions_output_path: String,
    pub overlayed_output_path: String,
    pub generate_labelled_images: bool,
    pub labelled_output_path: String,
    pub max_resubmissions: u32,
    pub output_archive: PathBuf,
}

impl ClientConfig {
    /// Reads `AZ_*` variables, after loading a `.env` file when one exists.
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mask_directories = match get("AZ_MASK_DIRS") {
            Some(dirs) => dirs.split(',').map(|d| d.trim().to_string()).collect(),
            None => AssociationOptions::default().mask_directories,
        };

        let custom_pipeline = match get("AZ_CUSTOM_PIPELINE") {
            Some(label) => label
                .parse::<CustomPipeline>()
                .map_err(|e| anyhow!("AZ_CUSTOM_PIPELINE: {}", e))?,
            None => CustomPipeline::Tiling,
        };

        let model_extensions = match get("AZ_MODEL_EXTENSIONS") {
            Some(list) => AllowedExtensions::new(list.split(',').map(str::trim).filter(|e| !e.is_empty())),
            None => AllowedExtensions::default(),
        };

        Ok(Self {
            server_url: get("AZ_SERVER_URL").unwrap_or_else(|| DEFAULT_SERVER_URL.into()),
            credentials: Credentials {
                username: get("AZ_USERNAME"),
                password: get("AZ_PASSWORD"),
            },
            input_dir: get("AZ_INPUT_DIR").map(PathBuf::from),
            pipeline: get("AZ_PIPELINE"),
            custom_model: get("AZ_CUSTOM_MODEL").map(PathBuf::from),
            custom_pipeline,
            model_extensions,
            threshold: parse_or(&get, "AZ_THRESHOLD", DEFAULT_THRESHOLD)?,
            target_height: parse_opt(&get, "AZ_TARGET_HEIGHT")?,
            target_width: parse_opt(&get, "AZ_TARGET_WIDTH")?,
            downsampling_factor: parse_opt(&get, "AZ_DOWNSAMPLING_FACTOR")?,
            association: AssociationOptions {
                mask_directories,
                discard_unmatched: flag_or(&get, "AZ_DISCARD_UNMATCHED", true)?,
                compare_masks: flag_or(&get, "AZ_COMPARE_MASKS", true)?,
            },
            area_per_pixel: parse_or(&get, "AZ_AREA_PER_PIXEL", 1.0)?,
            predictions_output_path: get("AZ_PREDICTIONS_PATH").unwrap_or_else(|| DEFAULT_PREDICTIONS_PATH.into()),
            overlayed_output_path: get("AZ_OVERLAYED_PATH").unwrap_or_else(|| DEFAULT_OVERLAYED_PATH.into()),
            generate_labelled_images: flag_or(&get, "AZ_GENERATE_LABELLED", true)?,
            labelled_output_path: get("AZ_LABELLED_PATH").unwrap_or_else(|| DEFAULT_LABELLED_PATH.into()),
            max_resubmissions: parse_or(&get, "AZ_MAX_RESUBMISSIONS", DEFAULT_MAX_RESUBMISSIONS)?,
            output_archive: get("AZ_OUTPUT_ARCHIVE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(RESULTS_ARCHIVE_NAME)),
        })
    }

    /// Custom model settings around an already packaged upload.
    pub fn custom_model(&self, upload: ModelUpload) -> CustomModel {
        CustomModel {
            upload,
            pipeline: self.custom_pipeline,
            threshold: self.threshold,
            target_height: self.target_height,
            target_width: self.target_width,
            downsampling_factor: self.downsampling_factor,
        }
    }

    pub fn form(&self, model: ModelSelection) -> FormConfiguration {
        FormConfiguration {
            model,
            area_per_pixel: self.area_per_pixel,
            predictions_output_path: self.predictions_output_path.clone(),
            overlayed_output_path: self.overlayed_output_path.clone(),
            generate_labelled_images: self.generate_labelled_images,
            labelled_output_path: self.labelled_output_path.clone(),
        }
    }
}

fn parse_opt<T, G>(get: &G, key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| anyhow!("{}", e))
                .with_context(|| format!("{} has an invalid value '{}'", key, raw))
        })
        .transpose()
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
    G: Fn(&str) -> Option<String>,
{
    Ok(parse_opt(get, key)?.unwrap_or(default))
}

fn flag_or<G>(get: &G, key: &str, default: bool) -> anyhow::Result<bool>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key).map(|v| v.to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(anyhow!("{} must be a boolean, got '{}'", key, v)),
        },
    }
}
