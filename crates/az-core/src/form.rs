//! The analysis form as one immutable value.

use std::fmt;
use std::str::FromStr;
use crate::error::{CoreError, FieldErrors, Result};
use crate::packager::ModelUpload;

pub const DEFAULT_PREDICTIONS_PATH: &str = "../../Predictions/{name}{ext}";
pub const DEFAULT_OVERLAYED_PATH: &str = "../../Overlayed/{name}{ext}";
pub const DEFAULT_LABELLED_PATH: &str = "../../Labelled/{name}{ext}";

pub const MIN_AREA_PER_PIXEL: f64 = 1e-6;
pub const MAX_OUTPUT_PATH_LEN: usize = 255;
pub const MAX_TARGET_DIMENSION: u32 = 1024;
pub const MAX_DOWNSAMPLING_FACTOR: u32 = 512;

/// How the service feeds images of arbitrary size into an uploaded model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomPipeline {
    Tiling,
    ResizeWithPadding,
    DynamicResizeWithPadding,
}

impl CustomPipeline {
    /// Label the service registers the pipeline under.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Tiling => "Tiling",
            Self::ResizeWithPadding => "Resizing with padding",
            Self::DynamicResizeWithPadding => "Dynamic resizing with padding",
        }
    }

    pub fn needs_target_size(&self) -> bool {
        matches!(self, Self::Tiling | Self::ResizeWithPadding)
    }

    pub fn needs_downsampling_factor(&self) -> bool {
        matches!(self, Self::DynamicResizeWithPadding)
    }

    pub fn all() -> [CustomPipeline; 3] {
        [Self::Tiling, Self::ResizeWithPadding, Self::DynamicResizeWithPadding]
    }
}

impl fmt::Display for CustomPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for CustomPipeline {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tiling" => Ok(Self::Tiling),
            "resizing with padding" | "resize_with_pad" => Ok(Self::ResizeWithPadding),
            "dynamic resizing with padding" | "dynamic_resize_with_pad" => Ok(Self::DynamicResizeWithPadding),
            other => Err(CoreError::Input(format!("unknown custom model pipeline '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CustomModel {
    pub upload: ModelUpload,
    pub pipeline: CustomPipeline,
    pub threshold: f32,
    pub target_height: Option<u32>,
    pub target_width: Option<u32>,
    pub downsampling_factor: Option<u32>,
}

/// Exactly one of a preset pipeline or an uploaded model goes out per job.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelSelection {
    Preset(String),
    Custom(CustomModel),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormConfiguration {
    pub model: ModelSelection,
    pub area_per_pixel: f64,
    pub predictions_output_path: String,
    pub overlayed_output_path: String,
    pub generate_labelled_images: bool,
    pub labelled_output_path: String,
}

impl FormConfiguration {
    pub fn new(model: ModelSelection) -> Self {
        Self {
            model,
            area_per_pixel: 1.0,
            predictions_output_path: DEFAULT_PREDICTIONS_PATH.into(),
            overlayed_output_path: DEFAULT_OVERLAYED_PATH.into(),
            generate_labelled_images: true,
            labelled_output_path: DEFAULT_LABELLED_PATH.into(),
        }
    }

    /// Results returned per input image: prediction and overlay, plus the
    /// labelled image when requested.
    pub fn result_block_size(&self) -> usize {
        if self.generate_labelled_images { 3 } else { 2 }
    }

    /// Runs the checks the service applies to a request, returning every
    /// offending field at once.
    pub fn validate(&self) -> Result<()> {
        let mut errors = FieldErrors::new();
        let mut push = |field: &str, message: String| {
            errors.entry(field.to_string()).or_default().push(message);
        };

        if !self.area_per_pixel.is_finite() || self.area_per_pixel < MIN_AREA_PER_PIXEL {
            push(
                "area_per_pixel",
                format!("Ensure this value is greater than or equal to {}.", MIN_AREA_PER_PIXEL),
            );
        }

        let mut check_path = |field: &str, value: &str, what: &str| {
            if value.is_empty() || value.len() > MAX_OUTPUT_PATH_LEN {
                push(field, format!("Invalid {} output path", what));
            }
        };
        check_path("predictions_output_path", &self.predictions_output_path, "predictions");
        check_path("overlayed_output_path", &self.overlayed_output_path, "overlayed");
        if self.generate_labelled_images {
            check_path("labelled_output_path", &self.labelled_output_path, "labelled");
        }

        match &self.model {
            ModelSelection::Preset(name) if name.trim().is_empty() => {
                push("pipeline", "No model selected".into());
            }
            ModelSelection::Preset(_) => {}
            ModelSelection::Custom(custom) => validate_custom(custom, &mut push),
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(CoreError::InvalidForm(errors))
        }
    }
}

fn validate_custom(custom: &CustomModel, push: &mut impl FnMut(&str, String)) {
    if custom.upload.payload.is_empty() {
        push("custom_model", "The submitted file is empty.".into());
    }

    if !(custom.threshold > 0.0 && custom.threshold <= 1.0) {
        push("threshold", "Threshold must be in (0, 1]".into());
    }

    if custom.pipeline.needs_target_size() {
        match (custom.target_height, custom.target_width) {
            (Some(h), Some(w)) => {
                for (field, value) in [("target_height", h), ("target_width", w)] {
                    if !(1..=MAX_TARGET_DIMENSION).contains(&value) {
                        push(field, format!("Must be between 1 and {}", MAX_TARGET_DIMENSION));
                    }
                }
            }
            _ => push("target_height", "Target height and width must be provided".into()),
        }
    }

    if custom.pipeline.needs_downsampling_factor() {
        match custom.downsampling_factor {
            None => push("downsampling_factor", "Downsampling factor must be provided".into()),
            Some(f) if !(1..=MAX_DOWNSAMPLING_FACTOR).contains(&f) => push(
                "downsampling_factor",
                format!("Must be between 1 and {}", MAX_DOWNSAMPLING_FACTOR),
            ),
            Some(f) if !f.is_power_of_two() => {
                push("downsampling_factor", "Downsampling factor must be a power of 2".into())
            }
            Some(_) => {}
        }
    }
}
