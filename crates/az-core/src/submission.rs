//! Multipart layout of an analysis request, independent of any HTTP client.
//!
//! The service pairs `input_images`, `input_paths` and `masks` by position, so
//! every image contributes exactly one of each, a missing mask being sent as
//! [`NO_MASK`].

use std::sync::Arc;
use log::debug;
use crate::association::AssociatedBatch;
use crate::entry::InputEntry;
use crate::error::{CoreError, Result};
use crate::form::{FormConfiguration, ModelSelection};

/// Token the service reads as "this image has no mask".
pub const NO_MASK: &str = "none";

pub mod fields {
    pub const INPUT_IMAGES: &str = "input_images";
    pub const INPUT_PATHS: &str = "input_paths";
    pub const MASKS: &str = "masks";
    pub const PIPELINE: &str = "pipeline";
    pub const CUSTOM_MODEL: &str = "custom_model";
    pub const CUSTOM_MODEL_PIPELINE: &str = "custom_model_pipeline";
    pub const THRESHOLD: &str = "threshold";
    pub const TARGET_HEIGHT: &str = "target_height";
    pub const TARGET_WIDTH: &str = "target_width";
    pub const DOWNSAMPLING_FACTOR: &str = "downsampling_factor";
    pub const GENERATE_LABELLED_IMAGES: &str = "generate_labelled_images";
    pub const LABELLED_OUTPUT_PATH: &str = "labelled_output_path";
    pub const PREDICTIONS_OUTPUT_PATH: &str = "predictions_output_path";
    pub const OVERLAYED_OUTPUT_PATH: &str = "overlayed_output_path";
    pub const AREA_PER_PIXEL: &str = "area_per_pixel";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    File {
        file_name: String,
        mime_type: String,
        data: Arc<[u8]>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub name: &'static str,
    pub value: FieldValue,
}

impl FormField {
    fn text(name: &'static str, value: impl Into<String>) -> Self {
        Self { name, value: FieldValue::Text(value.into()) }
    }

    fn file(name: &'static str, entry: &InputEntry) -> Self {
        Self {
            name,
            value: FieldValue::File {
                file_name: entry.file_name().to_string(),
                mime_type: entry.mime_type().to_string(),
                data: entry.shared_payload(),
            },
        }
    }
}

/// Ordered form fields of one request. Cloning shares the payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionBody {
    fields: Vec<FormField>,
    image_count: usize,
    result_block_size: usize,
}

impl SubmissionBody {
    pub fn fields(&self) -> &[FormField] {
        &self.fields
    }

    pub fn image_count(&self) -> usize {
        self.image_count
    }

    /// Results the service returns per image, see [`FormConfiguration::result_block_size`].
    pub fn result_block_size(&self) -> usize {
        self.result_block_size
    }

    /// Text values of every field called `name`, in order.
    pub fn texts<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields.iter().filter(move |f| f.name == name).filter_map(|f| match &f.value {
            FieldValue::Text(t) => Some(t.as_str()),
            FieldValue::File { .. } => None,
        })
    }
}

pub fn build(images: &[InputEntry], masks: &[Option<InputEntry>], form: &FormConfiguration) -> Result<SubmissionBody> {
    if images.is_empty() {
        return Err(CoreError::Input("Please select a file or folder to upload".into()));
    }
    if images.len() != masks.len() {
        return Err(CoreError::Input(format!(
            "{} images but {} masks; every image needs a mask slot",
            images.len(),
            masks.len()
        )));
    }
    form.validate()?;

    let mut form_fields = Vec::with_capacity(images.len() * 3 + 10);

    for (image, mask) in images.iter().zip(masks) {
        form_fields.push(FormField::file(fields::INPUT_IMAGES, image));
        form_fields.push(FormField::text(fields::INPUT_PATHS, image.relative_path()));
        form_fields.push(match mask {
            Some(mask) => FormField::file(fields::MASKS, mask),
            None => FormField::text(fields::MASKS, NO_MASK),
        });
    }

    match &form.model {
        ModelSelection::Preset(name) => {
            form_fields.push(FormField::text(fields::PIPELINE, name.as_str()));
        }
        ModelSelection::Custom(custom) => {
            form_fields.push(FormField {
                name: fields::CUSTOM_MODEL,
                value: FieldValue::File {
                    file_name: custom.upload.file_name.clone(),
                    mime_type: custom.upload.mime_type.clone(),
                    data: Arc::clone(&custom.upload.payload),
                },
            });
            form_fields.push(FormField::text(fields::CUSTOM_MODEL_PIPELINE, custom.pipeline.label()));
            form_fields.push(FormField::text(fields::THRESHOLD, custom.threshold.to_string()));
            if let Some(h) = custom.target_height {
                form_fields.push(FormField::text(fields::TARGET_HEIGHT, h.to_string()));
            }
            if let Some(w) = custom.target_width {
                form_fields.push(FormField::text(fields::TARGET_WIDTH, w.to_string()));
            }
            if let Some(f) = custom.downsampling_factor {
                form_fields.push(FormField::text(fields::DOWNSAMPLING_FACTOR, f.to_string()));
            }
        }
    }

    form_fields.push(FormField::text(
        fields::GENERATE_LABELLED_IMAGES,
        form.generate_labelled_images.to_string(),
    ));
    if form.generate_labelled_images {
        form_fields.push(FormField::text(fields::LABELLED_OUTPUT_PATH, form.labelled_output_path.as_str()));
    }
    form_fields.push(FormField::text(fields::PREDICTIONS_OUTPUT_PATH, form.predictions_output_path.as_str()));
    form_fields.push(FormField::text(fields::OVERLAYED_OUTPUT_PATH, form.overlayed_output_path.as_str()));
    form_fields.push(FormField::text(fields::AREA_PER_PIXEL, form.area_per_pixel.to_string()));

    debug!("Built submission with {} images and {} fields", images.len(), form_fields.len());

    Ok(SubmissionBody {
        fields: form_fields,
        image_count: images.len(),
        result_block_size: form.result_block_size(),
    })
}

/// Builds the request from everything accumulated so far.
pub fn build_from_batch(batch: &AssociatedBatch, form: &FormConfiguration) -> Result<SubmissionBody> {
    build(batch.images(), batch.masks(), form)
}
