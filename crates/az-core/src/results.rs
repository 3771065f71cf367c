//! Results of a finished analysis job.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Deserializer, Serialize};

/// One output image produced by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub filename: String,
    /// Decoded file contents; base64 on the wire.
    #[serde(rename = "data", deserialize_with = "from_base64", serialize_with = "to_base64")]
    pub payload: Vec<u8>,
}

/// Cell statistics computed for one input image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMetrics {
    pub num_labels: u64,
    pub area: f64,
    pub cell_density: f64,
    pub std_areas: f64,
    pub mean_areas: f64,
    pub coefficient_value: f64,
    pub num_hexagonal: u64,
    pub hexagonal_cell_ratio: f64,
}

impl ImageMetrics {
    /// `(label, value)` pairs in the order they are reported.
    pub fn fields(&self) -> [(&'static str, String); 8] {
        [
            ("Number of cells", self.num_labels.to_string()),
            ("Area", self.area.to_string()),
            ("Cell density", self.cell_density.to_string()),
            ("Standard deviation of cell areas", self.std_areas.to_string()),
            ("Mean cell area", self.mean_areas.to_string()),
            ("Coefficient of variation", self.coefficient_value.to_string()),
            ("Number of hexagonal cells", self.num_hexagonal.to_string()),
            ("Hexagonal cell ratio", self.hexagonal_cell_ratio.to_string()),
        ]
    }
}

/// Results plus per-image metrics.
///
/// The service returns `block_size` results per input image (prediction,
/// overlay and, when requested, labelled image), so `metrics[i]` belongs to
/// `results[i * block_size..(i + 1) * block_size]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet {
    pub results: Vec<AnalysisResult>,
    pub metrics: Vec<ImageMetrics>,
    /// Never zero.
    block_size: usize,
}

impl Default for ResultSet {
    fn default() -> Self {
        Self::new(Vec::new(), Vec::new(), 1)
    }
}

impl ResultSet {
    pub fn new(results: Vec<AnalysisResult>, metrics: Vec<ImageMetrics>, block_size: usize) -> Self {
        Self {
            results,
            metrics,
            block_size: block_size.max(1),
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Metrics of the input image that produced `results[result_index]`.
    pub fn metrics_for_result(&self, result_index: usize) -> Option<&ImageMetrics> {
        if result_index >= self.results.len() {
            return None;
        }
        self.metrics.get(result_index.checked_div(self.block_size)?)
    }

    /// Results produced for the input image described by `metrics[metrics_index]`.
    pub fn results_for_metrics(&self, metrics_index: usize) -> &[AnalysisResult] {
        let start = metrics_index.saturating_mul(self.block_size).min(self.results.len());
        let end = start.saturating_add(self.block_size).min(self.results.len());
        &self.results[start..end]
    }
}

fn from_base64<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let encoded = String::deserialize(deserializer)?;
    BASE64.decode(encoded.as_bytes()).map_err(serde::de::Error::custom)
}

fn to_base64<S>(payload: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&BASE64.encode(payload))
}
