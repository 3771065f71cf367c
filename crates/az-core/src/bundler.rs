use std::collections::BTreeSet;
use std::fmt::Write as _;
use log::info;
use crate::archive::write_archive;
use crate::error::{CoreError, Result};
use crate::results::ResultSet;

pub const SELECTED_ARCHIVE_NAME: &str = "selected_images.zip";
pub const RESULTS_ARCHIVE_NAME: &str = "results.zip";
pub const METRICS_MEMBER_NAME: &str = "metrics.txt";

/// Packs the selected results, under their service supplied names, into one zip.
///
/// When the set carries metrics a `metrics.txt` member is added holding one
/// block of `label: value` lines per selected result, blocks separated by a
/// blank line.
pub fn bundle_selected(results: &ResultSet, selection: &BTreeSet<usize>) -> Result<Vec<u8>> {
    if let Some(&index) = selection.iter().find(|&&i| i >= results.len()) {
        return Err(CoreError::SelectionOutOfRange { index, len: results.len() });
    }

    let metrics_text = if results.metrics.is_empty() {
        None
    } else {
        Some(render_metrics(results, selection))
    };

    let members = selection
        .iter()
        .map(|&i| {
            let result = &results.results[i];
            (result.filename.as_str(), result.payload.as_slice())
        })
        .chain(metrics_text.as_deref().map(|text| (METRICS_MEMBER_NAME, text.as_bytes())));

    let bytes = write_archive(members)?;
    info!("Bundled {} of {} results", selection.len(), results.len());
    Ok(bytes)
}

/// Every result, as written after an unattended run.
pub fn bundle_all(results: &ResultSet) -> Result<Vec<u8>> {
    let everything: BTreeSet<usize> = (0..results.len()).collect();
    bundle_selected(results, &everything)
}

pub fn render_metrics(results: &ResultSet, selection: &BTreeSet<usize>) -> String {
    let mut blocks = Vec::with_capacity(selection.len());

    for &i in selection {
        let Some(result) = results.results.get(i) else {
            continue;
        };
        let mut block = String::new();
        let _ = writeln!(block, "File: {}", result.filename);
        if let Some(metrics) = results.metrics_for_result(i) {
            for (label, value) in metrics.fields() {
                let _ = writeln!(block, "{}: {}", label, value);
            }
        }
        blocks.push(block);
    }

    blocks.join("\n")
}
