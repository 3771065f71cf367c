//! Pairs uploaded images with their segmentation masks.

use std::collections::{HashMap, HashSet};
use log::{debug, info};
use crate::entry::InputEntry;
use crate::path_matcher::resolve_candidate_mask_paths;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationOptions {
    /// Directory templates tried in order, see [`resolve_candidate_mask_paths`].
    pub mask_directories: Vec<String>,
    /// Drop images for which no mask was found.
    pub discard_unmatched: bool,
    /// Attach found masks. When off masks are still looked up (so they are not
    /// treated as images) but every image is sent without one.
    pub compare_masks: bool,
}

impl Default for AssociationOptions {
    fn default() -> Self {
        Self {
            mask_directories: vec!["../../Mask/".into(), "../../K/".into()],
            discard_unmatched: true,
            compare_masks: true,
        }
    }
}

/// An accepted image and the mask sent alongside it.
#[derive(Debug, Clone, Copy)]
pub struct AssociatedPair<'a> {
    pub image: &'a InputEntry,
    pub mask: Option<&'a InputEntry>,
}

/// Accumulated images and index-aligned masks.
///
/// Every call to [`associate`](Self::associate) appends; `images().len()` always
/// equals `masks().len()`.
#[derive(Debug, Clone, Default)]
pub struct AssociatedBatch {
    images: Vec<InputEntry>,
    masks: Vec<Option<InputEntry>>,
}

impl AssociatedBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs one association pass over a selection of entries and appends the
    /// accepted pairs. Returns how many images were accepted by this pass.
    ///
    /// For every `image/*` entry the candidate mask paths are tried in template
    /// order; the first uploaded entry whose relative path equals a candidate is
    /// its mask. Entries consumed as someone's mask are never emitted as images.
    pub fn associate(&mut self, entries: &[InputEntry], options: &AssociationOptions) -> usize {
        let mut by_path: HashMap<&str, usize> = HashMap::with_capacity(entries.len());
        for (idx, entry) in entries.iter().enumerate() {
            by_path.entry(entry.relative_path()).or_insert(idx);
        }

        let matches: Vec<Option<usize>> = entries
            .iter()
            .map(|entry| {
                if entry.is_image() {
                    find_mask(entry, &by_path, &options.mask_directories)
                } else {
                    None
                }
            })
            .collect();

        let consumed_masks: HashSet<usize> = matches.iter().flatten().copied().collect();

        let mut accepted = 0;
        for (idx, entry) in entries.iter().enumerate() {
            if !entry.is_image() || consumed_masks.contains(&idx) {
                continue;
            }

            let mask = match matches[idx] {
                Some(mask_idx) => Some(&entries[mask_idx]),
                None if options.discard_unmatched => {
                    debug!("No mask found for {}, dropping it", entry.relative_path());
                    continue;
                }
                None => {
                    debug!("No mask found for {}", entry.relative_path());
                    None
                }
            };

            self.images.push(entry.clone());
            self.masks.push(if options.compare_masks { mask.cloned() } else { None });
            accepted += 1;
        }

        info!(
            "Associated {} of {} entries ({} masks found), batch now holds {} images",
            accepted,
            entries.len(),
            consumed_masks.len(),
            self.images.len()
        );

        accepted
    }

    pub fn images(&self) -> &[InputEntry] {
        &self.images
    }

    pub fn masks(&self) -> &[Option<InputEntry>] {
        &self.masks
    }

    pub fn pairs(&self) -> impl Iterator<Item = AssociatedPair<'_>> {
        self.images
            .iter()
            .zip(self.masks.iter())
            .map(|(image, mask)| AssociatedPair {
                image,
                mask: mask.as_ref(),
            })
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn mask_count(&self) -> usize {
        self.masks.iter().filter(|m| m.is_some()).count()
    }

    pub fn clear(&mut self) {
        self.images.clear();
        self.masks.clear();
    }
}

fn find_mask<S: AsRef<str>>(image: &InputEntry, by_path: &HashMap<&str, usize>, templates: &[S]) -> Option<usize> {
    for candidate in resolve_candidate_mask_paths(image.relative_path(), templates) {
        // an empty template resolves to the image itself
        if candidate == image.relative_path() {
            continue;
        }
        if let Some(&idx) = by_path.get(candidate.as_str()) {
            debug!("Found mask for {} at {}", image.relative_path(), candidate);
            return Some(idx);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(path: &str) -> InputEntry {
        InputEntry::new(path, "image/png", path.as_bytes().to_vec()).unwrap()
    }

    fn options(discard_unmatched: bool, compare_masks: bool) -> AssociationOptions {
        AssociationOptions {
            mask_directories: vec!["../../Mask/".into(), "../../K/".into()],
            discard_unmatched,
            compare_masks,
        }
    }

    fn sample_selection() -> Vec<InputEntry> {
        vec![
            image("Batch/Series/Image/a.png"),
            image("Batch/Series/Image/b.png"),
            image("Batch/Series/Image/c.png"),
            image("Batch/Mask/a.png"),
            image("Batch/Mask/b.png"),
        ]
    }

    #[test]
    fn test_discard_unmatched_keeps_only_masked_images() {
        let mut batch = AssociatedBatch::new();
        let accepted = batch.associate(&sample_selection(), &options(true, true));

        assert_eq!(accepted, 2);
        assert_eq!(batch.len(), 2);
        let paths: Vec<_> = batch.images().iter().map(|e| e.relative_path()).collect();
        assert_eq!(paths, vec!["Batch/Series/Image/a.png", "Batch/Series/Image/b.png"]);
        assert_eq!(batch.masks()[0].as_ref().unwrap().relative_path(), "Batch/Mask/a.png");
        assert_eq!(batch.masks()[1].as_ref().unwrap().relative_path(), "Batch/Mask/b.png");
    }

    #[test]
    fn test_unmatched_images_kept_without_mask() {
        let mut batch = AssociatedBatch::new();
        batch.associate(&sample_selection(), &options(false, true));

        assert_eq!(batch.len(), 3);
        assert_eq!(batch.mask_count(), 2);
        assert!(batch.masks()[2].is_none());
        // masks never show up as images of their own
        assert!(batch.images().iter().all(|e| !e.relative_path().contains("/Mask/")));
    }

    #[test]
    fn test_compare_masks_off_attaches_nothing() {
        let mut batch = AssociatedBatch::new();
        batch.associate(&sample_selection(), &options(false, false));

        assert_eq!(batch.len(), 3);
        assert_eq!(batch.mask_count(), 0);
    }

    #[test]
    fn test_earlier_template_wins() {
        let entries = vec![
            image("Batch/Series/Image/a.png"),
            image("Batch/K/a.png"),
            image("Batch/Mask/a.png"),
        ];
        let mut batch = AssociatedBatch::new();
        batch.associate(&entries, &options(true, true));

        assert_eq!(batch.len(), 1);
        assert_eq!(batch.masks()[0].as_ref().unwrap().relative_path(), "Batch/Mask/a.png");
    }

    #[test]
    fn test_second_template_used_when_first_misses() {
        let entries = vec![image("Batch/Series/Image/a.png"), image("Batch/K/a.png")];
        let mut batch = AssociatedBatch::new();
        batch.associate(&entries, &options(true, true));

        assert_eq!(batch.masks()[0].as_ref().unwrap().relative_path(), "Batch/K/a.png");
    }

    #[test]
    fn test_non_images_are_ignored() {
        let entries = vec![
            InputEntry::new("Batch/Series/Image/readme.txt", "text/plain", vec![0u8]).unwrap(),
            image("Batch/Series/Image/a.png"),
        ];
        let mut batch = AssociatedBatch::new();
        batch.associate(&entries, &options(false, true));

        assert_eq!(batch.len(), 1);
        assert_eq!(batch.images()[0].relative_path(), "Batch/Series/Image/a.png");
    }

    #[test]
    fn test_empty_template_never_pairs_image_with_itself() {
        let opts = AssociationOptions {
            mask_directories: vec![String::new()],
            discard_unmatched: false,
            compare_masks: true,
        };
        let mut batch = AssociatedBatch::new();
        batch.associate(&[image("Batch/Image/a.png")], &opts);

        assert_eq!(batch.len(), 1);
        assert!(batch.masks()[0].is_none());
    }

    #[test]
    fn test_lengths_stay_aligned_for_all_flag_combinations() {
        for discard in [false, true] {
            for compare in [false, true] {
                let mut batch = AssociatedBatch::new();
                batch.associate(&sample_selection(), &options(discard, compare));
                batch.associate(&[image("Other/Image/z.png")], &options(discard, compare));
                assert_eq!(batch.images().len(), batch.masks().len());
                assert_eq!(batch.pairs().count(), batch.len());
            }
        }
    }

    #[test]
    fn test_passes_append_in_order() {
        let first = vec![image("Batch/Series/Image/a.png"), image("Batch/Mask/a.png")];
        let second = vec![image("Other/Series/Image/x.png"), image("Other/Series/Image/y.png")];
        let opts = options(false, true);

        let mut combined = AssociatedBatch::new();
        combined.associate(&first, &opts);
        combined.associate(&second, &opts);

        let mut only_first = AssociatedBatch::new();
        only_first.associate(&first, &opts);
        let mut only_second = AssociatedBatch::new();
        only_second.associate(&second, &opts);

        let expected: Vec<_> = only_first.images().iter().chain(only_second.images()).cloned().collect();
        assert_eq!(combined.images(), expected.as_slice());
        let expected_masks: Vec<_> = only_first.masks().iter().chain(only_second.masks()).cloned().collect();
        assert_eq!(combined.masks(), expected_masks.as_slice());
    }

    #[test]
    fn test_duplicate_mask_paths_use_first_entry() {
        let entries = vec![
            image("Batch/Series/Image/a.png"),
            InputEntry::new("Batch/Mask/a.png", "image/png", b"first".to_vec()).unwrap(),
            InputEntry::new("Batch/Mask/a.png", "image/png", b"second".to_vec()).unwrap(),
        ];
        let mut batch = AssociatedBatch::new();
        batch.associate(&entries, &options(false, true));

        assert_eq!(batch.masks()[0].as_ref().unwrap().payload(), b"first");
    }

    #[test]
    fn test_clear() {
        let mut batch = AssociatedBatch::new();
        batch.associate(&sample_selection(), &options(false, true));
        batch.clear();
        assert!(batch.is_empty());
        assert!(batch.masks().is_empty());
    }
}
