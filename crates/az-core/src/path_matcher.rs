//! Mask path resolution.
//!
//! Mask directories are templates relative to the directory an image lives in,
//! e.g. `"../../Mask/"` maps `Batch/Image/cell.png` to `Mask/cell.png`. All
//! arithmetic is on `/`-separated strings, the way browsers report relative
//! paths, and never touches the filesystem.

/// Directory part of a `/`-separated path (`"."` when there is none).
pub fn dirname(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => "/",
        Some(pos) => &trimmed[..pos],
        None if path.starts_with('/') => "/",
        None => ".",
    }
}

/// Last component of a `/`-separated path.
pub fn basename(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(pos) => &trimmed[pos + 1..],
        None => trimmed,
    }
}

/// Joins the segments with `/` and collapses `.`, `..` and repeated separators.
///
/// Leading `..` of a relative path are kept since there is nothing to pop;
/// on an absolute path they are dropped at the root.
pub fn join(segments: &[&str]) -> String {
    let joined = segments
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("/");

    normalize(&joined)
}

pub fn normalize(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ if absolute => {}
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }

    let body = parts.join("/");
    match (absolute, body.is_empty()) {
        (true, _) => format!("/{}", body),
        (false, true) => ".".to_string(),
        (false, false) => body,
    }
}

/// Candidate mask locations for `image_path`, one per template, in template order.
///
/// Templates that are empty, absolute or otherwise odd still produce a candidate;
/// it just will not match anything in the uploaded set.
pub fn resolve_candidate_mask_paths<S: AsRef<str>>(image_path: &str, templates: &[S]) -> Vec<String> {
    let dir = dirname(image_path);
    let name = basename(image_path);

    templates
        .iter()
        .map(|template| join(&[dir, template.as_ref(), name]))
        .collect()
}
