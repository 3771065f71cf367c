//! Preview of where the service writes an output for a given input.
//!
//! Output templates may use `{name}` (input file stem), `{ext}` (input suffix,
//! dot included) and `{time}`. Every `..` in the template's directory part
//! climbs one level from the input's directory.

use chrono::{Local, NaiveDateTime};

pub const TIME_FORMAT: &str = "%Y%m%d_%H%M%S";

pub fn resolve_output_path(input_path: &str, template: &str) -> String {
    resolve_output_path_at(input_path, template, Local::now().naive_local())
}

pub fn resolve_output_path_at(input_path: &str, template: &str, now: NaiveDateTime) -> String {
    let input_parts: Vec<&str> = input_path.split('/').filter(|p| !p.is_empty() && *p != ".").collect();
    let input_name = input_parts.last().copied().unwrap_or("");
    let (stem, ext) = split_suffix(input_name);

    let mut rendered = template.replace("{name}", stem).replace("{ext}", ext);
    if rendered.contains("{time}") {
        rendered = rendered.replace("{time}", &now.format(TIME_FORMAT).to_string());
    }

    let template_parts: Vec<&str> = rendered.split('/').filter(|p| !p.is_empty() && *p != ".").collect();
    let Some((file_name, template_dirs)) = template_parts.split_last() else {
        return String::new();
    };

    let up_levels = template_dirs.iter().filter(|p| **p == "..").count();
    let kept_input = input_parts.len().saturating_sub(up_levels + 1);

    input_parts[..kept_input]
        .iter()
        .chain(template_dirs.iter().skip(up_levels))
        .chain(std::iter::once(file_name))
        .copied()
        .collect::<Vec<_>>()
        .join("/")
}

fn split_suffix(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(pos) if pos > 0 && pos < name.len() - 1 => (&name[..pos], &name[pos..]),
        _ => (name, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(12, 30, 5)
            .unwrap()
    }

    #[test]
    fn test_default_templates() {
        assert_eq!(
            resolve_output_path_at("Batch/Series/Image/a.png", "../../Predictions/{name}{ext}", noon()),
            "Batch/Predictions/a.png"
        );
        assert_eq!(
            resolve_output_path_at("Batch/Series/Image/a.tif", "../../Overlayed/{name}_overlay.png", noon()),
            "Batch/Overlayed/a_overlay.png"
        );
    }

    #[test]
    fn test_time_placeholder() {
        assert_eq!(
            resolve_output_path_at("Batch/Image/a.png", "out/{time}/{name}{ext}", noon()),
            "Batch/Image/out/20240309_123005/a.png"
        );
    }

    #[test]
    fn test_climbing_past_the_root() {
        assert_eq!(
            resolve_output_path_at("a.png", "../../Predictions/{name}{ext}", noon()),
            "Predictions/a.png"
        );
    }

    #[test]
    fn test_suffix_split() {
        assert_eq!(split_suffix("a.tar.gz"), ("a.tar", ".gz"));
        assert_eq!(split_suffix(".hidden"), (".hidden", ""));
        assert_eq!(split_suffix("noext"), ("noext", ""));
    }
}
