use std::fs;
use std::path::{Path, PathBuf};
use az_core::{InputEntry, ModelFileEntry};
use image::ImageFormat;
use tracing::{debug, info};
use crate::error::AppError;

const FALLBACK_MIME: &str = "application/octet-stream";

/// Reads every file below `dir` the way a browser directory pick does: paths
/// start with the directory's own name and use `/`, entries come in path order.
pub fn read_input_dir(dir: &Path) -> Result<Vec<InputEntry>, AppError> {
    let root = root_name(dir)?;
    let mut entries = Vec::new();

    for (path, relative) in walk(dir, &root)? {
        let data = fs::read(&path)?;
        let entry = InputEntry::new(relative, mime_type(&path), data)?;
        debug!("Ingested {} ({}, {} bytes)", entry.relative_path(), entry.mime_type(), entry.payload().len());
        entries.push(entry);
    }

    info!("Read {} files from {}", entries.len(), dir.display());
    Ok(entries)
}

/// A model file, or every file of a model directory rooted at its name.
pub fn read_model_files(path: &Path) -> Result<Vec<ModelFileEntry>, AppError> {
    if path.is_file() {
        let name = root_name(path)?;
        return Ok(vec![ModelFileEntry::new(name, fs::read(path)?)?]);
    }

    let root = root_name(path)?;
    walk(path, &root)?
        .into_iter()
        .map(|(file, relative)| -> Result<ModelFileEntry, AppError> {
            Ok(ModelFileEntry::new(relative, fs::read(&file)?)?)
        })
        .collect()
}

pub fn mime_type(path: &Path) -> String {
    ImageFormat::from_path(path)
        .map(|format| format.to_mime_type().to_string())
        .unwrap_or_else(|_| FALLBACK_MIME.to_string())
}

fn root_name(path: &Path) -> Result<String, AppError> {
    let absolute = if path.file_name().is_some() { path.to_path_buf() } else { path.canonicalize()? };
    absolute
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| AppError::Input(format!("Cannot name '{}'", path.display())))
}

/// Files below `dir` with their `/`-joined paths under `root`, sorted.
fn walk(dir: &Path, root: &str) -> Result<Vec<(PathBuf, String)>, AppError> {
    if !dir.is_dir() {
        return Err(AppError::Input(format!("'{}' is not a directory", dir.display())));
    }

    let mut files = Vec::new();
    let mut pending = vec![(dir.to_path_buf(), root.to_string())];

    while let Some((current, prefix)) = pending.pop() {
        for entry in fs::read_dir(&current)? {
            let entry = entry?;
            let relative = format!("{}/{}", prefix, entry.file_name().to_string_lossy());
            if entry.file_type()?.is_dir() {
                pending.push((entry.path(), relative));
            } else {
                files.push((entry.path(), relative));
            }
        }
    }

    files.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use az_core::{AllowedExtensions, AssociatedBatch, AssociationOptions};

    fn write(root: &Path, relative: &str, data: &[u8]) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, data).unwrap();
    }

    #[test]
    fn test_input_dir_is_rooted_at_its_name() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("Experiment");
        write(&dir, "Sample/Images/b.png", b"b");
        write(&dir, "Sample/Images/a.tif", b"a");
        write(&dir, "Mask/a.tif", b"m");
        write(&dir, "notes.txt", b"n");

        let entries = read_input_dir(&dir).unwrap();
        let paths: Vec<&str> = entries.iter().map(|e| e.relative_path()).collect();

        assert_eq!(
            paths,
            vec![
                "Experiment/Mask/a.tif",
                "Experiment/Sample/Images/a.tif",
                "Experiment/Sample/Images/b.png",
                "Experiment/notes.txt",
            ]
        );
        assert_eq!(entries[1].mime_type(), "image/tiff");
        assert_eq!(entries[2].mime_type(), "image/png");
        assert_eq!(entries[3].mime_type(), FALLBACK_MIME);
        assert!(!entries[3].is_image());
    }

    #[test]
    fn test_ingested_dir_associates_masks() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("Run");
        write(&dir, "Cornea/Images/x.png", b"x");
        write(&dir, "Mask/x.png", b"mx");

        let entries = read_input_dir(&dir).unwrap();
        let mut batch = AssociatedBatch::new();
        batch.associate(&entries, &AssociationOptions::default());

        assert_eq!(batch.len(), 1);
        assert_eq!(batch.images()[0].relative_path(), "Run/Cornea/Images/x.png");
        assert_eq!(batch.masks()[0].as_ref().unwrap().relative_path(), "Run/Mask/x.png");
    }

    #[test]
    fn test_model_directory_and_file() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("my_model");
        write(&dir, "saved_model.pb", b"pb");
        write(&dir, "variables/variables.index", b"idx");
        write(&dir, "variables/variables.data-00000-of-00001", b"data");

        let files = read_model_files(&dir).unwrap();
        assert_eq!(files.len(), 3);
        assert_eq!(files[0].relative_path(), "my_model/saved_model.pb");

        let bundle = az_core::model_bundle::validate(&files, &AllowedExtensions::default()).unwrap();
        assert!(bundle.is_directory());

        let single = tmp.path().join("unet.h5");
        fs::write(&single, b"h5").unwrap();
        let files = read_model_files(&single).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative_path(), "unet.h5");
    }

    #[test]
    fn test_missing_dir_is_input_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = read_input_dir(&tmp.path().join("absent")).unwrap_err();
        assert!(matches!(err, AppError::Input(_)));
    }
}
