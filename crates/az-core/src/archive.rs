//! Zip container helpers shared by the model packager and the result bundler.

use std::io::{Cursor, Read, Write};
use log::{debug, trace};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};
use crate::error::Result;

/// Serializes the members, in iteration order, into one in-memory zip archive.
/// Member names are written exactly as given.
pub fn write_archive<'a, I>(members: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = (&'a str, &'a [u8])>,
{
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut count = 0;
    for (name, data) in members {
        trace!("Adding archive member {} ({} bytes)", name, data.len());
        writer.start_file(name, options)?;
        writer.write_all(data)?;
        count += 1;
    }

    let bytes = writer.finish()?.into_inner();
    debug!("Wrote archive with {} members ({} bytes)", count, bytes.len());
    Ok(bytes)
}

/// Reads every file member of an in-memory zip archive, skipping directories.
pub fn read_archive(bytes: &[u8]) -> Result<Vec<(String, Vec<u8>)>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut members = Vec::with_capacity(archive.len());

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if file.is_dir() {
            trace!("Skipping directory: {}", file.name());
            continue;
        }

        let name = file.name().to_string();
        let mut data = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut data)?;
        members.push((name, data));
    }

    Ok(members)
}
