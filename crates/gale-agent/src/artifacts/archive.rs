//! Zip packaging for artifact upload.
//!
//! Entry names are rooted at the destination prefix plus the source's
//! basename: uploading file `a.txt` with prefix `""` yields entry `a.txt`;
//! uploading directory `logs` with prefix `reports` yields entries
//! `reports/logs/<rel>`. Directory entries are omitted.

use std::io::{Cursor, Write};
use std::path::Path;

use md5::{Digest, Md5};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::ArtifactError;

/// One file placed in the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Path of the entry inside the zip, also the path recorded in the
    /// checksum manifest.
    pub name: String,
    pub md5: String,
}

impl ArchiveEntry {
    /// The `path=md5hex` manifest line for this entry.
    pub fn checksum_line(&self) -> String {
        format!("{}={}\n", self.name, self.md5)
    }
}

/// Package a file or directory into an in-memory deflate zip.
pub fn package(
    source: &Path,
    dest_prefix: &str,
) -> Result<(Vec<u8>, Vec<ArchiveEntry>), ArtifactError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut entries = Vec::new();

    let root = entry_root(source, dest_prefix);
    let metadata = std::fs::metadata(source)?;

    if metadata.is_dir() {
        for item in WalkDir::new(source) {
            let item = item?;
            if !item.file_type().is_file() {
                continue;
            }
            let rel = item
                .path()
                .strip_prefix(source)
                .map_err(|_| ArtifactError::Rejected(format!(
                    "artifact path {:?} escaped its source directory",
                    item.path()
                )))?;
            let name = format!("{}/{}", root, rel.display());
            add_file(&mut writer, options, item.path(), name, &mut entries)?;
        }
    } else {
        add_file(&mut writer, options, source, root, &mut entries)?;
    }

    let cursor = writer.finish()?;
    Ok((cursor.into_inner(), entries))
}

fn entry_root(source: &Path, dest_prefix: &str) -> String {
    let basename = source
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let prefix = dest_prefix.trim_matches('/');
    if prefix.is_empty() {
        basename
    } else {
        format!("{prefix}/{basename}")
    }
}

fn add_file(
    writer: &mut ZipWriter<Cursor<Vec<u8>>>,
    options: SimpleFileOptions,
    path: &Path,
    name: String,
    entries: &mut Vec<ArchiveEntry>,
) -> Result<(), ArtifactError> {
    let data = std::fs::read(path)?;
    let md5 = format!("{:x}", Md5::digest(&data));
    writer.start_file(name.clone(), options)?;
    writer.write_all(&data)?;
    entries.push(ArchiveEntry { name, md5 });
    Ok(())
}
