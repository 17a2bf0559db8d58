// Catalog archive expansion
//
// rdf-files.tar.zip is a zip holding a single tar, which in turn holds
// cache/epub/<id>/pg<id>.rdf. Both layers are unpacked into one
// directory next to the archive. This is blocking file IO: async callers
// run it on spawn_blocking.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{IngestError, Result};

/// Expand `archive_path` into `<archive dir>/<target_dir_name>`
///
/// Returns the expansion directory. A zip without a tar member is not an
/// error here; the caller checks for the descriptor tree afterwards.
pub fn expand(archive_path: &Path, target_dir_name: &str) -> Result<PathBuf> {
    let parent = archive_path.parent().unwrap_or_else(|| Path::new("."));
    let target = parent.join(target_dir_name);
    std::fs::create_dir_all(&target)?;

    let file = File::open(archive_path)?;
    let mut zip = zip::ZipArchive::new(BufReader::new(file))?;
    zip.extract(&target)?;
    info!(
        archive = %archive_path.display(),
        target = %target.display(),
        entries = zip.len(),
        "Extracted zip archive"
    );

    let mut tars = find_tar_members(&target)?;
    tars.sort();

    let Some((tar_path, others)) = tars.split_first() else {
        warn!(target = %target.display(), "No .tar member found inside the zip archive");
        return Ok(target);
    };
    for other in others {
        warn!(path = %other.display(), "Ignoring additional .tar member");
    }

    let mut tar = tar::Archive::new(BufReader::new(File::open(tar_path)?));
    tar.unpack(&target).map_err(|e| {
        IngestError::Archive(format!("Failed to unpack {}: {}", tar_path.display(), e))
    })?;
    info!(path = %tar_path.display(), "Extracted tar archive");

    Ok(target)
}

fn find_tar_members(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            found.extend(find_tar_members(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "tar") {
            found.push(path);
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn tar_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, contents) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            builder
                .append_data(&mut header, path, contents.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap()
    }

    fn write_zip(path: &Path, members: &[(&str, &[u8])]) {
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, data) in members {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_expands_zip_then_tar() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("rdf-files.tar.zip");
        let tar = tar_bytes(&[("cache/epub/1/pg1.rdf", "<rdf/>")]);
        write_zip(&archive, &[("rdf-files.tar", tar.as_slice())]);

        let target = expand(&archive, "rdf_files").unwrap();

        assert_eq!(target, dir.path().join("rdf_files"));
        let rdf = target.join("cache/epub/1/pg1.rdf");
        assert_eq!(std::fs::read_to_string(rdf).unwrap(), "<rdf/>");
    }

    #[test]
    fn test_first_tar_in_sorted_order_wins() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("feed.zip");
        let a = tar_bytes(&[("from-a.txt", "a")]);
        let b = tar_bytes(&[("from-b.txt", "b")]);
        write_zip(&archive, &[("b.tar", b.as_slice()), ("a.tar", a.as_slice())]);

        let target = expand(&archive, "out").unwrap();

        assert!(target.join("from-a.txt").exists());
        assert!(!target.join("from-b.txt").exists());
    }

    #[test]
    fn test_zip_without_tar_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("feed.zip");
        write_zip(&archive, &[("README", b"nothing here".as_slice())]);

        let target = expand(&archive, "out").unwrap();
        assert!(target.join("README").exists());
    }

    #[test]
    fn test_corrupt_zip_is_archive_error() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("broken.zip");
        std::fs::write(&archive, b"this is not a zip").unwrap();

        assert!(matches!(
            expand(&archive, "out"),
            Err(IngestError::Archive(_))
        ));
    }
}
