//! Archive extraction: zip and tar.gz in-process, 7-zip via the external
//! archiver shipped with the runtime.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use flate2::read::GzDecoder;
use tar::Archive;
use thiserror::Error;
use tracing::debug;

/// Errors from archive extraction. Extraction is never retried.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("failed to open archive {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid zip archive {path}: {source}")]
    Zip {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("failed to unpack {path}: {source}")]
    Unpack {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to launch {tool}: {source}")]
    Launch {
        tool: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("7z exited with code {exit_code}: {stderr}")]
    SevenZip { exit_code: i32, stderr: String },

    #[error("unsupported archive format: {path}")]
    UnsupportedFormat { path: PathBuf },
}

/// Extract `archive` into `dest`, dispatching on the file name.
///
/// `seven_zip` is the external archiver used for `.7z` archives (and
/// split `.7z.001` volumes); passing `None` makes those fail with
/// `UnsupportedFormat`. Progress is entry-count based and only reported
/// for zip archives.
pub fn extract_archive(
    archive: &Path,
    dest: &Path,
    seven_zip: Option<&Path>,
    on_progress: impl FnMut(u8),
) -> Result<(), ExtractError> {
    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if name.ends_with(".zip") {
        extract_zip(archive, dest, on_progress)
    } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        extract_tar_gz(archive, dest)
    } else if name.contains(".7z") {
        match seven_zip {
            Some(tool) => extract_7z(tool, archive, dest),
            None => Err(ExtractError::UnsupportedFormat {
                path: archive.to_path_buf(),
            }),
        }
    } else {
        Err(ExtractError::UnsupportedFormat {
            path: archive.to_path_buf(),
        })
    }
}

/// Extract a zip archive entry by entry.
///
/// Directory entries are skipped (directories are created as needed for
/// file entries), each file streams through a fixed 4 KiB buffer, and
/// `on_progress` receives the percentage of entries processed.
pub fn extract_zip(
    archive: &Path,
    dest: &Path,
    mut on_progress: impl FnMut(u8),
) -> Result<(), ExtractError> {
    let file = File::open(archive).map_err(|e| ExtractError::Open {
        path: archive.to_path_buf(),
        source: e,
    })?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| ExtractError::Zip {
        path: archive.to_path_buf(),
        source: e,
    })?;

    let total = zip.len();
    for i in 0..total {
        let mut entry = zip.by_index(i).map_err(|e| ExtractError::Zip {
            path: archive.to_path_buf(),
            source: e,
        })?;

        if entry.is_dir() {
            continue;
        }

        let Some(relative) = entry.enclosed_name() else {
            // Entry escapes the destination; refuse it.
            continue;
        };
        let out_path = dest.join(relative);

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(|e| ExtractError::Unpack {
                path: out_path.clone(),
                source: e,
            })?;
        }

        let mut out = File::create(&out_path).map_err(|e| ExtractError::Unpack {
            path: out_path.clone(),
            source: e,
        })?;

        let mut buffer = [0u8; 4096];
        loop {
            let read = entry.read(&mut buffer).map_err(|e| ExtractError::Unpack {
                path: out_path.clone(),
                source: e,
            })?;
            if read == 0 {
                break;
            }
            out.write_all(&buffer[..read])
                .map_err(|e| ExtractError::Unpack {
                    path: out_path.clone(),
                    source: e,
                })?;
        }

        let percent = ((i + 1) as f64 / total as f64 * 100.0) as u8;
        on_progress(percent);
    }

    Ok(())
}

/// Extract a gzip-wrapped tar archive in one shot. No progress reporting.
pub fn extract_tar_gz(archive: &Path, dest: &Path) -> Result<(), ExtractError> {
    let file = File::open(archive).map_err(|e| ExtractError::Open {
        path: archive.to_path_buf(),
        source: e,
    })?;
    let decoder = GzDecoder::new(file);
    let mut tar = Archive::new(decoder);

    tar.unpack(dest).map_err(|e| ExtractError::Unpack {
        path: archive.to_path_buf(),
        source: e,
    })
}

/// Extract a 7-zip archive by invoking the external archiver
/// (`7z x <archive> -o<dest> -y`). Used for the large ML-runtime
/// archives where in-process extraction is not worth it.
pub fn extract_7z(seven_zip: &Path, archive: &Path, dest: &Path) -> Result<(), ExtractError> {
    debug!("extracting {} with {}", archive.display(), seven_zip.display());

    let output = Command::new(seven_zip)
        .arg("x")
        .arg(archive)
        .arg(format!("-o{}", dest.display()))
        .arg("-y")
        .output()
        .map_err(|e| ExtractError::Launch {
            tool: seven_zip.to_path_buf(),
            source: e,
        })?;

    if !output.status.success() {
        return Err(ExtractError::SevenZip {
            exit_code: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::tempdir;
    use zip::write::SimpleFileOptions;

    fn make_test_zip(path: &Path) {
        let file = File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = SimpleFileOptions::default();

        writer.add_directory("nested", options).unwrap();
        writer.start_file("top.txt", options).unwrap();
        writer.write_all(b"top level").unwrap();
        writer.start_file("nested/inner.txt", options).unwrap();
        writer.write_all(b"nested file").unwrap();
        writer.finish().unwrap();
    }

    #[test]
    fn zip_extraction_recreates_structure() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("test.zip");
        let dest = dir.path().join("out");
        make_test_zip(&archive);

        let mut percents = Vec::new();
        extract_zip(&archive, &dest, |p| percents.push(p)).unwrap();

        assert_eq!(fs::read_to_string(dest.join("top.txt")).unwrap(), "top level");
        assert_eq!(
            fs::read_to_string(dest.join("nested").join("inner.txt")).unwrap(),
            "nested file"
        );

        // Progress is entry-count based and ends at 100.
        assert!(!percents.is_empty());
        assert_eq!(*percents.last().unwrap(), 100);
    }

    #[test]
    fn tar_gz_extraction_unpacks() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("test.tar.gz");
        let dest = dir.path().join("out");

        {
            let file = File::create(&archive).unwrap();
            let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
            let mut builder = tar::Builder::new(encoder);

            let data = b"tarred contents";
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, "dir/file.txt", &data[..]).unwrap();
            builder.into_inner().unwrap().finish().unwrap();
        }

        extract_tar_gz(&archive, &dest).unwrap();
        assert_eq!(
            fs::read_to_string(dest.join("dir").join("file.txt")).unwrap(),
            "tarred contents"
        );
    }

    #[test]
    fn dispatch_rejects_unknown_format() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("blob.bin");
        fs::write(&archive, b"not an archive").unwrap();

        let result = extract_archive(&archive, dir.path(), None, |_| {});
        assert!(matches!(result, Err(ExtractError::UnsupportedFormat { .. })));
    }

    #[test]
    fn dispatch_requires_external_tool_for_7z() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("big.7z.001");
        fs::write(&archive, b"").unwrap();

        let result = extract_archive(&archive, dir.path(), None, |_| {});
        assert!(matches!(result, Err(ExtractError::UnsupportedFormat { .. })));
    }
}
