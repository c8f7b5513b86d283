//! Zip extraction for downloaded dataset archives.

use crate::error::{BbbcError, Result};
use std::fs::File;
use std::path::Path;
use tracing::{debug, info};

/// Prefix of the staging directories used while an archive is unpacking.
pub(crate) const STAGING_PREFIX: &str = ".extracting-";

/// Extract every entry of `archive_path` into `dest_dir`.
///
/// Entries are unpacked into a hidden staging directory next to `dest_dir`
/// which is renamed into place once the whole archive is written, so
/// `dest_dir` only ever exists fully populated. Returns the number of files
/// written.
pub fn extract_zip(archive_path: &Path, dest_dir: &Path) -> Result<usize> {
    let parent = dest_dir.parent().ok_or_else(|| BbbcError::Io {
        message: "Extraction target has no parent directory".to_string(),
        path: Some(dest_dir.to_path_buf()),
        source: None,
    })?;
    std::fs::create_dir_all(parent).map_err(|e| BbbcError::io_with_path(e, parent))?;

    let staging = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(parent)
        .map_err(|e| BbbcError::io_with_path(e, parent))?;

    info!("Extracting {}", archive_path.display());
    let written = unpack(archive_path, staging.path())?;

    std::fs::rename(staging.path(), dest_dir).map_err(|e| BbbcError::Io {
        message: format!("Failed to move extracted files into place: {}", e),
        path: Some(dest_dir.to_path_buf()),
        source: Some(e),
    })?;
    // The staging path is gone after the rename; dropping the guard is a no-op.
    drop(staging);

    info!("Extracted {} files to {}", written, dest_dir.display());
    Ok(written)
}

fn unpack(archive_path: &Path, extract_dir: &Path) -> Result<usize> {
    let file = File::open(archive_path).map_err(|e| BbbcError::Io {
        message: format!("Failed to open zip archive: {}", e),
        path: Some(archive_path.to_path_buf()),
        source: Some(e),
    })?;

    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| BbbcError::from(e).with_path(archive_path))?;

    let mut written = 0;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| BbbcError::from(e).with_path(archive_path))?;

        let outpath = match entry.enclosed_name() {
            Some(path) => extract_dir.join(path),
            None => {
                debug!("Skipping unsafe zip entry {:?}", entry.name());
                continue;
            }
        };

        if entry.is_dir() {
            std::fs::create_dir_all(&outpath).map_err(|e| BbbcError::Io {
                message: format!("Failed to create directory: {}", e),
                path: Some(outpath.clone()),
                source: Some(e),
            })?;
            continue;
        }

        if let Some(parent) = outpath.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| BbbcError::Io {
                    message: format!("Failed to create parent directory: {}", e),
                    path: Some(parent.to_path_buf()),
                    source: Some(e),
                })?;
            }
        }

        let mut outfile = File::create(&outpath).map_err(|e| BbbcError::Io {
            message: format!("Failed to create file: {}", e),
            path: Some(outpath.clone()),
            source: Some(e),
        })?;

        std::io::copy(&mut entry, &mut outfile).map_err(|e| BbbcError::Io {
            message: format!("Failed to extract file: {}", e),
            path: Some(outpath.clone()),
            source: Some(e),
        })?;
        written += 1;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode)).ok();
            }
        }
    }

    Ok(written)
}
