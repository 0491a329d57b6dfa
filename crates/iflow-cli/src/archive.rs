//! Upload intake: a zip archive (or an already extracted directory) to an [`Upload`].

use anyhow::{bail, Context, Result};
use std::io::{Cursor, Read};
use std::path::Path;
use tracing::{debug, info, warn};

use iflow_core::document::{is_iflow_path, SourceFile};
use iflow_core::naming::derive_folder_name;
use iflow_core::pipeline::Upload;

/// Entries produced by archiving tools, never part of the bundle.
const IGNORED_PREFIXES: &[&str] = &["__MACOSX/"];

/// Read an archive file or directory, enforcing the size ceiling.
pub fn read_upload(path: &Path, max_bytes: u64) -> Result<Upload> {
    let display_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    if path.is_dir() {
        return read_directory(path, &display_name, max_bytes);
    }

    let size = std::fs::metadata(path)
        .with_context(|| format!("Cannot read {}", path.display()))?
        .len();
    if size > max_bytes {
        bail!(
            "{} is {} bytes, above the upload ceiling of {} bytes",
            path.display(),
            size,
            max_bytes
        );
    }
    let bytes = std::fs::read(path).with_context(|| format!("Cannot read {}", path.display()))?;
    read_zip(&display_name, &bytes, max_bytes)
}

/// Unpack `.iflw` entries of a zip held in memory.
///
/// The total uncompressed size of the kept entries is capped at `max_bytes`.
/// Entries whose names escape the archive root are skipped.
pub fn read_zip(archive_name: &str, bytes: &[u8], max_bytes: u64) -> Result<Upload> {
    if bytes.len() as u64 > max_bytes {
        bail!(
            "{archive_name} is {} bytes, above the upload ceiling of {max_bytes} bytes",
            bytes.len()
        );
    }
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .with_context(|| format!("{archive_name} is not a valid zip archive"))?;

    let mut names = Vec::with_capacity(archive.len());
    let mut files = Vec::new();
    let mut budget = max_bytes;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .with_context(|| format!("Corrupted entry #{index} in {archive_name}"))?;

        let Some(safe) = entry.enclosed_name() else {
            warn!(entry = entry.name(), "Skipping archive entry outside the archive root");
            continue;
        };
        let name = safe.to_string_lossy().replace('\\', "/");
        if IGNORED_PREFIXES.iter().any(|p| name.starts_with(p)) {
            continue;
        }
        names.push(name.clone());

        if entry.is_dir() || !is_iflow_path(&name) {
            continue;
        }

        let mut content = Vec::new();
        (&mut entry)
            .take(budget.saturating_add(1))
            .read_to_end(&mut content)
            .with_context(|| format!("Cannot extract {name} from {archive_name}"))?;
        let read = content.len() as u64;
        if read > budget {
            bail!("{archive_name} expands beyond the upload ceiling of {max_bytes} bytes");
        }
        budget -= read;

        debug!(entry = %name, bytes = read, "Extracted iFlow document");
        files.push(SourceFile::new(name, content));
    }

    info!(archive = archive_name, entries = names.len(), iflows = files.len(), "Archive read");
    let name = derive_folder_name(names.iter().map(String::as_str), archive_name);
    Ok(Upload::new(archive_name, files).with_name(name))
}

/// Collect `.iflw` files below `root`, with paths relative to it.
fn read_directory(root: &Path, display_name: &str, max_bytes: u64) -> Result<Upload> {
    let mut names = Vec::new();
    let mut files = Vec::new();
    let mut total = 0u64;
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = std::fs::read_dir(&dir)
            .with_context(|| format!("Cannot list {}", dir.display()))?
            .collect::<std::io::Result<Vec<_>>>()?;
        entries.sort_by_key(|e| e.path());

        for entry in entries {
            let path = entry.path();
            let relative = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");
            let file_type = entry
                .file_type()
                .with_context(|| format!("Cannot stat {}", path.display()))?;
            if file_type.is_symlink() {
                continue;
            }
            if file_type.is_dir() {
                names.push(format!("{relative}/"));
                pending.push(path);
                continue;
            }
            names.push(relative.clone());
            if !is_iflow_path(&relative) {
                continue;
            }
            let content =
                std::fs::read(&path).with_context(|| format!("Cannot read {}", path.display()))?;
            total += content.len() as u64;
            if total > max_bytes {
                bail!("{display_name} exceeds the upload ceiling of {max_bytes} bytes");
            }
            files.push(SourceFile::new(relative, content));
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    let name = derive_folder_name(names.iter().map(String::as_str), display_name);
    Ok(Upload::new(display_name, files).with_name(name))
}
