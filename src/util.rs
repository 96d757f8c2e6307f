//! Shared utilities: project-root resolution, directory scanning, and
//! configuration-name validation.
//!
//! Every relative path in this crate is resolved against [`project_root`],
//! which is baked in at build time. This keeps configuration directories and
//! test fixtures addressable with short, stable paths regardless of the
//! process working directory.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Build-time project root. Prefix for every relative path the crate touches.
///
/// Resolved from `CARGO_MANIFEST_DIR`, so binaries built from this crate see
/// the crate checkout as their root.
#[must_use]
pub fn project_root() -> &'static Path {
    Path::new(env!("CARGO_MANIFEST_DIR"))
}

/// Recursively collects all files with the given extension beneath a
/// project-root-relative directory.
///
/// The extension match is exact and case-sensitive (`"yml"` does not match
/// `file.YML`). A missing or non-directory path yields an empty list;
/// unreadable entries are skipped with a warning.
#[must_use]
pub fn list_files_with_ext(relative_dir: &Path, extension: &str) -> Vec<PathBuf> {
    let root = project_root().join(relative_dir);
    let mut result = Vec::new();
    if !root.is_dir() {
        return result;
    }
    collect_files(&root, extension, &mut result);
    result
}

fn collect_files(dir: &Path, extension: &str, out: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!(dir = %dir.display(), error = %err, "skipping unreadable directory");
            return;
        }
    };

    for entry in entries {
        let Ok(entry) = entry else { continue };
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, extension, out);
        } else if path.extension().and_then(|e| e.to_str()) == Some(extension) {
            out.push(path);
        }
    }
}

/// Returns `true` if `name` is a valid configuration key.
///
/// Valid keys are non-empty and consist only of `[0-9a-z_.]`. The check is
/// case-sensitive; uppercase is rejected.
#[must_use]
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'.')
}

/// Converts a filesystem modification time into an integer timestamp.
///
/// The absolute value is meaningless; callers compare timestamps only for
/// equality (file-change detection). Pre-epoch times collapse to zero.
#[must_use]
pub fn unix_timestamp(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
