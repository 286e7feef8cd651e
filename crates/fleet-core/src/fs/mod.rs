//! Filesystem primitives shared across features.

pub mod tree_hash;

use std::fs;
use std::path::Path;

use anyhow::Context;

pub use tree_hash::{hash_artifact, hash_bytes};

/// Replace `path` with `bytes` atomically (tmp + rename).
///
/// The temp file lives next to the target so the rename never crosses
/// filesystems.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create directory: {}", parent.display()))?;

    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("Invalid target path: {}", path.display()))?;
    let tmp_path = parent.join(format!(
        "{}.{}.tmp",
        file_name.to_string_lossy(),
        std::process::id()
    ));

    fs::write(&tmp_path, bytes)
        .with_context(|| format!("Failed to write tmp file: {}", tmp_path.display()))?;

    // Remove target first on Windows for replace semantics
    if cfg!(windows) && path.exists() {
        fs::remove_file(path)
            .with_context(|| format!("Failed to remove existing file: {}", path.display()))?;
    }
    fs::rename(&tmp_path, path)
        .with_context(|| format!("Failed to rename tmp file: {}", tmp_path.display()))?;

    Ok(())
}
