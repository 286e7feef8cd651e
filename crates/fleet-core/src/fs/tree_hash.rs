//! Deterministic content hashing for build artifacts
//!
//! An artifact is either a single bundled file or an output directory. Both
//! hash to a 64-character blake3 hex string that depends only on content
//! (and, for directories, relative paths), never on timestamps or creation
//! order.

use anyhow::Context;
use std::fs;
use std::path::Path;

/// Hash raw bytes to a blake3 hex string.
pub fn hash_bytes(content: &[u8]) -> String {
    blake3::hash(content).to_hex().to_string()
}

/// Compute the checksum of a build artifact.
///
/// # Algorithm
/// - File: `blake3(content)`
/// - Directory: recursive traversal, entries sorted by name. Each entry is
///   one framed record: a tag byte (`0x00` file, `0xFF` directory), then
///   `len(relative_path) as u64 LE || relative_path`, and for files
///   `len(content) as u64 LE || content`. Framing keeps distinct trees from
///   producing the same byte stream.
/// - Top-level entries named in `skip` are left out, so bookkeeping files
///   written next to the artifact never change its checksum
///
/// # Notes
/// - Symlinks are rejected rather than followed
///
/// # Example
/// ```no_run
/// use fleet_core::fs::tree_hash::hash_artifact;
/// use std::path::Path;
///
/// let hash = hash_artifact(Path::new("dist/api-users"), &[".fleet-checksum"])?;
/// assert_eq!(hash.len(), 64);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn hash_artifact(path: &Path, skip: &[&str]) -> anyhow::Result<String> {
    let metadata = fs::symlink_metadata(path)
        .with_context(|| format!("Failed to stat artifact: {}", path.display()))?;

    if metadata.is_file() {
        let content = fs::read(path)
            .with_context(|| format!("Failed to read artifact: {}", path.display()))?;
        return Ok(hash_bytes(&content));
    }
    if !metadata.is_dir() {
        anyhow::bail!("Unsupported artifact type: {}", path.display());
    }

    let mut hasher = blake3::Hasher::new();
    hash_dir_recursive(&mut hasher, path, "", skip)?;
    Ok(hasher.finalize().to_hex().to_string())
}

const FILE_TAG: u8 = 0x00;
const DIR_TAG: u8 = 0xFF;

fn update_framed(hasher: &mut blake3::Hasher, bytes: &[u8]) {
    hasher.update(&(bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

fn hash_dir_recursive(
    hasher: &mut blake3::Hasher,
    dir: &Path,
    base: &str,
    skip: &[&str],
) -> anyhow::Result<()> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?;

    let mut sorted_entries: Vec<_> = entries
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to read directory entries: {}", dir.display()))?;
    sorted_entries.sort_by_key(|e| e.file_name());

    for entry in sorted_entries {
        let name = entry.file_name();
        let name_str = name.to_string_lossy();
        if base.is_empty() && skip.iter().any(|s| *s == name_str) {
            continue;
        }
        let rel_path = if base.is_empty() {
            name_str.to_string()
        } else {
            format!("{}/{}", base, name_str)
        };

        let ty = entry
            .file_type()
            .with_context(|| format!("Failed to stat file: {}", entry.path().display()))?;

        if ty.is_dir() {
            hasher.update(&[DIR_TAG]);
            update_framed(hasher, rel_path.as_bytes());
            hash_dir_recursive(hasher, &entry.path(), &rel_path, skip)?;
        } else if ty.is_file() {
            let content = fs::read(entry.path())
                .with_context(|| format!("Failed to read file: {}", entry.path().display()))?;
            hasher.update(&[FILE_TAG]);
            update_framed(hasher, rel_path.as_bytes());
            update_framed(hasher, &content);
        } else if ty.is_symlink() {
            anyhow::bail!("Symlinks are not supported: {}", entry.path().display());
        } else {
            anyhow::bail!(
                "Unsupported filesystem entry type: {}",
                entry.path().display()
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_file(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create_dir_all should succeed in test temp dirs");
        }
        fs::write(path, content).expect("write should succeed in test temp dirs");
    }

    #[test]
    fn test_single_file_artifact_hashes_content() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let file = tmp.path().join("index.js");
        write_file(&file, "export const handler = () => 1;");

        let hash = hash_artifact(&file, &[]).expect("hash_artifact should succeed");
        assert_eq!(hash, hash_bytes(b"export const handler = () => 1;"));
        assert_eq!(hash.len(), 64);
    }

    #[test]
    fn test_directory_hash_ignores_creation_order() {
        let tmp1 = TempDir::new().expect("tempdir should succeed");
        write_file(&tmp1.path().join("a.js"), "a");
        write_file(&tmp1.path().join("lib").join("b.js"), "b");

        let tmp2 = TempDir::new().expect("tempdir should succeed");
        write_file(&tmp2.path().join("lib").join("b.js"), "b");
        write_file(&tmp2.path().join("a.js"), "a");

        let hash1 = hash_artifact(tmp1.path(), &[]).expect("hash_artifact should succeed");
        let hash2 = hash_artifact(tmp2.path(), &[]).expect("hash_artifact should succeed");
        assert_eq!(hash1, hash2);
    }

    #[test]
    fn test_directory_hash_changes_with_content_and_name() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        write_file(&tmp.path().join("index.js"), "v1");
        let original = hash_artifact(tmp.path(), &[]).expect("hash_artifact should succeed");

        write_file(&tmp.path().join("index.js"), "v2");
        let modified = hash_artifact(tmp.path(), &[]).expect("hash_artifact should succeed");
        assert_ne!(original, modified);

        fs::remove_file(tmp.path().join("index.js")).expect("remove should succeed");
        write_file(&tmp.path().join("main.js"), "v2");
        let renamed = hash_artifact(tmp.path(), &[]).expect("hash_artifact should succeed");
        assert_ne!(modified, renamed);
    }

    #[test]
    fn test_file_boundaries_are_part_of_the_hash() {
        let split = TempDir::new().expect("tempdir should succeed");
        write_file(&split.path().join("a.js"), "");
        write_file(&split.path().join("b.js"), "");

        let merged = TempDir::new().expect("tempdir should succeed");
        write_file(&merged.path().join("a.js"), "b.js\0");

        let split_hash = hash_artifact(split.path(), &[]).expect("hash_artifact should succeed");
        let merged_hash = hash_artifact(merged.path(), &[]).expect("hash_artifact should succeed");
        assert_ne!(split_hash, merged_hash);
    }

    #[test]
    fn test_empty_directory_differs_from_empty_file() {
        let as_dir = TempDir::new().expect("tempdir should succeed");
        fs::create_dir(as_dir.path().join("lib")).expect("create_dir should succeed");

        let as_file = TempDir::new().expect("tempdir should succeed");
        write_file(&as_file.path().join("lib"), "");

        let dir_hash = hash_artifact(as_dir.path(), &[]).expect("hash_artifact should succeed");
        let file_hash = hash_artifact(as_file.path(), &[]).expect("hash_artifact should succeed");
        assert_ne!(dir_hash, file_hash);
    }

    #[test]
    fn test_skipped_top_level_entries_do_not_affect_hash() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        write_file(&tmp.path().join("index.js"), "body");
        let before =
            hash_artifact(tmp.path(), &[".fleet-checksum"]).expect("hash_artifact should succeed");

        write_file(&tmp.path().join(".fleet-checksum"), "deadbeef");
        let after =
            hash_artifact(tmp.path(), &[".fleet-checksum"]).expect("hash_artifact should succeed");
        assert_eq!(before, after);

        let unskipped = hash_artifact(tmp.path(), &[]).expect("hash_artifact should succeed");
        assert_ne!(before, unskipped);
    }

    #[test]
    fn test_nonexistent_path_fails() {
        let result = hash_artifact(Path::new("/nonexistent/path/that/does/not/exist"), &[]);
        assert!(result.is_err());
    }
}
