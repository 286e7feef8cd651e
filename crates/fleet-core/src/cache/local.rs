//! Per-function checksum files.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::CacheWriteError;
use crate::fs::write_atomic;

/// Name of the checksum file written into each function output directory.
pub const CHECKSUM_FILE_NAME: &str = ".fleet-checksum";

/// One plain-text checksum file per function output directory.
///
/// The file is fully overwritten on every write. A missing, empty, or
/// unreadable file reads as "unknown".
#[derive(Debug, Clone)]
pub struct LocalChecksumStore {
    file_name: String,
}

impl Default for LocalChecksumStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalChecksumStore {
    pub fn new() -> Self {
        Self {
            file_name: CHECKSUM_FILE_NAME.to_string(),
        }
    }

    pub fn checksum_path(&self, output_path: &Path) -> PathBuf {
        output_path.join(&self.file_name)
    }

    pub fn read(&self, output_path: &Path) -> Option<String> {
        let path = self.checksum_path(output_path);
        match fs::read_to_string(&path) {
            Ok(content) => {
                let checksum = content.trim();
                if checksum.is_empty() {
                    None
                } else {
                    Some(checksum.to_string())
                }
            }
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "ignoring unreadable checksum file");
                None
            }
        }
    }

    pub fn write(
        &self,
        function_name: &str,
        output_path: &Path,
        checksum: &str,
    ) -> Result<(), CacheWriteError> {
        let path = self.checksum_path(output_path);
        write_atomic(&path, checksum.as_bytes()).map_err(|err| CacheWriteError::Local {
            function: function_name.to_string(),
            message: format!("{err:#}"),
        })?;
        debug!(function = %function_name, path = %path.display(), "checksum written");
        Ok(())
    }
}
