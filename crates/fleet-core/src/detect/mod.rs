//! Change detection for freshly built artifacts.
//!
//! A function is redeployed unless its new checksum is known to equal the
//! checksum of its last successful deploy. Any uncertainty (no prior value,
//! unreadable artifact, aborted hashing) counts as a change.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::cache::local::CHECKSUM_FILE_NAME;
use crate::error::ChecksumError;
use crate::fs::hash_artifact;

/// Why a function must be redeployed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeReason {
    /// Neither cache knows this function.
    NoPriorChecksum,
    /// The content hash differs from the cached one.
    ChecksumDiffers,
    /// The artifact could not be hashed.
    Unreadable(String),
    /// Redeploy was requested regardless of content.
    Forced,
}

impl std::fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoPriorChecksum => write!(f, "no cached checksum"),
            Self::ChecksumDiffers => write!(f, "checksum differs"),
            Self::Unreadable(message) => write!(f, "checksum unavailable: {message}"),
            Self::Forced => write!(f, "forced"),
        }
    }
}

/// Result of comparing a new artifact against its cached checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeDecision {
    Unchanged {
        checksum: String,
    },
    Changed {
        /// `None` when hashing failed; nothing can be cached for this run.
        checksum: Option<String>,
        reason: ChangeReason,
    },
}

impl ChangeDecision {
    pub fn is_changed(&self) -> bool {
        matches!(self, Self::Changed { .. })
    }

    pub fn checksum(&self) -> Option<&str> {
        match self {
            Self::Unchanged { checksum } => Some(checksum),
            Self::Changed { checksum, .. } => checksum.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChangeDetector {
    force: bool,
}

impl ChangeDetector {
    pub fn new(force: bool) -> Self {
        Self { force }
    }

    /// Hash an artifact the same way the local cache records it.
    pub fn checksum(artifact: &Path) -> Result<String, ChecksumError> {
        hash_artifact(artifact, &[CHECKSUM_FILE_NAME]).map_err(|err| ChecksumError::Unreadable {
            path: artifact.to_path_buf(),
            message: format!("{err:#}"),
        })
    }

    /// Decide from an already computed checksum.
    pub fn compare(
        &self,
        computed: Result<String, ChecksumError>,
        prior: Option<&str>,
    ) -> ChangeDecision {
        let checksum = match computed {
            Ok(checksum) => checksum,
            Err(err) => {
                return ChangeDecision::Changed {
                    checksum: None,
                    reason: ChangeReason::Unreadable(err.to_string()),
                };
            }
        };

        if self.force {
            return ChangeDecision::Changed {
                checksum: Some(checksum),
                reason: ChangeReason::Forced,
            };
        }

        match prior {
            None => ChangeDecision::Changed {
                checksum: Some(checksum),
                reason: ChangeReason::NoPriorChecksum,
            },
            Some(prior) if prior == checksum => ChangeDecision::Unchanged { checksum },
            Some(_) => ChangeDecision::Changed {
                checksum: Some(checksum),
                reason: ChangeReason::ChecksumDiffers,
            },
        }
    }

    /// Hash `artifact` off the async runtime and compare with `prior`.
    pub async fn detect(&self, artifact: &Path, prior: Option<&str>) -> ChangeDecision {
        let path: PathBuf = artifact.to_path_buf();
        let computed = tokio::task::spawn_blocking(move || Self::checksum(&path))
            .await
            .unwrap_or_else(|err| Err(ChecksumError::Aborted(err.to_string())));

        let decision = self.compare(computed, prior);
        debug!(artifact = %artifact.display(), ?decision, "change detection");
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn unreadable() -> Result<String, ChecksumError> {
        Err(ChecksumError::Unreadable {
            path: PathBuf::from("dist/x"),
            message: "gone".to_string(),
        })
    }

    #[test]
    fn equal_checksum_is_unchanged() {
        let detector = ChangeDetector::default();
        let decision = detector.compare(Ok("abc".to_string()), Some("abc"));
        assert_eq!(
            decision,
            ChangeDecision::Unchanged {
                checksum: "abc".to_string()
            }
        );
        assert!(!decision.is_changed());
    }

    #[test]
    fn missing_prior_is_changed() {
        let decision = ChangeDetector::default().compare(Ok("abc".to_string()), None);
        assert_eq!(
            decision,
            ChangeDecision::Changed {
                checksum: Some("abc".to_string()),
                reason: ChangeReason::NoPriorChecksum,
            }
        );
    }

    #[test]
    fn comparison_is_exact() {
        let decision = ChangeDetector::default().compare(Ok("abc".to_string()), Some("ABC"));
        assert!(decision.is_changed());
    }

    #[test]
    fn hashing_failure_fails_open() {
        let decision = ChangeDetector::default().compare(unreadable(), Some("abc"));
        assert!(decision.is_changed());
        assert_eq!(decision.checksum(), None);
        assert!(matches!(
            decision,
            ChangeDecision::Changed {
                reason: ChangeReason::Unreadable(_),
                ..
            }
        ));
    }

    #[test]
    fn force_overrides_equal_checksum() {
        let decision = ChangeDetector::new(true).compare(Ok("abc".to_string()), Some("abc"));
        assert_eq!(
            decision,
            ChangeDecision::Changed {
                checksum: Some("abc".to_string()),
                reason: ChangeReason::Forced,
            }
        );
    }
}
