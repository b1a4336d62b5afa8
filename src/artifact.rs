//! The versioned artifact being replicated.
//!
//! An immutable value type: name, content, monotonically increasing
//! version, with size and content hash derived rather than stored
//! redundantly.

use sha2::{Digest, Sha256};

/// Default maximum artifact size, in bytes.
pub const DEFAULT_MAX_SIZE: usize = 100_000;

/// An immutable, versioned file-like value.
///
/// `size` and `hash` are derived from `content` at construction rather than
/// tracked as separate mutable fields, so they can never drift out of sync
/// with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    name: String,
    content: Vec<u8>,
    version: u64,
    hash: String,
}

impl Artifact {
    /// Creates a new artifact at the given version.
    ///
    /// Does not validate; call [`Artifact::validate`] before handing it to
    /// a replica.
    #[must_use]
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>, version: u64) -> Self {
        let content = content.into();
        let hash = Self::hash_of(&content);
        Self {
            name: name.into(),
            content,
            version,
            hash,
        }
    }

    /// Creates the initial version (1) of an artifact.
    #[must_use]
    pub fn initial(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self::new(name, content, 1)
    }

    /// Derives the next sequential version of this artifact, naming it
    /// `updated_file_v{version}.txt`. Callers supply the content so
    /// successive updates can be synthesized programmatically.
    #[must_use]
    pub fn next_version(&self, content: impl Into<Vec<u8>>) -> Self {
        let version = self.version + 1;
        Self::new(format!("updated_file_v{version}.txt"), content, version)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.content.len()
    }

    #[must_use]
    pub fn hash(&self) -> &str {
        &self.hash
    }

    fn hash_of(content: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content);
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }

    /// Validates the artifact: name must end in `.txt`, size must not
    /// exceed `max_size`. Returns `(true, _)` on success or `(false,
    /// reason)` with a diagnostic otherwise. Pure — performs no I/O and
    /// mutates nothing.
    #[must_use]
    pub fn validate(&self, max_size: usize) -> (bool, String) {
        if !self.name.ends_with(".txt") {
            return (false, "artifact name must have a .txt extension".into());
        }
        if self.size() > max_size {
            return (
                false,
                format!(
                    "artifact size exceeds the limit of {max_size} bytes (actual: {} bytes)",
                    self.size()
                ),
            );
        }
        (true, "artifact is valid".into())
    }

    /// Validates against [`DEFAULT_MAX_SIZE`].
    #[must_use]
    pub fn validate_default(&self) -> (bool, String) {
        self.validate(DEFAULT_MAX_SIZE)
    }
}
