// src/sys/context.rs

use std::path::{Path, PathBuf};

/// The filesystem scope a factory is allowed to create secret artifacts in.
///
/// Created once per job by the caller and shared by every factory bound for
/// that job. It never holds secrets itself; each leaf strategy picks its own
/// randomly named subdirectory underneath `base_directory`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MaterializationContext {
    base_directory: PathBuf,
}

impl MaterializationContext {
    pub fn new(base_directory: impl Into<PathBuf>) -> Self {
        Self {
            base_directory: base_directory.into(),
        }
    }

    pub fn base_directory(&self) -> &Path {
        &self.base_directory
    }
}
