// src/error.rs

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, KeyMaterialError>;

#[derive(Debug, Error)]
pub enum KeyMaterialError {
    // --- Programming-contract errors (caller bugs, never retried) ---
    #[error("factory is already bound to context {}", .bound_to.display())]
    AlreadyBound { bound_to: PathBuf },

    #[error("factory must be bound to a materialization context before materialize()")]
    Unbound,

    // --- Filesystem ---
    #[error("failed to {action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid docker configuration {}: {source}", .path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("refusing base directory {}: mode {mode:o} is shared-writable without the sticky bit", .path.display())]
    UnsafeBaseDir { path: PathBuf, mode: u32 },

    #[error("invalid key material descriptor at {entry}: {reason}")]
    InvalidDescriptor { entry: String, reason: String },

    // --- External process ---
    #[error("registry login for {registry} failed: {detail}")]
    Login { registry: String, detail: String },

    // --- Composite lifecycle ---
    /// A composite child failed to materialize. `primary` is that failure;
    /// `release_failures` are the errors hit while unwinding earlier children.
    #[error("{primary} ({} release failure(s) while rolling back)", .release_failures.len())]
    Rollback {
        #[source]
        primary: Box<KeyMaterialError>,
        release_failures: Vec<KeyMaterialError>,
    },

    #[error("failed to release {} key material component(s): {}", .0.len(), join_messages(.0))]
    Release(Vec<KeyMaterialError>),
}

impl KeyMaterialError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io { action, path: path.into(), source }
    }

    /// The error that actually caused a failure, looking through rollback wrapping.
    pub fn primary(&self) -> &KeyMaterialError {
        match self {
            Self::Rollback { primary, .. } => primary.primary(),
            other => other,
        }
    }
}

fn join_messages(errors: &[KeyMaterialError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}
