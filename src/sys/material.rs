// src/sys/material.rs

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{KeyMaterialError, Result};
use crate::sys::env::EnvVars;

/// What a materialization left behind that release has to undo.
#[derive(Debug)]
enum Backing {
    /// Nothing on disk (host-only, null, TLS with no secrets).
    Nothing,
    /// A private directory owned exclusively by this material.
    Directory(PathBuf),
    /// Child materials, in composition order.
    Composite(Vec<KeyMaterial>),
    #[cfg(test)]
    Scripted(testing::ScriptedRelease),
}

/// A disposable bundle of environment variables plus whatever secret files
/// back them. Exclusively owned by whoever called `materialize()`.
///
/// Call [`KeyMaterial::release`] once the subprocess is done. A material that is
/// dropped unreleased is released best-effort on drop.
#[derive(Debug)]
pub struct KeyMaterial {
    env: EnvVars,
    backing: Backing,
    released: bool,
}

impl KeyMaterial {
    /// The identity material: no variables, nothing to release.
    pub fn empty() -> Self {
        Self::env_only(EnvVars::new())
    }

    pub(crate) fn env_only(env: EnvVars) -> Self {
        Self {
            env,
            backing: Backing::Nothing,
            released: false,
        }
    }

    pub(crate) fn with_directory(env: EnvVars, directory: PathBuf) -> Self {
        Self {
            env,
            backing: Backing::Directory(directory),
            released: false,
        }
    }

    pub(crate) fn composite(env: EnvVars, children: Vec<KeyMaterial>) -> Self {
        Self {
            env,
            backing: Backing::Composite(children),
            released: false,
        }
    }

    pub fn env(&self) -> &EnvVars {
        &self.env
    }

    /// The secret directory this material owns, if it is a leaf that wrote one.
    pub fn directory(&self) -> Option<&Path> {
        match &self.backing {
            Backing::Directory(path) => Some(path),
            _ => None,
        }
    }

    /// Child materials of a composite, in composition order. Empty for leaves.
    pub fn components(&self) -> &[KeyMaterial] {
        match &self.backing {
            Backing::Composite(children) => children,
            _ => &[],
        }
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Reverses whatever `materialize()` did.
    ///
    /// Composite children are released in composition order; every child is
    /// attempted even if an earlier one fails, and all failures come back in a
    /// single [`KeyMaterialError::Release`]. A second call is a no-op.
    pub fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }

        let outcome = match &mut self.backing {
            Backing::Nothing => Ok(()),
            Backing::Directory(path) => remove_private_dir(path),
            Backing::Composite(children) => release_all(children),
            #[cfg(test)]
            Backing::Scripted(script) => script.release(),
        };

        // Leaf failures stay retryable; composite children that did succeed
        // are already marked and will not be touched again.
        if outcome.is_ok() {
            self.released = true;
        }
        outcome
    }
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.release() {
            warn!(error = %e, "key material dropped without release and cleanup failed");
        }
    }
}

/// Releases every child in order, collecting (never swallowing) failures.
pub(crate) fn release_all(children: &mut [KeyMaterial]) -> Result<()> {
    let failures: Vec<KeyMaterialError> = children
        .iter_mut()
        .filter_map(|child| child.release().err())
        .collect();

    if failures.is_empty() {
        Ok(())
    } else {
        Err(KeyMaterialError::Release(failures))
    }
}

/// Recursively deletes a secret directory. A directory that is already gone
/// counts as released.
fn remove_private_dir(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => {
            info!(path = %path.display(), "🧹 secret directory removed");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "secret directory already absent");
            Ok(())
        }
        Err(e) => Err(KeyMaterialError::io("remove secret directory", path, e)),
    }
}

/// Key material whose release fails on demand, for exercising failure paths
/// that real directories cannot produce when tests run as root.
#[cfg(test)]
pub(crate) mod testing {
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use super::{Backing, KeyMaterial};
    use crate::error::{KeyMaterialError, Result};
    use crate::sys::env::EnvVars;

    pub(crate) type ReleaseLog = Arc<Mutex<Vec<&'static str>>>;

    #[derive(Debug)]
    pub(crate) struct ScriptedRelease {
        label: &'static str,
        failures_left: AtomicUsize,
        log: ReleaseLog,
    }

    impl ScriptedRelease {
        pub(super) fn release(&self) -> Result<()> {
            self.log.lock().unwrap().push(self.label);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left == 0 {
                return Ok(());
            }
            self.failures_left.store(left - 1, Ordering::SeqCst);
            Err(KeyMaterialError::io(
                "remove secret directory",
                format!("/scripted/{}", self.label),
                io::Error::from(io::ErrorKind::PermissionDenied),
            ))
        }
    }

    /// Material labelled `label` that fails its first `failures` releases.
    pub(crate) fn scripted(label: &'static str, failures: usize, log: &ReleaseLog) -> KeyMaterial {
        KeyMaterial {
            env: EnvVars::new(),
            backing: Backing::Scripted(ScriptedRelease {
                label,
                failures_left: AtomicUsize::new(failures),
                log: Arc::clone(log),
            }),
            released: false,
        }
    }
}
