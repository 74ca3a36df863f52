// src/sys/private_fs.rs
//
// 🛡️ Owner-only filesystem primitives shared by the leaf strategies.

use std::fs::{self, OpenOptions, Permissions};
use std::io::{self, Write};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::{KeyMaterialError, Result};

/// rwx------ for directories, rw------- for files.
pub const PRIVATE_DIR_MODE: u32 = 0o700;
pub const PRIVATE_FILE_MODE: u32 = 0o600;
const STICKY_BIT: u32 = 0o1000;

/// Readies the directory materialization contexts are rooted at.
///
/// A directory we create is locked to the owner. An existing directory is left
/// as it is (it may be shared, e.g. `/tmp`), unless others can write into it
/// without the sticky bit, in which case they could swap our subdirectories.
pub fn prepare_base_dir(path: &Path) -> Result<()> {
    match fs::metadata(path) {
        Ok(meta) => {
            let mode = meta.permissions().mode();
            if !meta.is_dir() {
                return Err(KeyMaterialError::io(
                    "use as base directory",
                    path,
                    io::Error::new(io::ErrorKind::InvalidInput, "not a directory"),
                ));
            }
            if mode & 0o022 != 0 && mode & STICKY_BIT == 0 {
                return Err(KeyMaterialError::UnsafeBaseDir {
                    path: path.to_path_buf(),
                    mode: mode & 0o7777,
                });
            }
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(path)
                .map_err(|e| KeyMaterialError::io("create base directory", path, e))?;
            // 🛡️ SECURITY BOUNDARY: only the directory we just made is tightened.
            fs::set_permissions(path, Permissions::from_mode(PRIVATE_DIR_MODE))
                .map_err(|e| KeyMaterialError::io("restrict permissions of", path, e))
        }
        Err(e) => Err(KeyMaterialError::io("inspect base directory", path, e)),
    }
}

/// Creates a fresh, unpredictably named directory under `base` and locks it to
/// the owner before anything is written into it.
///
/// The returned guard deletes the directory if it is dropped, so a strategy
/// that fails halfway through leaves nothing behind. Call [`keep`] once the
/// directory is fully populated to hand ownership to a `KeyMaterial`.
pub fn create_private_dir(base: &Path, prefix: &str) -> Result<TempDir> {
    let dir = tempfile::Builder::new()
        .prefix(prefix)
        .rand_bytes(12)
        .tempdir_in(base)
        .map_err(|e| KeyMaterialError::io("create secret directory in", base, e))?;

    // tempfile already creates 0700 on unix; set it explicitly so a future
    // default change cannot widen it.
    fs::set_permissions(dir.path(), Permissions::from_mode(PRIVATE_DIR_MODE))
        .map_err(|e| KeyMaterialError::io("restrict permissions of", dir.path(), e))?;

    Ok(dir)
}

/// Disarms the cleanup guard and returns the directory path.
pub fn keep(dir: TempDir) -> PathBuf {
    dir.keep()
}

/// Writes `contents` to `path`, created 0600 from inception and synced to disk.
pub fn write_private_file(path: &Path, contents: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(PRIVATE_FILE_MODE)
        .open(path)
        .map_err(|e| KeyMaterialError::io("open secret file", path, e))?;

    file.write_all(contents)
        .map_err(|e| KeyMaterialError::io("write secret file", path, e))?;

    file.sync_all()
        .map_err(|e| KeyMaterialError::io("sync secret file", path, e))?;

    Ok(())
}
