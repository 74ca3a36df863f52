// src/config.rs

use std::env;
use std::path::PathBuf;

use nix::unistd::{User, geteuid};

use crate::sys::login::HomeDockerConfig;

#[derive(Clone, Debug)]
pub struct KeymatConfig {
    // 📂 Where materialization contexts live (one per job invocation).
    pub base_dir: PathBuf,

    // 🐳 The container-runtime client we authenticate for.
    pub docker_bin: PathBuf,

    // Home directory of the execution target; its `.docker/config.json` is
    // sanitized and carried into every isolated registry config.
    pub docker_home: Option<PathBuf>,
}

impl KeymatConfig {
    pub fn load() -> Self {
        Self {
            base_dir: env::var_os("KARI_KEYMAT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/var/run/kari/keymat")),

            docker_bin: env::var_os("KARI_DOCKER_BIN")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("docker")),

            docker_home: env::var_os("KARI_DOCKER_HOME")
                .or_else(|| env::var_os("HOME"))
                .map(PathBuf::from)
                .or_else(passwd_home),
        }
    }

    /// The shared home config every login factory of this process must use.
    /// Without a resolvable home we fall back to a path that never exists, which
    /// reads as an empty config.
    pub fn home_docker_config(&self) -> HomeDockerConfig {
        match &self.docker_home {
            Some(home) => HomeDockerConfig::for_home(home),
            None => HomeDockerConfig::at(self.base_dir.join(".no-home").join("config.json")),
        }
    }
}

/// Home directory from the passwd entry of the effective user.
fn passwd_home() -> Option<PathBuf> {
    User::from_uid(geteuid()).ok().flatten().map(|user| user.dir)
}
