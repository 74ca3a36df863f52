// src/sys/traits.rs

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;

use regex::Regex;

// ==============================================================================
// Registry Login (external, idempotent side effect)
// ==============================================================================

/// Everything the login side effect needs. The password is only ever exposed
/// to the implementation, never stored here in plaintext.
pub struct LoginRequest<'a> {
    pub registry: &'a str,
    pub username: &'a str,
    pub password: &'a [u8],
    /// Isolated docker config directory the login must write into.
    pub config_dir: &'a Path,
}

/// Performs a registry login against an isolated config directory.
///
/// Implementations block until the login finishes. Cancellation is whatever
/// the underlying process offers (kill / timeout).
pub trait RegistryLogin: Send + Sync {
    fn login(&self, request: &LoginRequest<'_>) -> Result<(), String>;
}

/// Runs `docker --config <dir> login --username <user> --password-stdin <registry>`.
pub struct DockerCliLogin {
    docker_bin: PathBuf,
}

impl DockerCliLogin {
    pub fn new(docker_bin: impl Into<PathBuf>) -> Self {
        Self {
            docker_bin: docker_bin.into(),
        }
    }

    /// 🛡️ Strips `scheme://user:secret@` credentials from CLI output.
    pub fn scrub_credentials(input: &str) -> String {
        static CREDENTIALS: OnceLock<Regex> = OnceLock::new();
        // Constant pattern: compiling it cannot fail.
        let re = CREDENTIALS
            .get_or_init(|| Regex::new(r"(://)([^@/\s]+)@").expect("credential scrubber regex is valid"));
        re.replace_all(input, "$1[REDACTED]@").into_owned()
    }
}

impl RegistryLogin for DockerCliLogin {
    fn login(&self, request: &LoginRequest<'_>) -> Result<(), String> {
        // 🛡️ Zero-Trust Guard: Argument Injection Protection
        if request.registry.starts_with('-') || request.username.starts_with('-') {
            return Err("SECURITY VIOLATION: Suspicious login arguments detected".into());
        }

        // Password goes over stdin, never argv.
        let mut child = Command::new(&self.docker_bin)
            .arg("--config")
            .arg(request.config_dir)
            .arg("login")
            .arg("--username")
            .arg(request.username)
            .arg("--password-stdin")
            .arg("--")
            .arg(request.registry)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| format!("Failed to spawn {}: {}", self.docker_bin.display(), e))?;

        // Closing stdin (end of this statement) signals end of password.
        let sent = match child.stdin.take() {
            Some(mut stdin) => stdin
                .write_all(request.password)
                .map_err(|e| format!("Failed to pass password to login: {}", e)),
            None => Err("Failed to open login stdin".to_string()),
        };
        if let Err(e) = sent {
            // Reap the half-started login so it does not linger as a zombie.
            let _ = child.kill();
            let _ = child.wait();
            return Err(e);
        }

        let output = child
            .wait_with_output()
            .map_err(|e| format!("Failed to wait for login: {}", e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "docker login exited with code {}: {}",
                output.status.code().unwrap_or(-1),
                Self::scrub_credentials(stderr.trim())
            ));
        }

        Ok(())
    }
}
