// src/sys/tls.rs

use tracing::{debug, info};

use crate::error::Result;
use crate::sys::context::MaterializationContext;
use crate::sys::env::{DOCKER_CERT_PATH, DOCKER_HOST, DOCKER_TLS_VERIFY, EnvVars};
use crate::sys::material::KeyMaterial;
use crate::sys::private_fs::{create_private_dir, keep, write_private_file};
use crate::sys::secrets::{ProviderCredential, TlsSecrets};

// File names the docker CLI looks for inside DOCKER_CERT_PATH.
pub const KEY_FILE: &str = "key.pem";
pub const CERT_FILE: &str = "cert.pem";
pub const CA_FILE: &str = "ca.pem";

const TLS_DIR_PREFIX: &str = "keymat-tls-";

// ==============================================================================
// 1. Host-only (no secrets at all)
// ==============================================================================

pub fn materialize_host(uri: &str) -> KeyMaterial {
    debug!(host = %uri, "materializing daemon address");
    KeyMaterial::env_only(host_env(Some(uri)))
}

fn host_env(uri: Option<&str>) -> EnvVars {
    let mut env = EnvVars::new();
    if let Some(uri) = uri {
        env.insert(DOCKER_HOST.to_string(), uri.to_string());
    }
    env
}

// ==============================================================================
// 2. TLS key pair
// ==============================================================================

/// Writes whichever of key / cert / CA are present into a fresh owner-only
/// directory and points DOCKER_CERT_PATH at it.
///
/// With no secrets present nothing touches the disk and only the daemon
/// address (if any) is returned.
pub fn materialize_tls(
    context: &MaterializationContext,
    host: Option<&str>,
    secrets: &TlsSecrets,
) -> Result<KeyMaterial> {
    let mut env = host_env(host);

    if secrets.is_empty() {
        debug!("no TLS secrets supplied, skipping certificate directory");
        return Ok(KeyMaterial::env_only(env));
    }

    // Dropping `dir` on any early return below removes the partial directory.
    let dir = create_private_dir(context.base_directory(), TLS_DIR_PREFIX)?;

    let files = [
        (KEY_FILE, &secrets.client_key),
        (CERT_FILE, &secrets.client_cert),
        (CA_FILE, &secrets.ca_cert),
    ];
    for (name, secret) in files {
        if let Some(secret) = secret {
            write_secret(&dir.path().join(name), secret)?;
        }
    }

    let cert_path = keep(dir);
    info!(path = %cert_path.display(), "🔐 TLS key material written");

    env.insert(DOCKER_TLS_VERIFY.to_string(), "1".to_string());
    env.insert(DOCKER_CERT_PATH.to_string(), cert_path.to_string_lossy().into_owned());

    Ok(KeyMaterial::with_directory(env, cert_path))
}

fn write_secret(path: &std::path::Path, secret: &ProviderCredential) -> Result<()> {
    // 🚨 The plaintext slice never leaves this closure.
    secret.use_secret(|bytes| write_private_file(path, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use tempfile::TempDir;

    fn entries(dir: &Path) -> usize {
        fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn host_only_sets_daemon_address() {
        let material = materialize_host("tcp://docker.example:2376");
        assert_eq!(material.env().get(DOCKER_HOST).unwrap(), "tcp://docker.example:2376");
        assert_eq!(material.env().len(), 1);
        assert!(material.directory().is_none());
    }

    #[test]
    fn no_secrets_creates_no_directory() {
        let base = TempDir::new().unwrap();
        let ctx = MaterializationContext::new(base.path());

        let material =
            materialize_tls(&ctx, Some("tcp://docker.example:2376"), &TlsSecrets::default()).unwrap();

        assert_eq!(entries(base.path()), 0);
        assert!(material.env().get(DOCKER_TLS_VERIFY).is_none());
        assert!(material.env().get(DOCKER_CERT_PATH).is_none());
        assert_eq!(material.env().get(DOCKER_HOST).unwrap(), "tcp://docker.example:2376");
    }

    #[test]
    fn full_round_trip() {
        let base = TempDir::new().unwrap();
        let ctx = MaterializationContext::new(base.path());
        let secrets = TlsSecrets {
            client_key: Some("a".into()),
            client_cert: Some("b".into()),
            ca_cert: Some("c".into()),
        };

        let mut material = materialize_tls(&ctx, None, &secrets).unwrap();

        assert_eq!(material.env().get(DOCKER_TLS_VERIFY).unwrap(), "1");
        let cert_path = Path::new(material.env().get(DOCKER_CERT_PATH).unwrap()).to_path_buf();
        assert!(cert_path.starts_with(base.path()));
        for (name, contents) in [(KEY_FILE, "a"), (CERT_FILE, "b"), (CA_FILE, "c")] {
            let file = cert_path.join(name);
            assert_eq!(fs::read_to_string(&file).unwrap(), contents);
            assert_eq!(fs::metadata(&file).unwrap().permissions().mode() & 0o777, 0o600);
        }
        assert_eq!(fs::metadata(&cert_path).unwrap().permissions().mode() & 0o777, 0o700);

        material.release().unwrap();
        assert!(!cert_path.exists());
        assert_eq!(entries(base.path()), 0);
    }

    #[test]
    fn absent_secrets_are_not_written() {
        let base = TempDir::new().unwrap();
        let ctx = MaterializationContext::new(base.path());
        let secrets = TlsSecrets {
            ca_cert: Some("ca-only".into()),
            ..Default::default()
        };

        let mut material = materialize_tls(&ctx, None, &secrets).unwrap();
        let dir = material.directory().unwrap().to_path_buf();

        assert_eq!(entries(&dir), 1);
        assert!(dir.join(CA_FILE).exists());
        material.release().unwrap();
    }

    #[test]
    fn concurrent_materializations_use_distinct_directories() {
        let base = TempDir::new().unwrap();
        let ctx = MaterializationContext::new(base.path());
        let secrets = TlsSecrets {
            client_key: Some("k".into()),
            ..Default::default()
        };

        let mut first = materialize_tls(&ctx, None, &secrets).unwrap();
        let mut second = materialize_tls(&ctx, None, &secrets).unwrap();

        assert_ne!(first.directory(), second.directory());
        first.release().unwrap();
        assert!(second.directory().unwrap().join(KEY_FILE).exists());
        second.release().unwrap();
    }
}
