// src/sys/login.rs

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use zeroize::{Zeroize, Zeroizing};

use crate::error::{KeyMaterialError, Result};
use crate::sys::context::MaterializationContext;
use crate::sys::env::{DOCKER_CONFIG, EnvVars};
use crate::sys::material::KeyMaterial;
use crate::sys::private_fs::{create_private_dir, keep, write_private_file};
use crate::sys::secrets::RegistryCredential;
use crate::sys::traits::{LoginRequest, RegistryLogin};

pub const DOCKER_HUB_REGISTRY: &str = "https://index.docker.io/v1/";
pub const CONFIG_FILE: &str = "config.json";

/// Top-level keys of a docker config that carry stored credentials.
pub const SENSITIVE_KEYS: [&str; 3] = ["auths", "credsStore", "credHelpers"];

const REGISTRY_DIR_PREFIX: &str = "keymat-registry-";

// ==============================================================================
// 1. Shared home configuration (the one read-modify-write hot spot)
// ==============================================================================

/// The execution target's `~/.docker/config.json`, plus the lock every login
/// factory reading it must hold.
///
/// Clone this value into each factory that shares the file. The lock is
/// process-local; another process touching the same file is not excluded.
#[derive(Clone, Debug)]
pub struct HomeDockerConfig {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl HomeDockerConfig {
    /// `home` is a home directory; the config lives at `<home>/.docker/config.json`.
    pub fn for_home(home: &Path) -> Self {
        Self::at(home.join(".docker").join(CONFIG_FILE))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the home config with every credential-bearing key removed.
    /// Missing or blank files read as an empty object.
    pub fn read_sanitized(&self) -> Result<Map<String, Value>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => Zeroizing::new(raw),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(KeyMaterialError::io("read docker config", &self.path, e)),
        };

        if raw.trim().is_empty() {
            return Ok(Map::new());
        }

        let mut config: Map<String, Value> =
            serde_json::from_str(&raw).map_err(|source| KeyMaterialError::Config {
                path: self.path.clone(),
                source,
            })?;

        for key in SENSITIVE_KEYS {
            if config.remove(key).is_some() {
                debug!(key, "stripped stored credentials from home docker config");
            }
        }
        Ok(config)
    }
}

// ==============================================================================
// 2. Registry login strategy
// ==============================================================================

/// Produces an isolated DOCKER_CONFIG directory authenticated against `registry`.
///
/// Unrelated settings from the home config (proxies, formats, ...) are carried
/// over; stored credentials are not. The login itself always runs against the
/// isolated directory so concurrent materializations never share a file.
pub fn materialize_login(
    context: &MaterializationContext,
    home: &HomeDockerConfig,
    registry: &str,
    credential: &RegistryCredential,
    login: &dyn RegistryLogin,
) -> Result<KeyMaterial> {
    let mut config = home.read_sanitized()?;

    let dir = create_private_dir(context.base_directory(), REGISTRY_DIR_PREFIX)?;
    let config_path = dir.path().join(CONFIG_FILE);

    if let RegistryCredential::Token(token) = credential {
        let auth = token.use_secret(|bytes| String::from_utf8_lossy(bytes).into_owned());
        let mut entry = Map::new();
        entry.insert("auth".to_string(), Value::String(auth));
        let mut auths = Map::new();
        auths.insert(registry.to_string(), Value::Object(entry));
        config.insert("auths".to_string(), Value::Object(auths));
    }

    let serialized = Zeroizing::new(serde_json::to_vec_pretty(&config).map_err(|source| {
        KeyMaterialError::Config {
            path: config_path.clone(),
            source,
        }
    })?);
    scrub_token(&mut config, registry);
    write_private_file(&config_path, &serialized)?;

    if let RegistryCredential::Password { username, password } = credential {
        let outcome = password.use_secret(|password| {
            login.login(&LoginRequest {
                registry,
                username,
                password,
                config_dir: dir.path(),
            })
        });

        if let Err(detail) = outcome {
            // No partial login state survives a failed login.
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                warn!(path = %path.display(), error = %e, "failed to remove isolated docker config");
            }
            return Err(KeyMaterialError::Login {
                registry: registry.to_string(),
                detail,
            });
        }
    }

    let config_dir = keep(dir);
    info!(registry, path = %config_dir.display(), "🔐 registry credentials materialized");

    let mut env = EnvVars::new();
    env.insert(DOCKER_CONFIG.to_string(), config_dir.to_string_lossy().into_owned());
    Ok(KeyMaterial::with_directory(env, config_dir))
}

/// Zeroizes the in-memory copy of a seeded token once it has been serialized.
fn scrub_token(config: &mut Map<String, Value>, registry: &str) {
    let Some(Value::Object(auths)) = config.get_mut("auths") else {
        return;
    };
    if let Some(Value::Object(entry)) = auths.get_mut(registry) {
        if let Some(Value::String(auth)) = entry.get_mut("auth") {
            auth.zeroize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    /// Records requests and optionally fails, like a stubbed docker CLI.
    struct FakeLogin {
        fail_with: Option<String>,
        seen: StdMutex<Vec<(String, String, Vec<u8>, PathBuf, bool)>>,
    }

    impl FakeLogin {
        fn ok() -> Self {
            Self { fail_with: None, seen: StdMutex::new(Vec::new()) }
        }

        fn failing(detail: &str) -> Self {
            Self { fail_with: Some(detail.to_string()), seen: StdMutex::new(Vec::new()) }
        }
    }

    impl RegistryLogin for FakeLogin {
        fn login(&self, request: &LoginRequest<'_>) -> std::result::Result<(), String> {
            let seeded = request.config_dir.join(CONFIG_FILE).exists();
            self.seen.lock().unwrap().push((
                request.registry.to_string(),
                request.username.to_string(),
                request.password.to_vec(),
                request.config_dir.to_path_buf(),
                seeded,
            ));
            match &self.fail_with {
                Some(detail) => Err(detail.clone()),
                None => Ok(()),
            }
        }
    }

    fn password() -> RegistryCredential {
        RegistryCredential::Password { username: "ci".into(), password: "pw".into() }
    }

    fn home_with(contents: &str) -> (TempDir, HomeDockerConfig) {
        let home = TempDir::new().unwrap();
        fs::create_dir(home.path().join(".docker")).unwrap();
        fs::write(home.path().join(".docker").join(CONFIG_FILE), contents).unwrap();
        let config = HomeDockerConfig::for_home(home.path());
        (home, config)
    }

    fn read_config(dir: &Path) -> Map<String, Value> {
        serde_json::from_str(&fs::read_to_string(dir.join(CONFIG_FILE)).unwrap()).unwrap()
    }

    #[test]
    fn sanitizes_home_config_and_keeps_unrelated_settings() {
        let (_home, home_config) = home_with(
            r#"{"auths":{"r":{"auth":"c2VjcmV0"}},"credsStore":"desktop","credHelpers":{"x":"y"},
                "proxies":{"default":{"httpProxy":"http://proxy:3128"}}}"#,
        );

        let sanitized = home_config.read_sanitized().unwrap();

        assert!(sanitized.get("auths").is_none());
        assert!(sanitized.get("credsStore").is_none());
        assert!(sanitized.get("credHelpers").is_none());
        assert!(sanitized.get("proxies").is_some());
    }

    #[test]
    fn missing_and_blank_home_configs_read_as_empty() {
        let home = TempDir::new().unwrap();
        assert!(HomeDockerConfig::for_home(home.path()).read_sanitized().unwrap().is_empty());

        let (_home, blank) = home_with("  \n");
        assert!(blank.read_sanitized().unwrap().is_empty());
    }

    #[test]
    fn malformed_home_config_is_a_config_error() {
        let (_home, broken) = home_with("[1, 2]");
        assert!(matches!(broken.read_sanitized(), Err(KeyMaterialError::Config { .. })));
    }

    #[test]
    fn password_login_runs_against_seeded_isolated_dir() {
        let base = TempDir::new().unwrap();
        let ctx = MaterializationContext::new(base.path());
        let (_home, home_config) = home_with(r#"{"auths":{"old":{}},"detachKeys":"ctrl-x"}"#);
        let login = FakeLogin::ok();

        let mut material =
            materialize_login(&ctx, &home_config, "https://registry.example", &password(), &login)
                .unwrap();

        let dir = PathBuf::from(material.env().get(DOCKER_CONFIG).unwrap());
        assert!(dir.starts_with(base.path()));
        assert_eq!(fs::metadata(&dir).unwrap().permissions().mode() & 0o777, 0o700);
        let config_mode = fs::metadata(dir.join(CONFIG_FILE)).unwrap().permissions().mode();
        assert_eq!(config_mode & 0o777, 0o600);
        assert_eq!(read_config(&dir).get("detachKeys").unwrap(), "ctrl-x");
        assert!(read_config(&dir).get("auths").is_none());

        let seen = login.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "https://registry.example");
        assert_eq!(seen[0].1, "ci");
        assert_eq!(seen[0].2, b"pw".to_vec());
        assert_eq!(seen[0].3, dir);
        assert!(seen[0].4, "config must be seeded before login runs");
        drop(seen);

        material.release().unwrap();
        assert!(!dir.exists());
    }

    #[test]
    fn failed_login_removes_isolated_dir() {
        let base = TempDir::new().unwrap();
        let ctx = MaterializationContext::new(base.path());
        let home = HomeDockerConfig::for_home(base.path().join("no-home").as_path());
        let login = FakeLogin::failing("unauthorized");

        let err = materialize_login(&ctx, &home, "https://registry.example", &password(), &login)
            .unwrap_err();

        match err {
            KeyMaterialError::Login { registry, detail } => {
                assert_eq!(registry, "https://registry.example");
                assert_eq!(detail, "unauthorized");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(fs::read_dir(base.path()).unwrap().count(), 0);
    }

    #[test]
    fn token_is_seeded_without_running_login() {
        let base = TempDir::new().unwrap();
        let ctx = MaterializationContext::new(base.path());
        let home = HomeDockerConfig::for_home(base.path().join("no-home").as_path());
        let login = FakeLogin::failing("must not be called");

        let mut material = materialize_login(
            &ctx,
            &home,
            DOCKER_HUB_REGISTRY,
            &RegistryCredential::Token("dTpw".into()),
            &login,
        )
        .unwrap();

        let dir = material.directory().unwrap().to_path_buf();
        let config = read_config(&dir);
        assert_eq!(config["auths"][DOCKER_HUB_REGISTRY]["auth"], "dTpw");
        assert!(login.seen.lock().unwrap().is_empty());
        material.release().unwrap();
    }
}
