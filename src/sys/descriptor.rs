// src/sys/descriptor.rs
//
// Data-transfer shape for "which daemon, which registries" as handed over by
// the credential-resolution side. Plain values, passed across the process
// boundary as JSON, turned into one composed factory right next to where the
// subprocess runs.

use std::sync::Arc;

use serde::Deserialize;

use crate::error::{KeyMaterialError, Result};
use crate::sys::factory::KeyMaterialFactory;
use crate::sys::login::HomeDockerConfig;
use crate::sys::secrets::{ProviderCredential, RegistryCredential, TlsSecrets};
use crate::sys::traits::RegistryLogin;

// 🛡️ No Debug derives: these carry plaintext secrets until converted.

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct KeyMaterialDescriptor {
    #[serde(default)]
    pub daemon: Option<DaemonDescriptor>,
    #[serde(default)]
    pub registries: Vec<RegistryDescriptor>,
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct DaemonDescriptor {
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub client_key: Option<String>,
    #[serde(default)]
    pub client_cert: Option<String>,
    #[serde(default)]
    pub ca_cert: Option<String>,
}

/// Exactly one of `username` + `password` or `token` must be given.
#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RegistryDescriptor {
    /// Omitted means Docker Hub.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

impl KeyMaterialDescriptor {
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    /// Daemon first, then registries in the order given. An empty descriptor
    /// becomes the null factory.
    pub fn into_factory(
        self,
        home: &HomeDockerConfig,
        login: Arc<dyn RegistryLogin>,
    ) -> Result<KeyMaterialFactory> {
        let daemon = self
            .daemon
            .map(DaemonDescriptor::into_factory)
            .unwrap_or_else(KeyMaterialFactory::null);

        let mut registries = Vec::with_capacity(self.registries.len());
        for (index, registry) in self.registries.into_iter().enumerate() {
            let url = registry.url.clone();
            let credential = registry.into_credential(index)?;
            registries.push(KeyMaterialFactory::login(url, credential, home.clone(), Arc::clone(&login)));
        }

        Ok(daemon.compose(registries))
    }
}

impl RegistryDescriptor {
    fn into_credential(self, index: usize) -> Result<RegistryCredential> {
        let invalid = |reason: &str| KeyMaterialError::InvalidDescriptor {
            entry: format!("registries[{index}]"),
            reason: reason.to_string(),
        };

        match (self.username, self.password, self.token) {
            (Some(username), Some(password), None) => Ok(RegistryCredential::Password {
                username,
                password: ProviderCredential::from(password),
            }),
            (None, None, Some(token)) => Ok(RegistryCredential::Token(ProviderCredential::from(token))),
            (_, _, Some(_)) => Err(invalid("token cannot be combined with username/password")),
            (None, None, None) => Err(invalid("needs username and password, or token")),
            _ => Err(invalid("username and password must be given together")),
        }
    }
}

impl DaemonDescriptor {
    fn into_factory(self) -> KeyMaterialFactory {
        let secrets = TlsSecrets {
            client_key: self.client_key.map(ProviderCredential::from),
            client_cert: self.client_cert.map(ProviderCredential::from),
            ca_cert: self.ca_cert.map(ProviderCredential::from),
        };

        match self.uri {
            Some(uri) if secrets.is_empty() => KeyMaterialFactory::host(uri),
            None if secrets.is_empty() => KeyMaterialFactory::null(),
            uri => KeyMaterialFactory::tls(uri, secrets),
        }
    }
}
