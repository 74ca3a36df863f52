// src/sys/secrets.rs

use std::fmt;

use secrecy::{ExposeSecret, Secret};

/// ProviderCredential is an ephemeral, memory-safe wrapper for the raw secret
/// fields handed to us by the host credential store: PEM private keys,
/// certificates, registry passwords and pre-built auth tokens.
///
/// 1. It cannot be accidentally logged (`{:?}` prints `[REDACTED]`).
/// 2. When the struct goes out of scope, the memory is zeroized.
pub struct ProviderCredential {
    token: Secret<Vec<u8>>,
}

impl ProviderCredential {
    /// Wraps raw bytes in a zeroizing Secret.
    pub fn new(raw_token: Vec<u8>) -> Self {
        // 🛡️ Zero-Copy Secret Acquisition
        // The Vec is moved, never duplicated, so the only plaintext copy is the
        // heap allocation `secrecy` zeroizes on drop.
        Self {
            token: Secret::new(raw_token),
        }
    }

    /// Exposes the secret for the duration of `action` only. The borrow
    /// cannot escape the closure.
    pub fn use_secret<F, R>(&self, action: F) -> R
    where
        F: FnOnce(&[u8]) -> R,
    {
        action(self.token.expose_secret())
    }
}

impl From<String> for ProviderCredential {
    fn from(value: String) -> Self {
        Self::new(value.into_bytes())
    }
}

impl From<&str> for ProviderCredential {
    fn from(value: &str) -> Self {
        Self::new(value.as_bytes().to_vec())
    }
}

impl Clone for ProviderCredential {
    fn clone(&self) -> Self {
        self.use_secret(|bytes| Self::new(bytes.to_vec()))
    }
}

impl fmt::Debug for ProviderCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProviderCredential([REDACTED])")
    }
}

// ==============================================================================
// Secret payloads (as resolved by the host credential store)
// ==============================================================================

/// Client TLS material for a daemon endpoint. Each field is optional and treated
/// as an opaque PEM blob; nothing here parses it.
#[derive(Clone, Debug, Default)]
pub struct TlsSecrets {
    pub client_key: Option<ProviderCredential>,
    pub client_cert: Option<ProviderCredential>,
    pub ca_cert: Option<ProviderCredential>,
}

impl TlsSecrets {
    pub fn is_empty(&self) -> bool {
        self.client_key.is_none() && self.client_cert.is_none() && self.ca_cert.is_none()
    }
}

/// How we authenticate against a registry.
#[derive(Clone, Debug)]
pub enum RegistryCredential {
    /// Exchanged for a stored auth via the external login mechanism.
    Password {
        username: String,
        password: ProviderCredential,
    },
    /// A pre-built base64 `user:password` blob, written straight into the
    /// isolated config without running a login.
    Token(ProviderCredential),
}
