// src/sys/factory.rs

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{KeyMaterialError, Result};
use crate::sys::composite;
use crate::sys::context::MaterializationContext;
use crate::sys::login::{self, DOCKER_HUB_REGISTRY, HomeDockerConfig};
use crate::sys::material::KeyMaterial;
use crate::sys::secrets::{RegistryCredential, TlsSecrets};
use crate::sys::tls;
use crate::sys::traits::RegistryLogin;

/// The closed set of ways we know how to produce key material.
#[derive(Clone)]
pub enum Strategy {
    /// Identity element of composition: empty material, nothing to release.
    Null,
    /// Just the daemon address.
    Host { uri: String },
    /// Client TLS files under a private directory, plus an optional daemon address.
    Tls { host: Option<String>, secrets: TlsSecrets },
    /// Registry credentials in an isolated docker config directory.
    Login {
        registry: String,
        credential: RegistryCredential,
        home: HomeDockerConfig,
        login: Arc<dyn RegistryLogin>,
    },
    /// Flattened children, materialized and released in this order.
    Composite(Vec<KeyMaterialFactory>),
}

/// A strategy plus its write-once binding to a [`MaterializationContext`].
///
/// Lifecycle: construct, optionally [`compose`](Self::compose), [`bind`](Self::bind)
/// exactly once, then [`materialize`](Self::materialize) as often as needed.
#[derive(Clone)]
pub struct KeyMaterialFactory {
    context: Option<MaterializationContext>,
    strategy: Strategy,
}

impl KeyMaterialFactory {
    fn from_strategy(strategy: Strategy) -> Self {
        Self {
            context: None,
            strategy,
        }
    }

    pub fn null() -> Self {
        Self::from_strategy(Strategy::Null)
    }

    pub fn host(uri: impl Into<String>) -> Self {
        Self::from_strategy(Strategy::Host { uri: uri.into() })
    }

    pub fn tls(host: Option<String>, secrets: TlsSecrets) -> Self {
        Self::from_strategy(Strategy::Tls { host, secrets })
    }

    /// `registry` of `None` means Docker Hub.
    pub fn login(
        registry: Option<String>,
        credential: RegistryCredential,
        home: HomeDockerConfig,
        login: Arc<dyn RegistryLogin>,
    ) -> Self {
        Self::from_strategy(Strategy::Login {
            registry: registry.unwrap_or_else(|| DOCKER_HUB_REGISTRY.to_string()),
            credential,
            home,
            login,
        })
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub fn context(&self) -> Option<&MaterializationContext> {
        self.context.as_ref()
    }

    pub fn is_null(&self) -> bool {
        matches!(self.strategy, Strategy::Null)
    }

    /// Children of a composite, in order. Empty for leaves.
    pub fn components(&self) -> &[KeyMaterialFactory] {
        match &self.strategy {
            Strategy::Composite(children) => children,
            _ => &[],
        }
    }

    // ==========================================================================
    // Lifecycle
    // ==========================================================================

    /// Binds this factory (and every composite child) to `context`.
    ///
    /// Fails with [`KeyMaterialError::AlreadyBound`] on a second call, leaving
    /// the original binding untouched. Never touches the filesystem.
    pub fn bind(&mut self, context: &MaterializationContext) -> Result<&mut Self> {
        if let Some(bound) = &self.context {
            return Err(KeyMaterialError::AlreadyBound {
                bound_to: bound.base_directory().to_path_buf(),
            });
        }

        if let Strategy::Composite(children) = &mut self.strategy {
            composite::bind_children(children, context)?;
        }

        debug!(base = %context.base_directory().display(), "key material factory bound");
        self.context = Some(context.clone());
        Ok(self)
    }

    /// Produces a fresh [`KeyMaterial`]. Strategy errors propagate unchanged.
    pub fn materialize(&self) -> Result<KeyMaterial> {
        let context = self.context.as_ref().ok_or(KeyMaterialError::Unbound)?;

        match &self.strategy {
            Strategy::Null => Ok(KeyMaterial::empty()),
            Strategy::Host { uri } => Ok(tls::materialize_host(uri)),
            Strategy::Tls { host, secrets } => tls::materialize_tls(context, host.as_deref(), secrets),
            Strategy::Login {
                registry,
                credential,
                home,
                login,
            } => login::materialize_login(context, home, registry, credential, login.as_ref()),
            Strategy::Composite(children) => composite::materialize_children(children),
        }
    }

    /// Returns a factory equivalent to `self` followed by `others`, in order.
    ///
    /// Null factories vanish, unbound composites are flattened, and composing
    /// with nothing returns `self` unchanged.
    pub fn compose<I>(self, others: I) -> KeyMaterialFactory
    where
        I: IntoIterator<Item = KeyMaterialFactory>,
    {
        let mut tail = Vec::new();
        for other in others {
            flatten_into(other, &mut tail);
        }
        if tail.is_empty() {
            return self;
        }

        let mut parts = Vec::with_capacity(tail.len() + 1);
        flatten_into(self, &mut parts);
        parts.extend(tail);

        if parts.len() == 1 {
            return parts.remove(0);
        }
        info!(components = parts.len(), "composed key material factories");
        Self::from_strategy(Strategy::Composite(parts))
    }
}

fn flatten_into(factory: KeyMaterialFactory, parts: &mut Vec<KeyMaterialFactory>) {
    match factory {
        f if f.is_null() => {}
        KeyMaterialFactory {
            context: None,
            strategy: Strategy::Composite(children),
        } => parts.extend(children),
        f => parts.push(f),
    }
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Null => f.write_str("Null"),
            Strategy::Host { uri } => f.debug_struct("Host").field("uri", uri).finish(),
            Strategy::Tls { host, secrets } => f
                .debug_struct("Tls")
                .field("host", host)
                .field("secrets", secrets)
                .finish(),
            Strategy::Login {
                registry,
                credential,
                home,
                ..
            } => f
                .debug_struct("Login")
                .field("registry", registry)
                .field("credential", credential)
                .field("home", home)
                .finish_non_exhaustive(),
            Strategy::Composite(children) => f.debug_tuple("Composite").field(children).finish(),
        }
    }
}

impl fmt::Debug for KeyMaterialFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterialFactory")
            .field("context", &self.context)
            .field("strategy", &self.strategy)
            .finish()
    }
}
