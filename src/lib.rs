// src/lib.rs
//
// Ephemeral key material for container-runtime clients. Independent secret
// sources are composed into one factory, bound to a filesystem scope once,
// materialized into environment variables plus owner-only files, and released
// when the subprocess is done.

pub mod config;
pub mod error;
pub mod sys;

// 🏗️ Re-exports so callers don't need deep nested imports.
pub use config::KeymatConfig;
pub use error::{KeyMaterialError, Result};
pub use sys::context::MaterializationContext;
pub use sys::descriptor::KeyMaterialDescriptor;
pub use sys::env::EnvVars;
pub use sys::factory::{KeyMaterialFactory, Strategy};
pub use sys::login::HomeDockerConfig;
pub use sys::material::KeyMaterial;
pub use sys::secrets::{ProviderCredential, RegistryCredential, TlsSecrets};
pub use sys::traits::{DockerCliLogin, LoginRequest, RegistryLogin};
