// 🛡️ Zero-Trust Architecture: every module owns one concern of the key material lifecycle.

pub mod traits;      // External capabilities (registry login)
pub mod secrets;     // Memory hygiene (ProviderCredential, payloads)
pub mod context;     // Filesystem scope
pub mod env;         // Environment variables and merge
pub mod private_fs;  // Owner-only dirs and files
pub mod material;    // Disposable KeyMaterial + release
pub mod factory;     // KeyMaterialFactory: bind / materialize / compose
pub mod composite;   // Ordered materialize with rollback
pub mod tls;         // Host-only and TLS-pair leaves
pub mod login;       // Registry-login leaf
pub mod descriptor;  // Data-transfer structs -> composed factory
