// src/sys/env.rs

use std::collections::HashMap;

use tracing::debug;

/// Environment variables handed to the subprocess launch.
pub type EnvVars = HashMap<String, String>;

// Variable names are a compatibility contract with the docker CLI.
pub const DOCKER_HOST: &str = "DOCKER_HOST";
pub const DOCKER_TLS_VERIFY: &str = "DOCKER_TLS_VERIFY";
pub const DOCKER_CERT_PATH: &str = "DOCKER_CERT_PATH";
pub const DOCKER_CONFIG: &str = "DOCKER_CONFIG";

/// Merges `overlay` into `target`. On a key collision the overlay wins.
///
/// NOTE: last-writer-wins falls out of the ordered overwrite merge. Two
/// DOCKER_CONFIG entries from different registries will shadow each other.
pub fn merge_into(target: &mut EnvVars, overlay: &EnvVars) {
    for (key, value) in overlay {
        if let Some(previous) = target.insert(key.clone(), value.clone()) {
            if previous != *value {
                debug!(variable = %key, "environment variable overridden by later key material");
            }
        }
    }
}

/// Left-to-right merge over a sequence of maps.
pub fn merge_all<'a, I>(maps: I) -> EnvVars
where
    I: IntoIterator<Item = &'a EnvVars>,
{
    let mut merged = EnvVars::new();
    for map in maps {
        merge_into(&mut merged, map);
    }
    merged
}
