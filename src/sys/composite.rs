// src/sys/composite.rs
//
// Composite lifecycle: children are bound, materialized and released strictly
// in composition order. Rollback relies on "only indices before the failure
// point were materialized", so none of this may be parallelized.

use tracing::{info, warn};

use crate::error::{KeyMaterialError, Result};
use crate::sys::context::MaterializationContext;
use crate::sys::env::merge_all;
use crate::sys::factory::KeyMaterialFactory;
use crate::sys::material::KeyMaterial;

/// Binds every child, or none: an already-bound child is rejected before any
/// sibling is touched.
pub(crate) fn bind_children(
    children: &mut [KeyMaterialFactory],
    context: &MaterializationContext,
) -> Result<()> {
    if let Some(bound) = children.iter().find_map(KeyMaterialFactory::context) {
        return Err(KeyMaterialError::AlreadyBound {
            bound_to: bound.base_directory().to_path_buf(),
        });
    }
    for child in children.iter_mut() {
        child.bind(context)?;
    }
    Ok(())
}

/// All-or-nothing materialization from the caller's point of view.
///
/// If child `i` fails, children `0..i` are released before the error is
/// returned. The child's failure stays primary; any release failure hit while
/// unwinding is attached to it, never substituted for it.
pub(crate) fn materialize_children(children: &[KeyMaterialFactory]) -> Result<KeyMaterial> {
    let mut materialized = Vec::with_capacity(children.len());

    for (index, child) in children.iter().enumerate() {
        match child.materialize() {
            Ok(material) => materialized.push(material),
            Err(primary) => {
                warn!(
                    index,
                    rolled_back = materialized.len(),
                    error = %primary,
                    "composite materialization failed, rolling back"
                );
                return Err(roll_back(materialized, primary));
            }
        }
    }

    let env = merge_all(materialized.iter().map(KeyMaterial::env));
    info!(components = materialized.len(), "composite key material ready");
    Ok(KeyMaterial::composite(env, materialized))
}

fn roll_back(mut materialized: Vec<KeyMaterial>, primary: KeyMaterialError) -> KeyMaterialError {
    let release_failures: Vec<KeyMaterialError> = materialized
        .iter_mut()
        .filter_map(|material| material.release().err())
        .collect();

    if release_failures.is_empty() {
        primary
    } else {
        KeyMaterialError::Rollback {
            primary: Box::new(primary),
            release_failures,
        }
    }
}
