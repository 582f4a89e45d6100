use tracing::debug;

use super::archive::CompressionMethod;
use crate::errors::{RestoreError, Result};
use crate::storage::{Metadata, StorageGateway, StoredObject};

/// The object chosen for one restore attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    pub matched_key: String,
    pub object: StoredObject,
    pub metadata: Metadata,
}

/// Finds the best stored object for `primary_key`.
///
/// An exact `<primary_key><suffix>` object wins outright. Otherwise each
/// restore key is tried as a prefix, in order, and the first prefix with any
/// candidate picks its most recent one: latest last-modified timestamp,
/// objects without a timestamp last, ties to the greatest name.
pub async fn resolve(
    gateway: &dyn StorageGateway,
    primary_key: &str,
    restore_keys: &[String],
    method: CompressionMethod,
) -> Result<MatchResult> {
    let suffix = method.archive_suffix();

    let exact = StoredObject::new(format!("{}{}", primary_key, suffix));
    match gateway.metadata(&exact).await {
        Ok(metadata) => {
            debug!("Found exact cache object {}", exact);
            return Ok(MatchResult {
                matched_key: primary_key.to_string(),
                object: exact,
                metadata,
            });
        }
        Err(RestoreError::NotFound(_)) => {}
        Err(e) => return Err(e),
    }

    for prefix in restore_keys {
        let candidates = gateway.find(prefix).await?;
        let Some(best) = candidates
            .into_iter()
            .filter(|o| o.path.ends_with(suffix))
            .max_by(|a, b| {
                a.last_modified
                    .cmp(&b.last_modified)
                    .then_with(|| a.path.cmp(&b.path))
            })
        else {
            debug!("No cache object matches restore key '{}'", prefix);
            continue;
        };

        debug!("Restore key '{}' matched {}", prefix, best);
        // A vanished object is a miss; later prefixes are not consulted.
        let metadata = gateway.metadata(&best).await?;
        let matched_key = best.path[..best.path.len() - suffix.len()].to_string();
        return Ok(MatchResult {
            matched_key,
            object: best,
            metadata,
        });
    }

    Err(RestoreError::NotFound(format!(
        "No cache object for key '{}' or restore keys {:?}",
        primary_key, restore_keys
    )))
}
