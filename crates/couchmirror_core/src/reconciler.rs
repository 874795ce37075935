//! Database existence reconciliation.

use std::collections::BTreeSet;
use tracing::{info, warn};

use crate::error::{StoreError, StoreResult};
use crate::store::DocumentStore;

/// Ensures every database in `required` exists, returning the names created.
///
/// Check-then-create is not atomic: a concurrent creator may win the race,
/// in which case the "already exists" answer is treated as success.
pub async fn ensure_databases<S>(store: &S, required: &BTreeSet<String>) -> StoreResult<Vec<String>>
where
    S: DocumentStore + ?Sized,
{
    let existing = store.list_databases().await?;
    let mut created = Vec::new();

    for name in required.difference(&existing) {
        match store.create_database(name).await {
            Ok(()) => {
                info!(database = %name, "created database");
                created.push(name.clone());
            }
            Err(StoreError::DatabaseExists(_)) => {
                warn!(database = %name, "database appeared concurrently");
            }
            Err(e) => return Err(e),
        }
    }

    Ok(created)
}
