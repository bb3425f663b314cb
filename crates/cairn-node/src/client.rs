//! Node client abstraction
//!
//! A `NodeClient` answers resource queries for one node. Lookups go through
//! this trait so the live transport can be swapped for an in-memory snapshot.

use async_trait::async_trait;

use crate::error::Result;
use crate::resource::{Resource, default_namespace};

/// Client for the resource API of one node
///
/// Namespaces passed in are already resolved; an empty id is never passed
/// to `get`.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Endpoint this client talks to, used in error messages
    fn endpoint(&self) -> &str;

    /// Fetch one resource, `None` when it does not exist
    async fn get(&self, kind: &str, namespace: &str, id: &str) -> Result<Option<Resource>>;

    /// List all resources of a kind
    async fn list(&self, kind: &str, namespace: &str) -> Result<Vec<Resource>>;

    /// Check that the node answers at all
    async fn probe(&self) -> Result<()> {
        self.get("hostname", default_namespace("hostname"), "hostname")
            .await
            .map(|_| ())
    }
}
