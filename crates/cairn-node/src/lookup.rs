//! Lookup providers used by template functions
//!
//! Template functions are synchronous, so providers expose a blocking API.
//! `LiveLookup` drives an async [`NodeClient`] on a private current-thread
//! runtime; `NullLookup` answers every query with "not found".

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::client::NodeClient;
use crate::error::{NodeError, Result};
use crate::resource::{Resource, resolve_namespace};

/// Source of live node facts for one render
pub trait LookupProvider: Send + Sync {
    /// Fetch one resource; an empty namespace means the kind's default
    fn get(&self, kind: &str, namespace: &str, id: &str) -> Result<Option<Resource>>;

    /// List all resources of a kind
    fn list(&self, kind: &str, namespace: &str) -> Result<Vec<Resource>>;

    /// Whether lookups reach a node at all
    fn is_live(&self) -> bool;
}

/// Provider for offline rendering: nothing exists, nothing fails
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLookup;

impl LookupProvider for NullLookup {
    fn get(&self, _kind: &str, _namespace: &str, _id: &str) -> Result<Option<Resource>> {
        Ok(None)
    }

    fn list(&self, _kind: &str, _namespace: &str) -> Result<Vec<Resource>> {
        Ok(Vec::new())
    }

    fn is_live(&self) -> bool {
        false
    }
}

type GetKey = (String, String, String);
type ListKey = (String, String);

/// Provider backed by a connected node
///
/// Results are memoized for the lifetime of the provider. Dropping it shuts
/// down the runtime and closes the connection.
pub struct LiveLookup {
    client: Box<dyn NodeClient>,
    runtime: tokio::runtime::Runtime,
    timeout: Duration,
    gets: Mutex<HashMap<GetKey, Option<Resource>>>,
    lists: Mutex<HashMap<ListKey, Vec<Resource>>>,
}

impl LiveLookup {
    /// Connect and probe the node once
    ///
    /// Must not be called from within an async runtime.
    pub fn connect(client: Box<dyn NodeClient>, timeout: Duration) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let lookup = Self {
            client,
            runtime,
            timeout,
            gets: Mutex::new(HashMap::new()),
            lists: Mutex::new(HashMap::new()),
        };

        lookup.block_on(lookup.client.probe())?;
        tracing::debug!(endpoint = lookup.client.endpoint(), "connected to node");

        Ok(lookup)
    }

    pub fn endpoint(&self) -> &str {
        self.client.endpoint()
    }

    fn block_on<T>(&self, fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
        let endpoint = self.client.endpoint();
        match self.runtime.block_on(tokio::time::timeout(self.timeout, fut)) {
            Ok(result) => result.map_err(|e| match e {
                NodeError::Connectivity { .. } => e,
                other => NodeError::connectivity(endpoint, other),
            }),
            Err(_) => Err(NodeError::connectivity(
                endpoint,
                format!("no answer within {:?}", self.timeout),
            )),
        }
    }
}

impl LookupProvider for LiveLookup {
    fn get(&self, kind: &str, namespace: &str, id: &str) -> Result<Option<Resource>> {
        let namespace = resolve_namespace(kind, namespace);
        let key = (kind.to_string(), namespace.to_string(), id.to_string());

        if let Some(hit) = lock(&self.gets).get(&key) {
            return Ok(hit.clone());
        }

        tracing::debug!(kind, namespace, id, "lookup");
        let resource = self.block_on(self.client.get(kind, namespace, id))?;
        lock(&self.gets).insert(key, resource.clone());
        Ok(resource)
    }

    fn list(&self, kind: &str, namespace: &str) -> Result<Vec<Resource>> {
        let namespace = resolve_namespace(kind, namespace);
        let key = (kind.to_string(), namespace.to_string());

        if let Some(hit) = lock(&self.lists).get(&key) {
            return Ok(hit.clone());
        }

        tracing::debug!(kind, namespace, "lookup list");
        let resources = self.block_on(self.client.list(kind, namespace))?;
        lock(&self.lists).insert(key, resources.clone());
        Ok(resources)
    }

    fn is_live(&self) -> bool {
        true
    }
}

impl Drop for LiveLookup {
    fn drop(&mut self) {
        tracing::debug!(endpoint = self.client.endpoint(), "closing node connection");
    }
}

// A poisoned cache only means another lookup panicked mid-insert; the map
// itself is still usable.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
