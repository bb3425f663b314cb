//! In-memory node client
//!
//! Serves resources from memory, either built up in code or loaded from a
//! multi-document YAML dump:
//!
//! ```yaml
//! kind: routes
//! metadata: { namespace: network, id: inet4/10.0.0.1//1024 }
//! spec: { dst: "", gateway: 10.0.0.1, outLinkName: eth0, family: inet4 }
//! ---
//! kind: links
//! metadata: { id: eth0 }
//! spec: { hardwareAddr: "00:11:22:33:44:55" }
//! ```

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::client::NodeClient;
use crate::error::{NodeError, Result};
use crate::resource::{Resource, resolve_namespace};

#[derive(Debug, Clone)]
struct Entry {
    kind: String,
    resource: Resource,
}

/// Node client backed by an in-memory resource set
#[derive(Debug, Clone)]
pub struct SnapshotClient {
    endpoint: String,
    entries: Vec<Entry>,
    /// Number of get/list calls served, for assertions
    calls: Arc<AtomicUsize>,
}

#[derive(Deserialize)]
struct SnapshotDocument {
    kind: String,
    #[serde(default)]
    metadata: JsonValue,
    #[serde(default)]
    spec: JsonValue,
}

impl SnapshotClient {
    pub fn new() -> Self {
        Self {
            endpoint: "snapshot".to_string(),
            entries: Vec::new(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Add a resource; an empty namespace means the kind's default
    pub fn with_resource(mut self, kind: &str, namespace: &str, id: &str, spec: JsonValue) -> Self {
        let namespace = resolve_namespace(kind, namespace);
        self.entries.push(Entry {
            kind: kind.to_string(),
            resource: Resource::new(namespace, kind, id, spec),
        });
        self
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| NodeError::Snapshot {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let mut client = Self::from_yaml(&content).map_err(|e| NodeError::Snapshot {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        client.endpoint = path.display().to_string();
        Ok(client)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let mut client = Self::new();

        for document in serde_yaml::Deserializer::from_str(yaml) {
            let value = JsonValue::deserialize(document)?;
            if value.is_null() {
                continue;
            }
            let doc: SnapshotDocument = serde_json::from_value(value)?;

            let mut metadata = match doc.metadata {
                JsonValue::Object(map) => map,
                JsonValue::Null => serde_json::Map::new(),
                _ => {
                    return Err(NodeError::Serialization(format!(
                        "metadata of a '{}' resource must be a mapping",
                        doc.kind
                    )));
                }
            };
            let namespace = metadata
                .get("namespace")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            metadata.insert(
                "namespace".to_string(),
                JsonValue::String(resolve_namespace(&doc.kind, &namespace).to_string()),
            );
            metadata
                .entry("type".to_string())
                .or_insert_with(|| JsonValue::String(doc.kind.clone()));

            client.entries.push(Entry {
                kind: doc.kind,
                resource: Resource {
                    metadata: JsonValue::Object(metadata),
                    spec: doc.spec,
                },
            });
        }

        Ok(client)
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Number of get/list calls served so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn matching<'a>(&'a self, kind: &'a str, namespace: &'a str) -> impl Iterator<Item = &'a Resource> {
        self.entries
            .iter()
            .filter(move |e| e.kind.eq_ignore_ascii_case(kind) && e.resource.namespace() == namespace)
            .map(|e| &e.resource)
    }
}

impl Default for SnapshotClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeClient for SnapshotClient {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn get(&self, kind: &str, namespace: &str, id: &str) -> Result<Option<Resource>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.matching(kind, namespace).find(|r| r.id() == id).cloned())
    }

    async fn list(&self, kind: &str, namespace: &str) -> Result<Vec<Resource>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.matching(kind, namespace).cloned().collect())
    }

    async fn probe(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const DUMP: &str = r#"
kind: routes
metadata:
  namespace: network
  id: inet4/10.0.0.1//1024
spec:
  dst: ""
  gateway: 10.0.0.1
  outLinkName: eth0
  family: inet4
---
kind: links
metadata:
  id: eth0
spec:
  hardwareAddr: "00:11:22:33:44:55"
---
"#;

    #[tokio::test]
    async fn test_from_yaml() {
        let client = SnapshotClient::from_yaml(DUMP).unwrap();
        assert_eq!(client.len(), 2);

        let routes = client.list("routes", "network").await.unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].spec["gateway"], "10.0.0.1");

        // namespace defaulted from the kind
        let link = client.get("links", "network", "eth0").await.unwrap().unwrap();
        assert_eq!(link.spec["hardwareAddr"], "00:11:22:33:44:55");
        assert_eq!(link.metadata["type"], "links");
    }

    #[tokio::test]
    async fn test_not_found() {
        let client = SnapshotClient::new().with_resource("links", "", "eth0", json!({}));
        assert!(client.get("links", "network", "eth1").await.unwrap().is_none());
        assert!(client.get("links", "default", "eth0").await.unwrap().is_none());
        assert!(client.list("routes", "network").await.unwrap().is_empty());
        assert_eq!(client.calls(), 3);
    }

    #[test]
    fn test_invalid_dump() {
        assert!(SnapshotClient::from_yaml("metadata: {}\n").is_err());
        assert!(SnapshotClient::from_yaml("kind: links\nmetadata: [1]\n").is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = SnapshotClient::load("/nonexistent/snapshot.yaml").unwrap_err();
        assert!(matches!(err, NodeError::Snapshot { .. }));
    }
}
