//! Node resources as returned by lookups

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// One resource of a node: identifying metadata plus its spec
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(default)]
    pub metadata: JsonValue,
    #[serde(default)]
    pub spec: JsonValue,
}

impl Resource {
    pub fn new(namespace: &str, kind: &str, id: &str, spec: JsonValue) -> Self {
        Self {
            metadata: serde_json::json!({
                "namespace": namespace,
                "type": kind,
                "id": id,
            }),
            spec,
        }
    }

    pub fn id(&self) -> &str {
        self.metadata.get("id").and_then(|v| v.as_str()).unwrap_or("")
    }

    pub fn namespace(&self) -> &str {
        self.metadata
            .get("namespace")
            .and_then(|v| v.as_str())
            .unwrap_or("")
    }

    /// The `{metadata, spec}` mapping handed to templates
    pub fn to_json(&self) -> JsonValue {
        serde_json::json!({
            "metadata": self.metadata,
            "spec": self.spec,
        })
    }
}

/// Response body of a list request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceList {
    #[serde(default)]
    pub items: Vec<Resource>,
}

/// Namespace a kind lives in when the caller does not name one
pub fn default_namespace(kind: &str) -> &'static str {
    match kind.to_ascii_lowercase().as_str() {
        "addresses" | "addressstatuses" | "links" | "linkstatuses" | "routes" | "routestatuses"
        | "nodeaddress" | "nodeaddresses" | "resolvers" | "resolverstatuses" | "hostname"
        | "hostnamestatuses" => "network",
        "machinetype" | "machinetypes" => "config",
        "disks" | "blockdevices" | "systemdisk" => "runtime",
        _ => "default",
    }
}

/// Resolve an empty namespace to the kind's default
pub fn resolve_namespace<'a>(kind: &str, namespace: &'a str) -> &'a str {
    if namespace.is_empty() {
        default_namespace(kind)
    } else {
        namespace
    }
}
