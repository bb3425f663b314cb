//! Node connection configuration
//!
//! ```yaml
//! context: lab
//! contexts:
//!   lab:
//!     endpoints: [10.0.0.10]
//!     nodes: [10.0.0.11]
//!     ca: <base64 PEM>
//!     crt: <base64 PEM>
//!     key: <base64 PEM>
//! ```

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{NodeError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Name of the active context
    #[serde(default)]
    pub context: String,

    #[serde(default)]
    pub contexts: BTreeMap<String, NodeContext>,
}

/// Connection settings for one cluster
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeContext {
    #[serde(default)]
    pub endpoints: Vec<String>,

    #[serde(default)]
    pub nodes: Vec<String>,

    /// Cluster CA certificate, base64-encoded PEM
    #[serde(default)]
    pub ca: String,

    /// Client certificate, base64-encoded PEM
    #[serde(default)]
    pub crt: String,

    /// Client key, base64-encoded PEM
    #[serde(default)]
    pub key: String,
}

/// Decoded TLS material for authenticated connections
#[derive(Clone)]
pub struct NodeCredentials {
    pub ca_pem: Vec<u8>,
    /// Client certificate followed by its key, both PEM
    pub identity_pem: Vec<u8>,
}

impl std::fmt::Debug for NodeCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeCredentials")
            .field("ca_pem", &format!("{} bytes", self.ca_pem.len()))
            .field("identity_pem", &"[REDACTED]")
            .finish()
    }
}

impl NodeConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            NodeError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_yaml::from_str(&content)
            .map_err(|e| NodeError::InvalidConfig(format!("{}: {}", path.display(), e)))
    }

    /// The active context
    pub fn current(&self) -> Result<&NodeContext> {
        if self.context.is_empty() {
            return Err(NodeError::InvalidConfig("no active context set".to_string()));
        }
        self.contexts.get(&self.context).ok_or_else(|| {
            NodeError::InvalidConfig(format!("context '{}' is not defined", self.context))
        })
    }
}

impl NodeContext {
    pub fn credentials(&self) -> Result<NodeCredentials> {
        let ca_pem = decode("ca", &self.ca)?;
        let mut identity_pem = decode("crt", &self.crt)?;
        let key = decode("key", &self.key)?;

        if !identity_pem.ends_with(b"\n") {
            identity_pem.push(b'\n');
        }
        identity_pem.extend_from_slice(&key);

        Ok(NodeCredentials {
            ca_pem,
            identity_pem,
        })
    }
}

fn decode(field: &str, value: &str) -> Result<Vec<u8>> {
    if value.trim().is_empty() {
        return Err(NodeError::InvalidConfig(format!("'{field}' is empty")));
    }
    STANDARD
        .decode(value.trim())
        .map_err(|e| NodeError::InvalidConfig(format!("'{field}' is not valid base64: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn encoded(text: &str) -> String {
        STANDARD.encode(text)
    }

    #[test]
    fn test_load_and_decode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config");
        fs::write(
            &path,
            format!(
                "context: lab\ncontexts:\n  lab:\n    endpoints: [10.0.0.10]\n    nodes: [10.0.0.11]\n    ca: {}\n    crt: {}\n    key: {}\n",
                encoded("CA PEM\n"),
                encoded("CERT PEM"),
                encoded("KEY PEM\n"),
            ),
        )
        .unwrap();

        let config = NodeConfig::load(&path).unwrap();
        let ctx = config.current().unwrap();
        assert_eq!(ctx.endpoints, vec!["10.0.0.10"]);
        assert_eq!(ctx.nodes, vec!["10.0.0.11"]);

        let creds = ctx.credentials().unwrap();
        assert_eq!(creds.ca_pem, b"CA PEM\n");
        assert_eq!(creds.identity_pem, b"CERT PEM\nKEY PEM\n");
    }

    #[test]
    fn test_unknown_context() {
        let config: NodeConfig = serde_yaml::from_str("context: prod\ncontexts: {}\n").unwrap();
        assert!(matches!(config.current(), Err(NodeError::InvalidConfig(_))));
    }

    #[test]
    fn test_missing_key_material() {
        let ctx = NodeContext {
            ca: encoded("CA"),
            ..Default::default()
        };
        assert!(matches!(ctx.credentials(), Err(NodeError::InvalidConfig(_))));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            NodeConfig::load("/nonexistent/config"),
            Err(NodeError::InvalidConfig(_))
        ));
    }
}
