//! Secrets bundle loading
//!
//! The bundle is produced by an external generator; cairn only reads it.

use serde_json::Value as JsonValue;
use std::path::Path;

use crate::error::{CoreError, Result};

/// Read-only secrets document (cluster id, tokens, certificates)
#[derive(Debug, Clone, PartialEq)]
pub struct SecretsBundle(JsonValue);

impl SecretsBundle {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let invalid = |message: String| CoreError::InvalidSecrets {
            path: path.display().to_string(),
            message,
        };

        let content = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
        Self::from_yaml(&content).map_err(|e| match e {
            CoreError::InvalidSecrets { message, .. } => invalid(message),
            other => invalid(other.to_string()),
        })
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let value: JsonValue = serde_yaml::from_str(yaml)?;
        if !value.is_object() {
            return Err(CoreError::InvalidSecrets {
                path: "<inline>".to_string(),
                message: "expected a mapping at the root".to_string(),
            });
        }
        Ok(Self(value))
    }

    /// Value at a dotted path, e.g. `trustdinfo.token`
    pub fn get(&self, path: &str) -> Option<&JsonValue> {
        path.split('.').try_fold(&self.0, |node, key| node.get(key))
    }

    /// String value at a dotted path; empty strings count as absent
    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(|v| v.as_str()).filter(|s| !s.is_empty())
    }

    pub fn inner(&self) -> &JsonValue {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const BUNDLE: &str = r#"
cluster:
  id: abc
  secret: s3cr3t
trustdinfo:
  token: t0k3n
certs:
  os:
    crt: Q1JU
    key: S0VZ
"#;

    #[test]
    fn test_get_paths() {
        let bundle = SecretsBundle::from_yaml(BUNDLE).unwrap();
        assert_eq!(bundle.get_str("cluster.id"), Some("abc"));
        assert_eq!(bundle.get_str("certs.os.crt"), Some("Q1JU"));
        assert!(bundle.get("certs.etcd").is_none());
    }

    #[test]
    fn test_load_errors_name_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("secrets.yaml");
        fs::write(&path, "- not\n- a mapping\n").unwrap();

        match SecretsBundle::load(&path).unwrap_err() {
            CoreError::InvalidSecrets { path: p, .. } => assert!(p.ends_with("secrets.yaml")),
            other => panic!("unexpected error {other:?}"),
        }

        assert!(matches!(
            SecretsBundle::load(dir.path().join("missing.yaml")),
            Err(CoreError::InvalidSecrets { .. })
        ));
    }
}
