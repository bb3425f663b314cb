//! Cairn Node - live node access for template lookups
//!
//! This crate provides:
//! - **Lookup Providers**: the blocking `LookupProvider` seam used by template
//!   functions, with a live and an offline implementation
//! - **Node Clients**: an HTTP/JSON client for the node resource API and an
//!   in-memory snapshot client
//! - **Node Config**: endpoints, nodes and TLS material for authenticated access

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod lookup;
pub mod resource;
pub mod snapshot;

pub use client::NodeClient;
pub use config::{NodeConfig, NodeContext, NodeCredentials};
pub use error::{NodeError, Result};
pub use http::{HttpNodeClient, TlsMode};
pub use lookup::{LiveLookup, LookupProvider, NullLookup};
pub use resource::{Resource, ResourceList, default_namespace};
pub use snapshot::SnapshotClient;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// How lookups reach the node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupMode {
    /// No node access, every lookup is empty
    Offline,
    /// TLS without verification or client identity (maintenance mode)
    Insecure,
    /// Mutual TLS with credentials from the node config
    Authenticated,
}

/// Connection inputs for [`open`]
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub endpoints: Vec<String>,
    pub nodes: Vec<String>,
    pub node_config: Option<PathBuf>,
    /// Serve lookups from a resource dump instead of the network
    pub snapshot: Option<PathBuf>,
    pub timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            nodes: Vec::new(),
            node_config: None,
            snapshot: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Build the lookup provider for one invocation
pub fn open(mode: LookupMode, options: &ConnectOptions) -> Result<Arc<dyn LookupProvider>> {
    if mode == LookupMode::Offline {
        tracing::debug!("lookups disabled");
        return Ok(Arc::new(NullLookup));
    }

    if let Some(path) = &options.snapshot {
        let client = SnapshotClient::load(path)?;
        tracing::debug!(path = %path.display(), resources = client.len(), "serving lookups from snapshot");
        return Ok(Arc::new(LiveLookup::connect(Box::new(client), options.timeout)?));
    }

    let (endpoints, nodes, tls) = match mode {
        LookupMode::Insecure => (options.endpoints.clone(), options.nodes.clone(), TlsMode::Insecure),
        _ => {
            let path = options.node_config.as_ref().ok_or_else(|| {
                NodeError::InvalidConfig("no node config file given".to_string())
            })?;
            let config = NodeConfig::load(path)?;
            let context = config.current()?;
            let pick = |cli: &[String], file: &[String]| {
                if cli.is_empty() { file.to_vec() } else { cli.to_vec() }
            };
            (
                pick(&options.endpoints, &context.endpoints),
                pick(&options.nodes, &context.nodes),
                TlsMode::Authenticated(context.credentials()?),
            )
        }
    };

    let endpoint = endpoints
        .first()
        .or_else(|| nodes.first())
        .ok_or_else(|| NodeError::InvalidConfig("no endpoint or node given".to_string()))?;

    let mut client = HttpNodeClient::new(endpoint, &tls, options.timeout)?;
    if let Some(node) = nodes.first().filter(|n| *n != endpoint) {
        client = client.with_target_node(node.clone());
    }

    Ok(Arc::new(LiveLookup::connect(Box::new(client), options.timeout)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_open_offline() {
        let provider = open(LookupMode::Offline, &ConnectOptions::default()).unwrap();
        assert!(!provider.is_live());
    }

    #[test]
    fn test_open_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("node.yaml");
        fs::write(&path, "kind: hostname\nmetadata: {id: hostname}\nspec: {hostname: cp-1}\n").unwrap();

        let options = ConnectOptions {
            snapshot: Some(path),
            ..Default::default()
        };
        let provider = open(LookupMode::Insecure, &options).unwrap();
        assert!(provider.is_live());
        let hostname = provider.get("hostname", "", "hostname").unwrap().unwrap();
        assert_eq!(hostname.spec["hostname"], "cp-1");
    }

    #[test]
    fn test_open_without_endpoint() {
        let err = open(LookupMode::Insecure, &ConnectOptions::default()).err().unwrap();
        assert!(matches!(err, NodeError::InvalidConfig(_)));
    }

    #[test]
    fn test_open_authenticated_needs_config() {
        let options = ConnectOptions {
            endpoints: vec!["10.0.0.1".into()],
            ..Default::default()
        };
        let err = open(LookupMode::Authenticated, &options).err().unwrap();
        assert!(matches!(err, NodeError::InvalidConfig(_)));
    }
}
