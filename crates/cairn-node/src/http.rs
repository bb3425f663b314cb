//! HTTP/JSON resource client
//!
//! Resources are read from `<base>/v1/resources/<namespace>/<kind>[/<id>]`.
//! A 404 means the resource does not exist; every other failure is a
//! connectivity error.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

use crate::client::NodeClient;
use crate::config::NodeCredentials;
use crate::error::{NodeError, Result};
use crate::resource::{Resource, ResourceList};

/// Default API port of a node
pub const DEFAULT_PORT: u16 = 50000;

/// Header naming the node a request is proxied to when the endpoint is a
/// different machine
pub const TARGET_NODE_HEADER: &str = "x-target-node";

/// How the client authenticates the node and itself
#[derive(Debug, Clone)]
pub enum TlsMode {
    /// Accept any server certificate, present no client identity
    Insecure,
    /// Trust the cluster CA and present a client certificate
    Authenticated(NodeCredentials),
}

pub struct HttpNodeClient {
    client: reqwest::Client,
    base: Url,
    endpoint: String,
    target_node: Option<String>,
}

impl HttpNodeClient {
    pub fn new(endpoint: &str, tls: &TlsMode, timeout: Duration) -> Result<Self> {
        let base = endpoint_url(endpoint)?;

        let mut builder = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(timeout)
            .timeout(timeout);

        builder = match tls {
            TlsMode::Insecure => builder.danger_accept_invalid_certs(true),
            TlsMode::Authenticated(creds) => {
                let ca = reqwest::Certificate::from_pem(&creds.ca_pem).map_err(|e| {
                    NodeError::InvalidConfig(format!("invalid CA certificate: {e}"))
                })?;
                let identity = reqwest::Identity::from_pem(&creds.identity_pem).map_err(|e| {
                    NodeError::InvalidConfig(format!("invalid client certificate: {e}"))
                })?;
                builder.add_root_certificate(ca).identity(identity)
            }
        };

        let client = builder
            .build()
            .map_err(|e| NodeError::InvalidConfig(format!("cannot build client: {e}")))?;

        Ok(Self {
            client,
            base,
            endpoint: endpoint.to_string(),
            target_node: None,
        })
    }

    /// Route requests to `node` through the endpoint
    pub fn with_target_node(mut self, node: impl Into<String>) -> Self {
        self.target_node = Some(node.into());
        self
    }

    fn resource_url(&self, namespace: &str, kind: &str, id: Option<&str>) -> Result<Url> {
        let mut url = self.base.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                NodeError::InvalidConfig(format!("endpoint '{}' cannot be a base URL", self.endpoint))
            })?;
            segments
                .pop_if_empty()
                .extend(["v1", "resources", namespace, kind]);
            if let Some(id) = id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    async fn fetch<T: DeserializeOwned>(&self, url: Url) -> Result<Option<T>> {
        let mut request = self.client.get(url.clone());
        if let Some(node) = &self.target_node {
            request = request.header(TARGET_NODE_HEADER, node);
        }

        tracing::debug!(url = %url, "node request");

        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(NodeError::connectivity(
                &self.endpoint,
                format!("{} returned {}", url.path(), status),
            ));
        }

        let body = response.json::<T>().await.map_err(|e| {
            NodeError::connectivity(
                &self.endpoint,
                format!("invalid response from {}: {}", url.path(), e),
            )
        })?;
        Ok(Some(body))
    }

    fn transport_error(&self, e: reqwest::Error) -> NodeError {
        let message = if e.is_timeout() {
            "request timed out".to_string()
        } else if e.is_connect() {
            format!("connection failed: {e}")
        } else {
            e.to_string()
        };
        NodeError::connectivity(&self.endpoint, message)
    }
}

#[async_trait]
impl NodeClient for HttpNodeClient {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn get(&self, kind: &str, namespace: &str, id: &str) -> Result<Option<Resource>> {
        let url = self.resource_url(namespace, kind, Some(id))?;
        self.fetch::<Resource>(url).await
    }

    async fn list(&self, kind: &str, namespace: &str) -> Result<Vec<Resource>> {
        let url = self.resource_url(namespace, kind, None)?;
        Ok(self
            .fetch::<ResourceList>(url)
            .await?
            .map(|list| list.items)
            .unwrap_or_default())
    }
}

/// Build the base URL for an endpoint
///
/// Accepts full URLs, `host`, `host:port`, bare IPv6 and `[v6]:port`.
/// Without a scheme the connection uses https on [`DEFAULT_PORT`].
pub fn endpoint_url(endpoint: &str) -> Result<Url> {
    let endpoint = endpoint.trim();
    if endpoint.is_empty() {
        return Err(NodeError::InvalidConfig("empty endpoint".to_string()));
    }

    let invalid =
        |e: url::ParseError| NodeError::InvalidConfig(format!("invalid endpoint '{endpoint}': {e}"));

    if endpoint.contains("://") {
        return Url::parse(endpoint).map_err(invalid);
    }

    let bare_ipv6 = endpoint.matches(':').count() > 1 && !endpoint.starts_with('[');
    let (host, has_port) = if bare_ipv6 {
        (format!("[{endpoint}]"), false)
    } else if endpoint.starts_with('[') {
        (endpoint.to_string(), endpoint.contains("]:"))
    } else {
        (endpoint.to_string(), endpoint.contains(':'))
    };

    let mut url = Url::parse(&format!("https://{host}")).map_err(invalid)?;
    if !has_port {
        url.set_port(Some(DEFAULT_PORT))
            .map_err(|_| NodeError::InvalidConfig(format!("invalid endpoint '{endpoint}'")))?;
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url_forms() {
        assert_eq!(endpoint_url("10.0.0.1").unwrap().as_str(), "https://10.0.0.1:50000/");
        assert_eq!(endpoint_url("10.0.0.1:6000").unwrap().as_str(), "https://10.0.0.1:6000/");
        assert_eq!(endpoint_url("fd00::1").unwrap().as_str(), "https://[fd00::1]:50000/");
        assert_eq!(endpoint_url("[fd00::1]:6000").unwrap().as_str(), "https://[fd00::1]:6000/");
        assert_eq!(
            endpoint_url("http://127.0.0.1:8080").unwrap().as_str(),
            "http://127.0.0.1:8080/"
        );
        assert!(endpoint_url("").is_err());
    }

    #[test]
    fn test_resource_url() {
        let client = HttpNodeClient::new("10.0.0.1", &TlsMode::Insecure, Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.resource_url("network", "routes", None).unwrap().as_str(),
            "https://10.0.0.1:50000/v1/resources/network/routes"
        );
        assert_eq!(
            client
                .resource_url("network", "links", Some("eth0"))
                .unwrap()
                .as_str(),
            "https://10.0.0.1:50000/v1/resources/network/links/eth0"
        );
    }

    #[test]
    fn test_invalid_credentials() {
        let tls = TlsMode::Authenticated(NodeCredentials {
            ca_pem: b"not a certificate".to_vec(),
            identity_pem: b"nope".to_vec(),
        });
        let err = HttpNodeClient::new("10.0.0.1", &tls, Duration::from_secs(1))
            .err()
            .unwrap();
        assert!(matches!(err, NodeError::InvalidConfig(_)));
    }
}
