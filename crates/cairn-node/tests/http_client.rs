//! HTTP node client tests against a mock resource API

use std::time::Duration;

use cairn_node::{HttpNodeClient, LiveLookup, LookupProvider, NodeClient, NodeError, TlsMode};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> HttpNodeClient {
    HttpNodeClient::new(&server.uri(), &TlsMode::Insecure, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_get_resource() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/resources/network/hostname/hostname"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "metadata": {"namespace": "network", "type": "hostname", "id": "hostname"},
            "spec": {"hostname": "cp-1", "domainname": ""}
        })))
        .mount(&server)
        .await;

    let resource = client(&server)
        .get("hostname", "network", "hostname")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(resource.id(), "hostname");
    assert_eq!(resource.spec["hostname"], "cp-1");
}

#[tokio::test]
async fn test_not_found_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = client(&server);
    assert!(client.get("links", "network", "eth9").await.unwrap().is_none());
    assert!(client.list("routes", "network").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_list_resources() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/resources/network/routes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {"metadata": {"id": "a"}, "spec": {"dst": "", "gateway": "10.0.0.1"}},
                {"metadata": {"id": "b"}, "spec": {"dst": "10.0.0.0/24", "gateway": ""}}
            ]
        })))
        .mount(&server)
        .await;

    let routes = client(&server).list("routes", "network").await.unwrap();
    assert_eq!(routes.len(), 2);
    assert_eq!(routes[0].spec["gateway"], "10.0.0.1");
}

#[tokio::test]
async fn test_target_node_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("x-target-node", "10.0.0.11"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server).with_target_node("10.0.0.11");
    assert!(client.list("disks", "runtime").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_server_error_is_connectivity() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client(&server).list("routes", "network").await.unwrap_err();
    assert!(err.is_connectivity());
}

#[tokio::test]
async fn test_malformed_body_is_connectivity() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = client(&server).get("links", "network", "eth0").await.unwrap_err();
    assert!(matches!(err, NodeError::Connectivity { .. }));
}

#[tokio::test]
async fn test_refused_connection() {
    let client = HttpNodeClient::new(
        "http://127.0.0.1:9",
        &TlsMode::Insecure,
        Duration::from_secs(2),
    )
    .unwrap();
    let err = client.probe().await.unwrap_err();
    assert!(err.is_connectivity());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_live_lookup_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/resources/network/hostname/hostname"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "metadata": {"id": "hostname"},
            "spec": {"hostname": "cp-1"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/resources/network/links"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"metadata": {"id": "eth0"}, "spec": {"busPath": "pci-0000:00:03.0"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let http = client(&server);

    // LiveLookup owns its own runtime, so it runs on a plain thread
    let links = std::thread::spawn(move || {
        let lookup = LiveLookup::connect(Box::new(http), Duration::from_secs(5)).unwrap();
        lookup.list("links", "").unwrap();
        lookup.list("links", "network").unwrap()
    })
    .join()
    .unwrap();

    assert_eq!(links.len(), 1);
    assert_eq!(links[0].id(), "eth0");
}
