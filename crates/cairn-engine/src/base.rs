//! Base machine configuration for full mode
//!
//! Produces a minimal but complete document for the given role. Contract
//! gates decide which feature flags appear; secrets fill the identity fields
//! and are simply left out when no bundle was given.

use cairn_core::{SecretsBundle, VersionContract};
use serde_json::{Map, Value as JsonValue, json};

const IMAGE_REGISTRY: &str = "ghcr.io/siderolabs";
const K8S_REGISTRY: &str = "registry.k8s.io";

/// Inputs of [`BaseConfig::generate`]
#[derive(Debug, Clone)]
pub struct BaseConfigInput<'a> {
    pub cluster_name: &'a str,
    pub endpoint: &'a str,
    /// `init`, `controlplane` or `worker`
    pub machine_type: &'a str,
    pub contract: VersionContract,
    /// Without a leading `v`
    pub kubernetes_version: &'a str,
    pub secrets: Option<&'a SecretsBundle>,
}

pub struct BaseConfig;

impl BaseConfig {
    pub fn generate(input: &BaseConfigInput<'_>) -> JsonValue {
        let k8s = input.kubernetes_version.trim_start_matches('v');
        let secret = |path: &str| input.secrets.and_then(|s| s.get(path)).cloned();
        let is_controlplane = matches!(input.machine_type, "init" | "controlplane");

        let mut features = Map::new();
        features.insert("rbac".into(), json!(true));
        features.insert("stableHostname".into(), json!(true));
        features.insert("apidCheckExtKeyUsage".into(), json!(true));
        features.insert("diskQuotaSupport".into(), json!(true));
        if input.contract.at_least(1, 6) {
            features.insert("kubePrism".into(), json!({ "enabled": true, "port": 7445 }));
        }
        if input.contract.at_least(1, 8) {
            features.insert("hostDNS".into(), json!({ "enabled": true, "forwardKubeDNSToHost": true }));
        }

        let mut machine = Map::new();
        machine.insert("type".into(), json!(input.machine_type));
        insert_some(&mut machine, "token", secret("trustdinfo.token"));
        insert_some(&mut machine, "ca", secret("certs.os"));
        machine.insert("certSANs".into(), json!([]));
        machine.insert(
            "kubelet".into(),
            json!({
                "image": format!("{IMAGE_REGISTRY}/kubelet:v{k8s}"),
                "defaultRuntimeSeccompProfileEnabled": true,
                "disableManifestsDirectory": true,
            }),
        );
        machine.insert("network".into(), json!({}));
        machine.insert(
            "install".into(),
            json!({
                "disk": "/dev/sda",
                "image": format!("{IMAGE_REGISTRY}/installer:v{}.{}.0", input.contract.major, input.contract.minor),
                "wipe": false,
            }),
        );
        machine.insert("features".into(), JsonValue::Object(features));

        let mut cluster = Map::new();
        insert_some(&mut cluster, "id", secret("cluster.id"));
        insert_some(&mut cluster, "secret", secret("cluster.secret"));
        cluster.insert("controlPlane".into(), json!({ "endpoint": input.endpoint }));
        cluster.insert("clusterName".into(), json!(input.cluster_name));
        cluster.insert(
            "network".into(),
            json!({
                "dnsDomain": "cluster.local",
                "podSubnets": ["10.244.0.0/16"],
                "serviceSubnets": ["10.96.0.0/12"],
                "cni": { "name": "flannel" },
            }),
        );
        insert_some(&mut cluster, "token", secret("secrets.bootstraptoken"));
        insert_some(&mut cluster, "ca", secret("certs.k8s"));

        if is_controlplane {
            insert_some(
                &mut cluster,
                "secretboxEncryptionSecret",
                secret("secrets.secretboxencryptionsecret"),
            );
            insert_some(&mut cluster, "aggregatorCA", secret("certs.k8saggregator"));
            insert_some(&mut cluster, "serviceAccount", secret("certs.k8sserviceaccount"));
            cluster.insert(
                "apiServer".into(),
                json!({
                    "image": format!("{K8S_REGISTRY}/kube-apiserver:v{k8s}"),
                    "certSANs": [],
                }),
            );
            cluster.insert(
                "controllerManager".into(),
                json!({ "image": format!("{K8S_REGISTRY}/kube-controller-manager:v{k8s}") }),
            );
            cluster.insert("proxy".into(), json!({ "image": format!("{K8S_REGISTRY}/kube-proxy:v{k8s}") }));
            cluster.insert(
                "scheduler".into(),
                json!({ "image": format!("{K8S_REGISTRY}/kube-scheduler:v{k8s}") }),
            );
            cluster.insert("discovery".into(), json!({ "enabled": true }));
            let mut etcd = Map::new();
            insert_some(&mut etcd, "ca", secret("certs.etcd"));
            cluster.insert("etcd".into(), JsonValue::Object(etcd));
        }

        json!({
            "version": "v1alpha1",
            "debug": false,
            "persist": true,
            "machine": machine,
            "cluster": cluster,
        })
    }
}

fn insert_some(map: &mut Map<String, JsonValue>, key: &str, value: Option<JsonValue>) {
    if let Some(value) = value {
        map.insert(key.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_core::SchemaValidator;

    fn input<'a>(machine_type: &'a str, contract: VersionContract, secrets: Option<&'a SecretsBundle>) -> BaseConfigInput<'a> {
        BaseConfigInput {
            cluster_name: "lab",
            endpoint: "https://10.0.0.10:6443",
            machine_type,
            contract,
            kubernetes_version: "v1.30.3",
            secrets,
        }
    }

    #[test]
    fn test_worker_base_without_secrets() {
        let base = BaseConfig::generate(&input("worker", VersionContract::new(1, 7), None));

        assert_eq!(base["machine"]["type"], "worker");
        assert_eq!(base["machine"]["kubelet"]["image"], "ghcr.io/siderolabs/kubelet:v1.30.3");
        assert_eq!(base["machine"]["install"]["image"], "ghcr.io/siderolabs/installer:v1.7.0");
        assert_eq!(base["cluster"]["clusterName"], "lab");
        assert_eq!(base["cluster"]["network"]["cni"]["name"], "flannel");
        assert!(base["machine"].get("token").is_none());
        assert!(base["cluster"].get("apiServer").is_none());
        assert!(base["machine"]["features"].get("kubePrism").is_some());
        assert!(base["machine"]["features"].get("hostDNS").is_none());

        assert!(SchemaValidator::machine_config().unwrap().validate(&base).is_valid);
    }

    #[test]
    fn test_controlplane_base_with_secrets() {
        let secrets = SecretsBundle::from_yaml(
            "cluster: {id: cid, secret: csecret}\n\
             secrets: {bootstraptoken: abc.def, secretboxencryptionsecret: box}\n\
             trustdinfo: {token: trust.token}\n\
             certs:\n  os: {crt: oscrt, key: oskey}\n  k8s: {crt: kcrt, key: kkey}\n  etcd: {crt: ecrt, key: ekey}\n",
        )
        .unwrap();

        let base = BaseConfig::generate(&input("controlplane", VersionContract::new(1, 9), Some(&secrets)));

        assert_eq!(base["machine"]["token"], "trust.token");
        assert_eq!(base["machine"]["ca"]["crt"], "oscrt");
        assert_eq!(base["cluster"]["id"], "cid");
        assert_eq!(base["cluster"]["token"], "abc.def");
        assert_eq!(base["cluster"]["secretboxEncryptionSecret"], "box");
        assert_eq!(base["cluster"]["etcd"]["ca"]["key"], "ekey");
        assert_eq!(base["cluster"]["apiServer"]["image"], "registry.k8s.io/kube-apiserver:v1.30.3");
        assert!(base["cluster"].get("aggregatorCA").is_none());
        assert!(base["machine"]["features"].get("hostDNS").is_some());
    }

    #[test]
    fn test_old_contract_has_no_kubeprism() {
        let base = BaseConfig::generate(&input("worker", VersionContract::new(1, 5), None));
        assert!(base["machine"]["features"].get("kubePrism").is_none());
    }
}
