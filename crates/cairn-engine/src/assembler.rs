//! Turn rendered fragments into the final document
//!
//! Patch mode concatenates fragments. Full mode overlays every YAML document
//! of every fragment onto a generated base and checks the result's shape.

use cairn_core::values::kind_name;
use cairn_core::{SchemaValidator, SecretsBundle, VersionContract, deep_merge};
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::base::{BaseConfig, BaseConfigInput};
use crate::engine::RenderedFragment;
use crate::error::{EngineError, Result};

/// Role used when neither fragments nor the node name one
pub const DEFAULT_MACHINE_TYPE: &str = "worker";

/// Inputs for the base document in full mode
#[derive(Debug, Clone)]
pub struct FullOptions {
    pub cluster_name: String,
    pub endpoint: String,
    pub contract: VersionContract,
    pub kubernetes_version: String,
    pub secrets: Option<SecretsBundle>,
    /// Role reported by the node, empty offline
    pub discovered_machine_type: String,
}

#[derive(Debug, Clone)]
pub enum AssemblyMode {
    Patch,
    Full(Box<FullOptions>),
}

pub struct Assembler {
    mode: AssemblyMode,
}

impl Assembler {
    pub fn patch() -> Self {
        Self {
            mode: AssemblyMode::Patch,
        }
    }

    pub fn full(options: FullOptions) -> Self {
        Self {
            mode: AssemblyMode::Full(Box::new(options)),
        }
    }

    pub fn mode(&self) -> &AssemblyMode {
        &self.mode
    }

    pub fn assemble(&self, fragments: &[RenderedFragment]) -> Result<String> {
        match &self.mode {
            AssemblyMode::Patch => Ok(concatenate(fragments)),
            AssemblyMode::Full(options) => {
                let merged = merge_full(options, fragments)?;
                Ok(serde_yaml::to_string(&merged)?)
            }
        }
    }
}

/// Fragments verbatim, each newline-terminated, separated by `---`
fn concatenate(fragments: &[RenderedFragment]) -> String {
    let mut parts = Vec::with_capacity(fragments.len());
    for fragment in fragments {
        if fragment.content.trim().is_empty() {
            tracing::warn!(template = %fragment.name, "skipping empty fragment");
            continue;
        }
        let mut part = fragment.content.clone();
        if !part.ends_with('\n') {
            part.push('\n');
        }
        parts.push(part);
    }
    parts.join("---\n")
}

fn documents(fragment: &RenderedFragment) -> Result<Vec<JsonValue>> {
    let mut docs = Vec::new();
    for document in serde_yaml::Deserializer::from_str(&fragment.content) {
        let value = JsonValue::deserialize(document)
            .map_err(|e| EngineError::merge_conflict(&fragment.name, format!("invalid YAML: {e}")))?;
        match value {
            JsonValue::Null => continue,
            JsonValue::Object(_) => docs.push(value),
            other => {
                return Err(EngineError::merge_conflict(
                    &fragment.name,
                    format!("fragment is a {}, expected a mapping", kind_name(&other)),
                ));
            }
        }
    }
    Ok(docs)
}

fn merge_full(options: &FullOptions, fragments: &[RenderedFragment]) -> Result<JsonValue> {
    let mut overlays = Vec::new();
    for fragment in fragments {
        overlays.extend(documents(fragment)?);
    }

    let from_fragments = overlays
        .iter()
        .rev()
        .find_map(|doc| doc.pointer("/machine/type").and_then(|t| t.as_str()))
        .map(str::to_string);
    let machine_type = from_fragments
        .or_else(|| Some(options.discovered_machine_type.clone()).filter(|t| !t.is_empty()))
        .unwrap_or_else(|| DEFAULT_MACHINE_TYPE.to_string());

    tracing::debug!(machine_type, documents = overlays.len(), "assembling full document");

    let mut merged = BaseConfig::generate(&BaseConfigInput {
        cluster_name: &options.cluster_name,
        endpoint: &options.endpoint,
        machine_type: &machine_type,
        contract: options.contract,
        kubernetes_version: &options.kubernetes_version,
        secrets: options.secrets.as_ref(),
    });

    for overlay in &overlays {
        deep_merge(&mut merged, overlay);
    }

    let result = SchemaValidator::machine_config()?.validate(&merged);
    if let Some(violation) = result.errors.into_iter().next() {
        return Err(EngineError::merge_conflict(violation.path, violation.message));
    }

    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(name: &str, content: &str) -> RenderedFragment {
        RenderedFragment {
            name: name.to_string(),
            content: content.to_string(),
        }
    }

    fn options() -> FullOptions {
        FullOptions {
            cluster_name: "lab".to_string(),
            endpoint: "https://10.0.0.10:6443".to_string(),
            contract: VersionContract::new(1, 7),
            kubernetes_version: "1.30.3".to_string(),
            secrets: None,
            discovered_machine_type: String::new(),
        }
    }

    fn parse(yaml: &str) -> JsonValue {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_patch_concatenates_fragments() {
        let out = Assembler::patch()
            .assemble(&[
                fragment("a.yaml", "machine:\n  type: worker\n"),
                fragment("empty.yaml", "\n  \n"),
                fragment("b.yaml", "cluster:\n  clusterName: lab"),
            ])
            .unwrap();

        assert_eq!(out, "machine:\n  type: worker\n---\ncluster:\n  clusterName: lab\n");
    }

    #[test]
    fn test_patch_output_snapshot() {
        let out = Assembler::patch()
            .assemble(&[
                fragment("controlplane.yaml", "machine:\n  type: controlplane\n  install:\n    disk: /dev/sda\n"),
                fragment("network.yaml", "cluster:\n  network:\n    cni:\n      name: none\n"),
            ])
            .unwrap();

        insta::assert_snapshot!(out, @r"
        machine:
          type: controlplane
          install:
            disk: /dev/sda
        ---
        cluster:
          network:
            cni:
              name: none
        ");
    }

    #[test]
    fn test_patch_keeps_fragment_text() {
        let text = "# comment stays\nmachine:\n  network: {}   # trailing too\n";
        let out = Assembler::patch().assemble(&[fragment("a.yaml", text)]).unwrap();
        assert_eq!(out, text);
    }

    #[test]
    fn test_full_overrides_cni_only() {
        let assembler = Assembler::full(options());
        let base = parse(&assembler.assemble(&[]).unwrap());

        let out = assembler
            .assemble(&[fragment("cp.yaml", "cluster:\n  network:\n    cni:\n      name: none\n")])
            .unwrap();
        let merged = parse(&out);

        assert_eq!(merged["cluster"]["network"]["cni"]["name"], "none");

        let mut expected = base.clone();
        expected["cluster"]["network"]["cni"]["name"] = JsonValue::from("none");
        assert_eq!(merged, expected);
    }

    #[test]
    fn test_full_machine_type_selection() {
        let out = Assembler::full(options()).assemble(&[]).unwrap();
        assert_eq!(parse(&out)["machine"]["type"], "worker");

        let mut discovered = options();
        discovered.discovered_machine_type = "controlplane".to_string();
        let out = Assembler::full(discovered.clone()).assemble(&[]).unwrap();
        assert_eq!(parse(&out)["machine"]["type"], "controlplane");
        assert!(parse(&out)["cluster"].get("apiServer").is_some());

        let out = Assembler::full(discovered)
            .assemble(&[
                fragment("a.yaml", "machine:\n  type: init\n"),
                fragment("b.yaml", "machine:\n  type: worker\n---\nmachine:\n  install:\n    disk: /dev/vda\n"),
            ])
            .unwrap();
        let merged = parse(&out);
        assert_eq!(merged["machine"]["type"], "worker");
        assert_eq!(merged["machine"]["install"]["disk"], "/dev/vda");
    }

    #[test]
    fn test_full_rejects_non_mapping_fragment() {
        let err = Assembler::full(options())
            .assemble(&[fragment("list.yaml", "- a\n- b\n")])
            .unwrap_err();
        match err {
            EngineError::MergeConflict { path, message } => {
                assert_eq!(path, "list.yaml");
                assert!(message.contains("expected a mapping"));
            }
            other => panic!("expected a merge conflict, got {other:?}"),
        }
    }

    #[test]
    fn test_full_reports_shape_violation() {
        let err = Assembler::full(options())
            .assemble(&[fragment("bad.yaml", "cluster:\n  network: flat\n")])
            .unwrap_err();
        match err {
            EngineError::MergeConflict { path, .. } => assert_eq!(path, "/cluster/network"),
            other => panic!("expected a merge conflict, got {other:?}"),
        }
    }
}
