//! Shape validation for assembled machine configuration documents
//!
//! The canonical configuration model lives outside this project. The built-in
//! schema only pins down the structure the assembler relies on: the top-level
//! sections, the machine role and the container types of the well-known
//! sections, so a fragment that turns `cluster.network` into a string is
//! caught before anything is written out.

use serde_json::{Value as JsonValue, json};

use crate::error::{CoreError, Result};

/// One schema violation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationErrorInfo {
    /// JSON pointer of the offending value, `(root)` for the document itself
    pub path: String,
    pub message: String,
}

/// Result of schema validation
#[derive(Debug)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ValidationErrorInfo>,
}

impl ValidationResult {
    pub fn success() -> Self {
        Self {
            is_valid: true,
            errors: vec![],
        }
    }

    pub fn failure(errors: Vec<ValidationErrorInfo>) -> Self {
        Self {
            is_valid: false,
            errors,
        }
    }
}

/// Schema validator with cached compiled schema
pub struct SchemaValidator {
    compiled: jsonschema::Validator,
}

impl SchemaValidator {
    pub fn new(schema: &JsonValue) -> Result<Self> {
        let compiled = jsonschema::validator_for(schema).map_err(|e| CoreError::InvalidSchema {
            message: e.to_string(),
        })?;
        Ok(Self { compiled })
    }

    /// Validator for the machine configuration shape
    pub fn machine_config() -> Result<Self> {
        Self::new(&machine_config_schema())
    }

    pub fn validate(&self, document: &JsonValue) -> ValidationResult {
        if self.compiled.is_valid(document) {
            return ValidationResult::success();
        }

        let errors = self
            .compiled
            .iter_errors(document)
            .map(|e| {
                let path = e.instance_path.to_string();
                ValidationErrorInfo {
                    path: if path.is_empty() {
                        "(root)".to_string()
                    } else {
                        path
                    },
                    message: e.to_string().replace('"', "'"),
                }
            })
            .collect();

        ValidationResult::failure(errors)
    }
}

fn object() -> JsonValue {
    json!({ "type": "object" })
}

/// Structural schema of a `v1alpha1` machine configuration document
pub fn machine_config_schema() -> JsonValue {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "required": ["version", "machine", "cluster"],
        "properties": {
            "version": { "const": "v1alpha1" },
            "debug": { "type": "boolean" },
            "persist": { "type": "boolean" },
            "machine": {
                "type": "object",
                "required": ["type"],
                "properties": {
                    "type": { "enum": ["init", "controlplane", "worker"] },
                    "token": { "type": "string" },
                    "certSANs": { "type": "array", "items": { "type": "string" } },
                    "kubelet": object(),
                    "network": {
                        "type": "object",
                        "properties": {
                            "hostname": { "type": "string" },
                            "interfaces": { "type": "array", "items": object() },
                            "nameservers": { "type": "array", "items": { "type": "string" } }
                        }
                    },
                    "install": {
                        "type": "object",
                        "properties": {
                            "disk": { "type": "string" },
                            "image": { "type": "string" },
                            "wipe": { "type": "boolean" }
                        }
                    },
                    "features": object(),
                    "sysctls": object(),
                    "files": { "type": "array" }
                }
            },
            "cluster": {
                "type": "object",
                "properties": {
                    "id": { "type": "string" },
                    "secret": { "type": "string" },
                    "clusterName": { "type": "string" },
                    "controlPlane": {
                        "type": "object",
                        "properties": { "endpoint": { "type": "string" } }
                    },
                    "network": {
                        "type": "object",
                        "properties": {
                            "dnsDomain": { "type": "string" },
                            "podSubnets": { "type": "array", "items": { "type": "string" } },
                            "serviceSubnets": { "type": "array", "items": { "type": "string" } },
                            "cni": {
                                "type": "object",
                                "properties": { "name": { "type": "string" } }
                            }
                        }
                    },
                    "token": { "type": "string" },
                    "apiServer": object(),
                    "controllerManager": object(),
                    "scheduler": object(),
                    "proxy": object(),
                    "etcd": object(),
                    "discovery": object()
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_document() -> JsonValue {
        json!({
            "version": "v1alpha1",
            "machine": {
                "type": "worker",
                "install": { "disk": "/dev/sda" }
            },
            "cluster": {
                "clusterName": "lab",
                "network": { "cni": { "name": "flannel" } }
            }
        })
    }

    #[test]
    fn test_valid_document() {
        let validator = SchemaValidator::machine_config().unwrap();
        let result = validator.validate(&valid_document());
        assert!(result.is_valid);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_container_type_violation() {
        let validator = SchemaValidator::machine_config().unwrap();
        let mut doc = valid_document();
        doc["cluster"]["network"] = json!("flat");

        let result = validator.validate(&doc);
        assert!(!result.is_valid);
        assert_eq!(result.errors[0].path, "/cluster/network");
    }

    #[test]
    fn test_unknown_machine_type() {
        let validator = SchemaValidator::machine_config().unwrap();
        let mut doc = valid_document();
        doc["machine"]["type"] = json!("router");

        let result = validator.validate(&doc);
        assert!(!result.is_valid);
        assert_eq!(result.errors[0].path, "/machine/type");
    }

    #[test]
    fn test_root_violation() {
        let validator = SchemaValidator::machine_config().unwrap();
        let result = validator.validate(&json!({"machine": {"type": "worker"}}));
        assert!(!result.is_valid);
        assert_eq!(result.errors[0].path, "(root)");
    }

    #[test]
    fn test_invalid_schema() {
        let err = SchemaValidator::new(&json!({"type": 42})).err().unwrap();
        assert!(matches!(err, CoreError::InvalidSchema { .. }));
    }
}
