//! SSP Custom Resource Definition
//!
//! An `SSP` resource describes the scheduling, scale and performance
//! components the operator deploys into a cluster.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Structured validation error for `SspSpec`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpecValidationError {
    pub field: String,
    pub message: String,
}

impl SpecValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for SpecValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "ssp.kubevirt.io",
    version = "v1beta1",
    kind = "SSP",
    root = "Ssp",
    namespaced,
    status = "SspStatus",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SspSpec {
    /// Namespace common VM templates are deployed into
    pub common_templates_namespace: String,

    /// Number of template validator replicas
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_validator_replicas: Option<i32>,
}

impl SspSpec {
    /// Validate the spec, returning every problem found
    pub fn validate(&self) -> Result<(), Vec<SpecValidationError>> {
        let mut errors = Vec::new();

        if self.common_templates_namespace.trim().is_empty() {
            errors.push(SpecValidationError::new(
                "spec.commonTemplatesNamespace",
                "must not be empty",
            ));
        }

        if let Some(replicas) = self.template_validator_replicas {
            if replicas < 0 {
                errors.push(SpecValidationError::new(
                    "spec.templateValidatorReplicas",
                    format!("must not be negative, got {replicas}"),
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SspStatus {
    /// Current phase, `Deployed` once reconciled
    #[serde(default)]
    pub phase: String,

    /// Observed generation for status sync detection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}
