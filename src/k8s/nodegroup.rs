//! NodeGroup declaration document.
//!
//! Uses the `deckhouse.io/v1alpha1` NodeGroup CRD through the Kubernetes
//! Dynamic API. Only `metadata.name` and `spec.nodeTemplate` are read by
//! ngc; every other field is carried through untouched.

use kube::api::{ApiResource, DynamicObject};
use kube::core::ObjectMeta;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::NgcError;

pub const API_GROUP: &str = "deckhouse.io";
pub const API_VERSION: &str = "v1alpha1";
pub const KIND: &str = "NodeGroup";
pub const PLURAL: &str = "nodegroups";

/// ApiResource definition for `deckhouse.io/v1alpha1` NodeGroup.
pub fn nodegroup_api_resource() -> ApiResource {
    ApiResource {
        group: API_GROUP.to_string(),
        version: API_VERSION.to_string(),
        api_version: format!("{}/{}", API_GROUP, API_VERSION),
        kind: KIND.to_string(),
        plural: PLURAL.to_string(),
    }
}

/// A NodeGroup object as declared by the caller or observed in the cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeGroup {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub spec: Value,
    /// Unknown top-level fields (e.g. `status`), kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NodeGroup {
    /// Parse a declaration from YAML or JSON text.
    ///
    /// Fills in `apiVersion` and `kind` when omitted and rejects documents
    /// without a name or of a different kind.
    pub fn parse(text: &str) -> Result<Self, NgcError> {
        let value: Value = serde_yaml::from_str(text)
            .map_err(|e| NgcError::InvalidDeclaration(e.to_string()))?;
        Self::from_value(value)
    }

    /// Build a declaration from an arbitrary JSON document.
    pub fn from_value(value: Value) -> Result<Self, NgcError> {
        let group: Self = serde_json::from_value(value)
            .map_err(|e| NgcError::InvalidDeclaration(e.to_string()))?;
        group.validated()
    }

    fn validated(mut self) -> Result<Self, NgcError> {
        if self.kind.is_empty() {
            self.kind = KIND.to_string();
        } else if self.kind != KIND {
            return Err(NgcError::InvalidDeclaration(format!(
                "expected kind {}, got {}",
                KIND, self.kind
            )));
        }

        if self.api_version.is_empty() {
            self.api_version = format!("{}/{}", API_GROUP, API_VERSION);
        }

        if self.metadata.name.as_deref().is_none_or(str::is_empty) {
            return Err(NgcError::InvalidDeclaration(
                "metadata.name is required".to_string(),
            ));
        }

        Ok(self)
    }

    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    /// The `spec.nodeTemplate` sub-document, if it is an object.
    pub fn node_template(&self) -> Option<&Value> {
        self.spec.get("nodeTemplate").filter(|v| v.is_object())
    }

    /// Full document serialized as a JSON merge patch body.
    pub fn merge_patch(&self) -> Result<Value, NgcError> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn to_dynamic(&self) -> Result<DynamicObject, NgcError> {
        Ok(serde_json::from_value(serde_json::to_value(self)?)?)
    }

    pub fn from_dynamic(obj: DynamicObject) -> Result<Self, NgcError> {
        Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
    }
}
