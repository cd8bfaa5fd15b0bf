//! Member cluster resource (`cluster.kubesphere.io/v1alpha1`).

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A cluster joined to this host for multi-cluster management.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "cluster.kubesphere.io",
    version = "v1alpha1",
    kind = "Cluster",
    plural = "clusters",
    status = "ClusterStatus",
    printcolumn = r#"{"name":"Federated", "type":"boolean", "jsonPath":".spec.joinFederation"}"#,
    printcolumn = r#"{"name":"Provider", "type":"string", "jsonPath":".spec.provider"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    #[serde(default)]
    pub join_federation: bool,
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub connection: Connection,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    /// `direct` or `proxy`
    #[serde(default)]
    pub r#type: String,
    #[serde(default)]
    pub kubernetes_api_endpoint: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    #[serde(default)]
    pub kubernetes_version: Option<String>,
    #[serde(default)]
    pub node_count: i32,
}
