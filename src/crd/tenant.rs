//! Workspace resource (`tenant.kubesphere.io/v1alpha1`).

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "tenant.kubesphere.io",
    version = "v1alpha1",
    kind = "Workspace",
    plural = "workspaces"
)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager: Option<String>,
    /// Isolate workspace namespaces with network policies
    #[serde(default)]
    pub network_isolation: bool,
}
