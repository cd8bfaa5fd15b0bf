//! IAM resources (`iam.kubesphere.io/v1alpha2`) and their federated
//! counterparts (`types.kubefed.io/v1beta1`).

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A KubeSphere platform user.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "iam.kubesphere.io",
    version = "v1alpha2",
    kind = "User",
    plural = "users",
    status = "UserStatus",
    printcolumn = r#"{"name":"Email", "type":"string", "jsonPath":".spec.email"}"#,
    printcolumn = r#"{"name":"Status", "type":"string", "jsonPath":".status.state"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct UserSpec {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserStatus {
    /// `Active`, `Disabled` or `AuthLimitExceeded`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login_time: Option<String>,
}

/// One login attempt of a user.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "iam.kubesphere.io",
    version = "v1alpha2",
    kind = "LoginRecord",
    plural = "loginrecords"
)]
#[serde(rename_all = "camelCase")]
pub struct LoginRecordSpec {
    /// `Token`, `OAuth` or `BasicAuth`
    pub r#type: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default, rename = "sourceIP")]
    pub source_ip: String,
    #[serde(default)]
    pub user_agent: String,
    pub success: bool,
    #[serde(default)]
    pub reason: String,
}

/// A platform-wide role. Rules live at the top level, not under `spec`.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct GlobalRole {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRule {
    #[serde(default)]
    pub verbs: Vec<String>,
    #[serde(default)]
    pub api_groups: Vec<String>,
    #[serde(default)]
    pub resources: Vec<String>,
}

impl k8s_openapi::Resource for GlobalRole {
    const API_VERSION: &'static str = "iam.kubesphere.io/v1alpha2";
    const GROUP: &'static str = "iam.kubesphere.io";
    const KIND: &'static str = "GlobalRole";
    const VERSION: &'static str = "v1alpha2";
    const URL_PATH_SEGMENT: &'static str = "globalroles";
    type Scope = k8s_openapi::ClusterResourceScope;
}

impl k8s_openapi::Metadata for GlobalRole {
    type Ty = ObjectMeta;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

/// Binds subjects to a [`GlobalRole`].
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "iam.kubesphere.io",
    version = "v1alpha2",
    kind = "GlobalRoleBinding",
    plural = "globalrolebindings"
)]
#[serde(rename_all = "camelCase")]
pub struct GlobalRoleBindingSpec {
    pub role_ref: RoleRef,
    #[serde(default)]
    pub subjects: Vec<Subject>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoleRef {
    #[serde(default)]
    pub api_group: String,
    pub kind: String,
    pub name: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_group: Option<String>,
}

/// A user group. Groups carry no spec of their own.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "iam.kubesphere.io",
    version = "v1alpha2",
    kind = "Group",
    plural = "groups"
)]
pub struct GroupSpec {}

/// Binds users to a [`Group`].
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "iam.kubesphere.io",
    version = "v1alpha2",
    kind = "GroupBinding",
    plural = "groupbindings"
)]
#[serde(rename_all = "camelCase")]
pub struct GroupBindingSpec {
    #[serde(default)]
    pub group_ref: GroupRef,
    #[serde(default)]
    pub users: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GroupRef {
    #[serde(default)]
    pub api_group: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub name: String,
}

/// Federated wrapper propagating a [`Group`] to member clusters.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "types.kubefed.io",
    version = "v1beta1",
    kind = "FederatedGroup",
    plural = "federatedgroups"
)]
#[serde(rename_all = "camelCase")]
pub struct FederatedGroupSpec {
    #[serde(default)]
    pub placement: Placement,
}

/// Federated wrapper propagating a [`GroupBinding`] to member clusters.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "types.kubefed.io",
    version = "v1beta1",
    kind = "FederatedGroupBinding",
    plural = "federatedgroupbindings"
)]
#[serde(rename_all = "camelCase")]
pub struct FederatedGroupBindingSpec {
    #[serde(default)]
    pub placement: Placement,
}

/// Where a federated object is propagated.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    #[serde(default)]
    pub clusters: Vec<ClusterRef>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
pub struct ClusterRef {
    pub name: String,
}
