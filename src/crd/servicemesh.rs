//! Service mesh resources: Istio traffic objects (`networking.istio.io/v1alpha3`)
//! and the KubeSphere objects that generate them (`servicemesh.kubesphere.io/v1alpha2`).

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Istio VirtualService. Only the fields the controllers read are modelled.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "networking.istio.io",
    version = "v1alpha3",
    kind = "VirtualService",
    plural = "virtualservices",
    shortname = "vs",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServiceSpec {
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub gateways: Vec<String>,
}

/// Istio DestinationRule.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "networking.istio.io",
    version = "v1alpha3",
    kind = "DestinationRule",
    plural = "destinationrules",
    shortname = "dr",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct DestinationRuleSpec {
    pub host: String,
    #[serde(default)]
    pub subsets: Vec<Subset>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
pub struct Subset {
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// Traffic strategy (canary, blue-green, mirror) that drives a VirtualService.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "servicemesh.kubesphere.io",
    version = "v1alpha2",
    kind = "Strategy",
    plural = "strategies",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct StrategySpec {
    /// `Canary`, `BlueGreen` or `Mirror`
    #[serde(default)]
    pub r#type: String,
    #[serde(default)]
    pub principal: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub governor: Option<String>,
    #[serde(default)]
    pub hosts: Vec<String>,
}

/// Connection and load-balancing policy that drives a DestinationRule.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "servicemesh.kubesphere.io",
    version = "v1alpha2",
    kind = "ServicePolicy",
    plural = "servicepolicies",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ServicePolicySpec {
    #[serde(default)]
    pub selector: BTreeMap<String, String>,
    #[serde(default)]
    pub host: String,
}
