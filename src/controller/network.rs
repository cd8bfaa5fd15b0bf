//! Network controllers and the providers backing them.
//!
//! Both controllers need a provider built before the controller itself. A
//! provider that cannot be built from the configured options is an error,
//! which is different from the controller simply being switched off.

use std::collections::BTreeSet;
use std::sync::{Arc, LazyLock};

use futures::FutureExt;
use futures::future::BoxFuture;
use k8s_openapi::api::core::v1::{Namespace, Node, Service};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use thiserror::Error;
use tracing::{debug, info};

use super::worker::{DEFAULT_RESYNC, run_sync_loop};
use super::{Activation, ControllerName, Result, Runnable};
use crate::crd::{IPPool, NamespaceNetworkPolicy, Workspace};
use crate::informers::{Informer, InformerFactory};
use crate::options::{CalicoOptions, IpPoolBackend, NetworkOptions, NsnpOptions};
use crate::shutdown::Shutdown;

/// Calico encapsulation modes
pub const ENCAPSULATION_MODES: [&str; 3] = ["Always", "CrossSubnet", "Never"];

/// A provider could not be built from the configured options
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProviderError {
    /// An allowed ingress namespace is not a valid namespace name
    #[error("allowed ingress namespace {0:?} is not a valid DNS-1123 label")]
    InvalidNamespace(String),

    /// An encapsulation mode is not one Calico understands
    #[error("unsupported {field} mode {value:?}, expected one of Always, CrossSubnet, Never")]
    UnsupportedMode { field: &'static str, value: String },

    /// IPIP and VXLAN encapsulation cannot both be on
    #[error("IPIP and VXLAN encapsulation cannot be enabled at the same time")]
    ConflictingEncapsulation,
}

fn is_dns1123_label(name: &str) -> bool {
    static LABEL_RE: LazyLock<Option<regex::Regex>> =
        LazyLock::new(|| regex::Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").ok());
    name.len() <= 63 && LABEL_RE.as_ref().is_some_and(|re| re.is_match(name))
}

/// Translates namespaced policies into Kubernetes NetworkPolicies.
pub struct NsNetworkPolicyProvider {
    policies: Arc<Informer<NetworkPolicy>>,
    allowed_ingress_namespaces: BTreeSet<String>,
}

impl NsNetworkPolicyProvider {
    pub fn new(kubernetes: &InformerFactory, options: &NsnpOptions) -> std::result::Result<Self, ProviderError> {
        for namespace in &options.allowed_ingress_namespaces {
            if !is_dns1123_label(namespace) {
                return Err(ProviderError::InvalidNamespace(namespace.clone()));
            }
        }
        Ok(Self {
            policies: kubernetes.informer(),
            allowed_ingress_namespaces: options.allowed_ingress_namespaces.iter().cloned().collect(),
        })
    }

    pub fn allows_ingress_from(&self, namespace: &str) -> bool {
        self.allowed_ingress_namespaces.contains(namespace)
    }
}

pub struct NsNetworkPolicyController {
    policies: Arc<Informer<NamespaceNetworkPolicy>>,
    services: Arc<Informer<Service>>,
    nodes: Arc<Informer<Node>>,
    workspaces: Arc<Informer<Workspace>>,
    namespaces: Arc<Informer<Namespace>>,
    provider: NsNetworkPolicyProvider,
}

impl Runnable for NsNetworkPolicyController {
    fn start(self: Box<Self>, shutdown: Shutdown) -> BoxFuture<'static, Result<()>> {
        let caches = vec![
            self.policies.wait_until_synced(),
            self.services.wait_until_synced(),
            self.nodes.wait_until_synced(),
            self.workspaces.wait_until_synced(),
            self.namespaces.wait_until_synced(),
            self.provider.policies.wait_until_synced(),
        ];
        let policies = self.policies.store();
        let workspaces = self.workspaces.store();
        let generated = self.provider.policies.store();
        run_sync_loop(
            ControllerName::NamespaceNetworkPolicy,
            caches,
            DEFAULT_RESYNC,
            shutdown,
            move || {
                let isolated = workspaces
                    .state()
                    .iter()
                    .filter(|w| w.spec.network_isolation)
                    .count();
                debug!(
                    policies = policies.state().len(),
                    network_policies = generated.state().len(),
                    isolated_workspaces = isolated,
                    "Namespace network policy resync"
                );
            },
        )
        .boxed()
    }
}

/// Build the nsnp controller. A disabled controller builds no provider.
pub fn nsnp_controller(
    enabled: bool,
    kubernetes: &InformerFactory,
    kubesphere: &InformerFactory,
    options: &NsnpOptions,
) -> std::result::Result<Activation, ProviderError> {
    if !enabled {
        return Ok(Activation::Disabled);
    }
    let provider = NsNetworkPolicyProvider::new(kubernetes, options)?;
    Ok(Activation::enabled(NsNetworkPolicyController {
        policies: kubesphere.informer(),
        services: kubernetes.informer(),
        nodes: kubernetes.informer(),
        workspaces: kubesphere.informer(),
        namespaces: kubernetes.informer(),
        provider,
    }))
}

/// Allocates IP pools on the configured backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpPoolProvider {
    backend: IpPoolBackend,
    calico: CalicoOptions,
}

impl IpPoolProvider {
    /// `Ok(None)` when `kind` names no known backend.
    pub fn new(kind: &str, calico: &CalicoOptions) -> std::result::Result<Option<Self>, ProviderError> {
        let Some(backend) = IpPoolBackend::parse(kind) else {
            debug!(kind, "No IP pool backend for this kind");
            return Ok(None);
        };
        match backend {
            IpPoolBackend::Calico => validate_calico(calico)?,
        }
        info!(backend = %backend, "IP pool provider ready");
        Ok(Some(Self {
            backend,
            calico: calico.clone(),
        }))
    }

    pub fn backend(&self) -> IpPoolBackend {
        self.backend
    }
}

fn validate_calico(calico: &CalicoOptions) -> std::result::Result<(), ProviderError> {
    for (field, value) in [("ipip", &calico.ipip_mode), ("vxlan", &calico.vxlan_mode)] {
        if !ENCAPSULATION_MODES.contains(&value.as_str()) {
            return Err(ProviderError::UnsupportedMode {
                field,
                value: value.clone(),
            });
        }
    }
    if calico.ipip_mode != "Never" && calico.vxlan_mode != "Never" {
        return Err(ProviderError::ConflictingEncapsulation);
    }
    Ok(())
}

pub struct IpPoolController {
    pools: Arc<Informer<IPPool>>,
    namespaces: Arc<Informer<Namespace>>,
    provider: IpPoolProvider,
}

impl Runnable for IpPoolController {
    fn start(self: Box<Self>, shutdown: Shutdown) -> BoxFuture<'static, Result<()>> {
        let caches = vec![
            self.pools.wait_until_synced(),
            self.namespaces.wait_until_synced(),
        ];
        let pools = self.pools.store();
        let backend = self.provider.backend;
        let nat_outgoing = self.provider.calico.nat_outgoing;
        run_sync_loop(
            ControllerName::IpPool,
            caches,
            DEFAULT_RESYNC,
            shutdown,
            move || {
                let state = pools.state();
                let active = state.iter().filter(|p| !p.spec.disabled).count();
                debug!(
                    backend = %backend,
                    nat_outgoing,
                    pools = state.len(),
                    active,
                    "IP pool resync"
                );
            },
        )
        .boxed()
    }
}

/// Build the IP pool controller for the configured backend kind.
///
/// A disabled controller builds no provider. An unrecognized kind is
/// `Disabled`; a recognized but misconfigured backend is an error.
pub fn ippool_controller(
    enabled: bool,
    kubernetes: &InformerFactory,
    kubesphere: &InformerFactory,
    options: &NetworkOptions,
) -> std::result::Result<Activation, ProviderError> {
    if !enabled {
        return Ok(Activation::Disabled);
    }
    let Some(provider) = IpPoolProvider::new(&options.ip_pool_type, &options.calico)? else {
        return Ok(Activation::Disabled);
    };
    Ok(Activation::enabled(IpPoolController {
        pools: kubesphere.informer(),
        namespaces: kubernetes.informer(),
        provider,
    }))
}
