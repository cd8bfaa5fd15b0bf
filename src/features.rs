//! Which controllers should exist for a given set of options.
//!
//! Resolution is pure: the same [`Options`] always yield the same plan.

use std::collections::BTreeMap;

use crate::controller::ControllerName;
use crate::options::{IpPoolBackend, Options};

/// One activation decision per controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActivationPlan {
    decisions: BTreeMap<ControllerName, bool>,
    multicluster: bool,
}

impl ActivationPlan {
    pub fn resolve(options: &Options) -> Self {
        let mesh = options.service_mesh_enabled;
        let multicluster = options.multicluster.enable;
        let network_policy = options.network.enable_network_policy;
        let ip_pool = IpPoolBackend::parse(&options.network.ip_pool_type).is_some();

        let decisions = ControllerName::ALL
            .into_iter()
            .map(|name| {
                let enabled = match name {
                    ControllerName::VirtualService | ControllerName::DestinationRule => mesh,
                    ControllerName::Cluster
                    | ControllerName::GlobalRole
                    | ControllerName::Notification => multicluster,
                    ControllerName::NamespaceNetworkPolicy => network_policy,
                    ControllerName::IpPool => ip_pool,
                    ControllerName::Job
                    | ControllerName::StorageCapability
                    | ControllerName::VolumeSnapshot
                    | ControllerName::User
                    | ControllerName::LoginRecord
                    | ControllerName::CertificateSigningRequest
                    | ControllerName::ClusterRoleBinding
                    | ControllerName::GlobalRoleBinding
                    | ControllerName::GroupBinding
                    | ControllerName::Group => true,
                };
                (name, enabled)
            })
            .collect();

        Self {
            decisions,
            multicluster,
        }
    }

    pub fn is_enabled(&self, name: ControllerName) -> bool {
        self.decisions.get(&name).copied().unwrap_or(false)
    }

    /// Whether federation caches are needed
    pub fn multicluster(&self) -> bool {
        self.multicluster
    }

    /// Enabled controllers in registry order
    pub fn enabled_names(&self) -> Vec<ControllerName> {
        ControllerName::ALL
            .into_iter()
            .filter(|name| self.is_enabled(*name))
            .collect()
    }
}
