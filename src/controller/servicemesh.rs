//! Service mesh controllers.
//!
//! - `virtualservice-controller` turns Strategies into Istio VirtualServices
//! - `destinationrule-controller` turns ServicePolicies into DestinationRules
//!
//! Both read the same Service and DestinationRule informers, so they must be
//! built from the same factory instances.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use tracing::debug;

use super::worker::{DEFAULT_RESYNC, run_sync_loop};
use super::{Activation, ControllerName, Result, Runnable};
use crate::crd::{DestinationRule, ServicePolicy, Strategy, VirtualService};
use crate::informers::{Informer, InformerFactory};
use crate::shutdown::Shutdown;

pub struct VirtualServiceController {
    services: Arc<Informer<Service>>,
    virtual_services: Arc<Informer<VirtualService>>,
    destination_rules: Arc<Informer<DestinationRule>>,
    strategies: Arc<Informer<Strategy>>,
}

impl VirtualServiceController {
    pub fn new(
        kubernetes: &InformerFactory,
        istio: &InformerFactory,
        kubesphere: &InformerFactory,
    ) -> Self {
        Self {
            services: kubernetes.informer(),
            virtual_services: istio.informer(),
            destination_rules: istio.informer(),
            strategies: kubesphere.informer(),
        }
    }

    pub fn destination_rules(&self) -> &Arc<Informer<DestinationRule>> {
        &self.destination_rules
    }

    pub fn services(&self) -> &Arc<Informer<Service>> {
        &self.services
    }
}

impl Runnable for VirtualServiceController {
    fn start(self: Box<Self>, shutdown: Shutdown) -> BoxFuture<'static, Result<()>> {
        let caches = vec![
            self.services.wait_until_synced(),
            self.virtual_services.wait_until_synced(),
            self.destination_rules.wait_until_synced(),
            self.strategies.wait_until_synced(),
        ];
        let virtual_services = self.virtual_services.store();
        let strategies = self.strategies.store();
        run_sync_loop(
            ControllerName::VirtualService,
            caches,
            DEFAULT_RESYNC,
            shutdown,
            move || {
                // A strategy without a governing VirtualService still needs one generated
                let ungoverned = strategies
                    .state()
                    .iter()
                    .filter(|s| s.spec.governor.is_none())
                    .count();
                debug!(
                    virtual_services = virtual_services.state().len(),
                    ungoverned_strategies = ungoverned,
                    "Virtual service resync"
                );
            },
        )
        .boxed()
    }
}

pub fn virtual_service_controller(
    enabled: bool,
    kubernetes: &InformerFactory,
    istio: &InformerFactory,
    kubesphere: &InformerFactory,
) -> Activation {
    Activation::when(enabled, || {
        VirtualServiceController::new(kubernetes, istio, kubesphere)
    })
}

pub struct DestinationRuleController {
    deployments: Arc<Informer<Deployment>>,
    destination_rules: Arc<Informer<DestinationRule>>,
    services: Arc<Informer<Service>>,
    service_policies: Arc<Informer<ServicePolicy>>,
}

impl DestinationRuleController {
    pub fn new(
        kubernetes: &InformerFactory,
        istio: &InformerFactory,
        kubesphere: &InformerFactory,
    ) -> Self {
        Self {
            deployments: kubernetes.informer(),
            destination_rules: istio.informer(),
            services: kubernetes.informer(),
            service_policies: kubesphere.informer(),
        }
    }

    pub fn destination_rules(&self) -> &Arc<Informer<DestinationRule>> {
        &self.destination_rules
    }

    pub fn services(&self) -> &Arc<Informer<Service>> {
        &self.services
    }
}

impl Runnable for DestinationRuleController {
    fn start(self: Box<Self>, shutdown: Shutdown) -> BoxFuture<'static, Result<()>> {
        let caches = vec![
            self.deployments.wait_until_synced(),
            self.destination_rules.wait_until_synced(),
            self.services.wait_until_synced(),
            self.service_policies.wait_until_synced(),
        ];
        let destination_rules = self.destination_rules.store();
        let services = self.services.store();
        run_sync_loop(
            ControllerName::DestinationRule,
            caches,
            DEFAULT_RESYNC,
            shutdown,
            move || {
                let rules = destination_rules.state();
                let uncovered = services
                    .state()
                    .iter()
                    .filter(|svc| {
                        let host = svc.metadata.name.as_deref().unwrap_or_default();
                        !rules.iter().any(|r| r.spec.host == host)
                    })
                    .count();
                debug!(
                    destination_rules = rules.len(),
                    services_without_rule = uncovered,
                    "Destination rule resync"
                );
            },
        )
        .boxed()
    }
}

pub fn destination_rule_controller(
    enabled: bool,
    kubernetes: &InformerFactory,
    istio: &InformerFactory,
    kubesphere: &InformerFactory,
) -> Activation {
    Activation::when(enabled, || {
        DestinationRuleController::new(kubernetes, istio, kubesphere)
    })
}
