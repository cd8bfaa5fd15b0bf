//! Controller bootstrap.
//!
//! One call to [`add_controllers`] decides which controllers exist for this
//! process, builds them against shared informers and federation caches, and
//! registers the enabled ones with the manager:
//!
//! 1. validate the options and resolve an [`ActivationPlan`] from them
//! 2. build the federation caches when multi-cluster is on
//! 3. run every controller factory into a [`Registry`], then freeze it
//! 4. hand the frozen registry to [`register_all`]
//!
//! Any error stops the bootstrap. Nothing already registered is undone.

use std::sync::Arc;

use tracing::{debug, info, warn};

pub mod error;
pub mod registrar;
pub mod registry;
pub mod state_machine;

pub use error::{BootstrapError, Result};
pub use registrar::{RegistrationReport, register_all};
pub use registry::{FrozenRegistry, Registry};
pub use state_machine::{BootstrapEvent, BootstrapPhase, BootstrapStateMachine, TransitionResult};

use crate::clients::{DevOpsClient, DirectoryClient};
use crate::controller::notification::NotificationController;
use crate::controller::{
    Activation, ControllerName, certificates, cluster, iam, network, servicemesh, storage,
    workloads,
};
use crate::features::ActivationPlan;
use crate::federation::{FederationCaches, ResourceClientBuilder};
use crate::informers::{InformerFactories, watcher_config};
use crate::manager::Manager;
use crate::options::Options;
use crate::shutdown::Shutdown;

/// Shared handles the controller factories draw from.
pub struct Dependencies<'a> {
    pub informers: &'a InformerFactories,
    /// LDAP directory, when configured
    pub directory: Option<Arc<dyn DirectoryClient>>,
    /// DevOps service, when configured
    pub devops: Option<Arc<dyn DevOpsClient>>,
    /// Builds the federated resource clients on multi-cluster hosts
    pub resource_clients: Box<dyn ResourceClientBuilder>,
}

/// A single bootstrap run and the phase it has reached.
#[derive(Debug)]
pub struct Bootstrap {
    phase: BootstrapPhase,
    machine: BootstrapStateMachine,
}

impl Default for Bootstrap {
    fn default() -> Self {
        Self::new()
    }
}

impl Bootstrap {
    pub fn new() -> Self {
        Self {
            phase: BootstrapPhase::NotStarted,
            machine: BootstrapStateMachine,
        }
    }

    pub fn phase(&self) -> BootstrapPhase {
        self.phase
    }

    fn advance(&mut self, event: BootstrapEvent) {
        match self.machine.transition(self.phase, event) {
            TransitionResult::Success {
                from,
                to,
                description,
            } => {
                debug!(%from, %to, %event, description, "Bootstrap phase transition");
                self.phase = to;
            }
            TransitionResult::InvalidTransition { current, event } => {
                warn!(%current, %event, "Ignoring invalid bootstrap transition");
            }
        }
    }

    /// Run the bootstrap once. A finished bootstrap cannot be run again.
    pub async fn run<M>(
        &mut self,
        mgr: &mut M,
        deps: Dependencies<'_>,
        options: &Options,
        shutdown: &Shutdown,
    ) -> Result<RegistrationReport>
    where
        M: Manager + ?Sized,
    {
        if self.phase != BootstrapPhase::NotStarted {
            return Err(BootstrapError::AlreadyRan(self.phase));
        }
        let result = self.run_phases(mgr, deps, options, shutdown).await;
        if result.is_err() {
            self.advance(BootstrapEvent::ErrorEncountered);
        }
        result
    }

    async fn run_phases<M>(
        &mut self,
        mgr: &mut M,
        deps: Dependencies<'_>,
        options: &Options,
        shutdown: &Shutdown,
    ) -> Result<RegistrationReport>
    where
        M: Manager + ?Sized,
    {
        self.advance(BootstrapEvent::Begin);
        // Options built in code skip the check done by `Options::load`
        options.validate()?;
        let plan = ActivationPlan::resolve(options);

        let federation = if plan.multicluster() {
            let config = watcher_config(&options.kubernetes);
            let caches =
                FederationCaches::build(deps.resource_clients.as_ref(), &config, shutdown).await?;
            info!("Federation caches started");
            Some(caches)
        } else {
            None
        };
        self.advance(BootstrapEvent::CachesReady);

        let registry = build_registry(&*mgr, &deps, &plan, options, federation.as_ref())?;
        debug!(
            entries = registry.len(),
            enabled = registry.enabled_names().len(),
            "Controller registry frozen"
        );
        self.advance(BootstrapEvent::ControllersConstructed);

        let report = register_all(registry, mgr)?;
        self.advance(BootstrapEvent::RegistrationComplete);
        info!(
            registered = report.registered.len(),
            skipped = report.skipped.len(),
            "Controllers added to manager"
        );
        Ok(report)
    }
}

/// Decide, build and register every controller for this process.
pub async fn add_controllers<M>(
    mgr: &mut M,
    deps: Dependencies<'_>,
    options: &Options,
    shutdown: &Shutdown,
) -> Result<RegistrationReport>
where
    M: Manager + ?Sized,
{
    Bootstrap::new().run(mgr, deps, options, shutdown).await
}

fn provider_error(name: ControllerName) -> impl FnOnce(network::ProviderError) -> BootstrapError {
    move |source| BootstrapError::Provider { name, source }
}

/// Run every factory in registry order.
///
/// The base set always has an entry per controller; the global role and
/// notification controllers are appended only on multi-cluster hosts.
fn build_registry<M>(
    mgr: &M,
    deps: &Dependencies<'_>,
    plan: &ActivationPlan,
    options: &Options,
    federation: Option<&FederationCaches>,
) -> Result<FrozenRegistry>
where
    M: Manager + ?Sized,
{
    let informers = deps.informers;
    let kubernetes = &informers.kubernetes;
    let istio = &informers.istio;
    let kubesphere = &informers.kubesphere;
    let mut registry = Registry::new();

    registry.insert(
        ControllerName::VirtualService,
        servicemesh::virtual_service_controller(
            plan.is_enabled(ControllerName::VirtualService),
            kubernetes,
            istio,
            kubesphere,
        ),
    )?;
    registry.insert(
        ControllerName::DestinationRule,
        servicemesh::destination_rule_controller(
            plan.is_enabled(ControllerName::DestinationRule),
            kubernetes,
            istio,
            kubesphere,
        ),
    )?;
    registry.insert(ControllerName::Job, workloads::job_controller(kubernetes))?;
    registry.insert(
        ControllerName::StorageCapability,
        storage::storage_capability_controller(kubernetes),
    )?;
    registry.insert(
        ControllerName::VolumeSnapshot,
        storage::volume_snapshot_controller(kubernetes, &informers.snapshot),
    )?;
    registry.insert(
        ControllerName::User,
        iam::user_controller(
            kubernetes,
            kubesphere,
            federation,
            deps.directory.clone(),
            deps.devops.clone(),
        ),
    )?;
    registry.insert(
        ControllerName::LoginRecord,
        iam::login_record_controller(kubesphere, &options.authentication),
    )?;
    registry.insert(
        ControllerName::Cluster,
        cluster::cluster_controller(
            plan.is_enabled(ControllerName::Cluster),
            kubesphere,
            &options.multicluster,
        ),
    )?;
    let nsnp = network::nsnp_controller(
        plan.is_enabled(ControllerName::NamespaceNetworkPolicy),
        kubernetes,
        kubesphere,
        &options.network.nsnp_options,
    )
    .map_err(provider_error(ControllerName::NamespaceNetworkPolicy))?;
    registry.insert(ControllerName::NamespaceNetworkPolicy, nsnp)?;
    registry.insert(
        ControllerName::CertificateSigningRequest,
        certificates::csr_controller(kubernetes),
    )?;
    registry.insert(
        ControllerName::ClusterRoleBinding,
        iam::cluster_role_binding_controller(kubernetes, kubesphere, &options.kubectl_image),
    )?;
    registry.insert(
        ControllerName::GlobalRoleBinding,
        iam::global_role_binding_controller(kubesphere, federation),
    )?;
    let ippool = network::ippool_controller(
        plan.is_enabled(ControllerName::IpPool),
        kubernetes,
        kubesphere,
        &options.network,
    )
        .map_err(provider_error(ControllerName::IpPool))?;
    registry.insert(ControllerName::IpPool, ippool)?;
    registry.insert(
        ControllerName::GroupBinding,
        iam::group_binding_controller(kubesphere, plan.multicluster()),
    )?;
    registry.insert(
        ControllerName::Group,
        iam::group_controller(kubesphere, plan.multicluster()),
    )?;

    if plan.multicluster() {
        registry.insert(
            ControllerName::GlobalRole,
            iam::global_role_controller(kubesphere, federation),
        )?;
        let notification = NotificationController::new(mgr.client(), mgr.cache())?;
        registry.insert(ControllerName::Notification, Activation::enabled(notification))?;
    }

    Ok(registry.freeze())
}
