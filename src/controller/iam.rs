//! IAM controllers.
//!
//! Users, login records, global roles, groups and the bindings between them.
//! On a multi-cluster host the user, global-role and global-role-binding
//! controllers also read the matching federated cache, and the group
//! controllers watch the federated group types.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use jiff::{SignedDuration, Timestamp};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Pod};
use k8s_openapi::api::rbac::v1::ClusterRoleBinding;
use tracing::{debug, info, warn};

use super::worker::{CacheWait, DEFAULT_RESYNC, run_sync_loop};
use super::{Activation, ControllerName, Result, Runnable};
use crate::clients::{DevOpsClient, DirectoryClient};
use crate::crd::{
    FederatedGroup, FederatedGroupBinding, GlobalRole, GlobalRoleBinding, Group, GroupBinding,
    LoginRecord, User,
};
use crate::federation::{FederatedCache, FederationCaches};
use crate::informers::{Informer, InformerFactory};
use crate::options::AuthenticationOptions;
use crate::shutdown::Shutdown;

/// Label linking a login record to its user
pub const USER_REFERENCE_LABEL: &str = "iam.kubesphere.io/user-ref";

/// Names from `names` that have no object in the federated cache.
pub fn unfederated<'a>(names: impl IntoIterator<Item = &'a str>, cache: &FederatedCache) -> Vec<String> {
    names
        .into_iter()
        .filter(|name| !cache.contains(name))
        .map(str::to_string)
        .collect()
}

fn federated_wait(cache: Option<&FederatedCache>) -> Option<CacheWait> {
    cache.map(FederatedCache::wait_until_synced)
}

pub struct UserController {
    users: Arc<Informer<User>>,
    login_records: Arc<Informer<LoginRecord>>,
    config_maps: Arc<Informer<ConfigMap>>,
    federated_users: Option<FederatedCache>,
    directory: Option<Arc<dyn DirectoryClient>>,
    devops: Option<Arc<dyn DevOpsClient>>,
}

impl UserController {
    pub fn is_federated(&self) -> bool {
        self.federated_users.is_some()
    }
}

impl Runnable for UserController {
    fn start(self: Box<Self>, shutdown: Shutdown) -> BoxFuture<'static, Result<()>> {
        async move {
            // External services only degrade the controller, they never stop it
            if let Some(directory) = &self.directory {
                if let Err(e) = directory.health_check().await {
                    warn!(error = %e, "Directory service unhealthy, users will not be synced to it");
                }
            }
            if let Some(devops) = &self.devops {
                if let Err(e) = devops.health_check().await {
                    warn!(error = %e, "DevOps service unhealthy, users will not be synced to it");
                }
            }

            let mut caches = vec![
                self.users.wait_until_synced(),
                self.login_records.wait_until_synced(),
                self.config_maps.wait_until_synced(),
            ];
            caches.extend(federated_wait(self.federated_users.as_ref()));

            let users = self.users.store();
            let federated = self.federated_users;
            run_sync_loop(ControllerName::User, caches, DEFAULT_RESYNC, shutdown, move || {
                let state = users.state();
                let missing = federated.as_ref().map_or(0, |cache| {
                    unfederated(state.iter().filter_map(|u| u.metadata.name.as_deref()), cache).len()
                });
                debug!(users = state.len(), unfederated = missing, "User resync");
            })
            .await
        }
        .boxed()
    }
}

pub fn user_controller(
    kubernetes: &InformerFactory,
    kubesphere: &InformerFactory,
    federation: Option<&FederationCaches>,
    directory: Option<Arc<dyn DirectoryClient>>,
    devops: Option<Arc<dyn DevOpsClient>>,
) -> Activation {
    Activation::enabled(UserController {
        users: kubesphere.informer(),
        login_records: kubesphere.informer(),
        config_maps: kubernetes.informer(),
        federated_users: federation.map(|f| f.user.clone()),
        directory,
        devops,
    })
}

/// Login records that should be deleted.
///
/// Records are grouped per user and ordered newest first; a record expires
/// when it is older than `retention` or beyond the newest `max_per_user`.
/// Records without a user label or a creation time are left alone.
pub fn records_to_expire(
    records: &[Arc<LoginRecord>],
    now: Timestamp,
    retention: SignedDuration,
    max_per_user: usize,
) -> Vec<String> {
    let cutoff = now.checked_sub(retention).unwrap_or(Timestamp::MIN);

    let mut by_user: BTreeMap<&str, Vec<(&str, Timestamp)>> = BTreeMap::new();
    for record in records {
        let user = record
            .metadata
            .labels
            .as_ref()
            .and_then(|l| l.get(USER_REFERENCE_LABEL));
        let created = record
            .metadata
            .creation_timestamp
            .as_ref()
            .and_then(|t| Timestamp::from_second(t.0.timestamp()).ok());
        let (Some(name), Some(user), Some(created)) =
            (record.metadata.name.as_deref(), user, created)
        else {
            continue;
        };
        by_user.entry(user.as_str()).or_default().push((name, created));
    }

    let mut expired = Vec::new();
    for mut entries in by_user.into_values() {
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        for (index, (name, created)) in entries.into_iter().enumerate() {
            if index >= max_per_user || created < cutoff {
                expired.push(name.to_string());
            }
        }
    }
    expired.sort();
    expired
}

pub struct LoginRecordController {
    login_records: Arc<Informer<LoginRecord>>,
    users: Arc<Informer<User>>,
    retention: SignedDuration,
    max_entries: usize,
}

impl Runnable for LoginRecordController {
    fn start(self: Box<Self>, shutdown: Shutdown) -> BoxFuture<'static, Result<()>> {
        let caches = vec![
            self.login_records.wait_until_synced(),
            self.users.wait_until_synced(),
        ];
        let records = self.login_records.store();
        let (retention, max_entries) = (self.retention, self.max_entries);
        run_sync_loop(
            ControllerName::LoginRecord,
            caches,
            DEFAULT_RESYNC,
            shutdown,
            move || {
                let expired =
                    records_to_expire(&records.state(), Timestamp::now(), retention, max_entries);
                if !expired.is_empty() {
                    info!(count = expired.len(), "Login records past retention");
                }
            },
        )
        .boxed()
    }
}

pub fn login_record_controller(
    kubesphere: &InformerFactory,
    authentication: &AuthenticationOptions,
) -> Activation {
    Activation::enabled(LoginRecordController {
        login_records: kubesphere.informer(),
        users: kubesphere.informer(),
        retention: authentication.login_history_retention_period,
        max_entries: authentication.login_history_maximum_entries,
    })
}

/// Name of the kubectl deployment kept for a user
pub fn kubectl_deployment_name(user: &str) -> String {
    format!("kubectl-{user}")
}

/// Users bound to a cluster role that have no kubectl deployment yet
pub fn users_missing_kubectl(
    bindings: &[Arc<ClusterRoleBinding>],
    deployments: &[Arc<Deployment>],
) -> BTreeSet<String> {
    let existing: BTreeSet<&str> = deployments
        .iter()
        .filter_map(|d| d.metadata.name.as_deref())
        .collect();
    bindings
        .iter()
        .flat_map(|b| b.subjects.iter().flatten())
        .filter(|s| s.kind == "User")
        .filter(|s| !existing.contains(kubectl_deployment_name(&s.name).as_str()))
        .map(|s| s.name.clone())
        .collect()
}

pub struct ClusterRoleBindingController {
    bindings: Arc<Informer<ClusterRoleBinding>>,
    deployments: Arc<Informer<Deployment>>,
    pods: Arc<Informer<Pod>>,
    users: Arc<Informer<User>>,
    kubectl_image: String,
}

impl ClusterRoleBindingController {
    pub fn new(kubernetes: &InformerFactory, kubesphere: &InformerFactory, kubectl_image: &str) -> Self {
        Self {
            bindings: kubernetes.informer(),
            deployments: kubernetes.informer(),
            pods: kubernetes.informer(),
            users: kubesphere.informer(),
            kubectl_image: kubectl_image.to_string(),
        }
    }

    /// Image used for per-user kubectl deployments
    pub fn kubectl_image(&self) -> &str {
        &self.kubectl_image
    }
}

impl Runnable for ClusterRoleBindingController {
    fn start(self: Box<Self>, shutdown: Shutdown) -> BoxFuture<'static, Result<()>> {
        let caches = vec![
            self.bindings.wait_until_synced(),
            self.deployments.wait_until_synced(),
            self.pods.wait_until_synced(),
            self.users.wait_until_synced(),
        ];
        let bindings = self.bindings.store();
        let deployments = self.deployments.store();
        let image = self.kubectl_image;
        run_sync_loop(
            ControllerName::ClusterRoleBinding,
            caches,
            DEFAULT_RESYNC,
            shutdown,
            move || {
                let missing = users_missing_kubectl(&bindings.state(), &deployments.state());
                debug!(image = %image, missing = missing.len(), "Cluster role binding resync");
            },
        )
        .boxed()
    }
}

pub fn cluster_role_binding_controller(
    kubernetes: &InformerFactory,
    kubesphere: &InformerFactory,
    kubectl_image: &str,
) -> Activation {
    Activation::enabled(ClusterRoleBindingController::new(kubernetes, kubesphere, kubectl_image))
}

pub struct GlobalRoleController {
    roles: Arc<Informer<GlobalRole>>,
    federated_roles: Option<FederatedCache>,
}

impl Runnable for GlobalRoleController {
    fn start(self: Box<Self>, shutdown: Shutdown) -> BoxFuture<'static, Result<()>> {
        let mut caches = vec![self.roles.wait_until_synced()];
        caches.extend(federated_wait(self.federated_roles.as_ref()));
        let roles = self.roles.store();
        let federated = self.federated_roles;
        run_sync_loop(
            ControllerName::GlobalRole,
            caches,
            DEFAULT_RESYNC,
            shutdown,
            move || {
                let state = roles.state();
                let missing = federated.as_ref().map_or(0, |cache| {
                    unfederated(state.iter().filter_map(|r| r.metadata.name.as_deref()), cache).len()
                });
                debug!(roles = state.len(), unfederated = missing, "Global role resync");
            },
        )
        .boxed()
    }
}

/// Only requested by the bootstrap on multi-cluster hosts.
pub fn global_role_controller(
    kubesphere: &InformerFactory,
    federation: Option<&FederationCaches>,
) -> Activation {
    Activation::enabled(GlobalRoleController {
        roles: kubesphere.informer(),
        federated_roles: federation.map(|f| f.global_role.clone()),
    })
}

pub struct GlobalRoleBindingController {
    bindings: Arc<Informer<GlobalRoleBinding>>,
    federated_bindings: Option<FederatedCache>,
}

impl Runnable for GlobalRoleBindingController {
    fn start(self: Box<Self>, shutdown: Shutdown) -> BoxFuture<'static, Result<()>> {
        let mut caches = vec![self.bindings.wait_until_synced()];
        caches.extend(federated_wait(self.federated_bindings.as_ref()));
        let bindings = self.bindings.store();
        let federated = self.federated_bindings;
        run_sync_loop(
            ControllerName::GlobalRoleBinding,
            caches,
            DEFAULT_RESYNC,
            shutdown,
            move || {
                let state = bindings.state();
                let admins = state
                    .iter()
                    .filter(|b| b.spec.role_ref.name == "platform-admin")
                    .count();
                let missing = federated.as_ref().map_or(0, |cache| {
                    unfederated(state.iter().filter_map(|b| b.metadata.name.as_deref()), cache).len()
                });
                debug!(
                    bindings = state.len(),
                    platform_admins = admins,
                    unfederated = missing,
                    "Global role binding resync"
                );
            },
        )
        .boxed()
    }
}

pub fn global_role_binding_controller(
    kubesphere: &InformerFactory,
    federation: Option<&FederationCaches>,
) -> Activation {
    Activation::enabled(GlobalRoleBindingController {
        bindings: kubesphere.informer(),
        federated_bindings: federation.map(|f| f.global_role_binding.clone()),
    })
}

pub struct GroupController {
    groups: Arc<Informer<Group>>,
    federated_groups: Option<Arc<Informer<FederatedGroup>>>,
}

impl Runnable for GroupController {
    fn start(self: Box<Self>, shutdown: Shutdown) -> BoxFuture<'static, Result<()>> {
        let mut caches = vec![self.groups.wait_until_synced()];
        caches.extend(self.federated_groups.as_ref().map(|i| i.wait_until_synced()));
        let groups = self.groups.store();
        let federated = self.federated_groups.map(|i| i.store());
        run_sync_loop(
            ControllerName::Group,
            caches,
            DEFAULT_RESYNC,
            shutdown,
            move || {
                let state = groups.state();
                let missing = federated.as_ref().map_or(0, |fed| {
                    let fed = fed.state();
                    state
                        .iter()
                        .filter(|g| !fed.iter().any(|f| f.metadata.name == g.metadata.name))
                        .count()
                });
                debug!(groups = state.len(), unfederated = missing, "Group resync");
            },
        )
        .boxed()
    }
}

pub fn group_controller(kubesphere: &InformerFactory, multicluster: bool) -> Activation {
    Activation::enabled(GroupController {
        groups: kubesphere.informer(),
        federated_groups: multicluster.then(|| kubesphere.informer()),
    })
}

pub struct GroupBindingController {
    bindings: Arc<Informer<GroupBinding>>,
    federated_bindings: Option<Arc<Informer<FederatedGroupBinding>>>,
}

impl Runnable for GroupBindingController {
    fn start(self: Box<Self>, shutdown: Shutdown) -> BoxFuture<'static, Result<()>> {
        let mut caches = vec![self.bindings.wait_until_synced()];
        caches.extend(self.federated_bindings.as_ref().map(|i| i.wait_until_synced()));
        let bindings = self.bindings.store();
        run_sync_loop(
            ControllerName::GroupBinding,
            caches,
            DEFAULT_RESYNC,
            shutdown,
            move || {
                let state = bindings.state();
                let members: usize = state.iter().map(|b| b.spec.users.len()).sum();
                debug!(bindings = state.len(), members, "Group binding resync");
            },
        )
        .boxed()
    }
}

pub fn group_binding_controller(kubesphere: &InformerFactory, multicluster: bool) -> Activation {
    Activation::enabled(GroupBindingController {
        bindings: kubesphere.informer(),
        federated_bindings: multicluster.then(|| kubesphere.informer()),
    })
}
