//! Federated resource caches shared by the IAM controllers.
//!
//! When multi-cluster support is on, the host keeps a local read-only cache
//! of three federated kinds (users, global roles, global role bindings).
//! Each cache is a reflector store fed by its own background watch loop.
//!
//! Construction is all-or-nothing: every remote client is built before any
//! watch loop starts, so a failure leaves no partial federation state behind.

use std::fmt;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use kube::api::{ApiResource, DynamicObject, GroupVersionKind};
use kube::runtime::reflector::Store;
use kube::runtime::reflector::store::Writer;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::{WatchStreamExt, reflector, watcher};
use kube::{Api, Client};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::informers::{CacheSyncError, drive_watch, wait_for_store};
use crate::shutdown::Shutdown;

/// API group serving the federated wrapper types
pub const FEDERATION_GROUP: &str = "types.kubefed.io";
pub const FEDERATION_VERSION: &str = "v1beta1";

/// Federated resource kinds cached on the host cluster
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FederatedKind {
    User,
    GlobalRole,
    GlobalRoleBinding,
}

impl FederatedKind {
    /// Construction order. Fixed so that failures are reproducible.
    pub const ALL: [FederatedKind; 3] = [
        FederatedKind::User,
        FederatedKind::GlobalRole,
        FederatedKind::GlobalRoleBinding,
    ];

    pub const fn kind(&self) -> &'static str {
        match self {
            FederatedKind::User => "FederatedUser",
            FederatedKind::GlobalRole => "FederatedGlobalRole",
            FederatedKind::GlobalRoleBinding => "FederatedGlobalRoleBinding",
        }
    }

    pub const fn plural(&self) -> &'static str {
        match self {
            FederatedKind::User => "federatedusers",
            FederatedKind::GlobalRole => "federatedglobalroles",
            FederatedKind::GlobalRoleBinding => "federatedglobalrolebindings",
        }
    }

    pub fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::gvk(FEDERATION_GROUP, FEDERATION_VERSION, self.kind())
    }

    /// Static resource description, used when discovery is not available
    pub fn api_resource(&self) -> ApiResource {
        ApiResource::from_gvk_with_plural(&self.gvk(), self.plural())
    }
}

impl fmt::Display for FederatedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind())
    }
}

/// Failure to construct a federated resource client
#[derive(Error, Debug)]
pub enum ResourceClientError {
    /// API discovery for the kind failed
    #[error("discovery of {kind} failed: {source}")]
    Discovery {
        kind: FederatedKind,
        #[source]
        source: kube::Error,
    },

    /// The API server does not serve the kind (federation CRDs missing)
    #[error("{0} is not served by the API server")]
    NotServed(FederatedKind),
}

/// A typed remote client for one federated kind.
#[derive(Clone)]
pub struct FederatedClient {
    kind: FederatedKind,
    resource: ApiResource,
    api: Api<DynamicObject>,
}

impl FederatedClient {
    pub fn new(client: Client, kind: FederatedKind, resource: ApiResource) -> Self {
        let api = Api::all_with(client, &resource);
        Self {
            kind,
            resource,
            api,
        }
    }

    pub fn kind(&self) -> FederatedKind {
        self.kind
    }
}

/// Builds federated resource clients.
///
/// The seam exists so construction failures can be exercised without an
/// API server.
pub trait ResourceClientBuilder: Send + Sync {
    fn build(
        &self,
        kind: FederatedKind,
    ) -> BoxFuture<'_, Result<FederatedClient, ResourceClientError>>;
}

/// Production builder resolving each kind through API discovery.
pub struct DiscoveryClientBuilder {
    client: Client,
}

impl DiscoveryClientBuilder {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl ResourceClientBuilder for DiscoveryClientBuilder {
    fn build(
        &self,
        kind: FederatedKind,
    ) -> BoxFuture<'_, Result<FederatedClient, ResourceClientError>> {
        async move {
            match kube::discovery::pinned_kind(&self.client, &kind.gvk()).await {
                Ok((resource, _capabilities)) => {
                    debug!(kind = %kind, "Discovered federated resource");
                    Ok(FederatedClient::new(self.client.clone(), kind, resource))
                }
                Err(kube::Error::Api(e)) if e.code == 404 => {
                    Err(ResourceClientError::NotServed(kind))
                }
                Err(source) => Err(ResourceClientError::Discovery { kind, source }),
            }
        }
        .boxed()
    }
}

/// Handle on a running cache sync loop
pub struct SyncHandle {
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Whether the watch loop is still running
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

/// A local read-only store paired with the loop keeping it current.
#[derive(Clone)]
pub struct FederatedCache {
    kind: FederatedKind,
    store: Store<DynamicObject>,
    sync: Arc<SyncHandle>,
}

impl FederatedCache {
    /// Create the store and start its watch loop immediately.
    fn start(client: FederatedClient, config: &WatcherConfig, shutdown: &Shutdown) -> Self {
        let writer: Writer<DynamicObject> = Writer::new(client.resource.clone());
        let store = writer.as_reader();
        let stream = reflector(writer, watcher(client.api, config.clone())).default_backoff();
        let task = tokio::spawn(drive_watch(
            client.kind.kind().to_string(),
            stream,
            shutdown.clone(),
        ));
        info!(kind = %client.kind, "Started federated cache sync");
        Self {
            kind: client.kind,
            store,
            sync: Arc::new(SyncHandle { task }),
        }
    }

    pub fn kind(&self) -> FederatedKind {
        self.kind
    }

    pub fn store(&self) -> &Store<DynamicObject> {
        &self.store
    }

    pub fn sync(&self) -> &SyncHandle {
        &self.sync
    }

    /// Whether the cache holds an object with this name
    pub fn contains(&self, name: &str) -> bool {
        self.store
            .state()
            .iter()
            .any(|obj| obj.metadata.name.as_deref() == Some(name))
    }

    pub fn wait_until_synced(&self) -> BoxFuture<'static, Result<(), CacheSyncError>> {
        wait_for_store(self.kind.kind().to_string(), self.store.clone())
    }
}

/// The three federated caches, built and started together.
#[derive(Clone)]
pub struct FederationCaches {
    pub user: FederatedCache,
    pub global_role: FederatedCache,
    pub global_role_binding: FederatedCache,
}

impl FederationCaches {
    /// Build every federated client, then start one sync loop per kind.
    ///
    /// The first client failure is returned unchanged and no loop is started.
    pub async fn build(
        builder: &dyn ResourceClientBuilder,
        config: &WatcherConfig,
        shutdown: &Shutdown,
    ) -> Result<Self, ResourceClientError> {
        let user = build_client(builder, FederatedKind::User).await?;
        let global_role = build_client(builder, FederatedKind::GlobalRole).await?;
        let global_role_binding =
            build_client(builder, FederatedKind::GlobalRoleBinding).await?;

        Ok(Self {
            user: FederatedCache::start(user, config, shutdown),
            global_role: FederatedCache::start(global_role, config, shutdown),
            global_role_binding: FederatedCache::start(global_role_binding, config, shutdown),
        })
    }
}

async fn build_client(
    builder: &dyn ResourceClientBuilder,
    kind: FederatedKind,
) -> Result<FederatedClient, ResourceClientError> {
    builder.build(kind).await.inspect_err(|e| {
        error!(kind = %kind, error = %e, "Failed to build federated resource client");
    })
}
