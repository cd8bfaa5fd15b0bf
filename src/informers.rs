//! Shared informer factories.
//!
//! An [`InformerFactory`] hands out one [`Informer`] per resource type: every
//! consumer asking for the same kind gets the same `Arc`, backed by a single
//! watch and a single reflector store. Informers are created lazily and their
//! watch loops only begin once [`InformerFactory::start`] is called, after
//! every controller has declared what it needs.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::pin::pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::BoxFuture;
use futures::{FutureExt, Stream, StreamExt};
use kube::runtime::reflector::Store;
use kube::runtime::reflector::store::WriterDropped;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::{WatchStreamExt, reflector, watcher};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::options::KubernetesOptions;
use crate::shutdown::Shutdown;

/// An informer's store was dropped before its initial list completed.
#[derive(Error, Debug)]
#[error("informer cache for {kind} closed before it synced")]
pub struct CacheSyncError {
    pub kind: String,
}

/// Build the watcher configuration shared by every informer.
pub fn watcher_config(options: &KubernetesOptions) -> WatcherConfig {
    WatcherConfig::default()
        .any_semantic()
        .timeout(options.watch_timeout_secs)
}

/// Resolve once `store` has completed its initial list.
pub(crate) fn wait_for_store<K>(
    kind: String,
    store: Store<K>,
) -> BoxFuture<'static, Result<(), CacheSyncError>>
where
    K: Resource + Clone + Send + Sync + 'static,
    K::DynamicType: Eq + Hash + Clone + Send + Sync,
{
    async move {
        store
            .wait_until_ready()
            .await
            .map_err(|_: WriterDropped| CacheSyncError { kind })
    }
    .boxed()
}

/// Drive a reflector-backed watch stream until shutdown.
///
/// Errors are logged and left to the stream's backoff.
pub(crate) async fn drive_watch<S, T>(kind: String, stream: S, shutdown: Shutdown)
where
    S: Stream<Item = Result<T, watcher::Error>>,
{
    let mut stream = pin!(stream);
    debug!(kind = %kind, "Watch loop started");
    loop {
        tokio::select! {
            _ = shutdown.wait() => {
                debug!(kind = %kind, "Watch loop stopped");
                return;
            }
            event = stream.next() => match event {
                Some(Ok(_)) => {}
                Some(Err(e)) => warn!(kind = %kind, error = %e, "Watch error, backing off"),
                None => {
                    warn!(kind = %kind, "Watch stream ended unexpectedly");
                    return;
                }
            }
        }
    }
}

/// A shared, locally cached view of one resource type.
pub struct Informer<K>
where
    K: Resource + 'static,
    K::DynamicType: Eq + Hash + Clone,
{
    kind: String,
    store: Store<K>,
}

impl<K> Informer<K>
where
    K: Resource + Clone + Send + Sync + 'static,
    K::DynamicType: Eq + Hash + Clone + Send + Sync,
{
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Read handle on the local cache
    pub fn store(&self) -> Store<K> {
        self.store.clone()
    }

    /// Resolve once the initial list has landed in the store.
    pub fn wait_until_synced(&self) -> BoxFuture<'static, Result<(), CacheSyncError>> {
        wait_for_store(self.kind.clone(), self.store.clone())
    }
}

type StartFn = Box<dyn FnOnce(Shutdown) -> BoxFuture<'static, ()> + Send>;

#[derive(Default)]
struct FactoryState {
    informers: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    pending: Vec<StartFn>,
    started: bool,
}

/// Memoizing informer factory for one API group family.
pub struct InformerFactory {
    family: &'static str,
    client: Client,
    watcher_config: WatcherConfig,
    state: Mutex<FactoryState>,
}

impl InformerFactory {
    pub fn new(family: &'static str, client: Client, watcher_config: WatcherConfig) -> Self {
        Self {
            family,
            client,
            watcher_config,
            state: Mutex::new(FactoryState::default()),
        }
    }

    pub fn family(&self) -> &'static str {
        self.family
    }

    fn state(&self) -> MutexGuard<'_, FactoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the shared informer for `K`, creating it on first request.
    pub fn informer<K>(&self) -> Arc<Informer<K>>
    where
        K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
        K::DynamicType: Default + Eq + Hash + Clone + Send + Sync,
    {
        let mut state = self.state();
        if let Some(existing) = state.informers.get(&TypeId::of::<K>()) {
            if let Ok(informer) = existing.clone().downcast::<Informer<K>>() {
                return informer;
            }
        }

        let kind = K::kind(&K::DynamicType::default()).into_owned();
        let (reader, writer) = reflector::store();
        let informer = Arc::new(Informer {
            kind: kind.clone(),
            store: reader,
        });

        let api: Api<K> = Api::all(self.client.clone());
        let config = self.watcher_config.clone();
        state.pending.push(Box::new(move |shutdown: Shutdown| {
            let stream = reflector(writer, watcher(api, config)).default_backoff();
            drive_watch(kind, stream, shutdown).boxed()
        }));
        state
            .informers
            .insert(TypeId::of::<K>(), informer.clone() as Arc<dyn Any + Send + Sync>);

        debug!(family = self.family, kind = %informer.kind, "Informer requested");
        informer
    }

    /// Number of distinct resource types requested so far
    pub fn informer_count(&self) -> usize {
        self.state().informers.len()
    }

    pub fn is_started(&self) -> bool {
        self.state().started
    }

    /// Spawn the watch loop of every informer requested since the last call.
    ///
    /// Returns the number of loops started.
    pub fn start(&self, shutdown: &Shutdown) -> usize {
        let pending = {
            let mut state = self.state();
            state.started = true;
            std::mem::take(&mut state.pending)
        };
        let count = pending.len();
        for start in pending {
            tokio::spawn(start(shutdown.clone()));
        }
        info!(family = self.family, informers = count, "Started informers");
        count
    }
}

/// One informer factory per API group family.
pub struct InformerFactories {
    pub kubernetes: InformerFactory,
    pub istio: InformerFactory,
    pub kubesphere: InformerFactory,
    pub snapshot: InformerFactory,
}

impl InformerFactories {
    pub fn new(client: Client, options: &KubernetesOptions) -> Self {
        let config = watcher_config(options);
        Self {
            kubernetes: InformerFactory::new("kubernetes", client.clone(), config.clone()),
            istio: InformerFactory::new("istio", client.clone(), config.clone()),
            kubesphere: InformerFactory::new("kubesphere", client.clone(), config.clone()),
            snapshot: InformerFactory::new("snapshot", client, config),
        }
    }

    /// Start every family's pending informers.
    pub fn start(&self, shutdown: &Shutdown) -> usize {
        [
            &self.kubernetes,
            &self.istio,
            &self.kubesphere,
            &self.snapshot,
        ]
        .into_iter()
        .map(|factory| factory.start(shutdown))
        .sum()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use k8s_openapi::api::core::v1::{ConfigMap, Service};

    use super::*;
    use crate::manager::testing::test_client;
    use crate::shutdown;

    #[tokio::test]
    async fn test_same_kind_shares_one_informer() {
        let factory = InformerFactory::new("kubernetes", test_client(), WatcherConfig::default());

        let first = factory.informer::<Service>();
        let second = factory.informer::<Service>();
        let other = factory.informer::<ConfigMap>();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.kind(), "Service");
        assert_eq!(other.kind(), "ConfigMap");
        assert_eq!(factory.informer_count(), 2);
    }

    #[tokio::test]
    async fn test_start_drains_pending_informers() {
        let factory = InformerFactory::new("kubernetes", test_client(), WatcherConfig::default());
        let (trigger, shutdown) = shutdown::channel();
        factory.informer::<Service>();
        factory.informer::<ConfigMap>();
        assert!(!factory.is_started());

        assert_eq!(factory.start(&shutdown), 2);
        assert!(factory.is_started());
        // Nothing new requested since the last start
        assert_eq!(factory.start(&shutdown), 0);

        trigger.trigger();
    }

    #[test]
    fn test_watcher_config_uses_timeout() {
        let config = watcher_config(&KubernetesOptions {
            watch_timeout_secs: 20,
        });
        assert_eq!(config.timeout, Some(20));
    }
}
