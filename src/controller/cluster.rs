//! `cluster-controller`: keeps member cluster status current. Only runs on a
//! multi-cluster host.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::debug;

use super::worker::run_sync_loop;
use super::{Activation, ControllerName, Result, Runnable};
use crate::crd::Cluster;
use crate::informers::{Informer, InformerFactory};
use crate::options::MultiClusterOptions;
use crate::shutdown::Shutdown;

pub struct ClusterController {
    clusters: Arc<Informer<Cluster>>,
    resync: Duration,
    host_cluster_name: String,
}

impl ClusterController {
    pub fn new(kubesphere: &InformerFactory, options: &MultiClusterOptions) -> Self {
        Self {
            clusters: kubesphere.informer(),
            resync: options.resync_period(),
            host_cluster_name: options.host_cluster_name.clone(),
        }
    }

    pub fn host_cluster_name(&self) -> &str {
        &self.host_cluster_name
    }

    pub fn resync(&self) -> Duration {
        self.resync
    }
}

/// Member clusters, excluding the host itself
pub fn member_clusters<'a>(clusters: &'a [Arc<Cluster>], host: &str) -> Vec<&'a str> {
    clusters
        .iter()
        .filter_map(|c| c.metadata.name.as_deref())
        .filter(|name| *name != host)
        .collect()
}

impl Runnable for ClusterController {
    fn start(self: Box<Self>, shutdown: Shutdown) -> BoxFuture<'static, Result<()>> {
        let clusters = self.clusters.store();
        let host = self.host_cluster_name;
        run_sync_loop(
            ControllerName::Cluster,
            vec![self.clusters.wait_until_synced()],
            self.resync,
            shutdown,
            move || {
                let state = clusters.state();
                let members = member_clusters(&state, &host);
                debug!(host = %host, members = members.len(), "Cluster resync");
            },
        )
        .boxed()
    }
}

pub fn cluster_controller(
    enabled: bool,
    kubesphere: &InformerFactory,
    options: &MultiClusterOptions,
) -> Activation {
    Activation::when(enabled, || ClusterController::new(kubesphere, options))
}

#[cfg(test)]
mod tests {
    use jiff::SignedDuration;
    use kube::api::ObjectMeta;
    use kube::runtime::watcher::Config as WatcherConfig;

    use super::*;
    use crate::crd::ClusterSpec;
    use crate::manager::testing::test_client;

    fn cluster(name: &str) -> Arc<Cluster> {
        Arc::new(Cluster {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: ClusterSpec::default(),
            status: None,
        })
    }

    #[test]
    fn test_member_clusters_exclude_host() {
        let clusters = vec![cluster("host"), cluster("east"), cluster("west")];
        assert_eq!(member_clusters(&clusters, "host"), vec!["east", "west"]);
    }

    #[tokio::test]
    async fn test_controller_follows_multicluster_options() {
        let kubesphere = InformerFactory::new("kubesphere", test_client(), WatcherConfig::default());
        let options = MultiClusterOptions {
            enable: true,
            host_cluster_name: "primary".to_string(),
            cluster_controller_resync_period: SignedDuration::from_secs(30),
        };

        let controller = ClusterController::new(&kubesphere, &options);
        assert_eq!(controller.host_cluster_name(), "primary");
        assert_eq!(controller.resync(), Duration::from_secs(30));
        assert_eq!(kubesphere.informer_count(), 1);
    }

    #[tokio::test]
    async fn test_disabled_cluster_controller_requests_nothing() {
        let kubesphere = InformerFactory::new("kubesphere", test_client(), WatcherConfig::default());
        let activation = cluster_controller(false, &kubesphere, &MultiClusterOptions::default());
        assert!(!activation.is_enabled());
        assert_eq!(kubesphere.informer_count(), 0);
    }
}
