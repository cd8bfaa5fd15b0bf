//! `csr-controller`: approves kubeconfig CertificateSigningRequests issued by
//! KubeSphere and writes the signed certificate back into the user's
//! kubeconfig ConfigMap.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use k8s_openapi::api::certificates::v1::CertificateSigningRequest;
use k8s_openapi::api::core::v1::ConfigMap;
use tracing::debug;

use super::worker::{DEFAULT_RESYNC, run_sync_loop};
use super::{Activation, ControllerName, Result, Runnable};
use crate::informers::{Informer, InformerFactory};
use crate::shutdown::Shutdown;

/// Label marking CSRs created for user kubeconfigs
pub const KUBECONFIG_CSR_LABEL: &str = "kubesphere.io/kubeconfig-csr";

pub struct CsrController {
    requests: Arc<Informer<CertificateSigningRequest>>,
    config_maps: Arc<Informer<ConfigMap>>,
}

/// Kubeconfig CSRs with no Approved or Denied condition yet
pub fn pending_kubeconfig_requests(requests: &[Arc<CertificateSigningRequest>]) -> usize {
    requests
        .iter()
        .filter(|csr| {
            csr.metadata
                .labels
                .as_ref()
                .is_some_and(|l| l.contains_key(KUBECONFIG_CSR_LABEL))
        })
        .filter(|csr| {
            csr.status
                .as_ref()
                .and_then(|s| s.conditions.as_ref())
                .is_none_or(|c| c.is_empty())
        })
        .count()
}

impl Runnable for CsrController {
    fn start(self: Box<Self>, shutdown: Shutdown) -> BoxFuture<'static, Result<()>> {
        let caches = vec![
            self.requests.wait_until_synced(),
            self.config_maps.wait_until_synced(),
        ];
        let requests = self.requests.store();
        run_sync_loop(
            ControllerName::CertificateSigningRequest,
            caches,
            DEFAULT_RESYNC,
            shutdown,
            move || {
                let pending = pending_kubeconfig_requests(&requests.state());
                debug!(pending, "CSR resync");
            },
        )
        .boxed()
    }
}

pub fn csr_controller(kubernetes: &InformerFactory) -> Activation {
    Activation::enabled(CsrController {
        requests: kubernetes.informer(),
        config_maps: kubernetes.informer(),
    })
}
