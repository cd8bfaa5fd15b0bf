//! `notification-controller`: propagates notification configuration Secrets
//! to member clusters.
//!
//! Unlike the other controllers it is built against the manager's own client
//! and cache rather than the shared informer factories.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use k8s_openapi::api::core::v1::Secret;
use kube::Client;
use thiserror::Error;
use tracing::{debug, info};

use super::worker::{DEFAULT_RESYNC, run_sync_loop};
use super::{ControllerName, Result, Runnable};
use crate::informers::{Informer, InformerFactory};
use crate::shutdown::Shutdown;

/// Label selecting Secrets owned by the notification manager
pub const NOTIFICATION_SECRET_LABEL: &str = "type";
pub const NOTIFICATION_SECRET_VALUE: &str = "notification";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum NotificationError {
    /// Informers cannot be added to a cache whose watches are already running
    #[error("the {family} cache was started before the notification controller was built")]
    CacheStarted { family: &'static str },
}

pub struct NotificationController {
    client: Client,
    secrets: Arc<Informer<Secret>>,
}

impl NotificationController {
    pub fn new(client: Client, cache: &InformerFactory) -> std::result::Result<Self, NotificationError> {
        if cache.is_started() {
            return Err(NotificationError::CacheStarted {
                family: cache.family(),
            });
        }
        Ok(Self {
            client,
            secrets: cache.informer(),
        })
    }
}

fn is_notification_secret(secret: &Secret) -> bool {
    secret
        .metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(NOTIFICATION_SECRET_LABEL))
        .is_some_and(|v| v == NOTIFICATION_SECRET_VALUE)
}

impl Runnable for NotificationController {
    fn start(self: Box<Self>, shutdown: Shutdown) -> BoxFuture<'static, Result<()>> {
        async move {
            let version = self.client.apiserver_version().await?;
            info!(version = %version.git_version, "Notification controller connected");

            let secrets = self.secrets.store();
            run_sync_loop(
                ControllerName::Notification,
                vec![self.secrets.wait_until_synced()],
                DEFAULT_RESYNC,
                shutdown,
                move || {
                    let count = secrets
                        .state()
                        .iter()
                        .filter(|s| is_notification_secret(s))
                        .count();
                    debug!(secrets = count, "Notification resync");
                },
            )
            .await
        }
        .boxed()
    }
}
