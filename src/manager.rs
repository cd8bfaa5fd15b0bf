//! Supervising runtime for registered controllers.
//!
//! The [`Manager`] trait is the registration surface the bootstrap talks to.
//! [`ControllerManager`] is the production implementation: it owns a client
//! and an informer cache of its own, runs every registered controller as a
//! tokio task and stops them all together.

use std::sync::Arc;

use kube::Client;
use thiserror::Error;
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info};

use crate::controller::{self, ControllerName, Runnable};
use crate::informers::{InformerFactory, watcher_config};
use crate::options::KubernetesOptions;
use crate::shutdown::{self, Shutdown};

#[derive(Error, Debug)]
pub enum ManagerError {
    /// Controllers cannot be added once the manager is running
    #[error("cannot add {0}: manager already started")]
    AlreadyStarted(ControllerName),

    #[error("{0} is already registered")]
    DuplicateName(ControllerName),

    /// A controller returned an error while running
    #[error("{name} failed: {source}")]
    Controller {
        name: ControllerName,
        #[source]
        source: controller::Error,
    },

    #[error("controller task panicked or was cancelled: {0}")]
    Join(#[from] JoinError),
}

/// Registration surface of the supervising runtime.
pub trait Manager {
    /// Take ownership of a controller. It is started when the manager starts.
    fn add(&mut self, name: ControllerName, runnable: Box<dyn Runnable>)
    -> Result<(), ManagerError>;

    /// The manager's own API client
    fn client(&self) -> Client;

    /// The manager's own informer cache, started with the manager
    fn cache(&self) -> &InformerFactory;
}

pub struct ControllerManager {
    client: Client,
    cache: InformerFactory,
    runnables: Vec<(ControllerName, Box<dyn Runnable>)>,
    started: bool,
}

impl ControllerManager {
    pub fn new(client: Client, options: &KubernetesOptions) -> Self {
        let cache = InformerFactory::new("manager", client.clone(), watcher_config(options));
        Self {
            client,
            cache,
            runnables: Vec::new(),
            started: false,
        }
    }

    /// Names registered so far, in registration order
    pub fn registered(&self) -> Vec<ControllerName> {
        self.runnables.iter().map(|(name, _)| *name).collect()
    }

    /// Start the cache and every controller, then wait for them.
    ///
    /// Returns when `shutdown` fires and every controller has stopped, or as
    /// soon as one controller fails. A failure stops the others.
    pub async fn start(&mut self, shutdown: Shutdown) -> Result<(), ManagerError> {
        self.started = true;

        // Controllers see either the external signal or an internal one
        let (internal, stop) = shutdown::channel();
        let internal = Arc::new(internal);
        let relay = {
            let internal = internal.clone();
            tokio::spawn(async move {
                shutdown.wait().await;
                internal.trigger();
            })
        };

        self.cache.start(&stop);

        let mut tasks = JoinSet::new();
        for (name, runnable) in self.runnables.drain(..) {
            let stop = stop.clone();
            tasks.spawn(async move { (name, runnable.start(stop).await) });
        }
        info!(controllers = tasks.len(), "Controller manager started");

        let mut result = Ok(());
        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok((_, Ok(()))) => continue,
                Ok((name, Err(source))) => ManagerError::Controller { name, source },
                Err(e) => ManagerError::Join(e),
            };
            error!(error = %outcome, "Controller exited with error, stopping manager");
            if result.is_ok() {
                result = Err(outcome);
            }
            internal.trigger();
        }

        relay.abort();
        info!("Controller manager stopped");
        result
    }
}

impl Manager for ControllerManager {
    fn add(
        &mut self,
        name: ControllerName,
        runnable: Box<dyn Runnable>,
    ) -> Result<(), ManagerError> {
        if self.started {
            return Err(ManagerError::AlreadyStarted(name));
        }
        if self.runnables.iter().any(|(existing, _)| *existing == name) {
            return Err(ManagerError::DuplicateName(name));
        }
        self.runnables.push((name, runnable));
        Ok(())
    }

    fn client(&self) -> Client {
        self.client.clone()
    }

    fn cache(&self) -> &InformerFactory {
        &self.cache
    }
}
