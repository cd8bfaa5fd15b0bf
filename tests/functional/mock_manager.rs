//! Mock collaborators for bootstrap scenario tests.
//!
//! `RecordingManager` stands in for the supervising runtime and records every
//! `add` call. `ScriptedClientBuilder` stands in for API discovery and can be
//! told to fail on one federated kind. Neither needs a Kubernetes cluster.

use std::sync::Mutex;

use futures::FutureExt;
use futures::future::BoxFuture;
use kube::Client;
use kube::runtime::watcher::Config as WatcherConfig;

use ks_controller_manager::bootstrap::{
    Bootstrap, BootstrapError, Dependencies, RegistrationReport, add_controllers,
};
use ks_controller_manager::federation::{
    FederatedClient, FederatedKind, ResourceClientBuilder, ResourceClientError,
};
use ks_controller_manager::informers::{InformerFactories, InformerFactory};
use ks_controller_manager::options::{KubernetesOptions, Options};
use ks_controller_manager::shutdown::{self, Shutdown, ShutdownTrigger};
use ks_controller_manager::{ControllerName, Manager, ManagerError, Runnable};

/// Client pointing at a closed port. Nothing in these tests talks to it.
pub fn test_client() -> Client {
    let config = kube::Config::new("http://127.0.0.1:1".parse().unwrap());
    Client::try_from(config).unwrap()
}

/// Manager that records registrations and can reject one name.
pub struct RecordingManager {
    pub added: Vec<ControllerName>,
    pub add_calls: usize,
    reject: Option<ControllerName>,
    client: Client,
    cache: InformerFactory,
}

impl RecordingManager {
    pub fn new() -> Self {
        let client = test_client();
        Self {
            added: Vec::new(),
            add_calls: 0,
            reject: None,
            cache: InformerFactory::new("manager", client.clone(), WatcherConfig::default()),
            client,
        }
    }

    /// Reject `name` when it is added
    pub fn rejecting(name: ControllerName) -> Self {
        Self {
            reject: Some(name),
            ..Self::new()
        }
    }
}

impl Manager for RecordingManager {
    fn add(&mut self, name: ControllerName, _runnable: Box<dyn Runnable>) -> Result<(), ManagerError> {
        self.add_calls += 1;
        if self.reject == Some(name) {
            return Err(ManagerError::AlreadyStarted(name));
        }
        self.added.push(name);
        Ok(())
    }

    fn client(&self) -> Client {
        self.client.clone()
    }

    fn cache(&self) -> &InformerFactory {
        &self.cache
    }
}

/// Federated client builder that succeeds except for one kind.
pub struct ScriptedClientBuilder {
    fail_on: Option<FederatedKind>,
    pub calls: Mutex<Vec<FederatedKind>>,
    client: Client,
}

impl ScriptedClientBuilder {
    pub fn succeeding() -> Self {
        Self {
            fail_on: None,
            calls: Mutex::new(Vec::new()),
            client: test_client(),
        }
    }

    pub fn failing_on(kind: FederatedKind) -> Self {
        Self {
            fail_on: Some(kind),
            ..Self::succeeding()
        }
    }
}

impl ResourceClientBuilder for ScriptedClientBuilder {
    fn build(&self, kind: FederatedKind) -> BoxFuture<'_, Result<FederatedClient, ResourceClientError>> {
        async move {
            self.calls.lock().unwrap().push(kind);
            if self.fail_on == Some(kind) {
                return Err(ResourceClientError::NotServed(kind));
            }
            Ok(FederatedClient::new(self.client.clone(), kind, kind.api_resource()))
        }
        .boxed()
    }
}

impl ResourceClientBuilder for &'static ScriptedClientBuilder {
    fn build(&self, kind: FederatedKind) -> BoxFuture<'_, Result<FederatedClient, ResourceClientError>> {
        (**self).build(kind)
    }
}

/// Everything one bootstrap run needs, owned in one place.
pub struct Harness {
    pub manager: RecordingManager,
    pub informers: InformerFactories,
    pub builder: &'static ScriptedClientBuilder,
    trigger: ShutdownTrigger,
    pub shutdown: Shutdown,
}

impl Harness {
    pub fn new(builder: ScriptedClientBuilder) -> Self {
        Self::with_manager(RecordingManager::new(), builder)
    }

    pub fn with_manager(manager: RecordingManager, builder: ScriptedClientBuilder) -> Self {
        let (trigger, shutdown) = shutdown::channel();
        Self {
            manager,
            informers: InformerFactories::new(test_client(), &KubernetesOptions::default()),
            // Leaked so the test can inspect calls after the bootstrap took its box
            builder: Box::leak(Box::new(builder)),
            trigger,
            shutdown,
        }
    }

    pub async fn run(&mut self, options: &Options) -> Result<RegistrationReport, BootstrapError> {
        let deps = Dependencies {
            informers: &self.informers,
            directory: None,
            devops: None,
            resource_clients: Box::new(self.builder),
        };
        add_controllers(&mut self.manager, deps, options, &self.shutdown).await
    }

    pub async fn run_with(
        &mut self,
        bootstrap: &mut Bootstrap,
        options: &Options,
    ) -> Result<RegistrationReport, BootstrapError> {
        let deps = Dependencies {
            informers: &self.informers,
            directory: None,
            devops: None,
            resource_clients: Box::new(self.builder),
        };
        bootstrap.run(&mut self.manager, deps, options, &self.shutdown).await
    }

    pub fn builder_calls(&self) -> Vec<FederatedKind> {
        self.builder.calls.lock().unwrap().clone()
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.trigger.trigger();
    }
}

/// Options from a JSON snippet
pub fn options(json: &str) -> Options {
    Options::from_json(json).unwrap()
}
