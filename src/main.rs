//! ks-controller-manager - runs the KubeSphere controllers.
//!
//! This is the main entry point that:
//! - Initializes structured logging
//! - Loads options and creates the Kubernetes client
//! - Runs leader election (required for HA deployments)
//! - Bootstraps the controllers and runs them until shutdown

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use kube::Client;
use kube_leader_election::{LeaseLock, LeaseLockParams};
use tokio::signal;
use tracing::{error, info, warn};

use ks_controller_manager::federation::DiscoveryClientBuilder;
use ks_controller_manager::health::{HealthState, run_health_server};
use ks_controller_manager::informers::InformerFactories;
use ks_controller_manager::options::CONFIG_PATH_ENV;
use ks_controller_manager::{ControllerManager, Dependencies, Options, add_controllers, shutdown};

/// Lease configuration
const LEASE_NAME: &str = "ks-controller-manager-leader";
const LEASE_TTL_SECS: u64 = 15;
const LEASE_RENEW_INTERVAL_SECS: u64 = 5;

/// Grace period for controllers to stop during shutdown
const SHUTDOWN_GRACE_PERIOD_SECS: u64 = 5;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ks_controller_manager=info".parse()?)
                .add_directive("kube=info".parse()?)
                .add_directive("kube_leader_election=info".parse()?),
        )
        .json()
        .init();

    info!("Starting ks-controller-manager");

    let config_path = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
    let options = Options::load(config_path.as_deref())?;
    info!(
        service_mesh = options.service_mesh_enabled,
        multicluster = options.multicluster.enable,
        network_policy = options.network.enable_network_policy,
        ip_pool_type = %options.network.ip_pool_type,
        "Loaded options"
    );

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    // Get pod identity for leader election
    let pod_name = std::env::var("POD_NAME").unwrap_or_else(|_| {
        warn!("POD_NAME not set, using hostname");
        hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string())
    });
    let namespace = std::env::var("POD_NAMESPACE").unwrap_or_else(|_| {
        warn!("POD_NAMESPACE not set, using 'kubesphere-system'");
        "kubesphere-system".to_string()
    });

    info!(
        holder_id = %pod_name,
        namespace = %namespace,
        lease_name = LEASE_NAME,
        "Initializing leader election"
    );

    let health_state = Arc::new(HealthState::new());

    // Probes should work even as non-leader
    let health_handle = {
        let health_state = health_state.clone();
        tokio::spawn(async move {
            if let Err(e) = run_health_server(health_state).await {
                error!("Health server error: {}", e);
            }
        })
    };

    let lease_params = || LeaseLockParams {
        holder_id: pod_name.clone(),
        lease_name: LEASE_NAME.to_string(),
        lease_ttl: Duration::from_secs(LEASE_TTL_SECS),
    };
    let lease_lock = LeaseLock::new(client.clone(), &namespace, lease_params());

    info!("Waiting to acquire leadership...");
    loop {
        match lease_lock.try_acquire_or_renew().await {
            Ok(result) if result.acquired_lease => {
                info!("Acquired leadership");
                break;
            }
            Ok(_) => info!("Another instance is leader, waiting..."),
            Err(e) => warn!("Failed to acquire lease: {}, retrying...", e),
        }
        tokio::time::sleep(Duration::from_secs(LEASE_RENEW_INTERVAL_SECS)).await;
    }

    let lease_renewal_handle = {
        let lease_lock = LeaseLock::new(client.clone(), &namespace, lease_params());

        #[allow(clippy::exit)]
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(LEASE_RENEW_INTERVAL_SECS)).await;

                match lease_lock.try_acquire_or_renew().await {
                    Ok(result) if result.acquired_lease => {}
                    Ok(_) => {
                        error!("Lost leadership! Shutting down...");
                        // Exit so Kubernetes restarts us and we re-enter election
                        std::process::exit(1);
                    }
                    Err(e) => {
                        error!("Failed to renew lease: {}. Shutting down...", e);
                        std::process::exit(1);
                    }
                }
            }
        })
    };

    let (trigger, shutdown) = shutdown::channel();
    let informers = InformerFactories::new(client.clone(), &options.kubernetes);
    let mut mgr = ControllerManager::new(client.clone(), &options.kubernetes);

    let started = Instant::now();
    let deps = Dependencies {
        informers: &informers,
        directory: None,
        devops: None,
        resource_clients: Box::new(DiscoveryClientBuilder::new(client.clone())),
    };
    let report = match add_controllers(&mut mgr, deps, &options, &shutdown).await {
        Ok(report) => {
            health_state
                .metrics
                .record_bootstrap(&report, started.elapsed().as_secs_f64());
            report
        }
        Err(e) => {
            health_state
                .metrics
                .record_bootstrap_error(started.elapsed().as_secs_f64());
            error!(error = %e, "Failed to add controllers");
            trigger.trigger();
            return Err(e.into());
        }
    };
    info!(
        registered = ?report.registered,
        skipped = report.skipped.len(),
        "Controllers bootstrapped"
    );

    let watches = informers.start(&shutdown);
    info!(watches, "Shared informers started");

    let manager_handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { mgr.start(shutdown).await })
    };
    health_state.set_ready(true).await;

    tokio::select! {
        result = manager_handle => {
            match result {
                Ok(Ok(())) => info!("Controller manager exited"),
                Ok(Err(e)) => error!("Controller manager failed: {}", e),
                Err(e) => error!("Controller manager task panicked: {}", e),
            }
        }
        result = health_handle => {
            if let Err(e) = result {
                error!("Health server task panicked: {}", e);
            }
        }
        // Lease renewal task only exits via process::exit() or panic
        Err(e) = lease_renewal_handle => {
            error!("Lease renewal task panicked: {}", e);
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal, initiating graceful shutdown...");

            health_state.set_ready(false).await;
            trigger.trigger();

            info!(
                "Waiting {}s for controllers to stop...",
                SHUTDOWN_GRACE_PERIOD_SECS
            );
            tokio::time::sleep(Duration::from_secs(SHUTDOWN_GRACE_PERIOD_SECS)).await;

            info!("Grace period complete, shutting down");
        }
    }

    trigger.trigger();
    info!("ks-controller-manager stopped");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
///
/// Signal handler setup failures are fatal: without them there is no
/// graceful shutdown.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
