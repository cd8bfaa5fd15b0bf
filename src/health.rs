//! Health server for Kubernetes probes and Prometheus metrics.
//!
//! Provides:
//! - `/healthz` - Liveness probe (always returns 200 if server is running)
//! - `/readyz` - Readiness probe (200 once controllers are registered and running)
//! - `/metrics` - Prometheus metrics endpoint

use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabel, EncodeLabelSet, LabelSetEncoder};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use tokio::sync::RwLock;
use tracing::info;

use crate::bootstrap::RegistrationReport;
use crate::controller::ControllerName;

/// Port the health server listens on
pub const HEALTH_PORT: u16 = 8080;

/// Labels for per-controller metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ControllerLabels {
    pub controller: String,
}

impl EncodeLabelSet for ControllerLabels {
    fn encode(&self, mut encoder: LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("controller", self.controller.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Shared metrics for the controller manager
pub struct Metrics {
    /// 1 for a registered controller, 0 for a skipped one
    pub controllers: Family<ControllerLabels, Gauge>,
    /// Failed bootstrap attempts
    pub registration_errors: Counter,
    /// Time spent in the bootstrap
    pub bootstrap_duration_seconds: Histogram,
    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let controllers = Family::<ControllerLabels, Gauge>::default();
        registry.register(
            "ks_controller_manager_controllers",
            "Whether each controller is registered (1) or skipped (0)",
            controllers.clone(),
        );

        let registration_errors = Counter::default();
        registry.register(
            "ks_controller_manager_registration_errors",
            "Number of failed controller bootstraps",
            registration_errors.clone(),
        );

        let bootstrap_duration_seconds = Histogram::new(exponential_buckets(0.01, 2.0, 12));
        registry.register(
            "ks_controller_manager_bootstrap_duration_seconds",
            "Duration of the controller bootstrap in seconds",
            bootstrap_duration_seconds.clone(),
        );

        Self {
            controllers,
            registration_errors,
            bootstrap_duration_seconds,
            registry,
        }
    }

    fn set_controller(&self, name: ControllerName, value: i64) {
        let labels = ControllerLabels {
            controller: name.as_str().to_string(),
        };
        self.controllers.get_or_create(&labels).set(value);
    }

    /// Record a finished bootstrap
    pub fn record_bootstrap(&self, report: &RegistrationReport, duration_secs: f64) {
        for name in &report.registered {
            self.set_controller(*name, 1);
        }
        for name in &report.skipped {
            self.set_controller(*name, 0);
        }
        self.bootstrap_duration_seconds.observe(duration_secs);
    }

    /// Record a failed bootstrap
    pub fn record_bootstrap_error(&self, duration_secs: f64) {
        self.registration_errors.inc();
        self.bootstrap_duration_seconds.observe(duration_secs);
    }

    /// Encode metrics to Prometheus text format
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if encode(&mut buffer, &self.registry).is_err() {
            tracing::error!("Failed to encode metrics");
            return "# Error encoding metrics".to_string();
        }
        buffer
    }
}

/// Shared state for the health server
pub struct HealthState {
    /// Whether controllers are registered and the manager is running
    ready: RwLock<bool>,
    pub metrics: Metrics,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Create a new health state (starts as not ready)
    pub fn new() -> Self {
        Self {
            ready: RwLock::new(false),
            metrics: Metrics::new(),
        }
    }

    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    pub async fn is_ready(&self) -> bool {
        *self.ready.read().await
    }
}

/// Liveness probe handler
async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness probe handler
///
/// Returns 503 Service Unavailable until the manager is running.
async fn readyz(State(state): State<Arc<HealthState>>) -> Response {
    if state.is_ready().await {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
    }
}

async fn metrics_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let body = state.metrics.encode();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// Create the health server router
pub fn create_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Run the health server on 0.0.0.0:8080.
pub async fn run_health_server(state: Arc<HealthState>) -> Result<(), std::io::Error> {
    let app = create_router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], HEALTH_PORT));
    info!(port = HEALTH_PORT, "Starting health server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
