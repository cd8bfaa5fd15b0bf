//! Error types for controllers.
//!
//! A controller returns an error from `start` only when it cannot run at all.
//! Per-object reconcile failures stay inside the controller.

use thiserror::Error;

use crate::clients::ClientError;
use crate::informers::CacheSyncError;

/// Error type for controller startup and run loops
#[derive(Error, Debug)]
pub enum Error {
    /// An informer cache never finished its initial list
    #[error("Cache sync failed: {0}")]
    CacheSync(#[from] CacheSyncError),

    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// An external service client failed
    #[error("External client error: {0}")]
    Client(#[from] ClientError),
}

/// Result type alias for controller operations
pub type Result<T> = std::result::Result<T, Error>;
