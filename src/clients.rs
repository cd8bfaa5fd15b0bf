//! Optional external service clients consumed by the IAM controllers.
//!
//! Both are injected by the caller; a `None` simply means the feature is not
//! configured for this deployment.

use futures::future::BoxFuture;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("{service} is unavailable: {message}")]
    Unavailable {
        service: &'static str,
        message: String,
    },
}

/// LDAP-style directory holding platform users
pub trait DirectoryClient: Send + Sync {
    fn health_check(&self) -> BoxFuture<'_, Result<(), ClientError>>;
}

/// DevOps service mirroring platform users
pub trait DevOpsClient: Send + Sync {
    fn health_check(&self) -> BoxFuture<'_, Result<(), ClientError>>;
}
