//! Controllers run by the controller manager.
//!
//! Every controller is a [`Runnable`]: a long-running task that starts when
//! the manager starts it and runs until the shutdown signal fires. Each
//! submodule holds the factory functions for one area; a factory either
//! returns [`Activation::Enabled`] with a constructed controller or
//! [`Activation::Disabled`] when the controller is switched off.

use std::fmt;

use futures::future::BoxFuture;

use crate::shutdown::Shutdown;

pub mod error;
mod worker;

// Controllers, grouped by area
pub mod certificates;
pub mod cluster;
pub mod iam;
pub mod network;
pub mod notification;
pub mod servicemesh;
pub mod storage;
pub mod workloads;

pub use error::{Error, Result};

/// A task the supervising runtime can start.
pub trait Runnable: Send {
    /// Run until `shutdown` fires. Returns an error only if the controller
    /// cannot run at all.
    fn start(self: Box<Self>, shutdown: Shutdown) -> BoxFuture<'static, Result<()>>;
}

/// Outcome of a controller factory.
pub enum Activation {
    /// Constructed and ready to be registered
    Enabled(Box<dyn Runnable>),
    /// Intentionally not constructed
    Disabled,
}

impl Activation {
    pub fn enabled<R: Runnable + 'static>(runnable: R) -> Self {
        Activation::Enabled(Box::new(runnable))
    }

    /// `Enabled` when `enabled` is true, building the controller lazily.
    pub fn when<R, F>(enabled: bool, build: F) -> Self
    where
        R: Runnable + 'static,
        F: FnOnce() -> R,
    {
        if enabled {
            Activation::enabled(build())
        } else {
            Activation::Disabled
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Activation::Enabled(_))
    }
}

impl fmt::Debug for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Activation::Enabled(_) => write!(f, "Enabled"),
            Activation::Disabled => write!(f, "Disabled"),
        }
    }
}

/// Registry key of every controller this process knows about.
///
/// Being a closed enum, two controllers can never share a key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ControllerName {
    VirtualService,
    DestinationRule,
    Job,
    StorageCapability,
    VolumeSnapshot,
    User,
    LoginRecord,
    Cluster,
    NamespaceNetworkPolicy,
    CertificateSigningRequest,
    ClusterRoleBinding,
    GlobalRoleBinding,
    IpPool,
    GroupBinding,
    Group,
    GlobalRole,
    Notification,
}

impl ControllerName {
    /// Every controller, in registry order
    pub const ALL: [ControllerName; 17] = [
        ControllerName::VirtualService,
        ControllerName::DestinationRule,
        ControllerName::Job,
        ControllerName::StorageCapability,
        ControllerName::VolumeSnapshot,
        ControllerName::User,
        ControllerName::LoginRecord,
        ControllerName::Cluster,
        ControllerName::NamespaceNetworkPolicy,
        ControllerName::CertificateSigningRequest,
        ControllerName::ClusterRoleBinding,
        ControllerName::GlobalRoleBinding,
        ControllerName::IpPool,
        ControllerName::GroupBinding,
        ControllerName::Group,
        ControllerName::GlobalRole,
        ControllerName::Notification,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            ControllerName::VirtualService => "virtualservice-controller",
            ControllerName::DestinationRule => "destinationrule-controller",
            ControllerName::Job => "job-controller",
            ControllerName::StorageCapability => "storagecapability-controller",
            ControllerName::VolumeSnapshot => "volumesnapshot-controller",
            ControllerName::User => "user-controller",
            ControllerName::LoginRecord => "loginrecord-controller",
            ControllerName::Cluster => "cluster-controller",
            ControllerName::NamespaceNetworkPolicy => "nsnp-controller",
            ControllerName::CertificateSigningRequest => "csr-controller",
            ControllerName::ClusterRoleBinding => "clusterrolebinding-controller",
            ControllerName::GlobalRoleBinding => "globalrolebinding-controller",
            ControllerName::IpPool => "ippool-controller",
            ControllerName::GroupBinding => "groupbinding-controller",
            ControllerName::Group => "group-controller",
            ControllerName::GlobalRole => "globalrole-controller",
            ControllerName::Notification => "notification-controller",
        }
    }
}

impl fmt::Display for ControllerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
