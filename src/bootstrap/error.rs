use thiserror::Error;

use super::state_machine::BootstrapPhase;
use crate::controller::ControllerName;
use crate::controller::network::ProviderError;
use crate::controller::notification::NotificationError;
use crate::federation::ResourceClientError;
use crate::manager::ManagerError;
use crate::options::ConfigError;

/// Fatal bootstrap failures. Disabled controllers are never an error.
#[derive(Error, Debug)]
pub enum BootstrapError {
    /// The options violate a constraint; nothing was built
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A federated resource client could not be built; no cache was started
    #[error(transparent)]
    FederatedClient(#[from] ResourceClientError),

    /// A controller was requested but its provider is misconfigured
    #[error("provider for {name} could not be built: {source}")]
    Provider {
        name: ControllerName,
        #[source]
        source: ProviderError,
    },

    #[error("notification controller could not be built: {0}")]
    Notification(#[from] NotificationError),

    /// The manager rejected a controller. Earlier registrations stay in place.
    /// Displays as the manager's own error.
    #[error("{source}")]
    Registration {
        name: ControllerName,
        #[source]
        source: ManagerError,
    },

    /// Two registry entries share a name
    #[error("{0} is already in the registry")]
    DuplicateController(ControllerName),

    /// The bootstrap was already run and ended in this phase
    #[error("bootstrap already ran and is {0}")]
    AlreadyRan(BootstrapPhase),
}

pub type Result<T, E = BootstrapError> = std::result::Result<T, E>;
