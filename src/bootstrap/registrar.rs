//! Hands every enabled controller in a frozen registry to the manager.

use tracing::{debug, error};

use super::error::{BootstrapError, Result};
use super::registry::FrozenRegistry;
use crate::controller::{Activation, ControllerName};
use crate::manager::Manager;

/// What reached the manager and what was skipped
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RegistrationReport {
    pub registered: Vec<ControllerName>,
    pub skipped: Vec<ControllerName>,
}

/// Register every enabled entry with `mgr`.
///
/// Disabled entries are skipped. The first rejection stops the walk and is
/// returned; controllers added before it stay with the manager.
pub fn register_all<M>(registry: FrozenRegistry, mgr: &mut M) -> Result<RegistrationReport>
where
    M: Manager + ?Sized,
{
    let mut report = RegistrationReport::default();
    for (name, activation) in registry {
        match activation {
            Activation::Disabled => {
                debug!("{name} is not going to run due to dependent component disabled");
                report.skipped.push(name);
            }
            Activation::Enabled(runnable) => {
                if let Err(source) = mgr.add(name, runnable) {
                    error!(controller = %name, error = %source, "Add controller to manager failed");
                    return Err(BootstrapError::Registration { name, source });
                }
                report.registered.push(name);
            }
        }
    }
    Ok(report)
}
