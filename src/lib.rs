//! ks-controller-manager library crate
//!
//! Decides which KubeSphere controllers run in this process, builds them
//! against shared informers and federation caches, and registers them with
//! the controller manager. The entry point is [`add_controllers`].

pub mod bootstrap;
pub mod clients;
pub mod controller;
pub mod crd;
pub mod features;
pub mod federation;
pub mod health;
pub mod informers;
pub mod manager;
pub mod options;
pub mod shutdown;

pub use bootstrap::{BootstrapError, Dependencies, RegistrationReport, add_controllers};
pub use controller::{Activation, ControllerName, Runnable};
pub use features::ActivationPlan;
pub use health::HealthState;
pub use manager::{ControllerManager, Manager, ManagerError};
pub use options::Options;
