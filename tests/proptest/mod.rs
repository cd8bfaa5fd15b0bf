// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    dead_code
)]

//! Property-based tests for the controller bootstrap.
//!
//! Uses proptest to generate option sets and checks that what reaches the
//! manager always matches the activation plan.

use proptest::prelude::*;

use ks_controller_manager::bootstrap::{BootstrapEvent, BootstrapPhase, BootstrapStateMachine};
use ks_controller_manager::{ActivationPlan, ControllerName, Options};

#[path = "../functional/mock_manager.rs"]
mod mock_manager;

use mock_manager::{Harness, ScriptedClientBuilder};

/// Strategy for IP pool backend strings, recognized or not.
fn any_ip_pool_type() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("none".to_string()),
        Just("calico".to_string()),
        Just("flannel".to_string()),
        Just(String::new()),
    ]
}

/// Strategy for option sets whose providers all build.
fn valid_options() -> impl Strategy<Value = Options> {
    (
        any::<bool>(),
        any::<bool>(),
        any::<bool>(),
        any_ip_pool_type(),
    )
        .prop_map(|(mesh, multicluster, network_policy, ip_pool_type)| {
            let mut options = Options::default();
            options.service_mesh_enabled = mesh;
            options.multicluster.enable = multicluster;
            options.network.enable_network_policy = network_policy;
            options.network.ip_pool_type = ip_pool_type;
            options
        })
}

fn any_event() -> impl Strategy<Value = BootstrapEvent> {
    prop_oneof![
        Just(BootstrapEvent::Begin),
        Just(BootstrapEvent::CachesReady),
        Just(BootstrapEvent::ControllersConstructed),
        Just(BootstrapEvent::RegistrationComplete),
        Just(BootstrapEvent::ErrorEncountered),
    ]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// Run one bootstrap and return the names the manager accepted plus its add count.
fn bootstrap(options: &Options) -> (Vec<ControllerName>, usize) {
    runtime().block_on(async {
        let mut harness = Harness::new(ScriptedClientBuilder::succeeding());
        harness.run(options).await.unwrap();
        (harness.manager.added.clone(), harness.manager.add_calls)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Exactly the enabled controllers are added, each once.
    #[test]
    fn registered_matches_plan(options in valid_options()) {
        let plan = ActivationPlan::resolve(&options);
        let (added, add_calls) = bootstrap(&options);

        prop_assert_eq!(&added, &plan.enabled_names());
        prop_assert_eq!(add_calls, added.len());
    }

    /// The same options always give the same registrations.
    #[test]
    fn bootstrap_is_deterministic(options in valid_options()) {
        prop_assert_eq!(bootstrap(&options), bootstrap(&options));
    }

    /// Resolving a plan never depends on anything but the options.
    #[test]
    fn plan_resolution_is_pure(options in valid_options()) {
        prop_assert_eq!(ActivationPlan::resolve(&options), ActivationPlan::resolve(&options));
    }

    /// The base set is on for every option set.
    #[test]
    fn base_set_always_enabled(options in valid_options()) {
        let plan = ActivationPlan::resolve(&options);
        for name in [
            ControllerName::Job,
            ControllerName::User,
            ControllerName::GlobalRoleBinding,
            ControllerName::Group,
        ] {
            prop_assert!(plan.is_enabled(name));
        }
        prop_assert_eq!(plan.is_enabled(ControllerName::GlobalRole), options.multicluster.enable);
        prop_assert_eq!(plan.is_enabled(ControllerName::Notification), options.multicluster.enable);
    }

    /// Terminal phases accept no events, whatever arrives.
    #[test]
    fn terminal_phases_stay_put(events in prop::collection::vec(any_event(), 0..20)) {
        let machine = BootstrapStateMachine;
        let mut phase = BootstrapPhase::NotStarted;
        let mut reached_terminal = None;

        for event in events {
            if let ks_controller_manager::bootstrap::TransitionResult::Success { to, .. } =
                machine.transition(phase, event)
            {
                prop_assert!(reached_terminal.is_none(), "left terminal phase {:?}", reached_terminal);
                phase = to;
                if phase.is_terminal() {
                    reached_terminal = Some(phase);
                }
            }
        }
    }
}
