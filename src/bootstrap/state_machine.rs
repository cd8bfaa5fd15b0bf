//! Finite state machine for one bootstrap run.
//!
//! The bootstrap moves forward through a fixed sequence of phases. Any of the
//! three working phases can fail; `Completed` and `Failed` are terminal and
//! accept no further events.

use std::fmt;

/// Phase of a bootstrap run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BootstrapPhase {
    NotStarted,
    BuildingFederationCaches,
    ConstructingControllers,
    Registering,
    Completed,
    Failed,
}

impl BootstrapPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BootstrapPhase::Completed | BootstrapPhase::Failed)
    }
}

impl fmt::Display for BootstrapPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootstrapPhase::NotStarted => write!(f, "NotStarted"),
            BootstrapPhase::BuildingFederationCaches => write!(f, "BuildingFederationCaches"),
            BootstrapPhase::ConstructingControllers => write!(f, "ConstructingControllers"),
            BootstrapPhase::Registering => write!(f, "Registering"),
            BootstrapPhase::Completed => write!(f, "Completed"),
            BootstrapPhase::Failed => write!(f, "Failed"),
        }
    }
}

/// Events driving the bootstrap forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BootstrapEvent {
    /// Bootstrap entered
    Begin,
    /// Federation caches are built, or were not needed
    CachesReady,
    /// Every factory has run and the registry is frozen
    ControllersConstructed,
    /// Every enabled controller reached the manager
    RegistrationComplete,
    /// A fatal error occurred
    ErrorEncountered,
}

impl fmt::Display for BootstrapEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootstrapEvent::Begin => write!(f, "Begin"),
            BootstrapEvent::CachesReady => write!(f, "CachesReady"),
            BootstrapEvent::ControllersConstructed => write!(f, "ControllersConstructed"),
            BootstrapEvent::RegistrationComplete => write!(f, "RegistrationComplete"),
            BootstrapEvent::ErrorEncountered => write!(f, "ErrorEncountered"),
        }
    }
}

#[derive(Debug)]
struct Transition {
    from: BootstrapPhase,
    to: BootstrapPhase,
    event: BootstrapEvent,
    description: &'static str,
}

impl Transition {
    const fn new(
        from: BootstrapPhase,
        to: BootstrapPhase,
        event: BootstrapEvent,
        description: &'static str,
    ) -> Self {
        Self {
            from,
            to,
            event,
            description,
        }
    }
}

/// Result of attempting a transition
#[derive(Debug, PartialEq, Eq)]
pub enum TransitionResult {
    Success {
        from: BootstrapPhase,
        to: BootstrapPhase,
        description: &'static str,
    },
    InvalidTransition {
        current: BootstrapPhase,
        event: BootstrapEvent,
    },
}

const TRANSITIONS: [Transition; 7] = [
    Transition::new(
        BootstrapPhase::NotStarted,
        BootstrapPhase::BuildingFederationCaches,
        BootstrapEvent::Begin,
        "Bootstrap started",
    ),
    Transition::new(
        BootstrapPhase::BuildingFederationCaches,
        BootstrapPhase::ConstructingControllers,
        BootstrapEvent::CachesReady,
        "Federation caches ready",
    ),
    Transition::new(
        BootstrapPhase::BuildingFederationCaches,
        BootstrapPhase::Failed,
        BootstrapEvent::ErrorEncountered,
        "Federated client construction failed",
    ),
    Transition::new(
        BootstrapPhase::ConstructingControllers,
        BootstrapPhase::Registering,
        BootstrapEvent::ControllersConstructed,
        "Registry frozen",
    ),
    Transition::new(
        BootstrapPhase::ConstructingControllers,
        BootstrapPhase::Failed,
        BootstrapEvent::ErrorEncountered,
        "Controller construction failed",
    ),
    Transition::new(
        BootstrapPhase::Registering,
        BootstrapPhase::Completed,
        BootstrapEvent::RegistrationComplete,
        "All enabled controllers registered",
    ),
    Transition::new(
        BootstrapPhase::Registering,
        BootstrapPhase::Failed,
        BootstrapEvent::ErrorEncountered,
        "Registration rejected by the manager",
    ),
];

/// Transition table for a bootstrap run
#[derive(Debug, Default)]
pub struct BootstrapStateMachine;

impl BootstrapStateMachine {
    pub fn transition(&self, current: BootstrapPhase, event: BootstrapEvent) -> TransitionResult {
        match TRANSITIONS
            .iter()
            .find(|t| t.from == current && t.event == event)
        {
            Some(t) => TransitionResult::Success {
                from: t.from,
                to: t.to,
                description: t.description,
            },
            None => TransitionResult::InvalidTransition { current, event },
        }
    }

    pub fn can_transition(&self, from: BootstrapPhase, event: BootstrapEvent) -> bool {
        TRANSITIONS.iter().any(|t| t.from == from && t.event == event)
    }

    pub fn valid_events(&self, state: BootstrapPhase) -> Vec<BootstrapEvent> {
        TRANSITIONS
            .iter()
            .filter(|t| t.from == state)
            .map(|t| t.event)
            .collect()
    }
}
