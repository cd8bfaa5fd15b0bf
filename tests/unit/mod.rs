// Test code is allowed to panic on failure
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

//! Unit tests for ks-controller-manager.
//!
//! These tests run without a Kubernetes cluster and exercise the public API
//! of individual components in isolation.

mod controller_name_tests {
    use std::collections::HashSet;

    use ks_controller_manager::ControllerName;

    #[test]
    fn test_names_are_unique() {
        let names: HashSet<_> = ControllerName::ALL.iter().map(|n| n.as_str()).collect();
        assert_eq!(names.len(), ControllerName::ALL.len());
    }

    #[test]
    fn test_names_are_controller_suffixed() {
        for name in ControllerName::ALL {
            assert!(name.as_str().ends_with("-controller"), "{name}");
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(ControllerName::NamespaceNetworkPolicy.to_string(), "nsnp-controller");
        assert_eq!(ControllerName::CertificateSigningRequest.to_string(), "csr-controller");
        assert_eq!(ControllerName::IpPool.to_string(), "ippool-controller");
    }

    #[test]
    fn test_multicluster_entries_come_last() {
        let last = &ControllerName::ALL[ControllerName::ALL.len() - 2..];
        assert_eq!(last, [ControllerName::GlobalRole, ControllerName::Notification]);
    }
}

mod options_tests {
    use std::time::Duration;

    use ks_controller_manager::Options;
    use ks_controller_manager::options::{ConfigError, IpPoolBackend};

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(Options::from_json("{}").unwrap(), Options::default());
    }

    #[test]
    fn test_camel_case_fields() {
        let options = Options::from_json(
            r#"{
                "serviceMeshEnabled": true,
                "kubectlImage": "registry.local/kubectl:v1.30.0",
                "multicluster": {"enable": true, "hostClusterName": "primary"},
                "network": {"enableNetworkPolicy": true, "ipPoolType": "calico"}
            }"#,
        )
        .unwrap();

        assert!(options.service_mesh_enabled);
        assert_eq!(options.kubectl_image, "registry.local/kubectl:v1.30.0");
        assert!(options.multicluster.enable);
        assert_eq!(options.multicluster.host_cluster_name, "primary");
        assert!(options.network.enable_network_policy);
        assert_eq!(options.network.ip_pool_type, "calico");
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_resync_period_is_exposed_as_std_duration() {
        let options = Options::default();
        assert_eq!(options.multicluster.resync_period(), Duration::from_secs(120));
    }

    #[test]
    fn test_malformed_document_is_a_parse_error() {
        assert!(matches!(
            Options::from_json(r#"{"serviceMeshEnabled": "yes"}"#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_multicluster_needs_a_host_name() {
        let options =
            Options::from_json(r#"{"multicluster": {"enable": true, "hostClusterName": ""}}"#)
                .unwrap();
        assert!(matches!(options.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_ip_pool_backend_parse() {
        assert_eq!(IpPoolBackend::parse("calico"), Some(IpPoolBackend::Calico));
        assert_eq!(IpPoolBackend::parse("none"), None);
        assert_eq!(IpPoolBackend::parse("Calico"), None);
        assert_eq!(IpPoolBackend::parse(""), None);
    }
}

mod activation_plan_tests {
    use ks_controller_manager::{ActivationPlan, ControllerName, Options};

    #[test]
    fn test_service_mesh_gates_both_mesh_controllers() {
        let options = Options::from_json(r#"{"serviceMeshEnabled": true}"#).unwrap();
        let plan = ActivationPlan::resolve(&options);
        assert!(plan.is_enabled(ControllerName::VirtualService));
        assert!(plan.is_enabled(ControllerName::DestinationRule));
        assert!(!plan.is_enabled(ControllerName::Cluster));
    }

    #[test]
    fn test_unknown_ip_pool_type_leaves_ippool_off() {
        let options = Options::from_json(r#"{"network": {"ipPoolType": "flannel"}}"#).unwrap();
        let plan = ActivationPlan::resolve(&options);
        assert!(!plan.is_enabled(ControllerName::IpPool));
    }

    #[test]
    fn test_multicluster_enables_three_controllers() {
        let base = ActivationPlan::resolve(&Options::default()).enabled_names();
        let options = Options::from_json(r#"{"multicluster": {"enable": true}}"#).unwrap();
        let plan = ActivationPlan::resolve(&options);

        assert!(plan.multicluster());
        assert_eq!(plan.enabled_names().len(), base.len() + 3);
    }
}

mod federation_tests {
    use ks_controller_manager::federation::{FEDERATION_GROUP, FederatedKind};

    #[test]
    fn test_kinds_in_build_order() {
        assert_eq!(
            FederatedKind::ALL,
            [
                FederatedKind::User,
                FederatedKind::GlobalRole,
                FederatedKind::GlobalRoleBinding,
            ]
        );
    }

    #[test]
    fn test_gvk() {
        let gvk = FederatedKind::User.gvk();
        assert_eq!(gvk.group, FEDERATION_GROUP);
        assert_eq!(gvk.kind, "FederatedUser");
        assert_eq!(FederatedKind::GlobalRole.plural(), "federatedglobalroles");
    }
}

mod network_tests {
    use ks_controller_manager::controller::network::{IpPoolProvider, ProviderError};
    use ks_controller_manager::options::{CalicoOptions, IpPoolBackend};

    #[test]
    fn test_default_calico_options_build() {
        let provider = IpPoolProvider::new("calico", &CalicoOptions::default()).unwrap();
        assert_eq!(provider.map(|p| p.backend()), Some(IpPoolBackend::Calico));
    }

    #[test]
    fn test_unknown_backend_has_no_provider() {
        let provider = IpPoolProvider::new("none", &CalicoOptions::default()).unwrap();
        assert!(provider.is_none());
    }

    #[test]
    fn test_unsupported_mode() {
        let calico = CalicoOptions {
            ipip_mode: "Sometimes".to_string(),
            ..CalicoOptions::default()
        };
        assert_eq!(
            IpPoolProvider::new("calico", &calico).err(),
            Some(ProviderError::UnsupportedMode {
                field: "ipip",
                value: "Sometimes".to_string(),
            })
        );
    }
}

mod bootstrap_state_tests {
    use ks_controller_manager::bootstrap::{BootstrapEvent, BootstrapPhase, BootstrapStateMachine};

    #[test]
    fn test_every_working_phase_can_fail() {
        let sm = BootstrapStateMachine;
        for phase in [
            BootstrapPhase::BuildingFederationCaches,
            BootstrapPhase::ConstructingControllers,
            BootstrapPhase::Registering,
        ] {
            assert!(sm.can_transition(phase, BootstrapEvent::ErrorEncountered), "{phase}");
        }
    }

    #[test]
    fn test_not_started_only_begins() {
        let sm = BootstrapStateMachine;
        assert_eq!(
            sm.valid_events(BootstrapPhase::NotStarted),
            vec![BootstrapEvent::Begin]
        );
    }
}
