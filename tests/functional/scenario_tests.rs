//! Bootstrap runs that succeed.

use std::collections::BTreeSet;

use ks_controller_manager::{ControllerName, Manager};
use ks_controller_manager::bootstrap::{Bootstrap, BootstrapPhase};
use ks_controller_manager::federation::FederatedKind;

use crate::mock_manager::{Harness, ScriptedClientBuilder, options};

fn set(names: &[ControllerName]) -> BTreeSet<ControllerName> {
    names.iter().copied().collect()
}

#[tokio::test]
async fn test_all_optional_capabilities_off() {
    let mut harness = Harness::new(ScriptedClientBuilder::succeeding());
    let report = harness
        .run(&options(r#"{"network": {"ipPoolType": "none"}}"#))
        .await
        .unwrap();

    assert_eq!(
        set(&harness.manager.added),
        set(&[
            ControllerName::Job,
            ControllerName::StorageCapability,
            ControllerName::VolumeSnapshot,
            ControllerName::User,
            ControllerName::LoginRecord,
            ControllerName::CertificateSigningRequest,
            ControllerName::ClusterRoleBinding,
            ControllerName::GlobalRoleBinding,
            ControllerName::GroupBinding,
            ControllerName::Group,
        ])
    );
    for absent in [
        ControllerName::VirtualService,
        ControllerName::DestinationRule,
        ControllerName::Cluster,
        ControllerName::NamespaceNetworkPolicy,
        ControllerName::IpPool,
        ControllerName::GlobalRole,
        ControllerName::Notification,
    ] {
        assert!(!harness.manager.added.contains(&absent), "{absent} registered");
    }

    // Multi-cluster only entries are not even in the registry
    assert_eq!(
        set(&report.skipped),
        set(&[
            ControllerName::VirtualService,
            ControllerName::DestinationRule,
            ControllerName::Cluster,
            ControllerName::NamespaceNetworkPolicy,
            ControllerName::IpPool,
        ])
    );
    assert!(harness.builder_calls().is_empty());
    assert_eq!(harness.manager.add_calls, harness.manager.added.len());
}

#[tokio::test]
async fn test_service_mesh_controllers_share_one_informer_set() {
    let mut harness = Harness::new(ScriptedClientBuilder::succeeding());
    harness
        .run(&options(r#"{"serviceMeshEnabled": true}"#))
        .await
        .unwrap();

    assert!(harness.manager.added.contains(&ControllerName::VirtualService));
    assert!(harness.manager.added.contains(&ControllerName::DestinationRule));
    // VirtualService and DestinationRule, the latter shared by both controllers
    assert_eq!(harness.informers.istio.informer_count(), 2);
}

#[tokio::test]
async fn test_service_mesh_off_requests_no_istio_informers() {
    let mut harness = Harness::new(ScriptedClientBuilder::succeeding());
    harness.run(&options("{}")).await.unwrap();
    assert_eq!(harness.informers.istio.informer_count(), 0);
}

#[tokio::test]
async fn test_multicluster_registers_everything_federated() {
    let mut harness = Harness::new(ScriptedClientBuilder::succeeding());
    let report = harness
        .run(&options(r#"{"multicluster": {"enable": true}}"#))
        .await
        .unwrap();

    assert_eq!(harness.builder_calls(), FederatedKind::ALL.to_vec());
    for name in [
        ControllerName::Cluster,
        ControllerName::GlobalRole,
        ControllerName::Notification,
    ] {
        assert!(harness.manager.added.contains(&name), "{name} missing");
    }
    // Appended after the base set
    assert_eq!(
        harness.manager.added[harness.manager.added.len() - 2..],
        [ControllerName::GlobalRole, ControllerName::Notification]
    );
    // Notification informs through the manager's cache, not the shared factories
    assert_eq!(harness.manager.cache().informer_count(), 1);
    assert_eq!(report.registered, harness.manager.added);
}

#[tokio::test]
async fn test_every_capability_on() {
    let mut harness = Harness::new(ScriptedClientBuilder::succeeding());
    let report = harness
        .run(&options(
            r#"{
                "serviceMeshEnabled": true,
                "multicluster": {"enable": true},
                "network": {
                    "enableNetworkPolicy": true,
                    "ipPoolType": "calico",
                    "nsnpOptions": {"allowedIngressNamespaces": ["kubesphere-system"]}
                }
            }"#,
        ))
        .await
        .unwrap();

    assert_eq!(set(&report.registered), set(&ControllerName::ALL));
    assert!(report.skipped.is_empty());
}

#[tokio::test]
async fn test_identical_inputs_give_identical_registries() {
    let opts = options(r#"{"serviceMeshEnabled": true, "network": {"ipPoolType": "calico"}}"#);

    let mut first = Harness::new(ScriptedClientBuilder::succeeding());
    let mut second = Harness::new(ScriptedClientBuilder::succeeding());
    let a = first.run(&opts).await.unwrap();
    let b = second.run(&opts).await.unwrap();

    assert_eq!(set(&a.registered), set(&b.registered));
    assert_eq!(set(&a.skipped), set(&b.skipped));
}

#[tokio::test]
async fn test_bootstrap_reaches_completed_once() {
    let mut harness = Harness::new(ScriptedClientBuilder::succeeding());
    let mut bootstrap = Bootstrap::new();
    assert_eq!(bootstrap.phase(), BootstrapPhase::NotStarted);

    harness.run_with(&mut bootstrap, &options("{}")).await.unwrap();
    assert_eq!(bootstrap.phase(), BootstrapPhase::Completed);

    let added = harness.manager.add_calls;
    assert!(harness.run_with(&mut bootstrap, &options("{}")).await.is_err());
    assert_eq!(harness.manager.add_calls, added);
    assert_eq!(bootstrap.phase(), BootstrapPhase::Completed);
}
