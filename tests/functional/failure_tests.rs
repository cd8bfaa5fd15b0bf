//! Bootstrap runs that fail, and what the manager saw before the failure.

use ks_controller_manager::bootstrap::{Bootstrap, BootstrapError, BootstrapPhase};
use ks_controller_manager::controller::network::ProviderError;
use ks_controller_manager::controller::notification::NotificationError;
use ks_controller_manager::federation::{FederatedKind, ResourceClientError};
use ks_controller_manager::options::ConfigError;
use ks_controller_manager::{ControllerName, Manager, ManagerError};

use crate::mock_manager::{Harness, RecordingManager, ScriptedClientBuilder, options};

#[tokio::test]
async fn test_second_federated_client_failure_registers_nothing() {
    let mut harness = Harness::new(ScriptedClientBuilder::failing_on(FederatedKind::GlobalRole));
    let mut bootstrap = Bootstrap::new();

    let err = harness
        .run_with(&mut bootstrap, &options(r#"{"multicluster": {"enable": true}}"#))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        BootstrapError::FederatedClient(ResourceClientError::NotServed(FederatedKind::GlobalRole))
    ));
    assert_eq!(harness.manager.add_calls, 0);
    // The third client is never attempted
    assert_eq!(
        harness.builder_calls(),
        vec![FederatedKind::User, FederatedKind::GlobalRole]
    );
    assert_eq!(bootstrap.phase(), BootstrapPhase::Failed);
}

#[tokio::test]
async fn test_federation_failure_is_ignored_without_multicluster() {
    let mut harness = Harness::new(ScriptedClientBuilder::failing_on(FederatedKind::User));
    harness.run(&options("{}")).await.unwrap();
    assert!(harness.builder_calls().is_empty());
}

#[tokio::test]
async fn test_registration_failure_keeps_earlier_registrations() {
    let mut harness = Harness::with_manager(
        RecordingManager::rejecting(ControllerName::User),
        ScriptedClientBuilder::succeeding(),
    );
    let mut bootstrap = Bootstrap::new();

    let err = harness
        .run_with(&mut bootstrap, &options("{}"))
        .await
        .unwrap_err();
    let shown = err.to_string();

    match err {
        BootstrapError::Registration { name, source } => {
            assert_eq!(name, ControllerName::User);
            // The manager's error reaches the caller unwrapped
            assert_eq!(shown, source.to_string());
            assert!(matches!(source, ManagerError::AlreadyStarted(ControllerName::User)));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(bootstrap.phase(), BootstrapPhase::Failed);
    assert_eq!(
        harness.manager.added,
        vec![
            ControllerName::Job,
            ControllerName::StorageCapability,
            ControllerName::VolumeSnapshot,
        ]
    );
    // The walk stopped at the rejected entry
    assert_eq!(harness.manager.add_calls, 4);
}

#[tokio::test]
async fn test_invalid_network_policy_namespace_is_fatal() {
    let mut harness = Harness::new(ScriptedClientBuilder::succeeding());
    let mut bootstrap = Bootstrap::new();
    let err = harness
        .run_with(
            &mut bootstrap,
            &options(
                r#"{"network": {
                "enableNetworkPolicy": true,
                "nsnpOptions": {"allowedIngressNamespaces": ["Not A Namespace"]}
            }}"#,
            ),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        BootstrapError::Provider {
            name: ControllerName::NamespaceNetworkPolicy,
            source: ProviderError::InvalidNamespace(_),
        }
    ));
    assert_eq!(harness.manager.add_calls, 0);
    assert_eq!(bootstrap.phase(), BootstrapPhase::Failed);
}

#[tokio::test]
async fn test_zero_resync_period_fails_before_any_work() {
    let mut harness = Harness::new(ScriptedClientBuilder::succeeding());
    let mut bootstrap = Bootstrap::new();

    let err = harness
        .run_with(
            &mut bootstrap,
            &options(r#"{"multicluster": {"enable": true, "clusterControllerResyncPeriod": "0s"}}"#),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, BootstrapError::Config(ConfigError::Invalid(_))));
    assert_eq!(harness.manager.add_calls, 0);
    assert!(harness.builder_calls().is_empty());
    assert_eq!(bootstrap.phase(), BootstrapPhase::Failed);
}

#[tokio::test]
async fn test_invalid_namespace_is_ignored_when_network_policy_off() {
    let mut harness = Harness::new(ScriptedClientBuilder::succeeding());
    let report = harness
        .run(&options(
            r#"{"network": {"nsnpOptions": {"allowedIngressNamespaces": ["Not A Namespace"]}}}"#,
        ))
        .await
        .unwrap();
    assert!(report.skipped.contains(&ControllerName::NamespaceNetworkPolicy));
}

#[tokio::test]
async fn test_misconfigured_calico_is_fatal() {
    let mut harness = Harness::new(ScriptedClientBuilder::succeeding());
    let err = harness
        .run(&options(
            r#"{"network": {"ipPoolType": "calico", "calico": {"ipipMode": "Always", "vxlanMode": "Always"}}}"#,
        ))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        BootstrapError::Provider {
            name: ControllerName::IpPool,
            source: ProviderError::ConflictingEncapsulation,
        }
    ));
    assert_eq!(harness.manager.add_calls, 0);
}

#[tokio::test]
async fn test_unknown_ip_pool_backend_is_skipped() {
    let mut harness = Harness::new(ScriptedClientBuilder::succeeding());
    let report = harness
        .run(&options(
            r#"{"network": {"ipPoolType": "macvlan", "calico": {"ipipMode": "Always", "vxlanMode": "Always"}}}"#,
        ))
        .await
        .unwrap();
    assert!(report.skipped.contains(&ControllerName::IpPool));
}

#[tokio::test]
async fn test_notification_needs_an_unstarted_manager_cache() {
    let manager = RecordingManager::new();
    let (trigger, shutdown) = ks_controller_manager::shutdown::channel();
    manager.cache().start(&shutdown);

    let mut harness = Harness::with_manager(manager, ScriptedClientBuilder::succeeding());
    let err = harness
        .run(&options(r#"{"multicluster": {"enable": true}}"#))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        BootstrapError::Notification(NotificationError::CacheStarted { family: "manager" })
    ));
    assert_eq!(harness.manager.add_calls, 0);
    trigger.trigger();
}
