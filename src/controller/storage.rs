//! Storage controllers.
//!
//! `storagecapability-controller` annotates StorageClasses with what their
//! CSI driver supports. `volumesnapshot-controller` keeps one
//! VolumeSnapshotClass per snapshot-capable StorageClass.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use k8s_openapi::api::storage::v1::{CSIDriver, StorageClass};
use tracing::debug;

use super::worker::{DEFAULT_RESYNC, run_sync_loop};
use super::{Activation, ControllerName, Result, Runnable};
use crate::crd::VolumeSnapshotClass;
use crate::informers::{Informer, InformerFactory};
use crate::shutdown::Shutdown;

pub const ALLOW_SNAPSHOT_ANNOTATION: &str = "storageclass.kubesphere.io/allow-snapshot";
pub const ALLOW_CLONE_ANNOTATION: &str = "storageclass.kubesphere.io/allow-clone";

/// Whether the StorageClass's provisioner has a registered CSIDriver.
pub fn is_csi_backed(class: &StorageClass, drivers: &[Arc<CSIDriver>]) -> bool {
    drivers
        .iter()
        .any(|d| d.metadata.name.as_deref() == Some(class.provisioner.as_str()))
}

/// StorageClass names allowing snapshots but with no VolumeSnapshotClass yet.
///
/// A snapshot class is matched to a storage class by name.
pub fn missing_snapshot_classes(
    classes: &[Arc<StorageClass>],
    snapshot_classes: &[Arc<VolumeSnapshotClass>],
) -> Vec<String> {
    let existing: BTreeSet<&str> = snapshot_classes
        .iter()
        .filter_map(|c| c.metadata.name.as_deref())
        .collect();
    classes
        .iter()
        .filter(|c| {
            c.metadata
                .annotations
                .as_ref()
                .and_then(|a| a.get(ALLOW_SNAPSHOT_ANNOTATION))
                .is_none_or(|v| v != "false")
        })
        .filter_map(|c| c.metadata.name.clone())
        .filter(|name| !existing.contains(name.as_str()))
        .collect()
}

pub struct StorageCapabilityController {
    storage_classes: Arc<Informer<StorageClass>>,
    csi_drivers: Arc<Informer<CSIDriver>>,
}

impl Runnable for StorageCapabilityController {
    fn start(self: Box<Self>, shutdown: Shutdown) -> BoxFuture<'static, Result<()>> {
        let caches = vec![
            self.storage_classes.wait_until_synced(),
            self.csi_drivers.wait_until_synced(),
        ];
        let classes = self.storage_classes.store();
        let drivers = self.csi_drivers.store();
        run_sync_loop(
            ControllerName::StorageCapability,
            caches,
            DEFAULT_RESYNC,
            shutdown,
            move || {
                let drivers = drivers.state();
                let classes = classes.state();
                let csi = classes
                    .iter()
                    .filter(|c| is_csi_backed(c, &drivers))
                    .count();
                debug!(
                    storage_classes = classes.len(),
                    csi_backed = csi,
                    "Storage capability resync"
                );
            },
        )
        .boxed()
    }
}

pub fn storage_capability_controller(kubernetes: &InformerFactory) -> Activation {
    Activation::enabled(StorageCapabilityController {
        storage_classes: kubernetes.informer(),
        csi_drivers: kubernetes.informer(),
    })
}

pub struct VolumeSnapshotController {
    storage_classes: Arc<Informer<StorageClass>>,
    snapshot_classes: Arc<Informer<VolumeSnapshotClass>>,
}

impl Runnable for VolumeSnapshotController {
    fn start(self: Box<Self>, shutdown: Shutdown) -> BoxFuture<'static, Result<()>> {
        let caches = vec![
            self.storage_classes.wait_until_synced(),
            self.snapshot_classes.wait_until_synced(),
        ];
        let classes = self.storage_classes.store();
        let snapshot_classes = self.snapshot_classes.store();
        run_sync_loop(
            ControllerName::VolumeSnapshot,
            caches,
            DEFAULT_RESYNC,
            shutdown,
            move || {
                let missing = missing_snapshot_classes(&classes.state(), &snapshot_classes.state());
                if !missing.is_empty() {
                    debug!(?missing, "Storage classes without a snapshot class");
                }
            },
        )
        .boxed()
    }
}

pub fn volume_snapshot_controller(
    kubernetes: &InformerFactory,
    snapshot: &InformerFactory,
) -> Activation {
    Activation::enabled(VolumeSnapshotController {
        storage_classes: kubernetes.informer(),
        snapshot_classes: snapshot.informer(),
    })
}
