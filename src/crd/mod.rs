//! Resource types watched by the controller manager.
//!
//! - `iam`: users, login records, global roles, groups and their bindings
//! - `servicemesh`: Istio traffic objects and KubeSphere mesh strategies
//! - `network`: namespaced network policies and IP pools
//! - `cluster`: member clusters
//! - `tenant`: workspaces
//! - `snapshot`: CSI volume snapshot classes

mod cluster;
mod iam;
mod network;
mod servicemesh;
mod snapshot;
mod tenant;

pub use cluster::*;
pub use iam::*;
pub use network::*;
pub use servicemesh::*;
pub use snapshot::*;
pub use tenant::*;
