//! Data model for the cluster lifecycle engine: cluster and instance-group
//! specifications, the Kubernetes version wrapper, and the invariants a
//! completed spec must satisfy.

pub mod cluster;
pub mod error;
pub mod instancegroup;
mod names;
pub mod validation;
pub mod version;

pub use cluster::{
    AddonSpec, AssetsLocationSpec, CloudProvider, Cluster, ClusterSpec, ComponentConfig,
    ContainerRuntime, ContainerRuntimeSpec, DnsMode, DnsZoneRef, EgressProxySpec, EtcdClusterSpec,
    EtcdMemberSpec, KubeDnsConfig, NetworkingPlugin, NetworkingSpec, SubnetSpec, SubnetType,
    WarmPoolSpec,
};
pub use error::Error;
pub use instancegroup::{InstanceGroup, InstanceGroupRole, InstanceGroupSpec};
pub use names::{ClusterName, InstanceGroupName, SubnetName};
pub use validation::{parse_cidr, validate_cluster};
pub use version::KubernetesVersion;
