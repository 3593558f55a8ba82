use std::{fmt, net::IpAddr, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    error::Error,
    names::{ClusterName, SubnetName},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudProvider {
    Aws,
    Gce,
    Azure,
    #[serde(rename = "digitalocean")]
    DigitalOcean,
    Hetzner,
    Openstack,
    Scaleway,
}

impl CloudProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloudProvider::Aws => "aws",
            CloudProvider::Gce => "gce",
            CloudProvider::Azure => "azure",
            CloudProvider::DigitalOcean => "digitalocean",
            CloudProvider::Hetzner => "hetzner",
            CloudProvider::Openstack => "openstack",
            CloudProvider::Scaleway => "scaleway",
        }
    }
}

impl fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CloudProvider {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "aws" => Ok(CloudProvider::Aws),
            "gce" => Ok(CloudProvider::Gce),
            "azure" => Ok(CloudProvider::Azure),
            "digitalocean" | "do" => Ok(CloudProvider::DigitalOcean),
            "hetzner" => Ok(CloudProvider::Hetzner),
            "openstack" => Ok(CloudProvider::Openstack),
            "scaleway" => Ok(CloudProvider::Scaleway),
            _ => Err(Error::InvalidName {
                kind: "cloud provider",
                name: value.to_string(),
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum SubnetType {
    Public,
    Private,
    Utility,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SubnetSpec {
    pub name: SubnetName,
    pub zone: String,
    #[serde(rename = "type")]
    pub subnet_type: SubnetType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidr: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EtcdMemberSpec {
    pub name: String,
    pub instance_group: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EtcdClusterSpec {
    pub name: String,
    pub members: Vec<EtcdMemberSpec>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DnsMode {
    Gossip,
    None,
    External,
    #[default]
    Managed,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NetworkingPlugin {
    #[default]
    Kubenet,
    Cni,
    Calico,
    Cilium,
    AmazonVpc,
    GceNative,
}

// The wire casing follows kops (`CIDR`/`ID`/`IP` stay uppercase), which
// `rename_all` alone cannot produce.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NetworkingSpec {
    #[serde(default)]
    pub plugin: NetworkingPlugin,
    #[serde(default, rename = "networkID", skip_serializing_if = "Option::is_none")]
    pub network_id: Option<String>,
    #[serde(default, rename = "networkCIDR", skip_serializing_if = "Option::is_none")]
    pub network_cidr: Option<String>,
    #[serde(
        default,
        rename = "additionalNetworkCIDRs",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub additional_network_cidrs: Vec<String>,
    #[serde(
        default,
        rename = "nonMasqueradeCIDR",
        skip_serializing_if = "Option::is_none"
    )]
    pub non_masquerade_cidr: Option<String>,
    #[serde(
        default,
        rename = "serviceClusterIPRange",
        skip_serializing_if = "Option::is_none"
    )]
    pub service_cluster_ip_range: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subnets: Vec<SubnetSpec>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerRuntime {
    Containerd,
    Crio,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ContainerRuntimeSpec {
    pub runtime: ContainerRuntime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Pinned download URL; requires `hash` to be set as well.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl Default for ContainerRuntimeSpec {
    fn default() -> Self {
        Self {
            runtime: ContainerRuntime::Containerd,
            version: None,
            url: None,
            hash: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct KubeDnsConfig {
    #[serde(default, rename = "serverIP", skip_serializing_if = "Option::is_none")]
    pub server_ip: Option<IpAddr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EgressProxySpec {
    pub host: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub proxy_excludes: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WarmPoolSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_size: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<i32>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AssetsLocationSpec {
    /// User-controlled VFS root that file assets are mirrored into.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_repository: Option<String>,
    /// User-controlled registry that image assets are mirrored into.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_registry: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AddonSpec {
    pub manifest: String,
}

/// How the user references a DNS zone: by provider id or by zone name.
/// Untagged so the wire form is a plain `{id: ...}` / `{name: ...}` map.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DnsZoneRef {
    Id { id: String },
    Name { name: String },
}

/// Per-component config; only the cross-checked field is modeled here.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_provider: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ClusterSpec {
    pub cloud_provider: CloudProvider,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubernetes_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_store: Option<String>,
    #[serde(default)]
    pub networking: NetworkingSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_public_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_zone: Option<DnsZoneRef>,
    #[serde(default)]
    pub dns: DnsMode,
    #[serde(default, rename = "kubeDNS")]
    pub kube_dns: KubeDnsConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub etcd_clusters: Vec<EtcdClusterSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addons: Vec<AddonSpec>,
    #[serde(default)]
    pub container_runtime: ContainerRuntimeSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warm_pool: Option<WarmPoolSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub egress_proxy: Option<EgressProxySpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assets: Option<AssetsLocationSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_api_server: Option<ComponentConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_controller_manager: Option<ComponentConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubelet: Option<ComponentConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_kubelet: Option<ComponentConfig>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Cluster {
    pub name: ClusterName,
    pub spec: ClusterSpec,
}

impl Cluster {
    pub fn uses_gossip(&self) -> bool {
        self.spec.dns == DnsMode::Gossip
    }

    pub fn uses_none_dns(&self) -> bool {
        self.spec.dns == DnsMode::None
    }

    pub fn master_internal_name(&self) -> String {
        format!("api.internal.{}", self.name)
    }

    pub fn kops_controller_internal_name(&self) -> String {
        format!("kops-controller.internal.{}", self.name)
    }

    pub fn dns_domain(&self) -> &str {
        self.spec
            .kube_dns
            .domain
            .as_deref()
            .unwrap_or("cluster.local")
    }

    /// Whether nodes fetch their full config from kops-controller instead of
    /// reading the config store directly.
    pub fn use_kops_controller_for_node_config(&self) -> bool {
        if self.uses_none_dns() {
            return true;
        }
        matches!(
            self.spec.cloud_provider,
            CloudProvider::Aws
                | CloudProvider::Gce
                | CloudProvider::Hetzner
                | CloudProvider::Openstack
                | CloudProvider::Scaleway
                | CloudProvider::DigitalOcean
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_cluster_yaml() -> &'static str {
        r#"
name: c1.example.com
spec:
  cloudProvider: aws
  kubernetesVersion: 1.28.3
  networking:
    networkCIDR: 10.0.0.0/16
    subnets:
      - name: us-east-1a
        zone: us-east-1a
        type: Public
"#
    }

    #[test]
    fn deserializes_minimal_cluster() {
        let cluster: Cluster = serde_yaml::from_str(minimal_cluster_yaml()).unwrap();
        assert_eq!(cluster.name.as_str(), "c1.example.com");
        assert_eq!(cluster.spec.cloud_provider, CloudProvider::Aws);
        assert_eq!(cluster.spec.networking.subnets.len(), 1);
        assert_eq!(cluster.spec.dns, DnsMode::Managed);
    }

    #[test]
    fn derived_names() {
        let cluster: Cluster = serde_yaml::from_str(minimal_cluster_yaml()).unwrap();
        assert_eq!(cluster.master_internal_name(), "api.internal.c1.example.com");
        assert_eq!(
            cluster.kops_controller_internal_name(),
            "kops-controller.internal.c1.example.com"
        );
        assert_eq!(cluster.dns_domain(), "cluster.local");
    }

    #[test]
    fn kops_controller_node_config_rules() {
        let mut cluster: Cluster = serde_yaml::from_str(minimal_cluster_yaml()).unwrap();
        assert!(cluster.use_kops_controller_for_node_config());
        cluster.spec.cloud_provider = CloudProvider::Azure;
        assert!(!cluster.use_kops_controller_for_node_config());
        cluster.spec.dns = DnsMode::None;
        assert!(cluster.use_kops_controller_for_node_config());
    }

    #[test]
    fn networking_wire_casing_round_trips() {
        let yaml = r#"
name: c1.example.com
spec:
  cloudProvider: aws
  networking:
    networkID: vpc-12345
    networkCIDR: 10.0.0.0/16
    additionalNetworkCIDRs:
      - 10.1.0.0/16
    nonMasqueradeCIDR: 100.64.0.0/10
    serviceClusterIPRange: 100.64.0.0/13
  kubeDNS:
    serverIP: 100.64.0.10
"#;
        let cluster: Cluster = serde_yaml::from_str(yaml).unwrap();
        let networking = &cluster.spec.networking;
        assert_eq!(networking.network_id.as_deref(), Some("vpc-12345"));
        assert_eq!(networking.network_cidr.as_deref(), Some("10.0.0.0/16"));
        assert_eq!(networking.additional_network_cidrs, ["10.1.0.0/16"]);
        assert_eq!(
            networking.non_masquerade_cidr.as_deref(),
            Some("100.64.0.0/10")
        );
        assert_eq!(
            networking.service_cluster_ip_range.as_deref(),
            Some("100.64.0.0/13")
        );
        assert_eq!(
            cluster.spec.kube_dns.server_ip,
            Some("100.64.0.10".parse::<IpAddr>().unwrap())
        );

        let rendered = serde_yaml::to_string(&cluster).unwrap();
        for field in [
            "networkID",
            "networkCIDR",
            "additionalNetworkCIDRs",
            "nonMasqueradeCIDR",
            "serviceClusterIPRange",
            "serverIP",
        ] {
            assert!(rendered.contains(field), "missing `{field}` in: {rendered}");
        }
    }

    #[test]
    fn rejects_unknown_fields() {
        let yaml = r#"
name: c1.example.com
spec:
  cloudProvider: aws
  bogus: field
"#;
        assert!(serde_yaml::from_str::<Cluster>(yaml).is_err());
    }
}
