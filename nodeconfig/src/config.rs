use std::{collections::BTreeMap, net::IpAddr};

use keel_api::InstanceGroupRole;
use keel_assets::Architecture;
use serde::{Deserialize, Serialize};

/// Where a booting node fetches its full config from when kops-controller
/// serves node config.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigServerOptions {
    /// `https://<host>:<port>/` endpoints, tried in order.
    pub servers: Vec<String>,
    /// The CA bundle the node uses to verify the config server.
    pub ca_certificates: String,
}

/// Reference to a static pod manifest the node writes before the kubelet
/// starts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticManifestRef {
    pub key: String,
    pub path: String,
}

/// An opaque file the node writes verbatim.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAssetRef {
    pub path: String,
    pub content: String,
}

/// The preamble baked into a node's boot script. It carries just enough to
/// fetch the full [`NodeUpConfig`]: either a config store path or the
/// config-server endpoints, plus the API server addresses for clusters that
/// cannot rely on DNS at first boot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootConfig {
    pub cluster_name: String,
    pub instance_group_name: String,
    pub instance_group_role: InstanceGroupRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_base: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_server: Option<ConfigServerOptions>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub api_server_ips: Vec<IpAddr>,
}

/// Everything a node bootstrap agent needs to turn a blank VM into a member
/// of the cluster. Emitted once per instance group and never mutated after.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeUpConfig {
    /// Per-architecture asset strings, `<hash>@<url1>,<url2>,…`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub assets: BTreeMap<Architecture, Vec<String>>,
    /// Image references to preload, download form.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    /// CA bundles by keyset name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cas: BTreeMap<String, String>,
    /// Primary key-pair id by keyset name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub keypair_ids: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub static_manifests: Vec<StaticManifestRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub file_assets: Vec<FileAssetRef>,
    /// Addon channel locations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub channels: Vec<String>,
    /// Paths to the etcd static pod manifests this group runs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub etcd_manifests: Vec<String>,
    /// Names of the etcd clusters whose members live on this group.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub etcd_cluster_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warm_pool_images: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_config_hash: Option<String>,
    /// Verification keys for service-account tokens; API servers only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service_account_public_keys: Vec<String>,
    /// Extra addresses the API server answers on; API-server roles only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub api_server_additional_ips: Vec<IpAddr>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_collections_are_omitted_from_yaml() {
        let config = NodeUpConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(!yaml.contains("assets"));
        assert!(!yaml.contains("warmPoolImages"));
    }

    #[test]
    fn boot_config_round_trips() {
        let boot = BootConfig {
            cluster_name: "c1.example.com".to_string(),
            instance_group_name: "nodes".to_string(),
            instance_group_role: InstanceGroupRole::Node,
            config_base: None,
            config_server: Some(ConfigServerOptions {
                servers: vec!["https://kops-controller.internal.c1.example.com:3988/".to_string()],
                ca_certificates: "-----BEGIN CERTIFICATE-----\n...\n-----END CERTIFICATE-----\n"
                    .to_string(),
            }),
            api_server_ips: vec!["172.20.1.10".parse().unwrap()],
        };
        let yaml = serde_yaml::to_string(&boot).unwrap();
        let back: BootConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, boot);
    }
}
