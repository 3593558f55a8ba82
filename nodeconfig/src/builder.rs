use std::{
    collections::BTreeMap,
    net::IpAddr,
};

use bon::Builder;
use ipnet::IpNet;
use keel_api::{Cluster, CloudProvider, InstanceGroup, InstanceGroupRole};
use keel_assets::{Architecture, AssetBuilder};
use tracing::debug;

use crate::{
    Error,
    config::{BootConfig, ConfigServerOptions, FileAssetRef, NodeUpConfig, StaticManifestRef},
    keyset::Keysets,
};

pub const KOPS_CONTROLLER_PORT: u16 = 3988;

/// Hostnames whose addresses the surrounding driver discovers ahead of a
/// builder run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum WellKnownService {
    KubeApiServer,
    KopsController,
}

/// Candidate addresses per well-known service, unfiltered.
#[derive(Clone, Debug, Default)]
pub struct WellKnownAddresses {
    map: BTreeMap<WellKnownService, Vec<IpAddr>>,
}

impl WellKnownAddresses {
    pub fn insert(&mut self, service: WellKnownService, addresses: Vec<IpAddr>) {
        self.map.insert(service, addresses);
    }

    pub fn get(&self, service: WellKnownService) -> &[IpAddr] {
        self.map.get(&service).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Image prefixes preloaded onto warm-pool instances unless the cluster
/// overrides the set.
pub fn default_warm_pool_prefixes() -> Vec<String> {
    [
        "registry.k8s.io/kube-proxy:",
        "registry.k8s.io/provider-aws/",
        "quay.io/calico/",
        "docker.io/cilium/",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

/// Kops binaries the boot script handles itself; they never appear in the
/// node's asset list.
const BOOTSTRAP_ONLY_ASSETS: &[&str] = &["nodeup"];
/// Binaries only the control plane (or every node of a gossip cluster)
/// needs.
const CONTROL_PLANE_BINARIES: &[&str] = &["protokube", "channels"];

/// Builds the per-instance-group bootstrap payload from a completed cluster,
/// its collected assets, and a materialized keyset snapshot.
#[derive(Builder)]
#[builder(on(String, into))]
pub struct NodeUpConfigBuilder<'a> {
    cluster: &'a Cluster,
    assets: &'a AssetBuilder<'a>,
    keysets: &'a Keysets,
    /// VFS path to the cluster's config store root.
    config_base: String,
    encryption_config_hash: Option<String>,
    #[builder(default = default_warm_pool_prefixes())]
    warm_pool_image_prefixes: Vec<String>,
}

impl<'a> NodeUpConfigBuilder<'a> {
    pub fn build_for(
        &self,
        ig: &InstanceGroup,
        addresses: &WellKnownAddresses,
    ) -> Result<(NodeUpConfig, BootConfig), Error> {
        let role = ig.spec.role;
        if role == InstanceGroupRole::Bastion {
            return Err(Error::RoleUnknown {
                name: ig.name.to_string(),
                role: role.to_string(),
            });
        }
        debug!(instance_group = %ig.name, %role, "building node config");

        let mut config = NodeUpConfig {
            assets: self.architecture_assets(role),
            images: self
                .assets
                .images_for_role(role)
                .iter()
                .map(|image| image.download.to_string())
                .collect(),
            static_manifests: self
                .assets
                .manifests_for_role(role)
                .iter()
                .map(|m| StaticManifestRef {
                    key: m.key.clone(),
                    path: m.path.clone(),
                })
                .collect(),
            file_assets: self
                .assets
                .files_for_role(role)
                .iter()
                .map(|f| FileAssetRef {
                    path: f.path.clone(),
                    content: f.content.clone(),
                })
                .collect(),
            channels: self.channels(),
            packages: self.packages(ig),
            ..NodeUpConfig::default()
        };

        self.distribute_keys(role, &mut config)?;
        self.etcd_manifests(ig, &mut config);
        self.warm_pool_images(ig, &mut config);

        let api_server_ips =
            self.filter_api_server_ips(addresses.get(WellKnownService::KubeApiServer))?;
        if role.has_api_server() {
            config.api_server_additional_ips = api_server_ips.clone();
        }

        let boot = self.boot_config(ig, &api_server_ips, &mut config)?;
        Ok((config, boot))
    }

    fn architecture_assets(&self, role: InstanceGroupRole) -> BTreeMap<Architecture, Vec<String>> {
        let control_plane_binaries =
            role == InstanceGroupRole::ControlPlane || self.cluster.uses_gossip();

        let mut by_arch = BTreeMap::new();
        for arch in Architecture::ALL {
            let strings: Vec<String> = self
                .assets
                .file_assets(arch)
                .iter()
                .filter(|asset| !BOOTSTRAP_ONLY_ASSETS.contains(&asset.name.as_str()))
                .filter(|asset| {
                    control_plane_binaries
                        || !CONTROL_PLANE_BINARIES.contains(&asset.name.as_str())
                })
                .map(|asset| self.assets.mirrored(asset).compact_string())
                .collect();
            by_arch.insert(arch, strings);
        }
        by_arch
    }

    fn require_keyset(&self, name: &str) -> Result<&crate::Keyset, Error> {
        self.keysets
            .get(name)
            .ok_or_else(|| Error::KeyNotFound(name.to_string()))
    }

    fn distribute_keys(
        &self,
        role: InstanceGroupRole,
        config: &mut NodeUpConfig,
    ) -> Result<(), Error> {
        let ca = self.require_keyset("ca")?;
        config
            .cas
            .insert("ca".to_string(), ca.certificate_bundle());
        if let Some(cilium_ca) = self.keysets.get("etcd-clients-ca-cilium") {
            config.cas.insert(
                "etcd-clients-ca-cilium".to_string(),
                cilium_ca.certificate_bundle(),
            );
        }

        if role == InstanceGroupRole::ControlPlane {
            for (name, keyset) in self.keysets {
                if name.starts_with("etcd-") && name.contains("-ca") {
                    config
                        .cas
                        .insert(name.clone(), keyset.certificate_bundle());
                }
            }
            config
                .keypair_ids
                .insert("ca".to_string(), ca.primary_id().to_string());
        }

        if role.has_api_server() {
            let aggregator = self.require_keyset("apiserver-aggregator-ca")?;
            config.cas.insert(
                "apiserver-aggregator-ca".to_string(),
                aggregator.certificate_bundle(),
            );
            let service_account = self.require_keyset("service-account")?;
            config.keypair_ids.insert(
                "service-account".to_string(),
                service_account.primary_id().to_string(),
            );
            config.service_account_public_keys = service_account.public_keys();
            config.encryption_config_hash = self.encryption_config_hash.clone();
        }

        if role != InstanceGroupRole::ControlPlane {
            for name in ["kubelet", "kube-proxy", "kube-router"] {
                if let Some(keyset) = self.keysets.get(name) {
                    config
                        .keypair_ids
                        .insert(name.to_string(), keyset.primary_id().to_string());
                }
            }
        }
        Ok(())
    }

    fn etcd_manifests(&self, ig: &InstanceGroup, config: &mut NodeUpConfig) {
        if ig.spec.role != InstanceGroupRole::ControlPlane {
            return;
        }
        for etcd in &self.cluster.spec.etcd_clusters {
            for member in &etcd.members {
                if member.instance_group == ig.name.as_str() {
                    config.etcd_manifests.push(format!(
                        "manifests/etcd/{}-{}.yaml",
                        etcd.name, member.instance_group
                    ));
                    if !config.etcd_cluster_names.contains(&etcd.name) {
                        config.etcd_cluster_names.push(etcd.name.clone());
                    }
                }
            }
        }
    }

    fn warm_pool_images(&self, ig: &InstanceGroup, config: &mut NodeUpConfig) {
        if ig.spec.role == InstanceGroupRole::ControlPlane {
            return;
        }
        let enabled = ig.spec.warm_pool.is_some() || self.cluster.spec.warm_pool.is_some();
        if !enabled {
            return;
        }
        let mut images: Vec<String> = self
            .assets
            .image_assets()
            .iter()
            .map(|asset| asset.download.to_string())
            .filter(|image| {
                self.warm_pool_image_prefixes
                    .iter()
                    .any(|prefix| image.starts_with(prefix))
            })
            .collect();
        images.sort();
        images.dedup();
        config.warm_pool_images = images;
    }

    fn channels(&self) -> Vec<String> {
        let base = self.config_base.trim_end_matches('/');
        let mut channels = vec![format!("{base}/addons/bootstrap-channel.yaml")];
        for addon in &self.cluster.spec.addons {
            channels.push(addon.manifest.clone());
        }
        channels
    }

    fn packages(&self, ig: &InstanceGroup) -> Vec<String> {
        let mut packages = self.cluster.spec.packages.clone();
        for package in &ig.spec.packages {
            if !packages.contains(package) {
                packages.push(package.clone());
            }
        }
        packages
    }

    /// Applies the per-cloud reachability filter to the candidate API server
    /// addresses.
    fn filter_api_server_ips(&self, candidates: &[IpAddr]) -> Result<Vec<IpAddr>, Error> {
        match self.cluster.spec.cloud_provider {
            CloudProvider::Aws | CloudProvider::Openstack | CloudProvider::Hetzner => {
                let nets = self.network_cidrs()?;
                Ok(candidates
                    .iter()
                    .filter(|ip| match ip {
                        IpAddr::V4(_) => nets.iter().any(|net| net.contains(*ip)),
                        IpAddr::V6(_) => true,
                    })
                    .copied()
                    .collect())
            }
            CloudProvider::Gce => {
                let mut nets = Vec::new();
                for subnet in &self.cluster.spec.networking.subnets {
                    if let Some(cidr) = subnet.cidr.as_deref() {
                        nets.push(parse_net(cidr)?);
                    }
                }
                Ok(candidates
                    .iter()
                    .filter(|ip| nets.iter().any(|net| net.contains(*ip)))
                    .copied()
                    .collect())
            }
            CloudProvider::DigitalOcean | CloudProvider::Scaleway | CloudProvider::Azure => {
                Ok(candidates.to_vec())
            }
        }
    }

    fn network_cidrs(&self) -> Result<Vec<IpNet>, Error> {
        let networking = &self.cluster.spec.networking;
        let mut nets = Vec::new();
        if let Some(cidr) = networking.network_cidr.as_deref() {
            nets.push(parse_net(cidr)?);
        }
        for cidr in &networking.additional_network_cidrs {
            nets.push(parse_net(cidr)?);
        }
        Ok(nets)
    }

    fn boot_config(
        &self,
        ig: &InstanceGroup,
        api_server_ips: &[IpAddr],
        config: &mut NodeUpConfig,
    ) -> Result<BootConfig, Error> {
        let mut boot = BootConfig {
            cluster_name: self.cluster.name.to_string(),
            instance_group_name: ig.name.to_string(),
            instance_group_role: ig.spec.role,
            config_base: None,
            config_server: None,
            api_server_ips: Vec::new(),
        };

        // Clouds with a fixed floating IP expose it before DNS converges, so
        // their nodes always get explicit addresses; "none"-DNS clusters have
        // nothing but the addresses.
        if self.cluster.uses_none_dns() {
            if api_server_ips.is_empty() {
                return Err(Error::DnsModeUnsupported {
                    cloud: self.cluster.spec.cloud_provider.to_string(),
                });
            }
            boot.api_server_ips = api_server_ips.to_vec();
        } else if matches!(
            self.cluster.spec.cloud_provider,
            CloudProvider::Hetzner | CloudProvider::Scaleway | CloudProvider::DigitalOcean
        ) {
            boot.api_server_ips = api_server_ips.to_vec();
        }

        let use_config_server =
            self.cluster.use_kops_controller_for_node_config() && !ig.has_api_server();
        if use_config_server {
            let mut servers = vec![format!(
                "https://{}:{KOPS_CONTROLLER_PORT}/",
                self.cluster.kops_controller_internal_name()
            )];
            for ip in api_server_ips {
                let host = match ip {
                    IpAddr::V4(v4) => v4.to_string(),
                    IpAddr::V6(v6) => format!("[{v6}]"),
                };
                servers.push(format!("https://{host}:{KOPS_CONTROLLER_PORT}/"));
            }
            // The node verifies the config server with the CA from the boot
            // config, so the full config no longer carries it.
            let ca = config
                .cas
                .remove("ca")
                .ok_or_else(|| Error::KeyNotFound("ca".to_string()))?;
            boot.config_server = Some(ConfigServerOptions {
                servers,
                ca_certificates: ca,
            });
        } else {
            boot.config_base = Some(self.config_base.clone());
        }
        Ok(boot)
    }
}

fn parse_net(cidr: &str) -> Result<IpNet, Error> {
    cidr.parse()
        .map_err(|_| Error::InvalidCidr(cidr.to_string()))
}
