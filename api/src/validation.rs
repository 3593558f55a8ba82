use std::collections::BTreeSet;

use ipnet::IpNet;

use crate::{
    cluster::{Cluster, NetworkingPlugin},
    error::Error,
    instancegroup::InstanceGroup,
};

pub fn parse_cidr(field: &'static str, cidr: &str) -> Result<IpNet, Error> {
    cidr.parse::<IpNet>().map_err(|e| Error::InvalidCidr {
        field,
        cidr: cidr.to_string(),
        message: e.to_string(),
    })
}

fn nets_overlap(a: &IpNet, b: &IpNet) -> bool {
    a.contains(&b.addr()) || b.contains(&a.addr())
}

fn is_strict_subnet(child: &IpNet, parent: &IpNet) -> bool {
    child.prefix_len() > parent.prefix_len() && parent.contains(child)
}

/// Checks the invariants that must hold on a completed cluster spec.
///
/// Callers run this after population; a failure here is fatal and never
/// retried.
pub fn validate_cluster(cluster: &Cluster, instance_groups: &[InstanceGroup]) -> Result<(), Error> {
    let spec = &cluster.spec;

    let network = spec
        .networking
        .network_cidr
        .as_deref()
        .map(|c| parse_cidr("networkCIDR", c))
        .transpose()?;

    let non_masquerade = spec
        .networking
        .non_masquerade_cidr
        .as_deref()
        .map(|c| parse_cidr("nonMasqueradeCIDR", c))
        .transpose()?;

    // AmazonVPC and GCE-native networking deliberately share the provider's
    // ranges, so the overlap rule does not apply to them.
    let provider_native = matches!(
        spec.networking.plugin,
        NetworkingPlugin::AmazonVpc | NetworkingPlugin::GceNative
    );
    if let (Some(network), Some(non_masquerade)) = (&network, &non_masquerade)
        && !provider_native
        && nets_overlap(network, non_masquerade)
    {
        return Err(Error::NonMasqueradeOverlapsNetwork {
            non_masquerade: non_masquerade.to_string(),
            network: network.to_string(),
        });
    }

    let service = spec
        .networking
        .service_cluster_ip_range
        .as_deref()
        .map(|c| parse_cidr("serviceClusterIPRange", c))
        .transpose()?;

    if let (Some(service), Some(non_masquerade)) = (&service, &non_masquerade)
        && !is_strict_subnet(service, non_masquerade)
    {
        return Err(Error::ServiceCidrNotInNonMasquerade {
            service: service.to_string(),
            non_masquerade: non_masquerade.to_string(),
        });
    }

    if let (Some(server_ip), Some(service)) = (spec.kube_dns.server_ip, &service)
        && !service.contains(&server_ip)
    {
        return Err(Error::DnsServerIpOutsideServiceCidr {
            server_ip: server_ip.to_string(),
            service: service.to_string(),
        });
    }

    if let Some(network) = &network {
        for subnet in &spec.networking.subnets {
            let Some(cidr) = subnet.cidr.as_deref() else {
                continue;
            };
            let subnet_cidr = parse_cidr("subnet CIDR", cidr)?;
            if !is_strict_subnet(&subnet_cidr, network) && &subnet_cidr != network {
                return Err(Error::SubnetOutsideNetworkCidr {
                    subnet: subnet.name.to_string(),
                    cidr: subnet_cidr.to_string(),
                    network: network.to_string(),
                });
            }
        }
    }

    let mut ig_names = BTreeSet::new();
    for ig in instance_groups {
        if !ig_names.insert(ig.name.as_str()) {
            return Err(Error::DuplicateInstanceGroup(ig.name.to_string()));
        }
        ig.validate()?;

        for subnet in &ig.spec.subnets {
            if !spec.networking.subnets.iter().any(|s| s.name == *subnet) {
                return Err(Error::UnknownSubnet {
                    name: ig.name.to_string(),
                    subnet: subnet.to_string(),
                });
            }
        }
    }

    for etcd in &spec.etcd_clusters {
        if etcd.members.len() % 2 == 0 {
            return Err(Error::EvenEtcdMemberCount {
                name: etcd.name.clone(),
                count: etcd.members.len(),
            });
        }
        for member in &etcd.members {
            if !ig_names.contains(member.instance_group.as_str()) {
                return Err(Error::UnknownEtcdInstanceGroup {
                    cluster: etcd.name.clone(),
                    member: member.name.clone(),
                    instance_group: member.instance_group.clone(),
                });
            }
        }
    }

    validate_component_cloud_providers(cluster)?;

    Ok(())
}

fn validate_component_cloud_providers(cluster: &Cluster) -> Result<(), Error> {
    let expected = cluster.spec.cloud_provider.as_str();
    let components = [
        ("kubeAPIServer", &cluster.spec.kube_api_server),
        ("kubeControllerManager", &cluster.spec.kube_controller_manager),
        ("kubelet", &cluster.spec.kubelet),
        ("masterKubelet", &cluster.spec.master_kubelet),
    ];
    for (name, component) in components {
        if let Some(component) = component
            && let Some(value) = component.cloud_provider.as_deref()
            && value != expected
        {
            return Err(Error::CloudProviderMismatch {
                component: name,
                value: value.to_string(),
                cluster: expected.to_string(),
            });
        }
    }
    Ok(())
}
