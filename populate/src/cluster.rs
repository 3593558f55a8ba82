use ipnet::IpNet;
use keel_api::{
    Cluster, CloudProvider, InstanceGroup, NetworkingPlugin, validate_cluster,
};
use keel_net::{assign_subnet_cidrs, cidr_host};
use tracing::debug;

use crate::{Error, cloud::Cloud, versions::VersionSource};

const DEFAULT_NON_MASQUERADE_CIDR: &str = "100.64.0.0/10";
const AWS_DEFAULT_NETWORK_CIDR: &str = "172.20.0.0/16";
const AWS_METADATA_IP: &str = "169.254.169.254";

/// Expands a partial cluster spec into a complete one and validates it.
///
/// The transformation is idempotent: feeding the output back in produces an
/// identical cluster. The input is never mutated.
pub async fn populate_cluster(
    cluster: &Cluster,
    instance_groups: &[InstanceGroup],
    cloud: &dyn Cloud,
    versions: &dyn VersionSource,
) -> Result<Cluster, Error> {
    let mut cluster = cluster.clone();

    fill_network_cidr(&mut cluster, cloud).await?;
    fill_non_masquerade_cidr(&mut cluster);
    fill_master_public_name(&mut cluster);
    assign_subnets(&mut cluster)?;
    fill_kubernetes_version(&mut cluster, versions).await?;
    expand_proxy_excludes(&mut cluster)?;

    validate_cluster(&cluster, instance_groups)?;
    Ok(cluster)
}

async fn fill_network_cidr(cluster: &mut Cluster, cloud: &dyn Cloud) -> Result<(), Error> {
    let networking = &mut cluster.spec.networking;
    if networking.network_cidr.is_none() {
        if let Some(network_id) = networking.network_id.clone() {
            let info = cloud
                .find_vpc_info(&network_id)
                .await?
                .ok_or(Error::VpcNotFound(network_id))?;
            debug!(cidr = %info.cidr, "adopted network CIDR from shared VPC");
            networking.network_cidr = Some(info.cidr);
        } else if cluster.spec.cloud_provider == CloudProvider::Aws {
            networking.network_cidr = Some(AWS_DEFAULT_NETWORK_CIDR.to_string());
        }
        // GCE manages its own network ranges; the CIDR stays empty there.
    }

    // The AmazonVPC plugin gives pods VPC addresses, so nothing inside the
    // network CIDR may be masqueraded.
    if cluster.spec.networking.plugin == NetworkingPlugin::AmazonVpc
        && let Some(network_cidr) = cluster.spec.networking.network_cidr.clone()
    {
        cluster.spec.networking.non_masquerade_cidr = Some(network_cidr);
    }
    Ok(())
}

fn fill_non_masquerade_cidr(cluster: &mut Cluster) {
    let networking = &mut cluster.spec.networking;
    if networking.non_masquerade_cidr.is_none()
        && networking.plugin != NetworkingPlugin::GceNative
    {
        networking.non_masquerade_cidr = Some(DEFAULT_NON_MASQUERADE_CIDR.to_string());
    }
}

fn fill_master_public_name(cluster: &mut Cluster) {
    if cluster.spec.master_public_name.is_none() {
        cluster.spec.master_public_name = Some(format!("api.{}", cluster.name));
    }
}

fn assign_subnets(cluster: &mut Cluster) -> Result<(), Error> {
    if !matches!(
        cluster.spec.cloud_provider,
        CloudProvider::Aws | CloudProvider::Openstack
    ) {
        return Ok(());
    }
    let Some(network_cidr) = cluster.spec.networking.network_cidr.as_deref() else {
        return Ok(());
    };
    let network_cidr: IpNet = network_cidr
        .parse()
        .map_err(|_| keel_net::Error::InvalidCidr(network_cidr.to_string()))?;
    assign_subnet_cidrs(network_cidr, &mut cluster.spec.networking.subnets)?;
    Ok(())
}

async fn fill_kubernetes_version(
    cluster: &mut Cluster,
    versions: &dyn VersionSource,
) -> Result<(), Error> {
    let raw = match cluster.spec.kubernetes_version.clone() {
        Some(raw) => raw,
        None => match versions.channel_recommended().await? {
            Some(recommended) => recommended,
            None => versions.stable().await?,
        },
    };
    let normalized = raw.strip_prefix('v').unwrap_or(&raw).to_string();
    cluster.spec.kubernetes_version = Some(normalized);
    Ok(())
}

/// Appends the standard exclude set to the egress proxy's `proxyExcludes`,
/// skipping entries already present.
fn expand_proxy_excludes(cluster: &mut Cluster) -> Result<(), Error> {
    let mut wanted: Vec<String> = vec!["127.0.0.1".to_string(), "localhost".to_string()];
    wanted.push(cluster.dns_domain().to_string());
    if let Some(public_name) = &cluster.spec.master_public_name {
        wanted.push(public_name.clone());
    }
    wanted.push(cluster.name.to_string());
    if let Some(non_masq) = &cluster.spec.networking.non_masquerade_cidr {
        let parsed: IpNet = non_masq
            .parse()
            .map_err(|_| keel_net::Error::InvalidCidr(non_masq.to_string()))?;
        wanted.push(cidr_host(&parsed, 0)?.to_string());
        wanted.push(non_masq.clone());
    }
    if let Some(network_cidr) = &cluster.spec.networking.network_cidr {
        wanted.push(network_cidr.clone());
    }
    if cluster.spec.cloud_provider == CloudProvider::Aws {
        wanted.push(AWS_METADATA_IP.to_string());
    }

    let Some(proxy) = &mut cluster.spec.egress_proxy else {
        return Ok(());
    };
    for entry in wanted {
        if !proxy.proxy_excludes.contains(&entry) {
            proxy.proxy_excludes.push(entry);
        }
    }
    Ok(())
}
