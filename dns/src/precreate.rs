use keel_api::{Cluster, CloudProvider, DnsZoneRef};
use tracing::debug;

use crate::{
    Error,
    provider::{Changeset, DnsProvider},
    records::{DnsZone, Record, RecordType},
};

/// TEST-NET-3 placeholder; replaced once the API load balancer exists.
pub const PLACEHOLDER_IPV4: &str = "203.0.113.123";
pub const PLACEHOLDER_IPV6: &str = "fd00:dead:add::";

const PLACEHOLDER_TTL_SECONDS: u32 = 10;
/// DigitalOcean's API rejects TTLs under a minute.
const DIGITALOCEAN_MIN_TTL_SECONDS: u32 = 60;

/// A hostname nodes will query, with the record type it needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DnsHostname {
    pub fqdn: String,
    pub record_type: RecordType,
}

#[derive(Clone, Debug, Default)]
pub struct PrecreateOptions {
    /// IPv6-only clusters get AAAA placeholders instead of A.
    pub ipv6: bool,
    /// When set, each address record gets a TXT ownership marker for
    /// external-dns style integrations.
    pub txt_owner: Option<String>,
}

/// The hostnames that must resolve before the first node boots: the public
/// API name, the internal API name, and the kops-controller endpoint when it
/// serves node config. Gossip and "none"-DNS clusters resolve everything
/// peer-side and get nothing.
pub fn build_precreate_dns_hostnames(cluster: &Cluster, ipv6: bool) -> Vec<DnsHostname> {
    if cluster.uses_gossip() || cluster.uses_none_dns() {
        return Vec::new();
    }
    let record_type = if ipv6 { RecordType::Aaaa } else { RecordType::A };

    let mut hostnames = Vec::new();
    let public = cluster
        .spec
        .master_public_name
        .clone()
        .unwrap_or_else(|| format!("api.{}", cluster.name));
    hostnames.push(DnsHostname {
        fqdn: public,
        record_type,
    });
    hostnames.push(DnsHostname {
        fqdn: cluster.master_internal_name(),
        record_type,
    });
    if cluster.use_kops_controller_for_node_config() {
        hostnames.push(DnsHostname {
            fqdn: cluster.kops_controller_internal_name(),
            record_type,
        });
    }
    hostnames
}

fn placeholder_ttl(cloud: CloudProvider) -> u32 {
    match cloud {
        CloudProvider::DigitalOcean => DIGITALOCEAN_MIN_TTL_SECONDS,
        _ => PLACEHOLDER_TTL_SECONDS,
    }
}

/// Picks the hosted zone for the cluster: the spec's explicit zone reference
/// when present, otherwise the zone with the longest name that suffixes the
/// cluster name (first match wins on ties, as the providers list them).
async fn find_zone(cluster: &Cluster, provider: &dyn DnsProvider) -> Result<DnsZone, Error> {
    let zones = provider.list_zones().await?;

    if let Some(zone_ref) = &cluster.spec.dns_zone {
        let wanted = zones.iter().find(|zone| match zone_ref {
            DnsZoneRef::Id { id } => zone.id == *id,
            DnsZoneRef::Name { name } => {
                zone.name.trim_end_matches('.') == name.trim_end_matches('.')
            }
        });
        return wanted
            .cloned()
            .ok_or_else(|| Error::NoZoneFound(cluster.name.to_string()));
    }

    let mut best: Option<DnsZone> = None;
    for zone in zones {
        let suffix = zone.name.trim_end_matches('.');
        let matches = cluster.name.as_str() == suffix
            || cluster.name.as_str().ends_with(&format!(".{suffix}"));
        if matches
            && best
                .as_ref()
                .is_none_or(|b| suffix.len() > b.name.trim_end_matches('.').len())
        {
            best = Some(zone);
        }
    }
    best.ok_or_else(|| Error::NoZoneFound(cluster.name.to_string()))
}

/// Ensures a placeholder record exists for every hostname nodes will query.
/// Existing records are left untouched; all additions land in one changeset.
pub async fn precreate_dns(
    cluster: &Cluster,
    options: &PrecreateOptions,
    provider: &dyn DnsProvider,
) -> Result<(), Error> {
    let hostnames = build_precreate_dns_hostnames(cluster, options.ipv6);
    if hostnames.is_empty() {
        debug!(cluster = %cluster.name, "no DNS pre-creation needed");
        return Ok(());
    }

    let zone = find_zone(cluster, provider).await?;
    let existing = provider.list_records(&zone).await?;
    let ttl_seconds = placeholder_ttl(cluster.spec.cloud_provider);

    let mut changeset = Changeset::new(zone);
    for hostname in hostnames {
        let present = existing
            .iter()
            .any(|r| r.fqdn == hostname.fqdn && r.record_type == hostname.record_type);
        if !present {
            let value = match hostname.record_type {
                RecordType::Aaaa => PLACEHOLDER_IPV6.to_string(),
                _ => PLACEHOLDER_IPV4.to_string(),
            };
            changeset.add(Record {
                fqdn: hostname.fqdn.clone(),
                record_type: hostname.record_type,
                value,
                ttl_seconds,
            });
        }

        if let Some(owner) = &options.txt_owner {
            let txt_present = existing
                .iter()
                .any(|r| r.fqdn == hostname.fqdn && r.record_type == RecordType::Txt);
            if !txt_present {
                changeset.add(Record {
                    fqdn: hostname.fqdn,
                    record_type: RecordType::Txt,
                    value: format!("\"heritage=keel,owner={owner}\""),
                    ttl_seconds,
                });
            }
        }
    }

    changeset.apply(provider).await
}
