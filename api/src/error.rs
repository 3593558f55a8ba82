use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid {kind} name `{name}`")]
    #[diagnostic(code(api::invalid_name))]
    InvalidName { kind: &'static str, name: String },

    #[error("invalid CIDR `{cidr}` for {field}: {message}")]
    #[diagnostic(code(api::invalid_cidr))]
    InvalidCidr {
        field: &'static str,
        cidr: String,
        message: String,
    },

    #[error("invalid kubernetes version `{0}`")]
    #[diagnostic(code(api::invalid_version))]
    InvalidVersion(String),

    #[error("kubernetes version `{0}` is a base URL and carries no version number")]
    #[diagnostic(
        code(api::base_url_without_version),
        help("base-URL versions need an explicit version hint from the release marker")
    )]
    BaseUrlWithoutVersion(String),

    #[error("nonMasqueradeCIDR `{non_masquerade}` overlaps networkCIDR `{network}`")]
    #[diagnostic(code(api::non_masquerade_overlaps_network))]
    NonMasqueradeOverlapsNetwork {
        non_masquerade: String,
        network: String,
    },

    #[error("serviceClusterIPRange `{service}` must be a strict subnet of nonMasqueradeCIDR `{non_masquerade}`")]
    #[diagnostic(code(api::service_cidr_not_in_non_masquerade))]
    ServiceCidrNotInNonMasquerade {
        service: String,
        non_masquerade: String,
    },

    #[error("kubeDNS.serverIP `{server_ip}` is not within serviceClusterIPRange `{service}`")]
    #[diagnostic(code(api::dns_server_ip_outside_service_cidr))]
    DnsServerIpOutsideServiceCidr { server_ip: String, service: String },

    #[error("subnet `{subnet}` CIDR `{cidr}` is not a strict subnet of networkCIDR `{network}`")]
    #[diagnostic(code(api::subnet_outside_network_cidr))]
    SubnetOutsideNetworkCidr {
        subnet: String,
        cidr: String,
        network: String,
    },

    #[error("etcd cluster `{name}` has {count} members; member count must be odd")]
    #[diagnostic(code(api::even_etcd_member_count))]
    EvenEtcdMemberCount { name: String, count: usize },

    #[error("etcd member `{member}` of cluster `{cluster}` references unknown instance group `{instance_group}`")]
    #[diagnostic(code(api::unknown_etcd_instance_group))]
    UnknownEtcdInstanceGroup {
        cluster: String,
        member: String,
        instance_group: String,
    },

    #[error("instance group name `{0}` is used more than once")]
    #[diagnostic(code(api::duplicate_instance_group))]
    DuplicateInstanceGroup(String),

    #[error("instance group `{name}` has minSize {min} greater than maxSize {max}")]
    #[diagnostic(code(api::min_above_max))]
    MinAboveMax { name: String, min: i32, max: i32 },

    #[error("instance group `{0}` must declare at least one subnet")]
    #[diagnostic(code(api::missing_subnets))]
    MissingSubnets(String),

    #[error("instance group `{name}` references unknown subnet `{subnet}`")]
    #[diagnostic(code(api::unknown_subnet))]
    UnknownSubnet { name: String, subnet: String },

    #[error("{component}.cloudProvider `{value}` does not match cluster cloud provider `{cluster}`")]
    #[diagnostic(code(api::cloud_provider_mismatch))]
    CloudProviderMismatch {
        component: &'static str,
        value: String,
        cluster: String,
    },

    #[error("cluster is missing required field `{0}`")]
    #[diagnostic(code(api::missing_field))]
    MissingField(&'static str),
}
