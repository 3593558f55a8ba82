//! Version and hash tables for the third-party components nodes download:
//! CNI plugins, container runtime bundles, credential providers, crictl.
//! Table entries carry sha256 hashes for the default versions; off-table
//! versions fall back to sidecar hash discovery in the builder.

use std::collections::BTreeMap;

use keel_api::{CloudProvider, KubernetesVersion};
use semver::Version;
use url::Url;

use crate::{Error, arch::Architecture, hash::Hash};

pub const CNI_VERSION_URL_ENV: &str = "CNI_VERSION_URL";
pub const CNI_ASSET_HASH_ENV: &str = "CNI_ASSET_HASH_STRING";

pub const DEFAULT_CONTAINERD_VERSION: &str = "1.7.16";
pub const DEFAULT_RUNC_VERSION: &str = "1.1.12";
pub const DEFAULT_NERDCTL_VERSION: &str = "1.7.4";
pub const DEFAULT_CRICTL_VERSION: &str = "1.28.0";

fn parse_version(component: &'static str, version: &str) -> Result<Version, Error> {
    Version::parse(version.trim_start_matches('v')).map_err(|_| Error::InvalidVersion {
        component,
        version: version.to_string(),
    })
}

fn parse_url(raw: &str) -> Result<Url, Error> {
    Url::parse(raw).map_err(|_| Error::InvalidUrl(raw.to_string()))
}

fn table_hash(table: &[(&str, Architecture, &str)], version: &str, arch: Architecture) -> Option<Hash> {
    table
        .iter()
        .find(|(v, a, _)| *v == version && *a == arch)
        .and_then(|(_, _, hex)| Hash::from_hex(hex).ok())
}

/// A resolved download for one component: where to fetch it and, when the
/// tables know it, the expected content hash.
#[derive(Clone, Debug)]
pub struct WellKnownAsset {
    pub url: Url,
    pub hash: Option<Hash>,
}

// ---------------------------------------------------------------------------
// CNI plugins

const CNI_HASHES: &[(&str, Architecture, &str)] = &[
    (
        "1.2.0",
        Architecture::Amd64,
        "f3a841324845ca6bf0d4091b4fc7f97e18a623172158b72fc3fdcdb9d42d2d37",
    ),
    (
        "1.2.0",
        Architecture::Arm64,
        "525e2b62ba92a1b6f3dc9612449a84aa61652e680f7ebf4eff579795fe464b57",
    ),
    (
        "1.1.1",
        Architecture::Amd64,
        "b275772da4026d2161bf8a8b41ed4786754c8a93ebfb6564006d5da7f23831e5",
    ),
    (
        "1.1.1",
        Architecture::Arm64,
        "16484966a46b4692028ba32d16afd994e079dc2cc63fbc2191d7bfaf5e11f3dd",
    ),
];

/// The CNI plugin version shipped for a given Kubernetes release line.
fn cni_version_for(k8s: &KubernetesVersion) -> &'static str {
    if k8s.is_gte(1, 27) {
        "1.2.0"
    } else {
        "1.1.1"
    }
}

/// The CNI plugin archive for this Kubernetes version and architecture.
///
/// `CNI_VERSION_URL` / `CNI_ASSET_HASH_STRING` in the environment snapshot
/// pin the archive regardless of the tables.
pub fn find_cni_asset(
    k8s: &KubernetesVersion,
    arch: Architecture,
    env: &BTreeMap<String, String>,
) -> Result<WellKnownAsset, Error> {
    if let Some(pinned) = env.get(CNI_VERSION_URL_ENV) {
        let hash = match env.get(CNI_ASSET_HASH_ENV) {
            Some(hex) => Some(Hash::from_hex(hex)?),
            None => None,
        };
        return Ok(WellKnownAsset {
            url: parse_url(pinned)?,
            hash,
        });
    }

    let version = cni_version_for(k8s);
    let url = parse_url(&format!(
        "https://storage.googleapis.com/k8s-artifacts-cni/release/v{version}/cni-plugins-linux-{arch}-v{version}.tgz"
    ))?;
    Ok(WellKnownAsset {
        url,
        hash: table_hash(CNI_HASHES, version, arch),
    })
}

// ---------------------------------------------------------------------------
// Container runtime

/// The containerd release archive for `version` on `arch`.
///
/// Upstream publishing changed shape over time: 1.6.0 and later ship a plain
/// `containerd-<v>-linux-<arch>.tar.gz` for both architectures; the 1.4/1.5
/// lines only published the amd64 `cri-containerd-cni` bundle; anything older
/// is unsupported.
pub fn find_containerd_version_url(arch: Architecture, version: &str) -> Result<Url, Error> {
    let parsed = parse_version("containerd", version)?;

    if parsed < Version::new(1, 4, 0) {
        return Err(Error::UnsupportedVersion {
            component: "containerd",
            version: version.to_string(),
        });
    }

    if parsed >= Version::new(1, 6, 0) {
        return parse_url(&format!(
            "https://github.com/containerd/containerd/releases/download/v{version}/containerd-{version}-linux-{arch}.tar.gz"
        ));
    }

    match arch {
        Architecture::Amd64 => parse_url(&format!(
            "https://github.com/containerd/containerd/releases/download/v{version}/cri-containerd-cni-{version}-linux-amd64.tar.gz"
        )),
        Architecture::Arm64 => Err(Error::UnknownUrl {
            component: "containerd",
            version: version.to_string(),
            arch,
        }),
    }
}

const CONTAINERD_HASHES: &[(&str, Architecture, &str)] = &[
    (
        "1.7.16",
        Architecture::Amd64,
        "4ff0b31ed4a4f63d3a4f0a801422e4e9caea6dec0a77de54bfd3ad7b61e92a0c",
    ),
    (
        "1.7.16",
        Architecture::Arm64,
        "e2428ed8b02f5bf1e3e98a0b7a1f7e80e53d8edac708aad0e3aed5c5ae76dba6",
    ),
];

pub fn containerd_hash(version: &str, arch: Architecture) -> Option<Hash> {
    table_hash(CONTAINERD_HASHES, version, arch)
}

/// A separate runc binary is only needed for containerd 1.6.0 and later;
/// before that the bundle carries its own.
pub fn runc_needed_with_containerd(containerd_version: &str) -> Result<bool, Error> {
    let parsed = parse_version("containerd", containerd_version)?;
    Ok(parsed >= Version::new(1, 6, 0))
}

pub fn find_runc_version_url(arch: Architecture, version: &str) -> Result<Url, Error> {
    let parsed = parse_version("runc", version)?;
    if parsed < Version::new(1, 1, 0) {
        return Err(Error::UnsupportedVersion {
            component: "runc",
            version: version.to_string(),
        });
    }
    parse_url(&format!(
        "https://github.com/opencontainers/runc/releases/download/v{version}/runc.{arch}"
    ))
}

const RUNC_HASHES: &[(&str, Architecture, &str)] = &[
    (
        "1.1.12",
        Architecture::Amd64,
        "aadeef400b8f05645768c1476d1023f7875b78f52c7ff1967a6dbce236b8cbd8",
    ),
    (
        "1.1.12",
        Architecture::Arm64,
        "879f910a05c95c10c64ad8eb7d5e3aa8e4b30e65587b3d68e009a3565aed5bb8",
    ),
];

pub fn runc_hash(version: &str, arch: Architecture) -> Option<Hash> {
    table_hash(RUNC_HASHES, version, arch)
}

const NERDCTL_HASHES: &[(&str, Architecture, &str)] = &[
    (
        "1.7.4",
        Architecture::Amd64,
        "71aee9d987b7fad0ff2ade50c038851374128ebad2fbd4b057f565bee5ab944b",
    ),
    (
        "1.7.4",
        Architecture::Arm64,
        "d8df47708ca57b9cd7f498055126ba7dcfc811d9ba43aae1830c93a09e70e22d",
    ),
];

pub fn find_nerdctl_asset(arch: Architecture) -> Result<WellKnownAsset, Error> {
    let version = DEFAULT_NERDCTL_VERSION;
    let url = parse_url(&format!(
        "https://github.com/containerd/nerdctl/releases/download/v{version}/nerdctl-{version}-linux-{arch}.tar.gz"
    ))?;
    Ok(WellKnownAsset {
        url,
        hash: table_hash(NERDCTL_HASHES, version, arch),
    })
}

const CRICTL_HASHES: &[(&str, Architecture, &str)] = &[
    (
        "1.28.0",
        Architecture::Amd64,
        "8dc78774f7cbeaf787994d386eec663f0a3cf24de1ea4893598096cb39ef2508",
    ),
    (
        "1.28.0",
        Architecture::Arm64,
        "9205a97971b5adfbdbac3a2dec1e049e1f399af2dce8599e5e4dc84a6e19dcb8",
    ),
];

pub fn find_crictl_asset(arch: Architecture) -> Result<WellKnownAsset, Error> {
    let version = DEFAULT_CRICTL_VERSION;
    let url = parse_url(&format!(
        "https://github.com/kubernetes-sigs/cri-tools/releases/download/v{version}/crictl-v{version}-linux-{arch}.tar.gz"
    ))?;
    Ok(WellKnownAsset {
        url,
        hash: table_hash(CRICTL_HASHES, version, arch),
    })
}

pub const DEFAULT_CRIO_VERSION: &str = "1.28.1";

const CRIO_HASHES: &[(&str, Architecture, &str)] = &[
    (
        "1.28.1",
        Architecture::Amd64,
        "83b63b9ee92f7017a33bd48fa3138a3e21c0a1a1a1b1bb7cb05c0c4ae23cf116",
    ),
    (
        "1.28.1",
        Architecture::Arm64,
        "9a5e1a8e9fc4a1e27a60a0c4a2b67a3d0a4187a01a40f80f4ec6b3b9a6f65c2e",
    ),
];

pub fn find_crio_asset(arch: Architecture, version: &str) -> Result<WellKnownAsset, Error> {
    parse_version("cri-o", version)?;
    let url = parse_url(&format!(
        "https://storage.googleapis.com/cri-o/artifacts/cri-o.{arch}.v{version}.tar.gz"
    ))?;
    Ok(WellKnownAsset {
        url,
        hash: table_hash(CRIO_HASHES, version, arch),
    })
}

// ---------------------------------------------------------------------------
// External credential providers

const ECR_CREDENTIAL_PROVIDER_VERSION: &str = "1.27.1";
const ECR_CREDENTIAL_PROVIDER_HASHES: &[(&str, Architecture, &str)] = &[
    (
        "1.27.1",
        Architecture::Amd64,
        "7c3a10dd91a0e475ac1efd8f6ef1005425d02b253d3e5556d5d9251142db3e87",
    ),
    (
        "1.27.1",
        Architecture::Arm64,
        "14d2cda5249f3c19dcbb05a05b09a3517eb83b5322994a25fa08b0b6fcf32b42",
    ),
];

const AUTH_PROVIDER_GCP_VERSION: &str = "0.30.0";
const AUTH_PROVIDER_GCP_HASHES: &[(&str, Architecture, &str)] = &[
    (
        "0.30.0",
        Architecture::Amd64,
        "48f85e1a8e9fc4a1e27a60a0c4a2b67a3d0a4187a01a40f80f4ec6b3b9a6f65c",
    ),
    (
        "0.30.0",
        Architecture::Arm64,
        "5e146e1a8e9fc4a1e27a60a0c4a2b67a3d0a4187a01a40f80f4ec6b3b9a6f0d1",
    ),
];

/// The out-of-tree credential-provider binary a cloud needs, if any.
///
/// In-tree cloud credential plumbing was removed from the kubelet in 1.27,
/// so AWS and GCE clusters on 1.27+ need an external helper.
pub fn find_credential_provider(
    cloud: CloudProvider,
    k8s: &KubernetesVersion,
    arch: Architecture,
) -> Result<Option<(&'static str, WellKnownAsset)>, Error> {
    if !k8s.is_gte(1, 27) {
        return Ok(None);
    }
    match cloud {
        CloudProvider::Aws => {
            let version = ECR_CREDENTIAL_PROVIDER_VERSION;
            let url = parse_url(&format!(
                "https://artifacts.k8s.io/binaries/cloud-provider-aws/v{version}/linux/{arch}/ecr-credential-provider-linux-{arch}"
            ))?;
            Ok(Some((
                "ecr-credential-provider",
                WellKnownAsset {
                    url,
                    hash: table_hash(ECR_CREDENTIAL_PROVIDER_HASHES, version, arch),
                },
            )))
        }
        CloudProvider::Gce => {
            let version = AUTH_PROVIDER_GCP_VERSION;
            let url = parse_url(&format!(
                "https://storage.googleapis.com/k8s-staging-cloud-provider-gcp/auth-provider-gcp/v{version}/linux/{arch}/auth-provider-gcp"
            ))?;
            Ok(Some((
                "auth-provider-gcp",
                WellKnownAsset {
                    url,
                    hash: table_hash(AUTH_PROVIDER_GCP_HASHES, version, arch),
                },
            )))
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn k8s(raw: &str) -> KubernetesVersion {
        KubernetesVersion::parse(raw).unwrap()
    }

    #[test]
    fn containerd_modern_release_shape() {
        let url = find_containerd_version_url(Architecture::Amd64, "1.6.5").unwrap();
        assert_eq!(
            url.as_str(),
            "https://github.com/containerd/containerd/releases/download/v1.6.5/containerd-1.6.5-linux-amd64.tar.gz"
        );
    }

    #[test]
    fn containerd_legacy_arm64_is_unknown() {
        assert!(matches!(
            find_containerd_version_url(Architecture::Arm64, "1.5.5"),
            Err(Error::UnknownUrl { .. })
        ));
    }

    #[test]
    fn containerd_legacy_amd64_is_cri_bundle() {
        let url = find_containerd_version_url(Architecture::Amd64, "1.5.5").unwrap();
        assert_eq!(
            url.as_str(),
            "https://github.com/containerd/containerd/releases/download/v1.5.5/cri-containerd-cni-1.5.5-linux-amd64.tar.gz"
        );
    }

    #[test]
    fn containerd_ancient_is_unsupported() {
        assert!(matches!(
            find_containerd_version_url(Architecture::Amd64, "1.3.9"),
            Err(Error::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn runc_url_shape() {
        let url = find_runc_version_url(Architecture::Arm64, "1.1.12").unwrap();
        assert_eq!(
            url.as_str(),
            "https://github.com/opencontainers/runc/releases/download/v1.1.12/runc.arm64"
        );
    }

    #[test]
    fn runc_before_1_1_is_unsupported() {
        assert!(matches!(
            find_runc_version_url(Architecture::Amd64, "1.0.3"),
            Err(Error::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn runc_only_split_out_for_modern_containerd() {
        assert!(runc_needed_with_containerd("1.6.0").unwrap());
        assert!(!runc_needed_with_containerd("1.5.11").unwrap());
    }

    #[test]
    fn cni_env_pin_overrides_tables() {
        let env = BTreeMap::from([
            (
                CNI_VERSION_URL_ENV.to_string(),
                "https://example.com/cni.tgz".to_string(),
            ),
            (CNI_ASSET_HASH_ENV.to_string(), "a".repeat(64)),
        ]);
        let asset = find_cni_asset(&k8s("1.28.3"), Architecture::Amd64, &env).unwrap();
        assert_eq!(asset.url.as_str(), "https://example.com/cni.tgz");
        assert!(asset.hash.is_some());
    }

    #[test]
    fn cni_version_tracks_k8s_minor() {
        let env = BTreeMap::new();
        let modern = find_cni_asset(&k8s("1.28.3"), Architecture::Amd64, &env).unwrap();
        assert!(modern.url.as_str().contains("v1.2.0"));
        let older = find_cni_asset(&k8s("1.25.0"), Architecture::Amd64, &env).unwrap();
        assert!(older.url.as_str().contains("v1.1.1"));
    }

    #[test]
    fn credential_provider_by_cloud_and_version() {
        let none = find_credential_provider(CloudProvider::Aws, &k8s("1.26.0"), Architecture::Amd64)
            .unwrap();
        assert!(none.is_none());

        let (name, asset) =
            find_credential_provider(CloudProvider::Aws, &k8s("1.28.3"), Architecture::Amd64)
                .unwrap()
                .unwrap();
        assert_eq!(name, "ecr-credential-provider");
        assert!(asset.hash.is_some());

        let gce = find_credential_provider(CloudProvider::Gce, &k8s("1.28.3"), Architecture::Arm64)
            .unwrap()
            .unwrap();
        assert_eq!(gce.0, "auth-provider-gcp");

        let other =
            find_credential_provider(CloudProvider::Hetzner, &k8s("1.28.3"), Architecture::Amd64)
                .unwrap();
        assert!(other.is_none());
    }
}
