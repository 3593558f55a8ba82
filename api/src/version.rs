use std::{fmt, str::FromStr, sync::Arc};

use semver::Version;
use serde_with::{DeserializeFromStr, SerializeDisplay};

use crate::error::Error;

const BASE_URL_SCHEMES: [&str; 3] = ["http:", "https:", "memfs:"];

/// The Kubernetes version a cluster runs.
///
/// The raw form is either a plain version (`1.28.3`, optionally with a
/// leading `v`) or a base URL pointing at a CI build; comparisons always go
/// through the parsed semver with pre-release and build metadata stripped.
#[derive(Clone, Debug, PartialEq, Eq, Hash, DeserializeFromStr, SerializeDisplay)]
pub struct KubernetesVersion {
    raw: Arc<str>,
    version: Version,
}

impl KubernetesVersion {
    pub fn parse(input: &str) -> Result<Self, Error> {
        let raw = input.trim();
        if raw.is_empty() {
            return Err(Error::InvalidVersion(input.to_string()));
        }
        if is_base_url(raw) {
            return Err(Error::BaseUrlWithoutVersion(raw.to_string()));
        }

        let version = parse_version_number(raw.strip_prefix('v').unwrap_or(raw))
            .ok_or_else(|| Error::InvalidVersion(input.to_string()))?;
        Ok(Self {
            raw: Arc::from(raw),
            version,
        })
    }

    /// Builds a version whose raw form is a base URL; the numeric version is
    /// supplied separately (from the build's version marker).
    pub fn from_base_url(url: &str, version: Version) -> Result<Self, Error> {
        if !is_base_url(url) {
            return Err(Error::InvalidVersion(url.to_string()));
        }
        Ok(Self {
            raw: Arc::from(url),
            version: strip_pre_build(version),
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn is_base_url(&self) -> bool {
        is_base_url(&self.raw)
    }

    pub fn minor(&self) -> (u64, u64) {
        (self.version.major, self.version.minor)
    }

    pub fn is_gte(&self, major: u64, minor: u64) -> bool {
        (self.version.major, self.version.minor) >= (major, minor)
    }

    pub fn is_lt(&self, major: u64, minor: u64) -> bool {
        !self.is_gte(major, minor)
    }
}

impl fmt::Display for KubernetesVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for KubernetesVersion {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Self::parse(input)
    }
}

fn is_base_url(raw: &str) -> bool {
    BASE_URL_SCHEMES.iter().any(|s| raw.starts_with(s))
}

fn strip_pre_build(mut version: Version) -> Version {
    version.pre = semver::Prerelease::EMPTY;
    version.build = semver::BuildMetadata::EMPTY;
    version
}

/// Accepts `X.Y.Z` and the shorthand `X.Y`; pre/build suffixes are dropped.
fn parse_version_number(input: &str) -> Option<Version> {
    if let Ok(v) = Version::parse(input) {
        return Some(strip_pre_build(v));
    }

    let mut parts = input.splitn(2, ['-', '+']);
    let numbers = parts.next()?;
    let mut iter = numbers.split('.');
    let major = iter.next()?.parse().ok()?;
    let minor = iter.next()?.parse().ok()?;
    let patch = match iter.next() {
        Some(p) => p.parse().ok()?,
        None => 0,
    };
    if iter.next().is_some() {
        return None;
    }
    Some(Version::new(major, minor, patch))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_v_prefixed() {
        let v = KubernetesVersion::parse("v1.28.3").unwrap();
        assert_eq!(v.raw(), "v1.28.3");
        assert_eq!(v.version(), &Version::new(1, 28, 3));
        assert!(!v.is_base_url());
    }

    #[test]
    fn parses_shorthand_minor() {
        let v = KubernetesVersion::parse("1.27").unwrap();
        assert_eq!(v.minor(), (1, 27));
    }

    #[test]
    fn strips_pre_release_for_comparisons() {
        let v = KubernetesVersion::parse("1.29.0-alpha.1").unwrap();
        assert!(v.is_gte(1, 29));
        assert!(v.is_lt(1, 30));
    }

    #[test]
    fn base_url_requires_version_hint() {
        assert!(matches!(
            KubernetesVersion::parse("https://example.com/k8s/"),
            Err(Error::BaseUrlWithoutVersion(_))
        ));
        let v = KubernetesVersion::from_base_url(
            "https://example.com/k8s/",
            Version::new(1, 30, 0),
        )
        .unwrap();
        assert!(v.is_base_url());
        assert_eq!(v.minor(), (1, 30));
    }

    #[test]
    fn rejects_garbage() {
        assert!(KubernetesVersion::parse("latest").is_err());
        assert!(KubernetesVersion::parse("").is_err());
    }
}
