use std::fmt;

use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};

use crate::Error;

/// A parsed container image reference:
/// `<domain>/<path>[:<tag>][@<digest>]`.
///
/// Bare references like `busybox` resolve against Docker Hub the way a
/// container runtime would (`docker.io/library/busybox`).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, SerializeDisplay, DeserializeFromStr)]
pub struct ContainerRef {
    pub domain: String,
    pub path: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

impl ContainerRef {
    pub fn parse(input: &str) -> Result<ContainerRef, Error> {
        if input.is_empty() {
            return Err(Error::InvalidImageRef(input.to_string()));
        }

        let (rest, digest) = match input.split_once('@') {
            Some((rest, digest)) if digest.starts_with("sha256:") => {
                (rest, Some(digest.to_string()))
            }
            Some(_) => return Err(Error::InvalidImageRef(input.to_string())),
            None => (input, None),
        };

        // The tag separator is a ':' after the final '/'.
        let (rest, tag) = match rest.rsplit_once(':') {
            Some((name, tag)) if !tag.contains('/') => (name, Some(tag.to_string())),
            _ => (rest, None),
        };

        if rest.is_empty() {
            return Err(Error::InvalidImageRef(input.to_string()));
        }

        // The first segment is a registry domain only when it looks like a
        // host (contains '.' or ':', or is "localhost").
        let (domain, path) = match rest.split_once('/') {
            Some((first, remainder))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (first.to_string(), remainder.to_string())
            }
            _ => {
                let path = if rest.contains('/') {
                    rest.to_string()
                } else {
                    format!("library/{rest}")
                };
                ("docker.io".to_string(), path)
            }
        };

        if path.is_empty() {
            return Err(Error::InvalidImageRef(input.to_string()));
        }

        Ok(ContainerRef {
            domain,
            path,
            tag,
            digest,
        })
    }

    /// The same image relocated under `registry`, keeping the path, tag, and
    /// digest but dropping the canonical domain.
    pub fn relocated(&self, registry: &str) -> ContainerRef {
        let registry = registry.trim_end_matches('/');
        match registry.split_once('/') {
            Some((domain, prefix)) => ContainerRef {
                domain: domain.to_string(),
                path: format!("{prefix}/{}", self.path),
                tag: self.tag.clone(),
                digest: self.digest.clone(),
            },
            None => ContainerRef {
                domain: registry.to_string(),
                path: self.path.clone(),
                tag: self.tag.clone(),
                digest: self.digest.clone(),
            },
        }
    }
}

impl fmt::Display for ContainerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.domain, self.path)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for ContainerRef {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        ContainerRef::parse(value)
    }
}

/// A container image the nodes need, with the reference they should pull
/// from. The two differ only when the cluster mirrors images into its own
/// registry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAsset {
    pub canonical: ContainerRef,
    pub download: ContainerRef,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_reference() {
        let r = ContainerRef::parse(
            "registry.k8s.io/kube-proxy:v1.28.3@sha256:0000000000000000000000000000000000000000000000000000000000000000",
        )
        .unwrap();
        assert_eq!(r.domain, "registry.k8s.io");
        assert_eq!(r.path, "kube-proxy");
        assert_eq!(r.tag.as_deref(), Some("v1.28.3"));
        assert!(r.digest.as_deref().unwrap().starts_with("sha256:"));
    }

    #[test]
    fn bare_name_resolves_to_docker_hub() {
        let r = ContainerRef::parse("busybox:1.36").unwrap();
        assert_eq!(r.domain, "docker.io");
        assert_eq!(r.path, "library/busybox");
        assert_eq!(r.to_string(), "docker.io/library/busybox:1.36");
    }

    #[test]
    fn port_in_domain_is_not_a_tag() {
        let r = ContainerRef::parse("localhost:5000/kube-proxy").unwrap();
        assert_eq!(r.domain, "localhost:5000");
        assert_eq!(r.path, "kube-proxy");
        assert_eq!(r.tag, None);
    }

    #[test]
    fn relocation_strips_domain() {
        let r = ContainerRef::parse("registry.k8s.io/kube-proxy:v1.28.3").unwrap();
        let moved = r.relocated("registry.example.com/mirror");
        assert_eq!(moved.to_string(), "registry.example.com/mirror/kube-proxy:v1.28.3");
    }

    #[test]
    fn round_trips() {
        for input in [
            "registry.k8s.io/kube-proxy:v1.28.3",
            "quay.io/cilium/cilium:v1.14.2",
            "localhost:5000/a/b@sha256:1111111111111111111111111111111111111111111111111111111111111111",
        ] {
            assert_eq!(ContainerRef::parse(input).unwrap().to_string(), input);
        }
    }
}
