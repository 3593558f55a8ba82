use crate::{Error, hash::Hash};

/// How a mirror lays out the files it carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MirrorLayout {
    /// The mirror preserves the canonical directory structure.
    Preserve,
    /// The mirror is flat: path separators collapse to `-`, and a handful of
    /// binaries are published under a rearranged name.
    Flattened,
}

#[derive(Clone, Debug)]
struct Mirror {
    base: String,
    layout: MirrorLayout,
}

#[derive(Clone, Debug)]
struct MirrorRule {
    base: String,
    mirrors: Vec<Mirror>,
}

/// Binaries the flattened mirror publishes under a rearranged name.
const FLATTENED_RENAMES: &[(&str, &str)] = &[
    ("linux-amd64-nodeup", "nodeup-linux-amd64"),
    ("linux-arm64-nodeup", "nodeup-linux-arm64"),
    ("linux-amd64-protokube", "protokube-linux-amd64"),
    ("linux-arm64-protokube", "protokube-linux-arm64"),
    ("linux-amd64-channels", "channels-linux-amd64"),
    ("linux-arm64-channels", "channels-linux-arm64"),
];

pub const DEFAULT_KOPS_BASE_TEMPLATE: &str =
    "https://artifacts.k8s.io/binaries/kops/{kopsVersion}/";
const GITHUB_MIRROR_TEMPLATE: &str =
    "https://github.com/kubernetes/kops/releases/download/v{kopsVersion}/";
const S3_MIRROR_TEMPLATE: &str = "https://kubeupv2.s3.amazonaws.com/kops/{kopsVersion}/";

fn expand(template: &str, kops_version: &str) -> String {
    template.replace("{kopsVersion}", kops_version)
}

/// The registry of known mirror rules, expanded for one kops version.
#[derive(Clone, Debug)]
pub struct MirrorRegistry {
    rules: Vec<MirrorRule>,
}

impl MirrorRegistry {
    pub fn for_kops_version(kops_version: &str) -> MirrorRegistry {
        MirrorRegistry {
            rules: vec![MirrorRule {
                base: expand(DEFAULT_KOPS_BASE_TEMPLATE, kops_version),
                mirrors: vec![
                    Mirror {
                        base: expand(GITHUB_MIRROR_TEMPLATE, kops_version),
                        layout: MirrorLayout::Flattened,
                    },
                    Mirror {
                        base: expand(S3_MIRROR_TEMPLATE, kops_version),
                        layout: MirrorLayout::Preserve,
                    },
                ],
            }],
        }
    }

    /// Fans `url` out to its known mirrors. The canonical URL is always the
    /// first entry; a URL no rule covers is returned alone.
    pub fn find_mirrors(&self, url: &str) -> Vec<String> {
        for rule in &self.rules {
            if let Some(suffix) = url.strip_prefix(rule.base.as_str()) {
                let mut locations = vec![url.to_string()];
                for mirror in &rule.mirrors {
                    let suffix = match mirror.layout {
                        MirrorLayout::Preserve => suffix.to_string(),
                        MirrorLayout::Flattened => {
                            let flat = suffix.replace('/', "-");
                            FLATTENED_RENAMES
                                .iter()
                                .find(|(from, _)| *from == flat)
                                .map(|(_, to)| to.to_string())
                                .unwrap_or(flat)
                        }
                    };
                    locations.push(format!("{}{suffix}", mirror.base));
                }
                return locations;
            }
        }
        vec![url.to_string()]
    }
}

/// An asset with every location known to serve the same bytes.
///
/// Without a hash there is nothing to verify a mirror against, so the
/// location list stays at just the canonical URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MirroredAsset {
    locations: Vec<String>,
    hash: Option<Hash>,
}

impl MirroredAsset {
    pub fn new(registry: &MirrorRegistry, canonical: &str, hash: Option<Hash>) -> MirroredAsset {
        let locations = if hash.is_some() {
            registry.find_mirrors(canonical)
        } else {
            vec![canonical.to_string()]
        };
        MirroredAsset { locations, hash }
    }

    pub fn canonical(&self) -> &str {
        &self.locations[0]
    }

    pub fn locations(&self) -> &[String] {
        &self.locations
    }

    pub fn hash(&self) -> Option<&Hash> {
        self.hash.as_ref()
    }

    /// The wire form written into a node config:
    /// `<hex-hash>@<url1>,<url2>,…`, or just the URLs when no hash is known.
    pub fn compact_string(&self) -> String {
        let urls = self.locations.join(",");
        match &self.hash {
            Some(hash) => format!("{hash}@{urls}"),
            None => urls,
        }
    }

    /// Parses the wire form back into locations and hash.
    pub fn parse_compact(input: &str) -> Result<MirroredAsset, Error> {
        let (hash, urls) = match input.split_once('@') {
            Some((hash, urls)) => (Some(Hash::from_hex(hash)?), urls),
            None => (None, input),
        };
        let locations: Vec<String> = urls
            .split(',')
            .filter(|u| !u.is_empty())
            .map(str::to_string)
            .collect();
        if locations.is_empty() {
            return Err(Error::InvalidUrl(input.to_string()));
        }
        Ok(MirroredAsset { locations, hash })
    }
}
