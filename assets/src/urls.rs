use std::{
    collections::BTreeMap,
    sync::Mutex,
};

use url::Url;

use crate::{Error, arch::Architecture, mirrors::DEFAULT_KOPS_BASE_TEMPLATE};

pub const KOPS_BASE_URL_ENV: &str = "KOPS_BASE_URL";

/// Resolves download URLs for the kops-side binaries (`nodeup`, `protokube`,
/// `channels`).
///
/// The artifact base can be overridden per architecture
/// (`KOPS_BASE_URL_AMD64`, `KOPS_BASE_URL_ARM64`) or globally
/// (`KOPS_BASE_URL`). The environment is snapshotted at construction time, so
/// a resolver's answers never change under it, and the resolved base is
/// memoized per architecture.
#[derive(Debug)]
pub struct KopsAssetResolver {
    kops_version: String,
    env: BTreeMap<String, String>,
    resolved: Mutex<BTreeMap<Architecture, Url>>,
}

impl KopsAssetResolver {
    /// Snapshots the relevant environment variables and builds a resolver for
    /// `kops_version`.
    pub fn from_env(kops_version: &str) -> KopsAssetResolver {
        let mut env = BTreeMap::new();
        for key in [
            KOPS_BASE_URL_ENV.to_string(),
            format!("{KOPS_BASE_URL_ENV}_{}", Architecture::Amd64.env_suffix()),
            format!("{KOPS_BASE_URL_ENV}_{}", Architecture::Arm64.env_suffix()),
        ] {
            if let Ok(value) = std::env::var(&key)
                && !value.is_empty()
            {
                env.insert(key, value);
            }
        }
        KopsAssetResolver::with_env(kops_version, env)
    }

    /// Builds a resolver over an explicit environment snapshot. Tests use
    /// this to exercise overrides without touching process state.
    pub fn with_env(kops_version: &str, env: BTreeMap<String, String>) -> KopsAssetResolver {
        KopsAssetResolver {
            kops_version: kops_version.to_string(),
            env,
            resolved: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn kops_version(&self) -> &str {
        &self.kops_version
    }

    /// The artifact base for `arch`, with a trailing slash.
    pub fn base_url(&self, arch: Architecture) -> Result<Url, Error> {
        {
            let resolved = self.resolved.lock().expect("resolver lock poisoned");
            if let Some(url) = resolved.get(&arch) {
                return Ok(url.clone());
            }
        }

        let arch_key = format!("{KOPS_BASE_URL_ENV}_{}", arch.env_suffix());
        let raw = self
            .env
            .get(&arch_key)
            .or_else(|| self.env.get(KOPS_BASE_URL_ENV))
            .cloned()
            .unwrap_or_else(|| {
                DEFAULT_KOPS_BASE_TEMPLATE.replace("{kopsVersion}", &self.kops_version)
            });
        let raw = if raw.ends_with('/') { raw } else { format!("{raw}/") };
        let url = Url::parse(&raw).map_err(|_| Error::InvalidUrl(raw))?;

        let mut resolved = self.resolved.lock().expect("resolver lock poisoned");
        resolved.insert(arch, url.clone());
        Ok(url)
    }

    /// `<base>/linux/<arch>/<name>`.
    pub fn file_url(&self, name: &str, arch: Architecture) -> Result<Url, Error> {
        let base = self.base_url(arch)?;
        base.join(&format!("linux/{arch}/{name}"))
            .map_err(|_| Error::InvalidUrl(name.to_string()))
    }
}
