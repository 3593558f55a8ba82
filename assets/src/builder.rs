use std::collections::BTreeMap;

use keel_api::{Cluster, CloudProvider, ContainerRuntime, InstanceGroupRole, KubernetesVersion};
use keel_vfs::{BoxFuture, VfsContext, build_vfs_path};
use tracing::debug;
use url::Url;

use crate::{
    Error,
    arch::Architecture,
    hash::Hash,
    image::{ContainerRef, ImageAsset},
    mirrors::{MirrorRegistry, MirroredAsset},
    urls::KopsAssetResolver,
    wellknown,
};

/// A binary or archive nodes download, with its authoritative location, the
/// location nodes actually fetch from, and the content hash both must match.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileAsset {
    pub name: String,
    pub canonical: Url,
    pub download: Url,
    pub hash: Hash,
}

/// A static pod manifest carried on the cluster spec, served to matching
/// roles unchanged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaticManifest {
    pub key: String,
    pub path: String,
    pub roles: Vec<InstanceGroupRole>,
}

/// An opaque file carried on the cluster spec, served to matching roles
/// unchanged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaticFile {
    pub path: String,
    pub content: String,
    pub roles: Vec<InstanceGroupRole>,
}

/// Looks up the content hash published alongside an artifact.
pub trait HashReader: Send + Sync {
    fn discover<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, Result<Option<Hash>, Error>>;
}

/// Reads `.sha256` / `.sha1` sidecar files published next to the artifact.
pub struct SidecarHashReader<'a> {
    vfs: &'a VfsContext,
}

impl<'a> SidecarHashReader<'a> {
    pub fn new(vfs: &'a VfsContext) -> Self {
        Self { vfs }
    }
}

impl HashReader for SidecarHashReader<'_> {
    fn discover<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, Result<Option<Hash>, Error>> {
        Box::pin(async move {
            for extension in [".sha256", ".sha1"] {
                let sidecar = build_vfs_path(&format!("{url}{extension}"))?;
                match self.vfs.read_file(&sidecar).await {
                    Ok(bytes) => {
                        let text = String::from_utf8_lossy(&bytes);
                        // Sidecars are either the bare digest or
                        // `<digest>  <filename>`.
                        if let Some(first) = text.split_whitespace().next() {
                            return Ok(Some(Hash::from_hex(first)?));
                        }
                    }
                    Err(err) if err.is_not_found() => continue,
                    Err(err) => return Err(err.into()),
                }
            }
            Ok(None)
        })
    }
}

const CONTROL_PLANE_IMAGES: &[&str] = &[
    "kube-apiserver",
    "kube-controller-manager",
    "kube-scheduler",
];

/// Collects every file and image asset a cluster's nodes need, remapping the
/// download locations into the cluster's file repository / container
/// registry when one is configured.
pub struct AssetBuilder<'a> {
    cluster: &'a Cluster,
    kubernetes_version: &'a KubernetesVersion,
    resolver: &'a KopsAssetResolver,
    hash_reader: &'a dyn HashReader,
    env: BTreeMap<String, String>,
    registry: MirrorRegistry,
    file_assets: BTreeMap<Architecture, Vec<FileAsset>>,
    image_assets: Vec<ImageAsset>,
    static_manifests: Vec<StaticManifest>,
    static_files: Vec<StaticFile>,
}

impl<'a> AssetBuilder<'a> {
    pub fn new(
        cluster: &'a Cluster,
        kubernetes_version: &'a KubernetesVersion,
        resolver: &'a KopsAssetResolver,
        hash_reader: &'a dyn HashReader,
        env: BTreeMap<String, String>,
    ) -> AssetBuilder<'a> {
        AssetBuilder {
            cluster,
            kubernetes_version,
            resolver,
            hash_reader,
            env,
            registry: MirrorRegistry::for_kops_version(resolver.kops_version()),
            file_assets: BTreeMap::new(),
            image_assets: Vec::new(),
            static_manifests: Vec::new(),
            static_files: Vec::new(),
        }
    }

    /// Collects the full asset set for every architecture.
    ///
    /// An architecture whose container runtime has no published download
    /// (legacy containerd only ships the bundle for amd64) is dropped from
    /// the set rather than failing the whole build.
    pub async fn build(&mut self) -> Result<(), Error> {
        for arch in Architecture::ALL {
            match self.build_architecture_assets(arch).await {
                Ok(()) => {}
                Err(Error::UnknownUrl {
                    component: "containerd",
                    version,
                    ..
                }) => {
                    debug!(%arch, %version, "no containerd download for this architecture, skipping");
                    self.file_assets.remove(&arch);
                }
                Err(err) => return Err(err),
            }
        }
        self.build_core_images()?;
        Ok(())
    }

    pub fn file_assets(&self, arch: Architecture) -> &[FileAsset] {
        self.file_assets.get(&arch).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn image_assets(&self) -> &[ImageAsset] {
        &self.image_assets
    }

    /// The mirrored form of a file asset, fanned out to known mirrors.
    pub fn mirrored(&self, asset: &FileAsset) -> MirroredAsset {
        MirroredAsset::new(
            &self.registry,
            asset.download.as_str(),
            Some(asset.hash.clone()),
        )
    }

    /// The canonical location fanned out to known mirrors; copy stages
    /// download from these rather than from the remapped location.
    pub fn canonical_mirrored(&self, asset: &FileAsset) -> MirroredAsset {
        MirroredAsset::new(
            &self.registry,
            asset.canonical.as_str(),
            Some(asset.hash.clone()),
        )
    }

    pub fn add_static_manifest(&mut self, manifest: StaticManifest) {
        self.static_manifests.push(manifest);
    }

    pub fn add_static_file(&mut self, file: StaticFile) {
        self.static_files.push(file);
    }

    pub fn manifests_for_role(&self, role: InstanceGroupRole) -> Vec<&StaticManifest> {
        self.static_manifests
            .iter()
            .filter(|m| m.roles.contains(&role))
            .collect()
    }

    pub fn files_for_role(&self, role: InstanceGroupRole) -> Vec<&StaticFile> {
        self.static_files
            .iter()
            .filter(|f| f.roles.contains(&role))
            .collect()
    }

    /// Core control-plane and node images, tagged with the cluster's
    /// Kubernetes version.
    fn build_core_images(&mut self) -> Result<(), Error> {
        let version = self.kubernetes_version.version();
        let tag = format!("v{version}");
        for name in CONTROL_PLANE_IMAGES.iter().chain(["kube-proxy"].iter()) {
            self.remap_image(&format!("registry.k8s.io/{name}:{tag}"))?;
        }
        Ok(())
    }

    /// Images only the control plane runs; used to build per-role lists.
    pub fn images_for_role(&self, role: InstanceGroupRole) -> Vec<&ImageAsset> {
        self.image_assets
            .iter()
            .filter(|asset| {
                let control_plane_only = CONTROL_PLANE_IMAGES
                    .iter()
                    .any(|name| asset.canonical.path.ends_with(name));
                !control_plane_only || role == InstanceGroupRole::ControlPlane
            })
            .collect()
    }

    async fn build_architecture_assets(&mut self, arch: Architecture) -> Result<(), Error> {
        debug!(%arch, "collecting file assets");
        let k8s_base = self.kubernetes_base_url()?;

        for name in ["kubelet", "kubectl"] {
            let url = join(&k8s_base, &format!("bin/linux/{arch}/{name}"))?;
            self.add_file_url(arch, name, url, None).await?;
        }

        if self.cluster.spec.cloud_provider == CloudProvider::Gce {
            let url = join(&k8s_base, &format!("bin/linux/{arch}/mounter"))?;
            self.add_file_url(arch, "mounter", url, None).await?;
        }

        if let Some((name, asset)) = wellknown::find_credential_provider(
            self.cluster.spec.cloud_provider,
            self.kubernetes_version,
            arch,
        )? {
            self.add_file_url(arch, name, asset.url, asset.hash).await?;
        }

        let cni = wellknown::find_cni_asset(self.kubernetes_version, arch, &self.env)?;
        self.add_file_url(arch, "cni-plugins", cni.url, cni.hash)
            .await?;

        self.build_runtime_assets(arch).await?;

        let crictl = wellknown::find_crictl_asset(arch)?;
        self.add_file_url(arch, "crictl", crictl.url, crictl.hash)
            .await?;

        for name in ["nodeup", "protokube", "channels"] {
            let url = self.resolver.file_url(name, arch)?;
            self.add_file_url(arch, name, url, None).await?;
        }

        Ok(())
    }

    async fn build_runtime_assets(&mut self, arch: Architecture) -> Result<(), Error> {
        let runtime = &self.cluster.spec.container_runtime;

        if let Some(pinned) = &runtime.url {
            let hash = match &runtime.hash {
                Some(hex) => Hash::from_hex(hex)?,
                None => return Err(Error::MissingHash(pinned.clone())),
            };
            let url = Url::parse(pinned).map_err(|_| Error::InvalidUrl(pinned.clone()))?;
            self.add_file_url(arch, "container-runtime", url, Some(hash))
                .await?;
            return Ok(());
        }

        match runtime.runtime {
            ContainerRuntime::Containerd => {
                let version = runtime
                    .version
                    .as_deref()
                    .unwrap_or(wellknown::DEFAULT_CONTAINERD_VERSION);
                let url = wellknown::find_containerd_version_url(arch, version)?;
                let hash = wellknown::containerd_hash(version, arch);
                self.add_file_url(arch, "containerd", url, hash).await?;

                if wellknown::runc_needed_with_containerd(version)? {
                    let runc_version = wellknown::DEFAULT_RUNC_VERSION;
                    let url = wellknown::find_runc_version_url(arch, runc_version)?;
                    let hash = wellknown::runc_hash(runc_version, arch);
                    self.add_file_url(arch, "runc", url, hash).await?;

                    let nerdctl = wellknown::find_nerdctl_asset(arch)?;
                    self.add_file_url(arch, "nerdctl", nerdctl.url, nerdctl.hash)
                        .await?;
                }
            }
            ContainerRuntime::Crio => {
                let crio = wellknown::find_crio_asset(
                    arch,
                    runtime.version.as_deref().unwrap_or(wellknown::DEFAULT_CRIO_VERSION),
                )?;
                self.add_file_url(arch, "cri-o", crio.url, crio.hash).await?;
            }
        }
        Ok(())
    }

    /// Records one file asset: resolves the hash if not already known,
    /// applies the file-repository remap, and coalesces duplicates.
    async fn add_file_url(
        &mut self,
        arch: Architecture,
        name: &str,
        canonical: Url,
        hash: Option<Hash>,
    ) -> Result<(), Error> {
        let hash = match hash {
            Some(hash) => hash,
            None => self
                .hash_reader
                .discover(&canonical)
                .await?
                .ok_or_else(|| Error::MissingHash(canonical.to_string()))?,
        };
        let download = self.remap_file(&canonical)?;

        let assets = self.file_assets.entry(arch).or_default();
        if let Some(existing) = assets.iter().find(|a| a.canonical == canonical) {
            if existing.download == download {
                return Ok(());
            }
            return Err(Error::InconsistentRemap {
                canonical: canonical.to_string(),
                first: existing.download.to_string(),
                second: download.to_string(),
            });
        }

        assets.push(FileAsset {
            name: name.to_string(),
            canonical,
            download,
            hash,
        });
        Ok(())
    }

    /// Records one image asset, relocating it into the cluster's container
    /// registry when one is configured.
    pub fn remap_image(&mut self, canonical: &str) -> Result<ImageAsset, Error> {
        let canonical = ContainerRef::parse(canonical)?;
        let download = match self
            .cluster
            .spec
            .assets
            .as_ref()
            .and_then(|a| a.container_registry.as_deref())
        {
            Some(registry) => canonical.relocated(registry),
            None => canonical.clone(),
        };

        if let Some(existing) = self
            .image_assets
            .iter()
            .find(|a| a.canonical == canonical)
        {
            if existing.download == download {
                return Ok(existing.clone());
            }
            return Err(Error::InconsistentRemap {
                canonical: canonical.to_string(),
                first: existing.download.to_string(),
                second: download.to_string(),
            });
        }

        let asset = ImageAsset {
            canonical,
            download,
        };
        self.image_assets.push(asset.clone());
        Ok(asset)
    }

    /// The file-repository remap: the canonical path is preserved exactly
    /// under the repository root.
    fn remap_file(&self, canonical: &Url) -> Result<Url, Error> {
        let Some(repository) = self
            .cluster
            .spec
            .assets
            .as_ref()
            .and_then(|a| a.file_repository.as_deref())
        else {
            return Ok(canonical.clone());
        };
        let remapped = format!("{}{}", repository.trim_end_matches('/'), canonical.path());
        Url::parse(&remapped).map_err(|_| Error::InvalidUrl(remapped))
    }

    fn kubernetes_base_url(&self) -> Result<Url, Error> {
        let raw = if self.kubernetes_version.is_base_url() {
            self.kubernetes_version.raw().to_string()
        } else {
            let version = self.kubernetes_version.raw().trim_start_matches('v');
            format!("https://dl.k8s.io/release/v{version}/")
        };
        let raw = if raw.ends_with('/') { raw } else { format!("{raw}/") };
        Url::parse(&raw).map_err(|_| Error::InvalidUrl(raw))
    }
}

fn join(base: &Url, segment: &str) -> Result<Url, Error> {
    base.join(segment)
        .map_err(|_| Error::InvalidUrl(segment.to_string()))
}
