use std::collections::BTreeMap;

use keel_assets::{Architecture, AssetBuilder, ContainerRef, Hash, MirroredAsset};
use keel_vfs::{Acl, VfsContext, VfsPath, build_vfs_path};
use tracing::{debug, info, warn};

use crate::{Error, registry::ImageRegistry};

/// Everything a copy task needs to run: the VFS for file targets and the
/// registry client for image targets.
#[derive(Clone, Copy)]
pub struct CopyContext<'a> {
    pub vfs: &'a VfsContext,
    pub registry: Option<&'a dyn ImageRegistry>,
}

/// One unit of copy work. Each variant knows its target identity (for
/// deduplication and scheduling) and how to execute itself.
#[derive(Clone, Debug)]
pub enum CopyTask {
    File {
        source: MirroredAsset,
        target: VfsPath,
        hash: Hash,
    },
    Image {
        source: ContainerRef,
        target: ContainerRef,
    },
}

impl CopyTask {
    pub fn target_name(&self) -> String {
        match self {
            CopyTask::File { target, .. } => target.to_string(),
            CopyTask::Image { target, .. } => target.to_string(),
        }
    }

    pub fn source_name(&self) -> String {
        match self {
            CopyTask::File { source, .. } => source.canonical().to_string(),
            CopyTask::Image { source, .. } => source.to_string(),
        }
    }

    pub async fn run(&self, ctx: &CopyContext<'_>) -> Result<(), Error> {
        match self {
            CopyTask::File {
                source,
                target,
                hash,
            } => copy_file(ctx.vfs, source, target, hash).await,
            CopyTask::Image { source, target } => {
                let registry = ctx
                    .registry
                    .ok_or_else(|| Error::NoRegistryClient(target.to_string()))?;
                copy_image(registry, source, target).await
            }
        }
    }
}

/// The tasks needed to mirror every asset whose download location differs
/// from its canonical one, deduplicated and conflict-checked.
pub fn build_copy_tasks(assets: &AssetBuilder<'_>) -> Result<Vec<CopyTask>, Error> {
    let mut tasks = Vec::new();

    for arch in Architecture::ALL {
        for asset in assets.file_assets(arch) {
            if asset.download == asset.canonical {
                continue;
            }
            tasks.push(CopyTask::File {
                source: assets.canonical_mirrored(asset),
                target: build_vfs_path(asset.download.as_str())?,
                hash: asset.hash.clone(),
            });
        }
    }

    for image in assets.image_assets() {
        if image.download == image.canonical {
            continue;
        }
        tasks.push(CopyTask::Image {
            source: image.canonical.clone(),
            target: image.download.clone(),
        });
    }

    plan_copy_tasks(tasks)
}

/// Deduplicates tasks by target, rejecting inconsistent duplicates before
/// any I/O: the same target fed from two sources (or with two hashes), or
/// the same source fanned out to two targets. The result is sorted by
/// target name so scheduling is deterministic.
pub fn plan_copy_tasks(tasks: Vec<CopyTask>) -> Result<Vec<CopyTask>, Error> {
    let mut by_target: BTreeMap<String, CopyTask> = BTreeMap::new();
    let mut by_source: BTreeMap<String, String> = BTreeMap::new();

    for task in tasks {
        let target = task.target_name();
        let source = task.source_name();

        if let Some(existing) = by_target.get(&target) {
            if existing.source_name() != source {
                return Err(Error::TargetConflict {
                    target,
                    first: existing.source_name(),
                    second: source,
                });
            }
            if let (
                CopyTask::File { hash: first, .. },
                CopyTask::File { hash: second, .. },
            ) = (existing, &task)
                && first != second
            {
                return Err(Error::HashConflict {
                    target,
                    first: first.to_string(),
                    second: second.to_string(),
                });
            }
            continue;
        }

        if let Some(first) = by_source.get(&source)
            && *first != target
        {
            return Err(Error::SourceConflict {
                canonical: source,
                first: first.clone(),
                second: target,
            });
        }

        by_source.insert(source, target.clone());
        by_target.insert(target, task);
    }

    Ok(by_target.into_values().collect())
}

/// Downloads the asset from the first reachable location, verifies the
/// hash, and writes the bytes plus a digest sidecar to the target. Skips
/// the download entirely when the target's sidecar already carries the
/// expected digest.
async fn copy_file(
    vfs: &VfsContext,
    source: &MirroredAsset,
    target: &VfsPath,
    hash: &Hash,
) -> Result<(), Error> {
    let sidecar = build_vfs_path(&format!("{}{}", target.as_str(), hash.file_extension()))?;

    match vfs.read_file(&sidecar).await {
        Ok(bytes) => {
            let text = String::from_utf8_lossy(&bytes);
            if text.split_whitespace().next() == Some(hash.hex()) {
                debug!(%target, "already mirrored, skipping");
                return Ok(());
            }
        }
        Err(err) if err.is_not_found() => {}
        Err(err) => return Err(err.into()),
    }

    let mut data = None;
    let mut last_err = None;
    for location in source.locations() {
        let path = build_vfs_path(location)?;
        match vfs.read_file(&path).await {
            Ok(bytes) if hash.matches(&bytes) => {
                data = Some(bytes);
                break;
            }
            Ok(bytes) => {
                let actual = Hash::of(hash.algorithm(), &bytes);
                warn!(%location, %actual, "downloaded bytes do not match expected hash");
                last_err = Some(Error::HashMismatch {
                    url: location.clone(),
                    expected: hash.to_string(),
                    actual: actual.to_string(),
                });
            }
            Err(err) => {
                warn!(%location, error = %err, "download failed, trying next location");
                last_err = Some(err.into());
            }
        }
    }

    let data = match (data, last_err) {
        (Some(data), _) => data,
        (None, Some(err)) => return Err(err),
        (None, None) => return Err(Error::DownloadFailed(target.to_string())),
    };

    vfs.write_file(target, &data, Acl::PublicRead).await?;
    vfs.write_file(
        &sidecar,
        format!("{}\n", hash.hex()).as_bytes(),
        Acl::PublicRead,
    )
    .await?;
    info!(%target, bytes = data.len(), "mirrored file asset");
    Ok(())
}

/// Copies one image: skipped when the target already carries the source
/// digest, copied as an index when the source manifest is one.
async fn copy_image(
    registry: &dyn ImageRegistry,
    source: &ContainerRef,
    target: &ContainerRef,
) -> Result<(), Error> {
    let manifest = registry
        .manifest(source)
        .await?
        .ok_or_else(|| Error::ManifestNotFound(source.to_string()))?;

    if let Some(existing) = registry.manifest(target).await?
        && existing.digest == manifest.digest
    {
        debug!(%target, digest = %manifest.digest, "already mirrored, skipping");
        return Ok(());
    }

    if manifest.is_index() {
        registry.copy_index(source, target).await?;
    } else {
        registry.copy_image(source, target).await?;
    }
    info!(%source, %target, "mirrored image asset");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap as Map, sync::Mutex};

    use keel_api::{Cluster, KubernetesVersion};
    use keel_assets::{HashAlgorithm, HashReader, KopsAssetResolver};
    use url::Url;

    use super::*;
    use crate::registry::{
        BoxFuture, DOCKER_MANIFEST_LIST_MEDIA_TYPE, ImageManifest, OCI_IMAGE_INDEX_MEDIA_TYPE,
    };

    fn file_task(hash_hex: &str, source: &str, target: &str) -> CopyTask {
        let mirrored = MirroredAsset::parse_compact(&format!("{hash_hex}@{source}")).unwrap();
        let hash = mirrored.hash().cloned().unwrap();
        CopyTask::File {
            source: mirrored,
            target: build_vfs_path(target).unwrap(),
            hash,
        }
    }

    fn sha256_of(data: &[u8]) -> Hash {
        Hash::of(HashAlgorithm::Sha256, data)
    }

    #[test]
    fn duplicate_tasks_collapse() {
        let hex = "ab".repeat(32);
        let tasks = vec![
            file_task(&hex, "https://a/b.tgz", "s3://repo/b.tgz"),
            file_task(&hex, "https://a/b.tgz", "s3://repo/b.tgz"),
        ];
        assert_eq!(plan_copy_tasks(tasks).unwrap().len(), 1);
    }

    #[test]
    fn same_target_different_source_is_rejected() {
        let hex = "ab".repeat(32);
        let tasks = vec![
            file_task(&hex, "https://a/b.tgz", "s3://repo/b.tgz"),
            file_task(&hex, "https://c/b.tgz", "s3://repo/b.tgz"),
        ];
        assert!(matches!(
            plan_copy_tasks(tasks),
            Err(Error::TargetConflict { .. })
        ));
    }

    #[test]
    fn same_target_different_hash_is_rejected() {
        let tasks = vec![
            file_task(&"ab".repeat(32), "https://a/b.tgz", "s3://repo/b.tgz"),
            file_task(&"cd".repeat(32), "https://a/b.tgz", "s3://repo/b.tgz"),
        ];
        assert!(matches!(
            plan_copy_tasks(tasks),
            Err(Error::HashConflict { .. })
        ));
    }

    #[test]
    fn same_source_different_targets_is_rejected() {
        let hex = "ab".repeat(32);
        let tasks = vec![
            file_task(&hex, "https://a/b.tgz", "s3://r1/b.tgz"),
            file_task(&hex, "https://a/b.tgz", "s3://r2/b.tgz"),
        ];
        let err = plan_copy_tasks(tasks).unwrap_err();
        assert!(err.to_string().contains("different targets for same file"));
        match err {
            Error::SourceConflict { canonical, .. } => assert_eq!(canonical, "https://a/b.tgz"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn tasks_sorted_by_target() {
        let hex = "ab".repeat(32);
        let tasks = vec![
            file_task(&hex, "https://a/z.tgz", "s3://repo/z.tgz"),
            file_task(&hex, "https://a/a.tgz", "s3://repo/a.tgz"),
        ];
        let planned = plan_copy_tasks(tasks).unwrap();
        let names: Vec<String> = planned.iter().map(CopyTask::target_name).collect();
        assert_eq!(names, ["s3://repo/a.tgz", "s3://repo/z.tgz"]);
    }

    #[tokio::test]
    async fn copy_file_writes_bytes_and_sidecar() {
        let vfs = VfsContext::new();
        let data = b"artifact bytes";
        let hash = sha256_of(data);
        let source_path = build_vfs_path("memfs://src/a.tgz").unwrap();
        vfs.write_file(&source_path, data, Acl::Private).await.unwrap();

        let task = file_task(hash.hex(), "memfs://src/a.tgz", "memfs://repo/a.tgz");
        let ctx = CopyContext {
            vfs: &vfs,
            registry: None,
        };
        task.run(&ctx).await.unwrap();

        let target = build_vfs_path("memfs://repo/a.tgz").unwrap();
        assert_eq!(vfs.read_file(&target).await.unwrap(), data);
        let sidecar = build_vfs_path("memfs://repo/a.tgz.sha256").unwrap();
        let written = vfs.read_file(&sidecar).await.unwrap();
        assert_eq!(String::from_utf8_lossy(&written).trim(), hash.hex());
    }

    #[tokio::test]
    async fn copy_file_skips_when_sidecar_matches() {
        let vfs = VfsContext::new();
        let hash = sha256_of(b"already there");
        let sidecar = build_vfs_path("memfs://repo/a.tgz.sha256").unwrap();
        vfs.write_file(&sidecar, hash.hex().as_bytes(), Acl::Private)
            .await
            .unwrap();

        // The source does not exist, so anything but a skip would fail.
        let task = file_task(hash.hex(), "memfs://src/absent.tgz", "memfs://repo/a.tgz");
        let ctx = CopyContext {
            vfs: &vfs,
            registry: None,
        };
        task.run(&ctx).await.unwrap();
    }

    #[tokio::test]
    async fn copy_file_falls_back_to_next_location() {
        let vfs = VfsContext::new();
        let data = b"mirror copy";
        let hash = sha256_of(data);
        let mirror = build_vfs_path("memfs://mirror/a.tgz").unwrap();
        vfs.write_file(&mirror, data, Acl::Private).await.unwrap();

        let task = file_task(
            hash.hex(),
            "memfs://src/absent.tgz,memfs://mirror/a.tgz",
            "memfs://repo/a.tgz",
        );
        let ctx = CopyContext {
            vfs: &vfs,
            registry: None,
        };
        task.run(&ctx).await.unwrap();

        let target = build_vfs_path("memfs://repo/a.tgz").unwrap();
        assert_eq!(vfs.read_file(&target).await.unwrap(), data);
    }

    #[tokio::test]
    async fn copy_file_rejects_corrupted_download() {
        let vfs = VfsContext::new();
        let source_path = build_vfs_path("memfs://src/a.tgz").unwrap();
        vfs.write_file(&source_path, b"tampered", Acl::Private)
            .await
            .unwrap();

        let expected = sha256_of(b"original");
        let task = file_task(expected.hex(), "memfs://src/a.tgz", "memfs://repo/a.tgz");
        let ctx = CopyContext {
            vfs: &vfs,
            registry: None,
        };
        assert!(matches!(
            task.run(&ctx).await,
            Err(Error::HashMismatch { .. })
        ));

        let target = build_vfs_path("memfs://repo/a.tgz").unwrap();
        assert!(vfs.read_file(&target).await.is_err());
    }

    #[derive(Default)]
    struct FakeRegistry {
        manifests: Map<String, ImageManifest>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeRegistry {
        fn with_manifest(mut self, image: &str, media_type: &str, digest: &str) -> Self {
            self.manifests.insert(
                image.to_string(),
                ImageManifest {
                    media_type: media_type.to_string(),
                    digest: digest.to_string(),
                },
            );
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ImageRegistry for FakeRegistry {
        fn manifest<'a>(
            &'a self,
            image: &'a ContainerRef,
        ) -> BoxFuture<'a, Result<Option<ImageManifest>, Error>> {
            Box::pin(std::future::ready(Ok(self
                .manifests
                .get(&image.to_string())
                .cloned())))
        }

        fn copy_index<'a>(
            &'a self,
            source: &'a ContainerRef,
            target: &'a ContainerRef,
        ) -> BoxFuture<'a, Result<(), Error>> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("index {source} -> {target}"));
            Box::pin(std::future::ready(Ok(())))
        }

        fn copy_image<'a>(
            &'a self,
            source: &'a ContainerRef,
            target: &'a ContainerRef,
        ) -> BoxFuture<'a, Result<(), Error>> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("image {source} -> {target}"));
            Box::pin(std::future::ready(Ok(())))
        }
    }

    fn image_task(source: &str, target: &str) -> CopyTask {
        CopyTask::Image {
            source: ContainerRef::parse(source).unwrap(),
            target: ContainerRef::parse(target).unwrap(),
        }
    }

    #[tokio::test]
    async fn image_copy_skips_matching_digest() {
        let registry = FakeRegistry::default()
            .with_manifest(
                "registry.k8s.io/kube-proxy:v1.28.3",
                OCI_IMAGE_INDEX_MEDIA_TYPE,
                "sha256:abc",
            )
            .with_manifest(
                "registry.example.com/kube-proxy:v1.28.3",
                OCI_IMAGE_INDEX_MEDIA_TYPE,
                "sha256:abc",
            );
        let vfs = VfsContext::new();
        let ctx = CopyContext {
            vfs: &vfs,
            registry: Some(&registry),
        };
        image_task(
            "registry.k8s.io/kube-proxy:v1.28.3",
            "registry.example.com/kube-proxy:v1.28.3",
        )
        .run(&ctx)
        .await
        .unwrap();
        assert!(registry.calls().is_empty());
    }

    #[tokio::test]
    async fn image_copy_dispatches_on_media_type() {
        let registry = FakeRegistry::default()
            .with_manifest(
                "registry.k8s.io/kube-proxy:v1.28.3",
                DOCKER_MANIFEST_LIST_MEDIA_TYPE,
                "sha256:abc",
            )
            .with_manifest(
                "registry.k8s.io/pause:3.9",
                "application/vnd.oci.image.manifest.v1+json",
                "sha256:def",
            );
        let vfs = VfsContext::new();
        let ctx = CopyContext {
            vfs: &vfs,
            registry: Some(&registry),
        };

        image_task(
            "registry.k8s.io/kube-proxy:v1.28.3",
            "registry.example.com/kube-proxy:v1.28.3",
        )
        .run(&ctx)
        .await
        .unwrap();
        image_task("registry.k8s.io/pause:3.9", "registry.example.com/pause:3.9")
            .run(&ctx)
            .await
            .unwrap();

        assert_eq!(
            registry.calls(),
            [
                "index registry.k8s.io/kube-proxy:v1.28.3 -> registry.example.com/kube-proxy:v1.28.3",
                "image registry.k8s.io/pause:3.9 -> registry.example.com/pause:3.9",
            ]
        );
    }

    #[tokio::test]
    async fn image_copy_without_source_manifest_fails() {
        let registry = FakeRegistry::default();
        let vfs = VfsContext::new();
        let ctx = CopyContext {
            vfs: &vfs,
            registry: Some(&registry),
        };
        assert!(matches!(
            image_task("registry.k8s.io/pause:3.9", "registry.example.com/pause:3.9")
                .run(&ctx)
                .await,
            Err(Error::ManifestNotFound(_))
        ));
    }

    #[tokio::test]
    async fn image_copy_without_registry_client_fails() {
        let vfs = VfsContext::new();
        let ctx = CopyContext {
            vfs: &vfs,
            registry: None,
        };
        assert!(matches!(
            image_task("registry.k8s.io/pause:3.9", "registry.example.com/pause:3.9")
                .run(&ctx)
                .await,
            Err(Error::NoRegistryClient(_))
        ));
    }

    /// Answers every hash query with a fixed sha256 digest, as the published
    /// sidecars would.
    struct FixedHashReader;

    impl HashReader for FixedHashReader {
        fn discover<'a>(
            &'a self,
            _url: &'a Url,
        ) -> keel_vfs::BoxFuture<'a, Result<Option<Hash>, keel_assets::Error>> {
            Box::pin(std::future::ready(Ok(Some(
                Hash::from_hex(&"ab".repeat(32)).unwrap(),
            ))))
        }
    }

    #[tokio::test]
    async fn build_copy_tasks_covers_remapped_assets_only() {
        let cluster: Cluster = serde_yaml::from_str(
            r#"
name: c1.example.com
spec:
  cloudProvider: aws
  kubernetesVersion: 1.28.3
  assets:
    fileRepository: s3://repo/mirror
    containerRegistry: registry.example.com
"#,
        )
        .unwrap();
        let version = KubernetesVersion::parse("1.28.3").unwrap();
        let resolver = KopsAssetResolver::with_env("1.28.0", Map::new());
        let reader = FixedHashReader;
        let mut builder =
            AssetBuilder::new(&cluster, &version, &resolver, &reader, Map::new());
        builder.build().await.unwrap();

        let tasks = build_copy_tasks(&builder).unwrap();
        assert!(!tasks.is_empty());
        for task in &tasks {
            match task {
                CopyTask::File { source, target, .. } => {
                    assert!(target.as_str().starts_with("s3://repo/mirror/"));
                    assert!(source.canonical().starts_with("https://"));
                }
                CopyTask::Image { target, .. } => {
                    assert_eq!(target.domain, "registry.example.com");
                }
            }
        }

        let names: Vec<String> = tasks.iter().map(CopyTask::target_name).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }
}
