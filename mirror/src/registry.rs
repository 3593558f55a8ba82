use std::{future::Future, pin::Pin};

use keel_assets::ContainerRef;

use crate::Error;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub const OCI_IMAGE_INDEX_MEDIA_TYPE: &str = "application/vnd.oci.image.index.v1+json";
pub const DOCKER_MANIFEST_LIST_MEDIA_TYPE: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";

/// The parts of a registry manifest the copier cares about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageManifest {
    pub media_type: String,
    pub digest: String,
}

impl ImageManifest {
    /// Multi-architecture manifests point at per-platform manifests and are
    /// copied as a whole.
    pub fn is_index(&self) -> bool {
        self.media_type == OCI_IMAGE_INDEX_MEDIA_TYPE
            || self.media_type == DOCKER_MANIFEST_LIST_MEDIA_TYPE
    }
}

/// The slice of a container registry API the copier needs. Implementations
/// handle authentication and blob transfer.
pub trait ImageRegistry: Send + Sync {
    /// The manifest an image reference currently points at, or `None` when
    /// the reference does not exist.
    fn manifest<'a>(
        &'a self,
        image: &'a ContainerRef,
    ) -> BoxFuture<'a, Result<Option<ImageManifest>, Error>>;

    /// Copies a multi-architecture index and every manifest it references.
    fn copy_index<'a>(
        &'a self,
        source: &'a ContainerRef,
        target: &'a ContainerRef,
    ) -> BoxFuture<'a, Result<(), Error>>;

    /// Copies a single-architecture image.
    fn copy_image<'a>(
        &'a self,
        source: &'a ContainerRef,
        target: &'a ContainerRef,
    ) -> BoxFuture<'a, Result<(), Error>>;
}
