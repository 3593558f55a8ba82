//! Asset resolution: everything nodes download gets a canonical URL, a
//! download URL (possibly a user-controlled mirror), and a content hash.
//!
//! The [`builder::AssetBuilder`] walks a completed cluster spec and collects
//! file and image assets; [`mirrors`] fans a canonical URL out to well-known
//! mirror locations; [`wellknown`] holds the version and hash tables for the
//! third-party components nodes need.

pub mod arch;
pub mod builder;
pub mod hash;
pub mod image;
pub mod mirrors;
pub mod urls;
pub mod wellknown;

use miette::Diagnostic;
use thiserror::Error as ThisError;

pub use arch::Architecture;
pub use builder::{
    AssetBuilder, FileAsset, HashReader, SidecarHashReader, StaticFile, StaticManifest,
};
pub use hash::{Hash, HashAlgorithm, file_extension_for_sha};
pub use image::{ContainerRef, ImageAsset};
pub use mirrors::{MirrorRegistry, MirroredAsset};
pub use urls::KopsAssetResolver;

#[derive(Debug, ThisError, Diagnostic)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid hash `{0}`")]
    #[diagnostic(code(assets::invalid_hash))]
    InvalidHash(String),

    #[error("hash `{hash}` has length {len}; only sha1 (40) and sha256 (64) are recognized")]
    #[diagnostic(code(assets::unknown_hash_length))]
    UnknownHashLength { hash: String, len: usize },

    #[error("unknown architecture `{0}`")]
    #[diagnostic(code(assets::unknown_architecture))]
    UnknownArchitecture(String),

    #[error("invalid image reference `{0}`")]
    #[diagnostic(code(assets::invalid_image_ref))]
    InvalidImageRef(String),

    #[error("invalid URL `{0}`")]
    #[diagnostic(code(assets::invalid_url))]
    InvalidUrl(String),

    #[error("invalid {component} version `{version}`")]
    #[diagnostic(code(assets::invalid_version))]
    InvalidVersion {
        component: &'static str,
        version: String,
    },

    #[error("no known {component} download for version {version} on {arch}")]
    #[diagnostic(code(assets::unknown_url))]
    UnknownUrl {
        component: &'static str,
        version: String,
        arch: Architecture,
    },

    #[error("{component} version {version} is not supported")]
    #[diagnostic(code(assets::unsupported_version))]
    UnsupportedVersion {
        component: &'static str,
        version: String,
    },

    #[error("no hash known for `{0}`")]
    #[diagnostic(code(assets::missing_hash))]
    MissingHash(String),

    #[error("canonical `{canonical}` remapped to both `{first}` and `{second}`")]
    #[diagnostic(code(assets::inconsistent_remap))]
    InconsistentRemap {
        canonical: String,
        first: String,
        second: String,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Vfs(#[from] keel_vfs::Error),
}
