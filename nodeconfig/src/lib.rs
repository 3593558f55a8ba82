//! Per-instance-group node bootstrap payloads: the full `NodeUpConfig` a
//! node needs to join the cluster and the tiny `BootConfig` preamble baked
//! into its boot script.

mod builder;
mod config;
mod keyset;
mod store;

use miette::Diagnostic;
use thiserror::Error as ThisError;

pub use builder::{NodeUpConfigBuilder, WellKnownAddresses, WellKnownService, KOPS_CONTROLLER_PORT};
pub use config::{BootConfig, ConfigServerOptions, NodeUpConfig, StaticManifestRef};
pub use keyset::{Keyset, KeysetItem, Keysets};
pub use store::ConfigStore;

#[derive(Debug, ThisError, Diagnostic)]
#[non_exhaustive]
pub enum Error {
    #[error("keyset `{0}` not found")]
    #[diagnostic(code(nodeconfig::key_not_found))]
    KeyNotFound(String),

    #[error("instance group `{name}` has role {role}, which takes no node config")]
    #[diagnostic(code(nodeconfig::role_unknown))]
    RoleUnknown { name: String, role: String },

    #[error("DNS mode \"none\" needs at least one reachable API server address on {cloud}")]
    #[diagnostic(code(nodeconfig::dns_mode_unsupported))]
    DnsModeUnsupported { cloud: String },

    #[error("invalid CIDR `{0}` on cluster networking")]
    #[diagnostic(code(nodeconfig::invalid_cidr))]
    InvalidCidr(String),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Assets(#[from] keel_assets::Error),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Vfs(#[from] keel_vfs::Error),

    #[error("could not serialize `{path}`: {message}")]
    #[diagnostic(code(nodeconfig::serialize))]
    Serialize { path: String, message: String },
}
