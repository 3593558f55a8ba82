//! The spec populator: expands a partial cluster spec into a complete,
//! defaulted, validated one. The transformation is idempotent; running it on
//! an already-complete spec changes nothing.

mod cloud;
mod cluster;
mod instancegroup;
mod versions;

use miette::Diagnostic;
use thiserror::Error as ThisError;

pub use cloud::{BoxFuture, Cloud, VpcInfo, VpcSubnet};
pub use cluster::populate_cluster;
pub use instancegroup::populate_instance_group;
pub use versions::{StableChannelVersionSource, VersionSource};

#[derive(Debug, ThisError, Diagnostic)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Api(#[from] keel_api::Error),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Net(#[from] keel_net::Error),

    #[error("no VPC found for network id `{0}`")]
    #[diagnostic(code(populate::vpc_not_found))]
    VpcNotFound(String),

    #[error("cloud adapter error: {0}")]
    #[diagnostic(code(populate::cloud))]
    Cloud(String),

    #[error("could not resolve a Kubernetes version: {0}")]
    #[diagnostic(code(populate::version_resolution))]
    VersionResolution(String),
}
