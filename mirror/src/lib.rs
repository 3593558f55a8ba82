//! Copies file and image assets from their canonical sources into a
//! user-controlled file repository / container registry, with bounded
//! concurrency and idempotent skips.

mod pool;
mod registry;
mod task;

use std::fmt;

use miette::Diagnostic;
use thiserror::Error as ThisError;

pub use pool::{DEFAULT_COPY_CONCURRENCY, copy_assets, run_copy_tasks};
pub use registry::{
    BoxFuture, DOCKER_MANIFEST_LIST_MEDIA_TYPE, ImageManifest, ImageRegistry,
    OCI_IMAGE_INDEX_MEDIA_TYPE,
};
pub use task::{CopyContext, CopyTask, build_copy_tasks, plan_copy_tasks};

/// One failed task inside an aggregate copy error.
#[derive(Debug)]
pub struct TaskFailure {
    pub target: String,
    pub error: Error,
}

fn format_failures(failures: &[TaskFailure]) -> String {
    let entries: Vec<String> = failures
        .iter()
        .map(|f| format!("{}: {}", f.target, f.error))
        .collect();
    entries.join("; ")
}

#[derive(Debug, ThisError, Diagnostic)]
#[non_exhaustive]
pub enum Error {
    #[error("hash mismatch for `{url}`: expected {expected}, got {actual}")]
    #[diagnostic(code(mirror::hash_mismatch))]
    HashMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("no download location succeeded for `{0}`")]
    #[diagnostic(code(mirror::download_failed))]
    DownloadFailed(String),

    #[error("`{target}` is written from both `{first}` and `{second}`")]
    #[diagnostic(code(mirror::target_conflict))]
    TargetConflict {
        target: String,
        first: String,
        second: String,
    },

    #[error("`{target}` expects two different hashes ({first} vs {second})")]
    #[diagnostic(code(mirror::hash_conflict))]
    HashConflict {
        target: String,
        first: String,
        second: String,
    },

    // `source` as a field name would collide with thiserror's source() chain.
    #[error("different targets for same file `{canonical}`: `{first}` and `{second}`")]
    #[diagnostic(code(mirror::source_conflict))]
    SourceConflict {
        canonical: String,
        first: String,
        second: String,
    },

    #[error("no manifest found for `{0}`")]
    #[diagnostic(code(mirror::manifest_not_found))]
    ManifestNotFound(String),

    #[error("no image registry client configured, cannot copy `{0}`")]
    #[diagnostic(code(mirror::no_registry_client))]
    NoRegistryClient(String),

    #[error("image registry error: {0}")]
    #[diagnostic(code(mirror::registry))]
    Registry(String),

    #[error("copy cancelled")]
    #[diagnostic(code(mirror::cancelled))]
    Cancelled,

    #[error(transparent)]
    #[diagnostic(transparent)]
    Assets(#[from] keel_assets::Error),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Vfs(#[from] keel_vfs::Error),

    #[error("{count} copy task(s) failed: {detail}", count = .0.len(), detail = format_failures(.0))]
    #[diagnostic(code(mirror::copy_failed))]
    Aggregate(Vec<TaskFailure>),
}

impl Error {
    /// The per-target failures of an aggregate error, in target order.
    pub fn failures(&self) -> &[TaskFailure] {
        match self {
            Error::Aggregate(failures) => failures,
            _ => &[],
        }
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.target, self.error)
    }
}
