//! A small virtual filesystem: one path type covering local files and
//! `scheme://` URLs, and a context that dispatches reads and writes to the
//! backend owning each scheme.

mod context;
mod path;

use miette::Diagnostic;
use thiserror::Error as ThisError;

pub use context::{Acl, BoxFuture, VfsBackend, VfsContext};
pub use path::{VfsPath, build_vfs_path};

#[derive(Debug, ThisError, Diagnostic)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid path `{0}`")]
    #[diagnostic(code(vfs::invalid_path))]
    InvalidPath(String),

    #[error("no backend registered for scheme `{0}`")]
    #[diagnostic(code(vfs::unsupported_scheme))]
    UnsupportedScheme(String),

    #[error("`{0}` not found")]
    #[diagnostic(code(vfs::not_found))]
    NotFound(String),

    #[error("scheme `{0}` is read-only")]
    #[diagnostic(code(vfs::read_only_scheme))]
    ReadOnlyScheme(String),

    #[error("i/o error")]
    #[diagnostic(code(vfs::io))]
    Io(#[from] std::io::Error),

    #[error("http error")]
    #[diagnostic(code(vfs::http))]
    Http(#[from] reqwest::Error),

    #[error("backend error: {0}")]
    #[diagnostic(code(vfs::backend))]
    Backend(String),
}

impl Error {
    /// True when the error means "no object at this path", as opposed to a
    /// transport or permission failure. Callers probing for optional files
    /// (hash sidecars, previous state) branch on this.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}
