use std::{
    collections::BTreeMap,
    future::Future,
    io,
    pin::Pin,
    sync::{Arc, Mutex, OnceLock},
    time::Duration,
};

use crate::{Error, VfsPath};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Access control for written objects. Only object stores distinguish the
/// two; the built-in backends ignore it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Acl {
    #[default]
    Private,
    PublicRead,
}

/// A storage backend serving one or more URL schemes.
pub trait VfsBackend: Send + Sync {
    fn read<'a>(&'a self, path: &'a VfsPath) -> BoxFuture<'a, Result<Vec<u8>, Error>>;
    fn write<'a>(
        &'a self,
        path: &'a VfsPath,
        data: &'a [u8],
        acl: Acl,
    ) -> BoxFuture<'a, Result<(), Error>>;
}

#[derive(Clone, Debug, Default)]
struct MemFs {
    files: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl MemFs {
    fn read(&self, path: &VfsPath) -> Result<Vec<u8>, Error> {
        let files = self.files.lock().expect("memfs lock poisoned");
        files
            .get(path.as_str())
            .cloned()
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }

    fn write(&self, path: &VfsPath, data: &[u8]) {
        let mut files = self.files.lock().expect("memfs lock poisoned");
        files.insert(path.as_str().to_string(), data.to_vec());
    }
}

/// Dispatches reads and writes by URL scheme.
///
/// `memfs`, local paths, and `http`/`https` (read-only) are built in;
/// object-store backends are registered by the surrounding tooling.
#[derive(Clone, Default)]
pub struct VfsContext {
    mem: MemFs,
    remotes: BTreeMap<String, Arc<dyn VfsBackend>>,
}

impl std::fmt::Debug for VfsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VfsContext")
            .field("remotes", &self.remotes.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl VfsContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new context that also serves `scheme` from `backend`.
    /// Registering a scheme again shadows the earlier backend.
    pub fn with_backend(&self, scheme: &str, backend: Arc<dyn VfsBackend>) -> Self {
        let mut remotes = self.remotes.clone();
        remotes.insert(scheme.to_string(), backend);
        Self {
            mem: self.mem.clone(),
            remotes,
        }
    }

    pub async fn read_file(&self, path: &VfsPath) -> Result<Vec<u8>, Error> {
        match path.scheme() {
            "memfs" => self.mem.read(path),
            "file" => read_local(path).await,
            "http" | "https" => http_read(path).await,
            scheme => match self.remotes.get(scheme) {
                Some(backend) => backend.read(path).await,
                None => Err(Error::UnsupportedScheme(scheme.to_string())),
            },
        }
    }

    pub async fn write_file(&self, path: &VfsPath, data: &[u8], acl: Acl) -> Result<(), Error> {
        match path.scheme() {
            "memfs" => {
                self.mem.write(path, data);
                Ok(())
            }
            "file" => write_local(path, data).await,
            "http" | "https" => Err(Error::ReadOnlyScheme(path.scheme().to_string())),
            scheme => match self.remotes.get(scheme) {
                Some(backend) => backend.write(path, data, acl).await,
                None => Err(Error::UnsupportedScheme(scheme.to_string())),
            },
        }
    }
}

async fn read_local(path: &VfsPath) -> Result<Vec<u8>, Error> {
    match tokio::fs::read(path.as_str()).await {
        Ok(data) => Ok(data),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            Err(Error::NotFound(path.to_string()))
        }
        Err(err) => Err(Error::Io(err)),
    }
}

async fn write_local(path: &VfsPath, data: &[u8]) -> Result<(), Error> {
    if let Some(parent) = std::path::Path::new(path.as_str()).parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path.as_str(), data).await?;
    Ok(())
}

fn http_client() -> Result<&'static reqwest::Client, Error> {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    if let Some(client) = CLIENT.get() {
        return Ok(client);
    }
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(Error::Http)?;
    Ok(CLIENT.get_or_init(|| client))
}

async fn http_read(path: &VfsPath) -> Result<Vec<u8>, Error> {
    let res = http_client()?.get(path.as_str()).send().await?;
    if res.status() == reqwest::StatusCode::NOT_FOUND {
        return Err(Error::NotFound(path.to_string()));
    }
    let res = res.error_for_status()?;
    Ok(res.bytes().await?.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build_vfs_path;

    #[tokio::test]
    async fn memfs_round_trip() {
        let ctx = VfsContext::new();
        let path = build_vfs_path("memfs://tests/file").unwrap();
        ctx.write_file(&path, b"hello", Acl::Private).await.unwrap();
        assert_eq!(ctx.read_file(&path).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn memfs_missing_is_not_found() {
        let ctx = VfsContext::new();
        let path = build_vfs_path("memfs://tests/absent").unwrap();
        assert!(matches!(
            ctx.read_file(&path).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn local_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("state/config");
        let path = build_vfs_path(file.to_str().unwrap()).unwrap();
        let ctx = VfsContext::new();
        ctx.write_file(&path, b"data", Acl::Private).await.unwrap();
        assert_eq!(ctx.read_file(&path).await.unwrap(), b"data");
    }

    #[tokio::test]
    async fn unregistered_scheme_rejected() {
        let ctx = VfsContext::new();
        let path = build_vfs_path("s3://bucket/key").unwrap();
        assert!(matches!(
            ctx.read_file(&path).await,
            Err(Error::UnsupportedScheme(_))
        ));
    }

    #[tokio::test]
    async fn backend_registration_serves_scheme() {
        struct Fixed;
        impl VfsBackend for Fixed {
            fn read<'a>(&'a self, _path: &'a VfsPath) -> BoxFuture<'a, Result<Vec<u8>, Error>> {
                Box::pin(std::future::ready(Ok(b"fixed".to_vec())))
            }
            fn write<'a>(
                &'a self,
                _path: &'a VfsPath,
                _data: &'a [u8],
                _acl: Acl,
            ) -> BoxFuture<'a, Result<(), Error>> {
                Box::pin(std::future::ready(Ok(())))
            }
        }

        let ctx = VfsContext::new().with_backend("s3", Arc::new(Fixed));
        let path = build_vfs_path("s3://bucket/key").unwrap();
        assert_eq!(ctx.read_file(&path).await.unwrap(), b"fixed");
    }
}
