use std::{fmt, str::FromStr, sync::Arc};

use crate::Error;

/// A location in the virtual filesystem: a local path, or a
/// `scheme://` URL (`memfs`, `s3`, `gs`, `http`, `https`).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VfsPath {
    inner: Arc<str>,
}

impl VfsPath {
    pub fn scheme(&self) -> &str {
        match self.inner.split_once("://") {
            Some((scheme, _)) => scheme,
            None => "file",
        }
    }

    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// Appends one path segment, normalizing the separator.
    pub fn join(&self, segment: &str) -> VfsPath {
        let base = self.inner.trim_end_matches('/');
        let segment = segment.trim_start_matches('/');
        VfsPath {
            inner: Arc::from(format!("{base}/{segment}")),
        }
    }
}

impl fmt::Display for VfsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner)
    }
}

impl FromStr for VfsPath {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        build_vfs_path(input)
    }
}

/// Builds a [`VfsPath`] from user input.
///
/// S3 and GCS HTTPS endpoints are canonicalized to their `s3://` / `gs://`
/// forms; anything else containing `://` passes through unchanged; everything
/// else is treated as a local path.
pub fn build_vfs_path(input: &str) -> Result<VfsPath, Error> {
    if input.is_empty() {
        return Err(Error::InvalidPath(input.to_string()));
    }

    if let Some(rest) = input.strip_prefix("https://s3.") {
        // https://s3.<region>.amazonaws.com/<bucket>/<key>
        if let Some((host, bucket_and_key)) = rest.split_once('/')
            && host.ends_with(".amazonaws.com")
            && !bucket_and_key.is_empty()
        {
            return Ok(VfsPath {
                inner: Arc::from(format!("s3://{bucket_and_key}")),
            });
        }
    }

    if let Some(bucket_and_key) = input.strip_prefix("https://storage.googleapis.com/")
        && !bucket_and_key.is_empty()
    {
        return Ok(VfsPath {
            inner: Arc::from(format!("gs://{bucket_and_key}")),
        });
    }

    if let Some((scheme, rest)) = input.split_once("://") {
        if scheme.is_empty() || rest.is_empty() {
            return Err(Error::InvalidPath(input.to_string()));
        }
        return Ok(VfsPath {
            inner: Arc::from(input),
        });
    }

    Ok(VfsPath {
        inner: Arc::from(input),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalizes_s3_https() {
        let p = build_vfs_path("https://s3.us-east-1.amazonaws.com/bucket/some/key").unwrap();
        assert_eq!(p.as_str(), "s3://bucket/some/key");
        assert_eq!(p.scheme(), "s3");
    }

    #[test]
    fn canonicalizes_gcs_https() {
        let p = build_vfs_path("https://storage.googleapis.com/bucket/key").unwrap();
        assert_eq!(p.as_str(), "gs://bucket/key");
        assert_eq!(p.scheme(), "gs");
    }

    #[test]
    fn passes_through_other_urls() {
        let p = build_vfs_path("memfs://tests/cluster").unwrap();
        assert_eq!(p.as_str(), "memfs://tests/cluster");
        let p = build_vfs_path("https://example.com/file").unwrap();
        assert_eq!(p.scheme(), "https");
    }

    #[test]
    fn local_paths() {
        let p = build_vfs_path("/var/lib/keel/state").unwrap();
        assert_eq!(p.scheme(), "file");
    }

    #[test]
    fn join_normalizes_separators() {
        let p = build_vfs_path("s3://bucket/base/").unwrap();
        assert_eq!(p.join("/pki/ca.crt").as_str(), "s3://bucket/base/pki/ca.crt");
    }

    #[test]
    fn rejects_empty() {
        assert!(build_vfs_path("").is_err());
        assert!(build_vfs_path("://x").is_err());
    }
}
