use std::{fmt, str::FromStr, sync::Arc};

use sha1::{Digest as _, Sha1};
use sha2::Sha256;

use crate::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
}

/// A content hash, identified by the length of its hex form: 40 hex digits is
/// sha1, 64 is sha256. Anything else is rejected up front.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hash {
    algorithm: HashAlgorithm,
    hex: Arc<str>,
}

impl Hash {
    pub fn from_hex(hex: &str) -> Result<Hash, Error> {
        let hex = hex.trim();
        let algorithm = match hex.len() {
            40 => HashAlgorithm::Sha1,
            64 => HashAlgorithm::Sha256,
            len => {
                return Err(Error::UnknownHashLength {
                    hash: hex.to_string(),
                    len,
                });
            }
        };
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::InvalidHash(hex.to_string()));
        }
        Ok(Hash {
            algorithm,
            hex: Arc::from(hex.to_ascii_lowercase()),
        })
    }

    pub fn of(algorithm: HashAlgorithm, data: &[u8]) -> Hash {
        let hex = match algorithm {
            HashAlgorithm::Sha1 => hex::encode(Sha1::digest(data)),
            HashAlgorithm::Sha256 => hex::encode(Sha256::digest(data)),
        };
        Hash {
            algorithm,
            hex: Arc::from(hex),
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// The sidecar extension written next to a mirrored file.
    pub fn file_extension(&self) -> &'static str {
        match self.algorithm {
            HashAlgorithm::Sha1 => ".sha1",
            HashAlgorithm::Sha256 => ".sha256",
        }
    }

    pub fn matches(&self, data: &[u8]) -> bool {
        Hash::of(self.algorithm, data) == *self
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex)
    }
}

impl FromStr for Hash {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Hash::from_hex(value)
    }
}

/// Sidecar extension for a raw hex digest, without constructing a [`Hash`].
pub fn file_extension_for_sha(hex: &str) -> Result<&'static str, Error> {
    Ok(Hash::from_hex(hex)?.file_extension())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_selects_algorithm() {
        let sha1 = Hash::from_hex(&"a".repeat(40)).unwrap();
        assert_eq!(sha1.algorithm(), HashAlgorithm::Sha1);
        let sha256 = Hash::from_hex(&"b".repeat(64)).unwrap();
        assert_eq!(sha256.algorithm(), HashAlgorithm::Sha256);
    }

    #[test]
    fn extension_by_length() {
        assert_eq!(file_extension_for_sha(&"a".repeat(40)).unwrap(), ".sha1");
        assert_eq!(file_extension_for_sha(&"a".repeat(64)).unwrap(), ".sha256");
        assert!(matches!(
            file_extension_for_sha(&"a".repeat(50)),
            Err(Error::UnknownHashLength { len: 50, .. })
        ));
    }

    #[test]
    fn rejects_non_hex() {
        assert!(matches!(
            Hash::from_hex(&"z".repeat(40)),
            Err(Error::InvalidHash(_))
        ));
    }

    #[test]
    fn digest_round_trip() {
        let hash = Hash::of(HashAlgorithm::Sha256, b"hello");
        assert!(hash.matches(b"hello"));
        assert!(!hash.matches(b"other"));
        assert_eq!(Hash::from_hex(hash.hex()).unwrap(), hash);
    }

    #[test]
    fn hex_is_normalized_lowercase() {
        let hash = Hash::from_hex(&"AB".repeat(20)).unwrap();
        assert_eq!(hash.hex(), &"ab".repeat(20));
    }
}
