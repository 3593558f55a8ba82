use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One key-pair in a keyset: an id, its PEM certificate, and (for private
/// keysets) the PEM private key. The public key is carried separately where
/// consumers only need verification material.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeysetItem {
    pub id: String,
    pub certificate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

/// A named set of key-pairs with one designated primary.
///
/// The builder borrows a read-only snapshot for one pipeline run; the
/// keystore owns the lifecycle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Keyset {
    pub primary: KeysetItem,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub historical: Vec<KeysetItem>,
}

impl Keyset {
    pub fn primary_id(&self) -> &str {
        &self.primary.id
    }

    /// The full trust bundle: every certificate in the set, primary first.
    pub fn certificate_bundle(&self) -> String {
        let mut bundle = self.primary.certificate.clone();
        for item in &self.historical {
            if !bundle.ends_with('\n') {
                bundle.push('\n');
            }
            bundle.push_str(&item.certificate);
        }
        bundle
    }

    /// Every public key in the set, primary first. Used for the
    /// service-account verification keys handed to API servers.
    pub fn public_keys(&self) -> Vec<String> {
        std::iter::once(&self.primary)
            .chain(self.historical.iter())
            .filter_map(|item| item.public_key.clone())
            .collect()
    }
}

/// The materialized keysets a builder run works from, keyed by name.
pub type Keysets = BTreeMap<String, Keyset>;

#[cfg(test)]
mod tests {
    use super::*;

    fn keyset(primary_id: &str, historical_ids: &[&str]) -> Keyset {
        Keyset {
            primary: KeysetItem {
                id: primary_id.to_string(),
                certificate: format!("-----BEGIN CERTIFICATE-----\n{primary_id}\n-----END CERTIFICATE-----\n"),
                private_key: None,
                public_key: Some(format!("-----BEGIN PUBLIC KEY-----\n{primary_id}\n-----END PUBLIC KEY-----\n")),
            },
            historical: historical_ids
                .iter()
                .map(|id| KeysetItem {
                    id: id.to_string(),
                    certificate: format!("-----BEGIN CERTIFICATE-----\n{id}\n-----END CERTIFICATE-----\n"),
                    private_key: None,
                    public_key: None,
                })
                .collect(),
        }
    }

    #[test]
    fn bundle_contains_every_certificate_primary_first() {
        let ks = keyset("7001", &["6001", "6002"]);
        let bundle = ks.certificate_bundle();
        let first = bundle.find("7001").unwrap();
        assert!(first < bundle.find("6001").unwrap());
        assert!(bundle.contains("6002"));
    }

    #[test]
    fn public_keys_skip_items_without_one() {
        let ks = keyset("7001", &["6001"]);
        assert_eq!(ks.public_keys().len(), 1);
        assert_eq!(ks.primary_id(), "7001");
    }
}
