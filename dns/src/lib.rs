//! DNS pre-creation: before the first node boots, every hostname it will
//! query gets a placeholder record so first-boot lookups never populate
//! negative caches.

mod precreate;
mod provider;
mod records;

use miette::Diagnostic;
use thiserror::Error as ThisError;

pub use precreate::{
    PLACEHOLDER_IPV4, PLACEHOLDER_IPV6, DnsHostname, PrecreateOptions,
    build_precreate_dns_hostnames, precreate_dns,
};
pub use provider::{BoxFuture, Changeset, DnsProvider};
pub use records::{DnsZone, Record, RecordType};

#[derive(Debug, ThisError, Diagnostic)]
#[non_exhaustive]
pub enum Error {
    #[error("DNS provider error: {0}")]
    #[diagnostic(code(dns::provider))]
    Provider(String),

    #[error("no hosted zone found for cluster `{0}`")]
    #[diagnostic(code(dns::no_zone))]
    NoZoneFound(String),
}
