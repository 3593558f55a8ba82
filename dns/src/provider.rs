use std::{future::Future, pin::Pin};

use tracing::info;

use crate::{
    Error,
    records::{DnsZone, Record},
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The slice of a cloud DNS API the pre-creator needs.
pub trait DnsProvider: Send + Sync {
    fn list_zones(&self) -> BoxFuture<'_, Result<Vec<DnsZone>, Error>>;

    fn list_records<'a>(&'a self, zone: &'a DnsZone) -> BoxFuture<'a, Result<Vec<Record>, Error>>;

    /// Creates the given records in one provider call.
    fn create_records<'a>(
        &'a self,
        zone: &'a DnsZone,
        records: &'a [Record],
    ) -> BoxFuture<'a, Result<(), Error>>;
}

/// A batch of record additions against one zone, applied in a single
/// provider call. Consuming `apply` makes double-application impossible.
#[derive(Clone, Debug)]
pub struct Changeset {
    zone: DnsZone,
    additions: Vec<Record>,
}

impl Changeset {
    pub fn new(zone: DnsZone) -> Changeset {
        Changeset {
            zone,
            additions: Vec::new(),
        }
    }

    pub fn add(&mut self, record: Record) {
        self.additions.push(record);
    }

    pub fn is_empty(&self) -> bool {
        self.additions.is_empty()
    }

    pub fn additions(&self) -> &[Record] {
        &self.additions
    }

    pub async fn apply(self, provider: &dyn DnsProvider) -> Result<(), Error> {
        if self.additions.is_empty() {
            return Ok(());
        }
        info!(
            zone = %self.zone.name,
            records = self.additions.len(),
            "applying DNS changeset"
        );
        provider.create_records(&self.zone, &self.additions).await
    }
}
