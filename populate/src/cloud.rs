use std::{future::Future, pin::Pin};

use keel_api::CloudProvider;

use crate::Error;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a cloud adapter reports about an existing shared VPC.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VpcInfo {
    pub cidr: String,
    pub subnets: Vec<VpcSubnet>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VpcSubnet {
    pub id: String,
    pub zone: String,
    pub cidr: Option<String>,
}

/// The slice of a cloud adapter the populator needs.
pub trait Cloud: Send + Sync {
    fn provider_id(&self) -> CloudProvider;

    fn find_vpc_info<'a>(
        &'a self,
        network_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<VpcInfo>, Error>>;
}
