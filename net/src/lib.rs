//! Subnet CIDR allocation: an overlap-free CIDR set, deterministic block
//! splitting, and the assignment policy that fills in undeclared subnet
//! CIDRs.

mod cidr;
mod subnets;

use miette::Diagnostic;
use thiserror::Error as ThisError;

pub use cidr::{CidrMap, cidr_host, cidr_subnet, split_into};
pub use subnets::assign_subnet_cidrs;

#[derive(Debug, ThisError, Diagnostic)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid CIDR `{0}`")]
    #[diagnostic(code(net::invalid_cidr))]
    InvalidCidr(String),

    #[error("no free /{prefix_len} block left in `{parent}`")]
    #[diagnostic(code(net::cidr_exhausted))]
    Exhausted { parent: String, prefix_len: u8 },

    #[error("cannot split a CIDR into 2^{0} blocks (1-3 additional bits supported)")]
    #[diagnostic(code(net::invalid_split))]
    InvalidSplit(u8),

    #[error("subnet index {index} does not fit in `{parent}`")]
    #[diagnostic(code(net::subnet_index_out_of_range))]
    SubnetIndexOutOfRange { parent: String, index: u64 },
}
