use std::net::IpAddr;

use ipnet::IpNet;

use crate::Error;

fn addr_to_u128(addr: IpAddr) -> u128 {
    match addr {
        IpAddr::V4(v4) => u32::from(v4) as u128,
        IpAddr::V6(v6) => u128::from(v6),
    }
}

fn u128_to_addr(value: u128, is_v4: bool) -> Option<IpAddr> {
    if is_v4 {
        let v: u32 = value.try_into().ok()?;
        Some(IpAddr::V4(v.into()))
    } else {
        Some(IpAddr::V6(value.into()))
    }
}

pub(crate) fn nets_overlap(a: &IpNet, b: &IpNet) -> bool {
    a.contains(&b.addr()) || b.contains(&a.addr())
}

/// The set of CIDRs already spoken for during an allocation run.
///
/// No two recorded entries overlap; `allocate` upholds that by construction
/// and `mark_in_use` is the caller's assertion that a range is taken.
#[derive(Clone, Debug, Default)]
pub struct CidrMap {
    in_use: Vec<IpNet>,
}

impl CidrMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_in_use(&mut self, cidr: &str) -> Result<(), Error> {
        let net: IpNet = cidr
            .parse()
            .map_err(|_| Error::InvalidCidr(cidr.to_string()))?;
        self.mark_net_in_use(net);
        Ok(())
    }

    pub fn mark_net_in_use(&mut self, net: IpNet) {
        self.in_use.push(net);
    }

    pub fn is_free(&self, candidate: &IpNet) -> bool {
        !self.in_use.iter().any(|used| nets_overlap(used, candidate))
    }

    /// Returns the lowest-numbered free subnet of size `prefix_len` inside
    /// `from`, skipping the first subnet-stride of the parent (the lowest
    /// block is conventionally reserved).
    ///
    /// A successful allocation is recorded as in-use.
    pub fn allocate(&mut self, from: IpNet, prefix_len: u8) -> Result<IpNet, Error> {
        if prefix_len <= from.prefix_len() || prefix_len > from.max_prefix_len() {
            return Err(Error::Exhausted {
                parent: from.to_string(),
                prefix_len,
            });
        }

        let is_v4 = matches!(from, IpNet::V4(_));
        let host_bits = u32::from(from.max_prefix_len() - prefix_len);
        let stride: u128 = 1 << host_bits;
        let parent_base = addr_to_u128(from.network());
        let parent_last = addr_to_u128(from.broadcast());

        let mut candidate = parent_base
            .checked_add(stride)
            .ok_or_else(|| Error::Exhausted {
                parent: from.to_string(),
                prefix_len,
            })?;

        loop {
            match candidate.checked_add(stride - 1) {
                Some(last) if last <= parent_last => {}
                _ => {
                    return Err(Error::Exhausted {
                        parent: from.to_string(),
                        prefix_len,
                    });
                }
            }

            let addr = u128_to_addr(candidate, is_v4).ok_or_else(|| Error::Exhausted {
                parent: from.to_string(),
                prefix_len,
            })?;
            let net =
                IpNet::new(addr, prefix_len).map_err(|_| Error::InvalidCidr(addr.to_string()))?;

            if self.is_free(&net) {
                self.mark_net_in_use(net);
                return Ok(net);
            }

            candidate = match candidate.checked_add(stride) {
                Some(next) => next,
                None => {
                    return Err(Error::Exhausted {
                        parent: from.to_string(),
                        prefix_len,
                    });
                }
            };
        }
    }
}

/// Splits `parent` into its 2^n equally-sized children, in increasing order.
/// Only 1, 2, or 3 additional bits are supported.
pub fn split_into(additional_bits: u8, parent: IpNet) -> Result<Vec<IpNet>, Error> {
    if !(1..=3).contains(&additional_bits) {
        return Err(Error::InvalidSplit(additional_bits));
    }
    let new_prefix = parent
        .prefix_len()
        .checked_add(additional_bits)
        .filter(|p| *p <= parent.max_prefix_len())
        .ok_or_else(|| Error::Exhausted {
            parent: parent.to_string(),
            prefix_len: parent.prefix_len().saturating_add(additional_bits),
        })?;
    let children = parent
        .subnets(new_prefix)
        .map_err(|_| Error::InvalidSplit(additional_bits))?
        .collect();
    Ok(children)
}

/// Returns the `index`-th subnet of size `new_prefix_len` within `parent`,
/// counting from the parent's network address.
pub fn cidr_subnet(parent: &str, new_prefix_len: u8, index: u64) -> Result<IpNet, Error> {
    let parent: IpNet = parent
        .parse()
        .map_err(|_| Error::InvalidCidr(parent.to_string()))?;
    if new_prefix_len <= parent.prefix_len() || new_prefix_len > parent.max_prefix_len() {
        return Err(Error::SubnetIndexOutOfRange {
            parent: parent.to_string(),
            index,
        });
    }

    let is_v4 = matches!(parent, IpNet::V4(_));
    let stride: u128 = 1 << u32::from(parent.max_prefix_len() - new_prefix_len);
    let base = addr_to_u128(parent.network());
    let offset = stride
        .checked_mul(index as u128)
        .and_then(|o| base.checked_add(o))
        .ok_or_else(|| Error::SubnetIndexOutOfRange {
            parent: parent.to_string(),
            index,
        })?;
    let last = offset + (stride - 1);
    if last > addr_to_u128(parent.broadcast()) {
        return Err(Error::SubnetIndexOutOfRange {
            parent: parent.to_string(),
            index,
        });
    }

    let addr = u128_to_addr(offset, is_v4).ok_or_else(|| Error::SubnetIndexOutOfRange {
        parent: parent.to_string(),
        index,
    })?;
    IpNet::new(addr, new_prefix_len).map_err(|_| Error::InvalidCidr(addr.to_string()))
}

/// Returns the `index`-th address of `cidr`, counting from the network
/// address.
pub fn cidr_host(cidr: &IpNet, index: u128) -> Result<IpAddr, Error> {
    let base = addr_to_u128(cidr.network());
    let value = base
        .checked_add(index)
        .filter(|v| *v <= addr_to_u128(cidr.broadcast()))
        .ok_or_else(|| Error::SubnetIndexOutOfRange {
            parent: cidr.to_string(),
            index: index as u64,
        })?;
    u128_to_addr(value, matches!(cidr, IpNet::V4(_))).ok_or_else(|| {
        Error::SubnetIndexOutOfRange {
            parent: cidr.to_string(),
            index: index as u64,
        }
    })
}
