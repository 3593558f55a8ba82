use ipnet::IpNet;
use keel_api::{SubnetSpec, SubnetType};

use crate::{
    Error,
    cidr::{CidrMap, nets_overlap, split_into},
};

/// Assigns CIDRs to the subnets that do not declare one.
///
/// The network CIDR is carved into eight "big" blocks; the first big block is
/// carved into eight "utility" blocks. Public and Private subnets take big
/// blocks (zone-sorted), Utility subnets take utility blocks (zone-sorted).
/// Subnets with a declared CIDR are kept verbatim and their ranges are
/// excluded from the pools. Two runs over the same input produce identical
/// assignments.
pub fn assign_subnet_cidrs(network_cidr: IpNet, subnets: &mut [SubnetSpec]) -> Result<(), Error> {
    let mut reserved = CidrMap::new();
    for subnet in subnets.iter() {
        if let Some(cidr) = subnet.cidr.as_deref() {
            reserved.mark_in_use(cidr)?;
        }
    }

    let big_blocks = split_into(3, network_cidr)?;
    let utility_blocks = split_into(3, big_blocks[0])?;

    // The first big block is held back for utility subnets.
    let big_pool = big_blocks[1..]
        .iter()
        .filter(|block| reserved.is_free(block))
        .copied()
        .collect::<Vec<_>>();
    let utility_pool = utility_blocks
        .iter()
        .filter(|block| reserved.is_free(block))
        .copied()
        .collect::<Vec<_>>();

    let big_indices = sorted_unassigned(subnets, |t| {
        matches!(t, SubnetType::Public | SubnetType::Private)
    });
    take_blocks(
        network_cidr,
        big_indices,
        big_pool.into_iter(),
        &mut reserved,
        subnets,
    )?;

    let utility_indices = sorted_unassigned(subnets, |t| matches!(t, SubnetType::Utility));
    take_blocks(
        network_cidr,
        utility_indices,
        utility_pool.into_iter(),
        &mut reserved,
        subnets,
    )?;

    debug_assert!(no_overlaps(subnets));
    Ok(())
}

fn take_blocks(
    network_cidr: IpNet,
    indices: Vec<usize>,
    mut pool: impl Iterator<Item = IpNet>,
    reserved: &mut CidrMap,
    subnets: &mut [SubnetSpec],
) -> Result<(), Error> {
    for index in indices {
        let block = pool
            .find(|candidate| reserved.is_free(candidate))
            .ok_or_else(|| Error::Exhausted {
                parent: network_cidr.to_string(),
                prefix_len: network_cidr.prefix_len().saturating_add(3),
            })?;
        reserved.mark_net_in_use(block);
        subnets[index].cidr = Some(block.to_string());
    }
    Ok(())
}

fn sorted_unassigned(subnets: &[SubnetSpec], wanted: impl Fn(SubnetType) -> bool) -> Vec<usize> {
    let mut indices: Vec<usize> = subnets
        .iter()
        .enumerate()
        .filter(|(_, s)| s.cidr.is_none() && wanted(s.subnet_type))
        .map(|(i, _)| i)
        .collect();
    indices.sort_by(|a, b| {
        let sa = &subnets[*a];
        let sb = &subnets[*b];
        (&sa.zone, sa.name.as_str()).cmp(&(&sb.zone, sb.name.as_str()))
    });
    indices
}

fn no_overlaps(subnets: &[SubnetSpec]) -> bool {
    let nets: Vec<IpNet> = subnets
        .iter()
        .filter_map(|s| s.cidr.as_deref())
        .filter_map(|c| c.parse().ok())
        .collect();
    for (i, a) in nets.iter().enumerate() {
        for b in &nets[i + 1..] {
            if nets_overlap(a, b) {
                return false;
            }
        }
    }
    true
}
