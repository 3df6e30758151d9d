// FAT16 lookup table
// Decodes 16-bit FAT entries and manages cluster allocation on top of any table backend.

use super::cluster_chain::collect_chain;
use super::geometry::Geometry;
use fatkit_core::{FatError, FatResult};
use log::{debug, info};

pub const FAT16_FREE: u16 = 0x0000;
pub const FAT16_RESERVED: u16 = 0x0001;
pub const FAT16_BAD: u16 = 0xFFF7;
pub const FAT16_EOC_MIN: u16 = 0xFFF8;
pub const FAT16_EOC: u16 = 0xFFFF;

/// Meaning of one FAT entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatNext {
    Free,
    Reserved,
    Cluster(u16),
    Bad,
    EndOfChain,
}

impl FatNext {
    pub fn decode(raw: u16) -> Self {
        match raw {
            FAT16_FREE => FatNext::Free,
            FAT16_RESERVED => FatNext::Reserved,
            FAT16_BAD => FatNext::Bad,
            FAT16_EOC_MIN..=FAT16_EOC => FatNext::EndOfChain,
            next => FatNext::Cluster(next),
        }
    }

    pub fn encode(self) -> u16 {
        match self {
            FatNext::Free => FAT16_FREE,
            FatNext::Reserved => FAT16_RESERVED,
            FatNext::Cluster(next) => next,
            FatNext::Bad => FAT16_BAD,
            FatNext::EndOfChain => FAT16_EOC,
        }
    }
}

/// Cluster-to-cluster links of a volume.
///
/// Implementations read from the primary table and keep every copy in sync on write.
pub trait FatTable {
    fn next(&mut self, cluster: u16) -> FatResult<FatNext>;

    fn set(&mut self, cluster: u16, value: FatNext) -> FatResult<()>;
}

/// Mark every cluster of the chain starting at `start` free. Returns the number freed.
///
/// The whole chain is walked before anything is written, so a corrupt chain leaves the
/// table untouched.
pub fn free_chain<F: FatTable>(fat: &mut F, geometry: &Geometry, start: u16) -> FatResult<u32> {
    let chain = collect_chain(fat, geometry, start)?;
    for &cluster in &chain {
        fat.set(cluster, FatNext::Free)?;
    }
    debug!("Freed {} clusters starting at {}", chain.len(), start);
    Ok(chain.len() as u32)
}

/// Claim `count` free clusters first-fit and link them into a chain.
pub fn allocate_chain<F: FatTable>(fat: &mut F, geometry: &Geometry, count: u32) -> FatResult<Vec<u16>> {
    if count == 0 {
        return Ok(Vec::new());
    }

    let mut clusters = Vec::with_capacity(count as usize);
    for cluster in geometry.data_clusters() {
        if fat.next(cluster)? == FatNext::Free {
            clusters.push(cluster);
            if clusters.len() == count as usize {
                break;
            }
        }
    }

    if clusters.len() < count as usize {
        return Err(FatError::NoSpace {
            needed: count,
            available: clusters.len() as u32,
        });
    }

    // Link back to front so the head only becomes reachable once its tail is in place
    let mut following = FatNext::EndOfChain;
    for &cluster in clusters.iter().rev() {
        fat.set(cluster, following)?;
        following = FatNext::Cluster(cluster);
    }

    info!("Allocated {} clusters starting at {}", count, clusters[0]);
    Ok(clusters)
}

pub fn count_free<F: FatTable>(fat: &mut F, geometry: &Geometry) -> FatResult<u32> {
    let mut free = 0;
    for cluster in geometry.data_clusters() {
        if fat.next(cluster)? == FatNext::Free {
            free += 1;
        }
    }
    Ok(free)
}
