// Cluster chain traversal
// Follows FAT links from a starting cluster to the end-of-chain marker, refusing cycles.

use super::fat_table::{FatNext, FatTable};
use super::geometry::Geometry;
use fatkit_core::{FatError, FatResult};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy)]
enum WalkState {
    Start,
    After(u16),
    Done,
}

/// Step-wise chain walker.
///
/// The walker does not hold the FAT, so callers can interleave data I/O against the
/// same image between steps. Use [`walk`] for a borrowing iterator.
#[derive(Debug)]
pub struct ChainWalker {
    geometry: Geometry,
    start: u16,
    state: WalkState,
    visited: HashSet<u16>,
}

impl ChainWalker {
    pub fn new(geometry: &Geometry, start: u16) -> Self {
        Self {
            geometry: *geometry,
            start,
            state: WalkState::Start,
            visited: HashSet::new(),
        }
    }

    pub fn start(&self) -> u16 {
        self.start
    }

    /// Yield the next cluster of the chain, `None` once the chain has ended.
    ///
    /// After an error the walker is finished.
    pub fn advance<F: FatTable>(&mut self, fat: &mut F) -> Option<FatResult<u16>> {
        let state = self.state;
        let candidate = match state {
            WalkState::Done => return None,
            WalkState::Start => {
                if self.start == 0 {
                    self.state = WalkState::Done;
                    return None;
                }
                self.start
            }
            WalkState::After(previous) => match fat.next(previous) {
                Ok(FatNext::Cluster(next)) => next,
                Ok(FatNext::EndOfChain) => {
                    self.state = WalkState::Done;
                    return None;
                }
                Ok(other) => {
                    return self.fail(FatError::corrupt_chain(
                        self.start,
                        previous,
                        format!("links to {:?} before end of chain", other),
                    ))
                }
                Err(e) => return self.fail(e),
            },
        };

        if !self.geometry.is_data_cluster(candidate) {
            return self.fail(FatError::corrupt_chain(
                self.start,
                candidate,
                format!("outside the data region (2..{})", self.geometry.cluster_limit()),
            ));
        }
        if !self.visited.insert(candidate) {
            return self.fail(FatError::corrupt_chain(self.start, candidate, "cluster revisited"));
        }

        self.state = WalkState::After(candidate);
        Some(Ok(candidate))
    }

    fn fail(&mut self, err: FatError) -> Option<FatResult<u16>> {
        self.state = WalkState::Done;
        Some(Err(err))
    }
}

/// Lazy iterator over the clusters of one chain.
pub struct Chain<'f, F: FatTable> {
    fat: &'f mut F,
    walker: ChainWalker,
}

impl<F: FatTable> Iterator for Chain<'_, F> {
    type Item = FatResult<u16>;

    fn next(&mut self) -> Option<Self::Item> {
        self.walker.advance(self.fat)
    }
}

pub fn walk<'f, F: FatTable>(fat: &'f mut F, geometry: &Geometry, start: u16) -> Chain<'f, F> {
    Chain {
        fat,
        walker: ChainWalker::new(geometry, start),
    }
}

pub fn collect_chain<F: FatTable>(fat: &mut F, geometry: &Geometry, start: u16) -> FatResult<Vec<u16>> {
    walk(fat, geometry, start).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{tiny_geometry, MemoryFat};

    #[test]
    fn zero_start_is_an_empty_chain() {
        let geometry = tiny_geometry();
        let mut fat = MemoryFat::new(&geometry);
        assert!(collect_chain(&mut fat, &geometry, 0).unwrap().is_empty());
    }

    #[test]
    fn follows_links_to_end_of_chain() {
        let geometry = tiny_geometry();
        let mut fat = MemoryFat::new(&geometry);
        fat.link(&[5, 6, 9, 7]);

        assert_eq!(collect_chain(&mut fat, &geometry, 5).unwrap(), vec![5, 6, 9, 7]);
    }

    #[test]
    fn any_end_marker_terminates() {
        let geometry = tiny_geometry();
        let mut fat = MemoryFat::new(&geometry);
        fat.link(&[3, 4]);
        fat.set_raw(4, 0xFFF8);

        assert_eq!(collect_chain(&mut fat, &geometry, 3).unwrap(), vec![3, 4]);
    }

    #[test]
    fn revisited_cluster_is_corrupt() {
        let geometry = tiny_geometry();
        let mut fat = MemoryFat::new(&geometry);
        fat.link(&[5, 6]);
        fat.set(6, FatNext::Cluster(5)).unwrap();

        let mut chain = walk(&mut fat, &geometry, 5);
        assert_eq!(chain.next().unwrap().unwrap(), 5);
        assert_eq!(chain.next().unwrap().unwrap(), 6);
        match chain.next().unwrap() {
            Err(FatError::CorruptChain { start, cluster, .. }) => {
                assert_eq!(start, 5);
                assert_eq!(cluster, 5);
            }
            other => panic!("expected corrupt chain, got {:?}", other),
        }
        assert!(chain.next().is_none());
    }

    #[test]
    fn self_loop_is_corrupt() {
        let geometry = tiny_geometry();
        let mut fat = MemoryFat::new(&geometry);
        fat.set(8, FatNext::Cluster(8)).unwrap();

        assert!(matches!(
            collect_chain(&mut fat, &geometry, 8),
            Err(FatError::CorruptChain { .. })
        ));
    }

    #[test]
    fn free_or_bad_link_is_corrupt() {
        let geometry = tiny_geometry();
        let mut fat = MemoryFat::new(&geometry);
        fat.set(3, FatNext::Cluster(4)).unwrap();
        assert!(collect_chain(&mut fat, &geometry, 3).is_err());

        fat.set(4, FatNext::Bad).unwrap();
        assert!(collect_chain(&mut fat, &geometry, 3).is_err());
    }

    #[test]
    fn out_of_range_start_is_corrupt() {
        let geometry = tiny_geometry();
        let mut fat = MemoryFat::new(&geometry);
        let beyond = geometry.cluster_limit() as u16;

        assert!(collect_chain(&mut fat, &geometry, 1).is_err());
        assert!(collect_chain(&mut fat, &geometry, beyond).is_err());
    }
}
