// File content I/O over cluster chains
// The declared file size, not the cluster size, marks the end of a file's data.

use super::cluster_chain::ChainWalker;
use super::dir_entry::DirEntry;
use super::fat_table::{allocate_chain, free_chain};
use super::geometry::ByteOffset;
use super::volume::Fat16Volume;
use fatkit_core::{FatError, FatResult};
use log::{debug, warn};
use std::io::{Read, Seek, Write};

/// Visit the on-disk extents backing the first `file_size` bytes of an entry.
///
/// `visit` receives the volume, the absolute offset of the extent and its length;
/// extents never cross a cluster boundary. Returns the number of bytes visited.
fn for_each_extent<S, F>(volume: &mut Fat16Volume<S>, entry: &DirEntry, mut visit: F) -> FatResult<u64>
where
    S: Read + Write + Seek,
    F: FnMut(&mut Fat16Volume<S>, ByteOffset, usize) -> FatResult<()>,
{
    let geometry = *volume.geometry();
    let cluster_size = geometry.cluster_size() as u64;
    let total = entry.file_size as u64;
    let mut remaining = total;
    let mut walker = ChainWalker::new(&geometry, entry.starting_cluster);
    let mut last = entry.starting_cluster;

    while remaining > 0 {
        let cluster = match walker.advance(volume) {
            Some(cluster) => cluster?,
            None => {
                return Err(FatError::corrupt_chain(
                    walker.start(),
                    last,
                    format!(
                        "chain ends after {} of {} declared bytes",
                        total - remaining,
                        total
                    ),
                ))
            }
        };
        last = cluster;

        let len = remaining.min(cluster_size);
        visit(volume, geometry.cluster_offset(cluster)?, len as usize)?;
        remaining -= len;
    }

    Ok(total)
}

/// Stream a file's content into `dest`, one cluster-sized write at a time.
pub fn copy_to<S, W>(volume: &mut Fat16Volume<S>, entry: &DirEntry, dest: &mut W) -> FatResult<u64>
where
    S: Read + Write + Seek,
    W: Write,
{
    let mut buffer = vec![0u8; volume.geometry().cluster_size() as usize];
    let copied = for_each_extent(volume, entry, |volume, offset, len| {
        volume.read_at(offset, &mut buffer[..len])?;
        dest.write_all(&buffer[..len])?;
        Ok(())
    })?;
    dest.flush()?;
    Ok(copied)
}

pub fn read_all<S: Read + Write + Seek>(volume: &mut Fat16Volume<S>, entry: &DirEntry) -> FatResult<Vec<u8>> {
    let mut data = Vec::with_capacity(entry.file_size as usize);
    copy_to(volume, entry, &mut data)?;
    Ok(data)
}

/// Replace a file's content in place with `file_size` bytes from `source`.
///
/// The chain is never grown; a source shorter than the declared size fails with an
/// unexpected-EOF I/O error.
pub fn overwrite_all<S, R>(volume: &mut Fat16Volume<S>, entry: &DirEntry, source: &mut R) -> FatResult<u64>
where
    S: Read + Write + Seek,
    R: Read,
{
    volume.ensure_writable()?;
    let mut buffer = vec![0u8; volume.geometry().cluster_size() as usize];
    for_each_extent(volume, entry, |volume, offset, len| {
        source.read_exact(&mut buffer[..len])?;
        volume.write_at(offset, &buffer[..len])
    })
}

/// Zero exactly `file_size` bytes of the file's data, cluster by cluster.
pub fn zero_data<S: Read + Write + Seek>(volume: &mut Fat16Volume<S>, entry: &DirEntry) -> FatResult<u64> {
    volume.ensure_writable()?;
    let zeros = vec![0u8; volume.geometry().cluster_size() as usize];
    let wiped = for_each_extent(volume, entry, |volume, offset, len| volume.write_at(offset, &zeros[..len]))?;
    debug!("Zeroed {} bytes of data starting at cluster {}", wiped, entry.starting_cluster);
    Ok(wiped)
}

/// Allocate a fresh chain and fill it with `len` bytes from `source`.
///
/// Returns the first cluster, or 0 for an empty file. The tail of the last cluster is
/// zero-filled. On failure the new chain is released again.
pub fn write_new<S, R>(volume: &mut Fat16Volume<S>, source: &mut R, len: u32) -> FatResult<u16>
where
    S: Read + Write + Seek,
    R: Read,
{
    volume.ensure_writable()?;
    if len == 0 {
        return Ok(0);
    }

    let geometry = *volume.geometry();
    let count = geometry.clusters_for(len as u64) as u32;
    let chain = allocate_chain(volume, &geometry, count)?;
    let start = chain[0];

    if let Err(e) = fill_chain(volume, &chain, source, len as usize) {
        warn!("Writing new chain at {} failed, releasing it: {}", start, e);
        if let Err(release) = free_chain(volume, &geometry, start) {
            warn!("Could not release chain at {}: {}", start, release);
        }
        return Err(e);
    }

    Ok(start)
}

fn fill_chain<S, R>(volume: &mut Fat16Volume<S>, chain: &[u16], source: &mut R, len: usize) -> FatResult<()>
where
    S: Read + Write + Seek,
    R: Read,
{
    let geometry = *volume.geometry();
    let cluster_size = geometry.cluster_size() as usize;
    let mut buffer = vec![0u8; cluster_size];
    let mut remaining = len;

    for &cluster in chain {
        let take = remaining.min(cluster_size);
        source.read_exact(&mut buffer[..take])?;
        buffer[take..].fill(0);
        volume.write_at(geometry.cluster_offset(cluster)?, &buffer)?;
        remaining -= take;
    }
    Ok(())
}
