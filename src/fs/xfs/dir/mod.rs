//! Directory format dispatch.
//!
//! A directory's data-fork geometry (format, block count, size, first/last extent) selects one
//! of five walkers at inode-open time. Each walker owns its own cached buffers; none of them is
//! shared across requests.

pub mod block;
pub mod btree;
pub(crate) mod data_block;
pub mod leaf;
pub mod node;
pub mod short;

use alloc::vec::Vec;

use crate::fs::xfs::error::{XfsError, XfsResult};
use crate::fs::xfs::extent::Extent;
use crate::fs::xfs::inode::{ForkFormat, Inode};
use crate::fs::xfs::volume::Volume;

/// One entry produced by directory enumeration or lookup, including the synthesised `.`/`..`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DirEntry {
    pub name: Vec<u8>,
    pub ino: u64,
    pub ftype: Option<u8>,
}

/// Which on-disk shape a directory's data fork takes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DirImpl {
    Short,
    Block,
    Leaf,
    Node,
    BTree,
}

/// `xfs_da_hashname`: rolling hash used to order every directory and attribute leaf entry.
/// Each 4-byte chunk of the name is XORed into a hash rotated left by 7
/// bits; a short trailing remainder is folded in byte-by-byte.
pub fn name_hash(name: &[u8]) -> u32 {
    fn rol32(v: u32, n: u32) -> u32 {
        v.rotate_left(n)
    }

    let mut hash: u32 = 0;
    let mut chunks = name.chunks_exact(4);
    for chunk in &mut chunks {
        let word = u32::from(chunk[0])
            | (u32::from(chunk[1]) << 8)
            | (u32::from(chunk[2]) << 16)
            | (u32::from(chunk[3]) << 24);
        hash = word ^ rol32(hash, 7);
    }

    let rem = chunks.remainder();
    if !rem.is_empty() {
        let mut word: u32 = 0;
        for (i, &b) in rem.iter().enumerate() {
            word |= u32::from(b) << (i * 8);
        }
        hash = word ^ rol32(hash, 7 * (rem.len() as u32));
    }

    hash
}

/// Selects which directory walker applies to `inode`, per the geometric predicate ladder.
pub fn classify(volume: &Volume, inode: &Inode) -> XfsResult<DirImpl> {
    if !inode.is_dir() {
        return Err(XfsError::NotSupported);
    }

    match inode.data_format {
        ForkFormat::Local => Ok(DirImpl::Short),
        ForkFormat::Btree => Ok(DirImpl::BTree),
        ForkFormat::Extents => {
            let extents = direct_extents(inode);

            if inode.block_count == 1
                && inode.size == u64::from(volume.dir_block_size())
                && extents.first().is_some_and(|e| e.start_off == 0)
            {
                return Ok(DirImpl::Block);
            }

            let leaf_sentinel = volume.leaf_offset();
            let last_is_leaf_sentinel = extents.last().is_some_and(|e| e.start_off == leaf_sentinel);

            if inode.block_count > 1
                && inode.data_extent_count > 1
                && inode.size == (inode.block_count - 1) * u64::from(volume.dir_block_size())
                && last_is_leaf_sentinel
            {
                return Ok(DirImpl::Leaf);
            }

            if last_is_leaf_sentinel {
                return Ok(DirImpl::Node);
            }

            Err(XfsError::Corrupt)
        }
        _ => Err(XfsError::NotSupported),
    }
}

/// The inode's direct (inline) data-fork extent list — valid only when `data_format ==
/// Extents`; `BTREE`-format forks must be walked via [`crate::fs::xfs::btree`] instead.
pub fn direct_extents(inode: &Inode) -> Vec<Extent> {
    let raw = inode.data_fork_bytes();
    (0..raw.len() / 16).map(|i| Extent::unpack(raw, i * 16)).collect()
}

/// Resolves a directory-relative logical block number to a filesystem block, across both the
/// direct-extent and B+Tree fork formats.
pub fn logical_block_to_fsblock(
    volume: &Volume,
    inode: &Inode,
    logical_block: u64,
) -> XfsResult<u64> {
    match inode.data_format {
        ForkFormat::Extents => direct_extents(inode)
            .into_iter()
            .find(|e| e.covers_block(logical_block))
            .map(|e| e.start_block + (logical_block - e.start_off))
            .ok_or(XfsError::Corrupt),
        ForkFormat::Btree => {
            let mut walker = crate::fs::xfs::btree::BTreeWalker::new(volume, inode.ino);
            let extent = walker.search(
                inode.data_fork_bytes(),
                logical_block,
                crate::fs::xfs::btree::SearchKind::Data,
            )?;
            Ok(extent.start_block + (logical_block - extent.start_off))
        }
        _ => Err(XfsError::NotSupported),
    }
}

/// Returns every directory-block-sized data block's extent, flattened to a single list, across
/// both fork formats (used to translate `before`/leaf addresses in node directories).
pub fn all_data_extents(volume: &Volume, inode: &Inode) -> XfsResult<Vec<Extent>> {
    match inode.data_format {
        ForkFormat::Extents => Ok(direct_extents(inode)),
        ForkFormat::Btree => {
            let mut walker = crate::fs::xfs::btree::BTreeWalker::new(volume, inode.ino);
            walker.get_all_extents(inode.data_fork_bytes())
        }
        _ => Err(XfsError::NotSupported),
    }
}

/// `lookup_path`'s single-component primitive: finds `name` in `inode`'s directory, dispatching
/// to the correct walker.
pub fn lookup(volume: &Volume, inode: &Inode, name: &[u8]) -> XfsResult<u64> {
    if name == b"." {
        return Ok(inode.ino);
    }

    match classify(volume, inode)? {
        DirImpl::Short => short::lookup(volume, inode, name),
        DirImpl::Block => block::lookup(volume, inode, name),
        DirImpl::Leaf => leaf::lookup(volume, inode, name),
        DirImpl::Node => node::lookup(volume, inode, name),
        DirImpl::BTree => btree::lookup(volume, inode, name),
    }
}

/// `read_dir`'s full enumeration primitive. Cookie-based iteration is layered over this in
/// `fs::xfs::mod`: every directory variant is small enough in practice that materialising the
/// full entry list once per `read_dir` call is simpler than a persistent cursor, and it keeps
/// the no-partial-results error contract trivial to maintain.
pub fn enumerate(volume: &Volume, inode: &Inode) -> XfsResult<Vec<DirEntry>> {
    match classify(volume, inode)? {
        DirImpl::Short => short::enumerate(volume, inode),
        DirImpl::Block => block::enumerate(volume, inode),
        DirImpl::Leaf => leaf::enumerate(volume, inode),
        DirImpl::Node => node::enumerate(volume, inode),
        DirImpl::BTree => btree::enumerate(volume, inode),
    }
}
