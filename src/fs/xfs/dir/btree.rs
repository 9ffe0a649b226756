//! B+Tree-format directory: the data fork itself is BMAP-btree addressed, rather
//! than an inline extent list. The hash index living in the leaf-offset region is walked exactly
//! like [`super::node`]'s, since [`super::dir::logical_block_to_fsblock`] and
//! [`super::dir::all_data_extents`] already dispatch on fork format — the only thing that changes
//! between a node-format directory and a B+Tree-format one is how its data fork's extents are
//! found, not how the hash index on top of them is walked.

use alloc::vec::Vec;

use crate::fs::xfs::dir::{node, DirEntry};
use crate::fs::xfs::error::XfsResult;
use crate::fs::xfs::inode::Inode;
use crate::fs::xfs::volume::Volume;

pub fn lookup(volume: &Volume, inode: &Inode, name: &[u8]) -> XfsResult<u64> {
    node::lookup(volume, inode, name)
}

pub fn enumerate(volume: &Volume, inode: &Inode) -> XfsResult<Vec<DirEntry>> {
    node::enumerate(volume, inode)
}
