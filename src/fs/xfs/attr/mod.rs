//! Attribute format dispatch, by namespace flags.
//!
//! Parallels `dir::mod`'s three-shape dispatch, minus the single-block "block" shape directories
//! have: short-form lives entirely in the inode, leaf is one hashed block, node is a small index
//! tree over many leaf blocks.

pub mod leaf;
pub mod node;
pub mod short;

use alloc::vec::Vec;

use crate::fs::xfs::error::{XfsError, XfsResult};
use crate::fs::xfs::extent::Extent;
use crate::fs::xfs::inode::{ForkFormat, Inode};
use crate::fs::xfs::volume::Volume;

/// `ATTR_LOCAL`/`ATTR_ROOT`/`ATTR_SECURE` flag bits carried by every short/leaf/node attribute
/// entry (real on-disk `xfs_attr_leaf_entry.flags` / short-form `flags` byte).
const ATTR_LOCAL: u8 = 0x01;
const ATTR_ROOT: u8 = 0x02;
const ATTR_SECURE: u8 = 0x08;
const ATTR_INCOMPLETE: u8 = 0x10;

/// Which namespace an attribute lives in — plain user attributes, or one of the two reserved
/// namespaces a binding needs to keep separate.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AttrNamespace {
    User,
    Root,
    Secure,
}

impl AttrNamespace {
    fn from_flags(flags: u8) -> Self {
        if flags & ATTR_SECURE != 0 {
            Self::Secure
        } else if flags & ATTR_ROOT != 0 {
            Self::Root
        } else {
            Self::User
        }
    }
}

#[derive(Clone, Debug)]
pub struct AttrEntry {
    pub namespace: AttrNamespace,
    pub name: Vec<u8>,
    pub value: Vec<u8>,
    pub incomplete: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum AttrImpl {
    Short,
    Leaf,
    Node,
}

fn classify(inode: &Inode) -> XfsResult<AttrImpl> {
    match inode.attr_format {
        ForkFormat::Local => Ok(AttrImpl::Short),
        ForkFormat::Extents => {
            if inode.attr_extent_count > 1 {
                Ok(AttrImpl::Node)
            } else {
                Ok(AttrImpl::Leaf)
            }
        }
        ForkFormat::Btree => Ok(AttrImpl::Node),
        _ => Err(XfsError::NotSupported),
    }
}

/// The attribute fork's direct (inline) extent list — valid only when `attr_format == Extents`.
fn direct_extents(inode: &Inode) -> Vec<Extent> {
    let raw = inode.attr_fork_bytes().unwrap_or(&[]);
    (0..raw.len() / 16).map(|i| Extent::unpack(raw, i * 16)).collect()
}

/// Resolves an attribute-fork logical block to a filesystem block, across both fork formats.
fn logical_block_to_fsblock(volume: &Volume, inode: &Inode, logical_block: u64) -> XfsResult<u64> {
    match inode.attr_format {
        ForkFormat::Extents => {
            let extents = direct_extents(inode);
            if (logical_block as usize) < extents.len() {
                return Ok(extents[logical_block as usize].start_block);
            }
            let last = extents.last().ok_or(XfsError::Corrupt)?;
            Ok(last.start_block + (logical_block - last.start_off))
        }
        ForkFormat::Btree => {
            let mut walker = crate::fs::xfs::btree::BTreeWalker::new(volume, inode.ino);
            let fork_bytes = inode.attr_fork_bytes().ok_or(XfsError::Corrupt)?;
            let extent = walker.search(fork_bytes, logical_block, crate::fs::xfs::btree::SearchKind::Leaf)?;
            Ok(extent.start_block + (logical_block - extent.start_off))
        }
        _ => Err(XfsError::NotSupported),
    }
}

fn all_extents(volume: &Volume, inode: &Inode) -> XfsResult<Vec<Extent>> {
    match inode.attr_format {
        ForkFormat::Extents => Ok(direct_extents(inode)),
        ForkFormat::Btree => {
            let mut walker = crate::fs::xfs::btree::BTreeWalker::new(volume, inode.ino);
            let fork_bytes = inode.attr_fork_bytes().ok_or(XfsError::Corrupt)?;
            walker.get_all_extents(fork_bytes)
        }
        _ => Err(XfsError::NotSupported),
    }
}

/// `open_attr`/`read_attr`: looks up one attribute by name, returning its value bytes.
pub fn open_attr(volume: &Volume, inode: &Inode, name: &[u8]) -> XfsResult<AttrEntry> {
    if inode.fork_offset == 0 {
        return Err(XfsError::NotFound);
    }

    match classify(inode)? {
        AttrImpl::Short => short::lookup(inode, name),
        AttrImpl::Leaf => leaf::lookup(volume, inode, name),
        AttrImpl::Node => node::lookup(volume, inode, name),
    }
}

/// `enum_attr`: every attribute on `inode`, in on-disk order (no `.`/`..` analogue here).
pub fn enum_attr(volume: &Volume, inode: &Inode) -> XfsResult<Vec<AttrEntry>> {
    if inode.fork_offset == 0 {
        return Ok(Vec::new());
    }

    match classify(inode)? {
        AttrImpl::Short => short::enumerate(inode),
        AttrImpl::Leaf => leaf::enumerate(volume, inode),
        AttrImpl::Node => node::enumerate(volume, inode),
    }
}
