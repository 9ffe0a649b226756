//! Node directory: a small B+Tree of `DIR_NODE` index blocks over many `DIR_LEAFN` leaf blocks,
//! all living in the data fork's "leaf offset" region.
//!
//! Selected when the directory's last extent starts at the leaf sentinel offset but the block
//! count rules out the single-leaf-block shape handled by [`super::leaf`]. The index tree is
//! walked top-down exactly like [`crate::fs::xfs::btree`], just over `{hashval, before}` records
//! instead of `{startoff, ...}` extent records.

use alloc::vec::Vec;

use crate::fs::xfs::dir::data_block::{self, DataEntry};
use crate::fs::xfs::dir::{self, name_hash, DirEntry};
use crate::fs::xfs::endian::read_be32;
use crate::fs::xfs::error::{XfsError, XfsResult};
use crate::fs::xfs::header;
use crate::fs::xfs::inode::Inode;
use crate::fs::xfs::volume::Volume;

const MAX_NODE_DEPTH: usize = 8;

/// v4 `xfs_da_blkinfo` is forw(4)+back(4)+magic(2)+pad(2) = 12 bytes. v5 `xfs_da3_blkinfo`
/// appends crc(4)+blkno(8)+lsn(8)+uuid(16)+owner(8) = 44 more bytes, for 56 total.
fn blkinfo_header_size(volume: &Volume) -> usize {
    if volume.superblock().version >= 5 {
        56
    } else {
        12
    }
}

fn forw_sibling(buf: &[u8]) -> u32 {
    read_be32(buf, 0)
}

enum BlockKind {
    Node,
    Leaf,
}

fn classify_block(buf: &[u8]) -> XfsResult<BlockKind> {
    if buf.len() < 10 {
        return Err(XfsError::Corrupt);
    }
    let magic16 = u32::from(u16::from_be_bytes([buf[8], buf[9]]));
    if magic16 == header::magic::DIR_NODE_V4 || magic16 == header::magic::DIR_NODE_V5 {
        Ok(BlockKind::Node)
    } else if magic16 == header::magic::DIR_LEAFN_V4 || magic16 == header::magic::DIR_LEAFN_V5 {
        Ok(BlockKind::Leaf)
    } else {
        Err(XfsError::Corrupt)
    }
}

fn read_index_block(volume: &Volume, inode: &Inode, logical_block: u64) -> XfsResult<Vec<u8>> {
    let fsb = dir::logical_block_to_fsblock(volume, inode, logical_block)?;
    let buf = volume.read_block(fsb)?;
    let sb = volume.superblock();

    match classify_block(&buf)? {
        BlockKind::Node => header::verify_header(
            sb,
            &buf,
            header::magic::DIR_NODE_V4,
            header::magic::DIR_NODE_V5,
            8,
            header::magic::DA3_LAYOUT_V5,
            fsb,
            inode.ino,
        )?,
        BlockKind::Leaf => header::verify_header(
            sb,
            &buf,
            header::magic::DIR_LEAFN_V4,
            header::magic::DIR_LEAFN_V5,
            8,
            header::magic::DA3_LAYOUT_V5,
            fsb,
            inode.ino,
        )?,
    }

    Ok(buf)
}

struct NodeEntry {
    hashval: u32,
    before: u32,
}

fn node_entries(volume: &Volume, buf: &[u8]) -> XfsResult<Vec<NodeEntry>> {
    let header_size = blkinfo_header_size(volume);
    let count = read_be32(buf, header_size) as usize;
    let start = header_size + 8;

    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let off = start + i * 8;
        if off + 8 > buf.len() {
            return Err(XfsError::Corrupt);
        }
        out.push(NodeEntry { hashval: read_be32(buf, off), before: read_be32(buf, off + 4) });
    }
    Ok(out)
}

struct LeafEntry {
    hashval: u32,
    address: u32,
}

fn leaf_entries(volume: &Volume, buf: &[u8]) -> XfsResult<Vec<LeafEntry>> {
    let header_size = blkinfo_header_size(volume);
    let count = read_be32(buf, header_size) as usize;
    let start = header_size + 8;

    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let off = start + i * 8;
        if off + 8 > buf.len() {
            return Err(XfsError::Corrupt);
        }
        out.push(LeafEntry { hashval: read_be32(buf, off), address: read_be32(buf, off + 4) });
    }
    Ok(out)
}

fn root_logical_block(volume: &Volume) -> u64 {
    volume.leaf_offset()
}

fn resolve_address(volume: &Volume, inode: &Inode, address: u32) -> XfsResult<(Vec<u8>, usize)> {
    let (logical_block, byte_offset) = volume.decode_dir_address(address);
    let fsb = dir::logical_block_to_fsblock(volume, inode, logical_block)?;
    let buf = volume.read_block(fsb)?;

    let sb = volume.superblock();
    header::verify_header(
        sb,
        &buf,
        header::magic::DIR_DATA_V4,
        header::magic::DIR_DATA_V5,
        0,
        header::magic::DIR_DATA_LAYOUT_V5,
        fsb,
        inode.ino,
    )?;

    Ok((buf, byte_offset as usize))
}

/// Descends the index tree from the root, returning the logical block of the `DIR_LEAFN` block
/// whose hash range covers `target_hash`.
fn find_leaf_block(volume: &Volume, inode: &Inode, target_hash: u32) -> XfsResult<u64> {
    let mut logical_block = root_logical_block(volume);

    for _ in 0..MAX_NODE_DEPTH {
        let buf = read_index_block(volume, inode, logical_block)?;
        match classify_block(&buf)? {
            BlockKind::Leaf => return Ok(logical_block),
            BlockKind::Node => {
                let entries = node_entries(volume, &buf)?;
                let idx = entries.partition_point(|e| e.hashval < target_hash);
                let entry = entries.get(idx).or_else(|| entries.last()).ok_or(XfsError::Corrupt)?;
                logical_block = u64::from(entry.before);
            }
        }
    }

    Err(XfsError::Corrupt)
}

pub fn lookup(volume: &Volume, inode: &Inode, name: &[u8]) -> XfsResult<u64> {
    let has_ftype = volume.superblock().has_ftype_field;
    let target_hash = name_hash(name);
    let mut logical_block = find_leaf_block(volume, inode, target_hash)?;

    loop {
        let buf = read_index_block(volume, inode, logical_block)?;
        let leaves = leaf_entries(volume, &buf)?;
        let start = leaves.partition_point(|e| e.hashval < target_hash);

        let mut exhausted_with_match = false;
        for leaf in &leaves[start..] {
            if leaf.hashval != target_hash {
                break;
            }
            exhausted_with_match = true;
            let (data_buf, byte_offset) = resolve_address(volume, inode, leaf.address)?;
            let entry = data_block::read_entry_at(&data_buf, byte_offset, has_ftype)?;
            if entry.name == name {
                return Ok(entry.ino);
            }
        }

        if !exhausted_with_match {
            return Err(XfsError::NotFound);
        }

        let forw = forw_sibling(&buf);
        if forw == u32::MAX {
            return Err(XfsError::NotFound);
        }
        logical_block = u64::from(forw);
    }
}

pub fn enumerate(volume: &Volume, inode: &Inode) -> XfsResult<Vec<DirEntry>> {
    let sb = volume.superblock();
    let header_size = data_block::data_header_size(sb);
    let leaf_offset = volume.leaf_offset();

    let data_extents: Vec<_> =
        dir::all_data_extents(volume, inode)?.into_iter().filter(|e| e.start_off < leaf_offset).collect();

    let mut out = Vec::new();
    for extent in data_extents {
        let buf = volume.read_block(extent.start_block)?;
        header::verify_header(
            sb,
            &buf,
            header::magic::DIR_DATA_V4,
            header::magic::DIR_DATA_V5,
            0,
            header::magic::DIR_DATA_LAYOUT_V5,
            extent.start_block,
            inode.ino,
        )?;

        let entries: Vec<DataEntry> = data_block::parse_data_block(&buf, header_size, sb.has_ftype_field)?;
        out.extend(entries.into_iter().map(|e| DirEntry { name: e.name, ino: e.ino, ftype: e.ftype }));
    }

    Ok(out)
}
