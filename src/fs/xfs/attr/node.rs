//! Node attribute: an index block ahead of one or more hashed leaf blocks, walked the same way
//! as [`crate::fs::xfs::dir::node`] but over the attribute fork's extents.

use alloc::vec::Vec;

use crate::fs::xfs::attr::{self, AttrEntry, AttrNamespace, ATTR_INCOMPLETE, ATTR_LOCAL};
use crate::fs::xfs::dir::name_hash;
use crate::fs::xfs::endian::{read_be16, read_be32};
use crate::fs::xfs::error::{XfsError, XfsResult};
use crate::fs::xfs::header;
use crate::fs::xfs::inode::Inode;
use crate::fs::xfs::volume::Volume;

const MAX_NODE_DEPTH: usize = 8;
const REMOTE_HEADER_SIZE: usize = 64;
const LEAF_HDR_TAIL: usize = 2 + 2 + 2 + 1 + 1 + 3 * 4;

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
    } else if magic16 == header::magic::ATTR_LEAF_V4 || magic16 == header::magic::ATTR_LEAF_V5 {
        Ok(BlockKind::Leaf)
    } else {
        Err(XfsError::Corrupt)
    }
}

fn read_index_block(volume: &Volume, inode: &Inode, logical_block: u64) -> XfsResult<(Vec<u8>, u64)> {
    let fsb = attr::logical_block_to_fsblock(volume, inode, logical_block)?;
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
            header::magic::ATTR_LEAF_V4,
            header::magic::ATTR_LEAF_V5,
            8,
            header::magic::DA3_LAYOUT_V5,
            fsb,
            inode.ino,
        )?,
    }

    Ok((buf, fsb))
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
    nameidx: u16,
    flags: u8,
}

fn leaf_entries(volume: &Volume, buf: &[u8]) -> XfsResult<Vec<LeafEntry>> {
    let header_size = blkinfo_header_size(volume);
    if header_size + LEAF_HDR_TAIL > buf.len() {
        return Err(XfsError::Corrupt);
    }
    let count = read_be16(buf, header_size) as usize;
    let start = header_size + LEAF_HDR_TAIL;

    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let off = start + i * 8;
        if off + 8 > buf.len() {
            return Err(XfsError::Corrupt);
        }
        out.push(LeafEntry { hashval: read_be32(buf, off), nameidx: read_be16(buf, off + 4), flags: buf[off + 6] });
    }
    Ok(out)
}

fn decode_value(volume: &Volume, inode: &Inode, buf: &[u8], idx: usize, flags: u8) -> XfsResult<(Vec<u8>, Vec<u8>)> {
    if flags & ATTR_LOCAL != 0 {
        if idx + 3 > buf.len() {
            return Err(XfsError::Corrupt);
        }
        let valuelen = usize::from(read_be16(buf, idx));
        let namelen = usize::from(buf[idx + 2]);
        let name_start = idx + 3;
        if name_start + namelen + valuelen > buf.len() {
            return Err(XfsError::Corrupt);
        }
        let name = buf[name_start..name_start + namelen].to_vec();
        let value = buf[name_start + namelen..name_start + namelen + valuelen].to_vec();
        Ok((name, value))
    } else {
        if idx + 9 > buf.len() {
            return Err(XfsError::Corrupt);
        }
        let valueblk = read_be32(buf, idx);
        let valuelen = read_be32(buf, idx + 4) as usize;
        let namelen = usize::from(buf[idx + 8]);
        let name_start = idx + 9;
        if name_start + namelen > buf.len() {
            return Err(XfsError::Corrupt);
        }
        let name = buf[name_start..name_start + namelen].to_vec();
        let value = read_remote_value(volume, inode, u64::from(valueblk), valuelen)?;
        Ok((name, value))
    }
}

fn read_remote_value(volume: &Volume, inode: &Inode, first_block: u64, valuelen: usize) -> XfsResult<Vec<u8>> {
    let sb = volume.superblock();
    let block_size = sb.block_size as usize;
    let payload_per_block = if sb.version >= 5 { block_size - REMOTE_HEADER_SIZE } else { block_size };

    let mut out = Vec::with_capacity(valuelen);
    let mut block = first_block;

    while out.len() < valuelen {
        let buf = volume.read_block(block)?;
        if sb.version >= 5 {
            header::verify_header(
                sb,
                &buf,
                header::magic::ATTR_REMOTE_V5,
                header::magic::ATTR_REMOTE_V5,
                0,
                header::magic::DIR_DATA_LAYOUT_V5,
                block,
                inode.ino,
            )?;
        }
        let payload_start = if sb.version >= 5 { REMOTE_HEADER_SIZE } else { 0 };
        let take = core::cmp::min(payload_per_block, valuelen - out.len());
        if payload_start + take > buf.len() {
            return Err(XfsError::Corrupt);
        }
        out.extend_from_slice(&buf[payload_start..payload_start + take]);
        block += 1;
    }

    Ok(out)
}

fn find_leaf_block(volume: &Volume, inode: &Inode, target_hash: u32) -> XfsResult<u64> {
    let mut logical_block = 0u64;

    for _ in 0..MAX_NODE_DEPTH {
        let (buf, _) = read_index_block(volume, inode, logical_block)?;
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

pub fn lookup(volume: &Volume, inode: &Inode, name: &[u8]) -> XfsResult<AttrEntry> {
    let target_hash = name_hash(name);
    let mut logical_block = find_leaf_block(volume, inode, target_hash)?;

    loop {
        let (buf, _) = read_index_block(volume, inode, logical_block)?;
        let list = leaf_entries(volume, &buf)?;
        let start = list.partition_point(|e| e.hashval < target_hash);

        let mut matched_hash = false;
        for e in &list[start..] {
            if e.hashval != target_hash {
                break;
            }
            matched_hash = true;
            let (name_bytes, value) = decode_value(volume, inode, &buf, usize::from(e.nameidx), e.flags)?;
            if name_bytes == name {
                return Ok(AttrEntry {
                    namespace: AttrNamespace::from_flags(e.flags),
                    name: name_bytes,
                    value,
                    incomplete: e.flags & ATTR_INCOMPLETE != 0,
                });
            }
        }

        if !matched_hash {
            return Err(XfsError::NotFound);
        }

        let forw = forw_sibling(&buf);
        if forw == u32::MAX {
            return Err(XfsError::NotFound);
        }
        logical_block = u64::from(forw);
    }
}

pub fn enumerate(volume: &Volume, inode: &Inode) -> XfsResult<Vec<AttrEntry>> {
    let total_extents = attr::all_extents(volume, inode)?.len() as u64;
    let mut out = Vec::new();

    for logical_block in 0..total_extents {
        let (buf, _) = read_index_block(volume, inode, logical_block)?;
        if !matches!(classify_block(&buf)?, BlockKind::Leaf) {
            continue;
        }

        let list = leaf_entries(volume, &buf)?;
        for e in &list {
            let (name, value) = decode_value(volume, inode, &buf, usize::from(e.nameidx), e.flags)?;
            out.push(AttrEntry {
                namespace: AttrNamespace::from_flags(e.flags),
                name,
                value,
                incomplete: e.flags & ATTR_INCOMPLETE != 0,
            });
        }
    }

    Ok(out)
}
