//! Leaf attribute: the attribute fork's single extent holds one hashed leaf block. Shares its
//! `blockinfo` header shape and hash-ordered entry array with directory leaf blocks, but the
//! name/value records that follow are attribute-specific.

use alloc::vec::Vec;

use crate::fs::xfs::attr::{self, AttrEntry, AttrNamespace, ATTR_INCOMPLETE, ATTR_LOCAL};
use crate::fs::xfs::dir::name_hash;
use crate::fs::xfs::endian::{read_be16, read_be32};
use crate::fs::xfs::error::{XfsError, XfsResult};
use crate::fs::xfs::header;
use crate::fs::xfs::inode::Inode;
use crate::fs::xfs::volume::Volume;

const REMOTE_HEADER_SIZE: usize = 64;

/// v4 `xfs_da_blkinfo` is forw(4)+back(4)+magic(2)+pad(2) = 12 bytes. v5 `xfs_da3_blkinfo`
/// appends crc(4)+blkno(8)+lsn(8)+uuid(16)+owner(8) = 44 more bytes, for 56 total.
fn blkinfo_header_size(volume: &Volume) -> usize {
    if volume.superblock().version >= 5 {
        56
    } else {
        12
    }
}

/// Bytes between the `blkinfo` and the entry array: `count, usedbytes, firstused, holes, pad,
/// freemap[3]`.
const LEAF_HDR_TAIL: usize = 2 + 2 + 2 + 1 + 1 + 3 * 4;

struct EntryRef {
    hashval: u32,
    nameidx: u16,
    flags: u8,
}

fn leaf_block(volume: &Volume, inode: &Inode) -> XfsResult<(Vec<u8>, u64)> {
    let extents = attr::direct_extents(inode);
    let extent = extents.first().ok_or(XfsError::Corrupt)?;
    let buf = volume.read_block(extent.start_block)?;

    let sb = volume.superblock();
    header::verify_header(
        sb,
        &buf,
        header::magic::ATTR_LEAF_V4,
        header::magic::ATTR_LEAF_V5,
        8,
        header::magic::DA3_LAYOUT_V5,
        extent.start_block,
        inode.ino,
    )?;

    Ok((buf, extent.start_block))
}

fn entries(volume: &Volume, buf: &[u8]) -> XfsResult<Vec<EntryRef>> {
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
        out.push(EntryRef {
            hashval: read_be32(buf, off),
            nameidx: read_be16(buf, off + 4),
            flags: buf[off + 6],
        });
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

/// Reads a remote attribute value spanning one or more blocks starting at `first_block`. v5
/// volumes prefix each block with a 64-byte self-describing header (verified) before its payload;
/// v4 blocks are raw payload start to finish.
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

pub fn lookup(volume: &Volume, inode: &Inode, name: &[u8]) -> XfsResult<AttrEntry> {
    let (buf, _) = leaf_block(volume, inode)?;
    let target_hash = name_hash(name);
    let list = entries(volume, &buf)?;

    let start = list.partition_point(|e| e.hashval < target_hash);
    for e in &list[start..] {
        if e.hashval != target_hash {
            break;
        }
        let (entry_name, value) = decode_value(volume, inode, &buf, usize::from(e.nameidx), e.flags)?;
        if entry_name == name {
            return Ok(AttrEntry {
                namespace: AttrNamespace::from_flags(e.flags),
                name: entry_name,
                value,
                incomplete: e.flags & ATTR_INCOMPLETE != 0,
            });
        }
    }

    Err(XfsError::NotFound)
}

pub fn enumerate(volume: &Volume, inode: &Inode) -> XfsResult<Vec<AttrEntry>> {
    let (buf, _) = leaf_block(volume, inode)?;
    let list = entries(volume, &buf)?;

    let mut out = Vec::with_capacity(list.len());
    for e in &list {
        let (name, value) = decode_value(volume, inode, &buf, usize::from(e.nameidx), e.flags)?;
        out.push(AttrEntry {
            namespace: AttrNamespace::from_flags(e.flags),
            name,
            value,
            incomplete: e.flags & ATTR_INCOMPLETE != 0,
        });
    }
    Ok(out)
}
