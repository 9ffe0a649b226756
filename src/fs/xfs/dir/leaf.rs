//! Leaf directory: several data blocks plus one trailing leaf block holding the hash index.
//!
//! Selected when `block_count > 1 && data_extent_count > 1 && size == (block_count - 1) *
//! dir_block_size` and the last extent starts at the leaf sentinel offset
//! (`Volume::leaf_offset`). Every data block is read independently; the leaf block is read once
//! per call and not cached across calls — no walker state survives a request.

use alloc::vec::Vec;

use crate::fs::xfs::dir::data_block::{self, DataEntry};
use crate::fs::xfs::dir::{self, name_hash, DirEntry};
use crate::fs::xfs::endian::read_be32;
use crate::fs::xfs::error::{XfsError, XfsResult};
use crate::fs::xfs::header;
use crate::fs::xfs::inode::Inode;
use crate::fs::xfs::volume::Volume;

struct LeafEntry {
    hashval: u32,
    address: u32,
}

const LEAF_TAIL_SIZE: usize = 8;
const LEAF_ENTRY_SIZE: usize = 8;

/// v4 `xfs_da_blkinfo` is forw(4)+back(4)+magic(2)+pad(2) = 12 bytes. v5 `xfs_da3_blkinfo`
/// appends crc(4)+blkno(8)+lsn(8)+uuid(16)+owner(8) = 44 more bytes, for 56 total.
fn blkinfo_header_size(volume: &Volume) -> usize {
    if volume.superblock().version >= 5 {
        56
    } else {
        12
    }
}

fn leaf_block(volume: &Volume, inode: &Inode) -> XfsResult<Vec<u8>> {
    let extents = dir::direct_extents(inode);
    let leaf_extent = extents.last().ok_or(XfsError::Corrupt)?;
    let buf = volume.read_block(leaf_extent.start_block)?;

    let sb = volume.superblock();
    header::verify_header(
        sb,
        &buf,
        header::magic::DIR_LEAF1_V4,
        header::magic::DIR_LEAF1_V5,
        8,
        header::magic::DA3_LAYOUT_V5,
        leaf_extent.start_block,
        inode.ino,
    )?;

    Ok(buf)
}

fn leaf_entries(volume: &Volume, buf: &[u8]) -> XfsResult<Vec<LeafEntry>> {
    let header_size = blkinfo_header_size(volume);
    if header_size + 8 > buf.len() || buf.len() < LEAF_TAIL_SIZE {
        return Err(XfsError::Corrupt);
    }

    let count = read_be32(buf, header_size) as usize;
    let start = header_size + 8;
    let end = start
        .checked_add(count * LEAF_ENTRY_SIZE)
        .ok_or(XfsError::Corrupt)?;
    if end > buf.len() - LEAF_TAIL_SIZE {
        return Err(XfsError::Corrupt);
    }

    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let off = start + i * LEAF_ENTRY_SIZE;
        out.push(LeafEntry { hashval: read_be32(buf, off), address: read_be32(buf, off + 4) });
    }
    Ok(out)
}

/// Decodes a leaf `address` into the data block containing it and the byte offset within that
/// block. Addresses are `db << 8 | byte_offset / 8` once `dir_blklog` is folded in, via
/// `Volume::decode_dir_address`.
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

pub fn lookup(volume: &Volume, inode: &Inode, name: &[u8]) -> XfsResult<u64> {
    let leaf_buf = leaf_block(volume, inode)?;
    let has_ftype = volume.superblock().has_ftype_field;
    let leaves = leaf_entries(volume, &leaf_buf)?;
    let target_hash = name_hash(name);

    let start = leaves.partition_point(|e| e.hashval < target_hash);
    for leaf in &leaves[start..] {
        if leaf.hashval != target_hash {
            break;
        }
        let (buf, byte_offset) = resolve_address(volume, inode, leaf.address)?;
        let entry = data_block::read_entry_at(&buf, byte_offset, has_ftype)?;
        if entry.name == name {
            return Ok(entry.ino);
        }
    }

    Err(XfsError::NotFound)
}

pub fn enumerate(volume: &Volume, inode: &Inode) -> XfsResult<Vec<DirEntry>> {
    let sb = volume.superblock();
    let header_size = data_block::data_header_size(sb);

    let data_extents: Vec<_> = dir::all_data_extents(volume, inode)?
        .into_iter()
        .filter(|e| e.start_off != volume.leaf_offset())
        .collect();

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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::xfs::dir::name_hash;
    use crate::fs::xfs::extent::{Extent, ExtentState};
    use crate::fs::xfs::inode::ForkFormat;
    use crate::fs::xfs::sb::{self, Superblock};
    use crate::fs::xfs::volume::BlockDevice;
    use alloc::sync::Arc;
    use alloc::vec;

    struct MemDevice(Vec<u8>);
    impl BlockDevice for MemDevice {
        fn read_at(&self, offset: u64, len: usize) -> XfsResult<Vec<u8>> {
            let start = offset as usize;
            if start + len > self.0.len() {
                return Err(XfsError::IoError);
            }
            Ok(self.0[start..start + len].to_vec())
        }
    }

    fn synth_disk(block_size: u32) -> Vec<u8> {
        let mut disk = vec![0u8; block_size as usize * 8];
        let mut sb_buf = vec![0u8; Superblock::ON_DISK_SIZE];
        sb_buf[0..4].copy_from_slice(&sb::XFS_SB_MAGIC.to_be_bytes());
        sb_buf[4..8].copy_from_slice(&block_size.to_be_bytes());
        sb_buf[8..16].copy_from_slice(&1_000_000u64.to_be_bytes());
        sb_buf[56..64].copy_from_slice(&128u64.to_be_bytes());
        sb_buf[84..88].copy_from_slice(&65536u32.to_be_bytes());
        sb_buf[88..92].copy_from_slice(&4u32.to_be_bytes());
        sb_buf[100..102].copy_from_slice(&0x3004u16.to_be_bytes()); // v4 | DIRV2 | EXTFLG
        sb_buf[102..104].copy_from_slice(&512u16.to_be_bytes());
        sb_buf[104..106].copy_from_slice(&256u16.to_be_bytes());
        sb_buf[106..108].copy_from_slice(&16u16.to_be_bytes());
        sb_buf[120] = block_size.trailing_zeros() as u8;
        sb_buf[121] = 9;
        sb_buf[122] = 8;
        sb_buf[123] = 4;
        sb_buf[124] = 16;
        disk[..Superblock::ON_DISK_SIZE].copy_from_slice(&sb_buf);
        disk
    }

    fn write_data_entry(buf: &mut [u8], pos: usize, ino: u64, name: &[u8]) {
        buf[pos..pos + 8].copy_from_slice(&ino.to_be_bytes());
        buf[pos + 8] = name.len() as u8;
        buf[pos + 9..pos + 9 + name.len()].copy_from_slice(name);
    }

    fn make_dir_inode(leaf_offset: u64) -> Inode {
        let core_size = 96;
        let mut raw = vec![0u8; core_size];
        for extent in [
            Extent { state: ExtentState::Normal, start_off: 0, start_block: 3, block_count: 1 },
            Extent { state: ExtentState::Normal, start_off: 1, start_block: 4, block_count: 1 },
            Extent { state: ExtentState::Normal, start_off: leaf_offset, start_block: 5, block_count: 1 },
        ] {
            raw.extend_from_slice(&extent.pack());
        }

        Inode {
            ino: 64,
            mode: 0x41ff,
            version: 2,
            data_format: ForkFormat::Extents,
            attr_format: ForkFormat::Local,
            nlink: 2,
            uid: 0,
            gid: 0,
            size: 1024,
            block_count: 3,
            data_extent_count: 3,
            attr_extent_count: 0,
            fork_offset: 0,
            atime: (0, 0),
            mtime: (0, 0),
            ctime: (0, 0),
            raw,
            core_size,
        }
    }

    #[test]
    fn s5_leaf_directory_cross_block_lookup_and_enumerate() {
        let block_size = 512u32;
        let mut disk = synth_disk(block_size);
        let header_size = 16; // v4: 4-byte magic + 3 bestfree slots of 4 bytes each

        // Each data block carries exactly one real entry followed by one unused_entry spanning
        // the rest of the block, matching the real on-disk invariant that every byte of a data
        // block is covered by either a real entry or a freetag gap marker.
        let data0_off = block_size as usize * 3;
        disk[data0_off..data0_off + 4].copy_from_slice(&header::magic::DIR_DATA_V4.to_be_bytes());
        write_data_entry(&mut disk[data0_off..], header_size, 300, b"cat");
        let cat_end = header_size + 8 + 1 + 3 + 2; // ino + namelen + "cat" + tag, unaligned
        let cat_end = (cat_end + 7) & !7;
        disk[data0_off + cat_end..data0_off + cat_end + 2].copy_from_slice(&0xFFFFu16.to_be_bytes());
        disk[data0_off + cat_end + 2..data0_off + cat_end + 4]
            .copy_from_slice(&((block_size as usize - cat_end) as u16).to_be_bytes());

        let data1_off = block_size as usize * 4;
        disk[data1_off..data1_off + 4].copy_from_slice(&header::magic::DIR_DATA_V4.to_be_bytes());
        write_data_entry(&mut disk[data1_off..], header_size, 301, b"doge");
        let doge_end = header_size + 8 + 1 + 4 + 2;
        let doge_end = (doge_end + 7) & !7;
        disk[data1_off + doge_end..data1_off + doge_end + 2].copy_from_slice(&0xFFFFu16.to_be_bytes());
        disk[data1_off + doge_end + 2..data1_off + doge_end + 4]
            .copy_from_slice(&((block_size as usize - doge_end) as u16).to_be_bytes());

        let leaf_blk_off = block_size as usize * 5;
        disk[leaf_blk_off + 8..leaf_blk_off + 10]
            .copy_from_slice(&(header::magic::DIR_LEAF1_V4 as u16).to_be_bytes());

        let cat_hash = name_hash(b"cat");
        let doge_hash = name_hash(b"doge");
        // address = byte_addr(logical_block * block_size + byte_offset) / 8
        let cat_addr = (0u64 * u64::from(block_size) + header_size as u64) / 8;
        let doge_addr = (1u64 * u64::from(block_size) + header_size as u64) / 8;
        let mut leaves = vec![(cat_hash, cat_addr as u32), (doge_hash, doge_addr as u32)];
        leaves.sort_by_key(|(h, _)| *h);

        disk[leaf_blk_off + 12..leaf_blk_off + 16].copy_from_slice(&(leaves.len() as u32).to_be_bytes());
        for (i, (hash, address)) in leaves.iter().enumerate() {
            let off = leaf_blk_off + 20 + i * 8;
            disk[off..off + 4].copy_from_slice(&hash.to_be_bytes());
            disk[off + 4..off + 8].copy_from_slice(&address.to_be_bytes());
        }

        let device: Arc<dyn BlockDevice + Send + Sync> = Arc::new(MemDevice(disk));
        let volume = Volume::mount(device).expect("mount should succeed");
        let inode = make_dir_inode(volume.leaf_offset());

        assert_eq!(lookup(&volume, &inode, b"cat").unwrap(), 300);
        assert_eq!(lookup(&volume, &inode, b"doge").unwrap(), 301);
        assert_eq!(lookup(&volume, &inode, b"zzz"), Err(XfsError::NotFound));

        let entries = enumerate(&volume, &inode).expect("enumerate should succeed");
        let names: Vec<&[u8]> = entries.iter().map(|e| e.name.as_slice()).collect();
        assert_eq!(names, vec![b"cat".as_slice(), b"doge"]);
    }
}
