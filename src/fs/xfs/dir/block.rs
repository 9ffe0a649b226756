//! Single-block directory: one data block with an embedded leaf tail.
//!
//! Selected when `block_count == 1 && size == dir_block_size && first_extent.start_off == 0`.
//! The leaf array and `block_tail` share the same filesystem block as the data entries, so there
//! is exactly one device read per lookup or enumeration.

use alloc::vec::Vec;

use crate::fs::xfs::dir::data_block::{self, DataEntry};
use crate::fs::xfs::dir::{name_hash, DirEntry};
use crate::fs::xfs::endian::read_be32;
use crate::fs::xfs::error::{XfsError, XfsResult};
use crate::fs::xfs::header;
use crate::fs::xfs::inode::Inode;
use crate::fs::xfs::volume::Volume;

struct LeafEntry {
    hashval: u32,
    address: u32,
}

const BLOCK_TAIL_SIZE: usize = 8;
const LEAF_ENTRY_SIZE: usize = 8;

fn load_block(volume: &Volume, inode: &Inode) -> XfsResult<Vec<u8>> {
    let extents = crate::fs::xfs::dir::direct_extents(inode);
    let fsb = extents.first().ok_or(XfsError::Corrupt)?.start_block;
    let buf = volume.read_block(fsb)?;

    let sb = volume.superblock();
    let (v4_magic, v5_magic) = (header::magic::DIR_BLOCK_V4, header::magic::DIR_BLOCK_V5);
    header::verify_header(
        sb,
        &buf,
        v4_magic,
        v5_magic,
        0,
        header::magic::DIR_DATA_LAYOUT_V5,
        fsb,
        inode.ino,
    )?;

    Ok(buf)
}

fn leaf_entries(buf: &[u8]) -> XfsResult<Vec<LeafEntry>> {
    if buf.len() < BLOCK_TAIL_SIZE {
        return Err(XfsError::Corrupt);
    }
    let tail_off = buf.len() - BLOCK_TAIL_SIZE;
    let count = read_be32(buf, tail_off) as usize;

    let leaf_start = tail_off
        .checked_sub(count * LEAF_ENTRY_SIZE)
        .ok_or(XfsError::Corrupt)?;

    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let off = leaf_start + i * LEAF_ENTRY_SIZE;
        out.push(LeafEntry {
            hashval: read_be32(buf, off),
            address: read_be32(buf, off + 4),
        });
    }
    Ok(out)
}

fn leaf_region_start(buf: &[u8]) -> XfsResult<usize> {
    if buf.len() < BLOCK_TAIL_SIZE {
        return Err(XfsError::Corrupt);
    }
    let tail_off = buf.len() - BLOCK_TAIL_SIZE;
    let count = read_be32(buf, tail_off) as usize;
    tail_off.checked_sub(count * LEAF_ENTRY_SIZE).ok_or(XfsError::Corrupt)
}

pub fn lookup(volume: &Volume, inode: &Inode, name: &[u8]) -> XfsResult<u64> {
    let buf = load_block(volume, inode)?;
    let has_ftype = volume.superblock().has_ftype_field;
    let leaves = leaf_entries(&buf)?;
    let target_hash = name_hash(name);

    let start = leaves.partition_point(|e| e.hashval < target_hash);
    for leaf in &leaves[start..] {
        if leaf.hashval != target_hash {
            break;
        }
        let byte_off = (leaf.address as usize) * 8;
        let entry = data_block::read_entry_at(&buf, byte_off, has_ftype)?;
        if entry.name == name {
            return Ok(entry.ino);
        }
    }

    Err(XfsError::NotFound)
}

pub fn enumerate(volume: &Volume, inode: &Inode) -> XfsResult<Vec<DirEntry>> {
    let buf = load_block(volume, inode)?;
    let sb = volume.superblock();
    let header_size = data_block::data_header_size(sb);
    let limit = leaf_region_start(&buf)?;

    let entries: Vec<DataEntry> =
        data_block::parse_data_block(&buf[..limit], header_size, sb.has_ftype_field)?;

    Ok(entries
        .into_iter()
        .map(|e| DirEntry { name: e.name, ino: e.ino, ftype: e.ftype })
        .collect())
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

    fn make_dir_inode(start_block: u64) -> Inode {
        let core_size = 96;
        let mut raw = vec![0u8; core_size];
        let extent = Extent { state: ExtentState::Normal, start_off: 0, start_block, block_count: 1 };
        raw.extend_from_slice(&extent.pack());

        Inode {
            ino: 64,
            mode: 0x41ff,
            version: 2,
            data_format: ForkFormat::Extents,
            attr_format: ForkFormat::Local,
            nlink: 2,
            uid: 0,
            gid: 0,
            size: 512,
            block_count: 1,
            data_extent_count: 1,
            attr_extent_count: 0,
            fork_offset: 0,
            atime: (0, 0),
            mtime: (0, 0),
            ctime: (0, 0),
            raw,
            core_size,
        }
    }

    /// Appends one `data_entry { inumber, namelen, name, tag }` at `pos`, returning the
    /// 8-byte-aligned offset just past it.
    fn write_entry(buf: &mut [u8], pos: usize, ino: u64, name: &[u8]) -> usize {
        buf[pos..pos + 8].copy_from_slice(&ino.to_be_bytes());
        buf[pos + 8] = name.len() as u8;
        buf[pos + 9..pos + 9 + name.len()].copy_from_slice(name);
        let unaligned = 8 + 1 + name.len() + 2;
        pos + ((unaligned + 7) & !7)
    }

    #[test]
    fn s4_block_directory_hash_lookup_and_enumerate() {
        let block_size = 512u32;
        let mut disk = synth_disk(block_size);

        let dir_fsb = 3u64;
        let block_off = block_size as usize * dir_fsb as usize;

        disk[block_off..block_off + 4].copy_from_slice(&header::magic::DIR_BLOCK_V4.to_be_bytes());

        let header_size = data_block::data_header_size(&Superblock::parse(&disk[..Superblock::ON_DISK_SIZE]).unwrap());
        let cat_off = header_size;
        let cat_end = write_entry(&mut disk[block_off..], cat_off, 300, b"cat");
        let doge_end = write_entry(&mut disk[block_off..], cat_end, 301, b"doge");
        assert!(doge_end <= block_size as usize - 8 - 2 * 8);

        let cat_hash = name_hash(b"cat");
        let doge_hash = name_hash(b"doge");
        let mut leaves = vec![(cat_hash, (cat_off / 8) as u32), (doge_hash, (cat_end / 8) as u32)];
        leaves.sort_by_key(|(h, _)| *h);

        let tail_off = block_size as usize - 8;
        let leaf_start = tail_off - leaves.len() * LEAF_ENTRY_SIZE;

        // Cover the rest of the block with one unused_entry so parse_data_block doesn't trip
        // over the zero-filled gap before the leaf array.
        let gap = leaf_start - doge_end;
        disk[block_off + doge_end..block_off + doge_end + 2].copy_from_slice(&0xFFFFu16.to_be_bytes());
        disk[block_off + doge_end + 2..block_off + doge_end + 4].copy_from_slice(&(gap as u16).to_be_bytes());

        for (i, (hash, address)) in leaves.iter().enumerate() {
            let off = block_off + leaf_start + i * LEAF_ENTRY_SIZE;
            disk[off..off + 4].copy_from_slice(&hash.to_be_bytes());
            disk[off + 4..off + 8].copy_from_slice(&address.to_be_bytes());
        }
        disk[block_off + tail_off..block_off + tail_off + 4]
            .copy_from_slice(&(leaves.len() as u32).to_be_bytes());

        let device: Arc<dyn BlockDevice + Send + Sync> = Arc::new(MemDevice(disk));
        let volume = Volume::mount(device).expect("mount should succeed");
        let inode = make_dir_inode(dir_fsb);

        assert_eq!(lookup(&volume, &inode, b"cat").unwrap(), 300);
        assert_eq!(lookup(&volume, &inode, b"doge").unwrap(), 301);
        assert_eq!(lookup(&volume, &inode, b"zzz"), Err(XfsError::NotFound));

        let entries = enumerate(&volume, &inode).expect("enumerate should succeed");
        let names: Vec<&[u8]> = entries.iter().map(|e| e.name.as_slice()).collect();
        assert_eq!(names, vec![b"cat".as_slice(), b"doge"]);
        let inos: Vec<u64> = entries.iter().map(|e| e.ino).collect();
        assert_eq!(inos, vec![300, 301]);
    }
}
