//! Read-only XFS filesystem reader.
//!
//! `XfsFs::identify`/`XfsFs::mount` plug into [`crate::fs::partitions::Partition::load_fs`] the
//! same way every other filesystem backend does. Everything below `mount` is stateless: each
//! call re-derives whatever it needs from the immutable [`Volume`] handle, so `XfsFs` itself only
//! carries identity (drive, partition) plus that handle.

pub mod attr;
pub mod btree;
pub mod dir;
pub mod endian;
pub mod error;
pub mod extent;
pub mod header;
pub mod inode;
pub mod sb;
pub mod symlink;
pub mod volume;

use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::drivers::ahci::get_sata_drive;
use crate::errors::{IOError, MountError};
use crate::info;

use attr::AttrEntry;
use dir::DirEntry;
use error::{XfsError, XfsResult};
use inode::Inode;
use sb::Superblock;
use volume::{BlockDevice, SataBlockDevice, Volume};

/// `stat`'s result: the subset of the inode core callers need, plus `block_size` since extent
/// counts are meaningless without knowing what a block is worth.
#[derive(Clone, Copy, Debug)]
pub struct Stat {
    pub ino: u64,
    pub mode: u16,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub block_count: u64,
    pub block_size: u32,
    pub atime: (u32, u32),
    pub mtime: (u32, u32),
    pub ctime: (u32, u32),
}

impl From<(&Inode, &Superblock)> for Stat {
    fn from((inode, sb): (&Inode, &Superblock)) -> Self {
        Self {
            ino: inode.ino,
            mode: inode.mode,
            nlink: inode.nlink,
            uid: inode.uid,
            gid: inode.gid,
            size: inode.size,
            block_count: inode.block_count,
            block_size: sb.block_size,
            atime: inode.atime,
            mtime: inode.mtime,
            ctime: inode.ctime,
        }
    }
}

/// A mounted, read-only XFS volume.
#[derive(Clone, Debug)]
pub struct XfsFs {
    drive_id: usize,
    partition_id: usize,
    volume: Volume,
}

impl XfsFs {
    /// Reads just the superblock and checks its magic, without validating anything else — used
    /// to probe a partition before committing to a full [`Self::mount`].
    pub fn identify(drive_id: usize, partition_data: u64) -> Result<bool, IOError> {
        let mut drive = get_sata_drive(drive_id).lock();
        let sector_size = u64::from(drive.logical_sector_size());

        let sectors = (Superblock::ON_DISK_SIZE as u64 + sector_size - 1) / sector_size;
        let mut raw = alloc::vec![0u8; (sectors * sector_size) as usize];
        drive
            .read(partition_data, sectors as u16, &mut raw)
            .map_err(|_| IOError::InvalidCommand)?;

        Ok(endian::read_be32(&raw, 0) == sb::XFS_SB_MAGIC)
    }

    pub fn mount(drive_id: usize, partition_id: usize, partition_data: u64) -> Result<Self, MountError> {
        let device = SataBlockDevice {
            drive_id,
            partition_start_lba: partition_data,
        };
        let device: Arc<dyn BlockDevice + Send + Sync> = Arc::new(device);
        let volume = Volume::mount(device)?;

        info!(
            "xfs-fs",
            "mounted xfs filesystem on drive {drive_id} partition {partition_id}"
        );

        Ok(Self { drive_id, partition_id, volume })
    }

    pub fn drive_id(&self) -> usize {
        self.drive_id
    }

    pub fn partition_id(&self) -> usize {
        self.partition_id
    }

    pub fn root_ino(&self) -> u64 {
        self.volume.superblock().root_ino
    }

    /// Resolves a `/`-separated absolute path to an inode number, walking one directory lookup
    /// per component starting at the root. An empty path, or `/`, resolves to the root inode.
    pub fn lookup_path(&self, path: &[u8]) -> XfsResult<u64> {
        let mut ino = self.root_ino();

        for component in path.split(|&b| b == b'/').filter(|c| !c.is_empty()) {
            if component.len() > 255 {
                return Err(XfsError::NameTooLong);
            }
            let inode = Inode::load(&self.volume, ino)?;
            ino = dir::lookup(&self.volume, &inode, component)?;
        }

        Ok(ino)
    }

    /// Full directory listing for `dir_ino`. `cookie` is the index into the materialised entry
    /// list to resume from; callers drive repeated calls with the returned next cookie until it
    /// comes back equal to the entry count (or the directory is exhausted).
    pub fn read_dir(&self, dir_ino: u64, cookie: usize) -> XfsResult<(Vec<DirEntry>, usize)> {
        let inode = Inode::load(&self.volume, dir_ino)?;
        if !inode.is_dir() {
            return Err(XfsError::NotSupported);
        }

        let entries = dir::enumerate(&self.volume, &inode)?;
        let start = cookie.min(entries.len());
        let page = entries[start..].to_vec();
        let next_cookie = entries.len();

        Ok((page, next_cookie))
    }

    pub fn stat(&self, ino: u64) -> XfsResult<Stat> {
        let inode = Inode::load(&self.volume, ino)?;
        Ok(Stat::from((&inode, self.volume.superblock())))
    }

    /// Reads up to `buf.len()` bytes starting at file-relative `offset`, returning how many bytes
    /// were actually copied (short of `buf.len()` at EOF).
    pub fn read_file(&self, ino: u64, offset: u64, buf: &mut [u8]) -> XfsResult<usize> {
        let inode = Inode::load(&self.volume, ino)?;
        if !inode.is_reg() {
            return Err(XfsError::NotSupported);
        }

        if offset >= inode.size {
            return Ok(0);
        }

        let block_size = u64::from(self.volume.superblock().block_size);
        let want = (buf.len() as u64).min(inode.size - offset) as usize;
        let mut done = 0usize;

        while done < want {
            let file_block = (offset + done as u64) / block_size;
            let block_off = ((offset + done as u64) % block_size) as usize;

            let fsb = self.data_logical_block_to_fsblock(&inode, file_block)?;
            let block = self.volume.read_block(fsb)?;

            let take = (block_size as usize - block_off).min(want - done);
            buf[done..done + take].copy_from_slice(&block[block_off..block_off + take]);
            done += take;
        }

        Ok(done)
    }

    /// Resolves a regular file's data-fork logical block to a filesystem block, across both the
    /// direct-extent and B+Tree fork formats — the same dispatch [`dir::logical_block_to_fsblock`]
    /// does for directories, just without a directory-block-size assumption.
    fn data_logical_block_to_fsblock(&self, inode: &Inode, logical_block: u64) -> XfsResult<u64> {
        use inode::ForkFormat;

        match inode.data_format {
            ForkFormat::Extents => dir::direct_extents(inode)
                .into_iter()
                .find(|e| e.covers_block(logical_block))
                .map(|e| e.start_block + (logical_block - e.start_off))
                .ok_or(XfsError::Corrupt),
            ForkFormat::Btree => {
                let mut walker = btree::BTreeWalker::new(&self.volume, inode.ino);
                let extent = walker.search(inode.data_fork_bytes(), logical_block, btree::SearchKind::Data)?;
                Ok(extent.start_block + (logical_block - extent.start_off))
            }
            _ => Err(XfsError::NotSupported),
        }
    }

    pub fn read_link(&self, ino: u64) -> XfsResult<Vec<u8>> {
        let inode = Inode::load(&self.volume, ino)?;
        if !inode.is_symlink() {
            return Err(XfsError::NotSupported);
        }
        symlink::read_link(&self.volume, &inode)
    }

    /// `open_attr`/`read_attr`: looks up one extended attribute by name.
    pub fn open_attr(&self, ino: u64, name: &[u8]) -> XfsResult<AttrEntry> {
        let inode = Inode::load(&self.volume, ino)?;
        attr::open_attr(&self.volume, &inode, name)
    }

    pub fn enum_attr(&self, ino: u64) -> XfsResult<Vec<AttrEntry>> {
        let inode = Inode::load(&self.volume, ino)?;
        attr::enum_attr(&self.volume, &inode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::xfs::extent::{Extent, ExtentState};
    use alloc::vec;

    fn synth_disk(block_size: u32, root_ino: u64) -> Vec<u8> {
        let mut disk = vec![0u8; block_size as usize * 8];
        let mut sb_buf = vec![0u8; Superblock::ON_DISK_SIZE];
        sb_buf[0..4].copy_from_slice(&sb::XFS_SB_MAGIC.to_be_bytes());
        sb_buf[4..8].copy_from_slice(&block_size.to_be_bytes());
        sb_buf[8..16].copy_from_slice(&1_000_000u64.to_be_bytes());
        sb_buf[56..64].copy_from_slice(&root_ino.to_be_bytes());
        sb_buf[84..88].copy_from_slice(&65536u32.to_be_bytes());
        sb_buf[88..92].copy_from_slice(&4u32.to_be_bytes());
        sb_buf[100..102].copy_from_slice(&0x3004u16.to_be_bytes()); // version 4 | DIRV2 | EXTFLG
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

    fn write_inode_core(buf: &mut [u8], ino_off: usize, mode: u16, data_format: u8, size: u64, block_count: u64) {
        buf[ino_off..ino_off + 2].copy_from_slice(&0x494eu16.to_be_bytes());
        buf[ino_off + 2..ino_off + 4].copy_from_slice(&mode.to_be_bytes());
        buf[ino_off + 4] = 2; // version
        buf[ino_off + 5] = data_format;
        buf[ino_off + 16..ino_off + 20].copy_from_slice(&1u32.to_be_bytes()); // nlink
        buf[ino_off + 56..ino_off + 64].copy_from_slice(&size.to_be_bytes());
        buf[ino_off + 64..ino_off + 72].copy_from_slice(&block_count.to_be_bytes());
        buf[ino_off + 83] = 1; // attr_format = LOCAL, no attr fork (fork_offset at ino_off + 82 stays 0)
    }

    // inodes_per_block_log is 4 (16/block) and every AG fits in one block's worth of inodes
    // here, so picking ino = 32 lands the inode at ag-relative block 2, offset 0 — fsb 2.
    const ROOT_INO: u64 = 32;

    #[test]
    fn read_file_spans_a_single_direct_extent() {
        let block_size = 512u32;
        let mut disk = synth_disk(block_size, ROOT_INO);

        let root_off = block_size as usize * 2;
        write_inode_core(&mut disk, root_off, 0x8000, 2, 10, 1);
        let extent = Extent { state: ExtentState::Normal, start_off: 0, start_block: 3, block_count: 1 };
        disk[root_off + 96..root_off + 112].copy_from_slice(&extent.pack());

        let data_off = block_size as usize * 3;
        disk[data_off..data_off + 10].copy_from_slice(b"helloworld");

        let device: Arc<dyn BlockDevice + Send + Sync> = Arc::new(MemDevice(disk));
        let volume = Volume::mount(device).expect("mount should succeed");
        let fs = XfsFs { drive_id: 0, partition_id: 0, volume };

        let mut out = [0u8; 10];
        let n = fs.read_file(ROOT_INO, 0, &mut out).expect("read should succeed");
        assert_eq!(n, 10);
        assert_eq!(&out, b"helloworld");
    }

    #[test]
    fn stat_reports_inode_core_fields() {
        let block_size = 512u32;
        let mut disk = synth_disk(block_size, ROOT_INO);
        let root_off = block_size as usize * 2;
        write_inode_core(&mut disk, root_off, 0x81a4, 1, 0, 0);

        let device: Arc<dyn BlockDevice + Send + Sync> = Arc::new(MemDevice(disk));
        let volume = Volume::mount(device).expect("mount should succeed");
        let fs = XfsFs { drive_id: 0, partition_id: 0, volume };

        let st = fs.stat(ROOT_INO).expect("stat should succeed");
        assert_eq!(st.mode, 0x81a4);
        assert_eq!(st.block_size, block_size);
    }
}
