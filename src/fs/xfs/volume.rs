//! Volume handle: device + validated superblock, plus the address arithmetic every walker needs.
//!
//! Immutable after mount and carries no shared mutable state, so `Volume` only ever grows new
//! `Arc` references, never interior mutability.

use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::drivers::ahci::get_sata_drive;
use crate::fs::xfs::error::{XfsError, XfsResult};
use crate::fs::xfs::sb::Superblock;
use crate::info;

/// The block device contract: read exactly `len` bytes starting at `offset`, or fail. The core
/// never writes.
pub trait BlockDevice {
    fn read_at(&self, offset: u64, len: usize) -> XfsResult<Vec<u8>>;
}

/// A `BlockDevice` backed by a `SATADrive` partition, addressed the same way the `gpt`/`mbr`
/// partition table readers address their drives: a drive id, plus the partition's starting LBA.
pub struct SataBlockDevice {
    pub(crate) drive_id: usize,
    pub(crate) partition_start_lba: u64,
}

impl BlockDevice for SataBlockDevice {
    fn read_at(&self, offset: u64, len: usize) -> XfsResult<Vec<u8>> {
        let mut drive = get_sata_drive(self.drive_id).lock();
        let sector_size = u64::from(drive.logical_sector_size());

        let abs_byte = self.partition_start_lba * sector_size + offset;
        let start_lba = abs_byte / sector_size;
        let lba_offset = (abs_byte % sector_size) as usize;
        let sectors = ((lba_offset + len) as u64 + sector_size - 1) / sector_size;

        let mut raw = alloc::vec![0u8; (sectors * sector_size) as usize];
        drive
            .read(start_lba, sectors as u16, &mut raw)
            .map_err(|_| XfsError::IoError)?;

        Ok(raw[lba_offset..lba_offset + len].to_vec())
    }
}

/// A mounted XFS volume: device handle plus its validated superblock.
///
/// Process-wide lifetime from mount to unmount, immutable thereafter. Cheaply `Clone`-able
/// (`Arc`) so every request (lookup, readdir, read) can hold its own reference without locking.
#[derive(Clone)]
pub struct Volume {
    device: Arc<dyn BlockDevice + Send + Sync>,
    pub(crate) sb: Superblock,
}

impl core::fmt::Debug for Volume {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Volume").field("sb", &self.sb).finish()
    }
}

/// Magic number stamped at the start of every written log record (`xlog_rec_header.h_magicno`).
/// A log whose first block carries this magic still holds unreplayed records: this reader has no
/// journal replay, so such a volume must fail to mount rather than silently serve stale metadata.
const XLOG_HEADER_MAGIC_NUM: u32 = 0xFEED_BABE;

impl Volume {
    pub fn mount(device: Arc<dyn BlockDevice + Send + Sync>) -> XfsResult<Self> {
        let raw_sb = device.read_at(0, Superblock::ON_DISK_SIZE)?;
        let sb = Superblock::parse(&raw_sb)?;
        let volume = Self { device, sb };

        volume.reject_dirty_log()?;

        info!(
            "xfs",
            "mounted xfs v{} volume, block_size={} ag_count={} root_ino={:#x}",
            sb.version,
            sb.block_size,
            sb.ag_count,
            sb.root_ino
        );

        Ok(volume)
    }

    /// Internal log only: an external log (`log_start == 0`) lives on a separate device this
    /// reader never touches, so it is trusted as-is. For an internal log, a record magic at the
    /// very first log block means the log holds entries that were never checkpointed back into
    /// the filesystem — this reader cannot replay them, so the mount is refused.
    fn reject_dirty_log(&self) -> XfsResult<()> {
        if self.sb.log_start == 0 || self.sb.log_blocks == 0 {
            return Ok(());
        }

        let log_block = self.read_block(self.sb.log_start)?;
        if log_block.len() >= 4 {
            let magic = crate::fs::xfs::endian::read_be32(&log_block, 0);
            if magic == XLOG_HEADER_MAGIC_NUM {
                crate::error!("xfs", "log at fsb {} is dirty, refusing mount", self.sb.log_start);
                return Err(XfsError::Corrupt);
            }
        }

        Ok(())
    }

    pub fn superblock(&self) -> &Superblock {
        &self.sb
    }

    pub fn read_at(&self, offset: u64, len: usize) -> XfsResult<Vec<u8>> {
        self.device.read_at(offset, len)
    }

    /// Reads exactly one filesystem block starting at filesystem block number `fsb`.
    pub fn read_block(&self, fsb: u64) -> XfsResult<Vec<u8>> {
        self.read_at(self.filesystem_block_to_byte(fsb), self.sb.block_size as usize)
    }

    /// Converts an absolute filesystem block number into a byte offset, accounting for the
    /// (possibly short) last allocation group.
    pub fn filesystem_block_to_byte(&self, fsb: u64) -> u64 {
        let ag_block_log = self.sb.ag_block_log;
        let ag_number = fsb >> ag_block_log;
        let ag_relative = fsb & ((1u64 << ag_block_log) - 1);

        ((ag_number * u64::from(self.sb.ag_block_count)) + ag_relative) << self.sb.block_log
    }

    /// Converts an inode number into its absolute byte offset on the device.
    pub fn inode_to_byte(&self, ino: u64) -> u64 {
        let (ag_number, ag_relative_inode) = self.ino_to_ag(ino);
        let ag_block = (ag_relative_inode >> self.sb.inodes_per_block_log)
            & ((1u64 << self.sb.ag_block_log) - 1);
        let offset_in_block = ag_relative_inode & ((1u64 << self.sb.inodes_per_block_log) - 1);

        self.filesystem_block_to_byte(ag_number * u64::from(self.sb.ag_block_count) + ag_block)
            + offset_in_block * u64::from(self.sb.inode_size)
    }

    /// Decodes an inode number into `(ag_number, ag_relative_inode)`.
    pub fn ino_to_ag(&self, ino: u64) -> (u64, u64) {
        let ag_inode_bits = self.sb.ag_block_log + self.sb.inodes_per_block_log;
        let ag_number = ino >> ag_inode_bits;
        let ag_relative_inode = ino & ((1u64 << ag_inode_bits) - 1);
        (ag_number, ag_relative_inode)
    }

    pub fn uuid_equals(&self, uuid: [u8; 16]) -> bool {
        uuid == self.sb.meta_uuid
    }

    /// Number of filesystem blocks in one directory block (`1 << dir_block_log`).
    pub fn dir_blk_fsblocks(&self) -> u32 {
        1u32 << self.sb.dir_block_log
    }

    /// Size in bytes of one directory block.
    pub fn dir_block_size(&self) -> u32 {
        self.sb.block_size * self.dir_blk_fsblocks()
    }

    /// The synthetic logical-offset sentinel at which leaf blocks live in a multi-block
    /// directory.
    pub fn leaf_offset(&self) -> u64 {
        1u64 << (35 - self.sb.block_log)
    }

    /// Decodes a packed directory/leaf `address` field (on-disk value pre-divided by eight) into
    /// `(directory_block_index, offset_within_directory_block)`. The directory block index must
    /// still be translated through the data fork's extent list (or B+Tree) to a real filesystem
    /// block, since a directory's data blocks need not be contiguous.
    pub fn decode_dir_address(&self, addr: u32) -> (u64, u32) {
        let byte_addr = u64::from(addr) << 3;
        let block_no = byte_addr >> (self.sb.block_log + self.sb.dir_block_log);
        let offset = (byte_addr as u32) & (self.dir_block_size() - 1);
        (block_no, offset)
    }
}
