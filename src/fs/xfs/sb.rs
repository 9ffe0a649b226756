//! XFS superblock: parse, validate, derive geometry.

use crate::fs::xfs::endian::{read_be16, read_be32, read_be64};
use crate::fs::xfs::error::{XfsError, XfsResult};
use crate::{error, info};

pub const XFS_SB_MAGIC: u32 = 0x5846_5342;

const FEAT_INCOMPAT_FTYPE: u32 = 1 << 0;
const FEAT_INCOMPAT_SPINODES: u32 = 1 << 1;
const FEAT_INCOMPAT_META_UUID: u32 = 1 << 2;
const FEAT_INCOMPAT_BIGTIME: u32 = 1 << 3;
const FEAT_INCOMPAT_NEEDSREPAIR: u32 = 1 << 4;
const FEAT_INCOMPAT_NREXT64: u32 = 1 << 5;

/// All `INCOMPAT` bits this reader understands. Anything else rejects the mount.
const KNOWN_INCOMPAT: u32 = FEAT_INCOMPAT_FTYPE
    | FEAT_INCOMPAT_SPINODES
    | FEAT_INCOMPAT_META_UUID
    | FEAT_INCOMPAT_BIGTIME
    | FEAT_INCOMPAT_NEEDSREPAIR
    | FEAT_INCOMPAT_NREXT64;

const VERSION_NUM_MASK: u16 = 0x000f;
const VERSION_EXTFLG: u16 = 0x1000;
const VERSION_DIRV2: u16 = 0x2000;
const VERSION_MOREBITS: u16 = 0x4000;

/// Feature bits that are legal to appear in a v4 `sb_versionnum` word (`ATTR`, `NLINK`, `QUOTA`,
/// `ALIGN`, `DALIGN`, `SHARED`, `LOGV2`, `SECTOR`, `EXTFLG`, `DIRV2`, `MOREBITS`). Anything else
/// set is an unknown feature and rejects the mount.
const V4_OKAY_VERSION_MASK: u16 = 0x0010 // ATTR
    | 0x0020 // NLINK
    | 0x0040 // QUOTA
    | 0x0080 // ALIGN
    | 0x0100 // DALIGN
    | 0x0200 // SHARED
    | 0x0400 // LOGV2
    | 0x0800 // SECTOR
    | VERSION_EXTFLG
    | VERSION_DIRV2
    | VERSION_MOREBITS;

const OQUOTA_ENFD: u16 = 0x0010;
const OQUOTA_CHKD: u16 = 0x0020;
const PQUOTA_ENFD: u16 = 0x0200;
const PQUOTA_CHKD: u16 = 0x0400;

/// Superblock fields the rest of the reader needs, already endian-converted and with version-
/// dependent derived fields filled in. Holds no reference to the raw buffer: every field used
/// after mount is copied out, keeping only the derived fields the reader needs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Superblock {
    pub block_size: u32,
    pub block_log: u32,
    pub sector_size: u32,
    pub sector_log: u32,
    pub inode_size: u32,
    pub inode_log: u32,
    pub inodes_per_block_log: u32,
    pub ag_block_count: u32,
    pub ag_block_log: u32,
    pub ag_count: u32,
    pub dir_block_log: u32,
    pub root_ino: u64,
    pub uuid: [u8; 16],
    pub meta_uuid: [u8; 16],
    pub version: u8,
    pub incompat_features: u32,
    pub has_ftype_field: bool,
    pub dblocks: u64,
    pub log_start: u64,
    pub log_blocks: u32,
}

impl Superblock {
    /// We only need the first 288 bytes of the (up to 512-byte) on-disk superblock: every field
    /// through `sb_features_log_incompat` and the v5 `sb_meta_uuid`.
    pub const ON_DISK_SIZE: usize = 288;

    pub fn parse(buf: &[u8]) -> XfsResult<Self> {
        if buf.len() < Self::ON_DISK_SIZE {
            return Err(XfsError::IoError);
        }

        let magic = read_be32(buf, 0);
        if magic != XFS_SB_MAGIC {
            error!("xfs", "bad superblock magic {:#x}", magic);
            return Err(XfsError::BadSuperblock);
        }

        let block_size = read_be32(buf, 4);
        let dblocks = read_be64(buf, 8);
        let mut uuid = [0u8; 16];
        uuid.copy_from_slice(&buf[32..48]);
        let log_start = read_be64(buf, 48);
        let root_ino = read_be64(buf, 56);
        let log_blocks = read_be32(buf, 96);

        let agblocks = read_be32(buf, 84);
        let agcount = read_be32(buf, 88);

        let versionnum = read_be16(buf, 100);
        let sectsize = u32::from(read_be16(buf, 102));
        let inodesize = u32::from(read_be16(buf, 104));
        let inopblock = u32::from(read_be16(buf, 106));

        let blocklog = u32::from(buf[120]);
        let sectlog = u32::from(buf[121]);
        let inodelog = u32::from(buf[122]);
        let inopblog = u32::from(buf[123]);
        let agblklog = u32::from(buf[124]);

        let features2 = read_be32(buf, 200);
        let dirblklog = u32::from(buf[192]);

        let version = (versionnum & VERSION_NUM_MASK) as u8;

        if block_size < 512 || block_size > 65536 || block_size != (1u32 << blocklog) {
            error!("xfs", "bad block size {block_size} (log {blocklog})");
            return Err(XfsError::BadSuperblock);
        }

        if !(512..=32768).contains(&sectsize) || sectsize != (1u32 << sectlog) {
            error!("xfs", "bad sector size {sectsize}");
            return Err(XfsError::BadSuperblock);
        }

        if !(256..=2048).contains(&inodesize) || inodesize != (1u32 << inodelog) {
            error!("xfs", "bad inode size {inodesize}");
            return Err(XfsError::BadSuperblock);
        }

        if agcount < 1 {
            error!("xfs", "ag_count must be >= 1");
            return Err(XfsError::BadSuperblock);
        }

        // log2(max_block_size) == 16 (64KiB).
        if blocklog + dirblklog > 16 {
            error!("xfs", "block_log + dir_block_log exceeds max block size");
            return Err(XfsError::BadSuperblock);
        }

        let (incompat_features, meta_uuid_override, has_ftype_v5);

        match version {
            4 => {
                if block_size < 512 {
                    return Err(XfsError::BadSuperblock);
                }
                if versionnum & VERSION_DIRV2 == 0 {
                    error!("xfs", "v4 superblock missing DIRV2 feature bit");
                    return Err(XfsError::BadSuperblock);
                }
                if versionnum & VERSION_EXTFLG == 0 {
                    error!("xfs", "v4 superblock missing EXTFLG feature bit");
                    return Err(XfsError::BadSuperblock);
                }

                let unknown_bits = versionnum & !V4_OKAY_VERSION_MASK & !VERSION_NUM_MASK;
                if unknown_bits != 0 {
                    error!("xfs", "v4 superblock has unknown feature bits {unknown_bits:#x}");
                    return Err(XfsError::UnsupportedVersion);
                }

                if versionnum & VERSION_MOREBITS != 0 {
                    let unknown_features2 = features2 & !u32::from(V4_OKAY_VERSION_MASK);
                    if unknown_features2 != 0 {
                        error!("xfs", "v4 superblock has unknown features2 bits {unknown_features2:#x}");
                        return Err(XfsError::UnsupportedVersion);
                    }
                }

                incompat_features = 0;
                meta_uuid_override = None;
                // has_ftype_field is a v5-only derived bit; v4 directory entries never carry it.
                has_ftype_v5 = false;
            }
            5 => {
                if block_size < 1024 {
                    error!("xfs", "v5 superblock block size below 1024 minimum");
                    return Err(XfsError::BadSuperblock);
                }

                let features_compat = read_be32(buf, 208);
                let features_ro_compat = read_be32(buf, 212);
                let features_incompat = read_be32(buf, 216);
                let features_log_incompat = read_be32(buf, 220);

                let unknown_incompat = features_incompat & !KNOWN_INCOMPAT;
                if unknown_incompat != 0 {
                    error!("xfs", "v5 superblock has unknown incompat features {unknown_incompat:#x}");
                    return Err(XfsError::UnsupportedVersion);
                }

                if features_compat != 0 {
                    info!("xfs", "v5 superblock has unknown compat features {features_compat:#x} (ignored)");
                }
                if features_ro_compat != 0 {
                    info!(
                        "xfs",
                        "v5 superblock has unknown ro-compat features {features_ro_compat:#x} (mounting read-only anyway)"
                    );
                }
                if features_log_incompat != 0 {
                    info!("xfs", "v5 superblock has log-incompat features {features_log_incompat:#x} (ignored, no log replay)");
                }

                incompat_features = features_incompat;
                has_ftype_v5 = features_incompat & FEAT_INCOMPAT_FTYPE != 0;

                meta_uuid_override = if features_incompat & FEAT_INCOMPAT_META_UUID != 0 {
                    let mut meta = [0u8; 16];
                    meta.copy_from_slice(&buf[248..264]);
                    Some(meta)
                } else {
                    None
                };
            }
            _ => {
                error!("xfs", "unsupported superblock version {version}");
                return Err(XfsError::UnsupportedVersion);
            }
        }

        let qflags = read_be16(buf, 176);

        if version == 4 && (qflags & (PQUOTA_ENFD | PQUOTA_CHKD)) != 0 {
            error!("xfs", "v4 superblock sets v5-only project quota bits");
            return Err(XfsError::BadSuperblock);
        }
        if version == 5 && (qflags & (OQUOTA_ENFD | OQUOTA_CHKD)) != 0 {
            error!("xfs", "v5 superblock sets legacy oquota bits");
            return Err(XfsError::BadSuperblock);
        }

        let meta_uuid = meta_uuid_override.unwrap_or(uuid);

        Ok(Self {
            block_size,
            block_log: blocklog,
            sector_size: sectsize,
            sector_log: sectlog,
            inode_size: inodesize,
            inode_log: inodelog,
            inodes_per_block_log: inopblog,
            ag_block_count: agblocks,
            ag_block_log: agblklog,
            ag_count: agcount,
            dir_block_log: dirblklog,
            root_ino,
            uuid,
            meta_uuid,
            version,
            incompat_features,
            has_ftype_field: has_ftype_v5,
            dblocks,
            log_start,
            log_blocks,
        })
    }

    /// `inodes_per_block`, derived from the log stored on disk.
    pub fn inodes_per_block(&self) -> u32 {
        1 << self.inodes_per_block_log
    }

    /// Number of blocks in allocation group `ag` — every AG but the last is `ag_block_count`
    /// blocks; the last AG is clamped to whatever remains instead of assuming uniform size.
    pub fn ag_block_count_for(&self, ag: u32) -> u32 {
        if ag + 1 < self.ag_count {
            self.ag_block_count
        } else {
            let full = u64::from(self.ag_block_count) * u64::from(self.ag_count - 1);
            (self.dblocks.saturating_sub(full)) as u32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn synth_v5_sb() -> vec::Vec<u8> {
        let mut buf = vec![0u8; Superblock::ON_DISK_SIZE];
        buf[0..4].copy_from_slice(&XFS_SB_MAGIC.to_be_bytes());
        buf[4..8].copy_from_slice(&4096u32.to_be_bytes()); // block size
        buf[8..16].copy_from_slice(&1_000_000u64.to_be_bytes()); // dblocks
        buf[56..64].copy_from_slice(&128u64.to_be_bytes()); // root ino
        buf[84..88].copy_from_slice(&65536u32.to_be_bytes()); // agblocks
        buf[88..92].copy_from_slice(&4u32.to_be_bytes()); // agcount
        buf[100..102].copy_from_slice(&5u16.to_be_bytes()); // versionnum
        buf[102..104].copy_from_slice(&512u16.to_be_bytes()); // sectsize
        buf[104..106].copy_from_slice(&512u16.to_be_bytes()); // inodesize
        buf[106..108].copy_from_slice(&8u16.to_be_bytes()); // inopblock
        buf[120] = 12; // blocklog
        buf[121] = 9; // sectlog
        buf[122] = 9; // inodelog
        buf[123] = 3; // inopblog
        buf[124] = 16; // agblklog
        buf[192] = 0; // dirblklog

        buf
    }

    #[test]
    fn s1_v5_superblock_loads() {
        let buf = synth_v5_sb();
        let sb = Superblock::parse(&buf).expect("should mount");
        assert_eq!(sb.version, 5);
        assert_eq!(sb.root_ino, 128);
        assert_eq!(sb.meta_uuid, sb.uuid);
    }

    #[test]
    fn s2_v4_without_dirv2_rejected() {
        let mut buf = synth_v5_sb();
        buf[100..102].copy_from_slice(&4u16.to_be_bytes()); // version 4, no DIRV2/EXTFLG
        assert_eq!(Superblock::parse(&buf), Err(XfsError::BadSuperblock));
    }
}
