//! Symlink target resolution.
//!
//! `LOCAL` format inlines the target right after the inode core; `EXTENTS` format stores it in
//! exactly one data block, optionally prefixed by a v5 self-describing header.

use alloc::vec::Vec;

use crate::fs::xfs::dir::direct_extents;
use crate::fs::xfs::error::{XfsError, XfsResult};
use crate::fs::xfs::header;
use crate::fs::xfs::inode::{ForkFormat, Inode};
use crate::fs::xfs::volume::Volume;

pub fn read_link(volume: &Volume, inode: &Inode) -> XfsResult<Vec<u8>> {
    match inode.data_format {
        ForkFormat::Local => {
            let buf = inode.data_fork_bytes();
            let len = inode.size as usize;
            if len > buf.len() {
                return Err(XfsError::Corrupt);
            }
            Ok(buf[..len].to_vec())
        }
        ForkFormat::Extents => {
            let extents = direct_extents(inode);
            let extent = extents.first().ok_or(XfsError::Corrupt)?;
            let buf = volume.read_block(extent.start_block)?;

            let sb = volume.superblock();
            let payload_start = if sb.version >= 5 {
                header::verify_header(
                    sb,
                    &buf,
                    header::magic::SYMLINK_V5,
                    header::magic::SYMLINK_V5,
                    0,
                    header::magic::SYMLINK_LAYOUT_V5,
                    extent.start_block,
                    inode.ino,
                )?;
                56
            } else {
                0
            };

            let len = inode.size as usize;
            if payload_start + len > buf.len() {
                return Err(XfsError::Corrupt);
            }
            Ok(buf[payload_start..payload_start + len].to_vec())
        }
        _ => Err(XfsError::NotSupported),
    }
}
