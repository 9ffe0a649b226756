//! Shared decoder for the `data_entry`/`unused_entry` layout common to block, leaf and node
//! directories. Short-form directories do not use this layout at all.

use alloc::vec::Vec;

use crate::fs::xfs::endian::read_be16;
use crate::fs::xfs::endian::read_be64;
use crate::fs::xfs::error::{XfsError, XfsResult};
use crate::fs::xfs::sb::Superblock;

const FREE_TAG: u16 = 0xFFFF;

pub struct DataEntry {
    pub name: Vec<u8>,
    pub ino: u64,
    pub ftype: Option<u8>,
}

/// v4: `magic(4) + bestfree[3] * {offset, length}(4 each)`. v5 prepends the 52-byte self-describing
/// block header (magic4 + crc4 + blkno8 + lsn8 + uuid16 + owner8 + pad4) in place of the bare
/// magic. `bestfree` itself is an allocation hint only; neither layout parses it since nothing on
/// the read path needs it.
pub fn data_header_size(sb: &Superblock) -> usize {
    let base = if sb.version >= 5 { 52 } else { 4 };
    base + 3 * 4
}

/// Reads one `data_entry` starting at `byte_offset`, without needing to know its total (padded)
/// length — used when a leaf or node address already points straight at the entry.
pub fn read_entry_at(buf: &[u8], byte_offset: usize, has_ftype: bool) -> XfsResult<DataEntry> {
    if byte_offset + 9 > buf.len() {
        return Err(XfsError::Corrupt);
    }
    let ino = read_be64(buf, byte_offset);
    let namelen = buf[byte_offset + 8] as usize;
    let name_start = byte_offset + 9;
    if name_start + namelen > buf.len() {
        return Err(XfsError::Corrupt);
    }
    let name = buf[name_start..name_start + namelen].to_vec();

    let ftype_pos = name_start + namelen;
    let ftype = if has_ftype {
        if ftype_pos >= buf.len() {
            return Err(XfsError::Corrupt);
        }
        Some(buf[ftype_pos])
    } else {
        None
    };

    Ok(DataEntry { name, ino, ftype })
}

/// Walks every entry between `header_size` and `buf.len()` in on-disk order, skipping
/// `unused_entry` gaps via their `freetag`/`length` pair.
pub fn parse_data_block(buf: &[u8], header_size: usize, has_ftype: bool) -> XfsResult<Vec<DataEntry>> {
    let mut pos = header_size;
    let mut out = Vec::new();

    while pos + 2 <= buf.len() {
        let tag = read_be16(buf, pos);
        if tag == FREE_TAG {
            if pos + 4 > buf.len() {
                break;
            }
            let length = read_be16(buf, pos + 2) as usize;
            if length == 0 {
                return Err(XfsError::Corrupt);
            }
            pos += length;
            continue;
        }

        let entry = read_entry_at(buf, pos, has_ftype)?;
        let unaligned = 8 + 1 + entry.name.len() + if has_ftype { 1 } else { 0 } + 2;
        let total_len = (unaligned + 7) & !7;

        out.push(entry);
        pos += total_len;
    }

    Ok(out)
}
