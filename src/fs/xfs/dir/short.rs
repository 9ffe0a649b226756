//! Short-form directory: parent inode plus entries inlined in the data fork.
//!
//! Selected when `data_format == LOCAL`. Small enough that the whole directory lives in the
//! inode, so there is nothing to cache and no header to verify (short-form directories predate
//! the self-describing block format entirely, v4 or v5).

use alloc::vec::Vec;

use crate::fs::xfs::dir::DirEntry;
use crate::fs::xfs::endian::{read_be32, read_be64};
use crate::fs::xfs::error::{XfsError, XfsResult};
use crate::fs::xfs::inode::Inode;

struct Entry<'a> {
    name: &'a [u8],
    ino: u64,
    ftype: Option<u8>,
}

/// Parses the short-form header `{count, i8count, parent}` and every entry, yielding them in
/// on-disk (offset-tag) order. `has_ftype` comes from the volume's superblock
/// (`has_ftype_field`), since the short-form layout itself carries no flag for it.
fn parse(inode: &Inode, has_ftype: bool) -> XfsResult<(u64, Vec<Entry<'_>>)> {
    let buf = inode.data_fork_bytes();
    if buf.len() < 6 {
        return Err(XfsError::Corrupt);
    }

    let count = buf[0];
    let i8count = buf[1];

    let (parent, mut pos) = if i8count > 0 {
        if buf.len() < 10 {
            return Err(XfsError::Corrupt);
        }
        (read_be64(buf, 2), 10)
    } else {
        (u64::from(read_be32(buf, 2)), 6)
    };

    let ino_width = if i8count > 0 { 8 } else { 4 };

    let mut entries = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        if pos + 3 > buf.len() {
            return Err(XfsError::Corrupt);
        }
        let namelen = usize::from(buf[pos]);
        // offset_tag (u16_be) at pos+1..pos+3 is the on-disk directory-offset cookie; the core
        // does not expose raw cookies, so it is read only to advance past it.
        pos += 3;

        if pos + namelen > buf.len() {
            return Err(XfsError::Corrupt);
        }
        let name = &buf[pos..pos + namelen];
        pos += namelen;

        let ftype = if has_ftype {
            if pos >= buf.len() {
                return Err(XfsError::Corrupt);
            }
            let f = buf[pos];
            pos += 1;
            Some(f)
        } else {
            None
        };

        if pos + ino_width > buf.len() {
            return Err(XfsError::Corrupt);
        }
        let ino = if ino_width == 8 {
            read_be64(buf, pos)
        } else {
            u64::from(read_be32(buf, pos))
        };
        pos += ino_width;

        entries.push(Entry { name, ino, ftype });
    }

    Ok((parent, entries))
}

pub fn lookup_with_ftype(inode: &Inode, name: &[u8], has_ftype: bool) -> XfsResult<u64> {
    if name == b".." {
        let (parent, _) = parse(inode, has_ftype)?;
        return Ok(parent);
    }

    let (_, entries) = parse(inode, has_ftype)?;
    entries
        .iter()
        .find(|e| e.name == name)
        .map(|e| e.ino)
        .ok_or(XfsError::NotFound)
}

pub fn enumerate_with_ftype(inode: &Inode, has_ftype: bool) -> XfsResult<Vec<DirEntry>> {
    let (parent, entries) = parse(inode, has_ftype)?;

    let mut out = Vec::with_capacity(entries.len() + 2);
    out.push(DirEntry { name: b".".to_vec(), ino: inode.ino, ftype: None });
    out.push(DirEntry { name: b"..".to_vec(), ino: parent, ftype: None });

    for e in entries {
        out.push(DirEntry { name: e.name.to_vec(), ino: e.ino, ftype: e.ftype });
    }

    Ok(out)
}

/// Convenience wrappers threading the volume's `has_ftype_field` through; kept separate from the
/// `_with_ftype` variants so `dir::mod`'s dispatch table (which only has `&Volume` and `&Inode`)
/// stays uniform with the other four walkers.
pub fn lookup(volume: &crate::fs::xfs::volume::Volume, inode: &Inode, name: &[u8]) -> XfsResult<u64> {
    lookup_with_ftype(inode, name, volume.superblock().has_ftype_field)
}

pub fn enumerate(volume: &crate::fs::xfs::volume::Volume, inode: &Inode) -> XfsResult<Vec<DirEntry>> {
    enumerate_with_ftype(inode, volume.superblock().has_ftype_field)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::xfs::inode::ForkFormat;
    use alloc::vec;

    /// Builds a bare `Inode` whose data fork is exactly `fork_bytes`, with no attribute fork.
    fn make_inode(fork_bytes: Vec<u8>) -> Inode {
        let core_size = 96;
        let mut raw = vec![0u8; core_size];
        raw.extend_from_slice(&fork_bytes);

        Inode {
            ino: 64,
            mode: 0x41ff,
            version: 2,
            data_format: ForkFormat::Local,
            attr_format: ForkFormat::Local,
            nlink: 2,
            uid: 0,
            gid: 0,
            size: fork_bytes.len() as u64,
            block_count: 0,
            data_extent_count: 0,
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
    fn s3_short_form_enumerate_and_lookup() {
        let mut buf = vec![2u8, 0u8];
        buf.extend_from_slice(&128u32.to_be_bytes()); // parent = 128, i8count = 0

        buf.push(1); // namelen("a")
        buf.extend_from_slice(&0u16.to_be_bytes()); // offset tag, unused by the reader
        buf.push(b'a');
        buf.extend_from_slice(&200u32.to_be_bytes());

        buf.push(2); // namelen("bb")
        buf.extend_from_slice(&0u16.to_be_bytes());
        buf.extend_from_slice(b"bb");
        buf.extend_from_slice(&201u32.to_be_bytes());

        let inode = make_inode(buf);

        let entries = enumerate_with_ftype(&inode, false).expect("enumerate should succeed");
        let names: Vec<&[u8]> = entries.iter().map(|e| e.name.as_slice()).collect();
        assert_eq!(names, vec![b".".as_slice(), b"..", b"a", b"bb"]);
        let inos: Vec<u64> = entries.iter().map(|e| e.ino).collect();
        assert_eq!(inos, vec![64, 128, 200, 201]);

        assert_eq!(lookup_with_ftype(&inode, b"bb", false).unwrap(), 201);
        assert_eq!(lookup_with_ftype(&inode, b"..", false).unwrap(), 128);
        assert_eq!(lookup_with_ftype(&inode, b"zzz", false), Err(XfsError::NotFound));
    }
}
