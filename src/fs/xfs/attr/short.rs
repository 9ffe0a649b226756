//! Short-form attribute: header `{totsize, count, pad}` then inline `{namelen, valuelen, flags,
//! name, value}` entries in the inode's attribute fork.

use alloc::vec::Vec;

use crate::fs::xfs::attr::{AttrEntry, AttrNamespace, ATTR_INCOMPLETE};
use crate::fs::xfs::error::{XfsError, XfsResult};
use crate::fs::xfs::inode::Inode;

struct RawEntry<'a> {
    name: &'a [u8],
    value: &'a [u8],
    flags: u8,
}

fn parse(inode: &Inode) -> XfsResult<Vec<RawEntry<'_>>> {
    let buf = inode.attr_fork_bytes().ok_or(XfsError::NotFound)?;
    if buf.len() < 4 {
        return Err(XfsError::Corrupt);
    }

    let count = buf[2];
    let mut pos = 4usize;
    let mut out = Vec::with_capacity(usize::from(count));

    for _ in 0..count {
        if pos + 3 > buf.len() {
            return Err(XfsError::Corrupt);
        }
        let namelen = usize::from(buf[pos]);
        let valuelen = usize::from(buf[pos + 1]);
        let flags = buf[pos + 2];
        pos += 3;

        if pos + namelen + valuelen > buf.len() {
            return Err(XfsError::Corrupt);
        }
        let name = &buf[pos..pos + namelen];
        pos += namelen;
        let value = &buf[pos..pos + valuelen];
        pos += valuelen;

        out.push(RawEntry { name, value, flags });
    }

    Ok(out)
}

pub fn lookup(inode: &Inode, name: &[u8]) -> XfsResult<AttrEntry> {
    parse(inode)?
        .into_iter()
        .find(|e| e.name == name)
        .map(|e| AttrEntry {
            namespace: AttrNamespace::from_flags(e.flags),
            name: e.name.to_vec(),
            value: e.value.to_vec(),
            incomplete: e.flags & ATTR_INCOMPLETE != 0,
        })
        .ok_or(XfsError::NotFound)
}

pub fn enumerate(inode: &Inode) -> XfsResult<Vec<AttrEntry>> {
    Ok(parse(inode)?
        .into_iter()
        .map(|e| AttrEntry {
            namespace: AttrNamespace::from_flags(e.flags),
            name: e.name.to_vec(),
            value: e.value.to_vec(),
            incomplete: e.flags & ATTR_INCOMPLETE != 0,
        })
        .collect())
}
