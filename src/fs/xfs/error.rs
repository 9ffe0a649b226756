//! Error taxonomy for the XFS reader.
//!
//! Mirrors the variants every on-disk check in this module can fail with. Kept as a single flat
//! sum rather than per-component error types, since every walker (directory, attribute, B+Tree)
//! ultimately bottoms out in the same handful of failure modes.

use crate::errors::{BaseError, MountError};

/// Errors produced while mounting or querying an XFS volume.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum XfsError {
    /// The block device returned an error, or a short read.
    IoError,

    /// The superblock failed one of its sanity checks.
    BadSuperblock,

    /// An incompatible feature bit is set that this reader does not understand.
    UnsupportedVersion,

    /// An on-disk invariant was violated: bad magic, CRC mismatch, wrong block number or
    /// owner/uuid, an `UNWRITTEN` directory extent, a missing B+Tree path, an out-of-range
    /// entry count, a negative slot index.
    Corrupt,

    /// A directory or attribute lookup exhausted every candidate without a match.
    NotFound,

    /// The operation reached an inode format this reader does not decode (e.g. `UUID`, or
    /// `read_file` against a device-special inode).
    NotSupported,

    /// A caller-supplied name exceeds the maximum name length.
    NameTooLong,

    /// A caller-supplied buffer is too small to hold the result.
    BufferTooSmall,

    /// A caller-supplied argument is out of range (e.g. a negative offset).
    BadArgument,
}

impl BaseError for XfsError {}

impl From<XfsError> for MountError {
    fn from(value: XfsError) -> Self {
        match value {
            XfsError::IoError => MountError::IOError,
            XfsError::BadSuperblock => MountError::BadSuperblock,
            XfsError::UnsupportedVersion => MountError::UnsupportedVersion,
            XfsError::Corrupt
            | XfsError::NotFound
            | XfsError::NotSupported
            | XfsError::NameTooLong
            | XfsError::BufferTooSmall
            | XfsError::BadArgument => MountError::Corrupt,
        }
    }
}

pub(crate) type XfsResult<T> = Result<T, XfsError>;
