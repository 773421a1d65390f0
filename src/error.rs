use std::io;

use thiserror::Error;

use crate::model::ElementKind;

/// Closed set of archive failure categories surfaced to callers instead of
/// raw library error values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArchiveErrorKind {
    Open,
    NotAnArchive,
    Read,
    Write,
    Checksum,
    MissingEntry,
    EntryExists,
    TempFile,
    Unknown,
}

impl ArchiveErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ArchiveErrorKind::Open => "open failure",
            ArchiveErrorKind::NotAnArchive => "not an archive",
            ArchiveErrorKind::Read => "read error",
            ArchiveErrorKind::Write => "write error",
            ArchiveErrorKind::Checksum => "checksum error",
            ArchiveErrorKind::MissingEntry => "missing entry",
            ArchiveErrorKind::EntryExists => "entry exists",
            ArchiveErrorKind::TempFile => "temp file failure",
            ArchiveErrorKind::Unknown => "unknown archive error",
        }
    }
}

#[derive(Debug, Error)]
pub enum SdtError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unsupported element kind: {0:?}")]
    UnsupportedKind(ElementKind),

    #[error("element not found in {part}: {detail}")]
    ElementNotFound { part: String, detail: String },

    #[error("tag not found: {0}")]
    TagNotFound(String),

    #[error("malformed XML in {part}: {detail}")]
    MalformedXml { part: String, detail: String },

    #[error("orphaned node in {part}: target has no parent")]
    OrphanedNode { part: String },

    #[error("serialization failed for {part}: {detail}")]
    Serialize { part: String, detail: String },

    #[error("archive error ({}): {detail}", kind.as_str())]
    Archive {
        kind: ArchiveErrorKind,
        detail: String,
    },

    #[error("content-control id space exhausted")]
    IdSpaceExhausted,

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, SdtError>;

/// Collapse a zip library error into one of the fixed archive categories.
/// `writing` selects the Read/Write bucket for plain io failures.
pub fn map_zip_error(err: zip::result::ZipError, writing: bool) -> SdtError {
    use zip::result::ZipError;

    let detail = err.to_string();
    let kind = match &err {
        ZipError::Io(io_err) => {
            if detail.to_ascii_lowercase().contains("crc")
                || detail.to_ascii_lowercase().contains("checksum")
            {
                ArchiveErrorKind::Checksum
            } else if io_err.kind() == io::ErrorKind::NotFound {
                ArchiveErrorKind::Open
            } else if writing {
                ArchiveErrorKind::Write
            } else {
                ArchiveErrorKind::Read
            }
        }
        ZipError::InvalidArchive(_) => ArchiveErrorKind::NotAnArchive,
        ZipError::UnsupportedArchive(_) => ArchiveErrorKind::NotAnArchive,
        ZipError::FileNotFound => ArchiveErrorKind::MissingEntry,
        _ => ArchiveErrorKind::Unknown,
    };
    SdtError::Archive { kind, detail }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zip_error_maps_to_closed_categories() {
        let e = map_zip_error(zip::result::ZipError::FileNotFound, false);
        match e {
            SdtError::Archive { kind, .. } => assert_eq!(kind, ArchiveErrorKind::MissingEntry),
            other => panic!("unexpected: {other:?}"),
        }

        let e = map_zip_error(
            zip::result::ZipError::InvalidArchive("bad magic".into()),
            false,
        );
        match e {
            SdtError::Archive { kind, .. } => assert_eq!(kind, ArchiveErrorKind::NotAnArchive),
            other => panic!("unexpected: {other:?}"),
        }

        let io_err = io::Error::new(io::ErrorKind::UnexpectedEof, "truncated");
        let e = map_zip_error(zip::result::ZipError::Io(io_err), true);
        match e {
            SdtError::Archive { kind, .. } => assert_eq!(kind, ArchiveErrorKind::Write),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
