//! The resolved structure of a TIFF stream.

use std::fmt;

use crate::decoder::ifd::Field;
use crate::directory::Directory;
use crate::error::{TiffError, TiffFormatError, TiffResult};
use crate::tags::{ByteOrder, Tag};

/// The file header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub byte_order: ByteOrder,
    /// `true` for BigTIFF (version 43) files.
    pub bigtiff: bool,
    /// The format version marker, 42 or 43.
    pub version: u16,
    /// Offset of the first image file directory.
    pub first_ifd: u64,
}

impl Header {
    /// Size in bytes of a value that still fits into a directory entry.
    pub fn inline_threshold(&self) -> u64 {
        if self.bigtiff {
            8
        } else {
            4
        }
    }

    /// Size in bytes of one directory entry.
    pub fn entry_size(&self) -> u64 {
        if self.bigtiff {
            20
        } else {
            12
        }
    }
}

/// The kinds of non-fatal problems tolerated by lenient resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum DeviationKind {
    /// An entry used an unknown field type and was skipped.
    UnknownFieldType { tag: Tag, field_type: u16 },
    /// An oversize value pointed outside the stream; the field was kept without values.
    ValueOutOfBounds { tag: Tag, offset: u64, length: u64 },
    /// A directory had no entries.
    EmptyDirectory { offset: u64 },
    /// The next-directory pointer lies outside the stream; the chain ends here.
    NextDirectoryOutOfBounds { offset: u64 },
    /// The next-directory pointer revisits an earlier directory; the chain ends here.
    DirectoryCycle { offset: u64 },
    /// A strip or tile extends past the end of the stream and was clamped.
    ImageDataOutOfBounds { offset: u64, length: u64 },
    /// Offsets and byte counts differ in length; the directory keeps no image data.
    InconsistentStripData { offsets: usize, byte_counts: usize },
}

impl fmt::Display for DeviationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use self::DeviationKind::*;
        match *self {
            UnknownFieldType { tag, field_type } => write!(
                f,
                "tag {} has unknown field type {}, entry skipped",
                tag.to_u16(),
                field_type
            ),
            ValueOutOfBounds {
                tag,
                offset,
                length,
            } => write!(
                f,
                "value of tag {} ({} bytes at {:#x}) is out of bounds, treated as empty",
                tag.to_u16(),
                length,
                offset
            ),
            EmptyDirectory { offset } => write!(f, "directory at {:#x} has no entries", offset),
            NextDirectoryOutOfBounds { offset } => write!(
                f,
                "next directory offset {:#x} is out of bounds, chain truncated",
                offset
            ),
            DirectoryCycle { offset } => write!(
                f,
                "next directory offset {:#x} was already visited, chain truncated",
                offset
            ),
            ImageDataOutOfBounds { offset, length } => write!(
                f,
                "image data of {} bytes at {:#x} exceeds the stream, clamped",
                length, offset
            ),
            InconsistentStripData {
                offsets,
                byte_counts,
            } => write!(
                f,
                "{} image data offsets but {} byte counts, image data dropped",
                offsets, byte_counts
            ),
        }
    }
}

/// One recorded deviation, attributed to a directory where possible.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Deviation {
    /// Index of the directory in the chain.
    pub directory: Option<usize>,
    pub kind: DeviationKind,
}

impl fmt::Display for Deviation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.directory {
            Some(index) => write!(f, "directory {}: {}", index, self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// Deviations from the TIFF format tolerated while resolving a stream.
///
/// Strict resolution fails instead of recording, so its report is always empty.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FormatCompliance {
    deviations: Vec<Deviation>,
}

impl FormatCompliance {
    pub(crate) fn record(&mut self, directory: Option<usize>, kind: DeviationKind) {
        log::warn!("format deviation: {}", kind);
        self.deviations.push(Deviation { directory, kind });
    }

    pub fn deviations(&self) -> &[Deviation] {
        &self.deviations
    }

    /// `true` if no deviation was recorded.
    pub fn is_compliant(&self) -> bool {
        self.deviations.is_empty()
    }
}

/// A header together with the directories of its IFD chain.
#[derive(Clone, Debug)]
pub struct Contents {
    pub header: Header,
    pub directories: Vec<Directory>,
    pub compliance: FormatCompliance,
}

impl Contents {
    /// The first directory of the chain.
    pub fn first_directory(&self) -> TiffResult<&Directory> {
        self.directories
            .first()
            .ok_or(TiffError::FormatError(TiffFormatError::ImageFileDirectoryNotFound))
    }

    /// Searches every directory in chain order and returns the first field with the tag.
    pub fn find_field(&self, tag: Tag) -> Option<&Field> {
        self.directories
            .iter()
            .flat_map(|dir| dir.find_all(tag))
            .next()
    }

    /// Format version string as reported in image info.
    pub fn format_version(&self) -> String {
        format!("Tiff v.{}", self.header.version)
    }
}
