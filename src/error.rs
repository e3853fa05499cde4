use std::error::Error;
use std::fmt;
use std::io;
use std::num::TryFromIntError;
use std::string::FromUtf8Error;

use crate::tags::{CompressionMethod, Tag, Type};

/// Tiff error kinds.
#[derive(Debug)]
pub enum TiffError {
    /// The Image is not formatted properly.
    FormatError(TiffFormatError),

    /// The Decoder does not support features required by the image.
    UnsupportedError(TiffUnsupportedError),

    /// An I/O Error occurred while decoding the image.
    IoError(io::Error),

    /// The Limits of the Decoder is exceeded.
    LimitsExceeded,

    /// An integer conversion to or from a platform size failed, either due to
    /// limits of the platform size or limits of the format.
    IntSizeError,
}

/// The image is not formatted properly.
///
/// This indicates that the encoder producing the image might behave incorrectly or that the input
/// file has been corrupted.
#[derive(Debug)]
#[non_exhaustive]
pub enum TiffFormatError {
    TiffSignatureNotFound,
    TiffSignatureInvalid(u16),
    InvalidBigTiffHeader,
    ImageFileDirectoryNotFound,
    DirectoryOutOfBounds(u64),
    CycleInOffsets(u64),
    EmptyDirectory(u64),
    UnknownFieldType {
        tag: Tag,
        field_type: u16,
    },
    ValueOutOfBounds {
        tag: Tag,
        offset: u64,
        length: u64,
    },
    UnresolvedValue(Tag),
    TypeMismatch {
        tag: Tag,
        field_type: Type,
        count: u64,
        expected: &'static str,
    },
    RequiredTagNotFound(Tag),
    MissingSizeInfo,
    InconsistentStripData {
        offsets: usize,
        byte_counts: usize,
    },
    ImageDataOutOfBounds {
        offset: u64,
        length: u64,
    },
    NoImageData,
    MissingImageChunks {
        expected: u64,
        found: usize,
    },
    InvalidDimensions(u32, u32),
    SampleCountMismatch {
        samples_per_pixel: u32,
        bits_per_sample: usize,
    },
    ColorMapSizeMismatch {
        actual: usize,
        expected: u64,
    },
    UnknownPredictor(u16),
    CompressedDataCorrupt(String),
    InvalidXmpEncoding(FromUtf8Error),
}

impl fmt::Display for TiffFormatError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        use self::TiffFormatError::*;
        match *self {
            TiffSignatureNotFound => write!(fmt, "TIFF signature not found."),
            TiffSignatureInvalid(version) => {
                write!(fmt, "TIFF signature invalid, unknown version {}.", version)
            }
            InvalidBigTiffHeader => write!(fmt, "BigTIFF header has an invalid offset size."),
            ImageFileDirectoryNotFound => write!(fmt, "Image file directory not found."),
            DirectoryOutOfBounds(offset) => {
                write!(fmt, "Image file directory at {:#x} lies outside the file.", offset)
            }
            CycleInOffsets(offset) => {
                write!(fmt, "File contained a cycle in the list of IFDs at {:#x}.", offset)
            }
            EmptyDirectory(offset) => {
                write!(fmt, "Image file directory at {:#x} has no entries.", offset)
            }
            UnknownFieldType { tag, field_type } => write!(
                fmt,
                "Tag {} uses unknown field type {}.",
                tag.to_u16(),
                field_type
            ),
            ValueOutOfBounds {
                tag,
                offset,
                length,
            } => write!(
                fmt,
                "Value of tag {} ({} bytes at {:#x}) lies outside the file.",
                tag.to_u16(),
                length,
                offset
            ),
            UnresolvedValue(tag) => {
                write!(fmt, "Value of tag {} has not been read yet.", tag.to_u16())
            }
            TypeMismatch {
                tag,
                field_type,
                count,
                expected,
            } => write!(
                fmt,
                "Tag {} holds {} value(s) of type {:?}, expected {}.",
                tag.to_u16(),
                count,
                field_type,
                expected
            ),
            RequiredTagNotFound(tag) => write!(fmt, "Required tag `{:?}` not found.", tag),
            MissingSizeInfo => write!(fmt, "TIFF image missing size info."),
            InconsistentStripData {
                offsets,
                byte_counts,
            } => write!(
                fmt,
                "Image data has {} offsets but {} byte counts.",
                offsets, byte_counts
            ),
            ImageDataOutOfBounds { offset, length } => write!(
                fmt,
                "Image data region of {} bytes at {:#x} lies outside the file.",
                length, offset
            ),
            NoImageData => write!(fmt, "TIFF does not contain an image."),
            MissingImageChunks { expected, found } => write!(
                fmt,
                "Image needs {} strips or tiles but only {} are present.",
                expected, found
            ),
            InvalidDimensions(width, height) => {
                write!(fmt, "Invalid strip or tile dimensions {}x{}.", width, height)
            }
            SampleCountMismatch {
                samples_per_pixel,
                bits_per_sample,
            } => write!(
                fmt,
                "SamplesPerPixel ({}) does not match BitsPerSample length ({}).",
                samples_per_pixel, bits_per_sample
            ),
            ColorMapSizeMismatch { actual, expected } => write!(
                fmt,
                "ColorMap has {} entries, expected {}.",
                actual, expected
            ),
            UnknownPredictor(predictor) => {
                write!(fmt, "Unknown predictor “{}” encountered", predictor)
            }
            CompressedDataCorrupt(ref message) => {
                write!(fmt, "Compressed data is corrupt: {}", message)
            }
            InvalidXmpEncoding(ref err) => write!(fmt, "Invalid XMP packet: {}", err),
        }
    }
}

/// The Decoder does not support features required by the image.
///
/// This only captures known failures for which the standard either does not require support or an
/// implementation has been planned but not yet completed.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TiffUnsupportedError {
    UnsupportedInterpretation(u16),
    UnsupportedCompressionMethod(CompressionMethod),
    UnsupportedPlanarConfig(u16),
    UnsupportedBitsPerSample(u32),
    FloatingPointPredictor,
    ChromaSubsampling(u16, u16),
    Group3TwoDimensional,
}

impl fmt::Display for TiffUnsupportedError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        use self::TiffUnsupportedError::*;
        match *self {
            UnsupportedInterpretation(code) => {
                write!(fmt, "Unsupported photometric interpretation {}.", code)
            }
            UnsupportedCompressionMethod(method) => {
                write!(fmt, "Compression method {:?} is unsupported", method)
            }
            UnsupportedPlanarConfig(config) => {
                write!(fmt, "Unsupported planar configuration “{}”.", config)
            }
            UnsupportedBitsPerSample(bits) => {
                write!(fmt, "{} bits per sample is unsupported", bits)
            }
            FloatingPointPredictor => write!(fmt, "Floating point predictor is unsupported."),
            ChromaSubsampling(h, v) => write!(
                fmt,
                "Chroma subsampling {}x{} is only supported for JPEG data.",
                h, v
            ),
            Group3TwoDimensional => {
                write!(fmt, "Two-dimensional CCITT Group 3 coding is unsupported.")
            }
        }
    }
}

impl fmt::Display for TiffError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            TiffError::FormatError(ref e) => write!(fmt, "Format error: {}", e),
            TiffError::UnsupportedError(ref f) => write!(
                fmt,
                "The Decoder does not support the \
                 image format `{}`",
                f
            ),
            TiffError::IoError(ref e) => e.fmt(fmt),
            TiffError::LimitsExceeded => write!(fmt, "The Decoder limits are exceeded"),
            TiffError::IntSizeError => write!(fmt, "Platform or format size limits exceeded"),
        }
    }
}

impl Error for TiffError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match *self {
            TiffError::IoError(ref e) => Some(e),
            TiffError::FormatError(TiffFormatError::InvalidXmpEncoding(ref e)) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for TiffError {
    fn from(err: io::Error) -> TiffError {
        TiffError::IoError(err)
    }
}

impl From<TiffFormatError> for TiffError {
    fn from(err: TiffFormatError) -> TiffError {
        TiffError::FormatError(err)
    }
}

impl From<TiffUnsupportedError> for TiffError {
    fn from(err: TiffUnsupportedError) -> TiffError {
        TiffError::UnsupportedError(err)
    }
}

impl From<TryFromIntError> for TiffError {
    fn from(_err: TryFromIntError) -> TiffError {
        TiffError::IntSizeError
    }
}

/// Result of an image decoding/encoding process
pub type TiffResult<T> = Result<T, TiffError>;
