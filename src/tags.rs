macro_rules! tags {
    {
        // Permit arbitrary meta items, which include documentation.
        $( #[$enum_attr:meta] )*
        $vis:vis enum $name:ident($ty:tt) $(unknown(#[$unknown_meta:meta] $unknown_doc:ident))* {
            // Each of the `Name = Val,` permitting documentation.
            $($(#[$ident_attr:meta])* $tag:ident = $val:expr,)*
        }
    } => {
        $( #[$enum_attr] )*
        #[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
        #[non_exhaustive]
        #[repr($ty)]
        pub enum $name {
            $($(#[$ident_attr])* $tag = $val,)*
            $(
                #[$unknown_meta]
                Unknown($ty),
            )*
        }

        impl $name {
            #[inline(always)]
            const fn __from_inner_type(n: $ty) -> Result<Self, $ty> {
                match n {
                    $( $val => Ok($name::$tag), )*
                    n => Err(n),
                }
            }

            #[inline(always)]
            const fn __to_inner_type(&self) -> $ty {
                match *self {
                    $( $name::$tag => $val, )*
                    $( $name::Unknown($unknown_doc) => { $unknown_doc }, )*
                }
            }

            /// The symbolic name of this value, `"Unknown"` for unassigned codes.
            #[allow(unreachable_patterns)]
            pub const fn name(&self) -> &'static str {
                match *self {
                    $( $name::$tag => stringify!($tag), )*
                    _ => "Unknown",
                }
            }
        }

        tags!($name, $ty, $($unknown_doc)*);
    };
    // For u16 tags, provide direct inherent primitive conversion methods.
    ($name:tt, u16, $($unknown_doc:ident)*) => {
        impl $name {
            #[inline(always)]
            pub const fn from_u16(val: u16) -> Option<Self> {
                match Self::__from_inner_type(val) {
                    Ok(v) => Some(v),
                    Err(_) => None,
                }
            }

            $(
            #[inline(always)]
            pub const fn from_u16_exhaustive($unknown_doc: u16) -> Self {
                match Self::__from_inner_type($unknown_doc) {
                    Ok(v) => v,
                    Err(_) => $name::Unknown($unknown_doc),
                }
            }
            )*

            #[inline(always)]
            pub const fn to_u16(&self) -> u16 {
                Self::__to_inner_type(self)
            }
        }
    };
}

// Note: These tags appear in the order they are mentioned in the TIFF reference
tags! {
/// TIFF tags
pub enum Tag(u16) unknown(
    /// A private or extension tag
    unknown
) {
    // Baseline tags:
    Artist = 315,
    // grayscale images PhotometricInterpretation 1 or 3
    BitsPerSample = 258,
    CellLength = 265,
    CellWidth = 264,
    // palette-color images (PhotometricInterpretation 3)
    ColorMap = 320,
    Compression = 259,
    DateTime = 306,
    ExtraSamples = 338,
    FillOrder = 266,
    FreeByteCounts = 289,
    FreeOffsets = 288,
    GrayResponseCurve = 291,
    GrayResponseUnit = 290,
    HostComputer = 316,
    ImageDescription = 270,
    ImageLength = 257,
    ImageWidth = 256,
    Make = 271,
    MaxSampleValue = 281,
    MinSampleValue = 280,
    Model = 272,
    NewSubfileType = 254,
    Orientation = 274,
    PhotometricInterpretation = 262,
    PlanarConfiguration = 284,
    ResolutionUnit = 296,
    RowsPerStrip = 278,
    SamplesPerPixel = 277,
    Software = 305,
    StripByteCounts = 279,
    StripOffsets = 273,
    SubfileType = 255,
    Threshholding = 263,
    XResolution = 282,
    YResolution = 283,
    // Extension tags
    DocumentName = 269,
    PageName = 285,
    PageNumber = 297,
    T4Options = 292,
    T6Options = 293,
    Predictor = 317,
    TileWidth = 322,
    TileLength = 323,
    TileOffsets = 324,
    TileByteCounts = 325,
    SubIfd = 330,
    // Data Sample Format
    SampleFormat = 339,
    SMinSampleValue = 340,
    SMaxSampleValue = 341,
    // JPEG
    JPEGTables = 347,
    // YCbCr
    YCbCrCoefficients = 529,
    YCbCrSubSampling = 530,
    YCbCrPositioning = 531,
    ReferenceBlackWhite = 532,
    // <https://www.adobe.com/products/xmp.html>
    Xmp = 700,
    // <https://web.archive.org/web/20131111073619/http://www.exif.org/Exif2-1.PDF>
    Copyright = 33_432,
    ExifDirectory = 0x8769,
    GpsDirectory = 0x8825,
    // <https://www.color.org/technotes/ICC-Technote-ProfileEmbedding.pdf>
    IccProfile = 34675,
}
}

tags! {
/// The type of an IFD entry (a 2 byte field).
pub enum Type(u16) {
    /// 8-bit unsigned integer
    BYTE = 1,
    /// 8-bit byte that contains a 7-bit ASCII code; the last byte must be zero
    ASCII = 2,
    /// 16-bit unsigned integer
    SHORT = 3,
    /// 32-bit unsigned integer
    LONG = 4,
    /// Fraction stored as two 32-bit unsigned integers
    RATIONAL = 5,
    /// 8-bit signed integer
    SBYTE = 6,
    /// 8-bit byte that may contain anything, depending on the field
    UNDEFINED = 7,
    /// 16-bit signed integer
    SSHORT = 8,
    /// 32-bit signed integer
    SLONG = 9,
    /// Fraction stored as two 32-bit signed integers
    SRATIONAL = 10,
    /// 32-bit IEEE floating point
    FLOAT = 11,
    /// 64-bit IEEE floating point
    DOUBLE = 12,
    /// 32-bit unsigned integer (offset)
    IFD = 13,
    /// BigTIFF 64-bit unsigned integer
    LONG8 = 16,
    /// BigTIFF 64-bit signed integer
    SLONG8 = 17,
    /// BigTIFF 64-bit unsigned integer (offset)
    IFD8 = 18,
}
}

impl Type {
    pub(crate) fn byte_len(&self) -> u8 {
        match *self {
            Type::BYTE | Type::SBYTE | Type::ASCII | Type::UNDEFINED => 1,
            Type::SHORT | Type::SSHORT => 2,
            Type::LONG | Type::SLONG | Type::FLOAT | Type::IFD => 4,
            Type::LONG8
            | Type::SLONG8
            | Type::DOUBLE
            | Type::RATIONAL
            | Type::SRATIONAL
            | Type::IFD8 => 8,
        }
    }

    /// Total byte length of `count` values of this type.
    pub(crate) fn value_bytes(&self, count: u64) -> Result<u64, crate::error::TiffError> {
        let tag_size = u64::from(self.byte_len());

        match count.checked_mul(tag_size) {
            Some(n) => Ok(n),
            None => Err(crate::error::TiffError::LimitsExceeded),
        }
    }
}

tags! {
/// See [TIFF compression tags](https://www.awaresystems.be/imaging/tiff/tifftags/compression.html)
/// for reference.
pub enum CompressionMethod(u16) unknown(
    /// A custom compression method
    unknown
) {
    None = 1,
    Huffman = 2,
    Fax3 = 3,
    Fax4 = 4,
    LZW = 5,
    JPEG = 6,
    // "Extended JPEG" or "new JPEG" style
    ModernJPEG = 7,
    Deflate = 8,
    Next = 0x8003,
    OldDeflate = 0x80B2,
    PackBits = 0x8005,

    // Self-assigned by libtiff
    ZSTD = 0xC350,
}
}

tags! {
pub enum PhotometricInterpretation(u16) {
    WhiteIsZero = 0,
    BlackIsZero = 1,
    RGB = 2,
    RGBPalette = 3,
    TransparencyMask = 4,
    CMYK = 5,
    YCbCr = 6,
    CIELab = 8,
    IccLab = 9,
    ItuLab = 10,
    /// SGI LogL, a single log-encoded luminance sample
    LogL = 32844,
    /// SGI LogLuv, log-encoded luminance plus chroma
    LogLuv = 32845,
}
}

tags! {
pub enum PlanarConfiguration(u16) {
    Chunky = 1,
    Planar = 2,
}
}

tags! {
pub enum Predictor(u16) {
    /// No changes were made to the data
    None = 1,
    /// The images' rows were processed to contain the difference of each pixel from the previous one.
    ///
    /// This means that instead of having in order `[r1, g1. b1, r2, g2 ...]` you will find
    /// `[r1, g1, b1, r2-r1, g2-g1, b2-b1, r3-r2, g3-g2, ...]`
    Horizontal = 2,
    /// Not currently supported
    FloatingPoint = 3,
}
}

tags! {
/// Type to represent resolution units
pub enum ResolutionUnit(u16) {
    None = 1,
    Inch = 2,
    Centimeter = 3,
}
}

tags! {
pub enum ExtraSamples(u16) {
    /// There is no specified association between the sample and the image.
    Unspecified = 0,
    /// The sample is associated alpha, i.e. pre-multiplied color.
    AssociatedAlpha = 1,
    /// The sample is unassociated alpha such as a mask. There might be more than one such sample.
    UnassociatedAlpha = 2,
}
}

tags! {
/// Bit order of compressed data within a byte.
pub enum FillOrder(u16) {
    /// Most significant bit first
    MsbFirst = 1,
    /// Least significant bit first
    LsbFirst = 2,
}
}

/// Byte order of the TIFF file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ByteOrder {
    /// little endian byte order
    LittleEndian,
    /// big endian byte order
    BigEndian,
}
