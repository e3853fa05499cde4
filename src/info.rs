//! Metadata derived from the first directory of a stream.

use std::fmt;

use crate::contents::Contents;
use crate::decoder::ifd::Field;
use crate::directory::Directory;
use crate::error::{TiffFormatError, TiffResult};
use crate::tags::{ExtraSamples, Tag};

/// Human readable name of the format.
pub const FORMAT_NAME: &str = "TIFF Tag-based Image File Format";
/// MIME type of the format.
pub const MIME_TYPE: &str = "image/tiff";

/// The compression algorithms reported in [`ImageInfo`].
///
/// Codes without a name here are reported as [`CompressionAlgorithm::Unknown`], which is not an
/// error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompressionAlgorithm {
    None,
    CcittOneD,
    CcittGroup3,
    CcittGroup4,
    Lzw,
    Jpeg,
    Unknown,
}

impl CompressionAlgorithm {
    /// Maps a `Compression` tag value to its reported name.
    ///
    /// Codes 32771 and 32773 are reported as uncompressed variants.
    pub fn from_code(code: i64) -> CompressionAlgorithm {
        match code {
            1 | 32771 | 32773 => CompressionAlgorithm::None,
            2 => CompressionAlgorithm::CcittOneD,
            3 => CompressionAlgorithm::CcittGroup3,
            4 => CompressionAlgorithm::CcittGroup4,
            5 => CompressionAlgorithm::Lzw,
            6 | 7 => CompressionAlgorithm::Jpeg,
            _ => CompressionAlgorithm::Unknown,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CompressionAlgorithm::None => "none",
            CompressionAlgorithm::CcittOneD => "CCITT 1D",
            CompressionAlgorithm::CcittGroup3 => "CCITT Group 3",
            CompressionAlgorithm::CcittGroup4 => "CCITT Group 4",
            CompressionAlgorithm::Lzw => "LZW",
            CompressionAlgorithm::Jpeg => "JPEG",
            CompressionAlgorithm::Unknown => "unknown",
        }
    }
}

impl fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Summary of the primary image of a stream.
///
/// Computed on request from the resolved fields; it holds no reference to the source.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageInfo {
    /// Format version, `"Tiff v.42"` or `"Tiff v.43"`.
    pub format_details: String,
    /// Sum of the `BitsPerSample` values, 1 when the tag is absent.
    ///
    /// For palette images this is the index depth, not the depth of the displayed colour.
    pub bits_per_pixel: u32,
    /// One rendered line per field of the first directory, in file order.
    pub comments: Vec<String>,
    pub format_name: &'static str,
    pub mime_type: &'static str,
    pub number_of_images: usize,
    pub width: u32,
    pub height: u32,
    pub physical_width_dpi: Option<u32>,
    pub physical_height_dpi: Option<u32>,
    pub physical_width_inch: Option<f32>,
    pub physical_height_inch: Option<f32>,
    pub is_progressive: bool,
    pub is_transparent: bool,
    pub uses_palette: bool,
    pub compression_algorithm: CompressionAlgorithm,
}

/// The factor converting a `ResolutionUnit` into inches, `None` when there is no absolute unit.
pub fn units_per_inch(resolution_unit: i64) -> Option<f64> {
    match resolution_unit {
        2 => Some(1.0),
        // Historically labelled "meter" and scaled as such, although TIFF defines centimeters.
        3 => Some(0.0254),
        _ => None,
    }
}

/// Dots per inch and physical extent in inches for one axis.
fn physical(pixels: u32, resolution: f64, units_per_inch: f64) -> (Option<u32>, Option<f32>) {
    let dpi = resolution / units_per_inch;
    let inches = f64::from(pixels) / (resolution * units_per_inch);
    (
        dpi.is_finite().then(|| dpi as u32),
        inches.is_finite().then(|| inches as f32),
    )
}

/// A field that carries at least one value. Lenient resolution keeps dangling fields with no
/// values, which count as absent here.
fn present(directory: &Directory, tag: Tag) -> TiffResult<Option<&Field>> {
    Ok(directory.find(tag, false)?.filter(|field| field.count() > 0))
}

/// Derives the [`ImageInfo`] of the first directory.
pub fn image_info(contents: &Contents) -> TiffResult<ImageInfo> {
    let directory = contents.first_directory()?;

    let (width, height) = match (
        directory.find(Tag::ImageWidth, false)?,
        directory.find(Tag::ImageLength, false)?,
    ) {
        (Some(width), Some(height)) => (
            u32::try_from(width.scalar_int()?)?,
            u32::try_from(height.scalar_int()?)?,
        ),
        _ => return Err(TiffFormatError::MissingSizeInfo.into()),
    };

    let resolution_unit = present(directory, Tag::ResolutionUnit)?
        .map(Field::scalar_int)
        .transpose()?
        .unwrap_or(2);
    let mut info = ImageInfo {
        format_details: contents.format_version(),
        bits_per_pixel: 1,
        comments: directory.entries().iter().map(ToString::to_string).collect(),
        format_name: FORMAT_NAME,
        mime_type: MIME_TYPE,
        number_of_images: contents.directories.len(),
        width,
        height,
        physical_width_dpi: None,
        physical_height_dpi: None,
        physical_width_inch: None,
        physical_height_inch: None,
        is_progressive: false,
        is_transparent: false,
        uses_palette: directory.contains(Tag::ColorMap),
        compression_algorithm: CompressionAlgorithm::from_code(
            directory.find_int(Tag::Compression)?.unwrap_or(1),
        ),
    };

    if let Some(units_per_inch) = units_per_inch(resolution_unit) {
        if let Some(x_resolution) = present(directory, Tag::XResolution)? {
            (info.physical_width_dpi, info.physical_width_inch) =
                physical(width, x_resolution.scalar_double()?, units_per_inch);
        }
        if let Some(y_resolution) = present(directory, Tag::YResolution)? {
            (info.physical_height_dpi, info.physical_height_inch) =
                physical(height, y_resolution.scalar_double()?, units_per_inch);
        }
    }

    if let Some(bits) = present(directory, Tag::BitsPerSample)? {
        info.bits_per_pixel = u32::try_from(bits.int_or_array_sum()?)?;
    }

    if let Some(extra) = directory.find(Tag::ExtraSamples, false)? {
        info.is_transparent = extra.int_array()?.iter().any(|&code| {
            code == i64::from(ExtraSamples::AssociatedAlpha.to_u16())
                || code == i64::from(ExtraSamples::UnassociatedAlpha.to_u16())
        });
    }

    Ok(info)
}

/// The embedded ICC profile of the first directory.
pub fn icc_profile_bytes(contents: &Contents) -> TiffResult<Option<Vec<u8>>> {
    contents
        .first_directory()?
        .find(Tag::IccProfile, false)?
        .map(|field| field.byte_array())
        .transpose()
}

/// The XMP packet of the first directory, which must be UTF-8.
pub fn xmp_xml(contents: &Contents) -> TiffResult<Option<String>> {
    let bytes = match contents.first_directory()?.find(Tag::Xmp, false)? {
        Some(field) => field.byte_array()?,
        None => return Ok(None),
    };
    String::from_utf8(bytes)
        .map(Some)
        .map_err(|err| TiffFormatError::InvalidXmpEncoding(err).into())
}
