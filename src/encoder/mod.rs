//! A minimal TIFF writer for decoded rasters.
//!
//! Writes a single little endian directory holding one uncompressed strip of 8-bit RGB or RGBA
//! samples.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::io::Write;

use log::debug;

use crate::error::TiffResult;
use crate::raster::Raster;
use crate::tags::{
    CompressionMethod, ExtraSamples, PhotometricInterpretation, PlanarConfiguration,
    ResolutionUnit, Tag, Type,
};

mod writer;

pub use self::writer::TiffWriter;

/// Type to represent tiff values of type `RATIONAL`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rational {
    pub n: u32,
    pub d: u32,
}

/// Trait for types that can be encoded in a tiff file
pub trait TiffValue {
    const BYTE_LEN: u8;
    const FIELD_TYPE: Type;
    fn count(&self) -> usize;

    /// The little endian encoding of this value.
    fn data(&self) -> Cow<'_, [u8]>;
}

impl TiffValue for [u16] {
    const BYTE_LEN: u8 = 2;
    const FIELD_TYPE: Type = Type::SHORT;

    fn count(&self) -> usize {
        self.len()
    }

    fn data(&self) -> Cow<'_, [u8]> {
        Cow::Owned(self.iter().flat_map(|v| v.to_le_bytes()).collect())
    }
}

impl TiffValue for [u32] {
    const BYTE_LEN: u8 = 4;
    const FIELD_TYPE: Type = Type::LONG;

    fn count(&self) -> usize {
        self.len()
    }

    fn data(&self) -> Cow<'_, [u8]> {
        Cow::Owned(self.iter().flat_map(|v| v.to_le_bytes()).collect())
    }
}

impl TiffValue for Rational {
    const BYTE_LEN: u8 = 8;
    const FIELD_TYPE: Type = Type::RATIONAL;

    fn count(&self) -> usize {
        1
    }

    fn data(&self) -> Cow<'_, [u8]> {
        let mut bytes = self.n.to_le_bytes().to_vec();
        bytes.extend_from_slice(&self.d.to_le_bytes());
        Cow::Owned(bytes)
    }
}

impl TiffValue for str {
    const BYTE_LEN: u8 = 1;
    const FIELD_TYPE: Type = Type::ASCII;

    fn count(&self) -> usize {
        self.len() + 1
    }

    fn data(&self) -> Cow<'_, [u8]> {
        let mut bytes = self.as_bytes().to_vec();
        bytes.push(0);
        Cow::Owned(bytes)
    }
}

/// Optional tags written alongside the image.
#[derive(Clone, Debug, Default)]
pub struct EncodeOptions {
    /// Horizontal and vertical resolution with their unit.
    pub resolution: Option<(Rational, Rational, ResolutionUnit)>,
    pub software: Option<String>,
}

struct BufferedEntry {
    type_: Type,
    count: u32,
    data: Vec<u8>,
}

#[derive(Default)]
struct ImageFileDirectory {
    entries: BTreeMap<u16, BufferedEntry>,
}

impl ImageFileDirectory {
    fn write_tag<V: TiffValue + ?Sized>(&mut self, tag: Tag, value: &V) -> TiffResult<()> {
        self.entries.insert(
            tag.to_u16(),
            BufferedEntry {
                type_: V::FIELD_TYPE,
                count: u32::try_from(value.count())?,
                data: value.data().into_owned(),
            },
        );
        Ok(())
    }

    /// Bytes needed for the values that do not fit into their entry.
    fn overflow_len(&self) -> u64 {
        self.entries
            .values()
            .filter(|entry| entry.data.len() > 4)
            .map(|entry| (entry.data.len() as u64).next_multiple_of(4))
            .sum()
    }
}

/// Writes `raster` as an uncompressed TIFF.
pub fn encode<W: Write>(raster: &Raster, writer: W, options: &EncodeOptions) -> TiffResult<()> {
    let channels = raster.channels();
    let image = raster.as_bytes();
    let image_len = u32::try_from(image.len())?;
    const IMAGE_OFFSET: u32 = 8;

    let mut ifd = ImageFileDirectory::default();
    ifd.write_tag(Tag::ImageWidth, &[raster.width()][..])?;
    ifd.write_tag(Tag::ImageLength, &[raster.height()][..])?;
    ifd.write_tag(Tag::BitsPerSample, &vec![8u16; channels][..])?;
    ifd.write_tag(Tag::Compression, &[CompressionMethod::None.to_u16()][..])?;
    ifd.write_tag(
        Tag::PhotometricInterpretation,
        &[PhotometricInterpretation::RGB.to_u16()][..],
    )?;
    ifd.write_tag(Tag::StripOffsets, &[IMAGE_OFFSET][..])?;
    ifd.write_tag(Tag::SamplesPerPixel, &[channels as u16][..])?;
    ifd.write_tag(Tag::RowsPerStrip, &[raster.height()][..])?;
    ifd.write_tag(Tag::StripByteCounts, &[image_len][..])?;
    ifd.write_tag(
        Tag::PlanarConfiguration,
        &[PlanarConfiguration::Chunky.to_u16()][..],
    )?;
    if raster.has_alpha() {
        ifd.write_tag(
            Tag::ExtraSamples,
            &[ExtraSamples::UnassociatedAlpha.to_u16()][..],
        )?;
    }
    if let Some((x, y, unit)) = &options.resolution {
        ifd.write_tag(Tag::XResolution, x)?;
        ifd.write_tag(Tag::YResolution, y)?;
        ifd.write_tag(Tag::ResolutionUnit, &[unit.to_u16()][..])?;
    }
    if let Some(software) = &options.software {
        ifd.write_tag(Tag::Software, software.as_str())?;
    }

    let values_offset = (u64::from(IMAGE_OFFSET) + u64::from(image_len)).next_multiple_of(4);
    let ifd_offset = u32::try_from(values_offset + ifd.overflow_len())?;

    let mut writer = TiffWriter::new(writer);
    writer.write_header(ifd_offset)?;
    writer.write_bytes(image)?;
    writer.pad_word_boundary()?;

    // Values too large for their entry go first, the entries then point at them.
    let mut value_offsets = BTreeMap::new();
    for (tag, entry) in &ifd.entries {
        if entry.data.len() > 4 {
            value_offsets.insert(*tag, u32::try_from(writer.offset())?);
            writer.write_bytes(&entry.data)?;
            writer.pad_word_boundary()?;
        }
    }

    writer.write_u16(u16::try_from(ifd.entries.len())?)?;
    for (tag, entry) in &ifd.entries {
        writer.write_u16(*tag)?;
        writer.write_u16(entry.type_.to_u16())?;
        writer.write_u32(entry.count)?;
        match value_offsets.get(tag) {
            Some(offset) => writer.write_u32(*offset)?,
            None => {
                let mut inline = [0u8; 4];
                inline[..entry.data.len()].copy_from_slice(&entry.data);
                writer.write_bytes(&inline)?;
            }
        }
    }
    writer.write_u32(0)?;
    writer.flush()?;

    debug!(
        "encoded {}x{} image, {} entries, IFD at {:#x}",
        raster.width(),
        raster.height(),
        ifd.entries.len(),
        ifd_offset
    );
    Ok(())
}
