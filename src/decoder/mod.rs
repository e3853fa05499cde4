use std::collections::HashSet;
use std::io::{self, Read};

use log::{debug, trace};

use crate::contents::{Contents, DeviationKind, FormatCompliance, Header};
use crate::directory::{Directory, ImageData};
use crate::dump;
use crate::error::{TiffError, TiffFormatError, TiffResult};
use crate::info::{self, ImageInfo};
use crate::raster::{DefaultRasterFactory, Raster, RasterFactory};
use crate::tags::{ByteOrder, Tag, Type};

use self::ifd::Field;
use self::stream::{EndianReader, SmartReader};

pub use self::image::decode_directory;
pub use self::source::{ByteSource, ReaderSource};

mod data_reader;
pub mod ifd;
mod image;
mod predictor;
mod source;
mod stream;

/// Decoding limits
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct Limits {
    /// The maximum size of any decoded raster in bytes, the default is 256MiB. The same bound
    /// applies to each decompressed strip or tile.
    pub decoding_buffer_size: usize,
    /// The maximum size of any ifd value in bytes, the default is
    /// 1MiB.
    pub ifd_value_size: usize,
    /// Maximum size of the compressed bytes read for a single strip or tile, the default is
    /// 128MiB.
    pub intermediate_buffer_size: usize,
}

impl Limits {
    /// A configuration that does not impose any limits.
    ///
    /// This is a good start if the caller only wants to impose selective limits, contrary to the
    /// default limits which allows selectively disabling limits.
    ///
    /// Note that this configuration is likely to crash on excessively large images since,
    /// naturally, the machine running the program does not have infinite memory.
    pub fn unlimited() -> Limits {
        Limits {
            decoding_buffer_size: usize::MAX,
            ifd_value_size: usize::MAX,
            intermediate_buffer_size: usize::MAX,
        }
    }
}

impl Default for Limits {
    fn default() -> Limits {
        Limits {
            decoding_buffer_size: 256 * 1024 * 1024,
            intermediate_buffer_size: 128 * 1024 * 1024,
            ifd_value_size: 1024 * 1024,
        }
    }
}

/// How a stream is resolved into [`Contents`].
#[derive(Clone, Debug, Default)]
pub struct ReadOptions {
    /// Fail on any format deviation instead of recording it.
    pub strict: bool,
    /// Also resolve the strip and tile regions of every directory.
    pub image_data: bool,
    pub limits: Limits,
}

impl ReadOptions {
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    pub fn with_image_data(mut self) -> Self {
        self.image_data = true;
        self
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }
}

/// Reads the header and the IFD chain of a TIFF stream.
///
/// Each call resolves the stream from scratch; nothing is cached between calls.
pub fn read_contents<S: ByteSource + ?Sized>(
    source: &S,
    options: &ReadOptions,
) -> TiffResult<Contents> {
    Resolver::new(source, options).resolve(false)
}

/// Parses the file header.
pub fn read_header<S: ByteSource + ?Sized>(source: &S) -> TiffResult<Header> {
    if source.size() < 8 {
        return Err(TiffFormatError::TiffSignatureNotFound.into());
    }

    let start = source.read_block(0, 4)?;
    let byte_order = match &start[..2] {
        b"II" => ByteOrder::LittleEndian,
        b"MM" => ByteOrder::BigEndian,
        _ => return Err(TiffFormatError::TiffSignatureNotFound.into()),
    };
    let version = SmartReader::wrap(&start[2..], byte_order).read_u16()?;

    match version {
        42 => {
            let rest = source.read_block(4, 4)?;
            let first_ifd = SmartReader::wrap(&rest[..], byte_order).read_u32()?;
            Ok(Header {
                byte_order,
                bigtiff: false,
                version,
                first_ifd: first_ifd.into(),
            })
        }
        43 => {
            if source.size() < 16 {
                return Err(TiffFormatError::InvalidBigTiffHeader.into());
            }
            let rest = source.read_block(4, 12)?;
            let mut reader = SmartReader::wrap(&rest[..], byte_order);
            // Bytesize of offsets (in bigtiff it's alway 8 but provide a way to move to 16 some day)
            let offset_size = reader.read_u16()?;
            // This constant should always be 0
            let reserved = reader.read_u16()?;
            if offset_size != 8 || reserved != 0 {
                return Err(TiffFormatError::InvalidBigTiffHeader.into());
            }
            Ok(Header {
                byte_order,
                bigtiff: true,
                version,
                first_ifd: reader.read_u64()?,
            })
        }
        _ => Err(TiffFormatError::TiffSignatureInvalid(version).into()),
    }
}

/// Walks the IFD chain of one stream, collecting deviations in lenient mode.
struct Resolver<'a, S: ?Sized> {
    source: &'a S,
    options: &'a ReadOptions,
    compliance: FormatCompliance,
}

impl<'a, S: ByteSource + ?Sized> Resolver<'a, S> {
    fn new(source: &'a S, options: &'a ReadOptions) -> Self {
        Resolver {
            source,
            options,
            compliance: FormatCompliance::default(),
        }
    }

    /// Records a deviation in lenient mode, fails with `error` in strict mode.
    fn deviate(
        &mut self,
        directory: Option<usize>,
        kind: DeviationKind,
        error: TiffFormatError,
    ) -> TiffResult<()> {
        if self.options.strict {
            Err(error.into())
        } else {
            self.compliance.record(directory, kind);
            Ok(())
        }
    }

    fn resolve(mut self, first_only: bool) -> TiffResult<Contents> {
        let header = read_header(self.source)?;
        debug!(
            "TIFF header: {:?}, version {}, first IFD at {:#x}",
            header.byte_order, header.version, header.first_ifd
        );

        if header.first_ifd == 0 {
            return Err(TiffFormatError::ImageFileDirectoryNotFound.into());
        }

        let mut directories: Vec<Directory> = Vec::new();
        let mut visited = HashSet::new();
        let mut next = Some(header.first_ifd);

        while let Some(offset) = next {
            let index = directories.len();
            let previous = index.checked_sub(1);

            if !visited.insert(offset) {
                self.deviate(
                    previous,
                    DeviationKind::DirectoryCycle { offset },
                    TiffFormatError::CycleInOffsets(offset),
                )?;
                break;
            }

            let directory = match self.read_directory(&header, offset, index) {
                Ok(directory) => directory,
                // Only the first directory is mandatory.
                Err(TiffError::FormatError(TiffFormatError::DirectoryOutOfBounds(_)))
                    if index > 0 && !self.options.strict =>
                {
                    self.compliance
                        .record(previous, DeviationKind::NextDirectoryOutOfBounds { offset });
                    break;
                }
                Err(err) => return Err(err),
            };

            debug!(
                "IFD {} at {:#x}: {} entries, next {:?}",
                index,
                offset,
                directory.len(),
                directory.next_ifd
            );
            next = directory.next_ifd;
            directories.push(directory);

            if first_only {
                break;
            }
        }

        Ok(Contents {
            header,
            directories,
            compliance: self.compliance,
        })
    }

    fn read_directory(&mut self, header: &Header, offset: u64, index: usize) -> TiffResult<Directory> {
        let count_size: u64 = if header.bigtiff { 8 } else { 2 };
        let pointer_size: u64 = if header.bigtiff { 8 } else { 4 };

        if !self.source.contains(offset, count_size) {
            return Err(TiffFormatError::DirectoryOutOfBounds(offset).into());
        }
        let raw_count = self.source.read_block(offset, count_size)?;
        let mut reader = SmartReader::wrap(&raw_count[..], header.byte_order);
        let num_entries = if header.bigtiff {
            reader.read_u64()?
        } else {
            reader.read_u16()?.into()
        };

        let table_len = num_entries
            .checked_mul(header.entry_size())
            .and_then(|len| len.checked_add(pointer_size))
            .ok_or(TiffFormatError::DirectoryOutOfBounds(offset))?;
        if !self.source.contains(offset + count_size, table_len) {
            return Err(TiffFormatError::DirectoryOutOfBounds(offset).into());
        }

        let table = self.source.read_block(offset + count_size, table_len)?;
        let mut reader = SmartReader::wrap(&table[..], header.byte_order);

        if num_entries == 0 {
            self.deviate(
                Some(index),
                DeviationKind::EmptyDirectory { offset },
                TiffFormatError::EmptyDirectory(offset),
            )?;
        }

        let mut entries = Vec::with_capacity(usize::try_from(num_entries)?);
        for _ in 0..num_entries {
            if let Some(field) = self.read_entry(header, &mut reader, index)? {
                entries.push(field);
            }
        }

        let next_ifd = if header.bigtiff {
            reader.read_u64()?
        } else {
            reader.read_u32()?.into()
        };

        let mut directory = Directory {
            index,
            offset,
            next_ifd: match next_ifd {
                0 => None,
                n => Some(n),
            },
            entries,
            image_data: None,
        };

        if self.options.image_data {
            directory.image_data = self.resolve_image_data(&directory)?;
        }

        Ok(directory)
    }

    /// Reads a IFD entry.
    // An IFD entry has four fields:
    //
    // Tag   2 bytes
    // Type  2 bytes
    // Count 4 bytes (8 in BigTIFF)
    // Value 4 bytes (8 in BigTIFF) either a pointer the value itself
    fn read_entry(
        &mut self,
        header: &Header,
        reader: &mut SmartReader<&[u8]>,
        index: usize,
    ) -> TiffResult<Option<Field>> {
        let tag = Tag::from_u16_exhaustive(reader.read_u16()?);
        let raw_type = reader.read_u16()?;
        let count = if header.bigtiff {
            reader.read_u64()?
        } else {
            reader.read_u32()?.into()
        };
        let mut value = vec![0; header.inline_threshold() as usize];
        reader.read_exact(&mut value)?;

        let field_type = match Type::from_u16(raw_type) {
            Some(t) => t,
            None => {
                // Unknown type. Readers must skip such entries (TIFF 6.0, section 2).
                self.deviate(
                    Some(index),
                    DeviationKind::UnknownFieldType {
                        tag,
                        field_type: raw_type,
                    },
                    TiffFormatError::UnknownFieldType {
                        tag,
                        field_type: raw_type,
                    },
                )?;
                return Ok(None);
            }
        };

        // A count too large to express in bytes can never lie within the stream.
        let length = field_type.value_bytes(count).unwrap_or(u64::MAX);
        trace!(
            "tag {} ({}): {} x {:?}",
            tag.to_u16(),
            tag.name(),
            count,
            field_type
        );

        if length <= header.inline_threshold() {
            value.truncate(length as usize);
            return Field::new(tag, field_type, count, header.byte_order, value).map(Some);
        }

        let mut pointer = SmartReader::wrap(&value[..], header.byte_order);
        let offset = if header.bigtiff {
            pointer.read_u64()?
        } else {
            pointer.read_u32()?.into()
        };

        if !self.source.contains(offset, length) {
            self.deviate(
                Some(index),
                DeviationKind::ValueOutOfBounds {
                    tag,
                    offset,
                    length,
                },
                TiffFormatError::ValueOutOfBounds {
                    tag,
                    offset,
                    length,
                },
            )?;
            return Ok(Some(Field::empty(tag, field_type, header.byte_order)));
        }

        if length > self.options.limits.ifd_value_size as u64 {
            return Err(TiffError::LimitsExceeded);
        }

        Field::unresolved(tag, field_type, count, header.byte_order, offset)?
            .materialize(self.source)
            .map(Some)
    }

    /// Determines the strip or tile regions of a directory and checks them against the stream.
    fn resolve_image_data(&mut self, directory: &Directory) -> TiffResult<Option<ImageData>> {
        let mut data = match directory.image_data_layout() {
            Ok(Some(data)) => data,
            Ok(None) => return Ok(None),
            Err(TiffError::FormatError(TiffFormatError::InconsistentStripData {
                offsets,
                byte_counts,
            })) => {
                self.deviate(
                    Some(directory.index),
                    DeviationKind::InconsistentStripData {
                        offsets,
                        byte_counts,
                    },
                    TiffFormatError::InconsistentStripData {
                        offsets,
                        byte_counts,
                    },
                )?;
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        let size = self.source.size();
        for element in data.elements_mut().iter_mut() {
            if self.source.contains(element.offset, element.length) {
                continue;
            }
            self.deviate(
                Some(directory.index),
                DeviationKind::ImageDataOutOfBounds {
                    offset: element.offset,
                    length: element.length,
                },
                TiffFormatError::ImageDataOutOfBounds {
                    offset: element.offset,
                    length: element.length,
                },
            )?;
            element.offset = element.offset.min(size);
            element.length = size - element.offset;
        }

        debug!(
            "IFD {}: {} image data regions",
            directory.index,
            data.elements().len()
        );
        Ok(Some(data))
    }
}

/// The representation of a TIFF decoder
///
/// Every query resolves the stream again, so a decoder can be shared between threads as long as
/// its byte source can.
#[derive(Debug)]
pub struct Decoder<S> {
    source: S,
    options: ReadOptions,
}

impl<S: ByteSource> Decoder<S> {
    /// Create a new decoder that decodes from the byte source ```source```
    pub fn new(source: S) -> Decoder<S> {
        Decoder {
            source,
            options: ReadOptions::default(),
        }
    }

    /// Fail on any format deviation instead of tolerating it.
    pub fn strict(mut self, strict: bool) -> Decoder<S> {
        self.options.strict = strict;
        self
    }

    pub fn with_limits(mut self, limits: Limits) -> Decoder<S> {
        self.options.limits = limits;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn into_inner(self) -> S {
        self.source
    }

    fn options(&self, image_data: bool) -> ReadOptions {
        ReadOptions {
            image_data,
            ..self.options.clone()
        }
    }

    /// Parses the file header.
    pub fn read_header(&self) -> TiffResult<Header> {
        read_header(&self.source)
    }

    /// Resolves only the first directory.
    pub fn read_first_directory(&self, image_data: bool) -> TiffResult<Contents> {
        let options = self.options(image_data);
        Resolver::new(&self.source, &options).resolve(true)
    }

    /// Resolves every directory of the chain.
    pub fn read_directories(&self, image_data: bool) -> TiffResult<Contents> {
        let options = self.options(image_data);
        Resolver::new(&self.source, &options).resolve(false)
    }

    /// Resolves every directory of the chain without image data regions.
    pub fn read_contents(&self) -> TiffResult<Contents> {
        self.read_directories(false)
    }

    /// Width and height of the first image.
    pub fn image_size(&self) -> TiffResult<(u32, u32)> {
        let contents = self.read_first_directory(false)?;
        let directory = contents.first_directory()?;
        let width = directory.find(Tag::ImageWidth, false)?;
        let height = directory.find(Tag::ImageLength, false)?;
        match (width, height) {
            (Some(width), Some(height)) => Ok((
                u32::try_from(width.scalar_int()?)?,
                u32::try_from(height.scalar_int()?)?,
            )),
            _ => Err(TiffFormatError::MissingSizeInfo.into()),
        }
    }

    /// Summary of the first image.
    pub fn image_info(&self) -> TiffResult<ImageInfo> {
        info::image_info(&self.read_contents()?)
    }

    /// The embedded ICC profile of the first image, if any.
    pub fn icc_profile(&self) -> TiffResult<Option<Vec<u8>>> {
        info::icc_profile_bytes(&self.read_first_directory(false)?)
    }

    /// The XMP packet of the first image, if any.
    pub fn xmp_xml(&self) -> TiffResult<Option<String>> {
        info::xmp_xml(&self.read_first_directory(false)?)
    }

    /// Resolves the stream leniently and reports every deviation it tolerated.
    pub fn format_compliance(&self) -> TiffResult<FormatCompliance> {
        let options = ReadOptions {
            strict: false,
            ..self.options(true)
        };
        Ok(Resolver::new(&self.source, &options)
            .resolve(false)?
            .compliance)
    }

    /// The still-compressed bytes of every strip and tile, directory by directory.
    pub fn collect_raw_image_data(&self) -> TiffResult<Vec<Vec<u8>>> {
        let contents = self.read_directories(true)?;
        let mut chunks = Vec::new();
        for directory in &contents.directories {
            for element in directory.raw_image_data_elements()? {
                chunks.push(read_chunk(
                    &self.source,
                    element.offset,
                    element.length,
                    &self.options.limits,
                )?);
            }
        }
        Ok(chunks)
    }

    /// Decodes one directory into an RGB(A) raster.
    pub fn decode_directory(&self, directory: &Directory) -> TiffResult<Raster> {
        let factory = DefaultRasterFactory::new(self.options.limits.clone());
        decode_directory(&self.source, directory, &factory, &self.options.limits)
    }

    /// Decodes one directory, allocating the raster through `factory`.
    pub fn decode_directory_with(
        &self,
        directory: &Directory,
        factory: &dyn RasterFactory,
    ) -> TiffResult<Raster> {
        decode_directory(&self.source, directory, factory, &self.options.limits)
    }

    /// Decodes the primary image.
    pub fn decode_first_image(&self) -> TiffResult<Raster> {
        let contents = self.read_first_directory(true)?;
        self.decode_directory(contents.first_directory()?)
    }

    /// Decodes every image of the chain in order.
    pub fn decode_all_images(&self) -> TiffResult<Vec<Raster>> {
        let contents = self.read_directories(true)?;
        contents
            .directories
            .iter()
            .map(|directory| self.decode_directory(directory))
            .collect()
    }

    /// A textual listing of the whole stream. Never fails; problems are written into the text.
    pub fn dump(&self) -> String {
        match self.read_directories(true) {
            Ok(contents) => dump::dump(&contents),
            Err(err) => format!("<unreadable: {}>\n", err),
        }
    }
}

/// Reads one strip or tile, bounded by [`Limits::intermediate_buffer_size`].
pub(crate) fn read_chunk<S: ByteSource + ?Sized>(
    source: &S,
    offset: u64,
    length: u64,
    limits: &Limits,
) -> TiffResult<Vec<u8>> {
    if length > limits.intermediate_buffer_size as u64 {
        return Err(TiffError::LimitsExceeded);
    }
    if !source.contains(offset, length) {
        return Err(TiffFormatError::ImageDataOutOfBounds { offset, length }.into());
    }
    source.read_block(offset, length).map_err(|err| match err.kind() {
        io::ErrorKind::UnexpectedEof => {
            TiffError::FormatError(TiffFormatError::ImageDataOutOfBounds { offset, length })
        }
        _ => TiffError::IoError(err),
    })
}
