//! Compression-aware sample decoding of strips and tiles.

use std::io::{self, Read};

use log::{trace, warn};

use crate::decoder::predictor::rev_hpredict_nsamp;
use crate::decoder::stream::{BitReader, PackBitsReader};
use crate::decoder::{read_chunk, ByteSource, Limits};
use crate::directory::{Directory, ImageData, ImageDataElement};
use crate::error::{TiffError, TiffFormatError, TiffResult, TiffUnsupportedError};
use crate::photometric::PhotometricInterpreter;
use crate::raster::Raster;
use crate::tags::{ByteOrder, CompressionMethod, FillOrder, Predictor, Tag};

/// The decompression applied to each strip or tile.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Decompressor {
    None,
    PackBits,
    #[cfg(feature = "lzw")]
    Lzw,
    #[cfg(feature = "deflate")]
    Deflate,
    #[cfg(feature = "zstd")]
    Zstd,
    /// One-dimensional Group 3, the `black` bit value is given by the photometric interpretation.
    #[cfg(feature = "fax")]
    Group3 { black: bool },
    #[cfg(feature = "fax")]
    Group4 { black: bool },
    #[cfg(feature = "jpeg")]
    Jpeg {
        tables: Option<Vec<u8>>,
        colorspace: zune_core::colorspace::ColorSpace,
    },
}

impl Decompressor {
    /// Chooses the decompressor for a `Compression` tag value.
    #[cfg_attr(not(all(feature = "fax", feature = "jpeg")), allow(unused_variables))]
    pub(crate) fn select(
        directory: &Directory,
        compression: i64,
        photometric: u16,
    ) -> TiffResult<Decompressor> {
        let method = u16::try_from(compression)
            .map(CompressionMethod::from_u16_exhaustive)
            .unwrap_or(CompressionMethod::Unknown(u16::MAX));
        // Fax data encodes colours; WhiteIsZero stores black as one bits.
        #[cfg(feature = "fax")]
        let black = photometric == 0;

        let decompressor = match method {
            CompressionMethod::None => Decompressor::None,
            CompressionMethod::PackBits => Decompressor::PackBits,
            #[cfg(feature = "lzw")]
            CompressionMethod::LZW => Decompressor::Lzw,
            #[cfg(feature = "deflate")]
            CompressionMethod::Deflate | CompressionMethod::OldDeflate => Decompressor::Deflate,
            #[cfg(feature = "zstd")]
            CompressionMethod::ZSTD => Decompressor::Zstd,
            #[cfg(feature = "fax")]
            CompressionMethod::Fax3 => {
                let options = directory.find_int(Tag::T4Options)?.unwrap_or(0);
                if options & 1 != 0 {
                    return Err(TiffUnsupportedError::Group3TwoDimensional.into());
                }
                Decompressor::Group3 { black }
            }
            #[cfg(feature = "fax")]
            CompressionMethod::Fax4 => Decompressor::Group4 { black },
            #[cfg(feature = "jpeg")]
            CompressionMethod::JPEG | CompressionMethod::ModernJPEG => {
                use zune_core::colorspace::ColorSpace;
                let colorspace = match photometric {
                    0 | 1 => ColorSpace::Luma,
                    2 => ColorSpace::RGB,
                    5 => ColorSpace::CMYK,
                    6 => ColorSpace::YCbCr,
                    other => {
                        return Err(TiffUnsupportedError::UnsupportedInterpretation(other).into())
                    }
                };
                let tables = directory
                    .find(Tag::JPEGTables, false)?
                    .map(|field| field.byte_array())
                    .transpose()?;
                Decompressor::Jpeg { tables, colorspace }
            }
            method => return Err(TiffUnsupportedError::UnsupportedCompressionMethod(method).into()),
        };

        Ok(decompressor)
    }

    /// `true` when the codec delivers chroma at full resolution.
    pub(crate) fn upsamples_chroma(&self) -> bool {
        match self {
            #[cfg(feature = "jpeg")]
            Decompressor::Jpeg { .. } => true,
            _ => false,
        }
    }

    /// Decompresses one chunk into at most `expected` bytes of packed rows.
    #[cfg_attr(not(feature = "fax"), allow(unused_variables))]
    fn decompress(
        &self,
        data: &[u8],
        chunk_width: u32,
        chunk_height: u32,
        expected: usize,
    ) -> TiffResult<Vec<u8>> {
        let mut buffer = vec![0; expected];
        match self {
            Decompressor::None => {
                let len = data.len().min(expected);
                buffer[..len].copy_from_slice(&data[..len]);
            }
            Decompressor::PackBits => {
                fill_from(PackBitsReader::new(data, data.len() as u64), &mut buffer)?;
            }
            #[cfg(feature = "lzw")]
            Decompressor::Lzw => {
                fill_from(crate::decoder::stream::LZWReader::new(data), &mut buffer)?;
            }
            #[cfg(feature = "deflate")]
            Decompressor::Deflate => {
                fill_from(flate2::read::ZlibDecoder::new(data), &mut buffer)?;
            }
            #[cfg(feature = "zstd")]
            Decompressor::Zstd => {
                let decoder = zstd::stream::read::Decoder::new(data).map_err(corrupt)?;
                fill_from(decoder, &mut buffer)?;
            }
            #[cfg(feature = "fax")]
            Decompressor::Group3 { black } => {
                decode_fax(data, chunk_width, chunk_height, *black, false, &mut buffer)?;
            }
            #[cfg(feature = "fax")]
            Decompressor::Group4 { black } => {
                decode_fax(data, chunk_width, chunk_height, *black, true, &mut buffer)?;
            }
            #[cfg(feature = "jpeg")]
            Decompressor::Jpeg { tables, colorspace } => {
                let decoded = decode_jpeg(data, tables.as_deref(), *colorspace)?;
                let len = decoded.len().min(expected);
                buffer[..len].copy_from_slice(&decoded[..len]);
            }
        }
        Ok(buffer)
    }
}

fn corrupt(err: impl std::fmt::Display) -> TiffError {
    TiffFormatError::CompressedDataCorrupt(err.to_string()).into()
}

/// Reads until `buffer` is full or the stream ends. A stream ending early leaves zeros behind.
fn fill_from(mut reader: impl Read, buffer: &mut [u8]) -> TiffResult<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                warn!("compressed chunk ended early: {}", err);
                break;
            }
            Err(err) => return Err(corrupt(err)),
        }
    }
    Ok(filled)
}

#[cfg(feature = "fax")]
fn decode_fax(
    data: &[u8],
    width: u32,
    height: u32,
    black: bool,
    group4: bool,
    buffer: &mut [u8],
) -> TiffResult<()> {
    use fax34::{decoder, Color};

    let width = u16::try_from(width)?;
    let row_bytes = usize::from(width).div_ceil(8);
    let mut row = 0usize;

    let mut write_line = |transitions: &[u16]| {
        if row >= height as usize {
            return;
        }
        let line = match buffer.get_mut(row * row_bytes..(row + 1) * row_bytes) {
            Some(line) => line,
            None => return,
        };
        for (i, color) in decoder::pels(transitions, width).enumerate() {
            let set = match color {
                Color::Black => black,
                Color::White => !black,
            };
            if set {
                line[i / 8] |= 0x80 >> (i % 8);
            }
        }
        row += 1;
    };

    let input = data.iter().copied();
    let result = if group4 {
        decoder::decode_g4(input, width, None, &mut write_line)
    } else {
        decoder::decode_g3(input, &mut write_line)
    };

    match result {
        Some(()) => Ok(()),
        None if row > 0 => {
            warn!("CCITT data ended abnormally after {} rows", row);
            Ok(())
        }
        None => Err(corrupt("invalid CCITT data")),
    }
}

#[cfg(feature = "jpeg")]
fn decode_jpeg(
    data: &[u8],
    tables: Option<&[u8]>,
    colorspace: zune_core::colorspace::ColorSpace,
) -> TiffResult<Vec<u8>> {
    use zune_core::bytestream::ZCursor;
    use zune_core::options::DecoderOptions;
    use zune_jpeg::JpegDecoder;

    // The shared tables end with EOI and every chunk starts with SOI; both are dropped
    // so that the tables can be prepended to the chunk.
    let merged;
    let stream = match tables {
        Some(tables) if tables.len() >= 2 => {
            if data.len() < 2 {
                return Err(corrupt("JPEG chunk is too short"));
            }
            merged = [&tables[..tables.len() - 2], &data[2..]].concat();
            &merged[..]
        }
        _ => data,
    };

    let options = DecoderOptions::default().jpeg_set_out_colorspace(colorspace);
    let mut decoder = JpegDecoder::new_with_options(ZCursor::new(stream), options);
    decoder.decode().map_err(|err| corrupt(format!("{:?}", err)))
}

/// Reverses the bits of every byte, for `FillOrder` 2.
fn reverse_bits(data: &mut [u8]) {
    for byte in data {
        *byte = byte.reverse_bits();
    }
}

/// Converts a sample read most significant byte first into the value in file byte order.
fn sample_value(raw: u32, bits: u32, byte_order: ByteOrder) -> u32 {
    match byte_order {
        ByteOrder::LittleEndian if bits > 8 && bits % 8 == 0 => raw.swap_bytes() >> (32 - bits),
        _ => raw,
    }
}

/// Number of bytes in one packed row of `width` pixels, rows padded to whole bytes.
fn row_bytes(width: u32, bits_per_pixel: u32) -> Option<usize> {
    let bits = u64::from(width).checked_mul(u64::from(bits_per_pixel))?;
    usize::try_from(bits.div_ceil(8)).ok()
}

/// Fails unless there is at least one strip or tile for every part of the image.
fn check_chunk_count(expected: u64, found: usize) -> TiffResult<()> {
    if (found as u64) < expected {
        return Err(TiffFormatError::MissingImageChunks { expected, found }.into());
    }
    Ok(())
}

/// Decodes the strips or tiles of one directory and hands every pixel to the interpreter.
pub(crate) struct DataReader<'a, S: ?Sized> {
    pub source: &'a S,
    pub decompressor: Decompressor,
    pub interpreter: &'a PhotometricInterpreter,
    pub byte_order: ByteOrder,
    pub fill_order: FillOrder,
    pub predictor: Predictor,
    pub limits: &'a Limits,
}

impl<S: ByteSource + ?Sized> DataReader<'_, S> {
    pub(crate) fn decode(&self, data: &ImageData, raster: &mut Raster) -> TiffResult<()> {
        let layout = self.interpreter.layout();
        let (width, height) = (layout.width, layout.height);

        match data {
            ImageData::Strips {
                elements,
                rows_per_strip,
            } => {
                let rows_per_strip = (*rows_per_strip).max(1);
                let expected = u64::from(height).div_ceil(u64::from(rows_per_strip));
                check_chunk_count(expected, elements.len())?;
                for (i, element) in elements.iter().enumerate() {
                    let y = match u32::try_from(i)
                        .ok()
                        .and_then(|i| i.checked_mul(rows_per_strip))
                    {
                        Some(y) if y < height => y,
                        _ => break,
                    };
                    let rows = rows_per_strip.min(height - y);
                    self.decode_chunk(element, 0, y, width, rows, raster)?;
                }
            }
            ImageData::Tiles {
                elements,
                tile_width,
                tile_length,
            } => {
                if *tile_width == 0 || *tile_length == 0 {
                    return Err(
                        TiffFormatError::InvalidDimensions(*tile_width, *tile_length).into(),
                    );
                }
                let tiles_across = width.div_ceil(*tile_width).max(1) as usize;
                let tiles_down = u64::from(height.div_ceil(*tile_length));
                check_chunk_count(tiles_across as u64 * tiles_down, elements.len())?;
                for (i, element) in elements.iter().enumerate() {
                    let x = (i % tiles_across) as u64 * u64::from(*tile_width);
                    let y = (i / tiles_across) as u64 * u64::from(*tile_length);
                    if y >= u64::from(height) {
                        break;
                    }
                    self.decode_chunk(
                        element,
                        x as u32,
                        y as u32,
                        *tile_width,
                        *tile_length,
                        raster,
                    )?;
                }
            }
        }
        Ok(())
    }

    fn decode_chunk(
        &self,
        element: &ImageDataElement,
        x0: u32,
        y0: u32,
        chunk_width: u32,
        chunk_height: u32,
        raster: &mut Raster,
    ) -> TiffResult<()> {
        let layout = self.interpreter.layout();
        let bits_per_pixel: u32 = layout.bits_per_sample.iter().sum();
        let row_len = row_bytes(chunk_width, bits_per_pixel).ok_or(TiffError::LimitsExceeded)?;
        let expected = row_len
            .checked_mul(chunk_height as usize)
            .ok_or(TiffError::LimitsExceeded)?;
        if expected > self.limits.decoding_buffer_size {
            return Err(TiffError::LimitsExceeded);
        }

        trace!(
            "chunk at {:#x} ({} bytes): {}x{} at ({}, {})",
            element.offset,
            element.length,
            chunk_width,
            chunk_height,
            x0,
            y0
        );

        let mut compressed = read_chunk(self.source, element.offset, element.length, self.limits)?;
        if self.fill_order == FillOrder::LsbFirst {
            reverse_bits(&mut compressed);
        }
        let decoded =
            self.decompressor
                .decompress(&compressed, chunk_width, chunk_height, expected)?;

        let spp = layout.bits_per_sample.len();
        let row_samples = (chunk_width as usize)
            .checked_mul(spp)
            .filter(|&n| n.saturating_mul(4) <= self.limits.decoding_buffer_size)
            .ok_or(TiffError::LimitsExceeded)?;
        let mut samples = vec![0u32; row_samples];
        for (row, line) in decoded.chunks_exact(row_len.max(1)).enumerate() {
            let y = match y0.checked_add(row as u32) {
                Some(y) if y < layout.height && (row as u32) < chunk_height => y,
                _ => break,
            };

            let mut reader = BitReader::new(line);
            for (i, sample) in samples.iter_mut().enumerate() {
                let bits = layout.bits_per_sample[i % spp];
                *sample = sample_value(reader.read_bits(bits), bits, self.byte_order);
            }
            if self.predictor == Predictor::Horizontal {
                rev_hpredict_nsamp(&mut samples, &layout.bits_per_sample);
            }

            for (col, pixel) in samples.chunks_exact(spp).enumerate() {
                let x = match x0.checked_add(col as u32) {
                    Some(x) if x < layout.width => x,
                    _ => break,
                };
                self.interpreter.convert_and_write(pixel, x, y, raster);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn little_endian_samples_are_swapped() {
        assert_eq!(sample_value(0x3412, 16, ByteOrder::LittleEndian), 0x1234);
        assert_eq!(sample_value(0x3412, 16, ByteOrder::BigEndian), 0x3412);
        assert_eq!(
            sample_value(0x7856_3412, 32, ByteOrder::LittleEndian),
            0x1234_5678
        );
        assert_eq!(sample_value(0xab, 8, ByteOrder::LittleEndian), 0xab);
        assert_eq!(sample_value(0xabc, 12, ByteOrder::LittleEndian), 0xabc);
    }

    #[test]
    fn short_chunk_lists_are_rejected() {
        assert!(check_chunk_count(4, 4).is_ok());
        assert!(check_chunk_count(1, 2).is_ok());
        assert!(matches!(
            check_chunk_count(4, 1),
            Err(TiffError::FormatError(TiffFormatError::MissingImageChunks {
                expected: 4,
                found: 1
            }))
        ));
    }

    #[test]
    fn rows_are_padded_to_bytes() {
        assert_eq!(row_bytes(9, 1), Some(2));
        assert_eq!(row_bytes(3, 24), Some(9));
        assert_eq!(row_bytes(5, 4), Some(3));
    }

    #[test]
    fn fill_order_reversal() {
        let mut data = [0b1000_0000, 0b0000_0011];
        reverse_bits(&mut data);
        assert_eq!(data, [0b0000_0001, 0b1100_0000]);
    }

    #[test]
    fn short_packbits_is_zero_filled() {
        // One literal byte, then the stream ends.
        let out = Decompressor::PackBits.decompress(&[0x00, 0x2a], 4, 1, 4).unwrap();
        assert_eq!(out, vec![0x2a, 0, 0, 0]);
    }

    #[test]
    fn uncompressed_is_truncated_to_chunk() {
        let out = Decompressor::None.decompress(&[1, 2, 3, 4, 5], 2, 1, 2).unwrap();
        assert_eq!(out, vec![1, 2]);
    }

    #[cfg(feature = "deflate")]
    #[test]
    fn deflate_chunk() {
        use std::io::Write;

        let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&[7; 64]).unwrap();
        let compressed = encoder.finish().unwrap();

        let out = Decompressor::Deflate.decompress(&compressed, 8, 8, 64).unwrap();
        assert_eq!(out, vec![7; 64]);
    }

    #[cfg(feature = "deflate")]
    #[test]
    fn corrupt_deflate_fails() {
        match Decompressor::Deflate.decompress(&[0xff; 16], 4, 4, 16) {
            Err(TiffError::FormatError(TiffFormatError::CompressedDataCorrupt(_))) => {}
            other => panic!("unexpected {:?}", other),
        }
    }
}
