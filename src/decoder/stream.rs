//! All IO functionality needed for TIFF decoding

use std::io::{self, Read, Take};

pub use crate::tags::ByteOrder;

macro_rules! read_fn {
    ($name:ident, $type:ty) => {
        /// reads an $type
        #[inline(always)]
        fn $name(&mut self) -> Result<$type, io::Error> {
            let mut n = [0u8; std::mem::size_of::<$type>()];
            self.read_exact(&mut n)?;
            Ok(match self.byte_order() {
                ByteOrder::LittleEndian => <$type>::from_le_bytes(n),
                ByteOrder::BigEndian => <$type>::from_be_bytes(n),
            })
        }
    };
}

/// Reader that is aware of the byte order.
pub trait EndianReader: Read {
    /// Byte order that should be adhered to
    fn byte_order(&self) -> ByteOrder;

    read_fn!(read_u16, u16);
    read_fn!(read_i8, i8);
    read_fn!(read_i16, i16);
    read_fn!(read_u32, u32);
    read_fn!(read_i32, i32);
    read_fn!(read_u64, u64);
    read_fn!(read_i64, i64);
    read_fn!(read_f32, f32);
    read_fn!(read_f64, f64);

    /// Reads a single byte, which has no byte order.
    #[inline(always)]
    fn read_u8(&mut self) -> Result<u8, io::Error> {
        let mut n = [0u8; 1];
        self.read_exact(&mut n)?;
        Ok(n[0])
    }
}

///
/// # READERS
///

///
/// ## LZW Reader
///

/// Reader that decompresses LZW streams
#[cfg(feature = "lzw")]
pub struct LZWReader<'a> {
    input: &'a [u8],
    decoder: weezl::decode::Decoder,
}

#[cfg(feature = "lzw")]
impl<'a> LZWReader<'a> {
    /// Wraps a compressed chunk
    pub fn new(input: &'a [u8]) -> LZWReader<'a> {
        Self {
            input,
            decoder: weezl::decode::Decoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8),
        }
    }
}

#[cfg(feature = "lzw")]
impl Read for LZWReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            let result = self.decoder.decode_bytes(self.input, buf);
            self.input = &self.input[result.consumed_in..];

            match result.status {
                Ok(weezl::LzwStatus::Ok) => {
                    if result.consumed_out == 0 {
                        continue;
                    } else {
                        return Ok(result.consumed_out);
                    }
                }
                Ok(weezl::LzwStatus::NoProgress) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "no lzw end code found",
                    ));
                }
                Ok(weezl::LzwStatus::Done) => {
                    return Ok(result.consumed_out);
                }
                Err(err) => return Err(io::Error::new(io::ErrorKind::InvalidData, err)),
            }
        }
    }
}

///
/// ## PackBits Reader
///

enum PackBitsReaderState {
    Header,
    Literal,
    Repeat { value: u8 },
}

/// Reader that unpacks Apple's `PackBits` format
pub struct PackBitsReader<R: Read> {
    reader: Take<R>,
    state: PackBitsReaderState,
    count: usize,
}

impl<R: Read> PackBitsReader<R> {
    /// Wraps a reader
    pub fn new(reader: R, length: u64) -> Self {
        Self {
            reader: reader.take(length),
            state: PackBitsReaderState::Header,
            count: 0,
        }
    }
}

impl<R: Read> Read for PackBitsReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while let PackBitsReaderState::Header = self.state {
            if self.reader.limit() == 0 {
                return Ok(0);
            }
            let mut header: [u8; 1] = [0];
            self.reader.read_exact(&mut header)?;
            let h = header[0] as i8;
            if (-127..=-1).contains(&h) {
                let mut data: [u8; 1] = [0];
                self.reader.read_exact(&mut data)?;
                self.state = PackBitsReaderState::Repeat { value: data[0] };
                self.count = (1 - h as isize) as usize;
            } else if h >= 0 {
                self.state = PackBitsReaderState::Literal;
                self.count = h as usize + 1;
            } else {
                // h = -128 is a no-op.
            }
        }

        let length = buf.len().min(self.count);
        let actual = match self.state {
            PackBitsReaderState::Literal => self.reader.read(&mut buf[..length])?,
            PackBitsReaderState::Repeat { value } => {
                buf[..length].fill(value);
                length
            }
            PackBitsReaderState::Header => 0,
        };

        if length > 0 && actual == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "packbits literal run is truncated",
            ));
        }

        self.count -= actual;
        if self.count == 0 {
            self.state = PackBitsReaderState::Header;
        }
        Ok(actual)
    }
}

///
/// ## SmartReader Reader
///

/// Reader that is aware of the byte order.
#[derive(Debug)]
pub struct SmartReader<R> {
    reader: R,
    pub byte_order: ByteOrder,
}

impl<R> SmartReader<R> {
    /// Wraps a reader
    pub fn wrap(reader: R, byte_order: ByteOrder) -> SmartReader<R> {
        SmartReader { reader, byte_order }
    }
}

impl<R: Read> EndianReader for SmartReader<R> {
    #[inline(always)]
    fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }
}

impl<R: Read> Read for SmartReader<R> {
    #[inline]
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

///
/// ## Sample bit reader
///

/// Reads MSB-first bit fields of up to 32 bits out of a decompressed row.
pub(crate) struct BitReader<'a> {
    data: &'a [u8],
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        BitReader { data, bit_pos: 0 }
    }

    /// Reads `bits` bits, padding with zero past the end of the data.
    pub(crate) fn read_bits(&mut self, bits: u32) -> u32 {
        debug_assert!((1..=32).contains(&bits));
        let mut value: u64 = 0;
        let mut remaining = bits as usize;

        while remaining > 0 {
            let byte = self.data.get(self.bit_pos / 8).copied().unwrap_or(0);
            let offset = self.bit_pos % 8;
            let available = 8 - offset;
            let take = available.min(remaining);
            let chunk = (byte >> (available - take)) & (0xffu16 >> (8 - take)) as u8;

            value = (value << take) | u64::from(chunk);
            remaining -= take;
            self.bit_pos += take;
        }

        value as u32
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_packbits() {
        let encoded = vec![
            0xFE, 0xAA, 0x02, 0x80, 0x00, 0x2A, 0xFD, 0xAA, 0x03, 0x80, 0x00, 0x2A, 0x22, 0xF7,
            0xAA,
        ];
        let encoded_len = encoded.len();

        let buff = io::Cursor::new(encoded);
        let mut decoder = PackBitsReader::new(buff, encoded_len as u64);

        let mut decoded = Vec::new();
        decoder.read_to_end(&mut decoded).unwrap();

        let expected = vec![
            0xAA, 0xAA, 0xAA, 0x80, 0x00, 0x2A, 0xAA, 0xAA, 0xAA, 0xAA, 0x80, 0x00, 0x2A, 0x22,
            0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA,
        ];
        assert_eq!(decoded, expected);
    }

    #[test]
    fn test_packbits_truncated_literal() {
        // Header announces four literal bytes but only two follow.
        let encoded = vec![0x03, 0x01, 0x02];
        let mut decoder = PackBitsReader::new(io::Cursor::new(encoded), 3);

        let mut decoded = Vec::new();
        let err = decoder.read_to_end(&mut decoded).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[cfg(feature = "lzw")]
    #[test]
    fn test_lzw_round_trip() {
        let data: Vec<u8> = (0..200u8).cycle().take(1000).collect();
        let encoded = weezl::encode::Encoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8)
            .encode(&data)
            .unwrap();

        let mut decoded = Vec::new();
        LZWReader::new(&encoded).read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn endian_reads() {
        let data = [0x01, 0x02, 0x03, 0x04];
        let mut le = SmartReader::wrap(io::Cursor::new(data), ByteOrder::LittleEndian);
        assert_eq!(le.read_u16().unwrap(), 0x0201);
        let mut be = SmartReader::wrap(io::Cursor::new(data), ByteOrder::BigEndian);
        assert_eq!(be.read_u32().unwrap(), 0x01020304);
    }

    #[test]
    fn bit_reader_msb_first() {
        let data = [0b1010_0110, 0b1100_0011, 0xff, 0x00];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bits(1), 1);
        assert_eq!(reader.read_bits(3), 0b010);
        assert_eq!(reader.read_bits(6), 0b0110_11);
        assert_eq!(reader.read_bits(6), 0b00_0011);
        assert_eq!(reader.read_bits(16), 0xff00);
        // Reading past the end yields zeros.
        assert_eq!(reader.read_bits(12), 0);
    }

    #[test]
    fn bit_reader_wide_fields() {
        let data = [0x12, 0x34, 0x56, 0x78];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bits(32), 0x1234_5678);
    }
}
