//! Function for reading TIFF tags

use std::fmt;
use std::io;

use super::source::ByteSource;
use super::stream::{ByteOrder, EndianReader, SmartReader};
use crate::tags::{Tag, Type};
use crate::{TiffError, TiffFormatError, TiffResult};

use self::Value::{
    Ascii, Byte, Double, Float, Ifd, IfdBig, List, Rational, SRational, Short, Signed, SignedBig,
    SignedByte, SignedShort, Undefined, Unsigned, UnsignedBig,
};

/// Fields with more values than this are abbreviated when displayed.
const DISPLAY_LIMIT: usize = 50;

#[allow(unused_qualifications)]
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Value {
    Byte(u8),
    Short(u16),
    SignedByte(i8),
    SignedShort(i16),
    Signed(i32),
    SignedBig(i64),
    Unsigned(u32),
    UnsignedBig(u64),
    Float(f32),
    Double(f64),
    List(Vec<Value>),
    Rational(u32, u32),
    SRational(i32, i32),
    Ascii(String),
    Undefined(u8),
    Ifd(u32),
    IfdBig(u64),
}

impl Value {
    /// The value as a signed integer, if it is one and fits.
    pub fn into_i64(self) -> Option<i64> {
        match self {
            Byte(val) | Undefined(val) => Some(val.into()),
            Short(val) => Some(val.into()),
            SignedByte(val) => Some(val.into()),
            SignedShort(val) => Some(val.into()),
            Signed(val) => Some(val.into()),
            SignedBig(val) => Some(val),
            Unsigned(val) | Ifd(val) => Some(val.into()),
            UnsignedBig(val) | IfdBig(val) => i64::try_from(val).ok(),
            _ => None,
        }
    }

    /// The value as a floating point number. Rationals are divided out.
    pub fn into_f64(self) -> Option<f64> {
        match self {
            Float(val) => Some(val.into()),
            Double(val) => Some(val),
            Rational(numerator, denominator) => Some(f64::from(numerator) / f64::from(denominator)),
            SRational(numerator, denominator) => {
                Some(f64::from(numerator) / f64::from(denominator))
            }
            UnsignedBig(val) | IfdBig(val) => Some(val as f64),
            SignedBig(val) => Some(val as f64),
            other => other.into_i64().map(|val| val as f64),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Byte(e) | Undefined(e) => write!(f, "{}", e),
            Short(e) => write!(f, "{}", e),
            SignedByte(e) => write!(f, "{}", e),
            SignedShort(e) => write!(f, "{}", e),
            Signed(e) => write!(f, "{}", e),
            SignedBig(e) => write!(f, "{}", e),
            Unsigned(e) => write!(f, "{}", e),
            UnsignedBig(e) => write!(f, "{}", e),
            Float(e) => write!(f, "{}", e),
            Double(e) => write!(f, "{}", e),
            Ifd(e) => write!(f, "IFD offset: {}", e),
            IfdBig(e) => write!(f, "IFD offset: {}", e),
            Rational(e1, e2) => fmt_rational(f, f64::from(*e1), f64::from(*e2)),
            SRational(e1, e2) => fmt_rational(f, f64::from(*e1), f64::from(*e2)),
            Ascii(s) => write!(f, "'{}'", s),
            List(elements) => {
                for (i, element) in elements.iter().take(DISPLAY_LIMIT).enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", element)?;
                }
                if elements.len() > DISPLAY_LIMIT {
                    write!(f, ", ... ({})", elements.len())?;
                }
                Ok(())
            }
        }
    }
}

fn fmt_rational(f: &mut fmt::Formatter<'_>, numerator: f64, denominator: f64) -> fmt::Result {
    if denominator == 0.0 {
        write!(f, "{}/0", numerator)
    } else {
        write!(f, "{:.3}", numerator / denominator)
    }
}

/// Storage of a field's value bytes.
///
/// Values that fit into the entry are read with the directory. Larger ("oversize") values only
/// carry their location until [`Field::materialize`] reads them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldData {
    /// The value bytes, in file byte order.
    Resolved(Vec<u8>),
    /// The value bytes have not been read yet.
    Unresolved { offset: u64, length: u64 },
}

/// One tag entry of an image file directory.
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    tag: Tag,
    field_type: Type,
    count: u64,
    byte_order: ByteOrder,
    data: FieldData,
}

impl Field {
    /// A field holding `data`, which must be exactly `count` values of `field_type`.
    pub fn new(
        tag: Tag,
        field_type: Type,
        count: u64,
        byte_order: ByteOrder,
        data: Vec<u8>,
    ) -> TiffResult<Field> {
        if field_type.value_bytes(count)? != data.len() as u64 {
            return Err(TiffError::FormatError(TiffFormatError::TypeMismatch {
                tag,
                field_type,
                count,
                expected: "value bytes matching type and count",
            }));
        }

        Ok(Field {
            tag,
            field_type,
            count,
            byte_order,
            data: FieldData::Resolved(data),
        })
    }

    /// A field whose value is stored elsewhere in the stream and has not been read.
    pub fn unresolved(
        tag: Tag,
        field_type: Type,
        count: u64,
        byte_order: ByteOrder,
        offset: u64,
    ) -> TiffResult<Field> {
        let length = field_type.value_bytes(count)?;
        Ok(Field {
            tag,
            field_type,
            count,
            byte_order,
            data: FieldData::Unresolved { offset, length },
        })
    }

    /// A field with no values, standing in for one whose value could not be located.
    pub(crate) fn empty(tag: Tag, field_type: Type, byte_order: ByteOrder) -> Field {
        Field {
            tag,
            field_type,
            count: 0,
            byte_order,
            data: FieldData::Resolved(Vec::new()),
        }
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn field_type(&self) -> Type {
        self.field_type
    }

    /// Number of values, not bytes.
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn data(&self) -> &FieldData {
        &self.data
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self.data, FieldData::Resolved(_))
    }

    /// The raw value bytes in file byte order.
    pub fn raw_bytes(&self) -> TiffResult<&[u8]> {
        match &self.data {
            FieldData::Resolved(bytes) => Ok(bytes),
            FieldData::Unresolved { .. } => Err(TiffFormatError::UnresolvedValue(self.tag).into()),
        }
    }

    /// Returns a resolved copy of this field, reading an oversize value from `source`.
    ///
    /// Resolved fields are returned unchanged, so calling this repeatedly is idempotent.
    pub fn materialize<S: ByteSource + ?Sized>(&self, source: &S) -> TiffResult<Field> {
        let (offset, length) = match self.data {
            FieldData::Resolved(_) => return Ok(self.clone()),
            FieldData::Unresolved { offset, length } => (offset, length),
        };

        if !source.contains(offset, length) {
            return Err(TiffFormatError::ValueOutOfBounds {
                tag: self.tag,
                offset,
                length,
            }
            .into());
        }

        let bytes = source.read_block(offset, length)?;
        Ok(Field {
            data: FieldData::Resolved(bytes),
            ..self.clone()
        })
    }

    fn mismatch(&self, expected: &'static str) -> TiffError {
        TiffError::FormatError(TiffFormatError::TypeMismatch {
            tag: self.tag,
            field_type: self.field_type,
            count: self.count,
            expected,
        })
    }

    fn is_integer(&self) -> bool {
        matches!(
            self.field_type,
            Type::BYTE
                | Type::SBYTE
                | Type::SHORT
                | Type::SSHORT
                | Type::LONG
                | Type::SLONG
                | Type::IFD
                | Type::LONG8
                | Type::SLONG8
                | Type::IFD8
        )
    }

    fn is_numeric(&self) -> bool {
        self.is_integer()
            || matches!(
                self.field_type,
                Type::RATIONAL | Type::SRATIONAL | Type::FLOAT | Type::DOUBLE
            )
    }

    /// Decodes every stored element in order.
    pub fn values(&self) -> TiffResult<Vec<Value>> {
        let bytes = self.raw_bytes()?;
        let mut reader = SmartReader::wrap(io::Cursor::new(bytes), self.byte_order);
        let count = usize::try_from(self.count)?;
        let mut values = Vec::with_capacity(count);

        for _ in 0..count {
            values.push(match self.field_type {
                Type::BYTE => Byte(reader.read_u8()?),
                Type::ASCII => Byte(reader.read_u8()?),
                Type::UNDEFINED => Undefined(reader.read_u8()?),
                Type::SBYTE => SignedByte(reader.read_i8()?),
                Type::SHORT => Short(reader.read_u16()?),
                Type::SSHORT => SignedShort(reader.read_i16()?),
                Type::LONG => Unsigned(reader.read_u32()?),
                Type::SLONG => Signed(reader.read_i32()?),
                Type::FLOAT => Float(reader.read_f32()?),
                Type::DOUBLE => Double(reader.read_f64()?),
                Type::RATIONAL => Rational(reader.read_u32()?, reader.read_u32()?),
                Type::SRATIONAL => SRational(reader.read_i32()?, reader.read_i32()?),
                Type::IFD => Ifd(reader.read_u32()?),
                Type::LONG8 => UnsignedBig(reader.read_u64()?),
                Type::SLONG8 => SignedBig(reader.read_i64()?),
                Type::IFD8 => IfdBig(reader.read_u64()?),
            });
        }

        Ok(values)
    }

    /// The whole value: a string for ASCII fields, a scalar for a single element and a list
    /// otherwise.
    pub fn value(&self) -> TiffResult<Value> {
        if self.field_type == Type::ASCII {
            let bytes = self.raw_bytes()?;
            // Strings may be null-terminated, so we trim anything downstream of the null byte
            let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
            return Ok(Ascii(String::from_utf8_lossy(&bytes[..end]).into_owned()));
        }

        let mut values = self.values()?;
        if values.len() == 1 {
            Ok(values.remove(0))
        } else {
            Ok(List(values))
        }
    }

    /// The single integer value of this field.
    pub fn scalar_int(&self) -> TiffResult<i64> {
        if !self.is_integer() || self.count != 1 {
            return Err(self.mismatch("a single integer"));
        }
        self.value()?
            .into_i64()
            .ok_or_else(|| self.mismatch("a single integer"))
    }

    /// The single numeric value of this field as a double.
    pub fn scalar_double(&self) -> TiffResult<f64> {
        if !self.is_numeric() || self.count != 1 {
            return Err(self.mismatch("a single number"));
        }
        self.value()?
            .into_f64()
            .ok_or_else(|| self.mismatch("a single number"))
    }

    pub fn int_array(&self) -> TiffResult<Vec<i64>> {
        if !self.is_integer() {
            return Err(self.mismatch("integers"));
        }
        self.values()?
            .into_iter()
            .map(|v| v.into_i64().ok_or_else(|| self.mismatch("integers")))
            .collect()
    }

    pub fn double_array(&self) -> TiffResult<Vec<f64>> {
        if !self.is_numeric() {
            return Err(self.mismatch("numbers"));
        }
        self.values()?
            .into_iter()
            .map(|v| v.into_f64().ok_or_else(|| self.mismatch("numbers")))
            .collect()
    }

    /// The raw bytes of a byte-sized field (`BYTE`, `SBYTE`, `UNDEFINED` or `ASCII`).
    pub fn byte_array(&self) -> TiffResult<Vec<u8>> {
        match self.field_type {
            Type::BYTE | Type::SBYTE | Type::UNDEFINED | Type::ASCII => {
                Ok(self.raw_bytes()?.to_vec())
            }
            _ => Err(self.mismatch("bytes")),
        }
    }

    /// The integer value if there is exactly one, otherwise the sum of all values.
    ///
    /// Used for tags that hold either a single shared value or one value per sample.
    pub fn int_or_array_sum(&self) -> TiffResult<i64> {
        if self.count == 1 {
            return self.scalar_int();
        }
        Ok(self
            .int_array()?
            .into_iter()
            .fold(0i64, |sum, v| sum.saturating_add(v)))
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self.tag.to_u16();
        write!(f, "{} (0x{:x}: {}): ", code, code, self.tag.name())?;
        match (&self.data, self.value()) {
            (FieldData::Unresolved { offset, length }, _) => {
                write!(f, "<unresolved: {} bytes at {:#x}>", length, offset)?
            }
            (_, Ok(value)) => write!(f, "{}", value)?,
            (_, Err(err)) => write!(f, "<unreadable: {}>", err)?,
        }
        write!(f, " ({} {})", self.count, self.field_type.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn le(tag: Tag, field_type: Type, count: u64, data: &[u8]) -> Field {
        Field::new(tag, field_type, count, ByteOrder::LittleEndian, data.to_vec()).unwrap()
    }

    fn assert_mismatch<T: std::fmt::Debug>(result: TiffResult<T>) {
        match result {
            Err(TiffError::FormatError(TiffFormatError::TypeMismatch { .. })) => {}
            other => panic!("expected a type mismatch, got {:?}", other),
        }
    }

    #[test]
    fn scalar_coercions() {
        let width = le(Tag::ImageWidth, Type::SHORT, 1, &[0x20, 0x03]);
        assert_eq!(width.scalar_int().unwrap(), 800);
        assert_eq!(width.scalar_double().unwrap(), 800.0);
        assert_eq!(width.int_array().unwrap(), vec![800]);

        let be = Field::new(
            Tag::ImageWidth,
            Type::LONG,
            1,
            ByteOrder::BigEndian,
            vec![0, 1, 0, 0],
        )
        .unwrap();
        assert_eq!(be.scalar_int().unwrap(), 65536);
    }

    #[test]
    fn rationals_divide() {
        let mut data = 300u32.to_le_bytes().to_vec();
        data.extend_from_slice(&4u32.to_le_bytes());
        let res = le(Tag::XResolution, Type::RATIONAL, 1, &data);
        assert_eq!(res.scalar_double().unwrap(), 75.0);
        assert_mismatch(res.scalar_int());
        assert_eq!(res.to_string(), "282 (0x11a: XResolution): 75.000 (1 RATIONAL)");
    }

    #[test]
    fn shape_mismatches() {
        let text = le(Tag::Software, Type::ASCII, 4, b"abc\0");
        assert_mismatch(text.int_array());
        assert_mismatch(text.scalar_int());
        assert_mismatch(text.double_array());
        assert_eq!(text.byte_array().unwrap(), b"abc\0");
        assert_eq!(text.value().unwrap(), Value::Ascii("abc".into()));

        let pair = le(Tag::BitsPerSample, Type::SHORT, 2, &[8, 0, 8, 0]);
        assert_mismatch(pair.scalar_int());
        assert_mismatch(pair.byte_array());
    }

    #[test]
    fn array_sum() {
        let bits = le(Tag::BitsPerSample, Type::SHORT, 3, &[8, 0, 8, 0, 8, 0]);
        assert_eq!(bits.int_or_array_sum().unwrap(), 24);
        let single = le(Tag::BitsPerSample, Type::SHORT, 1, &[4, 0]);
        assert_eq!(single.int_or_array_sum().unwrap(), 4);
    }

    #[test]
    fn length_must_match_type() {
        let err = Field::new(
            Tag::ImageWidth,
            Type::LONG,
            1,
            ByteOrder::LittleEndian,
            vec![1, 2],
        );
        assert!(err.is_err());
    }

    #[test]
    fn materialize_reads_once() {
        let mut source = vec![0u8; 8];
        source.extend_from_slice(&[1, 0, 2, 0, 3, 0]);
        let field = Field::unresolved(
            Tag::BitsPerSample,
            Type::SHORT,
            3,
            ByteOrder::LittleEndian,
            8,
        )
        .unwrap();

        match field.int_array() {
            Err(TiffError::FormatError(TiffFormatError::UnresolvedValue(Tag::BitsPerSample))) => {}
            other => panic!("unexpected {:?}", other),
        }

        let resolved = field.materialize(&source).unwrap();
        assert_eq!(resolved.int_array().unwrap(), vec![1, 2, 3]);
        assert_eq!(resolved.materialize(&source).unwrap(), resolved);
    }

    #[test]
    fn materialize_out_of_bounds() {
        let field =
            Field::unresolved(Tag::ColorMap, Type::SHORT, 16, ByteOrder::LittleEndian, 4).unwrap();
        match field.materialize(&vec![0u8; 10]) {
            Err(TiffError::FormatError(TiffFormatError::ValueOutOfBounds {
                offset: 4,
                length: 32,
                ..
            })) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn long_arrays_are_abbreviated() {
        let data = vec![7u8; 60];
        let field = le(Tag::Unknown(40000), Type::BYTE, 60, &data);
        let shown = field.to_string();
        assert!(shown.starts_with("40000 (0x9c40: Unknown): 7, 7"));
        assert!(shown.ends_with(", ... (60) (60 BYTE)"));
    }

    #[test]
    fn zero_denominator_displays() {
        let data = [1, 0, 0, 0, 0, 0, 0, 0];
        let field = le(Tag::YResolution, Type::RATIONAL, 1, &data);
        assert_eq!(field.value().unwrap().to_string(), "1/0");
    }
}
