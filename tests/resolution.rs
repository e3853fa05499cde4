extern crate tiffcore;

mod common;

use std::io::Cursor;

use common::{assemble, gray8, Ifd, SHORT};
use tiffcore::decoder::{read_contents, read_header, Decoder, Limits, ReadOptions, ReaderSource};
use tiffcore::tags::{ByteOrder, Tag, Type};
use tiffcore::{DeviationKind, Field, FieldData, TiffError, TiffFormatError, Value};

fn lenient() -> ReadOptions {
    ReadOptions::default()
}

fn strict() -> ReadOptions {
    ReadOptions::default().strict()
}

fn u32_at(data: &[u8], pos: usize) -> u32 {
    u32::from_le_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
}

/// Offset of the next-directory pointer of the directory at `ifd`.
fn next_pointer_pos(data: &[u8], ifd: usize) -> usize {
    let entries = u16::from_le_bytes([data[ifd], data[ifd + 1]]) as usize;
    ifd + 2 + entries * 12
}

#[test]
fn header_variants() {
    let header = read_header(&gray8(1, 1, &[0]).build()).unwrap();
    assert_eq!(header.byte_order, ByteOrder::LittleEndian);
    assert!(!header.bigtiff);
    assert_eq!(header.version, 42);

    let mut wrong_version = gray8(1, 1, &[0]).build();
    wrong_version[2] = 44;
    match read_header(&wrong_version) {
        Err(TiffError::FormatError(TiffFormatError::TiffSignatureInvalid(44))) => {}
        other => panic!("unexpected {:?}", other),
    }

    match read_header(&b"XX*\0\x08\0\0\0"[..]) {
        Err(TiffError::FormatError(TiffFormatError::TiffSignatureNotFound)) => {}
        other => panic!("unexpected {:?}", other),
    }
    match read_header(&b"II*\0"[..]) {
        Err(TiffError::FormatError(TiffFormatError::TiffSignatureNotFound)) => {}
        other => panic!("unexpected {:?}", other),
    }

    let bad_bigtiff = b"II+\0\x04\0\0\0\x10\0\0\0\0\0\0\0";
    match read_header(&bad_bigtiff[..]) {
        Err(TiffError::FormatError(TiffFormatError::InvalidBigTiffHeader)) => {}
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn big_endian_stream() {
    let mut data = b"MM\0\x2a\0\0\0\x08".to_vec();
    data.extend_from_slice(&2u16.to_be_bytes());
    // ImageWidth, SHORT, 1, left-justified in the value field
    data.extend_from_slice(&[0x01, 0x00, 0x00, 0x03, 0, 0, 0, 1, 0x00, 0x10, 0, 0]);
    // ImageLength, LONG, 1
    data.extend_from_slice(&[0x01, 0x01, 0x00, 0x04, 0, 0, 0, 1, 0, 0, 0, 7]);
    data.extend_from_slice(&0u32.to_be_bytes());

    let contents = read_contents(&data, &strict()).unwrap();
    assert_eq!(contents.header.byte_order, ByteOrder::BigEndian);
    assert_eq!(Decoder::new(data).image_size().unwrap(), (16, 7));
}

#[test]
fn bigtiff_stream() {
    let mut data = b"II+\0".to_vec();
    data.extend_from_slice(&8u16.to_le_bytes());
    data.extend_from_slice(&0u16.to_le_bytes());
    data.extend_from_slice(&16u64.to_le_bytes());

    data.extend_from_slice(&3u64.to_le_bytes());
    let mut entry = |tag: u16, field_type: u16, count: u64, value: [u8; 8]| {
        data.extend_from_slice(&tag.to_le_bytes());
        data.extend_from_slice(&field_type.to_le_bytes());
        data.extend_from_slice(&count.to_le_bytes());
        data.extend_from_slice(&value);
    };
    entry(256, 4, 1, [5, 0, 0, 0, 0, 0, 0, 0]);
    entry(257, 4, 1, [3, 0, 0, 0, 0, 0, 0, 0]);
    // Six bytes still fit into a BigTIFF entry.
    entry(258, 3, 3, [8, 0, 8, 0, 8, 0, 0, 0]);
    data.extend_from_slice(&0u64.to_le_bytes());

    let contents = read_contents(&data, &strict()).unwrap();
    assert!(contents.header.bigtiff);
    assert_eq!(contents.header.inline_threshold(), 8);
    assert_eq!(contents.format_version(), "Tiff v.43");

    let directory = contents.first_directory().unwrap();
    assert_eq!(directory.len(), 3);
    let bits = directory.get(Tag::BitsPerSample).unwrap();
    assert!(bits.is_resolved());
    assert_eq!(bits.int_array().unwrap(), vec![8, 8, 8]);
    assert_eq!(bits.int_or_array_sum().unwrap(), 24);
}

#[test]
fn required_and_optional_lookups() {
    let data = gray8(2, 2, &[0; 4]).build();
    let contents = read_contents(&data, &lenient()).unwrap();
    let directory = contents.first_directory().unwrap();

    assert_eq!(directory.get(Tag::ImageWidth).unwrap().scalar_int().unwrap(), 2);
    assert!(directory.find(Tag::Artist, false).unwrap().is_none());
    match directory.find(Tag::Artist, true) {
        Err(TiffError::FormatError(TiffFormatError::RequiredTagNotFound(Tag::Artist))) => {}
        other => panic!("unexpected {:?}", other),
    }
    assert!(directory.contains(Tag::StripOffsets));
    assert!(directory.image_data().is_none());

    let with_data = read_contents(&data, &lenient().with_image_data()).unwrap();
    let elements = with_data.directories[0].image_data().unwrap().elements().len();
    assert_eq!(elements, 1);
}

#[test]
fn coercions() {
    let data = gray8(1, 1, &[0])
        .rational(282, 300, 2)
        .ascii(305, "tiffcore")
        .build();
    let contents = read_contents(&data, &lenient()).unwrap();
    let directory = contents.first_directory().unwrap();

    let resolution = directory.get(Tag::XResolution).unwrap();
    assert_eq!(resolution.scalar_double().unwrap(), 150.0);
    match resolution.scalar_int() {
        Err(TiffError::FormatError(TiffFormatError::TypeMismatch { tag, .. })) => {
            assert_eq!(tag, Tag::XResolution)
        }
        other => panic!("unexpected {:?}", other),
    }

    let software = directory.get(Tag::Software).unwrap();
    assert_eq!(software.value().unwrap(), Value::Ascii("tiffcore".into()));
    assert_eq!(software.byte_array().unwrap(), b"tiffcore\0".to_vec());
    assert!(software.int_array().is_err());

    let width = directory.get(Tag::ImageWidth).unwrap();
    assert_eq!(width.value().unwrap(), Value::Unsigned(1));
    assert_eq!(width.double_array().unwrap(), vec![1.0]);
}

#[test]
fn materialize_is_idempotent() {
    let bytes = [0xAAu8, 0xBB, 1, 0, 2, 0, 3, 0];
    let field = Field::unresolved(Tag::BitsPerSample, Type::SHORT, 3, ByteOrder::LittleEndian, 2)
        .unwrap();
    assert!(!field.is_resolved());
    assert_eq!(
        field.data(),
        &FieldData::Unresolved {
            offset: 2,
            length: 6
        }
    );
    match field.int_array() {
        Err(TiffError::FormatError(TiffFormatError::UnresolvedValue(Tag::BitsPerSample))) => {}
        other => panic!("unexpected {:?}", other),
    }

    let resolved = field.materialize(&bytes[..]).unwrap();
    assert_eq!(resolved.int_array().unwrap(), vec![1, 2, 3]);
    assert_eq!(resolved.materialize(&bytes[..]).unwrap(), resolved);

    let outside = Field::unresolved(Tag::BitsPerSample, Type::SHORT, 3, ByteOrder::LittleEndian, 4)
        .unwrap();
    match outside.materialize(&bytes[..]) {
        Err(TiffError::FormatError(TiffFormatError::ValueOutOfBounds { offset: 4, length: 6, .. })) => {}
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn dangling_value_offset() {
    let data = Ifd::new()
        .long(256, &[1])
        .long(257, &[1])
        .pointer(258, SHORT, 3, 0xFFFF00)
        .build();

    match read_contents(&data, &strict()) {
        Err(TiffError::FormatError(TiffFormatError::ValueOutOfBounds {
            tag: Tag::BitsPerSample,
            offset: 0xFFFF00,
            length: 6,
        })) => {}
        other => panic!("unexpected {:?}", other),
    }

    let contents = read_contents(&data, &lenient()).unwrap();
    let deviations = contents.compliance.deviations();
    assert_eq!(deviations.len(), 1);
    assert_eq!(deviations[0].directory, Some(0));
    assert_eq!(
        deviations[0].kind,
        DeviationKind::ValueOutOfBounds {
            tag: Tag::BitsPerSample,
            offset: 0xFFFF00,
            length: 6
        }
    );
    let bits = contents.directories[0].get(Tag::BitsPerSample).unwrap();
    assert_eq!(bits.count(), 0);
}

#[test]
fn unknown_field_type() {
    let data = gray8(1, 1, &[0]).raw(300, 99, 1, vec![0; 4]).build();

    match read_contents(&data, &strict()) {
        Err(TiffError::FormatError(TiffFormatError::UnknownFieldType { field_type: 99, .. })) => {}
        other => panic!("unexpected {:?}", other),
    }

    let contents = read_contents(&data, &lenient()).unwrap();
    assert_eq!(contents.compliance.deviations().len(), 1);
    assert!(!contents.directories[0].contains(Tag::Unknown(300)));
}

#[test]
fn empty_directory() {
    let data = Ifd::new().build();
    match read_contents(&data, &strict()) {
        Err(TiffError::FormatError(TiffFormatError::EmptyDirectory(8))) => {}
        other => panic!("unexpected {:?}", other),
    }
    let contents = read_contents(&data, &lenient()).unwrap();
    assert!(contents.directories[0].is_empty());
    assert_eq!(
        contents.compliance.deviations()[0].kind,
        DeviationKind::EmptyDirectory { offset: 8 }
    );
}

#[test]
fn chain_of_directories() {
    let data = assemble(vec![
        gray8(1, 1, &[0]),
        gray8(2, 2, &[0; 4]).ascii(305, "second"),
        gray8(3, 3, &[0; 9]),
    ]);
    let contents = read_contents(&data, &strict()).unwrap();

    assert_eq!(contents.directories.len(), 3);
    for (index, directory) in contents.directories.iter().enumerate() {
        assert_eq!(directory.index(), index);
    }
    assert_eq!(
        contents.directories[0].next_ifd(),
        Some(contents.directories[1].offset())
    );
    assert_eq!(contents.directories[2].next_ifd(), None);

    let software = contents.find_field(Tag::Software).unwrap();
    assert_eq!(software.value().unwrap(), Value::Ascii("second".into()));
    assert!(contents.find_field(Tag::Artist).is_none());

    let first = Decoder::new(data).read_first_directory(false).unwrap();
    assert_eq!(first.directories.len(), 1);
}

#[test]
fn cyclic_chain_is_truncated() {
    let mut data = assemble(vec![gray8(1, 1, &[0]), gray8(1, 1, &[0])]);
    let first = u32_at(&data, 4);
    let second = u32_at(&data, next_pointer_pos(&data, first as usize));
    let pos = next_pointer_pos(&data, second as usize);
    data[pos..pos + 4].copy_from_slice(&first.to_le_bytes());

    match read_contents(&data, &strict()) {
        Err(TiffError::FormatError(TiffFormatError::CycleInOffsets(offset))) => {
            assert_eq!(offset, u64::from(first))
        }
        other => panic!("unexpected {:?}", other),
    }

    let contents = read_contents(&data, &lenient()).unwrap();
    assert_eq!(contents.directories.len(), 2);
    assert_eq!(
        contents.compliance.deviations()[0].kind,
        DeviationKind::DirectoryCycle {
            offset: u64::from(first)
        }
    );
}

#[test]
fn next_directory_outside_stream() {
    let mut data = gray8(1, 1, &[0]).build();
    let pos = next_pointer_pos(&data, u32_at(&data, 4) as usize);
    data[pos..pos + 4].copy_from_slice(&0xFFFFu32.to_le_bytes());

    assert!(read_contents(&data, &strict()).is_err());
    let contents = read_contents(&data, &lenient()).unwrap();
    assert_eq!(contents.directories.len(), 1);
    assert_eq!(
        contents.compliance.deviations()[0].kind,
        DeviationKind::NextDirectoryOutOfBounds { offset: 0xFFFF }
    );
}

#[test]
fn first_directory_is_mandatory() {
    let mut data = gray8(1, 1, &[0]).build();
    data[4..8].copy_from_slice(&0xFFFFu32.to_le_bytes());
    match read_contents(&data, &lenient()) {
        Err(TiffError::FormatError(TiffFormatError::DirectoryOutOfBounds(0xFFFF))) => {}
        other => panic!("unexpected {:?}", other),
    }

    data[4..8].copy_from_slice(&0u32.to_le_bytes());
    match read_contents(&data, &lenient()) {
        Err(TiffError::FormatError(TiffFormatError::ImageFileDirectoryNotFound)) => {}
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn oversize_values_respect_limits() {
    let data = gray8(1, 1, &[0]).short(Tag::ColorMap.to_u16(), &[0; 6]).build();
    let mut limits = Limits::default();
    limits.ifd_value_size = 8;

    match read_contents(&data, &lenient().with_limits(limits)) {
        Err(TiffError::LimitsExceeded) => {}
        other => panic!("unexpected {:?}", other),
    }
    assert!(read_contents(&data, &lenient()).is_ok());
}

#[test]
fn reader_source() {
    let data = gray8(3, 2, &[10, 20, 30, 40, 50, 60]).build();
    let source = ReaderSource::new(Cursor::new(data.clone())).unwrap();
    let decoder = Decoder::new(source);

    assert_eq!(decoder.image_size().unwrap(), (3, 2));
    let raster = decoder.decode_first_image().unwrap();
    assert_eq!(raster.get_pixel(2, 1), Some([60, 60, 60, 255]));
    assert_eq!(decoder.into_inner().into_inner().into_inner(), data);
}

#[test]
fn compliance_of_a_clean_stream() {
    let decoder = Decoder::new(gray8(1, 1, &[0]).build());
    assert!(decoder.format_compliance().unwrap().is_compliant());
}
