//! Builds little endian TIFF streams in memory.
#![allow(dead_code)]

pub const BYTE: u16 = 1;
pub const ASCII: u16 = 2;
pub const SHORT: u16 = 3;
pub const LONG: u16 = 4;
pub const RATIONAL: u16 = 5;
pub const UNDEFINED: u16 = 7;

enum EntryValue {
    Data(Vec<u8>),
    /// Written verbatim into the value field, e.g. an offset that points nowhere.
    Raw(u32),
}

struct Entry {
    tag: u16,
    field_type: u16,
    count: u32,
    value: EntryValue,
}

enum Chunks {
    Strips(Vec<Vec<u8>>),
    Tiles(Vec<Vec<u8>>),
}

/// One image file directory, assembled into a stream by [`assemble`].
#[derive(Default)]
pub struct Ifd {
    entries: Vec<Entry>,
    chunks: Option<Chunks>,
}

impl Ifd {
    pub fn new() -> Self {
        Ifd::default()
    }

    pub fn raw(mut self, tag: u16, field_type: u16, count: u32, data: Vec<u8>) -> Self {
        self.entries.push(Entry {
            tag,
            field_type,
            count,
            value: EntryValue::Data(data),
        });
        self
    }

    /// An entry whose value field holds `offset` regardless of where data would live.
    pub fn pointer(mut self, tag: u16, field_type: u16, count: u32, offset: u32) -> Self {
        self.entries.push(Entry {
            tag,
            field_type,
            count,
            value: EntryValue::Raw(offset),
        });
        self
    }

    pub fn short(self, tag: u16, values: &[u16]) -> Self {
        let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.raw(tag, SHORT, values.len() as u32, data)
    }

    pub fn long(self, tag: u16, values: &[u32]) -> Self {
        let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.raw(tag, LONG, values.len() as u32, data)
    }

    pub fn rational(self, tag: u16, numerator: u32, denominator: u32) -> Self {
        let mut data = numerator.to_le_bytes().to_vec();
        data.extend_from_slice(&denominator.to_le_bytes());
        self.raw(tag, RATIONAL, 1, data)
    }

    pub fn ascii(self, tag: u16, text: &str) -> Self {
        let mut data = text.as_bytes().to_vec();
        data.push(0);
        let count = data.len() as u32;
        self.raw(tag, ASCII, count, data)
    }

    pub fn bytes(self, tag: u16, field_type: u16, data: &[u8]) -> Self {
        self.raw(tag, field_type, data.len() as u32, data.to_vec())
    }

    /// Basic geometry: width, height, photometric interpretation, compression and bit depths.
    pub fn image(self, width: u32, height: u32, photometric: u16, bits: &[u16]) -> Self {
        self.long(256, &[width])
            .long(257, &[height])
            .short(258, bits)
            .short(259, &[1])
            .short(262, &[photometric])
            .short(277, &[bits.len() as u16])
    }

    /// Replaces an entry added before.
    pub fn set_short(mut self, tag: u16, values: &[u16]) -> Self {
        self.entries.retain(|entry| entry.tag != tag);
        self.short(tag, values)
    }

    pub fn without(mut self, tag: u16) -> Self {
        self.entries.retain(|entry| entry.tag != tag);
        self
    }

    /// Strip data; `StripOffsets` and `StripByteCounts` are added on assembly.
    pub fn strips(mut self, strips: Vec<Vec<u8>>) -> Self {
        self.chunks = Some(Chunks::Strips(strips));
        self
    }

    /// Tile data; `TileOffsets` and `TileByteCounts` are added on assembly.
    pub fn tiles(mut self, tiles: Vec<Vec<u8>>) -> Self {
        self.chunks = Some(Chunks::Tiles(tiles));
        self
    }

    pub fn build(self) -> Vec<u8> {
        assemble(vec![self])
    }
}

fn pad(out: &mut Vec<u8>) {
    if out.len() % 2 != 0 {
        out.push(0);
    }
}

/// Lays out the directories as a chain, in order.
pub fn assemble(directories: Vec<Ifd>) -> Vec<u8> {
    let mut out = b"II".to_vec();
    out.extend_from_slice(&42u16.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    let mut pointer_pos = 4;

    for mut ifd in directories {
        if let Some(chunks) = ifd.chunks.take() {
            let (data, offsets_tag, counts_tag) = match chunks {
                Chunks::Strips(data) => (data, 273, 279),
                Chunks::Tiles(data) => (data, 324, 325),
            };
            let mut offsets = Vec::new();
            let mut counts = Vec::new();
            for chunk in data {
                pad(&mut out);
                offsets.push(out.len() as u32);
                counts.push(chunk.len() as u32);
                out.extend_from_slice(&chunk);
            }
            ifd = ifd.long(offsets_tag, &offsets).long(counts_tag, &counts);
        }

        ifd.entries.sort_by_key(|entry| entry.tag);

        let mut values = Vec::new();
        for entry in &ifd.entries {
            let value = match &entry.value {
                EntryValue::Data(data) if data.len() > 4 => {
                    pad(&mut out);
                    let offset = out.len() as u32;
                    out.extend_from_slice(data);
                    offset.to_le_bytes()
                }
                EntryValue::Data(data) => {
                    let mut inline = [0; 4];
                    inline[..data.len()].copy_from_slice(data);
                    inline
                }
                EntryValue::Raw(offset) => offset.to_le_bytes(),
            };
            values.push(value);
        }

        pad(&mut out);
        let ifd_offset = out.len() as u32;
        out[pointer_pos..pointer_pos + 4].copy_from_slice(&ifd_offset.to_le_bytes());

        out.extend_from_slice(&(ifd.entries.len() as u16).to_le_bytes());
        for (entry, value) in ifd.entries.iter().zip(values) {
            out.extend_from_slice(&entry.tag.to_le_bytes());
            out.extend_from_slice(&entry.field_type.to_le_bytes());
            out.extend_from_slice(&entry.count.to_le_bytes());
            out.extend_from_slice(&value);
        }
        pointer_pos = out.len();
        out.extend_from_slice(&0u32.to_le_bytes());
    }

    out
}

/// An 8-bit grayscale image with one uncompressed strip.
pub fn gray8(width: u32, height: u32, pixels: &[u8]) -> Ifd {
    Ifd::new()
        .image(width, height, 1, &[8])
        .strips(vec![pixels.to_vec()])
}

/// An 8-bit RGB image with one uncompressed strip.
pub fn rgb8(width: u32, height: u32, pixels: &[u8]) -> Ifd {
    Ifd::new()
        .image(width, height, 2, &[8, 8, 8])
        .strips(vec![pixels.to_vec()])
}
