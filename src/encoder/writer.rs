use std::io::{self, Write};

/// Little endian writer that keeps track of the number of bytes written.
pub struct TiffWriter<W> {
    writer: W,
    offset: u64,
}

impl<W: Write> TiffWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, offset: 0 }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), io::Error> {
        self.writer.write_all(bytes)?;
        self.offset += bytes.len() as u64;
        Ok(())
    }

    pub fn write_u16(&mut self, n: u16) -> Result<(), io::Error> {
        self.write_bytes(&n.to_le_bytes())
    }

    pub fn write_u32(&mut self, n: u32) -> Result<(), io::Error> {
        self.write_bytes(&n.to_le_bytes())
    }

    pub fn write_header(&mut self, first_ifd: u32) -> Result<(), io::Error> {
        self.write_bytes(b"II")?;
        self.write_u16(42)?;
        self.write_u32(first_ifd)
    }

    pub fn pad_word_boundary(&mut self) -> Result<(), io::Error> {
        if self.offset % 4 != 0 {
            let padding = [0, 0, 0];
            let padd_len = 4 - (self.offset % 4);
            self.write_bytes(&padding[..padd_len as usize])?;
        }

        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), io::Error> {
        self.writer.flush()
    }
}
