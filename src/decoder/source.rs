//! Positional access to the bytes of a TIFF file.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Mutex;

/// Random access to the bytes of a TIFF stream.
///
/// Directory resolution, oversize tag values and strip/tile reads interleave in arbitrary order,
/// so reads are positional and carry no cursor state. Implementations must be callable from
/// several threads at once.
pub trait ByteSource: Sync {
    /// Total length of the stream in bytes.
    fn size(&self) -> u64;

    /// Read exactly `length` bytes starting at `offset`.
    ///
    /// A range that extends past [`ByteSource::size`] fails with
    /// [`io::ErrorKind::UnexpectedEof`].
    fn read_block(&self, offset: u64, length: u64) -> io::Result<Vec<u8>>;

    /// Whether `length` bytes at `offset` lie within the stream.
    fn contains(&self, offset: u64, length: u64) -> bool {
        offset
            .checked_add(length)
            .map_or(false, |end| end <= self.size())
    }
}

fn out_of_range(offset: u64, length: u64, size: u64) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!(
            "read of {} bytes at {:#x} exceeds stream of {} bytes",
            length, offset, size
        ),
    )
}

impl ByteSource for [u8] {
    fn size(&self) -> u64 {
        self.len() as u64
    }

    fn read_block(&self, offset: u64, length: u64) -> io::Result<Vec<u8>> {
        if !ByteSource::contains(self, offset, length) {
            return Err(out_of_range(offset, length, self.size()));
        }
        // Both fit into usize since they are bounded by the slice length.
        let start = offset as usize;
        let end = start + length as usize;
        Ok(self[start..end].to_vec())
    }
}

impl ByteSource for Vec<u8> {
    fn size(&self) -> u64 {
        self.as_slice().size()
    }

    fn read_block(&self, offset: u64, length: u64) -> io::Result<Vec<u8>> {
        self.as_slice().read_block(offset, length)
    }
}

impl<S: ByteSource + ?Sized> ByteSource for &S {
    fn size(&self) -> u64 {
        (**self).size()
    }

    fn read_block(&self, offset: u64, length: u64) -> io::Result<Vec<u8>> {
        (**self).read_block(offset, length)
    }
}

/// Adapts any seekable reader, such as a [`File`], into a [`ByteSource`].
///
/// Reads seek and read under a lock, so the source stays usable from several threads.
#[derive(Debug)]
pub struct ReaderSource<R> {
    reader: Mutex<R>,
    size: u64,
}

impl<R: Read + Seek> ReaderSource<R> {
    /// Wraps a reader, measuring its length by seeking to the end.
    pub fn new(mut reader: R) -> io::Result<Self> {
        let size = reader.seek(SeekFrom::End(0))?;
        Ok(ReaderSource {
            reader: Mutex::new(reader),
            size,
        })
    }

    /// Unwraps the reader.
    pub fn into_inner(self) -> R {
        match self.reader.into_inner() {
            Ok(reader) => reader,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl ReaderSource<File> {
    /// Opens a file for reading.
    pub fn open<P: AsRef<std::path::Path>>(path: P) -> io::Result<Self> {
        ReaderSource::new(File::open(path)?)
    }
}

impl<R: Read + Seek + Send> ByteSource for ReaderSource<R> {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_block(&self, offset: u64, length: u64) -> io::Result<Vec<u8>> {
        if !self.contains(offset, length) {
            return Err(out_of_range(offset, length, self.size));
        }

        let len = usize::try_from(length).map_err(|_| out_of_range(offset, length, self.size))?;
        let mut buf = vec![0; len];
        let mut reader = self
            .reader
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "reader lock poisoned"))?;
        reader.seek(SeekFrom::Start(offset))?;
        reader.read_exact(&mut buf)?;
        Ok(buf)
    }
}
