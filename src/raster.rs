//! In-memory RGB(A) pixel buffers.

use crate::decoder::Limits;
use crate::error::{TiffError, TiffResult};

/// An 8-bit RGB or RGBA raster, stored row by row with interleaved channels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Raster {
    width: u32,
    height: u32,
    has_alpha: bool,
    data: Vec<u8>,
}

impl Raster {
    /// Creates a black, fully transparent raster.
    pub fn new(width: u32, height: u32, has_alpha: bool) -> TiffResult<Raster> {
        let len = Raster::byte_len(width, height, has_alpha).ok_or(TiffError::LimitsExceeded)?;
        Ok(Raster {
            width,
            height,
            has_alpha,
            data: vec![0; len],
        })
    }

    /// Wraps existing pixel data, which must hold exactly `width * height` pixels.
    pub fn from_data(width: u32, height: u32, has_alpha: bool, data: Vec<u8>) -> Option<Raster> {
        if Raster::byte_len(width, height, has_alpha)? != data.len() {
            return None;
        }
        Some(Raster {
            width,
            height,
            has_alpha,
            data,
        })
    }

    fn byte_len(width: u32, height: u32, has_alpha: bool) -> Option<usize> {
        let channels = if has_alpha { 4 } else { 3 };
        usize::try_from(width)
            .ok()?
            .checked_mul(usize::try_from(height).ok()?)?
            .checked_mul(channels)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn has_alpha(&self) -> bool {
        self.has_alpha
    }

    /// Number of bytes per pixel, 3 or 4.
    pub fn channels(&self) -> usize {
        if self.has_alpha {
            4
        } else {
            3
        }
    }

    fn index(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some((y as usize * self.width as usize + x as usize) * self.channels())
    }

    /// Stores an RGBA pixel. Alpha is dropped for rasters without an alpha channel, and
    /// coordinates outside the raster are ignored.
    pub fn put_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        let channels = self.channels();
        if let Some(i) = self.index(x, y) {
            self.data[i..i + channels].copy_from_slice(&rgba[..channels]);
        }
    }

    /// The pixel at `(x, y)` as RGBA; opaque for rasters without an alpha channel.
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let i = self.index(x, y)?;
        let mut rgba = [0, 0, 0, 0xff];
        rgba[..self.channels()].copy_from_slice(&self.data[i..i + self.channels()]);
        Some(rgba)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

/// Allocates the raster a directory is decoded into.
pub trait RasterFactory {
    fn allocate(&self, width: u32, height: u32, has_alpha: bool) -> TiffResult<Raster>;
}

/// Allocates plain [`Raster`]s no larger than [`Limits::decoding_buffer_size`].
#[derive(Clone, Debug, Default)]
pub struct DefaultRasterFactory {
    limits: Limits,
}

impl DefaultRasterFactory {
    pub fn new(limits: Limits) -> Self {
        DefaultRasterFactory { limits }
    }
}

impl RasterFactory for DefaultRasterFactory {
    fn allocate(&self, width: u32, height: u32, has_alpha: bool) -> TiffResult<Raster> {
        let len = Raster::byte_len(width, height, has_alpha).ok_or(TiffError::LimitsExceeded)?;
        if len > self.limits.decoding_buffer_size {
            return Err(TiffError::LimitsExceeded);
        }
        Raster::new(width, height, has_alpha)
    }
}
