//! Decoding of TIFF Images
//!
//! TIFF (Tagged Image File Format) is a versatile image format that supports
//! lossless and lossy compression.
//!
//! Reading happens in two steps. [`decoder::read_contents`] resolves the header and the chain of
//! image file directories into [`Contents`], a queryable model of every tag. A [`Directory`] can
//! then be decoded into an RGB(A) [`Raster`] with [`decoder::decode_directory`], which picks a
//! photometric interpreter and a decompressor from the directory's tags.
//!
//! ```no_run
//! use tiffcore::decoder::{Decoder, ReaderSource};
//!
//! # fn main() -> tiffcore::TiffResult<()> {
//! let decoder = Decoder::new(ReaderSource::open("image.tif")?);
//! let info = decoder.image_info()?;
//! let raster = decoder.decode_first_image()?;
//! assert_eq!((info.width, info.height), raster.dimensions());
//! # Ok(())
//! # }
//! ```
//!
//! # Related Links
//! * <https://web.archive.org/web/20210108073850/https://www.adobe.io/open/standards/TIFF.html> - The TIFF specification

mod contents;
pub mod decoder;
mod directory;
pub mod dump;
pub mod encoder;
mod error;
pub mod info;
pub mod photometric;
mod raster;
pub mod tags;

pub use self::contents::{Contents, Deviation, DeviationKind, FormatCompliance, Header};
pub use self::decoder::ifd::{Field, FieldData, Value};
pub use self::directory::{Directory, ImageData, ImageDataElement};
pub use self::error::{TiffError, TiffFormatError, TiffResult, TiffUnsupportedError};
pub use self::info::{CompressionAlgorithm, ImageInfo};
pub use self::raster::{DefaultRasterFactory, Raster, RasterFactory};
