use crate::decoder::ifd::Field;
use crate::error::{TiffError, TiffFormatError, TiffResult};
use crate::tags::Tag;

/// One contiguous strip or tile of still-compressed sample bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageDataElement {
    pub offset: u64,
    pub length: u64,
}

/// The strip or tile regions of a directory, together with their geometry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImageData {
    Strips {
        elements: Vec<ImageDataElement>,
        rows_per_strip: u32,
    },
    Tiles {
        elements: Vec<ImageDataElement>,
        tile_width: u32,
        tile_length: u32,
    },
}

impl ImageData {
    pub fn elements(&self) -> &[ImageDataElement] {
        match self {
            ImageData::Strips { elements, .. } | ImageData::Tiles { elements, .. } => elements,
        }
    }

    pub(crate) fn elements_mut(&mut self) -> &mut Vec<ImageDataElement> {
        match self {
            ImageData::Strips { elements, .. } | ImageData::Tiles { elements, .. } => elements,
        }
    }
}

/// An Image File Directory (IFD).
///
/// A directory is an ordered sequence of [`Field`]s as they appear in the file. Tags are not
/// required to be unique: lookups return the first occurrence, [`Directory::find_all`] returns
/// every one of them.
///
/// Directories are built by [`Decoder`](crate::decoder::Decoder) and are read-only afterwards.
#[doc(alias = "IFD")]
#[derive(Clone, Debug, PartialEq)]
pub struct Directory {
    pub(crate) index: usize,
    pub(crate) offset: u64,
    pub(crate) next_ifd: Option<u64>,
    pub(crate) entries: Vec<Field>,
    pub(crate) image_data: Option<ImageData>,
}

impl Directory {
    /// Position of this directory in the IFD chain, starting at zero.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Offset of the directory within the stream.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Offset of the following directory, `None` for the last one.
    pub fn next_ifd(&self) -> Option<u64> {
        self.next_ifd
    }

    /// All fields in file order.
    pub fn entries(&self) -> &[Field] {
        &self.entries
    }

    /// Get the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check if the directory contains a specified tag.
    pub fn contains(&self, tag: Tag) -> bool {
        self.entries.iter().any(|field| field.tag() == tag)
    }

    /// Looks up the first field with the given tag.
    ///
    /// An absent tag is `Ok(None)` unless `required` is set, in which case it is
    /// [`TiffFormatError::RequiredTagNotFound`].
    pub fn find(&self, tag: Tag, required: bool) -> TiffResult<Option<&Field>> {
        match self.entries.iter().find(|field| field.tag() == tag) {
            Some(field) => Ok(Some(field)),
            None if required => Err(TiffFormatError::RequiredTagNotFound(tag).into()),
            None => Ok(None),
        }
    }

    /// Looks up a field that has to be present.
    pub fn get(&self, tag: Tag) -> TiffResult<&Field> {
        self.find(tag, true)?
            .ok_or(TiffError::FormatError(TiffFormatError::RequiredTagNotFound(tag)))
    }

    /// Every field with the given tag, in file order.
    pub fn find_all(&self, tag: Tag) -> impl Iterator<Item = &Field> + '_ {
        self.entries.iter().filter(move |field| field.tag() == tag)
    }

    /// The scalar integer value of an optional tag.
    pub(crate) fn find_int(&self, tag: Tag) -> TiffResult<Option<i64>> {
        self.find(tag, false)?.map(Field::scalar_int).transpose()
    }

    /// The scalar integer value of a required tag.
    pub(crate) fn get_int(&self, tag: Tag) -> TiffResult<i64> {
        self.get(tag)?.scalar_int()
    }

    /// Like [`Directory::get_int`], but the value has to fit a `u32`.
    pub(crate) fn get_u32(&self, tag: Tag) -> TiffResult<u32> {
        Ok(u32::try_from(self.get_int(tag)?)?)
    }

    /// Strip or tile regions recorded in this directory, if the decoder resolved them.
    pub fn image_data(&self) -> Option<&ImageData> {
        self.image_data.as_ref()
    }

    /// Computes the strip or tile regions from the offset and byte count tags.
    ///
    /// Tiles are used when `TileOffsets` is present, strips otherwise. A directory without either
    /// offsets tag has no image data. Offsets and byte counts must have the same number of
    /// values.
    pub fn image_data_layout(&self) -> TiffResult<Option<ImageData>> {
        let tiled = self.contains(Tag::TileOffsets);
        let (offsets_tag, counts_tag) = if tiled {
            (Tag::TileOffsets, Tag::TileByteCounts)
        } else {
            (Tag::StripOffsets, Tag::StripByteCounts)
        };

        let offsets = match self.find(offsets_tag, false)? {
            Some(field) => field.int_array()?,
            None => return Ok(None),
        };
        let byte_counts = self.get(counts_tag)?.int_array()?;

        if offsets.len() != byte_counts.len() {
            return Err(TiffFormatError::InconsistentStripData {
                offsets: offsets.len(),
                byte_counts: byte_counts.len(),
            }
            .into());
        }

        let elements = offsets
            .into_iter()
            .zip(byte_counts)
            .map(|(offset, length)| {
                Ok(ImageDataElement {
                    offset: u64::try_from(offset)?,
                    length: u64::try_from(length)?,
                })
            })
            .collect::<TiffResult<Vec<_>>>()?;

        Ok(Some(if tiled {
            ImageData::Tiles {
                elements,
                tile_width: self.get_u32(Tag::TileWidth)?,
                tile_length: self.get_u32(Tag::TileLength)?,
            }
        } else {
            let height = match self.find_int(Tag::ImageLength)? {
                Some(height) => u32::try_from(height)?,
                None => u32::MAX,
            };
            let rows_per_strip = match self.find_int(Tag::RowsPerStrip)? {
                Some(0) | None => height,
                Some(rows) => u32::try_from(rows).unwrap_or(u32::MAX),
            };
            ImageData::Strips {
                elements,
                rows_per_strip,
            }
        }))
    }

    /// The raw image data regions of this directory.
    ///
    /// Uses the regions recorded by the decoder when present, otherwise computes them from the
    /// offset and byte count tags.
    pub fn raw_image_data_elements(&self) -> TiffResult<Vec<ImageDataElement>> {
        if let Some(data) = &self.image_data {
            return Ok(data.elements().to_vec());
        }
        Ok(self
            .image_data_layout()?
            .map(|data| data.elements().to_vec())
            .unwrap_or_default())
    }
}
