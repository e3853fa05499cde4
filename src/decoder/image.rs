use log::debug;

use super::data_reader::{DataReader, Decompressor};
use super::predictor::predictor_from_tag;
use super::{ByteSource, Limits};
use crate::directory::Directory;
use crate::error::{TiffFormatError, TiffResult, TiffUnsupportedError};
use crate::photometric::{Interpretation, PhotometricInterpreter, SampleLayout};
use crate::raster::{Raster, RasterFactory};
use crate::tags::{ExtraSamples, FillOrder, PlanarConfiguration, Tag};

/// Decodes one directory into a raster allocated by `factory`.
///
/// Required tags are `PhotometricInterpretation`, `Compression`, `ImageWidth` and
/// `ImageLength`. `SamplesPerPixel` defaults to 1 and `BitsPerSample` to a single 1-bit sample;
/// the number of samples must equal the number of bit depths. Either the whole raster is
/// returned or an error, never a partially decoded image.
pub fn decode_directory<S: ByteSource + ?Sized>(
    source: &S,
    directory: &Directory,
    factory: &dyn RasterFactory,
    limits: &Limits,
) -> TiffResult<Raster> {
    let photometric = directory.get_int(Tag::PhotometricInterpretation)?;
    let compression = directory.get_int(Tag::Compression)?;
    let width_field = directory.get(Tag::ImageWidth)?;
    let width = u32::try_from(width_field.scalar_int()?)?;
    let height = directory.get_u32(Tag::ImageLength)?;

    let samples_per_pixel = u32::try_from(directory.find_int(Tag::SamplesPerPixel)?.unwrap_or(1))?;
    let (bits_per_sample, bits_per_pixel) = match directory.find(Tag::BitsPerSample, false)? {
        Some(field) => (
            field
                .int_array()?
                .into_iter()
                .map(u32::try_from)
                .collect::<Result<Vec<_>, _>>()?,
            u32::try_from(field.int_or_array_sum()?)?,
        ),
        None => (vec![1], samples_per_pixel),
    };
    let predictor = match directory.find(Tag::Predictor, false)? {
        Some(field) => uniform_predictor(&field.int_array()?)?,
        None => -1,
    };

    if samples_per_pixel as usize != bits_per_sample.len() {
        return Err(TiffFormatError::SampleCountMismatch {
            samples_per_pixel,
            bits_per_sample: bits_per_sample.len(),
        }
        .into());
    }
    if bits_per_sample.is_empty() {
        return Err(TiffUnsupportedError::UnsupportedBitsPerSample(0).into());
    }
    if let Some(&bits) = bits_per_sample.iter().find(|&&b| b == 0 || b > 32) {
        return Err(TiffUnsupportedError::UnsupportedBitsPerSample(bits).into());
    }
    if let Some(planar) = directory.find_int(Tag::PlanarConfiguration)? {
        if planar == i64::from(PlanarConfiguration::Planar.to_u16()) {
            return Err(TiffUnsupportedError::UnsupportedPlanarConfig(2).into());
        }
    }

    let photometric =
        u16::try_from(photometric).map_err(|_| TiffUnsupportedError::UnsupportedInterpretation(u16::MAX))?;
    let has_alpha = photometric == 2 && has_alpha_sample(directory)?;

    debug!(
        "decoding IFD {}: {}x{}, photometric {}, compression {}, {} x {:?} bits",
        directory.index(),
        width,
        height,
        photometric,
        compression,
        samples_per_pixel,
        bits_per_sample
    );

    let mut raster = factory.allocate(width, height, has_alpha)?;

    let layout = SampleLayout {
        samples_per_pixel,
        bits_per_sample,
        predictor,
        width,
        height,
    };
    let interpreter = PhotometricInterpreter::select(directory, photometric, bits_per_pixel, layout)?;
    let decompressor = Decompressor::select(directory, compression, photometric)?;

    if let Interpretation::YCbCr {
        subsampling: (h, v),
        ..
    } = *interpreter.interpretation()
    {
        if (h, v) != (1, 1) && !decompressor.upsamples_chroma() {
            return Err(TiffUnsupportedError::ChromaSubsampling(h, v).into());
        }
    }

    let image_data = match directory.image_data() {
        Some(data) => Some(data.clone()),
        None => directory.image_data_layout()?,
    };
    let image_data = match image_data {
        Some(data) if !data.elements().is_empty() => data,
        _ => return Err(TiffFormatError::NoImageData.into()),
    };

    let fill_order = match directory.find_int(Tag::FillOrder)? {
        Some(2) => FillOrder::LsbFirst,
        _ => FillOrder::MsbFirst,
    };

    let reader = DataReader {
        source,
        decompressor,
        interpreter: &interpreter,
        byte_order: width_field.byte_order(),
        fill_order,
        predictor: predictor_from_tag(predictor)?,
        limits,
    };
    reader.decode(&image_data, &mut raster)?;

    debug!("decoded IFD {}", directory.index());
    Ok(raster)
}

/// Some writers store one predictor per sample; all of them must agree.
fn uniform_predictor(values: &[i64]) -> TiffResult<i64> {
    match values.split_first() {
        None => Ok(-1),
        Some((&first, rest)) => match rest.iter().find(|&&v| v != first) {
            Some(&other) => Err(TiffFormatError::UnknownPredictor(
                u16::try_from(other).unwrap_or(u16::MAX),
            )
            .into()),
            None => Ok(first),
        },
    }
}

/// `true` if `ExtraSamples` declares an associated or unassociated alpha sample.
fn has_alpha_sample(directory: &Directory) -> TiffResult<bool> {
    let extra = match directory.find(Tag::ExtraSamples, false)? {
        Some(field) => field.int_array()?,
        None => return Ok(false),
    };
    Ok(extra.iter().any(|&code| {
        code == i64::from(ExtraSamples::AssociatedAlpha.to_u16())
            || code == i64::from(ExtraSamples::UnassociatedAlpha.to_u16())
    }))
}
