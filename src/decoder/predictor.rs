use crate::error::{TiffFormatError, TiffResult, TiffUnsupportedError};
use crate::tags::Predictor;

/// Maps the `Predictor` tag value (-1 when absent) to the predictor to undo.
pub fn predictor_from_tag(value: i64) -> TiffResult<Predictor> {
    match value {
        -1 => Ok(Predictor::None),
        v => match u16::try_from(v).ok().and_then(Predictor::from_u16) {
            Some(Predictor::FloatingPoint) => {
                Err(TiffUnsupportedError::FloatingPointPredictor.into())
            }
            Some(predictor) => Ok(predictor),
            None => Err(TiffFormatError::UnknownPredictor(u16::try_from(v).unwrap_or(u16::MAX)).into()),
        },
    }
}

fn mask(bits: u32) -> u32 {
    if bits >= 32 {
        u32::MAX
    } else {
        (1 << bits) - 1
    }
}

/// Undoes horizontal differencing on one row of unpacked samples.
///
/// Each sample is the difference to the same sample of the previous pixel, modulo its depth.
pub fn rev_hpredict_nsamp(row: &mut [u32], bits_per_sample: &[u32]) {
    let samples = bits_per_sample.len();
    if samples == 0 {
        return;
    }
    for col in samples..row.len() {
        let prev_pixel = row[col - samples];
        let sample = &mut row[col];
        *sample = sample.wrapping_add(prev_pixel) & mask(bits_per_sample[col % samples]);
    }
}
