//! Conversion of decoded samples into RGB(A) pixels.
//!
//! The interpreter is chosen from the `PhotometricInterpretation` tag by
//! [`PhotometricInterpreter::select`], which also validates the tags the chosen model needs.

use crate::directory::Directory;
use crate::error::{TiffFormatError, TiffResult, TiffUnsupportedError};
use crate::raster::Raster;
use crate::tags::{PhotometricInterpretation, Tag};

/// Sample geometry shared by every interpreter and data reader.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SampleLayout {
    pub samples_per_pixel: u32,
    pub bits_per_sample: Vec<u32>,
    /// The `Predictor` tag, -1 when absent.
    pub predictor: i64,
    pub width: u32,
    pub height: u32,
}

/// The colorimetric model of one directory.
#[derive(Clone, Debug, PartialEq)]
pub enum Interpretation {
    /// Codes 0 and 1, inverted for 0 (`WhiteIsZero`).
    Bilevel { invert: bool },
    Rgb,
    /// Indexed colour through a 16-bit colour map holding all reds, then greens, then blues.
    Palette { color_map: Vec<i64> },
    Cmyk,
    YCbCr {
        coefficients: [f64; 3],
        reference_black_white: [f64; 6],
        subsampling: (u16, u16),
        positioning: i64,
    },
    CieLab,
    /// Codes 32844 (`y_only`) and 32845.
    LogLuv { y_only: bool },
}

/// Converts the samples of one pixel and stores the result in a raster.
#[derive(Clone, Debug, PartialEq)]
pub struct PhotometricInterpreter {
    interpretation: Interpretation,
    layout: SampleLayout,
}

fn fixed<const N: usize>(directory: &Directory, tag: Tag) -> TiffResult<[f64; N]> {
    let field = directory.get(tag)?;
    let values = field.double_array()?;
    values.try_into().map_err(|_| {
        TiffFormatError::TypeMismatch {
            tag,
            field_type: field.field_type(),
            count: field.count(),
            expected: "a fixed number of values",
        }
        .into()
    })
}

impl PhotometricInterpreter {
    /// Chooses the interpreter for a `PhotometricInterpretation` code.
    ///
    /// `bits_per_pixel` is the summed `BitsPerSample` and sizes the expected colour map of
    /// palette images. Palette images require `ColorMap`, YCbCr images require the coefficient,
    /// subsampling, positioning and reference black/white tags.
    pub fn select(
        directory: &Directory,
        photometric: u16,
        bits_per_pixel: u32,
        layout: SampleLayout,
    ) -> TiffResult<PhotometricInterpreter> {
        let interpretation = match PhotometricInterpretation::from_u16(photometric) {
            Some(PhotometricInterpretation::WhiteIsZero) => Interpretation::Bilevel { invert: true },
            Some(PhotometricInterpretation::BlackIsZero) => {
                Interpretation::Bilevel { invert: false }
            }
            Some(PhotometricInterpretation::RGB) => Interpretation::Rgb,
            Some(PhotometricInterpretation::RGBPalette) => {
                let color_map = directory.get(Tag::ColorMap)?.int_array()?;
                let expected = 1u64
                    .checked_shl(bits_per_pixel)
                    .unwrap_or(u64::MAX)
                    .saturating_mul(3);
                if color_map.len() as u64 != expected {
                    return Err(TiffFormatError::ColorMapSizeMismatch {
                        actual: color_map.len(),
                        expected,
                    }
                    .into());
                }
                Interpretation::Palette { color_map }
            }
            Some(PhotometricInterpretation::CMYK) => Interpretation::Cmyk,
            Some(PhotometricInterpretation::YCbCr) => {
                let coefficients = fixed::<3>(directory, Tag::YCbCrCoefficients)?;
                let positioning = directory.get(Tag::YCbCrPositioning)?.int_array()?;
                let subsampling = directory.get(Tag::YCbCrSubSampling)?;
                let subsampling = match subsampling.int_array()?[..] {
                    [h, v] => (u16::try_from(h)?, u16::try_from(v)?),
                    _ => {
                        return Err(TiffFormatError::TypeMismatch {
                            tag: Tag::YCbCrSubSampling,
                            field_type: subsampling.field_type(),
                            count: subsampling.count(),
                            expected: "two integers",
                        }
                        .into())
                    }
                };
                let reference_black_white = fixed::<6>(directory, Tag::ReferenceBlackWhite)?;
                Interpretation::YCbCr {
                    coefficients,
                    reference_black_white,
                    subsampling,
                    positioning: positioning.first().copied().unwrap_or(1),
                }
            }
            Some(PhotometricInterpretation::CIELab) => Interpretation::CieLab,
            Some(PhotometricInterpretation::LogL) => Interpretation::LogLuv { y_only: true },
            Some(PhotometricInterpretation::LogLuv) => Interpretation::LogLuv { y_only: false },
            _ => {
                return Err(TiffUnsupportedError::UnsupportedInterpretation(photometric).into())
            }
        };

        log::debug!("photometric interpretation {}: {:?}", photometric, interpretation);
        Ok(PhotometricInterpreter {
            interpretation,
            layout,
        })
    }

    pub fn interpretation(&self) -> &Interpretation {
        &self.interpretation
    }

    pub fn layout(&self) -> &SampleLayout {
        &self.layout
    }

    fn bits(&self, index: usize) -> u32 {
        self.layout.bits_per_sample.get(index).copied().unwrap_or(8)
    }

    /// Sample `index` scaled to 8 bits.
    fn scaled(&self, samples: &[u32], index: usize) -> u8 {
        scale_to_u8(sample(samples, index), self.bits(index))
    }

    /// Converts the samples of the pixel at `(x, y)` and stores it into `raster`.
    pub fn convert_and_write(&self, samples: &[u32], x: u32, y: u32, raster: &mut Raster) {
        let rgba = match &self.interpretation {
            Interpretation::Bilevel { invert } => {
                let mut gray = self.scaled(samples, 0);
                if *invert {
                    gray = 255 - gray;
                }
                [gray, gray, gray, 0xff]
            }
            Interpretation::Rgb => {
                let alpha = if raster.has_alpha() {
                    self.scaled(samples, 3)
                } else {
                    0xff
                };
                [
                    self.scaled(samples, 0),
                    self.scaled(samples, 1),
                    self.scaled(samples, 2),
                    alpha,
                ]
            }
            Interpretation::Palette { color_map } => {
                let entries = color_map.len() / 3;
                let index = sample(samples, 0) as usize;
                if index < entries {
                    let high = |v: i64| ((v >> 8) & 0xff) as u8;
                    [
                        high(color_map[index]),
                        high(color_map[index + entries]),
                        high(color_map[index + 2 * entries]),
                        0xff,
                    ]
                } else {
                    [0, 0, 0, 0xff]
                }
            }
            Interpretation::Cmyk => {
                let k = u32::from(self.scaled(samples, 3));
                let channel = |i: usize| 255 - (u32::from(self.scaled(samples, i)) + k).min(255);
                [channel(0) as u8, channel(1) as u8, channel(2) as u8, 0xff]
            }
            Interpretation::YCbCr {
                coefficients,
                reference_black_white,
                ..
            } => {
                let [r, g, b] = ycbcr_to_rgb(
                    [
                        sample(samples, 0),
                        sample(samples, 1),
                        sample(samples, 2),
                    ],
                    coefficients,
                    reference_black_white,
                );
                [r, g, b, 0xff]
            }
            Interpretation::CieLab => {
                let l = self.scaled(samples, 0);
                let a = self.scaled(samples, 1) as i8;
                let b = self.scaled(samples, 2) as i8;
                let [r, g, b] = lab_to_rgb(l, a, b);
                [r, g, b, 0xff]
            }
            Interpretation::LogLuv { y_only } => {
                let l = sample(samples, 0) as u16;
                let y = log16_to_y(l);
                if *y_only {
                    let gray = to_srgb8(y);
                    [gray, gray, gray, 0xff]
                } else {
                    let uvscale = 1.0 / 410.0;
                    let u = uvscale * (sample(samples, 1) as f32 + 0.5);
                    let v = uvscale * (sample(samples, 2) as f32 + 0.5);
                    let [r, g, b] = logluv_to_rgb(y, u, v);
                    [to_srgb8(r), to_srgb8(g), to_srgb8(b), 0xff]
                }
            }
        };

        raster.put_pixel(x, y, rgba);
    }
}

fn sample(samples: &[u32], index: usize) -> u32 {
    samples.get(index).copied().unwrap_or(0)
}

/// Scales a sample of depth `bits` to the range 0..=255.
pub(crate) fn scale_to_u8(sample: u32, bits: u32) -> u8 {
    match bits {
        0 => 0,
        8 => sample as u8,
        b if b > 8 => (sample >> (b - 8)) as u8,
        b => {
            let max = (1u32 << b) - 1;
            ((sample.min(max) * 255 + max / 2) / max) as u8
        }
    }
}

fn clamp_u8(v: f64) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// YCbCr to RGB following TIFF 6.0 section 21.
fn ycbcr_to_rgb(
    [y, cb, cr]: [u32; 3],
    [luma_red, luma_green, luma_blue]: &[f64; 3],
    reference: &[f64; 6],
) -> [u8; 3] {
    let expand = |value: u32, black: f64, white: f64, range: f64| {
        let span = white - black;
        if span == 0.0 {
            0.0
        } else {
            (f64::from(value) - black) * range / span
        }
    };

    let y = expand(y, reference[0], reference[1], 255.0);
    let cb = expand(cb, reference[2], reference[3], 127.0);
    let cr = expand(cr, reference[4], reference[5], 127.0);

    let r = cr * (2.0 - 2.0 * luma_red) + y;
    let b = cb * (2.0 - 2.0 * luma_blue) + y;
    let g = if *luma_green == 0.0 {
        y
    } else {
        (y - luma_blue * b - luma_red * r) / luma_green
    };

    [clamp_u8(r), clamp_u8(g), clamp_u8(b)]
}

/// CIE L*a*b* with a D65 white point to sRGB.
fn lab_to_rgb(l: u8, a: i8, b: i8) -> [u8; 3] {
    const REF_X: f64 = 95.047;
    const REF_Y: f64 = 100.000;
    const REF_Z: f64 = 108.883;

    let l = f64::from(l) * 100.0 / 255.0;
    let fy = (l + 16.0) / 116.0;
    let fx = f64::from(a) / 500.0 + fy;
    let fz = fy - f64::from(b) / 200.0;

    let pivot = |t: f64| {
        let cube = t * t * t;
        if cube > 0.008856 {
            cube
        } else {
            (t - 16.0 / 116.0) / 7.787
        }
    };

    let x = REF_X * pivot(fx) / 100.0;
    let y = REF_Y * pivot(fy) / 100.0;
    let z = REF_Z * pivot(fz) / 100.0;

    let [r, g, b] = xyz_to_rgb([x as f32, y as f32, z as f32]);
    [to_srgb8(r), to_srgb8(g), to_srgb8(b)]
}

/// Luminance of a 16-bit LogL sample.
fn log16_to_y(l: u16) -> f32 {
    if l == 0 {
        return 0.0;
    }

    let le = f32::from(l & 0x7fff);
    //     Y = exp(M_LN2 / 256. * (Le + .5) - M_LN2 * 64.);
    let y = (std::f32::consts::LN_2 / 256.0 * (le + 0.5) - std::f32::consts::LN_2 * 64.0).exp();

    if l & 0x8000 != 0 {
        -y
    } else {
        y
    }
}

fn logluv_to_rgb(by: f32, u: f32, v: f32) -> [f32; 3] {
    let s = 1. / (6. * u - 16. * v + 12.);
    let x = 9. * u * s;
    let y = 4. * v * s;

    let bx = x / y * by;
    let bz = (1. - x - y) / y * by;

    xyz_to_rgb([bx, by, bz])
}

fn xyz_to_rgb([l, u, v]: [f32; 3]) -> [f32; 3] {
    // XYZ to sRGB primaries at D65
    let r = 3.2404542 * l + -1.5371385 * u + -0.4985314 * v;
    let g = -0.969266 * l + 1.8760108 * u + 0.0415560 * v;
    let b = 0.0556434 * l + -0.2040259 * u + 1.0572252 * v;
    [r, g, b]
}

/// Gamma encodes a linear intensity in 0..=1.
fn to_srgb8(linear: f32) -> u8 {
    let c = linear.clamp(0.0, 1.0);
    let encoded = if c <= 0.003_130_8 {
        12.92 * c
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    };
    clamp_u8(f64::from(encoded) * 255.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaling_by_depth() {
        assert_eq!(scale_to_u8(1, 1), 255);
        assert_eq!(scale_to_u8(0, 1), 0);
        assert_eq!(scale_to_u8(15, 4), 255);
        assert_eq!(scale_to_u8(8, 4), 136);
        assert_eq!(scale_to_u8(0xabcd, 16), 0xab);
        assert_eq!(scale_to_u8(200, 8), 200);
    }

    #[test]
    fn ycbcr_neutral_gray() {
        let rgb = ycbcr_to_rgb(
            [128, 128, 128],
            &[0.299, 0.587, 0.114],
            &[0.0, 255.0, 128.0, 255.0, 128.0, 255.0],
        );
        assert_eq!(rgb, [128, 128, 128]);
    }

    #[test]
    fn ycbcr_red() {
        // Full red in BT.601: Y = 76, Cb = 85, Cr = 255.
        let [r, g, b] = ycbcr_to_rgb(
            [76, 85, 255],
            &[0.299, 0.587, 0.114],
            &[0.0, 255.0, 128.0, 255.0, 128.0, 255.0],
        );
        assert!(r >= 250, "{}", r);
        assert!(g <= 5, "{}", g);
        assert!(b <= 5, "{}", b);
    }

    #[test]
    fn lab_extremes() {
        assert_eq!(lab_to_rgb(0, 0, 0), [0, 0, 0]);
        let [r, g, b] = lab_to_rgb(255, 0, 0);
        assert!(r >= 254 && g >= 254 && b >= 254, "{:?}", [r, g, b]);
    }

    #[test]
    fn logl_zero_is_black() {
        assert_eq!(log16_to_y(0), 0.0);
        assert_eq!(to_srgb8(log16_to_y(0)), 0);
        // Le = 64 * 256 encodes Y = 1.
        let one = log16_to_y(64 * 256);
        assert!((one - 1.0).abs() < 0.01, "{}", one);
    }
}
