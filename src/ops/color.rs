//! Color space conversion and color temperature.

use std::borrow::Borrow;

use imgref::ImgVec;
use rgb::{Bgr, Bgra};
use serde::{Deserialize, Serialize};

use crate::buffer::Buffer;
use crate::channels::saturate_u8;
use crate::dispatch::WorkUnit;
use crate::error::{Error, Result};
use crate::pixel::{BufferType, PixelData};

/// A channel layout conversion between 8-bit buffer types.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Conversion {
    #[serde(rename = "BGRToGray")]
    BgrToGray,
    #[serde(rename = "GrayToBGR")]
    GrayToBgr,
    #[serde(rename = "BGRToBGRA")]
    BgrToBgra,
    #[serde(rename = "BGRAToBGR")]
    BgraToBgr,
    #[serde(rename = "BGRAToGray")]
    BgraToGray,
    #[serde(rename = "GrayToBGRA")]
    GrayToBgra,
}

impl Conversion {
    /// Buffer type the conversion reads.
    pub fn source(self) -> BufferType {
        match self {
            Conversion::BgrToGray | Conversion::BgrToBgra => BufferType::Bgr8,
            Conversion::GrayToBgr | Conversion::GrayToBgra => BufferType::Gray8,
            Conversion::BgraToBgr | Conversion::BgraToGray => BufferType::Bgra8,
        }
    }

    /// Buffer type the conversion produces.
    pub fn target(self) -> BufferType {
        match self {
            Conversion::BgrToGray | Conversion::BgraToGray => BufferType::Gray8,
            Conversion::GrayToBgr | Conversion::BgraToBgr => BufferType::Bgr8,
            Conversion::BgrToBgra | Conversion::GrayToBgra => BufferType::Bgra8,
        }
    }
}

/// Luma with the BT.601 weights in 14-bit fixed point.
fn luma(b: u8, g: u8, r: u8) -> u8 {
    const B: u32 = 1868;
    const G: u32 = 9617;
    const R: u32 = 4899;
    ((u32::from(b) * B + u32::from(g) * G + u32::from(r) * R + (1 << 13)) >> 14) as u8
}

fn map_pixels<S: Copy, D>(img: &ImgVec<S>, f: impl Fn(S) -> D) -> ImgVec<D> {
    ImgVec::new(
        img.buf().iter().map(|&p| f(p)).collect(),
        img.width(),
        img.height(),
    )
}

fn convert(data: &PixelData, conversion: Conversion) -> Result<PixelData> {
    let out = match (conversion, data) {
        (Conversion::BgrToGray, PixelData::Bgr8(img)) => {
            PixelData::Gray8(map_pixels(img, |p| luma(p.b, p.g, p.r)))
        }
        (Conversion::BgraToGray, PixelData::Bgra8(img)) => {
            PixelData::Gray8(map_pixels(img, |p| luma(p.b, p.g, p.r)))
        }
        (Conversion::GrayToBgr, PixelData::Gray8(img)) => {
            PixelData::Bgr8(map_pixels(img, |v| Bgr { b: v, g: v, r: v }))
        }
        (Conversion::GrayToBgra, PixelData::Gray8(img)) => PixelData::Bgra8(map_pixels(img, |v| {
            Bgra {
                b: v,
                g: v,
                r: v,
                a: 255,
            }
        })),
        (Conversion::BgrToBgra, PixelData::Bgr8(img)) => {
            PixelData::Bgra8(map_pixels(img, |p| Bgra {
                b: p.b,
                g: p.g,
                r: p.r,
                a: 255,
            }))
        }
        (Conversion::BgraToBgr, PixelData::Bgra8(img)) => {
            PixelData::Bgr8(map_pixels(img, |p| Bgr {
                b: p.b,
                g: p.g,
                r: p.r,
            }))
        }
        (conversion, data) => {
            return Err(Error::TypeMismatch {
                expected: conversion.source(),
                actual: data.buffer_type(),
            });
        }
    };
    Ok(out)
}

/// Convert between Gray, BGR and BGRA layouts.
///
/// Gray is computed with the BT.601 luma weights; added alpha is opaque.
pub fn convert_color<'a, B>(buffer: B, conversion: Conversion) -> Result<WorkUnit<'a, Buffer>>
where
    B: Borrow<Buffer> + Send + 'a,
{
    let actual = buffer.borrow().buffer_type();
    if actual != conversion.source() {
        return Err(Error::TypeMismatch {
            expected: conversion.source(),
            actual,
        });
    }
    Ok(WorkUnit::new("convert_color", move || {
        Buffer::from_pixels(convert(buffer.borrow().pixels(), conversion)?)
    }))
}

// ---------------------------------------------------------------------------
// Color temperature
// ---------------------------------------------------------------------------

/// Lowest accepted temperature in kelvin.
pub const MIN_KELVIN: f64 = 1000.0;
/// Highest accepted temperature in kelvin.
pub const MAX_KELVIN: f64 = 40000.0;

fn clamp_round(v: f64) -> u8 {
    v.clamp(0.0, 255.0).round() as u8
}

/// Approximate black-body color of `kelvin`, as `[blue, green, red]`.
fn temperature_to_bgr(kelvin: f64) -> [u8; 3] {
    let t = kelvin / 100.0;
    let red = if t <= 66.0 {
        255
    } else {
        clamp_round(329.698727446 * (t - 60.0).powf(-0.1332047592))
    };
    let green = if t <= 66.0 {
        clamp_round(99.4708025861 * t.ln() - 161.1195681661)
    } else {
        clamp_round(288.1221695283 * (t - 60.0).powf(-0.0755148492))
    };
    let blue = if t >= 66.0 {
        255
    } else {
        clamp_round(138.5177312231 * (t - 10.0).ln() - 305.0447927307)
    };
    [blue, green, red]
}

fn unit_to_u8(v: f32) -> u8 {
    saturate_u8(f64::from(v) * 255.0)
}

/// 8-bit BGR to 8-bit HLS, hue in `0..180`.
fn bgr_to_hls([b, g, r]: [u8; 3]) -> [u8; 3] {
    let (b, g, r) = (
        f32::from(b) / 255.0,
        f32::from(g) / 255.0,
        f32::from(r) / 255.0,
    );
    let vmax = r.max(g).max(b);
    let vmin = r.min(g).min(b);
    let diff = vmax - vmin;
    let l = (vmax + vmin) * 0.5;
    let (mut h, mut s) = (0.0f32, 0.0f32);
    if diff > f32::EPSILON {
        s = if l < 0.5 {
            diff / (vmax + vmin)
        } else {
            diff / (2.0 - vmax - vmin)
        };
        let scale = 60.0 / diff;
        h = if vmax == r {
            (g - b) * scale
        } else if vmax == g {
            (b - r) * scale + 120.0
        } else {
            (r - g) * scale + 240.0
        };
        if h < 0.0 {
            h += 360.0;
        }
    }
    [saturate_u8(f64::from(h * 0.5)), unit_to_u8(l), unit_to_u8(s)]
}

/// 8-bit HLS (hue in `0..180`) back to 8-bit BGR.
fn hls_to_bgr([h, l, s]: [u8; 3]) -> [u8; 3] {
    let (l, s) = (f32::from(l) / 255.0, f32::from(s) / 255.0);
    if s == 0.0 {
        let v = unit_to_u8(l);
        return [v, v, v];
    }
    const SECTORS: [[usize; 3]; 6] = [[1, 3, 0], [1, 0, 2], [3, 0, 1], [0, 2, 1], [0, 1, 3], [2, 1, 0]];
    let p2 = if l <= 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p1 = 2.0 * l - p2;
    let h = (f32::from(h) * (6.0 / 180.0)).rem_euclid(6.0);
    let sector = (h.floor() as usize).min(5);
    let frac = h - sector as f32;
    let tab = [
        p2,
        p1,
        p1 + (p2 - p1) * (1.0 - frac),
        p1 + (p2 - p1) * frac,
    ];
    let [bi, gi, ri] = SECTORS[sector];
    [unit_to_u8(tab[bi]), unit_to_u8(tab[gi]), unit_to_u8(tab[ri])]
}

fn warm_pixel(p: Bgr<u8>, tint: [u8; 3], alpha: f64) -> Bgr<u8> {
    let mix = |t: u8, c: u8| {
        saturate_u8(alpha * f64::from(t)).saturating_add(saturate_u8((1.0 - alpha) * f64::from(c)))
    };
    let blended = [mix(tint[0], p.b), mix(tint[1], p.g), mix(tint[2], p.r)];
    let [_, lightness, _] = bgr_to_hls([p.b, p.g, p.r]);
    let [h, _, s] = bgr_to_hls(blended);
    let [b, g, r] = hls_to_bgr([h, lightness, s]);
    Bgr { b, g, r }
}

/// Shift a BGR buffer toward the color of a black-body radiator at
/// `kelvin`, keeping each pixel's lightness.
///
/// `strength` 1 blends half way toward the tint.
pub fn color_temperature<'a, B>(buffer: B, kelvin: f64, strength: f64) -> Result<WorkUnit<'a, Buffer>>
where
    B: Borrow<Buffer> + Send + 'a,
{
    let actual = buffer.borrow().buffer_type();
    if actual != BufferType::Bgr8 {
        return Err(Error::TypeMismatch {
            expected: BufferType::Bgr8,
            actual,
        });
    }
    if !(MIN_KELVIN..=MAX_KELVIN).contains(&kelvin) {
        return Err(Error::invalid("temperature must be between 1000K and 40000K"));
    }
    if !(0.0..=1.0).contains(&strength) {
        return Err(Error::invalid("strength must be between 0 and 1"));
    }
    Ok(WorkUnit::new("color_temperature", move || {
        let PixelData::Bgr8(img) = buffer.borrow().pixels() else {
            return Err(Error::TypeMismatch {
                expected: BufferType::Bgr8,
                actual: buffer.borrow().buffer_type(),
            });
        };
        let tint = temperature_to_bgr(kelvin);
        let alpha = strength * 0.5;
        Buffer::from_pixels(PixelData::Bgr8(map_pixels(img, |p| warm_pixel(p, tint, alpha))))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BufferSpec, ErrorKind};

    fn gray_ramp() -> Buffer {
        Buffer::from_spec(
            &BufferSpec::new(3, 3)
                .with_type(BufferType::Gray8)
                .with_data(vec![1.0, 2.0, 3.0, 4.0, 5.0, 5.0, 7.0, 8.0, 9.0]),
        )
        .unwrap()
    }

    fn black_gray_white() -> Buffer {
        let plane = [0.0, 0.0, 0.0, 128.0, 128.0, 128.0, 255.0, 255.0, 255.0];
        Buffer::from_spec(
            &BufferSpec::new(3, 3)
                .with_type(BufferType::Bgr8)
                .with_data(plane.repeat(3)),
        )
        .unwrap()
    }

    #[test]
    fn gray_to_bgr_and_back() {
        let bgr = convert_color(&gray_ramp(), Conversion::GrayToBgr)
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(bgr.buffer_type(), BufferType::Bgr8);
        let gray = convert_color(&bgr, Conversion::BgrToGray).unwrap().run().unwrap();
        assert_eq!(gray, gray_ramp());
    }

    #[test]
    fn alpha_conversions() {
        let bgra = convert_color(&gray_ramp(), Conversion::GrayToBgra)
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(&bgra.to_raw_bytes()[..4], &[1, 1, 1, 255]);
        let bgr = convert_color(&bgra, Conversion::BgraToBgr).unwrap().run().unwrap();
        let again = convert_color(&bgr, Conversion::BgrToBgra).unwrap().run().unwrap();
        assert_eq!(again, bgra);
        let gray = convert_color(&bgra, Conversion::BgraToGray).unwrap().run().unwrap();
        assert_eq!(gray, gray_ramp());
    }

    #[test]
    fn luma_weights() {
        assert_eq!(luma(0, 0, 255), 76);
        assert_eq!(luma(0, 255, 0), 150);
        assert_eq!(luma(255, 0, 0), 29);
        assert_eq!(luma(255, 255, 255), 255);
    }

    #[test]
    fn conversion_source_must_match() {
        let err = convert_color(&gray_ramp(), Conversion::BgrToGray).unwrap_err();
        assert_eq!(
            err,
            Error::TypeMismatch {
                expected: BufferType::Bgr8,
                actual: BufferType::Gray8
            }
        );
    }

    #[test]
    fn black_body_colors() {
        assert_eq!(temperature_to_bgr(4000.0), [166, 206, 255]);
        assert_eq!(temperature_to_bgr(6600.0), [255, 255, 255]);
        let cold = temperature_to_bgr(20000.0);
        assert_eq!(cold[0], 255);
        assert!(cold[2] < 255);
    }

    #[test]
    fn hls_of_grays_and_primaries() {
        for v in [0, 128, 255] {
            assert_eq!(bgr_to_hls([v, v, v]), [0, v, 0]);
            assert_eq!(hls_to_bgr([0, v, 0]), [v, v, v]);
        }
        assert_eq!(bgr_to_hls([0, 0, 255]), [0, 128, 255]);
        assert_eq!(bgr_to_hls([0, 255, 0]), [60, 128, 255]);
        assert_eq!(bgr_to_hls([255, 0, 0]), [120, 128, 255]);
    }

    #[test]
    fn warm_shift_keeps_extremes() {
        let out = color_temperature(&black_gray_white(), 4000.0, 1.0)
            .unwrap()
            .run()
            .unwrap();
        let expected: Vec<f64> = [0.0, 0.0, 0.0, 95.0, 95.0, 95.0, 255.0, 255.0, 255.0]
            .into_iter()
            .chain([0.0, 0.0, 0.0, 124.0, 124.0, 124.0, 255.0, 255.0, 255.0])
            .chain([0.0, 0.0, 0.0, 161.0, 161.0, 161.0, 255.0, 255.0, 255.0])
            .collect();
        assert_eq!(out.to_flat_values(), expected);
    }

    #[test]
    fn zero_strength_is_identity_for_grays() {
        let out = color_temperature(&black_gray_white(), 9000.0, 0.0)
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(out, black_gray_white());
    }

    #[test]
    fn temperature_arguments() {
        let img = black_gray_white();
        assert_eq!(
            color_temperature(&img, 999.0, 0.5).unwrap_err().to_string(),
            "temperature must be between 1000K and 40000K"
        );
        assert_eq!(
            color_temperature(&img, 5000.0, 1.5).unwrap_err().to_string(),
            "strength must be between 0 and 1"
        );
        assert_eq!(
            color_temperature(&gray_ramp(), 5000.0, 0.5).unwrap_err().kind(),
            ErrorKind::TypeMismatch
        );
    }
}
