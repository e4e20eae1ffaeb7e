//! Affine warps, rotation and flips.
//!
//! Warps map every output pixel back through the inverted transform and
//! sample the source with a 4x4 bicubic kernel. Source coordinates are
//! snapped to 1/32 of a pixel before sampling.

use std::borrow::Borrow;

use imgref::ImgVec;
use rayon::prelude::*;

use crate::buffer::Buffer;
use crate::dispatch::WorkUnit;
use crate::error::{Error, Result};
use crate::geom::PointF;
use crate::imaging::Planes;
use crate::pixel::{BufferType, PixelData};

/// Subpixel positions per pixel used when sampling.
const SUBPIXEL_STEPS: i64 = 32;

/// Bicubic sharpness.
const CUBIC_A: f64 = -0.75;

/// How samples outside the source are produced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BorderType {
    /// Every outside sample is [`WarpOptions::border_value`].
    #[default]
    Constant,
    /// `fedcba|abcdefgh|hgfedcb`
    Reflect,
    /// `gfedcb|abcdefgh|gfedcba`
    Reflect101,
    /// `aaaaaa|abcdefgh|hhhhhhh`
    Replicate,
    /// `cdefgh|abcdefgh|abcdefg`
    Wrap,
}

/// Resolve coordinate `p` along an axis of `len` samples. `None` means the
/// constant border value.
pub(crate) fn border_index(p: i64, len: usize, border: BorderType) -> Option<usize> {
    let n = len as i64;
    if (0..n).contains(&p) {
        return Some(p as usize);
    }
    let index = match border {
        BorderType::Constant => return None,
        BorderType::Replicate => p.clamp(0, n - 1),
        BorderType::Wrap => p.rem_euclid(n),
        _ if n == 1 => 0,
        BorderType::Reflect => {
            let m = p.rem_euclid(2 * n);
            if m < n { m } else { 2 * n - 1 - m }
        }
        BorderType::Reflect101 => {
            let period = 2 * n - 2;
            let m = p.rem_euclid(period);
            if m < n { m } else { period - m }
        }
    };
    Some(index as usize)
}

/// Options of [`warp_affine`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct WarpOptions {
    pub border: BorderType,
    /// Value of outside samples when `border` is [`BorderType::Constant`],
    /// applied to every channel.
    pub border_value: f64,
}

impl WarpOptions {
    pub fn with_border(mut self, border: BorderType) -> Self {
        self.border = border;
        self
    }

    pub fn with_border_value(mut self, value: f64) -> Self {
        self.border_value = value;
        self
    }
}

/// A 2x3 affine matrix, row-major: `[a, b, c, d, e, f]` maps `(x, y)` to
/// `(a*x + b*y + c, d*x + e*y + f)`.
type Affine = [f64; 6];

fn affine_from_buffer(transform: &Buffer) -> Result<Affine> {
    if transform.buffer_type() != BufferType::Float64
        || transform.width() != 3
        || transform.height() != 2
    {
        return Err(Error::invalid("transformation must be a 3x2 float matrix"));
    }
    let values = transform.to_flat_values();
    let mut m = [0.0; 6];
    m.copy_from_slice(&values);
    if m.iter().any(|v| !v.is_finite()) {
        return Err(Error::invalid("transformation must contain finite values"));
    }
    Ok(m)
}

fn invert(m: &Affine) -> Result<Affine> {
    let det = m[0] * m[4] - m[1] * m[3];
    if det == 0.0 {
        return Err(Error::invalid("transformation is not invertible"));
    }
    let d = 1.0 / det;
    let (a, b) = (m[4] * d, -m[1] * d);
    let (c, e) = (-m[3] * d, m[0] * d);
    Ok([a, b, -a * m[2] - b * m[5], c, e, -c * m[2] - e * m[5]])
}

/// Split a coordinate into its integer pixel and subpixel step.
fn snap(v: f64) -> (i64, usize) {
    let limit = (1i64 << 40) as f64;
    let q = (v * SUBPIXEL_STEPS as f64 + 0.5).floor().clamp(-limit, limit) as i64;
    (
        q.div_euclid(SUBPIXEL_STEPS),
        q.rem_euclid(SUBPIXEL_STEPS) as usize,
    )
}

fn cubic_weights(step: usize) -> [f64; 4] {
    let x = step as f64 / SUBPIXEL_STEPS as f64;
    let a = CUBIC_A;
    let w0 = ((a * (x + 1.0) - 5.0 * a) * (x + 1.0) + 8.0 * a) * (x + 1.0) - 4.0 * a;
    let w1 = ((a + 2.0) * x - (a + 3.0)) * x * x + 1.0;
    let w2 = ((a + 2.0) * (1.0 - x) - (a + 3.0)) * (1.0 - x) * (1.0 - x) + 1.0;
    [w0, w1, w2, 1.0 - w0 - w1 - w2]
}

struct Sampler<'p> {
    plane: &'p [f64],
    width: usize,
    height: usize,
    options: WarpOptions,
}

impl Sampler<'_> {
    fn at(&self, x: f64, y: f64) -> f64 {
        let (ix, sx) = snap(x);
        let (iy, sy) = snap(y);
        let (wx, wy) = (cubic_weights(sx), cubic_weights(sy));
        let mut sum = 0.0;
        for (j, wr) in wy.iter().enumerate() {
            let row = border_index(iy - 1 + j as i64, self.height, self.options.border);
            for (i, wc) in wx.iter().enumerate() {
                let col = border_index(ix - 1 + i as i64, self.width, self.options.border);
                let v = match (row, col) {
                    (Some(r), Some(c)) => self.plane[r * self.width + c],
                    _ => self.options.border_value,
                };
                sum += wr * wc * v;
            }
        }
        sum
    }
}

fn warp_buffer(source: &Buffer, inverse: &Affine, options: WarpOptions) -> Result<Buffer> {
    let src = Planes::from_buffer(source);
    let mut out = src.zeroed_like();
    let (width, height) = (src.width, src.height);
    for (plane, dst) in src.planes.iter().zip(out.planes.iter_mut()) {
        let sampler = Sampler {
            plane,
            width,
            height,
            options,
        };
        dst.par_chunks_mut(width).enumerate().for_each(|(y, row)| {
            let y = y as f64;
            for (x, value) in row.iter_mut().enumerate() {
                let x = x as f64;
                let sx = inverse[0] * x + inverse[1] * y + inverse[2];
                let sy = inverse[3] * x + inverse[4] * y + inverse[5];
                *value = sampler.at(sx, sy);
            }
        });
    }
    out.into_buffer()
}

/// Apply an affine transform, given as a 3x2 Float64 buffer. The output has
/// the input's size and type; 8-bit results are rounded and clamped.
pub fn warp_affine<'a, B>(
    buffer: B,
    transform: &Buffer,
    options: WarpOptions,
) -> Result<WorkUnit<'a, Buffer>>
where
    B: Borrow<Buffer> + Send + 'a,
{
    let inverse = invert(&affine_from_buffer(transform)?)?;
    Ok(WorkUnit::new("warp_affine", move || {
        warp_buffer(buffer.borrow(), &inverse, options)
    }))
}

/// The 3x2 Float64 matrix rotating by `angle` degrees (counter-clockwise on
/// screen) around `center`, then scaling by `scale`.
pub fn rotation_matrix(center: PointF, angle: f64, scale: f64) -> Result<Buffer> {
    if ![center.x, center.y, angle, scale].iter().all(|v| v.is_finite()) {
        return Err(Error::invalid(
            "center, angle and scale must be finite numbers",
        ));
    }
    let radians = angle.to_radians();
    let (a, b) = (radians.cos() * scale, radians.sin() * scale);
    Buffer::from_rows(&[
        [a, b, (1.0 - a) * center.x - b * center.y],
        [-b, a, b * center.x + (1.0 - a) * center.y],
    ])
}

/// Arguments of [`rotate`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RotateSpec {
    /// Degrees, counter-clockwise.
    pub angle: f64,
    /// Defaults to `(width / 2, height / 2)` rounded down.
    pub center: Option<PointF>,
}

impl RotateSpec {
    pub fn new(angle: f64) -> Self {
        Self {
            angle,
            center: None,
        }
    }

    pub fn with_center(mut self, center: PointF) -> Self {
        self.center = Some(center);
        self
    }
}

impl From<f64> for RotateSpec {
    fn from(angle: f64) -> Self {
        Self::new(angle)
    }
}

/// Rotate within the buffer's own frame; corners that leave it are cut off
/// and uncovered areas are zero.
pub fn rotate<'a, B>(buffer: B, spec: impl Into<RotateSpec>) -> Result<WorkUnit<'a, Buffer>>
where
    B: Borrow<Buffer> + Send + 'a,
{
    let spec = spec.into();
    let center = spec.center.unwrap_or_else(|| {
        let source = buffer.borrow();
        PointF::new((source.width() / 2) as f64, (source.height() / 2) as f64)
    });
    let matrix = rotation_matrix(center, spec.angle, 1.0)?;
    warp_affine(buffer, &matrix, WarpOptions::default())
}

fn flip_rows<T: Copy>(img: &ImgVec<T>) -> ImgVec<T> {
    let w = img.width();
    let buf = img
        .buf()
        .chunks(img.stride())
        .rev()
        .flat_map(|row| row[..w].iter().copied())
        .collect();
    ImgVec::new(buf, w, img.height())
}

fn flip_columns<T: Copy>(img: &ImgVec<T>) -> ImgVec<T> {
    let buf = img
        .rows()
        .flat_map(|row| row.iter().rev().copied())
        .collect();
    ImgVec::new(buf, img.width(), img.height())
}

fn flipped(buffer: &Buffer, vertical: bool) -> Result<Buffer> {
    macro_rules! flip {
        ($img:expr) => {
            if vertical { flip_rows($img) } else { flip_columns($img) }
        };
    }
    let data = match buffer.pixels() {
        PixelData::Gray8(img) => PixelData::Gray8(flip!(img)),
        PixelData::Bgr8(img) => PixelData::Bgr8(flip!(img)),
        PixelData::Bgra8(img) => PixelData::Bgra8(flip!(img)),
        PixelData::Float64(img) => PixelData::Float64(flip!(img)),
    };
    Buffer::from_pixels(data)
}

/// Mirror top to bottom.
pub fn flip_up_down<'a, B>(buffer: B) -> Result<WorkUnit<'a, Buffer>>
where
    B: Borrow<Buffer> + Send + 'a,
{
    Ok(WorkUnit::new("flip_up_down", move || {
        flipped(buffer.borrow(), true)
    }))
}

/// Mirror left to right.
pub fn flip_left_right<'a, B>(buffer: B) -> Result<WorkUnit<'a, Buffer>>
where
    B: Borrow<Buffer> + Send + 'a,
{
    Ok(WorkUnit::new("flip_left_right", move || {
        flipped(buffer.borrow(), false)
    }))
}
