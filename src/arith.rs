//! Elementwise in-place arithmetic on buffers.
//!
//! 8-bit results are rounded half to even and saturated to `0..=255`.
//! Float64 buffers use plain IEEE arithmetic.

use std::sync::Arc;

use imgref::ImgVec;
use rgb::{Bgr, Bgra};

use crate::buffer::Buffer;
use crate::channels::saturate_u8;
use crate::error::{Error, Result};
use crate::geom::Color;
use crate::pixel::PixelData;

/// Right-hand side of [`Buffer::add`] and [`Buffer::mul`].
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    /// Applied to every channel of every pixel.
    Scalar(f64),
    /// Applied per channel: blue, green, red, alpha. Single-channel buffers
    /// use the blue component. A missing alpha leaves alpha unchanged.
    Color(Color),
    /// Elementwise; must match the receiver's type and size.
    Buffer(Arc<Buffer>),
}

impl From<f64> for Operand {
    fn from(v: f64) -> Self {
        Operand::Scalar(v)
    }
}

impl From<Color> for Operand {
    fn from(c: Color) -> Self {
        Operand::Color(c)
    }
}

impl From<Buffer> for Operand {
    fn from(b: Buffer) -> Self {
        Operand::Buffer(Arc::new(b))
    }
}

impl From<Arc<Buffer>> for Operand {
    fn from(b: Arc<Buffer>) -> Self {
        Operand::Buffer(b)
    }
}

impl From<&Buffer> for Operand {
    fn from(b: &Buffer) -> Self {
        Operand::Buffer(Arc::new(b.clone()))
    }
}

#[derive(Clone, Copy)]
enum Op {
    Add,
    Mul,
}

impl Op {
    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            Op::Add => a + b,
            Op::Mul => a * b,
        }
    }

    /// Operand value that leaves a channel unchanged.
    fn identity(self) -> f64 {
        match self {
            Op::Add => 0.0,
            Op::Mul => 1.0,
        }
    }
}

impl Buffer {
    /// Add `operand` to every element in place.
    pub fn add(&mut self, operand: impl Into<Operand>) -> Result<()> {
        self.combine(Op::Add, &operand.into())
    }

    /// Multiply every element by `operand` in place.
    pub fn mul(&mut self, operand: impl Into<Operand>) -> Result<()> {
        self.combine(Op::Mul, &operand.into())
    }

    /// Check that `operand` can be combined with this buffer, without
    /// touching either.
    pub fn check_operand(&self, operand: &Operand) -> Result<()> {
        if let Operand::Buffer(other) = operand {
            if other.buffer_type() != self.buffer_type() {
                return Err(Error::TypeMismatch {
                    expected: self.buffer_type(),
                    actual: other.buffer_type(),
                });
            }
            if other.size() != self.size() {
                return Err(Error::SizeMismatch {
                    expected: self.size(),
                    actual: other.size(),
                });
            }
        }
        Ok(())
    }

    fn combine(&mut self, op: Op, operand: &Operand) -> Result<()> {
        self.check_operand(operand)?;
        match operand {
            Operand::Scalar(v) => broadcast(self.pixels_mut(), op, [*v; 4]),
            Operand::Color(c) => broadcast(self.pixels_mut(), op, c.bgra(op.identity())),
            Operand::Buffer(other) => elementwise(self.pixels_mut(), op, other.pixels()),
        }
        Ok(())
    }
}

fn broadcast(data: &mut PixelData, op: Op, [b, g, r, a]: [f64; 4]) {
    let u = |x: u8, v: f64| saturate_u8(op.apply(x as f64, v));
    match data {
        PixelData::Gray8(img) => img.buf_mut().iter_mut().for_each(|x| *x = u(*x, b)),
        PixelData::Float64(img) => img.buf_mut().iter_mut().for_each(|x| *x = op.apply(*x, b)),
        PixelData::Bgr8(img) => img.buf_mut().iter_mut().for_each(|p| {
            *p = Bgr {
                b: u(p.b, b),
                g: u(p.g, g),
                r: u(p.r, r),
            }
        }),
        PixelData::Bgra8(img) => img.buf_mut().iter_mut().for_each(|p| {
            *p = Bgra {
                b: u(p.b, b),
                g: u(p.g, g),
                r: u(p.r, r),
                a: u(p.a, a),
            }
        }),
    }
}

fn elementwise(data: &mut PixelData, op: Op, other: &PixelData) {
    let u = |x: u8, y: u8| saturate_u8(op.apply(x as f64, y as f64));
    match (data, other) {
        (PixelData::Gray8(dst), PixelData::Gray8(src)) => zip_with(dst, src, |x, y| u(x, y)),
        (PixelData::Float64(dst), PixelData::Float64(src)) => {
            zip_with(dst, src, |x, y| op.apply(x, y))
        }
        (PixelData::Bgr8(dst), PixelData::Bgr8(src)) => zip_with(dst, src, |x, y| Bgr {
            b: u(x.b, y.b),
            g: u(x.g, y.g),
            r: u(x.r, y.r),
        }),
        (PixelData::Bgra8(dst), PixelData::Bgra8(src)) => zip_with(dst, src, |x, y| Bgra {
            b: u(x.b, y.b),
            g: u(x.g, y.g),
            r: u(x.r, y.r),
            a: u(x.a, y.a),
        }),
        // Types are checked by `check_operand` before we get here.
        _ => {}
    }
}

fn zip_with<T: Copy>(dst: &mut ImgVec<T>, src: &ImgVec<T>, f: impl Fn(T, T) -> T) {
    for (x, &y) in dst.buf_mut().iter_mut().zip(src.buf().iter()) {
        *x = f(*x, y);
    }
}
