//! Gaussian blur and lookup tables.

use std::borrow::Borrow;

use rayon::prelude::*;

use crate::buffer::Buffer;
use crate::dispatch::WorkUnit;
use crate::error::{Error, Result};
use crate::imaging::{require_8bit, Planes};
use crate::ops::geometry::{border_index, BorderType};
use crate::pixel::BufferType;

/// Options of [`gaussian_blur`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlurOptions {
    /// Kernel width and height; both odd and positive.
    pub kernel_size: (usize, usize),
    /// Horizontal standard deviation. Zero derives it from the kernel width.
    pub sigma_x: f64,
    /// Vertical standard deviation; `None` uses `sigma_x`. Zero derives it
    /// from the kernel height.
    pub sigma_y: Option<f64>,
}

impl Default for BlurOptions {
    fn default() -> Self {
        Self {
            kernel_size: (3, 3),
            sigma_x: 0.0,
            sigma_y: None,
        }
    }
}

impl BlurOptions {
    pub fn with_kernel_size(mut self, width: usize, height: usize) -> Self {
        self.kernel_size = (width, height);
        self
    }

    pub fn with_sigma(mut self, sigma_x: f64, sigma_y: Option<f64>) -> Self {
        self.sigma_x = sigma_x;
        self.sigma_y = sigma_y;
        self
    }

    fn validate(&self) -> Result<()> {
        let (w, h) = self.kernel_size;
        if w % 2 == 0 || h % 2 == 0 {
            return Err(Error::invalid(format!(
                "kernel size must be odd and positive, got {w}x{h}"
            )));
        }
        let sigmas = [self.sigma_x, self.sigma_y.unwrap_or(self.sigma_x)];
        if sigmas.iter().any(|s| !s.is_finite() || *s < 0.0) {
            return Err(Error::invalid(
                "sigma must be a non-negative finite number",
            ));
        }
        Ok(())
    }
}

/// One-dimensional, normalized Gaussian weights.
fn gaussian_kernel(size: usize, sigma: f64) -> Vec<f64> {
    if sigma <= 0.0 {
        match size {
            1 => return vec![1.0],
            3 => return vec![0.25, 0.5, 0.25],
            5 => return vec![0.0625, 0.25, 0.375, 0.25, 0.0625],
            7 => {
                return vec![
                    0.03125, 0.109375, 0.21875, 0.28125, 0.21875, 0.109375, 0.03125,
                ];
            }
            _ => {}
        }
    }
    let sigma = if sigma > 0.0 {
        sigma
    } else {
        ((size as f64 - 1.0) * 0.5 - 1.0) * 0.3 + 0.8
    };
    let mid = (size as f64 - 1.0) * 0.5;
    let weights: Vec<f64> = (0..size)
        .map(|i| {
            let d = i as f64 - mid;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let total: f64 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}

fn convolve_rows(plane: &[f64], width: usize, kernel: &[f64]) -> Vec<f64> {
    let radius = (kernel.len() / 2) as i64;
    let mut out = vec![0.0; plane.len()];
    out.par_chunks_mut(width)
        .zip(plane.par_chunks(width))
        .for_each(|(dst, src)| {
            for (x, value) in dst.iter_mut().enumerate() {
                *value = kernel
                    .iter()
                    .enumerate()
                    .map(|(k, w)| {
                        let p = x as i64 + k as i64 - radius;
                        border_index(p, width, BorderType::Reflect101).map_or(0.0, |i| w * src[i])
                    })
                    .sum();
            }
        });
    out
}

fn convolve_columns(plane: &[f64], width: usize, height: usize, kernel: &[f64]) -> Vec<f64> {
    let radius = (kernel.len() / 2) as i64;
    let mut out = vec![0.0; plane.len()];
    out.par_chunks_mut(width).enumerate().for_each(|(y, dst)| {
        for (k, w) in kernel.iter().enumerate() {
            let p = y as i64 + k as i64 - radius;
            if let Some(row) = border_index(p, height, BorderType::Reflect101) {
                let src = &plane[row * width..(row + 1) * width];
                for (d, s) in dst.iter_mut().zip(src) {
                    *d += w * s;
                }
            }
        }
    });
    out
}

/// Blur with a separable Gaussian kernel. Borders reflect without repeating
/// the edge sample; 8-bit results are rounded and clamped.
pub fn gaussian_blur<'a, B>(buffer: B, options: BlurOptions) -> Result<WorkUnit<'a, Buffer>>
where
    B: Borrow<Buffer> + Send + 'a,
{
    options.validate()?;
    let (kw, kh) = options.kernel_size;
    let kernel_x = gaussian_kernel(kw, options.sigma_x);
    let kernel_y = gaussian_kernel(kh, options.sigma_y.unwrap_or(options.sigma_x));
    Ok(WorkUnit::new("gaussian_blur", move || {
        let mut planes = Planes::from_buffer(buffer.borrow());
        let (width, height) = (planes.width, planes.height);
        for plane in &mut planes.planes {
            let rows = convolve_rows(plane, width, &kernel_x);
            *plane = convolve_columns(&rows, width, height, &kernel_y);
        }
        planes.into_buffer()
    }))
}

/// Replace every 8-bit element `v`, alpha included, with `table[v]`.
///
/// `table` is a Gray8 buffer of 256 elements in any shape.
pub fn lookup<'a, B, L>(buffer: B, table: L) -> Result<WorkUnit<'a, Buffer>>
where
    B: Borrow<Buffer> + Send + 'a,
    L: Borrow<Buffer> + Send + 'a,
{
    {
        let lut = table.borrow();
        if lut.buffer_type() != BufferType::Gray8 || lut.size().area() != 256 {
            return Err(Error::invalid(
                "lookupTable must be a Gray matrix with 256 values",
            ));
        }
    }
    require_8bit(buffer.borrow(), "lookup")?;
    Ok(WorkUnit::new("lookup", move || {
        let source = buffer.borrow();
        let lut = table.borrow().to_raw_bytes();
        let mapped: Vec<u8> = source
            .to_raw_bytes()
            .into_iter()
            .map(|v| lut[usize::from(v)])
            .collect();
        Buffer::from_raw_bytes(
            source.width(),
            source.height(),
            source.buffer_type(),
            &mapped,
        )
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BufferSpec, ErrorKind};

    fn impulse() -> Buffer {
        let mut rows = [[0.0; 5]; 5];
        rows[2][2] = 10.0;
        Buffer::from_rows(&rows).unwrap()
    }

    fn tenths(buffer: &Buffer) -> Vec<f64> {
        buffer
            .to_flat_values()
            .into_iter()
            .map(|v| (v * 10.0).round())
            .collect()
    }

    fn blur(options: BlurOptions) -> Vec<f64> {
        tenths(&gaussian_blur(impulse(), options).unwrap().run().unwrap())
    }

    #[test]
    fn fixed_small_kernels() {
        assert_eq!(gaussian_kernel(3, 0.0), vec![0.25, 0.5, 0.25]);
        let derived = gaussian_kernel(9, 0.0);
        assert_eq!(derived.len(), 9);
        assert!((derived.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(derived[4] > derived[3] && derived[3] > derived[0]);
        assert!((derived[0] - derived[8]).abs() < 1e-15);
    }

    #[test]
    fn blur_5x5() {
        #[rustfmt::skip]
        let expected = vec![
            2.0, 3.0, 5.0, 3.0, 2.0,
            3.0, 6.0, 9.0, 6.0, 3.0,
            5.0, 9.0, 14.0, 9.0, 5.0,
            3.0, 6.0, 9.0, 6.0, 3.0,
            2.0, 3.0, 5.0, 3.0, 2.0,
        ];
        assert_eq!(blur(BlurOptions::default().with_kernel_size(5, 5)), expected);
    }

    #[test]
    fn blur_horizontal_only() {
        let mut expected = vec![0.0; 25];
        expected[10..15].copy_from_slice(&[13.0, 25.0, 38.0, 25.0, 13.0]);
        assert_eq!(blur(BlurOptions::default().with_kernel_size(5, 1)), expected);
    }

    #[test]
    fn blur_with_sigma() {
        #[rustfmt::skip]
        let expected = vec![
            0.0, 1.0, 2.0, 1.0, 0.0,
            1.0, 5.0, 11.0, 5.0, 1.0,
            2.0, 11.0, 25.0, 11.0, 2.0,
            1.0, 5.0, 11.0, 5.0, 1.0,
            0.0, 1.0, 2.0, 1.0, 0.0,
        ];
        let options = BlurOptions::default()
            .with_kernel_size(5, 5)
            .with_sigma(0.8, None);
        assert_eq!(blur(options), expected);
    }

    #[test]
    fn blur_keeps_uniform_8bit() {
        let bgra = Buffer::from_spec(
            &BufferSpec::new(4, 3)
                .with_type(BufferType::Bgra8)
                .with_data(vec![77.0; 48]),
        )
        .unwrap();
        let out = gaussian_blur(&bgra, BlurOptions::default()).unwrap().run().unwrap();
        assert_eq!(out, bgra);
    }

    #[test]
    fn blur_rejects_bad_options() {
        let even = BlurOptions::default().with_kernel_size(4, 3);
        assert_eq!(
            gaussian_blur(impulse(), even).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        let negative = BlurOptions::default().with_sigma(-1.0, None);
        assert!(gaussian_blur(impulse(), negative).is_err());
        let bad_y = BlurOptions::default().with_sigma(1.0, Some(f64::INFINITY));
        assert!(gaussian_blur(impulse(), bad_y).is_err());
    }

    fn table(f: impl Fn(u8) -> u8) -> Buffer {
        let bytes: Vec<u8> = (0..=255u8).map(f).collect();
        Buffer::from_raw_bytes(16, 16, BufferType::Gray8, &bytes).unwrap()
    }

    #[test]
    fn lookup_identity_and_inversion() {
        let bytes = [0, 1, 127, 200, 255, 9];
        let gray = Buffer::from_raw_bytes(3, 2, BufferType::Gray8, &bytes).unwrap();

        let same = lookup(&gray, table(|v| v)).unwrap().run().unwrap();
        assert_eq!(same, gray);

        let inverted = lookup(&gray, table(|v| 255 - v)).unwrap().run().unwrap();
        assert_eq!(inverted.to_raw_bytes(), vec![255, 254, 128, 55, 0, 246]);
    }

    #[test]
    fn lookup_maps_every_channel() {
        let bgra = Buffer::from_raw_bytes(1, 1, BufferType::Bgra8, &[1, 2, 3, 4]).unwrap();
        let out = lookup(bgra, table(|v| v.wrapping_mul(10))).unwrap().run().unwrap();
        assert_eq!(out.buffer_type(), BufferType::Bgra8);
        assert_eq!(out.to_raw_bytes(), vec![10, 20, 30, 40]);
    }

    #[test]
    fn lookup_validation() {
        let gray = Buffer::new(2, 2, BufferType::Gray8).unwrap();
        let short = Buffer::new(255, 1, BufferType::Gray8).unwrap();
        let err = lookup(&gray, &short).unwrap_err();
        assert_eq!(err.to_string(), "lookupTable must be a Gray matrix with 256 values");

        let float_table = Buffer::new(256, 1, BufferType::Float64).unwrap();
        assert!(lookup(&gray, &float_table).is_err());

        let float = Buffer::new(2, 2, BufferType::Float64).unwrap();
        let err = lookup(&float, table(|v| v)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
