//! Bridge between buffers and the pixel containers other code works on.
//!
//! [`StorageImage`] hands an 8-bit buffer to the `image` crate.
//! Channel-agnostic operations see a Bgr8 buffer as an `RgbImage` whose
//! first component is blue; only codecs swap blue and red. [`Planes`] is the f64 planar view used by filters that compute in
//! floating point.

use image::{ColorType, DynamicImage, GrayImage, RgbImage, RgbaImage};
use imgref::ImgVec;
use rgb::{Bgr, Bgra};

use crate::buffer::{Buffer, BufferSpec};
use crate::channels::saturate_u8;
use crate::error::{Error, Result};
use crate::pixel::{BufferType, PixelData};

/// Buffer storage in `image` containers, channel order unchanged.
pub(crate) enum StorageImage {
    Gray(GrayImage),
    Bgr(RgbImage),
    Bgra(RgbaImage),
}

/// Apply the same expression to whichever container a [`StorageImage`] holds.
macro_rules! map_storage {
    ($storage:expr, |$img:ident| $body:expr) => {
        match $storage {
            $crate::imaging::StorageImage::Gray($img) => {
                $crate::imaging::StorageImage::Gray($body)
            }
            $crate::imaging::StorageImage::Bgr($img) => $crate::imaging::StorageImage::Bgr($body),
            $crate::imaging::StorageImage::Bgra($img) => {
                $crate::imaging::StorageImage::Bgra($body)
            }
        }
    };
}
pub(crate) use map_storage;

/// Reject Float64 buffers for operations that only handle 8-bit data.
pub(crate) fn require_8bit(buffer: &Buffer, op: &str) -> Result<()> {
    if buffer.buffer_type().is_8bit() {
        Ok(())
    } else {
        Err(Error::invalid(format!(
            "{op} supports Gray, BGR and BGRA buffers, got {}",
            buffer.buffer_type()
        )))
    }
}

fn dims(buffer: &Buffer) -> Result<(u32, u32)> {
    let w = u32::try_from(buffer.width()).map_err(|_| Error::invalid("buffer is too wide"))?;
    let h = u32::try_from(buffer.height()).map_err(|_| Error::invalid("buffer is too tall"))?;
    Ok((w, h))
}

fn container_error() -> Error {
    Error::execution("pixel container does not match its dimensions")
}

impl StorageImage {
    pub(crate) fn from_buffer(buffer: &Buffer) -> Result<Self> {
        let (w, h) = dims(buffer)?;
        match buffer.pixels() {
            PixelData::Gray8(img) => GrayImage::from_raw(w, h, img.buf().clone())
                .map(StorageImage::Gray)
                .ok_or_else(container_error),
            PixelData::Bgr8(img) => {
                RgbImage::from_raw(w, h, bytemuck::cast_slice::<Bgr<u8>, u8>(img.buf()).to_vec())
                    .map(StorageImage::Bgr)
                    .ok_or_else(container_error)
            }
            PixelData::Bgra8(img) => {
                RgbaImage::from_raw(w, h, bytemuck::cast_slice::<Bgra<u8>, u8>(img.buf()).to_vec())
                    .map(StorageImage::Bgra)
                    .ok_or_else(container_error)
            }
            PixelData::Float64(_) => Err(Error::invalid(
                "Float64 buffers have no 8-bit image representation",
            )),
        }
    }

    pub(crate) fn into_buffer(self) -> Result<Buffer> {
        let data = match self {
            StorageImage::Gray(img) => {
                let (w, h) = img.dimensions();
                PixelData::Gray8(ImgVec::new(img.into_raw(), w as usize, h as usize))
            }
            StorageImage::Bgr(img) => {
                let (w, h) = img.dimensions();
                let px = img
                    .into_raw()
                    .chunks_exact(3)
                    .map(|p| Bgr {
                        b: p[0],
                        g: p[1],
                        r: p[2],
                    })
                    .collect();
                PixelData::Bgr8(ImgVec::new(px, w as usize, h as usize))
            }
            StorageImage::Bgra(img) => {
                let (w, h) = img.dimensions();
                let px = img
                    .into_raw()
                    .chunks_exact(4)
                    .map(|p| Bgra {
                        b: p[0],
                        g: p[1],
                        r: p[2],
                        a: p[3],
                    })
                    .collect();
                PixelData::Bgra8(ImgVec::new(px, w as usize, h as usize))
            }
        };
        Buffer::from_pixels(data)
    }
}

fn swap_blue_red(raw: &mut [u8], channels: usize) {
    raw.chunks_exact_mut(channels).for_each(|p| p.swap(0, 2));
}

/// The buffer as a color-correct `DynamicImage` (red first). Float64
/// buffers have no codec representation.
pub(crate) fn to_dynamic(buffer: &Buffer) -> Result<DynamicImage> {
    require_8bit(buffer, "encode")?;
    Ok(match StorageImage::from_buffer(buffer)? {
        StorageImage::Gray(img) => DynamicImage::ImageLuma8(img),
        StorageImage::Bgr(mut img) => {
            swap_blue_red(&mut img, 3);
            DynamicImage::ImageRgb8(img)
        }
        StorageImage::Bgra(mut img) => {
            swap_blue_red(&mut img, 4);
            DynamicImage::ImageRgba8(img)
        }
    })
}

/// The channel layout a decoded image keeps when no type is requested.
pub(crate) fn natural_type(color: ColorType) -> BufferType {
    match (color.has_color(), color.has_alpha()) {
        (_, true) => BufferType::Bgra8,
        (true, false) => BufferType::Bgr8,
        (false, false) => BufferType::Gray8,
    }
}

/// Convert a decoded image into a buffer of the requested type.
pub(crate) fn from_dynamic(img: DynamicImage, requested: Option<BufferType>) -> Result<Buffer> {
    let target = requested.unwrap_or_else(|| natural_type(img.color()));
    let storage = match target {
        BufferType::Gray8 => StorageImage::Gray(img.into_luma8()),
        BufferType::Bgr8 => {
            let mut rgb = img.into_rgb8();
            swap_blue_red(&mut rgb, 3);
            StorageImage::Bgr(rgb)
        }
        BufferType::Bgra8 => {
            let mut rgba = img.into_rgba8();
            swap_blue_red(&mut rgba, 4);
            StorageImage::Bgra(rgba)
        }
        BufferType::Float64 => {
            return Err(Error::invalid("images cannot be decoded into Float64 buffers"));
        }
    };
    storage.into_buffer()
}

/// Planar f64 copy of a buffer: one `width * height` plane per channel, in
/// the buffer's channel order.
pub(crate) struct Planes {
    pub width: usize,
    pub height: usize,
    pub buffer_type: BufferType,
    pub planes: Vec<Vec<f64>>,
}

impl Planes {
    pub(crate) fn from_buffer(buffer: &Buffer) -> Self {
        let (width, height) = (buffer.width(), buffer.height());
        let n = width * height;
        let values = buffer.to_flat_values();
        let planes = values.chunks(n).map(<[f64]>::to_vec).collect();
        Self {
            width,
            height,
            buffer_type: buffer.buffer_type(),
            planes,
        }
    }

    /// An all-zero set of planes with the same layout.
    pub(crate) fn zeroed_like(&self) -> Self {
        Self {
            width: self.width,
            height: self.height,
            buffer_type: self.buffer_type,
            planes: vec![vec![0.0; self.width * self.height]; self.planes.len()],
        }
    }

    /// Back to a buffer; 8-bit values are rounded half to even and clamped.
    pub(crate) fn into_buffer(self) -> Result<Buffer> {
        let values: Vec<f64> = if self.buffer_type.is_8bit() {
            self.planes
                .into_iter()
                .flatten()
                .map(|v| f64::from(saturate_u8(v)))
                .collect()
        } else {
            self.planes.into_iter().flatten().collect()
        };
        Buffer::from_spec(
            &BufferSpec::new(self.width, self.height)
                .with_type(self.buffer_type)
                .with_data(values),
        )
    }
}
