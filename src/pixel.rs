//! Pixel types and the typed storage behind a [`Buffer`](crate::Buffer).
//!
//! Uses `imgref::ImgVec` for 2D pixel data with typed pixels from the `rgb` crate.
//! Storage is always contiguous (stride equals width).

use core::fmt;

use imgref::ImgVec;
use rgb::{Bgr, Bgra};
use serde::{Deserialize, Serialize};

/// Pixel type of a buffer.
///
/// Multi-channel types store blue first, matching the byte order most
/// capture and display surfaces use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BufferType {
    /// One unsigned 8-bit channel.
    #[default]
    #[serde(rename = "Gray")]
    Gray8,
    /// Blue, green, red; 8 bits each.
    #[serde(rename = "BGR")]
    Bgr8,
    /// Blue, green, red, alpha; 8 bits each.
    #[serde(rename = "BGRA")]
    Bgra8,
    /// One 64-bit float channel.
    #[serde(rename = "Float")]
    Float64,
}

impl BufferType {
    /// All buffer types.
    pub const ALL: [BufferType; 4] = [
        BufferType::Gray8,
        BufferType::Bgr8,
        BufferType::Bgra8,
        BufferType::Float64,
    ];

    /// Number of interleaved channels per pixel.
    pub fn channels(self) -> usize {
        match self {
            BufferType::Gray8 | BufferType::Float64 => 1,
            BufferType::Bgr8 => 3,
            BufferType::Bgra8 => 4,
        }
    }

    /// Size of one channel element in bytes.
    pub fn element_size(self) -> usize {
        match self {
            BufferType::Float64 => 8,
            _ => 1,
        }
    }

    /// Whether elements are 8-bit unsigned integers.
    pub fn is_8bit(self) -> bool {
        !matches!(self, BufferType::Float64)
    }

    /// The channels of this type in storage order.
    pub fn channel_order(self) -> &'static [Channel] {
        match self {
            BufferType::Gray8 => &[Channel::Gray],
            BufferType::Bgr8 => &[Channel::Blue, Channel::Green, Channel::Red],
            BufferType::Bgra8 => &[Channel::Blue, Channel::Green, Channel::Red, Channel::Alpha],
            BufferType::Float64 => &[Channel::Float],
        }
    }

    /// Short name used in serialized records (`"Gray"`, `"BGR"`, `"BGRA"`, `"Float"`).
    pub fn name(self) -> &'static str {
        match self {
            BufferType::Gray8 => "Gray",
            BufferType::Bgr8 => "BGR",
            BufferType::Bgra8 => "BGRA",
            BufferType::Float64 => "Float",
        }
    }

    /// Parse a short name as produced by [`name()`](Self::name).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }
}

impl fmt::Display for BufferType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BufferType::Gray8 => "Gray8",
            BufferType::Bgr8 => "Bgr8",
            BufferType::Bgra8 => "Bgra8",
            BufferType::Float64 => "Float64",
        };
        f.write_str(s)
    }
}

/// One component of a pixel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Gray,
    Blue,
    Green,
    Red,
    Alpha,
    Float,
}

fn packed<T: Copy>(img: ImgVec<T>) -> ImgVec<T> {
    let (width, height) = (img.width(), img.height());
    if img.stride() == width && img.buf().len() == width * height {
        return img;
    }
    let buf = img.rows().flat_map(|row| row.iter().copied()).collect();
    ImgVec::new(buf, width, height)
}

/// Typed pixel storage.
///
/// The variant determines both the pixel layout and precision, and is the
/// only place a buffer's type is recorded.
#[derive(Clone)]
pub enum PixelData {
    Gray8(ImgVec<u8>),
    Bgr8(ImgVec<Bgr<u8>>),
    Bgra8(ImgVec<Bgra<u8>>),
    Float64(ImgVec<f64>),
}

impl PixelData {
    /// Zero-filled storage of the given size and type. The caller has
    /// checked that `width * height` does not overflow.
    pub(crate) fn zeroed(width: usize, height: usize, buffer_type: BufferType) -> Self {
        let len = width * height;
        match buffer_type {
            BufferType::Gray8 => PixelData::Gray8(ImgVec::new(vec![0; len], width, height)),
            BufferType::Bgr8 => PixelData::Bgr8(ImgVec::new(
                vec![Bgr { b: 0, g: 0, r: 0 }; len],
                width,
                height,
            )),
            BufferType::Bgra8 => PixelData::Bgra8(ImgVec::new(
                vec![
                    Bgra {
                        b: 0,
                        g: 0,
                        r: 0,
                        a: 0
                    };
                    len
                ],
                width,
                height,
            )),
            BufferType::Float64 => PixelData::Float64(ImgVec::new(vec![0.0; len], width, height)),
        }
    }

    /// The same pixels with `stride == width` and no trailing elements.
    pub(crate) fn into_contiguous(self) -> Self {
        match self {
            PixelData::Gray8(img) => PixelData::Gray8(packed(img)),
            PixelData::Bgr8(img) => PixelData::Bgr8(packed(img)),
            PixelData::Bgra8(img) => PixelData::Bgra8(packed(img)),
            PixelData::Float64(img) => PixelData::Float64(packed(img)),
        }
    }

    /// Image width in pixels.
    pub fn width(&self) -> usize {
        match self {
            PixelData::Gray8(img) => img.width(),
            PixelData::Bgr8(img) => img.width(),
            PixelData::Bgra8(img) => img.width(),
            PixelData::Float64(img) => img.width(),
        }
    }

    /// Image height in pixels.
    pub fn height(&self) -> usize {
        match self {
            PixelData::Gray8(img) => img.height(),
            PixelData::Bgr8(img) => img.height(),
            PixelData::Bgra8(img) => img.height(),
            PixelData::Float64(img) => img.height(),
        }
    }

    /// The pixel type this storage holds.
    pub fn buffer_type(&self) -> BufferType {
        match self {
            PixelData::Gray8(_) => BufferType::Gray8,
            PixelData::Bgr8(_) => BufferType::Bgr8,
            PixelData::Bgra8(_) => BufferType::Bgra8,
            PixelData::Float64(_) => BufferType::Float64,
        }
    }

    /// Interleaved bytes, row by row. Floats are little-endian.
    pub fn as_bytes(&self) -> Vec<u8> {
        match self {
            PixelData::Gray8(img) => img.buf().clone(),
            PixelData::Bgr8(img) => bytemuck::cast_slice::<Bgr<u8>, u8>(img.buf()).to_vec(),
            PixelData::Bgra8(img) => bytemuck::cast_slice::<Bgra<u8>, u8>(img.buf()).to_vec(),
            PixelData::Float64(img) => img.buf().iter().flat_map(|v| v.to_le_bytes()).collect(),
        }
    }
}

impl PartialEq for PixelData {
    fn eq(&self, other: &Self) -> bool {
        if self.width() != other.width() || self.height() != other.height() {
            return false;
        }
        match (self, other) {
            (PixelData::Gray8(a), PixelData::Gray8(b)) => a.buf() == b.buf(),
            (PixelData::Bgr8(a), PixelData::Bgr8(b)) => a.buf() == b.buf(),
            (PixelData::Bgra8(a), PixelData::Bgra8(b)) => a.buf() == b.buf(),
            (PixelData::Float64(a), PixelData::Float64(b)) => a.buf() == b.buf(),
            _ => false,
        }
    }
}

impl fmt::Debug for PixelData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PixelData::{}({}x{})",
            self.buffer_type(),
            self.width(),
            self.height()
        )
    }
}
