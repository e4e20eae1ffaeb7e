//! The typed 2-D pixel buffer.
//!
//! A [`Buffer`] always has a positive width and height, one of the four
//! [`BufferType`]s, and contiguous storage of exactly
//! `width * height * channels` elements. The only way to obtain one is a
//! constructor that validated its input, so there is no empty state.

use core::fmt;

use imgref::ImgVec;
use rgb::{Bgr, Bgra};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::geom::{Point, Region, Size};
use crate::pixel::{BufferType, PixelData};

/// Options-record form of buffer construction.
///
/// `data`, when present, holds `width * height * channels` numbers. For
/// multi-channel types it is planar: all blue values, then all green, then
/// all red (then all alpha). Without an explicit type, a record with data
/// becomes [`BufferType::Float64`] and one without becomes
/// [`BufferType::Gray8`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BufferSpec {
    pub width: usize,
    pub height: usize,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub buffer_type: Option<BufferType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<f64>>,
}

impl BufferSpec {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            buffer_type: None,
            data: None,
        }
    }

    pub fn with_type(mut self, buffer_type: BufferType) -> Self {
        self.buffer_type = Some(buffer_type);
        self
    }

    pub fn with_data(mut self, data: Vec<f64>) -> Self {
        self.data = Some(data);
        self
    }

    /// The type the record resolves to.
    pub fn resolved_type(&self) -> BufferType {
        match (self.buffer_type, &self.data) {
            (Some(t), _) => t,
            (None, Some(_)) => BufferType::Float64,
            (None, None) => BufferType::Gray8,
        }
    }
}

/// A typed, owned 2-D pixel buffer.
#[derive(Clone, PartialEq)]
pub struct Buffer {
    data: PixelData,
}

impl Buffer {
    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// A zero-filled buffer.
    pub fn new(width: usize, height: usize, buffer_type: BufferType) -> Result<Self> {
        check_dimensions(width, height, buffer_type, POSITIVE_DIMENSIONS)?;
        Ok(Self {
            data: PixelData::zeroed(width, height, buffer_type),
        })
    }

    /// A zero-filled buffer; the type defaults to [`BufferType::Gray8`].
    pub fn with_dimensions(
        width: usize,
        height: usize,
        buffer_type: Option<BufferType>,
    ) -> Result<Self> {
        Self::new(width, height, buffer_type.unwrap_or_default())
    }

    /// A [`BufferType::Float64`] buffer with one row per input row.
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> Result<Self> {
        let Some(first) = rows.first() else {
            return Err(Error::invalid(
                "array passed to Buffer constructor must have at least one element",
            ));
        };
        let cols = first.as_ref().len();
        if cols == 0 {
            return Err(Error::invalid("each row must have at least one element"));
        }
        let mut values = Vec::with_capacity(cols * rows.len());
        for row in rows {
            let row = row.as_ref();
            if row.len() != cols {
                return Err(Error::invalid("all rows must have the same length"));
            }
            values.extend_from_slice(row);
        }
        Ok(Self {
            data: PixelData::Float64(ImgVec::new(values, cols, rows.len())),
        })
    }

    /// Build from an options record.
    pub fn from_spec(spec: &BufferSpec) -> Result<Self> {
        let buffer_type = spec.resolved_type();
        let expected = check_dimensions(
            spec.width,
            spec.height,
            buffer_type,
            "args.width and args.height must be positive integers",
        )?;
        let Some(values) = &spec.data else {
            return Self::new(spec.width, spec.height, buffer_type);
        };
        if values.len() != expected {
            return Err(Error::invalid(
                "args.data must contain args.width * args.height * channels elements",
            ));
        }
        Ok(Self {
            data: crate::channels::from_planar(values, spec.width, spec.height, buffer_type),
        })
    }

    /// Wrap existing typed storage.
    ///
    /// Strided storage, or storage with elements past the last row, is
    /// copied into a tightly packed buffer.
    pub fn from_pixels(data: PixelData) -> Result<Self> {
        check_dimensions(
            data.width(),
            data.height(),
            data.buffer_type(),
            POSITIVE_DIMENSIONS,
        )?;
        Ok(Self {
            data: data.into_contiguous(),
        })
    }

    /// Build from interleaved bytes, the inverse of
    /// [`to_raw_bytes()`](Self::to_raw_bytes).
    pub fn from_raw_bytes(
        width: usize,
        height: usize,
        buffer_type: BufferType,
        bytes: &[u8],
    ) -> Result<Self> {
        let expected = check_dimensions(width, height, buffer_type, POSITIVE_DIMENSIONS)?
            * buffer_type.element_size();
        if bytes.len() != expected {
            return Err(Error::invalid(format!(
                "expected {expected} bytes for a {width}x{height} {buffer_type} buffer, got {}",
                bytes.len()
            )));
        }
        let data = match buffer_type {
            BufferType::Gray8 => PixelData::Gray8(ImgVec::new(bytes.to_vec(), width, height)),
            BufferType::Bgr8 => PixelData::Bgr8(ImgVec::new(
                bytes
                    .chunks_exact(3)
                    .map(|p| Bgr {
                        b: p[0],
                        g: p[1],
                        r: p[2],
                    })
                    .collect(),
                width,
                height,
            )),
            BufferType::Bgra8 => PixelData::Bgra8(ImgVec::new(
                bytes
                    .chunks_exact(4)
                    .map(|p| Bgra {
                        b: p[0],
                        g: p[1],
                        r: p[2],
                        a: p[3],
                    })
                    .collect(),
                width,
                height,
            )),
            BufferType::Float64 => PixelData::Float64(ImgVec::new(
                bytes
                    .chunks_exact(8)
                    .map(|b| {
                        let mut le = [0u8; 8];
                        le.copy_from_slice(b);
                        f64::from_le_bytes(le)
                    })
                    .collect(),
                width,
                height,
            )),
        };
        Ok(Self { data })
    }

    /// Build from a loosely-typed value: an array of numeric arrays, or an
    /// object `{width, height, type?, data?}`.
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Array(rows) => {
                let mut parsed = Vec::with_capacity(rows.len());
                for row in rows {
                    let Value::Array(items) = row else {
                        return Err(Error::invalid("each row must be an array"));
                    };
                    let numbers = items
                        .iter()
                        .map(Value::as_f64)
                        .collect::<Option<Vec<f64>>>()
                        .ok_or_else(|| Error::invalid("all items in the arrays must be numbers"))?;
                    parsed.push(numbers);
                }
                Self::from_rows(&parsed)
            }
            Value::Object(fields) => {
                let dimension = |key: &str| {
                    fields
                        .get(key)
                        .and_then(Value::as_u64)
                        .and_then(|v| usize::try_from(v).ok())
                };
                let (Some(width), Some(height)) = (dimension("width"), dimension("height")) else {
                    return Err(Error::invalid("args.width and args.height must be integers"));
                };
                let buffer_type = match fields.get("type") {
                    None | Some(Value::Null) => None,
                    Some(v) => Some(v.as_str().and_then(BufferType::from_name).ok_or_else(
                        || {
                            Error::invalid(
                                "type must be one of [Gray, BGR, BGRA, Float]",
                            )
                        },
                    )?),
                };
                let data = match fields.get("data") {
                    None | Some(Value::Null) => None,
                    Some(Value::Array(items)) => Some(
                        items
                            .iter()
                            .map(Value::as_f64)
                            .collect::<Option<Vec<f64>>>()
                            .ok_or_else(|| Error::invalid("args.data must contain numbers"))?,
                    ),
                    Some(_) => return Err(Error::invalid("args.data must be an array")),
                };
                Self::from_spec(&BufferSpec {
                    width,
                    height,
                    buffer_type,
                    data,
                })
            }
            _ => Err(Error::invalid(
                "expected either an object with a subset of fields {width, height, type?, data?} or an array of rows",
            )),
        }
    }

    /// The `{width, height, type, data}` record, with `data` from
    /// [`to_flat_values()`](Self::to_flat_values).
    pub fn to_spec(&self) -> BufferSpec {
        BufferSpec {
            width: self.width(),
            height: self.height(),
            buffer_type: Some(self.buffer_type()),
            data: Some(self.to_flat_values()),
        }
    }

    /// [`to_spec()`](Self::to_spec) as a JSON value.
    pub fn to_value(&self) -> Value {
        let mut fields = serde_json::Map::new();
        fields.insert("width".into(), self.width().into());
        fields.insert("height".into(), self.height().into());
        fields.insert("type".into(), self.buffer_type().name().into());
        fields.insert(
            "data".into(),
            Value::Array(
                self.to_flat_values()
                    .into_iter()
                    .map(|v| serde_json::Number::from_f64(v).map_or(Value::Null, Value::Number))
                    .collect(),
            ),
        );
        Value::Object(fields)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn width(&self) -> usize {
        self.data.width()
    }

    pub fn height(&self) -> usize {
        self.data.height()
    }

    pub fn size(&self) -> Size {
        Size::new(self.width(), self.height())
    }

    pub fn buffer_type(&self) -> BufferType {
        self.data.buffer_type()
    }

    pub fn channels(&self) -> usize {
        self.buffer_type().channels()
    }

    /// Storage size in bytes.
    pub fn len_bytes(&self) -> usize {
        let t = self.buffer_type();
        self.width() * self.height() * t.channels() * t.element_size()
    }

    /// Borrow the typed storage.
    pub fn pixels(&self) -> &PixelData {
        &self.data
    }

    /// Mutable storage for in-place operations, which must keep the
    /// variant and dimensions.
    pub(crate) fn pixels_mut(&mut self) -> &mut PixelData {
        &mut self.data
    }

    pub fn into_pixels(self) -> PixelData {
        self.data
    }

    // ------------------------------------------------------------------
    // Regions
    // ------------------------------------------------------------------

    /// Copy out a region into a new, independent buffer.
    pub fn crop(&self, region: Region) -> Result<Buffer> {
        region.check_within("crop", self.size())?;
        let (x, y) = (region.x as usize, region.y as usize);
        let (w, h) = (region.width as usize, region.height as usize);
        let data = match &self.data {
            PixelData::Gray8(img) => PixelData::Gray8(crop_img(img, x, y, w, h)),
            PixelData::Bgr8(img) => PixelData::Bgr8(crop_img(img, x, y, w, h)),
            PixelData::Bgra8(img) => PixelData::Bgra8(crop_img(img, x, y, w, h)),
            PixelData::Float64(img) => PixelData::Float64(crop_img(img, x, y, w, h)),
        };
        Ok(Buffer { data })
    }

    /// Copy `source` into this buffer with its top-left corner at `origin`.
    ///
    /// Nothing is written unless the whole source fits.
    pub fn set(&mut self, source: &Buffer, origin: Point) -> Result<()> {
        if source.buffer_type() != self.buffer_type() {
            return Err(Error::TypeMismatch {
                expected: self.buffer_type(),
                actual: source.buffer_type(),
            });
        }
        Region::at(origin, source.size()).check_within("set", self.size())?;
        let (x, y) = (origin.x as usize, origin.y as usize);
        match (&mut self.data, &source.data) {
            (PixelData::Gray8(dst), PixelData::Gray8(src)) => paste(dst, src, x, y),
            (PixelData::Bgr8(dst), PixelData::Bgr8(src)) => paste(dst, src, x, y),
            (PixelData::Bgra8(dst), PixelData::Bgra8(src)) => paste(dst, src, x, y),
            (PixelData::Float64(dst), PixelData::Float64(src)) => paste(dst, src, x, y),
            (dst, src) => {
                return Err(Error::TypeMismatch {
                    expected: dst.buffer_type(),
                    actual: src.buffer_type(),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Buffer({} {}x{})",
            self.buffer_type(),
            self.width(),
            self.height()
        )
    }
}

impl TryFrom<&BufferSpec> for Buffer {
    type Error = Error;

    fn try_from(spec: &BufferSpec) -> Result<Self> {
        Buffer::from_spec(spec)
    }
}

pub(crate) const POSITIVE_DIMENSIONS: &str = "width and height must be positive integers";

/// Check that both dimensions are positive and that the storage size is
/// addressable. Returns the element count, `width * height * channels`.
pub(crate) fn check_dimensions(
    width: usize,
    height: usize,
    buffer_type: BufferType,
    message: &str,
) -> Result<usize> {
    if width == 0 || height == 0 {
        return Err(Error::invalid(message));
    }
    width
        .checked_mul(height)
        .and_then(|pixels| pixels.checked_mul(buffer_type.channels()))
        .filter(|elements| {
            elements
                .checked_mul(buffer_type.element_size())
                .is_some_and(|bytes| bytes <= isize::MAX as usize)
        })
        .ok_or_else(|| {
            Error::invalid(format!(
                "a {width}x{height} {buffer_type} buffer is too large"
            ))
        })
}

fn crop_img<T: Copy>(img: &ImgVec<T>, x: usize, y: usize, w: usize, h: usize) -> ImgVec<T> {
    let (buf, w, h) = img.sub_image(x, y, w, h).to_contiguous_buf();
    ImgVec::new(buf.into_owned(), w, h)
}

fn paste<T: Copy>(dst: &mut ImgVec<T>, src: &ImgVec<T>, x: usize, y: usize) {
    let w = src.width();
    for (dst_row, src_row) in dst.rows_mut().skip(y).zip(src.rows()) {
        dst_row[x..x + w].copy_from_slice(src_row);
    }
}
