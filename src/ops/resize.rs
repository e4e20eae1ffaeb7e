//! Resizing.

use std::borrow::Borrow;

use image::imageops::{self, FilterType};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::buffer::{check_dimensions, Buffer, POSITIVE_DIMENSIONS};
use crate::dispatch::WorkUnit;
use crate::error::{Error, Result};
use crate::geom::Size;
use crate::imaging::{map_storage, require_8bit, StorageImage};

/// Target size of [`resize`].
///
/// Single-dimension forms keep the aspect ratio. Derived dimensions are
/// rounded half to even.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SizeSpec {
    Width(i64),
    Height(i64),
    Exact { width: i64, height: i64 },
    Scale(f64),
    Scales { x: f64, y: f64 },
}

impl SizeSpec {
    /// Parse the loosely typed form: a bare integer width, or an object
    /// with `width`/`height`, `scale`, or `xScale`/`yScale`.
    pub fn from_value(value: &Value) -> Result<Self> {
        if let Some(width) = value.as_i64() {
            return Ok(SizeSpec::Width(width));
        }
        let Some(obj) = value.as_object() else {
            return Err(Error::invalid("sizeSpec must be an integer or an object"));
        };
        let int = |key: &str| obj.get(key).and_then(Value::as_i64);
        let num = |key: &str| obj.get(key).and_then(Value::as_f64);
        let spec = match (int("width"), int("height")) {
            (Some(width), Some(height)) => SizeSpec::Exact { width, height },
            (Some(width), None) => SizeSpec::Width(width),
            (None, Some(height)) => SizeSpec::Height(height),
            (None, None) => match (num("scale"), num("xScale"), num("yScale")) {
                (Some(scale), _, _) => SizeSpec::Scale(scale),
                (None, Some(x), Some(y)) => SizeSpec::Scales { x, y },
                _ => return Err(Error::invalid("sizeSpec must be a valid sizeSpec object")),
            },
        };
        Ok(spec)
    }

    /// Output size for a `source`-sized buffer.
    pub fn target_size(&self, source: Size) -> Result<Size> {
        let (w, h) = (source.width as f64, source.height as f64);
        let (width, height) = match *self {
            SizeSpec::Width(width) => {
                if width <= 0 {
                    return Err(Error::invalid("width must be a positive integer"));
                }
                (width as f64, width as f64 * h / w)
            }
            SizeSpec::Height(height) => {
                if height <= 0 {
                    return Err(Error::invalid("height must be a positive integer"));
                }
                (height as f64 * w / h, height as f64)
            }
            SizeSpec::Exact { width, height } => {
                if width <= 0 || height <= 0 {
                    return Err(Error::invalid("width and height must be a positive integers"));
                }
                (width as f64, height as f64)
            }
            SizeSpec::Scale(scale) => {
                if !is_positive(scale) {
                    return Err(Error::invalid("scale must be positive floating point number"));
                }
                (w * scale, h * scale)
            }
            SizeSpec::Scales { x, y } => {
                if !(is_positive(x) && is_positive(y)) {
                    return Err(Error::invalid(
                        "xScale and yScale must be positive floating point numbers",
                    ));
                }
                (w * x, h * y)
            }
        };
        Ok(Size::new(
            derived_dimension(width, "width")?,
            derived_dimension(height, "height")?,
        ))
    }
}

fn is_positive(v: f64) -> bool {
    v.is_finite() && v > 0.0
}

fn derived_dimension(value: f64, name: &str) -> Result<usize> {
    let rounded = value.round_ties_even();
    if !(1.0..=u32::MAX as f64).contains(&rounded) {
        return Err(Error::invalid(format!(
            "resized {name} must be between 1 and {}, got {rounded}",
            u32::MAX
        )));
    }
    Ok(rounded as usize)
}

/// Resize with a Catmull-Rom cubic filter.
pub fn resize<'a, B>(buffer: B, spec: SizeSpec) -> Result<WorkUnit<'a, Buffer>>
where
    B: Borrow<Buffer> + Send + 'a,
{
    let source = buffer.borrow();
    require_8bit(source, "resize")?;
    let target = spec.target_size(source.size())?;
    check_dimensions(
        target.width,
        target.height,
        source.buffer_type(),
        POSITIVE_DIMENSIONS,
    )?;
    Ok(WorkUnit::new("resize", move || {
        let source = buffer.borrow();
        if source.size() == target {
            return Ok(source.clone());
        }
        let (w, h) = (target.width as u32, target.height as u32);
        let storage = StorageImage::from_buffer(source)?;
        map_storage!(storage, |img| imageops::resize(&img, w, h, FilterType::CatmullRom))
            .into_buffer()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BufferSpec, BufferType, ErrorKind};
    use serde_json::json;

    fn uniform_bgr(width: usize, height: usize, value: f64) -> Buffer {
        Buffer::from_spec(
            &BufferSpec::new(width, height)
                .with_type(BufferType::Bgr8)
                .with_data(vec![value; width * height * 3]),
        )
        .unwrap()
    }

    #[test]
    fn derived_sizes() {
        let src = Size::new(640, 480);
        assert_eq!(SizeSpec::Width(320).target_size(src).unwrap(), Size::new(320, 240));
        assert_eq!(SizeSpec::Height(120).target_size(src).unwrap(), Size::new(160, 120));
        assert_eq!(SizeSpec::Scale(0.5).target_size(src).unwrap(), Size::new(320, 240));
        assert_eq!(
            SizeSpec::Scales { x: 0.5, y: 0.25 }.target_size(src).unwrap(),
            Size::new(320, 120)
        );
        assert_eq!(
            SizeSpec::Exact { width: 128, height: 200 }.target_size(src).unwrap(),
            Size::new(128, 200)
        );
        // 5 * 0.5 = 2.5 rounds to even
        assert_eq!(
            SizeSpec::Scale(0.5).target_size(Size::new(5, 7)).unwrap(),
            Size::new(2, 4)
        );
    }

    #[test]
    fn invalid_specs() {
        let src = Size::new(4, 4);
        let message = |spec: SizeSpec| spec.target_size(src).unwrap_err().to_string();
        assert_eq!(message(SizeSpec::Width(0)), "width must be a positive integer");
        assert_eq!(message(SizeSpec::Height(-3)), "height must be a positive integer");
        assert_eq!(
            message(SizeSpec::Exact { width: 3, height: 0 }),
            "width and height must be a positive integers"
        );
        assert_eq!(
            message(SizeSpec::Scale(-1.0)),
            "scale must be positive floating point number"
        );
        assert_eq!(
            message(SizeSpec::Scales { x: 1.0, y: 0.0 }),
            "xScale and yScale must be positive floating point numbers"
        );
        assert!(SizeSpec::Scale(f64::NAN).target_size(src).is_err());
        assert!(SizeSpec::Width(1).target_size(Size::new(1000, 1)).is_err());
    }

    #[test]
    fn parse_loose_form() {
        assert_eq!(SizeSpec::from_value(&json!(320)).unwrap(), SizeSpec::Width(320));
        assert_eq!(
            SizeSpec::from_value(&json!({"width": 128, "height": 200})).unwrap(),
            SizeSpec::Exact { width: 128, height: 200 }
        );
        assert_eq!(
            SizeSpec::from_value(&json!({"height": 10})).unwrap(),
            SizeSpec::Height(10)
        );
        assert_eq!(
            SizeSpec::from_value(&json!({"scale": 0.5})).unwrap(),
            SizeSpec::Scale(0.5)
        );
        assert_eq!(
            SizeSpec::from_value(&json!({"xScale": 0.5, "yScale": 2})).unwrap(),
            SizeSpec::Scales { x: 0.5, y: 2.0 }
        );
        assert!(SizeSpec::from_value(&json!({})).is_err());
        assert!(SizeSpec::from_value(&json!({"xScale": 0.5})).is_err());
        assert!(SizeSpec::from_value(&json!("big")).is_err());
    }

    #[test]
    fn resize_keeps_type_and_content() {
        let out = resize(uniform_bgr(8, 4, 100.0), SizeSpec::Width(4))
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(out.size(), Size::new(4, 2));
        assert_eq!(out.buffer_type(), BufferType::Bgr8);
        assert!(out.to_raw_bytes().iter().all(|&v| v == 100));

        let gray = Buffer::new(3, 3, BufferType::Gray8).unwrap();
        let out = resize(&gray, SizeSpec::Exact { width: 6, height: 2 })
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(out.size(), Size::new(6, 2));
        assert_eq!(out.buffer_type(), BufferType::Gray8);
    }

    #[test]
    fn float_buffers_are_rejected() {
        let float = Buffer::from_rows(&[[1.0, 2.0]]).unwrap();
        let err = resize(&float, SizeSpec::Scale(2.0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn unaddressable_targets_are_rejected() {
        let pixel = Buffer::new(1, 1, BufferType::Bgr8).unwrap();
        let huge = i64::from(u32::MAX);
        let err = resize(&pixel, SizeSpec::Exact { width: huge, height: huge }).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(err.to_string().ends_with("buffer is too large"), "{err}");
    }
}
