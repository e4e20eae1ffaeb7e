//! Geometry and color parameter types.
//!
//! [`Region`] is also the bounds validator for every operation that
//! addresses part of a buffer: [`Region::check_within`] either accepts a
//! rectangle or explains, with both extents, why it does not fit.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Width and height of a buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: usize,
    pub height: usize,
}

impl Size {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    /// Total number of pixels.
    pub fn area(self) -> usize {
        self.width * self.height
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// An integer pixel position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i64,
    pub y: i64,
}

impl Point {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

/// A sub-pixel position, used for rotation centers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PointF {
    pub x: f64,
    pub y: f64,
}

impl PointF {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<Point> for PointF {
    fn from(p: Point) -> Self {
        Self {
            x: p.x as f64,
            y: p.y as f64,
        }
    }
}

/// A color with components in blue-green-red storage terms.
///
/// Components are plain numbers; they are saturated to the target range
/// when written into an 8-bit buffer. A missing alpha leaves the alpha
/// channel alone.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub red: f64,
    pub green: f64,
    pub blue: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alpha: Option<f64>,
}

impl Color {
    /// An opaque color without an explicit alpha.
    pub fn rgb(red: f64, green: f64, blue: f64) -> Self {
        Self {
            red,
            green,
            blue,
            alpha: None,
        }
    }

    /// A color with an explicit alpha.
    pub fn rgba(red: f64, green: f64, blue: f64, alpha: f64) -> Self {
        Self {
            red,
            green,
            blue,
            alpha: Some(alpha),
        }
    }

    /// Components in storage order `[blue, green, red, alpha]`, with
    /// `missing_alpha` standing in for an absent alpha.
    pub(crate) fn bgra(self, missing_alpha: f64) -> [f64; 4] {
        [
            self.blue,
            self.green,
            self.red,
            self.alpha.unwrap_or(missing_alpha),
        ]
    }
}

/// A rectangle `(x, y, width, height)` in pixel units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl Region {
    pub fn new(x: i64, y: i64, width: i64, height: i64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The region at `origin` covering `size`.
    pub fn at(origin: Point, size: Size) -> Self {
        Self::new(origin.x, origin.y, size.width as i64, size.height as i64)
    }

    /// Signed area, saturating at the `i64` range.
    pub fn area(&self) -> i64 {
        self.width.saturating_mul(self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// One past the last column, saturating at the `i64` range.
    pub fn right(&self) -> i64 {
        self.x.saturating_add(self.width)
    }

    /// One past the last row, saturating at the `i64` range.
    pub fn bottom(&self) -> i64 {
        self.y.saturating_add(self.height)
    }

    /// Scale position and extent, rounding to the nearest pixel.
    pub fn multiplied_by(&self, x_mul: f64, y_mul: f64) -> Self {
        Self::new(
            (self.x as f64 * x_mul).round() as i64,
            (self.y as f64 * y_mul).round() as i64,
            (self.width as f64 * x_mul).round() as i64,
            (self.height as f64 * y_mul).round() as i64,
        )
    }

    /// Scale the extent only, keeping the origin.
    pub fn scaled_by(&self, x_scale: f64, y_scale: f64) -> Self {
        Self::new(
            self.x,
            self.y,
            (self.width as f64 * x_scale).round() as i64,
            (self.height as f64 * y_scale).round() as i64,
        )
    }

    pub fn moved_by(&self, dx: i64, dy: i64) -> Self {
        Self::new(
            self.x.saturating_add(dx),
            self.y.saturating_add(dy),
            self.width,
            self.height,
        )
    }

    /// Overlap of two regions; an empty region at the origin when they are
    /// disjoint.
    pub fn intersection(&self, other: &Region) -> Self {
        if other.x > self.right()
            || other.right() < self.x
            || other.y > self.bottom()
            || other.bottom() < self.y
        {
            return Self::default();
        }
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        Self::new(x, y, right.saturating_sub(x), bottom.saturating_sub(y))
    }

    /// Smallest region containing both.
    pub fn union(&self, other: &Region) -> Self {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Self::new(x, y, right.saturating_sub(x), bottom.saturating_sub(y))
    }

    /// Apply `f` to every field.
    pub fn map_values(&self, f: impl Fn(i64) -> i64) -> Self {
        Self::new(f(self.x), f(self.y), f(self.width), f(self.height))
    }

    /// Validate that this region lies inside a `bounds`-sized buffer.
    ///
    /// Non-positive extents are an [`Error::InvalidArgument`]; any part
    /// outside the buffer is an [`Error::OutOfBounds`] naming `op`.
    pub fn check_within(&self, op: &'static str, bounds: Size) -> Result<()> {
        if self.width <= 0 || self.height <= 0 {
            return Err(Error::invalid(format!(
                "{op} region must have a positive width and height, got {}x{}",
                self.width, self.height
            )));
        }
        let inside = |start: i64, extent: i64, limit: usize| {
            start >= 0
                && start
                    .checked_add(extent)
                    .is_some_and(|end| i64::try_from(limit).is_ok_and(|limit| end <= limit))
        };
        let fits = inside(self.x, self.width, bounds.width)
            && inside(self.y, self.height, bounds.height);
        if fits {
            Ok(())
        } else {
            Err(Error::OutOfBounds {
                op,
                x: self.x,
                y: self.y,
                right: self.right(),
                bottom: self.bottom(),
                width: bounds.width,
                height: bounds.height,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn edges_and_area() {
        let r = Region::new(1, 2, 3, 4);
        assert_eq!(r.right(), 4);
        assert_eq!(r.bottom(), 6);
        assert_eq!(r.area(), 12);
        assert!(!r.is_empty());
        assert!(Region::new(5, 5, 0, 3).is_empty());
    }

    #[test]
    fn transforms() {
        let r = Region::new(2, 4, 6, 8);
        assert_eq!(r.multiplied_by(0.5, 2.0), Region::new(1, 8, 3, 16));
        assert_eq!(r.scaled_by(2.0, 0.5), Region::new(2, 4, 12, 4));
        assert_eq!(r.moved_by(-2, 1), Region::new(0, 5, 6, 8));
        assert_eq!(r.map_values(|v| v * 10), Region::new(20, 40, 60, 80));
    }

    #[test]
    fn intersection_and_union() {
        let a = Region::new(0, 0, 10, 10);
        let b = Region::new(5, 6, 10, 10);
        assert_eq!(a.intersection(&b), Region::new(5, 6, 5, 4));
        assert_eq!(a.union(&b), Region::new(0, 0, 15, 16));

        let far = Region::new(20, 20, 2, 2);
        assert_eq!(a.intersection(&far), Region::default());
        assert!(a.intersection(&far).is_empty());
    }

    #[test]
    fn check_within_accepts_exact_fit() {
        let bounds = Size::new(3, 3);
        assert!(Region::new(0, 0, 3, 3).check_within("crop", bounds).is_ok());
        assert!(Region::new(2, 2, 1, 1).check_within("crop", bounds).is_ok());
    }

    #[test]
    fn check_within_reports_extents() {
        let err = Region::new(10, 1, 2, 2)
            .check_within("crop", Size::new(3, 3))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "crop (x=10..12, y=1..3) goes outside the buffer bounds (w=3, h=3)"
        );

        let err = Region::new(-1, 0, 1, 1)
            .check_within("set", Size::new(3, 3))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfBounds);
    }

    #[test]
    fn extreme_coordinates_saturate() {
        let r = Region::new(i64::MAX, i64::MIN, i64::MAX, 2);
        assert_eq!(r.right(), i64::MAX);
        assert_eq!(r.bottom(), i64::MIN + 2);
        assert_eq!(Region::new(0, 0, i64::MAX, i64::MAX).area(), i64::MAX);
        assert_eq!(r.moved_by(1, -1), Region::new(i64::MAX, i64::MIN, i64::MAX, 2));

        let bounds = Size::new(3, 3);
        for region in [
            Region::new(i64::MAX, 0, 1, 1),
            Region::new(i64::MAX - 1, 0, 2, 2),
            Region::new(0, 1, i64::MAX, 1),
            Region::new(0, i64::MAX, 1, i64::MAX),
        ] {
            let err = region.check_within("crop", bounds).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::OutOfBounds, "{region:?}");
        }
    }

    #[test]
    fn check_within_rejects_empty_extent() {
        let err = Region::new(0, 0, 0, 2)
            .check_within("crop", Size::new(3, 3))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn color_storage_order() {
        let c = Color::rgb(1.0, 2.0, 3.0);
        assert_eq!(c.bgra(0.0), [3.0, 2.0, 1.0, 0.0]);
        assert_eq!(Color::rgba(1.0, 2.0, 3.0, 4.0).bgra(1.0), [3.0, 2.0, 1.0, 4.0]);
    }

    #[test]
    fn color_deserializes_without_alpha() {
        let c: Color = serde_json::from_str(r#"{"red": 1, "green": 2, "blue": 3}"#).unwrap();
        assert_eq!(c, Color::rgb(1.0, 2.0, 3.0));
    }
}
