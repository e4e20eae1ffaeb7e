//! Line and rectangle drawing.
//!
//! Shapes are rasterized by `imageproc` directly into the buffer's storage
//! through a [`Canvas`] view, so every buffer type can be drawn on.

use std::borrow::BorrowMut;

use image::{Luma, Rgb, Rgba};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut,
    BresenhamLineIter, Canvas,
};
use imageproc::rect::Rect;
use imgref::ImgVec;
use rgb::{Bgr, Bgra};

use crate::buffer::Buffer;
use crate::channels::saturate_u8;
use crate::dispatch::WorkUnit;
use crate::error::{Error, Result};
use crate::geom::{Color, Point, Region};
use crate::pixel::PixelData;

/// Thickest stroke accepted.
pub const MAX_THICKNESS: i32 = 32767;

/// Storage element that can be handed to `imageproc` as a pixel.
trait Ink: Copy {
    type Pixel: image::Pixel;

    fn to_pixel(self) -> Self::Pixel;
    fn from_pixel(pixel: Self::Pixel) -> Self;
    /// Pick the components this element stores from `[b, g, r, a]`.
    fn from_bgra(bgra: [f64; 4]) -> Self;
}

impl Ink for u8 {
    type Pixel = Luma<u8>;

    fn to_pixel(self) -> Luma<u8> {
        Luma([self])
    }

    fn from_pixel(pixel: Luma<u8>) -> Self {
        pixel.0[0]
    }

    fn from_bgra([b, ..]: [f64; 4]) -> Self {
        saturate_u8(b)
    }
}

impl Ink for f64 {
    type Pixel = Luma<f64>;

    fn to_pixel(self) -> Luma<f64> {
        Luma([self])
    }

    fn from_pixel(pixel: Luma<f64>) -> Self {
        pixel.0[0]
    }

    fn from_bgra([b, ..]: [f64; 4]) -> Self {
        b
    }
}

// Three- and four-channel pixels keep storage order inside the `image`
// pixel: component 0 is blue.
impl Ink for Bgr<u8> {
    type Pixel = Rgb<u8>;

    fn to_pixel(self) -> Rgb<u8> {
        Rgb([self.b, self.g, self.r])
    }

    fn from_pixel(Rgb([b, g, r]): Rgb<u8>) -> Self {
        Bgr { b, g, r }
    }

    fn from_bgra([b, g, r, _]: [f64; 4]) -> Self {
        Bgr {
            b: saturate_u8(b),
            g: saturate_u8(g),
            r: saturate_u8(r),
        }
    }
}

impl Ink for Bgra<u8> {
    type Pixel = Rgba<u8>;

    fn to_pixel(self) -> Rgba<u8> {
        Rgba([self.b, self.g, self.r, self.a])
    }

    fn from_pixel(Rgba([b, g, r, a]): Rgba<u8>) -> Self {
        Bgra { b, g, r, a }
    }

    fn from_bgra([b, g, r, a]: [f64; 4]) -> Self {
        Bgra {
            b: saturate_u8(b),
            g: saturate_u8(g),
            r: saturate_u8(r),
            a: saturate_u8(a),
        }
    }
}

struct ImgCanvas<'a, T>(&'a mut ImgVec<T>);

impl<T: Ink> Canvas for ImgCanvas<'_, T> {
    type Pixel = T::Pixel;

    fn dimensions(&self) -> (u32, u32) {
        (self.0.width() as u32, self.0.height() as u32)
    }

    fn get_pixel(&self, x: u32, y: u32) -> Self::Pixel {
        self.0.buf()[offset(self.0, x, y)].to_pixel()
    }

    fn draw_pixel(&mut self, x: u32, y: u32, color: Self::Pixel) {
        let at = offset(self.0, x, y);
        self.0.buf_mut()[at] = T::from_pixel(color);
    }
}

fn offset<T>(img: &ImgVec<T>, x: u32, y: u32) -> usize {
    y as usize * img.stride() + x as usize
}

#[derive(Clone, Copy, Debug)]
enum Shape {
    Line {
        from: (i32, i32),
        to: (i32, i32),
        thickness: i32,
    },
    Rect {
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        thickness: i32,
    },
}

fn draw_shape<T: Ink>(img: &mut ImgVec<T>, shape: Shape, ink: T) {
    let mut canvas = ImgCanvas(img);
    let color = ink.to_pixel();
    match shape {
        Shape::Line {
            from,
            to,
            thickness,
        } => {
            let start = (from.0 as f32, from.1 as f32);
            let end = (to.0 as f32, to.1 as f32);
            if thickness == 1 {
                draw_line_segment_mut(&mut canvas, start, end, color);
            } else {
                let radius = thickness / 2;
                for center in BresenhamLineIter::new(start, end) {
                    draw_filled_circle_mut(&mut canvas, center, radius, color);
                }
            }
        }
        Shape::Rect {
            x,
            y,
            width,
            height,
            thickness,
        } => {
            if thickness < 0 {
                let rect = Rect::at(x, y).of_size(width as u32, height as u32);
                draw_filled_rect_mut(&mut canvas, rect, color);
                return;
            }
            // One hollow ring per pixel of stroke, centered on the outline.
            for grow in -((thickness - 1) / 2)..=(thickness / 2) {
                let (w, h) = (width + 2 * grow, height + 2 * grow);
                if w > 0 && h > 0 {
                    let rect = Rect::at(x - grow, y - grow).of_size(w as u32, h as u32);
                    draw_hollow_rect_mut(&mut canvas, rect, color);
                }
            }
        }
    }
}

fn paint(data: &mut PixelData, shape: Shape, color: Color) {
    let bgra = color.bgra(0.0);
    match data {
        PixelData::Gray8(img) => draw_shape(img, shape, u8::from_bgra(bgra)),
        PixelData::Bgr8(img) => draw_shape(img, shape, Bgr::from_bgra(bgra)),
        PixelData::Bgra8(img) => draw_shape(img, shape, Bgra::from_bgra(bgra)),
        PixelData::Float64(img) => draw_shape(img, shape, f64::from_bgra(bgra)),
    }
}

fn coord(v: i64, what: &str) -> Result<i32> {
    i32::try_from(v).map_err(|_| Error::invalid(format!("{what} {v} is out of range")))
}

/// Largest width or height that can be drawn on; leaves room for the
/// clipping margin in `i32` coordinates.
const MAX_CANVAS: usize = (i32::MAX / 2) as usize;

fn check_canvas(buffer: &Buffer) -> Result<()> {
    if buffer.width() > MAX_CANVAS || buffer.height() > MAX_CANVAS {
        return Err(Error::invalid("buffer is too large to draw on"));
    }
    Ok(())
}

fn line_shape(buffer: &Buffer, p1: Point, p2: Point, thickness: i32) -> Result<Shape> {
    check_canvas(buffer)?;
    if !(1..=MAX_THICKNESS).contains(&thickness) {
        return Err(Error::invalid(format!(
            "line thickness must be between 1 and {MAX_THICKNESS}, got {thickness}"
        )));
    }
    Ok(Shape::Line {
        from: (coord(p1.x, "x")?, coord(p1.y, "y")?),
        to: (coord(p2.x, "x")?, coord(p2.y, "y")?),
        thickness,
    })
}

fn rect_shape(buffer: &Buffer, region: Region, thickness: i32) -> Result<Shape> {
    check_canvas(buffer)?;
    if thickness == 0 || thickness > MAX_THICKNESS {
        return Err(Error::invalid(format!(
            "rectangle thickness must be negative (filled) or between 1 and {MAX_THICKNESS}, got {thickness}"
        )));
    }
    if region.width <= 0 || region.height <= 0 {
        return Err(Error::invalid(format!(
            "rectangle must have a positive width and height, got {}x{}",
            region.width, region.height
        )));
    }
    let (x, width) = clip_span(region.x, region.width, buffer.width());
    let (y, height) = clip_span(region.y, region.height, buffer.height());
    Ok(Shape::Rect {
        x,
        y,
        width,
        height,
        thickness,
    })
}

/// Clamp `start..start + extent` to the canvas plus a margin wider than any
/// stroke. Edges beyond the margin are invisible either way, so the clamped
/// span draws the same pixels.
fn clip_span(start: i64, extent: i64, limit: usize) -> (i32, i32) {
    let margin = i64::from(MAX_THICKNESS) + 1;
    let (lo, hi) = (-margin, limit as i64 + margin);
    let begin = start.clamp(lo, hi);
    let end = start.saturating_add(extent).clamp(lo, hi).max(begin + 1);
    (begin as i32, (end - begin) as i32)
}

impl Buffer {
    /// Draw a line segment from `p1` to `p2` (both included).
    ///
    /// Single-channel buffers use the color's blue component; a missing
    /// alpha draws alpha 0. Parts outside the buffer are clipped.
    pub fn draw_line(&mut self, p1: Point, p2: Point, color: Color, thickness: i32) -> Result<()> {
        let shape = line_shape(self, p1, p2, thickness)?;
        paint(self.pixels_mut(), shape, color);
        Ok(())
    }

    /// Draw the outline of `region`, or fill it when `thickness` is negative.
    pub fn draw_rectangle(&mut self, region: Region, color: Color, thickness: i32) -> Result<()> {
        let shape = rect_shape(self, region, thickness)?;
        paint(self.pixels_mut(), shape, color);
        Ok(())
    }
}

/// Work-unit form of [`Buffer::draw_line`].
pub fn draw_line<'a, T>(
    target: T,
    p1: Point,
    p2: Point,
    color: Color,
    thickness: i32,
) -> Result<WorkUnit<'a, T>>
where
    T: BorrowMut<Buffer> + Send + 'a,
{
    let shape = line_shape(target.borrow(), p1, p2, thickness)?;
    Ok(WorkUnit::new("draw_line", move || {
        let mut target = target;
        paint(target.borrow_mut().pixels_mut(), shape, color);
        Ok(target)
    }))
}

/// Work-unit form of [`Buffer::draw_rectangle`].
pub fn draw_rectangle<'a, T>(
    target: T,
    region: Region,
    color: Color,
    thickness: i32,
) -> Result<WorkUnit<'a, T>>
where
    T: BorrowMut<Buffer> + Send + 'a,
{
    let shape = rect_shape(target.borrow(), region, thickness)?;
    Ok(WorkUnit::new("draw_rectangle", move || {
        let mut target = target;
        paint(target.borrow_mut().pixels_mut(), shape, color);
        Ok(target)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BufferSpec, BufferType, ErrorKind};

    fn zeros4() -> Buffer {
        Buffer::from_rows(&[[0.0; 4]; 4]).unwrap()
    }

    fn white() -> Color {
        Color::rgb(255.0, 255.0, 255.0)
    }

    #[test]
    fn hollow_rectangle() {
        let mut buf = zeros4();
        buf.draw_rectangle(Region::new(1, 1, 3, 3), white(), 1).unwrap();
        #[rustfmt::skip]
        let expected = vec![
            0.0, 0.0,   0.0,   0.0,
            0.0, 255.0, 255.0, 255.0,
            0.0, 255.0, 0.0,   255.0,
            0.0, 255.0, 255.0, 255.0,
        ];
        assert_eq!(buf.to_flat_values(), expected);
    }

    #[test]
    fn filled_rectangle_is_clipped() {
        let mut buf = Buffer::new(4, 4, BufferType::Gray8).unwrap();
        buf.draw_rectangle(Region::new(2, 2, 10, 10), white(), -1).unwrap();
        let bytes = buf.to_raw_bytes();
        assert_eq!(bytes.iter().filter(|&&v| v == 255).count(), 4);
        assert_eq!(bytes[15], 255);
        assert_eq!(bytes[0], 0);
    }

    #[test]
    fn thick_rectangle_covers_both_sides_of_outline() {
        let mut buf = Buffer::new(7, 7, BufferType::Gray8).unwrap();
        buf.draw_rectangle(Region::new(2, 2, 3, 3), white(), 3).unwrap();
        let bytes = buf.to_raw_bytes();
        // rings at 1..=5 and 2..=4 and the single centre pixel
        assert_eq!(bytes[7 + 1], 255);
        assert_eq!(bytes[3 * 7 + 3], 255);
        assert_eq!(bytes[0], 0);
    }

    #[test]
    fn diagonal_line() {
        let mut buf = zeros4();
        buf.draw_line(Point::new(1, 1), Point::new(3, 3), white(), 1).unwrap();
        #[rustfmt::skip]
        let expected = vec![
            0.0, 0.0,   0.0,   0.0,
            0.0, 255.0, 0.0,   0.0,
            0.0, 0.0,   255.0, 0.0,
            0.0, 0.0,   0.0,   255.0,
        ];
        assert_eq!(buf.to_flat_values(), expected);
    }

    #[test]
    fn line_color_follows_channel_order() {
        let mut buf = Buffer::new(3, 1, BufferType::Bgra8).unwrap();
        let color = Color::rgba(10.0, 20.0, 30.0, 40.0);
        buf.draw_line(Point::new(0, 0), Point::new(2, 0), color, 1).unwrap();
        assert_eq!(buf.to_raw_bytes(), [30, 20, 10, 40].repeat(3));
    }

    #[test]
    fn thick_line_is_wider() {
        let mut buf = Buffer::new(9, 9, BufferType::Gray8).unwrap();
        buf.draw_line(Point::new(1, 4), Point::new(7, 4), white(), 3).unwrap();
        let bytes = buf.to_raw_bytes();
        assert_eq!(bytes[3 * 9 + 4], 255);
        assert_eq!(bytes[4 * 9 + 4], 255);
        assert_eq!(bytes[5 * 9 + 4], 255);
        assert_eq!(bytes[8 * 9 + 4], 0);
    }

    #[test]
    fn unit_forms_move_or_borrow() {
        let buf = draw_line(zeros4(), Point::new(0, 0), Point::new(3, 0), white(), 1)
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(buf.to_flat_values()[..4], [255.0; 4]);

        let mut bgr = Buffer::from_spec(&BufferSpec::new(2, 2).with_type(BufferType::Bgr8)).unwrap();
        draw_rectangle(&mut bgr, Region::new(0, 0, 2, 2), Color::rgb(1.0, 2.0, 3.0), -1)
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(bgr.to_raw_bytes(), [3, 2, 1].repeat(4));
    }

    #[test]
    fn invalid_strokes() {
        let mut buf = zeros4();
        let err = buf
            .draw_line(Point::new(0, 0), Point::new(1, 1), white(), 0)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(buf.draw_rectangle(Region::new(0, 0, 2, 2), white(), 0).is_err());
        assert!(buf.draw_rectangle(Region::new(0, 0, 0, 2), white(), 1).is_err());
        assert!(draw_line(&mut buf, Point::new(0, 0), Point::new(i64::MAX, 0), white(), 1).is_err());
        assert_eq!(buf, zeros4());
    }

    #[test]
    fn negative_extents_are_rejected() {
        let mut buf = zeros4();
        let err = buf
            .draw_rectangle(Region::new(1, 1, -2, -3), white(), -1)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(
            err.to_string(),
            "rectangle must have a positive width and height, got -2x-3"
        );
        assert!(draw_rectangle(&mut buf, Region::new(0, 0, -2, 3), white(), 1).is_err());
        assert_eq!(buf, zeros4());
    }

    #[test]
    fn huge_rectangles_are_clipped() {
        let mut filled = Buffer::new(4, 4, BufferType::Gray8).unwrap();
        filled
            .draw_rectangle(Region::new(0, 0, i64::MAX, 2), white(), -1)
            .unwrap();
        assert_eq!(filled.to_raw_bytes()[..8], [255; 8]);
        assert_eq!(filled.to_raw_bytes()[8..], [0; 8]);

        let mut hollow = Buffer::new(4, 4, BufferType::Gray8).unwrap();
        hollow
            .draw_rectangle(Region::new(-1_000_000_000_000, 1, i64::MAX, 2), white(), 1)
            .unwrap();
        let bytes = hollow.to_raw_bytes();
        assert_eq!(bytes[..4], [0; 4]);
        assert_eq!(bytes[4..12], [255; 8]);
        assert_eq!(bytes[12..], [0; 4]);
    }

    #[test]
    fn clip_span_keeps_visible_spans() {
        assert_eq!(clip_span(1, 3, 4), (1, 3));
        assert_eq!(clip_span(-5, 10, 4), (-5, 10));
        assert_eq!(clip_span(i64::MIN, 1, 4), (-32768, 1));
        assert_eq!(clip_span(0, i64::MAX, 4), (0, 4 + 32768));
    }
}
