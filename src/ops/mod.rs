//! Buffer operations as work units.
//!
//! Each function checks its arguments on the calling thread and returns a
//! [`WorkUnit`] that does the actual work. Read-only inputs are anything
//! that borrows as a [`Buffer`]: `&Buffer` for [`Dispatcher::run`], or an
//! owned `Buffer` / `Arc<Buffer>` for [`Dispatcher::spawn`] and
//! [`Dispatcher::submit`]. Mutating operations take their target the same
//! way, through `BorrowMut`, and hand it back when they finish.
//!
//! [`Dispatcher::run`]: crate::Dispatcher::run
//! [`Dispatcher::spawn`]: crate::Dispatcher::spawn
//! [`Dispatcher::submit`]: crate::Dispatcher::submit

use std::borrow::{Borrow, BorrowMut};

use crate::arith::Operand;
use crate::buffer::{Buffer, BufferSpec};
use crate::channels::{check_merge, merge_channels, split_channels};
use crate::dispatch::WorkUnit;
use crate::error::{Error, Result};
use crate::geom::{Point, Region};

mod color;
mod draw;
mod filter;
mod geometry;
mod resize;

pub use color::{color_temperature, convert_color, Conversion, MAX_KELVIN, MIN_KELVIN};
pub use draw::{draw_line, draw_rectangle, MAX_THICKNESS};
pub use filter::{gaussian_blur, lookup, BlurOptions};
pub use geometry::{
    flip_left_right, flip_up_down, rotate, rotation_matrix, warp_affine, BorderType, RotateSpec,
    WarpOptions,
};
pub use resize::{resize, SizeSpec};

/// Build a buffer from an options record.
///
/// The record is validated and the buffer allocated here; the unit hands it
/// over.
pub fn construct<'a>(spec: &BufferSpec) -> Result<WorkUnit<'a, Buffer>> {
    let buffer = Buffer::from_spec(spec)?;
    Ok(WorkUnit::new("construct", move || Ok(buffer)))
}

/// Copy out `region` into a new buffer.
pub fn crop<'a, B>(buffer: B, region: Region) -> Result<WorkUnit<'a, Buffer>>
where
    B: Borrow<Buffer> + Send + 'a,
{
    region.check_within("crop", buffer.borrow().size())?;
    Ok(WorkUnit::new("crop", move || buffer.borrow().crop(region)))
}

/// Copy `source` into `target` at `origin`.
pub fn set<'a, T, S>(target: T, source: S, origin: Point) -> Result<WorkUnit<'a, T>>
where
    T: BorrowMut<Buffer> + Send + 'a,
    S: Borrow<Buffer> + Send + 'a,
{
    {
        let (dst, src) = (target.borrow(), source.borrow());
        if dst.buffer_type() != src.buffer_type() {
            return Err(Error::TypeMismatch {
                expected: dst.buffer_type(),
                actual: src.buffer_type(),
            });
        }
        Region::at(origin, src.size()).check_within("set", dst.size())?;
    }
    Ok(WorkUnit::new("set", move || {
        let mut target = target;
        target.borrow_mut().set(source.borrow(), origin)?;
        Ok(target)
    }))
}

/// Add `operand` to `target` in place.
pub fn add<'a, T>(target: T, operand: impl Into<Operand>) -> Result<WorkUnit<'a, T>>
where
    T: BorrowMut<Buffer> + Send + 'a,
{
    let operand = operand.into();
    target.borrow().check_operand(&operand)?;
    Ok(WorkUnit::new("add", move || {
        let mut target = target;
        target.borrow_mut().add(operand)?;
        Ok(target)
    }))
}

/// Multiply `target` by `operand` in place.
pub fn mul<'a, T>(target: T, operand: impl Into<Operand>) -> Result<WorkUnit<'a, T>>
where
    T: BorrowMut<Buffer> + Send + 'a,
{
    let operand = operand.into();
    target.borrow().check_operand(&operand)?;
    Ok(WorkUnit::new("mul", move || {
        let mut target = target;
        target.borrow_mut().mul(operand)?;
        Ok(target)
    }))
}

/// Split into one Gray8 buffer per channel (blue, green, red, alpha).
/// Single-channel buffers split into a copy of themselves.
pub fn split<'a, B>(buffer: B) -> Result<WorkUnit<'a, Vec<Buffer>>>
where
    B: Borrow<Buffer> + Send + 'a,
{
    Ok(WorkUnit::new("split", move || split_channels(buffer.borrow())))
}

/// Merge 1, 3 or 4 equally sized Gray8 buffers into Gray8, Bgr8 or Bgra8.
pub fn merge<'a, B>(channels: Vec<B>) -> Result<WorkUnit<'a, Buffer>>
where
    B: Borrow<Buffer> + Send + 'a,
{
    check_merge(&as_refs(&channels))?;
    Ok(WorkUnit::new("merge", move || merge_channels(&as_refs(&channels))))
}

fn as_refs<B: Borrow<Buffer>>(buffers: &[B]) -> Vec<&Buffer> {
    buffers.iter().map(<B as Borrow<Buffer>>::borrow).collect()
}
