//! Typed 2-D pixel buffers and image operations that run either on the
//! calling thread or on a worker pool.
//!
//! - [`Buffer`]: an owned Gray8, Bgr8, Bgra8 or Float64 pixel buffer
//! - [`PixelData`]: typed pixel storage over `imgref::ImgVec`
//! - [`WorkUnit`]: a validated, deferred operation
//! - [`Dispatcher`]: runs units synchronously ([`run`](Dispatcher::run)),
//!   as a [`Task`] ([`spawn`](Dispatcher::spawn)), or with a completion
//!   handler ([`submit`](Dispatcher::submit))
//! - [`ops`]: crop, set, arithmetic, color, drawing, filters, geometry
//! - [`io`]: decode, encode, read and write through the `image` codecs
//! - [`ImageFormat`]: format detection from magic bytes
//! - [`ResourceLimits`]: resource limit configuration
//!
//! Every operation checks its arguments when it is called and only then
//! returns a unit, so invalid input never reaches a worker thread.

#![forbid(unsafe_code)]

mod arith;
mod buffer;
mod channels;
mod dispatch;
mod error;
mod format;
mod geom;
mod imaging;
pub mod io;
mod limits;
pub mod ops;
mod output;
mod pixel;

pub use arith::Operand;
pub use buffer::{Buffer, BufferSpec};
pub use channels::ChannelPlane;
pub use dispatch::{DispatchConfig, Dispatcher, Task, WorkUnit};
pub use error::{Error, ErrorKind, Result};
pub use format::ImageFormat;
pub use geom::{Color, Point, PointF, Region, Size};
pub use limits::{LimitExceeded, ResourceLimits};
pub use output::EncodeOutput;
pub use pixel::{BufferType, Channel, PixelData};

// Re-exports for callers working with the typed storage.
pub use imgref::{Img, ImgRef, ImgVec};
pub use rgb;
pub use rgb::{Bgr, Bgra};
