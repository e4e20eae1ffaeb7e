//! Channel codec: moving between interleaved storage, channel-major values
//! and per-channel byte planes.
//!
//! Multi-channel buffers flatten channel-major: every blue value, then every
//! green value, then red (then alpha). Planar construction data uses the
//! same layout, so flattening and rebuilding are inverses.

use imgref::ImgVec;
use rgb::{Bgr, Bgra};

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::pixel::{BufferType, Channel, PixelData};

/// One channel of a buffer as a contiguous byte sequence.
///
/// 8-bit channels hold one byte per pixel; [`Channel::Float`] holds each
/// value as 8 little-endian bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelPlane {
    pub channel: Channel,
    pub data: Vec<u8>,
}

impl Buffer {
    /// All values as numbers, channel-major for multi-channel types.
    pub fn to_flat_values(&self) -> Vec<f64> {
        match self.pixels() {
            PixelData::Gray8(img) => img.buf().iter().map(|&v| v as f64).collect(),
            PixelData::Float64(img) => img.buf().clone(),
            PixelData::Bgr8(img) => {
                let px = img.buf();
                let mut out = Vec::with_capacity(px.len() * 3);
                out.extend(px.iter().map(|p| p.b as f64));
                out.extend(px.iter().map(|p| p.g as f64));
                out.extend(px.iter().map(|p| p.r as f64));
                out
            }
            PixelData::Bgra8(img) => {
                let px = img.buf();
                let mut out = Vec::with_capacity(px.len() * 4);
                out.extend(px.iter().map(|p| p.b as f64));
                out.extend(px.iter().map(|p| p.g as f64));
                out.extend(px.iter().map(|p| p.r as f64));
                out.extend(px.iter().map(|p| p.a as f64));
                out
            }
        }
    }

    /// One plane per channel, in storage order.
    pub fn to_channel_planes(&self) -> Vec<ChannelPlane> {
        let plane = |channel, data| ChannelPlane { channel, data };
        match self.pixels() {
            PixelData::Gray8(img) => vec![plane(Channel::Gray, img.buf().clone())],
            PixelData::Float64(img) => vec![plane(
                Channel::Float,
                img.buf().iter().flat_map(|v| v.to_le_bytes()).collect(),
            )],
            PixelData::Bgr8(img) => {
                let px = img.buf();
                vec![
                    plane(Channel::Blue, px.iter().map(|p| p.b).collect()),
                    plane(Channel::Green, px.iter().map(|p| p.g).collect()),
                    plane(Channel::Red, px.iter().map(|p| p.r).collect()),
                ]
            }
            PixelData::Bgra8(img) => {
                let px = img.buf();
                vec![
                    plane(Channel::Blue, px.iter().map(|p| p.b).collect()),
                    plane(Channel::Green, px.iter().map(|p| p.g).collect()),
                    plane(Channel::Red, px.iter().map(|p| p.r).collect()),
                    plane(Channel::Alpha, px.iter().map(|p| p.a).collect()),
                ]
            }
        }
    }

    /// Interleaved bytes of the whole buffer.
    pub fn to_raw_bytes(&self) -> Vec<u8> {
        self.pixels().as_bytes()
    }
}

/// Truncate toward zero, then wrap into `0..=255`.
pub(crate) fn wrap_u8(v: f64) -> u8 {
    v.trunc() as i64 as u8
}

/// Round half to even, then clamp into `0..=255`.
pub(crate) fn saturate_u8(v: f64) -> u8 {
    if v.is_nan() {
        return 0;
    }
    v.round_ties_even().clamp(0.0, 255.0) as u8
}

/// Repack planar values into typed storage. `values.len()` must equal
/// `width * height * channels`.
pub(crate) fn from_planar(
    values: &[f64],
    width: usize,
    height: usize,
    buffer_type: BufferType,
) -> PixelData {
    let n = width * height;
    match buffer_type {
        BufferType::Gray8 => {
            PixelData::Gray8(ImgVec::new(values.iter().map(|&v| wrap_u8(v)).collect(), width, height))
        }
        BufferType::Float64 => PixelData::Float64(ImgVec::new(values.to_vec(), width, height)),
        BufferType::Bgr8 => {
            let (b, rest) = values.split_at(n);
            let (g, r) = rest.split_at(n);
            let px = (0..n)
                .map(|i| Bgr {
                    b: wrap_u8(b[i]),
                    g: wrap_u8(g[i]),
                    r: wrap_u8(r[i]),
                })
                .collect();
            PixelData::Bgr8(ImgVec::new(px, width, height))
        }
        BufferType::Bgra8 => {
            let (b, rest) = values.split_at(n);
            let (g, rest) = rest.split_at(n);
            let (r, a) = rest.split_at(n);
            let px = (0..n)
                .map(|i| Bgra {
                    b: wrap_u8(b[i]),
                    g: wrap_u8(g[i]),
                    r: wrap_u8(r[i]),
                    a: wrap_u8(a[i]),
                })
                .collect();
            PixelData::Bgra8(ImgVec::new(px, width, height))
        }
    }
}

/// Split into one single-channel buffer per channel.
///
/// Single-channel buffers split into a copy of themselves.
pub(crate) fn split_channels(buffer: &Buffer) -> Result<Vec<Buffer>> {
    let (w, h) = (buffer.width(), buffer.height());
    match buffer.pixels() {
        PixelData::Gray8(_) | PixelData::Float64(_) => Ok(vec![buffer.clone()]),
        _ => buffer
            .to_channel_planes()
            .into_iter()
            .map(|plane| Buffer::from_pixels(PixelData::Gray8(ImgVec::new(plane.data, w, h))))
            .collect(),
    }
}

/// Validate the inputs of [`merge_channels`].
pub(crate) fn check_merge(planes: &[&Buffer]) -> Result<()> {
    let Some(first) = planes.first() else {
        return Err(Error::invalid("merge needs at least one channel"));
    };
    if !matches!(planes.len(), 1 | 3 | 4) {
        return Err(Error::invalid(format!(
            "merge expects 1, 3 or 4 channels, got {}",
            planes.len()
        )));
    }
    for plane in planes {
        if plane.buffer_type() != BufferType::Gray8 {
            return Err(Error::TypeMismatch {
                expected: BufferType::Gray8,
                actual: plane.buffer_type(),
            });
        }
        if plane.size() != first.size() {
            return Err(Error::SizeMismatch {
                expected: first.size(),
                actual: plane.size(),
            });
        }
    }
    Ok(())
}

/// Combine 1, 3 or 4 same-sized Gray8 buffers into Gray8, Bgr8 or Bgra8.
pub(crate) fn merge_channels(planes: &[&Buffer]) -> Result<Buffer> {
    check_merge(planes)?;
    let (w, h) = (planes[0].width(), planes[0].height());
    let bytes: Vec<&[u8]> = planes
        .iter()
        .filter_map(|p| match p.pixels() {
            PixelData::Gray8(img) => Some(img.buf().as_slice()),
            _ => None,
        })
        .collect();
    let data = match bytes.as_slice() {
        [gray] => PixelData::Gray8(ImgVec::new(gray.to_vec(), w, h)),
        [b, g, r] => PixelData::Bgr8(ImgVec::new(
            (0..w * h)
                .map(|i| Bgr {
                    b: b[i],
                    g: g[i],
                    r: r[i],
                })
                .collect(),
            w,
            h,
        )),
        [b, g, r, a] => PixelData::Bgra8(ImgVec::new(
            (0..w * h)
                .map(|i| Bgra {
                    b: b[i],
                    g: g[i],
                    r: r[i],
                    a: a[i],
                })
                .collect(),
            w,
            h,
        )),
        other => {
            return Err(Error::invalid(format!(
                "merge expects 1, 3 or 4 channels, got {}",
                other.len()
            )));
        }
    };
    Buffer::from_pixels(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BufferSpec;

    fn bgr_3x3() -> Buffer {
        let data = [1.0, 2.0, 3.0]
            .iter()
            .flat_map(|&v| [v; 9])
            .collect::<Vec<_>>();
        Buffer::from_spec(
            &BufferSpec::new(3, 3)
                .with_type(BufferType::Bgr8)
                .with_data(data),
        )
        .unwrap()
    }

    #[test]
    fn flat_values_are_channel_major() {
        let buf = bgr_3x3();
        let mut expected = vec![1.0; 9];
        expected.extend([2.0; 9]);
        expected.extend([3.0; 9]);
        assert_eq!(buf.to_flat_values(), expected);
    }

    #[test]
    fn planes_for_bgr() {
        let planes = bgr_3x3().to_channel_planes();
        let channels: Vec<Channel> = planes.iter().map(|p| p.channel).collect();
        assert_eq!(channels, vec![Channel::Blue, Channel::Green, Channel::Red]);
        assert_eq!(planes[0].data, vec![1u8; 9]);
        assert_eq!(planes[1].data, vec![2u8; 9]);
        assert_eq!(planes[2].data, vec![3u8; 9]);
    }

    #[test]
    fn planes_for_bgra_include_alpha() {
        let buf = Buffer::from_spec(
            &BufferSpec::new(1, 1)
                .with_type(BufferType::Bgra8)
                .with_data(vec![10.0, 20.0, 30.0, 40.0]),
        )
        .unwrap();
        let planes = buf.to_channel_planes();
        assert_eq!(planes.len(), 4);
        assert_eq!(planes[3].channel, Channel::Alpha);
        assert_eq!(planes[3].data, vec![40]);
        assert_eq!(planes[0].data, vec![10]);
    }

    #[test]
    fn float_plane_is_little_endian() {
        let buf = Buffer::from_rows(&[[1.0, 2.0], [3.0, 4.0]]).unwrap();
        let planes = buf.to_channel_planes();
        assert_eq!(planes.len(), 1);
        assert_eq!(planes[0].channel, Channel::Float);
        let values: Vec<f64> = planes[0]
            .data
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn raw_bytes_are_interleaved() {
        let buf = Buffer::from_spec(
            &BufferSpec::new(3, 1)
                .with_type(BufferType::Bgr8)
                .with_data(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]),
        )
        .unwrap();
        assert_eq!(buf.to_raw_bytes(), vec![1, 4, 7, 2, 5, 8, 3, 6, 9]);
    }

    #[test]
    fn rounding_helpers() {
        assert_eq!(wrap_u8(300.0), 44);
        assert_eq!(wrap_u8(-1.0), 255);
        assert_eq!(wrap_u8(2.9), 2);
        assert_eq!(saturate_u8(300.0), 255);
        assert_eq!(saturate_u8(-4.0), 0);
        assert_eq!(saturate_u8(2.5), 2);
        assert_eq!(saturate_u8(3.5), 4);
        assert_eq!(saturate_u8(f64::NAN), 0);
    }

    #[test]
    fn split_then_merge_is_identity() {
        let buf = bgr_3x3();
        let parts = split_channels(&buf).unwrap();
        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|p| p.buffer_type() == BufferType::Gray8));
        let refs: Vec<&Buffer> = parts.iter().collect();
        assert_eq!(merge_channels(&refs).unwrap(), buf);
    }

    #[test]
    fn merge_validates_inputs() {
        let a = Buffer::new(2, 2, BufferType::Gray8).unwrap();
        let b = Buffer::new(3, 2, BufferType::Gray8).unwrap();
        let f = Buffer::new(2, 2, BufferType::Float64).unwrap();
        assert!(matches!(
            merge_channels(&[&a, &b, &a]).unwrap_err(),
            Error::SizeMismatch { .. }
        ));
        assert!(matches!(
            merge_channels(&[&a, &f, &a]).unwrap_err(),
            Error::TypeMismatch { .. }
        ));
        assert!(matches!(
            merge_channels(&[&a, &a]).unwrap_err(),
            Error::InvalidArgument(_)
        ));
        assert!(merge_channels(&[]).is_err());
    }
}
