//! Resource limits for decoding and encoding.
//!
//! [`ResourceLimits`] caps what a single operation may consume.
//! [`LimitExceeded`] is returned when a check fails. Checks that can run on
//! the calling thread (input size) do so before a unit is scheduled; checks
//! that need decoded dimensions run inside the unit.

/// Resource limits for decode/encode operations.
///
/// All fields are optional; `None` means no limit for that resource.
///
/// # Example
///
/// ```
/// use pixmat::ResourceLimits;
///
/// let limits = ResourceLimits::none()
///     .with_max_pixels(100_000_000)
///     .with_max_file_size(64 * 1024 * 1024);
/// assert!(limits.has_any());
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct ResourceLimits {
    /// Maximum total pixels (width × height).
    pub max_pixels: Option<u64>,
    /// Maximum size of a decoded buffer in bytes.
    pub max_memory_bytes: Option<u64>,
    /// Maximum encoded output size in bytes (encode only).
    pub max_output_bytes: Option<u64>,
    /// Maximum image width in pixels.
    pub max_width: Option<u32>,
    /// Maximum image height in pixels.
    pub max_height: Option<u32>,
    /// Maximum input size in bytes (decode only).
    pub max_file_size: Option<u64>,
}

impl ResourceLimits {
    /// No limits (all fields `None`).
    pub fn none() -> Self {
        Self::default()
    }

    /// Set maximum total pixels.
    pub fn with_max_pixels(mut self, max: u64) -> Self {
        self.max_pixels = Some(max);
        self
    }

    /// Set maximum decoded buffer size in bytes.
    pub fn with_max_memory(mut self, bytes: u64) -> Self {
        self.max_memory_bytes = Some(bytes);
        self
    }

    /// Set maximum encoded output size in bytes.
    pub fn with_max_output(mut self, bytes: u64) -> Self {
        self.max_output_bytes = Some(bytes);
        self
    }

    /// Set maximum image width in pixels.
    pub fn with_max_width(mut self, width: u32) -> Self {
        self.max_width = Some(width);
        self
    }

    /// Set maximum image height in pixels.
    pub fn with_max_height(mut self, height: u32) -> Self {
        self.max_height = Some(height);
        self
    }

    /// Set maximum input size in bytes.
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = Some(bytes);
        self
    }

    /// Whether any limits are set.
    pub fn has_any(&self) -> bool {
        self.max_pixels.is_some()
            || self.max_memory_bytes.is_some()
            || self.max_output_bytes.is_some()
            || self.max_width.is_some()
            || self.max_height.is_some()
            || self.max_file_size.is_some()
    }

    // --- Validation methods ---

    /// Check image dimensions against `max_width`, `max_height`, and `max_pixels`.
    pub fn check_dimensions(&self, width: u32, height: u32) -> Result<(), LimitExceeded> {
        if let Some(max) = self.max_width
            && width > max
        {
            return Err(LimitExceeded::Width { actual: width, max });
        }
        if let Some(max) = self.max_height
            && height > max
        {
            return Err(LimitExceeded::Height {
                actual: height,
                max,
            });
        }
        if let Some(max) = self.max_pixels {
            let pixels = width as u64 * height as u64;
            if pixels > max {
                return Err(LimitExceeded::Pixels {
                    actual: pixels,
                    max,
                });
            }
        }
        Ok(())
    }

    /// Check a buffer size against `max_memory_bytes`.
    pub fn check_memory(&self, bytes: u64) -> Result<(), LimitExceeded> {
        if let Some(max) = self.max_memory_bytes
            && bytes > max
        {
            return Err(LimitExceeded::Memory { actual: bytes, max });
        }
        Ok(())
    }

    /// Check input size against `max_file_size`.
    pub fn check_file_size(&self, bytes: u64) -> Result<(), LimitExceeded> {
        if let Some(max) = self.max_file_size
            && bytes > max
        {
            return Err(LimitExceeded::FileSize { actual: bytes, max });
        }
        Ok(())
    }

    /// Check encoded output size against `max_output_bytes`.
    pub fn check_output_size(&self, bytes: u64) -> Result<(), LimitExceeded> {
        if let Some(max) = self.max_output_bytes
            && bytes > max
        {
            return Err(LimitExceeded::OutputSize { actual: bytes, max });
        }
        Ok(())
    }

    /// Check a decoded buffer against the dimension and memory limits.
    pub fn check_buffer(&self, buffer: &crate::Buffer) -> Result<(), LimitExceeded> {
        let width = u32::try_from(buffer.width()).unwrap_or(u32::MAX);
        let height = u32::try_from(buffer.height()).unwrap_or(u32::MAX);
        self.check_dimensions(width, height)?;
        self.check_memory(buffer.len_bytes() as u64)
    }
}

/// A resource limit was exceeded.
///
/// Each variant carries the actual value and the limit that was exceeded.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum LimitExceeded {
    /// Image width exceeded `max_width`.
    #[error("width {actual} exceeds limit {max}")]
    Width { actual: u32, max: u32 },
    /// Image height exceeded `max_height`.
    #[error("height {actual} exceeds limit {max}")]
    Height { actual: u32, max: u32 },
    /// Pixel count exceeded `max_pixels`.
    #[error("pixel count {actual} exceeds limit {max}")]
    Pixels { actual: u64, max: u64 },
    /// Decoded size exceeded `max_memory_bytes`.
    #[error("memory {actual} bytes exceeds limit {max}")]
    Memory { actual: u64, max: u64 },
    /// Input size exceeded `max_file_size`.
    #[error("file size {actual} bytes exceeds limit {max}")]
    FileSize { actual: u64, max: u64 },
    /// Encoded output exceeded `max_output_bytes`.
    #[error("output size {actual} bytes exceeds limit {max}")]
    OutputSize { actual: u64, max: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Buffer, BufferType};

    #[test]
    fn builders_set_only_their_field() {
        assert!(!ResourceLimits::none().has_any());
        let limits = ResourceLimits::none()
            .with_max_pixels(640 * 480)
            .with_max_file_size(1 << 20);
        assert!(limits.has_any());
        assert_eq!(limits.max_pixels, Some(307_200));
        assert_eq!(limits.max_file_size, Some(1 << 20));
        assert_eq!(limits.max_memory_bytes, None);
        assert_eq!(limits.max_width, None);
    }

    #[test]
    fn dimensions_checked_in_order() {
        let limits = ResourceLimits::none()
            .with_max_width(640)
            .with_max_height(480)
            .with_max_pixels(200_000);
        assert!(limits.check_dimensions(400, 400).is_ok());
        assert_eq!(
            limits.check_dimensions(641, 10).unwrap_err(),
            LimitExceeded::Width {
                actual: 641,
                max: 640
            }
        );
        assert_eq!(
            limits.check_dimensions(640, 481).unwrap_err(),
            LimitExceeded::Height {
                actual: 481,
                max: 480
            }
        );
        // 500 * 401 = 200_500
        assert_eq!(
            limits.check_dimensions(500, 401).unwrap_err(),
            LimitExceeded::Pixels {
                actual: 200_500,
                max: 200_000
            }
        );
    }

    #[test]
    fn byte_limits() {
        let limits = ResourceLimits::none()
            .with_max_file_size(100)
            .with_max_output(50);
        assert!(limits.check_file_size(100).is_ok());
        assert!(matches!(
            limits.check_file_size(101),
            Err(LimitExceeded::FileSize { .. })
        ));
        assert!(limits.check_output_size(50).is_ok());
        assert!(matches!(
            limits.check_output_size(51),
            Err(LimitExceeded::OutputSize { .. })
        ));
        // Unset limits never fail.
        assert!(limits.check_memory(u64::MAX).is_ok());
    }

    #[test]
    fn check_buffer_uses_byte_length() {
        let buffer = Buffer::new(10, 10, BufferType::Bgr8).unwrap();
        let limits = ResourceLimits::none().with_max_memory(299);
        assert_eq!(
            limits.check_buffer(&buffer).unwrap_err(),
            LimitExceeded::Memory {
                actual: 300,
                max: 299
            }
        );
        let limits = ResourceLimits::none().with_max_height(9);
        assert!(matches!(
            limits.check_buffer(&buffer).unwrap_err(),
            LimitExceeded::Height { actual: 10, max: 9 }
        ));
        let float = Buffer::new(10, 10, BufferType::Float64).unwrap();
        assert!(ResourceLimits::none().with_max_memory(800).check_buffer(&float).is_ok());
    }

    #[test]
    fn messages() {
        let err = LimitExceeded::Width {
            actual: 5000,
            max: 4096,
        };
        assert_eq!(err.to_string(), "width 5000 exceeds limit 4096");
        let err = LimitExceeded::FileSize {
            actual: 2048,
            max: 1024,
        };
        assert_eq!(err.to_string(), "file size 2048 bytes exceeds limit 1024");
    }
}
