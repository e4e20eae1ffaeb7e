//! Decoding, encoding and file I/O.
//!
//! Every entry point validates its arguments immediately and returns a
//! [`WorkUnit`]; the codec work itself happens when the unit runs.

use std::borrow::Borrow;
use std::fs;
use std::io::Cursor;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ImageDecoder, ImageReader};

use crate::buffer::Buffer;
use crate::dispatch::WorkUnit;
use crate::error::{Error, Result};
use crate::format::ImageFormat;
use crate::imaging::{self, require_8bit};
use crate::limits::ResourceLimits;
use crate::output::EncodeOutput;
use crate::pixel::BufferType;

/// JPEG quality used when none is given.
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// Options for [`decode_with`] and [`read_with`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Layout of the decoded buffer. `None` keeps the stored layout.
    pub buffer_type: Option<BufferType>,
    /// Limits checked against the input size, the dimensions in the image
    /// header and the decoded buffer.
    pub limits: ResourceLimits,
}

impl DecodeOptions {
    pub fn with_buffer_type(mut self, buffer_type: BufferType) -> Self {
        self.buffer_type = Some(buffer_type);
        self
    }

    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }
}

/// Options for [`encode_with`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodeOptions {
    /// JPEG quality, 1 to 100. Ignored for PNG.
    pub jpeg_quality: u8,
    /// Limits checked against the encoded output.
    pub limits: ResourceLimits,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            limits: ResourceLimits::none(),
        }
    }
}

impl EncodeOptions {
    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }
}

fn check_decode_type(buffer_type: Option<BufferType>) -> Result<()> {
    match buffer_type {
        Some(BufferType::Float64) => Err(Error::invalid(
            "type must be one of [Gray, BGR, BGRA]",
        )),
        _ => Ok(()),
    }
}

/// Decode `data`, reporting unreadable input with `invalid`.
///
/// The format comes from the leading bytes, never from a file name. Image
/// dimensions are checked against the limits after the header is parsed
/// and before any pixel data is decoded.
fn decode_bytes(data: &[u8], options: &DecodeOptions, invalid: impl Fn() -> Error) -> Result<Buffer> {
    let format = ImageFormat::detect(data).ok_or_else(&invalid)?;
    log::debug!("decoding {} bytes of {format}", data.len());
    let decoder = ImageReader::with_format(Cursor::new(data), format.to_image_format())
        .into_decoder()
        .map_err(|_| invalid())?;
    let (width, height) = decoder.dimensions();
    options
        .limits
        .check_dimensions(width, height)
        .map_err(Error::limit_during)?;
    let img = DynamicImage::from_decoder(decoder).map_err(|_| invalid())?;
    let buffer = imaging::from_dynamic(img, options.buffer_type)?;
    options
        .limits
        .check_buffer(&buffer)
        .map_err(Error::limit_during)?;
    Ok(buffer)
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode an in-memory image.
///
/// `bytes` may be borrowed for synchronous use or owned (`Vec<u8>`,
/// `Arc<[u8]>`) when the unit is scheduled.
pub fn decode<'a, B>(bytes: B, buffer_type: Option<BufferType>) -> Result<WorkUnit<'a, Buffer>>
where
    B: AsRef<[u8]> + Send + 'a,
{
    decode_with(
        bytes,
        &DecodeOptions {
            buffer_type,
            ..DecodeOptions::default()
        },
    )
}

/// Decode an in-memory image, enforcing `options.limits`.
pub fn decode_with<'a, B>(bytes: B, options: &DecodeOptions) -> Result<WorkUnit<'a, Buffer>>
where
    B: AsRef<[u8]> + Send + 'a,
{
    check_decode_type(options.buffer_type)?;
    options
        .limits
        .check_file_size(bytes.as_ref().len() as u64)
        .map_err(Error::limit_before)?;
    let options = options.clone();
    Ok(WorkUnit::new("decode", move || {
        decode_bytes(bytes.as_ref(), &options, || {
            Error::execution("invalid image data")
        })
    }))
}

/// Read and decode an image file.
pub fn read(
    path: impl AsRef<Path>,
    buffer_type: Option<BufferType>,
) -> Result<WorkUnit<'static, Buffer>> {
    read_with(
        path,
        &DecodeOptions {
            buffer_type,
            ..DecodeOptions::default()
        },
    )
}

/// Read and decode an image file, enforcing `options.limits`.
pub fn read_with(path: impl AsRef<Path>, options: &DecodeOptions) -> Result<WorkUnit<'static, Buffer>> {
    check_decode_type(options.buffer_type)?;
    let path = path.as_ref().to_path_buf();
    let options = options.clone();
    Ok(WorkUnit::new("read", move || {
        log::debug!("reading {}", path.display());
        let invalid_file = || Error::execution(format!("invalid image file \"{}\"", path.display()));
        let size = fs::metadata(&path).map_err(|_| invalid_file())?.len();
        options
            .limits
            .check_file_size(size)
            .map_err(Error::limit_during)?;
        let data = fs::read(&path).map_err(|_| invalid_file())?;
        decode_bytes(&data, &options, invalid_file)
    }))
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

fn check_encodable(buffer: &Buffer, format: ImageFormat, options: &EncodeOptions) -> Result<()> {
    require_8bit(buffer, "encode")?;
    if !format.can_encode() {
        return Err(Error::invalid(format!(
            "format must be one of [JPEG, PNG], got {format}"
        )));
    }
    if !(1..=100).contains(&options.jpeg_quality) {
        return Err(Error::invalid("JPEG quality must be between 1 and 100"));
    }
    Ok(())
}

fn encode_bytes(buffer: &Buffer, format: ImageFormat, options: &EncodeOptions) -> Result<EncodeOutput> {
    let mut img = imaging::to_dynamic(buffer)?;
    if img.color().has_alpha() && !format.supports_alpha() {
        img = DynamicImage::ImageRgb8(img.to_rgb8());
    }
    let mut data = Vec::new();
    let result = match format {
        ImageFormat::Jpeg => img.write_with_encoder(JpegEncoder::new_with_quality(
            &mut data,
            options.jpeg_quality,
        )),
        _ => img.write_with_encoder(PngEncoder::new(&mut data)),
    };
    result.map_err(|e| Error::execution(format!("{format} encoding failed: {e}")))?;
    options
        .limits
        .check_output_size(data.len() as u64)
        .map_err(Error::limit_during)?;
    log::debug!("encoded {:?} as {format} ({} bytes)", buffer, data.len());
    Ok(EncodeOutput::new(data, format))
}

/// Encode to PNG or JPEG (quality [`DEFAULT_JPEG_QUALITY`]).
pub fn encode<'a, B>(buffer: B, format: ImageFormat) -> Result<WorkUnit<'a, EncodeOutput>>
where
    B: Borrow<Buffer> + Send + 'a,
{
    encode_with(buffer, format, &EncodeOptions::default())
}

/// Encode with explicit options.
pub fn encode_with<'a, B>(
    buffer: B,
    format: ImageFormat,
    options: &EncodeOptions,
) -> Result<WorkUnit<'a, EncodeOutput>>
where
    B: Borrow<Buffer> + Send + 'a,
{
    check_encodable(buffer.borrow(), format, options)?;
    let options = options.clone();
    Ok(WorkUnit::new("encode", move || {
        encode_bytes(buffer.borrow(), format, &options)
    }))
}

/// Encode and write to `path`, creating parent directories as needed.
///
/// The format follows the file extension; JPEG output drops alpha.
pub fn write<'a, B>(buffer: B, path: impl AsRef<Path>) -> Result<WorkUnit<'a, ()>>
where
    B: Borrow<Buffer> + Send + 'a,
{
    let path = path.as_ref().to_path_buf();
    let format = ImageFormat::from_path(&path).ok_or_else(|| {
        Error::invalid(format!(
            "cannot tell the image format of \"{}\" from its extension",
            path.display()
        ))
    })?;
    let options = EncodeOptions::default();
    check_encodable(buffer.borrow(), format, &options)?;
    Ok(WorkUnit::new("write", move || {
        let encoded = encode_bytes(buffer.borrow(), format, &options)?;
        ensure_parent_dir(&path)?;
        log::debug!("writing {} bytes to {}", encoded.len(), path.display());
        fs::write(&path, encoded.bytes())
            .map_err(|e| Error::execution(format!("failed to write {}: {e}", path.display())))
    }))
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| {
            Error::execution(format!("failed to create {}: {e}", parent.display()))
        })?;
    }
    Ok(())
}
