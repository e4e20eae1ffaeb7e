//! Encoded image bytes.

use crate::ImageFormat;

/// Result of [`io::encode`](crate::io::encode): the file bytes and the
/// container they were written in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodeOutput {
    bytes: Vec<u8>,
    format: ImageFormat,
}

impl EncodeOutput {
    pub(crate) fn new(bytes: Vec<u8>, format: ImageFormat) -> Self {
        Self { bytes, format }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    /// MIME type of the encoded container, e.g. `image/png`.
    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }
}

impl AsRef<[u8]> for EncodeOutput {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl From<EncodeOutput> for Vec<u8> {
    fn from(output: EncodeOutput) -> Self {
        output.bytes
    }
}
