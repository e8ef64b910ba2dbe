//! Upload classification
//!
//! Determines what an upload is from its bytes alone, ignoring any
//! client-declared content type. Classification is two-stage: a cheap
//! `%PDF` prefix check, then a raster header probe via the `image` crate.

use std::io::Cursor;

use image::{ImageFormat, ImageReader};

/// PDF magic: %PDF
const PDF_MAGIC: &[u8] = b"%PDF";

/// Logical format of an upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatTag {
    Pdf,
    Jpeg,
    Png,
    Unsupported,
}

/// The raster subset of [`FormatTag`] accepted by the raster resizer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterFormat {
    Jpeg,
    Png,
}

impl FormatTag {
    /// Raster format, if this tag is one
    pub fn as_raster(self) -> Option<RasterFormat> {
        match self {
            Self::Jpeg => Some(RasterFormat::Jpeg),
            Self::Png => Some(RasterFormat::Png),
            Self::Pdf | Self::Unsupported => None,
        }
    }

    /// Short name used in logs
    pub fn name(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Unsupported => "unsupported",
        }
    }
}

impl From<ImageFormat> for FormatTag {
    fn from(format: ImageFormat) -> Self {
        match format {
            ImageFormat::Jpeg => Self::Jpeg,
            ImageFormat::Png => Self::Png,
            _ => Self::Unsupported,
        }
    }
}

impl RasterFormat {
    /// Codec used to decode and re-encode this format
    pub fn image_format(self) -> ImageFormat {
        match self {
            Self::Jpeg => ImageFormat::Jpeg,
            Self::Png => ImageFormat::Png,
        }
    }

    /// MIME type of the re-encoded output
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }

    /// Canonical file extension of the re-encoded output
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }
}

/// Classify an upload buffer.
///
/// Never fails: anything that is neither a PDF nor a readable JPEG/PNG
/// header is [`FormatTag::Unsupported`].
pub fn classify(bytes: &[u8]) -> FormatTag {
    if bytes.starts_with(PDF_MAGIC) {
        return FormatTag::Pdf;
    }

    let reader = match ImageReader::new(Cursor::new(bytes)).with_guessed_format() {
        Ok(reader) => reader,
        Err(_) => return FormatTag::Unsupported,
    };

    let tag = reader
        .format()
        .map(FormatTag::from)
        .unwrap_or(FormatTag::Unsupported);

    if tag == FormatTag::Unsupported {
        return tag;
    }

    // The signature matched; the header must also parse.
    match reader.into_dimensions() {
        Ok(_) => tag,
        Err(_) => FormatTag::Unsupported,
    }
}
