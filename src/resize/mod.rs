//! Shrink-only resizing
//!
//! Entry point [`resize`] classifies an upload and dispatches it to the
//! raster or PDF resizer. Both paths preserve aspect ratio and never
//! upscale.
//!
//! # Architecture
//!
//! ```text
//!            bytes + MaxSide
//!                  │
//!          format::classify()
//!        ┌─────────┼──────────────┐
//!        ▼         ▼              ▼
//!   JPEG / PNG    PDF        Unsupported
//!        │         │              │
//!   raster.rs   pdf.rs ──► dyn PdfBackend
//!        │         │        (lopdf | unavailable)
//!        └────┬────┘
//!             ▼
//!        ResizeResult
//! ```

pub mod pdf;
pub mod raster;

use std::num::{IntErrorKind, NonZeroU32};

use crate::error::{ResizeError, Result};
use crate::format::{self, FormatTag};

pub use pdf::{default_backend, PdfBackend, UnavailableBackend};
pub use raster::resize_raster;

#[cfg(feature = "pdf")]
pub use pdf::LopdfBackend;

/// Side length used when neither the request nor the environment sets one
pub const DEFAULT_MAX_SIDE: u32 = 1024;

/// Upper bound on the longer side of the output, always positive
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MaxSide(NonZeroU32);

impl MaxSide {
    /// `None` for zero
    pub fn new(value: u32) -> Option<Self> {
        NonZeroU32::new(value).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }

    /// Parse a user-supplied value.
    ///
    /// Accepts surrounding whitespace and a leading sign. Zero and negative
    /// values are rejected; values beyond `u32::MAX` saturate.
    pub fn parse(raw: &str) -> Result<Self> {
        let value = match raw.trim().parse::<i64>() {
            Ok(value) => value,
            Err(e) => {
                return match e.kind() {
                    IntErrorKind::PosOverflow => Ok(Self(NonZeroU32::MAX)),
                    IntErrorKind::NegOverflow => Err(ResizeError::MaxSideNotPositive),
                    _ => Err(ResizeError::MaxSideNotInteger),
                }
            }
        };

        if value <= 0 {
            return Err(ResizeError::MaxSideNotPositive);
        }

        let value = u32::try_from(value).unwrap_or(u32::MAX);
        Self::new(value).ok_or(ResizeError::MaxSideNotPositive)
    }

    /// Resolve the effective value for a request: the first non-empty
    /// candidate wins, otherwise `default`.
    pub fn resolve<'a, I>(candidates: I, default: MaxSide) -> Result<Self>
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        candidates
            .into_iter()
            .flatten()
            .find(|raw| !raw.is_empty())
            .map(Self::parse)
            .unwrap_or(Ok(default))
    }
}

impl Default for MaxSide {
    fn default() -> Self {
        Self(NonZeroU32::new(DEFAULT_MAX_SIDE).unwrap_or(NonZeroU32::MIN))
    }
}

impl std::fmt::Display for MaxSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Resized output, handed straight back to the HTTP layer
#[derive(Debug, Clone)]
pub struct ResizeResult {
    pub data: Vec<u8>,
    pub mime_type: &'static str,
    pub extension: &'static str,
}

impl ResizeResult {
    /// Synthetic download name, e.g. `resized.jpg`
    pub fn file_name(&self) -> String {
        format!("resized.{}", self.extension)
    }
}

/// Compute thumbnail dimensions.
///
/// Returns the input unchanged when both sides already fit. Otherwise the
/// longer side becomes exactly `max_side` and the shorter side is rounded,
/// never below one pixel.
pub fn fit_within(width: u32, height: u32, max_side: MaxSide) -> (u32, u32) {
    let max = max_side.get();
    if width <= max && height <= max {
        return (width, height);
    }

    let scaled = |short: u32, long: u32| -> u32 {
        let short = u64::from(short);
        let long = u64::from(long);
        let value = (short * u64::from(max) + long / 2) / long;
        value.clamp(1, u64::from(max)) as u32
    };

    if width >= height {
        (max, scaled(height, width))
    } else {
        (scaled(width, height), max)
    }
}

/// Classify `bytes` and resize with the matching resizer.
pub fn resize(
    bytes: &[u8],
    max_side: MaxSide,
    pdf_backend: &dyn PdfBackend,
) -> Result<ResizeResult> {
    let tag = format::classify(bytes);
    tracing::debug!(format = tag.name(), max_side = max_side.get(), "Classified upload");

    if tag == FormatTag::Pdf {
        return pdf::resize_pdf(bytes, max_side, pdf_backend);
    }

    match tag.as_raster() {
        Some(raster_format) => resize_raster(bytes, raster_format, max_side),
        None => Err(ResizeError::UnsupportedFormat),
    }
}
