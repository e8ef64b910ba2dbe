//! Resize Server Library
//!
//! Downscales uploaded JPEG, PNG and PDF files so that neither side exceeds
//! a maximum length. The main server binary is in main.rs.
//!
//! # Modules
//!
//! - `format`: Classifies uploads from their bytes
//! - `resize`: Shrink-only raster and PDF resizing
//! - `routes`: HTTP surface (`/health`, `/resize`)

pub mod config;
pub mod error;
pub mod format;
pub mod resize;
pub mod routes;
pub mod state;

pub use error::ResizeError;
pub use format::{classify, FormatTag, RasterFormat};
pub use resize::{MaxSide, ResizeResult};
pub use routes::router;
pub use state::AppState;
