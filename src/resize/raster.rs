//! Raster resizing for JPEG and PNG uploads
//!
//! Decodes with the `image` crate, shrinks with Lanczos3 resampling and
//! re-encodes in the source format family. Palette PNGs take a separate
//! path through the `png` crate so they come back indexed.

use std::io::Cursor;

use image::codecs::png::{CompressionType, FilterType as PngFilterType, PngEncoder};
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageReader};
use jpeg_encoder::{ColorType as JpegColorType, Encoder as JpegEncoder};

use super::{fit_within, MaxSide, ResizeResult};
use crate::error::{ResizeError, Result};
use crate::format::RasterFormat;

/// JPEG output quality (1-100)
pub const JPEG_QUALITY: u8 = 85;

/// Decode, shrink and re-encode a JPEG or PNG buffer.
pub fn resize_raster(
    bytes: &[u8],
    format: RasterFormat,
    max_side: MaxSide,
) -> Result<ResizeResult> {
    let data = match format {
        RasterFormat::Png if is_indexed_png(bytes) => resize_indexed_png(bytes, max_side)?,
        _ => {
            let img = decode(bytes, format)?;
            let img = shrink(img, max_side);
            match format {
                RasterFormat::Jpeg => encode_jpeg(img)?,
                RasterFormat::Png => encode_png(&img)?,
            }
        }
    };

    Ok(ResizeResult {
        data,
        mime_type: format.mime_type(),
        extension: format.extension(),
    })
}

fn decode(bytes: &[u8], format: RasterFormat) -> Result<DynamicImage> {
    ImageReader::with_format(Cursor::new(bytes), format.image_format())
        .decode()
        .map_err(|e| {
            tracing::debug!(error = %e, "Raster decode failed");
            ResizeError::Decode
        })
}

fn shrink(img: DynamicImage, max_side: MaxSide) -> DynamicImage {
    let (width, height) = (img.width(), img.height());
    let (new_width, new_height) = fit_within(width, height, max_side);

    tracing::debug!(
        width,
        height,
        new_width,
        new_height,
        color = ?img.color(),
        "Resizing raster"
    );

    if (new_width, new_height) == (width, height) {
        img
    } else {
        img.resize_exact(new_width, new_height, FilterType::Lanczos3)
    }
}

/// JPEG has no alpha or palette; anything but RGB and 8-bit gray becomes RGB.
fn jpeg_compatible(img: DynamicImage) -> DynamicImage {
    match img {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageLuma8(_) => img,
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}

/// Baseline JPEG with optimized Huffman tables
fn encode_jpeg(img: DynamicImage) -> Result<Vec<u8>> {
    let img = jpeg_compatible(img);
    let width = u16::try_from(img.width())
        .map_err(|_| ResizeError::Encode(format!("JPEG: width {} too large", img.width())))?;
    let height = u16::try_from(img.height())
        .map_err(|_| ResizeError::Encode(format!("JPEG: height {} too large", img.height())))?;
    let color = match img {
        DynamicImage::ImageLuma8(_) => JpegColorType::Luma,
        _ => JpegColorType::Rgb,
    };

    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new(&mut out, JPEG_QUALITY);
    encoder.set_optimized_huffman_tables(true);
    encoder
        .encode(img.as_bytes(), width, height, color)
        .map_err(|e| ResizeError::Encode(format!("JPEG: {}", e)))?;
    Ok(out)
}

/// Best compression with adaptive filtering; color type is kept as decoded.
fn encode_png(img: &DynamicImage) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let encoder =
        PngEncoder::new_with_quality(&mut out, CompressionType::Best, PngFilterType::Adaptive);
    img.write_with_encoder(encoder)
        .map_err(|e| ResizeError::Encode(format!("PNG: {}", e)))?;
    Ok(out)
}

fn is_indexed_png(bytes: &[u8]) -> bool {
    png::Decoder::new(Cursor::new(bytes))
        .read_info()
        .map(|reader| reader.info().color_type == png::ColorType::Indexed)
        .unwrap_or(false)
}

/// Resize a palette PNG without leaving palette mode.
///
/// Indices can't be blended, so resampling is nearest-neighbour. The
/// palette and any tRNS chunk are written back unchanged.
fn resize_indexed_png(bytes: &[u8], max_side: MaxSide) -> Result<Vec<u8>> {
    let png_error = |e: png::DecodingError| {
        tracing::debug!(error = %e, "Palette PNG decode failed");
        ResizeError::Decode
    };

    let mut decoder = png::Decoder::new(Cursor::new(bytes));
    decoder.set_transformations(png::Transformations::IDENTITY);
    let mut reader = decoder.read_info().map_err(png_error)?;

    let mut buf = vec![0; reader.output_buffer_size()];
    let frame = reader.next_frame(&mut buf).map_err(png_error)?;

    let info = reader.info();
    let palette = info.palette.as_ref().map(|p| p.to_vec()).ok_or(ResizeError::Decode)?;
    let trns = info.trns.as_ref().map(|t| t.to_vec());

    let indices = unpack_indices(
        &buf,
        frame.width,
        frame.height,
        frame.line_size,
        frame.bit_depth as u8,
    );
    let indices = GrayImage::from_raw(frame.width, frame.height, indices).ok_or(ResizeError::Decode)?;

    let (new_width, new_height) = fit_within(frame.width, frame.height, max_side);
    tracing::debug!(
        width = frame.width,
        height = frame.height,
        new_width,
        new_height,
        colors = palette.len() / 3,
        "Resizing palette PNG"
    );

    let indices = if (new_width, new_height) == (frame.width, frame.height) {
        indices
    } else {
        image::imageops::resize(&indices, new_width, new_height, FilterType::Nearest)
    };

    let encode_error = |e: png::EncodingError| ResizeError::Encode(format!("PNG: {}", e));

    let mut out = Vec::new();
    let mut encoder = png::Encoder::new(&mut out, new_width, new_height);
    encoder.set_color(png::ColorType::Indexed);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_palette(palette);
    if let Some(trns) = trns {
        encoder.set_trns(trns);
    }
    encoder.set_compression(png::Compression::Best);

    let mut writer = encoder.write_header().map_err(encode_error)?;
    writer.write_image_data(indices.as_raw()).map_err(encode_error)?;
    writer.finish().map_err(encode_error)?;

    Ok(out)
}

/// Expand packed 1/2/4-bit palette indices to one byte per pixel
fn unpack_indices(buf: &[u8], width: u32, height: u32, line_size: usize, depth: u8) -> Vec<u8> {
    let (width, height) = (width as usize, height as usize);
    if depth >= 8 {
        return buf
            .chunks(line_size)
            .take(height)
            .flat_map(|row| row[..width].iter().copied())
            .collect();
    }

    let depth = usize::from(depth);
    let mask = (1u8 << depth) - 1;
    let mut out = Vec::with_capacity(width * height);
    for row in buf.chunks(line_size).take(height) {
        for x in 0..width {
            let bit = x * depth;
            let shift = 8 - depth - bit % 8;
            out.push((row[bit / 8] >> shift) & mask);
        }
    }
    out
}
