//! Raster image stages: exact resize and JPEG encoding.
//!
//! JPEG has no alpha channel and the encoder rejects RGBA buffers, so every
//! image is flattened onto white before it is written out.

use crate::error::Result;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use tracing::debug;

/// Decode any supported image (JPEG, PNG, GIF first frame).
pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    Ok(image::load_from_memory(bytes)?)
}

/// Resize to exactly `width` × `height` (aspect ratio is not preserved) and
/// re-encode as JPEG.
pub fn resize_to_jpeg(bytes: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let img = decode(bytes)?;
    debug!(
        "Resizing {}x{} → {}x{}",
        img.width(),
        img.height(),
        width,
        height
    );
    let resized = img.resize_exact(width, height, FilterType::Lanczos3);
    encode_jpeg(&resized)
}

/// Encode as baseline JPEG at the encoder's default quality.
pub fn encode_jpeg(img: &DynamicImage) -> Result<Vec<u8>> {
    let rgb = DynamicImage::ImageRgb8(flatten(img));
    let mut buf = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)?;
    debug!("Encoded JPEG → {} bytes", buf.len());
    Ok(buf)
}

/// Composite onto an opaque white background.
pub fn flatten(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }
    let rgba = img.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, px) in rgba.enumerate_pixels() {
        let alpha = u16::from(px[3]);
        let blend = |c: u8| ((u16::from(c) * alpha + 255 * (255 - alpha)) / 255) as u8;
        out.put_pixel(x, y, Rgb([blend(px[0]), blend(px[1]), blend(px[2])]));
    }
    out
}
