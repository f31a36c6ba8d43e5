//! PDF rasterisation via pdfium (`pdfium` feature).
//!
//! pdfium keeps thread-local state and is not safe to call from async
//! contexts; like every other stage this only runs inside `spawn_blocking`.
//!
//! The longest edge is capped in pixels rather than set by DPI: an A0
//! poster at 150 DPI would otherwise come out at roughly 12,000 × 17,000 px.

use crate::error::{DocsmithError, Result};
use image::DynamicImage;
use pdfium_render::prelude::*;
use tracing::{debug, info};

/// Longest edge of a rendered page, in pixels.
pub const MAX_RENDERED_PIXELS: u32 = 2000;

/// Environment variable naming a pdfium shared library to load instead of
/// the system one.
pub const LIBRARY_ENV: &str = "PDFIUM_LIB_PATH";

fn bind() -> Result<Pdfium> {
    let bindings = match std::env::var(LIBRARY_ENV) {
        Ok(path) => Pdfium::bind_to_library(&path),
        Err(_) => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| DocsmithError::processing("could not load pdfium", format!("{e:?}")))?;
    Ok(Pdfium::new(bindings))
}

/// Render every page, in order.
pub fn render_pages(name: &str, bytes: &[u8]) -> Result<Vec<DynamicImage>> {
    let pdfium = bind()?;
    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| DocsmithError::processing(&format!("'{name}' is corrupt"), format!("{e:?}")))?;

    let pages = document.pages();
    info!("Rendering '{}': {} pages", name, pages.len());

    let render_config = PdfRenderConfig::new()
        .set_target_width(MAX_RENDERED_PIXELS as i32)
        .set_maximum_height(MAX_RENDERED_PIXELS as i32);

    let mut images = Vec::with_capacity(pages.len() as usize);
    for (idx, page) in pages.iter().enumerate() {
        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            DocsmithError::processing(&format!("rendering page {}", idx + 1), format!("{e:?}"))
        })?;
        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );
        images.push(image);
    }
    Ok(images)
}
