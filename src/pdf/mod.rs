//! PDF page rendering and chunking using pdfium.
//!
//! Phase 1 works on bounded batches of pages: each chunk is rendered to PNG
//! at the requested DPI, clamped to a maximum pixel dimension to keep vision
//! token usage under control, and handed to the analyzer as one unit.
//!
//! ## DPI Recommendations
//!
//! - **72 DPI**: fast, small files, quick previews
//! - **150 DPI**: good balance for vision models (recommended)
//! - **300 DPI**: better for small text, but far more tokens

// DPI and dimension calculations involve various cast types
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]

use std::path::Path;

use image::{imageops::FilterType, DynamicImage, ImageFormat};
use pdfium_render::prelude::*;
use tracing::{debug, info};

use crate::error::{LecternError, Result};

/// PDF points per inch - standard PostScript/PDF unit conversion factor.
const PDF_POINTS_PER_INCH: f32 = 72.0;

/// Default number of pages per analysis chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 10;

/// Default rendering resolution.
pub const DEFAULT_DPI: u32 = 150;

/// Maximum pixel dimension for a rendered page; larger renders are scaled
/// down preserving aspect ratio.
const MAX_DIMENSION: u32 = 2048;

/// Rendered page image with metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageImage {
    /// 1-based page number
    pub page_number: u32,
    /// PNG image data
    pub png_data: Vec<u8>,
}

impl PageImage {
    /// Size in bytes.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> usize {
        self.png_data.len()
    }
}

/// One bounded batch of consecutive rendered pages.
#[derive(Debug, Clone, Default)]
pub struct PageChunk {
    /// 0-based chunk index
    pub chunk_index: usize,
    /// 1-based first page in the chunk
    pub first_page: u32,
    /// 1-based last page in the chunk
    pub last_page: u32,
    /// Rendered pages, in page order
    pub pages: Vec<PageImage>,
}

impl PageChunk {
    /// PNG payloads in page order, ready to attach to a generation request.
    #[must_use]
    pub fn png_payloads(&self) -> Vec<Vec<u8>> {
        self.pages.iter().map(|p| p.png_data.clone()).collect()
    }
}

/// Renders PDF pages to PNG chunks for vision analysis.
#[derive(Debug)]
pub struct PdfRenderer {
    pdfium: Pdfium,
}

impl PdfRenderer {
    /// Create a new PDF renderer bound to the system pdfium library.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pdfium: Pdfium::default(),
        }
    }

    /// Get the number of pages in a PDF.
    ///
    /// # Errors
    ///
    /// Returns an error if the PDF cannot be loaded.
    pub fn page_count(&self, pdf_path: &Path) -> Result<usize> {
        let document = self.load(pdf_path)?;
        Ok(document.pages().len() as usize)
    }

    /// Render all pages of a PDF into chunks of at most `chunk_size` pages.
    ///
    /// # Errors
    ///
    /// Returns an error if the PDF cannot be loaded or a page fails to
    /// render or encode.
    pub fn render_chunks(
        &self,
        pdf_path: &Path,
        chunk_size: usize,
        dpi: u32,
    ) -> Result<Vec<PageChunk>> {
        let chunk_size = chunk_size.max(1);
        let document = self.load(pdf_path)?;
        let page_count = document.pages().len() as usize;
        info!(
            pages = page_count,
            chunk_size, dpi, "rendering PDF for analysis"
        );

        let mut pages = Vec::with_capacity(page_count);
        for (i, page) in document.pages().iter().enumerate() {
            let page_num = (i + 1) as u32;
            pages.push(render_page(&page, page_num, dpi)?);
        }

        let mut chunks = Vec::new();
        for (chunk_index, batch) in pages.chunks(chunk_size).enumerate() {
            let first_page = batch[0].page_number;
            let last_page = batch[batch.len() - 1].page_number;
            debug!(chunk_index, first_page, last_page, "chunked pages");
            chunks.push(PageChunk {
                chunk_index,
                first_page,
                last_page,
                pages: batch.to_vec(),
            });
        }

        info!(chunks = chunks.len(), "rendering complete");
        Ok(chunks)
    }

    fn load(&self, pdf_path: &Path) -> Result<PdfDocument<'_>> {
        self.pdfium
            .load_pdf_from_file(pdf_path, None)
            .map_err(|e| LecternError::Pdf(format!("failed to load {}: {e}", pdf_path.display())))
    }
}

impl Default for PdfRenderer {
    fn default() -> Self {
        Self::new()
    }
}

fn render_page(page: &PdfPage<'_>, page_num: u32, dpi: u32) -> Result<PageImage> {
    let width = page.width().value;
    let height = page.height().value;

    let render_config = PdfRenderConfig::new()
        .set_target_width((width * dpi as f32 / PDF_POINTS_PER_INCH) as i32)
        .set_target_height((height * dpi as f32 / PDF_POINTS_PER_INCH) as i32);

    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| LecternError::Pdf(format!("failed to render page {page_num}: {e}")))?;

    let image = clamp_dimensions(bitmap.as_image());

    let mut png_bytes = Vec::new();
    image
        .write_to(&mut std::io::Cursor::new(&mut png_bytes), ImageFormat::Png)
        .map_err(|e| LecternError::Pdf(format!("failed to encode page {page_num}: {e}")))?;

    Ok(PageImage {
        page_number: page_num,
        png_data: png_bytes,
    })
}

/// Scale an image down to fit within [`MAX_DIMENSION`], preserving aspect
/// ratio. Images already within limits are returned untouched.
fn clamp_dimensions(image: DynamicImage) -> DynamicImage {
    let (width, height) = (image.width(), image.height());
    if width <= MAX_DIMENSION && height <= MAX_DIMENSION {
        return image;
    }

    let scale = f64::from(MAX_DIMENSION) / f64::from(width.max(height));
    let new_width = (f64::from(width) * scale) as u32;
    let new_height = (f64::from(height) * scale) as u32;
    debug!(
        from = format!("{width}x{height}"),
        to = format!("{new_width}x{new_height}"),
        "resizing oversized page render"
    );
    image.resize(new_width, new_height, FilterType::Lanczos3)
}
