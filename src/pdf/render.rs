//! PDFium adapter for page rasterization

use crate::error::{Error, Result};
use crate::pdf::library::PageRasterizer;
use image::DynamicImage;
use pdfium_render::prelude::*;

/// Bind a fresh PDFium instance for each call
fn create_pdfium() -> Result<Pdfium> {
    // Bundled library next to the binary, then /opt, then the system path
    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(
                "/opt/pdfium/lib",
            ))
        })
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| Error::Pdfium {
            reason: format!("Failed to initialize PDFium: {}", e),
        })?;

    Ok(Pdfium::new(bindings))
}

fn map_pdfium_error(err: PdfiumError) -> Error {
    Error::Pdfium {
        reason: err.to_string(),
    }
}

/// PDFium-backed [`PageRasterizer`]
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfiumRasterizer;

impl PdfiumRasterizer {
    /// Whether the PDFium shared library can be bound on this machine
    pub fn is_available() -> bool {
        create_pdfium().is_ok()
    }
}

impl PageRasterizer for PdfiumRasterizer {
    fn page_count(&self, data: &[u8]) -> Result<u32> {
        let pdfium = create_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(data, None)
            .map_err(map_pdfium_error)?;
        Ok(document.pages().len() as u32)
    }

    fn render_pages(
        &self,
        data: &[u8],
        scale: f32,
        sink: &mut dyn FnMut(u32, DynamicImage) -> Result<()>,
    ) -> Result<()> {
        if data.len() < 4 || &data[0..4] != b"%PDF" {
            return Err(Error::InvalidPdf {
                reason: "Not a valid PDF file".to_string(),
            });
        }

        let pdfium = create_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(data, None)
            .map_err(map_pdfium_error)?;

        let config = PdfRenderConfig::new()
            .scale_page_by_factor(scale)
            .set_clear_color(PdfColor::WHITE)
            .render_form_data(true)
            .render_annotations(true);

        for (index, page) in document.pages().iter().enumerate() {
            let page_num = index as u32 + 1;
            let bitmap = page
                .render_with_config(&config)
                .map_err(|e| Error::Pdfium {
                    reason: format!("Failed to render page {}: {}", page_num, e),
                })?;
            tracing::debug!(page = page_num, "rendered page");
            sink(page_num, bitmap.as_image())?;
        }

        Ok(())
    }
}
