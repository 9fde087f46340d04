//! Transformation routines
//!
//! Each routine reads its inputs fully, drives one or more document
//! libraries, and returns a single [`Payload`]. Any error aborts the whole
//! routine; only image embedding in [`Toolkit::images_to_pdf`] tolerates
//! per-item failures.

use crate::error::{Error, Result};
use crate::intake::InputFile;
use crate::pdf::imaging::{encode_jpeg, flatten_onto_white, infer_codec};
use crate::pdf::{
    ArchiveEntry, ArchiveWriter, LopdfComposer, PageComposer, PageEditor, PageRasterizer,
    PageSize, PdfiumRasterizer, Placement, QpdfEditor, Rgb, TextStamp, ZipArchiver,
};
use crate::pipeline::dispatch::Progress;
use image::DynamicImage;

/// Output of a routine, before it is published
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// One PDF document
    Document(Vec<u8>),
    /// A zip archive with the listed entry names, in order
    Archive { data: Vec<u8>, entries: Vec<String> },
}

impl Payload {
    pub fn mime(&self) -> &'static str {
        match self {
            Payload::Document(_) => "application/pdf",
            Payload::Archive { .. } => "application/zip",
        }
    }

    pub fn len(&self) -> usize {
        self.data().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data().is_empty()
    }

    pub fn data(&self) -> &[u8] {
        match self {
            Payload::Document(data) | Payload::Archive { data, .. } => data,
        }
    }

    pub fn entries(&self) -> &[String] {
        match self {
            Payload::Document(_) => &[],
            Payload::Archive { entries, .. } => entries,
        }
    }
}

/// Fixed parameters of the routines
#[derive(Debug, Clone)]
pub struct RoutineSettings {
    /// Minimum number of inputs for merging
    pub merge_min_inputs: usize,
    /// Page size for image pages
    pub image_page: PageSize,
    /// Blank border kept around an image page, in points
    pub image_margin: f32,
    /// Upscale factor when rasterizing pages
    pub render_scale: f32,
    pub jpeg_quality: u8,
    /// Added to each page's current rotation
    pub rotation_step: i32,
    pub watermark: TextStamp,
    /// Horizontal offset of the stamp origin from the page center
    pub watermark_offset_x: f32,
}

impl Default for RoutineSettings {
    fn default() -> Self {
        Self {
            merge_min_inputs: 2,
            image_page: PageSize::A4,
            image_margin: 20.0,
            render_scale: 2.0,
            jpeg_quality: 85,
            rotation_step: 90,
            watermark: TextStamp {
                text: "Ziva.pdf".to_string(),
                size: 50.0,
                color: Rgb(0.85, 0.14, 0.14),
                opacity: 0.2,
                rotate_degrees: 45.0,
            },
            watermark_offset_x: -100.0,
        }
    }
}

/// Scale an image to fit inside `page` minus `margin` on every side,
/// keeping its aspect ratio, and center it.
pub fn fit_within(width: u32, height: u32, page: PageSize, margin: f32) -> Placement {
    let avail_width = page.width - margin * 2.0;
    let avail_height = page.height - margin * 2.0;
    let scale = (avail_width / width as f32).min(avail_height / height as f32);
    let draw_width = width as f32 * scale;
    let draw_height = height as f32 * scale;
    Placement {
        x: (page.width - draw_width) / 2.0,
        y: (page.height - draw_height) / 2.0,
        width: draw_width,
        height: draw_height,
    }
}

/// Single-input tools consume only the first file
fn first(files: &[InputFile]) -> Result<&InputFile> {
    files.first().ok_or(Error::EmptySelection)
}

/// The routine layer with its document libraries injected
#[derive(Debug, Clone, Default)]
pub struct Toolkit<
    E = QpdfEditor,
    C = LopdfComposer,
    R = PdfiumRasterizer,
    A = ZipArchiver,
> {
    editor: E,
    composer: C,
    rasterizer: R,
    archiver: A,
    settings: RoutineSettings,
}

impl Toolkit {
    /// Production libraries with default settings
    pub fn standard() -> Self {
        Self::default()
    }
}

impl<E, C, R, A> Toolkit<E, C, R, A>
where
    E: PageEditor,
    C: PageComposer,
    R: PageRasterizer,
    A: ArchiveWriter,
{
    pub fn new(editor: E, composer: C, rasterizer: R, archiver: A) -> Self {
        Self {
            editor,
            composer,
            rasterizer,
            archiver,
            settings: RoutineSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: RoutineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &RoutineSettings {
        &self.settings
    }

    /// Append every page of every input, in selection order
    pub fn merge(&self, files: &[InputFile], progress: &Progress) -> Result<Payload> {
        if files.len() < self.settings.merge_min_inputs {
            return Err(Error::NotEnoughFiles {
                required: self.settings.merge_min_inputs,
                actual: files.len(),
            });
        }

        let dest = self.editor.create()?;
        for (i, file) in files.iter().enumerate() {
            progress.report(format!("Merging file {} of {}...", i + 1, files.len()));
            let source = self.editor.load(file.data())?;
            let pages = self.editor.page_count(&source)?;
            for page in 0..pages {
                self.editor.copy_page(&dest, &source, page)?;
            }
            tracing::debug!(file = %file.name, pages, "merged input");
        }

        Ok(Payload::Document(self.editor.save(&dest)?))
    }

    /// One single-page document per page, packaged as `page-<n>.pdf`
    pub fn split(&self, files: &[InputFile], progress: &Progress) -> Result<Payload> {
        let file = first(files)?;
        let source = self.editor.load(file.data())?;
        let pages = self.editor.page_count(&source)?;

        let mut entries = Vec::with_capacity(pages as usize);
        for page in 0..pages {
            let single = self.editor.create()?;
            self.editor.copy_page(&single, &source, page)?;
            entries.push(ArchiveEntry {
                name: format!("page-{}.pdf", page + 1),
                data: self.editor.save(&single)?,
            });
            progress.report(format!("Splitting page {} of {}...", page + 1, pages));
        }

        self.archive(entries)
    }

    /// One page per embeddable image; images that fail to embed are skipped
    pub fn images_to_pdf(&self, files: &[InputFile], progress: &Progress) -> Result<Payload> {
        let mut doc = self.composer.create();
        let mut skipped = 0usize;

        for (i, file) in files.iter().enumerate() {
            progress.report(format!("Processing image {}/{}...", i + 1, files.len()));
            let codec = infer_codec(file);
            let image = match self.composer.embed_image(&mut doc, file.data(), codec) {
                Ok(image) => image,
                Err(e) => {
                    tracing::warn!(file = %file.name, ?codec, error = %e, "could not embed image, skipping");
                    skipped += 1;
                    continue;
                }
            };

            let page = self.settings.image_page;
            let placement = fit_within(image.width, image.height, page, self.settings.image_margin);
            self.composer.add_image_page(&mut doc, page, &image, placement)?;
        }

        if skipped == files.len() {
            return Err(Error::UnsupportedImage {
                reason: format!("none of the {} images could be embedded", files.len()),
            });
        }

        Ok(Payload::Document(self.composer.save(&mut doc)?))
    }

    /// Rasterize every page to JPEG, packaged as `page-<n>.jpg`
    pub fn pdf_to_images(&self, files: &[InputFile], progress: &Progress) -> Result<Payload> {
        let file = first(files)?;
        let total = self.rasterizer.page_count(file.data())?;
        let quality = self.settings.jpeg_quality;

        let mut entries = Vec::with_capacity(total as usize);
        self.rasterizer
            .render_pages(
                file.data(),
                self.settings.render_scale,
                &mut |page: u32, bitmap: DynamicImage| -> Result<()> {
                    progress.report(format!("Rendering page {} of {}...", page, total));
                    let flat = flatten_onto_white(bitmap);
                    entries.push(ArchiveEntry {
                        name: format!("page-{}.jpg", page),
                        data: encode_jpeg(&flat, quality)?,
                    });
                    Ok(())
                },
            )?;

        self.archive(entries)
    }

    /// Add the rotation step to every page's current angle
    pub fn rotate(&self, files: &[InputFile], progress: &Progress) -> Result<Payload> {
        let file = first(files)?;
        let doc = self.editor.load(file.data())?;
        let pages = self.editor.page_count(&doc)?;
        progress.report(format!("Rotating {} pages...", pages));

        for page in 0..pages {
            let current = self.editor.rotation(&doc, page)?;
            self.editor
                .set_rotation(&doc, page, current + self.settings.rotation_step)?;
        }

        Ok(Payload::Document(self.editor.save(&doc)?))
    }

    /// Stamp the watermark text across the center of every page
    pub fn watermark(&self, files: &[InputFile], progress: &Progress) -> Result<Payload> {
        let file = first(files)?;
        let mut doc = self.composer.load(file.data())?;
        let pages = self.composer.page_count(&doc);
        progress.report(format!("Watermarking {} pages...", pages));

        let stamp = &self.settings.watermark;
        for page in 0..pages {
            let size = self.composer.page_size(&doc, page)?;
            let x = size.width / 2.0 + self.settings.watermark_offset_x;
            let y = size.height / 2.0;
            self.composer.draw_text(&mut doc, page, stamp, x, y)?;
        }

        Ok(Payload::Document(self.composer.save(&mut doc)?))
    }

    /// Structural rewrite only; the output is not guaranteed to be smaller
    pub fn compress(&self, files: &[InputFile], progress: &Progress) -> Result<Payload> {
        let file = first(files)?;
        progress.report("Optimizing document structure...");
        let doc = self.editor.load(file.data())?;
        let output = self.editor.save_optimized(&doc)?;
        tracing::info!(
            original_size = file.size(),
            output_size = output.len(),
            "compress pass finished"
        );
        Ok(Payload::Document(output))
    }

    fn archive(&self, entries: Vec<ArchiveEntry>) -> Result<Payload> {
        let data = self.archiver.package(&entries)?;
        Ok(Payload::Archive {
            data,
            entries: entries.into_iter().map(|e| e.name).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_within_landscape_image() {
        let page = PageSize {
            width: 600.0,
            height: 800.0,
        };
        let placement = fit_within(1120, 560, page, 20.0);
        assert!((placement.width - 560.0).abs() < 0.001);
        assert!((placement.height - 280.0).abs() < 0.001);
        assert!((placement.x - 20.0).abs() < 0.001);
        assert!((placement.y - 260.0).abs() < 0.001);
    }

    #[test]
    fn test_fit_within_upscales_small_images() {
        let page = PageSize {
            width: 600.0,
            height: 800.0,
        };
        let placement = fit_within(10, 20, page, 20.0);
        assert!((placement.height - 760.0).abs() < 0.001);
        assert!((placement.width - 380.0).abs() < 0.001);
        assert!((placement.x - 110.0).abs() < 0.001);
        assert!((placement.y - 20.0).abs() < 0.001);
    }

    #[test]
    fn test_payload_accessors() {
        let doc = Payload::Document(b"%PDF-1.7".to_vec());
        assert_eq!(doc.mime(), "application/pdf");
        assert!(doc.entries().is_empty());

        let archive = Payload::Archive {
            data: vec![1, 2, 3],
            entries: vec!["page-1.pdf".to_string()],
        };
        assert_eq!(archive.mime(), "application/zip");
        assert_eq!(archive.len(), 3);
        assert_eq!(archive.entries(), ["page-1.pdf".to_string()]);
    }

    #[test]
    fn test_default_settings() {
        let settings = RoutineSettings::default();
        assert_eq!(settings.merge_min_inputs, 2);
        assert_eq!(settings.image_margin, 20.0);
        assert_eq!(settings.render_scale, 2.0);
        assert_eq!(settings.jpeg_quality, 85);
        assert_eq!(settings.rotation_step, 90);
        assert_eq!(settings.watermark.text, "Ziva.pdf");
    }
}
