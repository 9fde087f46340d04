//! Document library layer
//!
//! Trait seams for the external libraries plus their production adapters:
//! qpdf for page structure, lopdf for drawing, PDFium for rasterization,
//! and zip for packaging.

mod archive;
mod compose;
pub mod imaging;
mod library;
mod qpdf;
mod render;

pub use archive::ZipArchiver;
pub use compose::LopdfComposer;
pub use library::{
    ArchiveEntry, ArchiveWriter, EmbeddedImage, ImageCodec, PageComposer, PageEditor,
    PageRasterizer, PageSize, Placement, Rgb, TextStamp,
};
pub use self::qpdf::{normalize_rotation, QpdfEditor};
pub use render::PdfiumRasterizer;
