//! Seams between the routines and the external document libraries
//!
//! Routines only talk to these traits, so each library can be swapped for
//! an in-memory fake in tests.

use crate::error::Result;
use image::DynamicImage;

/// Structural page operations: load, copy, rotate, serialize.
pub trait PageEditor: Send + Sync {
    type Document;

    fn create(&self) -> Result<Self::Document>;
    fn load(&self, data: &[u8]) -> Result<Self::Document>;
    fn page_count(&self, doc: &Self::Document) -> Result<u32>;
    /// Append page `index` (0-based) of `source` to the end of `dest`
    fn copy_page(&self, dest: &Self::Document, source: &Self::Document, index: u32) -> Result<()>;
    fn rotation(&self, doc: &Self::Document, index: u32) -> Result<i32>;
    fn set_rotation(&self, doc: &Self::Document, index: u32, degrees: i32) -> Result<()>;
    fn save(&self, doc: &Self::Document) -> Result<Vec<u8>>;
    /// Serialize with structural optimizations (object streams, stream compression)
    fn save_optimized(&self, doc: &Self::Document) -> Result<Vec<u8>>;
}

/// Page width and height in PDF points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    /// A4 portrait
    pub const A4: PageSize = PageSize {
        width: 595.28,
        height: 841.89,
    };
}

/// Where an image lands on its page
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Raster encodings the composer can embed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageCodec {
    Jpeg,
    Png,
}

/// An image embedded into a document, with its intrinsic pixel size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbeddedImage {
    pub id: (u32, u16),
    pub width: u32,
    pub height: u32,
}

/// RGB color with components in 0..=1
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb(pub f32, pub f32, pub f32);

/// Text drawn over a page
#[derive(Debug, Clone, PartialEq)]
pub struct TextStamp {
    pub text: String,
    pub size: f32,
    pub color: Rgb,
    pub opacity: f32,
    /// Counter-clockwise rotation in degrees
    pub rotate_degrees: f32,
}

/// Content-level drawing: new pages, embedded images, text.
pub trait PageComposer: Send + Sync {
    type Document;

    fn create(&self) -> Self::Document;
    fn load(&self, data: &[u8]) -> Result<Self::Document>;
    fn page_count(&self, doc: &Self::Document) -> u32;
    fn page_size(&self, doc: &Self::Document, index: u32) -> Result<PageSize>;
    fn embed_image(
        &self,
        doc: &mut Self::Document,
        data: &[u8],
        codec: ImageCodec,
    ) -> Result<EmbeddedImage>;
    /// Append a page of `size` showing `image` at `placement`
    fn add_image_page(
        &self,
        doc: &mut Self::Document,
        size: PageSize,
        image: &EmbeddedImage,
        placement: Placement,
    ) -> Result<()>;
    fn draw_text(
        &self,
        doc: &mut Self::Document,
        index: u32,
        stamp: &TextStamp,
        x: f32,
        y: f32,
    ) -> Result<()>;
    fn save(&self, doc: &mut Self::Document) -> Result<Vec<u8>>;
}

/// Renders document pages to bitmaps.
pub trait PageRasterizer: Send + Sync {
    fn page_count(&self, data: &[u8]) -> Result<u32>;

    /// Render every page at `scale`, in order, handing each bitmap to `sink`
    /// together with its 1-based page number.
    fn render_pages(
        &self,
        data: &[u8],
        scale: f32,
        sink: &mut dyn FnMut(u32, DynamicImage) -> Result<()>,
    ) -> Result<()>;
}

/// One named file inside an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub data: Vec<u8>,
}

/// Packages named entries into one compressed blob.
pub trait ArchiveWriter: Send + Sync {
    fn package(&self, entries: &[ArchiveEntry]) -> Result<Vec<u8>>;
}
