//! qpdf FFI adapter for structural page operations
//!
//! Page copying, rotation and serialization go through the qpdf crate
//! (vendored FFI). Documents are opened from memory only.

use crate::error::{Error, Result};
use crate::pdf::library::PageEditor;
use qpdf::{ObjectStreamMode, QPdf, QPdfDictionary, QPdfObjectLike, QPdfObjectType, QPdfScalar};

/// qpdf-backed [`PageEditor`]
#[derive(Debug, Clone, Copy, Default)]
pub struct QpdfEditor;

/// Map qpdf crate errors to our error types
fn map_qpdf_error(e: qpdf::QPdfError) -> Error {
    Error::QpdfError {
        reason: e.to_string(),
    }
}

fn page_at(doc: &QPdf, index: u32) -> Result<QPdfDictionary> {
    doc.get_page(index).ok_or_else(|| Error::QpdfError {
        reason: format!("page index {} out of range", index),
    })
}

/// Bound on page-tree levels walked for inherited attributes
const MAX_TREE_DEPTH: usize = 32;

/// Clamp any multiple of 90 into 0..360
pub fn normalize_rotation(degrees: i32) -> i32 {
    degrees.rem_euclid(360)
}

impl PageEditor for QpdfEditor {
    type Document = QPdf;

    fn create(&self) -> Result<QPdf> {
        Ok(QPdf::empty())
    }

    fn load(&self, data: &[u8]) -> Result<QPdf> {
        if data.len() < 4 || &data[0..4] != b"%PDF" {
            return Err(Error::InvalidPdf {
                reason: "Not a valid PDF file".to_string(),
            });
        }
        QPdf::read_from_memory(data).map_err(map_qpdf_error)
    }

    fn page_count(&self, doc: &QPdf) -> Result<u32> {
        doc.get_num_pages().map_err(map_qpdf_error)
    }

    fn copy_page(&self, dest: &QPdf, source: &QPdf, index: u32) -> Result<()> {
        let page = page_at(source, index)?;
        let copied = dest.copy_from_foreign(&page);
        dest.add_page(&copied, false).map_err(map_qpdf_error)
    }

    fn rotation(&self, doc: &QPdf, index: u32) -> Result<i32> {
        // /Rotate is inheritable: fall back to the nearest ancestor in /Pages
        let mut node = page_at(doc, index)?;
        for _ in 0..MAX_TREE_DEPTH {
            if let Some(rotate) = node.get("/Rotate") {
                return Ok(QPdfScalar::from(rotate).as_i32());
            }
            match node.get("/Parent") {
                Some(parent) if parent.get_type() == QPdfObjectType::Dictionary => {
                    node = QPdfDictionary::from(parent);
                }
                _ => break,
            }
        }
        Ok(0)
    }

    fn set_rotation(&self, doc: &QPdf, index: u32, degrees: i32) -> Result<()> {
        let page = page_at(doc, index)?;
        let value = doc.new_integer(normalize_rotation(degrees) as i64);
        page.set("/Rotate", &value);
        Ok(())
    }

    fn save(&self, doc: &QPdf) -> Result<Vec<u8>> {
        let mut writer = doc.writer();
        writer.preserve_encryption(false);
        writer.write_to_memory().map_err(map_qpdf_error)
    }

    fn save_optimized(&self, doc: &QPdf) -> Result<Vec<u8>> {
        let mut writer = doc.writer();
        writer
            .object_stream_mode(ObjectStreamMode::Generate)
            .compress_streams(true)
            .preserve_unreferenced_objects(false)
            .preserve_encryption(false);
        writer.write_to_memory().map_err(map_qpdf_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_rotation() {
        assert_eq!(normalize_rotation(0), 0);
        assert_eq!(normalize_rotation(90), 90);
        assert_eq!(normalize_rotation(360), 0);
        assert_eq!(normalize_rotation(450), 90);
        assert_eq!(normalize_rotation(-90), 270);
    }

    #[test]
    fn test_load_rejects_non_pdf() {
        let editor = QpdfEditor;
        assert!(matches!(
            editor.load(b"GIF89a...."),
            Err(Error::InvalidPdf { .. })
        ));
        assert!(editor.load(b"").is_err());
    }

    #[test]
    fn test_empty_document_has_no_pages() {
        let editor = QpdfEditor;
        let doc = editor.create().unwrap();
        assert_eq!(editor.page_count(&doc).unwrap(), 0);
    }
}
