//! Tool catalog
//!
//! The static table of supported tools. Each entry is keyed by a string
//! identifier for routing, but dispatch goes through the closed [`ToolKind`]
//! enum so every tool has exactly one handler.

use crate::error::{Error, Result};
use serde::Serialize;

/// Every tool offered by the front end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolKind {
    MergePdf,
    SplitPdf,
    CompressPdf,
    PdfToWord,
    PdfToPowerpoint,
    PdfToExcel,
    WordToPdf,
    PowerpointToPdf,
    ExcelToPdf,
    EditPdf,
    PdfToJpg,
    JpgToPdf,
    SignPdf,
    Watermark,
    RotatePdf,
}

/// Transformation routines that run locally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutineKind {
    Merge,
    Split,
    ImagesToPdf,
    PdfToImages,
    Rotate,
    Watermark,
    Compress,
}

/// Why a cataloged tool cannot run in this deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeferredKind {
    /// Office format conversion needs a server-side engine
    Conversion,
    /// Editing and signing need an interactive canvas
    Interactive,
}

/// What triggering a tool does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Routine(RoutineKind),
    Deferred(DeferredKind),
}

impl ToolKind {
    pub fn operation(self) -> Operation {
        use ToolKind::*;
        match self {
            MergePdf => Operation::Routine(RoutineKind::Merge),
            SplitPdf => Operation::Routine(RoutineKind::Split),
            CompressPdf => Operation::Routine(RoutineKind::Compress),
            PdfToJpg => Operation::Routine(RoutineKind::PdfToImages),
            JpgToPdf => Operation::Routine(RoutineKind::ImagesToPdf),
            Watermark => Operation::Routine(RoutineKind::Watermark),
            RotatePdf => Operation::Routine(RoutineKind::Rotate),
            PdfToWord | PdfToPowerpoint | PdfToExcel | WordToPdf | PowerpointToPdf
            | ExcelToPdf => Operation::Deferred(DeferredKind::Conversion),
            EditPdf | SignPdf => Operation::Deferred(DeferredKind::Interactive),
        }
    }

    pub fn is_deferred(self) -> bool {
        matches!(self.operation(), Operation::Deferred(_))
    }
}

/// Immutable description of one tool
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub kind: ToolKind,
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    /// Advisory accept filter for pickers; never enforced
    pub accept: &'static str,
    pub icon: &'static str,
    pub path: &'static str,
    pub color: &'static str,
    pub hover_color: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_filename: Option<&'static str>,
}

macro_rules! tool {
    ($kind:ident, $id:literal, $title:literal, $desc:literal, $accept:literal, $icon:literal, $color:literal) => {
        ToolDescriptor {
            kind: ToolKind::$kind,
            id: $id,
            title: $title,
            description: $desc,
            accept: $accept,
            icon: $icon,
            path: concat!("/", $id),
            color: concat!("bg-", $color, "/10 text-", $color),
            hover_color: concat!("hover:bg-", $color, "/20"),
            output_filename: None,
        }
    };
}

/// The catalog, in display order
pub static TOOLS: &[ToolDescriptor] = &[
    tool!(MergePdf, "merge-pdf", "Merge PDF",
        "Combine PDFs in the order you want with the easiest PDF merger available.",
        ".pdf,application/pdf", "merge", "red-500"),
    tool!(SplitPdf, "split-pdf", "Split PDF",
        "Separate one page or a whole set for easy conversion into independent PDF files.",
        ".pdf,application/pdf", "split", "orange-500"),
    tool!(CompressPdf, "compress-pdf", "Compress PDF",
        "Reduce file size while optimizing for maximal PDF quality.",
        ".pdf,application/pdf", "compress", "green-500"),
    tool!(PdfToWord, "pdf-to-word", "PDF to Word",
        "Easily convert your PDF files into easy to edit DOC and DOCX documents.",
        ".pdf,application/pdf", "word", "blue-600"),
    tool!(PdfToPowerpoint, "pdf-to-powerpoint", "PDF to PowerPoint",
        "Turn your PDF files into easy to edit PPT and PPTX slideshows.",
        ".pdf,application/pdf", "powerpoint", "orange-600"),
    tool!(PdfToExcel, "pdf-to-excel", "PDF to Excel",
        "Pull data straight from PDFs into Excel spreadsheets in a few short seconds.",
        ".pdf,application/pdf", "excel", "green-600"),
    tool!(WordToPdf, "word-to-pdf", "Word to PDF",
        "Make DOC and DOCX files easy to read by converting them to PDF.",
        ".doc,.docx", "word", "blue-600"),
    tool!(PowerpointToPdf, "powerpoint-to-pdf", "PowerPoint to PDF",
        "Make PPT and PPTX slideshows easy to view by converting them to PDF.",
        ".ppt,.pptx", "powerpoint", "orange-600"),
    tool!(ExcelToPdf, "excel-to-pdf", "Excel to PDF",
        "Make Excel spreadsheets easy to read by converting them to PDF.",
        ".xls,.xlsx", "excel", "green-600"),
    tool!(EditPdf, "edit-pdf", "Edit PDF",
        "Add text, images, shapes or freehand annotations to a PDF document.",
        ".pdf,application/pdf", "edit", "purple-500"),
    tool!(PdfToJpg, "pdf-to-jpg", "PDF to JPG",
        "Convert each PDF page into a JPG or extract all images contained in a PDF.",
        ".pdf,application/pdf", "image", "yellow-500"),
    tool!(JpgToPdf, "jpg-to-pdf", "JPG to PDF",
        "Convert JPG images to PDF in seconds. Easily adjust orientation and margins.",
        "image/jpeg,image/png,.jpg,.jpeg,.png", "image", "yellow-600"),
    tool!(SignPdf, "sign-pdf", "Sign PDF",
        "Sign yourself or request electronic signatures from others.",
        ".pdf,application/pdf", "sign", "indigo-500"),
    tool!(Watermark, "watermark", "Watermark",
        "Stamp an image or text over your PDF in seconds.",
        ".pdf,application/pdf", "watermark", "pink-500"),
    tool!(RotatePdf, "rotate-pdf", "Rotate PDF",
        "Rotate your PDFs the way you need them. You can even rotate multiple PDFs at once!",
        ".pdf,application/pdf", "rotate", "teal-500"),
];

/// Look up a tool by its identifier
pub fn find_tool(id: &str) -> Result<&'static ToolDescriptor> {
    TOOLS
        .iter()
        .find(|t| t.id == id)
        .ok_or_else(|| Error::UnknownTool { id: id.to_string() })
}

/// Look up a tool by its route path (leading slash optional)
pub fn find_tool_by_path(path: &str) -> Option<&'static ToolDescriptor> {
    let normalized = path.trim_start_matches('#').trim_start_matches('/');
    TOOLS.iter().find(|t| &t.path[1..] == normalized)
}

/// The descriptor for a given kind
pub fn descriptor(kind: ToolKind) -> &'static ToolDescriptor {
    // Every variant has exactly one catalog row (see test_catalog_is_complete)
    TOOLS
        .iter()
        .find(|t| t.kind == kind)
        .unwrap_or(&TOOLS[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_catalog_is_complete() {
        let kinds: HashSet<ToolKind> = TOOLS.iter().map(|t| t.kind).collect();
        assert_eq!(kinds.len(), TOOLS.len());
        assert_eq!(TOOLS.len(), 15);
        for tool in TOOLS {
            assert_eq!(descriptor(tool.kind).id, tool.id);
        }
    }

    #[test]
    fn test_ids_and_paths_are_unique() {
        let ids: HashSet<&str> = TOOLS.iter().map(|t| t.id).collect();
        let paths: HashSet<&str> = TOOLS.iter().map(|t| t.path).collect();
        assert_eq!(ids.len(), TOOLS.len());
        assert_eq!(paths.len(), TOOLS.len());
    }

    #[test]
    fn test_find_tool() {
        assert_eq!(find_tool("merge-pdf").unwrap().kind, ToolKind::MergePdf);
        assert!(matches!(
            find_tool("shred-pdf"),
            Err(Error::UnknownTool { .. })
        ));
    }

    #[test]
    fn test_find_tool_by_path() {
        assert_eq!(
            find_tool_by_path("/rotate-pdf").map(|t| t.kind),
            Some(ToolKind::RotatePdf)
        );
        assert_eq!(
            find_tool_by_path("#/watermark").map(|t| t.kind),
            Some(ToolKind::Watermark)
        );
        assert!(find_tool_by_path("/nope").is_none());
    }

    #[test]
    fn test_deferred_classification() {
        let deferred: Vec<&str> = TOOLS
            .iter()
            .filter(|t| t.kind.is_deferred())
            .map(|t| t.id)
            .collect();
        assert_eq!(
            deferred,
            vec![
                "pdf-to-word",
                "pdf-to-powerpoint",
                "pdf-to-excel",
                "word-to-pdf",
                "powerpoint-to-pdf",
                "excel-to-pdf",
                "edit-pdf",
                "sign-pdf",
            ]
        );
        assert_eq!(
            ToolKind::SignPdf.operation(),
            Operation::Deferred(DeferredKind::Interactive)
        );
        assert_eq!(
            ToolKind::ExcelToPdf.operation(),
            Operation::Deferred(DeferredKind::Conversion)
        );
    }

    #[test]
    fn test_routine_mapping() {
        assert_eq!(
            ToolKind::JpgToPdf.operation(),
            Operation::Routine(RoutineKind::ImagesToPdf)
        );
        assert_eq!(
            ToolKind::PdfToJpg.operation(),
            Operation::Routine(RoutineKind::PdfToImages)
        );
    }
}
