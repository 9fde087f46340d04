//! Error types for the Ziva.pdf toolkit

use thiserror::Error;

/// Result type alias for the Ziva.pdf toolkit
pub type Result<T> = std::result::Result<T, Error>;

/// Generic message shown for any failure inside a transformation routine.
pub const PROCESSING_FAILED_MESSAGE: &str =
    "An error occurred while processing the file. Please try a valid PDF.";

/// Error types for the Ziva.pdf toolkit
#[derive(Error, Debug)]
pub enum Error {
    /// A routine needs more inputs than the selection holds
    #[error("At least {required} files are required, got {actual}")]
    NotEnoughFiles { required: usize, actual: usize },

    /// Action triggered with nothing selected
    #[error("No files selected")]
    EmptySelection,

    /// Unknown tool identifier or route
    #[error("Unknown tool: {id}")]
    UnknownTool { id: String },

    /// Invalid PDF file
    #[error("Invalid PDF file: {reason}")]
    InvalidPdf { reason: String },

    /// Image could not be embedded or encoded
    #[error("Unsupported image: {reason}")]
    UnsupportedImage { reason: String },

    /// Image codec error
    #[error("Image codec error: {0}")]
    Image(#[from] image::ImageError),

    /// qpdf error
    #[error("qpdf error: {reason}")]
    QpdfError { reason: String },

    /// lopdf error
    #[error("Document composition error: {0}")]
    Compose(#[from] lopdf::Error),

    /// PDFium error
    #[error("PDFium error: {reason}")]
    Pdfium { reason: String },

    /// Archive packaging error
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Blocking task failed to complete
    #[error("Background task failed: {reason}")]
    Task { reason: String },

    /// Published result handle was revoked or evicted
    #[error("Result handle revoked: {handle}")]
    ResultRevoked { handle: String },

    /// Source resolution error
    #[error("Failed to resolve source: {reason}")]
    SourceResolution { reason: String },

    /// Base64 decode error
    #[error("Invalid base64 data: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Path access denied (outside allowed resource directories)
    #[error("Path access denied: {path}")]
    PathAccessDenied { path: String },

    /// SSRF blocked (URL resolves to private/reserved IP)
    #[error("SSRF blocked: {url}")]
    SsrfBlocked { url: String },

    /// Download too large
    #[error("Download too large: {size} bytes (max: {max_size} bytes)")]
    DownloadTooLarge { size: u64, max_size: u64 },

    /// Identity service rejected the request
    #[error("Identity service error: {reason}")]
    Identity { reason: String },

    /// Identity service is not configured for this deployment
    #[error("Identity service not configured")]
    IdentityUnavailable,
}

impl Error {
    /// Validation failures are reported with their own message; everything
    /// else raised inside a routine collapses to the generic message.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::NotEnoughFiles { .. } | Error::EmptySelection)
    }

    /// Return a sanitized error message safe to send to clients.
    /// Internal details (paths, library errors, file sizes) are omitted.
    /// Full details should be logged via tracing before calling this.
    pub fn client_message(&self) -> String {
        match self {
            Error::NotEnoughFiles { required, .. } => {
                format!("Please select at least {} PDF files to merge.", required)
            }
            Error::EmptySelection => "Please select at least one file.".to_string(),
            Error::UnknownTool { id } => format!("Unknown tool: {}", id),
            Error::InvalidPdf { .. }
            | Error::UnsupportedImage { .. }
            | Error::Image(_)
            | Error::QpdfError { .. }
            | Error::Compose(_)
            | Error::Pdfium { .. }
            | Error::Archive(_)
            | Error::Task { .. } => PROCESSING_FAILED_MESSAGE.to_string(),
            Error::ResultRevoked { .. } => "This download is no longer available".to_string(),
            Error::SourceResolution { .. } => "Failed to resolve file source".to_string(),
            Error::Base64Decode(_) => "Invalid base64 data".to_string(),
            Error::HttpRequest(_) => "HTTP request failed".to_string(),
            Error::Io(_) => "I/O error".to_string(),
            Error::Serialization(_) => "Serialization error".to_string(),
            Error::PathAccessDenied { .. } => "Access denied".to_string(),
            Error::SsrfBlocked { .. } => "URL not allowed".to_string(),
            Error::DownloadTooLarge { max_size, .. } => {
                format!("Download exceeds maximum size of {} bytes", max_size)
            }
            Error::Identity { reason } => reason.clone(),
            Error::IdentityUnavailable => "Sign-in is not available".to_string(),
        }
    }
}
