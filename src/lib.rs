//! Ziva.pdf toolkit library
//!
//! A catalog of PDF utilities served over MCP:
//! - merge, split, rotate, watermark and compress PDFs
//! - convert images to a PDF and PDF pages to JPEG images
//! - office conversions, editing and signing are cataloged but only answer
//!   with a notice
//!
//! Each run publishes its output under a revocable `ziva://results/` handle.

pub mod catalog;
pub mod error;
pub mod identity;
pub mod intake;
pub mod notify;
pub mod pdf;
pub mod pipeline;
pub mod server;
pub mod source;

pub use catalog::{find_tool, ToolDescriptor, ToolKind, TOOLS};
pub use error::{Error, Result};
pub use intake::InputFile;
pub use pipeline::{ActionOutcome, ResultStore, ToolPage, Toolkit};
pub use server::{
    run_server, run_server_with_config, run_server_with_dirs, ServerConfig, ZivaServer,
};
pub use source::FileSource;
