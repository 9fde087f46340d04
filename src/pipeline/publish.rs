//! Result publishing
//!
//! Finished payloads are kept in a byte-budgeted LRU store and addressed by
//! revocable handles. Once a handle is revoked (or evicted) every lookup
//! through it fails.

use crate::catalog::{ToolDescriptor, ToolKind};
use crate::error::{Error, Result};
use crate::intake::InputFile;
use crate::pipeline::routines::Payload;
use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use uuid::Uuid;

const HANDLE_SCHEME: &str = "ziva://results/";

/// Name used when nothing was selected
pub const FALLBACK_FILENAME: &str = "ziva_document.pdf";

/// Opaque reference to a published result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResultHandle(Uuid);

impl ResultHandle {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Resource URI, e.g. `ziva://results/<uuid>`
    pub fn uri(&self) -> String {
        format!("{}{}", HANDLE_SCHEME, self.0)
    }

    /// Accepts either the full URI or the bare identifier
    pub fn parse(value: &str) -> Result<Self> {
        let raw = value.strip_prefix(HANDLE_SCHEME).unwrap_or(value);
        Uuid::parse_str(raw.trim())
            .map(Self)
            .map_err(|_| Error::ResultRevoked {
                handle: value.to_string(),
            })
    }
}

impl fmt::Display for ResultHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri())
    }
}

impl Serialize for ResultHandle {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.uri())
    }
}

/// A downloadable result
#[derive(Debug, Clone, Serialize)]
pub struct PublishedResult {
    pub handle: ResultHandle,
    pub filename: String,
    pub mime: &'static str,
    #[serde(skip)]
    pub data: Arc<Vec<u8>>,
    /// Entry names when the result is an archive
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub entries: Vec<String>,
    pub size: usize,
    pub published_at: DateTime<Utc>,
}

impl PublishedResult {
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Rebuild an input file so the result can feed another tool
    pub fn as_input(&self) -> InputFile {
        InputFile::new(
            self.filename.clone(),
            Some(self.mime.to_string()),
            self.data.as_slice(),
        )
    }
}

struct StoreInner {
    lru: LruCache<ResultHandle, PublishedResult>,
    total_bytes: usize,
}

/// Live results, bounded by entry count and total bytes
pub struct ResultStore {
    inner: Mutex<StoreInner>,
    max_bytes: usize,
}

impl ResultStore {
    pub fn new(capacity: usize, max_bytes: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(StoreInner {
                lru: LruCache::new(capacity),
                total_bytes: 0,
            }),
            max_bytes,
        }
    }

    /// Store a payload under a fresh handle.
    ///
    /// Older results are evicted until the byte budget holds. A payload
    /// larger than the whole budget is still published; it simply evicts
    /// everything else.
    pub fn publish(&self, payload: Payload, filename: impl Into<String>) -> PublishedResult {
        let mime = payload.mime();
        let (data, entries) = match payload {
            Payload::Document(data) => (data, Vec::new()),
            Payload::Archive { data, entries } => (data, entries),
        };
        let size = data.len();

        let mut inner = self.inner.lock();
        let mut handle = ResultHandle::generate();
        while inner.lru.contains(&handle) {
            handle = ResultHandle::generate();
        }

        while inner.total_bytes + size > self.max_bytes {
            match inner.lru.pop_lru() {
                Some((evicted, result)) => {
                    inner.total_bytes = inner.total_bytes.saturating_sub(result.size);
                    tracing::debug!(handle = %evicted, "evicted published result");
                }
                None => break,
            }
        }

        let result = PublishedResult {
            handle,
            filename: filename.into(),
            mime,
            data: Arc::new(data),
            entries,
            size,
            published_at: Utc::now(),
        };
        if let Some((evicted, old)) = inner.lru.push(handle, result.clone()) {
            inner.total_bytes = inner.total_bytes.saturating_sub(old.size);
            tracing::debug!(handle = %evicted, "evicted published result");
        }
        inner.total_bytes += size;
        result
    }

    /// Invalidate a handle; returns whether it was still live
    pub fn revoke(&self, handle: &ResultHandle) -> bool {
        let mut inner = self.inner.lock();
        match inner.lru.pop(handle) {
            Some(result) => {
                inner.total_bytes = inner.total_bytes.saturating_sub(result.size);
                true
            }
            None => false,
        }
    }

    pub fn fetch(&self, handle: &ResultHandle) -> Result<PublishedResult> {
        self.inner
            .lock()
            .lru
            .get(handle)
            .cloned()
            .ok_or_else(|| Error::ResultRevoked {
                handle: handle.uri(),
            })
    }

    pub fn contains(&self, handle: &ResultHandle) -> bool {
        self.inner.lock().lru.contains(handle)
    }

    /// Live results, most recently used first
    pub fn list(&self) -> Vec<PublishedResult> {
        self.inner.lock().lru.iter().map(|(_, r)| r.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().lru.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.inner.lock().total_bytes
    }
}

/// Download name for a tool's result, derived from the first input
pub fn suggest_filename(tool: &ToolDescriptor, files: &[InputFile]) -> String {
    if let Some(fixed) = tool.output_filename {
        return fixed.to_string();
    }
    let Some(first) = files.first() else {
        return FALLBACK_FILENAME.to_string();
    };
    let base = first.stem();

    use ToolKind::*;
    match tool.kind {
        MergePdf => format!("{}_merged.pdf", base),
        SplitPdf => format!("{}_split.zip", base),
        CompressPdf => format!("{}_compressed.pdf", base),
        PdfToWord => format!("{}.docx", base),
        PdfToPowerpoint => format!("{}.pptx", base),
        PdfToExcel => format!("{}.xlsx", base),
        WordToPdf | PowerpointToPdf | ExcelToPdf => format!("{}.pdf", base),
        EditPdf => format!("{}_edited.pdf", base),
        PdfToJpg => format!("{}_images.zip", base),
        JpgToPdf if files.len() > 1 => "combined_images.pdf".to_string(),
        JpgToPdf => format!("{}_converted.pdf", base),
        SignPdf => format!("{}_signed.pdf", base),
        Watermark => format!("{}_watermarked.pdf", base),
        RotatePdf => format!("{}_rotated.pdf", base),
    }
}
