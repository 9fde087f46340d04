//! Input sources: where the files fed to a tool come from

pub mod resolver;

pub use resolver::{mime_from_name, resolve_base64, resolve_path, resolve_result, resolve_url};

use crate::error::{Error, Result};
use crate::intake::InputFile;
use crate::pipeline::ResultStore;
use rmcp::schemars::JsonSchema;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where one input file comes from
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(untagged)]
pub enum FileSource {
    /// Local file path
    Path {
        /// Path to the file
        path: String,
    },
    /// Inline base64 content
    Base64 {
        /// Base64 encoded content
        base64: String,
        /// File name, used for output naming and type inference
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        /// Declared MIME type
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mime: Option<String>,
    },
    /// URL to download from
    Url {
        /// URL of the file
        url: String,
    },
    /// A result published by an earlier action
    Result {
        /// Result handle (`ziva://results/<id>`)
        result: String,
    },
}

fn optional_string<E: serde::de::Error>(
    obj: &serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> std::result::Result<Option<String>, E> {
    match obj.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(E::custom(format!("\"{}\" must be a string", key))),
    }
}

const EXPECTED_KEYS: &str = "one of \"path\", \"base64\", \"url\", or \"result\"";

impl<'de> serde::Deserialize<'de> for FileSource {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error as _;

        let value = serde_json::Value::deserialize(deserializer)?;
        let Some(obj) = value.as_object() else {
            return Err(D::Error::custom(format!(
                "Invalid source: expected an object with {}",
                EXPECTED_KEYS
            )));
        };

        if let Some(path) = optional_string::<D::Error>(obj, "path")? {
            return Ok(FileSource::Path { path });
        }
        if let Some(base64) = optional_string::<D::Error>(obj, "base64")? {
            return Ok(FileSource::Base64 {
                base64,
                name: optional_string::<D::Error>(obj, "name")?,
                mime: optional_string::<D::Error>(obj, "mime")?,
            });
        }
        if let Some(url) = optional_string::<D::Error>(obj, "url")? {
            return Ok(FileSource::Url { url });
        }
        if let Some(result) = optional_string::<D::Error>(obj, "result")? {
            return Ok(FileSource::Result { result });
        }

        let keys: Vec<&String> = obj.keys().collect();
        Err(D::Error::custom(format!(
            "Invalid source: expected an object with {}, but got keys: {:?}",
            EXPECTED_KEYS, keys
        )))
    }
}

impl FileSource {
    /// Short label for logs and error reports
    pub fn label(&self) -> String {
        match self {
            FileSource::Path { path } => path.clone(),
            FileSource::Base64 { name, .. } => {
                format!("<base64:{}>", name.as_deref().unwrap_or("upload"))
            }
            FileSource::Url { url } => url.clone(),
            FileSource::Result { result } => result.clone(),
        }
    }
}

/// Restricts filesystem access to configured directories.
/// With no directories configured every path is allowed.
#[derive(Debug, Clone, Default)]
pub struct Sandbox {
    dirs: Vec<PathBuf>,
}

impl Sandbox {
    pub fn new<I, P>(dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        Self {
            dirs: dirs.into_iter().map(|d| d.as_ref().to_path_buf()).collect(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.dirs.is_empty()
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    fn contains(&self, canonical: &Path) -> bool {
        self.dirs.iter().any(|dir| {
            std::fs::canonicalize(dir)
                .map(|d| canonical.starts_with(d))
                .unwrap_or(false)
        })
    }

    /// Validate an existing path for reading
    pub fn check_read(&self, path: &str) -> Result<PathBuf> {
        if self.is_open() {
            return Ok(PathBuf::from(path));
        }
        let denied = || Error::PathAccessDenied {
            path: path.to_string(),
        };
        let canonical = std::fs::canonicalize(path).map_err(|_| denied())?;
        if self.contains(&canonical) {
            Ok(canonical)
        } else {
            Err(denied())
        }
    }

    /// Validate a path that may not exist yet; its parent must
    pub fn check_write(&self, path: &str) -> Result<PathBuf> {
        if self.is_open() {
            return Ok(PathBuf::from(path));
        }
        let denied = || Error::PathAccessDenied {
            path: path.to_string(),
        };
        let target = Path::new(path);
        let file_name = target.file_name().ok_or_else(denied)?;
        let parent = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let canonical = std::fs::canonicalize(parent)
            .map_err(|_| denied())?
            .join(file_name);
        if self.contains(&canonical) {
            Ok(canonical)
        } else {
            Err(denied())
        }
    }
}

/// Resolves [`FileSource`]s under the server's security settings
pub struct SourceResolver {
    sandbox: Sandbox,
    allow_private_urls: bool,
    max_download_bytes: u64,
    store: Arc<ResultStore>,
}

impl SourceResolver {
    pub fn new(
        sandbox: Sandbox,
        allow_private_urls: bool,
        max_download_bytes: u64,
        store: Arc<ResultStore>,
    ) -> Self {
        Self {
            sandbox,
            allow_private_urls,
            max_download_bytes,
            store,
        }
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    pub async fn resolve(&self, source: &FileSource) -> Result<InputFile> {
        match source {
            FileSource::Path { path } => {
                let checked = self.sandbox.check_read(path)?;
                resolve_path(checked)
            }
            FileSource::Base64 { base64, name, mime } => {
                resolve_base64(base64, name.as_deref(), mime.as_deref())
            }
            FileSource::Url { url } => {
                resolve_url(url, self.allow_private_urls, self.max_download_bytes).await
            }
            FileSource::Result { result } => resolve_result(result, &self.store),
        }
    }
}
