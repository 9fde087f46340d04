//! Turning input sources into files
//!
//! Content is never validated here: a picked file is accepted whatever it
//! holds, and the routines report what they cannot read.

use crate::error::{Error, Result};
use crate::intake::InputFile;
use crate::pipeline::{ResultHandle, ResultStore};
use base64::Engine;
use futures_util::StreamExt;
use std::net::IpAddr;
use std::path::Path;

/// MIME type implied by a file name's extension
pub fn mime_from_name(name: &str) -> Option<&'static str> {
    let ext = name.rsplit_once('.')?.1.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "pdf" => "application/pdf",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "zip" => "application/zip",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        _ => return None,
    };
    Some(mime)
}

/// Read a local file. The caller is responsible for sandboxing `path`.
pub fn resolve_path<P: AsRef<Path>>(path: P) -> Result<InputFile> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(Error::SourceResolution {
            reason: format!("File not found: {}", path.display()),
        });
    }

    let data = std::fs::read(path)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let mime = mime_from_name(&name).map(str::to_string);
    Ok(InputFile::new(name, mime, data))
}

/// Decode inline base64 content
pub fn resolve_base64(base64_data: &str, name: Option<&str>, mime: Option<&str>) -> Result<InputFile> {
    let engine = base64::engine::general_purpose::STANDARD;
    let data = engine.decode(base64_data.trim())?;
    let name = name.unwrap_or("upload").to_string();
    let mime = mime
        .map(str::to_string)
        .or_else(|| mime_from_name(&name).map(str::to_string));
    Ok(InputFile::new(name, mime, data))
}

/// Feed a published result back in as an input
pub fn resolve_result(handle: &str, store: &ResultStore) -> Result<InputFile> {
    let handle = ResultHandle::parse(handle)?;
    Ok(store.fetch(&handle)?.as_input())
}

/// Check if an IP address is private/reserved (loopback, link-local, private ranges, etc.)
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, ..] = v4.octets();
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // CGNAT 100.64/10
                || (a == 100 && (b & 0xC0) == 64)
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 unique local, fe80::/10 link-local
                || (first & 0xFE00) == 0xFC00
                || (first & 0xFFC0) == 0xFE80
        }
    }
}

/// Resolve the host and refuse private or reserved addresses
async fn check_ssrf(parsed: &url::Url) -> Result<()> {
    let host = parsed.host_str().ok_or_else(|| Error::SourceResolution {
        reason: "URL has no host".to_string(),
    })?;
    let port = parsed.port_or_known_default().unwrap_or(443);

    let addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| Error::SourceResolution {
            reason: format!("DNS resolution failed for {}: {}", host, e),
        })?;

    for addr in addrs {
        if is_private_ip(&addr.ip()) {
            return Err(Error::SsrfBlocked {
                url: parsed.to_string(),
            });
        }
    }
    Ok(())
}

/// Name for a downloaded file: the last path segment, or the host
fn name_from_url(parsed: &url::Url) -> String {
    parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|s| !s.is_empty())
        .or_else(|| parsed.host_str())
        .unwrap_or("download")
        .to_string()
}

/// Download a file with SSRF protection and a size cap
pub async fn resolve_url(
    url: &str,
    allow_private_urls: bool,
    max_download_bytes: u64,
) -> Result<InputFile> {
    let parsed = url::Url::parse(url).map_err(|e| Error::SourceResolution {
        reason: format!("Invalid URL: {}", e),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::SourceResolution {
            reason: format!("Unsupported URL scheme: {}", parsed.scheme()),
        });
    }
    if !allow_private_urls {
        check_ssrf(&parsed).await?;
    }

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(60))
        .build()?;
    let response = client.get(parsed.clone()).send().await?;

    if !response.status().is_success() {
        return Err(Error::SourceResolution {
            reason: format!("HTTP request failed with status: {}", response.status()),
        });
    }

    if let Some(content_length) = response.content_length() {
        if content_length > max_download_bytes {
            return Err(Error::DownloadTooLarge {
                size: content_length,
                max_size: max_download_bytes,
            });
        }
    }

    let header_mime = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());

    // Stream with incremental size checking so a lying Content-Length cannot OOM us
    let mut data = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        data.extend_from_slice(&chunk?);
        if data.len() as u64 > max_download_bytes {
            return Err(Error::DownloadTooLarge {
                size: data.len() as u64,
                max_size: max_download_bytes,
            });
        }
    }

    let name = name_from_url(&parsed);
    let mime = header_mime.or_else(|| mime_from_name(&name).map(str::to_string));
    tracing::debug!(url, size = data.len(), "downloaded source");
    Ok(InputFile::new(name, mime, data))
}
