//! Traversal-safe resolution of request paths to filesystem paths.

use std::fs::Metadata;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs as tokio_fs;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PathError {
    /// The path does not name a readable regular file under the root.
    #[error("not found")]
    NotFound,

    /// The path attempts to escape the document root or is otherwise
    /// not allowed to be looked up.
    #[error("forbidden")]
    Forbidden,
}

/// A request path resolved to an existing regular file.
///
/// Invariant: `path` is always `root` joined with normalized segments,
/// so it cannot name anything above the document root.
#[derive(Debug)]
pub struct ResolvedPath {
    pub path: PathBuf,
    pub metadata: Metadata,
}

/// Resolve a request path against the document root.
///
/// The request path is percent-decoded once and normalized before any
/// filesystem access; a path that would traverse above the root is
/// rejected without ever being stat'd. A directory resolves to the
/// configured index file inside it.
pub async fn resolve(root: &Path, req_path: &str, index: &str) -> Result<ResolvedPath, PathError> {
    let segments = normalize_request_path(req_path)?;

    let mut path = root.to_path_buf();
    for segment in &segments {
        path.push(segment);
    }

    let metadata = stat(&path).await?;

    if metadata.is_dir() {
        if index.is_empty() {
            return Err(PathError::NotFound);
        }
        path.push(index);
        let metadata = stat(&path).await?;
        if !metadata.is_file() {
            return Err(PathError::NotFound);
        }
        return Ok(ResolvedPath { path, metadata });
    }

    if !metadata.is_file() {
        return Err(PathError::NotFound);
    }

    Ok(ResolvedPath { path, metadata })
}

async fn stat(path: &Path) -> Result<Metadata, PathError> {
    match tokio_fs::metadata(path).await {
        Ok(meta) => Ok(meta),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => Err(PathError::Forbidden),
        Err(_) => Err(PathError::NotFound),
    }
}

/// Normalize a raw request path into safe relative segments.
///
/// Strips the query string, percent-decodes once, collapses `.` and
/// empty segments, and applies `..` lexically. A `..` that would climb
/// above the root is Forbidden, as are NUL bytes and backslashes.
pub(crate) fn normalize_request_path(req_path: &str) -> Result<Vec<String>, PathError> {
    let raw = strip_query(req_path);
    if !raw.starts_with('/') {
        return Err(PathError::Forbidden);
    }

    let decoded = decode_percent_once(raw);
    if decoded.contains('\0') || decoded.contains('\\') {
        return Err(PathError::Forbidden);
    }

    let mut segments: Vec<String> = Vec::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(PathError::Forbidden);
                }
            }
            other => segments.push(other.to_string()),
        }
    }

    Ok(segments)
}

fn strip_query(path: &str) -> &str {
    path.split('?').next().unwrap_or(path)
}

/// Decode `%XX` escapes in a single pass. Malformed escapes are kept
/// literally so they fail later at the stat instead of being guessed at.
fn decode_percent_once(path: &str) -> String {
    let bytes = path.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(h1), Some(h2)) = (from_hex(bytes[i + 1]), from_hex(bytes[i + 2])) {
                out.push((h1 << 4) | h2);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn from_hex(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}
