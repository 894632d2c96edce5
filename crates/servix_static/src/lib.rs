//! Static file serving.
//!
//! Resolves request paths safely under the configured document root and
//! streams files back with Content-Type, ETag and Last-Modified
//! headers. GET and HEAD share the same logic; HEAD omits the body.

mod etag;
mod fs;
mod response;

pub use fs::{PathError, ResolvedPath, resolve};

use std::path::Path;

use mime_guess::mime;
use tokio::fs as tokio_fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use servix_config::ServerConfig;

use etag::{EtagInfo, last_modified_header, weak_etag_size_mtime};
use response::ResponseBuilder;

struct StaticFileInfo {
    content_length: usize,
    etag: EtagInfo,
    last_modified: Option<String>,
}

impl StaticFileInfo {
    fn from_metadata(metadata: &std::fs::Metadata) -> Self {
        let content_length = usize::try_from(metadata.len()).unwrap_or(usize::MAX);
        let etag = weak_etag_size_mtime(metadata);
        let last_modified = last_modified_header(metadata);
        Self {
            content_length,
            etag,
            last_modified,
        }
    }
}

fn build_static_headers(info: &StaticFileInfo) -> Vec<(&'static str, &str)> {
    let mut headers = Vec::new();
    headers.push(("ETag", info.etag.header.as_str()));
    if let Some(last_modified) = info.last_modified.as_deref() {
        headers.push(("Last-Modified", last_modified));
    }
    headers
}

fn content_type_for(path: &Path) -> String {
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    if mime.type_() == mime::TEXT {
        format!("{}; charset=utf-8", mime.essence_str())
    } else {
        mime.essence_str().to_string()
    }
}

/// Extract the combined If-None-Match value from a raw header block.
fn if_none_match_value(headers: &str) -> Option<String> {
    let mut combined = String::new();
    for line in headers.lines().skip(1) {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case("if-none-match") {
            if !combined.is_empty() {
                combined.push(',');
            }
            combined.push_str(value.trim());
        }
    }
    if combined.is_empty() { None } else { Some(combined) }
}

fn if_none_match_satisfied(value: &str, etag_value: &str) -> bool {
    for token in value.split(',') {
        let mut tag = token.trim();
        if tag == "*" {
            return true;
        }
        if let Some(stripped) = tag.strip_prefix("W/").or_else(|| tag.strip_prefix("w/")) {
            tag = stripped.trim();
        }
        if tag.len() >= 2 && tag.starts_with('"') && tag.ends_with('"') {
            tag = &tag[1..tag.len() - 1];
        }
        if tag == etag_value {
            return true;
        }
    }
    false
}

fn should_return_not_modified(headers: &str, etag_value: &str) -> bool {
    match if_none_match_value(headers) {
        Some(value) => if_none_match_satisfied(&value, etag_value),
        None => false,
    }
}

/// Resolve `req_path` under the server root and render a full response.
///
/// `headers` is the raw request header block, used for conditional
/// request evaluation only.
pub async fn serve_static_bytes(
    server_cfg: &ServerConfig,
    method: &str,
    headers: &str,
    req_path: &str,
    keep_alive: bool,
) -> Vec<u8> {
    let root = Path::new(server_cfg.root());

    let resolved = match resolve(root, req_path, server_cfg.index()).await {
        Ok(resolved) => resolved,
        Err(PathError::NotFound) => {
            debug!(target: "servix::static", path = %req_path, "File not found");
            return ResponseBuilder::not_found(keep_alive);
        }
        Err(PathError::Forbidden) => {
            debug!(target: "servix::static", path = %req_path, "Path rejected");
            return ResponseBuilder::forbidden(keep_alive);
        }
    };

    let info = StaticFileInfo::from_metadata(&resolved.metadata);
    let extra_headers = build_static_headers(&info);

    if should_return_not_modified(headers, &info.etag.value) {
        return ResponseBuilder::not_modified(keep_alive, &extra_headers);
    }

    let content_type = content_type_for(&resolved.path);

    if method == "HEAD" {
        return ResponseBuilder::with_headers(
            "200 OK",
            Some(&content_type),
            info.content_length,
            keep_alive,
            &extra_headers,
            None,
        );
    }

    // The file was stat'd a moment ago, so a read failure here is a
    // race (unlinked file) or an I/O fault on this file only.
    match tokio_fs::read(&resolved.path).await {
        Ok(body) => ResponseBuilder::with_headers(
            "200 OK",
            Some(&content_type),
            body.len(),
            keep_alive,
            &extra_headers,
            Some(&body),
        ),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            ResponseBuilder::not_found(keep_alive)
        }
        Err(e) => {
            debug!(target: "servix::static", path = %req_path, error = ?e, "File read failed");
            ResponseBuilder::internal_error(keep_alive)
        }
    }
}

/// Serve a static file directly to the client stream.
pub async fn serve_static<S>(
    stream: &mut S,
    server_cfg: &ServerConfig,
    method: &str,
    headers: &str,
    req_path: &str,
    keep_alive: bool,
) -> anyhow::Result<()>
where
    S: AsyncWrite + Unpin + ?Sized,
{
    let resp = serve_static_bytes(server_cfg, method, headers, req_path, keep_alive).await;
    stream.write_all(&resp).await?;
    stream.flush().await?;
    Ok(())
}

/// Render a 400 Bad Request for a malformed or unsupported request.
pub fn bad_request_bytes(keep_alive: bool) -> Vec<u8> {
    ResponseBuilder::bad_request(keep_alive)
}
