//! HTTP/1.1 response builders.

use std::time::SystemTime;

use httpdate::fmt_http_date;

type HeaderPair<'a> = (&'a str, &'a str);

const HTTP_VERSION: &str = "HTTP/1.1";
const CRLF: &str = "\r\n";
const SERVER_TOKEN: &str = concat!("servix/", env!("CARGO_PKG_VERSION"));
const TEXT_PLAIN_UTF8: &str = "text/plain; charset=utf-8";

fn connection_value(keep_alive: bool) -> &'static str {
    if keep_alive { "keep-alive" } else { "close" }
}

fn write_header(out: &mut String, name: &str, value: &str) {
    out.push_str(name);
    out.push_str(": ");
    out.push_str(value);
    out.push_str(CRLF);
}

/// Render the status line and header block, then append the body.
///
/// `content_length` is written verbatim, so a HEAD response carries the
/// length of the body it deliberately omits.
fn render(
    status: &str,
    content_type: Option<&str>,
    content_length: usize,
    keep_alive: bool,
    extra_headers: &[HeaderPair<'_>],
    body: Option<&[u8]>,
) -> Vec<u8> {
    let mut head = String::with_capacity(256);
    head.push_str(HTTP_VERSION);
    head.push(' ');
    head.push_str(status);
    head.push_str(CRLF);

    write_header(&mut head, "Server", SERVER_TOKEN);
    write_header(&mut head, "Date", &fmt_http_date(SystemTime::now()));
    write_header(&mut head, "Content-Length", &content_length.to_string());
    if let Some(ct) = content_type {
        write_header(&mut head, "Content-Type", ct);
    }
    for (name, value) in extra_headers {
        write_header(&mut head, name, value);
    }
    write_header(&mut head, "Connection", connection_value(keep_alive));
    head.push_str(CRLF);

    let mut out = head.into_bytes();
    if let Some(body) = body {
        out.extend_from_slice(body);
    }
    out
}

/// Central builder for the HTTP responses the server can emit.
pub(crate) struct ResponseBuilder;

impl ResponseBuilder {
    pub(crate) fn with_headers(
        status: &str,
        content_type: Option<&str>,
        content_length: usize,
        keep_alive: bool,
        extra_headers: &[HeaderPair<'_>],
        body: Option<&[u8]>,
    ) -> Vec<u8> {
        render(
            status,
            content_type,
            content_length,
            keep_alive,
            extra_headers,
            body,
        )
    }

    /// Build a text/plain response whose body restates the status.
    /// Error bodies never carry filesystem detail.
    pub(crate) fn plain_text(status: &str, body: &str, keep_alive: bool) -> Vec<u8> {
        render(
            status,
            Some(TEXT_PLAIN_UTF8),
            body.len(),
            keep_alive,
            &[],
            Some(body.as_bytes()),
        )
    }

    pub(crate) fn not_modified(keep_alive: bool, extra_headers: &[HeaderPair<'_>]) -> Vec<u8> {
        render("304 Not Modified", None, 0, keep_alive, extra_headers, None)
    }

    pub(crate) fn bad_request(keep_alive: bool) -> Vec<u8> {
        Self::plain_text("400 Bad Request", "400 Bad Request\n", keep_alive)
    }

    pub(crate) fn forbidden(keep_alive: bool) -> Vec<u8> {
        Self::plain_text("403 Forbidden", "403 Forbidden\n", keep_alive)
    }

    pub(crate) fn not_found(keep_alive: bool) -> Vec<u8> {
        Self::plain_text("404 Not Found", "404 Not Found\n", keep_alive)
    }

    pub(crate) fn internal_error(keep_alive: bool) -> Vec<u8> {
        Self::plain_text(
            "500 Internal Server Error",
            "500 Internal Server Error\n",
            keep_alive,
        )
    }
}
