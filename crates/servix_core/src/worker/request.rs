//! Request-line and header parsing for the worker.

#[derive(Debug)]
pub(crate) struct RequestMetadata {
    pub method: String,
    pub path: String,
    pub http_version: String,
    pub close_after: bool,
    pub has_body: bool,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum HeaderParseError {
    MalformedRequestLine,
    UnsupportedVersion,
    InvalidContentLength,
}

/// Parse the request line and header block (already terminated by a
/// blank line when this is called).
pub(crate) fn parse_request_metadata(headers: &str) -> Result<RequestMetadata, HeaderParseError> {
    let mut lines = headers.lines();
    let request_line = lines.next().ok_or(HeaderParseError::MalformedRequestLine)?;

    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or(HeaderParseError::MalformedRequestLine)?;
    let path = parts.next().ok_or(HeaderParseError::MalformedRequestLine)?;
    let http_version = parts.next().ok_or(HeaderParseError::MalformedRequestLine)?;
    if parts.next().is_some() {
        return Err(HeaderParseError::MalformedRequestLine);
    }

    if http_version != "HTTP/1.1" && http_version != "HTTP/1.0" {
        return Err(HeaderParseError::UnsupportedVersion);
    }

    let mut connection = String::new();
    let mut content_length = 0usize;
    let mut is_chunked = false;

    for line in lines {
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        let value = value.trim();

        if name.eq_ignore_ascii_case("connection") {
            if !connection.is_empty() {
                connection.push(',');
            }
            connection.push_str(value);
        } else if name.eq_ignore_ascii_case("content-length") {
            content_length = value
                .parse()
                .map_err(|_| HeaderParseError::InvalidContentLength)?;
        } else if name.eq_ignore_ascii_case("transfer-encoding")
            && value
                .split(',')
                .any(|t| t.trim().eq_ignore_ascii_case("chunked"))
        {
            is_chunked = true;
        }
    }

    let close_after = if http_version == "HTTP/1.0" {
        !has_connection_token(&connection, "keep-alive")
    } else {
        has_connection_token(&connection, "close")
    };

    Ok(RequestMetadata {
        method: method.to_string(),
        path: path.to_string(),
        http_version: http_version.to_string(),
        close_after,
        has_body: is_chunked || content_length > 0,
    })
}

fn has_connection_token(connection: &str, token: &str) -> bool {
    connection
        .split(',')
        .map(|t| t.trim().trim_matches('"'))
        .any(|t| t.eq_ignore_ascii_case(token))
}

#[cfg(test)]
mod tests {
    use super::{HeaderParseError, parse_request_metadata};

    #[test]
    fn parses_simple_get() {
        let headers = "GET /index.html HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let meta = parse_request_metadata(headers).expect("expected ok");
        assert_eq!(meta.method, "GET");
        assert_eq!(meta.path, "/index.html");
        assert_eq!(meta.http_version, "HTTP/1.1");
        assert!(!meta.close_after);
        assert!(!meta.has_body);
    }

    #[test]
    fn http11_connection_close_closes() {
        let headers = "GET / HTTP/1.1\r\nConnection: close\r\n\r\n";
        let meta = parse_request_metadata(headers).expect("expected ok");
        assert!(meta.close_after);
    }

    #[test]
    fn http10_defaults_to_close_unless_keepalive() {
        let plain = parse_request_metadata("GET / HTTP/1.0\r\n\r\n").expect("expected ok");
        assert!(plain.close_after);

        let ka = parse_request_metadata("GET / HTTP/1.0\r\nConnection: keep-alive\r\n\r\n")
            .expect("expected ok");
        assert!(!ka.close_after);
    }

    #[test]
    fn quoted_connection_tokens_are_recognized() {
        let headers = "GET / HTTP/1.1\r\nConnection: \"keep-alive\", close\r\n\r\n";
        let meta = parse_request_metadata(headers).expect("expected ok");
        assert!(meta.close_after);
    }

    #[test]
    fn body_is_detected_from_content_length_and_chunked() {
        let cl = parse_request_metadata("GET / HTTP/1.1\r\nContent-Length: 5\r\n\r\n")
            .expect("expected ok");
        assert!(cl.has_body);

        let chunked =
            parse_request_metadata("GET / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n")
                .expect("expected ok");
        assert!(chunked.has_body);
    }

    #[test]
    fn rejects_malformed_request_line() {
        for raw in ["GET\r\n\r\n", "GET /\r\n\r\n", "GET / HTTP/1.1 extra\r\n\r\n", "\r\n\r\n"] {
            let err = parse_request_metadata(raw).unwrap_err();
            assert_eq!(err, HeaderParseError::MalformedRequestLine, "raw: {raw:?}");
        }
    }

    #[test]
    fn rejects_unsupported_version() {
        let err = parse_request_metadata("GET / HTTP/2.0\r\n\r\n").unwrap_err();
        assert_eq!(err, HeaderParseError::UnsupportedVersion);
    }

    #[test]
    fn rejects_invalid_content_length() {
        let err = parse_request_metadata("GET / HTTP/1.1\r\nContent-Length: nope\r\n\r\n")
            .unwrap_err();
        assert_eq!(err, HeaderParseError::InvalidContentLength);
    }
}
