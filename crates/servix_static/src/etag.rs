use std::{fs::Metadata, time::UNIX_EPOCH};

pub(crate) struct EtagInfo {
    pub value: String,
    pub header: String,
}

/// Weak ETag derived from file size and mtime; cheap and good enough
/// for conditional GET on static content.
pub(crate) fn weak_etag_size_mtime(metadata: &Metadata) -> EtagInfo {
    let size = metadata.len();
    let mtime_nanos = metadata
        .modified()
        .ok()
        .and_then(|modified| modified.duration_since(UNIX_EPOCH).ok())
        .map(|dur| dur.as_nanos())
        .unwrap_or(0);

    let value = format!("{size}-{mtime_nanos}");
    let header = format!(r#"W/"{value}""#);

    EtagInfo { value, header }
}

pub(crate) fn last_modified_header(metadata: &Metadata) -> Option<String> {
    metadata.modified().ok().map(httpdate::fmt_http_date)
}
