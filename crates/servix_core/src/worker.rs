use std::{net::SocketAddr, sync::Arc};

use bytes::{Buf, BytesMut};
use servix_config::{HttpConfig, ServixConfig};
use servix_static::{bad_request_bytes, serve_static};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    time::{Duration, timeout},
};
use tracing::{debug, info, instrument, warn};

use crate::shutdown::ShutdownSignal;

mod request;

use request::parse_request_metadata;

pub trait ClientStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> ClientStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// Entry point for a "logical worker" that handles a single connection.
///
/// Loops over request/response exchanges while the client keeps the
/// connection alive and the server is not draining. Every exit path
/// shuts the stream down first (flushing the TLS close_notify) and
/// then drops it, which closes the descriptor.
#[instrument(
    skip(stream, cfg, shutdown),
    fields(
        client = %client_addr,
    )
)]
pub async fn handle_connection(
    mut stream: Box<dyn ClientStream>,
    client_addr: SocketAddr,
    cfg: Arc<ServixConfig>,
    mut shutdown: ShutdownSignal,
) -> anyhow::Result<()> {
    debug!(target: "servix::worker", "Handling new client connection");

    let mut buf = BytesMut::new();
    let mut first_request = true;

    loop {
        let idle_timeout = if first_request {
            Duration::from_secs(cfg.http.client_read_timeout_secs)
        } else {
            Duration::from_secs(cfg.http.keepalive_timeout_secs)
        };

        // 1) Read one request head (line + headers), bounded in size
        let req = match read_http_request(
            &mut stream,
            &mut buf,
            &cfg.http,
            idle_timeout,
            &mut shutdown,
        )
        .await?
        {
            Some(req) => req,
            None => break,
        };

        debug!(
            target: "servix::worker",
            method = %req.method,
            path = %req.path,
            version = %req.http_version,
            "Parsed HTTP request line"
        );

        // 2) Only bodyless GET/HEAD are served
        if req.method != "GET" && req.method != "HEAD" {
            warn!(
                target: "servix::worker",
                method = %req.method,
                "Unsupported method; returning 400"
            );
            send_bad_request(&mut stream).await?;
            break;
        }
        if req.has_body {
            warn!(target: "servix::worker", "Request carries a body; returning 400");
            send_bad_request(&mut stream).await?;
            break;
        }

        // A response that has started always completes; the shutdown
        // state is only consulted for the keep-alive decision.
        let keep_alive = !req.close_after && !shutdown.is_draining();

        // 3) Resolve and stream the file (or an error status)
        serve_static(
            &mut stream,
            &cfg.server,
            &req.method,
            &req.headers,
            &req.path,
            keep_alive,
        )
        .await?;

        if !keep_alive {
            break;
        }

        // Drop this request's bytes; leftovers belong to the next one.
        buf.advance(req.body_start.min(buf.len()));
        first_request = false;
    }

    // Flush the TLS close_notify; without it the peer cannot tell a
    // finished response from a truncated one.
    let _ = stream.shutdown().await;

    info!(
        target: "servix::worker",
        %client_addr,
        "Finished handling connection"
    );

    Ok(())
}

async fn send_bad_request(stream: &mut dyn ClientStream) -> anyhow::Result<()> {
    let resp = bad_request_bytes(false);
    stream.write_all(&resp).await?;
    stream.flush().await?;
    Ok(())
}

#[derive(Debug)]
struct ParsedRequest {
    headers: String,
    method: String,
    path: String,
    http_version: String,
    close_after: bool,
    has_body: bool,
    body_start: usize,
}

/// Read one request head from the stream.
///
/// Returns None when the connection should close without a further
/// response: client EOF, idle timeout, a drain signal arriving while
/// no request is underway, or after an error response has already
/// been written here.
async fn read_http_request(
    stream: &mut dyn ClientStream,
    buf: &mut BytesMut,
    http: &HttpConfig,
    idle_timeout: Duration,
    shutdown: &mut ShutdownSignal,
) -> anyhow::Result<Option<ParsedRequest>> {
    let read_timeout = Duration::from_secs(http.client_read_timeout_secs);
    let max_headers = http.max_request_headers_bytes as usize;

    let headers_end = loop {
        if let Some(pos) = find_headers_end(buf) {
            break pos;
        }

        if max_headers > 0 && buf.len() > max_headers {
            warn!(
                target: "servix::worker",
                buffered = buf.len(),
                limit = max_headers,
                "Request head exceeds configured limit"
            );
            send_bad_request(stream).await?;
            return Ok(None);
        }

        // A fresh exchange may sit idle (keep-alive); once bytes have
        // arrived the client must finish the head promptly.
        let idle = buf.is_empty();
        let timeout_dur = if idle { idle_timeout } else { read_timeout };

        // While no request is underway, a drain signal ends the
        // connection right here instead of holding its permit for the
        // rest of the idle timeout. A partially read head is always
        // read to completion.
        let outcome = tokio::select! {
            biased;
            _ = shutdown.draining(), if idle => {
                debug!(target: "servix::worker", "Drain signal on idle connection");
                return Ok(None);
            }
            res = read_more(stream, buf, timeout_dur) => res?,
        };

        match outcome {
            ReadOutcome::Timeout => {
                if buf.is_empty() {
                    debug!(target: "servix::worker", "Idle connection timed out");
                    return Ok(None);
                }
                warn!(target: "servix::worker", "Client stalled mid-request");
                send_bad_request(stream).await?;
                return Ok(None);
            }
            ReadOutcome::Read(0) => return Ok(None),
            ReadOutcome::Read(_) => {}
        }
    };

    let headers_str = String::from_utf8_lossy(&buf[..headers_end]).to_string();

    let meta = match parse_request_metadata(&headers_str) {
        Ok(meta) => meta,
        Err(err) => {
            warn!(
                target: "servix::worker",
                error = ?err,
                "Invalid request head"
            );
            send_bad_request(stream).await?;
            return Ok(None);
        }
    };

    Ok(Some(ParsedRequest {
        headers: headers_str,
        method: meta.method,
        path: meta.path,
        http_version: meta.http_version,
        close_after: meta.close_after,
        has_body: meta.has_body,
        body_start: headers_end + 4,
    }))
}

fn find_headers_end(buf: &BytesMut) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

enum ReadOutcome {
    Read(usize),
    Timeout,
}

async fn read_more(
    stream: &mut dyn ClientStream,
    buf: &mut BytesMut,
    timeout_dur: Duration,
) -> anyhow::Result<ReadOutcome> {
    let mut tmp = [0u8; 4096];
    match timeout(timeout_dur, stream.read(&mut tmp)).await {
        Ok(res) => {
            let n = res?;
            if n > 0 {
                buf.extend_from_slice(&tmp[..n]);
            }
            Ok(ReadOutcome::Read(n))
        }
        Err(_) => Ok(ReadOutcome::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;

    use servix_config::ServixConfig;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::time::Duration;

    use crate::shutdown::ShutdownController;

    use super::handle_connection;

    fn fixture_cfg(name: &str, files: &[(&str, &[u8])]) -> Arc<ServixConfig> {
        let root = std::env::temp_dir().join(format!("servix-wrk-{}-{name}", std::process::id()));
        let _ = std::fs::remove_dir_all(&root);
        std::fs::create_dir_all(&root).expect("create fixture root");
        for (rel, contents) in files {
            std::fs::write(root.join(rel), contents).expect("write fixture");
        }
        let mut cfg = ServixConfig::default();
        cfg.server.root = root.display().to_string();
        cfg.http.client_read_timeout_secs = 1;
        cfg.http.keepalive_timeout_secs = 1;
        Arc::new(cfg)
    }

    fn client_addr() -> SocketAddr {
        "127.0.0.1:9999".parse().unwrap()
    }

    async fn exchange(cfg: Arc<ServixConfig>, raw: &[u8]) -> Vec<u8> {
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let controller = ShutdownController::new();
        let shutdown = controller.signal();
        let worker = tokio::spawn(handle_connection(
            Box::new(server),
            client_addr(),
            cfg,
            shutdown,
        ));

        // The worker may close early (e.g. oversized head), breaking
        // the pipe mid-write; the response is still readable.
        let _ = client.write_all(raw).await;
        let _ = client.shutdown().await;

        let mut resp = Vec::new();
        client.read_to_end(&mut resp).await.unwrap();
        worker.await.unwrap().unwrap();
        resp
    }

    fn status_of(resp: &[u8]) -> String {
        String::from_utf8_lossy(resp)
            .lines()
            .next()
            .unwrap_or("")
            .to_string()
    }

    #[tokio::test]
    async fn get_serves_file_bytes() {
        let cfg = fixture_cfg("get", &[("a.txt", b"content")]);
        let resp = exchange(cfg, b"GET /a.txt HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n")
            .await;
        assert_eq!(status_of(&resp), "HTTP/1.1 200 OK");
        assert!(resp.ends_with(b"content"));
    }

    #[tokio::test]
    async fn head_omits_body() {
        let cfg = fixture_cfg("head", &[("a.txt", b"content")]);
        let resp = exchange(cfg, b"HEAD /a.txt HTTP/1.1\r\nConnection: close\r\n\r\n").await;
        assert_eq!(status_of(&resp), "HTTP/1.1 200 OK");
        assert!(resp.ends_with(b"\r\n\r\n"));
        let head = String::from_utf8_lossy(&resp);
        assert!(head.contains("Content-Length: 7"));
    }

    #[tokio::test]
    async fn missing_file_is_404() {
        let cfg = fixture_cfg("missing", &[]);
        let resp = exchange(cfg, b"GET /nope HTTP/1.1\r\nConnection: close\r\n\r\n").await;
        assert_eq!(status_of(&resp), "HTTP/1.1 404 Not Found");
    }

    #[tokio::test]
    async fn traversal_is_403() {
        let cfg = fixture_cfg("traversal", &[]);
        let resp = exchange(
            cfg,
            b"GET /../../etc/passwd HTTP/1.1\r\nConnection: close\r\n\r\n",
        )
        .await;
        assert_eq!(status_of(&resp), "HTTP/1.1 403 Forbidden");
    }

    #[tokio::test]
    async fn post_is_rejected_with_400() {
        let cfg = fixture_cfg("post", &[]);
        let resp = exchange(cfg, b"POST /a HTTP/1.1\r\nContent-Length: 0\r\n\r\n").await;
        assert_eq!(status_of(&resp), "HTTP/1.1 400 Bad Request");
    }

    #[tokio::test]
    async fn garbage_request_is_400() {
        let cfg = fixture_cfg("garbage", &[]);
        let resp = exchange(cfg, b"NOT AN HTTP REQUEST AT ALL\r\n\r\n").await;
        assert_eq!(status_of(&resp), "HTTP/1.1 400 Bad Request");
    }

    #[tokio::test]
    async fn oversized_head_is_400() {
        let cfg = fixture_cfg("oversized", &[]);
        let mut raw = Vec::from(&b"GET / HTTP/1.1\r\nX-Filler: "[..]);
        raw.extend(std::iter::repeat_n(b'a', 80 * 1024));
        let resp = exchange(cfg, &raw).await;
        assert_eq!(status_of(&resp), "HTTP/1.1 400 Bad Request");
    }

    #[tokio::test]
    async fn keep_alive_serves_sequential_requests() {
        let cfg = fixture_cfg("keepalive", &[("a.txt", b"aa"), ("b.txt", b"bbb")]);
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let controller = ShutdownController::new();
        let shutdown = controller.signal();
        let worker = tokio::spawn(handle_connection(
            Box::new(server),
            client_addr(),
            cfg,
            shutdown,
        ));

        client
            .write_all(b"GET /a.txt HTTP/1.1\r\nHost: x\r\n\r\n")
            .await
            .unwrap();
        let mut buf = vec![0u8; 4096];
        let n = client.read(&mut buf).await.unwrap();
        let first = String::from_utf8_lossy(&buf[..n]).to_string();
        assert!(first.starts_with("HTTP/1.1 200 OK"));
        assert!(first.contains("Connection: keep-alive"));
        assert!(first.ends_with("aa"));

        client
            .write_all(b"GET /b.txt HTTP/1.1\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let n = client.read(&mut buf).await.unwrap();
        let second = String::from_utf8_lossy(&buf[..n]).to_string();
        assert!(second.starts_with("HTTP/1.1 200 OK"));
        assert!(second.contains("Connection: close"));
        assert!(second.ends_with("bbb"));

        client.shutdown().await.unwrap();
        worker.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn already_draining_connection_closes_without_response() {
        let cfg = fixture_cfg("draining", &[("a.txt", b"aa")]);
        let controller = ShutdownController::new();
        controller.begin_drain();

        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let worker = tokio::spawn(handle_connection(
            Box::new(server),
            client_addr(),
            cfg,
            controller.signal(),
        ));

        client
            .write_all(b"GET /a.txt HTTP/1.1\r\nHost: x\r\n\r\n")
            .await
            .unwrap();
        let mut resp = Vec::new();
        client.read_to_end(&mut resp).await.unwrap();
        assert!(resp.is_empty(), "got: {}", String::from_utf8_lossy(&resp));
        worker.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn drain_releases_idle_keepalive_connection() {
        let cfg = fixture_cfg("drainidle", &[("a.txt", b"aa")]);
        // A long keep-alive window, so only the drain signal can end
        // the wait within this test.
        let mut cfg = Arc::into_inner(cfg).expect("sole fixture ref");
        cfg.http.keepalive_timeout_secs = 60;
        let cfg = Arc::new(cfg);

        let controller = ShutdownController::new();
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let worker = tokio::spawn(handle_connection(
            Box::new(server),
            client_addr(),
            cfg,
            controller.signal(),
        ));

        client
            .write_all(b"GET /a.txt HTTP/1.1\r\nHost: x\r\n\r\n")
            .await
            .unwrap();
        let mut buf = vec![0u8; 4096];
        let n = client.read(&mut buf).await.unwrap();
        let first = String::from_utf8_lossy(&buf[..n]).to_string();
        assert!(first.starts_with("HTTP/1.1 200 OK"));
        assert!(first.contains("Connection: keep-alive"));

        // Client goes idle between exchanges; the drain alone must
        // release the worker.
        controller.begin_drain();
        let n = tokio::time::timeout(Duration::from_secs(2), client.read(&mut buf))
            .await
            .expect("drain released the connection")
            .unwrap();
        assert_eq!(n, 0, "expected EOF after drain");
        worker.await.unwrap().unwrap();
    }
}
