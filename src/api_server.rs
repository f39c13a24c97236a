/// AnalfaBet — HTTP API
///
/// Minimal HTTP/1.1 JSON server, one request per connection.
///   GET  /health
///   GET  /matches[?round=N|all]
///   GET  /rankings[?round=N]
///   GET  /bets?user_id=N
///   GET  /league-bets[?round=N|all]
///   POST /users
///   POST /bets
///   POST /matches/{id}/score
///
/// Run:
///   cargo run --bin analfabet-api

use analfabet::api::{content_length, respond, ApiResponse, HttpRequest, RouteContext};
use analfabet::config::AppConfig;
use analfabet::store::{SharedStore, Store};
use anyhow::{Context, Result};
use chrono::Utc;
use dotenv::dotenv;
use logger::EventLogger;
use serde_json::json;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

const MAX_REQUEST_BYTES: usize = 64 * 1024;

#[derive(Clone)]
struct ApiState {
    store: SharedStore,
    ctx: RouteContext,
}

enum Incoming {
    Closed,
    TooLarge,
    Request(String),
}

async fn read_request(stream: &mut TcpStream) -> Result<Incoming> {
    let mut buf = Vec::with_capacity(8192);
    let mut chunk = [0u8; 8192];

    loop {
        let n = stream.read(&mut chunk).await.context("http read")?;
        if n == 0 {
            if buf.is_empty() {
                return Ok(Incoming::Closed);
            }
            return Ok(Incoming::Request(String::from_utf8_lossy(&buf).into_owned()));
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.len() > MAX_REQUEST_BYTES {
            return Ok(Incoming::TooLarge);
        }

        if let Some(head_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
            let wanted = head_end.saturating_add(4).saturating_add(content_length(&head));
            if wanted > MAX_REQUEST_BYTES {
                return Ok(Incoming::TooLarge);
            }
            while buf.len() < wanted {
                let n = stream.read(&mut chunk).await.context("http body read")?;
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            return Ok(Incoming::Request(String::from_utf8_lossy(&buf).into_owned()));
        }
    }
}

async fn handle_http_connection(mut stream: TcpStream, state: ApiState) -> Result<()> {
    let resp = match read_request(&mut stream).await? {
        Incoming::Closed => return Ok(()),
        Incoming::Request(raw) => match HttpRequest::parse(&raw) {
            Some(req) => {
                debug!("{} {}", req.method, req.path);
                let ctx = RouteContext {
                    now: Utc::now(),
                    ..state.ctx.clone()
                };
                state.store.call(move |s| Ok(respond(s, &req, &ctx))).await?
            }
            None => ApiResponse {
                status: 400,
                body: json!({ "error": "Malformed request line" }),
            },
        },
        Incoming::TooLarge => ApiResponse {
            status: 413,
            body: json!({ "error": "Request too large" }),
        },
    };

    stream.write_all(resp.render().as_bytes()).await.context("http write")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    analfabet::init_tracing();

    let cfg = AppConfig::from_env()?;
    let store = SharedStore::new(Store::open(&cfg.db)?);
    let state = ApiState {
        store,
        ctx: RouteContext {
            now: Utc::now(),
            rules: cfg.rules,
            logger: Some(Arc::new(EventLogger::new(&cfg.log_dir))),
        },
    };

    let listener = TcpListener::bind(cfg.api_bind).await.context("http bind")?;
    info!("analfabet-api listening on http://{}", cfg.api_bind);

    loop {
        let (stream, peer) = listener.accept().await.context("http accept")?;
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_http_connection(stream, state).await {
                debug!("http handler err {}: {}", peer, e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn read_raw(raw: &'static [u8]) -> Incoming {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = tokio::spawn(async move {
            let mut conn = TcpStream::connect(addr).await.unwrap();
            conn.write_all(raw).await.unwrap();
            conn.shutdown().await.ok();
        });
        let (mut stream, _) = listener.accept().await.unwrap();
        let incoming = read_request(&mut stream).await.unwrap();
        client.await.unwrap();
        incoming
    }

    #[tokio::test]
    async fn huge_content_length_is_too_large() {
        let raw = b"POST /bets HTTP/1.1\r\nContent-Length: 18446744073709551615\r\n\r\n{}";
        assert!(matches!(read_raw(raw).await, Incoming::TooLarge));
    }

    #[tokio::test]
    async fn body_is_read_up_to_content_length() {
        let raw = b"POST /users HTTP/1.1\r\nContent-Length: 7\r\n\r\n{\"a\":1}";
        match read_raw(raw).await {
            Incoming::Request(req) => assert!(req.ends_with("{\"a\":1}")),
            _ => panic!("expected a request"),
        }
    }
}
