//! Loopback listener for the OAuth redirect.
//!
//! Handles just enough HTTP/1.1 to read one `GET` request line and answer
//! with a small HTML page. Requests for other paths (a browser's favicon
//! request, for example) get a 404 and the listener keeps waiting.
//!
//! Each connection is served on its own task with a deadline, so a client
//! that connects and never writes cannot hold up the real redirect.

use std::sync::Arc;
use std::time::Duration;

use percent_encoding::percent_decode_str;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::errors::{AuthError, Result};

const CALLBACK_PATH: &str = "/callback";

/// Time a connection gets to deliver its request line and headers.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Parsed query of a redirect request.
#[derive(Debug, Default, PartialEq, Eq)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Wait for the redirect carrying `expected_state` and return its code.
///
/// Returns on the first request to the callback path, successful or not.
/// Callers bound the wait with a timeout; dropping the future closes the
/// listener and aborts connections still being served.
pub async fn wait_for_code(listener: TcpListener, expected_state: &str) -> Result<String> {
    let expected_state: Arc<str> = Arc::from(expected_state);
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                debug!(%peer, "callback connection");
                let state = Arc::clone(&expected_state);
                let _ = connections.spawn(async move {
                    tokio::time::timeout(REQUEST_TIMEOUT, handle(stream, &state))
                        .await
                        .unwrap_or_else(|_| {
                            Err(std::io::Error::new(
                                std::io::ErrorKind::TimedOut,
                                "no request before the deadline",
                            ))
                        })
                });
            }
            Some(joined) = connections.join_next() => match joined {
                Ok(Ok(Some(outcome))) => return outcome,
                Ok(Ok(None)) => {}
                Ok(Err(e)) => warn!(error = %e, "malformed callback request, ignoring"),
                Err(e) => warn!(error = %e, "callback connection task failed"),
            },
        }
    }
}

/// Serve one request. `None` means it was not for the callback path.
async fn handle(stream: TcpStream, expected_state: &str) -> std::io::Result<Option<Result<String>>> {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    let _ = reader.read_line(&mut request_line).await?;

    // Drain headers so the client sees a clean response.
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 || line == "\r\n" || line == "\n" {
            break;
        }
    }

    let target = request_line.split_whitespace().nth(1).unwrap_or_default();
    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    let mut stream = reader.into_inner();

    if path != CALLBACK_PATH {
        respond(&mut stream, 404, "Not found").await?;
        return Ok(None);
    }

    let query = parse_query(query);
    let outcome = if let Some(error) = query.error {
        respond(&mut stream, 200, "Sign-in was cancelled. You can close this window.").await?;
        Err(AuthError::Denied(error))
    } else if query.state.as_deref() != Some(expected_state) {
        respond(&mut stream, 400, "Sign-in failed: state mismatch. Please retry.").await?;
        Err(AuthError::StateMismatch)
    } else if let Some(code) = query.code {
        respond(&mut stream, 200, "Signed in. You can close this window.").await?;
        Ok(code)
    } else {
        respond(&mut stream, 400, "Sign-in failed: no authorization code.").await?;
        Err(AuthError::OAuth {
            status: 0,
            message: "redirect carried no authorization code".into(),
        })
    };
    Ok(Some(outcome))
}

fn parse_query(query: &str) -> CallbackQuery {
    let mut out = CallbackQuery::default();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let value = decode(value);
        match key {
            "code" => out.code = Some(value),
            "state" => out.state = Some(value),
            "error" => out.error = Some(value),
            _ => {}
        }
    }
    out
}

fn decode(value: &str) -> String {
    percent_decode_str(&value.replace('+', " "))
        .decode_utf8_lossy()
        .into_owned()
}

async fn respond(stream: &mut TcpStream, status: u16, message: &str) -> std::io::Result<()> {
    let reason = match status {
        200 => "OK",
        400 => "Bad Request",
        _ => "Not Found",
    };
    let body = format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>Cairn</title></head>\
         <body style=\"font-family:sans-serif\"><p>{message}</p></body></html>"
    );
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: text/html; charset=utf-8\r\n\
         Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
