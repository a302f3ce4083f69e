//! Helpers shared by the unit tests.

use std::io;
use std::sync::{Arc, Mutex};

use crate::context::{Context, Written};
use crate::http::{HttpResponse, Request};
use crate::response::SafeHtml;

/// Builds a request by parsing its wire form. A `Host: localhost` header is
/// added unless `headers` carries one.
pub(crate) fn request(method: &str, target: &str, headers: &[(&str, &str)], body: &str) -> Request {
    let mut raw = format!("{method} {target} HTTP/1.1\r\n");
    if !headers.iter().any(|(name, _)| name.eq_ignore_ascii_case("host")) {
        raw.push_str("Host: localhost\r\n");
    }
    for (name, value) in headers {
        raw.push_str(&format!("{name}: {value}\r\n"));
    }
    if !body.is_empty() {
        raw.push_str(&format!("Content-Length: {}\r\n", body.len()));
    }
    raw.push_str("\r\n");
    raw.push_str(body);

    let (request, _) = Request::parse(raw.as_bytes()).expect("test request must parse");
    request
}

/// Routes log output to the test harness. `RUST_LOG` picks the level.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct LogSink(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Runs `f` on this thread with a subscriber that records events at `WARN`
/// and above, and returns what was logged.
pub(crate) fn capture_warnings<R>(f: impl FnOnce() -> R) -> (R, String) {
    let logs = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&logs);
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || LogSink(Arc::clone(&sink)))
        .with_ansi(false)
        .with_max_level(tracing::Level::WARN)
        .finish();
    let out = tracing::subscriber::with_default(subscriber, f);
    let text = String::from_utf8_lossy(&logs.lock().unwrap()).into_owned();
    (out, text)
}

pub(crate) fn get(target: &str) -> Request {
    request("GET", target, &[], "")
}

/// Marks `request` as received over TLS.
pub(crate) fn tls(request: Request) -> Request {
    request.with_tls(true)
}

pub(crate) fn text(response: &HttpResponse) -> &str {
    std::str::from_utf8(response.body_ref()).expect("utf-8 body")
}

pub(crate) async fn ok_html(ctx: Context) -> Written {
    ctx.write(SafeHtml::from_static("ok"))
}
