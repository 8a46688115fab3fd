//! Blocking HTTP front end over [`Service`].

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tiny_http::{Header, Request, Response, Server, StatusCode};

use crate::cache::DatasetLoader;
use crate::error::Result;
use crate::service::{API_KEY_HEADER, ApiRequest, Body, Method, Service};

/// Helper to create HTTP headers, returning None if the bytes are invalid
fn create_header(name: &[u8], value: &[u8]) -> Option<Header> {
    Header::from_bytes(name, value).ok()
}

/// Listens on a socket and hands each request to its own thread.
pub struct HttpServer<L> {
    server: Server,
    service: Arc<Service<L>>,
}

impl<L: DatasetLoader + 'static> HttpServer<L> {
    /// Bind `addr` (`host:port`; port 0 picks a free one).
    pub fn bind(addr: &str, service: Arc<Service<L>>) -> Result<Self> {
        let server = Server::http(addr).map_err(io::Error::other)?;
        Ok(Self { server, service })
    }

    /// The bound address, once listening on TCP.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.server_addr().to_ip()
    }

    /// Serve until the listener fails.
    pub fn serve(&self) {
        for request in self.server.incoming_requests() {
            self.dispatch(request);
        }
    }

    /// Serve until `shutdown` is set.
    pub fn serve_until(&self, shutdown: &AtomicBool) {
        while !shutdown.load(Ordering::Relaxed) {
            match self.server.recv_timeout(Duration::from_millis(100)) {
                Ok(Some(request)) => self.dispatch(request),
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(error = %e, "listener failed");
                    break;
                }
            }
        }
    }

    fn dispatch(&self, request: Request) {
        let service = Arc::clone(&self.service);
        thread::spawn(move || handle(&service, request));
    }
}

fn handle<L: DatasetLoader>(service: &Service<L>, request: Request) {
    let start = Instant::now();
    let method = Method::parse(request.method().as_str());
    let mut req = ApiRequest::new(method, request.url());
    req.api_key = request
        .headers()
        .iter()
        .find(|h| h.field.equiv(API_KEY_HEADER))
        .map(|h| h.value.as_str().to_string());

    let res = service.handle(&req);
    let status = StatusCode(res.status);
    let headers: Vec<Header> = create_header(b"Content-Type", res.content_type().as_bytes())
        .into_iter()
        .collect();

    let sent = match res.body {
        Body::Json(bytes) => {
            let len = bytes.len();
            request.respond(Response::new(status, headers, io::Cursor::new(bytes), Some(len), None))
        }
        // Unknown length, so HTTP/1.1 clients get chunked encoding
        Body::Ndjson(stream) => request.respond(Response::new(status, headers, stream, None, None)),
    };

    tracing::debug!(
        method = method.as_str(),
        path = %req.path,
        status = res.status,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "request"
    );
    if let Err(e) = sent {
        tracing::warn!(path = %req.path, error = %e, "failed to send response");
    }
}
