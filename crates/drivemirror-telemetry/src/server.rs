//! HTTP metrics server for Prometheus scraping
//!
//! Exposes a `/metrics` endpoint on `127.0.0.1:9464` (configurable)
//! that returns Prometheus text exposition format.

use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::metrics::MetricsRegistry;

const TEXT_FORMAT: &str = "text/plain; version=0.0.4; charset=utf-8";

/// HTTP server that serves Prometheus metrics on a configurable endpoint.
pub struct MetricsServer {
    metrics: Arc<MetricsRegistry>,
    addr: SocketAddr,
}

impl MetricsServer {
    /// Creates a new `MetricsServer`.
    ///
    /// # Arguments
    /// * `metrics` - The shared metrics registry
    /// * `endpoint` - Address to bind, e.g. `"127.0.0.1:9464"`
    pub fn new(metrics: Arc<MetricsRegistry>, endpoint: &str) -> anyhow::Result<Self> {
        let addr: SocketAddr = endpoint.parse()?;
        Ok(Self { metrics, addr })
    }

    /// Binds the configured address and serves until `shutdown` fires.
    ///
    /// Should be spawned as a background task.
    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serves on an already-bound listener until `shutdown` fires.
    pub async fn serve(
        &self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> anyhow::Result<()> {
        info!(addr = %listener.local_addr()?, "Metrics server listening");

        loop {
            tokio::select! {
                result = listener.accept() => {
                    let (stream, _) = result?;
                    let io = TokioIo::new(stream);
                    let metrics = Arc::clone(&self.metrics);

                    tokio::spawn(async move {
                        let service = service_fn(move |req| {
                            let metrics = Arc::clone(&metrics);
                            async move { handle_request(req, &metrics) }
                        });

                        if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                            error!(error = %e, "Metrics HTTP connection error");
                        }
                    });
                }
                _ = shutdown.cancelled() => {
                    info!("Metrics server shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

fn text_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
}

/// Handle a single HTTP request.
fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: &MetricsRegistry,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    if req.uri().path() != "/metrics" {
        return Ok(text_response(StatusCode::NOT_FOUND, "Not Found".to_string()));
    }

    match metrics.encode() {
        Ok(body) => {
            let mut response = text_response(StatusCode::OK, body);
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_FORMAT));
            Ok(response)
        }
        Err(e) => Ok(text_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {e}"),
        )),
    }
}
