use crate::gate::{names, AdmissionGate};
use crate::telemetry::{
    handle_metrics, health_check_response, live_check_response, load_factor_response,
    ready_check_response, stats_response, update_load_factor, MAX_ADMIN_BODY,
};
use http::Method;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::{Bytes, Incoming};
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use prometheus::Registry;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::health::RespBody;

fn plain_response(status: StatusCode, text: &'static str) -> Response<RespBody> {
    let body = Full::new(Bytes::from(text))
        .map_err(|never| match never {})
        .boxed();
    let mut resp = Response::new(body);
    *resp.status_mut() = status;
    resp
}

async fn route(
    req: Request<Incoming>,
    registry: &Registry,
    gate: &AdmissionGate,
) -> Response<RespBody> {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let result = match (&method, path.as_str()) {
        (_, "/health") => health_check_response(),
        (_, "/ready") => ready_check_response(gate),
        (_, "/live") => live_check_response(),
        (_, "/metrics") => handle_metrics(registry),
        (&Method::GET, "/stats") => stats_response(gate),
        (&Method::GET, "/load-factor") => load_factor_response(gate),
        (&Method::POST, "/load-factor") => {
            let token = req
                .headers()
                .get(names::EMERGENCY_TOKEN)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            match Limited::new(req.into_body(), MAX_ADMIN_BODY).collect().await {
                Ok(collected) => {
                    update_load_factor(gate, token.as_deref(), &collected.to_bytes())
                }
                Err(_) => return plain_response(StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large"),
            }
        }
        _ => return plain_response(StatusCode::NOT_FOUND, "Not Found"),
    };

    result.unwrap_or_else(|e| {
        warn!(error = %e, "Observability server: handler error");
        plain_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
    })
}

/// Start the observability server that handles metrics, health checks and
/// admission administration
/// This server runs on a dedicated port and serves:
/// - `/metrics` - Prometheus metrics
/// - `/health` - Health check endpoint
/// - `/ready` - Readiness check endpoint
/// - `/live` - Liveness check endpoint
/// - `/stats` - Counter store snapshot
/// - `/load-factor` - Read (GET) or set (POST, token required) the adaptive load factor
pub async fn start_observability_server(
    port: u16,
    registry: Registry,
    gate: Arc<AdmissionGate>,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    serve_observability(listener, registry, gate, shutdown).await
}

/// Serve on an already bound listener until `shutdown` is cancelled
pub async fn serve_observability(
    listener: TcpListener,
    registry: Registry,
    gate: Arc<AdmissionGate>,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let registry = Arc::new(registry);
    let addr = listener.local_addr()?;

    info!(?addr, "Observability server started (metrics + health checks)");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Observability server: shutting down");
                break;
            }
            result = listener.accept() => {
                let (stream, peer) = match result {
                    Ok((stream, peer)) => (stream, peer),
                    Err(e) => {
                        warn!(error = %e, "Observability server: accept error");
                        continue;
                    }
                };

                let registry = registry.clone();
                let gate = gate.clone();
                tokio::spawn(async move {
                    let svc = hyper::service::service_fn(move |req: Request<Incoming>| {
                        let registry = registry.clone();
                        let gate = gate.clone();
                        async move { Ok::<_, hyper::Error>(route(req, &registry, &gate).await) }
                    });

                    let builder = ConnBuilder::new(TokioExecutor::new());
                    if let Err(e) = builder.serve_connection(TokioIo::new(stream), svc).await {
                        warn!(?peer, error = %e, "Observability server: serve_connection error");
                    }
                });
            }
        }
    }

    info!("Observability server stopped");
    Ok(())
}
