//! Forward-auth listener.
//!
//! A fronting proxy sends each API request (or a copy of its method, path
//! and identity headers) here before forwarding it. 200 means admit, and the
//! quota headers in the reply are meant to be copied onto the API response.

pub mod handler;

pub use handler::{forwarded_target, handle_request, outcome_response};

use hyper::body::Incoming;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::admission::TracingEventSink;
use crate::config::Config;
use crate::error::{GateError, Result};
use crate::gate::{AdmissionGate, GateBuilder};
use crate::telemetry::{init_metrics, start_observability_server, Metrics};

/// Guard to decrement active connections counter when dropped
struct ConnectionGuard(Arc<AtomicUsize>);

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Accept forward-auth requests on `listener` until `shutdown` is cancelled,
/// then wait up to `grace` for open connections to finish.
pub async fn serve(
    listener: TcpListener,
    gate: Arc<AdmissionGate>,
    metrics: Option<Arc<Metrics>>,
    shutdown: CancellationToken,
    grace: Duration,
) -> Result<()> {
    let builder = ConnBuilder::new(TokioExecutor::new());
    let active_connections = Arc::new(AtomicUsize::new(0));
    let addr = listener.local_addr().map_err(GateError::Io)?;

    info!(?addr, "admission gate listening");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Shutdown requested, no longer accepting connections");
                break;
            }
            result = listener.accept() => {
                let (stream, peer) = match result {
                    Ok((stream, peer)) => (stream, peer),
                    Err(e) => {
                        warn!(error = %e, "accept error");
                        continue;
                    }
                };

                active_connections.fetch_add(1, Ordering::Relaxed);

                let builder = builder.clone();
                let gate = Arc::clone(&gate);
                let metrics = metrics.clone();
                let active_connections = active_connections.clone();

                tokio::spawn(async move {
                    let _guard = ConnectionGuard(active_connections);
                    let svc = hyper::service::service_fn(move |req: Request<Incoming>| {
                        let resp = handle_request(&req, peer, &gate, metrics.as_ref());
                        async move { Ok::<_, hyper::Error>(resp) }
                    });

                    if let Err(e) = builder.serve_connection(TokioIo::new(stream), svc).await {
                        warn!(?peer, error = %e, "serve_connection error");
                    }
                });
            }
        }
    }

    info!("Waiting for active connections to finish (timeout: {}s)", grace.as_secs());
    let start = std::time::Instant::now();

    loop {
        let active = active_connections.load(Ordering::Relaxed);
        if active == 0 {
            info!("All connections closed, shutdown complete");
            break;
        }

        if start.elapsed() >= grace {
            warn!(
                active_connections = active,
                "Shutdown timeout reached, {} connections still active", active
            );
            break;
        }

        sleep(Duration::from_millis(100)).await;
    }

    Ok(())
}

/// Cancel `token` on SIGTERM or SIGINT.
pub fn cancel_on_signal(token: CancellationToken) -> Result<()> {
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate()).map_err(|e| {
        GateError::Io(std::io::Error::other(format!("Failed to setup SIGTERM handler: {e}")))
    })?;
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt()).map_err(|e| {
        GateError::Io(std::io::Error::other(format!("Failed to setup SIGINT handler: {e}")))
    })?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
            _ = sigint.recv() => info!("Received SIGINT, initiating graceful shutdown"),
            _ = token.cancelled() => return,
        }
        token.cancel();
    });
    Ok(())
}

/// Build the gate from `config` and serve until a shutdown signal arrives.
///
/// Starts the reaper and, when `telemetry.metrics_port` is set, the
/// observability server. Both stop with the listener.
pub async fn run(config: Arc<Config>) -> Result<()> {
    let (metrics, registry) = match config.telemetry.metrics_port {
        Some(_) => {
            let (metrics, registry) =
                init_metrics().map_err(|e| GateError::Telemetry(e.to_string()))?;
            (Some(metrics), Some(registry))
        }
        None => (None, None),
    };

    let gate = Arc::new(
        GateBuilder::from_config(&config)?
            .events(Arc::new(TracingEventSink))
            .metrics(metrics.clone())
            .build(),
    );

    let listener = TcpListener::bind(config.listen).await.map_err(GateError::Io)?;
    let shutdown = CancellationToken::new();
    cancel_on_signal(shutdown.clone())?;

    if let (Some(port), Some(registry)) = (config.telemetry.metrics_port, registry) {
        let gate = Arc::clone(&gate);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = start_observability_server(port, registry, gate, shutdown).await {
                error!(error = %e, "observability server exited with error");
            }
        });
    }

    let reaper = if gate.is_enabled() {
        Some(gate.start_reaper(config.admission.reaper_interval()))
    } else {
        None
    };

    let grace = Duration::from_secs(config.shutdown_secs);
    let served = serve(listener, Arc::clone(&gate), metrics, shutdown.clone(), grace).await;

    shutdown.cancel();
    if let Some(reaper) = reaper {
        reaper.stop().await;
    }
    info!("admission gate stopped");
    served
}
