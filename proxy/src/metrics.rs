//! Metrics collection module for the Raft client proxy
//!
//! This module provides functionality for collecting and exposing sequencer
//! and transport metrics using Prometheus.

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response};
use lazy_static::lazy_static;
use prometheus::{Counter, CounterVec, Encoder, Opts, Registry, TextEncoder};
use std::net::SocketAddr;

lazy_static! {
    /// Global Prometheus registry instance
    pub static ref REGISTRY_INSTANCE: Registry = Registry::new();

    /// Counter for responses delivered in order, by operation kind
    pub static ref RESPONSES_SEQUENCED_VEC: CounterVec = CounterVec::new(
        Opts::new("responses_sequenced", "responses delivered in order"),
        &["kind"]
    )
    .unwrap();

    /// Counter for events delivered in order
    pub static ref EVENTS_SEQUENCED: Counter = Counter::with_opts(Opts::new(
        "events_sequenced",
        "events delivered in order"
    ))
    .unwrap();

    /// Counter for events dropped due to causal gaps
    pub static ref EVENTS_DROPPED: Counter = Counter::with_opts(Opts::new(
        "events_dropped",
        "events dropped due to causal gaps"
    ))
    .unwrap();

    /// Counter for stale or unallocated responses dropped
    pub static ref RESPONSES_DROPPED: Counter = Counter::with_opts(Opts::new(
        "responses_dropped",
        "stale or unallocated responses dropped"
    ))
    .unwrap();
}

/// Initializes the metrics registry
///
/// Registers all metric collectors with the global registry
pub fn init_registry() {
    let _ = REGISTRY_INSTANCE.register(Box::new(RESPONSES_SEQUENCED_VEC.clone()));
    let _ = REGISTRY_INSTANCE.register(Box::new(EVENTS_SEQUENCED.clone()));
    let _ = REGISTRY_INSTANCE.register(Box::new(EVENTS_DROPPED.clone()));
    let _ = REGISTRY_INSTANCE.register(Box::new(RESPONSES_DROPPED.clone()));
}

/// Starts the metrics endpoint on `addr`
///
/// Spawns a hyper server exposing the registry in the Prometheus text
/// format. Must be called from within a tokio runtime.
pub fn start_metrics_server(addr: SocketAddr) {
    let make_svc = make_service_fn(move |_| {
        let registry = REGISTRY_INSTANCE.clone();
        async move {
            Ok::<_, hyper::Error>(service_fn(move |_: Request<Body>| {
                let registry = registry.clone();
                async move {
                    let encoder = TextEncoder::new();
                    let metric_families = registry.gather();
                    let mut buffer = Vec::new();
                    encoder.encode(&metric_families, &mut buffer).unwrap();
                    Ok::<_, hyper::Error>(Response::new(Body::from(buffer)))
                }
            }))
        }
    });
    init_registry();
    let server = hyper::Server::bind(&addr).serve(make_svc);
    tokio::spawn(async move {
        tokio::pin!(server);
        if let Err(e) = server.await {
            log::error!("metrics server failed: {}", e);
        }
    });
    log::info!("metrics server started on {}", addr);
}
