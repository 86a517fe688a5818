use lazy_static::lazy_static;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::Opts;
use prometheus::Registry;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use warp::Filter;
use warp::Rejection;
use warp::Reply;


lazy_static! {
    pub static ref BROADCAST_EVENTS: IntCounterVec = IntCounterVec::new(
        Opts::new("cache_events_broadcast_total", "Events handed to a transport for publication"),
        &["transport"]
    )
    .expect("metric can not be created");

    pub static ref RECEIVED_EVENTS: IntCounterVec = IntCounterVec::new(
        Opts::new("cache_events_received_total", "Remote events forwarded to the listener"),
        &["transport"]
    )
    .expect("metric can not be created");

    pub static ref DROPPED_EVENTS: IntCounterVec = IntCounterVec::new(
        Opts::new("cache_events_dropped_total", "Inbound or outbound events that were dropped"),
        &["transport", "reason"]
    )
    .expect("metric can not be created");

    pub static ref SELF_ECHO_SUPPRESSED: IntCounterVec = IntCounterVec::new(
        Opts::new("cache_self_echo_suppressed_total", "Own publications discarded on receipt"),
        &["transport"]
    )
    .expect("metric can not be created");

    pub static ref CONNECTION_TRANSITIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("cache_connection_transitions_total", "Connector state transitions"),
        &["transport", "state"]
    )
    .expect("metric can not be created");

    pub static ref REGISTERED_LISTENERS: IntGauge = IntGauge::new(
        "cache_registry_listeners",
        "Listeners currently registered with the registry service"
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

pub(crate) fn register_custom_metrics(registry: &Registry) {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(BROADCAST_EVENTS.clone()),
        Box::new(RECEIVED_EVENTS.clone()),
        Box::new(DROPPED_EVENTS.clone()),
        Box::new(SELF_ECHO_SUPPRESSED.clone()),
        Box::new(CONNECTION_TRANSITIONS.clone()),
        Box::new(REGISTERED_LISTENERS.clone()),
    ];
    for collector in collectors {
        if let Err(e) = registry.register(collector) {
            error!("collector can not be registered: {}", e);
        }
    }
}

/// Serves `/metrics` on `port` until `shutdown_signal` changes
pub async fn start_server(
    port: u16,
    mut shutdown_signal: watch::Receiver<()>,
) {
    register_custom_metrics(&REGISTRY);

    let metrics_route = warp::path!("metrics").and_then(metrics_handler);

    let (addr, server) =
        warp::serve(metrics_route).bind_with_graceful_shutdown(([0, 0, 0, 0], port), async move {
            let _ = shutdown_signal.changed().await;
        });
    info!("metrics endpoint listening on {}", addr);
    server.await;
}

async fn metrics_handler() -> Result<impl Reply, Rejection> {
    Ok(gather_metrics(&REGISTRY))
}

/// Text exposition of `registry` followed by the default registry
pub(crate) fn gather_metrics(registry: &Registry) -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        error!("could not encode custom metrics: {}", e);
    }
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        error!("could not encode prometheus metrics: {}", e);
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        error!("metrics could not be from_utf8'd: {}", e);
        String::default()
    })
}
