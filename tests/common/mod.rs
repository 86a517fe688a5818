use std::net::SocketAddr;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use cache_channel::transport::registry::start_registry_server;
use cache_channel::transport::registry::CacheChannelRegistry;
use cache_channel::CacheChannelEventListener;
use cache_channel::CacheEvent;
use lazy_static::lazy_static;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio::time::Instant;

pub const WAIT: Duration = Duration::from_secs(5);

// long enough for a peer's event to arrive if it was going to
pub const QUIET_PERIOD: Duration = Duration::from_millis(300);

lazy_static! {
    static ref LOGGER_INIT: () = {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    };
}

pub fn enable_logger() {
    let _ = *LOGGER_INIT;
    println!("setup logger for integration test.");
}

#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<CacheEvent>>,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<CacheEvent> {
        self.events.lock().clone()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub async fn wait_for_events(
        &self,
        count: usize,
    ) -> Vec<CacheEvent> {
        let deadline = Instant::now() + WAIT;
        loop {
            let events = self.events();
            if events.len() >= count || Instant::now() >= deadline {
                return events;
            }
            sleep(Duration::from_millis(20)).await;
        }
    }
}

impl CacheChannelEventListener for Recorder {
    fn on_remote_event(
        &self,
        event: CacheEvent,
    ) {
        self.events.lock().push(event);
    }

    fn on_disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }

    fn on_connect(&self) {
        self.connects.fetch_add(1, Ordering::SeqCst);
    }
}

/// Loopback registry server on an ephemeral port
pub struct RegistryServer {
    pub addr: SocketAddr,
    pub registry: CacheChannelRegistry,
    shutdown: watch::Sender<()>,
    handle: JoinHandle<()>,
}

impl RegistryServer {
    pub async fn start(instance: Option<&str>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let registry = CacheChannelRegistry::new(instance, 64);
        let (shutdown, shutdown_rx) = watch::channel(());

        let served = registry.clone();
        let handle = tokio::spawn(async move {
            start_registry_server(listener, served, shutdown_rx).await.unwrap();
        });

        Self {
            addr,
            registry,
            shutdown,
            handle,
        }
    }

    pub async fn wait_for_listeners(
        &self,
        count: usize,
    ) -> usize {
        let deadline = Instant::now() + WAIT;
        loop {
            let n = self.registry.listener_count();
            if n == count || Instant::now() >= deadline {
                return n;
            }
            sleep(Duration::from_millis(20)).await;
        }
    }

    pub fn stop(self) {
        let _ = self.shutdown.send(());
        self.handle.abort();
    }
}
