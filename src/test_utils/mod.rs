//! Helpers shared by the unit tests of all transports
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use lazy_static::lazy_static;
use parking_lot::Mutex;
use tokio::time::sleep;
use tokio::time::Instant;

use crate::channel::CacheChannelEventListener;
use crate::event::CacheEvent;

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
    println!("setup logger for unit test.");
}

/// Listener that records every callback
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<CacheEvent>>,
    logs: Mutex<Vec<String>>,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    panic_on_events: AtomicBool,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes `on_remote_event` panic, which kills the delivering task
    pub fn panic_on_events(
        &self,
        enabled: bool,
    ) {
        self.panic_on_events.store(enabled, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<CacheEvent> {
        self.events.lock().clone()
    }

    pub fn logs(&self) -> Vec<String> {
        self.logs.lock().clone()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    /// Waits until at least `count` events arrived or `timeout` elapsed
    pub async fn wait_for_events(
        &self,
        count: usize,
        timeout: Duration,
    ) -> Vec<CacheEvent> {
        let deadline = Instant::now() + timeout;
        loop {
            let events = self.events();
            if events.len() >= count || Instant::now() >= deadline {
                return events;
            }
            sleep(Duration::from_millis(10)).await;
        }
    }

    pub async fn wait_for_disconnects(
        &self,
        count: usize,
        timeout: Duration,
    ) -> usize {
        let deadline = Instant::now() + timeout;
        loop {
            let n = self.disconnects();
            if n >= count || Instant::now() >= deadline {
                return n;
            }
            sleep(Duration::from_millis(10)).await;
        }
    }
}

impl CacheChannelEventListener for RecordingListener {
    fn on_remote_event(
        &self,
        event: CacheEvent,
    ) {
        if self.panic_on_events.load(Ordering::SeqCst) {
            panic!("listener failed on {event}");
        }
        self.events.lock().push(event);
    }

    fn on_disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }

    fn on_connect(&self) {
        self.connects.fetch_add(1, Ordering::SeqCst);
    }

    fn on_log(
        &self,
        message: &str,
    ) {
        self.logs.lock().push(message.to_string());
    }
}
