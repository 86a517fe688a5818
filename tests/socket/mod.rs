use std::sync::Arc;

use cache_channel::build_connector;
use cache_channel::transport::socket::InProcHub;
use cache_channel::transport::socket::SocketFactory;
use cache_channel::transport::socket::SocketRelay;
use cache_channel::CacheChannelConnector;
use cache_channel::CacheEvent;
use cache_channel::CacheEventType;
use cache_channel::CacheKey;
use cache_channel::ChannelConfig;
use cache_channel::ConnectorDeps;
use cache_channel::TransportKind;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::common::enable_logger;
use crate::common::Recorder;
use crate::common::QUIET_PERIOD;

fn socket_config() -> ChannelConfig {
    let mut config = ChannelConfig {
        transport: TransportKind::Socket,
        ..Default::default()
    };
    config.socket.subscription_uri = Some("tcp://127.0.0.1:5556".into());
    config.socket.submission_uri = Some("tcp://127.0.0.1:5557".into());
    config.socket.poll_interval_ms = 50;
    config
}

async fn node(
    deps: &ConnectorDeps,
) -> (Arc<dyn CacheChannelConnector>, Arc<Recorder>) {
    let connector = build_connector(&socket_config(), deps.clone()).unwrap();
    let recorder = Recorder::new();
    connector.set_listener(Some(recorder.clone()));
    connector.validate().await.unwrap();
    (connector, recorder)
}

#[tokio::test]
async fn test_socket_nodes_exchange_events_through_hub() {
    enable_logger();
    let hub = InProcHub::new();
    let deps = ConnectorDeps::default().with_socket_factory(Arc::new(hub.clone()));
    let (a, a_events) = node(&deps).await;
    let (b, b_events) = node(&deps).await;
    let (c, c_events) = node(&deps).await;

    let from_a = CacheEvent::new("/pages", CacheKey::composite(["7", "de-DE"]), CacheEventType::INSERT);
    let from_b = CacheEvent::new("/pages", 7, CacheEventType::FLUSH);
    a.broadcast_event(&from_a).await.unwrap();
    b.broadcast_event(&from_b).await.unwrap();

    assert_eq!(c_events.wait_for_events(2).await.len(), 2);
    assert_eq!(a_events.wait_for_events(1).await, vec![from_b.clone()]);
    assert_eq!(b_events.wait_for_events(1).await, vec![from_a.clone()]);

    sleep(QUIET_PERIOD).await;
    assert_eq!(a_events.events().len(), 1);
    assert_eq!(b_events.events().len(), 1);

    for connector in [&a, &b, &c] {
        connector.close().await;
    }
    assert_eq!(hub.subscriber_count(), 0);
    assert_eq!(a_events.disconnects(), 1);
}

#[tokio::test]
async fn test_socket_nodes_exchange_events_through_relay() {
    let clients = InProcHub::new();
    let subscribers = InProcHub::new();
    let relay = {
        let source = clients.subscribe("inproc://submission", "relay", "").await.unwrap();
        let sink = subscribers.push("inproc://subscription", "relay").await.unwrap();
        SocketRelay::new(source, sink)
    };
    let cancel = CancellationToken::new();
    let relay = tokio::spawn(relay.run(cancel.clone()));

    // producer pushes into the relay, consumer listens behind it
    let producer = build_connector(
        &socket_config(),
        ConnectorDeps::default().with_socket_factory(Arc::new(clients.clone())),
    )
    .unwrap();
    producer.validate().await.unwrap();
    let (consumer, consumer_events) =
        node(&ConnectorDeps::default().with_socket_factory(Arc::new(subscribers.clone()))).await;

    let events: Vec<CacheEvent> = (1..=5)
        .map(|key| CacheEvent::new("/components", key, CacheEventType::INVALIDATE))
        .collect();
    for event in &events {
        producer.broadcast_event(event).await.unwrap();
    }

    assert_eq!(consumer_events.wait_for_events(5).await, events);

    producer.close().await;
    consumer.close().await;
    cancel.cancel();
    assert_eq!(relay.await.unwrap(), 5);
}
