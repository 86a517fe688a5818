use std::sync::Arc;
use std::time::Duration;

use config::ConfigError;
use tokio::sync::mpsc;
use tokio::time::sleep;

use super::*;
use crate::config::TopicConfig;
use crate::config::TransportKind;
use crate::event::CacheEventType;
use crate::event::CacheKey;
use crate::test_utils::enable_logger;
use crate::test_utils::RecordingListener;

const FACTORY: &str = "TopicConnectionFactory";
const TOPIC: &str = "CacheChannel";
const WAIT: Duration = Duration::from_secs(2);

fn topic_config() -> ChannelConfig {
    ChannelConfig {
        transport: TransportKind::Topic,
        topic: TopicConfig {
            connection_factory: Some(FACTORY.into()),
            topic: Some(TOPIC.into()),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn broker() -> InMemoryTopicBroker {
    let broker = InMemoryTopicBroker::new();
    broker.register_factory(FACTORY).register_topic(TOPIC);
    broker
}

async fn connected(broker: &InMemoryTopicBroker) -> (TopicConnector, Arc<RecordingListener>) {
    let connector = TopicConnector::new(Arc::new(broker.clone()));
    let listener = RecordingListener::new();
    connector.set_listener(Some(listener.clone()));
    connector.configure(&topic_config()).unwrap();
    connector.validate().await.unwrap();
    (connector, listener)
}

#[test]
fn test_configure_requires_factory_and_topic() {
    let connector = TopicConnector::new(Arc::new(broker()));
    let mut config = topic_config();
    config.topic.topic = None;

    match connector.configure(&config) {
        Err(Error::Config(ConfigError::NotFound(key))) => assert_eq!(key, "topic.topic"),
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(connector.state(), ConnectionState::Unconfigured);
}

#[tokio::test]
async fn test_validate_before_configure_is_rejected() {
    let connector = TopicConnector::new(Arc::new(broker()));

    assert!(matches!(connector.validate().await, Err(Error::NotConfigured)));
}

#[tokio::test]
async fn test_peer_receives_event_and_publisher_filters_its_own() {
    enable_logger();
    let broker = broker();
    let (a, a_listener) = connected(&broker).await;
    let (b, b_listener) = connected(&broker).await;
    assert_ne!(a.identifier(), b.identifier());

    a.broadcast_event(&CacheEvent::new("/products", 42, CacheEventType::REMOVE))
        .await
        .unwrap();

    let events = b_listener.wait_for_events(1, WAIT).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].region_path(), "/products");
    assert_eq!(events[0].key(), &CacheKey::Numeric(42));
    assert_eq!(events[0].event_type(), CacheEventType::REMOVE);

    sleep(Duration::from_millis(100)).await;
    assert!(a_listener.events().is_empty());
    assert_eq!(a_listener.connects(), 1);
    assert_eq!(b_listener.connects(), 1);

    a.close().await;
    b.close().await;
}

#[tokio::test]
async fn test_composite_key_is_delivered_as_string() {
    let broker = broker();
    let (a, _) = connected(&broker).await;
    let (_b, b_listener) = connected(&broker).await;

    a.broadcast_event(&CacheEvent::new("/pages", "42:en-US", CacheEventType::INSERT))
        .await
        .unwrap();

    let events = b_listener.wait_for_events(1, WAIT).await;
    assert_eq!(events[0].key(), &CacheKey::Composite("42:en-US".into()));
}

#[tokio::test]
async fn test_bad_messages_are_dropped_without_state_change() {
    let broker = broker();
    let (b, b_listener) = connected(&broker).await;

    let raw = broker.create_connection("raw-client").await.unwrap();
    let topic = Topic::new(TOPIC);
    for message in [
        TopicMessage {
            body: MessageBody::Bytes(vec![1, 2, 3]),
            properties: Default::default(),
        },
        TopicMessage::text("garbage <<"),
        TopicMessage::text(r#"<otherEvent regionPath="/r" key="1" type="1"/>"#),
        TopicMessage::text(r#"<cacheEvent regionPath="/r" key="abc" type="1"/>"#),
        TopicMessage::text(r#"<cacheEvent regionPath="/r" key="7" type="1"/>"#)
            .with_property(CLIENT_PROPERTY, "raw-client"),
    ] {
        raw.publish(&topic, message, DeliveryMode::NonPersistent).await.unwrap();
    }

    let events = b_listener.wait_for_events(1, WAIT).await;
    sleep(Duration::from_millis(100)).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].key(), &CacheKey::Numeric(7));
    assert_eq!(b.state(), ConnectionState::Connected);
    assert_eq!(b_listener.disconnects(), 0);
}

#[tokio::test]
async fn test_broker_outage_fires_disconnect_and_validate_reconnects() {
    let broker = broker();
    let (a, listener) = connected(&broker).await;

    broker.set_available(false);
    assert_eq!(listener.wait_for_disconnects(1, WAIT).await, 1);
    assert_eq!(a.state(), ConnectionState::Disconnected);

    let result = a
        .broadcast_event(&CacheEvent::new("/r", 1, CacheEventType::INVALIDATE))
        .await;
    assert!(result.unwrap_err().is_retryable());
    assert!(a.validate().await.is_err());
    assert_eq!(listener.disconnects(), 1);

    broker.set_available(true);
    a.validate().await.unwrap();
    assert_eq!(a.state(), ConnectionState::Connected);
    assert_eq!(listener.connects(), 2);

    // idempotent once connected
    a.validate().await.unwrap();
    assert_eq!(listener.connects(), 2);
}

#[tokio::test]
async fn test_publish_failure_tears_down_session_and_surfaces_error() {
    let (_keep_alive, subscription) = mpsc::unbounded_channel::<TopicMessage>();
    let mut subscription = Some(subscription);

    let mut connection = MockTopicConnection::new();
    connection
        .expect_subscribe()
        .times(1)
        .returning(move |_| Ok(subscription.take().unwrap()));
    connection
        .expect_publish()
        .times(1)
        .returning(|_, _, _| Err(ConnectionError::Broker("broker went away".into()).into()));
    connection.expect_close().times(1).returning(|| Ok(()));
    let connection: Arc<dyn TopicConnection> = Arc::new(connection);

    let mut factory = MockTopicConnectionFactory::new();
    factory
        .expect_create_connection()
        .times(1)
        .returning(move |_| Ok(connection.clone()));
    let factory: Arc<dyn TopicConnectionFactory> = Arc::new(factory);

    let mut naming = MockNamingContext::new();
    naming
        .expect_lookup_factory()
        .times(1)
        .returning(move |_, _| Ok(factory.clone()));
    naming
        .expect_lookup_topic()
        .times(1)
        .returning(|name| Ok(Topic::new(name)));

    let connector = TopicConnector::new(Arc::new(naming));
    let listener = RecordingListener::new();
    connector.set_listener(Some(listener.clone()));
    connector.configure(&topic_config()).unwrap();
    connector.validate().await.unwrap();

    let result = connector
        .broadcast_event(&CacheEvent::new("/r", 1, CacheEventType::INVALIDATE))
        .await;

    match result {
        Err(Error::Connection(ConnectionError::Remote { operation, .. })) => {
            assert_eq!(operation, "publish")
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(listener.disconnects(), 1);
    assert_eq!(connector.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_lookup_failure_is_a_connection_error() {
    let broker = InMemoryTopicBroker::new();
    broker.register_topic(TOPIC);
    let connector = TopicConnector::new(Arc::new(broker));
    connector.configure(&topic_config()).unwrap();

    match connector.validate().await {
        Err(Error::Connection(ConnectionError::Lookup { name, .. })) => assert_eq!(name, FACTORY),
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(connector.state(), ConnectionState::Configured);
}

#[tokio::test]
async fn test_close_is_idempotent_and_terminal() {
    let broker = broker();
    let (a, listener) = connected(&broker).await;

    a.close().await;
    a.close().await;

    assert_eq!(a.state(), ConnectionState::Closed);
    assert_eq!(listener.disconnects(), 1);
    assert!(matches!(
        a.broadcast_event(&CacheEvent::new("/r", 1, CacheEventType::FLUSH)).await,
        Err(Error::Closed)
    ));
    assert!(matches!(a.validate().await, Err(Error::Closed)));
    assert!(matches!(a.configure(&topic_config()), Err(Error::Closed)));
}

#[tokio::test]
async fn test_broadcast_connects_on_demand() {
    let broker = broker();
    let connector = TopicConnector::new(Arc::new(broker.clone()));
    let listener = RecordingListener::new();
    connector.set_listener(Some(listener.clone()));
    connector.configure(&topic_config()).unwrap();

    connector
        .broadcast_event(&CacheEvent::new("/r", 3, CacheEventType::INSERT))
        .await
        .unwrap();

    assert_eq!(connector.state(), ConnectionState::Connected);
    assert_eq!(listener.connects(), 1);
}

#[tokio::test]
async fn test_dead_delivery_fires_disconnect_and_validate_reopens() {
    enable_logger();
    let broker = broker();
    let (a, a_listener) = connected(&broker).await;
    let (b, _) = connected(&broker).await;

    a_listener.panic_on_events(true);
    b.broadcast_event(&CacheEvent::new("/r", 1, CacheEventType::INVALIDATE))
        .await
        .unwrap();
    sleep(Duration::from_millis(100)).await;
    assert!(a_listener.events().is_empty());

    a_listener.panic_on_events(false);
    a.validate().await.unwrap();
    assert_eq!(a_listener.disconnects(), 1);
    assert_eq!(a_listener.connects(), 2);
    assert_eq!(a.state(), ConnectionState::Connected);

    let second = CacheEvent::new("/r", 2, CacheEventType::INVALIDATE);
    b.broadcast_event(&second).await.unwrap();
    assert_eq!(a_listener.wait_for_events(1, WAIT).await, vec![second]);
}

#[test]
fn test_own_publication_is_discarded_before_decoding() {
    let state = StateTracker::new(TOPIC_CLIENT_PREFIX);
    let listener = ListenerSlot::new();
    let recorder = RecordingListener::new();
    listener.set(Some(recorder.clone()));

    let own_garbage = TopicMessage::text("garbage <<").with_property(CLIENT_PROPERTY, "TOPIC-SELF");
    assert_eq!(
        on_message(own_garbage, "topic-self", &state, &listener),
        Received::OwnPublication
    );

    let peer_garbage = TopicMessage::text("garbage <<").with_property(CLIENT_PROPERTY, "topic-peer");
    assert_eq!(
        on_message(peer_garbage, "topic-self", &state, &listener),
        Received::Dropped
    );

    let peer_event = TopicMessage::text(r#"<cacheEvent regionPath="/r" key="7" type="1"/>"#)
        .with_property(CLIENT_PROPERTY, "topic-peer");
    assert_eq!(
        on_message(peer_event, "topic-self", &state, &listener),
        Received::Delivered
    );
    assert_eq!(recorder.events().len(), 1);
}
