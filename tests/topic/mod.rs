use std::sync::Arc;

use cache_channel::build_connector;
use cache_channel::transport::topic::InMemoryTopicBroker;
use cache_channel::CacheEvent;
use cache_channel::CacheEventType;
use cache_channel::ChannelConfig;
use cache_channel::ConnectionState;
use cache_channel::ConnectorDeps;
use cache_channel::Error;
use cache_channel::TransportKind;
use tokio::time::sleep;

use crate::common::Recorder;
use crate::common::QUIET_PERIOD;

fn topic_config() -> ChannelConfig {
    let mut config = ChannelConfig {
        transport: TransportKind::Topic,
        ..Default::default()
    };
    config.topic.connection_factory = Some("TopicConnectionFactory".into());
    config.topic.topic = Some("CacheChannel".into());
    config
}

#[tokio::test]
async fn test_topic_nodes_exchange_events_and_survive_outage() {
    let broker = InMemoryTopicBroker::new();
    broker
        .register_factory("TopicConnectionFactory")
        .register_topic("CacheChannel");
    let deps = ConnectorDeps::default().with_naming(Arc::new(broker.clone()));

    let a = build_connector(&topic_config(), deps.clone()).unwrap();
    let b = build_connector(&topic_config(), deps).unwrap();
    let a_events = Recorder::new();
    let b_events = Recorder::new();
    a.set_listener(Some(a_events.clone()));
    b.set_listener(Some(b_events.clone()));
    a.validate().await.unwrap();
    b.validate().await.unwrap();

    let first = CacheEvent::new("/schemas", 3, CacheEventType::REMOVE);
    a.broadcast_event(&first).await.unwrap();
    assert_eq!(b_events.wait_for_events(1).await, vec![first.clone()]);
    sleep(QUIET_PERIOD).await;
    assert!(a_events.events().is_empty());

    // broker outage drops both subscriptions
    broker.set_available(false);
    sleep(QUIET_PERIOD).await;
    assert_eq!(a.state(), ConnectionState::Disconnected);
    assert!(matches!(
        a.broadcast_event(&first).await,
        Err(Error::Connection(_))
    ));

    broker.set_available(true);
    a.validate().await.unwrap();
    b.validate().await.unwrap();
    assert_eq!(a_events.connects(), 2);

    let second = CacheEvent::new("/schemas", 4, CacheEventType::INSERT);
    a.broadcast_event(&second).await.unwrap();
    assert_eq!(b_events.wait_for_events(2).await, vec![first, second]);

    a.close().await;
    b.close().await;
    assert_eq!(b_events.disconnects(), 2);
}
