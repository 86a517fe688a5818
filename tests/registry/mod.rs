use std::net::SocketAddr;

use cache_channel::build_connector;
use cache_channel::CacheEvent;
use cache_channel::CacheEventType;
use cache_channel::ChannelConfig;
use cache_channel::ConnectionError;
use cache_channel::ConnectionState;
use cache_channel::ConnectorDeps;
use cache_channel::Error;
use cache_channel::TransportKind;
use tokio::time::sleep;

use crate::common::enable_logger;
use crate::common::Recorder;
use crate::common::RegistryServer;
use crate::common::QUIET_PERIOD;

fn registry_config(
    addr: SocketAddr,
    instance: Option<&str>,
) -> ChannelConfig {
    let mut config = ChannelConfig {
        transport: TransportKind::Registry,
        ..Default::default()
    };
    config.registry.host = addr.ip().to_string();
    config.registry.port = addr.port();
    config.registry.instance = instance.map(str::to_string);
    config
}

#[tokio::test]
async fn test_registry_broadcast_reaches_peers_over_grpc() {
    enable_logger();
    let server = RegistryServer::start(Some("it")).await;
    let config = registry_config(server.addr, Some("it"));

    let a = build_connector(&config, ConnectorDeps::default()).unwrap();
    let b = build_connector(&config, ConnectorDeps::default()).unwrap();
    let a_events = Recorder::new();
    let b_events = Recorder::new();
    a.set_listener(Some(a_events.clone()));
    b.set_listener(Some(b_events.clone()));

    a.validate().await.unwrap();
    b.validate().await.unwrap();
    assert_eq!(server.wait_for_listeners(2).await, 2);
    assert_eq!(a_events.connects(), 1);

    let event = CacheEvent::new("/pages", "12:en", CacheEventType::INVALIDATE);
    a.broadcast_event(&event).await.unwrap();

    assert_eq!(b_events.wait_for_events(1).await, vec![event]);
    sleep(QUIET_PERIOD).await;
    assert!(a_events.events().is_empty());

    // liveness probe of a registered client succeeds without reconnecting
    a.validate().await.unwrap();
    assert_eq!(a_events.connects(), 1);

    a.close().await;
    assert_eq!(server.wait_for_listeners(1).await, 1);
    assert_eq!(a_events.disconnects(), 1);

    b.close().await;
    server.stop();
}

#[tokio::test]
async fn test_registry_instance_mismatch_is_not_bound() {
    let server = RegistryServer::start(Some("live")).await;
    let connector =
        build_connector(&registry_config(server.addr, Some("staging")), ConnectorDeps::default()).unwrap();

    match connector.validate().await {
        Err(Error::Connection(ConnectionError::NotBound(name))) => {
            assert_eq!(name, "CacheChannelService_staging")
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(connector.state(), ConnectionState::Configured);

    connector.close().await;
    server.stop();
}

#[tokio::test]
async fn test_registry_unreachable_service_fails_lookup() {
    // bind then release a port so nothing is listening on it
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let mut config = registry_config(addr, None);
    config.registry.connect_timeout_ms = 500;
    let connector = build_connector(&config, ConnectorDeps::default()).unwrap();

    match connector.validate().await {
        Err(Error::Connection(ConnectionError::Lookup { name, .. })) => {
            assert_eq!(name, format!("//127.0.0.1:{}/CacheChannelService", addr.port()))
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn test_forgotten_client_is_recovered_by_validate() {
    let server = RegistryServer::start(None).await;
    let config = registry_config(server.addr, None);
    let connector = build_connector(&config, ConnectorDeps::default()).unwrap();
    let events = Recorder::new();
    connector.set_listener(Some(events.clone()));
    connector.validate().await.unwrap();

    // the service forgets the client: the next probe reports it dead
    server.registry.clear_listeners();
    connector.validate().await.unwrap();

    assert_eq!(events.disconnects(), 1);
    assert_eq!(events.connects(), 2);
    assert_eq!(server.wait_for_listeners(1).await, 1);

    connector.close().await;
    server.stop();
}
