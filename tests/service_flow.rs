//! End-to-end flow tests over the mock transport: inbound command in,
//! announcement out, with the real supervisor, publisher and dispatcher in
//! between.

use gblink::config::{DeviceSection, MqttSection, ServiceConfig};
use gblink::service::DeviceService;
use gblink::testing::mocks::{MockExecutor, MockTransportFactory, MockTransportState};
use gblink::transport::{InboundMessage, Qos};
use std::sync::Arc;
use std::time::Duration;

fn test_config(networked: bool) -> ServiceConfig {
    ServiceConfig {
        device: DeviceSection {
            id: "bench-01".to_string(),
            network_id: "lab/bench/01".to_string(),
            networked,
        },
        mqtt: MqttSection {
            broker_url: "mqtt://localhost:1883".to_string(),
            subscribe_filter: "gbcmd/#".to_string(),
            announce_prefix: "gbdevice/".to_string(),
            pre_publish_delay_ms: 10,
            post_publish_delay_ms: 10,
        },
    }
}

async fn wait_for_publishes(
    state: &MockTransportState,
    count: usize,
) -> Vec<(String, Vec<u8>)> {
    for _ in 0..500 {
        let published = state.published().await;
        if published.len() >= count {
            return published;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {count} publishes");
}

#[tokio::test(start_paused = true)]
async fn unicast_command_produces_announcement() {
    let state = Arc::new(MockTransportState::default());
    let factory = Box::new(MockTransportFactory::new(state.clone()));
    let executor = Arc::new(MockExecutor::with_result(vec![
        "led".to_string(),
        "on".to_string(),
    ]));

    let service = DeviceService::start(&test_config(true), factory, executor.clone()).await;

    // Startup subscribed to the command filter at most once delivery.
    assert_eq!(
        state.subscriptions().await,
        vec![("gbcmd/#".to_string(), Qos::AtMostOnce)]
    );

    // network_id "lab/bench/01" resolves to unique id "labbench01".
    assert_eq!(service.identity().unique_id, "labbench01");

    let sink = state.sink().expect("connect registered a message sink");
    sink.send(InboundMessage {
        topic: "gbcmd/dev/LABBENCH01/set/led".to_string(),
        payload: b"on".to_vec(),
    })
    .await
    .unwrap();

    let published = wait_for_publishes(&state, 1).await;
    assert_eq!(published[0].0, "gbdevice/bench-01");
    assert_eq!(
        String::from_utf8(published[0].1.clone()).unwrap(),
        r#"{"Dev":"bench-01","Id":"labbench01","Items":["led","on"]}"#
    );

    let handled = executor.handled().await;
    assert_eq!(handled.len(), 1);
    assert_eq!(handled[0].cmd.as_deref(), Some("set"));
    assert_eq!(handled[0].item.as_deref(), Some("led"));
    assert_eq!(handled[0].parameters, "on");

    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn foreign_traffic_is_ignored_silently() {
    let state = Arc::new(MockTransportState::default());
    let factory = Box::new(MockTransportFactory::new(state.clone()));
    let executor = Arc::new(MockExecutor::with_result(vec!["x".to_string()]));

    let service = DeviceService::start(&test_config(true), factory, executor.clone()).await;

    let sink = state.sink().expect("connect registered a message sink");
    sink.send(InboundMessage {
        topic: "gbcmd/dev/ff99/set/led".to_string(),
        payload: b"on".to_vec(),
    })
    .await
    .unwrap();
    sink.send(InboundMessage {
        topic: "sensors/temperature".to_string(),
        payload: b"21.5".to_vec(),
    })
    .await
    .unwrap();

    // Give the dispatcher time to (not) react.
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(executor.handled().await.is_empty());
    assert!(state.published().await.is_empty());
    assert_eq!(service.error_count(), 0);

    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn non_networked_device_never_touches_transport() {
    let state = Arc::new(MockTransportState::default());
    let factory = Box::new(MockTransportFactory::new(state.clone()));
    let executor = Arc::new(MockExecutor::silent());

    let service = DeviceService::start(&test_config(false), factory, executor).await;

    assert_eq!(service.publish("gbdevice/bench-01", b"a").await, 0);
    assert_eq!(service.publish("anything/else", b"b").await, 0);
    assert_eq!(state.created(), 0);
    assert_eq!(service.error_count(), 0);

    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn publish_failures_surface_only_through_counter() {
    let state = Arc::new(MockTransportState::default());
    let factory = Box::new(MockTransportFactory::new(state.clone()));
    let executor = Arc::new(MockExecutor::silent());

    let service = DeviceService::start(&test_config(true), factory, executor).await;

    state.fail_publish(true);
    assert_eq!(service.publish("gbdevice/bench-01", b"a").await, 1);
    assert_eq!(service.publish("gbdevice/bench-01", b"b").await, 2);

    state.fail_publish(false);
    assert_eq!(service.publish("gbdevice/bench-01", b"c").await, 2);
    assert_eq!(service.error_count(), 2);

    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn link_restore_repairs_connection_on_next_publish() {
    let state = Arc::new(MockTransportState::default());
    let factory = Box::new(MockTransportFactory::new(state.clone()));
    let executor = Arc::new(MockExecutor::silent());

    let service = DeviceService::start(&test_config(true), factory, executor).await;
    assert_eq!(state.created(), 1);

    service.link().set_available(false);
    service.link().set_available(true);

    assert_eq!(service.publish("gbdevice/bench-01", b"after").await, 0);
    assert_eq!(state.created(), 2);

    service.shutdown().await;
}
