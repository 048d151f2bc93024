#![allow(clippy::unwrap_used)]
// Push-mode device tests against an in-process WebSocket server.

mod common;

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use thingurl_core::{
    Action, ActionStatus, Adapter, AdapterConfig, AdapterEvent, ConnectionState, DeviceId,
    ReconnectConfig, SyncMode,
};

use common::{
    drain, fast_config, lamp_description, mount_description, mount_property, next_matching,
};

// ── Push server ─────────────────────────────────────────────────────

enum ServerCmd {
    Send(Value),
    Close,
}

struct PushServer {
    port: u16,
    cmd: mpsc::UnboundedSender<ServerCmd>,
    /// Text frames received from the device, decoded.
    inbound: mpsc::UnboundedReceiver<Value>,
}

impl PushServer {
    /// Accept connections one at a time until the test ends.
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (cmd, mut cmd_rx) = mpsc::unbounded_channel();
        let (in_tx, inbound) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let Ok(mut ws) = accept_async(stream).await else {
                    continue;
                };
                loop {
                    tokio::select! {
                        cmd = cmd_rx.recv() => match cmd {
                            Some(ServerCmd::Send(value)) => {
                                ws.send(Message::text(value.to_string())).await.unwrap();
                            }
                            Some(ServerCmd::Close) => {
                                let _ = ws.close(None).await;
                                break;
                            }
                            None => return,
                        },
                        frame = ws.next() => match frame {
                            Some(Ok(Message::Text(text))) => {
                                let _ = in_tx.send(serde_json::from_str(text.as_str()).unwrap());
                            }
                            Some(Ok(_)) => {}
                            _ => break,
                        },
                    }
                }
            }
        });

        Self { port, cmd, inbound }
    }

    fn send(&self, value: Value) {
        self.cmd.send(ServerCmd::Send(value)).unwrap();
    }

    async fn next_inbound(&mut self) -> Value {
        tokio::time::timeout(Duration::from_secs(5), self.inbound.recv())
            .await
            .unwrap()
            .unwrap()
    }
}

/// Load a push-capable lamp and start it syncing.
async fn connected_lamp(push: &PushServer) -> (MockServer, Adapter, DeviceId) {
    lamp_pushing_to(push.port, fast_config()).await
}

async fn lamp_pushing_to(port: u16, config: AdapterConfig) -> (MockServer, Adapter, DeviceId) {
    let server = MockServer::start().await;
    let links = json!([
        {"rel": "actions", "href": "/actions"},
        {"rel": "alternate", "href": format!("ws://127.0.0.1:{port}/")},
        {"rel": "alternate", "mediaType": "text/html", "href": "/ui"}
    ]);
    mount_description(&server, &lamp_description(links)).await;
    mount_property(&server, "on", json!(true)).await;

    let adapter = common::adapter(config);
    adapter.load_thing(common::thing_url(&server)).await;
    let id = DeviceId::from_url(&server.uri());
    (server, adapter, id)
}

async fn wait_connected(rx: &mut tokio::sync::broadcast::Receiver<AdapterEvent>) {
    next_matching(rx, |e| {
        matches!(e, AdapterEvent::ConnectivityChanged { connected: true, .. })
    })
    .await;
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_open_subscribes_to_all_events_in_one_message() {
    let mut push = PushServer::start().await;
    let (_server, adapter, id) = connected_lamp(&push).await;
    let mut rx = adapter.subscribe();

    let device = adapter.device(&id).unwrap();
    assert!(matches!(device.sync_mode(), SyncMode::Push { .. }));
    let kept: Vec<&str> = device.links().iter().map(|l| l.href.as_str()).collect();
    assert_eq!(kept, vec!["/ui"]);

    adapter.handle_device_saved(&id).await;
    wait_connected(&mut rx).await;

    assert_eq!(
        push.next_inbound().await,
        json!({"messageType": "addEventSubscription", "data": {"alarm": {}}})
    );
    assert_eq!(*device.connection_state().borrow(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_property_status_notifies_only_on_change() {
    let mut push = PushServer::start().await;
    let (_server, adapter, id) = connected_lamp(&push).await;
    let mut rx = adapter.subscribe();
    adapter.handle_device_saved(&id).await;
    wait_connected(&mut rx).await;
    push.next_inbound().await;

    push.send(json!({"messageType": "propertyStatus", "data": {"on": true}}));
    push.send(json!({"messageType": "propertyStatus", "data": {"on": false, "ghost": 1}}));

    let changed = next_matching(&mut rx, |e| matches!(e, AdapterEvent::PropertyChanged { .. })).await;
    assert_eq!(
        changed,
        AdapterEvent::PropertyChanged {
            id: id.clone(),
            name: "on".into(),
            value: json!(false),
        }
    );
    assert_eq!(
        adapter.device(&id).unwrap().property("on").unwrap().value(),
        &json!(false)
    );
}

#[tokio::test]
async fn test_duplicate_pushed_event_is_delivered_once() {
    let mut push = PushServer::start().await;
    let (_server, adapter, id) = connected_lamp(&push).await;
    let mut rx = adapter.subscribe();
    adapter.handle_device_saved(&id).await;
    wait_connected(&mut rx).await;
    push.next_inbound().await;

    let event = json!({"type": "event", "data": {"alarm": {"data": {"id": "e1"}, "timestamp": "t1"}}});
    push.send(event.clone());
    push.send(event);
    push.send(json!({"messageType": "propertyStatus", "data": {"on": false}}));

    // The property update is handled after both events.
    let mut events = 0;
    loop {
        let next = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match next {
            AdapterEvent::Event { event, .. } => {
                assert_eq!(event.timestamp, "t1");
                events += 1;
            }
            AdapterEvent::PropertyChanged { .. } => break,
            _ => {}
        }
    }
    assert_eq!(events, 1);
}

#[tokio::test]
async fn test_set_equal_value_over_push_notifies_immediately() {
    let mut push = PushServer::start().await;
    let (_server, adapter, id) = connected_lamp(&push).await;
    let mut rx = adapter.subscribe();
    adapter.handle_device_saved(&id).await;
    wait_connected(&mut rx).await;
    push.next_inbound().await;

    let returned = adapter.set_property(&id, "on", json!(true)).await.unwrap();
    assert_eq!(returned, json!(true));

    next_matching(&mut rx, |e| {
        matches!(e, AdapterEvent::PropertyChanged { value, .. } if *value == json!(true))
    })
    .await;
    assert_eq!(
        push.next_inbound().await,
        json!({"messageType": "setProperty", "data": {"on": true}})
    );
}

#[tokio::test]
async fn test_set_different_value_over_push_waits_for_echo() {
    let mut push = PushServer::start().await;
    let (_server, adapter, id) = connected_lamp(&push).await;
    let mut rx = adapter.subscribe();
    adapter.handle_device_saved(&id).await;
    wait_connected(&mut rx).await;
    push.next_inbound().await;

    let returned = adapter.set_property(&id, "on", json!(false)).await.unwrap();
    assert_eq!(returned, json!(false));
    assert_eq!(
        push.next_inbound().await,
        json!({"messageType": "setProperty", "data": {"on": false}})
    );

    // Cache is untouched until the device reports back.
    let device = adapter.device(&id).unwrap();
    assert_eq!(device.property("on").unwrap().value(), &json!(true));
    assert!(
        drain(&mut rx)
            .iter()
            .all(|e| !matches!(e, AdapterEvent::PropertyChanged { .. }))
    );

    push.send(json!({"messageType": "propertyStatus", "data": {"on": false}}));
    next_matching(&mut rx, |e| matches!(e, AdapterEvent::PropertyChanged { .. })).await;
    assert_eq!(device.property("on").unwrap().value(), &json!(false));
}

#[tokio::test]
async fn test_action_status_message_updates_tracked_action() {
    let mut push = PushServer::start().await;
    let (server, adapter, id) = connected_lamp(&push).await;
    Mock::given(method("POST"))
        .and(path("/actions"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!({"fade": {"href": "/actions/fade/1"}})),
        )
        .mount(&server)
        .await;

    let mut rx = adapter.subscribe();
    adapter.handle_device_saved(&id).await;
    wait_connected(&mut rx).await;
    push.next_inbound().await;

    let device = adapter.device(&id).unwrap();
    let action = device.perform_action(Action::new("fade", None)).await;

    push.send(json!({
        "messageType": "actionStatus",
        "data": {"fade": {"href": "/actions/fade/1", "status": "completed"}}
    }));

    let AdapterEvent::ActionStatus { action: update, .. } = next_matching(&mut rx, |e| {
        matches!(e, AdapterEvent::ActionStatus { action, .. } if action.status == ActionStatus::Completed)
    })
    .await
    else {
        panic!("expected an action status notification");
    };
    assert_eq!(update.id, action.id);
}

#[tokio::test]
async fn test_reconnects_after_close_and_stops_once_removed() {
    let mut push = PushServer::start().await;
    let (_server, adapter, id) = connected_lamp(&push).await;
    let mut rx = adapter.subscribe();
    adapter.handle_device_saved(&id).await;
    wait_connected(&mut rx).await;
    push.next_inbound().await;

    push.cmd.send(ServerCmd::Close).unwrap();
    next_matching(&mut rx, |e| {
        matches!(e, AdapterEvent::ConnectivityChanged { connected: false, .. })
    })
    .await;
    wait_connected(&mut rx).await;
    assert_eq!(
        push.next_inbound().await["messageType"],
        json!("addEventSubscription")
    );

    let device = adapter.device(&id).unwrap();
    adapter.remove_thing(&id, false).await.unwrap();
    assert_eq!(*device.connection_state().borrow(), ConnectionState::Closing);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(push.inbound.try_recv().is_err(), "no reconnect after removal");
}

#[tokio::test]
async fn test_reconnect_delay_doubles_and_resets_after_open() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (attempts_tx, mut attempts) = mpsc::unbounded_channel();

    // Refuse the handshake four times, then accept once and close.
    tokio::spawn(async move {
        let mut n = 0;
        while let Ok((stream, _)) = listener.accept().await {
            let _ = attempts_tx.send(Instant::now());
            n += 1;
            match n {
                1..=4 => drop(stream),
                5 => {
                    let Ok(mut ws) = accept_async(stream).await else {
                        continue;
                    };
                    let _ = ws.close(None).await;
                    while ws.next().await.is_some() {}
                }
                _ => {}
            }
        }
    });

    let mut config = fast_config();
    config.reconnect = ReconnectConfig {
        initial_delay: Duration::from_millis(50),
        max_delay: Duration::from_millis(1000),
    };
    let (_server, adapter, id) = lamp_pushing_to(port, config).await;
    adapter.handle_device_saved(&id).await;

    let mut times = Vec::new();
    for _ in 0..6 {
        let at = tokio::time::timeout(Duration::from_secs(10), attempts.recv())
            .await
            .unwrap()
            .unwrap();
        times.push(at);
    }
    adapter.remove_thing(&id, true).await.unwrap();

    let gaps: Vec<Duration> = times.windows(2).map(|w| w[1] - w[0]).collect();
    for (gap, nominal) in gaps.iter().zip([50u64, 100, 200, 400]) {
        assert!(
            *gap >= Duration::from_millis(nominal),
            "gap {gap:?} shorter than {nominal}ms"
        );
    }
    // Without the reset the fifth wait would have been 800ms.
    assert!(
        gaps[4] < Duration::from_millis(600),
        "delay not reset after open: {:?}",
        gaps[4]
    );
}

#[tokio::test]
async fn test_removal_is_bounded_when_peer_stops_reading() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    // Complete the handshake, then never poll the socket again.
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            if let Ok(ws) = accept_async(stream).await {
                held.push(ws);
            }
        }
    });

    let config = fast_config();
    let bound = config.timeout + Duration::from_secs(1);
    let (_server, adapter, id) = lamp_pushing_to(port, config).await;
    let mut rx = adapter.subscribe();
    adapter.handle_device_saved(&id).await;
    wait_connected(&mut rx).await;

    let device = adapter.device(&id).unwrap();
    tokio::time::timeout(bound, adapter.remove_thing(&id, true))
        .await
        .expect("removal hung on the close frame")
        .unwrap();
    assert_eq!(*device.connection_state().borrow(), ConnectionState::Closing);
}
