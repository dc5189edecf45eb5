//! End-to-end tests: a bridge between a scripted UDP console and real
//! WebSocket clients on localhost.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use mixbridge::BridgeBuilder;
use mixbridge::console::codec::{self, Arg};
use mixbridge_test_harness::MockConsole;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Setup {
    console: MockConsole,
    url: String,
    cancel: CancellationToken,
}

async fn start_bridge() -> Setup {
    let console = MockConsole::bind().await.unwrap();
    let bridge = BridgeBuilder::new()
        .console(console.addr())
        .bind("127.0.0.1:0")
        .listen("127.0.0.1:0")
        .build()
        .await
        .unwrap();
    let url = format!("ws://{}", bridge.listen_addr());

    let cancel = CancellationToken::new();
    tokio::spawn(bridge.run(cancel.clone()));

    Setup {
        console,
        url,
        cancel,
    }
}

async fn connect(url: &str) -> Client {
    let (ws, _) = connect_async(url).await.unwrap();
    ws
}

async fn send(client: &mut Client, value: Value) {
    client
        .send(Message::Text(value.to_string()))
        .await
        .unwrap();
}

/// Read JSON messages until one satisfies `pred`.
async fn next_matching(client: &mut Client, pred: impl Fn(&Value) -> bool) -> Value {
    tokio::time::timeout(WAIT, async {
        loop {
            let frame = client.next().await.expect("stream ended").unwrap();
            if let Message::Text(text) = frame {
                let value: Value = serde_json::from_str(&text).unwrap();
                if pred(&value) {
                    return value;
                }
            }
        }
    })
    .await
    .expect("no matching message")
}

fn has_type(value: &Value, kind: &str) -> bool {
    value["type"] == kind
}

/// Wait until the console sees a message at `address`.
async fn console_expects(console: &MockConsole, address: &str, with_args: bool) -> codec::WireMessage {
    let datagram = console
        .recv_matching(WAIT, |d| {
            codec::decode(d)
                .is_some_and(|m| m.address == address && m.args.is_empty() != with_args)
        })
        .await
        .unwrap();
    codec::decode(&datagram).unwrap()
}

fn meter_datagram() -> Vec<u8> {
    let mut blob = 26i32.to_le_bytes().to_vec();
    for _ in 0..26 {
        blob.extend_from_slice(&(-20i16 * 256).to_le_bytes());
    }
    codec::encode("/meters/1", &[Arg::Blob(blob)])
}

#[tokio::test]
async fn registered_channel_name_reaches_all_clients() {
    let setup = start_bridge().await;
    let mut first = connect(&setup.url).await;

    let state = next_matching(&mut first, |v| has_type(v, "connectionState")).await;
    assert_eq!(state["state"], "OFFLINE");

    send(
        &mut first,
        json!({"type": "registerTarget", "targetType": "ch", "targetIndex": 5}),
    )
    .await;

    // The bridge queries the channel's name.
    console_expects(&setup.console, "/ch/05/config/name", false).await;

    setup
        .console
        .reply(&codec::encode(
            "/ch/05/config/name",
            &[Arg::Str("Desk Mic".into())],
        ))
        .await
        .unwrap();

    let update = next_matching(&mut first, |v| has_type(v, "channelState")).await;
    assert_eq!(
        update,
        json!({"type": "channelState", "targetType": "ch", "targetIndex": 5, "name": "Desk Mic"})
    );

    // A client connecting afterwards gets the latest known values.
    let mut second = connect(&setup.url).await;
    let replay = next_matching(&mut second, |v| has_type(v, "channelState")).await;
    assert_eq!(replay["targetIndex"], 5);
    assert_eq!(replay["name"], "Desk Mic");

    setup.cancel.cancel();
}

#[tokio::test]
async fn write_blocked_until_live_then_forwarded() {
    let setup = start_bridge().await;
    let mut client = connect(&setup.url).await;
    next_matching(&mut client, |v| has_type(v, "connectionState")).await;

    send(
        &mut client,
        json!({"type": "setFader", "targetIndex": 1, "value": 0.5}),
    )
    .await;
    let error = next_matching(&mut client, |v| has_type(v, "error")).await;
    assert_eq!(error["code"], "SAFE_STATE_BLOCK");

    // The bridge subscribed on start; answer with a meter frame.
    console_expects(&setup.console, "/meters", true).await;
    setup.console.reply(&meter_datagram()).await.unwrap();
    next_matching(&mut client, |v| {
        has_type(v, "connectionState") && v["state"] == "LIVE"
    })
    .await;

    send(
        &mut client,
        json!({"type": "setMute", "targetIndex": 1, "mute": true}),
    )
    .await;

    let echo = next_matching(&mut client, |v| {
        has_type(v, "returnState") && v.get("mute").is_some()
    })
    .await;
    assert_eq!(echo, json!({"type": "returnState", "targetIndex": 1, "mute": true}));

    let write = console_expects(&setup.console, "/rtn/1/mix/on", true).await;
    assert_eq!(write.args, vec![Arg::Int(0)]);

    setup.cancel.cancel();
}

#[tokio::test]
async fn hello_is_welcomed() {
    let setup = start_bridge().await;
    let mut client = connect(&setup.url).await;

    send(
        &mut client,
        json!({"type": "hello", "clientId": "e2e", "protocolVersion": 1}),
    )
    .await;
    let welcome = next_matching(&mut client, |v| has_type(v, "welcome")).await;
    assert_eq!(welcome, json!({"type": "welcome", "protocolVersion": 1}));

    setup.cancel.cancel();
}
