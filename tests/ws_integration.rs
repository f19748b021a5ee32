mod common;

use std::time::Duration;

use common::{background, external, setup};
use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message;

type Socket = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn next_json(socket: &mut Socket) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for a push")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn test_push_channel_delivers_snapshot_and_updates() {
    let env = setup(background(json!({
        "useLocalBackgrounds": false,
        "externalMediaUrlList": external(&["https://x/a.jpg", "https://x/b.jpg"]),
    })));
    env.controller.start().await;
    let addr = common::spawn_server(env.app_state()).await;

    let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{}/api/ws", addr)).await.unwrap();
    let hello = next_json(&mut socket).await;
    assert_eq!(hello["type"], "status");
    assert_eq!(hello["data"]["currentMedia"]["url"], "https://x/a.jpg");
    let first_id = hello["data"]["stateId"].as_u64().unwrap();

    let client = reqwest::Client::new();
    client.post(format!("http://{}/api/background/next", addr)).send().await.unwrap();
    let pushed = next_json(&mut socket).await;
    assert_eq!(pushed["type"], "status");
    assert_eq!(pushed["data"]["currentMedia"]["url"], "https://x/b.jpg");
    assert_eq!(pushed["data"]["stateId"].as_u64().unwrap(), first_id + 1);
    env.controller.shutdown();
}

#[tokio::test]
async fn test_every_display_sees_config_writes() {
    let env = setup(background(json!({ "useLocalBackgrounds": false })));
    env.controller.start().await;
    let addr = common::spawn_server(env.app_state()).await;
    let endpoint = format!("ws://{}/api/ws", addr);

    let (mut a, _) = tokio_tungstenite::connect_async(endpoint.as_str()).await.unwrap();
    let (mut b, _) = tokio_tungstenite::connect_async(endpoint.as_str()).await.unwrap();
    assert_eq!(next_json(&mut a).await["type"], "status");
    assert_eq!(next_json(&mut b).await["type"], "status");

    let mut cfg = serde_json::to_value(env.store.get()).unwrap();
    cfg["background"]["transitionMode"] = json!("blur");
    let resp = reqwest::Client::new()
        .post(format!("http://{}/api/config", addr))
        .json(&cfg)
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());

    for socket in [&mut a, &mut b] {
        let event = next_json(socket).await;
        assert_eq!(event["type"], "config");
        assert_eq!(event["data"]["background"]["transitionMode"], "blur");
    }
    env.controller.shutdown();
}
