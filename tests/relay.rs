use futures::{SinkExt, StreamExt};
use room_relay::{AppState, Settings};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);
const QUIET_PERIOD: Duration = Duration::from_millis(300);
const POLL_INTERVAL: Duration = Duration::from_millis(20);

struct TestServer {
    url: String,
    state: AppState,
    stop: Option<oneshot::Sender<()>>,
}

impl TestServer {
    async fn start(heartbeat_secs: &str) -> Self {
        let settings = Settings::from_vars([("APP_RELAY__HEARTBEAT_INTERVAL_SECS", heartbeat_secs)])
            .expect("Failed to load test config");
        let state = AppState::new(settings);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let (stop, stopped) = oneshot::channel::<()>();

        let server = state.server();
        tokio::spawn(async move {
            server
                .run(listener, async {
                    let _ = stopped.await;
                })
                .await
                .unwrap();
        });

        Self { url, state, stop: Some(stop) }
    }

    async fn connect(&self) -> Client {
        let (ws_stream, _) = connect_async(self.url.as_str()).await.unwrap();
        ws_stream
    }

    async fn wait_for_connections(&self, expected: usize) {
        timeout(RECV_TIMEOUT, async {
            while self.state.relay.connection_count().await != expected {
                sleep(POLL_INTERVAL).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("Expected {} registered connections", expected));
    }

    async fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.state.shutdown().await.unwrap();
    }
}

async fn send_json(client: &mut Client, value: Value) {
    client.send(Message::Text(value.to_string())).await.unwrap();
}

async fn join(client: &mut Client, room: &str) {
    send_json(client, json!({"type": "join", "payload": {"roomId": room}})).await;
}

async fn chat(client: &mut Client, message: &str) {
    send_json(client, json!({"type": "chat", "payload": {"message": message}})).await;
}

/// Next text frame, skipping keep-alive frames. `None` on close or timeout.
async fn next_text(client: &mut Client, wait: Duration) -> Option<String> {
    timeout(wait, async {
        while let Some(message) = client.next().await {
            match message {
                Ok(Message::Text(text)) => return Some(text),
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
                _ => return None,
            }
        }
        None
    })
    .await
    .ok()
    .flatten()
}

async fn expect_text(client: &mut Client) -> String {
    next_text(client, RECV_TIMEOUT)
        .await
        .expect("Expected a text frame from the relay")
}

async fn expect_silence(client: &mut Client) {
    if let Some(text) = next_text(client, QUIET_PERIOD).await {
        panic!("Expected no frame, got {:?}", text);
    }
}

#[test_log::test(tokio::test)]
async fn test_join_chat_leave_scenario() {
    let server = TestServer::start("30").await;
    let mut a = server.connect().await;
    let mut b = server.connect().await;

    join(&mut a, "abc").await;
    assert_eq!(expect_text(&mut a).await, "A new user has joined. (1 user in room)");

    join(&mut b, "abc").await;
    assert_eq!(expect_text(&mut a).await, "A new user has joined. (2 users in room)");
    assert_eq!(expect_text(&mut b).await, "A new user has joined. (2 users in room)");

    chat(&mut a, "hi").await;
    assert_eq!(expect_text(&mut b).await, "hi");
    expect_silence(&mut a).await;

    b.close(None).await.unwrap();
    assert_eq!(expect_text(&mut a).await, "A user has left. (1 user in room)");

    a.close(None).await.unwrap();
    server.wait_for_connections(0).await;
    assert_eq!(server.state.relay.room_size("abc").await, 0);
}

#[tokio::test]
async fn test_rooms_are_isolated() {
    let server = TestServer::start("30").await;
    let mut a = server.connect().await;
    let mut b = server.connect().await;
    let mut c = server.connect().await;

    join(&mut a, "red").await;
    expect_text(&mut a).await;
    join(&mut b, "red").await;
    expect_text(&mut a).await;
    expect_text(&mut b).await;
    join(&mut c, "blue").await;
    assert_eq!(expect_text(&mut c).await, "A new user has joined. (1 user in room)");

    chat(&mut a, "only red").await;
    assert_eq!(expect_text(&mut b).await, "only red");
    expect_silence(&mut c).await;

    chat(&mut c, "only blue").await;
    expect_silence(&mut a).await;
    expect_silence(&mut b).await;
}

#[tokio::test]
async fn test_chat_before_join_is_dropped() {
    let server = TestServer::start("30").await;
    let mut a = server.connect().await;
    let mut early = server.connect().await;

    join(&mut a, "abc").await;
    expect_text(&mut a).await;

    chat(&mut early, "too soon").await;
    expect_silence(&mut a).await;
    expect_silence(&mut early).await;

    // Still open and still able to join afterwards
    join(&mut early, "abc").await;
    assert_eq!(expect_text(&mut early).await, "A new user has joined. (2 users in room)");
    assert_eq!(expect_text(&mut a).await, "A new user has joined. (2 users in room)");
}

#[tokio::test]
async fn test_malformed_input_keeps_connection_open() {
    let server = TestServer::start("30").await;
    let mut a = server.connect().await;

    a.send(Message::Text("definitely not json".into())).await.unwrap();
    a.send(Message::Binary(vec![0xde, 0xad])).await.unwrap();
    send_json(&mut a, json!({"type": "typing", "payload": {}})).await;
    send_json(&mut a, json!({"type": "join", "payload": {}})).await;
    expect_silence(&mut a).await;
    assert_eq!(server.state.relay.connection_count().await, 1);

    join(&mut a, "abc").await;
    assert_eq!(expect_text(&mut a).await, "A new user has joined. (1 user in room)");
}

#[tokio::test]
async fn test_empty_room_is_recreated_fresh() {
    let server = TestServer::start("30").await;

    let mut first = server.connect().await;
    join(&mut first, "abc").await;
    expect_text(&mut first).await;
    drop(first);
    server.wait_for_connections(0).await;

    let mut second = server.connect().await;
    join(&mut second, "abc").await;
    assert_eq!(expect_text(&mut second).await, "A new user has joined. (1 user in room)");
}

#[tokio::test]
async fn test_messages_keep_order_within_room() {
    let server = TestServer::start("30").await;
    let mut a = server.connect().await;
    let mut b = server.connect().await;

    join(&mut a, "abc").await;
    expect_text(&mut a).await;
    join(&mut b, "abc").await;
    expect_text(&mut a).await;
    expect_text(&mut b).await;

    for i in 0..20 {
        chat(&mut a, &format!("message {}", i)).await;
    }
    for i in 0..20 {
        assert_eq!(expect_text(&mut b).await, format!("message {}", i));
    }
}

#[tokio::test]
async fn test_heartbeat_pings_client() {
    let server = TestServer::start("1").await;
    let mut a = server.connect().await;

    let ping = timeout(Duration::from_secs(3), async {
        while let Some(message) = a.next().await {
            if let Ok(Message::Ping(_)) = message {
                return true;
            }
        }
        false
    })
    .await
    .unwrap_or(false);
    assert!(ping, "Expected a keep-alive ping from the server");
}

#[test_log::test(tokio::test)]
async fn test_shutdown_closes_all_connections() {
    let mut server = TestServer::start("30").await;
    let mut a = server.connect().await;
    let mut b = server.connect().await;
    join(&mut a, "abc").await;
    expect_text(&mut a).await;
    server.wait_for_connections(2).await;

    server.shutdown().await;

    for client in [&mut a, &mut b] {
        let closed = timeout(RECV_TIMEOUT, async {
            loop {
                match client.next().await {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return true,
                    Some(Ok(_)) => continue,
                }
            }
        })
        .await
        .unwrap_or(false);
        assert!(closed, "Expected the server to close the connection");
    }
    assert_eq!(server.state.relay.connection_count().await, 0);
}
