use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use parley_db::Database;
use parley_gateway::ChatHub;
use parley_push::{LogOnlyTransport, PushFanout, VapidKeys};
use parley_server::build_router;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_server() -> (SocketAddr, ChatHub) {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let push = PushFanout::new(db.clone(), Arc::new(LogOnlyTransport), VapidKeys::development());
    let hub = ChatHub::new(db, push);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_router(hub.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, hub)
}

async fn client(addr: SocketAddr) -> Client {
    let (ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    ws
}

async fn send(ws: &mut Client, frame: Value) {
    ws.send(Message::text(frame.to_string())).await.unwrap();
}

/// Next JSON event, skipping control frames.
async fn next_event(ws: &mut Client) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for an event")
            .expect("socket closed")
            .unwrap();
        if msg.is_text() {
            return serde_json::from_str(msg.to_text().unwrap()).unwrap();
        }
    }
}

async fn sign_in(ws: &mut Client, username: &str) -> i64 {
    send(ws, json!({"type": "auth", "username": username, "session_id": format!("{username}-tok")})).await;
    let event = next_event(ws).await;
    assert_eq!(event["type"], "auth_success", "{event}");
    assert_eq!(event["username"], username);
    event["user_id"].as_i64().unwrap()
}

#[tokio::test]
async fn two_clients_chat_in_general() {
    let (addr, hub) = spawn_server().await;
    let general = hub.db().get_room_by_name("General").unwrap().unwrap().id;

    let mut alice = client(addr).await;
    sign_in(&mut alice, "alice").await;

    send(&mut alice, json!({"type": "get_rooms"})).await;
    let rooms = next_event(&mut alice).await;
    assert_eq!(rooms["type"], "rooms_list");
    assert!(rooms["rooms"]
        .as_array()
        .unwrap()
        .iter()
        .any(|r| r["name"] == "General"));

    send(&mut alice, json!({"type": "join_room", "room_id": general.to_string()})).await;
    let joined = next_event(&mut alice).await;
    assert_eq!(joined["type"], "room_joined");
    assert_eq!(joined["room"]["name"], "General");
    assert!(joined["messages"].as_array().unwrap().is_empty());

    let mut bob = client(addr).await;
    sign_in(&mut bob, "bob").await;
    send(&mut bob, json!({"type": "join_room", "room_id": general})).await;
    assert_eq!(next_event(&mut bob).await["type"], "room_joined");
    assert_eq!(
        next_event(&mut alice).await,
        json!({"type": "user_joined", "username": "bob"})
    );

    send(&mut bob, json!({"type": "message", "message": "hi <alice>"})).await;
    for ws in [&mut alice, &mut bob] {
        let event = next_event(ws).await;
        assert_eq!(event["type"], "new_message");
        assert_eq!(event["message"]["message"], "hi &lt;alice&gt;");
        assert_eq!(event["message"]["username"], "bob");
    }

    // Garbage is ignored and the connection keeps working.
    bob.send(Message::text("not json")).await.unwrap();
    send(&mut bob, json!({"message": "untyped"})).await;
    send(&mut bob, json!({"type": "get_rooms"})).await;
    assert_eq!(next_event(&mut bob).await["type"], "rooms_list");

    bob.close(None).await.unwrap();
    assert_eq!(
        next_event(&mut alice).await,
        json!({"type": "user_left", "username": "bob"})
    );
}

#[tokio::test]
async fn auth_conflict_and_room_errors_over_the_wire() {
    let (addr, _hub) = spawn_server().await;

    let mut alice = client(addr).await;
    sign_in(&mut alice, "alice").await;

    let mut impostor = client(addr).await;
    send(&mut impostor, json!({"type": "auth", "username": "alice", "session_id": "other"})).await;
    assert_eq!(
        next_event(&mut impostor).await,
        json!({"type": "auth_error", "message": "Authentication failed"})
    );

    send(&mut alice, json!({"type": "create_room", "name": "Tech"})).await;
    let created = next_event(&mut alice).await;
    assert_eq!(created["type"], "room_created");
    assert_eq!(created["room"]["name"], "Tech");

    send(&mut alice, json!({"type": "create_room", "name": "Tech"})).await;
    assert_eq!(
        next_event(&mut alice).await,
        json!({"type": "room_error", "message": "Failed to create room"})
    );
}

#[tokio::test]
async fn health_endpoint() {
    let (addr, _hub) = spawn_server().await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.contains(r#"{"status":"ok"}"#), "{response}");
}
