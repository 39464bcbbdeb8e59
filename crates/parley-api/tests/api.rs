use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, header};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use parley_api::{AppState, router};
use parley_db::Database;
use parley_gateway::ChatHub;
use parley_push::{LogOnlyTransport, PushFanout, VapidKeys};
use parley_types::events::{ClientCommand, ServerEvent};

fn hub() -> ChatHub {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let push = PushFanout::new(db.clone(), Arc::new(LogOnlyTransport), VapidKeys::development());
    ChatHub::new(db, push)
}

fn app(hub: &ChatHub) -> Router {
    router(AppState { hub: hub.clone() })
}

async fn read_json(app: Router, request: Request<Body>) -> Value {
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), 200);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn get(app: Router, query: &str) -> Value {
    let request = Request::get(format!("/api?{query}")).body(Body::empty()).unwrap();
    read_json(app, request).await
}

async fn post(app: Router, form: &str) -> Value {
    let request = Request::post("/api")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form.to_string()))
        .unwrap();
    read_json(app, request).await
}

async fn login(hub: &ChatHub, username: &str) -> i64 {
    let body = post(app(hub), &format!("action=login&username={username}&session_id={username}-tok")).await;
    assert_eq!(body["success"], true, "{body}");
    body["user_id"].as_i64().unwrap()
}

fn general(hub: &ChatHub) -> i64 {
    hub.db().get_room_by_name("General").unwrap().unwrap().id
}

#[tokio::test]
async fn unknown_action_is_an_error_not_a_status() {
    let hub = hub();
    assert_eq!(get(app(&hub), "action=shout").await["error"], "Invalid action");
    assert_eq!(get(app(&hub), "").await["error"], "Invalid action");
}

#[tokio::test]
async fn login_is_idempotent_and_rejects_token_conflicts() {
    let hub = hub();
    let first = login(&hub, "alice").await;
    let second = login(&hub, "alice").await;
    assert_eq!(first, second);

    let body = post(app(&hub), "action=login&username=alice&session_id=other").await;
    assert_eq!(body["error"], "Authentication failed");

    let body = post(app(&hub), "action=login&username=alice").await;
    assert_eq!(body["error"], "Username and session_id required");
}

#[tokio::test]
async fn rooms_can_be_listed_and_created_once() {
    let hub = hub();
    let alice = login(&hub, "alice").await;

    let body = post(app(&hub), &format!("action=create_room&name=Tech&user_id={alice}")).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["room"]["name"], "Tech");
    assert_eq!(body["room"]["created_by_username"], "alice");

    let body = post(app(&hub), &format!("action=create_room&name=Tech&user_id={alice}")).await;
    assert_eq!(body["error"], "Failed to create room");

    let body = post(app(&hub), "action=create_room&name=Tech").await;
    assert_eq!(body["error"], "Room name and user ID required");

    let too_long = "r".repeat(101);
    let body = post(app(&hub), &format!("action=create_room&name={too_long}&user_id={alice}")).await;
    assert_eq!(body["error"], "Failed to create room");

    let body = get(app(&hub), "action=get_rooms").await;
    let names: Vec<_> = body["rooms"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap().to_string())
        .collect();
    assert!(names.contains(&"General".to_string()));
    assert!(names.contains(&"Tech".to_string()));
}

#[tokio::test]
async fn send_then_poll_with_cursor() {
    let hub = hub();
    let room = general(&hub);
    let alice = login(&hub, "alice").await;

    let body = post(
        app(&hub),
        &format!("action=send_message&room_id={room}&user_id={alice}&message=%3Cb%3Ehello%3C%2Fb%3E"),
    )
    .await;
    assert_eq!(body["success"], true, "{body}");
    assert_eq!(body["message"]["message"], "&lt;b&gt;hello&lt;/b&gt;");
    assert_eq!(body["message"]["username"], "alice");
    let first_id = body["message"]["id"].as_i64().unwrap();

    let body = post(
        app(&hub),
        &format!("action=send_message&room_id={room}&user_id={alice}&message=second"),
    )
    .await;
    let second_id = body["message"]["id"].as_i64().unwrap();
    assert!(second_id > first_id);

    let body = get(app(&hub), &format!("action=get_messages&room_id={room}")).await;
    let ids: Vec<_> = body["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![first_id, second_id]);

    let body = get(app(&hub), &format!("action=get_messages&room_id={room}&since={first_id}")).await;
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["message"], "second");

    let body = get(app(&hub), &format!("action=get_messages&room_id={room}&since={second_id}")).await;
    assert!(body["messages"].as_array().unwrap().is_empty());

    let body = get(app(&hub), &format!("action=get_messages&room_id={room}&limit=1")).await;
    assert_eq!(body["messages"][0]["id"], second_id);
}

#[tokio::test]
async fn poll_since_a_message_timestamp() {
    let hub = hub();
    let room = general(&hub);
    let alice = login(&hub, "alice").await;

    let first = post(
        app(&hub),
        &format!("action=send_message&room_id={room}&user_id={alice}&message=first"),
    )
    .await;
    let second = post(
        app(&hub),
        &format!("action=send_message&room_id={room}&user_id={alice}&message=second"),
    )
    .await;

    // Clients echo created_at back exactly as they received it.
    let since = first["message"]["created_at"]
        .as_str()
        .unwrap()
        .replace(':', "%3A")
        .replace('+', "%2B");
    let body = get(app(&hub), &format!("action=get_messages&room_id={room}&since={since}")).await;
    assert_eq!(body["success"], true, "{body}");
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1, "{body}");
    assert_eq!(messages[0]["id"], second["message"]["id"]);
    assert_eq!(messages[0]["message"], "second");

    let since = second["message"]["created_at"].as_str().unwrap().replace(':', "%3A");
    let body = get(app(&hub), &format!("action=get_messages&room_id={room}&since={since}")).await;
    assert!(body["messages"].as_array().unwrap().is_empty(), "{body}");
}

#[tokio::test]
async fn message_errors() {
    let hub = hub();
    let room = general(&hub);
    let alice = login(&hub, "alice").await;

    let body = get(app(&hub), "action=get_messages").await;
    assert_eq!(body["error"], "Room ID required");

    let body = get(app(&hub), "action=get_messages&room_id=999").await;
    assert_eq!(body["error"], "Room not found");

    let body = get(app(&hub), &format!("action=get_messages&room_id={room}&since=yesterday")).await;
    assert!(body["error"].as_str().unwrap().starts_with("Invalid cursor"));

    let body = post(app(&hub), &format!("action=send_message&room_id={room}&user_id={alice}")).await;
    assert_eq!(body["error"], "Room ID, User ID and message required");

    let long = "x".repeat(1001);
    let body = post(
        app(&hub),
        &format!("action=send_message&room_id={room}&user_id={alice}&message={long}"),
    )
    .await;
    assert_eq!(body["error"], "Failed to send message");
    assert!(hub.db().page(room, 10, 0).unwrap().is_empty());
}

#[tokio::test]
async fn polling_sends_reach_socket_members() {
    let hub = hub();
    let room = general(&hub);

    let (conn, mut rx) = hub.connect().await;
    hub.handle_command(
        conn,
        ClientCommand::Auth {
            username: "bob".into(),
            session_id: "bob-tok".into(),
        },
    )
    .await
    .unwrap();
    hub.handle_command(conn, ClientCommand::JoinRoom { room_id: room })
        .await
        .unwrap();
    while rx.try_recv().is_ok() {}

    let alice = login(&hub, "alice").await;
    post(
        app(&hub),
        &format!("action=send_message&room_id={room}&user_id={alice}&message=hi+bob"),
    )
    .await;

    match rx.try_recv() {
        Ok(ServerEvent::NewMessage { message }) => {
            assert_eq!(message.message, "hi bob");
            assert_eq!(message.username, "alice");
        }
        other => panic!("expected new_message, got {other:?}"),
    }
}

#[tokio::test]
async fn push_subscription_lifecycle() {
    let hub = hub();
    let alice = login(&hub, "alice").await;

    let body = get(app(&hub), "action=get_vapid_key").await;
    assert_eq!(body["success"], true);
    assert_eq!(body["vapid_public_key"], VapidKeys::development().public_key());

    let subscription = r#"{"endpoint":"https://push.example/a","keys":{"p256dh":"BP","auth":"au"}}"#;
    let form = format!(
        "action=subscribe_push&user_id={alice}&subscription={}",
        subscription
            .replace('{', "%7B")
            .replace('}', "%7D")
            .replace('"', "%22")
            .replace(':', "%3A")
            .replace(',', "%2C")
            .replace('/', "%2F")
    );
    let body = post(app(&hub), &form).await;
    assert_eq!(body["success"], true, "{body}");
    assert_eq!(hub.db().subscriptions_for_user(alice).unwrap().len(), 1);

    let body = post(app(&hub), &format!("action=subscribe_push&user_id={alice}&subscription=nope")).await;
    assert_eq!(body["error"], "Invalid subscription");

    let body = post(
        app(&hub),
        &format!("action=unsubscribe_push&user_id={alice}&endpoint=https%3A%2F%2Fpush.example%2Fa"),
    )
    .await;
    assert_eq!(body["success"], true);
    assert_eq!(body["removed"], 1);
    assert!(hub.db().subscriptions_for_user(alice).unwrap().is_empty());
}
