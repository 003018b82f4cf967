/// Integration tests: chat directory and message history against a local
/// REST double speaking the chat service's wire format.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};

use huddle_api::{ApiConfig, ChatDirectory, FetchError, MessageHistory, MessageTimeline, RestClient};
use huddle_gateway::{ConnectionManager, GatewayConfig};
use huddle_types::models::Chat;

#[derive(Clone, Default)]
struct Recorded {
    queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
    bodies: Arc<Mutex<Vec<Value>>>,
    headers: Arc<Mutex<Vec<HeaderMap>>>,
}

fn history_rows() -> Vec<Value> {
    (0..3)
        .rev()
        .map(|i| {
            json!({
                "group_id": 7,
                "user_id": 2,
                "message_content": format!("m{}", i),
                "timestamp": format!("2024-01-01T00:00:0{}", i),
            })
        })
        .collect()
}

async fn list_chats(State(rec): State<Recorded>, Query(q): Query<HashMap<String, String>>) -> Json<Value> {
    rec.queries.lock().unwrap().push(q);
    Json(json!({
        "groups": [
            { "group_id": 7, "user_ids": "[1, 2]" },
            { "group_id": 8, "user_ids": "[1, 3]" }
        ]
    }))
}

async fn create_chat(State(rec): State<Recorded>, Json(body): Json<Value>) -> Json<Value> {
    rec.bodies.lock().unwrap().push(body);
    Json(json!({ "group_id": 11 }))
}

async fn history(
    State(rec): State<Recorded>,
    Query(q): Query<HashMap<String, String>>,
) -> axum::response::Response {
    rec.queries.lock().unwrap().push(q.clone());

    if q.get("group_id").map(String::as_str) == Some("403") {
        return (StatusCode::FORBIDDEN, Json(json!({ "detail": "session expired" }))).into_response();
    }

    let limit: usize = q["limit"].parse().unwrap();
    let page: usize = q["page"].parse().unwrap();
    let rows: Vec<Value> = history_rows()
        .into_iter()
        .skip((page - 1) * limit)
        .take(limit)
        .collect();
    Json(Value::Array(rows)).into_response()
}

async fn friends(State(rec): State<Recorded>, headers: HeaderMap) -> Json<Value> {
    rec.headers.lock().unwrap().push(headers);
    Json(json!({
        "data": [
            { "id": 2, "first_name": "Ada", "last_name": "Lovelace" },
            { "id": 3, "first_name": "Alan", "last_name": "Turing" }
        ]
    }))
}

async fn spawn_api() -> (SocketAddr, Recorded) {
    let rec = Recorded::default();
    let app = Router::new()
        .route("/dm/groups/get", get(list_chats))
        .route("/dm/group/create", post(create_chat))
        .route("/dm/group/chat/history", get(history))
        .route("/backend/chat/friends", get(friends))
        .with_state(rec.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, rec)
}

fn rest_client(addr: SocketAddr, token: Option<&str>) -> RestClient {
    RestClient::new(
        ApiConfig {
            base_url: format!("http://{}", addr),
            api_url: format!("http://{}/backend", addr),
        },
        token.map(str::to_string),
    )
}

fn closed_gateway() -> ConnectionManager {
    ConnectionManager::new(GatewayConfig::new("ws://127.0.0.1:9/gateway").unwrap())
}

#[tokio::test]
async fn list_chats_parses_encoded_participants() {
    let (addr, rec) = spawn_api().await;
    let directory = ChatDirectory::new(rest_client(addr, None), 1);

    let chats = directory.list_chats().await.unwrap();

    assert_eq!(chats.len(), 2);
    assert_eq!(chats[0].id, 7);
    assert_eq!(chats[0].user_ids, vec![1, 2]);
    assert_eq!(chats[1].other_party(1), Some(3));
    assert_eq!(rec.queries.lock().unwrap()[0]["user_id"], "1");
}

#[tokio::test]
async fn create_chat_announces_the_new_chat() {
    let (addr, rec) = spawn_api().await;
    let directory = ChatDirectory::new(rest_client(addr, None), 1);

    let announced: Arc<Mutex<Vec<Chat>>> = Arc::default();
    let sink = announced.clone();
    let _sub = directory.subscribe_created(move |chat| sink.lock().unwrap().push(chat.clone()));

    let chat_id = directory.create_chat(vec![2]).await.unwrap();

    assert_eq!(chat_id, 11);
    assert_eq!(
        rec.bodies.lock().unwrap()[0],
        json!({ "sender_user_id": 1, "user_ids": [2] })
    );
    let announced = announced.lock().unwrap();
    assert_eq!(announced.len(), 1);
    assert_eq!(announced[0].id, 11);
    assert_eq!(announced[0].user_ids, vec![1, 2]);
}

#[tokio::test]
async fn history_pages_are_bounded_and_end_on_a_short_page() {
    let (addr, rec) = spawn_api().await;
    let history = MessageHistory::new(rest_client(addr, None), closed_gateway(), 1);
    let mut timeline = MessageTimeline::new(7, 2);

    while let Some(page) = timeline.next_page() {
        let messages = history.get_messages(7, 2, page).await.unwrap();
        assert!(messages.len() <= 2);
        timeline.append_page(page, messages);
    }

    let texts: Vec<&str> = timeline
        .messages()
        .iter()
        .filter_map(|m| m.text.as_deref())
        .collect();
    assert_eq!(texts, vec!["m2", "m1", "m0"]);
    assert!(!timeline.has_more());

    let queries = rec.queries.lock().unwrap();
    assert_eq!(queries.len(), 2);
    assert_eq!(queries[0]["sender_user_id"], "1");
    assert_eq!(queries[0]["group_id"], "7");
    assert_eq!(queries[0]["limit"], "2");
    assert_eq!(queries[0]["page"], "1");
    assert_eq!(queries[0]["order"], "desc");
    assert_eq!(queries[1]["page"], "2");
}

#[tokio::test]
async fn friends_come_from_the_backend_with_auth_headers() {
    let (addr, rec) = spawn_api().await;
    let directory = ChatDirectory::new(rest_client(addr, Some("tok")), 1);

    let friends = directory.list_friends().await.unwrap();

    assert_eq!(friends.len(), 2);
    assert_eq!(friends[0].display_name(), "Ada Lovelace");

    let headers = rec.headers.lock().unwrap();
    assert_eq!(headers[0]["x-csrftoken"], "tok");
    assert_eq!(
        headers[0]["referer"].to_str().unwrap(),
        format!("http://{}/backend", addr)
    );
    assert_eq!(headers[0]["content-type"], "application/json");
}

#[tokio::test]
async fn forbidden_is_a_typed_error_and_expires_the_session() {
    let (addr, _rec) = spawn_api().await;
    let rest = rest_client(addr, Some("tok"));
    let expired = rest.session_expired();
    let history = MessageHistory::new(rest, closed_gateway(), 1);

    let err = history.get_messages(403, 20, 1).await.unwrap_err();

    match &err {
        FetchError::Status { status, body, .. } => {
            assert_eq!(status.as_u16(), 403);
            assert_eq!(body.as_ref().unwrap()["detail"], "session expired");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(*expired.borrow());
}

#[tokio::test]
async fn unknown_route_is_a_status_error() {
    let (addr, _rec) = spawn_api().await;
    let rest = rest_client(addr, None);

    let err = rest
        .get::<Value>("/dm/nowhere", huddle_api::ApiTarget::Serverless)
        .await
        .unwrap_err();
    assert_eq!(err.status().map(|s| s.as_u16()), Some(404));
}

#[tokio::test]
async fn sending_without_a_socket_is_a_silent_noop() {
    let (addr, _rec) = spawn_api().await;
    let history = MessageHistory::new(rest_client(addr, None), closed_gateway(), 1);
    let (_sub, mut pushed) = history.message_channel();

    history.send_message("hello", 7);

    assert!(pushed.try_recv().is_err());
}
