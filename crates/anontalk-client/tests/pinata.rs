//! Media messages against a local stand-in for the pinning service.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Multipart, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use anontalk_client::{ChatClient, ClientConfig, ClientError, PinataUploader, UploadError};
use anontalk_graph::MemoryGraph;
use anontalk_shared::records::channel_messages_path;
use anontalk_shared::ChannelName;
use anontalk_store::MemorySessionStore;

#[derive(Debug, Clone)]
struct Received {
    api_key: Option<String>,
    field: String,
    file_name: Option<String>,
    content_type: Option<String>,
    len: usize,
}

type Log = Arc<Mutex<Vec<Received>>>;

async fn pin(
    State(log): State<Log>,
    headers: HeaderMap,
    mut form: Multipart,
) -> impl IntoResponse {
    let api_key = headers
        .get("pinata_api_key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    if headers.get("pinata_secret_api_key").is_none() {
        return (StatusCode::UNAUTHORIZED, Json(serde_json::json!({"error": "no secret"})));
    }

    while let Ok(Some(field)) = form.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let len = field.bytes().await.map(|b| b.len()).unwrap_or(0);
        log.lock().unwrap().push(Received {
            api_key: api_key.clone(),
            field: name,
            file_name,
            content_type,
            len,
        });
    }

    (
        StatusCode::OK,
        Json(serde_json::json!({"IpfsHash": "QmTestHash", "PinSize": 1234})),
    )
}

async fn reject() -> impl IntoResponse {
    (StatusCode::UNAUTHORIZED, "invalid key")
}

async fn serve(log: Log) -> SocketAddr {
    let app = Router::new()
        .route("/pinning/pinFileToIPFS", post(pin))
        .route("/reject", post(reject))
        .with_state(log);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn png() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(1600, 800, image::Rgb([30, 60, 90]));
    let mut out = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

type TestClient = ChatClient<MemoryGraph, PinataUploader>;

fn client(graph: &MemoryGraph, uploader: PinataUploader) -> TestClient {
    ChatClient::with_graph(
        ClientConfig::default(),
        graph.clone(),
        uploader,
        Arc::new(MemorySessionStore::new()),
    )
}

#[tokio::test]
async fn test_media_message_points_at_pinned_file() {
    let log = Log::default();
    let addr = serve(log.clone()).await;
    let uploader = PinataUploader::new("key", "secret").with_endpoints(
        format!("http://{addr}/pinning/pinFileToIPFS"),
        format!("http://{addr}/ipfs/"),
    );

    let graph = MemoryGraph::new();
    let alice = client(&graph, uploader).sign_up("alice", "pw").await.unwrap();
    let id = alice.send_media("  a cat ", png()).await.unwrap();

    let received = log.lock().unwrap().clone();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].api_key.as_deref(), Some("key"));
    assert_eq!(received[0].field, "file");
    assert_eq!(received[0].file_name.as_deref(), Some("image.jpg"));
    assert_eq!(received[0].content_type.as_deref(), Some("image/jpeg"));
    assert!(received[0].len > 0);

    let mut view = alice.messages();
    let seen = tokio::time::timeout(
        Duration::from_secs(5),
        view.wait_for(|v| v.messages.iter().any(|m| m.id == id)),
    )
    .await
    .unwrap()
    .unwrap()
    .clone();
    let message = &seen.messages[0];
    assert_eq!(message.kind.as_str(), "media");
    assert_eq!(message.text.as_deref(), Some("a cat"));
    assert_eq!(
        message.content.as_deref(),
        Some(format!("http://{addr}/ipfs/QmTestHash").as_str())
    );

    alice.logout().await;
}

#[tokio::test]
async fn test_rejected_upload_writes_nothing() {
    let addr = serve(Log::default()).await;
    let uploader = PinataUploader::new("bad", "creds")
        .with_endpoints(format!("http://{addr}/reject"), format!("http://{addr}/ipfs/"));

    let graph = MemoryGraph::new();
    let alice = client(&graph, uploader).sign_up("alice", "pw").await.unwrap();

    let err = alice.send_media("", png()).await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Upload(UploadError::Status { status: 401, .. })
    ));
    assert!(graph
        .snapshot_children(&channel_messages_path(&ChannelName::default_channel()))
        .is_empty());

    alice.logout().await;
}

#[tokio::test]
async fn test_avatar_upload_then_profile_update() {
    let addr = serve(Log::default()).await;
    let uploader = PinataUploader::new("key", "secret").with_endpoints(
        format!("http://{addr}/pinning/pinFileToIPFS"),
        format!("http://{addr}/ipfs/"),
    );

    let graph = MemoryGraph::new();
    let alice = client(&graph, uploader).sign_up("alice", "pw").await.unwrap();

    let url = alice.profile().upload_avatar(png()).await.unwrap();
    // Uploading alone leaves the profile untouched.
    assert!(alice.profile().profile_picture("alice").await.contains("dicebear"));

    alice.update_profile_picture(&url).await.unwrap();
    assert_eq!(alice.profile().profile_picture("alice").await, url);

    alice.logout().await;
}
