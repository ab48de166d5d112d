//! Live analysis WebSocket tests against a bound listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tempfile::TempDir;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use streammind_analyzer::{AnalyzerResult, VideoAnalyzer};
use streammind_api::ingest::ingest_token;
use streammind_api::{create_router, ApiConfig, AppState};
use streammind_models::{NewToken, SessionId};
use streammind_store::MemoryTokenStore;
use streammind_worker::WorkerConfig;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct NoopAnalyzer;

#[async_trait]
impl VideoAnalyzer for NoopAnalyzer {
    async fn analyze_video(&self, _session_id: &SessionId, _video_path: &str) -> AnalyzerResult<String> {
        Ok("{}".to_string())
    }
}

struct TestServer {
    addr: SocketAddr,
    state: AppState,
    _storage: TempDir,
}

impl TestServer {
    async fn start() -> Self {
        let storage = tempfile::tempdir().unwrap();
        let config = ApiConfig {
            video_storage_dir: storage.path().to_path_buf(),
            ..ApiConfig::default()
        };
        let state = AppState::new(
            config,
            WorkerConfig::default(),
            Arc::new(MemoryTokenStore::new()),
            Arc::new(NoopAnalyzer),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = create_router(state.clone(), None);
        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
                .await
                .unwrap();
        });

        Self {
            addr,
            state,
            _storage: storage,
        }
    }

    /// Open a live connection and wait until the hub has registered it.
    async fn subscribe(&self, session: SessionId) -> Client {
        let url = format!("ws://{}/ws/analysis/{}", self.addr, session);
        let (client, _) = connect_async(url).await.unwrap();
        let hub = Arc::clone(&self.state.hub);
        wait_until(|| hub.subscriber_count(&session) == 1).await;
        client
    }

    async fn ingest(&self, session: SessionId, content: &str, token_index: i32) {
        ingest_token(
            self.state.store.as_ref(),
            &self.state.hub,
            NewToken::new(session, content, token_index, 1000 + token_index as i64),
        )
        .await
        .unwrap();
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}

/// Next text frame, skipping keepalives.
async fn next_text(client: &mut Client) -> String {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), client.next())
            .await
            .expect("no frame within 2s")
            .expect("socket closed")
            .expect("socket error");
        match frame {
            Message::Text(_) => return frame.to_text().unwrap().to_string(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_live_tokens_arrive_in_order() {
    let server = TestServer::start().await;
    let session = SessionId::new();

    // Ingested before the connection: only available through replay.
    server.ingest(session, "early", 0).await;

    let mut client = server.subscribe(session).await;
    server.ingest(session, "first", 1).await;
    server.ingest(SessionId::new(), "elsewhere", 0).await;
    server.ingest(session, "second", 2).await;
    server.ingest(session, "third", 3).await;

    assert_eq!(next_text(&mut client).await, "first");
    assert_eq!(next_text(&mut client).await, "second");
    assert_eq!(next_text(&mut client).await, "third");
}

#[tokio::test]
async fn test_every_subscriber_of_a_session_gets_each_token() {
    let server = TestServer::start().await;
    let session = SessionId::new();

    let url = format!("ws://{}/ws/analysis/{}", server.addr, session);
    let (mut first, _) = connect_async(url.as_str()).await.unwrap();
    let (mut second, _) = connect_async(url.as_str()).await.unwrap();
    let hub = Arc::clone(&server.state.hub);
    wait_until(|| hub.subscriber_count(&session) == 2).await;

    server.ingest(session, "shared", 0).await;
    assert_eq!(next_text(&mut first).await, "shared");
    assert_eq!(next_text(&mut second).await, "shared");
}

#[tokio::test]
async fn test_client_close_unsubscribes() {
    let server = TestServer::start().await;
    let session = SessionId::new();
    let mut client = server.subscribe(session).await;

    client.close(None).await.unwrap();

    let hub = Arc::clone(&server.state.hub);
    wait_until(|| hub.total_subscribers() == 0 && hub.session_count() == 0).await;
}

#[tokio::test]
async fn test_socket_closes_when_subscription_is_dropped() {
    let server = TestServer::start().await;
    let session = SessionId::new();
    let mut client = server.subscribe(session).await;

    // First subscriber of a fresh hub.
    assert!(server.state.hub.unsubscribe(&session, 1));

    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), client.next())
            .await
            .expect("socket was not closed");
        match frame {
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            Some(Ok(other)) => panic!("unexpected frame: {:?}", other),
        }
    }

    // Later tokens go nowhere.
    server.ingest(session, "after", 0).await;
    assert_eq!(server.state.hub.total_subscribers(), 0);
}

#[tokio::test]
async fn test_malformed_session_id_is_refused() {
    let server = TestServer::start().await;
    let url = format!("ws://{}/ws/analysis/not-a-uuid", server.addr);
    assert!(connect_async(url).await.is_err());
    assert_eq!(server.state.hub.total_subscribers(), 0);
}
