//! An in-process mock server implementing the server side of the framed
//! protocol, plus end-to-end tests driving the public `Client` API against it.

use std::{sync::Arc, time::Duration};

use serde_json::json;
use tokio::{
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};

use crate::{
    client::{auth, options::ServerAddress},
    cmap::conn::{command, wire::Message},
    Client, ClientOptions, Env, Query, QueryResponse,
};

const SECRET: &str = "7fbb52c011ecafaa9a1d1b8683dd661c";

#[derive(Clone)]
pub(crate) struct MockServerConfig {
    pub(crate) secret_key: String,

    /// Full reply frames sent in response to every query, before the
    /// completion frame.
    pub(crate) reply_frames: Vec<serde_json::Value>,

    /// When false, the response stream is left open after the reply frames.
    pub(crate) send_complete: bool,

    /// Corrupt the server's handshake proof.
    pub(crate) tamper_proof: bool,
}

impl MockServerConfig {
    pub(crate) fn new() -> Self {
        Self {
            secret_key: SECRET.to_string(),
            reply_frames: Vec::new(),
            send_complete: true,
            tamper_proof: false,
        }
    }

    pub(crate) fn with_replies(mut self, frames: Vec<serde_json::Value>) -> Self {
        self.reply_frames = frames;
        self
    }
}

pub(crate) fn data_frame(data: serde_json::Value) -> serde_json::Value {
    json!({
        "error": false,
        "response_code": command::QUERY_DATA,
        "client_auth": null,
        "data": data,
    })
}

pub(crate) fn error_frame(response_code: i32, message: &str) -> serde_json::Value {
    json!({
        "error": true,
        "response_code": response_code,
        "client_auth": null,
        "data": message,
    })
}

pub(crate) struct MockServer {
    pub(crate) address: ServerAddress,
    handle: JoinHandle<()>,
}

impl MockServer {
    pub(crate) async fn start(config: MockServerConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let config = Arc::new(config);

        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let config = config.clone();
                tokio::spawn(async move {
                    let _ = serve_connection(stream, config).await;
                });
            }
        });

        Self {
            address: ServerAddress::new("127.0.0.1", port),
            handle,
        }
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve_connection(
    mut stream: TcpStream,
    config: Arc<MockServerConfig>,
) -> crate::Result<()> {
    let request = Message::read_from(&mut stream).await?.into_payload();
    let str_member = |key: &str| {
        request
            .get(key)
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    let nonce = str_member("nonce");
    if auth::request_token(&config.secret_key, &nonce) != str_member("request_token") {
        Message::new(json!({
            "error": true,
            "response_code": command::CLIENT_AUTH_ERROR,
            "client_auth": null,
            "data": "invalid credentials",
        }))
        .write_to(&mut stream)
        .await?;
        return Ok(());
    }

    let server_nonce = auth::generate_nonce();
    let mut server_token = auth::request_token(&config.secret_key, &server_nonce);
    if config.tamper_proof {
        server_token.replace_range(..1, if server_token.starts_with('0') { "1" } else { "0" });
    }

    Message::new(json!({
        "error": false,
        "response_code": 0x002,
        "client_auth": {
            "access_key": str_member("access_key"),
            "client_key": str_member("client_key"),
            "nonce": server_nonce,
            "request_token": server_token,
        },
        "data": {
            "client_key": str_member("client_key"),
            "access_key": str_member("access_key"),
            "access_token": "token-123",
            "access_token_expire": 4102444800i64,
        },
    }))
    .write_to(&mut stream)
    .await?;

    // The terminator frame the client reads and discards after the handshake
    // reply.
    Message::new(json!({
        "error": false,
        "response_code": 0x002,
        "client_auth": null,
        "data": {},
    }))
    .write_to(&mut stream)
    .await?;

    loop {
        Message::read_from(&mut stream).await?;

        for frame in &config.reply_frames {
            Message::new(frame.clone()).write_to(&mut stream).await?;
        }

        if config.send_complete {
            Message::new(json!({
                "error": false,
                "response_code": command::QUERY_COMPLETE,
                "client_auth": null,
                "data": {},
            }))
            .write_to(&mut stream)
            .await?;
        } else {
            // Leave the response stream open until the client gives up.
            tokio::time::sleep(Duration::from_secs(60)).await;
            return Ok(());
        }
    }
}

pub(crate) fn client_options() -> ClientOptions {
    ClientOptions::builder()
        .client_key("2AKOHVT0VO81B9KSUJP8Q5PIKW")
        .access_key("4SVOHVT0VO81B9KSUJP8Q4PIFS")
        .secret_key(SECRET)
        .database_id("db-main")
        .env(Env::Dev)
        .build()
}

fn client_for(server: &MockServer, options: ClientOptions) -> Client {
    Client::new(server.address.host.clone(), server.address.port, options).unwrap()
}

#[tokio::test]
async fn select_streams_rows_until_completion() {
    let row1 = json!({ "id": 1, "name": "amy" });
    let row2 = json!({ "id": 2, "name": "ben" });
    let server = MockServerConfig::new()
        .with_replies(vec![data_frame(row1.clone()), data_frame(row2.clone())]);
    let server = MockServer::start(server).await;
    let client = client_for(&server, client_options());

    let query = Query::new("users").select();
    let stream = client.run(&query).await.unwrap().into_stream().unwrap();
    let rows = stream.try_collect().await.unwrap();

    assert_eq!(rows, vec![row1, row2]);
    assert_eq!(client.pool().available_connection_count(), 1);
    assert_eq!(client.pool().total_connection_count(), 1);
}

#[tokio::test]
async fn query_stream_works_through_the_stream_adapters() {
    use futures::StreamExt;

    let server = MockServerConfig::new().with_replies(vec![
        data_frame(json!({ "id": 1 })),
        data_frame(json!({ "id": 2 })),
        data_frame(json!({ "id": 3 })),
    ]);
    let server = MockServer::start(server).await;
    let client = client_for(&server, client_options());

    let query = Query::new("users").select();
    let stream = client.run(&query).await.unwrap().into_stream().unwrap();

    let ids: Vec<i64> = stream
        .map(|row| row.unwrap()["id"].as_i64().unwrap())
        .collect()
        .await;

    assert_eq!(ids, vec![1, 2, 3]);
}

#[tokio::test]
async fn non_select_returns_a_single_result() {
    let server = MockServerConfig::new()
        .with_replies(vec![data_frame(json!({ "last_insert_id": 7 }))]);
    let server = MockServer::start(server).await;
    let client = client_for(&server, client_options());

    let query = Query::new("users").insert().field("name", "amy").unwrap();
    let result = client.run(&query).await.unwrap().into_single().unwrap();

    assert_eq!(result, json!({ "last_insert_id": 7 }));
    // The session went back to the pool after the response completed.
    assert_eq!(client.pool().available_connection_count(), 1);
}

#[tokio::test]
async fn sessions_are_reused_across_runs() {
    let server = MockServerConfig::new()
        .with_replies(vec![data_frame(json!({ "is_updated": true }))]);
    let server = MockServer::start(server).await;
    let client = client_for(&server, client_options());

    let query = Query::new("users").update().field("active", false).unwrap();
    client.run(&query).await.unwrap();
    client.run(&query).await.unwrap();

    assert_eq!(client.pool().total_connection_count(), 1);
    assert_eq!(client.pool().available_connection_count(), 1);
}

#[tokio::test]
async fn server_error_mid_stream_returns_the_session_to_the_pool() {
    let server = MockServerConfig::new().with_replies(vec![
        data_frame(json!({ "id": 1 })),
        error_frame(0x09, "query failed halfway"),
    ]);
    let server = MockServer::start(server).await;
    let client = client_for(&server, client_options());

    let query = Query::new("users").select();
    let mut stream = client.run(&query).await.unwrap().into_stream().unwrap();

    assert_eq!(stream.next().await.unwrap().unwrap(), json!({ "id": 1 }));

    let err = stream.next().await.unwrap().unwrap_err();
    assert!(err.is_server_error());
    assert_eq!(err.server_response_code(), Some(0x09));

    assert!(stream.next().await.is_none());

    // The wire was still intact, so the session went back to the pool.
    assert_eq!(client.pool().available_connection_count(), 1);
    assert_eq!(client.pool().total_connection_count(), 1);
}

#[tokio::test]
async fn expired_token_surfaces_as_an_authentication_error() {
    let server = MockServerConfig::new()
        .with_replies(vec![error_frame(command::TOKEN_EXPIRED, "token expired")]);
    let server = MockServer::start(server).await;
    let client = client_for(&server, client_options());

    let query = Query::new("users").delete();
    let err = client.run(&query).await.unwrap_err();

    assert!(err.is_authentication());
}

#[tokio::test]
async fn tampered_server_proof_fails_authentication() {
    let config = MockServerConfig {
        tamper_proof: true,
        ..MockServerConfig::new()
    };
    let server = MockServer::start(config).await;
    let client = client_for(&server, client_options());

    let query = Query::new("users").select();
    let err = client.run(&query).await.unwrap_err();

    assert!(err.is_authentication());
    // The failed session never entered the pool.
    assert_eq!(client.pool().total_connection_count(), 0);
}

#[tokio::test]
async fn handshake_rejection_carries_the_server_message() {
    let config = MockServerConfig {
        secret_key: "a-different-secret".to_string(),
        ..MockServerConfig::new()
    };
    let server = MockServer::start(config).await;
    let client = client_for(&server, client_options());

    let query = Query::new("users").select();
    let err = client.run(&query).await.unwrap_err();

    assert!(err.is_authentication());
    assert!(err.message().unwrap().contains("invalid credentials"));
}

#[tokio::test]
async fn query_timeout_destroys_the_session() {
    let config = MockServerConfig {
        send_complete: false,
        ..MockServerConfig::new()
    };
    let server = MockServer::start(config).await;
    let client = client_for(&server, client_options());

    let query = Query::new("users").insert().field("name", "amy").unwrap();
    let err = client
        .run_with_timeout(&query, Duration::from_millis(200))
        .await
        .unwrap_err();

    assert!(err.is_network_timeout());
    assert_eq!(client.pool().available_connection_count(), 0);
    assert_eq!(client.pool().total_connection_count(), 0);
}

#[tokio::test]
async fn dropping_a_stream_mid_response_destroys_the_session() {
    let server = MockServerConfig::new().with_replies(vec![
        data_frame(json!({ "id": 1 })),
        data_frame(json!({ "id": 2 })),
    ]);
    let server = MockServer::start(server).await;
    let client = client_for(&server, client_options());

    let query = Query::new("users").select();
    let mut stream = client.run(&query).await.unwrap().into_stream().unwrap();
    stream.next().await.unwrap().unwrap();

    // Abandon the stream with frames still unread: the session must be
    // destroyed, not returned with a dirty receive stream.
    drop(stream);

    assert_eq!(client.pool().available_connection_count(), 0);
    assert_eq!(client.pool().total_connection_count(), 0);
}

#[tokio::test]
async fn empty_data_frame_ends_the_stream() {
    let server = MockServerConfig::new().with_replies(vec![data_frame(json!({}))]);
    let server = MockServer::start(server).await;
    let client = client_for(&server, client_options());

    let query = Query::new("users").select();
    let stream = client.run(&query).await.unwrap().into_stream().unwrap();
    let rows = stream.try_collect().await.unwrap();

    assert!(rows.is_empty());
    assert_eq!(client.pool().available_connection_count(), 1);
}

#[tokio::test]
async fn build_errors_surface_before_any_session_is_leased() {
    let server = MockServer::start(MockServerConfig::new()).await;
    let client = client_for(&server, client_options());

    // No kind set.
    let err = client.run(&Query::new("users")).await.unwrap_err();
    assert_eq!(err.message().unwrap(), "query kind not set");
    assert_eq!(client.pool().total_connection_count(), 0);
}

#[tokio::test]
async fn shutdown_closes_the_pool() {
    let server = MockServerConfig::new()
        .with_replies(vec![data_frame(json!({ "is_deleted": true }))]);
    let server = MockServer::start(server).await;
    let client = client_for(&server, client_options());

    let query = Query::new("users").delete();
    client.run(&query).await.unwrap();

    let handle = client.clone();
    client.shutdown().await;

    assert_eq!(handle.pool().available_connection_count(), 0);
    let err = handle.run(&query).await.unwrap_err();
    assert!(err.message().unwrap().contains("closed"));
}

#[test]
fn misconfiguration_names_the_offending_field() {
    let mut options = client_options();
    options.access_key = String::new();
    let err = Client::new("localhost", 7777, options).unwrap_err();
    assert!(err.message().unwrap().contains("access_key"));

    let err = Client::new("  ", 7777, client_options()).unwrap_err();
    assert!(err.message().unwrap().contains("host"));
}

#[test]
fn debug_output_redacts_the_secret_key() {
    let rendered = format!("{:?}", client_options());
    assert!(rendered.contains("<redacted>"));
    assert!(!rendered.contains(SECRET));
}

#[tokio::test]
async fn query_response_unwrap_helpers_enforce_the_kind() {
    let server = MockServerConfig::new()
        .with_replies(vec![data_frame(json!({ "is_updated": true }))]);
    let server = MockServer::start(server).await;
    let client = client_for(&server, client_options());

    let update = Query::new("users").update().field("active", true).unwrap();
    let response = client.run(&update).await.unwrap();
    assert!(matches!(response, QueryResponse::Single(_)));
    assert!(response.into_stream().is_err());

    let select = Query::new("users").select();
    let response = client.run(&select).await.unwrap();
    assert!(response.into_single().is_err());
}
