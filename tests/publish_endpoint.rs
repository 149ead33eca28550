//! Publish endpoint tests over real TCP connections.

use std::fs;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use porfavor::publish::protocol::{INVALID_PARAMS, METHOD_NOT_FOUND, PARSE_ERROR};
use porfavor::{ClientError, DiskPublisher, ProjectDoc, PublishClient, PublishServer, WorkDir};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

struct Harness {
    _tmp: tempfile::TempDir,
    work: Arc<WorkDir>,
    addr: SocketAddr,
    shutdown: CancellationToken,
    handle: tokio::task::JoinHandle<std::io::Result<()>>,
}

impl Harness {
    async fn start() -> Self {
        Self::start_with(|server| server).await
    }

    async fn start_with(configure: impl FnOnce(PublishServer) -> PublishServer) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let work = Arc::new(WorkDir::open(tmp.path()).unwrap());
        let publisher = Arc::new(DiskPublisher::new(work.clone()));
        let server = PublishServer::bind("127.0.0.1:0".parse().unwrap(), publisher)
            .await
            .unwrap();
        let server = configure(server);
        let addr = server.local_addr().unwrap();

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(server.run(shutdown.clone()));

        Self {
            _tmp: tmp,
            work,
            addr,
            shutdown,
            handle,
        }
    }

    fn read(&self, relative: &str) -> Vec<u8> {
        fs::read(self.work.root().join(relative)).unwrap()
    }

    async fn stop(self) {
        self.shutdown.cancel();
        self.handle.await.unwrap().unwrap();
    }
}

/// Send raw lines and collect one response line per request.
async fn raw_exchange(addr: SocketAddr, lines: &[String]) -> Vec<Value> {
    let stream = TcpStream::connect(addr).await.unwrap();
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read).lines();

    let mut responses = Vec::new();
    for line in lines {
        write.write_all(line.as_bytes()).await.unwrap();
        write.write_all(b"\n").await.unwrap();
        let reply = reader.next_line().await.unwrap().expect("response line");
        responses.push(serde_json::from_str(&reply).unwrap());
    }
    responses
}

#[tokio::test]
async fn client_publish_writes_files() {
    let harness = Harness::start().await;

    let mut client = PublishClient::connect(harness.addr).await.unwrap();
    client
        .publish(
            "demo",
            vec![
                ProjectDoc::new("index.html", "<p>hi</p>"),
                ProjectDoc::new("a/b/c.txt", "nested"),
            ],
        )
        .await
        .unwrap();

    assert_eq!(harness.read("demo/index.html"), b"<p>hi</p>");
    assert_eq!(harness.read("demo/a/b/c.txt"), b"nested");
    harness.stop().await;
}

#[tokio::test]
async fn one_connection_carries_several_publishes() {
    let harness = Harness::start().await;

    let mut client = PublishClient::connect(harness.addr).await.unwrap();
    client
        .publish("demo", vec![ProjectDoc::new("page.html", "v1")])
        .await
        .unwrap();
    client
        .publish("demo", vec![ProjectDoc::new("page.html", "v2")])
        .await
        .unwrap();

    assert_eq!(harness.read("demo/page.html"), b"v2");
    harness.stop().await;
}

#[tokio::test]
async fn binary_content_survives_the_wire() {
    let harness = Harness::start().await;
    let bytes: Vec<u8> = (0..=255u8).rev().collect();

    let mut client = PublishClient::connect(harness.addr).await.unwrap();
    client
        .publish("demo", vec![ProjectDoc::new("icon.png", bytes.clone())])
        .await
        .unwrap();

    assert_eq!(harness.read("demo/icon.png"), bytes);
    harness.stop().await;
}

#[tokio::test]
async fn unsafe_project_is_rejected_as_invalid_params() {
    let harness = Harness::start().await;

    let mut client = PublishClient::connect(harness.addr).await.unwrap();
    let err = client
        .publish("../escape", vec![ProjectDoc::new("x.txt", "x")])
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Remote { code, .. } if code == INVALID_PARAMS));
    assert!(!harness.work.root().parent().unwrap().join("escape").exists());

    // The connection stays usable after a rejected call.
    client
        .publish("demo", vec![ProjectDoc::new("ok.txt", "ok")])
        .await
        .unwrap();
    assert_eq!(harness.read("demo/ok.txt"), b"ok");
    harness.stop().await;
}

#[tokio::test]
async fn malformed_and_unknown_messages_get_error_responses() {
    let harness = Harness::start().await;

    let responses = raw_exchange(
        harness.addr,
        &[
            "{broken".to_string(),
            json!({"jsonrpc": "2.0", "id": 9, "method": "delete", "params": {}}).to_string(),
            json!({
                "jsonrpc": "2.0",
                "id": 10,
                "method": "publish",
                "params": {"project": "demo", "project_docs": [{"path": "a.txt", "content": "YQ=="}]}
            })
            .to_string(),
        ],
    )
    .await;

    assert_eq!(responses[0]["error"]["code"], PARSE_ERROR);
    assert_eq!(responses[1]["id"], 9);
    assert_eq!(responses[1]["error"]["code"], METHOD_NOT_FOUND);
    assert_eq!(responses[2], json!({"jsonrpc": "2.0", "id": 10, "result": null}));
    assert_eq!(harness.read("demo/a.txt"), b"a");
    harness.stop().await;
}

#[tokio::test]
async fn concurrent_clients_publish_independently() {
    let harness = Harness::start().await;

    let mut tasks = Vec::new();
    for i in 0..8 {
        let addr = harness.addr;
        tasks.push(tokio::spawn(async move {
            let mut client = PublishClient::connect(addr).await.unwrap();
            client
                .publish(
                    format!("project-{i}"),
                    vec![ProjectDoc::new("index.html", format!("doc {i}"))],
                )
                .await
                .unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    for i in 0..8 {
        assert_eq!(
            harness.read(&format!("project-{i}/index.html")),
            format!("doc {i}").into_bytes()
        );
    }
    assert_eq!(harness.work.projects().unwrap().len(), 8);
    harness.stop().await;
}

#[tokio::test]
async fn idle_connection_is_closed() {
    let harness =
        Harness::start_with(|server| server.with_idle_timeout(Duration::from_millis(100))).await;

    let mut stream = TcpStream::connect(harness.addr).await.unwrap();
    let mut buf = Vec::new();
    let read = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut buf))
        .await
        .expect("server should close the idle connection");

    assert_eq!(read.unwrap(), 0);
    harness.stop().await;
}

#[tokio::test]
async fn slow_upload_outlasting_idle_timeout_completes() {
    let harness =
        Harness::start_with(|server| server.with_idle_timeout(Duration::from_millis(300))).await;

    let content = "x".repeat(3000);
    let mut line = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "publish",
        "params": {
            "project": "demo",
            "project_docs": [{"path": "slow.txt", "content": STANDARD.encode(&content)}]
        }
    })
    .to_string();
    line.push('\n');

    let stream = TcpStream::connect(harness.addr).await.unwrap();
    let (read, mut write) = stream.into_split();
    // Ten chunks 100ms apart: the whole message takes far longer than the
    // idle timeout, but the connection is never quiet for that long.
    let chunk_len = line.len().div_ceil(10);
    for chunk in line.as_bytes().chunks(chunk_len) {
        write.write_all(chunk).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let reply = tokio::time::timeout(
        Duration::from_secs(5),
        BufReader::new(read).lines().next_line(),
    )
    .await
    .expect("reply before deadline")
    .unwrap()
    .expect("response line");
    let reply: Value = serde_json::from_str(&reply).unwrap();

    assert_eq!(reply, json!({"jsonrpc": "2.0", "id": 1, "result": null}));
    assert_eq!(harness.read("demo/slow.txt"), content.into_bytes());
    harness.stop().await;
}

#[tokio::test]
async fn oversized_message_is_rejected() {
    let harness = Harness::start_with(|server| server.with_max_message_bytes(1024)).await;

    let mut client = PublishClient::connect(harness.addr).await.unwrap();
    let err = client
        .publish("demo", vec![ProjectDoc::new("big.bin", vec![7u8; 4096])])
        .await
        .unwrap_err();

    // The server answers and hangs up mid-upload, so the client may see the
    // error response or the reset connection first.
    assert!(
        matches!(
            err,
            ClientError::Remote { .. } | ClientError::Io(_) | ClientError::ConnectionClosed
        ),
        "got {err}"
    );
    assert!(!harness.work.root().join("demo/big.bin").exists());
    harness.stop().await;
}
