//! Client side of the publish endpoint.

use super::protocol::{self, RpcResponse};
use super::{ProjectDoc, PublishRequest};
use crate::error::ClientError;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::path::{Component, Path};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::{Framed, LinesCodec};
use walkdir::WalkDir;

/// Responses are tiny; anything larger is a misbehaving peer.
const MAX_RESPONSE_BYTES: usize = 64 * 1024;

/// A connection to a publish endpoint. Calls on one client are sequential.
pub struct PublishClient {
    framed: Framed<TcpStream, LinesCodec>,
    next_id: u64,
}

impl PublishClient {
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self {
            framed: Framed::new(stream, LinesCodec::new_with_max_length(MAX_RESPONSE_BYTES)),
            next_id: 1,
        })
    }

    /// Upload `project_docs` for `project`. Returns once the server has
    /// written every file.
    pub async fn publish(
        &mut self,
        project: impl Into<String>,
        project_docs: Vec<ProjectDoc>,
    ) -> Result<(), ClientError> {
        self.send(&PublishRequest {
            project: project.into(),
            project_docs,
        })
        .await
    }

    pub async fn send(&mut self, request: &PublishRequest) -> Result<(), ClientError> {
        let id = self.next_id;
        self.next_id += 1;

        let line = protocol::encode_publish(id, request)?;
        self.framed.send(line).await?;

        let reply = self
            .framed
            .next()
            .await
            .ok_or(ClientError::ConnectionClosed)??;
        let response: RpcResponse = serde_json::from_str(&reply)?;
        check_response(id, response)
    }
}

/// Match a reply to the request `id` it answers.
///
/// Errors may carry a `null` id when the server could not read the request.
fn check_response(id: u64, response: RpcResponse) -> Result<(), ClientError> {
    let expected = Value::from(id);
    if response.id != expected && !(response.error.is_some() && response.id.is_null()) {
        return Err(ClientError::UnexpectedResponse(format!(
            "response id {} does not match request id {id}",
            response.id
        )));
    }

    match (response.error, response.result) {
        (Some(error), _) => Err(ClientError::Remote {
            code: error.code,
            message: error.message,
        }),
        (None, Some(_)) => Ok(()),
        (None, None) => Err(ClientError::UnexpectedResponse(
            "response carries neither result nor error".to_string(),
        )),
    }
}

/// Read every regular file under `dir` as a document, keyed by its
/// `/`-separated path relative to `dir`, in file name order.
pub fn collect_docs(dir: &Path) -> Result<Vec<ProjectDoc>, ClientError> {
    let mut docs = Vec::new();

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|source| ClientError::Walk {
            path: dir.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        let mut segments = Vec::new();
        for component in relative.components() {
            if let Component::Normal(segment) = component {
                let segment = segment
                    .to_str()
                    .ok_or_else(|| ClientError::NonUtf8Path(entry.path().to_path_buf()))?;
                segments.push(segment);
            }
        }

        let content = std::fs::read(entry.path())?;
        docs.push(ProjectDoc::new(segments.join("/"), content));
    }

    Ok(docs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn collects_nested_files_with_forward_slashes() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("api/types")).unwrap();
        fs::write(tmp.path().join("index.html"), b"root").unwrap();
        fs::write(tmp.path().join("api/types/page.html"), b"nested").unwrap();

        let docs = collect_docs(tmp.path()).unwrap();
        let paths: Vec<&str> = docs.iter().map(|doc| doc.path.as_str()).collect();
        assert_eq!(paths, vec!["api/types/page.html", "index.html"]);
        assert_eq!(docs[0].content, b"nested");
    }

    #[test]
    fn empty_directory_yields_no_docs() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(collect_docs(tmp.path()).unwrap().is_empty());
    }

    #[test]
    fn missing_directory_is_walk_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = collect_docs(&tmp.path().join("missing")).unwrap_err();
        assert!(matches!(err, ClientError::Walk { .. }));
    }

    /// Accept one request and answer it with `reply`.
    async fn answer_once(reply: &'static str) -> std::net::SocketAddr {
        use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read, mut write) = stream.into_split();
            let mut lines = BufReader::new(read).lines();
            lines.next_line().await.unwrap();
            write.write_all(reply.as_bytes()).await.unwrap();
            write.write_all(b"\n").await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn mismatched_response_id_is_rejected() {
        let addr = answer_once(r#"{"jsonrpc":"2.0","id":99,"result":null}"#).await;
        let mut client = PublishClient::connect(addr).await.unwrap();

        let err = client
            .publish("demo", vec![ProjectDoc::new("a.txt", "a")])
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::UnexpectedResponse(_)), "got {err}");
    }

    #[tokio::test]
    async fn response_without_result_is_rejected() {
        let addr = answer_once(r#"{"jsonrpc":"2.0","id":1}"#).await;
        let mut client = PublishClient::connect(addr).await.unwrap();

        let err = client
            .publish("demo", vec![ProjectDoc::new("a.txt", "a")])
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::UnexpectedResponse(_)), "got {err}");
    }

    #[test]
    fn error_with_null_id_is_remote() {
        let response = RpcResponse::failure(
            Value::Null,
            protocol::RpcError::new(protocol::INVALID_REQUEST, "too large"),
        );
        assert!(matches!(
            check_response(4, response),
            Err(ClientError::Remote { code, .. }) if code == protocol::INVALID_REQUEST
        ));
    }
}
