//! TCP transport for the publish endpoint.
//!
//! Every accepted connection runs on its own task and may carry any number
//! of requests, answered in order. The file writes themselves run on the
//! blocking pool.

use super::Publish;
use super::protocol::{self, INVALID_REQUEST, PUBLISH_FAILED, RpcError, RpcResponse};
use futures::{SinkExt, StreamExt};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tokio_util::io::InspectReader;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Default time a connection may go without sending a single byte.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Default upper bound for one request line (base64 included).
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 256 * 1024 * 1024;

/// Accepts publish connections and dispatches them to a [`Publish`] handler.
pub struct PublishServer {
    listener: TcpListener,
    publisher: Arc<dyn Publish>,
    idle_timeout: Duration,
    max_message_bytes: usize,
}

impl PublishServer {
    /// Bind the listening socket. Use port `0` to let the OS choose.
    pub async fn bind(addr: SocketAddr, publisher: Arc<dyn Publish>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            publisher,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        })
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn with_max_message_bytes(mut self, max_message_bytes: usize) -> Self {
        self.max_message_bytes = max_message_bytes;
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until `shutdown` is cancelled, then wait for open connections
    /// to finish their current request.
    pub async fn run(self, shutdown: CancellationToken) -> io::Result<()> {
        let tracker = TaskTracker::new();
        tracing::info!(addr = %self.local_addr()?, "publish endpoint listening");

        loop {
            let (stream, peer) = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        // Usually transient (fd exhaustion, aborted handshake).
                        tracing::warn!(error = %e, "failed to accept publish connection");
                        continue;
                    }
                },
            };

            let connection = Connection {
                peer,
                publisher: self.publisher.clone(),
                idle_timeout: self.idle_timeout,
                max_message_bytes: self.max_message_bytes,
                shutdown: shutdown.clone(),
            };
            tracker.spawn(connection.serve(stream));
        }

        tracker.close();
        tracker.wait().await;
        tracing::info!("publish endpoint stopped");
        Ok(())
    }
}

struct Connection {
    peer: SocketAddr,
    publisher: Arc<dyn Publish>,
    idle_timeout: Duration,
    max_message_bytes: usize,
    shutdown: CancellationToken,
}

impl Connection {
    async fn serve(self, stream: TcpStream) {
        tracing::debug!(peer = %self.peer, "publish connection opened");

        let (read, write) = stream.into_split();
        // Set by every read that returns data, cleared by each idle check.
        let received = Arc::new(AtomicBool::new(false));
        let read = InspectReader::new(read, {
            let received = received.clone();
            move |bytes: &[u8]| {
                if !bytes.is_empty() {
                    received.store(true, Ordering::Relaxed);
                }
            }
        });
        let mut lines = FramedRead::new(
            read,
            LinesCodec::new_with_max_length(self.max_message_bytes),
        );
        let mut replies = FramedWrite::new(write, LinesCodec::new());

        loop {
            // `next()` is cancel safe: a partial line stays buffered in the codec.
            let next = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                next = lines.next() => next,
                _ = tokio::time::sleep(self.idle_timeout) => {
                    if received.swap(false, Ordering::Relaxed) {
                        continue;
                    }
                    tracing::debug!(peer = %self.peer, "closing idle publish connection");
                    break;
                }
            };
            received.store(false, Ordering::Relaxed);

            let line = match next {
                None => break,
                Some(Ok(line)) => line,
                Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                    tracing::warn!(peer = %self.peer, "publish message too large");
                    let response = RpcResponse::failure(
                        serde_json::Value::Null,
                        RpcError::new(INVALID_REQUEST, "message exceeds the maximum size"),
                    );
                    let _ = self.reply(&mut replies, &response).await;
                    break;
                }
                Some(Err(LinesCodecError::Io(e))) => {
                    tracing::warn!(peer = %self.peer, error = %e, "publish connection failed");
                    break;
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            let response = self.handle(&line).await;
            if let Err(e) = self.reply(&mut replies, &response).await {
                tracing::warn!(peer = %self.peer, error = %e, "failed to send publish response");
                break;
            }
        }

        tracing::debug!(peer = %self.peer, "publish connection closed");
    }

    async fn handle(&self, line: &str) -> RpcResponse {
        let (id, request) = match protocol::decode_publish(line) {
            Ok(decoded) => decoded,
            Err(response) => {
                tracing::warn!(peer = %self.peer, error = ?response.error, "rejected publish message");
                return *response;
            }
        };

        let project = request.project.clone();
        let files = request.project_docs.len();
        let publisher = self.publisher.clone();

        match tokio::task::spawn_blocking(move || publisher.publish(request)).await {
            Ok(Ok(())) => {
                tracing::info!(peer = %self.peer, project = %project, files, "publish completed");
                RpcResponse::success(id)
            }
            Ok(Err(e)) => {
                tracing::warn!(peer = %self.peer, project = %project, error = %e, "publish failed");
                RpcResponse::failure(id, RpcError::from(&e))
            }
            Err(e) => {
                tracing::error!(peer = %self.peer, project = %project, error = %e, "publish task panicked");
                RpcResponse::failure(id, RpcError::new(PUBLISH_FAILED, "publish task failed"))
            }
        }
    }

    async fn reply(
        &self,
        replies: &mut FramedWrite<OwnedWriteHalf, LinesCodec>,
        response: &RpcResponse,
    ) -> Result<(), LinesCodecError> {
        let encoded = serde_json::to_string(response)
            .map_err(|e| LinesCodecError::Io(io::Error::other(e)))?;
        replies.send(encoded).await
    }
}
