//! TCP protocol client
//!
//! Writes framed requests over a TCP connection and correlates each reply
//! with its pending request by id. Unsolicited publish frames are forwarded
//! to the session's event channel in arrival order. When the connection
//! dies, every pending request is failed so no sequence slot is silently
//! abandoned: the submission path owes the sequencer a failure-bearing
//! response for each slot it allocated.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Duration};

use super::frame;
use super::{ClientFrame, ProtocolError, PublishMessage, ServerFrame, SessionRequest, SessionResponse};
use crate::config::ProxyConfig;

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<SessionResponse>>>>;

pub struct ProtocolClient {
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    pending: PendingMap,
    next_id: AtomicU64,
    dead: Arc<AtomicBool>,
    request_timeout: Duration,
}

impl ProtocolClient {
    /// Connects to `addr` and spawns the reader task.
    ///
    /// Publish frames received on the connection are forwarded to
    /// `publish_tx`.
    pub async fn connect(
        addr: &str,
        config: &ProxyConfig,
        publish_tx: mpsc::Sender<PublishMessage>,
    ) -> Result<Self, ProtocolError> {
        let stream = time::timeout(config.connect_timeout(), TcpStream::connect(addr))
            .await
            .map_err(|_| ProtocolError::Timeout)??;
        stream.set_nodelay(true)?;

        let (read_half, write_half) = stream.into_split();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let dead = Arc::new(AtomicBool::new(false));

        tokio::spawn(Self::read_loop(
            read_half,
            pending.clone(),
            publish_tx,
            dead.clone(),
        ));

        Ok(ProtocolClient {
            writer: tokio::sync::Mutex::new(write_half),
            pending,
            next_id: AtomicU64::new(0),
            dead,
            request_timeout: config.request_timeout(),
        })
    }

    /// Sends one request and waits for its reply.
    ///
    /// On timeout the pending slot is discarded and later replies for it are
    /// dropped by the reader.
    pub async fn request(&self, request: SessionRequest) -> Result<SessionResponse, ProtocolError> {
        if self.dead.load(Ordering::SeqCst) {
            return Err(ProtocolError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id, tx);

        let frame = ClientFrame { id, request };
        {
            let mut writer = self.writer.lock().await;
            if let Err(e) = frame::write_frame(&mut *writer, &frame).await {
                self.pending.lock().unwrap().remove(&id);
                return Err(e);
            }
        }

        match time::timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(ProtocolError::Closed),
            Err(_) => {
                self.pending.lock().unwrap().remove(&id);
                Err(ProtocolError::Timeout)
            }
        }
    }

    /// Whether the connection has been closed or has failed.
    pub fn is_closed(&self) -> bool {
        self.dead.load(Ordering::SeqCst)
    }

    /// Shuts the connection down. In-flight requests fail with
    /// [`ProtocolError::Closed`] once the reader observes the shutdown.
    pub async fn close(&self) {
        self.dead.store(true, Ordering::SeqCst);
        let mut writer = self.writer.lock().await;
        let _ = tokio::io::AsyncWriteExt::shutdown(&mut *writer).await;
    }

    async fn read_loop(
        mut reader: OwnedReadHalf,
        pending: PendingMap,
        publish_tx: mpsc::Sender<PublishMessage>,
        dead: Arc<AtomicBool>,
    ) {
        loop {
            match frame::read_frame::<_, ServerFrame>(&mut reader).await {
                Ok(ServerFrame::Reply { id, response }) => {
                    let slot = pending.lock().unwrap().remove(&id);
                    match slot {
                        Some(tx) => {
                            let _ = tx.send(response);
                        }
                        None => log::debug!("reply for unknown or expired request id {}", id),
                    }
                }
                Ok(ServerFrame::Publish(message)) => {
                    if publish_tx.send(message).await.is_err() {
                        log::debug!("publish receiver dropped, stopping reader");
                        break;
                    }
                }
                Err(ProtocolError::Closed) => {
                    log::debug!("connection closed by remote");
                    break;
                }
                Err(e) => {
                    log::warn!("connection failed: {}", e);
                    break;
                }
            }
        }

        dead.store(true, Ordering::SeqCst);

        // Dropping the senders fails every outstanding request.
        pending.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{
        KeepAliveRequest, OpenSessionRequest, OpenSessionResponse, ResponseStatus,
    };
    use tokio::net::TcpListener;

    fn test_config() -> ProxyConfig {
        let mut config = ProxyConfig::new();
        config.connect_timeout_ms = 1_000;
        config.request_timeout_ms = 200;
        config
    }

    #[tokio::test]
    async fn test_request_reply_and_publish() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (mut reader, mut writer) = stream.into_split();

            // Unsolicited publish before any reply.
            let publish = ServerFrame::Publish(PublishMessage {
                session_id: 1,
                event_index: 1,
                previous_index: 0,
                events: vec![],
            });
            frame::write_frame(&mut writer, &publish).await.unwrap();

            let request: ClientFrame = frame::read_frame(&mut reader).await.unwrap();
            let reply = ServerFrame::Reply {
                id: request.id,
                response: SessionResponse::OpenSession(OpenSessionResponse {
                    status: ResponseStatus::Ok,
                    session_id: 42,
                    timeout_ms: 5_000,
                }),
            };
            frame::write_frame(&mut writer, &reply).await.unwrap();
        });

        let (publish_tx, mut publish_rx) = mpsc::channel(16);
        let client = ProtocolClient::connect(&addr.to_string(), &test_config(), publish_tx)
            .await
            .unwrap();

        let response = client
            .request(SessionRequest::OpenSession(OpenSessionRequest {
                client_id: "client".to_string(),
                service: "test".to_string(),
                timeout_ms: 5_000,
            }))
            .await
            .unwrap();
        match response {
            SessionResponse::OpenSession(open) => assert_eq!(open.session_id, 42),
            other => panic!("unexpected response: {:?}", other),
        }

        let publish = publish_rx.recv().await.unwrap();
        assert_eq!(publish.event_index, 1);

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Accept but never reply.
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(2)).await;
            drop(stream);
        });

        let (publish_tx, _publish_rx) = mpsc::channel(16);
        let client = ProtocolClient::connect(&addr.to_string(), &test_config(), publish_tx)
            .await
            .unwrap();

        let result = client
            .request(SessionRequest::KeepAlive(KeepAliveRequest {
                session_id: 1,
                command_sequence: 0,
                event_index: 0,
            }))
            .await;
        assert!(matches!(result, Err(ProtocolError::Timeout)));

        server.abort();
    }

    #[tokio::test]
    async fn test_disconnect_fails_pending_requests() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (mut reader, _writer) = stream.into_split();
            // Read the request, then drop the connection without replying.
            let _: ClientFrame = frame::read_frame(&mut reader).await.unwrap();
        });

        let (publish_tx, _publish_rx) = mpsc::channel(16);
        let mut config = test_config();
        config.request_timeout_ms = 5_000;
        let client = ProtocolClient::connect(&addr.to_string(), &config, publish_tx)
            .await
            .unwrap();

        let result = client
            .request(SessionRequest::KeepAlive(KeepAliveRequest {
                session_id: 1,
                command_sequence: 0,
                event_index: 0,
            }))
            .await;
        assert!(matches!(result, Err(ProtocolError::Closed)));
        assert!(client.is_closed());

        server.await.unwrap();
    }
}
