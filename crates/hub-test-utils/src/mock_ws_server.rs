// mock_ws_server: a minimal in-process WebSocket peer for exercising
// `signal-client` without a real hub server.
//
// Behavior: every frame received is echoed back to the same connection
// unmodified, except a frame count. This is enough to exercise the signed
// client's connect/send/receive/reconnect loop in isolation.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use hub_protocol::Frame;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::protocol::Message;

/// A mock echo server for integration testing of `signal-client`.
///
/// Binds to port 0 (random) and echoes every frame it receives back to the
/// sender. `refuse_connections` can be set before connections arrive to make
/// the first N connection attempts fail at the TCP accept stage, exercising
/// reconnect-with-backoff behavior.
pub struct MockHubServer {
    addr: SocketAddr,
    refuse_connections: Arc<AtomicUsize>,
    _task: tokio::task::JoinHandle<()>,
}

impl MockHubServer {
    pub async fn start() -> Result<Self, Box<dyn std::error::Error>> {
        Self::start_with_refusals(0).await
    }

    pub async fn start_with_refusals(
        refusals: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let refuse_connections = Arc::new(AtomicUsize::new(refusals));
        let refuse_for_task = refuse_connections.clone();

        let task = tokio::spawn(async move {
            Self::accept_loop(listener, refuse_for_task).await;
        });

        Ok(Self {
            addr,
            refuse_connections,
            _task: task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    async fn accept_loop(listener: TcpListener, refuse_connections: Arc<AtomicUsize>) {
        loop {
            match listener.accept().await {
                Ok((stream, _peer)) => {
                    let remaining = refuse_connections.load(Ordering::SeqCst);
                    if remaining > 0 {
                        refuse_connections.fetch_sub(1, Ordering::SeqCst);
                        drop(stream);
                        continue;
                    }
                    tokio::spawn(async move {
                        let _ = Self::handle_connection(stream).await;
                    });
                }
                Err(_) => break,
            }
        }
    }

    async fn handle_connection(
        stream: tokio::net::TcpStream,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        let (mut write, mut read) = ws_stream.split();

        while let Some(msg_result) = read.next().await {
            let msg = msg_result?;
            let text = match msg {
                Message::Text(t) => t,
                Message::Close(_) => break,
                Message::Ping(data) => {
                    write.send(Message::Pong(data)).await?;
                    continue;
                }
                _ => continue,
            };

            let frame: Frame = match serde_json::from_str(&text) {
                Ok(f) => f,
                Err(_) => continue,
            };
            let json = serde_json::to_string(&frame)?;
            write.send(Message::Text(json.into())).await?;
        }

        Ok(())
    }
}
