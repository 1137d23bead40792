//! DevTools WebSocket connection
//!
//! One connection per target. Commands are correlated to responses through a
//! pending map keyed by request ID; a dedicated reader task owns the receive
//! half of the socket so senders never contend with it.

use super::types::{CdpNotification, CdpRequest, CdpRpcResponse};
use crate::{Error, Result};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type PendingMap = HashMap<u64, PendingCommand>;

/// Pending command response
#[derive(Debug)]
struct PendingCommand {
    sender: oneshot::Sender<CdpRpcResponse>,
    /// Command method, for logging
    method: String,
}

/// Per-command timeouts
///
/// Screenshots and navigations legitimately take longer than ordinary
/// commands; everything else gets the default.
fn timeout_for(method: &str) -> Duration {
    if method.contains("captureScreenshot") {
        Duration::from_secs(90)
    } else if method.contains("navigate") {
        Duration::from_secs(60)
    } else {
        Duration::from_secs(30)
    }
}

/// DevTools WebSocket connection
#[derive(Debug)]
pub struct CdpConnection {
    url: String,
    writer: Arc<Mutex<WsSink>>,
    next_id: AtomicU64,
    pending: Arc<Mutex<PendingMap>>,
    is_active: Arc<AtomicBool>,
}

impl CdpConnection {
    /// Connect to a DevTools WebSocket URL and start the reader task
    pub async fn connect(url: &str) -> Result<Arc<Self>> {
        debug!("Connecting to DevTools WebSocket: {}", url);

        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| Error::websocket(format!("Failed to connect to {}: {}", url, e)))?;

        let (sink, stream) = ws_stream.split();
        let writer = Arc::new(Mutex::new(sink));
        let pending = Arc::new(Mutex::new(PendingMap::new()));
        let is_active = Arc::new(AtomicBool::new(true));

        tokio::spawn(Self::read_loop(
            stream,
            Arc::clone(&writer),
            Arc::clone(&pending),
            Arc::clone(&is_active),
        ));

        Ok(Arc::new(Self {
            url: url.to_string(),
            writer,
            next_id: AtomicU64::new(1),
            pending,
            is_active,
        }))
    }

    /// Send a command and wait for its response, returning the result value
    pub async fn send_command(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value> {
        if !self.is_active.load(Ordering::SeqCst) {
            return Err(Error::ConnectionReset(format!(
                "connection to {} is closed",
                self.url
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = CdpRequest {
            id,
            method: method.to_string(),
            params: if params.is_null() { None } else { Some(params) },
            session_id: None,
        };
        let json = serde_json::to_string(&request)?;

        let (sender, receiver) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert(
                id,
                PendingCommand {
                    sender,
                    method: method.to_string(),
                },
            );
        }

        debug!("Sending command {} ({})", method, id);
        if let Err(e) = self.send_message(Message::Text(json)).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(timeout_for(method), receiver).await {
            Ok(Ok(response)) => {
                if let Some(error) = response.error {
                    return Err(Error::protocol(format!(
                        "{} failed: {} (code {})",
                        method, error.message, error.code
                    )));
                }
                Ok(response.result)
            }
            Ok(Err(_)) => Err(Error::ConnectionReset(format!(
                "connection dropped while waiting for {}",
                method
            ))),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(Error::timeout(format!("{} timed out", method)))
            }
        }
    }

    /// Close the connection
    pub async fn close(&self) -> Result<()> {
        self.is_active.store(false, Ordering::SeqCst);

        let mut writer = self.writer.lock().await;
        writer
            .close()
            .await
            .map_err(|e| Error::websocket(format!("Failed to close WebSocket: {}", e)))?;

        Ok(())
    }

    /// Whether the connection is still usable
    pub fn is_active(&self) -> bool {
        self.is_active.load(Ordering::SeqCst)
    }

    async fn send_message(&self, message: Message) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer
            .send(message)
            .await
            .map_err(|e| Error::websocket(format!("Failed to send message: {}", e)))
    }

    /// Reader task: dispatches responses to waiters, answers pings, drops
    /// events it has no use for
    async fn read_loop(
        mut stream: SplitStream<WsStream>,
        writer: Arc<Mutex<WsSink>>,
        pending: Arc<Mutex<PendingMap>>,
        is_active: Arc<AtomicBool>,
    ) {
        while is_active.load(Ordering::SeqCst) {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    Self::handle_message(&text, &pending).await;
                }
                Some(Ok(Message::Ping(data))) => {
                    let mut writer = writer.lock().await;
                    if let Err(e) = writer.send(Message::Pong(data)).await {
                        warn!("Failed to send pong: {}", e);
                    }
                }
                Some(Ok(Message::Close(_))) => {
                    debug!("WebSocket close frame received");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!("WebSocket read error: {}", e);
                    break;
                }
                None => {
                    debug!("WebSocket stream ended");
                    break;
                }
            }
        }

        is_active.store(false, Ordering::SeqCst);

        // Dropping the senders fails every in-flight command, which the
        // waiters surface as a connection reset.
        let mut pending = pending.lock().await;
        if !pending.is_empty() {
            warn!(
                "Connection closed with {} command(s) in flight",
                pending.len()
            );
        }
        pending.clear();
    }

    async fn handle_message(text: &str, pending: &Arc<Mutex<PendingMap>>) {
        if let Ok(response) = serde_json::from_str::<CdpRpcResponse>(text) {
            let mut pending = pending.lock().await;
            if let Some(command) = pending.remove(&response.id) {
                debug!("Response for {} ({})", command.method, response.id);
                let _ = command.sender.send(response);
            } else {
                warn!("Response for unknown command ID {}", response.id);
            }
            return;
        }

        if let Ok(event) = serde_json::from_str::<CdpNotification>(text) {
            debug!("Ignoring event {}", event.method);
            return;
        }

        warn!("Unparseable DevTools message: {}", text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screenshot_commands_get_the_long_timeout() {
        assert_eq!(
            timeout_for("Page.captureScreenshot"),
            Duration::from_secs(90)
        );
        assert_eq!(timeout_for("Page.navigate"), Duration::from_secs(60));
        assert_eq!(timeout_for("Runtime.evaluate"), Duration::from_secs(30));
    }
}
