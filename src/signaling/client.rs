//! JSON-RPC signaling client over WebSocket
//!
//! Requests are written as JSON-RPC 2.0 text frames and responses are
//! matched back to their callers by id, so several requests may be pending.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, trace, warn};

use super::error::RpcError;
use super::messages::{RpcRequest, RpcResponse};
use super::SignalingChannel;

type ResponseSender = oneshot::Sender<Result<Value, RpcError>>;
type PendingRequests = Arc<Mutex<PendingTable>>;

/// Requests waiting for their response
///
/// Once closed, no request can be registered anymore.
#[derive(Default)]
struct PendingTable {
    waiting: HashMap<u64, ResponseSender>,
    closed: bool,
}

impl PendingTable {
    fn register(&mut self, id: u64, tx: ResponseSender) -> Result<(), RpcError> {
        if self.closed {
            return Err(RpcError::Closed);
        }
        self.waiting.insert(id, tx);
        Ok(())
    }

    fn take(&mut self, id: u64) -> Option<ResponseSender> {
        self.waiting.remove(&id)
    }

    /// Mark the connection gone and hand back whoever is still waiting
    fn close(&mut self) -> Vec<ResponseSender> {
        self.closed = true;
        self.waiting.drain().map(|(_, tx)| tx).collect()
    }

    fn len(&self) -> usize {
        self.waiting.len()
    }
}

/// Signaling channel speaking JSON-RPC over a WebSocket connection
pub struct JsonRpcClient {
    endpoint: String,
    outgoing: mpsc::UnboundedSender<Message>,
    pending: PendingRequests,
    next_id: AtomicU64,
    reader_handle: JoinHandle<()>,
    writer_handle: JoinHandle<()>,
}

impl JsonRpcClient {
    /// Connect to the signaling server
    pub async fn connect(endpoint: &str) -> Result<Self, RpcError> {
        let (ws_stream, _) = connect_async(endpoint)
            .await
            .map_err(|e| RpcError::Transport(format!("Connect failed: {}", e)))?;

        debug!("Connected to signaling server: {}", endpoint);

        let (mut write, mut read) = ws_stream.split();
        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<Message>();
        let pending: PendingRequests = Arc::new(Mutex::new(PendingTable::default()));

        let writer_handle = tokio::spawn(async move {
            while let Some(msg) = outgoing_rx.recv().await {
                if let Err(e) = write.send(msg).await {
                    warn!("Signaling send failed: {}", e);
                    break;
                }
            }
            let _ = write.close().await;
        });

        let reader_pending = pending.clone();
        let reader_handle = tokio::spawn(async move {
            while let Some(msg) = read.next().await {
                match msg {
                    Ok(Message::Text(text)) => dispatch_response(&reader_pending, &text),
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        warn!("Signaling receive failed: {}", e);
                        break;
                    }
                }
            }

            // Fail whatever is still waiting
            let waiting = reader_pending.lock().close();
            for tx in waiting {
                let _ = tx.send(Err(RpcError::Closed));
            }
            debug!("Signaling connection closed");
        });

        Ok(Self {
            endpoint: endpoint.to_string(),
            outgoing,
            pending,
            next_id: AtomicU64::new(1),
            reader_handle,
            writer_handle,
        })
    }

    /// URL of the signaling server
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Number of requests waiting for a response
    pub fn pending_requests(&self) -> usize {
        self.pending.lock().len()
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest::new(id, method, params);
        let json = serde_json::to_string(&request)
            .map_err(|e| RpcError::Transport(format!("Serialize failed: {}", e)))?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().register(id, tx)?;

        trace!("-> {} #{}", method, id);
        if self.outgoing.send(Message::Text(json)).is_err() {
            self.pending.lock().take(id);
            return Err(RpcError::Closed);
        }

        rx.await.map_err(|_| RpcError::Closed)?
    }
}

impl SignalingChannel for JsonRpcClient {
    fn request<'a>(
        &'a self,
        method: &'a str,
        params: Value,
    ) -> BoxFuture<'a, Result<Value, RpcError>> {
        Box::pin(self.call(method, params))
    }
}

impl Drop for JsonRpcClient {
    fn drop(&mut self) {
        self.reader_handle.abort();
        self.writer_handle.abort();
    }
}

/// Route a response frame to the request waiting for it
fn dispatch_response(pending: &PendingRequests, text: &str) {
    let response: RpcResponse = match serde_json::from_str(text) {
        Ok(response) => response,
        Err(e) => {
            warn!("Invalid signaling response: {}", e);
            return;
        }
    };

    let Some(id) = response.id else {
        warn!("Signaling response without id ignored");
        return;
    };

    match pending.lock().take(id) {
        Some(tx) => {
            trace!("<- #{}", id);
            let _ = tx.send(response.into_result());
        }
        None => debug!("Response for unknown request #{}", id),
    }
}
