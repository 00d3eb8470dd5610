//! Signaling module
//!
//! Request/response channel to the signaling server and the typed
//! `start` / `poll` / `terminate` calls made over it.

mod client;
mod error;
mod messages;

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

pub use client::JsonRpcClient;
pub use error::RpcError;
pub use messages::{
    MediaConstraints, PollResult, RpcErrorObject, RpcRequest, RpcResponse, SessionParams,
    StartParams, StartResult, METHOD_POLL, METHOD_START, METHOD_TERMINATE,
};

/// Request/response transport to the signaling server
pub trait SignalingChannel: Send + Sync {
    /// Invoke `method` with JSON `params` and return the JSON result
    fn request<'a>(&'a self, method: &'a str, params: Value)
        -> BoxFuture<'a, Result<Value, RpcError>>;
}

/// Typed signaling server calls
#[derive(Clone)]
pub struct SignalingApi {
    channel: Arc<dyn SignalingChannel>,
}

impl SignalingApi {
    pub fn new(channel: Arc<dyn SignalingChannel>) -> Self {
        Self { channel }
    }

    /// Offer the local description and get the session id and answer
    pub async fn start(&self, params: StartParams) -> Result<StartResult, RpcError> {
        self.call(METHOD_START, &params).await
    }

    /// Fetch the queued session events
    pub async fn poll(&self, session_id: &str) -> Result<PollResult, RpcError> {
        let params = SessionParams {
            session_id: session_id.to_string(),
        };
        self.call(METHOD_POLL, &params).await
    }

    /// Notify the server that the session ended; the result is not inspected
    pub async fn terminate(&self, session_id: &str) -> Result<(), RpcError> {
        let params = SessionParams {
            session_id: session_id.to_string(),
        };
        let params = to_params(&params)?;
        self.channel.request(METHOD_TERMINATE, params).await?;
        Ok(())
    }

    async fn call<P, R>(&self, method: &str, params: &P) -> Result<R, RpcError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let params = to_params(params)?;
        let result = self.channel.request(method, params).await?;
        serde_json::from_value(result)
            .map_err(|e| RpcError::InvalidResponse(format!("{} result: {}", method, e)))
    }
}

fn to_params<P: Serialize>(params: &P) -> Result<Value, RpcError> {
    serde_json::to_value(params).map_err(|e| RpcError::Transport(format!("Serialize failed: {}", e)))
}
