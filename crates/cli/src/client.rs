// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thin HTTP/WebSocket client over the daemon's wire surface (spec §4.2,
//! §6). One method per route, following the teacher's `DaemonClient`
//! shape — a method per endpoint rather than a generic `call(route, body)`
//! — scaled down to the six request kinds and the read-only queries this
//! system actually has.

use anvil_core::RequestId;
use anvil_wire::{
    BuildParams, DeployParams, DeviceInfo, InstallDependenciesParams, LockInfo, MonitorParams,
    Response, StatusEvent, SubmitAck, TerminalResponse,
};
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::bootstrap::DaemonHandle;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("daemon returned malformed JSON: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("daemon reported an error ({kind:?}): {message}")]
    Daemon { kind: anvil_core::ErrorKind, message: String },
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("stream closed before a terminal frame arrived")]
    StreamClosed,
}

pub struct DaemonClient {
    http: reqwest::Client,
    base_url: String,
}

impl DaemonClient {
    pub fn new(handle: &DaemonHandle) -> Self {
        Self { http: reqwest::Client::new(), base_url: handle.base_url.clone() }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn unwrap_response(resp: reqwest::Response) -> Result<serde_json::Value, ClientError> {
        let body: Response = resp.json().await?;
        match body {
            Response::Ok { value } => Ok(value),
            Response::Error { kind, message } => Err(ClientError::Daemon { kind, message }),
        }
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &impl serde::Serialize,
    ) -> Result<T, ClientError> {
        let resp = self.http.post(self.url(path)).json(body).send().await?;
        let value = Self::unwrap_response(resp).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let resp = self.http.get(self.url(path)).send().await?;
        let value = Self::unwrap_response(resp).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn submit_build(
        &self,
        environment: String,
        profile: Option<String>,
        parallelism: Option<anvil_wire::request::ParallelismWire>,
    ) -> Result<SubmitAck, ClientError> {
        self.post_json(
            "/api/build",
            &BuildParams { environment, profile, parallelism, caller_pid: std::process::id() },
        )
        .await
    }

    pub async fn submit_deploy(&self, environment: String, port: Option<String>) -> Result<SubmitAck, ClientError> {
        self.post_json("/api/deploy", &DeployParams { environment, port, caller_pid: std::process::id() }).await
    }

    pub async fn submit_monitor(&self, port: String, baud: u32) -> Result<SubmitAck, ClientError> {
        self.post_json("/api/monitor", &MonitorParams { port, baud, caller_pid: std::process::id() }).await
    }

    pub async fn submit_install_deps(&self, environment: String) -> Result<TerminalResponse, ClientError> {
        self.post_json(
            "/api/install-deps",
            &InstallDependenciesParams { environment, caller_pid: std::process::id() },
        )
        .await
    }

    pub async fn cancel(&self, id: RequestId) -> Result<(), ClientError> {
        let resp = self.http.post(self.url(&format!("/api/requests/{id}/cancel"))).send().await?;
        Self::unwrap_response(resp).await?;
        Ok(())
    }

    pub async fn list_devices(&self) -> Result<Vec<DeviceInfo>, ClientError> {
        self.get_json("/api/devices/list").await
    }

    pub async fn locks_status(&self) -> Result<Vec<LockInfo>, ClientError> {
        let resp = self.http.post(self.url("/api/locks/status")).send().await?;
        let value = Self::unwrap_response(resp).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn daemon_status(&self) -> Result<anvil_wire::query::DaemonStatus, ClientError> {
        self.get_json("/api/daemon/status").await
    }

    pub async fn shutdown(&self) -> Result<(), ClientError> {
        let resp = self.http.post(self.url("/api/daemon/shutdown")).send().await?;
        Self::unwrap_response(resp).await?;
        Ok(())
    }

    /// Opens the streaming status socket for a submitted request and hands
    /// each decoded frame to `on_event` as it arrives, returning once a
    /// `Terminal` frame is observed (or the socket closes early).
    pub async fn drive_status_stream(
        &self,
        ack: &SubmitAck,
        mut on_event: impl FnMut(StatusEvent),
    ) -> Result<StatusEvent, ClientError> {
        let ws_url = format!("{}{}", self.base_url.replacen("http", "ws", 1), ack.stream_url);
        let (mut socket, _) = tokio_tungstenite::connect_async(ws_url).await?;
        while let Some(frame) = socket.next().await {
            let frame = frame?;
            let WsMessage::Text(text) = frame else { continue };
            let event: StatusEvent = serde_json::from_str(&text)?;
            let terminal = event.is_terminal();
            on_event(event.clone());
            if terminal {
                return Ok(event);
            }
        }
        Err(ClientError::StreamClosed)
    }

    /// Opens the bidirectional monitor socket, yielding decoded server
    /// messages to `on_message`. The caller drives writes by sending on the
    /// returned sink half; this only owns the receive loop since the
    /// interactive REPL in `output` needs to interleave stdin reads with it.
    pub async fn open_monitor_socket(
        &self,
        request_id: RequestId,
    ) -> Result<
        (
            futures_util::stream::SplitSink<
                tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
                WsMessage,
            >,
            futures_util::stream::SplitStream<
                tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
            >,
        ),
        ClientError,
    > {
        let ws_url = format!("{}/api/monitor/{}", self.base_url.replacen("http", "ws", 1), request_id);
        let (socket, _) = tokio_tungstenite::connect_async(ws_url).await?;
        Ok(socket.split())
    }
}
