// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `anvil` — the client for the `anvild` build coordinator.
//!
//! Argument parsing itself is deliberately thin: one subcommand per
//! request kind plus the read-only queries, with no aliasing or
//! convenience sugar layered on top.

mod bootstrap;
mod client;
mod env;
mod exit_error;
mod output;

use anvil_core::RequestStatus;
use anvil_wire::request::ParallelismWire;
use clap::{Parser, Subcommand};
use exit_error::ExitError;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "anvil",
    version = concat!(env!("CARGO_PKG_VERSION"), "+", env!("BUILD_GIT_HASH")),
    about = "Embedded build coordinator client"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile an environment.
    Build {
        environment: String,
        #[arg(long)]
        profile: Option<String>,
        #[arg(long)]
        jobs: Option<usize>,
        #[arg(long)]
        serial: bool,
    },
    /// Build and upload to a device.
    Deploy {
        environment: String,
        #[arg(long)]
        port: Option<String>,
    },
    /// Attach a serial monitor session.
    Monitor {
        port: String,
        #[arg(long, default_value_t = 9600)]
        baud: u32,
    },
    /// Fetch and verify required packages without compiling.
    InstallDeps { environment: String },
    /// Report whether a daemon is running and its basic status.
    Status,
    /// List known serial devices and their lease state.
    Devices,
    /// List held locks and their owners.
    Locks,
    /// Stop the running daemon.
    Shutdown,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    match run(cli.command).await {
        Ok(()) => std::process::exit(0),
        Err(err) => {
            eprintln!("anvil: {err}");
            std::process::exit(err.code);
        }
    }
}

async fn run(command: Command) -> Result<(), ExitError> {
    match command {
        Command::Build { environment, profile, jobs, serial } => {
            let parallelism = parallelism_from_flags(serial, jobs);
            run_streamed(|c| Box::pin(c.submit_build(environment.clone(), profile.clone(), parallelism.clone())))
                .await
        }
        Command::Deploy { environment, port } => {
            run_streamed(|c| Box::pin(c.submit_deploy(environment.clone(), port.clone()))).await
        }
        Command::Monitor { port, baud } => run_monitor(port, baud).await,
        Command::InstallDeps { environment } => run_install_deps(environment).await,
        Command::Status => run_status().await,
        Command::Devices => run_devices().await,
        Command::Locks => run_locks().await,
        Command::Shutdown => run_shutdown().await,
    }
}

fn parallelism_from_flags(serial: bool, jobs: Option<usize>) -> Option<ParallelismWire> {
    if serial {
        Some(ParallelismWire::Serial)
    } else {
        jobs.map(|n| ParallelismWire::Custom { n })
    }
}

/// Shared path for `build`/`deploy`: submit, then drive the status stream
/// to a terminal frame and translate it into a process exit code.
async fn run_streamed<'a, F>(submit: F) -> Result<(), ExitError>
where
    F: for<'c> FnOnce(
        &'c client::DaemonClient,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<anvil_wire::SubmitAck, client::ClientError>> + 'c>>,
{
    let handle = bootstrap::connect_or_start().await.map_err(|e| ExitError::failure(e.to_string()))?;
    let client = client::DaemonClient::new(&handle);
    let ack = submit(&client).await.map_err(|e| ExitError::failure(e.to_string()))?;

    let mut renderer = output::StreamRenderer::new();
    let terminal = client
        .drive_status_stream(&ack, |event| renderer.handle(&event))
        .await
        .map_err(|e| ExitError::failure(e.to_string()))?;

    terminal_to_result(terminal)
}

fn terminal_to_result(event: anvil_wire::StatusEvent) -> Result<(), ExitError> {
    match event {
        anvil_wire::StatusEvent::Terminal { status, exit_code, message } => {
            if status == RequestStatus::Succeeded {
                Ok(())
            } else {
                Err(ExitError::new(exit_code, message.unwrap_or_else(|| status.to_string())))
            }
        }
        _ => Err(ExitError::failure("stream ended without a terminal frame")),
    }
}

async fn run_install_deps(environment: String) -> Result<(), ExitError> {
    let handle = bootstrap::connect_or_start().await.map_err(|e| ExitError::failure(e.to_string()))?;
    let client = client::DaemonClient::new(&handle);
    let response = client.submit_install_deps(environment).await.map_err(|e| ExitError::failure(e.to_string()))?;
    if response.status == RequestStatus::Succeeded {
        Ok(())
    } else {
        Err(ExitError::new(response.exit_code, response.message.unwrap_or_else(|| response.status.to_string())))
    }
}

async fn run_monitor(port: String, baud: u32) -> Result<(), ExitError> {
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    let handle = bootstrap::connect_or_start().await.map_err(|e| ExitError::failure(e.to_string()))?;
    let client = client::DaemonClient::new(&handle);
    let ack = client.submit_monitor(port, baud).await.map_err(|e| ExitError::failure(e.to_string()))?;
    let request_id = ack.request_id;

    let (mut sink, mut stream) =
        client.open_monitor_socket(request_id).await.map_err(|e| ExitError::failure(e.to_string()))?;
    let attach = serde_json::to_string(&anvil_wire::MonitorClientMessage::Attach).unwrap_or_default();
    sink.send(WsMessage::Text(attach.into())).await.map_err(|e| ExitError::failure(e.to_string()))?;

    while let Some(frame) = stream.next().await {
        let frame = frame.map_err(|e| ExitError::failure(e.to_string()))?;
        let WsMessage::Text(text) = frame else { continue };
        let Ok(msg) = serde_json::from_str::<anvil_wire::MonitorServerMessage>(&text) else { continue };
        match msg {
            anvil_wire::MonitorServerMessage::Attached { ok: true, .. } => {}
            anvil_wire::MonitorServerMessage::Attached { ok: false, error } => {
                return Err(ExitError::failure(error.unwrap_or_else(|| "attach failed".into())));
            }
            anvil_wire::MonitorServerMessage::Data { lines } => {
                for line in lines {
                    println!("{}", line.text);
                }
            }
            anvil_wire::MonitorServerMessage::Preempted => println!("-- preempted by a deploy --"),
            anvil_wire::MonitorServerMessage::Reconnected => println!("-- reconnected --"),
            anvil_wire::MonitorServerMessage::Error { message } => eprintln!("monitor error: {message}"),
            anvil_wire::MonitorServerMessage::WriteAck | anvil_wire::MonitorServerMessage::Pong => {}
        }
    }
    Ok(())
}

async fn run_status() -> Result<(), ExitError> {
    match bootstrap::probe().await {
        None => {
            println!("status: not running");
            Ok(())
        }
        Some(handle) => {
            let client = client::DaemonClient::new(&handle);
            let status = client.daemon_status().await.map_err(|e| ExitError::failure(e.to_string()))?;
            println!(
                "status: running\npid: {}\nactive requests: {}\nuptime: {}ms",
                status.pid, status.active_requests, status.uptime_ms
            );
            Ok(())
        }
    }
}

async fn run_devices() -> Result<(), ExitError> {
    let Some(handle) = bootstrap::probe().await else {
        println!("status: not running");
        return Ok(());
    };
    let client = client::DaemonClient::new(&handle);
    let devices = client.list_devices().await.map_err(|e| ExitError::failure(e.to_string()))?;
    if devices.is_empty() {
        println!("no serial devices detected");
    }
    for device in devices {
        let desc = device.description.as_deref().unwrap_or("-");
        match device.leased_by {
            Some(pid) => println!("{}  {}  leased by pid {}", device.port, desc, pid),
            None => println!("{}  {}  free", device.port, desc),
        }
    }
    Ok(())
}

async fn run_locks() -> Result<(), ExitError> {
    let Some(handle) = bootstrap::probe().await else {
        println!("status: not running");
        return Ok(());
    };
    let client = client::DaemonClient::new(&handle);
    let locks = client.locks_status().await.map_err(|e| ExitError::failure(e.to_string()))?;
    if locks.is_empty() {
        println!("no locks held");
    }
    for lock in locks {
        println!("{}  owner pid {}  lease {}  age {}ms", lock.name, lock.owner_pid, lock.lease_id, lock.age_ms);
    }
    Ok(())
}

async fn run_shutdown() -> Result<(), ExitError> {
    let Some(handle) = bootstrap::probe().await else {
        println!("daemon not running");
        return Ok(());
    };
    let client = client::DaemonClient::new(&handle);
    client.shutdown().await.map_err(|e| ExitError::failure(e.to_string()))?;
    println!("shutdown requested");
    Ok(())
}
