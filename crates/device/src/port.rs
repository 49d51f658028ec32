// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The serial port abstraction monitor sessions read through.
//!
//! No teacher analogue exists for physical serial I/O, so this trait is
//! shaped the way `anvil_adapters::toolchain::ProcessRunner` is: the real
//! implementation is a thin wrapper over OS facilities, and a `fake` module
//! lets the coordinator's leasing and preemption logic be exercised without
//! a physical board attached.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PortError {
    #[error("failed to open {port}: {message}")]
    Open { port: String, message: String },
    #[error("{port} closed unexpectedly")]
    Closed { port: String },
    #[error("I/O error on {port}: {source}")]
    Io { port: String, source: std::io::Error },
}

/// One open handle to a physical serial port. Lines arrive newline
/// delimited; `read_line` returns `Ok(None)` on a clean EOF (the device
/// layer treats that the same as [`PortError::Closed`] for reconnection
/// purposes, see `coordinator::reconnect_loop`).
#[async_trait]
pub trait SerialPort: Send {
    async fn read_line(&mut self) -> Result<Option<String>, PortError>;
    async fn write_line(&mut self, line: &str) -> Result<(), PortError>;
    fn name(&self) -> &str;
}

/// Opens named ports on demand. The coordinator holds one factory and asks
/// it for a fresh [`SerialPort`] each time a port is (re)opened — after a
/// deploy preemption closes and reopens the shared handle, for instance.
pub trait SerialPortFactory: Send + Sync {
    fn open(&self, port: &str) -> Result<Box<dyn SerialPort>, PortError>;
}

/// Opens real hardware ports through `tokio-serial`. One factory per
/// daemon instance; `default_baud` covers ports the caller never set an
/// explicit rate for (the wire protocol's own default, spec §6).
pub struct TokioSerialPortFactory {
    default_baud: u32,
    bauds: parking_lot::Mutex<std::collections::HashMap<String, u32>>,
}

impl TokioSerialPortFactory {
    pub fn new(default_baud: u32) -> Self {
        Self { default_baud, bauds: parking_lot::Mutex::new(std::collections::HashMap::new()) }
    }

    /// Record the baud rate a monitor session requested for `port`, read
    /// back the next time [`SerialPortFactory::open`] (re)opens it — the
    /// coordinator's single-handle-per-port model has no room for a baud
    /// parameter on `open` itself, since a deploy's reopen after
    /// preemption has no baud of its own to pass.
    pub fn set_baud(&self, port: &str, baud: u32) {
        self.bauds.lock().insert(port.to_string(), baud);
    }
}

impl Default for TokioSerialPortFactory {
    fn default() -> Self {
        Self::new(9600)
    }
}

pub struct TokioSerialPortImpl {
    name: String,
    lines: tokio::io::Lines<tokio::io::BufReader<tokio::io::ReadHalf<tokio_serial::SerialStream>>>,
    writer: tokio::io::WriteHalf<tokio_serial::SerialStream>,
}

impl SerialPortFactory for TokioSerialPortFactory {
    fn open(&self, port: &str) -> Result<Box<dyn SerialPort>, PortError> {
        use tokio::io::AsyncBufReadExt as _;
        use tokio_serial::SerialPortBuilderExt;

        let baud = self.bauds.lock().get(port).copied().unwrap_or(self.default_baud);
        let stream = tokio_serial::new(port, baud)
            .open_native_async()
            .map_err(|source| PortError::Open { port: port.to_string(), message: source.to_string() })?;
        let (reader, writer) = tokio::io::split(stream);
        Ok(Box::new(TokioSerialPortImpl {
            name: port.to_string(),
            lines: tokio::io::BufReader::new(reader).lines(),
            writer,
        }))
    }
}

#[async_trait]
impl SerialPort for TokioSerialPortImpl {
    async fn read_line(&mut self) -> Result<Option<String>, PortError> {
        self.lines.next_line().await.map_err(|source| PortError::Io { port: self.name.clone(), source })
    }

    async fn write_line(&mut self, line: &str) -> Result<(), PortError> {
        use tokio::io::AsyncWriteExt as _;
        let mut payload = line.as_bytes().to_vec();
        payload.push(b'\n');
        self.writer
            .write_all(&payload)
            .await
            .map_err(|source| PortError::Io { port: self.name.clone(), source })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Enumerate ports currently visible to the OS, for `/api/devices/list`.
/// Never fails outright — an enumeration error is reported as an empty
/// list, matching the spec's "best-effort" framing for device discovery.
pub fn list_available_ports() -> Vec<(String, Option<String>)> {
    tokio_serial::available_ports()
        .map(|ports| {
            ports
                .into_iter()
                .map(|p| {
                    let description = match p.port_type {
                        tokio_serial::SerialPortType::UsbPort(info) => {
                            Some([info.manufacturer, info.product].into_iter().flatten().collect::<Vec<_>>().join(" "))
                        }
                        _ => None,
                    };
                    (p.port_name, description.filter(|s| !s.is_empty()))
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::collections::HashMap;
    use std::sync::Arc;

    /// A scripted port: `feed_line` queues data the coordinator's reader
    /// will observe; `written_lines` records every line the coordinator
    /// wrote back (upload handshakes, reset commands).
    pub struct FakePort {
        name: String,
        inbox: Arc<Mutex<VecDeque<String>>>,
        outbox: Arc<Mutex<Vec<String>>>,
        closed: Arc<Mutex<bool>>,
    }

    impl FakePort {
        pub fn written_lines(&self) -> Vec<String> {
            self.outbox.lock().clone()
        }
    }

    #[async_trait]
    impl SerialPort for FakePort {
        async fn read_line(&mut self) -> Result<Option<String>, PortError> {
            if *self.closed.lock() {
                return Ok(None);
            }
            Ok(self.inbox.lock().pop_front())
        }

        async fn write_line(&mut self, line: &str) -> Result<(), PortError> {
            if *self.closed.lock() {
                return Err(PortError::Closed { port: self.name.clone() });
            }
            self.outbox.lock().push(line.to_string());
            Ok(())
        }

        fn name(&self) -> &str {
            &self.name
        }
    }

    /// Shared handle used by tests to feed data into a [`FakePort`] that a
    /// [`FakePortFactory`] will hand out, and to inspect what was written.
    #[derive(Clone)]
    pub struct FakePortHandle {
        inbox: Arc<Mutex<VecDeque<String>>>,
        outbox: Arc<Mutex<Vec<String>>>,
        closed: Arc<Mutex<bool>>,
    }

    impl FakePortHandle {
        pub fn feed_line(&self, line: impl Into<String>) {
            self.inbox.lock().push_back(line.into());
        }

        pub fn written_lines(&self) -> Vec<String> {
            self.outbox.lock().clone()
        }

        pub fn close(&self) {
            *self.closed.lock() = true;
        }
    }

    #[derive(Default)]
    pub struct FakePortFactory {
        ports: Mutex<HashMap<String, FakePortHandle>>,
    }

    impl FakePortFactory {
        pub fn new() -> Self {
            Self::default()
        }

        /// Register (or fetch) the handle backing `port`, creating fresh
        /// shared buffers the first time it's asked for.
        pub fn handle(&self, port: &str) -> FakePortHandle {
            self.ports
                .lock()
                .entry(port.to_string())
                .or_insert_with(|| FakePortHandle {
                    inbox: Arc::new(Mutex::new(VecDeque::new())),
                    outbox: Arc::new(Mutex::new(Vec::new())),
                    closed: Arc::new(Mutex::new(false)),
                })
                .clone()
        }
    }

    impl SerialPortFactory for FakePortFactory {
        fn open(&self, port: &str) -> Result<Box<dyn SerialPort>, PortError> {
            let handle = self.handle(port);
            Ok(Box::new(FakePort {
                name: port.to_string(),
                inbox: handle.inbox,
                outbox: handle.outbox,
                closed: handle.closed,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakePortFactory;
    use super::*;

    #[tokio::test]
    async fn fed_lines_are_read_in_order() {
        let factory = FakePortFactory::new();
        let handle = factory.handle("/dev/ttyUSB0");
        handle.feed_line("booting");
        handle.feed_line("ready");

        let mut port = factory.open("/dev/ttyUSB0").unwrap();
        assert_eq!(port.read_line().await.unwrap(), Some("booting".to_string()));
        assert_eq!(port.read_line().await.unwrap(), Some("ready".to_string()));
        assert_eq!(port.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn writes_are_recorded_and_visible_through_the_handle() {
        let factory = FakePortFactory::new();
        let mut port = factory.open("/dev/ttyACM0").unwrap();
        port.write_line("AT+RESET").await.unwrap();

        assert_eq!(factory.handle("/dev/ttyACM0").written_lines(), vec!["AT+RESET".to_string()]);
    }

    #[tokio::test]
    async fn closed_port_reads_as_eof_and_rejects_writes() {
        let factory = FakePortFactory::new();
        let handle = factory.handle("/dev/ttyUSB0");
        handle.close();
        let mut port = factory.open("/dev/ttyUSB0").unwrap();

        assert_eq!(port.read_line().await.unwrap(), None);
        assert!(port.write_line("hello").await.is_err());
    }
}
