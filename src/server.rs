//! WebSocket progress channel.
//!
//! Clients send `{"type": "<command>"}` frames to start jobs and receive
//! every event of jobs they started as JSON text frames.

use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tungstenite::{Message, WebSocket};

use crate::tasks::{parse_command, JobController, JobEvent};

/// How long a socket read blocks before pending job events are flushed.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct ProgressServer {
    listener: TcpListener,
    jobs: Arc<JobController>,
}

impl ProgressServer {
    pub fn bind(addr: impl ToSocketAddrs, jobs: Arc<JobController>) -> Result<Self> {
        let listener = TcpListener::bind(addr).context("Failed to bind progress server")?;
        Ok(Self { listener, jobs })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections forever, one thread each.
    pub fn run(self) -> Result<()> {
        tracing::info!(addr = %self.local_addr()?, "Progress server listening");

        for stream in self.listener.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to accept connection");
                    continue;
                }
            };
            let peer = stream
                .peer_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "unknown".to_string());
            let jobs = self.jobs.clone();

            let spawned = thread::Builder::new()
                .name(format!("ws-{}", peer))
                .spawn(move || {
                    if let Err(e) = handle_connection(stream, &jobs) {
                        tracing::warn!(%peer, error = %e, "Connection ended with error");
                    }
                });
            if let Err(e) = spawned {
                tracing::error!(error = %e, "Failed to spawn connection thread");
            }
        }
        Ok(())
    }
}

fn handle_connection(stream: TcpStream, jobs: &JobController) -> Result<()> {
    let mut socket = tungstenite::accept(stream).map_err(|e| anyhow::anyhow!("handshake failed: {}", e))?;
    socket.get_ref().set_read_timeout(Some(POLL_INTERVAL))?;
    tracing::info!("Client connected");

    let (tx, rx) = mpsc::channel::<JobEvent>();
    loop {
        match socket.read() {
            Ok(Message::Text(text)) => handle_command(&mut socket, jobs, &tx, text.as_str())?,
            Ok(Message::Binary(_)) => {
                send_event(&mut socket, &JobEvent::error("binary frames are not supported"))?
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(tungstenite::Error::Io(e))
                if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => break,
            Err(e) => return Err(e.into()),
        }

        for event in rx.try_iter() {
            send_event(&mut socket, &event)?;
        }
    }

    tracing::info!("Client disconnected");
    Ok(())
}

fn handle_command(
    socket: &mut WebSocket<TcpStream>,
    jobs: &JobController,
    tx: &mpsc::Sender<JobEvent>,
    text: &str,
) -> Result<()> {
    let kind = match parse_command(text) {
        Ok(kind) => kind,
        Err(e) => {
            tracing::debug!(error = %e, "Rejected command frame");
            return send_event(socket, &JobEvent::error(e.to_string()));
        }
    };

    match jobs.start(kind, tx.clone()) {
        Ok(_handle) => {
            tracing::info!(job = kind.command(), "Job started");
            Ok(())
        }
        Err(e) => send_event(socket, &JobEvent::error(e.to_string())),
    }
}

fn send_event(socket: &mut WebSocket<TcpStream>, event: &JobEvent) -> Result<()> {
    let json = serde_json::to_string(event)?;
    socket.send(Message::text(json))?;
    Ok(())
}
