//! Relays one websocket connection to one PTY.
//!
//! The client speaks first: its initial resize message sizes the PTY, which
//! is only spawned once that message arrives. After that, binary messages are
//! shell input, text messages are control messages, and shell output goes
//! back as binary messages.

use std::io::Read;
use std::thread;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use termlink_session::{decode_control, ControlMessage, Geometry};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{accept_hdr_async_with_config, WebSocketStream};

use crate::pty::{PtyError, PtyHandle};

const READ_CHUNK: usize = 4096;
/// PTY output chunks in flight before the reader thread waits on the socket.
const OUTPUT_QUEUE: usize = 64;
const CLOSE_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Shell to run; `None` means `$SHELL` or `/bin/sh`.
    pub shell: Option<String>,
    /// Value of `TERM` in the shell's environment.
    pub term: String,
    /// How long to wait for the client's initial resize.
    pub handshake_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            shell: None,
            term: "xterm-256color".to_string(),
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("no initial resize within {0:?}")]
    HandshakeTimeout(Duration),
    #[error("bad handshake: {0}")]
    Handshake(String),
    #[error(transparent)]
    Pty(#[from] PtyError),
    #[error("websocket error: {0}")]
    WebSocket(#[from] WsError),
}

/// Complete the websocket upgrade for `stream`, refusing any path other than
/// `path` with 404.
pub async fn accept<S>(stream: S, path: &str, max_message_size: usize) -> Result<WebSocketStream<S>, BridgeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let check_path = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        if request.uri().path() == path {
            return Ok(response);
        }
        log::info!("refusing upgrade for {}", request.uri().path());
        let mut refusal = ErrorResponse::new(Some(format!("no session at {}", request.uri().path())));
        *refusal.status_mut() = StatusCode::NOT_FOUND;
        Err(refusal)
    };

    let config = WebSocketConfig {
        max_message_size: Some(max_message_size),
        ..WebSocketConfig::default()
    };
    Ok(accept_hdr_async_with_config(stream, check_path, Some(config)).await?)
}

/// Serve one session over an upgraded connection until either side ends it.
pub async fn serve_connection<S>(mut ws: WebSocketStream<S>, config: &BridgeConfig) -> Result<(), BridgeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let geometry = match tokio::time::timeout(config.handshake_timeout, initial_geometry(&mut ws)).await {
        Ok(Ok(Some(geometry))) => geometry,
        Ok(Ok(None)) => {
            log::debug!("client left before sending its geometry");
            return Ok(());
        }
        Ok(Err(err)) => {
            let _ = ws.close(None).await;
            return Err(err);
        }
        Err(_) => {
            let _ = ws.close(None).await;
            return Err(BridgeError::HandshakeTimeout(config.handshake_timeout));
        }
    };

    let mut pty = PtyHandle::spawn(config.shell.as_deref(), geometry, &config.term)?;
    log::info!("session started at {geometry}");

    let (output_tx, mut output_rx) = mpsc::channel(OUTPUT_QUEUE);
    if let Some(reader) = pty.take_reader() {
        start_output_thread(reader, output_tx)?;
    }

    let result = relay(&mut ws, &mut pty, &mut output_rx).await;

    finish_close(&mut ws).await;
    pty.kill();
    log::info!("session ended");
    result
}

/// Wait for the client's first message, which must be a resize.
/// `None` means the client went away first.
async fn initial_geometry<S>(ws: &mut WebSocketStream<S>) -> Result<Option<Geometry>, BridgeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(message) = ws.next().await {
        match message? {
            Message::Text(text) => {
                return match decode_control(text.as_bytes()) {
                    Ok(ControlMessage::Resize(geometry)) => Ok(Some(geometry)),
                    Err(err) => Err(BridgeError::Handshake(err.to_string())),
                };
            }
            Message::Binary(_) => {
                return Err(BridgeError::Handshake(
                    "terminal data arrived before the initial resize".to_string(),
                ));
            }
            Message::Close(_) => return Ok(None),
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
        }
    }
    Ok(None)
}

/// Send our close and give the client a moment to answer it.
async fn finish_close<S>(ws: &mut WebSocketStream<S>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if ws.close(None).await.is_err() {
        return;
    }
    let drain = async { while let Some(Ok(_)) = ws.next().await {} };
    let _ = tokio::time::timeout(CLOSE_GRACE, drain).await;
}

fn start_output_thread(
    mut reader: Box<dyn Read + Send>,
    output: mpsc::Sender<Vec<u8>>,
) -> Result<(), BridgeError> {
    thread::Builder::new()
        .name("termlink-pty-output".into())
        .spawn(move || {
            let mut buf = [0u8; READ_CHUNK];
            loop {
                let n = match reader.read(&mut buf) {
                    Ok(0) | Err(_) => return, // child exited
                    Ok(n) => n,
                };
                if output.blocking_send(buf[..n].to_vec()).is_err() {
                    return; // connection gone
                }
            }
        })
        .map(|_| ())
        .map_err(|err| BridgeError::Pty(PtyError::Io(err)))
}

async fn relay<S>(
    ws: &mut WebSocketStream<S>,
    pty: &mut PtyHandle,
    output: &mut mpsc::Receiver<Vec<u8>>,
) -> Result<(), BridgeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            chunk = output.recv() => match chunk {
                Some(bytes) => ws.send(Message::Binary(bytes)).await?,
                None => {
                    log::debug!("shell exited with {:?}", pty.try_wait());
                    return Ok(());
                }
            },
            message = ws.next() => match message {
                Some(Ok(Message::Binary(bytes))) => pty.write(&bytes)?,
                Some(Ok(Message::Text(text))) => match decode_control(text.as_bytes()) {
                    Ok(ControlMessage::Resize(geometry)) => {
                        log::debug!("resize to {geometry}");
                        pty.resize(geometry)?;
                    }
                    Err(err) => log::warn!("ignoring control message: {err}"),
                },
                Some(Ok(Message::Close(_))) | None => return Ok(()),
                Some(Ok(_)) => {}
                Some(Err(err)) => return Err(err.into()),
            },
        }
    }
}
