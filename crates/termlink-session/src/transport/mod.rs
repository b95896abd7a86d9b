//! Transports carrying a session between the local channel and the remote PTY.
//!
//! A transport task connects, reports readiness to the [`SessionChannel`],
//! then runs two halves until the session ends:
//!
//! - a writer task draining the channel's outbound queue onto the connection,
//! - a read loop feeding inbound frames and connection events back into the
//!   channel.
//!
//! Every state change goes through the channel; transports never decide the
//! session state themselves.

pub mod codec;
mod stream;
mod ws;

use std::fmt;
use std::str::FromStr;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use url::Url;

use crate::channel::SessionChannel;
use crate::error::TransportError;

/// Path the remote endpoint serves sessions on when the URL names none.
pub const DEFAULT_SESSION_PATH: &str = "/session";

/// One unit on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Raw terminal bytes (keystrokes outbound, PTY output inbound).
    Data(Vec<u8>),
    /// An encoded control message.
    Control(Vec<u8>),
    /// Orderly shutdown of the connection.
    Close,
}

/// Sending half of the outbound queue. Owned by the session channel only.
pub(crate) type Link = mpsc::UnboundedSender<Frame>;

/// Where the remote session lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `ws://host:port/path`: raw bytes as binary messages, control
    /// messages as text messages.
    WebSocket(Url),
    /// `tcp://host:port`: tagged frames on a plain byte stream.
    Tcp(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EndpointError {
    #[error("invalid endpoint {endpoint:?}: {reason}")]
    Invalid { endpoint: String, reason: String },
    #[error("unsupported endpoint scheme {0:?} (expected ws or tcp)")]
    UnsupportedScheme(String),
    #[error("endpoint {0:?} needs an explicit host and port")]
    MissingAddress(String),
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut url = Url::parse(s).map_err(|e| EndpointError::Invalid {
            endpoint: s.to_string(),
            reason: e.to_string(),
        })?;

        match url.scheme() {
            "ws" => {
                if url.path().is_empty() || url.path() == "/" {
                    url.set_path(DEFAULT_SESSION_PATH);
                }
                Ok(Endpoint::WebSocket(url))
            }
            "tcp" => match (url.host_str(), url.port()) {
                (Some(host), Some(port)) => Ok(Endpoint::Tcp(format!("{host}:{port}"))),
                _ => Err(EndpointError::MissingAddress(s.to_string())),
            },
            other => Err(EndpointError::UnsupportedScheme(other.to_string())),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::WebSocket(url) => write!(f, "{url}"),
            Endpoint::Tcp(addr) => write!(f, "tcp://{addr}"),
        }
    }
}

/// Connect to `endpoint` and run the session over it.
pub(crate) async fn run(
    endpoint: Endpoint,
    channel: SessionChannel,
    outbound: mpsc::UnboundedReceiver<Frame>,
) {
    match endpoint {
        Endpoint::WebSocket(url) => ws::run(url, channel, outbound).await,
        Endpoint::Tcp(addr) => stream::run_tcp(addr, channel, outbound).await,
    }
}

/// Run the session over an already-established byte stream.
pub(crate) async fn run_io<T>(io: T, channel: SessionChannel, outbound: mpsc::UnboundedReceiver<Frame>)
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    stream::run_io(io, channel, outbound).await
}

/// Drive an established connection until the session reaches a terminal state.
async fn drive<Si, St>(
    mut sink: Si,
    mut stream: St,
    channel: SessionChannel,
    mut outbound: mpsc::UnboundedReceiver<Frame>,
) where
    Si: Sink<Frame, Error = TransportError> + Unpin + Send + 'static,
    St: Stream<Item = Result<Frame, TransportError>> + Unpin,
{
    if !channel.on_ready() {
        // Closed while the handshake was still in progress.
        let _ = sink.close().await;
        return;
    }

    let writer_channel = channel.clone();
    let mut writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            let closing = matches!(frame, Frame::Close);
            if let Err(err) = sink.send(frame).await {
                writer_channel.on_transport_error(err);
                return;
            }
            if closing {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let mut writer_done = false;
    loop {
        tokio::select! {
            inbound = stream.next() => match inbound {
                Some(Ok(Frame::Data(bytes))) => channel.on_inbound_data(&bytes),
                Some(Ok(Frame::Control(bytes))) => {
                    log::debug!("ignoring {}-byte control message from peer", bytes.len());
                }
                Some(Ok(Frame::Close)) => channel.on_remote_close(),
                Some(Err(err)) => {
                    channel.on_transport_error(err);
                    break;
                }
                None => {
                    channel.on_closed();
                    break;
                }
            },
            _ = &mut writer, if !writer_done => {
                writer_done = true;
                if channel.state().is_terminal() {
                    break;
                }
            }
        }
    }

    if !writer_done {
        writer.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_websocket_endpoint() {
        let endpoint: Endpoint = "ws://127.0.0.1:8080/term".parse().unwrap();
        assert_eq!(endpoint.to_string(), "ws://127.0.0.1:8080/term");
    }

    #[test]
    fn test_websocket_endpoint_defaults_path() {
        let endpoint: Endpoint = "ws://localhost:8080".parse().unwrap();
        assert_eq!(endpoint.to_string(), "ws://localhost:8080/session");
    }

    #[test]
    fn test_parse_tcp_endpoint() {
        let endpoint: Endpoint = "tcp://127.0.0.1:9000".parse().unwrap();
        assert_eq!(endpoint, Endpoint::Tcp("127.0.0.1:9000".to_string()));
    }

    #[test]
    fn test_tcp_endpoint_needs_port() {
        assert!(matches!(
            "tcp://127.0.0.1".parse::<Endpoint>(),
            Err(EndpointError::MissingAddress(_))
        ));
    }

    #[test]
    fn test_rejects_other_schemes() {
        assert!(matches!(
            "wss://example.com/session".parse::<Endpoint>(),
            Err(EndpointError::UnsupportedScheme(scheme)) if scheme == "wss"
        ));
        assert!(matches!(
            "not a url".parse::<Endpoint>(),
            Err(EndpointError::Invalid { .. })
        ));
    }
}
