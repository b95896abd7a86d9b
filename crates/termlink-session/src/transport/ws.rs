use futures_util::future;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use url::Url;

use crate::channel::SessionChannel;
use crate::error::TransportError;
use crate::transport::{drive, Frame};

pub(super) async fn run(url: Url, channel: SessionChannel, outbound: mpsc::UnboundedReceiver<Frame>) {
    let socket = match connect_async(url.as_str()).await {
        Ok((socket, _response)) => socket,
        Err(err) => {
            channel.on_transport_error(TransportError::Connect {
                endpoint: url.to_string(),
                reason: err.to_string(),
            });
            return;
        }
    };
    log::info!("connected to {url}");

    let (sink, stream) = socket.split();
    let sink = sink
        .sink_map_err(transport_error)
        .with(|frame: Frame| future::ready(Ok::<_, TransportError>(into_message(frame))));
    let stream = stream.filter_map(|message| {
        future::ready(match message {
            Ok(message) => from_message(message).map(Ok),
            Err(err) => Some(Err(transport_error(err))),
        })
    });

    drive(sink, stream, channel, outbound).await;
}

/// Raw bytes travel as binary messages; control messages as text.
pub(crate) fn into_message(frame: Frame) -> Message {
    match frame {
        Frame::Data(bytes) => Message::Binary(bytes),
        Frame::Control(bytes) => Message::Text(String::from_utf8_lossy(&bytes).into_owned()),
        Frame::Close => Message::Close(None),
    }
}

/// Map an inbound websocket message to a frame. Pings and pongs are answered
/// by tungstenite itself and never surface.
pub(crate) fn from_message(message: Message) -> Option<Frame> {
    match message {
        Message::Binary(bytes) => Some(Frame::Data(bytes)),
        // Some endpoints stream PTY output as text frames.
        Message::Text(text) => Some(Frame::Data(text.into_bytes())),
        Message::Close(_) => Some(Frame::Close),
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => None,
    }
}

fn transport_error(err: WsError) -> TransportError {
    match err {
        WsError::Io(err) => TransportError::from(err),
        WsError::Protocol(err) => TransportError::Protocol(err.to_string()),
        other => TransportError::Reset(other.to_string()),
    }
}
