use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;

use crate::channel::SessionChannel;
use crate::error::TransportError;
use crate::transport::codec::FrameCodec;
use crate::transport::{drive, Frame};

pub(super) async fn run_tcp(
    addr: String,
    channel: SessionChannel,
    outbound: mpsc::UnboundedReceiver<Frame>,
) {
    let stream = match TcpStream::connect(&addr).await {
        Ok(stream) => stream,
        Err(err) => {
            channel.on_transport_error(TransportError::Connect {
                endpoint: format!("tcp://{addr}"),
                reason: err.to_string(),
            });
            return;
        }
    };
    // Keystrokes are tiny; don't let Nagle hold them back.
    let _ = stream.set_nodelay(true);
    log::info!("connected to tcp://{addr}");

    run_io(stream, channel, outbound).await;
}

pub(super) async fn run_io<T>(io: T, channel: SessionChannel, outbound: mpsc::UnboundedReceiver<Frame>)
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    let (sink, stream) = Framed::new(io, FrameCodec::default()).split();
    let sink = sink.sink_map_err(TransportError::from);
    let stream = stream.map(|item| item.map_err(TransportError::from));

    drive(sink, stream, channel, outbound).await;
}
