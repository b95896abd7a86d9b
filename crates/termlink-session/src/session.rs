//! A single remote terminal session: one channel, one coordinator, one
//! transport task.

use std::io;
use std::sync::Arc;
use std::thread;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::channel::{ChannelConfig, ChannelStats, SessionChannel, SessionState};
use crate::coordinator::{ResizeCoordinator, ResizeError};
use crate::error::TransportError;
use crate::geometry::Geometry;
use crate::input::start_input_pump;
use crate::surface::{lock_surface, FitCalculator, SharedSurface};
use crate::transport::{self, Endpoint, Frame};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("cannot compute initial terminal geometry: {0}")]
    InitialLayout(#[from] ResizeError),
    #[error("sessions must be started from within a tokio runtime")]
    NoRuntime,
    #[error("failed to start input thread: {0}")]
    InputPump(#[source] io::Error),
}

/// A running session.
///
/// Dropping the session requests an orderly close.
pub struct Session {
    channel: SessionChannel,
    coordinator: Arc<ResizeCoordinator>,
    transport: JoinHandle<()>,
    input: Option<thread::JoinHandle<()>>,
}

impl Session {
    /// Connect to `endpoint` and start relaying between it and `surface`.
    ///
    /// The initial geometry is computed and queued before the connection is
    /// attempted, so it is the first message the remote side sees.
    pub fn start(
        endpoint: Endpoint,
        config: ChannelConfig,
        surface: SharedSurface,
        fit: Box<dyn FitCalculator>,
    ) -> Result<Self, SessionError> {
        log::info!("starting session with {endpoint}");
        Self::launch(config, surface, fit, move |channel, outbound| {
            transport::run(endpoint, channel, outbound)
        })
    }

    /// Run a session over an already-connected byte stream using tagged framing.
    pub fn start_with_io<T>(
        io: T,
        config: ChannelConfig,
        surface: SharedSurface,
        fit: Box<dyn FitCalculator>,
    ) -> Result<Self, SessionError>
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::launch(config, surface, fit, move |channel, outbound| {
            transport::run_io(io, channel, outbound)
        })
    }

    fn launch<F, Fut>(
        config: ChannelConfig,
        surface: SharedSurface,
        fit: Box<dyn FitCalculator>,
        connect: F,
    ) -> Result<Self, SessionError>
    where
        F: FnOnce(SessionChannel, mpsc::UnboundedReceiver<Frame>) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let runtime = Handle::try_current().map_err(|_| SessionError::NoRuntime)?;

        let (channel, outbound) = SessionChannel::new(config, surface.clone());
        let coordinator = Arc::new(ResizeCoordinator::new(fit, surface.clone(), channel.clone()));

        let initial = coordinator.on_layout_event()?;
        log::debug!("initial geometry {initial}");

        let reader = lock_surface(&surface).take_raw_input();
        let input = match reader {
            Some(reader) => Some(start_input_pump(channel.clone(), reader).map_err(SessionError::InputPump)?),
            None => None,
        };

        let transport = runtime.spawn(connect(channel.clone(), outbound));

        Ok(Self {
            channel,
            coordinator,
            transport,
            input,
        })
    }

    pub fn channel(&self) -> &SessionChannel {
        &self.channel
    }

    /// Shared handle to the resize coordinator, for layout event sources that
    /// live on other tasks or threads.
    pub fn coordinator(&self) -> Arc<ResizeCoordinator> {
        Arc::clone(&self.coordinator)
    }

    pub fn state(&self) -> SessionState {
        self.channel.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.channel.subscribe()
    }

    /// Forward a layout change to the coordinator.
    pub fn on_layout_event(&self) -> Result<Geometry, ResizeError> {
        self.coordinator.on_layout_event()
    }

    /// Request an orderly close. Idempotent.
    pub fn close(&self) {
        self.channel.close();
    }

    /// Wait for the session to end. Returns `Closed` or `Failed`.
    pub async fn wait(&self) -> SessionState {
        self.channel.terminated().await
    }

    pub fn failure(&self) -> Option<TransportError> {
        self.channel.failure()
    }

    pub fn stats(&self) -> ChannelStats {
        self.channel.stats()
    }

    /// Whether the input thread has stopped (input stream ended or failed).
    pub fn input_finished(&self) -> bool {
        self.input.as_ref().map_or(true, |handle| handle.is_finished())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.channel.close();
        if self.channel.state().is_terminal() {
            self.transport.abort();
        }
    }
}
