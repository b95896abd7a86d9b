//! `termlink connect`: an interactive session on the local terminal.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use termlink_session::{
    shared, ChannelConfig, Endpoint, ResizeCoordinator, Session, SessionState, TransportError,
};

use crate::terminal::{LocalTerminalFit, RawModeGuard, StdioSurface};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

pub async fn run(endpoint: Endpoint, config: ChannelConfig) -> anyhow::Result<()> {
    let raw_mode = RawModeGuard::enable().context("failed to put the terminal in raw mode")?;

    let session = Session::start(endpoint, config, shared(StdioSurface::new()), Box::new(LocalTerminalFit))
        .context("failed to start session")?;
    let layout = tokio::spawn(watch_layout(session.coordinator()));

    let state = session.wait().await;
    layout.abort();
    drop(raw_mode);

    let stats = session.stats();
    log::debug!(
        "sent {} frames, received {} bytes, evicted {}",
        stats.transmitted,
        stats.inbound_bytes,
        stats.evicted
    );
    outcome(state, session.failure())
}

/// Turn how the session ended into the command's result.
fn outcome(state: SessionState, failure: Option<TransportError>) -> anyhow::Result<()> {
    match (state, failure) {
        (SessionState::Failed, Some(err)) => Err(anyhow::anyhow!("disconnected: {err}")),
        (SessionState::Failed, None) => Err(anyhow::anyhow!("disconnected")),
        _ => {
            eprintln!("[termlink] connection closed");
            Ok(())
        }
    }
}

fn resize(coordinator: &ResizeCoordinator) {
    if let Err(err) = coordinator.on_layout_event() {
        log::warn!("resize failed: {err}");
    }
}

#[cfg(unix)]
async fn watch_layout(coordinator: Arc<ResizeCoordinator>) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut winch = match signal(SignalKind::window_change()) {
        Ok(winch) => winch,
        Err(err) => {
            log::warn!("no SIGWINCH ({err}), polling the window size instead");
            return poll_layout(coordinator).await;
        }
    };
    while winch.recv().await.is_some() {
        resize(&coordinator);
    }
}

#[cfg(not(unix))]
async fn watch_layout(coordinator: Arc<ResizeCoordinator>) {
    poll_layout(coordinator).await
}

async fn poll_layout(coordinator: Arc<ResizeCoordinator>) {
    let mut last = crossterm::terminal::size().ok();
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    loop {
        ticker.tick().await;
        let now = crossterm::terminal::size().ok();
        if now.is_some() && now != last {
            last = now;
            resize(&coordinator);
        }
    }
}
