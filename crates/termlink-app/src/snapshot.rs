//! `termlink snapshot`: run a session headlessly and capture the screen.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Context;
use termlink_session::{ChannelConfig, Endpoint, FixedFit, Geometry, Session, SessionState};
use termlink_vt::VtSurface;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct SnapshotOptions {
    pub geometry: Geometry,
    /// Lines to type, each followed by a carriage return.
    pub input: Vec<String>,
    /// How long to let the remote side settle before capturing.
    pub settle: Duration,
}

/// Connect, type the scripted input, wait for output to settle and return
/// the rendered screen.
pub async fn run(endpoint: Endpoint, config: ChannelConfig, options: SnapshotOptions) -> anyhow::Result<String> {
    let surface = Arc::new(Mutex::new(VtSurface::new(options.geometry)));
    let keys = lock(&surface).input();

    let session = Session::start(endpoint, config, surface.clone(), Box::new(FixedFit(options.geometry)))
        .context("failed to start session")?;

    for line in &options.input {
        keys.send(format!("{line}\r"));
    }

    let ended = tokio::time::timeout(options.settle, session.wait()).await.ok();
    if ended == Some(SessionState::Failed) {
        let reason = session.failure().map(|err| err.to_string()).unwrap_or_default();
        anyhow::bail!("session failed: {reason}");
    }

    if ended.is_none() {
        session.close();
        if tokio::time::timeout(CLOSE_TIMEOUT, session.wait()).await.is_err() {
            log::warn!("remote side did not finish closing");
        }
    }

    let screen = lock(&surface).terminal().screen().text();
    Ok(screen)
}

fn lock(surface: &Mutex<VtSurface>) -> std::sync::MutexGuard<'_, VtSurface> {
    surface.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use termlink_pty::{accept, serve_connection, BridgeConfig};
    use tokio::net::TcpListener;

    async fn spawn_sh_server() -> Endpoint {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = accept(stream, "/session", 64 * 1024).await.unwrap();
            let config = BridgeConfig {
                shell: Some("/bin/sh".to_string()),
                ..BridgeConfig::default()
            };
            let _ = serve_connection(ws, &config).await;
        });
        format!("ws://{addr}/session").parse().unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_snapshot_captures_command_output() {
        let endpoint = spawn_sh_server().await;

        let screen = run(
            endpoint,
            ChannelConfig::default(),
            SnapshotOptions {
                geometry: Geometry::new(10, 40),
                input: vec!["echo SNAP_$((6 * 7))".to_string()],
                settle: Duration::from_millis(1500),
            },
        )
        .await
        .unwrap();

        assert!(screen.contains("SNAP_42"), "screen:\n{screen}");
    }

    #[tokio::test]
    async fn test_snapshot_of_unreachable_endpoint_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = run(
            format!("ws://{addr}/session").parse().unwrap(),
            ChannelConfig::default(),
            SnapshotOptions {
                geometry: Geometry::new(24, 80),
                input: Vec::new(),
                settle: Duration::from_secs(5),
            },
        )
        .await;

        let err = result.unwrap_err();
        assert!(err.to_string().starts_with("session failed"), "got: {err}");
    }
}
