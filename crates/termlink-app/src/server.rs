//! `termlink serve`: a websocket endpoint giving each connection its own PTY.

use std::sync::Arc;

use anyhow::Context;
use termlink_pty::{accept, serve_connection};
use tokio::net::TcpListener;

use crate::config::ServerConfig;

pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    log::info!("listening on ws://{}{}", listener.local_addr()?, config.path);

    tokio::select! {
        result = serve(listener, config) => result,
        _ = tokio::signal::ctrl_c() => {
            log::info!("shutting down");
            Ok(())
        }
    }
}

/// Accept connections on `listener` forever.
pub async fn serve(listener: TcpListener, config: ServerConfig) -> anyhow::Result<()> {
    let bridge = Arc::new(config.bridge_config());
    let path: Arc<str> = config.path.into();
    let max_message_size = config.max_message_size;

    loop {
        let (stream, peer) = listener.accept().await.context("accept failed")?;
        let _ = stream.set_nodelay(true);

        let bridge = Arc::clone(&bridge);
        let path = Arc::clone(&path);
        tokio::spawn(async move {
            let ws = match accept(stream, &path, max_message_size).await {
                Ok(ws) => ws,
                Err(err) => {
                    log::debug!("{peer}: upgrade refused: {err}");
                    return;
                }
            };
            log::info!("{peer} connected");
            match serve_connection(ws, &bridge).await {
                Ok(()) => log::info!("{peer} disconnected"),
                Err(err) => log::warn!("{peer}: {err}"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use termlink_session::{ChannelConfig, FixedFit, Geometry, Session, SessionState};
    use termlink_vt::VtSurface;

    use super::*;

    async fn start_server(config: ServerConfig) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let path = config.path.clone();
        tokio::spawn(serve(listener, config));
        format!("ws://{addr}{path}")
    }

    async fn screen_containing(surface: &Mutex<VtSurface>, needle: &str) -> String {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let text = surface.lock().unwrap().terminal().screen().text();
            if text.contains(needle) || tokio::time::Instant::now() > deadline {
                return text;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_configured_shell_and_term() {
        let url = start_server(ServerConfig {
            path: "/term".to_string(),
            shell: Some("/bin/sh".to_string()),
            term: "vt100".to_string(),
            ..ServerConfig::default()
        })
        .await;

        let surface = Arc::new(Mutex::new(VtSurface::new(Geometry::new(24, 80))));
        let keys = surface.lock().unwrap().input();
        let session = Session::start(
            url.parse().unwrap(),
            ChannelConfig::default(),
            surface.clone(),
            Box::new(FixedFit(Geometry::new(24, 80))),
        )
        .unwrap();

        keys.send("echo \"T=$TERM.\"\r");
        let text = screen_containing(&surface, "T=vt100.").await;
        assert!(text.contains("T=vt100."), "screen:\n{text}");
        assert_eq!(session.state(), SessionState::Open);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_each_connection_gets_its_own_shell() {
        let url = start_server(ServerConfig {
            shell: Some("/bin/sh".to_string()),
            ..ServerConfig::default()
        })
        .await;

        let mut sessions = Vec::new();
        for marker in ["ONE", "TWO"] {
            let surface = Arc::new(Mutex::new(VtSurface::new(Geometry::new(24, 80))));
            let keys = surface.lock().unwrap().input();
            let session = Session::start(
                url.parse().unwrap(),
                ChannelConfig::default(),
                surface.clone(),
                Box::new(FixedFit(Geometry::new(24, 80))),
            )
            .unwrap();
            keys.send(format!("M={marker}; echo \"mark:$M:$$\"\r"));
            sessions.push((session, surface, marker));
        }

        let mut pids = Vec::new();
        for (_session, surface, marker) in &sessions {
            let needle = format!("mark:{marker}:");
            let text = screen_containing(surface, &needle).await;
            let line = text
                .lines()
                .find(|line| line.starts_with(&needle))
                .unwrap_or_else(|| panic!("no {needle} in:\n{text}"));
            pids.push(line[needle.len()..].to_string());
        }
        assert_ne!(pids[0], pids[1]);
    }
}
