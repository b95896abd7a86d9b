use std::io::{self, Read, Write};

use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};
use termlink_session::Geometry;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PtyError {
    #[error("PTY spawn failed: {0}")]
    SpawnFailed(String),
    #[error("PTY I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("PTY resize failed: {0}")]
    ResizeFailed(String),
}

/// Owns a PTY child process and the master side of its terminal.
///
/// The child is killed when the handle is dropped.
pub struct PtyHandle {
    master: Box<dyn MasterPty + Send>,
    reader: Option<Box<dyn Read + Send>>,
    writer: Box<dyn Write + Send>,
    child: Box<dyn Child + Send + Sync>,
}

fn pty_size(geometry: Geometry) -> PtySize {
    PtySize {
        rows: geometry.rows,
        cols: geometry.cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

impl PtyHandle {
    /// Spawn `shell` (or the user's default shell) on a PTY of `geometry`,
    /// with `TERM` set to `term`.
    pub fn spawn(shell: Option<&str>, geometry: Geometry, term: &str) -> Result<Self, PtyError> {
        let pair = native_pty_system()
            .openpty(pty_size(geometry))
            .map_err(|e| PtyError::SpawnFailed(format!("failed to open PTY: {e}")))?;

        let mut cmd = CommandBuilder::new(shell.map_or_else(default_shell, str::to_string));
        cmd.env("TERM", term);

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| PtyError::SpawnFailed(format!("failed to spawn command: {e}")))?;

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| PtyError::SpawnFailed(format!("failed to clone reader: {e}")))?;

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| PtyError::SpawnFailed(format!("failed to take writer: {e}")))?;

        log::debug!("spawned PTY child {:?} at {geometry}", child.process_id());

        Ok(Self {
            master: pair.master,
            reader: Some(reader),
            writer,
            child,
        })
    }

    pub fn resize(&self, geometry: Geometry) -> Result<(), PtyError> {
        self.master
            .resize(pty_size(geometry))
            .map_err(|e| PtyError::ResizeFailed(e.to_string()))
    }

    /// Write client input to the shell.
    pub fn write(&mut self, data: &[u8]) -> Result<(), PtyError> {
        self.writer.write_all(data)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Hand out the shell output stream for a dedicated reader thread.
    /// Yields `Some` once.
    pub fn take_reader(&mut self) -> Option<Box<dyn Read + Send>> {
        self.reader.take()
    }

    /// Exit code of the child, if it has exited.
    pub fn try_wait(&mut self) -> Option<u32> {
        match self.child.try_wait() {
            Ok(Some(status)) => Some(status.exit_code()),
            _ => None,
        }
    }

    pub fn is_alive(&mut self) -> bool {
        self.try_wait().is_none()
    }

    pub fn kill(&mut self) {
        if self.is_alive() {
            if let Err(err) = self.child.kill() {
                log::warn!("failed to kill PTY child: {err}");
            }
        }
    }
}

impl Drop for PtyHandle {
    fn drop(&mut self) {
        self.kill();
    }
}

/// `$SHELL`, falling back to `/bin/sh`.
pub fn default_shell() -> String {
    std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::{Duration, Instant};

    /// Read from `reader` on a helper thread until `needle` shows up or 3s pass.
    fn read_until(reader: Box<dyn Read + Send>, needle: &'static str) -> String {
        let (tx, rx) = std::sync::mpsc::channel();
        thread::spawn(move || {
            let mut reader = reader;
            let mut buf = [0u8; 4096];
            while let Ok(n) = reader.read(&mut buf) {
                if n == 0 || tx.send(buf[..n].to_vec()).is_err() {
                    return;
                }
            }
        });

        let deadline = Instant::now() + Duration::from_secs(3);
        let mut output = Vec::new();
        while Instant::now() < deadline {
            if let Ok(chunk) = rx.recv_timeout(Duration::from_millis(100)) {
                output.extend_from_slice(&chunk);
                if String::from_utf8_lossy(&output).contains(needle) {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&output).into_owned()
    }

    #[test]
    fn test_spawn_pty() {
        let handle = PtyHandle::spawn(Some("/bin/sh"), Geometry::new(24, 80), "xterm-256color");
        assert!(handle.is_ok(), "Failed to spawn PTY: {:?}", handle.err());
        assert!(handle.unwrap().is_alive());
    }

    #[test]
    fn test_write_read_echo() {
        let mut handle = PtyHandle::spawn(Some("/bin/sh"), Geometry::new(24, 80), "xterm-256color").unwrap();
        let reader = handle.take_reader().unwrap();
        assert!(handle.take_reader().is_none());

        handle.write(b"echo TERMLINK_$((40 + 2))\n").unwrap();

        let text = read_until(reader, "TERMLINK_42");
        assert!(text.contains("TERMLINK_42"), "got: {text}");
    }

    #[test]
    fn test_term_is_exported() {
        let mut handle = PtyHandle::spawn(Some("/bin/sh"), Geometry::new(24, 80), "vt100").unwrap();
        let reader = handle.take_reader().unwrap();

        handle.write(b"echo \"term=$TERM.\"\n").unwrap();

        let text = read_until(reader, "term=vt100.");
        assert!(text.contains("term=vt100."), "got: {text}");
    }

    #[test]
    fn test_resize_is_visible_to_child() {
        let mut handle = PtyHandle::spawn(Some("/bin/sh"), Geometry::new(24, 80), "xterm-256color").unwrap();
        let reader = handle.take_reader().unwrap();

        handle.resize(Geometry::new(40, 120)).unwrap();
        handle.write(b"stty size\n").unwrap();

        let text = read_until(reader, "40 120");
        assert!(text.contains("40 120"), "got: {text}");
    }

    #[test]
    fn test_child_exit() {
        let mut handle = PtyHandle::spawn(Some("/bin/sh"), Geometry::new(24, 80), "xterm-256color").unwrap();
        let mut reader = handle.take_reader().unwrap();
        handle.write(b"exit 3\n").unwrap();

        // The reader sees EOF (or EIO) once the child is gone.
        let drain = thread::spawn(move || {
            let mut buf = [0u8; 4096];
            while let Ok(n) = reader.read(&mut buf) {
                if n == 0 {
                    return;
                }
            }
        });
        let _ = drain.join();

        let deadline = Instant::now() + Duration::from_secs(3);
        while handle.try_wait().is_none() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(50));
        }
        assert_eq!(handle.try_wait(), Some(3));
    }

    #[test]
    fn test_drop_kills_child() {
        let mut handle = PtyHandle::spawn(Some("/bin/sh"), Geometry::new(24, 80), "xterm-256color").unwrap();
        let mut reader = handle.take_reader().unwrap();
        drop(handle);

        let done = thread::spawn(move || {
            let mut buf = [0u8; 4096];
            while let Ok(n) = reader.read(&mut buf) {
                if n == 0 {
                    return;
                }
            }
        });
        assert!(done.join().is_ok());
    }

    #[test]
    fn test_default_shell_is_absolute() {
        let shell = default_shell();
        assert!(shell.starts_with('/'), "got: {shell}");
    }
}
