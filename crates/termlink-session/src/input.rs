//! User-input pump: moves keystrokes from the surface into the channel.
//!
//! Input readers block, so each session gets its own OS thread. The thread
//! owns the reader outright and only touches the channel to submit, which
//! never blocks.

use std::io::{self, Read};
use std::thread::{self, JoinHandle};

use crate::channel::{SessionChannel, SubmitOutcome};

const READ_CHUNK: usize = 4096;

/// Start pumping `reader` into `channel` on a dedicated thread.
pub(crate) fn start_input_pump(
    channel: SessionChannel,
    reader: Box<dyn Read + Send>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("termlink-input".into())
        .spawn(move || pump(channel, reader))
}

fn pump(channel: SessionChannel, mut reader: Box<dyn Read + Send>) {
    let mut buf = [0u8; READ_CHUNK];

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => {
                log::debug!("input stream ended");
                return;
            }
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                log::warn!("input stream failed: {err}");
                return;
            }
        };

        if channel.submit(buf[..n].to_vec()) == SubmitOutcome::Dropped && channel.state().is_terminal() {
            return;
        }
    }
}
