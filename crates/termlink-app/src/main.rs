mod client;
mod config;
mod server;
mod snapshot;
mod terminal;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use termlink_session::{Endpoint, Geometry};

use crate::config::Config;
use crate::snapshot::SnapshotOptions;

#[derive(Debug, Parser)]
#[command(name = "termlink", version, about = "Remote terminal sessions over a single connection")]
struct Cli {
    /// Config file; a missing file means defaults.
    #[arg(short, long, global = true, default_value = "termlink.toml")]
    config: PathBuf,

    /// Log filter, e.g. `debug` or `termlink_session=trace` (overrides RUST_LOG).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Attach the local terminal to a remote session.
    Connect {
        /// `ws://host:port/path` or `tcp://host:port`; defaults to `client.endpoint`.
        endpoint: Option<String>,
    },
    /// Run a session headlessly and print the resulting screen.
    Snapshot {
        endpoint: Option<String>,
        #[arg(long, default_value_t = 24)]
        rows: u16,
        #[arg(long, default_value_t = 80)]
        cols: u16,
        /// A line to type; repeatable.
        #[arg(short, long = "input")]
        input: Vec<String>,
        /// Milliseconds to wait for output before capturing.
        #[arg(long, default_value_t = 1000)]
        settle_ms: u64,
    },
    /// Serve sessions, one shell per connection.
    Serve {
        /// Address to listen on; defaults to `server.bind`.
        #[arg(long)]
        bind: Option<String>,
        /// Shell to run; defaults to `server.shell`, then `$SHELL`.
        #[arg(long)]
        shell: Option<String>,
    },
}

fn init_logging(cli: &Cli) {
    // Log lines would tear through a raw-mode session, so stay quiet there.
    let default = match cli.command {
        Command::Connect { .. } => "warn",
        _ => "info",
    };
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default));
    if let Some(filter) = &cli.log_level {
        builder.parse_filters(filter);
    }
    builder.init();
}

fn parse_endpoint(flag: Option<String>, config: &Config) -> anyhow::Result<Endpoint> {
    let raw = flag.unwrap_or_else(|| config.client.endpoint.clone());
    raw.parse().with_context(|| format!("bad endpoint {raw:?}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let mut config = Config::load(&cli.config)?;

    match cli.command {
        Command::Connect { endpoint } => {
            let endpoint = parse_endpoint(endpoint, &config)?;
            client::run(endpoint, config.client.channel_config()).await
        }
        Command::Snapshot {
            endpoint,
            rows,
            cols,
            input,
            settle_ms,
        } => {
            let geometry = Geometry::new(rows, cols);
            anyhow::ensure!(geometry.is_valid(), "--rows and --cols must be non-zero");

            let endpoint = parse_endpoint(endpoint, &config)?;
            let options = SnapshotOptions {
                geometry,
                input,
                settle: Duration::from_millis(settle_ms),
            };
            let screen = snapshot::run(endpoint, config.client.channel_config(), options).await?;
            println!("{screen}");
            Ok(())
        }
        Command::Serve { bind, shell } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if shell.is_some() {
                config.server.shell = shell;
            }
            server::run(config.server).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_snapshot_flags() {
        let cli = Cli::parse_from([
            "termlink",
            "snapshot",
            "tcp://127.0.0.1:9000",
            "--rows",
            "30",
            "-i",
            "ls",
            "-i",
            "pwd",
        ]);
        match cli.command {
            Command::Snapshot {
                endpoint,
                rows,
                cols,
                input,
                ..
            } => {
                assert_eq!(endpoint.as_deref(), Some("tcp://127.0.0.1:9000"));
                assert_eq!((rows, cols), (30, 80));
                assert_eq!(input, vec!["ls", "pwd"]);
            }
            other => panic!("parsed {other:?}"),
        }
    }

    #[test]
    fn test_endpoint_falls_back_to_config() {
        let config = Config::default();
        let endpoint = parse_endpoint(None, &config).unwrap();
        assert_eq!(endpoint.to_string(), "ws://127.0.0.1:8080/session");

        assert!(parse_endpoint(Some("http://example.com".into()), &config).is_err());
    }
}
