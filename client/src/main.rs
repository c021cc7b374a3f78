use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use common::{Command, Config, History, ProtocolError, Response};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

/// How long to wait for the daemon to answer
const TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "swctl")]
#[command(about = "Control the sw wallpaper daemon", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the config file
    #[arg(short, long, global = true, env = "SW_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set the wallpaper to an image file
    Set {
        /// Path to the image
        path: PathBuf,
    },

    /// Show the most recent wallpaper from history again
    Restore,
}

#[derive(Error, Debug)]
enum ClientError {
    #[error("Failed to connect to daemon at {path}. Is the daemon running? ({source})")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Daemon at {path} did not answer within {secs}s")]
    Timeout { path: PathBuf, secs: u64 },

    #[error("No response received from daemon")]
    NoResponse,

    #[error("Socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Daemon returned error: {0}")]
    Daemon(String),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;
    let socket_path = config.socket_path()?;

    match cli.command {
        Commands::Set { path } => {
            let path = std::fs::canonicalize(&path)
                .with_context(|| format!("Wallpaper not found: {}", path.display()))?;
            let path = path.to_string_lossy().into_owned();

            send(&socket_path, &Command::Set { path: path.clone() }).await?;

            let mut history = History::open(config.history_file()?, config.history.limit)?;
            history.append(path.clone())?;
            println!("Wallpaper set: {}", path);
        }

        Commands::Restore => {
            let history = History::open(config.history_file()?, config.history.limit)?;
            let path = history
                .last()
                .map(|entry| entry.path.clone())
                .context("Wallpaper history is empty")?;

            send(&socket_path, &Command::Set { path: path.clone() }).await?;
            println!("Wallpaper restored: {}", path);
        }
    }

    Ok(())
}

/// Send one command and wait for the daemon's answer.
async fn send(socket_path: &Path, command: &Command) -> Result<(), ClientError> {
    let exchange = async {
        let mut stream =
            UnixStream::connect(socket_path)
                .await
                .map_err(|source| ClientError::Connect {
                    path: socket_path.to_path_buf(),
                    source,
                })?;

        stream
            .write_all(format!("{}\n", command).as_bytes())
            .await?;

        let mut reply = String::new();
        stream.read_to_string(&mut reply).await?;

        if reply.trim().is_empty() {
            return Err(ClientError::NoResponse);
        }

        match Response::parse(reply.trim_end())? {
            Response::Ok => Ok(()),
            Response::Error(message) => Err(ClientError::Daemon(message)),
        }
    };

    tokio::time::timeout(TIMEOUT, exchange)
        .await
        .map_err(|_| ClientError::Timeout {
            path: socket_path.to_path_buf(),
            secs: TIMEOUT.as_secs(),
        })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::UnixListener;

    /// Answer a single connection with `reply`, returning the request line
    fn fake_daemon(listener: UnixListener, reply: &'static str) -> tokio::task::JoinHandle<String> {
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (reader, mut writer) = stream.into_split();
            let mut line = String::new();
            BufReader::new(reader).read_line(&mut line).await.unwrap();
            writer.write_all(reply.as_bytes()).await.unwrap();
            line
        })
    }

    fn set(path: &str) -> Command {
        Command::Set {
            path: path.to_string(),
        }
    }

    #[tokio::test]
    async fn test_send_ok() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("sw.sock");
        let daemon = fake_daemon(UnixListener::bind(&socket).unwrap(), "OK\n");

        send(&socket, &set("/walls/a.png")).await.unwrap();
        assert_eq!(daemon.await.unwrap(), "SET /walls/a.png\n");
    }

    #[tokio::test]
    async fn test_send_daemon_error() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("sw.sock");
        let _daemon = fake_daemon(
            UnixListener::bind(&socket).unwrap(),
            "ERROR: Failed to open image /walls/a.png\n",
        );

        let err = send(&socket, &set("/walls/a.png")).await.unwrap_err();
        assert!(
            matches!(err, ClientError::Daemon(ref msg) if msg == "Failed to open image /walls/a.png")
        );
    }

    #[tokio::test]
    async fn test_send_no_response() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("sw.sock");
        let _daemon = fake_daemon(UnixListener::bind(&socket).unwrap(), "");

        let err = send(&socket, &set("/walls/a.png")).await.unwrap_err();
        assert!(matches!(err, ClientError::NoResponse));
    }

    #[tokio::test]
    async fn test_send_without_daemon() {
        let dir = tempfile::tempdir().unwrap();
        let err = send(&dir.path().join("missing.sock"), &set("/walls/a.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Connect { .. }));
    }
}
