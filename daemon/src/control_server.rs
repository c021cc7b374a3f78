use anyhow::{Context, Result};
use common::{Command, ProtocolError, Response};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;

use crate::backend::Backend;
use crate::daemon_core::DaemonCore;
use crate::log_and_continue;

/// Longest request line read from a client
const MAX_REQUEST_BYTES: u64 = 4096;

/// Line-based control socket. One request per connection: the client sends
/// `SET <path>`, gets back `OK` or `ERROR: <message>`, and the connection is
/// closed.
pub struct ControlServer<B: Backend> {
    listener: UnixListener,
    socket_path: PathBuf,
    core: DaemonCore<B>,
}

impl<B: Backend> ControlServer<B> {
    pub fn bind(socket_path: impl Into<PathBuf>, core: DaemonCore<B>) -> Result<Self> {
        let socket_path = socket_path.into();

        // Remove old socket if it exists
        match std::fs::remove_file(&socket_path) {
            Ok(()) => log::info!("Removed stale socket {}", socket_path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!(
                "Could not remove old socket {}: {}",
                socket_path.display(),
                e
            ),
        }

        let listener = UnixListener::bind(&socket_path)
            .with_context(|| format!("Failed to bind {}", socket_path.display()))?;
        log::info!("Control server listening on: {}", socket_path.display());

        Ok(Self {
            listener,
            socket_path,
            core,
        })
    }

    #[cfg(test)]
    pub fn socket_path(&self) -> &std::path::Path {
        &self.socket_path
    }

    /// Accept clients one at a time until `shutdown` flips to true.
    pub async fn serve(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _addr)) => {
                        log_and_continue!(self.handle_client(stream).await, "handle control client");
                    }
                    Err(e) => log::error!("Error accepting connection: {}", e),
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        // Clean up socket
        if let Err(e) = std::fs::remove_file(&self.socket_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("Failed to remove {}: {}", self.socket_path.display(), e);
            }
        }
        log::info!("Control server stopped");
        Ok(())
    }

    async fn handle_client(&self, stream: UnixStream) -> Result<()> {
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader).take(MAX_REQUEST_BYTES);
        let mut raw = Vec::new();

        if reader.read_until(b'\n', &mut raw).await? == 0 {
            log::debug!("Client closed the connection without a request");
            return Ok(());
        }

        let response = match request_line(&raw) {
            Some(line) => {
                log::info!("Received: {}", line.trim_end());
                self.handle_request(line).await
            }
            None => {
                log::warn!("Rejected unreadable request ({} bytes)", raw.len());
                Response::from(ProtocolError::UnknownCommand)
            }
        };

        writer
            .write_all(format!("{}\n", response).as_bytes())
            .await?;
        writer.flush().await?;
        writer.shutdown().await?;
        Ok(())
    }

    async fn handle_request(&self, line: &str) -> Response {
        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(e) => {
                log::warn!("Rejected request {:?}: {}", line.trim_end(), e);
                return Response::from(e);
            }
        };

        match command {
            Command::Set { path } => {
                log::info!("Setting wallpaper to: {}", path);
                let core = self.core.clone();

                match tokio::task::spawn_blocking(move || core.set_image(&path)).await {
                    Ok(Ok(())) => Response::Ok,
                    Ok(Err(e)) => {
                        log::error!("Error setting wallpaper: {}", e);
                        Response::Error(e.to_string())
                    }
                    Err(e) => {
                        log::error!("Wallpaper task failed: {}", e);
                        Response::Error(format!("Internal error: {}", e))
                    }
                }
            }
        }
    }
}

/// The request text, or `None` when it is not UTF-8 or was cut off by the
/// size limit.
fn request_line(raw: &[u8]) -> Option<&str> {
    if raw.len() as u64 >= MAX_REQUEST_BYTES && !raw.ends_with(b"\n") {
        return None;
    }
    std::str::from_utf8(raw).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::SurfaceState;
    use crate::testing::{MockBackend, write_png};
    use std::path::Path;

    async fn request(socket: &Path, line: &str) -> String {
        request_bytes(socket, line.as_bytes()).await
    }

    async fn request_bytes(socket: &Path, bytes: &[u8]) -> String {
        let mut stream = UnixStream::connect(socket).await.unwrap();
        stream.write_all(bytes).await.unwrap();
        let mut reply = String::new();
        BufReader::new(stream).read_line(&mut reply).await.unwrap();
        reply
    }

    #[tokio::test]
    async fn test_set_over_socket() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("sw.sock");
        let image = dir.path().join("valid.png");
        write_png(&image, 8, 4, [200, 100, 50, 255]);

        let backend = MockBackend::default();
        let core = DaemonCore::new();
        core.install_backend(backend.clone());
        core.on_output_added(1).unwrap();
        core.on_configure(&1, 16, 8);
        backend.clear_commits();

        let server = ControlServer::bind(&socket, core.clone()).unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(server.serve(shutdown_rx));

        let ok = request(&socket, &format!("SET {}\n", image.display())).await;
        assert_eq!(ok, "OK\n");
        assert_eq!(core.image_dimensions(), Some((8, 4)));
        assert_eq!(backend.commits().len(), 1);
        assert_eq!(core.surface_state(&1), Some(SurfaceState::Configured));

        let missing = request(&socket, "SET /nonexistent/wall.png\n").await;
        assert!(missing.starts_with("ERROR: "), "{missing}");
        assert!(missing.ends_with('\n'));
        assert_eq!(core.image_dimensions(), Some((8, 4)));

        let unknown = request(&socket, "PING\n").await;
        assert_eq!(unknown, "ERROR: Unknown command\n");

        let bare = request(&socket, "SET   \n").await;
        assert_eq!(bare, "ERROR: Unknown command\n");

        let empty = request(&socket, "\n").await;
        assert_eq!(empty, "ERROR: Unknown command\n");

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
        assert!(!socket.exists());
    }

    #[tokio::test]
    async fn test_unreadable_requests_get_unknown_command() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("sw.sock");
        let image = dir.path().join("valid.png");
        write_png(&image, 4, 4, [1, 2, 3, 255]);

        let core = DaemonCore::<MockBackend>::new();
        let server = ControlServer::bind(&socket, core.clone()).unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(server.serve(shutdown_rx));

        let binary = request_bytes(&socket, b"SET /tmp/\xff\xfe.png\n").await;
        assert_eq!(binary, "ERROR: Unknown command\n");

        // A valid path padded past the limit must not be acted on truncated
        let padded = format!(
            "SET {}{}\n",
            image.display(),
            " ".repeat(MAX_REQUEST_BYTES as usize)
        );
        let long = request(&socket, &padded).await;
        assert_eq!(long, "ERROR: Unknown command\n");
        assert_eq!(core.image_dimensions(), None);

        let ok = request(&socket, &format!("SET {}\n", image.display())).await;
        assert_eq!(ok, "OK\n");

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[test]
    fn test_request_line_limits() {
        assert_eq!(request_line(b"SET /a.png\n"), Some("SET /a.png\n"));
        assert_eq!(request_line(b"SET /a.png"), Some("SET /a.png"));
        assert_eq!(request_line(b"SET \xff\n"), None);

        let cut = vec![b'a'; MAX_REQUEST_BYTES as usize];
        assert_eq!(request_line(&cut), None);
    }

    #[tokio::test]
    async fn test_bind_replaces_stale_socket() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("sw.sock");
        std::fs::write(&socket, b"left behind").unwrap();

        let server = ControlServer::bind(&socket, DaemonCore::<MockBackend>::new()).unwrap();
        assert_eq!(server.socket_path(), socket.as_path());
        UnixStream::connect(&socket).await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_failure() {
        let result = ControlServer::bind(
            "/nonexistent/dir/sw.sock",
            DaemonCore::<MockBackend>::new(),
        );
        assert!(result.is_err());
    }
}
