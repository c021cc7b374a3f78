use anyhow::{Context, Result};
use smithay_client_toolkit::{output::OutputState, registry::RegistryState};
use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use std::os::fd::BorrowedFd;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use wayland_client::{
    Connection, EventQueue, QueueHandle,
    globals::{GlobalList, registry_queue_init},
    protocol::wl_output,
};

use super::backend::WaylandBackend;
use super::capabilities::{Capabilities, Capability};
use crate::daemon_core::DaemonCore;
use crate::log_and_continue;

/// How long one wait for compositor events may block before the exit flag is
/// checked again
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Dispatch state for the Wayland event queue
pub struct WallpaperDaemon {
    pub(super) registry_state: RegistryState,
    pub(super) output_state: OutputState,
    pub(super) globals: GlobalList,
    pub(super) core: DaemonCore<WaylandBackend>,
    /// Outputs announced before the required globals were bound
    pub(super) pending_outputs: Vec<wl_output::WlOutput>,
    pub(super) initialised: bool,
    warned_missing: bool,
}

impl WallpaperDaemon {
    /// Bind the compositor globals once all of them are advertised and hand
    /// them to the core. Called on every loop iteration until it succeeds.
    fn ensure_initialised(&mut self, conn: &Connection, qh: &QueueHandle<Self>) {
        if self.initialised {
            return;
        }

        let missing = Capabilities::scan(&self.globals).missing();
        if !missing.is_empty() {
            if !self.warned_missing {
                let names: Vec<_> = missing.iter().map(|cap| cap.interface()).collect();
                log::warn!(
                    "Compositor does not advertise {} yet, waiting",
                    names.join(", ")
                );
                self.warned_missing = true;
            }
            return;
        }

        let backend = match WaylandBackend::bind(&self.globals, qh, conn) {
            Ok(backend) => backend,
            Err(e) => {
                if !self.warned_missing {
                    log::warn!("Failed to bind compositor globals: {}", e);
                    self.warned_missing = true;
                }
                return;
            }
        };

        self.core.install_backend(backend);
        self.initialised = true;
        log::info!(
            "Bound {}, {} and {}",
            Capability::Compositor.interface(),
            Capability::SharedMemory.interface(),
            Capability::LayerShell.interface()
        );

        for output in std::mem::take(&mut self.pending_outputs) {
            log_and_continue!(self.core.on_output_added(output), "track output");
        }
    }
}

/// Connect to the compositor and run the event loop until `running` is
/// cleared or the connection fails.
pub fn run(core: DaemonCore<WaylandBackend>, running: Arc<AtomicBool>) -> Result<()> {
    log::info!("Connecting to Wayland compositor...");

    let conn = Connection::connect_to_env().context("Failed to connect to Wayland compositor")?;
    let (globals, mut event_queue) =
        registry_queue_init(&conn).context("Failed to read Wayland registry")?;
    let qh = event_queue.handle();

    let mut app_data = WallpaperDaemon {
        registry_state: RegistryState::new(&globals),
        output_state: OutputState::new(&globals, &qh),
        globals,
        core: core.clone(),
        pending_outputs: Vec::new(),
        initialised: false,
        warned_missing: false,
    };

    log::info!("Connected to Wayland compositor");

    // Initial roundtrip to get outputs
    event_queue
        .roundtrip(&mut app_data)
        .context("Initial Wayland roundtrip failed")?;
    log::info!(
        "Found {} output(s)",
        app_data.output_state.outputs().count()
    );

    let result = event_loop(&conn, &qh, &mut event_queue, &mut app_data, &running);

    core.shutdown();
    if let Err(e) = conn.flush() {
        log::debug!("Final flush failed: {}", e);
    }

    result
}

fn event_loop(
    conn: &Connection,
    qh: &QueueHandle<WallpaperDaemon>,
    event_queue: &mut EventQueue<WallpaperDaemon>,
    app_data: &mut WallpaperDaemon,
    running: &AtomicBool,
) -> Result<()> {
    while running.load(Ordering::Acquire) {
        app_data.ensure_initialised(conn, qh);

        event_queue
            .flush()
            .context("Wayland compositor disconnected")?;

        if let Some(guard) = event_queue.prepare_read() {
            if wait_readable(guard.connection_fd(), POLL_INTERVAL)? {
                guard
                    .read()
                    .context("Failed to read Wayland events")?;
            }
        }

        event_queue
            .dispatch_pending(app_data)
            .context("Failed to dispatch Wayland events")?;
    }

    log::info!("Exiting Wayland event loop");
    Ok(())
}

/// Block until `fd` is readable or `timeout` passes.
fn wait_readable(fd: BorrowedFd<'_>, timeout: Duration) -> Result<bool> {
    let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
    let timeout = PollTimeout::from(u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX));

    match poll(&mut fds, timeout) {
        Ok(ready) => Ok(ready > 0),
        Err(Errno::EINTR) => Ok(false),
        Err(e) => Err(e).context("Failed to poll Wayland connection"),
    }
}
