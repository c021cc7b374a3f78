use smithay_client_toolkit::{
    compositor::CompositorState,
    shell::{
        WaylandSurface,
        wlr_layer::{Anchor, KeyboardInteractivity, Layer, LayerShell, LayerSurface},
    },
};
use wayland_client::{
    Connection, QueueHandle,
    globals::{BindError, GlobalList},
    protocol::{wl_output, wl_shm},
};

use super::WallpaperDaemon;
use crate::backend::Backend;
use crate::buffer::ShmBuffer;
use crate::error::AllocationError;

const LAYER_NAMESPACE: &str = "sw";

/// The bound compositor globals needed to put wallpapers on screen.
pub struct WaylandBackend {
    conn: Connection,
    qh: QueueHandle<WallpaperDaemon>,
    compositor_state: CompositorState,
    layer_shell: LayerShell,
    shm: wl_shm::WlShm,
}

impl WaylandBackend {
    pub(super) fn bind(
        globals: &GlobalList,
        qh: &QueueHandle<WallpaperDaemon>,
        conn: &Connection,
    ) -> Result<Self, BindError> {
        Ok(Self {
            conn: conn.clone(),
            qh: qh.clone(),
            compositor_state: CompositorState::bind(globals, qh)?,
            layer_shell: LayerShell::bind(globals, qh)?,
            shm: globals.bind(qh, 1..=1, ())?,
        })
    }

    fn flush(&self) {
        if let Err(e) = self.conn.flush() {
            log::warn!("Failed to flush Wayland connection: {}", e);
        }
    }
}

impl Backend for WaylandBackend {
    type Output = wl_output::WlOutput;
    type Surface = LayerSurface;
    type Memory = ShmBuffer;

    fn create_surface(&self, output: &wl_output::WlOutput) -> LayerSurface {
        let surface = self.compositor_state.create_surface(&self.qh);
        let layer_surface = self.layer_shell.create_layer_surface(
            &self.qh,
            surface,
            Layer::Background,
            Some(LAYER_NAMESPACE),
            Some(output),
        );

        // Cover the whole output, ignore other surfaces' exclusive zones
        layer_surface.set_anchor(Anchor::all());
        layer_surface.set_exclusive_zone(-1);
        layer_surface.set_keyboard_interactivity(KeyboardInteractivity::None);

        // Empty commit asks the compositor for the first configure
        layer_surface.commit();
        self.flush();

        layer_surface
    }

    fn destroy_surface(&self, surface: LayerSurface) {
        drop(surface);
        self.flush();
    }

    fn allocate(&self, width: u32, height: u32) -> Result<ShmBuffer, AllocationError> {
        ShmBuffer::new(&self.shm, width, height, &self.qh)
    }

    fn present(&self, surface: &LayerSurface, memory: &ShmBuffer, width: u32, height: u32) {
        let wl_surface = surface.wl_surface();
        wl_surface.attach(Some(memory.buffer()), 0, 0);
        wl_surface.damage_buffer(0, 0, width as i32, height as i32);
        wl_surface.commit();
        self.flush();
    }
}
