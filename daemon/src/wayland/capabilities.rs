use std::collections::HashSet;
use wayland_client::Proxy;
use wayland_client::globals::GlobalList;
use wayland_client::protocol::{wl_compositor::WlCompositor, wl_output::WlOutput, wl_shm::WlShm};
use wayland_protocols_wlr::layer_shell::v1::client::zwlr_layer_shell_v1::ZwlrLayerShellV1;

/// Compositor globals the daemon knows how to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Compositor,
    SharedMemory,
    LayerShell,
    Output,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Capability::Compositor,
        Capability::SharedMemory,
        Capability::LayerShell,
        Capability::Output,
    ];

    /// Needed before any surface can be created. Outputs may come later.
    pub const REQUIRED: [Capability; 3] = [
        Capability::Compositor,
        Capability::SharedMemory,
        Capability::LayerShell,
    ];

    /// Protocol interface name advertised in the registry
    pub fn interface(self) -> &'static str {
        match self {
            Capability::Compositor => WlCompositor::interface().name,
            Capability::SharedMemory => WlShm::interface().name,
            Capability::LayerShell => ZwlrLayerShellV1::interface().name,
            Capability::Output => WlOutput::interface().name,
        }
    }

    pub fn from_interface(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|cap| cap.interface() == name)
    }
}

/// Capabilities advertised by the compositor
#[derive(Debug, Default)]
pub struct Capabilities {
    found: HashSet<Capability>,
}

impl Capabilities {
    pub fn scan(globals: &GlobalList) -> Self {
        globals.contents().with_list(|list| {
            list.iter()
                .filter_map(|global| Capability::from_interface(&global.interface))
                .collect()
        })
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.found.contains(&capability)
    }

    pub fn missing(&self) -> Vec<Capability> {
        Capability::REQUIRED
            .into_iter()
            .filter(|cap| !self.has(*cap))
            .collect()
    }
}

impl FromIterator<Capability> for Capabilities {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self {
            found: iter.into_iter().collect(),
        }
    }
}
