use std::fmt::Debug;

use crate::buffer::SharedMemory;
use crate::error::AllocationError;

/// The compositor-facing half of the daemon.
///
/// [`crate::daemon_core::DaemonCore`] drives surfaces through this trait only,
/// so the Wayland connection can be swapped for an in-memory recorder in tests.
pub trait Backend: Send + 'static {
    /// Identity of a physical display
    type Output: Clone + PartialEq + Debug + Send + Sync;
    /// A background-layer surface placed on one output
    type Surface: PartialEq + Send;
    type Memory: SharedMemory;

    /// Create a full-screen background surface on `output` and request its
    /// first configure.
    fn create_surface(&self, output: &Self::Output) -> Self::Surface;

    fn destroy_surface(&self, surface: Self::Surface);

    fn allocate(&self, width: u32, height: u32) -> Result<Self::Memory, AllocationError>;

    /// Attach `memory` to `surface`, damage all of it and commit.
    fn present(&self, surface: &Self::Surface, memory: &Self::Memory, width: u32, height: u32);
}
