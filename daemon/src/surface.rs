use crate::backend::Backend;
use crate::buffer::{BufferPool, PixelBuffer, SharedMemory};
use crate::error::SurfaceError;
use crate::render::Frame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceState {
    /// Created, no usable size from the compositor yet
    Unconfigured,
    /// The compositor negotiated a size; the surface is drawn at it
    Configured,
}

/// The wallpaper surface of a single output.
///
/// Destroying consumes the value, so a destroyed surface cannot be used again.
pub struct OutputSurface<B: Backend> {
    output: B::Output,
    surface: B::Surface,
    buffer: Option<PixelBuffer<B::Memory>>,
    negotiated: Option<(u32, u32)>,
    /// Image generation shown by the committed buffer
    generation: Option<u64>,
}

impl<B: Backend> OutputSurface<B> {
    pub fn new(backend: &B, output: B::Output) -> Self {
        let surface = backend.create_surface(&output);
        Self {
            output,
            surface,
            buffer: None,
            negotiated: None,
            generation: None,
        }
    }

    pub fn output(&self) -> &B::Output {
        &self.output
    }

    pub fn is_surface(&self, surface: &B::Surface) -> bool {
        self.surface == *surface
    }

    pub fn state(&self) -> SurfaceState {
        if self.negotiated.is_some() {
            SurfaceState::Configured
        } else {
            SurfaceState::Unconfigured
        }
    }

    /// Size most recently requested by the compositor
    pub fn negotiated_size(&self) -> Option<(u32, u32)> {
        self.negotiated
    }

    /// Size to redraw at when the image changes, `None` while unconfigured
    pub fn redraw_size(&self) -> Option<(u32, u32)> {
        match self.state() {
            SurfaceState::Configured => self.negotiated,
            SurfaceState::Unconfigured => None,
        }
    }

    pub fn buffer_size(&self) -> Option<(u32, u32)> {
        self.buffer.as_ref().map(PixelBuffer::size)
    }

    /// Whether the committed buffer already shows `generation` at the negotiated size
    pub fn is_current(&self, generation: u64) -> bool {
        self.negotiated.is_some()
            && self.buffer_size() == self.negotiated
            && self.generation == Some(generation)
    }

    /// Record a configure from the compositor. Returns the size to draw at when
    /// the committed buffer no longer matches.
    pub fn on_configure(&mut self, width: u32, height: u32) -> Option<(u32, u32)> {
        if width == 0 || height == 0 {
            log::debug!(
                "Ignoring {}x{} configure for {:?}",
                width,
                height,
                self.output
            );
            return None;
        }

        self.negotiated = Some((width, height));

        if self.buffer_size() == self.negotiated {
            None
        } else {
            self.negotiated
        }
    }

    /// Copy `frame` into a buffer and commit it. On failure the previously
    /// committed buffer stays attached.
    pub fn present(
        &mut self,
        backend: &B,
        pool: &mut BufferPool<B::Memory>,
        frame: &Frame,
        generation: u64,
    ) -> Result<(), SurfaceError> {
        if self.negotiated != Some(frame.size()) {
            return Err(SurfaceError::StaleFrame {
                frame: frame.size(),
                negotiated: self.negotiated,
            });
        }

        let (width, height) = frame.size();
        let mut buffer = pool.acquire(backend, width, height)?;
        if let Err(e) = buffer.write(frame) {
            pool.release(buffer);
            return Err(e.into());
        }

        // Busy before commit, the release event may arrive right after
        buffer.memory().mark_busy();
        backend.present(&self.surface, buffer.memory(), width, height);

        if let Some(previous) = self.buffer.replace(buffer) {
            pool.release(previous);
        }
        self.generation = Some(generation);

        Ok(())
    }

    pub fn destroy(self, backend: &B) {
        log::info!("Destroying surface for output {:?}", self.output);
        backend.destroy_surface(self.surface);
        // Still attached until the surface is gone, so it is freed rather
        // than pooled
        drop(self.buffer);
    }
}
