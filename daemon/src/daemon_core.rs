//! Shared daemon state.
//!
//! The Wayland event loop and the control server both go through
//! [`DaemonCore`], which keeps every piece of mutable state behind one mutex.
//! Decoding and scaling happen outside the lock; only bookkeeping and the
//! final buffer commit hold it. Every commit re-checks the output's current
//! size and the current image under the lock, so a frame rendered against a
//! superseded configure or image is re-rendered instead of committed.

use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::backend::Backend;
use crate::buffer::BufferPool;
use crate::error::{DaemonError, RenderError};
use crate::image_source::ImageSource;
use crate::render::{Frame, FrameCompositor, PLACEHOLDER_COLOR};
use crate::surface::{OutputSurface, SurfaceState};

struct CoreState<B: Backend> {
    backend: Option<B>,
    surfaces: Vec<OutputSurface<B>>,
    pool: BufferPool<B::Memory>,
    image: Option<Arc<ImageSource>>,
    /// Bumped on every image change
    generation: u64,
}

/// A frame to render for one output
struct DrawJob<O> {
    output: O,
    width: u32,
    height: u32,
    generation: u64,
    image: Option<Arc<ImageSource>>,
}

pub struct DaemonCore<B: Backend> {
    state: Arc<Mutex<CoreState<B>>>,
    compositor: Arc<FrameCompositor>,
}

impl<B: Backend> Clone for DaemonCore<B> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            compositor: self.compositor.clone(),
        }
    }
}

impl<B: Backend> Default for DaemonCore<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> DaemonCore<B> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(CoreState {
                backend: None,
                surfaces: Vec::new(),
                pool: BufferPool::default(),
                image: None,
                generation: 0,
            })),
            compositor: Arc::new(FrameCompositor::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CoreState<B>> {
        // A panic mid-update leaves the state usable
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand over the bound compositor globals. Outputs can only be tracked
    /// once this has happened.
    pub fn install_backend(&self, backend: B) {
        let mut state = self.lock();
        if state.backend.is_some() {
            log::warn!("Replacing already installed compositor backend");
        }
        state.backend = Some(backend);
    }

    #[cfg(test)]
    pub fn is_initialised(&self) -> bool {
        self.lock().backend.is_some()
    }

    /// Start tracking an output and create its background surface.
    /// Announcing an output twice is a no-op.
    pub fn on_output_added(&self, output: B::Output) -> Result<(), DaemonError> {
        let mut state = self.lock();
        let CoreState {
            backend, surfaces, ..
        } = &mut *state;

        let Some(backend) = backend.as_ref() else {
            return Err(DaemonError::NotInitialised);
        };

        if surfaces.iter().any(|surface| *surface.output() == output) {
            log::debug!("Output {:?} is already tracked", output);
            return Ok(());
        }

        log::info!("Creating surface for new output {:?}", output);
        surfaces.push(OutputSurface::new(backend, output));
        Ok(())
    }

    /// Stop tracking an output and destroy its surface. Returns whether the
    /// output was known.
    pub fn on_output_removed(&self, output: &B::Output) -> bool {
        let mut state = self.lock();
        let CoreState {
            backend, surfaces, ..
        } = &mut *state;

        let Some(index) = surfaces.iter().position(|s| s.output() == output) else {
            log::warn!("Removal of unknown output {:?} ignored", output);
            return false;
        };

        let surface = surfaces.remove(index);
        if let Some(backend) = backend.as_ref() {
            surface.destroy(backend);
        }
        log::info!("Output {:?} removed", output);
        true
    }

    pub fn output_for_surface(&self, surface: &B::Surface) -> Option<B::Output> {
        self.lock()
            .surfaces
            .iter()
            .find(|s| s.is_surface(surface))
            .map(|s| s.output().clone())
    }

    /// Apply a size from the compositor and redraw the output if its buffer
    /// no longer fits.
    pub fn on_configure(&self, output: &B::Output, width: u32, height: u32) {
        let job = {
            let mut state = self.lock();
            let image = state.image.clone();
            let generation = state.generation;

            let Some(surface) = state.surfaces.iter_mut().find(|s| s.output() == output) else {
                log::warn!("Configure for unknown output {:?}", output);
                return;
            };

            log::debug!("Configure {:?}: {}x{}", output, width, height);
            surface
                .on_configure(width, height)
                .map(|(width, height)| DrawJob {
                    output: output.clone(),
                    width,
                    height,
                    generation,
                    image,
                })
        };

        if let Some(job) = job {
            self.draw(vec![job]);
        }
    }

    /// Load an image and show it on every output that has a size.
    ///
    /// On a load failure nothing changes and the error is returned.
    pub fn set_image(&self, path: impl AsRef<Path>) -> Result<(), DaemonError> {
        let image = Arc::new(ImageSource::load(path)?);

        let jobs = {
            let mut state = self.lock();
            state.image = Some(image.clone());
            state.generation += 1;
            let generation = state.generation;

            state
                .surfaces
                .iter()
                .filter_map(|surface| {
                    surface.redraw_size().map(|(width, height)| DrawJob {
                        output: surface.output().clone(),
                        width,
                        height,
                        generation,
                        image: Some(image.clone()),
                    })
                })
                .collect::<Vec<_>>()
        };

        log::info!(
            "Showing {} on {} output(s)",
            image.path().display(),
            jobs.len()
        );
        self.draw(jobs);
        Ok(())
    }

    /// Destroy every surface and drop the compositor backend.
    pub fn shutdown(&self) {
        let mut state = self.lock();
        let CoreState {
            backend,
            surfaces,
            pool,
            ..
        } = &mut *state;

        if let Some(backend) = backend.as_ref() {
            for surface in surfaces.drain(..) {
                surface.destroy(backend);
            }
        }
        surfaces.clear();
        pool.clear();
        *backend = None;
    }

    #[cfg(test)]
    pub fn image_dimensions(&self) -> Option<(u32, u32)> {
        self.lock().image.as_ref().map(|image| image.dimensions())
    }

    #[cfg(test)]
    pub fn image_path(&self) -> Option<PathBuf> {
        self.lock()
            .image
            .as_ref()
            .map(|image| image.path().to_path_buf())
    }

    #[cfg(test)]
    pub fn output_count(&self) -> usize {
        self.lock().surfaces.len()
    }

    #[cfg(test)]
    pub fn surface_state(&self, output: &B::Output) -> Option<SurfaceState> {
        self.lock()
            .surfaces
            .iter()
            .find(|s| s.output() == output)
            .map(OutputSurface::state)
    }

    #[cfg(test)]
    pub fn buffer_size(&self, output: &B::Output) -> Option<(u32, u32)> {
        self.lock()
            .surfaces
            .iter()
            .find(|s| s.output() == output)
            .and_then(OutputSurface::buffer_size)
    }

    fn draw(&self, jobs: Vec<DrawJob<B::Output>>) {
        if jobs.is_empty() {
            return;
        }

        let compositor = &*self.compositor;
        let rendered: Vec<_> = jobs
            .into_par_iter()
            .map(|job| {
                let frame = render_job(compositor, &job);
                (job, frame)
            })
            .collect();

        let mut state = self.lock();
        for (job, frame) in rendered {
            state.commit(compositor, job, frame);
        }
    }
}

impl<B: Backend> CoreState<B> {
    fn commit(
        &mut self,
        compositor: &FrameCompositor,
        job: DrawJob<B::Output>,
        frame: Result<Frame, RenderError>,
    ) {
        let CoreState {
            backend,
            surfaces,
            pool,
            image,
            generation,
        } = self;

        let Some(backend) = backend.as_ref() else {
            return;
        };

        let Some(surface) = surfaces.iter_mut().find(|s| *s.output() == job.output) else {
            log::debug!("Output {:?} went away before its frame was committed", job.output);
            return;
        };

        if surface.is_current(*generation) {
            log::debug!("Output {:?} is already up to date", job.output);
            return;
        }

        let Some((width, height)) = surface.negotiated_size() else {
            return;
        };

        let frame = if job.generation == *generation && (job.width, job.height) == (width, height) {
            frame
        } else {
            log::debug!(
                "Frame for {:?} is stale, re-rendering at {}x{}",
                job.output,
                width,
                height
            );
            render_job(
                compositor,
                &DrawJob {
                    output: job.output.clone(),
                    width,
                    height,
                    generation: *generation,
                    image: image.clone(),
                },
            )
        };

        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                log::error!("Failed to render frame for {:?}: {}", job.output, e);
                return;
            }
        };

        match surface.present(backend, pool, &frame, *generation) {
            Ok(()) => log::debug!("Committed {}x{} frame to {:?}", width, height, job.output),
            Err(e) => log::error!("Failed to draw output {:?}: {}", job.output, e),
        }
    }
}

fn render_job<O>(compositor: &FrameCompositor, job: &DrawJob<O>) -> Result<Frame, RenderError> {
    match &job.image {
        Some(image) => compositor.render(image, job.width, job.height),
        None => Ok(Frame::solid(job.width, job.height, PLACEHOLDER_COLOR)),
    }
}
