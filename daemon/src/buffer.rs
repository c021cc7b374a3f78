use std::os::fd::AsFd;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use wayland_client::protocol::{wl_buffer, wl_shm, wl_shm_pool};
use wayland_client::{Dispatch, QueueHandle};

use crate::backend::Backend;
use crate::error::{AllocationError, BufferError};
use crate::render::Frame;

/// Idle buffers kept around for reuse
pub const POOL_LIMIT: usize = 4;

const BYTES_PER_PIXEL: u32 = 4;

/// Memory a [`PixelBuffer`] writes its pixels into.
pub trait SharedMemory: Send {
    fn bytes_mut(&mut self) -> &mut [u8];

    /// Whether the compositor may still be reading this memory
    fn is_busy(&self) -> bool;

    fn mark_busy(&self);
}

/// Helper for creating and managing shared memory buffers for Wayland
pub struct ShmBuffer {
    pool: wl_shm_pool::WlShmPool,
    buffer: wl_buffer::WlBuffer,
    mmap: memmap2::MmapMut,
    busy: Arc<AtomicBool>,
}

impl ShmBuffer {
    pub fn new<D>(
        shm: &wl_shm::WlShm,
        width: u32,
        height: u32,
        qh: &QueueHandle<D>,
    ) -> Result<Self, AllocationError>
    where
        D: Dispatch<wl_shm_pool::WlShmPool, ()>
            + Dispatch<wl_buffer::WlBuffer, Arc<AtomicBool>>
            + 'static,
    {
        let invalid = || AllocationError::InvalidSize { width, height };
        let stride = width.checked_mul(BYTES_PER_PIXEL).ok_or_else(invalid)?;
        let size = stride.checked_mul(height).ok_or_else(invalid)?;
        let size = i32::try_from(size).map_err(|_| invalid())?;
        if size == 0 {
            return Err(invalid());
        }

        let shm_err = |source| AllocationError::Shm {
            width,
            height,
            source,
        };

        // Create a temporary file for shared memory
        let file = tempfile::tempfile().map_err(shm_err)?;
        file.set_len(size as u64).map_err(shm_err)?;

        // Memory map the file
        let mmap = unsafe { memmap2::MmapMut::map_mut(&file).map_err(shm_err)? };

        let pool = shm.create_pool(file.as_fd(), size, qh, ());

        let busy = Arc::new(AtomicBool::new(false));
        let buffer = pool.create_buffer(
            0,
            width as i32,
            height as i32,
            stride as i32,
            wl_shm::Format::Argb8888,
            qh,
            busy.clone(),
        );

        Ok(Self {
            pool,
            buffer,
            mmap,
            busy,
        })
    }

    pub fn buffer(&self) -> &wl_buffer::WlBuffer {
        &self.buffer
    }
}

impl SharedMemory for ShmBuffer {
    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.mmap[..]
    }

    fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    fn mark_busy(&self) {
        self.busy.store(true, Ordering::Release);
    }
}

impl Drop for ShmBuffer {
    fn drop(&mut self) {
        self.buffer.destroy();
        self.pool.destroy();
    }
}

/// A shared-memory region of fixed size with ARGB8888 pixel layout.
pub struct PixelBuffer<M> {
    memory: M,
    width: u32,
    height: u32,
}

impl<M: SharedMemory> PixelBuffer<M> {
    pub fn new(mut memory: M, width: u32, height: u32) -> Result<Self, AllocationError> {
        let required = width as usize * BYTES_PER_PIXEL as usize * height as usize;
        let actual = memory.bytes_mut().len();
        if actual < required {
            return Err(AllocationError::Undersized { required, actual });
        }

        Ok(Self {
            memory,
            width,
            height,
        })
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn stride(&self) -> u32 {
        self.width * BYTES_PER_PIXEL
    }

    pub fn memory(&self) -> &M {
        &self.memory
    }

    pub fn is_busy(&self) -> bool {
        self.memory.is_busy()
    }

    /// Copy a frame of exactly this buffer's size into its memory.
    pub fn write(&mut self, frame: &Frame) -> Result<(), BufferError> {
        if frame.size() != self.size() {
            return Err(BufferError::SizeMismatch {
                buffer: self.size(),
                frame: frame.size(),
            });
        }

        let expected = self.stride() as usize * self.height as usize;
        let data = frame.data();
        let actual = data.len();

        match self.memory.bytes_mut().get_mut(..expected) {
            Some(dst) if actual == expected => {
                dst.copy_from_slice(data);
                Ok(())
            }
            _ => Err(BufferError::LengthMismatch { expected, actual }),
        }
    }
}

/// Recycles buffers between frames. A buffer is only handed out again once the
/// compositor has released it.
pub struct BufferPool<M> {
    idle: Vec<PixelBuffer<M>>,
    limit: usize,
}

impl<M: SharedMemory> Default for BufferPool<M> {
    fn default() -> Self {
        Self::new(POOL_LIMIT)
    }
}

impl<M: SharedMemory> BufferPool<M> {
    pub fn new(limit: usize) -> Self {
        Self {
            idle: Vec::new(),
            limit,
        }
    }

    pub fn acquire<B>(
        &mut self,
        backend: &B,
        width: u32,
        height: u32,
    ) -> Result<PixelBuffer<M>, AllocationError>
    where
        B: Backend<Memory = M>,
    {
        if let Some(index) = self
            .idle
            .iter()
            .position(|buffer| buffer.size() == (width, height) && !buffer.is_busy())
        {
            log::debug!("Reusing pooled {}x{} buffer", width, height);
            return Ok(self.idle.swap_remove(index));
        }

        log::debug!("Allocating {}x{} buffer", width, height);
        PixelBuffer::new(backend.allocate(width, height)?, width, height)
    }

    pub fn release(&mut self, buffer: PixelBuffer<M>) {
        self.idle.push(buffer);

        // Buffers the compositor still holds are kept even over the limit
        while self.idle.len() > self.limit {
            match self.idle.iter().position(|buffer| !buffer.is_busy()) {
                Some(index) => drop(self.idle.remove(index)),
                None => break,
            }
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.idle.len()
    }

    pub fn clear(&mut self) {
        self.idle.clear();
    }
}
