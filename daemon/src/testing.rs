//! In-memory backend that records what would have been sent to the compositor.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::backend::Backend;
use crate::buffer::SharedMemory;
use crate::error::AllocationError;

pub type OutputId = u32;

#[derive(Debug, Clone, PartialEq)]
pub struct MockSurface {
    pub output: OutputId,
    pub id: usize,
}

pub struct MockMemory {
    bytes: Vec<u8>,
    busy: Arc<AtomicBool>,
    teardown: Arc<Mutex<Vec<Teardown>>>,
}

impl Drop for MockMemory {
    fn drop(&mut self) {
        if let Ok(mut teardown) = self.teardown.lock() {
            teardown.push(Teardown::Memory);
        }
    }
}

/// Order in which compositor objects were let go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    Surface(OutputId),
    Memory,
}

impl MockMemory {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl SharedMemory for MockMemory {
    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    fn mark_busy(&self) {
        self.busy.store(true, Ordering::Release);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Commit {
    pub output: OutputId,
    pub width: u32,
    pub height: u32,
    /// First pixel in memory order (B, G, R, A)
    pub first_pixel: [u8; 4],
}

#[derive(Default)]
struct Record {
    commits: Vec<Commit>,
    created: Vec<OutputId>,
    destroyed: Vec<OutputId>,
    busy_flags: Vec<Arc<AtomicBool>>,
    next_surface: usize,
}

#[derive(Clone, Default)]
pub struct MockBackend {
    record: Arc<Mutex<Record>>,
    teardown: Arc<Mutex<Vec<Teardown>>>,
    fail_allocations: Arc<AtomicBool>,
}

impl MockBackend {
    fn record(&self) -> std::sync::MutexGuard<'_, Record> {
        self.record.lock().unwrap()
    }

    pub fn commits(&self) -> Vec<Commit> {
        self.record().commits.clone()
    }

    pub fn clear_commits(&self) {
        self.record().commits.clear();
    }

    pub fn created_surfaces(&self) -> Vec<OutputId> {
        self.record().created.clone()
    }

    pub fn destroyed_surfaces(&self) -> Vec<OutputId> {
        self.record().destroyed.clone()
    }

    pub fn teardown(&self) -> Vec<Teardown> {
        self.teardown.lock().unwrap().clone()
    }

    pub fn allocations(&self) -> usize {
        self.record().busy_flags.len()
    }

    pub fn set_fail_allocations(&self, fail: bool) {
        self.fail_allocations.store(fail, Ordering::SeqCst);
    }

    /// Act as if the compositor released every buffer
    pub fn release_all(&self) {
        for flag in &self.record().busy_flags {
            flag.store(false, Ordering::Release);
        }
    }
}

impl Backend for MockBackend {
    type Output = OutputId;
    type Surface = MockSurface;
    type Memory = MockMemory;

    fn create_surface(&self, output: &OutputId) -> MockSurface {
        let mut record = self.record();
        record.created.push(*output);
        record.next_surface += 1;
        MockSurface {
            output: *output,
            id: record.next_surface,
        }
    }

    fn destroy_surface(&self, surface: MockSurface) {
        self.record().destroyed.push(surface.output);
        self.teardown
            .lock()
            .unwrap()
            .push(Teardown::Surface(surface.output));
    }

    fn allocate(&self, width: u32, height: u32) -> Result<MockMemory, AllocationError> {
        if self.fail_allocations.load(Ordering::SeqCst) {
            return Err(AllocationError::Shm {
                width,
                height,
                source: std::io::Error::new(std::io::ErrorKind::OutOfMemory, "mock exhaustion"),
            });
        }

        let busy = Arc::new(AtomicBool::new(false));
        self.record().busy_flags.push(busy.clone());

        Ok(MockMemory {
            bytes: vec![0; width as usize * height as usize * 4],
            busy,
            teardown: self.teardown.clone(),
        })
    }

    fn present(&self, surface: &MockSurface, memory: &MockMemory, width: u32, height: u32) {
        let mut first_pixel = [0; 4];
        first_pixel.copy_from_slice(&memory.bytes()[..4]);

        self.record().commits.push(Commit {
            output: surface.output,
            width,
            height,
            first_pixel,
        });
    }
}

/// Write a solid-colour PNG
pub fn write_png(path: &Path, width: u32, height: u32, rgba: [u8; 4]) {
    image::RgbaImage::from_pixel(width, height, image::Rgba(rgba))
        .save(path)
        .unwrap();
}
