use std::path::PathBuf;
use thiserror::Error;

/// The image file could not be turned into a raster.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Failed to open image {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to decode image {path}: {source}")]
    Decode {
        path: PathBuf,
        source: image::ImageError,
    },

    #[error("Image {0} has no pixels")]
    Empty(PathBuf),
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Invalid target size {width}x{height}")]
    EmptyTarget { width: u32, height: u32 },

    #[error("Failed to resize image: {0}")]
    Resize(String),
}

#[derive(Error, Debug)]
pub enum AllocationError {
    #[error("Buffer size {width}x{height} is out of range")]
    InvalidSize { width: u32, height: u32 },

    #[error("Failed to allocate shared memory for {width}x{height} buffer: {source}")]
    Shm {
        width: u32,
        height: u32,
        source: std::io::Error,
    },

    #[error("Shared memory region holds {actual} bytes, {required} required")]
    Undersized { required: usize, actual: usize },
}

#[derive(Error, Debug)]
pub enum BufferError {
    #[error("Frame is {frame:?} but buffer is {buffer:?}")]
    SizeMismatch {
        buffer: (u32, u32),
        frame: (u32, u32),
    },

    #[error("Frame data size mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}

#[derive(Error, Debug)]
pub enum SurfaceError {
    #[error("Frame is {frame:?} but the output negotiated {negotiated:?}")]
    StaleFrame {
        frame: (u32, u32),
        negotiated: Option<(u32, u32)>,
    },

    #[error(transparent)]
    Allocation(#[from] AllocationError),

    #[error(transparent)]
    Buffer(#[from] BufferError),
}

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Compositor globals are not bound yet")]
    NotInitialised,
}
