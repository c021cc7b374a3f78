use image::{ImageReader, RgbaImage};
use std::path::{Path, PathBuf};

use crate::error::DecodeError;

/// A decoded wallpaper image held as an RGBA raster.
///
/// Never mutated after loading; the daemon swaps in a whole new `ImageSource`
/// when the wallpaper changes.
pub struct ImageSource {
    path: PathBuf,
    raster: RgbaImage,
}

impl ImageSource {
    /// Decode the file at `path`. The format is sniffed from the content, so a
    /// mislabelled extension still loads.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DecodeError> {
        let path = path.as_ref();
        log::info!("Loading image from: {}", path.display());

        let reader = ImageReader::open(path)
            .and_then(|reader| reader.with_guessed_format())
            .map_err(|source| DecodeError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        let raster = reader
            .decode()
            .map_err(|source| DecodeError::Decode {
                path: path.to_path_buf(),
                source,
            })?
            .into_rgba8();

        if raster.width() == 0 || raster.height() == 0 {
            return Err(DecodeError::Empty(path.to_path_buf()));
        }

        log::debug!(
            "Loaded image size: {}x{}",
            raster.width(),
            raster.height()
        );

        Ok(Self {
            path: path.to_path_buf(),
            raster,
        })
    }

    #[cfg(test)]
    pub fn from_rgba(path: impl Into<PathBuf>, raster: RgbaImage) -> Self {
        Self {
            path: path.into(),
            raster,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.raster.dimensions()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn raster(&self) -> &RgbaImage {
        &self.raster
    }
}
