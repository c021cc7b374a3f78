use fast_image_resize as fr;
use image::{RgbaImage, imageops};
use rayon::prelude::*;

use crate::error::RenderError;
use crate::image_source::ImageSource;

/// Fill used for outputs that are configured before any image is loaded (#1e1e1e)
pub const PLACEHOLDER_COLOR: [u8; 4] = [0x1e, 0x1e, 0x1e, 0xff];

/// A rendered frame in ARGB8888 memory order (B, G, R, A per pixel), ready to
/// be copied into a shared-memory buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Frame {
    /// A frame filled with a single RGBA colour
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let [r, g, b, a] = rgba;
        let data = [b, g, r, a].repeat(width as usize * height as usize);
        Self {
            width,
            height,
            data,
        }
    }

    fn from_rgba(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        let mut data = image.into_raw();

        // RGBA -> BGRA
        data.par_chunks_exact_mut(4).for_each(|pixel| pixel.swap(0, 2));

        Self {
            width,
            height,
            data,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Size the source must be scaled to so it covers `target` while keeping its
/// aspect ratio. At least one side matches the target exactly, the other is
/// equal or larger and gets cropped.
pub fn cover_size(source: (u32, u32), target: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = (source.0 as f64, source.1 as f64);
    let (dst_w, dst_h) = (target.0 as f64, target.1 as f64);

    let scale = (dst_w / src_w).max(dst_h / src_h);

    let width = ((src_w * scale).round() as u32).max(target.0);
    let height = ((src_h * scale).round() as u32).max(target.1);

    (width, height)
}

/// Scales images to fill an output, crops the overflow from the centre and
/// converts the result to the pixel layout Wayland expects.
pub struct FrameCompositor {
    filter: fr::FilterType,
}

impl Default for FrameCompositor {
    fn default() -> Self {
        Self {
            filter: fr::FilterType::Lanczos3,
        }
    }
}

impl FrameCompositor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(&self, image: &ImageSource, width: u32, height: u32) -> Result<Frame, RenderError> {
        if width == 0 || height == 0 {
            return Err(RenderError::EmptyTarget { width, height });
        }

        let (src_w, src_h) = image.dimensions();
        let (scaled_w, scaled_h) = cover_size((src_w, src_h), (width, height));
        log::debug!(
            "Rendering {} for {}x{} (scaled to {}x{})",
            image.path().display(),
            width,
            height,
            scaled_w,
            scaled_h
        );

        // Nothing to scale, only the overflow is cut away
        if (scaled_w, scaled_h) == (src_w, src_h) {
            let left = (src_w - width) / 2;
            let top = (src_h - height) / 2;
            let cropped = imageops::crop_imm(image.raster(), left, top, width, height).to_image();
            return Ok(Frame::from_rgba(cropped));
        }

        // Visible part of the source, in source pixels. The scaled image is
        // never materialised, only the target-sized result.
        let crop_w = width as f64 * src_w as f64 / scaled_w as f64;
        let crop_h = height as f64 * src_h as f64 / scaled_h as f64;
        let crop = Crop {
            left: (src_w as f64 - crop_w) / 2.0,
            top: (src_h as f64 - crop_h) / 2.0,
            width: crop_w,
            height: crop_h,
        };

        let resized = self.resize(image.raster(), crop, width, height)?;
        Ok(Frame::from_rgba(resized))
    }

    fn resize(
        &self,
        src: &RgbaImage,
        crop: Crop,
        width: u32,
        height: u32,
    ) -> Result<RgbaImage, RenderError> {
        let src_view = fr::images::ImageRef::new(
            src.width(),
            src.height(),
            src.as_raw(),
            fr::PixelType::U8x4,
        )
        .map_err(|e| RenderError::Resize(format!("Failed to create source image: {}", e)))?;

        let mut dst = fr::images::Image::new(width, height, fr::PixelType::U8x4);

        let options = fr::ResizeOptions::new()
            .resize_alg(fr::ResizeAlg::Convolution(self.filter))
            .crop(crop.left, crop.top, crop.width, crop.height);

        let mut resizer = fr::Resizer::new();
        resizer
            .resize(&src_view, &mut dst, &options)
            .map_err(|e| RenderError::Resize(e.to_string()))?;

        RgbaImage::from_raw(width, height, dst.into_vec())
            .ok_or_else(|| RenderError::Resize("Failed to create output image buffer".to_string()))
    }
}

/// Source rectangle fed to the resizer
#[derive(Debug, Clone, Copy)]
struct Crop {
    left: f64,
    top: f64,
    width: f64,
    height: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn solid_source(width: u32, height: u32, rgba: [u8; 4]) -> ImageSource {
        ImageSource::from_rgba("solid.png", RgbaImage::from_pixel(width, height, Rgba(rgba)))
    }

    #[test]
    fn test_cover_size_fills_target() {
        let sizes = [1, 2, 3, 7, 480, 640, 1080, 1081, 1920, 1921, 3840];

        for &sw in &sizes {
            for &sh in &sizes {
                for &(tw, th) in &[(1920, 1080), (1080, 1920), (2560, 1440), (7, 3), (1, 1)] {
                    let (w, h) = cover_size((sw, sh), (tw, th));
                    assert!(w >= tw && h >= th, "{sw}x{sh} -> {tw}x{th} gave {w}x{h}");
                    assert!(
                        w == tw || h == th,
                        "{sw}x{sh} -> {tw}x{th} gave {w}x{h}, no side matches"
                    );
                }
            }
        }
    }

    #[test]
    fn test_cover_size_keeps_aspect() {
        assert_eq!(cover_size((1920, 1080), (1920, 1080)), (1920, 1080));
        assert_eq!(cover_size((960, 540), (1920, 1080)), (1920, 1080));
        assert_eq!(cover_size((1000, 1000), (1920, 1080)), (1920, 1920));
        assert_eq!(cover_size((4000, 1000), (1920, 1080)), (4320, 1080));
    }

    #[test]
    fn test_render_length_matches_target() {
        let compositor = FrameCompositor::new();
        let image = solid_source(7, 5, [10, 20, 30, 255]);

        for &(w, h) in &[(7, 5), (14, 10), (3, 9), (20, 2), (1, 1)] {
            let frame = compositor.render(&image, w, h).unwrap();
            assert_eq!(frame.size(), (w, h));
            assert_eq!(frame.data().len(), (w * h * 4) as usize);
        }
    }

    #[test]
    fn test_render_swaps_to_bgra() {
        let compositor = FrameCompositor::new();
        let image = solid_source(4, 4, [200, 100, 50, 255]);

        let frame = compositor.render(&image, 4, 4).unwrap();
        for pixel in frame.data().chunks_exact(4) {
            assert_eq!(pixel, [50, 100, 200, 255]);
        }
    }

    #[test]
    fn test_render_scaled_solid_colour() {
        let compositor = FrameCompositor::new();
        let image = solid_source(8, 8, [200, 100, 50, 255]);

        let frame = compositor.render(&image, 32, 16).unwrap();
        for pixel in frame.data().chunks_exact(4) {
            assert!(pixel[0].abs_diff(50) <= 1);
            assert!(pixel[1].abs_diff(100) <= 1);
            assert!(pixel[2].abs_diff(200) <= 1);
            assert_eq!(pixel[3], 255);
        }
    }

    #[test]
    fn test_render_crops_centre() {
        let compositor = FrameCompositor::new();
        let colours = [
            [255, 0, 0, 255],
            [0, 255, 0, 255],
            [0, 0, 255, 255],
            [255, 255, 0, 255],
        ];
        let raster = RgbaImage::from_fn(4, 2, |x, _| Rgba(colours[x as usize]));
        let image = ImageSource::from_rgba("stripes.png", raster);

        // 4x2 covering 2x2 needs no scaling, one column is cut from each side
        let frame = compositor.render(&image, 2, 2).unwrap();
        let row: Vec<_> = frame.data().chunks_exact(4).take(2).collect();
        assert_eq!(row[0], [0, 255, 0, 255]);
        assert_eq!(row[1], [255, 0, 0, 255]);
    }

    #[test]
    fn test_render_extreme_aspect_ratio() {
        let compositor = FrameCompositor::new();
        let image = solid_source(4000, 1, [10, 20, 30, 255]);

        let frame = compositor.render(&image, 1920, 1080).unwrap();
        assert_eq!(frame.size(), (1920, 1080));
        assert_eq!(frame.data().len(), 1920 * 1080 * 4);
        assert!(frame.data().chunks_exact(4).all(|p| p[0].abs_diff(30) <= 1));
    }

    #[test]
    fn test_render_scaled_crop_keeps_centre() {
        let compositor = FrameCompositor::new();
        // Left half red, right half blue; a square target shows both halves
        let raster = RgbaImage::from_fn(8, 2, |x, _| {
            if x < 4 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 255, 255])
            }
        });
        let image = ImageSource::from_rgba("halves.png", raster);

        let frame = compositor.render(&image, 16, 16).unwrap();
        let row: Vec<_> = frame.data().chunks_exact(4).take(16).collect();
        // B, G, R, A
        assert!(row[0][2] > 200 && row[0][0] < 60, "{:?}", row[0]);
        assert!(row[15][0] > 200 && row[15][2] < 60, "{:?}", row[15]);
    }

    #[test]
    fn test_render_rejects_empty_target() {
        let compositor = FrameCompositor::new();
        let image = solid_source(4, 4, [0, 0, 0, 255]);

        assert!(matches!(
            compositor.render(&image, 0, 10),
            Err(RenderError::EmptyTarget { .. })
        ));
    }

    #[test]
    fn test_solid_frame() {
        let frame = Frame::solid(3, 2, PLACEHOLDER_COLOR);
        assert_eq!(frame.data().len(), 24);
        assert!(
            frame
                .data()
                .chunks_exact(4)
                .all(|p| p == [0x1e, 0x1e, 0x1e, 0xff])
        );
    }
}
