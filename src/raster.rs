//! Software canvas backed by an RGBA8 image
//!
//! Used by the headless binary and by hosts that composite the viewer
//! themselves. Bitmaps are stretched to the backing size with a triangle
//! filter; `alpha < 1` blends over what is already there.

use image::imageops::{self, FilterType};
use image::{ImageResult, Rgba, RgbaImage};
use std::path::Path;

use crate::entities::{Bitmap, Canvas};

#[derive(Debug, Clone)]
pub struct RasterCanvas {
    client: (f32, f32),
    dpr: f32,
    surface: RgbaImage,
    pointer: Option<i32>,
    detached: bool,
}

impl RasterCanvas {
    /// Canvas with a `width` x `height` layout size (backing allocated on resize)
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            client: (width, height),
            dpr: 1.0,
            surface: RgbaImage::new(1, 1),
            pointer: None,
            detached: false,
        }
    }

    pub fn with_dpr(mut self, dpr: f32) -> Self {
        self.dpr = dpr;
        self
    }

    /// Simulate a host layout change; follow with `Viewer::on_host_resize`
    pub fn set_client_size(&mut self, width: f32, height: f32, dpr: f32) {
        self.client = (width, height);
        self.dpr = dpr;
    }

    pub fn surface(&self) -> &RgbaImage {
        &self.surface
    }

    /// Pointer currently captured by a drag
    pub fn captured_pointer(&self) -> Option<i32> {
        self.pointer
    }

    pub fn is_detached(&self) -> bool {
        self.detached
    }

    /// Save the backing store; format from the extension
    pub fn save(&self, path: &Path) -> ImageResult<()> {
        self.surface.save(path)
    }
}

impl Canvas for RasterCanvas {
    fn acquire_context(&mut self) -> bool {
        !self.detached && self.client.0 > 0.0 && self.client.1 > 0.0
    }

    fn client_size(&self) -> (f32, f32) {
        self.client
    }

    fn device_pixel_ratio(&self) -> f32 {
        self.dpr
    }

    fn set_backing_size(&mut self, width: u32, height: u32) {
        if self.surface.dimensions() != (width, height) {
            self.surface = RgbaImage::new(width.max(1), height.max(1));
        }
    }

    fn draw_bitmap(&mut self, bitmap: &Bitmap, width: u32, height: u32, alpha: f32) {
        if self.detached {
            return;
        }
        if self.surface.dimensions() != (width, height) {
            self.set_backing_size(width, height);
        }
        let (width, height) = self.surface.dimensions();
        let scaled;
        let source = if bitmap.image().dimensions() == (width, height) {
            bitmap.image()
        } else {
            scaled = imageops::resize(bitmap.image(), width, height, FilterType::Triangle);
            &scaled
        };

        if alpha >= 1.0 {
            self.surface.copy_from_slice(source.as_raw());
            return;
        }
        let alpha = alpha.max(0.0);
        for (dst, src) in self.surface.pixels_mut().zip(source.pixels()) {
            *dst = blend(*dst, *src, alpha);
        }
    }

    fn set_pointer_capture(&mut self, pointer_id: i32) {
        self.pointer = Some(pointer_id);
    }

    fn release_pointer_capture(&mut self, pointer_id: i32) {
        if self.pointer == Some(pointer_id) {
            self.pointer = None;
        }
    }

    fn detach(&mut self) {
        self.detached = true;
        self.pointer = None;
    }
}

/// `src` over `dst` at `alpha`
fn blend(dst: Rgba<u8>, src: Rgba<u8>, alpha: f32) -> Rgba<u8> {
    let mix = |d: u8, s: u8| (s as f32 * alpha + d as f32 * (1.0 - alpha)).round().clamp(0.0, 255.0) as u8;
    Rgba([
        mix(dst[0], src[0]),
        mix(dst[1], src[1]),
        mix(dst[2], src[2]),
        mix(dst[3], src[3]),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(w: u32, h: u32, px: [u8; 4]) -> Bitmap {
        Bitmap::new(RgbaImage::from_pixel(w, h, Rgba(px)))
    }

    #[test]
    fn test_opaque_draw_scales_to_backing() {
        let mut canvas = RasterCanvas::new(8.0, 4.0);
        assert!(canvas.acquire_context());
        canvas.set_backing_size(8, 4);
        canvas.draw_bitmap(&solid(2, 2, [255, 0, 0, 255]), 8, 4, 1.0);

        assert_eq!(canvas.surface().dimensions(), (8, 4));
        assert!(canvas.surface().pixels().all(|p| *p == Rgba([255, 0, 0, 255])));
    }

    #[test]
    fn test_alpha_blends() {
        let mut canvas = RasterCanvas::new(2.0, 2.0);
        canvas.set_backing_size(2, 2);
        canvas.draw_bitmap(&solid(2, 2, [0, 0, 0, 255]), 2, 2, 1.0);
        canvas.draw_bitmap(&solid(2, 2, [200, 100, 0, 255]), 2, 2, 0.5);
        assert_eq!(*canvas.surface().get_pixel(1, 1), Rgba([100, 50, 0, 255]));
    }

    #[test]
    fn test_no_context_when_empty_or_detached() {
        assert!(!RasterCanvas::new(0.0, 100.0).acquire_context());

        let mut canvas = RasterCanvas::new(10.0, 10.0);
        canvas.set_pointer_capture(3);
        canvas.detach();
        assert!(!canvas.acquire_context());
        assert_eq!(canvas.captured_pointer(), None);
    }

    #[test]
    fn test_pointer_capture_release_matches_id() {
        let mut canvas = RasterCanvas::new(10.0, 10.0);
        canvas.set_pointer_capture(3);
        canvas.release_pointer_capture(4);
        assert_eq!(canvas.captured_pointer(), Some(3));
        canvas.release_pointer_capture(3);
        assert_eq!(canvas.captured_pointer(), None);
    }

    #[test]
    fn test_save_png() {
        let mut canvas = RasterCanvas::new(4.0, 4.0);
        canvas.set_backing_size(4, 4);
        canvas.draw_bitmap(&solid(4, 4, [1, 2, 3, 255]), 4, 4, 1.0);

        let path = std::env::temp_dir().join(format!("orbitview-raster-{}.png", std::process::id()));
        canvas.save(&path).unwrap();
        let back = image::open(&path).unwrap().to_rgba8();
        assert_eq!(*back.get_pixel(0, 0), Rgba([1, 2, 3, 255]));
        let _ = std::fs::remove_file(&path);
    }
}
