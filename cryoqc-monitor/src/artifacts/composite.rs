//! Composite tile of the four per-movie artifacts

use cryoqc_common::config::CompositeLayout;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};

/// Thumbnail bound in both dimensions
pub const TILE_SIZE: u32 = 400;

/// Canvas size for a layout
pub fn canvas_size(layout: CompositeLayout) -> (u32, u32) {
    match layout {
        CompositeLayout::Row => (4 * TILE_SIZE, TILE_SIZE),
        CompositeLayout::Grid => (2 * TILE_SIZE, 2 * TILE_SIZE),
    }
}

/// Top-left corner of tile `index`
fn tile_origin(layout: CompositeLayout, index: u32) -> (u32, u32) {
    match layout {
        CompositeLayout::Row => (index * TILE_SIZE, 0),
        CompositeLayout::Grid => ((index % 2) * TILE_SIZE, (index / 2) * TILE_SIZE),
    }
}

/// Shrink to fit within the tile preserving aspect ratio; smaller images are kept
pub fn thumbnail(image: &DynamicImage) -> RgbImage {
    let (w, h) = (image.width(), image.height());
    if w <= TILE_SIZE && h <= TILE_SIZE {
        return image.to_rgb8();
    }
    let scale = f64::min(TILE_SIZE as f64 / w as f64, TILE_SIZE as f64 / h as f64);
    let nw = ((w as f64 * scale).round() as u32).clamp(1, TILE_SIZE);
    let nh = ((h as f64 * scale).round() as u32).clamp(1, TILE_SIZE);
    imageops::resize(&image.to_rgb8(), nw, nh, FilterType::Lanczos3)
}

/// Arrange up to four images on a black canvas, in order
pub fn compose(images: &[DynamicImage], layout: CompositeLayout) -> RgbImage {
    let (width, height) = canvas_size(layout);
    let mut canvas = RgbImage::from_pixel(width, height, Rgb([0, 0, 0]));

    for (index, image) in images.iter().take(4).enumerate() {
        let tile = thumbnail(image);
        let (x, y) = tile_origin(layout, index as u32);
        imageops::replace(&mut canvas, &tile, x as i64, y as i64);
    }

    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;

    #[test]
    fn test_thumbnail_preserves_aspect() {
        let wide = DynamicImage::ImageLuma8(GrayImage::new(800, 200));
        assert_eq!(thumbnail(&wide).dimensions(), (400, 100));

        let small = DynamicImage::ImageLuma8(GrayImage::new(120, 90));
        assert_eq!(thumbnail(&small).dimensions(), (120, 90));
    }

    #[test]
    fn test_layout_dimensions_and_placement() {
        let white = DynamicImage::ImageRgb8(RgbImage::from_pixel(400, 400, Rgb([255, 255, 255])));
        let images = vec![white.clone(), white.clone(), white.clone(), white];

        let row = compose(&images, CompositeLayout::Row);
        assert_eq!(row.dimensions(), (1600, 400));
        assert_eq!(row.get_pixel(1599, 399), &Rgb([255, 255, 255]));

        let grid = compose(&images, CompositeLayout::Grid);
        assert_eq!(grid.dimensions(), (800, 800));
        assert_eq!(grid.get_pixel(799, 799), &Rgb([255, 255, 255]));
    }

    #[test]
    fn test_undersized_tiles_leave_black_background() {
        let small = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 10, Rgb([255, 0, 0])));
        let row = compose(&[small], CompositeLayout::Row);
        assert_eq!(row.get_pixel(5, 5), &Rgb([255, 0, 0]));
        assert_eq!(row.get_pixel(50, 50), &Rgb([0, 0, 0]));
    }
}
