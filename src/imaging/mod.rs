//! Image probing and rewriting helpers shared by checkers and fixers.

use anyhow::{Context, Result};
use image::{imageops::FilterType, DynamicImage, GenericImageView, ImageFormat};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Opaque-content bounding box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Transparent margin on each side as a fraction of the image size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Padding {
    pub left: f64,
    pub right: f64,
    pub top: f64,
    pub bottom: f64,
}

impl Padding {
    pub fn max_side(&self) -> f64 {
        self.left.max(self.right).max(self.top).max(self.bottom)
    }
}

/// Pixel dimensions of an image file, reading only the header when possible.
pub fn dimensions(path: &Path) -> Option<(u32, u32)> {
    image::image_dimensions(path)
        .ok()
        .or_else(|| decode_file(path).map(|img| img.dimensions()))
        .filter(|(w, h)| *w > 0 && *h > 0)
}

pub fn decode_file(path: &Path) -> Option<DynamicImage> {
    image::open(path).ok().or_else(|| {
        let bytes = fs::read(path).ok()?;
        decode_bytes(&bytes).ok()
    })
}

/// Decode in-memory bytes, trusting content over any declared format.
pub fn decode_bytes(bytes: &[u8]) -> Result<DynamicImage> {
    let format = image::guess_format(bytes).context("Unrecognized image format")?;
    image::load_from_memory_with_format(bytes, format).context("Failed to decode image")
}

/// Bounding box of pixels with non-zero alpha. `None` when the image is
/// fully transparent.
pub fn opaque_bounds(img: &DynamicImage) -> Option<Bounds> {
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut min_x = width;
    let mut min_y = height;
    let mut max_x = 0;
    let mut max_y = 0;
    let mut any = false;

    for (x, y, pixel) in rgba.enumerate_pixels() {
        if pixel[3] > 0 {
            any = true;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
    }

    if !any {
        return None;
    }
    Some(Bounds {
        x: min_x,
        y: min_y,
        width: max_x - min_x + 1,
        height: max_y - min_y + 1,
    })
}

pub fn padding(img: &DynamicImage) -> Option<Padding> {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return None;
    }
    let bounds = opaque_bounds(img)?;
    let w = width as f64;
    let h = height as f64;
    Some(Padding {
        left: bounds.x as f64 / w,
        right: (width - bounds.x - bounds.width) as f64 / w,
        top: bounds.y as f64 / h,
        bottom: (height - bounds.y - bounds.height) as f64 / h,
    })
}

/// Target size keeping aspect ratio so the longest edge is at most `max_edge`.
pub fn fit_to_max_edge(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (1, 1);
    }
    let clamped = max_edge.max(1);
    if width.max(height) <= clamped {
        return (width, height);
    }
    if width >= height {
        let scaled = (u64::from(height) * u64::from(clamped) + u64::from(width) / 2)
            / u64::from(width);
        (clamped, scaled.max(1) as u32)
    } else {
        let scaled = (u64::from(width) * u64::from(clamped) + u64::from(height) / 2)
            / u64::from(height);
        (scaled.max(1) as u32, clamped)
    }
}

pub fn downscale(img: DynamicImage, max_edge: u32) -> DynamicImage {
    let (width, height) = img.dimensions();
    let (target_w, target_h) = fit_to_max_edge(width, height, max_edge);
    if (target_w, target_h) == (width, height) {
        return img;
    }
    img.resize_exact(target_w, target_h, FilterType::Lanczos3)
}

fn format_for(path: &Path) -> ImageFormat {
    ImageFormat::from_path(path).unwrap_or(ImageFormat::Jpeg)
}

/// Encode `img` in the format implied by `path` and replace the file
/// atomically through a sibling temp file.
pub fn write_atomic(img: &DynamicImage, path: &Path) -> Result<()> {
    let format = format_for(path);
    let mut encoded = std::io::Cursor::new(Vec::new());
    let written = match format {
        // JPEG has no alpha channel
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(img.to_rgb8()).write_to(&mut encoded, format),
        _ => img.write_to(&mut encoded, format),
    };
    written.with_context(|| format!("Failed to encode image for {:?}", path))?;

    let dir = path
        .parent()
        .with_context(|| format!("No parent directory for {:?}", path))?;
    let mut temp = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {:?}", dir))?;
    temp.write_all(encoded.get_ref())?;
    temp.persist(path)
        .with_context(|| format!("Failed to replace {:?}", path))?;
    Ok(())
}
