//! Image primitives shared by the detection strategies.
//!
//! Binary masks use 0 for background and 255 for foreground.

mod background;
mod clahe;
mod colormap;

pub use background::{BackgroundModel, FOREGROUND_VALUE, SHADOW_VALUE};
pub use clahe::equalize_adaptive;
pub use colormap::{normalize_min_max, scale_saturation, ColorMap};

use image::{imageops, GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
use imageproc::contours::{find_contours, BorderType};
use imageproc::distance_transform::Norm;
use imageproc::point::Point;

use crate::detect::BoundingBox;

/// An outer contour found on a binary mask.
#[derive(Clone, Debug)]
pub struct Blob {
    pub points: Vec<Point<i32>>,
    pub bbox: BoundingBox,
    /// Polygon area enclosed by the contour.
    pub area: f64,
}

pub fn to_gray(image: &RgbImage) -> GrayImage {
    imageops::grayscale(image)
}

/// Gaussian blur with the sigma an odd square kernel of `kernel_size` implies.
pub fn gaussian_blur(image: &GrayImage, kernel_size: u32) -> GrayImage {
    let kernel_size = force_odd(kernel_size);
    if kernel_size <= 1 {
        return image.clone();
    }
    let sigma = 0.3 * ((kernel_size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    imageproc::filter::gaussian_blur_f32(image, sigma)
}

pub fn force_odd(value: u32) -> u32 {
    if value % 2 == 0 {
        value + 1
    } else {
        value
    }
}

/// Resample to `width` x `height` by copying the nearest source pixel.
///
/// No output pixel is a blend of its neighbours, so object edges stay sharp
/// at every scale.
pub fn resize_nearest(image: &RgbImage, width: u32, height: u32) -> RgbImage {
    if image.width() == 0 || image.height() == 0 {
        return RgbImage::new(width, height);
    }
    ImageBuffer::from_fn(width, height, |x, y| {
        let u = (x as f32 + 0.5) / width as f32;
        let v = (y as f32 + 0.5) / height as f32;
        imageops::sample_nearest(image, u, v).unwrap_or(Rgb([0, 0, 0]))
    })
}

/// Pixels strictly above `level` become 255, the rest 0.
pub fn threshold(image: &GrayImage, level: u8) -> GrayImage {
    map_pixels(image, |v| if v > level { 255 } else { 0 })
}

/// Pixels strictly above `level` become 0, the rest 255.
pub fn threshold_inverted(image: &GrayImage, level: u8) -> GrayImage {
    map_pixels(image, |v| if v > level { 0 } else { 255 })
}

pub fn map_pixels(image: &GrayImage, f: impl Fn(u8) -> u8) -> GrayImage {
    ImageBuffer::from_fn(image.width(), image.height(), |x, y| {
        Luma([f(image.get_pixel(x, y)[0])])
    })
}

/// Per-pixel absolute difference. Images must share dimensions.
pub fn abs_diff(a: &GrayImage, b: &GrayImage) -> GrayImage {
    combine(a, b, |p, q| p.abs_diff(q))
}

pub fn bitwise_and(a: &GrayImage, b: &GrayImage) -> GrayImage {
    combine(a, b, |p, q| p & q)
}

fn combine(a: &GrayImage, b: &GrayImage, f: impl Fn(u8, u8) -> u8) -> GrayImage {
    let width = a.width().min(b.width());
    let height = a.height().min(b.height());
    ImageBuffer::from_fn(width, height, |x, y| {
        Luma([f(a.get_pixel(x, y)[0], b.get_pixel(x, y)[0])])
    })
}

/// Morphological opening with a square structuring element of side `2 * radius + 1`.
pub fn open(mask: &GrayImage, radius: u8) -> GrayImage {
    imageproc::morphology::open(mask, Norm::LInf, radius)
}

/// Morphological closing with a square structuring element of side `2 * radius + 1`.
pub fn close(mask: &GrayImage, radius: u8) -> GrayImage {
    imageproc::morphology::close(mask, Norm::LInf, radius)
}

/// Outermost contours of the foreground regions of a binary mask.
///
/// Regions touching the image edge are traced like any other; the mask is
/// padded with one background pixel on every side before tracing.
pub fn external_blobs(mask: &GrayImage) -> Vec<Blob> {
    if mask.width() == 0 || mask.height() == 0 {
        return Vec::new();
    }
    let mut padded = GrayImage::new(mask.width() + 2, mask.height() + 2);
    imageops::replace(&mut padded, mask, 1, 1);

    find_contours::<i32>(&padded)
        .into_iter()
        .filter(|contour| contour.border_type == BorderType::Outer && contour.parent.is_none())
        .filter_map(|contour| {
            let points: Vec<Point<i32>> = contour
                .points
                .into_iter()
                .map(|p| Point::new(p.x - 1, p.y - 1))
                .collect();
            let bbox = BoundingBox::enclosing(&points)?;
            let area = polygon_area(&points);
            Some(Blob { points, bbox, area })
        })
        .collect()
}

/// Shoelace area of a closed polygon.
pub fn polygon_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice = 0i64;
    for (i, p) in points.iter().enumerate() {
        let q = &points[(i + 1) % points.len()];
        twice += i64::from(p.x) * i64::from(q.y) - i64::from(q.x) * i64::from(p.y);
    }
    twice.abs() as f64 / 2.0
}

/// Area of the convex hull around the contour points.
pub fn hull_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let hull = imageproc::geometry::convex_hull(points);
    polygon_area(&hull)
}

/// Copy the box region out of `image`, clipped to its bounds.
pub fn crop_gray(image: &GrayImage, bbox: &BoundingBox) -> Option<GrayImage> {
    let (x, y, w, h) = clip(bbox, image.width(), image.height())?;
    Some(imageops::crop_imm(image, x, y, w, h).to_image())
}

/// Mean intensity inside the box.
pub fn region_mean(image: &GrayImage, bbox: &BoundingBox) -> f64 {
    let Some(region) = crop_gray(image, bbox) else {
        return 0.0;
    };
    let sum: u64 = region.pixels().map(|p| u64::from(p[0])).sum();
    sum as f64 / f64::from(region.width() * region.height())
}

fn clip(bbox: &BoundingBox, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    let x0 = bbox.x.clamp(0, width as i32) as u32;
    let y0 = bbox.y.clamp(0, height as i32) as u32;
    let x1 = bbox.right().clamp(0, width as i32) as u32;
    let y1 = bbox.bottom().clamp(0, height as i32) as u32;
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some((x0, y0, x1 - x0, y1 - y0))
}
