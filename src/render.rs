//! Overlay rendering.
//!
//! The renderer is the presentation side of the pipeline contract: it turns a
//! frame plus its detections into an annotated image. It must never take the
//! processing loop down, so any drawing failure degrades to the unmodified
//! frame.

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_hollow_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut,
};
use imageproc::rect::Rect;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use crate::config::DisplayConfig;
use crate::detect::strategies::Trail;
use crate::detect::{Category, Detection};
use crate::frame::Frame;
use crate::imaging::ColorMap;

const HEATMAP_DECAY: f32 = 0.95;
const HEATMAP_RADIUS: i32 = 10;
const HEATMAP_ALPHA: f32 = 0.3;
const ORIGINAL_ALPHA: f32 = 0.3;
const CENTER_RADIUS: i32 = 5;
const CENTER_RING_RADIUS: i32 = 7;
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

pub fn category_color(category: Category) -> Rgb<u8> {
    match category {
        Category::Small => Rgb([0, 255, 0]),
        Category::Medium => Rgb([255, 165, 0]),
        Category::Large => Rgb([255, 0, 0]),
        Category::Bird => Rgb([0, 191, 255]),
        Category::Unknown => Rgb([128, 0, 128]),
    }
}

/// Annotated frame handed to the presentation layer.
#[derive(Clone, Debug)]
pub struct OverlayFrame {
    pub image: RgbImage,
    pub captured_at: Instant,
    pub detections: Vec<Detection>,
}

pub trait Renderer: Send {
    fn render(&mut self, frame: &Frame, detections: &[Detection]) -> OverlayFrame;

    /// Render with motion trails. Renderers without trail support ignore them.
    fn render_with_trails(
        &mut self,
        frame: &Frame,
        detections: &[Detection],
        _trails: Option<&BTreeMap<u64, Trail>>,
    ) -> OverlayFrame {
        self.render(frame, detections)
    }
}

pub struct OverlayRenderer {
    display: DisplayConfig,
    heat: Vec<f32>,
    heat_dims: (u32, u32),
}

impl OverlayRenderer {
    pub fn new(display: DisplayConfig) -> Self {
        Self {
            display,
            heat: Vec::new(),
            heat_dims: (0, 0),
        }
    }

    fn annotate(
        &mut self,
        frame: &Frame,
        detections: &[Detection],
        trails: Option<&BTreeMap<u64, Trail>>,
    ) -> Result<RgbImage> {
        let mut canvas = frame.image().clone();

        if self.display.show_trails {
            if let Some(trails) = trails {
                draw_trails(&mut canvas, trails);
            }
        }
        for detection in detections {
            draw_detection(&mut canvas, detection, self.display.show_contours);
        }
        if self.display.show_heatmap {
            self.accumulate_heat(frame.width(), frame.height(), detections);
            blend_heatmap(&mut canvas, &self.heat)?;
        }
        if self.display.show_original {
            blend_original(&mut canvas, frame.image())?;
        }
        Ok(canvas)
    }

    fn accumulate_heat(&mut self, width: u32, height: u32, detections: &[Detection]) {
        if self.heat_dims != (width, height) {
            self.heat = vec![0.0; (width as usize) * (height as usize)];
            self.heat_dims = (width, height);
        }
        for v in self.heat.iter_mut() {
            *v *= HEATMAP_DECAY;
        }
        let r2 = HEATMAP_RADIUS * HEATMAP_RADIUS;
        for detection in detections {
            let (cx, cy) = detection.center;
            for y in (cy - HEATMAP_RADIUS).max(0)..=(cy + HEATMAP_RADIUS).min(height as i32 - 1) {
                for x in (cx - HEATMAP_RADIUS).max(0)..=(cx + HEATMAP_RADIUS).min(width as i32 - 1) {
                    let (dx, dy) = (x - cx, y - cy);
                    if dx * dx + dy * dy <= r2 {
                        self.heat[(y as u32 * width + x as u32) as usize] += 1.0;
                    }
                }
            }
        }
    }
}

impl Renderer for OverlayRenderer {
    fn render(&mut self, frame: &Frame, detections: &[Detection]) -> OverlayFrame {
        self.render_with_trails(frame, detections, None)
    }

    fn render_with_trails(
        &mut self,
        frame: &Frame,
        detections: &[Detection],
        trails: Option<&BTreeMap<u64, Trail>>,
    ) -> OverlayFrame {
        let image = match panic::catch_unwind(AssertUnwindSafe(|| {
            self.annotate(frame, detections, trails)
        })) {
            Ok(Ok(image)) => image,
            Ok(Err(err)) => {
                log::error!("render: overlay failed: {}", err);
                frame.image().clone()
            }
            Err(_) => {
                log::error!("render: overlay panicked");
                frame.image().clone()
            }
        };
        OverlayFrame {
            image,
            captured_at: frame.timestamp(),
            detections: detections.to_vec(),
        }
    }
}

fn draw_detection(canvas: &mut RgbImage, detection: &Detection, show_contour: bool) {
    let color = category_color(detection.category);
    let bbox = detection.bbox;
    if bbox.width > 0 && bbox.height > 0 {
        let outer = Rect::at(bbox.x, bbox.y).of_size(bbox.width as u32, bbox.height as u32);
        draw_hollow_rect_mut(canvas, outer, color);
        if bbox.width > 2 && bbox.height > 2 {
            let inner =
                Rect::at(bbox.x + 1, bbox.y + 1).of_size(bbox.width as u32 - 2, bbox.height as u32 - 2);
            draw_hollow_rect_mut(canvas, inner, color);
        }
    }

    draw_filled_circle_mut(canvas, detection.center, CENTER_RADIUS, color);
    draw_hollow_circle_mut(canvas, detection.center, CENTER_RING_RADIUS, WHITE);

    if show_contour {
        if let Some(contour) = &detection.contour {
            for (i, p) in contour.iter().enumerate() {
                let q = &contour[(i + 1) % contour.len()];
                draw_line_segment_mut(
                    canvas,
                    (p.x as f32, p.y as f32),
                    (q.x as f32, q.y as f32),
                    color,
                );
            }
        }
    }
}

fn draw_trails(canvas: &mut RgbImage, trails: &BTreeMap<u64, Trail>) {
    for trail in trails.values() {
        let points: Vec<_> = trail.points.iter().map(|p| p.center).collect();
        for pair in points.windows(2) {
            draw_line_segment_mut(
                canvas,
                (pair[0].0 as f32, pair[0].1 as f32),
                (pair[1].0 as f32, pair[1].1 as f32),
                trail.color,
            );
        }
    }
}

fn blend_heatmap(canvas: &mut RgbImage, heat: &[f32]) -> Result<()> {
    if heat.len() != canvas.as_raw().len() / 3 {
        return Err(anyhow!("heatmap size does not match frame"));
    }
    let peak = heat.iter().copied().fold(0.0f32, f32::max);
    if peak <= 0.0 {
        return Ok(());
    }
    for (pixel, h) in canvas.pixels_mut().zip(heat) {
        let level = ((h / peak) * 255.0).clamp(0.0, 255.0) as u8;
        let hot = ColorMap::Jet.color(level);
        for c in 0..3 {
            pixel[c] = mix(pixel[c], hot[c], HEATMAP_ALPHA);
        }
    }
    Ok(())
}

fn blend_original(canvas: &mut RgbImage, original: &RgbImage) -> Result<()> {
    if canvas.dimensions() != original.dimensions() {
        return Err(anyhow!("overlay size does not match frame"));
    }
    for (pixel, source) in canvas.pixels_mut().zip(original.pixels()) {
        for c in 0..3 {
            pixel[c] = mix(pixel[c], source[c], ORIGINAL_ALPHA);
        }
    }
    Ok(())
}

/// `base * (1 - alpha) + top * alpha`.
fn mix(base: u8, top: u8, alpha: f32) -> u8 {
    (f32::from(base) * (1.0 - alpha) + f32::from(top) * alpha).round() as u8
}
