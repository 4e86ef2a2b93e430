//! Minimal 2D raster surface used to paint template layers.
//!
//! Painting needs only path fill, path stroke, clipped rectangle fill and
//! canvas-to-canvas compositing. Coverage is sampled at integer pixel
//! coordinates with a nonzero winding rule and no anti-aliasing, which keeps
//! output byte-for-byte reproducible.

use cgmath::InnerSpace;
use image::{Rgba, RgbaImage};
use rayon::prelude::*;

use super::palette::ShellGradient;
use crate::util_2d::{perp, Vector2};

pub const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CompositeMode {
    /// Source painted on top of the destination.
    SourceOver,
    /// Source painted underneath; opaque destination pixels are unchanged.
    DestinationOver,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Paint {
    Solid(Rgba<u8>),
    Gradient(ShellGradient),
}

impl Paint {
    fn color_at(&self, x: u32, y: u32) -> Rgba<u8> {
        match self {
            Paint::Solid(c) => *c,
            Paint::Gradient(g) => g.color_at(Vector2::new(x as f64, y as f64)),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct SubPath {
    points: Vec<Vector2>,
    closed: bool,
}

/// Polylines and polygons in pixel coordinates. Filling treats every
/// subpath as closed; stroking honours [`Path::close`].
#[derive(Debug, Clone, Default)]
pub struct Path {
    subpaths: Vec<SubPath>,
}

impl Path {
    pub fn new() -> Self {
        Path::default()
    }

    pub fn move_to(&mut self, p: Vector2) -> &mut Self {
        self.subpaths.push(SubPath { points: vec![p], closed: false });
        self
    }

    pub fn line_to(&mut self, p: Vector2) -> &mut Self {
        match self.subpaths.last_mut() {
            Some(sp) if !sp.closed => sp.points.push(p),
            _ => {
                self.move_to(p);
            }
        }
        self
    }

    pub fn close(&mut self) -> &mut Self {
        if let Some(sp) = self.subpaths.last_mut() {
            sp.closed = true;
        }
        self
    }

    pub fn polygon(points: &[Vector2]) -> Self {
        let mut path = Path::new();
        path.add_polygon(points);
        path
    }

    pub fn add_polygon(&mut self, points: &[Vector2]) -> &mut Self {
        self.subpaths.push(SubPath { points: points.to_vec(), closed: true });
        self
    }

    pub fn rect(x: f64, y: f64, w: f64, h: f64) -> Self {
        Path::polygon(&[
            Vector2::new(x, y),
            Vector2::new(x + w, y),
            Vector2::new(x + w, y + h),
            Vector2::new(x, y + h),
        ])
    }

    pub fn line(a: Vector2, b: Vector2) -> Self {
        let mut path = Path::new();
        path.move_to(a).line_to(b);
        path
    }

    pub fn is_empty(&self) -> bool {
        self.subpaths.iter().all(|sp| sp.points.is_empty())
    }

    /// Every directed edge, including the implicit closing edge of each subpath.
    fn fill_edges(&self) -> impl Iterator<Item = (Vector2, Vector2)> + '_ {
        self.subpaths.iter().flat_map(|sp| {
            let n = sp.points.len();
            (0..if n > 1 { n } else { 0 }).map(move |i| (sp.points[i], sp.points[(i + 1) % n]))
        })
    }

    /// Visible segments for stroking.
    fn stroke_segments(&self) -> impl Iterator<Item = (Vector2, Vector2)> + '_ {
        self.subpaths.iter().flat_map(|sp| {
            let n = sp.points.len();
            let count = match n {
                0 | 1 => 0,
                _ if sp.closed && n > 2 => n,
                _ => n - 1,
            };
            (0..count).map(move |i| (sp.points[i], sp.points[(i + 1) % n]))
        })
    }

    /// Outline of a stroke of `width` along this path: one rectangle with
    /// square caps per segment, all wound the same way.
    pub fn stroke_outline(&self, width: f64) -> Path {
        let half = width.max(1.0) * 0.5;
        let mut out = Path::new();
        for (a, b) in self.stroke_segments() {
            let d = b - a;
            let len = d.magnitude();
            let dir = if len > 1e-12 { d / len } else { Vector2::new(1.0, 0.0) };
            let n = perp(dir) * half;
            let (a, b) = (a - dir * half, b + dir * half);
            out.add_polygon(&[a + n, b + n, b - n, a - n]);
        }
        out
    }
}

/// Straight-alpha source-over of `src` onto `dst`.
pub fn blend_over(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let (sa, da) = (src.0[3] as u32, dst.0[3] as u32);
    if sa == 255 || da == 0 {
        return src;
    }
    if sa == 0 {
        return dst;
    }
    // Alpha scaled by 255².
    let out_a = sa * 255 + da * (255 - sa);
    let mut out = [0u8; 4];
    for c in 0..3 {
        let num = src.0[c] as u32 * sa * 255 + dst.0[c] as u32 * da * (255 - sa);
        out[c] = ((num + out_a / 2) / out_a) as u8;
    }
    out[3] = ((out_a + 127) / 255) as u8;
    Rgba(out)
}

pub fn composite(dst: Rgba<u8>, src: Rgba<u8>, mode: CompositeMode) -> Rgba<u8> {
    match mode {
        CompositeMode::SourceOver => blend_over(dst, src),
        CompositeMode::DestinationOver => blend_over(src, dst),
    }
}

/// Raster surface contract shared by all layer painters.
pub trait Canvas {
    fn size(&self) -> u32;

    fn fill_path(&mut self, path: &Path, paint: &Paint);

    fn stroke_path(&mut self, path: &Path, width: f64, paint: &Paint) {
        self.fill_path(&path.stroke_outline(width), paint);
    }

    /// Fill the pixels of `[x, x + w) × [y, y + h)`, clipped to the canvas.
    fn fill_rect(&mut self, x: f64, y: f64, w: f64, h: f64, paint: &Paint);

    /// Composite `src`, shifted by `(dx, dy)`, onto this canvas.
    fn draw_canvas(&mut self, src: &Self, dx: i32, dy: i32, mode: CompositeMode)
    where
        Self: Sized;

    /// Pixels as straight-alpha RGBA.
    fn to_rgba(&self) -> RgbaImage;
}

/// CPU canvas backed by an [`RgbaImage`].
#[derive(Debug, Clone, PartialEq)]
pub struct SoftwareCanvas {
    image: RgbaImage,
}

impl SoftwareCanvas {
    /// Fully transparent square canvas.
    pub fn new(size: u32) -> Self {
        SoftwareCanvas { image: RgbaImage::new(size, size) }
    }

    pub fn filled(size: u32, color: Rgba<u8>) -> Self {
        SoftwareCanvas { image: RgbaImage::from_pixel(size, size, color) }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    pub fn pixel(&self, x: u32, y: u32) -> Rgba<u8> {
        *self.image.get_pixel(x, y)
    }

    pub fn put_pixel(&mut self, x: u32, y: u32, color: Rgba<u8>) {
        self.image.put_pixel(x, y, color);
    }

    fn blend_pixel(&mut self, x: u32, y: u32, color: Rgba<u8>) {
        let px = self.image.get_pixel_mut(x, y);
        *px = blend_over(*px, color);
    }

    /// Blend `paint` over pixels `x0..x1` of row `y`.
    fn blend_span(&mut self, y: u32, x0: u32, x1: u32, paint: &Paint) {
        for x in x0..x1 {
            let c = paint.color_at(x, y);
            self.blend_pixel(x, y, c);
        }
    }
}

/// First pixel whose sample coordinate is `>= v`, clipped to `[0, limit]`.
fn first_pixel_at_or_after(v: f64, limit: u32) -> u32 {
    v.ceil().clamp(0.0, limit as f64) as u32
}

impl Canvas for SoftwareCanvas {
    fn size(&self) -> u32 {
        self.image.width()
    }

    fn fill_path(&mut self, path: &Path, paint: &Paint) {
        let size = self.size();
        let edges: Vec<(Vector2, Vector2)> = path
            .fill_edges()
            .filter(|(a, b)| a.y != b.y && a.x.is_finite() && a.y.is_finite() && b.x.is_finite() && b.y.is_finite())
            .collect();
        if edges.is_empty() {
            return;
        }
        let (y_lo, y_hi) = edges.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (a, b)| {
            (lo.min(a.y).min(b.y), hi.max(a.y).max(b.y))
        });
        let row_start = first_pixel_at_or_after(y_lo, size);
        let row_end = first_pixel_at_or_after(y_hi, size);

        let mut crossings: Vec<(f64, i32)> = Vec::new();
        for y in row_start..row_end {
            let yc = y as f64;
            crossings.clear();
            for (a, b) in &edges {
                let (lo, hi, winding) = if a.y < b.y { (a, b, 1) } else { (b, a, -1) };
                if lo.y <= yc && yc < hi.y {
                    let x = lo.x + (yc - lo.y) * (hi.x - lo.x) / (hi.y - lo.y);
                    crossings.push((x, winding));
                }
            }
            crossings.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut winding = 0;
            for pair in crossings.windows(2) {
                winding += pair[0].1;
                if winding != 0 {
                    let x0 = first_pixel_at_or_after(pair[0].0, size);
                    let x1 = first_pixel_at_or_after(pair[1].0, size);
                    self.blend_span(y, x0, x1, paint);
                }
            }
        }
    }

    fn fill_rect(&mut self, x: f64, y: f64, w: f64, h: f64, paint: &Paint) {
        if !(w > 0.0 && h > 0.0) {
            return;
        }
        let size = self.size();
        let (x0, x1) = (first_pixel_at_or_after(x, size), first_pixel_at_or_after(x + w, size));
        let (y0, y1) = (first_pixel_at_or_after(y, size), first_pixel_at_or_after(y + h, size));
        for row in y0..y1 {
            self.blend_span(row, x0, x1, paint);
        }
    }

    fn draw_canvas(&mut self, src: &Self, dx: i32, dy: i32, mode: CompositeMode) {
        let w = self.image.width() as i64;
        let (sw, sh) = (src.image.width() as i64, src.image.height() as i64);
        let row_bytes = w as usize * 4;
        self.image
            .par_chunks_mut(row_bytes)
            .enumerate()
            .for_each(|(y, row)| {
                let sy = y as i64 - dy as i64;
                if sy < 0 || sy >= sh {
                    return;
                }
                for x in 0..w {
                    let sx = x - dx as i64;
                    if sx < 0 || sx >= sw {
                        continue;
                    }
                    let s = *src.image.get_pixel(sx as u32, sy as u32);
                    let i = x as usize * 4;
                    let d = Rgba([row[i], row[i + 1], row[i + 2], row[i + 3]]);
                    row[i..i + 4].copy_from_slice(&composite(d, s, mode).0);
                }
            });
    }

    fn to_rgba(&self) -> RgbaImage {
        self.image.clone()
    }
}
