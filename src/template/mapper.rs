//! Mapping from UV space to template pixels.
//!
//! The default [`DirectUvMapper`] keeps the authored UV layout, which is what
//! artists expect when the template is applied back to the model. The
//! [`PackedMapper`] repacks shells with a MaxRects bin packer into a denser
//! layout and is only used when explicitly requested.

use serde::{Deserialize, Serialize};

use super::types::UvShell;
use crate::error::{Result, TemplateError};
use crate::util_2d::{clamp01, Vector2};

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutMode {
    #[default]
    Direct,
    Packed,
}

/// Strategy turning shell UVs into pixel coordinates.
pub trait UvMapper: Send + Sync {
    fn size(&self) -> u32;

    /// Pixel position of `uv` belonging to shell number `shell`, counted in
    /// the slice the mapper was built from.
    fn to_pixel(&self, shell: usize, uv: Vector2) -> Vector2;
}

pub fn build_mapper(mode: LayoutMode, shells: &[UvShell], size: u32) -> Result<Box<dyn UvMapper>> {
    log::debug!("layout mode {mode:?} for {} shells", shells.len());
    Ok(match mode {
        LayoutMode::Direct => Box::new(DirectUvMapper::new(shells, size)?),
        LayoutMode::Packed => Box::new(PackedMapper::new(shells, size)?),
    })
}

/// `x = clamp01(u)·(size−1)`, `y = (1 − clamp01(v))·(size−1)`.
///
/// V points up in UV space and down in raster rows, hence the flip.
pub fn uv_to_pixel(uv: Vector2, size: u32) -> Vector2 {
    let extent = (size.max(1) - 1) as f64;
    Vector2::new(clamp01(uv.x) * extent, (1.0 - clamp01(uv.y)) * extent)
}

#[derive(Debug, Clone)]
pub struct DirectUvMapper {
    size: u32,
}

impl DirectUvMapper {
    pub fn new(shells: &[UvShell], size: u32) -> Result<Self> {
        if shells.is_empty() {
            return Err(TemplateError::LayoutFailed);
        }
        Ok(DirectUvMapper { size })
    }
}

impl UvMapper for DirectUvMapper {
    fn size(&self) -> u32 {
        self.size
    }

    fn to_pixel(&self, _shell: usize, uv: Vector2) -> Vector2 {
        uv_to_pixel(uv, self.size)
    }
}

/// Integer rectangle used by the packer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PackRect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl PackRect {
    fn right(&self) -> u32 {
        self.x + self.w
    }

    fn bottom(&self) -> u32 {
        self.y + self.h
    }

    fn intersects(&self, o: &PackRect) -> bool {
        self.x < o.right() && o.x < self.right() && self.y < o.bottom() && o.y < self.bottom()
    }

    fn contains(&self, o: &PackRect) -> bool {
        o.x >= self.x && o.y >= self.y && o.right() <= self.right() && o.bottom() <= self.bottom()
    }
}

/// Placement returned by the packer. When `rotated`, the rectangle holds the
/// item turned by 90°, so `w`/`h` are swapped relative to the request.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Placement {
    pub rect: PackRect,
    pub rotated: bool,
}

/// MaxRects bin packer with the best-short-side-fit heuristic.
pub struct MaxRectsPacker {
    free: Vec<PackRect>,
    allow_rotation: bool,
}

impl MaxRectsPacker {
    pub fn new(width: u32, height: u32, allow_rotation: bool) -> Self {
        MaxRectsPacker {
            free: vec![PackRect { x: 0, y: 0, w: width, h: height }],
            allow_rotation,
        }
    }

    pub fn insert(&mut self, w: u32, h: u32) -> Option<Placement> {
        let mut best: Option<(Placement, (u32, u32))> = None;
        let mut consider = |free: &PackRect, w: u32, h: u32, rotated: bool| {
            if w > free.w || h > free.h {
                return;
            }
            let (dw, dh) = (free.w - w, free.h - h);
            let score = (dw.min(dh), dw.max(dh));
            if best.as_ref().is_none_or(|(_, s)| score < *s) {
                let rect = PackRect { x: free.x, y: free.y, w, h };
                best = Some((Placement { rect, rotated }, score));
            }
        };
        for free in &self.free {
            consider(free, w, h, false);
            if self.allow_rotation && w != h {
                consider(free, h, w, true);
            }
        }
        let (placement, _) = best?;
        self.split_free(&placement.rect);
        self.prune_free();
        Some(placement)
    }

    fn split_free(&mut self, used: &PackRect) {
        let mut next = Vec::with_capacity(self.free.len() + 4);
        for f in &self.free {
            if !f.intersects(used) {
                next.push(*f);
                continue;
            }
            if used.x > f.x {
                next.push(PackRect { x: f.x, y: f.y, w: used.x - f.x, h: f.h });
            }
            if used.right() < f.right() {
                next.push(PackRect { x: used.right(), y: f.y, w: f.right() - used.right(), h: f.h });
            }
            if used.y > f.y {
                next.push(PackRect { x: f.x, y: f.y, w: f.w, h: used.y - f.y });
            }
            if used.bottom() < f.bottom() {
                next.push(PackRect { x: f.x, y: used.bottom(), w: f.w, h: f.bottom() - used.bottom() });
            }
        }
        self.free = next;
    }

    /// Drop free rectangles fully contained in another one.
    fn prune_free(&mut self) {
        let free = std::mem::take(&mut self.free);
        for (i, a) in free.iter().enumerate() {
            let redundant = free.iter().enumerate().any(|(j, b)| {
                // Of two identical rectangles only the first survives.
                i != j && b.contains(a) && (a != b || j < i)
            });
            if !redundant {
                self.free.push(*a);
            }
        }
    }
}

/// Pack all `sizes` into a `width`×`height` bin, largest area first (then
/// longest side). Results are returned in input order; `None` if anything
/// does not fit.
pub fn pack_rects(sizes: &[(u32, u32)], width: u32, height: u32, allow_rotation: bool) -> Option<Vec<Placement>> {
    let mut order: Vec<usize> = (0..sizes.len()).collect();
    order.sort_by_key(|&i| {
        let (w, h) = sizes[i];
        std::cmp::Reverse((w as u64 * h as u64, w.max(h)))
    });

    let mut packer = MaxRectsPacker::new(width, height, allow_rotation);
    let mut placed = vec![None; sizes.len()];
    for i in order {
        let (w, h) = sizes[i];
        placed[i] = Some(packer.insert(w, h)?);
    }
    placed.into_iter().collect()
}

const PACK_FILL_RATIO: f64 = 0.75;
const PACK_ATTEMPTS: usize = 32;
const PACK_SHRINK: f64 = 0.9;

#[derive(Debug, Clone)]
struct ShellSlot {
    origin: Vector2,
    /// Content size in pixels before rotation.
    extent: Vector2,
    rotated: bool,
    min_uv: Vector2,
    span_uv: Vector2,
}

/// Repacked layout: every shell's UV bounds get their own slot.
#[derive(Debug, Clone)]
pub struct PackedMapper {
    size: u32,
    slots: Vec<ShellSlot>,
}

impl PackedMapper {
    pub fn new(shells: &[UvShell], size: u32) -> Result<Self> {
        if shells.is_empty() {
            return Err(TemplateError::LayoutFailed);
        }
        let padding = (size / 256).max(2);
        let spans: Vec<Vector2> = shells
            .iter()
            .map(|s| Vector2::new(s.bounds.width().max(1e-6), s.bounds.height().max(1e-6)))
            .collect();
        let area: f64 = spans.iter().map(|s| s.x * s.y).sum();
        let usable = size.saturating_sub(2 * padding).max(1) as f64;
        let longest = spans.iter().fold(0.0f64, |m, s| m.max(s.x).max(s.y));
        let mut scale = (usable * (PACK_FILL_RATIO / area).sqrt()).min(usable / longest);

        for _ in 0..PACK_ATTEMPTS {
            let sizes: Vec<(u32, u32)> = spans
                .iter()
                .map(|s| {
                    let w = (s.x * scale).ceil().max(1.0) as u32 + padding;
                    let h = (s.y * scale).ceil().max(1.0) as u32 + padding;
                    (w, h)
                })
                .collect();
            if let Some(placements) = pack_rects(&sizes, size, size, true) {
                let half = padding as f64 * 0.5;
                let slots = placements
                    .iter()
                    .zip(shells.iter().zip(&spans))
                    .map(|(p, (shell, span))| ShellSlot {
                        origin: Vector2::new(p.rect.x as f64 + half, p.rect.y as f64 + half),
                        extent: *span * scale,
                        rotated: p.rotated,
                        min_uv: Vector2::new(shell.bounds.min_u, shell.bounds.min_v),
                        span_uv: *span,
                    })
                    .collect();
                log::debug!("packed {} shells at {:.1} px per UV unit", shells.len(), scale);
                return Ok(PackedMapper { size, slots });
            }
            scale *= PACK_SHRINK;
        }
        log::warn!("could not pack {} shells into {size}px", shells.len());
        Err(TemplateError::LayoutFailed)
    }
}

impl UvMapper for PackedMapper {
    fn size(&self) -> u32 {
        self.size
    }

    fn to_pixel(&self, shell: usize, uv: Vector2) -> Vector2 {
        let Some(slot) = self.slots.get(shell) else {
            return uv_to_pixel(uv, self.size);
        };
        let lu = clamp01((uv.x - slot.min_uv.x) / slot.span_uv.x);
        let lv = 1.0 - clamp01((uv.y - slot.min_uv.y) / slot.span_uv.y);
        if slot.rotated {
            // Quarter turn: (lu, lv) -> (lv, 1 - lu).
            slot.origin + Vector2::new(lv * slot.extent.y, (1.0 - lu) * slot.extent.x)
        } else {
            slot.origin + Vector2::new(lu * slot.extent.x, lv * slot.extent.y)
        }
    }
}
