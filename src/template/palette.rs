//! Deterministic per-shell gradients.
//!
//! Every shell gets a two-color gradient (plus a hue-interpolated midpoint)
//! picked from a small library and perturbed by a hash of the shell identity,
//! so neighbouring islands are easy to tell apart and the same model always
//! produces the same colors.

use cgmath::InnerSpace;
use image::Rgba;

use super::mapper::UvMapper;
use super::types::UvShell;
use crate::util_2d::{centroid, principal_axis, Vector2};

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Hsv {
    /// Degrees in `[0, 360)`.
    pub h: f64,
    pub s: f64,
    pub v: f64,
}

const fn hsv(h: f64, s: f64, v: f64) -> Hsv {
    Hsv { h, s, v }
}

// lavender → light blue, pink → peach, teal → green, magenta → purple
const PALETTE_LIBRARY: [(Hsv, Hsv); 4] = [
    (hsv(274.0, 0.58, 0.92), hsv(214.0, 0.56, 0.94)),
    (hsv(326.0, 0.64, 0.92), hsv(28.0, 0.64, 0.93)),
    (hsv(188.0, 0.69, 0.89), hsv(132.0, 0.62, 0.92)),
    (hsv(314.0, 0.67, 0.90), hsv(272.0, 0.66, 0.89)),
];

const HUE_JITTER: f64 = 8.0;
const SAT_JITTER: f64 = 0.03;
const VAL_JITTER: f64 = 0.02;
const SAT_RANGE: (f64, f64) = (0.55, 0.75);
const VAL_RANGE: (f64, f64) = (0.85, 0.95);

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

pub fn fnv1a64(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(FNV_OFFSET, |h, b| (h ^ *b as u64).wrapping_mul(FNV_PRIME))
}

/// Index into the base palette library for a shell key.
pub fn palette_index(shell_key: &str) -> usize {
    (fnv1a64(shell_key.as_bytes()) % PALETTE_LIBRARY.len() as u64) as usize
}

/// Maps a 16-bit slice of `seed` to `[-amplitude, amplitude]`.
fn jitter(seed: u64, shift: u32, amplitude: f64) -> f64 {
    let bits = ((seed >> shift) & 0xffff) as f64 / 65535.0;
    bits * 2.0 * amplitude - amplitude
}

/// Left and right gradient colors of a shell.
pub fn palette_for_key(shell_key: &str) -> (Hsv, Hsv) {
    let seed = fnv1a64(shell_key.as_bytes());
    let (left, right) = PALETTE_LIBRARY[palette_index(shell_key)];
    let dh = jitter(seed, 8, HUE_JITTER);
    let ds = jitter(seed, 24, SAT_JITTER);
    let dv = jitter(seed, 40, VAL_JITTER);
    let perturb = |c: Hsv| Hsv {
        h: (c.h + dh).rem_euclid(360.0),
        s: (c.s + ds).clamp(SAT_RANGE.0, SAT_RANGE.1),
        v: (c.v + dv).clamp(VAL_RANGE.0, VAL_RANGE.1),
    };
    (perturb(left), perturb(right))
}

/// Interpolate along the shortest hue arc.
pub fn lerp_hsv(a: Hsv, b: Hsv, t: f64) -> Hsv {
    let dh = (b.h - a.h + 180.0).rem_euclid(360.0) - 180.0;
    Hsv {
        h: (a.h + dh * t).rem_euclid(360.0),
        s: a.s + (b.s - a.s) * t,
        v: a.v + (b.v - a.v) * t,
    }
}

pub fn hsv_to_rgb(c: Hsv) -> Rgba<u8> {
    let h = c.h.rem_euclid(360.0) / 60.0;
    let s = c.s.clamp(0.0, 1.0);
    let v = c.v.clamp(0.0, 1.0);
    let chroma = v * s;
    let x = chroma * (1.0 - ((h % 2.0) - 1.0).abs());
    let (r, g, b) = match h as u32 {
        0 => (chroma, x, 0.0),
        1 => (x, chroma, 0.0),
        2 => (0.0, chroma, x),
        3 => (0.0, x, chroma),
        4 => (x, 0.0, chroma),
        _ => (chroma, 0.0, x),
    };
    let m = v - chroma;
    let to_u8 = |f: f64| ((f + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgba([to_u8(r), to_u8(g), to_u8(b), 255])
}

fn lerp_rgba(a: Rgba<u8>, b: Rgba<u8>, t: f64) -> Rgba<u8> {
    let mut out = [0u8; 4];
    for (i, o) in out.iter_mut().enumerate() {
        let (x, y) = (a.0[i] as f64, b.0[i] as f64);
        *o = (x + (y - x) * t).round().clamp(0.0, 255.0) as u8;
    }
    Rgba(out)
}

/// Linear gradient in pixel space with three evenly spaced stops.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ShellGradient {
    pub start: Vector2,
    pub end: Vector2,
    pub stops: [Rgba<u8>; 3],
}

impl ShellGradient {
    pub fn from_key(shell_key: &str, start: Vector2, end: Vector2) -> Self {
        let (left, right) = palette_for_key(shell_key);
        ShellGradient {
            start,
            end,
            stops: [hsv_to_rgb(left), hsv_to_rgb(lerp_hsv(left, right, 0.5)), hsv_to_rgb(right)],
        }
    }

    /// Gradient of shell number `index` running along its principal UV axis,
    /// centered on the UV centroid and spanning the projection of all its
    /// points. `None` when the shell has no extent along any axis.
    pub fn for_shell(shell: &UvShell, index: usize, mapper: &dyn UvMapper) -> Option<Self> {
        let points: Vec<Vector2> = shell.points().collect();
        let axis = principal_axis(&points)?;
        let center = centroid(&points)?;
        let (lo, hi) = points.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
            let t = (*p - center).dot(axis);
            (lo.min(t), hi.max(t))
        });
        if !(hi - lo > 1e-9) {
            return None;
        }
        let start = mapper.to_pixel(index, center + axis * lo);
        let end = mapper.to_pixel(index, center + axis * hi);
        if (end - start).magnitude2() < 1e-9 {
            return None;
        }
        Some(ShellGradient::from_key(&shell.key(), start, end))
    }

    pub fn color_at(&self, p: Vector2) -> Rgba<u8> {
        let d = self.end - self.start;
        let len2 = d.magnitude2();
        let t = if len2 > 0.0 { ((p - self.start).dot(d) / len2).clamp(0.0, 1.0) } else { 0.5 };
        if t <= 0.5 {
            lerp_rgba(self.stops[0], self.stops[1], t * 2.0)
        } else {
            lerp_rgba(self.stops[1], self.stops[2], (t - 0.5) * 2.0)
        }
    }
}
