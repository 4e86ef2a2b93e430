//! Quad wireframe recovery from triangulated UV shells.
//!
//! Vehicle bodies are modelled as quad cages and triangulated on export, so
//! the raw triangle wireframe is cluttered with diagonals. Adjacent triangle
//! pairs that form a well shaped quad are merged greedily and their shared
//! edge is dropped from the wireframe.

use fxhash::FxHashMap;

use super::types::UvShell;
use crate::util_2d::{centroid, cross, perp, principal_axis, Vector2};
use cgmath::InnerSpace;

/// Vertices closer than this (in UV units) are welded together.
const WELD_QUANTUM: f64 = 1e-6;
/// Segments shorter than this many pixels are not drawn.
const MIN_SEGMENT_PX: f64 = 0.5;
/// Fallback boxes are at least this many pixels across.
const MIN_BOX_PX: f64 = 4.0;
/// Relative inset of the inner rectangle of a fallback box.
const BOX_INSET: f64 = 0.16;

/// A wireframe line in UV space.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct WireSegment {
    pub a: Vector2,
    pub b: Vector2,
}

impl WireSegment {
    pub fn new(a: Vector2, b: Vector2) -> Self {
        WireSegment { a, b }
    }

    /// Length in pixels on a canvas of edge `size`.
    pub fn pixel_length(&self, size: u32) -> f64 {
        (self.b - self.a).magnitude() * (size.max(2) - 1) as f64
    }
}

/// Welded, indexed version of a shell's triangles.
struct IndexedShell {
    verts: Vec<Vector2>,
    tris: Vec<[u32; 3]>,
    /// Unordered vertex pair → incident triangles, in first-seen order.
    edges: Vec<((u32, u32), Vec<u32>)>,
}

/// Grid cell of `p`; points in the same cell are the same vertex.
fn weld_key(p: Vector2) -> (i64, i64) {
    ((p.x / WELD_QUANTUM).round() as i64, (p.y / WELD_QUANTUM).round() as i64)
}

/// Group triangles into UV islands. Triangles sharing a welded vertex are
/// connected; islands are ordered by their first triangle and list their
/// triangle indices in ascending order.
pub fn connected_components(triangles: &[[Vector2; 3]]) -> Vec<Vec<usize>> {
    let mut by_vertex: FxHashMap<(i64, i64), Vec<usize>> = FxHashMap::default();
    for (i, tri) in triangles.iter().enumerate() {
        for p in tri {
            by_vertex.entry(weld_key(*p)).or_default().push(i);
        }
    }

    let mut visited = vec![false; triangles.len()];
    let mut components = Vec::new();
    for start in 0..triangles.len() {
        if visited[start] {
            continue;
        }
        visited[start] = true;
        let mut stack = vec![start];
        let mut component = Vec::new();
        while let Some(t) = stack.pop() {
            component.push(t);
            for p in &triangles[t] {
                for &n in by_vertex.get(&weld_key(*p)).into_iter().flatten() {
                    if !visited[n] {
                        visited[n] = true;
                        stack.push(n);
                    }
                }
            }
        }
        component.sort_unstable();
        components.push(component);
    }
    components
}

fn edge_key(a: u32, b: u32) -> (u32, u32) {
    if a < b { (a, b) } else { (b, a) }
}

impl IndexedShell {
    fn build(triangles: &[[Vector2; 3]]) -> IndexedShell {
        let mut lookup: FxHashMap<(i64, i64), u32> = FxHashMap::default();
        let mut verts = Vec::new();
        let mut tris = Vec::with_capacity(triangles.len());

        for tri in triangles {
            let ids = tri.map(|p| {
                *lookup.entry(weld_key(p)).or_insert_with(|| {
                    verts.push(p);
                    (verts.len() - 1) as u32
                })
            });
            if ids[0] != ids[1] && ids[1] != ids[2] && ids[0] != ids[2] {
                tris.push(ids);
            }
        }

        let mut edge_index: FxHashMap<(u32, u32), usize> = FxHashMap::default();
        let mut edges: Vec<((u32, u32), Vec<u32>)> = Vec::new();
        for (i_tri, t) in tris.iter().enumerate() {
            for k in 0..3 {
                let key = edge_key(t[k], t[(k + 1) % 3]);
                let slot = *edge_index.entry(key).or_insert_with(|| {
                    edges.push((key, Vec::new()));
                    edges.len() - 1
                });
                edges[slot].1.push(i_tri as u32);
            }
        }
        IndexedShell { verts, tris, edges }
    }

    fn opposite(&self, tri: u32, edge: (u32, u32)) -> Option<u32> {
        self.tris[tri as usize]
            .iter()
            .copied()
            .find(|&v| v != edge.0 && v != edge.1)
    }
}

/// Shape quality of the quad `ring`, in `(0, 1]`, or `None` if it is too far
/// from convex to be a cage face.
///
/// At least 3 of the 4 turns must share a sign. Fully convex quads score
/// double; both are scaled by how even the side lengths are.
pub fn quad_quality(ring: [Vector2; 4]) -> Option<f64> {
    let (mut pos, mut neg) = (0, 0);
    for i in 0..4 {
        let e0 = ring[(i + 1) % 4] - ring[i];
        let e1 = ring[(i + 2) % 4] - ring[(i + 1) % 4];
        let turn = cross(e0, e1);
        if turn > 0.0 {
            pos += 1;
        } else if turn < 0.0 {
            neg += 1;
        }
    }
    let agree = pos.max(neg);
    if agree < 3 {
        return None;
    }

    let sides = (0..4).map(|i| (ring[(i + 1) % 4] - ring[i]).magnitude());
    let (min_side, max_side) = sides.fold((f64::INFINITY, 0.0f64), |(lo, hi), s| (lo.min(s), hi.max(s)));
    if max_side <= 0.0 {
        return None;
    }
    let convexity = if agree == 4 { 1.0 } else { 0.5 };
    Some(convexity * (0.3 + 0.7 * (min_side / max_side)))
}

/// Shared edges that are diagonals of recovered quads.
///
/// Candidates are visited best first and accepted when neither triangle is
/// already paired, so the result depends on candidate order and is not a
/// global optimum.
fn find_diagonals(shell: &IndexedShell) -> Vec<bool> {
    let mut candidates: Vec<(usize, u32, u32, f64)> = Vec::new();
    for (i_edge, (key, tris)) in shell.edges.iter().enumerate() {
        let &[t0, t1] = tris.as_slice() else {
            continue;
        };
        let (Some(o0), Some(o1)) = (shell.opposite(t0, *key), shell.opposite(t1, *key)) else {
            continue;
        };
        if o0 == o1 {
            continue;
        }
        let v = |i: u32| shell.verts[i as usize];
        let ring = [v(o0), v(key.0), v(o1), v(key.1)];
        if let Some(q) = quad_quality(ring) {
            candidates.push((i_edge, t0, t1, q));
        }
    }
    candidates.sort_by(|a, b| b.3.total_cmp(&a.3));

    let mut matched = vec![false; shell.tris.len()];
    let mut diagonal = vec![false; shell.edges.len()];
    for (i_edge, t0, t1, _) in candidates {
        if matched[t0 as usize] || matched[t1 as usize] {
            continue;
        }
        matched[t0 as usize] = true;
        matched[t1 as usize] = true;
        diagonal[i_edge] = true;
    }
    diagonal
}

/// Rebuild the quad cage wireframe of `shell` for a canvas of edge `size`.
///
/// Degenerate shells (fewer than 3 distinct vertices, or fewer than 4
/// surviving segments) get an oriented box instead, so every shell shows
/// some paintable structure.
pub fn reconstruct_wireframe(shell: &UvShell, size: u32) -> Vec<WireSegment> {
    let indexed = IndexedShell::build(&shell.triangles);
    if indexed.verts.len() < 3 {
        log::debug!("shell {} has {} vertices, using box", shell.key(), indexed.verts.len());
        return oriented_box(&shell.points().collect::<Vec<_>>(), size);
    }

    let diagonal = find_diagonals(&indexed);
    let segments: Vec<WireSegment> = indexed
        .edges
        .iter()
        .zip(&diagonal)
        .filter(|(_, diag)| !**diag)
        .map(|(((a, b), _), _)| {
            WireSegment::new(indexed.verts[*a as usize], indexed.verts[*b as usize])
        })
        .filter(|s| s.pixel_length(size) >= MIN_SEGMENT_PX)
        .collect();

    if segments.len() < 4 {
        log::debug!("shell {} kept {} segments, using box", shell.key(), segments.len());
        return oriented_box(&shell.points().collect::<Vec<_>>(), size);
    }
    segments
}

/// Box aligned to the principal axis of `points`: an outer rectangle, an
/// inset rectangle and four struts joining their corners.
pub fn oriented_box(points: &[Vector2], size: u32) -> Vec<WireSegment> {
    let center = centroid(points).unwrap_or(Vector2::new(0.5, 0.5));
    let axis = principal_axis(points).unwrap_or(Vector2::new(1.0, 0.0));
    let side = perp(axis);

    let (mut t0, mut t1, mut s0, mut s1) = (0.0f64, 0.0f64, 0.0f64, 0.0f64);
    for p in points {
        let d = *p - center;
        let (t, s) = (d.dot(axis), d.dot(side));
        t0 = t0.min(t);
        t1 = t1.max(t);
        s0 = s0.min(s);
        s1 = s1.max(s);
    }
    let min_span = MIN_BOX_PX / (size.max(2) - 1) as f64;
    let widen = |lo: f64, hi: f64| {
        if hi - lo >= min_span {
            (lo, hi)
        } else {
            let mid = (lo + hi) * 0.5;
            (mid - min_span * 0.5, mid + min_span * 0.5)
        }
    };
    let (t0, t1) = widen(t0, t1);
    let (s0, s1) = widen(s0, s1);

    let corner = |t: f64, s: f64| center + axis * t + side * s;
    let rect = |t0: f64, t1: f64, s0: f64, s1: f64| {
        [corner(t0, s0), corner(t1, s0), corner(t1, s1), corner(t0, s1)]
    };
    let (dt, ds) = ((t1 - t0) * BOX_INSET, (s1 - s0) * BOX_INSET);
    let outer = rect(t0, t1, s0, s1);
    let inner = rect(t0 + dt, t1 - dt, s0 + ds, s1 - ds);

    let mut segments = Vec::with_capacity(12);
    for ring in [&outer, &inner] {
        for i in 0..4 {
            segments.push(WireSegment::new(ring[i], ring[(i + 1) % 4]));
        }
    }
    for i in 0..4 {
        segments.push(WireSegment::new(outer[i], inner[i]));
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::types::{TemplateMesh, UvTriangles};

    fn shell_of(triangles: Vec<[Vector2; 3]>) -> UvShell {
        let mesh = TemplateMesh {
            mesh_name: "body".into(),
            triangles: UvTriangles(triangles),
            ..Default::default()
        };
        UvShell::from_mesh(&mesh, 0).unwrap()
    }

    /// Regular `w`×`h` grid of square cells inside [0.1, 0.9]², each cell
    /// split along its lower-left/upper-right diagonal.
    fn grid(w: usize, h: usize) -> Vec<[Vector2; 3]> {
        let cell = 0.8 / w.max(h) as f64;
        let p = |i: usize, j: usize| Vector2::new(0.1 + i as f64 * cell, 0.1 + j as f64 * cell);
        let mut tris = Vec::new();
        for j in 0..h {
            for i in 0..w {
                tris.push([p(i, j), p(i + 1, j), p(i + 1, j + 1)]);
                tris.push([p(i, j), p(i + 1, j + 1), p(i, j + 1)]);
            }
        }
        tris
    }

    fn is_axis_aligned(s: &WireSegment) -> bool {
        (s.a.x - s.b.x).abs() < 1e-9 || (s.a.y - s.b.y).abs() < 1e-9
    }

    #[test]
    fn test_quad_quality() {
        let square = [
            Vector2::new(0.0, 0.0),
            Vector2::new(1.0, 0.0),
            Vector2::new(1.0, 1.0),
            Vector2::new(0.0, 1.0),
        ];
        let q = quad_quality(square).unwrap();
        assert!((q - 1.0).abs() < 1e-12);

        let bowtie = [
            Vector2::new(0.0, 0.0),
            Vector2::new(1.0, 1.0),
            Vector2::new(1.0, 0.0),
            Vector2::new(0.0, 1.0),
        ];
        assert_eq!(quad_quality(bowtie), None);

        let dart = [
            Vector2::new(0.0, 0.0),
            Vector2::new(1.0, 0.0),
            Vector2::new(0.3, 0.3),
            Vector2::new(0.0, 1.0),
        ];
        let q = quad_quality(dart).unwrap();
        assert!(q < 0.5);
    }

    #[test]
    fn test_grid_recovers_quads() {
        let (w, h) = (6, 4);
        let tris = grid(w, h);
        let segments = reconstruct_wireframe(&shell_of(tris), 1024);

        let grid_edges = w * (h + 1) + (w + 1) * h;
        let axis_aligned = segments.iter().filter(|s| is_axis_aligned(s)).count();
        assert!(axis_aligned as f64 >= 0.95 * grid_edges as f64);
        assert_eq!(axis_aligned, segments.len(), "diagonals left in the wireframe");
        assert_eq!(segments.len(), grid_edges);
    }

    #[test]
    fn test_grid_with_alternating_diagonals() {
        let (w, h) = (5, 5);
        let (du, dv) = (0.8 / w as f64, 0.8 / h as f64);
        let p = |i: usize, j: usize| Vector2::new(0.1 + i as f64 * du, 0.1 + j as f64 * dv);
        let mut tris = Vec::new();
        for j in 0..h {
            for i in 0..w {
                if (i + j) % 2 == 0 {
                    tris.push([p(i, j), p(i + 1, j), p(i + 1, j + 1)]);
                    tris.push([p(i, j), p(i + 1, j + 1), p(i, j + 1)]);
                } else {
                    tris.push([p(i, j), p(i + 1, j), p(i, j + 1)]);
                    tris.push([p(i + 1, j), p(i + 1, j + 1), p(i, j + 1)]);
                }
            }
        }
        let segments = reconstruct_wireframe(&shell_of(tris), 1024);
        assert!(segments.iter().all(is_axis_aligned));
        assert_eq!(segments.len(), w * (h + 1) + (w + 1) * h);
    }

    #[test]
    fn test_single_triangle_gets_box() {
        let tri = [Vector2::new(0.2, 0.2), Vector2::new(0.6, 0.25), Vector2::new(0.3, 0.5)];
        let segments = reconstruct_wireframe(&shell_of(vec![tri]), 512);
        assert!(segments.len() >= 4);
        assert_eq!(segments.len(), 12);
    }

    #[test]
    fn test_collapsed_shell_gets_visible_box() {
        let p = Vector2::new(0.5, 0.5);
        let segments = reconstruct_wireframe(&shell_of(vec![[p, p, p]]), 512);
        assert_eq!(segments.len(), 12);
        let outer = &segments[0];
        assert!(outer.pixel_length(512) >= MIN_BOX_PX - 1e-6);
    }

    #[test]
    fn test_box_follows_principal_axis() {
        let angle = 30f64.to_radians();
        let dir = Vector2::new(angle.cos(), angle.sin());
        let c = Vector2::new(0.5, 0.5);
        let points = [c - dir * 0.2, c + dir * 0.2, c + perp(dir) * 0.02];
        let axis = principal_axis(&points).unwrap();
        let side = perp(axis);
        let segments = reconstruct_wireframe(&shell_of(vec![points]), 1024);
        assert_eq!(segments.len(), 12);

        for s in &segments[..4] {
            let d = (s.b - s.a).normalize();
            assert!(cross(d, axis).abs() < 1e-9 || d.dot(axis).abs() < 1e-9, "{d:?} vs {axis:?}");
        }

        let outer: Vec<Vector2> = segments[..4].iter().map(|s| s.a).collect();
        let inner: Vec<Vector2> = segments[4..8].iter().map(|s| s.a).collect();
        let length = (outer[1] - outer[0]).dot(axis).abs();
        let width = (outer[3] - outer[0]).dot(side).abs();
        assert!(length > 0.39 && length > 10.0 * width);
        for i in 0..4 {
            let off = inner[i] - outer[i];
            assert!((off.dot(axis).abs() - BOX_INSET * length).abs() < 1e-9);
            assert!((off.dot(side).abs() - BOX_INSET * width).abs() < 1e-9);
            // Struts join matching corners.
            assert_eq!(segments[8 + i], WireSegment::new(outer[i], inner[i]));
        }
    }

    #[test]
    fn test_connected_components() {
        let quad = |x: f64| {
            vec![
                [Vector2::new(x, 0.1), Vector2::new(x + 0.2, 0.1), Vector2::new(x + 0.2, 0.3)],
                [Vector2::new(x, 0.1), Vector2::new(x + 0.2, 0.3), Vector2::new(x, 0.3)],
            ]
        };
        let mut tris = quad(0.1);
        tris.extend(quad(0.6));
        tris.push([Vector2::new(0.3, 0.3), Vector2::new(0.35, 0.5), Vector2::new(0.25, 0.5)]);
        assert_eq!(connected_components(&tris), vec![vec![0, 1, 4], vec![2, 3]]);
    }

    #[test]
    fn test_welds_nearly_equal_vertices() {
        let e = 1e-8;
        let tris = vec![
            [Vector2::new(0.0, 0.0), Vector2::new(0.5, 0.0), Vector2::new(0.5, 0.5)],
            [Vector2::new(e, 0.0), Vector2::new(0.5, 0.5 + e), Vector2::new(0.0, 0.5)],
        ];
        let segments = reconstruct_wireframe(&shell_of(tris), 1024);
        assert_eq!(segments.len(), 4);
        assert!(segments.iter().all(is_axis_aligned));
    }

    #[test]
    fn test_short_segments_dropped() {
        let tris = vec![
            [Vector2::new(0.0, 0.0), Vector2::new(0.5, 0.0), Vector2::new(0.5, 0.5)],
            [Vector2::new(0.0, 0.0), Vector2::new(0.5, 0.5), Vector2::new(0.0, 0.5)],
            [Vector2::new(0.5, 0.0), Vector2::new(0.5001, 0.0), Vector2::new(0.5, 0.5)],
        ];
        let segments = reconstruct_wireframe(&shell_of(tris), 256);
        assert!(segments.iter().all(|s| s.pixel_length(256) >= MIN_SEGMENT_PX));
    }
}
