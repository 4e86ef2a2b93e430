//! Rasterization of the six template layers.

use image::Rgba;
use tr::tr;

use super::canvas::{Canvas, Paint, Path, SoftwareCanvas};
use super::font::{draw_text, TextAlign, LINE_HEIGHT};
use super::mapper::UvMapper;
use super::palette::ShellGradient;
use super::topology::WireSegment;
use super::types::UvShell;
use crate::config::parse_hex_color;
use crate::util_2d::{triangle_area, Vector2};

pub const BACKGROUND: &str = "Background";
pub const FILL: &str = "Fill";
pub const WIREFRAME: &str = "Wireframe";
pub const ANNOTATIONS: &str = "Annotations";
pub const LICENSE_PLATES: &str = "License Plates";
pub const COLOR_SWATCHES: &str = "Color Swatches";

/// Index of the fill layer in [`paint_layers`] output.
pub const FILL_INDEX: usize = 1;

/// Triangles smaller than this (in px²) are not filled.
const MIN_TRIANGLE_AREA: f64 = 0.005;
/// Shells narrower than this (in px) get heavier wireframe strokes.
const SMALL_SHELL_PX: f64 = 56.0;
const SMALL_SHELL_STROKE_FACTOR: f64 = 1.6;

const WIRE_COLOR: Rgba<u8> = Rgba([244, 247, 252, 255]);
const HINT_COLOR: Rgba<u8> = Rgba([255, 196, 64, 255]);
const TEXT_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);
const PLATE_COLOR: Rgba<u8> = Rgba([238, 238, 232, 255]);
const PLATE_INK: Rgba<u8> = Rgba([28, 30, 36, 255]);

const SWATCHES: &[(&str, &str)] = &[
    ("#c9d8ee", "BASE"),
    ("#1c1f26", "TRIM / BLACKOUT"),
    ("#d62828", "PRIMARY ACCENT"),
    ("#f77f00", "SECONDARY ACCENT"),
    ("#fcbf49", "HIGHLIGHT"),
    ("#f1faee", "DECAL WHITE"),
    ("#003049", "SPONSOR DARK"),
];

/// Named raster layer; every layer of a document has the same size.
#[derive(Debug, Clone)]
pub struct Layer {
    pub name: String,
    pub canvas: SoftwareCanvas,
    pub hidden: bool,
}

impl Layer {
    fn new(name: &str, canvas: SoftwareCanvas, hidden: bool) -> Self {
        Layer { name: name.to_string(), canvas, hidden }
    }
}

/// Everything the painter needs for one template.
///
/// `wireframes` and `gradients` are parallel to `shells`.
pub struct PaintContext<'a> {
    pub shells: &'a [UvShell],
    pub wireframes: &'a [Vec<WireSegment>],
    pub gradients: &'a [Option<ShellGradient>],
    pub mapper: &'a dyn UvMapper,
    pub fill_color: Rgba<u8>,
    pub background_color: Rgba<u8>,
    pub include_wireframe: bool,
    pub island_gradients: bool,
    pub model_name: &'a str,
    pub target_count: usize,
    pub template_source: Option<&'a str>,
}

impl PaintContext<'_> {
    fn size(&self) -> u32 {
        self.mapper.size()
    }

    fn shell_paint(&self, i: usize) -> Paint {
        match self.gradients.get(i) {
            Some(Some(g)) if self.island_gradients => Paint::Gradient(*g),
            _ => Paint::Solid(self.fill_color),
        }
    }
}

/// Paint the layers bottom to top: background, fill, wireframe,
/// annotations, license plates, color swatches.
pub fn paint_layers(ctx: &PaintContext) -> Vec<Layer> {
    let size = ctx.size();
    let mut fill = SoftwareCanvas::new(size);
    paint_fill(&mut fill, ctx);
    let mut wireframe = SoftwareCanvas::new(size);
    if ctx.include_wireframe {
        paint_wireframe(&mut wireframe, ctx);
    }
    let mut annotations = SoftwareCanvas::new(size);
    paint_annotations(&mut annotations, ctx);
    let mut plates = SoftwareCanvas::new(size);
    paint_license_plates(&mut plates);
    let mut swatches = SoftwareCanvas::new(size);
    paint_swatches(&mut swatches);

    vec![
        Layer::new(BACKGROUND, SoftwareCanvas::filled(size, ctx.background_color), false),
        Layer::new(FILL, fill, false),
        Layer::new(WIREFRAME, wireframe, false),
        Layer::new(ANNOTATIONS, annotations, true),
        Layer::new(LICENSE_PLATES, plates, true),
        Layer::new(COLOR_SWATCHES, swatches, true),
    ]
}

pub fn paint_fill<C: Canvas>(canvas: &mut C, ctx: &PaintContext) {
    for (i, shell) in ctx.shells.iter().enumerate() {
        let paint = ctx.shell_paint(i);
        for tri in &shell.triangles {
            let px = tri.map(|p| ctx.mapper.to_pixel(i, p));
            if triangle_area(px[0], px[1], px[2]).abs() < MIN_TRIANGLE_AREA {
                continue;
            }
            canvas.fill_path(&Path::polygon(&px), &paint);
        }
    }
}

/// Stroke width for the wireframe, growing with the canvas.
pub fn wire_width(size: u32) -> f64 {
    (size as f64 / 1024.0 * 1.25).max(1.0)
}

fn shell_pixel_extent(shell: &UvShell, index: usize, mapper: &dyn UvMapper) -> f64 {
    let c = shell.bounds.corners().map(|p| mapper.to_pixel(index, p));
    let (lo, hi) = c.iter().fold(
        (Vector2::new(f64::INFINITY, f64::INFINITY), Vector2::new(f64::NEG_INFINITY, f64::NEG_INFINITY)),
        |(lo, hi), p| (Vector2::new(lo.x.min(p.x), lo.y.min(p.y)), Vector2::new(hi.x.max(p.x), hi.y.max(p.y))),
    );
    (hi.x - lo.x).max(hi.y - lo.y)
}

pub fn paint_wireframe<C: Canvas>(canvas: &mut C, ctx: &PaintContext) {
    let base = wire_width(ctx.size());
    for (i, shell) in ctx.shells.iter().enumerate() {
        let width = if shell_pixel_extent(shell, i, ctx.mapper) < SMALL_SHELL_PX {
            base * SMALL_SHELL_STROKE_FACTOR
        } else {
            base
        };

        let mut path = Path::new();
        for seg in ctx.wireframes.get(i).into_iter().flatten() {
            path.move_to(ctx.mapper.to_pixel(i, seg.a)).line_to(ctx.mapper.to_pixel(i, seg.b));
        }
        if !path.is_empty() {
            canvas.stroke_path(&path, width, &Paint::Solid(WIRE_COLOR));
        }

        let mut hints = Path::new();
        for rect in &shell.rectangles {
            hints.add_polygon(&rect.corners().map(|p| ctx.mapper.to_pixel(i, p)));
        }
        if !hints.is_empty() {
            canvas.stroke_path(&hints, base, &Paint::Solid(HINT_COLOR));
        }
    }
}

/// `"<model> | N UV shells | M targets"`.
pub fn footer_text(model: &str, shells: usize, targets: usize) -> String {
    format!("{model} | {shells} UV shells | {targets} targets")
}

fn text_scale(size: u32) -> u32 {
    (size / 512).max(1)
}

pub fn paint_annotations<C: Canvas>(canvas: &mut C, ctx: &PaintContext) {
    let size = ctx.size();
    let scale = text_scale(size);
    let margin = (size as f64 * 0.02).round();
    let line = (LINE_HEIGHT * scale) as f64;
    let paint = Paint::Solid(TEXT_COLOR);

    let mut lines = vec![
        tr!("AUTO LIVERY TEMPLATE"),
        tr!("PAINT ON NEW LAYERS ABOVE FILL, KEEP WIREFRAME ON TOP."),
        tr!("ISLAND EDGES ARE PADDED TO HIDE TEXTURE SEAMS."),
        tr!("HIDE GUIDE LAYERS BEFORE EXPORTING THE TEXTURE."),
    ];
    if let Some(source) = ctx.template_source {
        lines.push(tr!("BASED ON: {}", source));
    }
    for (i, text) in lines.iter().enumerate() {
        draw_text(canvas, text, margin, margin + i as f64 * line, scale, TextAlign::Near, &paint);
    }

    let footer = footer_text(ctx.model_name, ctx.shells.len(), ctx.target_count);
    let y = size as f64 - margin - (LINE_HEIGHT * scale) as f64;
    draw_text(canvas, &footer, margin, y, scale, TextAlign::Near, &paint);
}

/// Two plates in the lower right corner, front above back.
pub fn paint_license_plates<C: Canvas>(canvas: &mut C) {
    let size = canvas.size() as f64;
    let margin = (size * 0.02).round();
    let w = (size * 0.18).round();
    let h = (w / 2.0).round();
    let border = (size / 512.0).max(1.0);
    let x = size - margin - w;
    let back_y = size - margin * 3.0 - h;
    let front_y = back_y - margin - h;

    for (y, label) in [(front_y, tr!("FRONT")), (back_y, tr!("BACK"))] {
        canvas.fill_rect(x, y, w, h, &Paint::Solid(PLATE_COLOR));
        canvas.stroke_path(&Path::rect(x, y, w, h), border, &Paint::Solid(PLATE_INK));

        // Bolt slots.
        let (slot_w, slot_h) = ((w * 0.09).max(2.0), (h * 0.06).max(1.0));
        for fx in [0.25, 0.75] {
            let sx = (x + w * fx - slot_w / 2.0).round();
            let sy = (y + h * 0.12).round();
            canvas.fill_rect(sx, sy, slot_w, slot_h, &Paint::Solid(PLATE_INK));
        }

        let scale = ((h / 3.0) / 7.0).floor().max(1.0) as u32;
        let ty = y + (h - (7 * scale) as f64) / 2.0;
        draw_text(canvas, &label, x + w / 2.0, ty, scale, TextAlign::Center, &Paint::Solid(PLATE_INK));
    }
}

/// Reference color chips down the right edge, labelled on their left.
pub fn paint_swatches<C: Canvas>(canvas: &mut C) {
    let size = canvas.size();
    let s = size as f64;
    let scale = text_scale(size);
    let margin = (s * 0.02).round();
    let chip = (s * 0.04).round().max(8.0);
    let gap = (chip * 0.25).round();
    let x = s - margin - chip;

    for (i, (hex, label)) in SWATCHES.iter().enumerate() {
        let Some(color) = parse_hex_color(hex) else {
            continue;
        };
        let y = margin + i as f64 * (chip + gap);
        canvas.fill_rect(x, y, chip, chip, &Paint::Solid(color));
        canvas.stroke_path(&Path::rect(x, y, chip, chip), 1.0, &Paint::Solid(TEXT_COLOR));
        let ty = y + (chip - (7 * scale) as f64) / 2.0;
        let text = format!("{label} {hex}");
        draw_text(canvas, &text, x - gap, ty, scale, TextAlign::Far, &Paint::Solid(TEXT_COLOR));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::mapper::DirectUvMapper;
    use crate::template::types::{TemplateMesh, UvRect, UvTriangles};

    fn unit_square() -> UvShell {
        let mesh = TemplateMesh {
            mesh_name: "body".into(),
            triangles: UvTriangles(vec![
                [Vector2::new(0.0, 0.0), Vector2::new(1.0, 0.0), Vector2::new(1.0, 1.0)],
                [Vector2::new(0.0, 0.0), Vector2::new(1.0, 1.0), Vector2::new(0.0, 1.0)],
            ]),
            ..Default::default()
        };
        UvShell::from_mesh(&mesh, 0).unwrap()
    }

    fn context<'a>(
        shells: &'a [UvShell],
        wires: &'a [Vec<WireSegment>],
        gradients: &'a [Option<ShellGradient>],
        mapper: &'a dyn UvMapper,
    ) -> PaintContext<'a> {
        PaintContext {
            shells,
            wireframes: wires,
            gradients,
            mapper,
            fill_color: Rgba([201, 216, 238, 255]),
            background_color: Rgba([0, 0, 0, 255]),
            include_wireframe: true,
            island_gradients: false,
            model_name: "adder",
            target_count: 3,
            template_source: None,
        }
    }

    #[test]
    fn test_six_layers_with_visibility() {
        let shells = vec![unit_square()];
        let mapper = DirectUvMapper::new(&shells, 256).unwrap();
        let ctx = context(&shells, &[], &[], &mapper);
        let layers = paint_layers(&ctx);
        let names: Vec<&str> = layers.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, [BACKGROUND, FILL, WIREFRAME, ANNOTATIONS, LICENSE_PLATES, COLOR_SWATCHES]);
        let hidden: Vec<bool> = layers.iter().map(|l| l.hidden).collect();
        assert_eq!(hidden, [false, false, false, true, true, true]);
        assert!(layers.iter().all(|l| l.canvas.size() == 256));
        assert_eq!(layers[0].canvas.pixel(100, 100), Rgba([0, 0, 0, 255]));
        assert_eq!(layers[FILL_INDEX].canvas.pixel(100, 100), Rgba([201, 216, 238, 255]));
    }

    #[test]
    fn test_tiny_triangles_are_skipped() {
        let mesh = TemplateMesh {
            mesh_name: "speck".into(),
            triangles: UvTriangles(vec![[
                Vector2::new(0.5, 0.5),
                Vector2::new(0.5001, 0.5),
                Vector2::new(0.5, 0.5001),
            ]]),
            ..Default::default()
        };
        let shells = vec![UvShell::from_mesh(&mesh, 0).unwrap()];
        let mapper = DirectUvMapper::new(&shells, 256).unwrap();
        let ctx = context(&shells, &[], &[], &mapper);
        let mut c = SoftwareCanvas::new(256);
        paint_fill(&mut c, &ctx);
        assert!(c.image().pixels().all(|p| p.0[3] == 0));
    }

    #[test]
    fn test_wireframe_and_hints() {
        let mut shell = unit_square();
        shell.rectangles.push(UvRect { min_u: 0.25, min_v: 0.25, max_u: 0.75, max_v: 0.75 });
        let shells = vec![shell];
        let wires = vec![vec![WireSegment::new(Vector2::new(0.0, 0.5), Vector2::new(1.0, 0.5))]];
        let mapper = DirectUvMapper::new(&shells, 256).unwrap();
        let ctx = context(&shells, &wires, &[], &mapper);
        let mut c = SoftwareCanvas::new(256);
        paint_wireframe(&mut c, &ctx);
        // Horizontal wire through the middle row.
        assert_eq!(c.pixel(30, 127), WIRE_COLOR);
        // Hint rectangle edge at u = 0.25.
        assert_eq!(c.pixel(64, 100), HINT_COLOR);
        assert_eq!(c.pixel(30, 30).0[3], 0);
    }

    #[test]
    fn test_wireframe_can_be_disabled() {
        let shells = vec![unit_square()];
        let wires = vec![vec![WireSegment::new(Vector2::new(0.0, 0.5), Vector2::new(1.0, 0.5))]];
        let mapper = DirectUvMapper::new(&shells, 256).unwrap();
        let mut ctx = context(&shells, &wires, &[], &mapper);
        ctx.include_wireframe = false;
        let layers = paint_layers(&ctx);
        assert!(layers[2].canvas.image().pixels().all(|p| p.0[3] == 0));
    }

    #[test]
    fn test_guides_are_painted() {
        for paint in [paint_license_plates::<SoftwareCanvas>, paint_swatches::<SoftwareCanvas>] {
            let mut c = SoftwareCanvas::new(512);
            paint(&mut c);
            assert!(c.image().pixels().any(|p| p.0[3] != 0));
        }
    }

    #[test]
    fn test_footer_text() {
        assert_eq!(footer_text("adder", 12, 4), "adder | 12 UV shells | 4 targets");
    }
}
