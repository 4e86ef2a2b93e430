use image::Rgba;
use serde::{Deserialize, Serialize};

use crate::psd_export::ChannelCompression;
use crate::template::LayoutMode;

pub const MIN_SIZE: u32 = 256;
pub const MAX_SIZE: u32 = 8192;
pub const DEFAULT_SIZE: u32 = 2048;

const DEFAULT_FILL_COLOR: &str = "#c9d8ee";
const DEFAULT_BACKGROUND_COLOR: &str = "#000000";

/// Options accepted by [`crate::generate_template`].
///
/// Every field is optional in the serialized form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TemplateConfig {
    /// Requested edge length in pixels, see [`TemplateConfig::effective_size`].
    pub size: f64,
    pub model_path: Option<String>,
    pub model_file_name: Option<String>,
    /// Where an existing template came from, shown in the annotations layer.
    pub template_psd_source: Option<String>,
    pub fill_color: String,
    pub background_color: String,
    pub preferred_target: Option<String>,
    pub include_wireframe: bool,
    /// The UV source carries no normals, so this is only acknowledged.
    pub use_world_space_normals_as_base: bool,
    pub island_gradients: bool,
    pub layout: LayoutMode,
    pub compression: ChannelCompression,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        TemplateConfig {
            size: DEFAULT_SIZE as f64,
            model_path: None,
            model_file_name: None,
            template_psd_source: None,
            fill_color: DEFAULT_FILL_COLOR.to_string(),
            background_color: DEFAULT_BACKGROUND_COLOR.to_string(),
            preferred_target: None,
            include_wireframe: true,
            use_world_space_normals_as_base: false,
            island_gradients: true,
            layout: LayoutMode::default(),
            compression: ChannelCompression::default(),
        }
    }
}

impl TemplateConfig {
    pub fn with_size(mut self, size: f64) -> Self {
        self.size = size;
        self
    }

    /// The size actually rendered: `round(clamp(size, 256, 8192))`.
    pub fn effective_size(&self) -> u32 {
        if !self.size.is_finite() {
            return DEFAULT_SIZE;
        }
        self.size.clamp(MIN_SIZE as f64, MAX_SIZE as f64).round() as u32
    }

    pub fn fill_rgba(&self) -> Rgba<u8> {
        color_or_default(&self.fill_color, DEFAULT_FILL_COLOR, "fillColor")
    }

    pub fn background_rgba(&self) -> Rgba<u8> {
        color_or_default(&self.background_color, DEFAULT_BACKGROUND_COLOR, "backgroundColor")
    }
}

fn color_or_default(value: &str, default: &str, key: &str) -> Rgba<u8> {
    parse_hex_color(value).unwrap_or_else(|| {
        log::warn!("invalid {key} {value:?}, using {default}");
        parse_hex_color(default).unwrap_or(Rgba([0, 0, 0, 255]))
    })
}

/// Parse `#rgb`, `#rrggbb` or `#rrggbbaa` (the `#` is optional).
pub fn parse_hex_color(s: &str) -> Option<Rgba<u8>> {
    let hex = s.trim().trim_start_matches('#');
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    match hex.len() {
        3 => {
            let mut rgb = [0u8; 3];
            for (i, c) in hex.chars().enumerate() {
                let n = c.to_digit(16)? as u8;
                rgb[i] = n * 17;
            }
            Some(Rgba([rgb[0], rgb[1], rgb[2], 255]))
        }
        6 => Some(Rgba([byte(0)?, byte(2)?, byte(4)?, 255])),
        8 => Some(Rgba([byte(0)?, byte(2)?, byte(4)?, byte(6)?])),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_size_clamps_and_rounds() {
        let cfg = TemplateConfig::default();
        assert_eq!(cfg.effective_size(), 2048);
        assert_eq!(cfg.clone().with_size(10.0).effective_size(), 256);
        assert_eq!(cfg.clone().with_size(100_000.0).effective_size(), 8192);
        assert_eq!(cfg.clone().with_size(511.6).effective_size(), 512);
        assert_eq!(cfg.clone().with_size(f64::NAN).effective_size(), 2048);
    }

    #[test]
    fn test_parse_hex_color() {
        assert_eq!(parse_hex_color("#c9d8ee"), Some(Rgba([0xc9, 0xd8, 0xee, 255])));
        assert_eq!(parse_hex_color("fff"), Some(Rgba([255, 255, 255, 255])));
        assert_eq!(parse_hex_color("#00000080"), Some(Rgba([0, 0, 0, 0x80])));
        assert_eq!(parse_hex_color("#12345"), None);
        assert_eq!(parse_hex_color("#gg0000"), None);
    }

    #[test]
    fn test_deserialize_partial() {
        let cfg: TemplateConfig =
            serde_json::from_str(r#"{"size": 512, "preferredTarget": "material:paint", "layout": "packed"}"#)
                .unwrap();
        assert_eq!(cfg.effective_size(), 512);
        assert_eq!(cfg.preferred_target.as_deref(), Some("material:paint"));
        assert_eq!(cfg.layout, LayoutMode::Packed);
        assert!(cfg.include_wireframe);
        assert_eq!(cfg.fill_rgba(), Rgba([0xc9, 0xd8, 0xee, 255]));
    }

    #[test]
    fn test_bad_color_falls_back() {
        let cfg = TemplateConfig {
            background_color: "not a color".into(),
            ..Default::default()
        };
        assert_eq!(cfg.background_rgba(), Rgba([0, 0, 0, 255]));
    }
}
