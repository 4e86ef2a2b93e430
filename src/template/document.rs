//! Final assembly of a template: flattening, preview and naming.

use std::io::Cursor;
use std::path::Path;

use anyhow::Result;
use base64::prelude::*;
use image::{ImageFormat, RgbaImage};
use serde::Serialize;

use super::canvas::{blend_over, Canvas};
use super::layers::Layer;
use super::types::{TemplateMap, TemplateSource};
use crate::config::TemplateConfig;
use crate::psd_export::{encode_psd, ChannelCompression, PsdLayer};

const FILE_SUFFIX: &str = "_auto_template.psd";
const FALLBACK_STEM: &str = "template";
const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

mod ser {
    pub mod base64_bytes {
        use base64::prelude::*;

        pub fn serialize<S>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error>
        where
            S: serde::Serializer,
        {
            serializer.serialize_str(&BASE64_STANDARD.encode(data))
        }
    }
}

/// A generated layered template.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateDocument {
    #[serde(serialize_with = "ser::base64_bytes::serialize")]
    pub bytes: Vec<u8>,
    pub size: u32,
    pub layer_count: usize,
    pub preview_data_url: String,
    pub file_name: String,
    pub target_count: usize,
}

/// Source-over of every visible layer, bottom to top.
pub fn flatten(layers: &[Layer]) -> Option<RgbaImage> {
    let size = layers.first()?.canvas.size();
    let mut out = RgbaImage::new(size, size);
    for layer in layers.iter().filter(|l| !l.hidden) {
        for (dst, src) in out.pixels_mut().zip(layer.canvas.image().pixels()) {
            *dst = blend_over(*dst, *src);
        }
    }
    Some(out)
}

pub fn png_data_url(image: &RgbaImage) -> Result<String> {
    let mut png = Cursor::new(Vec::new());
    image.write_to(&mut png, ImageFormat::Png)?;
    Ok(format!("{PNG_DATA_URL_PREFIX}{}", BASE64_STANDARD.encode(png.into_inner())))
}

/// Model name candidates, most specific first.
fn name_candidates<'a>(
    config: &'a TemplateConfig,
    source: &'a TemplateSource,
    map: &'a TemplateMap,
) -> impl Iterator<Item = String> + 'a {
    let from_path = config
        .model_path
        .as_deref()
        .and_then(|p| Path::new(p).file_name())
        .map(|s| s.to_string_lossy().into_owned());
    [
        config.model_file_name.clone(),
        from_path,
        map.source.model_name.clone(),
        map.source.file_name.clone(),
        source.source.file_name.clone(),
    ]
    .into_iter()
    .flatten()
    .filter(|s| !s.trim().is_empty())
}

fn strip_extension(name: &str) -> &str {
    let name = name.trim();
    match name.rfind('.') {
        Some(i) if i > 0 => &name[..i],
        _ => name,
    }
}

/// Human readable model name for the annotations footer.
pub fn display_name(config: &TemplateConfig, source: &TemplateSource, map: &TemplateMap) -> String {
    name_candidates(config, source, map)
        .next()
        .map(|n| strip_extension(&n).to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| FALLBACK_STEM.to_string())
}

/// Replace everything outside `[A-Za-z0-9_-]` and trim underscores.
pub fn sanitize_stem(name: &str) -> String {
    let replaced: String = strip_extension(name)
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    let trimmed = replaced.trim_matches('_');
    if trimmed.is_empty() {
        FALLBACK_STEM.to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn document_file_name(config: &TemplateConfig, source: &TemplateSource, map: &TemplateMap) -> String {
    let stem = name_candidates(config, source, map)
        .next()
        .map(|n| sanitize_stem(&n))
        .unwrap_or_else(|| FALLBACK_STEM.to_string());
    format!("{stem}{FILE_SUFFIX}")
}

/// Encode the layered document and its preview.
pub fn assemble(
    layers: &[Layer],
    compression: ChannelCompression,
    file_name: String,
    target_count: usize,
) -> Result<TemplateDocument> {
    let composite = flatten(layers).ok_or_else(|| anyhow::anyhow!("no layers to flatten"))?;
    let psd_layers: Vec<PsdLayer> = layers
        .iter()
        .map(|l| PsdLayer { name: &l.name, image: l.canvas.image(), hidden: l.hidden })
        .collect();
    let bytes = encode_psd(&psd_layers, &composite, compression)?;
    let preview_data_url = png_data_url(&composite)?;
    log::debug!("encoded {} ({} bytes, {:?})", file_name, bytes.len(), compression);
    Ok(TemplateDocument {
        bytes,
        size: composite.width(),
        layer_count: layers.len(),
        preview_data_url,
        file_name,
        target_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::canvas::SoftwareCanvas;
    use image::Rgba;

    #[test]
    fn test_sanitize_stem() {
        assert_eq!(sanitize_stem("Adder Mk II.glb"), "Adder_Mk_II");
        assert_eq!(sanitize_stem("__a-b__.obj"), "a-b");
        assert_eq!(sanitize_stem("...."), "template");
        assert_eq!(sanitize_stem("ünï.fbx"), "n");
    }

    #[test]
    fn test_file_name_precedence() {
        let mut config = TemplateConfig::default();
        let mut source = TemplateSource::default();
        let mut map = TemplateMap::default();
        assert_eq!(document_file_name(&config, &source, &map), "template_auto_template.psd");

        source.source.file_name = Some("source.glb".into());
        assert_eq!(document_file_name(&config, &source, &map), "source_auto_template.psd");
        map.source.file_name = Some("map file.glb".into());
        assert_eq!(document_file_name(&config, &source, &map), "map_file_auto_template.psd");
        map.source.model_name = Some("Model".into());
        assert_eq!(document_file_name(&config, &source, &map), "Model_auto_template.psd");
        config.model_path = Some("/cars/gt/coupe.fbx".into());
        assert_eq!(document_file_name(&config, &source, &map), "coupe_auto_template.psd");
        config.model_file_name = Some("Pick Me.obj".into());
        assert_eq!(document_file_name(&config, &source, &map), "Pick_Me_auto_template.psd");
        assert_eq!(display_name(&config, &source, &map), "Pick Me");
    }

    fn layer(name: &str, canvas: SoftwareCanvas, hidden: bool) -> Layer {
        Layer { name: name.into(), canvas, hidden }
    }

    #[test]
    fn test_flatten_skips_hidden() {
        let red = Rgba([255, 0, 0, 255]);
        let layers = [
            layer("bg", SoftwareCanvas::filled(4, Rgba([0, 0, 0, 255])), false),
            layer("guide", SoftwareCanvas::filled(4, red), true),
        ];
        let flat = flatten(&layers).unwrap();
        assert_eq!(*flat.get_pixel(2, 2), Rgba([0, 0, 0, 255]));
        assert!(flatten(&[]).is_none());
    }

    #[test]
    fn test_assemble_document() {
        let layers = [layer("bg", SoftwareCanvas::filled(8, Rgba([9, 9, 9, 255])), false)];
        let doc = assemble(&layers, ChannelCompression::Rle, "x_auto_template.psd".into(), 2).unwrap();
        assert_eq!(doc.size, 8);
        assert_eq!(doc.layer_count, 1);
        assert_eq!(&doc.bytes[..4], b"8BPS");
        assert!(doc.preview_data_url.starts_with("data:image/png;base64,"));

        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["layerCount"], 1);
        assert_eq!(json["targetCount"], 2);
        let decoded = BASE64_STANDARD.decode(json["bytes"].as_str().unwrap()).unwrap();
        assert_eq!(decoded, doc.bytes);
    }
}
