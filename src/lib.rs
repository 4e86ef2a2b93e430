//! Automatic layered UV templates for vehicle liveries.
//!
//! [`generate_template`] turns the UV layout of a model into a six layer
//! document an artist can paint on: a per-island gradient fill, a
//! reconstructed quad wireframe and a few hidden guide layers.

use log::{debug, info, warn};
use rayon::prelude::*;

pub mod config;
pub mod error;
pub mod psd_export;
pub mod template;
pub mod util_2d;
pub mod worker;


pub use config::TemplateConfig;
pub use error::{Result, TemplateError};
pub use template::{TemplateDocument, TemplateMap, TemplateSource};

use template::canvas::SoftwareCanvas;
use template::dilate::{dilate, dilation_iterations};
use template::document::{assemble, display_name, document_file_name};
use template::layers::{paint_layers, PaintContext, FILL_INDEX};
use template::palette::ShellGradient;
use template::select::select_shells;
use template::topology::{reconstruct_wireframe, WireSegment};
use template::{build_mapper, UvShell};

/// Generate a layered template document.
///
/// Pure and synchronous: the same inputs always produce the same bytes.
pub fn generate_template(
    source: Option<&TemplateSource>,
    map: Option<&TemplateMap>,
    config: &TemplateConfig,
) -> Result<TemplateDocument> {
    let map = map.ok_or(TemplateError::MissingMap)?;
    let source = source.ok_or(TemplateError::MissingSource)?;
    if source.meshes.is_empty() {
        return Err(TemplateError::NoMeshes);
    }
    let size = config.effective_size();
    if config.use_world_space_normals_as_base {
        warn!("world space normals requested, but the UV source carries no normals");
    }

    let shells: Vec<UvShell> = source
        .meshes
        .iter()
        .enumerate()
        .flat_map(|(i, mesh)| UvShell::split_mesh(mesh, i))
        .collect();
    if shells.is_empty() {
        return Err(TemplateError::NoRenderableTriangles);
    }

    let shells: Vec<UvShell> = select_shells(&shells, map, config.preferred_target.as_deref())
        .into_iter()
        .filter(UvShell::is_eligible)
        .collect();
    if shells.is_empty() {
        return Err(TemplateError::NoEligibleShells);
    }

    let mapper = build_mapper(config.layout, &shells, size)?;
    let wireframes: Vec<Vec<WireSegment>> = shells
        .par_iter()
        .map(|shell| reconstruct_wireframe(shell, size))
        .collect();
    let gradients: Vec<Option<ShellGradient>> = shells
        .iter()
        .enumerate()
        .map(|(i, shell)| ShellGradient::for_shell(shell, i, mapper.as_ref()))
        .collect();
    info!(
        "painting {} shells ({} wire segments) at {size}px",
        shells.len(),
        wireframes.iter().map(Vec::len).sum::<usize>()
    );

    let model_name = display_name(config, source, map);
    let target_count = map.targets.len();
    let ctx = PaintContext {
        shells: &shells,
        wireframes: &wireframes,
        gradients: &gradients,
        mapper: mapper.as_ref(),
        fill_color: config.fill_rgba(),
        background_color: config.background_rgba(),
        include_wireframe: config.include_wireframe,
        island_gradients: config.island_gradients,
        model_name: &model_name,
        target_count,
        template_source: config.template_psd_source.as_deref(),
    };
    let mut layers = paint_layers(&ctx);

    let iterations = dilation_iterations(size);
    debug!("dilating fill layer, {iterations} iterations");
    dilate(&mut layers[FILL_INDEX].canvas, iterations, SoftwareCanvas::new);

    let file_name = document_file_name(config, source, map);
    let doc = assemble(&layers, config.compression, file_name, target_count).map_err(TemplateError::serialize)?;
    info!("generated {} ({} bytes)", doc.file_name, doc.bytes.len());
    Ok(doc)
}
