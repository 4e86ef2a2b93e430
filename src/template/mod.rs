//! UV template synthesis.
//!
//! A template is built in stages: the UV source is cut into shells, the
//! shells belonging to the livery target are kept, each shell gets a
//! reconstructed quad wireframe and a gradient, and everything is painted
//! into six raster layers that are serialized as a layered document.

pub mod canvas;
pub mod dilate;
pub mod document;
pub mod font;
pub mod layers;
pub mod mapper;
pub mod palette;
pub mod select;
pub mod topology;
pub mod types;

pub use canvas::{Canvas, CompositeMode, Paint, Path, SoftwareCanvas};
pub use document::TemplateDocument;
pub use layers::Layer;
pub use mapper::{build_mapper, LayoutMode, UvMapper};
pub use topology::WireSegment;
pub use types::{SourceInfo, TemplateMap, TemplateMesh, TemplateSource, UvRect, UvShell};
