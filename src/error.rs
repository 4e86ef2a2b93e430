//! Error types for template generation.
//!
//! The `Display` text of every variant is shown to the user as-is, so the
//! messages are part of the public contract.

use thiserror::Error;

/// Result type alias using [`TemplateError`].
pub type Result<T> = std::result::Result<T, TemplateError>;

/// Structural failures that abort a generation call.
///
/// Locally recoverable conditions (degenerate shells, empty selections) are
/// compensated inside the pipeline and never show up here.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Template map is required.")]
    MissingMap,

    #[error("Template UV source is required.")]
    MissingSource,

    #[error("Template UV source contains no meshes.")]
    NoMeshes,

    #[error("Template UV source has no renderable UV triangles.")]
    NoRenderableTriangles,

    #[error("Template UV source has no eligible shell geometry.")]
    NoEligibleShells,

    #[error("Failed to layout UV shells for template export.")]
    LayoutFailed,

    /// The layered document or its preview could not be encoded.
    #[error("Failed to write template document: {0}")]
    Serialize(String),
}

impl TemplateError {
    /// Wrap an encoder failure, keeping the whole cause chain in the message.
    pub fn serialize(err: anyhow::Error) -> Self {
        TemplateError::Serialize(format!("{err:#}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_verbatim() {
        assert_eq!(TemplateError::MissingMap.to_string(), "Template map is required.");
        assert_eq!(
            TemplateError::NoMeshes.to_string(),
            "Template UV source contains no meshes."
        );
        assert_eq!(
            TemplateError::LayoutFailed.to_string(),
            "Failed to layout UV shells for template export."
        );
    }

    #[test]
    fn test_serialize_keeps_context() {
        let err = anyhow::anyhow!("disk full").context("writing layer 'Fill'");
        let msg = TemplateError::serialize(err).to_string();
        assert!(msg.contains("writing layer 'Fill'"));
        assert!(msg.contains("disk full"));
    }
}
