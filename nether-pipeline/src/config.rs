//! Target capabilities (capabilities.toml)
//!
//! Describes which optional features the rendering target offers. Loaded
//! once and handed to [`PipelineStore::new`](crate::PipelineStore::new);
//! it never changes for the lifetime of the store.

use std::path::Path;

use nether_blend::BlendCapabilities;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Optional features of the rendering target.
///
/// Every field defaults to what a desktop GL 3 class driver offers, so a
/// partial TOML file only needs to list what is missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// RGB and alpha may use different blend equations (default: true)
    #[serde(default = "default_true")]
    pub separate_blend_equation: bool,
    /// Constant color blend factors (default: true)
    #[serde(default = "default_true")]
    pub blend_constant: bool,
    /// Driver sampler objects (default: true)
    #[serde(default = "default_true")]
    pub sampler_objects: bool,
    /// Point sprite texture coordinates (default: true)
    #[serde(default = "default_true")]
    pub point_sprite: bool,
    /// Per-vertex point size attribute (default: true)
    #[serde(default = "default_true")]
    pub per_vertex_point_size: bool,
    /// The shading language exposes a builtin point size uniform (default: false)
    #[serde(default)]
    pub builtin_point_size_uniform: bool,
    /// Shaders are generated as GLSL (default: true)
    #[serde(default = "default_true")]
    pub glsl: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            separate_blend_equation: default_true(),
            blend_constant: default_true(),
            sampler_objects: default_true(),
            point_sprite: default_true(),
            per_vertex_point_size: default_true(),
            builtin_point_size_uniform: false,
            glsl: default_true(),
        }
    }
}

impl Capabilities {
    /// A target with none of the optional features
    pub fn minimal() -> Self {
        Self {
            separate_blend_equation: false,
            blend_constant: false,
            sampler_objects: false,
            point_sprite: false,
            per_vertex_point_size: false,
            builtin_point_size_uniform: false,
            glsl: false,
        }
    }

    /// The subset the blend string compiler checks
    pub fn blend(&self) -> BlendCapabilities {
        BlendCapabilities {
            separate_equation: self.separate_blend_equation,
            blend_constant: self.blend_constant,
        }
    }

    /// Parses capabilities from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if the text is not valid TOML or a
    /// field has the wrong type.
    pub fn from_toml_str(content: &str) -> Result<Self, PipelineError> {
        Ok(toml::from_str(content)?)
    }

    /// Loads capabilities from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let caps = Self::from_toml_str(&content)?;
        tracing::info!("Loaded capabilities from {}", path.as_ref().display());
        Ok(caps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =============================================================
    // Default value tests
    // =============================================================

    #[test]
    fn test_capabilities_default() {
        let caps = Capabilities::default();
        assert!(caps.separate_blend_equation);
        assert!(caps.blend_constant);
        assert!(!caps.builtin_point_size_uniform);
        assert_eq!(caps.blend(), BlendCapabilities::ALL);
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let caps = Capabilities::from_toml_str("").unwrap();
        assert_eq!(caps, Capabilities::default());
    }

    // =============================================================
    // Parsing tests
    // =============================================================

    #[test]
    fn test_partial_toml() {
        let caps = Capabilities::from_toml_str(
            r#"
            blend_constant = false
            point_sprite = false
            "#,
        )
        .unwrap();
        assert!(!caps.blend_constant);
        assert!(!caps.point_sprite);
        assert!(caps.per_vertex_point_size);
        assert!(!caps.blend().blend_constant);
    }

    #[test]
    fn test_invalid_toml() {
        let err = Capabilities::from_toml_str("blend_constant = \"yes\"").unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_round_trip() {
        let caps = Capabilities::minimal();
        let text = toml::to_string_pretty(&caps).unwrap();
        assert_eq!(Capabilities::from_toml_str(&text).unwrap(), caps);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capabilities.toml");
        std::fs::write(&path, "glsl = false\nsampler_objects = false\n").unwrap();

        let caps = Capabilities::load(&path).unwrap();
        assert!(!caps.glsl);
        assert!(!caps.sampler_objects);

        let missing = Capabilities::load(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(missing, PipelineError::Io(_)));
    }
}
