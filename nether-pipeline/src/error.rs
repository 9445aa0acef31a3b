//! Pipeline error types

use nether_blend::{BlendFeature, BlendStringError};
use thiserror::Error;

/// Optional target features that gate setters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    /// Per-vertex point size attribute
    PerVertexPointSize,
    /// Generated texture coordinates for point sprites
    PointSprite,
    /// Constant color blend factors
    BlendConstant,
    /// Different blend functions for RGB and alpha
    SeparateEquation,
}

impl Feature {
    pub fn name(self) -> &'static str {
        match self {
            Feature::PerVertexPointSize => "per-vertex point size",
            Feature::PointSprite => "point sprite coordinates",
            Feature::BlendConstant => "blend constant",
            Feature::SeparateEquation => "separate blend equations",
        }
    }
}

impl From<BlendFeature> for Feature {
    fn from(feature: BlendFeature) -> Self {
        match feature {
            BlendFeature::BlendConstant => Feature::BlendConstant,
            BlendFeature::SeparateEquation => Feature::SeparateEquation,
        }
    }
}

/// Recoverable pipeline errors
///
/// Setters that fail with one of these leave every node untouched.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{message}")]
    Unsupported {
        feature: Feature,
        message: &'static str,
    },
    #[error(transparent)]
    BlendString(#[from] BlendStringError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid capabilities: {0}")]
    Config(#[from] toml::de::Error),
}

impl PipelineError {
    /// Whether the failure depends on target capabilities
    pub fn is_unsupported(&self) -> bool {
        self.unsupported_feature().is_some()
    }

    /// The missing feature behind a capability error
    pub fn unsupported_feature(&self) -> Option<Feature> {
        match self {
            PipelineError::Unsupported { feature, .. } => Some(*feature),
            PipelineError::BlendString(BlendStringError::Unsupported { feature, .. }) => {
                Some((*feature).into())
            }
            _ => None,
        }
    }
}
