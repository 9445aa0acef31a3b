//! Copy-on-write pipeline state trees
//!
//! A pipeline describes how geometry is drawn: color, blending, depth,
//! culling, uniforms, shader snippets and a list of texture layers. Most
//! pipelines differ from each other in only a few groups of state, so each
//! pipeline node stores just the groups it overrides and inherits the rest
//! from its parent. The root node holds every default.
//!
//! Layers work the same way in their own tree, and a pipeline lists its
//! layers by index in its LAYERS group.
//!
//! All nodes live in a [`PipelineStore`]. User code holds [`Pipeline`]
//! handles; changing state through a handle whose node is shared copies the
//! node first, so every handle behaves as an independent value.
//!
//! ```
//! use nether_pipeline::{Capabilities, Color, PipelineStore};
//!
//! let mut store = PipelineStore::new(Capabilities::default());
//! let mut base = store.new_pipeline();
//! store.set_color(&mut base, Color::new(1.0, 0.0, 0.0, 1.0));
//!
//! let mut tinted = store.copy(&base);
//! store.set_point_size(&mut tinted, 4.0);
//! assert_eq!(store.color(&tinted), store.color(&base));
//!
//! store.release(tinted);
//! store.release(base);
//! ```
//!
//! # Modules
//!
//! - [`state`] - State groups and their payloads
//! - [`store`] - Node storage, handles and authority resolution
//! - [`pipeline`] - Copy-on-write setters for pipelines and layers
//! - [`compare`] - Equality, hashing and equivalent ancestors
//! - [`sampler_cache`] - Sampler state deduplication
//! - [`texture`] - Reference counted texture wrappers
//! - [`program_cache`] - Values cached per pipeline state
//! - [`debug`] - Graphviz dumps of both trees
//! - [`config`] - Target capabilities
//! - [`error`] - Error types

mod arena;

pub mod compare;
pub mod config;
pub mod debug;
pub mod error;
pub mod pipeline;
pub mod program_cache;
pub mod sampler_cache;
pub mod state;
pub mod store;
pub mod texture;

pub use config::Capabilities;
pub use error::{Feature, PipelineError};
pub use program_cache::ProgramCache;
pub use sampler_cache::{SamplerCache, SamplerEntryId, SamplerKey, TextureFilter, WrapMode};
pub use state::{
    BlendEnable, BlendState, Color, ColorMask, CompareFunction, CullMode, DepthState, LayerState,
    PipelineState, ProgramHandle, Snippet, SnippetHook, UniformValue, Winding,
};
pub use store::{LayerId, NodeId, Pipeline, PipelineStore};
pub use texture::{TextureId, TextureInfo, TextureRegistry, TextureType};
