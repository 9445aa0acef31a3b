//! State groups
//!
//! Every piece of render state belongs to exactly one group. A node stores
//! payloads only for the groups whose bit is set in its `differences`;
//! every other group resolves through its ancestors.
//!
//! # Modules
//!
//! - [`render`] - Color, alpha test, depth, culling and color mask payloads
//! - [`blend`] - Blend equations and factors
//! - [`uniforms`] - Uniform values
//! - [`snippet`] - Shader snippets
//! - [`layer`] - Per-layer groups

use std::collections::BTreeMap;
use std::fmt;

use bitflags::bitflags;

pub mod blend;
pub mod layer;
pub mod render;
pub mod snippet;
pub mod uniforms;

pub use blend::{BlendEquation, BlendFactor, BlendState};
pub use layer::{LayerGroup, LayerSparseState, LayerState, layer_group};
pub use render::{
    BlendEnable, Color, ColorMask, CompareFunction, CullFaceState, CullMode, DepthState,
    LogicOpsState, ProgramHandle, Winding,
};
pub use snippet::{Snippet, SnippetHook, SnippetList, SnippetStage};
pub use uniforms::UniformValue;

use crate::config::Capabilities;
use crate::store::LayerId;

bitflags! {
    /// Pipeline state groups
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PipelineState: u32 {
        const COLOR = 1 << 0;
        const BLEND_ENABLE = 1 << 1;
        const LAYERS = 1 << 2;
        const ALPHA_FUNC = 1 << 3;
        const ALPHA_FUNC_REFERENCE = 1 << 4;
        const BLEND = 1 << 5;
        const USER_SHADER = 1 << 6;
        const DEPTH = 1 << 7;
        const NON_ZERO_POINT_SIZE = 1 << 8;
        const POINT_SIZE = 1 << 9;
        const PER_VERTEX_POINT_SIZE = 1 << 10;
        const LOGIC_OPS = 1 << 11;
        const CULL_FACE = 1 << 12;
        const UNIFORMS = 1 << 13;
        const VERTEX_SNIPPETS = 1 << 14;
        const FRAGMENT_SNIPPETS = 1 << 15;
        /// Derived from other groups; never stored as a difference
        const REAL_BLEND_ENABLE = 1 << 16;
    }
}

impl PipelineState {
    /// Every group a node can own
    pub const ALL_SPARSE: Self = Self::all().difference(Self::REAL_BLEND_ENABLE);

    /// Groups whose change can flip the derived blend enable
    pub const AFFECTS_BLENDING: Self = Self::COLOR
        .union(Self::BLEND_ENABLE)
        .union(Self::LAYERS)
        .union(Self::BLEND)
        .union(Self::VERTEX_SNIPPETS)
        .union(Self::FRAGMENT_SNIPPETS);

    /// Groups that influence generated vertex shader code
    pub fn vertex_codegen(caps: &Capabilities) -> Self {
        let mut state = Self::LAYERS | Self::PER_VERTEX_POINT_SIZE | Self::VERTEX_SNIPPETS;
        // Without a builtin point size uniform the generated shader
        // declares one, but only when the size is non-zero
        if !caps.builtin_point_size_uniform {
            state |= Self::NON_ZERO_POINT_SIZE;
        }
        state
    }

    /// Groups that influence generated fragment shader code
    pub fn fragment_codegen() -> Self {
        Self::LAYERS | Self::FRAGMENT_SNIPPETS | Self::ALPHA_FUNC
    }

    /// Iterates the single-bit groups in bit order.
    pub fn groups(self) -> impl Iterator<Item = PipelineState> {
        self.iter()
    }

    /// Upper-case group name for a single-bit mask
    pub fn name(self) -> &'static str {
        self.iter_names().next().map_or("NONE", |(name, _)| name)
    }
}

/// A pipeline state group with a stored payload
///
/// Implemented by the zero-sized markers in [`group`].
pub trait Group {
    const FLAG: PipelineState;
    type Value: Clone + PartialEq + fmt::Debug;

    fn slot(state: &SparseState) -> &Option<Self::Value>;
    fn slot_mut(state: &mut SparseState) -> &mut Option<Self::Value>;
}

/// Declares a sparse state struct with one optional slot per group, plus a
/// marker type implementing the group trait for each slot.
macro_rules! sparse_state {
    (
        $(#[$meta:meta])*
        $state:ident, $flags:ident, $group_trait:ident, $markers:ident {
            $($(#[$field_meta:meta])* $marker:ident => $field:ident: $value:ty = $flag:ident,)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default)]
        pub struct $state {
            $($(#[$field_meta])* pub(crate) $field: Option<$value>,)*
        }

        pub mod $markers {
            //! Group marker types

            #[allow(unused_imports)]
            use super::*;

            $(
                $(#[$field_meta])*
                pub struct $marker;

                impl $group_trait for $marker {
                    const FLAG: $flags = $flags::$flag;
                    type Value = $value;

                    fn slot(state: &$state) -> &Option<$value> {
                        &state.$field
                    }

                    fn slot_mut(state: &mut $state) -> &mut Option<$value> {
                        &mut state.$field
                    }
                }
            )*
        }

        impl $state {
            /// Copies the payloads of every group in `groups` from `other`.
            pub(crate) fn copy_groups(&mut self, other: &$state, groups: $flags) {
                $(
                    if groups.contains($flags::$flag) {
                        self.$field = other.$field.clone();
                    }
                )*
            }

            /// Drops the payloads of every group in `groups`.
            pub(crate) fn clear_groups(&mut self, groups: $flags) {
                $(
                    if groups.contains($flags::$flag) {
                        self.$field = None;
                    }
                )*
            }

            /// Mask of the groups holding a payload
            #[allow(dead_code)]
            pub(crate) fn present(&self) -> $flags {
                let mut present = $flags::empty();
                $(
                    if self.$field.is_some() {
                        present |= $flags::$flag;
                    }
                )*
                present
            }
        }
    };
}

pub(crate) use sparse_state;

sparse_state! {
    /// Per-group payload slots of a pipeline node
    SparseState, PipelineState, Group, group {
        Color => color: render::Color = COLOR,
        BlendEnable => blend_enable: render::BlendEnable = BLEND_ENABLE,
        /// Layer index to layer node, in unit order
        Layers => layers: BTreeMap<i32, LayerId> = LAYERS,
        AlphaFunc => alpha_func: CompareFunction = ALPHA_FUNC,
        AlphaFuncReference => alpha_func_reference: f32 = ALPHA_FUNC_REFERENCE,
        Blend => blend: BlendState = BLEND,
        UserShader => user_shader: Option<ProgramHandle> = USER_SHADER,
        Depth => depth: DepthState = DEPTH,
        NonZeroPointSize => non_zero_point_size: bool = NON_ZERO_POINT_SIZE,
        PointSize => point_size: f32 = POINT_SIZE,
        PerVertexPointSize => per_vertex_point_size: bool = PER_VERTEX_POINT_SIZE,
        LogicOps => logic_ops: LogicOpsState = LOGIC_OPS,
        CullFace => cull_face: CullFaceState = CULL_FACE,
        /// Only this node's own overrides, keyed by uniform location
        Uniforms => uniforms: BTreeMap<u32, UniformValue> = UNIFORMS,
        VertexSnippets => vertex_snippets: SnippetList = VERTEX_SNIPPETS,
        FragmentSnippets => fragment_snippets: SnippetList = FRAGMENT_SNIPPETS,
    }
}

impl SparseState {
    /// Payloads of the root pipeline, covering every group
    pub(crate) fn root() -> Self {
        Self {
            color: Some(Color::WHITE),
            blend_enable: Some(BlendEnable::Automatic),
            layers: Some(BTreeMap::new()),
            alpha_func: Some(CompareFunction::Always),
            alpha_func_reference: Some(0.0),
            blend: Some(BlendState::default()),
            user_shader: Some(None),
            depth: Some(DepthState::default()),
            non_zero_point_size: Some(false),
            point_size: Some(0.0),
            per_vertex_point_size: Some(false),
            logic_ops: Some(LogicOpsState::default()),
            cull_face: Some(CullFaceState::default()),
            uniforms: Some(BTreeMap::new()),
            vertex_snippets: Some(Vec::new()),
            fragment_snippets: Some(Vec::new()),
        }
    }
}
