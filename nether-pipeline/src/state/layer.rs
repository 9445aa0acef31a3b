//! Layer state groups

use std::fmt;

use bitflags::bitflags;

use super::snippet::SnippetList;
use super::sparse_state;
use crate::sampler_cache::SamplerEntryId;
use crate::texture::{TextureId, TextureType};

bitflags! {
    /// Layer state groups
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LayerState: u32 {
        const UNIT = 1 << 0;
        const TEXTURE_TYPE = 1 << 1;
        const TEXTURE_DATA = 1 << 2;
        const SAMPLER = 1 << 3;
        const POINT_SPRITE_COORDS = 1 << 4;
        const VERTEX_SNIPPETS = 1 << 5;
        const FRAGMENT_SNIPPETS = 1 << 6;
    }
}

impl LayerState {
    /// Every group a layer can own
    pub const ALL_SPARSE: Self = Self::all();

    /// Layer groups whose change can flip the derived blend enable
    pub const AFFECTS_BLENDING: Self = Self::TEXTURE_DATA
        .union(Self::VERTEX_SNIPPETS)
        .union(Self::FRAGMENT_SNIPPETS);

    /// Groups whose change implies a change of the generated fragment code
    pub fn fragment_codegen(glsl: bool) -> Self {
        let mut state = Self::TEXTURE_TYPE | Self::UNIT | Self::FRAGMENT_SNIPPETS;
        // gl_PointCoord backs the sprite coords under GLSL
        if glsl {
            state |= Self::POINT_SPRITE_COORDS;
        }
        state
    }

    /// Groups that influence generated vertex shader code
    pub fn vertex_codegen() -> Self {
        Self::TEXTURE_TYPE | Self::UNIT | Self::VERTEX_SNIPPETS
    }

    pub fn name(self) -> &'static str {
        self.iter_names().next().map_or("NONE", |(name, _)| name)
    }
}

/// A layer state group with a stored payload
pub trait LayerGroup {
    const FLAG: LayerState;
    type Value: Clone + PartialEq + fmt::Debug;

    fn slot(state: &LayerSparseState) -> &Option<Self::Value>;
    fn slot_mut(state: &mut LayerSparseState) -> &mut Option<Self::Value>;
}

sparse_state! {
    /// Per-group payload slots of a layer node
    LayerSparseState, LayerState, LayerGroup, layer_group {
        /// Texture unit the layer is bound to
        Unit => unit: u32 = UNIT,
        TextureType => texture_type: crate::texture::TextureType = TEXTURE_TYPE,
        /// `None` samples the default texture for the layer's type
        TextureData => texture: Option<TextureId> = TEXTURE_DATA,
        Sampler => sampler: SamplerEntryId = SAMPLER,
        PointSpriteCoords => point_sprite_coords: bool = POINT_SPRITE_COORDS,
        VertexSnippets => vertex_snippets: SnippetList = VERTEX_SNIPPETS,
        FragmentSnippets => fragment_snippets: SnippetList = FRAGMENT_SNIPPETS,
    }
}

impl LayerSparseState {
    /// Payloads of the default layer, covering every group
    pub(crate) fn root(sampler: SamplerEntryId) -> Self {
        Self {
            unit: Some(0),
            texture_type: Some(TextureType::Tex2d),
            texture: Some(None),
            sampler: Some(sampler),
            point_sprite_coords: Some(false),
            vertex_snippets: Some(Vec::new()),
            fragment_snippets: Some(Vec::new()),
        }
    }

    /// Texture held by this node's own TEXTURE_DATA payload
    pub(crate) fn held_texture(&self) -> Option<TextureId> {
        self.texture.flatten()
    }
}
