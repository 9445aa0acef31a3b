//! Texture registry
//!
//! Layers refer to textures by [`TextureId`]. Several ids may wrap the same
//! GPU object; render equivalence only looks at the GPU handle.

use crate::arena::{Arena, arena_id};

arena_id!(
    /// A handle to a texture in a [`TextureRegistry`]
    TextureId
);

/// Texture target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum TextureType {
    #[default]
    Tex2d = 0,
    Tex3d = 1,
}

impl TextureType {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(TextureType::Tex2d),
            1 => Some(TextureType::Tex3d),
            _ => None,
        }
    }
}

/// What the pipeline engine needs to know about a texture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureInfo {
    pub gpu_handle: u32,
    pub texture_type: TextureType,
    /// The texel format carries an alpha channel
    pub has_alpha: bool,
}

struct TextureEntry {
    info: TextureInfo,
    ref_count: u32,
}

/// Reference counted texture wrappers
pub struct TextureRegistry {
    textures: Arena<TextureId, TextureEntry>,
}

impl TextureRegistry {
    pub fn new() -> Self {
        Self {
            textures: Arena::new(),
        }
    }

    /// Wraps a GPU texture. The caller holds the first reference.
    pub fn register(
        &mut self,
        gpu_handle: u32,
        texture_type: TextureType,
        has_alpha: bool,
    ) -> TextureId {
        let id = self.textures.insert(TextureEntry {
            info: TextureInfo {
                gpu_handle,
                texture_type,
                has_alpha,
            },
            ref_count: 1,
        });
        tracing::trace!("Registered texture {:?} (gpu handle {})", id, gpu_handle);
        id
    }

    pub fn retain(&mut self, id: TextureId) {
        self.textures[id].ref_count += 1;
    }

    /// Drops a reference, returning whether the texture was freed.
    pub fn release(&mut self, id: TextureId) -> bool {
        let entry = &mut self.textures[id];
        entry.ref_count -= 1;
        if entry.ref_count > 0 {
            return false;
        }

        self.textures.remove(id);
        tracing::trace!("Freed texture {:?}", id);
        true
    }

    pub fn info(&self, id: TextureId) -> &TextureInfo {
        &self.textures[id].info
    }

    pub fn ref_count(&self, id: TextureId) -> u32 {
        self.textures.get(id).map_or(0, |entry| entry.ref_count)
    }

    pub fn contains(&self, id: TextureId) -> bool {
        self.textures.contains(id)
    }

    /// Number of live textures
    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.len() == 0
    }
}

impl Default for TextureRegistry {
    fn default() -> Self {
        Self::new()
    }
}
