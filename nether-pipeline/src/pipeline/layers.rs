//! Layer list and per-layer state
//!
//! A pipeline's layers live in the LAYERS group as a map from user index to
//! layer node. Texture units are assigned by index order: the lowest index
//! samples unit 0, the next unit 1, and so on. Inserting or removing a layer
//! shifts the units of every layer above it.
//!
//! Layers are copy-on-write like pipelines. A layer listed by exactly one
//! map and with no derived layers is written in place; any other layer gets
//! a derived child swapped into the writing pipeline's map first.

use std::rc::Rc;

use crate::error::{Feature, PipelineError};
use crate::sampler_cache::{TextureFilter, WrapMode};
use crate::state::{
    LayerGroup, LayerState, PipelineState, Snippet, SnippetList, SnippetStage, group, layer_group,
};
use crate::store::{LayerId, Pipeline, PipelineStore};
use crate::texture::{TextureId, TextureType};

impl PipelineStore {
    // ========================================================================
    // Layer list
    // ========================================================================

    pub fn n_layers(&self, pipeline: &Pipeline) -> usize {
        self.value::<group::Layers>(pipeline.node).len()
    }

    /// Layer indices in texture unit order
    pub fn layer_indices(&self, pipeline: &Pipeline) -> Vec<i32> {
        self.value::<group::Layers>(pipeline.node).keys().copied().collect()
    }

    /// Calls `callback` with each layer index in unit order until it
    /// returns `false`.
    pub fn foreach_layer(&self, pipeline: &Pipeline, mut callback: impl FnMut(i32) -> bool) {
        for index in self.layer_indices(pipeline) {
            if !callback(index) {
                break;
            }
        }
    }

    /// The layer node at `index`, if the pipeline has one
    pub fn layer(&self, pipeline: &Pipeline, index: i32) -> Option<LayerId> {
        self.value::<group::Layers>(pipeline.node).get(&index).copied()
    }

    /// Drops every layer past the first `n` in unit order.
    pub fn prune_to_n_layers(&mut self, pipeline: &mut Pipeline, n: usize) {
        let excess: Vec<i32> = self.layer_indices(pipeline).into_iter().skip(n).collect();
        // Highest first, so no remaining layer needs its unit shifted
        for index in excess.into_iter().rev() {
            self.remove_layer(pipeline, index);
        }
    }

    /// Removes the layer at `index` and shifts the units above it down.
    pub fn remove_layer(&mut self, pipeline: &mut Pipeline, index: i32) {
        if self.layer(pipeline, index).is_none() {
            return;
        }

        self.ensure_layers_authority(pipeline);
        let Some(map) = self.nodes[pipeline.node].state.layers.as_mut() else {
            unreachable!("layers authority without a layer map");
        };
        let Some(removed) = map.remove(&index) else {
            return;
        };
        let higher: Vec<i32> = map.keys().copied().filter(|&key| key > index).collect();
        self.release_layer(removed);
        tracing::debug!("Removed layer {} ({:?}) from {:?}", index, removed, pipeline.node);

        for key in higher {
            if let Some(layer) = self.layer(pipeline, key) {
                let unit = *self.layer_value::<layer_group::Unit>(layer);
                self.set_layer_group::<layer_group::Unit>(pipeline, key, unit - 1);
            }
        }
        self.try_reverting_layers_authority(pipeline);
    }

    // ========================================================================
    // Layer copy-on-write
    // ========================================================================

    /// Makes the handle's node the LAYERS authority, copying the inherited
    /// layer map.
    pub(crate) fn ensure_layers_authority(&mut self, pipeline: &mut Pipeline) {
        self.pre_change_notify(pipeline, PipelineState::LAYERS);
        let node = pipeline.node;
        if self.nodes[node].differences.contains(PipelineState::LAYERS) {
            return;
        }

        let map = self.value::<group::Layers>(node).clone();
        for &layer in map.values() {
            self.retain_layer(layer);
        }
        let entry = &mut self.nodes[node];
        entry.state.layers = Some(map);
        entry.differences.insert(PipelineState::LAYERS);
        self.prune_redundant_ancestry(node);
    }

    /// The layer at `index`, created from the default layers if missing.
    pub(crate) fn get_or_create_layer(&mut self, pipeline: &mut Pipeline, index: i32) -> LayerId {
        if let Some(layer) = self.layer(pipeline, index) {
            return layer;
        }

        self.ensure_layers_authority(pipeline);
        let Some(map) = self.nodes[pipeline.node].state.layers.as_ref() else {
            unreachable!("layers authority without a layer map");
        };
        let unit = map.keys().filter(|&&key| key < index).count() as u32;
        let higher: Vec<i32> = map.keys().copied().filter(|&key| key > index).collect();

        let template = if unit == 0 {
            self.default_layer_0
        } else {
            self.default_layer_n
        };
        let layer = self.alloc_layer(template);
        if unit > 1 {
            let entry = &mut self.layers[layer];
            entry.state.unit = Some(unit);
            entry.differences.insert(LayerState::UNIT);
        }
        if let Some(map) = self.nodes[pipeline.node].state.layers.as_mut() {
            map.insert(index, layer);
        }
        tracing::debug!(
            "New layer {} ({:?}) on unit {} for {:?}",
            index,
            layer,
            unit,
            pipeline.node
        );

        for key in higher {
            if let Some(shifted) = self.layer(pipeline, key) {
                let old_unit = *self.layer_value::<layer_group::Unit>(shifted);
                self.set_layer_group::<layer_group::Unit>(pipeline, key, old_unit + 1);
            }
        }
        layer
    }

    /// Copy-on-write gate for a change to `change` on the layer at `index`.
    ///
    /// Returns the layer that may be written.
    pub fn layer_pre_change_notify(
        &mut self,
        pipeline: &mut Pipeline,
        index: i32,
        change: LayerState,
    ) -> LayerId {
        let layer = self.get_or_create_layer(pipeline, index);
        self.ensure_layers_authority(pipeline);
        if self.layers[layer].ref_count == 1 {
            return layer;
        }

        let child = self.alloc_layer(layer);
        if let Some(map) = self.nodes[pipeline.node].state.layers.as_mut() {
            map.insert(index, child);
        }
        self.release_layer(layer);
        tracing::debug!(
            "Copy-on-write of layer {:?} for {:?}: now {:?}",
            layer,
            change,
            child
        );
        child
    }

    /// Canonical setter for a layer group.
    pub(crate) fn set_layer_group<L: LayerGroup>(
        &mut self,
        pipeline: &mut Pipeline,
        index: i32,
        value: L::Value,
    ) {
        let current = self.get_or_create_layer(pipeline, index);
        if *self.layer_value::<L>(current) == value {
            return;
        }

        let layer = self.layer_pre_change_notify(pipeline, index, L::FLAG);

        if self.layers[layer].differences.contains(L::FLAG) {
            if let Some(parent) = self.layers[layer].parent {
                if *self.layer_value::<L>(parent) == value {
                    self.clear_layer_groups(layer, L::FLAG);
                    if self.layers[layer].differences.is_empty() {
                        self.prune_empty_layer_difference(pipeline, index, layer);
                    }
                    return;
                }
            }
            self.write_layer_slot::<L>(layer, value);
            return;
        }

        self.write_layer_slot::<L>(layer, value);
        self.layers[layer].differences.insert(L::FLAG);
        self.prune_redundant_layer_ancestry(layer);
    }

    /// Writes a layer payload, keeping the texture reference in step.
    fn write_layer_slot<L: LayerGroup>(&mut self, layer: LayerId, value: L::Value) {
        let old = self.layers[layer].state.held_texture();
        *L::slot_mut(&mut self.layers[layer].state) = Some(value);
        let new = self.layers[layer].state.held_texture();

        if old != new {
            if let Some(texture) = new {
                self.textures.retain(texture);
            }
            if let Some(texture) = old {
                self.textures.release(texture);
            }
        }
    }

    fn clear_layer_groups(&mut self, layer: LayerId, groups: LayerState) {
        let entry = &mut self.layers[layer];
        let held = if groups.contains(LayerState::TEXTURE_DATA) {
            entry.state.held_texture()
        } else {
            None
        };
        entry.differences.remove(groups);
        entry.state.clear_groups(groups);
        if let Some(texture) = held {
            self.textures.release(texture);
        }
    }

    /// Reparents `layer` past ancestors whose overrides it fully shadows.
    fn prune_redundant_layer_ancestry(&mut self, layer: LayerId) {
        let Some(old_parent) = self.layers[layer].parent else {
            return;
        };
        let differences = self.layers[layer].differences;

        let mut new_parent = old_parent;
        loop {
            let candidate = &self.layers[new_parent];
            let Some(grandparent) = candidate.parent else {
                break;
            };
            if !differences.contains(candidate.differences) {
                break;
            }
            new_parent = grandparent;
        }

        if new_parent != old_parent {
            self.retain_layer(new_parent);
            self.layers[layer].parent = Some(new_parent);
            self.release_layer(old_parent);
            tracing::trace!(
                "Reparented layer {:?} from {:?} to {:?}",
                layer,
                old_parent,
                new_parent
            );
        }
    }

    /// Replaces a layer with no overrides left by its parent.
    fn prune_empty_layer_difference(&mut self, pipeline: &mut Pipeline, index: i32, layer: LayerId) {
        let Some(parent) = self.layers[layer].parent else {
            return;
        };

        self.retain_layer(parent);
        if let Some(map) = self.nodes[pipeline.node].state.layers.as_mut() {
            map.insert(index, parent);
        }
        self.release_layer(layer);
        tracing::trace!("Pruned empty layer {:?}, now {:?}", layer, parent);
        self.try_reverting_layers_authority(pipeline);
    }

    /// Drops the LAYERS override once it matches what the parent resolves.
    fn try_reverting_layers_authority(&mut self, pipeline: &mut Pipeline) {
        let node = pipeline.node;
        let entry = &self.nodes[node];
        if !entry.differences.contains(PipelineState::LAYERS) {
            return;
        }
        let Some(parent) = entry.parent else {
            return;
        };

        let matches_parent = entry.state.layers.as_ref() == Some(self.value::<group::Layers>(parent));
        if matches_parent {
            self.revert_group(pipeline, PipelineState::LAYERS);
        }
    }

    /// Rebuilds the layer at `index` of a fresh pipeline from `src`.
    pub(crate) fn copy_layer_into(
        &mut self,
        pipeline: &mut Pipeline,
        index: i32,
        src: LayerId,
        layer_groups: LayerState,
    ) {
        self.get_or_create_layer(pipeline, index);

        // Units follow from the index order of the copy
        for group in (layer_groups - LayerState::UNIT).iter() {
            match group {
                LayerState::TEXTURE_TYPE => {
                    let value = *self.layer_value::<layer_group::TextureType>(src);
                    self.set_layer_group::<layer_group::TextureType>(pipeline, index, value);
                }
                LayerState::TEXTURE_DATA => {
                    let value = *self.layer_value::<layer_group::TextureData>(src);
                    self.set_layer_group::<layer_group::TextureData>(pipeline, index, value);
                }
                LayerState::SAMPLER => {
                    let value = *self.layer_value::<layer_group::Sampler>(src);
                    self.set_layer_group::<layer_group::Sampler>(pipeline, index, value);
                }
                LayerState::POINT_SPRITE_COORDS => {
                    let value = *self.layer_value::<layer_group::PointSpriteCoords>(src);
                    self.set_layer_group::<layer_group::PointSpriteCoords>(pipeline, index, value);
                }
                LayerState::VERTEX_SNIPPETS => {
                    let value = self.layer_value::<layer_group::VertexSnippets>(src).clone();
                    self.set_layer_group::<layer_group::VertexSnippets>(pipeline, index, value);
                }
                LayerState::FRAGMENT_SNIPPETS => {
                    let value = self.layer_value::<layer_group::FragmentSnippets>(src).clone();
                    self.set_layer_group::<layer_group::FragmentSnippets>(pipeline, index, value);
                }
                _ => {}
            }
        }
    }

    // ========================================================================
    // Layer setters
    // ========================================================================

    /// Samples `texture` on the layer at `index`, creating the layer if needed.
    pub fn set_layer_texture(&mut self, pipeline: &mut Pipeline, index: i32, texture: TextureId) {
        let texture_type = self.textures.info(texture).texture_type;
        self.set_layer_group::<layer_group::TextureType>(pipeline, index, texture_type);
        self.set_layer_group::<layer_group::TextureData>(pipeline, index, Some(texture));
    }

    /// Samples the default texture of `texture_type` on the layer at `index`.
    pub fn set_layer_null_texture(
        &mut self,
        pipeline: &mut Pipeline,
        index: i32,
        texture_type: TextureType,
    ) {
        self.set_layer_group::<layer_group::TextureType>(pipeline, index, texture_type);
        self.set_layer_group::<layer_group::TextureData>(pipeline, index, None);
    }

    /// # Panics
    ///
    /// Panics if `mag_filter` samples mipmaps.
    pub fn set_layer_filters(
        &mut self,
        pipeline: &mut Pipeline,
        index: i32,
        min_filter: TextureFilter,
        mag_filter: TextureFilter,
    ) {
        assert!(
            matches!(mag_filter, TextureFilter::Nearest | TextureFilter::Linear),
            "magnification filter must be Nearest or Linear, got {mag_filter:?}"
        );

        let layer = self.get_or_create_layer(pipeline, index);
        let current = *self.layer_value::<layer_group::Sampler>(layer);
        let sampler = self.samplers.update_filters(current, min_filter, mag_filter);
        self.set_layer_group::<layer_group::Sampler>(pipeline, index, sampler);
    }

    pub fn set_layer_wrap_modes(
        &mut self,
        pipeline: &mut Pipeline,
        index: i32,
        wrap_s: WrapMode,
        wrap_t: WrapMode,
        wrap_p: WrapMode,
    ) {
        let layer = self.get_or_create_layer(pipeline, index);
        let current = *self.layer_value::<layer_group::Sampler>(layer);
        let sampler = self.samplers.update_wrap_modes(current, wrap_s, wrap_t, wrap_p);
        self.set_layer_group::<layer_group::Sampler>(pipeline, index, sampler);
    }

    pub fn set_layer_point_sprite_coords_enabled(
        &mut self,
        pipeline: &mut Pipeline,
        index: i32,
        enable: bool,
    ) -> Result<(), PipelineError> {
        if enable && !self.caps.point_sprite {
            return Err(PipelineError::Unsupported {
                feature: Feature::PointSprite,
                message: "Point sprite texture coordinates are enabled for a layer \
                          but the driver does not support it",
            });
        }

        self.set_layer_group::<layer_group::PointSpriteCoords>(pipeline, index, enable);
        Ok(())
    }

    /// Appends a snippet to the layer at `index`.
    ///
    /// # Panics
    ///
    /// Panics unless `snippet` uses a layer hook.
    pub fn add_layer_snippet(&mut self, pipeline: &mut Pipeline, index: i32, snippet: Rc<Snippet>) {
        assert!(
            snippet.hook.is_layer_hook(),
            "{:?} is not a layer hook",
            snippet.hook
        );

        let layer = self.get_or_create_layer(pipeline, index);
        match snippet.hook.stage() {
            SnippetStage::Vertex => {
                let mut list = self.layer_value::<layer_group::VertexSnippets>(layer).clone();
                list.push(snippet);
                self.set_layer_group::<layer_group::VertexSnippets>(pipeline, index, list);
            }
            SnippetStage::Fragment => {
                let mut list = self.layer_value::<layer_group::FragmentSnippets>(layer).clone();
                list.push(snippet);
                self.set_layer_group::<layer_group::FragmentSnippets>(pipeline, index, list);
            }
        }
    }

    // ========================================================================
    // Layer getters
    // ========================================================================

    pub fn layer_unit(&self, pipeline: &Pipeline, index: i32) -> Option<u32> {
        let layer = self.layer(pipeline, index)?;
        Some(*self.layer_value::<layer_group::Unit>(layer))
    }

    /// Texture sampled by the layer; `None` for a missing layer or the
    /// default texture.
    pub fn layer_texture(&self, pipeline: &Pipeline, index: i32) -> Option<TextureId> {
        let layer = self.layer(pipeline, index)?;
        *self.layer_value::<layer_group::TextureData>(layer)
    }

    pub fn layer_texture_type(&self, pipeline: &Pipeline, index: i32) -> Option<TextureType> {
        let layer = self.layer(pipeline, index)?;
        Some(*self.layer_value::<layer_group::TextureType>(layer))
    }

    /// Minification and magnification filters
    pub fn layer_filters(
        &self,
        pipeline: &Pipeline,
        index: i32,
    ) -> Option<(TextureFilter, TextureFilter)> {
        let layer = self.layer(pipeline, index)?;
        let key = self
            .samplers
            .entry(*self.layer_value::<layer_group::Sampler>(layer))
            .key;
        Some((key.min_filter, key.mag_filter))
    }

    pub fn layer_wrap_modes(
        &self,
        pipeline: &Pipeline,
        index: i32,
    ) -> Option<(WrapMode, WrapMode, WrapMode)> {
        let layer = self.layer(pipeline, index)?;
        let key = self
            .samplers
            .entry(*self.layer_value::<layer_group::Sampler>(layer))
            .key;
        Some((key.wrap_s, key.wrap_t, key.wrap_p))
    }

    pub fn layer_point_sprite_coords_enabled(&self, pipeline: &Pipeline, index: i32) -> bool {
        self.layer(pipeline, index)
            .is_some_and(|layer| *self.layer_value::<layer_group::PointSpriteCoords>(layer))
    }

    pub fn layer_vertex_snippets(&self, pipeline: &Pipeline, index: i32) -> Option<&SnippetList> {
        let layer = self.layer(pipeline, index)?;
        Some(self.layer_value::<layer_group::VertexSnippets>(layer))
    }

    pub fn layer_fragment_snippets(&self, pipeline: &Pipeline, index: i32) -> Option<&SnippetList> {
        let layer = self.layer(pipeline, index)?;
        Some(self.layer_value::<layer_group::FragmentSnippets>(layer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Capabilities;
    use crate::state::SnippetHook;

    fn store() -> PipelineStore {
        PipelineStore::new(Capabilities::default())
    }

    // ========================================================================
    // Layer list
    // ========================================================================

    #[test]
    fn test_layers_created_on_write_only() {
        let mut store = store();
        let mut pipeline = store.new_pipeline();
        assert_eq!(store.layer_unit(&pipeline, 0), None);
        assert_eq!(store.n_layers(&pipeline), 0);

        store.set_layer_null_texture(&mut pipeline, 0, TextureType::Tex3d);
        assert_eq!(store.n_layers(&pipeline), 1);
        assert_eq!(store.layer_unit(&pipeline, 0), Some(0));
        assert_eq!(store.layer_texture_type(&pipeline, 0), Some(TextureType::Tex3d));
        store.release(pipeline);
    }

    #[test]
    fn test_units_follow_index_order() {
        let mut store = store();
        let mut pipeline = store.new_pipeline();
        store.set_layer_null_texture(&mut pipeline, 10, TextureType::Tex3d);
        store.set_layer_null_texture(&mut pipeline, 20, TextureType::Tex3d);
        store.set_layer_null_texture(&mut pipeline, 30, TextureType::Tex3d);
        assert_eq!(store.layer_unit(&pipeline, 30), Some(2));

        store.set_layer_null_texture(&mut pipeline, 5, TextureType::Tex3d);
        assert_eq!(store.layer_indices(&pipeline), vec![5, 10, 20, 30]);
        assert_eq!(store.layer_unit(&pipeline, 5), Some(0));
        assert_eq!(store.layer_unit(&pipeline, 10), Some(1));
        assert_eq!(store.layer_unit(&pipeline, 30), Some(3));

        store.remove_layer(&mut pipeline, 10);
        assert_eq!(store.layer_unit(&pipeline, 20), Some(1));
        assert_eq!(store.layer_unit(&pipeline, 30), Some(2));
        store.release(pipeline);
    }

    #[test]
    fn test_foreach_layer_stops_early() {
        let mut store = store();
        let mut pipeline = store.new_pipeline();
        for index in [3, 1, 2] {
            store.set_layer_null_texture(&mut pipeline, index, TextureType::Tex3d);
        }

        let mut seen = Vec::new();
        store.foreach_layer(&pipeline, |index| {
            seen.push(index);
            index < 2
        });
        assert_eq!(seen, vec![1, 2]);
        store.release(pipeline);
    }

    #[test]
    fn test_prune_to_n_layers() {
        let mut store = store();
        let mut pipeline = store.new_pipeline();
        for index in 0..4 {
            store.set_layer_null_texture(&mut pipeline, index, TextureType::Tex3d);
        }
        store.prune_to_n_layers(&mut pipeline, 2);
        assert_eq!(store.layer_indices(&pipeline), vec![0, 1]);
        store.release(pipeline);
    }

    #[test]
    fn test_remove_last_layer_reverts_authority() {
        let mut store = store();
        let mut parent = store.new_pipeline();
        store.set_point_size(&mut parent, 2.0);
        let mut child = store.copy(&parent);

        store.set_layer_null_texture(&mut child, 0, TextureType::Tex3d);
        assert!(store.differences(child.node()).contains(PipelineState::LAYERS));
        store.remove_layer(&mut child, 0);
        assert_eq!(child.node(), parent.node());
        store.release(child);
        store.release(parent);
    }

    // ========================================================================
    // Layer copy-on-write
    // ========================================================================

    #[test]
    fn test_layer_written_in_place_when_unique() {
        let mut store = store();
        let mut pipeline = store.new_pipeline();
        store.set_layer_null_texture(&mut pipeline, 0, TextureType::Tex3d);
        let layer = store.layer(&pipeline, 0);
        store.set_layer_wrap_modes(
            &mut pipeline,
            0,
            WrapMode::ClampToEdge,
            WrapMode::ClampToEdge,
            WrapMode::ClampToEdge,
        );
        assert_eq!(store.layer(&pipeline, 0), layer);
        store.release(pipeline);
    }

    #[test]
    fn test_layer_copied_when_shared() {
        let mut store = store();
        let mut parent = store.new_pipeline();
        store.set_layer_null_texture(&mut parent, 0, TextureType::Tex3d);
        let mut child = store.copy(&parent);
        let shared = store.layer(&parent, 0);
        assert_eq!(store.layer(&child, 0), shared);

        store.set_layer_filters(&mut child, 0, TextureFilter::Nearest, TextureFilter::Nearest);
        assert_eq!(store.layer(&parent, 0), shared);
        assert_ne!(store.layer(&child, 0), shared);
        assert_eq!(
            store.layer_filters(&parent, 0),
            Some((TextureFilter::Linear, TextureFilter::Linear))
        );
        assert_eq!(
            store.layer_texture_type(&child, 0),
            Some(TextureType::Tex3d)
        );
        store.release(child);
        store.release(parent);
    }

    #[test]
    fn test_texture_references_follow_layers() {
        let mut store = store();
        let texture = store.textures_mut().register(7, TextureType::Tex2d, true);
        let mut pipeline = store.new_pipeline();
        store.set_layer_texture(&mut pipeline, 0, texture);
        assert_eq!(store.textures().ref_count(texture), 2);

        store.set_layer_null_texture(&mut pipeline, 0, TextureType::Tex2d);
        assert_eq!(store.textures().ref_count(texture), 1);

        store.set_layer_texture(&mut pipeline, 0, texture);
        store.release(pipeline);
        assert_eq!(store.textures().ref_count(texture), 1);
    }

    #[test]
    #[should_panic(expected = "magnification filter")]
    fn test_mipmap_mag_filter_panics() {
        let mut store = store();
        let mut pipeline = store.new_pipeline();
        store.set_layer_filters(
            &mut pipeline,
            0,
            TextureFilter::Linear,
            TextureFilter::LinearMipmapLinear,
        );
    }

    #[test]
    fn test_point_sprite_gated() {
        let mut store = PipelineStore::new(Capabilities::minimal());
        let mut pipeline = store.new_pipeline();
        let err = store
            .set_layer_point_sprite_coords_enabled(&mut pipeline, 0, true)
            .unwrap_err();
        assert!(err.is_unsupported());
        assert_eq!(store.n_layers(&pipeline), 0);
        store.release(pipeline);
    }

    #[test]
    fn test_layer_snippets() {
        let mut store = store();
        let mut pipeline = store.new_pipeline();
        let lookup = Rc::new(Snippet::new(SnippetHook::TextureLookup, None, None));
        store.add_layer_snippet(&mut pipeline, 1, lookup.clone());

        let fragment = store.layer_fragment_snippets(&pipeline, 1);
        assert_eq!(fragment.map(|list| list.len()), Some(1));
        assert_eq!(store.layer_vertex_snippets(&pipeline, 1).map(|list| list.len()), Some(0));
        store.release(pipeline);
    }
}
