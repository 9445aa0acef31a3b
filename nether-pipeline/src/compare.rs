//! Pipeline equality and hashing
//!
//! Two pipelines are equal over a set of groups when they would render the
//! same for those groups, which is looser than payload equality: the blend
//! constant only matters when a factor reads it, depth settings only matter
//! when the depth test is on, and so on. Hashing follows the same rules so
//! that equal pipelines always hash equally.
//!
//! Hashes are xxh3 over the resolved payloads. Floats are hashed by their
//! bits after folding `-0.0` into `0.0`.

use std::hash::Hash;

use xxhash_rust::xxh3::Xxh3;

use crate::state::render::canonical_f32;
use crate::state::{
    BlendEnable, BlendEquation, CullMode, Group, LayerGroup, LayerState, PipelineState, group,
    layer_group,
};
use crate::store::{LayerId, NodeId, PipelineStore};

impl PipelineStore {
    // ========================================================================
    // Derived blend enable
    // ========================================================================

    /// Whether drawing with `node` needs blending turned on.
    ///
    /// An explicit enable or disable wins. Under automatic blending the
    /// replace blend never blends, any other equation or factor always
    /// blends, and the default "over" blend only blends when something can
    /// produce a translucent fragment.
    pub fn real_blend_enable(&self, node: NodeId) -> bool {
        match self.value::<group::BlendEnable>(node) {
            BlendEnable::Enabled => return true,
            BlendEnable::Disabled => return false,
            BlendEnable::Automatic => {}
        }

        let blend = self.value::<group::Blend>(node);
        if blend.is_replace() {
            return false;
        }
        if blend.equation_rgb != BlendEquation::Add || blend.equation_alpha != BlendEquation::Add {
            return true;
        }
        if !blend.is_over() {
            return true;
        }

        self.has_translucency(node)
    }

    fn has_translucency(&self, node: NodeId) -> bool {
        if self.value::<group::Color>(node).alpha_byte() != 0xff {
            return true;
        }
        if !self.value::<group::VertexSnippets>(node).is_empty()
            || !self.value::<group::FragmentSnippets>(node).is_empty()
        {
            return true;
        }

        self.value::<group::Layers>(node).values().any(|&layer| {
            if !self.layer_value::<layer_group::VertexSnippets>(layer).is_empty()
                || !self.layer_value::<layer_group::FragmentSnippets>(layer).is_empty()
            {
                return true;
            }
            self.layer_value::<layer_group::TextureData>(layer)
                .is_some_and(|texture| self.textures.info(texture).has_alpha)
        })
    }

    // ========================================================================
    // Differences
    // ========================================================================

    /// Groups overridden anywhere between `a`, `b` and their nearest common
    /// ancestor
    pub fn compare_differences(&self, a: NodeId, b: NodeId) -> PipelineState {
        let a_chain = self.ancestry(a);
        let b_chain = self.ancestry(b);
        let (a_own, b_own) = split_at_common_ancestor(&a_chain, &b_chain);

        a_own
            .iter()
            .chain(b_own)
            .fold(PipelineState::empty(), |acc, &node| acc | self.nodes[node].differences)
    }

    pub fn layer_compare_differences(&self, a: LayerId, b: LayerId) -> LayerState {
        let a_chain = self.layer_ancestry(a);
        let b_chain = self.layer_ancestry(b);
        let (a_own, b_own) = split_at_common_ancestor(&a_chain, &b_chain);

        a_own
            .iter()
            .chain(b_own)
            .fold(LayerState::empty(), |acc, &layer| acc | self.layers[layer].differences)
    }

    // ========================================================================
    // Equality
    // ========================================================================

    /// Whether `a` and `b` render the same for `groups` and, within LAYERS,
    /// for `layer_groups`.
    pub fn equal(
        &self,
        a: NodeId,
        b: NodeId,
        groups: PipelineState,
        layer_groups: LayerState,
    ) -> bool {
        if a == b {
            return true;
        }

        let differing = self.compare_differences(a, b);
        // Both sides resolve every blending input from the same nodes
        let same_blending = !differing.intersects(PipelineState::AFFECTS_BLENDING);

        if groups.contains(PipelineState::REAL_BLEND_ENABLE)
            && !same_blending
            && self.real_blend_enable(a) != self.real_blend_enable(b)
        {
            return false;
        }

        for group in (groups & PipelineState::ALL_SPARSE).groups() {
            // Blend equality depends on the derived enable, which other
            // groups feed into
            if group == PipelineState::BLEND {
                if !same_blending && !self.blend_equal(a, b) {
                    return false;
                }
                continue;
            }
            if !differing.intersects(group) {
                continue;
            }
            if self.authority(a, group) == self.authority(b, group) {
                continue;
            }
            if !self.group_equal(a, b, group, layer_groups) {
                tracing::trace!("{:?} and {:?} differ in {}", a, b, group.name());
                return false;
            }
        }
        true
    }

    fn blend_equal(&self, a: NodeId, b: NodeId) -> bool {
        let enabled = self.real_blend_enable(a);
        if enabled != self.real_blend_enable(b) {
            return false;
        }
        if !enabled {
            return true;
        }

        self.value::<group::Blend>(a)
            .equivalent(self.value::<group::Blend>(b))
    }

    fn group_equal(
        &self,
        a: NodeId,
        b: NodeId,
        group: PipelineState,
        layer_groups: LayerState,
    ) -> bool {
        match group {
            PipelineState::COLOR => self.value_equal::<group::Color>(a, b),
            PipelineState::BLEND_ENABLE => self.value_equal::<group::BlendEnable>(a, b),
            PipelineState::LAYERS => self.layers_equal(a, b, layer_groups),
            PipelineState::ALPHA_FUNC => self.value_equal::<group::AlphaFunc>(a, b),
            PipelineState::ALPHA_FUNC_REFERENCE => {
                self.value_equal::<group::AlphaFuncReference>(a, b)
            }
            PipelineState::BLEND => self.blend_equal(a, b),
            PipelineState::USER_SHADER => self.value_equal::<group::UserShader>(a, b),
            PipelineState::DEPTH => self
                .value::<group::Depth>(a)
                .equivalent(self.value::<group::Depth>(b)),
            PipelineState::NON_ZERO_POINT_SIZE => self.value_equal::<group::NonZeroPointSize>(a, b),
            PipelineState::POINT_SIZE => self.value_equal::<group::PointSize>(a, b),
            PipelineState::PER_VERTEX_POINT_SIZE => {
                self.value_equal::<group::PerVertexPointSize>(a, b)
            }
            PipelineState::LOGIC_OPS => self.value_equal::<group::LogicOps>(a, b),
            PipelineState::CULL_FACE => self
                .value::<group::CullFace>(a)
                .equivalent(self.value::<group::CullFace>(b)),
            // Locations unset on one side compare as unset
            PipelineState::UNIFORMS => self.effective_uniforms(a) == self.effective_uniforms(b),
            PipelineState::VERTEX_SNIPPETS => self.value_equal::<group::VertexSnippets>(a, b),
            PipelineState::FRAGMENT_SNIPPETS => self.value_equal::<group::FragmentSnippets>(a, b),
            _ => true,
        }
    }

    fn value_equal<G: Group>(&self, a: NodeId, b: NodeId) -> bool {
        self.value::<G>(a) == self.value::<G>(b)
    }

    fn layers_equal(&self, a: NodeId, b: NodeId, layer_groups: LayerState) -> bool {
        let a_layers = self.value::<group::Layers>(a);
        let b_layers = self.value::<group::Layers>(b);
        if a_layers.len() != b_layers.len() {
            return false;
        }

        a_layers
            .values()
            .zip(b_layers.values())
            .all(|(&la, &lb)| self.layer_equal(la, lb, layer_groups))
    }

    /// Whether two layers sample the same for `layer_groups`.
    ///
    /// Textures compare by GPU handle and samplers by sampler object, so
    /// distinct wrappers of one GPU resource are equal.
    pub fn layer_equal(&self, a: LayerId, b: LayerId, layer_groups: LayerState) -> bool {
        if a == b {
            return true;
        }

        let differing = self.layer_compare_differences(a, b);
        (layer_groups & differing).iter().all(|group| match group {
            LayerState::UNIT => self.layer_value_equal::<layer_group::Unit>(a, b),
            LayerState::TEXTURE_TYPE => self.layer_value_equal::<layer_group::TextureType>(a, b),
            LayerState::TEXTURE_DATA => self.texture_data_equal(a, b),
            LayerState::SAMPLER => {
                let sa = *self.layer_value::<layer_group::Sampler>(a);
                let sb = *self.layer_value::<layer_group::Sampler>(b);
                self.samplers.sampler_object(sa) == self.samplers.sampler_object(sb)
            }
            LayerState::POINT_SPRITE_COORDS => {
                self.layer_value_equal::<layer_group::PointSpriteCoords>(a, b)
            }
            LayerState::VERTEX_SNIPPETS => {
                self.layer_value_equal::<layer_group::VertexSnippets>(a, b)
            }
            LayerState::FRAGMENT_SNIPPETS => {
                self.layer_value_equal::<layer_group::FragmentSnippets>(a, b)
            }
            _ => true,
        })
    }

    fn layer_value_equal<L: LayerGroup>(&self, a: LayerId, b: LayerId) -> bool {
        self.layer_value::<L>(a) == self.layer_value::<L>(b)
    }

    fn texture_data_equal(&self, a: LayerId, b: LayerId) -> bool {
        match (
            *self.layer_value::<layer_group::TextureData>(a),
            *self.layer_value::<layer_group::TextureData>(b),
        ) {
            (None, None) => self.layer_value_equal::<layer_group::TextureType>(a, b),
            (Some(ta), Some(tb)) => {
                self.textures.info(ta).gpu_handle == self.textures.info(tb).gpu_handle
            }
            _ => false,
        }
    }

    // ========================================================================
    // Hashing
    // ========================================================================

    /// Hash of `node` over `groups`, consistent with [`equal`](Self::equal).
    pub fn hash(&self, node: NodeId, groups: PipelineState, layer_groups: LayerState) -> u64 {
        let mut hasher = Xxh3::new();
        let blend_enabled = self.real_blend_enable(node);

        if groups.contains(PipelineState::REAL_BLEND_ENABLE) {
            hasher.update(&[blend_enabled as u8]);
        }

        for group in (groups & PipelineState::ALL_SPARSE).groups() {
            self.hash_group(&mut hasher, node, group, layer_groups, blend_enabled);
        }
        hasher.digest()
    }

    fn hash_group(
        &self,
        hasher: &mut Xxh3,
        node: NodeId,
        group: PipelineState,
        layer_groups: LayerState,
        blend_enabled: bool,
    ) {
        match group {
            PipelineState::COLOR => {
                let color = self.value::<group::Color>(node).canonical();
                hasher.update(bytemuck::cast_slice(&color));
            }
            PipelineState::BLEND_ENABLE => {
                hasher.update(&(*self.value::<group::BlendEnable>(node) as u32).to_le_bytes());
            }
            PipelineState::LAYERS => {
                let layers = self.value::<group::Layers>(node);
                hasher.update(&(layers.len() as u32).to_le_bytes());
                for &layer in layers.values() {
                    self.hash_layer(hasher, layer, layer_groups);
                }
            }
            PipelineState::ALPHA_FUNC => {
                hasher.update(&(*self.value::<group::AlphaFunc>(node) as u32).to_le_bytes());
            }
            PipelineState::ALPHA_FUNC_REFERENCE => {
                hash_f32(hasher, *self.value::<group::AlphaFuncReference>(node));
            }
            PipelineState::BLEND => {
                // Blend state is irrelevant while blending is off
                if !blend_enabled {
                    return;
                }
                let blend = self.value::<group::Blend>(node);
                let words = [
                    blend.equation_rgb as u32,
                    blend.equation_alpha as u32,
                    blend.src_factor_rgb as u32,
                    blend.dst_factor_rgb as u32,
                    blend.src_factor_alpha as u32,
                    blend.dst_factor_alpha as u32,
                ];
                hasher.update(bytemuck::cast_slice(&words));
                if blend.uses_constant() {
                    hasher.update(bytemuck::cast_slice(&blend.constant.canonical()));
                }
            }
            PipelineState::USER_SHADER => {
                let program = self.value::<group::UserShader>(node).map_or(0, |p| p.0);
                hasher.update(&program.to_le_bytes());
            }
            PipelineState::DEPTH => {
                let depth = self.value::<group::Depth>(node);
                hasher.update(&[depth.test_enabled as u8]);
                if depth.test_enabled {
                    hasher.update(&(depth.test_function as u32).to_le_bytes());
                    hasher.update(&[depth.write_enabled as u8]);
                    hash_f32(hasher, depth.range_near);
                    hash_f32(hasher, depth.range_far);
                }
            }
            PipelineState::NON_ZERO_POINT_SIZE => {
                hasher.update(&[*self.value::<group::NonZeroPointSize>(node) as u8]);
            }
            PipelineState::POINT_SIZE => {
                hash_f32(hasher, *self.value::<group::PointSize>(node));
            }
            PipelineState::PER_VERTEX_POINT_SIZE => {
                hasher.update(&[*self.value::<group::PerVertexPointSize>(node) as u8]);
            }
            PipelineState::LOGIC_OPS => {
                hasher.update(&[self.value::<group::LogicOps>(node).color_mask.bits()]);
            }
            PipelineState::CULL_FACE => {
                let cull = self.value::<group::CullFace>(node);
                hasher.update(&(cull.mode as u32).to_le_bytes());
                if cull.mode != CullMode::None {
                    hasher.update(&[cull.front_winding as u8]);
                }
            }
            // Uniform values never select a program, so they stay out of
            // the hash and only take part in equality
            PipelineState::UNIFORMS => {}
            PipelineState::VERTEX_SNIPPETS => {
                self.value::<group::VertexSnippets>(node).hash(hasher);
            }
            PipelineState::FRAGMENT_SNIPPETS => {
                self.value::<group::FragmentSnippets>(node).hash(hasher);
            }
            _ => {}
        }
    }

    fn hash_layer(&self, hasher: &mut Xxh3, layer: LayerId, layer_groups: LayerState) {
        for group in layer_groups.iter() {
            match group {
                LayerState::UNIT => {
                    hasher.update(&self.layer_value::<layer_group::Unit>(layer).to_le_bytes());
                }
                LayerState::TEXTURE_TYPE => {
                    let texture_type = *self.layer_value::<layer_group::TextureType>(layer);
                    hasher.update(&(texture_type as u32).to_le_bytes());
                }
                LayerState::TEXTURE_DATA => {
                    match *self.layer_value::<layer_group::TextureData>(layer) {
                        Some(texture) => {
                            hasher.update(&[1]);
                            hasher.update(&self.textures.info(texture).gpu_handle.to_le_bytes());
                        }
                        None => {
                            let texture_type = *self.layer_value::<layer_group::TextureType>(layer);
                            hasher.update(&[0]);
                            hasher.update(&(texture_type as u32).to_le_bytes());
                        }
                    }
                }
                LayerState::SAMPLER => {
                    let sampler = *self.layer_value::<layer_group::Sampler>(layer);
                    hasher.update(&self.samplers.sampler_object(sampler).to_le_bytes());
                }
                LayerState::POINT_SPRITE_COORDS => {
                    let enabled = *self.layer_value::<layer_group::PointSpriteCoords>(layer);
                    hasher.update(&[enabled as u8]);
                }
                LayerState::VERTEX_SNIPPETS => {
                    self.layer_value::<layer_group::VertexSnippets>(layer).hash(hasher);
                }
                LayerState::FRAGMENT_SNIPPETS => {
                    self.layer_value::<layer_group::FragmentSnippets>(layer).hash(hasher);
                }
                _ => {}
            }
        }
    }

    // ========================================================================
    // Equivalent ancestors
    // ========================================================================

    /// Oldest ancestor of `node` with the same `groups` and `layer_groups`.
    ///
    /// Programs generated for the result can be shared by `node`, and the
    /// ancestor is less likely to change again than a leaf is.
    pub fn find_equivalent_parent(
        &self,
        node: NodeId,
        groups: PipelineState,
        layer_groups: LayerState,
    ) -> NodeId {
        let interesting = (groups & PipelineState::ALL_SPARSE) | PipelineState::LAYERS;

        let mut authority0 = self.authority(node, interesting);
        let Some(parent) = self.nodes[authority0].parent else {
            return authority0;
        };
        let mut authority1 = self.authority(parent, interesting);
        let n_layers = self.value::<group::Layers>(authority0).len();

        loop {
            let layers0 = self.value::<group::Layers>(authority0);
            let layers1 = self.value::<group::Layers>(authority1);
            if layers1.len() != n_layers {
                return authority0;
            }
            if self.compare_differences(authority0, authority1).intersects(groups) {
                return authority0;
            }
            let layers_differ = layers0.values().zip(layers1.values()).any(|(&l0, &l1)| {
                l0 != l1 && self.layer_compare_differences(l0, l1).intersects(layer_groups)
            });
            if layers_differ {
                return authority0;
            }

            let Some(parent) = self.nodes[authority1].parent else {
                return authority1;
            };
            authority0 = authority1;
            authority1 = self.authority(parent, interesting);
        }
    }
}

fn hash_f32(hasher: &mut Xxh3, value: f32) {
    hasher.update(&canonical_f32(value).to_le_bytes());
}

/// The parts of two root-terminated chains below their common ancestor
fn split_at_common_ancestor<'a, I: PartialEq>(a: &'a [I], b: &'a [I]) -> (&'a [I], &'a [I]) {
    let shared = a
        .iter()
        .rev()
        .zip(b.iter().rev())
        .take_while(|(x, y)| x == y)
        .count();
    (&a[..a.len() - shared], &b[..b.len() - shared])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Capabilities;
    use crate::state::{Color, DepthState};

    fn store() -> PipelineStore {
        PipelineStore::new(Capabilities::default())
    }

    #[test]
    fn test_compare_differences_common_ancestor() {
        let mut store = store();
        let mut a = store.new_pipeline();
        store.set_point_size(&mut a, 2.0);
        let mut b = store.copy(&a);
        let mut c = store.copy(&a);
        store.set_color(&mut b, Color::new(1.0, 0.0, 0.0, 1.0));
        store.set_color_mask(&mut c, crate::state::ColorMask::RED);

        let differences = store.compare_differences(b.node(), c.node());
        assert_eq!(differences, PipelineState::COLOR | PipelineState::LOGIC_OPS);
        for pipeline in [a, b, c] {
            store.release(pipeline);
        }
    }

    #[test]
    fn test_real_blend_enable_automatic() {
        let mut store = store();
        let mut pipeline = store.new_pipeline();
        assert!(!store.real_blend_enable(pipeline.node()));

        store.set_color(&mut pipeline, Color::new(1.0, 1.0, 1.0, 0.5));
        assert!(store.real_blend_enable(pipeline.node()));

        store
            .set_blend(&mut pipeline, "RGBA = ADD(SRC_COLOR, 0)")
            .unwrap();
        assert!(!store.real_blend_enable(pipeline.node()));

        store.set_blend_enabled(&mut pipeline, BlendEnable::Enabled);
        assert!(store.real_blend_enable(pipeline.node()));
        store.release(pipeline);
    }

    #[test]
    fn test_real_blend_enable_texture_alpha() {
        let mut store = store();
        let opaque = store.textures_mut().register(1, crate::texture::TextureType::Tex2d, false);
        let translucent = store.textures_mut().register(2, crate::texture::TextureType::Tex2d, true);
        let mut pipeline = store.new_pipeline();

        store.set_layer_texture(&mut pipeline, 0, opaque);
        assert!(!store.real_blend_enable(pipeline.node()));
        store.set_layer_texture(&mut pipeline, 1, translucent);
        assert!(store.real_blend_enable(pipeline.node()));
        store.release(pipeline);
    }

    #[test]
    fn test_blend_equal_ignores_state_when_disabled() {
        let mut store = store();
        let mut a = store.new_pipeline();
        let mut b = store.new_pipeline();
        store.set_blend_enabled(&mut a, BlendEnable::Disabled);
        store.set_blend_enabled(&mut b, BlendEnable::Disabled);
        store
            .set_blend(&mut b, "RGBA = ADD(SRC_COLOR*(DST_COLOR), 0)")
            .unwrap();

        assert!(store.equal(a.node(), b.node(), PipelineState::BLEND, LayerState::empty()));
        assert_eq!(
            store.hash(a.node(), PipelineState::BLEND, LayerState::empty()),
            store.hash(b.node(), PipelineState::BLEND, LayerState::empty())
        );
        store.release(a);
        store.release(b);
    }

    #[test]
    fn test_depth_disabled_equal() {
        let mut store = store();
        let mut a = store.new_pipeline();
        store.set_depth_state(
            &mut a,
            DepthState {
                range_near: 0.5,
                ..DepthState::default()
            },
        );
        let b = store.new_pipeline();
        assert!(store.equal(a.node(), b.node(), PipelineState::DEPTH, LayerState::empty()));
        assert_eq!(
            store.hash(a.node(), PipelineState::DEPTH, LayerState::empty()),
            store.hash(b.node(), PipelineState::DEPTH, LayerState::empty())
        );
        store.release(a);
        store.release(b);
    }

    #[test]
    fn test_find_equivalent_parent_skips_irrelevant_changes() {
        let mut store = store();
        let mut base = store.new_pipeline();
        store.set_color_mask(&mut base, crate::state::ColorMask::RED);
        store.set_alpha_test_function(&mut base, crate::state::CompareFunction::Greater, 0.5);
        let mut leaf = store.copy(&base);
        store.set_color(&mut leaf, Color::new(0.0, 0.0, 1.0, 1.0));

        let fragment = PipelineState::fragment_codegen();
        let parent = store.find_equivalent_parent(leaf.node(), fragment, LayerState::empty());
        assert_eq!(parent, base.node());
        store.release(base);
        store.release(leaf);
    }

    #[test]
    fn test_split_at_common_ancestor() {
        let (a, b) = split_at_common_ancestor(&[4, 3, 1, 0], &[5, 1, 0]);
        assert_eq!(a, &[4, 3]);
        assert_eq!(b, &[5]);
    }
}
