//! Pipeline and layer node storage
//!
//! [`PipelineStore`] owns both node trees together with the services the
//! nodes refer to: target capabilities, the sampler cache, the texture
//! registry and the uniform name table. Every operation goes through the
//! store; nodes are addressed by [`NodeId`] and [`LayerId`].
//!
//! Lifetime is explicit reference counting. A pipeline node is referenced
//! by user [`Pipeline`] handles, by its child nodes and by external retains.
//! A layer node is referenced by the layer maps that list it, by its child
//! layers and by external retains. Dropping the last reference frees the
//! slot and releases whatever the node referenced.

use hashbrown::{HashMap, HashSet};

use crate::arena::{Arena, arena_id};
use crate::config::Capabilities;
use crate::error::{Feature, PipelineError};
use crate::sampler_cache::SamplerCache;
use crate::state::{
    Group, LayerGroup, LayerSparseState, LayerState, PipelineState, SparseState,
};
use crate::texture::TextureRegistry;

arena_id!(
    /// A handle to a pipeline node in a [`PipelineStore`]
    NodeId
);

arena_id!(
    /// A handle to a layer node in a [`PipelineStore`]
    LayerId
);

pub(crate) struct PipelineNode {
    pub(crate) parent: Option<NodeId>,
    pub(crate) differences: PipelineState,
    pub(crate) state: SparseState,
    pub(crate) ref_count: u32,
    pub(crate) label: Option<String>,
}

pub(crate) struct LayerNode {
    pub(crate) parent: Option<LayerId>,
    pub(crate) differences: LayerState,
    pub(crate) state: LayerSparseState,
    pub(crate) ref_count: u32,
}

/// A user-owned reference to a pipeline node
///
/// Setters take `&mut Pipeline` because copy-on-write may move the handle
/// to a fresh node. Handles are released with [`PipelineStore::release`].
#[must_use = "pipelines hold a reference until passed to PipelineStore::release"]
#[derive(Debug, PartialEq, Eq)]
pub struct Pipeline {
    pub(crate) node: NodeId,
}

impl Pipeline {
    /// The node this handle currently refers to
    pub fn node(&self) -> NodeId {
        self.node
    }
}

/// Owner of the pipeline and layer trees
pub struct PipelineStore {
    pub(crate) caps: Capabilities,
    pub(crate) nodes: Arena<NodeId, PipelineNode>,
    pub(crate) layers: Arena<LayerId, LayerNode>,
    pub(crate) root: NodeId,
    /// Template for a pipeline's first texture unit
    pub(crate) default_layer_0: LayerId,
    /// Template for every other texture unit
    pub(crate) default_layer_n: LayerId,
    pub(crate) samplers: SamplerCache,
    pub(crate) textures: TextureRegistry,
    pub(crate) uniform_locations: HashMap<String, u32>,
    pub(crate) uniform_names: Vec<String>,
    warned: HashSet<Feature>,
}

impl PipelineStore {
    /// Creates the root pipeline and the default layers for `caps`.
    pub fn new(caps: Capabilities) -> Self {
        let mut samplers = SamplerCache::new(caps.sampler_objects);
        let default_sampler = samplers.default_entry();

        let mut nodes = Arena::new();
        let root = nodes.insert(PipelineNode {
            parent: None,
            differences: PipelineState::ALL_SPARSE,
            state: SparseState::root(),
            ref_count: 1,
            label: Some("root".to_string()),
        });

        let mut layers = Arena::new();
        let default_layer_0 = layers.insert(LayerNode {
            parent: None,
            differences: LayerState::ALL_SPARSE,
            state: LayerSparseState::root(default_sampler),
            // The store and default_layer_n
            ref_count: 2,
        });
        let default_layer_n = layers.insert(LayerNode {
            parent: Some(default_layer_0),
            differences: LayerState::UNIT,
            state: LayerSparseState {
                unit: Some(1),
                ..LayerSparseState::default()
            },
            ref_count: 1,
        });

        tracing::debug!("Created pipeline store with {:?}", caps);

        Self {
            caps,
            nodes,
            layers,
            root,
            default_layer_0,
            default_layer_n,
            samplers,
            textures: TextureRegistry::new(),
            uniform_locations: HashMap::new(),
            uniform_names: Vec::new(),
            warned: HashSet::new(),
        }
    }

    pub fn caps(&self) -> &Capabilities {
        &self.caps
    }

    pub fn samplers(&self) -> &SamplerCache {
        &self.samplers
    }

    pub fn textures(&self) -> &TextureRegistry {
        &self.textures
    }

    /// Texture registry, for registering and releasing textures
    pub fn textures_mut(&mut self) -> &mut TextureRegistry {
        &mut self.textures
    }

    /// The root pipeline node holding every default
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of live pipeline nodes, the root included
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of live layer nodes, the default layers included
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    // ========================================================================
    // Handles
    // ========================================================================

    /// A new pipeline with every group at its default.
    pub fn new_pipeline(&mut self) -> Pipeline {
        let node = self.alloc_node(Some(self.root));
        Pipeline { node }
    }

    /// A new pipeline deriving from `src`.
    ///
    /// The copy shares every group with `src` until one of them changes it.
    pub fn copy(&mut self, src: &Pipeline) -> Pipeline {
        let node = self.alloc_node(Some(src.node));
        tracing::trace!("Copied {:?} to {:?}", src.node, node);
        Pipeline { node }
    }

    /// A second handle to the same node.
    ///
    /// Either handle's next change copies the node first, so the two
    /// handles still behave as independent values.
    pub fn share(&mut self, pipeline: &Pipeline) -> Pipeline {
        self.retain_node(pipeline.node);
        Pipeline {
            node: pipeline.node,
        }
    }

    /// Drops a pipeline handle.
    pub fn release(&mut self, pipeline: Pipeline) {
        self.release_node(pipeline.node);
    }

    /// Adds an external reference to `node`.
    pub fn retain_node(&mut self, node: NodeId) {
        self.nodes[node].ref_count += 1;
    }

    /// Drops a reference to `node`, freeing it and whatever it alone kept
    /// alive once the count reaches zero.
    pub fn release_node(&mut self, node: NodeId) {
        let mut pending = vec![node];
        while let Some(id) = pending.pop() {
            let entry = &mut self.nodes[id];
            entry.ref_count -= 1;
            if entry.ref_count > 0 {
                continue;
            }

            let freed = self.nodes.remove(id);
            tracing::trace!("Freed pipeline node {:?}", id);
            if freed.differences.contains(PipelineState::LAYERS) {
                for layer in freed.state.layers.into_iter().flat_map(|map| map.into_values()) {
                    self.release_layer(layer);
                }
            }
            if let Some(parent) = freed.parent {
                pending.push(parent);
            }
        }
    }

    pub(crate) fn alloc_node(&mut self, parent: Option<NodeId>) -> NodeId {
        if let Some(parent) = parent {
            self.retain_node(parent);
        }
        self.nodes.insert(PipelineNode {
            parent,
            differences: PipelineState::empty(),
            state: SparseState::default(),
            ref_count: 1,
            label: None,
        })
    }

    pub(crate) fn retain_layer(&mut self, layer: LayerId) {
        self.layers[layer].ref_count += 1;
    }

    pub(crate) fn release_layer(&mut self, layer: LayerId) {
        let mut pending = vec![layer];
        while let Some(id) = pending.pop() {
            let entry = &mut self.layers[id];
            entry.ref_count -= 1;
            if entry.ref_count > 0 {
                continue;
            }

            let freed = self.layers.remove(id);
            tracing::trace!("Freed layer node {:?}", id);
            if let Some(texture) = freed.state.held_texture() {
                self.textures.release(texture);
            }
            if let Some(parent) = freed.parent {
                pending.push(parent);
            }
        }
    }

    /// A new empty layer deriving from `parent`, referenced once.
    pub(crate) fn alloc_layer(&mut self, parent: LayerId) -> LayerId {
        self.retain_layer(parent);
        self.layers.insert(LayerNode {
            parent: Some(parent),
            differences: LayerState::empty(),
            state: LayerSparseState::default(),
            ref_count: 1,
        })
    }

    // ========================================================================
    // Node inspection
    // ========================================================================

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node].parent
    }

    /// Groups `node` itself overrides
    pub fn differences(&self, node: NodeId) -> PipelineState {
        self.nodes[node].differences
    }

    pub fn ref_count(&self, node: NodeId) -> u32 {
        self.nodes[node].ref_count
    }

    pub fn contains_node(&self, node: NodeId) -> bool {
        self.nodes.contains(node)
    }

    /// `node` followed by each of its ancestors up to the root
    pub fn ancestry(&self, node: NodeId) -> Vec<NodeId> {
        std::iter::successors(Some(node), |&id| self.nodes[id].parent).collect()
    }

    pub fn layer_parent(&self, layer: LayerId) -> Option<LayerId> {
        self.layers[layer].parent
    }

    /// Groups `layer` itself overrides
    pub fn layer_differences(&self, layer: LayerId) -> LayerState {
        self.layers[layer].differences
    }

    pub fn layer_ref_count(&self, layer: LayerId) -> u32 {
        self.layers[layer].ref_count
    }

    pub fn contains_layer(&self, layer: LayerId) -> bool {
        self.layers.contains(layer)
    }

    /// `layer` followed by each of its ancestors up to the default layer
    pub fn layer_ancestry(&self, layer: LayerId) -> Vec<LayerId> {
        std::iter::successors(Some(layer), |&id| self.layers[id].parent).collect()
    }

    // ========================================================================
    // Authority resolution
    // ========================================================================

    /// Nearest of `node` and its ancestors that overrides any of `groups`.
    ///
    /// The root overrides every group, so this always succeeds.
    pub fn authority(&self, node: NodeId, groups: PipelineState) -> NodeId {
        let mut current = node;
        loop {
            let entry = &self.nodes[current];
            if entry.differences.intersects(groups) {
                return current;
            }
            match entry.parent {
                Some(parent) => current = parent,
                None => return current,
            }
        }
    }

    /// Nearest of `layer` and its ancestors that overrides any of `groups`.
    pub fn layer_authority(&self, layer: LayerId, groups: LayerState) -> LayerId {
        let mut current = layer;
        loop {
            let entry = &self.layers[current];
            if entry.differences.intersects(groups) {
                return current;
            }
            match entry.parent {
                Some(parent) => current = parent,
                None => return current,
            }
        }
    }

    /// Effective value of group `G` at `node`
    pub fn value<G: Group>(&self, node: NodeId) -> &G::Value {
        let authority = self.authority(node, G::FLAG);
        match G::slot(&self.nodes[authority].state) {
            Some(value) => value,
            None => unreachable!("authority {:?} holds no {} payload", authority, G::FLAG.name()),
        }
    }

    /// Effective value of layer group `L` at `layer`
    pub fn layer_value<L: LayerGroup>(&self, layer: LayerId) -> &L::Value {
        let authority = self.layer_authority(layer, L::FLAG);
        match L::slot(&self.layers[authority].state) {
            Some(value) => value,
            None => unreachable!("authority {:?} holds no {} payload", authority, L::FLAG.name()),
        }
    }

    /// Authority of each single group in `groups`, in bit order
    pub fn resolve_authorities(
        &self,
        node: NodeId,
        groups: PipelineState,
    ) -> Vec<(PipelineState, NodeId)> {
        (groups & PipelineState::ALL_SPARSE)
            .groups()
            .map(|group| (group, self.authority(node, group)))
            .collect()
    }

    // ========================================================================
    // Diagnostics
    // ========================================================================

    /// Sets a debug label shown in graph dumps.
    ///
    /// A shared node, the root included, is copied first so the label
    /// stays on this handle.
    pub fn set_label(&mut self, pipeline: &mut Pipeline, label: &str) {
        self.pre_change_notify(pipeline, PipelineState::empty());
        self.nodes[pipeline.node].label = Some(label.to_string());
    }

    pub fn label(&self, node: NodeId) -> Option<&str> {
        self.nodes[node].label.as_deref()
    }

    /// Turns an error nobody handles into a log line.
    ///
    /// Capability errors warn once per feature for the life of the store;
    /// anything else warns every time.
    pub fn warn_once<T>(&mut self, result: Result<T, PipelineError>) -> Option<T> {
        let e = match result {
            Ok(value) => return Some(value),
            Err(e) => e,
        };
        match e.unsupported_feature() {
            Some(feature) => {
                if self.warned.insert(feature) {
                    tracing::warn!("{} ({})", e, feature.name());
                }
            }
            None => tracing::warn!("{}", e),
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::group;

    fn store() -> PipelineStore {
        PipelineStore::new(Capabilities::default())
    }

    #[test]
    fn test_root_is_authority_for_everything() {
        let store = store();
        let root = store.root();
        assert_eq!(store.differences(root), PipelineState::ALL_SPARSE);
        for group in PipelineState::ALL_SPARSE.groups() {
            assert_eq!(store.authority(root, group), root);
        }
    }

    #[test]
    fn test_new_pipeline_is_child_of_root() {
        let mut store = store();
        let pipeline = store.new_pipeline();
        assert_eq!(store.parent(pipeline.node()), Some(store.root()));
        assert!(store.differences(pipeline.node()).is_empty());
        assert_eq!(store.ref_count(store.root()), 2);
        store.release(pipeline);
        assert_eq!(store.ref_count(store.root()), 1);
    }

    #[test]
    fn test_release_cascades_to_parent() {
        let mut store = store();
        let a = store.new_pipeline();
        let b = store.copy(&a);
        let a_node = a.node();
        store.release(a);

        // Still referenced by b
        assert!(store.contains_node(a_node));
        store.release(b);
        assert!(!store.contains_node(a_node));
        assert_eq!(store.node_count(), 1);
    }

    #[test]
    fn test_share_counts_references() {
        let mut store = store();
        let a = store.new_pipeline();
        let b = store.share(&a);
        assert_eq!(a.node(), b.node());
        assert_eq!(store.ref_count(a.node()), 2);
        store.release(b);
        assert_eq!(store.ref_count(a.node()), 1);
        store.release(a);
    }

    #[test]
    fn test_default_layers() {
        let store = store();
        let layer_n = store.default_layer_n;
        assert_eq!(store.layer_parent(layer_n), Some(store.default_layer_0));
        assert_eq!(*store.layer_value::<crate::state::layer_group::Unit>(layer_n), 1);
        assert_eq!(
            store.layer_authority(layer_n, LayerState::SAMPLER),
            store.default_layer_0
        );
    }

    #[test]
    fn test_value_resolves_through_root() {
        let mut store = store();
        let pipeline = store.new_pipeline();
        assert_eq!(
            *store.value::<group::Color>(pipeline.node()),
            crate::state::Color::WHITE
        );
        store.release(pipeline);
    }

    #[test]
    fn test_warn_once_swallows_errors() {
        let mut store = store();
        let err: Result<(), PipelineError> = Err(PipelineError::Unsupported {
            feature: Feature::PointSprite,
            message: "unsupported",
        });
        assert_eq!(store.warn_once(err), None);
        assert!(store.warned.contains(&Feature::PointSprite));
        assert_eq!(store.warn_once(Ok(3)), Some(3));
    }

    #[test]
    fn test_warn_once_dedupes_blend_string_capabilities() {
        let mut store = PipelineStore::new(Capabilities::minimal());
        let mut pipeline = store.new_pipeline();
        for _ in 0..2 {
            let result = store.set_blend(&mut pipeline, "RGBA = ADD(SRC_COLOR*(CONSTANT), 0)");
            assert_eq!(store.warn_once(result), None);
        }
        assert_eq!(store.warned.len(), 1);
        assert!(store.warned.contains(&Feature::BlendConstant));
        store.release(pipeline);
    }

    #[test]
    fn test_label_on_reverted_handle_stays_off_root() {
        let mut store = store();
        let mut pipeline = store.new_pipeline();
        store.set_point_size(&mut pipeline, 2.0);
        store.set_point_size(&mut pipeline, 0.0);
        assert_eq!(pipeline.node(), store.root());

        store.set_label(&mut pipeline, "hud");
        assert_ne!(pipeline.node(), store.root());
        assert_eq!(store.label(pipeline.node()), Some("hud"));
        assert_eq!(store.label(store.root()), Some("root"));
        store.release(pipeline);
        assert_eq!(store.node_count(), 1);
    }

    #[test]
    fn test_label_on_shared_handle_copies() {
        let mut store = store();
        let mut a = store.new_pipeline();
        store.set_label(&mut a, "a");
        let mut b = store.share(&a);

        store.set_label(&mut b, "b");
        assert_ne!(a.node(), b.node());
        assert_eq!(store.label(a.node()), Some("a"));
        assert_eq!(store.label(b.node()), Some("b"));
        assert_eq!(store.ref_count(a.node()), 1);

        store.release(a);
        store.release(b);
        assert_eq!(store.node_count(), 1);
    }
}
