//! Copy-on-write mutation of pipeline nodes
//!
//! Every setter funnels through the same shape:
//!
//! 1. Resolve the authority for the group. If it already holds the new
//!    value, nothing changes.
//! 2. [`pre_change_notify`](PipelineStore::pre_change_notify) makes sure the
//!    handle's node is not shared, copying it when it is.
//! 3. If the node already owned the group and its ancestors hold the new
//!    value, the override is dropped instead (revert-on-match). A node left
//!    with no overrides is unlinked and the handle moves to its parent.
//! 4. Otherwise the payload is written, and a node that newly owns the group
//!    skips past ancestors it now fully shadows.
//!
//! # Modules
//!
//! - [`setters`] - Non-layer state setters and getters
//! - [`uniforms`] - Uniform locations and values
//! - [`layers`] - Layer list and per-layer state

pub mod layers;
pub mod setters;
pub mod uniforms;

use std::collections::BTreeSet;

use crate::state::{Group, LayerState, PipelineState, SparseState, group};
use crate::store::{NodeId, Pipeline, PipelineNode, PipelineStore};

impl PipelineStore {
    /// Copy-on-write gate for a change to `change` on `pipeline`.
    ///
    /// A node referenced by anything besides this handle is never written.
    /// It is copied under the same parent with the same overrides, and the
    /// handle moves to the copy. The root is never copied; a handle on the
    /// root moves to a fresh empty child instead.
    pub fn pre_change_notify(&mut self, pipeline: &mut Pipeline, change: PipelineState) {
        let node = pipeline.node;
        let source = &self.nodes[node];
        if source.ref_count == 1 {
            return;
        }

        let copy = match source.parent {
            Some(parent) => {
                let copy = PipelineNode {
                    parent: Some(parent),
                    differences: source.differences,
                    state: source.state.clone(),
                    ref_count: 1,
                    label: source.label.clone(),
                };
                let shared_layers: Vec<_> = if copy.differences.contains(PipelineState::LAYERS) {
                    copy.state.layers.iter().flat_map(|map| map.values().copied()).collect()
                } else {
                    Vec::new()
                };

                self.retain_node(parent);
                for layer in shared_layers {
                    self.retain_layer(layer);
                }
                self.nodes.insert(copy)
            }
            None => self.alloc_node(Some(node)),
        };

        tracing::debug!(
            "Copy-on-write of {:?} for {:?}: now {:?}",
            node,
            change,
            copy
        );
        pipeline.node = copy;
        self.release_node(node);
    }

    /// Canonical setter for a plain value group.
    pub(crate) fn set_group<G: Group>(&mut self, pipeline: &mut Pipeline, value: G::Value) {
        if *self.value::<G>(pipeline.node) == value {
            return;
        }

        self.pre_change_notify(pipeline, G::FLAG);
        let node = pipeline.node;

        if self.nodes[node].differences.contains(G::FLAG) {
            if let Some(parent) = self.nodes[node].parent {
                if *self.value::<G>(parent) == value {
                    self.revert_group(pipeline, G::FLAG);
                    return;
                }
            }
            *G::slot_mut(&mut self.nodes[node].state) = Some(value);
            return;
        }

        *G::slot_mut(&mut self.nodes[node].state) = Some(value);
        self.nodes[node].differences.insert(G::FLAG);
        self.prune_redundant_ancestry(node);
    }

    /// Drops the handle's override of `group`.
    ///
    /// The handle's node must be unshared. If it is left with no overrides
    /// it is unlinked and the handle moves to its parent.
    pub(crate) fn revert_group(&mut self, pipeline: &mut Pipeline, group: PipelineState) {
        let node = pipeline.node;
        self.clear_node_groups(node, group);
        tracing::trace!("{:?} reverted {:?}", node, group);

        let entry = &self.nodes[node];
        if !entry.differences.is_empty() {
            return;
        }
        if let Some(parent) = entry.parent {
            self.retain_node(parent);
            pipeline.node = parent;
            self.release_node(node);
            tracing::debug!("Pruned empty pipeline {:?}, now {:?}", node, parent);
        }
    }

    /// Clears `groups` from a node's overrides, releasing held layers.
    pub(crate) fn clear_node_groups(&mut self, node: NodeId, groups: PipelineState) {
        let entry = &mut self.nodes[node];
        let held_layers = if groups.contains(PipelineState::LAYERS) {
            entry.state.layers.take()
        } else {
            None
        };
        entry.differences.remove(groups);
        entry.state.clear_groups(groups);

        for layer in held_layers.into_iter().flat_map(|map| map.into_values()) {
            self.release_layer(layer);
        }
    }

    /// Reparents `node` past ancestors whose overrides it fully shadows.
    ///
    /// Never skips the root. An ancestor's uniform overrides only count as
    /// shadowed when `node` overrides every location the ancestor does.
    pub(crate) fn prune_redundant_ancestry(&mut self, node: NodeId) {
        let Some(old_parent) = self.nodes[node].parent else {
            return;
        };
        let differences = self.nodes[node].differences;
        let own_uniforms: BTreeSet<u32> = self.nodes[node]
            .state
            .uniforms
            .iter()
            .flat_map(|map| map.keys().copied())
            .collect();

        let mut new_parent = old_parent;
        loop {
            let candidate = &self.nodes[new_parent];
            let Some(grandparent) = candidate.parent else {
                break;
            };
            if !differences.contains(candidate.differences) {
                break;
            }
            if candidate.differences.contains(PipelineState::UNIFORMS) {
                let shadowed = candidate
                    .state
                    .uniforms
                    .iter()
                    .flat_map(|map| map.keys())
                    .all(|location| own_uniforms.contains(location));
                if !shadowed {
                    break;
                }
            }
            new_parent = grandparent;
        }

        if new_parent != old_parent {
            self.retain_node(new_parent);
            self.nodes[node].parent = Some(new_parent);
            self.release_node(old_parent);
            tracing::debug!(
                "Reparented {:?} from {:?} to {:?}",
                node,
                old_parent,
                new_parent
            );
        }
    }

    /// A new pipeline holding copies of the resolved `groups` of `src`.
    ///
    /// The copy derives directly from the root and shares no ancestry with
    /// `src`, so later changes to `src` or its ancestors never reach it.
    /// Layers are rebuilt with the requested `layer_groups`.
    pub fn deep_copy(
        &mut self,
        src: NodeId,
        groups: PipelineState,
        layer_groups: LayerState,
    ) -> Pipeline {
        let mut copy = self.new_pipeline();
        let plain = groups & (PipelineState::ALL_SPARSE - PipelineState::LAYERS);

        let mut state = SparseState::default();
        for group in plain.groups() {
            if group == PipelineState::UNIFORMS {
                // Flattened, since the copy no longer sees src's ancestors
                state.uniforms = Some(
                    self.effective_uniforms(src)
                        .into_iter()
                        .map(|(location, value)| (location, value.clone()))
                        .collect(),
                );
            } else {
                let authority = self.authority(src, group);
                state.copy_groups(&self.nodes[authority].state, group);
            }
        }
        let entry = &mut self.nodes[copy.node];
        entry.state = state;
        entry.differences = plain;

        if groups.contains(PipelineState::LAYERS) {
            let src_layers: Vec<_> = self
                .value::<group::Layers>(src)
                .iter()
                .map(|(&index, &layer)| (index, layer))
                .collect();
            for (index, src_layer) in src_layers {
                self.copy_layer_into(&mut copy, index, src_layer, layer_groups);
            }
        }

        tracing::debug!("Deep copied {:?} ({:?}) to {:?}", src, groups, copy.node);
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Capabilities;
    use crate::state::Color;

    fn store() -> PipelineStore {
        PipelineStore::new(Capabilities::default())
    }

    const RED: Color = Color::new(1.0, 0.0, 0.0, 1.0);
    const GREEN: Color = Color::new(0.0, 1.0, 0.0, 1.0);

    #[test]
    fn test_set_group_no_op_when_equal() {
        let mut store = store();
        let mut pipeline = store.new_pipeline();
        let before = pipeline.node();
        store.set_group::<group::Color>(&mut pipeline, Color::WHITE);
        assert_eq!(pipeline.node(), before);
        assert!(store.differences(before).is_empty());
        store.release(pipeline);
    }

    #[test]
    fn test_set_group_in_place_when_unshared() {
        let mut store = store();
        let mut pipeline = store.new_pipeline();
        let before = pipeline.node();
        store.set_group::<group::Color>(&mut pipeline, RED);
        assert_eq!(pipeline.node(), before);
        assert_eq!(store.differences(before), PipelineState::COLOR);
        assert_eq!(*store.value::<group::Color>(before), RED);
        store.release(pipeline);
    }

    #[test]
    fn test_shared_node_is_copied() {
        let mut store = store();
        let mut a = store.new_pipeline();
        store.set_group::<group::Color>(&mut a, RED);
        let mut b = store.share(&a);

        store.set_group::<group::Color>(&mut b, GREEN);
        assert_ne!(a.node(), b.node());
        assert_eq!(*store.value::<group::Color>(a.node()), RED);
        assert_eq!(*store.value::<group::Color>(b.node()), GREEN);
        assert_eq!(store.parent(b.node()), store.parent(a.node()));

        store.release(a);
        store.release(b);
        assert_eq!(store.node_count(), 1);
    }

    #[test]
    fn test_revert_redirects_to_parent() {
        let mut store = store();
        let mut parent = store.new_pipeline();
        store.set_group::<group::Color>(&mut parent, RED);
        let mut child = store.copy(&parent);

        store.set_group::<group::PointSize>(&mut child, 4.0);
        let child_node = child.node();
        assert_eq!(store.differences(child_node), PipelineState::POINT_SIZE);

        // Back to the inherited value empties the node
        store.set_group::<group::PointSize>(&mut child, 0.0);
        assert_eq!(child.node(), parent.node());
        assert!(!store.contains_node(child_node));

        store.release(child);
        store.release(parent);
        assert_eq!(store.node_count(), 1);
    }

    #[test]
    fn test_revert_keeps_other_overrides() {
        let mut store = store();
        let mut pipeline = store.new_pipeline();
        store.set_group::<group::Color>(&mut pipeline, RED);
        store.set_group::<group::PointSize>(&mut pipeline, 2.0);
        store.set_group::<group::Color>(&mut pipeline, Color::WHITE);
        assert_eq!(store.differences(pipeline.node()), PipelineState::POINT_SIZE);
        store.release(pipeline);
    }

    #[test]
    fn test_prune_skips_shadowed_ancestors() {
        let mut store = store();
        let mut a = store.new_pipeline();
        store.set_group::<group::Color>(&mut a, RED);
        let mut b = store.copy(&a);
        store.set_group::<group::Color>(&mut b, GREEN);

        assert_eq!(store.parent(b.node()), Some(store.root()));
        assert_eq!(store.ancestry(b.node()).len(), 2);
        store.release(a);
        store.release(b);
    }

    #[test]
    fn test_prune_keeps_needed_ancestors() {
        let mut store = store();
        let mut a = store.new_pipeline();
        store.set_group::<group::Color>(&mut a, RED);
        store.set_group::<group::PointSize>(&mut a, 3.0);
        let mut b = store.copy(&a);
        store.set_group::<group::Color>(&mut b, GREEN);

        // b still inherits the point size from a
        assert_eq!(store.parent(b.node()), Some(a.node()));
        assert_eq!(*store.value::<group::PointSize>(b.node()), 3.0);
        store.release(a);
        store.release(b);
    }

    #[test]
    fn test_root_handle_gets_child() {
        let mut store = store();
        let root = store.root();
        store.retain_node(root);
        let mut pipeline = Pipeline { node: root };

        store.set_group::<group::Color>(&mut pipeline, RED);
        assert_ne!(pipeline.node(), root);
        assert_eq!(store.parent(pipeline.node()), Some(root));
        assert_eq!(*store.value::<group::Color>(root), Color::WHITE);
        store.release(pipeline);
    }

    #[test]
    fn test_deep_copy_detaches_from_source() {
        let mut store = store();
        let mut src = store.new_pipeline();
        store.set_group::<group::Color>(&mut src, RED);
        store.set_group::<group::PointSize>(&mut src, 5.0);

        let copy = store.deep_copy(
            src.node(),
            PipelineState::COLOR | PipelineState::POINT_SIZE,
            LayerState::empty(),
        );
        assert_eq!(store.parent(copy.node()), Some(store.root()));
        assert_eq!(*store.value::<group::Color>(copy.node()), RED);

        store.set_group::<group::Color>(&mut src, GREEN);
        assert_eq!(*store.value::<group::Color>(copy.node()), RED);
        store.release(src);
        store.release(copy);
    }
}
