//! Program cache keyed by pipeline state
//!
//! Generated programs depend only on the codegen groups of a pipeline. The
//! cache hashes a pipeline over those groups and resolves collisions with
//! [`PipelineStore::equal`]. Each entry keeps a deep copy of the pipeline it
//! was created for, so later edits to the caller's pipeline never change a
//! key already in the cache.

use hashbrown::HashMap;

use crate::state::{LayerState, PipelineState};
use crate::store::{Pipeline, PipelineStore};

struct CacheEntry<V> {
    template: Pipeline,
    value: V,
}

/// Cache of per-pipeline values, typically compiled programs
pub struct ProgramCache<V> {
    entries: HashMap<u64, Vec<CacheEntry<V>>>,
    hits: u64,
    misses: u64,
}

impl<V> ProgramCache<V> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            hits: 0,
            misses: 0,
        }
    }

    /// Returns the value cached for pipelines equal to `pipeline` over
    /// `groups` and `layer_groups`, creating it with `make` on a miss.
    pub fn get_or_insert_with(
        &mut self,
        store: &mut PipelineStore,
        pipeline: &Pipeline,
        groups: PipelineState,
        layer_groups: LayerState,
        make: impl FnOnce(&PipelineStore, &Pipeline) -> V,
    ) -> &V {
        let hash = store.hash(pipeline.node(), groups, layer_groups);
        let bucket = self.entries.entry(hash).or_default();

        let position = bucket.iter().position(|entry| {
            store.equal(entry.template.node(), pipeline.node(), groups, layer_groups)
        });
        let position = match position {
            Some(position) => {
                self.hits += 1;
                position
            }
            None => {
                self.misses += 1;
                let (copy_groups, copy_layer_groups) = template_groups(groups, layer_groups);
                let template = store.deep_copy(pipeline.node(), copy_groups, copy_layer_groups);
                let value = make(store, &template);
                tracing::debug!(
                    "Program cache miss for {:?} (hash {:016x}, {} hits, {} misses)",
                    pipeline.node(),
                    hash,
                    self.hits,
                    self.misses
                );
                bucket.push(CacheEntry { template, value });
                bucket.len() - 1
            }
        };

        &bucket[position].value
    }

    /// Number of cached values
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Drops every entry, releasing the template pipelines.
    pub fn clear(&mut self, store: &mut PipelineStore) {
        let released = self.len();
        for entry in self.entries.drain().flat_map(|(_, bucket)| bucket) {
            store.release(entry.template);
        }
        tracing::debug!("Cleared program cache ({} entries)", released);
    }
}

/// Groups a template must hold to stay equal to its source over `groups`.
///
/// Blend equality also compares the derived blend enable, which reads
/// color, snippets and layer textures.
fn template_groups(groups: PipelineState, layer_groups: LayerState) -> (PipelineState, LayerState) {
    if groups.intersects(PipelineState::BLEND | PipelineState::REAL_BLEND_ENABLE) {
        (
            groups | PipelineState::AFFECTS_BLENDING,
            layer_groups | LayerState::AFFECTS_BLENDING,
        )
    } else {
        (groups, layer_groups)
    }
}

impl<V> Default for ProgramCache<V> {
    fn default() -> Self {
        Self::new()
    }
}
