//! Uniform locations and values
//!
//! Uniform names map to small dense locations shared by every pipeline in
//! the store. A node's UNIFORMS payload holds only the locations that node
//! overrides; the effective value of a location is the nearest override
//! along the ancestry.

use std::collections::BTreeMap;

use glam::Mat4;

use crate::state::{PipelineState, UniformValue};
use crate::store::{NodeId, Pipeline, PipelineStore};

impl PipelineStore {
    /// Location for `name`, assigned on first use.
    pub fn uniform_location(&mut self, name: &str) -> u32 {
        if let Some(&location) = self.uniform_locations.get(name) {
            return location;
        }

        let location = self.uniform_names.len() as u32;
        self.uniform_names.push(name.to_string());
        self.uniform_locations.insert(name.to_string(), location);
        tracing::trace!("Uniform \"{}\" at location {}", name, location);
        location
    }

    pub fn uniform_name(&self, location: u32) -> Option<&str> {
        self.uniform_names.get(location as usize).map(String::as_str)
    }

    /// Nearest override of `location` at or above `node`
    pub(crate) fn effective_uniform(&self, node: NodeId, location: u32) -> Option<&UniformValue> {
        self.ancestry(node).into_iter().find_map(|id| {
            let entry = &self.nodes[id];
            if !entry.differences.contains(PipelineState::UNIFORMS) {
                return None;
            }
            entry.state.uniforms.as_ref()?.get(&location)
        })
    }

    /// Every location set at or above `node` with its effective value
    pub(crate) fn effective_uniforms(&self, node: NodeId) -> BTreeMap<u32, &UniformValue> {
        let mut effective = BTreeMap::new();
        for id in self.ancestry(node) {
            let entry = &self.nodes[id];
            if !entry.differences.contains(PipelineState::UNIFORMS) {
                continue;
            }
            for (&location, value) in entry.state.uniforms.iter().flatten() {
                // Nearer nodes were visited first
                effective.entry(location).or_insert(value);
            }
        }
        effective
    }

    pub fn uniform_value(&self, pipeline: &Pipeline, location: u32) -> Option<&UniformValue> {
        self.effective_uniform(pipeline.node, location)
    }

    /// Sets the value of one uniform location.
    pub fn set_uniform(&mut self, pipeline: &mut Pipeline, location: u32, value: UniformValue) {
        if self.effective_uniform(pipeline.node, location) == Some(&value) {
            return;
        }

        self.pre_change_notify(pipeline, PipelineState::UNIFORMS);
        let node = pipeline.node;

        let overrides_location = self.nodes[node].differences.contains(PipelineState::UNIFORMS)
            && self.nodes[node]
                .state
                .uniforms
                .as_ref()
                .is_some_and(|map| map.contains_key(&location));
        if overrides_location {
            let inherited = self.nodes[node]
                .parent
                .and_then(|parent| self.effective_uniform(parent, location));
            if inherited == Some(&value) {
                let uniforms = self.nodes[node].state.uniforms.get_or_insert_default();
                uniforms.remove(&location);
                if uniforms.is_empty() {
                    self.revert_group(pipeline, PipelineState::UNIFORMS);
                }
                return;
            }
        }

        let entry = &mut self.nodes[node];
        let newly_owned = !entry.differences.contains(PipelineState::UNIFORMS);
        entry
            .state
            .uniforms
            .get_or_insert_default()
            .insert(location, value);
        if newly_owned {
            entry.differences.insert(PipelineState::UNIFORMS);
            self.prune_redundant_ancestry(node);
        }
    }

    pub fn set_uniform_1f(&mut self, pipeline: &mut Pipeline, location: u32, value: f32) {
        self.set_uniform_float(pipeline, location, 1, &[value]);
    }

    pub fn set_uniform_1i(&mut self, pipeline: &mut Pipeline, location: u32, value: i32) {
        self.set_uniform_int(pipeline, location, 1, &[value]);
    }

    /// Sets an array of float vectors with `components` each.
    ///
    /// # Panics
    ///
    /// Panics unless `components` is 1 to 4.
    pub fn set_uniform_float(
        &mut self,
        pipeline: &mut Pipeline,
        location: u32,
        components: u8,
        values: &[f32],
    ) {
        assert!((1..=4).contains(&components), "invalid component count {components}");
        let value = UniformValue::Float {
            components,
            values: values.to_vec(),
        };
        self.set_uniform(pipeline, location, value);
    }

    /// Sets an array of int vectors with `components` each.
    ///
    /// # Panics
    ///
    /// Panics unless `components` is 1 to 4.
    pub fn set_uniform_int(
        &mut self,
        pipeline: &mut Pipeline,
        location: u32,
        components: u8,
        values: &[i32],
    ) {
        assert!((1..=4).contains(&components), "invalid component count {components}");
        let value = UniformValue::Int {
            components,
            values: values.to_vec(),
        };
        self.set_uniform(pipeline, location, value);
    }

    /// Sets an array of square matrices.
    ///
    /// # Panics
    ///
    /// Panics unless `dimensions` is 2 to 4.
    pub fn set_uniform_matrix(
        &mut self,
        pipeline: &mut Pipeline,
        location: u32,
        dimensions: u8,
        transpose: bool,
        values: &[f32],
    ) {
        assert!((2..=4).contains(&dimensions), "invalid matrix dimensions {dimensions}");
        let value = UniformValue::Matrix {
            dimensions,
            transpose,
            values: values.to_vec(),
        };
        self.set_uniform(pipeline, location, value);
    }

    pub fn set_uniform_mat4(&mut self, pipeline: &mut Pipeline, location: u32, matrix: &Mat4) {
        self.set_uniform_matrix(pipeline, location, 4, false, &matrix.to_cols_array());
    }

    /// Locations `pipeline` overrides itself, not counting ancestors
    pub fn uniform_overrides(&self, pipeline: &Pipeline) -> Vec<u32> {
        match self.nodes[pipeline.node].state.uniforms.as_ref() {
            Some(map) if self.differences(pipeline.node).contains(PipelineState::UNIFORMS) => {
                map.keys().copied().collect()
            }
            _ => Vec::new(),
        }
    }
}
