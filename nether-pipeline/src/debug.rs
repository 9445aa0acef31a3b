//! Graphviz dump of the node trees

use std::fmt;

use crate::state::PipelineState;
use crate::store::PipelineStore;

/// DOT rendering of a store, produced by [`PipelineStore::graph`]
pub struct Graph<'a> {
    store: &'a PipelineStore,
}

impl fmt::Display for Graph<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.store.write_graph(f)
    }
}

impl PipelineStore {
    /// Every live pipeline and layer node as a DOT digraph.
    ///
    /// Pipelines are red, layers blue. Solid edges point at parents and
    /// dashed edges at the layers a pipeline's LAYERS map lists.
    pub fn graph(&self) -> Graph<'_> {
        Graph { store: self }
    }

    /// [`graph`](Self::graph) rendered to a string
    pub fn dump_graph(&self) -> String {
        self.graph().to_string()
    }

    fn write_graph(&self, out: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(out, "digraph pipelines {{")?;
        writeln!(out, "  node [shape=box, fontname=monospace];")?;

        for (id, node) in self.nodes.iter() {
            let groups: Vec<&str> = node.differences.iter_names().map(|(name, _)| name).collect();
            let label = node.label.as_deref().unwrap_or("");
            writeln!(
                out,
                "  pipeline{} [color=red, label=\"{:?} {}\\nref={}\\n{}\"];",
                id.index(),
                id,
                escape(label),
                node.ref_count,
                groups.join("|")
            )?;
            if let Some(parent) = node.parent {
                writeln!(out, "  pipeline{} -> pipeline{};", id.index(), parent.index())?;
            }
            if node.differences.contains(PipelineState::LAYERS) {
                for (index, layer) in node.state.layers.iter().flatten() {
                    writeln!(
                        out,
                        "  pipeline{} -> layer{} [style=dashed, color=blue, label=\"{}\"];",
                        id.index(),
                        layer.index(),
                        index
                    )?;
                }
            }
        }

        for (id, layer) in self.layers.iter() {
            let groups: Vec<&str> = layer.differences.iter_names().map(|(name, _)| name).collect();
            writeln!(
                out,
                "  layer{} [color=blue, label=\"{:?}\\nref={}\\n{}\"];",
                id.index(),
                id,
                layer.ref_count,
                groups.join("|")
            )?;
            if let Some(parent) = layer.parent {
                writeln!(out, "  layer{} -> layer{};", id.index(), parent.index())?;
            }
        }

        writeln!(out, "}}")
    }
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}
