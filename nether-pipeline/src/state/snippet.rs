//! Shader snippets attached to pipelines and layers

use std::rc::Rc;

/// Point in generated shader code where a snippet is inserted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnippetHook {
    Vertex,
    VertexTransform,
    VertexGlobals,
    PointSize,
    Fragment,
    FragmentGlobals,
    /// Per-layer texture coordinate transform in the vertex stage
    TextureCoordTransform,
    /// Per-layer fragment combine
    LayerFragment,
    /// Per-layer texture sample
    TextureLookup,
}

/// Shader stage a hook belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnippetStage {
    Vertex,
    Fragment,
}

impl SnippetHook {
    pub fn stage(self) -> SnippetStage {
        match self {
            SnippetHook::Vertex
            | SnippetHook::VertexTransform
            | SnippetHook::VertexGlobals
            | SnippetHook::PointSize
            | SnippetHook::TextureCoordTransform => SnippetStage::Vertex,
            SnippetHook::Fragment
            | SnippetHook::FragmentGlobals
            | SnippetHook::LayerFragment
            | SnippetHook::TextureLookup => SnippetStage::Fragment,
        }
    }

    /// Whether the hook attaches to a layer rather than a pipeline
    pub fn is_layer_hook(self) -> bool {
        matches!(
            self,
            SnippetHook::TextureCoordTransform | SnippetHook::LayerFragment | SnippetHook::TextureLookup
        )
    }
}

/// A fragment of shader source bound to a hook
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Snippet {
    pub hook: SnippetHook,
    pub declarations: Option<String>,
    pub pre: Option<String>,
    pub replace: Option<String>,
    pub post: Option<String>,
}

impl Snippet {
    pub fn new(hook: SnippetHook, declarations: Option<&str>, post: Option<&str>) -> Self {
        Self {
            hook,
            declarations: declarations.map(str::to_owned),
            pre: None,
            replace: None,
            post: post.map(str::to_owned),
        }
    }

    pub fn with_pre(mut self, pre: &str) -> Self {
        self.pre = Some(pre.to_owned());
        self
    }

    pub fn with_replace(mut self, replace: &str) -> Self {
        self.replace = Some(replace.to_owned());
        self
    }
}

/// Snippets in attachment order; shared between nodes that copy the list
pub type SnippetList = Vec<Rc<Snippet>>;
