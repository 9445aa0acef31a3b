//! Non-layer state setters and getters

use std::rc::Rc;

use crate::error::{Feature, PipelineError};
use crate::state::{
    BlendEnable, BlendState, Color, ColorMask, CompareFunction, CullFaceState, CullMode,
    DepthState, LogicOpsState, PipelineState, ProgramHandle, Snippet, SnippetList, SnippetStage,
    Winding, group,
};
use crate::store::{Pipeline, PipelineStore};

impl PipelineStore {
    // ========================================================================
    // Color and blending
    // ========================================================================

    pub fn color(&self, pipeline: &Pipeline) -> Color {
        *self.value::<group::Color>(pipeline.node)
    }

    pub fn set_color(&mut self, pipeline: &mut Pipeline, color: Color) {
        self.set_group::<group::Color>(pipeline, color);
    }

    pub fn blend_enabled(&self, pipeline: &Pipeline) -> BlendEnable {
        *self.value::<group::BlendEnable>(pipeline.node)
    }

    pub fn set_blend_enabled(&mut self, pipeline: &mut Pipeline, enable: BlendEnable) {
        self.set_group::<group::BlendEnable>(pipeline, enable);
    }

    pub fn blend(&self, pipeline: &Pipeline) -> &BlendState {
        self.value::<group::Blend>(pipeline.node)
    }

    /// Sets the blend function from a blend string.
    ///
    /// The blend constant is kept. Nothing changes if the string does not
    /// compile for this store's capabilities.
    pub fn set_blend(&mut self, pipeline: &mut Pipeline, blend: &str) -> Result<(), PipelineError> {
        let statements = nether_blend::compile(&self.caps.blend(), blend)?;
        let (rgb, alpha) = statements.rgb_alpha();
        let current = self.value::<group::Blend>(pipeline.node).constant;
        let state = BlendState::from_statements(rgb, alpha, current);

        tracing::debug!("Blend \"{}\" for {:?}: {:?}", blend, pipeline.node, state);
        self.set_group::<group::Blend>(pipeline, state);
        Ok(())
    }

    pub fn set_blend_constant(
        &mut self,
        pipeline: &mut Pipeline,
        constant: Color,
    ) -> Result<(), PipelineError> {
        if !self.caps.blend_constant {
            return Err(PipelineError::Unsupported {
                feature: Feature::BlendConstant,
                message: "Constant blend factors aren't supported by this driver",
            });
        }

        let state = BlendState {
            constant,
            ..*self.value::<group::Blend>(pipeline.node)
        };
        self.set_group::<group::Blend>(pipeline, state);
        Ok(())
    }

    // ========================================================================
    // Alpha test and depth
    // ========================================================================

    pub fn alpha_test_function(&self, pipeline: &Pipeline) -> CompareFunction {
        *self.value::<group::AlphaFunc>(pipeline.node)
    }

    pub fn alpha_test_reference(&self, pipeline: &Pipeline) -> f32 {
        *self.value::<group::AlphaFuncReference>(pipeline.node)
    }

    /// Sets the alpha test. The two halves are separate groups so that the
    /// reference can change without touching generated code.
    pub fn set_alpha_test_function(
        &mut self,
        pipeline: &mut Pipeline,
        function: CompareFunction,
        reference: f32,
    ) {
        self.set_group::<group::AlphaFunc>(pipeline, function);
        self.set_group::<group::AlphaFuncReference>(pipeline, reference);
    }

    pub fn depth_state(&self, pipeline: &Pipeline) -> &DepthState {
        self.value::<group::Depth>(pipeline.node)
    }

    pub fn set_depth_state(&mut self, pipeline: &mut Pipeline, depth: DepthState) {
        self.set_group::<group::Depth>(pipeline, depth);
    }

    // ========================================================================
    // Points
    // ========================================================================

    pub fn point_size(&self, pipeline: &Pipeline) -> f32 {
        *self.value::<group::PointSize>(pipeline.node)
    }

    pub fn set_point_size(&mut self, pipeline: &mut Pipeline, size: f32) {
        // Crossing zero changes the vertex shader on some drivers
        self.set_group::<group::NonZeroPointSize>(pipeline, size > 0.0);
        self.set_group::<group::PointSize>(pipeline, size);
    }

    pub fn per_vertex_point_size(&self, pipeline: &Pipeline) -> bool {
        *self.value::<group::PerVertexPointSize>(pipeline.node)
    }

    pub fn set_per_vertex_point_size(
        &mut self,
        pipeline: &mut Pipeline,
        enable: bool,
    ) -> Result<(), PipelineError> {
        if enable && !self.caps.per_vertex_point_size {
            return Err(PipelineError::Unsupported {
                feature: Feature::PerVertexPointSize,
                message: "Per-vertex point size is not supported",
            });
        }

        self.set_group::<group::PerVertexPointSize>(pipeline, enable);
        Ok(())
    }

    // ========================================================================
    // Rasterization
    // ========================================================================

    pub fn color_mask(&self, pipeline: &Pipeline) -> ColorMask {
        self.value::<group::LogicOps>(pipeline.node).color_mask
    }

    pub fn set_color_mask(&mut self, pipeline: &mut Pipeline, color_mask: ColorMask) {
        self.set_group::<group::LogicOps>(pipeline, LogicOpsState { color_mask });
    }

    pub fn cull_face_mode(&self, pipeline: &Pipeline) -> CullMode {
        self.value::<group::CullFace>(pipeline.node).mode
    }

    pub fn set_cull_face_mode(&mut self, pipeline: &mut Pipeline, mode: CullMode) {
        let state = CullFaceState {
            mode,
            ..*self.value::<group::CullFace>(pipeline.node)
        };
        self.set_group::<group::CullFace>(pipeline, state);
    }

    pub fn front_face_winding(&self, pipeline: &Pipeline) -> Winding {
        self.value::<group::CullFace>(pipeline.node).front_winding
    }

    pub fn set_front_face_winding(&mut self, pipeline: &mut Pipeline, front_winding: Winding) {
        let state = CullFaceState {
            front_winding,
            ..*self.value::<group::CullFace>(pipeline.node)
        };
        self.set_group::<group::CullFace>(pipeline, state);
    }

    // ========================================================================
    // Programs and snippets
    // ========================================================================

    pub fn user_program(&self, pipeline: &Pipeline) -> Option<ProgramHandle> {
        *self.value::<group::UserShader>(pipeline.node)
    }

    pub fn set_user_program(&mut self, pipeline: &mut Pipeline, program: Option<ProgramHandle>) {
        self.set_group::<group::UserShader>(pipeline, program);
    }

    pub fn vertex_snippets(&self, pipeline: &Pipeline) -> &SnippetList {
        self.value::<group::VertexSnippets>(pipeline.node)
    }

    pub fn fragment_snippets(&self, pipeline: &Pipeline) -> &SnippetList {
        self.value::<group::FragmentSnippets>(pipeline.node)
    }

    /// Appends a pipeline-level snippet.
    ///
    /// # Panics
    ///
    /// Panics if `snippet` uses a layer hook.
    pub fn add_snippet(&mut self, pipeline: &mut Pipeline, snippet: Rc<Snippet>) {
        assert!(
            !snippet.hook.is_layer_hook(),
            "{:?} is a layer hook",
            snippet.hook
        );

        match snippet.hook.stage() {
            SnippetStage::Vertex => {
                let mut list = self.vertex_snippets(pipeline).clone();
                list.push(snippet);
                self.set_group::<group::VertexSnippets>(pipeline, list);
            }
            SnippetStage::Fragment => {
                let mut list = self.fragment_snippets(pipeline).clone();
                list.push(snippet);
                self.set_group::<group::FragmentSnippets>(pipeline, list);
            }
        }
    }

    /// Groups `pipeline` would need to copy to stand on its own
    pub fn overridden_groups(&self, pipeline: &Pipeline) -> PipelineState {
        self.ancestry(pipeline.node)
            .into_iter()
            .filter(|&node| self.parent(node).is_some())
            .fold(PipelineState::empty(), |acc, node| acc | self.differences(node))
    }
}
