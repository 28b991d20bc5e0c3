//! In-memory shader registry.
//!
//! [`ShaderLibrary`] is a plain table implementation of [`ShaderRegistry`]:
//! hosts register shaders, graphics states, pipeline layouts and per-slot
//! defaults once at start-up, then share it as `Arc<dyn ShaderRegistry>`.
//! GPU objects (shader modules, vertex layouts) are owned by the backend and
//! keyed by the ids handed out here.

use loom_core::{GraphicsStateId, PipelineLayoutId, ShaderId, VertexInputId};
use rustc_hash::FxHashMap;

use crate::provider::{
    GraphicsState, PipelineLayoutDesc, ShaderData, ShaderInfo, ShaderRegistry, SlotShaderData,
};
use crate::slot::RenderSlotId;

#[derive(Debug, Clone)]
struct GraphicsStateEntry {
    state: GraphicsState,
    render_slot: Option<RenderSlotId>,
}

#[derive(Debug, Default, Clone)]
pub struct ShaderLibrary {
    slot_names: FxHashMap<String, RenderSlotId>,

    shader_names: FxHashMap<String, ShaderId>,
    shaders: Vec<ShaderInfo>,

    graphics_state_names: FxHashMap<String, GraphicsStateId>,
    graphics_states: Vec<GraphicsStateEntry>,

    layouts: Vec<PipelineLayoutDesc>,
    vertex_input_count: u32,

    slot_defaults: FxHashMap<RenderSlotId, SlotShaderData>,
    variants: FxHashMap<(ShaderId, RenderSlotId), ShaderData>,
}

impl ShaderLibrary {
    #[must_use]
    pub fn new() -> Self {
        let mut lib = Self::default();
        lib.register_slot("opaque", RenderSlotId::OPAQUE);
        lib.register_slot("translucent", RenderSlotId::TRANSLUCENT);
        lib.register_slot("depth", RenderSlotId::DEPTH);
        lib.register_slot("depth_vsm", RenderSlotId::DEPTH_VSM);
        lib
    }

    pub fn register_slot(&mut self, name: &str, slot: RenderSlotId) {
        self.slot_names.insert(name.to_owned(), slot);
    }

    pub fn add_pipeline_layout(&mut self, desc: PipelineLayoutDesc) -> PipelineLayoutId {
        let id = PipelineLayoutId::new(self.layouts.len() as u32);
        self.layouts.push(desc);
        id
    }

    /// Vertex inputs carry no metadata here; the id keys the backend's layout.
    pub fn add_vertex_input(&mut self) -> VertexInputId {
        let id = VertexInputId::new(self.vertex_input_count);
        self.vertex_input_count += 1;
        id
    }

    /// Registers a shader. Re-registering a name replaces its id mapping.
    pub fn add_shader(&mut self, name: &str, info: ShaderInfo) -> ShaderId {
        let id = ShaderId::new(self.shaders.len() as u32);
        self.shaders.push(info);
        self.shader_names.insert(name.to_owned(), id);
        id
    }

    pub fn add_graphics_state(
        &mut self,
        name: &str,
        state: GraphicsState,
        render_slot: Option<RenderSlotId>,
    ) -> GraphicsStateId {
        let id = GraphicsStateId::new(self.graphics_states.len() as u32);
        self.graphics_states.push(GraphicsStateEntry { state, render_slot });
        self.graphics_state_names.insert(name.to_owned(), id);
        id
    }

    pub fn set_slot_defaults(&mut self, slot: RenderSlotId, defaults: SlotShaderData) {
        self.slot_defaults.insert(slot, defaults);
    }

    pub fn add_slot_variant(&mut self, shader: ShaderId, slot: RenderSlotId, variant: ShaderData) {
        self.variants.insert((shader, slot), variant);
    }

    #[must_use]
    pub fn shader_count(&self) -> usize {
        self.shaders.len()
    }
}

impl ShaderRegistry for ShaderLibrary {
    fn render_slot_by_name(&self, name: &str) -> Option<RenderSlotId> {
        self.slot_names.get(name).copied()
    }

    fn shader_by_name(&self, name: &str) -> Option<ShaderId> {
        self.shader_names.get(name).copied()
    }

    fn graphics_state_by_name(&self, name: &str) -> Option<GraphicsStateId> {
        self.graphics_state_names.get(name).copied()
    }

    fn shader_info(&self, shader: ShaderId) -> Option<ShaderInfo> {
        self.shaders.get(shader.index()).copied()
    }

    fn graphics_state(&self, id: GraphicsStateId) -> Option<GraphicsState> {
        self.graphics_states.get(id.index()).map(|e| e.state)
    }

    fn graphics_state_render_slot(&self, id: GraphicsStateId) -> Option<RenderSlotId> {
        self.graphics_states.get(id.index()).and_then(|e| e.render_slot)
    }

    fn slot_variant(&self, shader: ShaderId, slot: RenderSlotId) -> Option<ShaderData> {
        self.variants.get(&(shader, slot)).copied()
    }

    fn slot_defaults(&self, slot: RenderSlotId) -> Option<SlotShaderData> {
        self.slot_defaults.get(&slot).copied()
    }

    fn pipeline_layout(&self, id: PipelineLayoutId) -> Option<PipelineLayoutDesc> {
        self.layouts.get(id.index()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_by_name_and_id() {
        let mut lib = ShaderLibrary::new();
        let layout = lib.add_pipeline_layout(PipelineLayoutDesc::default());
        let shader = lib.add_shader(
            "pbr",
            ShaderInfo {
                render_slot: None,
                pipeline_layout: layout,
                vertex_input: VertexInputId::INVALID,
            },
        );
        let gs = lib.add_graphics_state(
            "blend",
            GraphicsState::default(),
            Some(RenderSlotId::TRANSLUCENT),
        );

        assert_eq!(lib.shader_by_name("pbr"), Some(shader));
        assert_eq!(lib.graphics_state_by_name("blend"), Some(gs));
        assert_eq!(
            lib.graphics_state_render_slot(gs),
            Some(RenderSlotId::TRANSLUCENT)
        );
        assert_eq!(lib.render_slot_by_name("depth"), Some(RenderSlotId::DEPTH));
        assert!(lib.shader_info(ShaderId(99)).is_none());
        assert!(lib.pipeline_layout(layout).is_some());
    }

    #[test]
    fn variants_are_per_slot() {
        let mut lib = ShaderLibrary::new();
        let s = lib.add_shader("a", ShaderInfo::default());
        let d = lib.add_shader("a_depth", ShaderInfo::default());
        lib.add_slot_variant(s, RenderSlotId::DEPTH, ShaderData::new(d, GraphicsStateId::INVALID));
        assert_eq!(lib.slot_variant(s, RenderSlotId::DEPTH).map(|v| v.shader), Some(d));
        assert!(lib.slot_variant(s, RenderSlotId::OPAQUE).is_none());
    }
}
