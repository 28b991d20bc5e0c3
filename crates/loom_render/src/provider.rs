//! Collaborator interfaces.
//!
//! The core never talks to a graphics API directly. Shader lookup, pipeline
//! creation, buffer management and binding-set management are reached through
//! the traits in this module:
//!
//! - [`ShaderRegistry`]: read-only lookups, injected as `Arc` at construction.
//! - [`PipelineFactory`]: creates pipeline objects on cache miss.
//! - [`ResourceProvider`]: buffers, default image and sampler.
//! - [`BindingProvider`]: binding sets for a (pipeline layout, set index) pair.
//!
//! [`RenderBackend`] bundles the three mutable services so a single backend
//! object can be handed to the renderer.

use loom_core::{
    BindingSetHandle, BufferHandle, GraphicsStateId, ImageHandle, PipelineHandle,
    PipelineLayoutId, Result, SamplerHandle, ShaderId, VertexInputId,
};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::slot::RenderSlotId;

// ─── Shader identity ──────────────────────────────────────────────────────────

/// Shader plus graphics state requested for a submission. Either half may be
/// invalid, in which case the slot defaults fill it in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ShaderData {
    pub shader: ShaderId,
    pub graphics_state: GraphicsStateId,
}

impl ShaderData {
    #[must_use]
    pub const fn new(shader: ShaderId, graphics_state: GraphicsStateId) -> Self {
        Self {
            shader,
            graphics_state,
        }
    }
}

/// Fully specified default shader data of a render slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SlotShaderData {
    pub shader: ShaderId,
    pub graphics_state: GraphicsStateId,
    pub pipeline_layout: PipelineLayoutId,
    pub vertex_input: VertexInputId,
}

/// Reflection summary of a registered shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ShaderInfo {
    /// Slot the shader was authored for, if any.
    pub render_slot: Option<RenderSlotId>,
    pub pipeline_layout: PipelineLayoutId,
    pub vertex_input: VertexInputId,
}

// ─── Graphics state ───────────────────────────────────────────────────────────

/// Fixed-function pipeline state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphicsState {
    pub topology: wgpu::PrimitiveTopology,
    pub front_face: wgpu::FrontFace,
    pub cull_mode: Option<wgpu::Face>,
    pub depth_write: bool,
    pub depth_compare: wgpu::CompareFunction,
    pub depth_bias: wgpu::DepthBiasState,
    pub blend: Option<wgpu::BlendState>,
    pub write_mask: wgpu::ColorWrites,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            topology: wgpu::PrimitiveTopology::TriangleList,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: Some(wgpu::Face::Back),
            depth_write: true,
            depth_compare: wgpu::CompareFunction::LessEqual,
            depth_bias: wgpu::DepthBiasState::default(),
            blend: None,
            write_mask: wgpu::ColorWrites::ALL,
        }
    }
}

impl GraphicsState {
    /// Copy of this state with the front-face rule inverted.
    #[must_use]
    pub fn with_flipped_winding(&self) -> Self {
        Self {
            front_face: match self.front_face {
                wgpu::FrontFace::Ccw => wgpu::FrontFace::Cw,
                wgpu::FrontFace::Cw => wgpu::FrontFace::Ccw,
            },
            ..*self
        }
    }

    #[must_use]
    pub fn is_blended(&self) -> bool {
        self.blend.is_some()
    }
}

// ─── Pipeline layout ──────────────────────────────────────────────────────────

/// Type of one binding slot in a binding-set layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BindingKind {
    UniformBuffer { dynamic: bool },
    StorageBuffer { dynamic: bool },
    Image,
    Sampler,
}

impl BindingKind {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::UniformBuffer { .. } => "uniform buffer",
            Self::StorageBuffer { .. } => "storage buffer",
            Self::Image => "image",
            Self::Sampler => "sampler",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BindingSetLayoutDesc {
    pub bindings: SmallVec<[BindingKind; 32]>,
}

impl BindingSetLayoutDesc {
    #[must_use]
    pub fn new(bindings: impl IntoIterator<Item = BindingKind>) -> Self {
        Self {
            bindings: bindings.into_iter().collect(),
        }
    }
}

/// Ordered binding-set layouts of a pipeline layout. A `None` entry is a hole.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct PipelineLayoutDesc {
    pub sets: SmallVec<[Option<BindingSetLayoutDesc>; 4]>,
}

impl PipelineLayoutDesc {
    #[must_use]
    pub fn set(&self, index: u32) -> Option<&BindingSetLayoutDesc> {
        self.sets.get(index as usize).and_then(Option::as_ref)
    }

    #[must_use]
    pub fn has_set(&self, index: u32) -> bool {
        self.set(index).is_some()
    }

    /// Two layouts agree on every set below `set_count`.
    #[must_use]
    pub fn shares_sets_with(&self, other: &Self, set_count: u32) -> bool {
        (0..set_count).all(|i| self.set(i) == other.set(i))
    }
}

// ─── Binding resources ────────────────────────────────────────────────────────

/// A resource bound at one binding index of a binding set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingResource {
    UniformBuffer {
        buffer: BufferHandle,
        offset: u64,
        /// `None` binds to the end of the buffer.
        size: Option<u64>,
    },
    StorageBuffer {
        buffer: BufferHandle,
        offset: u64,
        size: Option<u64>,
    },
    Image(ImageHandle),
    Sampler(SamplerHandle),
}

impl BindingResource {
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::UniformBuffer { .. } => "uniform buffer",
            Self::StorageBuffer { .. } => "storage buffer",
            Self::Image(_) => "image",
            Self::Sampler(_) => "sampler",
        }
    }

    #[must_use]
    pub const fn is_compatible(&self, kind: BindingKind) -> bool {
        matches!(
            (self, kind),
            (Self::UniformBuffer { .. }, BindingKind::UniformBuffer { .. })
                | (Self::StorageBuffer { .. }, BindingKind::StorageBuffer { .. })
                | (Self::Image(_), BindingKind::Image)
                | (Self::Sampler(_), BindingKind::Sampler)
        )
    }
}

// ─── Pipeline creation ────────────────────────────────────────────────────────

/// Compile-time shader constant resolved at pipeline creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpecializationConstant {
    pub id: u32,
    pub value: u32,
}

bitflags::bitflags! {
    /// Pipeline state left dynamic and set on the command stream.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct DynamicStates: u32 {
        const VIEWPORT = 1 << 0;
        const SCISSOR  = 1 << 1;
    }
}

/// Attachment formats of the pass a slot renders into.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RenderTargetDesc {
    pub color_formats: SmallVec<[wgpu::TextureFormat; 4]>,
    pub depth_format: Option<wgpu::TextureFormat>,
    pub sample_count: u32,
}

impl Default for RenderTargetDesc {
    fn default() -> Self {
        Self {
            color_formats: smallvec::smallvec![wgpu::TextureFormat::Rgba16Float],
            depth_format: Some(wgpu::TextureFormat::Depth32Float),
            sample_count: 1,
        }
    }
}

impl RenderTargetDesc {
    /// Depth-only target, used by depth and shadow slots.
    #[must_use]
    pub fn depth_only(format: wgpu::TextureFormat) -> Self {
        Self {
            color_formats: SmallVec::new(),
            depth_format: Some(format),
            sample_count: 1,
        }
    }
}

/// Everything the factory needs to build one pipeline object.
#[derive(Debug, Clone, Copy)]
pub struct PipelineDesc<'a> {
    pub render_slot: RenderSlotId,
    pub shader: ShaderId,
    pub graphics_state: &'a GraphicsState,
    pub pipeline_layout: PipelineLayoutId,
    pub vertex_input: VertexInputId,
    pub specialization: &'a [SpecializationConstant],
    pub dynamic_states: DynamicStates,
    pub targets: &'a RenderTargetDesc,
}

/// Buffer creation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDesc<'a> {
    pub label: &'a str,
    pub size: u64,
    pub usage: wgpu::BufferUsages,
}

// ─── Traits ───────────────────────────────────────────────────────────────────

/// Read-only shader, graphics-state and render-slot metadata.
pub trait ShaderRegistry: Send + Sync {
    fn render_slot_by_name(&self, name: &str) -> Option<RenderSlotId>;

    fn shader_by_name(&self, name: &str) -> Option<ShaderId>;

    fn graphics_state_by_name(&self, name: &str) -> Option<GraphicsStateId>;

    fn shader_info(&self, shader: ShaderId) -> Option<ShaderInfo>;

    fn graphics_state(&self, id: GraphicsStateId) -> Option<GraphicsState>;

    /// Slot a graphics state was authored for, if any.
    fn graphics_state_render_slot(&self, id: GraphicsStateId) -> Option<RenderSlotId>;

    /// Render-slot specific variant of `shader` (e.g. its depth-only twin).
    fn slot_variant(&self, shader: ShaderId, slot: RenderSlotId) -> Option<ShaderData>;

    fn slot_defaults(&self, slot: RenderSlotId) -> Option<SlotShaderData>;

    fn pipeline_layout(&self, id: PipelineLayoutId) -> Option<PipelineLayoutDesc>;
}

pub trait PipelineFactory {
    fn create_pipeline(&mut self, desc: &PipelineDesc<'_>) -> Result<PipelineHandle>;
}

pub trait ResourceProvider {
    fn create_buffer(&mut self, desc: &BufferDesc<'_>) -> Result<BufferHandle>;

    fn destroy_buffer(&mut self, buffer: BufferHandle);

    /// Host write into a buffer (map, copy, unmap or a staged upload).
    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> Result<()>;

    fn is_valid_buffer(&self, buffer: BufferHandle) -> bool;

    fn is_valid_image(&self, image: ImageHandle) -> bool;

    fn default_image(&self) -> ImageHandle;

    fn default_sampler(&self) -> SamplerHandle;
}

pub trait BindingProvider {
    fn create_binding_set(
        &mut self,
        layout: PipelineLayoutId,
        set: u32,
    ) -> Result<BindingSetHandle>;

    /// Replaces every binding of `handle`. `resources[i]` goes to binding `i`.
    fn update_binding_set(
        &mut self,
        handle: BindingSetHandle,
        resources: &[BindingResource],
    ) -> Result<()>;

    fn destroy_binding_set(&mut self, handle: BindingSetHandle);
}

/// All mutable backend services in one object.
pub trait RenderBackend: PipelineFactory + ResourceProvider + BindingProvider {}

impl<T: PipelineFactory + ResourceProvider + BindingProvider + ?Sized> RenderBackend for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flipped_winding_only_changes_front_face() {
        let gs = GraphicsState::default();
        let flipped = gs.with_flipped_winding();
        assert_eq!(flipped.front_face, wgpu::FrontFace::Cw);
        assert_eq!(flipped.cull_mode, gs.cull_mode);
        assert_eq!(flipped.with_flipped_winding(), gs);
    }

    #[test]
    fn resource_kind_compatibility() {
        let buffer = BindingResource::UniformBuffer {
            buffer: BufferHandle(0),
            offset: 0,
            size: None,
        };
        assert!(buffer.is_compatible(BindingKind::UniformBuffer { dynamic: true }));
        assert!(!buffer.is_compatible(BindingKind::Image));
        assert!(BindingResource::Sampler(SamplerHandle(1)).is_compatible(BindingKind::Sampler));
    }

    #[test]
    fn layouts_share_prefix_sets() {
        let scene = BindingSetLayoutDesc::new([BindingKind::UniformBuffer { dynamic: false }]);
        let a = PipelineLayoutDesc {
            sets: smallvec::smallvec![Some(scene.clone()), None],
        };
        let b = PipelineLayoutDesc {
            sets: smallvec::smallvec![
                Some(scene),
                None,
                None,
                Some(BindingSetLayoutDesc::new([BindingKind::Image])),
            ],
        };
        assert!(a.shares_sets_with(&b, 3));
        assert!(!a.shares_sets_with(&b, 4));
    }
}
