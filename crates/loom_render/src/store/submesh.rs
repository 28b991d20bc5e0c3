use loom_core::{BoundingSphere, BufferHandle, GraphicsStateId, ShaderId};
use smallvec::SmallVec;

use crate::flags::{ExtraMaterialFlags, MaterialType, RenderMaterialFlags, SubmeshFlags};
use crate::provider::ShaderData;
use crate::slot::{RenderSlotId, RenderSortInfo};

/// Vertex/index/instance ranges of a direct draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DrawCommand {
    /// Vertex count for plain draws, index count for indexed draws.
    pub element_count: u32,
    pub instance_count: u32,
    pub first_element: u32,
    pub base_vertex: i32,
    pub first_instance: u32,
}

impl Default for DrawCommand {
    fn default() -> Self {
        Self {
            element_count: 0,
            instance_count: 1,
            first_element: 0,
            base_vertex: 0,
            first_instance: 0,
        }
    }
}

impl DrawCommand {
    #[must_use]
    pub fn new(element_count: u32) -> Self {
        Self {
            element_count,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn instanced(element_count: u32, instance_count: u32) -> Self {
        Self {
            element_count,
            instance_count,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexBufferBinding {
    pub buffer: BufferHandle,
    pub offset: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexBufferBinding {
    pub buffer: BufferHandle,
    pub offset: u64,
    pub format: wgpu::IndexFormat,
}

/// Indirect draw arguments living in a GPU buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndirectBufferBinding {
    pub buffer: BufferHandle,
    pub offset: u64,
    pub draw_count: u32,
    pub stride: u32,
}

/// Geometry buffers of a submesh. The draw call flavour is chosen from which
/// of these are populated.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubmeshBuffers {
    /// Bound to consecutive vertex buffer slots starting at 0.
    pub vertex: SmallVec<[VertexBufferBinding; 4]>,
    pub index: Option<IndexBufferBinding>,
    pub indirect: Option<IndirectBufferBinding>,
}

/// One drawable unit as submitted by producers.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmeshInput {
    pub mesh_index: u32,
    pub material_index: u32,
    pub skin_index: Option<u32>,
    pub custom_resource_index: Option<u32>,
    pub flags: SubmeshFlags,
    /// Intersected with the camera's layer mask during selection.
    pub layer_mask: u64,
    pub bounds: BoundingSphere,
    pub draw: DrawCommand,
    pub buffers: SubmeshBuffers,
    /// Replaces the material's sort info when set.
    pub render_sort: Option<RenderSortInfo>,
}

impl Default for SubmeshInput {
    fn default() -> Self {
        Self {
            mesh_index: 0,
            material_index: 0,
            skin_index: None,
            custom_resource_index: None,
            flags: SubmeshFlags::empty(),
            layer_mask: u64::MAX,
            bounds: BoundingSphere::default(),
            draw: DrawCommand::default(),
            buffers: SubmeshBuffers::default(),
            render_sort: None,
        }
    }
}

/// A validated submesh as stored for the frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmeshData {
    pub mesh_index: u32,
    pub material_index: u32,
    pub skin_index: Option<u32>,
    pub custom_resource_index: Option<u32>,
    pub flags: SubmeshFlags,
    pub layer_mask: u64,
    pub bounds: BoundingSphere,
    pub draw: DrawCommand,
    pub buffers: SubmeshBuffers,
    pub render_hash: u32,
    /// `layer << 8 | order`
    pub render_sort_word: u16,
}

/// Explicit slot routing entry for `add_submesh_with_slots`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotShaderOverride {
    pub slot: RenderSlotId,
    /// Invalid halves fall back to the material shader, then the slot defaults.
    pub shader: ShaderData,
}

impl SlotShaderOverride {
    #[must_use]
    pub fn slot(slot: RenderSlotId) -> Self {
        Self {
            slot,
            shader: ShaderData::default(),
        }
    }

    #[must_use]
    pub fn with_shader(slot: RenderSlotId, shader: ShaderId, graphics_state: GraphicsStateId) -> Self {
        Self {
            slot,
            shader: ShaderData::new(shader, graphics_state),
        }
    }
}

/// Sort and pipeline metadata cached per bucket entry at submission time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotSubmeshMaterialData {
    pub shader: ShaderData,
    pub render_sort_word: u16,
    pub render_hash: u32,
    pub material_type: MaterialType,
    pub material_flags: RenderMaterialFlags,
    pub extra_flags: ExtraMaterialFlags,
}
