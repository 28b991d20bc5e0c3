//! Recording collaborator doubles.
//!
//! [`RecordingBackend`] implements every backend trait in memory and keeps a
//! log of what was asked of it; [`standard_library`] registers a small but
//! complete shader setup (opaque, translucent, depth and a custom shader with
//! an extra binding set).

use loom_core::{
    BindingSetHandle, BufferHandle, GraphicsStateId, ImageHandle, LoomError, PipelineHandle,
    PipelineLayoutId, Result, SamplerHandle, ShaderId,
};
use smallvec::smallvec;

use crate::pool::object_set_layout;
use crate::provider::{
    BindingKind, BindingProvider, BindingResource, BindingSetLayoutDesc, BufferDesc,
    GraphicsState, PipelineDesc, PipelineFactory, PipelineLayoutDesc, ResourceProvider,
    ShaderInfo, SlotShaderData, SpecializationConstant,
};
use crate::registry::ShaderLibrary;
use crate::slot::RenderSlotId;

/// A pipeline creation request as seen by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedPipeline {
    pub render_slot: RenderSlotId,
    pub shader: ShaderId,
    pub graphics_state: GraphicsState,
    pub pipeline_layout: PipelineLayoutId,
    pub specialization: Vec<SpecializationConstant>,
}

#[derive(Debug, Clone)]
pub struct RecordedBuffer {
    pub label: String,
    pub data: Vec<u8>,
    pub writes: u32,
}

#[derive(Debug, Clone)]
pub struct RecordedBindingSet {
    pub layout: PipelineLayoutId,
    pub set: u32,
    pub resources: Vec<BindingResource>,
    pub updates: u32,
}

#[derive(Debug, Default)]
pub struct RecordingBackend {
    pub pipelines: Vec<RecordedPipeline>,
    pub buffers: Vec<Option<RecordedBuffer>>,
    pub binding_sets: Vec<Option<RecordedBindingSet>>,
    pub images: u32,
    /// Fail every pipeline creation.
    pub fail_pipelines: bool,
    /// Let this many binding-set updates succeed, then fail the next one.
    pub fail_binding_update_after: Option<u32>,
}

impl RecordingBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            images: 4,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn pipeline_creations(&self) -> usize {
        self.pipelines.len()
    }

    #[must_use]
    pub fn live_buffers(&self) -> usize {
        self.buffers.iter().flatten().count()
    }

    #[must_use]
    pub fn live_binding_sets(&self) -> usize {
        self.binding_sets.iter().flatten().count()
    }

    #[must_use]
    pub fn buffer(&self, handle: BufferHandle) -> Option<&RecordedBuffer> {
        self.buffers.get(handle.index()).and_then(Option::as_ref)
    }

    #[must_use]
    pub fn binding_set(&self, handle: BindingSetHandle) -> Option<&RecordedBindingSet> {
        self.binding_sets.get(handle.index()).and_then(Option::as_ref)
    }

    /// Total `update_binding_set` calls over live sets.
    #[must_use]
    pub fn binding_set_updates(&self) -> u32 {
        self.binding_sets.iter().flatten().map(|s| s.updates).sum()
    }
}

impl PipelineFactory for RecordingBackend {
    fn create_pipeline(&mut self, desc: &PipelineDesc<'_>) -> Result<PipelineHandle> {
        if self.fail_pipelines {
            return Err(LoomError::PipelineCreationFailed(format!(
                "shader {:?} rejected",
                desc.shader
            )));
        }
        self.pipelines.push(RecordedPipeline {
            render_slot: desc.render_slot,
            shader: desc.shader,
            graphics_state: *desc.graphics_state,
            pipeline_layout: desc.pipeline_layout,
            specialization: desc.specialization.to_vec(),
        });
        Ok(PipelineHandle::new(self.pipelines.len() as u32 - 1))
    }
}

impl ResourceProvider for RecordingBackend {
    fn create_buffer(&mut self, desc: &BufferDesc<'_>) -> Result<BufferHandle> {
        if desc.size == 0 {
            return Err(LoomError::BufferCreationFailed {
                label: desc.label.to_owned(),
                size: 0,
            });
        }
        self.buffers.push(Some(RecordedBuffer {
            label: desc.label.to_owned(),
            data: vec![0; desc.size as usize],
            writes: 0,
        }));
        Ok(BufferHandle::new(self.buffers.len() as u32 - 1))
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if let Some(slot) = self.buffers.get_mut(buffer.index()) {
            *slot = None;
        }
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> Result<()> {
        let Some(Some(recorded)) = self.buffers.get_mut(buffer.index()) else {
            return Err(LoomError::InvalidHandle {
                kind: BufferHandle::KIND,
                index: buffer.0,
            });
        };
        let start = offset as usize;
        let end = start + data.len();
        let Some(dst) = recorded.data.get_mut(start..end) else {
            return Err(LoomError::BufferCreationFailed {
                label: recorded.label.clone(),
                size: end as u64,
            });
        };
        dst.copy_from_slice(data);
        recorded.writes += 1;
        Ok(())
    }

    fn is_valid_buffer(&self, buffer: BufferHandle) -> bool {
        self.buffer(buffer).is_some()
    }

    fn is_valid_image(&self, image: ImageHandle) -> bool {
        image.is_valid() && image.0 < self.images
    }

    fn default_image(&self) -> ImageHandle {
        ImageHandle::new(0)
    }

    fn default_sampler(&self) -> SamplerHandle {
        SamplerHandle::new(0)
    }
}

impl BindingProvider for RecordingBackend {
    fn create_binding_set(
        &mut self,
        layout: PipelineLayoutId,
        set: u32,
    ) -> Result<BindingSetHandle> {
        self.binding_sets.push(Some(RecordedBindingSet {
            layout,
            set,
            resources: Vec::new(),
            updates: 0,
        }));
        Ok(BindingSetHandle::new(self.binding_sets.len() as u32 - 1))
    }

    fn update_binding_set(
        &mut self,
        handle: BindingSetHandle,
        resources: &[BindingResource],
    ) -> Result<()> {
        match self.fail_binding_update_after {
            Some(0) => {
                self.fail_binding_update_after = None;
                return Err(LoomError::InvalidHandle {
                    kind: BindingSetHandle::KIND,
                    index: handle.0,
                });
            }
            Some(ref mut remaining) => *remaining -= 1,
            None => {}
        }
        let Some(Some(set)) = self.binding_sets.get_mut(handle.index()) else {
            return Err(LoomError::InvalidHandle {
                kind: BindingSetHandle::KIND,
                index: handle.0,
            });
        };
        set.resources = resources.to_vec();
        set.updates += 1;
        Ok(())
    }

    fn destroy_binding_set(&mut self, handle: BindingSetHandle) {
        if let Some(slot) = self.binding_sets.get_mut(handle.index()) {
            *slot = None;
        }
    }
}

// ─── Standard shader setup ────────────────────────────────────────────────────

/// Ids registered by [`standard_library`].
#[derive(Debug, Clone, Copy)]
pub struct StandardIds {
    pub layout: PipelineLayoutId,
    pub custom_layout: PipelineLayoutId,
    /// Disagrees with `layout` on the object set.
    pub foreign_layout: PipelineLayoutId,
    pub opaque_shader: ShaderId,
    pub translucent_shader: ShaderId,
    pub depth_shader: ShaderId,
    /// Unslotted, declares the custom set.
    pub custom_shader: ShaderId,
    /// Depth twin of `custom_shader`.
    pub custom_depth_shader: ShaderId,
    /// Uses `foreign_layout`.
    pub foreign_shader: ShaderId,
    pub opaque_state: GraphicsStateId,
    pub blend_state: GraphicsStateId,
    pub depth_state: GraphicsStateId,
}

fn scene_layouts() -> [BindingSetLayoutDesc; 2] {
    [
        BindingSetLayoutDesc::new([BindingKind::UniformBuffer { dynamic: false }]),
        BindingSetLayoutDesc::new([BindingKind::Image, BindingKind::Sampler]),
    ]
}

/// Layout of the custom set declared by the standard custom shader.
#[must_use]
pub fn custom_set_layout() -> BindingSetLayoutDesc {
    BindingSetLayoutDesc::new([BindingKind::UniformBuffer { dynamic: false }, BindingKind::Image])
}

#[must_use]
pub fn standard_library() -> (ShaderLibrary, StandardIds) {
    let mut lib = ShaderLibrary::new();
    let [scene, scene_images] = scene_layouts();

    let layout = lib.add_pipeline_layout(PipelineLayoutDesc {
        sets: smallvec![
            Some(scene.clone()),
            Some(scene_images.clone()),
            Some(object_set_layout()),
        ],
    });
    let custom_layout = lib.add_pipeline_layout(PipelineLayoutDesc {
        sets: smallvec![
            Some(scene.clone()),
            Some(scene_images.clone()),
            Some(object_set_layout()),
            Some(custom_set_layout()),
        ],
    });
    let foreign_layout = lib.add_pipeline_layout(PipelineLayoutDesc {
        sets: smallvec![
            Some(scene),
            Some(scene_images),
            Some(BindingSetLayoutDesc::new([BindingKind::Image])),
        ],
    });
    let vertex_input = lib.add_vertex_input();

    let info = |slot, pipeline_layout| ShaderInfo {
        render_slot: slot,
        pipeline_layout,
        vertex_input,
    };
    let opaque_shader = lib.add_shader("opaque", info(Some(RenderSlotId::OPAQUE), layout));
    let translucent_shader =
        lib.add_shader("translucent", info(Some(RenderSlotId::TRANSLUCENT), layout));
    let depth_shader = lib.add_shader("depth", info(Some(RenderSlotId::DEPTH), layout));
    let custom_shader = lib.add_shader("custom", info(None, custom_layout));
    let custom_depth_shader =
        lib.add_shader("custom_depth", info(Some(RenderSlotId::DEPTH), layout));
    let foreign_shader = lib.add_shader("foreign", info(None, foreign_layout));

    let opaque_state = lib.add_graphics_state("opaque", GraphicsState::default(), None);
    let blend_state = lib.add_graphics_state(
        "blend",
        GraphicsState {
            depth_write: false,
            blend: Some(wgpu::BlendState::ALPHA_BLENDING),
            ..GraphicsState::default()
        },
        Some(RenderSlotId::TRANSLUCENT),
    );
    let depth_state = lib.add_graphics_state(
        "depth",
        GraphicsState {
            write_mask: wgpu::ColorWrites::empty(),
            ..GraphicsState::default()
        },
        Some(RenderSlotId::DEPTH),
    );

    let defaults = |shader, graphics_state| SlotShaderData {
        shader,
        graphics_state,
        pipeline_layout: layout,
        vertex_input,
    };
    lib.set_slot_defaults(RenderSlotId::OPAQUE, defaults(opaque_shader, opaque_state));
    lib.set_slot_defaults(
        RenderSlotId::TRANSLUCENT,
        defaults(translucent_shader, blend_state),
    );
    lib.set_slot_defaults(RenderSlotId::DEPTH, defaults(depth_shader, depth_state));
    lib.add_slot_variant(
        custom_shader,
        RenderSlotId::DEPTH,
        crate::provider::ShaderData::new(custom_depth_shader, depth_state),
    );

    (
        lib,
        StandardIds {
            layout,
            custom_layout,
            foreign_layout,
            opaque_shader,
            translucent_shader,
            depth_shader,
            custom_shader,
            custom_depth_shader,
            foreign_shader,
            opaque_state,
            blend_state,
            depth_state,
        },
    )
}
