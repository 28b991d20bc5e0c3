//! `wgpu` Backend
//!
//! Implements the pipeline, resource and binding collaborators on a real
//! device. Binding-set layouts are built lazily from the registry's pipeline
//! layouts; bind groups are (re)created on every `update_binding_set`.

use std::borrow::Cow;
use std::num::NonZeroU64;
use std::ops::Range;
use std::sync::Arc;

use loom_core::{
    BindingSetHandle, BufferHandle, ImageHandle, LoomError, PipelineHandle, PipelineLayoutId,
    Result, SamplerHandle, ShaderId, VertexInputId,
};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::command::{CommandList, DrawEncoder};
use crate::provider::{
    BindingKind, BindingProvider, BindingResource, BindingSetLayoutDesc, BufferDesc,
    PipelineDesc, PipelineFactory, ResourceProvider, ShaderRegistry,
};
use crate::view::Viewport;

/// Owned vertex buffer layout of a registered vertex input.
#[derive(Debug, Clone)]
pub struct VertexBufferDesc {
    pub array_stride: u64,
    pub step_mode: wgpu::VertexStepMode,
    pub attributes: Vec<wgpu::VertexAttribute>,
}

impl VertexBufferDesc {
    #[must_use]
    pub fn as_wgpu(&self) -> wgpu::VertexBufferLayout<'_> {
        wgpu::VertexBufferLayout {
            array_stride: self.array_stride,
            step_mode: self.step_mode,
            attributes: &self.attributes,
        }
    }
}

struct ShaderModuleEntry {
    module: wgpu::ShaderModule,
    /// Pipeline-overridable constant ids the module declares.
    overrides: SmallVec<[u32; 8]>,
}

struct GpuPipelineLayout {
    layout: wgpu::PipelineLayout,
    /// One layout per set index; holes get an empty layout.
    sets: Vec<wgpu::BindGroupLayout>,
}

struct GpuBindingSet {
    layout: PipelineLayoutId,
    set: u32,
    /// Built on the first update; bind groups are immutable.
    group: Option<wgpu::BindGroup>,
}

/// `wgpu` binding type of a binding-set layout entry.
#[must_use]
pub fn binding_type(kind: BindingKind) -> wgpu::BindingType {
    match kind {
        BindingKind::UniformBuffer { dynamic } => wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: dynamic,
            min_binding_size: None,
        },
        BindingKind::StorageBuffer { dynamic } => wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: dynamic,
            min_binding_size: None,
        },
        BindingKind::Image => wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        BindingKind::Sampler => wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
    }
}

fn layout_entries(desc: &BindingSetLayoutDesc) -> Vec<wgpu::BindGroupLayoutEntry> {
    desc.bindings
        .iter()
        .enumerate()
        .map(|(binding, &kind)| wgpu::BindGroupLayoutEntry {
            binding: binding as u32,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: binding_type(kind),
            count: None,
        })
        .collect()
}

/// Override constants a module declares, keyed by their numeric id.
fn override_constants(
    declared: &[u32],
    specialization: &[crate::provider::SpecializationConstant],
) -> Vec<(String, f64)> {
    specialization
        .iter()
        .filter(|c| declared.contains(&c.id))
        .map(|c| (c.id.to_string(), f64::from(c.value)))
        .collect()
}

/// `wgpu` implementation of the pipeline, resource and binding providers.
///
/// Handles index into plain vectors; destroyed slots are recycled.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    registry: Arc<dyn ShaderRegistry>,

    shaders: FxHashMap<ShaderId, ShaderModuleEntry>,
    vertex_inputs: FxHashMap<VertexInputId, Vec<VertexBufferDesc>>,
    layouts: FxHashMap<PipelineLayoutId, GpuPipelineLayout>,

    pipelines: Vec<wgpu::RenderPipeline>,
    buffers: Vec<Option<wgpu::Buffer>>,
    free_buffers: Vec<u32>,
    images: Vec<wgpu::TextureView>,
    samplers: Vec<wgpu::Sampler>,
    binding_sets: Vec<Option<GpuBindingSet>>,
    free_binding_sets: Vec<u32>,
}

impl std::fmt::Debug for WgpuBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuBackend")
            .field("pipelines", &self.pipelines.len())
            .field("buffers", &self.buffers.len())
            .field("binding_sets", &self.binding_sets.len())
            .finish_non_exhaustive()
    }
}

impl WgpuBackend {
    /// Wraps a device. Registers a 1×1 white image and a linear sampler as
    /// handle 0 of each kind; they stand in for unset material textures.
    #[must_use]
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, registry: Arc<dyn ShaderRegistry>) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Loom Default Image"),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &[255, 255, 255, 255],
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4),
                rows_per_image: Some(1),
            },
            wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Loom Default Sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        Self {
            device,
            queue,
            registry,
            shaders: FxHashMap::default(),
            vertex_inputs: FxHashMap::default(),
            layouts: FxHashMap::default(),
            pipelines: Vec::new(),
            buffers: Vec::new(),
            free_buffers: Vec::new(),
            images: vec![view],
            samplers: vec![sampler],
            binding_sets: Vec::new(),
            free_binding_sets: Vec::new(),
        }
    }

    #[must_use]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    #[must_use]
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    // ── Registration ─────────────────────────────────────────────────────────

    /// Compiles WGSL for `shader`. Entry points are `vs_main` and `fs_main`;
    /// `overrides` lists the `@id(n)` override constants the source declares.
    pub fn register_shader(&mut self, shader: ShaderId, label: &str, wgsl: &str, overrides: &[u32]) {
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(wgsl)),
        });
        self.shaders.insert(
            shader,
            ShaderModuleEntry {
                module,
                overrides: SmallVec::from_slice(overrides),
            },
        );
    }

    pub fn register_vertex_input(&mut self, id: VertexInputId, buffers: Vec<VertexBufferDesc>) {
        self.vertex_inputs.insert(id, buffers);
    }

    /// Wraps an externally created image view.
    pub fn register_image(&mut self, view: wgpu::TextureView) -> ImageHandle {
        self.images.push(view);
        ImageHandle::new(self.images.len() as u32 - 1)
    }

    pub fn register_sampler(&mut self, sampler: wgpu::Sampler) -> SamplerHandle {
        self.samplers.push(sampler);
        SamplerHandle::new(self.samplers.len() as u32 - 1)
    }

    #[must_use]
    pub fn buffer(&self, handle: BufferHandle) -> Option<&wgpu::Buffer> {
        self.buffers.get(handle.index()).and_then(Option::as_ref)
    }

    fn gpu_layout(&mut self, id: PipelineLayoutId) -> Result<&GpuPipelineLayout> {
        if !self.layouts.contains_key(&id) {
            let desc = self
                .registry
                .pipeline_layout(id)
                .ok_or(LoomError::InvalidHandle {
                    kind: PipelineLayoutId::KIND,
                    index: id.0,
                })?;
            let sets: Vec<wgpu::BindGroupLayout> = desc
                .sets
                .iter()
                .map(|set| {
                    let entries = set.as_ref().map(layout_entries).unwrap_or_default();
                    self.device
                        .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                            label: Some("Loom Binding Set Layout"),
                            entries: &entries,
                        })
                })
                .collect();
            let refs: Vec<Option<&wgpu::BindGroupLayout>> = sets.iter().map(Some).collect();
            let layout = self
                .device
                .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some("Loom Pipeline Layout"),
                    bind_group_layouts: &refs,
                    immediate_size: 0,
                });
            log::debug!("Created pipeline layout {id:?} with {} sets", sets.len());
            self.layouts.insert(id, GpuPipelineLayout { layout, sets });
        }
        self.layouts.get(&id).ok_or(LoomError::InvalidHandle {
            kind: PipelineLayoutId::KIND,
            index: id.0,
        })
    }

    // ── Replay ───────────────────────────────────────────────────────────────

    /// Replays recorded draws into a render pass.
    pub fn replay(&self, list: &CommandList, pass: &mut wgpu::RenderPass<'_>) {
        let mut encoder = WgpuPassEncoder {
            backend: self,
            pass,
        };
        list.replay_into(&mut encoder);
    }
}

impl PipelineFactory for WgpuBackend {
    fn create_pipeline(&mut self, desc: &PipelineDesc<'_>) -> Result<PipelineHandle> {
        let layout = self.gpu_layout(desc.pipeline_layout)?.layout.clone();
        let Some(shader) = self.shaders.get(&desc.shader) else {
            return Err(LoomError::PipelineCreationFailed(format!(
                "shader {:?} has no compiled module",
                desc.shader
            )));
        };
        let vertex_buffers: Vec<wgpu::VertexBufferLayout<'_>> = self
            .vertex_inputs
            .get(&desc.vertex_input)
            .map(|buffers| buffers.iter().map(VertexBufferDesc::as_wgpu).collect())
            .unwrap_or_default();

        let constants = override_constants(&shader.overrides, desc.specialization);
        let constants: Vec<(&str, f64)> =
            constants.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        let compilation_options = wgpu::PipelineCompilationOptions {
            constants: &constants,
            ..Default::default()
        };

        let state = desc.graphics_state;
        let color_targets: Vec<Option<wgpu::ColorTargetState>> = desc
            .targets
            .color_formats
            .iter()
            .map(|&format| {
                Some(wgpu::ColorTargetState {
                    format,
                    blend: state.blend,
                    write_mask: state.write_mask,
                })
            })
            .collect();

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Loom Slot Pipeline"),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: &shader.module,
                    entry_point: Some("vs_main"),
                    buffers: &vertex_buffers,
                    compilation_options: compilation_options.clone(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader.module,
                    entry_point: Some("fs_main"),
                    targets: &color_targets,
                    compilation_options,
                }),
                primitive: wgpu::PrimitiveState {
                    topology: state.topology,
                    front_face: state.front_face,
                    cull_mode: state.cull_mode,
                    ..Default::default()
                },
                depth_stencil: desc.targets.depth_format.map(|format| wgpu::DepthStencilState {
                    format,
                    depth_write_enabled: Some(state.depth_write),
                    depth_compare: Some(state.depth_compare),
                    stencil: wgpu::StencilState::default(),
                    bias: state.depth_bias,
                }),
                multisample: wgpu::MultisampleState {
                    count: desc.targets.sample_count,
                    mask: !0,
                    alpha_to_coverage_enabled: false,
                },
                multiview_mask: None,
                cache: None,
            });

        self.pipelines.push(pipeline);
        Ok(PipelineHandle::new(self.pipelines.len() as u32 - 1))
    }
}

impl ResourceProvider for WgpuBackend {
    fn create_buffer(&mut self, desc: &BufferDesc<'_>) -> Result<BufferHandle> {
        if desc.size == 0 || desc.size > self.device.limits().max_buffer_size {
            return Err(LoomError::BufferCreationFailed {
                label: desc.label.to_owned(),
                size: desc.size,
            });
        }
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(desc.label),
            size: desc.size,
            usage: desc.usage,
            mapped_at_creation: false,
        });
        let index = match self.free_buffers.pop() {
            Some(index) => {
                self.buffers[index as usize] = Some(buffer);
                index
            }
            None => {
                self.buffers.push(Some(buffer));
                self.buffers.len() as u32 - 1
            }
        };
        Ok(BufferHandle::new(index))
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if let Some(slot) = self.buffers.get_mut(buffer.index())
            && let Some(gpu) = slot.take()
        {
            gpu.destroy();
            self.free_buffers.push(buffer.0);
        }
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> Result<()> {
        let Some(gpu) = self.buffer(buffer) else {
            return Err(LoomError::InvalidHandle {
                kind: BufferHandle::KIND,
                index: buffer.0,
            });
        };
        let end = offset + data.len() as u64;
        if end > gpu.size() {
            return Err(LoomError::BufferCreationFailed {
                label: format!("write past end of buffer {}", buffer.0),
                size: end,
            });
        }
        self.queue.write_buffer(gpu, offset, data);
        Ok(())
    }

    fn is_valid_buffer(&self, buffer: BufferHandle) -> bool {
        self.buffer(buffer).is_some()
    }

    fn is_valid_image(&self, image: ImageHandle) -> bool {
        image.index() < self.images.len()
    }

    fn default_image(&self) -> ImageHandle {
        ImageHandle::new(0)
    }

    fn default_sampler(&self) -> SamplerHandle {
        SamplerHandle::new(0)
    }
}

impl BindingProvider for WgpuBackend {
    fn create_binding_set(
        &mut self,
        layout: PipelineLayoutId,
        set: u32,
    ) -> Result<BindingSetHandle> {
        // Validates the layout up front so a bad id fails here, not at update.
        let has_set = self.gpu_layout(layout)?.sets.len() > set as usize;
        if !has_set {
            return Err(LoomError::BindingSetCreationFailed {
                set,
                reason: format!("layout {layout:?} has no set {set}"),
            });
        }
        let entry = GpuBindingSet {
            layout,
            set,
            group: None,
        };
        let index = match self.free_binding_sets.pop() {
            Some(index) => {
                self.binding_sets[index as usize] = Some(entry);
                index
            }
            None => {
                self.binding_sets.push(Some(entry));
                self.binding_sets.len() as u32 - 1
            }
        };
        Ok(BindingSetHandle::new(index))
    }

    fn update_binding_set(
        &mut self,
        handle: BindingSetHandle,
        resources: &[BindingResource],
    ) -> Result<()> {
        let invalid = LoomError::InvalidHandle {
            kind: BindingSetHandle::KIND,
            index: handle.0,
        };
        let Some(Some(entry)) = self.binding_sets.get(handle.index()) else {
            return Err(invalid);
        };
        let (layout_id, set) = (entry.layout, entry.set);
        let bind_layout = self
            .layouts
            .get(&layout_id)
            .and_then(|l| l.sets.get(set as usize))
            .ok_or(invalid)?;

        let mut entries = Vec::with_capacity(resources.len());
        for (binding, resource) in resources.iter().enumerate() {
            let resource = match *resource {
                BindingResource::UniformBuffer {
                    buffer,
                    offset,
                    size,
                }
                | BindingResource::StorageBuffer {
                    buffer,
                    offset,
                    size,
                } => {
                    let gpu = self
                        .buffers
                        .get(buffer.index())
                        .and_then(Option::as_ref)
                        .ok_or(LoomError::InvalidHandle {
                            kind: BufferHandle::KIND,
                            index: buffer.0,
                        })?;
                    wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: gpu,
                        offset,
                        size: size.and_then(NonZeroU64::new),
                    })
                }
                BindingResource::Image(image) => wgpu::BindingResource::TextureView(
                    self.images.get(image.index()).unwrap_or(&self.images[0]),
                ),
                BindingResource::Sampler(sampler) => wgpu::BindingResource::Sampler(
                    self.samplers
                        .get(sampler.index())
                        .unwrap_or(&self.samplers[0]),
                ),
            };
            entries.push(wgpu::BindGroupEntry {
                binding: binding as u32,
                resource,
            });
        }

        let group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Loom Binding Set"),
            layout: bind_layout,
            entries: &entries,
        });
        if let Some(Some(entry)) = self.binding_sets.get_mut(handle.index()) {
            entry.group = Some(group);
        }
        Ok(())
    }

    fn destroy_binding_set(&mut self, handle: BindingSetHandle) {
        if let Some(slot) = self.binding_sets.get_mut(handle.index())
            && slot.take().is_some()
        {
            self.free_binding_sets.push(handle.0);
        }
    }
}

/// [`DrawEncoder`] writing straight into a `wgpu::RenderPass`.
pub struct WgpuPassEncoder<'a, 'p> {
    backend: &'a WgpuBackend,
    pass: &'a mut wgpu::RenderPass<'p>,
}

impl<'a, 'p> WgpuPassEncoder<'a, 'p> {
    #[must_use]
    pub fn new(backend: &'a WgpuBackend, pass: &'a mut wgpu::RenderPass<'p>) -> Self {
        Self { backend, pass }
    }
}

impl DrawEncoder for WgpuPassEncoder<'_, '_> {
    fn bind_pipeline(&mut self, pipeline: PipelineHandle) {
        if let Some(p) = self.backend.pipelines.get(pipeline.index()) {
            self.pass.set_pipeline(p);
        }
    }

    fn bind_binding_set(&mut self, index: u32, set: BindingSetHandle, dynamic_offsets: &[u32]) {
        let group = self
            .backend
            .binding_sets
            .get(set.index())
            .and_then(Option::as_ref)
            .and_then(|s| s.group.as_ref());
        match group {
            Some(group) => self.pass.set_bind_group(index, group, dynamic_offsets),
            None => log::debug!("Binding set {set:?} bound before its first update"),
        }
    }

    fn bind_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle, offset: u64) {
        if let Some(b) = self.backend.buffer(buffer) {
            self.pass.set_vertex_buffer(slot, b.slice(offset..));
        }
    }

    fn bind_index_buffer(&mut self, buffer: BufferHandle, offset: u64, format: wgpu::IndexFormat) {
        if let Some(b) = self.backend.buffer(buffer) {
            self.pass.set_index_buffer(b.slice(offset..), format);
        }
    }

    fn set_viewport(&mut self, v: Viewport) {
        self.pass
            .set_viewport(v.x, v.y, v.width, v.height, v.min_depth, v.max_depth);
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        self.pass.draw(vertices, instances);
    }

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
        self.pass.draw_indexed(indices, base_vertex, instances);
    }

    fn draw_indirect(&mut self, buffer: BufferHandle, offset: u64) {
        if let Some(b) = self.backend.buffer(buffer) {
            self.pass.draw_indirect(b, offset);
        }
    }

    fn draw_indexed_indirect(&mut self, buffer: BufferHandle, offset: u64) {
        if let Some(b) = self.backend.buffer(buffer) {
            self.pass.draw_indexed_indirect(b, offset);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::SpecializationConstant;

    #[test]
    fn dynamic_uniforms_keep_their_offset_flag() {
        assert!(matches!(
            binding_type(BindingKind::UniformBuffer { dynamic: true }),
            wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: true,
                ..
            }
        ));
        assert!(matches!(
            binding_type(BindingKind::Sampler),
            wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering)
        ));
    }

    #[test]
    fn only_declared_overrides_are_passed() {
        let spec = [
            SpecializationConstant { id: 0, value: 3 },
            SpecializationConstant { id: 4, value: 1 },
        ];
        let constants = override_constants(&[4], &spec);
        assert_eq!(constants, vec![("4".to_owned(), 1.0)]);
    }

    #[test]
    fn object_layout_maps_every_binding() {
        let entries = layout_entries(&crate::pool::object_set_layout());
        assert_eq!(entries.len(), crate::pool::OBJECT_SET_BINDING_COUNT);
        assert_eq!(entries[3].binding, 3);
    }
}
