//! Slot Renderer
//!
//! Drives one render slot per frame:
//!
//! 1. [`SlotRenderer::pre_execute_frame`] starts the frame, sizes the slot's
//!    GPU pools from the store's counts and rebuilds them on growth.
//! 2. [`SlotRenderer::execute_frame`] uploads the per-object uniform blocks,
//!    selects and sorts the slot's submeshes, then records one draw per
//!    surviving entry into a [`DrawEncoder`].
//!
//! Redundant pipeline, binding-set and buffer binds are filtered by a
//! [`TrackedEncoder`]. The per-object binding set is only rewritten when the
//! material (or its custom resources) changes between consecutive draws;
//! otherwise the same set is rebound with new dynamic offsets.
//!
//! `execute_frame` may run several times per frame (one call per view or
//! shadow-atlas region) into the same encoder. Every call takes fresh scene
//! and per-object sets, so nothing recorded earlier in the frame is rewritten
//! before submission.

pub mod tracked;

use std::sync::Arc;

use bytemuck::Pod;
use loom_core::{
    BindingSetHandle, BufferHandle, LogOnce, PipelineLayoutId, Result, warn_once,
};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

pub use tracked::{TrackedEncoder, TrackedStats};

use crate::command::DrawEncoder;
use crate::pipeline::{PipelineCache, PsoEntry, PsoQuery};
use crate::pool::{
    MATERIAL_STRIDE, MESH_STRIDE, OBJECT_SET_BINDING_COUNT, PoolSizeChange, ResourcePoolSizer,
    SKIN_STRIDE, SlotResources,
};
use crate::provider::{
    BindingResource, BindingSetLayoutDesc, RenderBackend, ResourceProvider, ShaderRegistry,
};
use crate::select::{SlotQuery, SlotSubmeshSelector};
use crate::settings::SlotRendererSettings;
use crate::slot::{RenderSlotId, SET_CUSTOM, SET_OBJECT, SET_SCENE, SET_SCENE_IMAGES};
use crate::store::{MaterialDataStore, MaterialRecord, MeshData, SkinUniforms, SubmeshData};
use crate::view::{CameraView, FrameInputs};

/// Counters of one `execute_frame` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotFrameStats {
    /// Entries that survived selection.
    pub visible_submeshes: u32,
    pub draw_calls: u32,
    pub pipeline_binds: u32,
    pub object_set_updates: u32,
    pub custom_set_binds: u32,
    /// Entries dropped for a missing pipeline or invalid bindings.
    pub skipped_draws: u32,
}

/// Custom binding sets of the current frame and the custom-set layout of
/// each pipeline layout seen so far.
#[derive(Debug, Default)]
struct CustomSets {
    layouts: FxHashMap<PipelineLayoutId, Option<BindingSetLayoutDesc>>,
    frame: FxHashMap<(PipelineLayoutId, u32), BindingSetHandle>,
}

/// Per-object set currently bound, keyed by what was written into it.
#[derive(Debug, Clone, Copy)]
struct BoundObjectSet {
    material_index: u32,
    custom_index: Option<u32>,
    set: BindingSetHandle,
}

pub struct SlotRenderer {
    settings: SlotRendererSettings,
    registry: Arc<dyn ShaderRegistry>,
    query: SlotQuery,

    cache: PipelineCache,
    sizer: ResourcePoolSizer,
    resources: SlotResources,
    selector: SlotSubmeshSelector,

    custom_sets: CustomSets,
    staging: Vec<u8>,
    log_once: LogOnce,
}

impl std::fmt::Debug for SlotRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotRenderer")
            .field("slot", &self.settings.slot)
            .field("cache", &self.cache)
            .field("capacity", &self.sizer.capacity())
            .finish_non_exhaustive()
    }
}

impl SlotRenderer {
    #[must_use]
    pub fn new(registry: Arc<dyn ShaderRegistry>, settings: SlotRendererSettings) -> Self {
        let cache = PipelineCache::new(Arc::clone(&registry), &settings);
        Self {
            query: SlotQuery::from(&settings),
            settings,
            registry,
            cache,
            sizer: ResourcePoolSizer::new(),
            resources: SlotResources::new(),
            selector: SlotSubmeshSelector::new(),
            custom_sets: CustomSets::default(),
            staging: Vec::new(),
            log_once: LogOnce::new(),
        }
    }

    #[must_use]
    pub fn slot(&self) -> RenderSlotId {
        self.settings.slot
    }

    #[must_use]
    pub fn settings(&self) -> &SlotRendererSettings {
        &self.settings
    }

    #[must_use]
    pub fn pipeline_cache(&self) -> &PipelineCache {
        &self.cache
    }

    #[must_use]
    pub fn pool_sizer(&self) -> &ResourcePoolSizer {
        &self.sizer
    }

    #[must_use]
    pub fn resources(&self) -> &SlotResources {
        &self.resources
    }

    /// Starts a new frame and grows the slot's pools to cover the store's
    /// counts. Binding sets handed out by earlier `execute_frame` calls are
    /// recycled here, including those of a call that failed.
    pub fn pre_execute_frame<B: RenderBackend + ?Sized>(
        &mut self,
        store: &MaterialDataStore,
        backend: &mut B,
    ) -> Result<PoolSizeChange> {
        self.custom_sets.frame.clear();
        self.resources.begin_frame();

        let Some(layout) = self.cache.defaults().map(|d| d.pipeline_layout) else {
            warn_once!(
                self.log_once,
                ("no_defaults", self.settings.slot),
                "Slot {}: no default shader data; pools not allocated",
                self.settings.slot
            );
            return Ok(PoolSizeChange::Unchanged);
        };
        let Some(layout_desc) = self.cache.default_layout().cloned() else {
            warn_once!(
                self.log_once,
                ("no_default_layout", layout),
                "Slot {}: default pipeline layout {layout:?} is not registered",
                self.settings.slot
            );
            return Ok(PoolSizeChange::Unchanged);
        };

        let counts = store.slot_object_counts(self.settings.slot).at_least_one();
        let change = self.sizer.ensure(counts);
        if let PoolSizeChange::Grown { capacity } = change {
            if let Err(err) = self
                .resources
                .rebuild(backend, layout, &layout_desc, capacity)
            {
                self.resources.destroy(backend);
                self.sizer.reset();
                return Err(err);
            }
        }
        Ok(change)
    }

    /// Records the slot's draws for `camera` into `encoder`.
    pub fn execute_frame<B, E>(
        &mut self,
        store: &MaterialDataStore,
        camera: &CameraView,
        inputs: &FrameInputs,
        backend: &mut B,
        encoder: &mut E,
    ) -> Result<SlotFrameStats>
    where
        B: RenderBackend + ?Sized,
        E: DrawEncoder + ?Sized,
    {
        let mut stats = SlotFrameStats::default();
        let slot = self.settings.slot;

        let counts = store.slot_object_counts(slot).at_least_one();
        if !self.resources.is_allocated() || !self.resources.capacity().covers(&counts) {
            warn_once!(
                self.log_once,
                ("pools_not_ready", slot),
                "Slot {slot}: pools do not cover {counts:?}; call pre_execute_frame first"
            );
            return Ok(stats);
        }

        self.upload_blocks(store, backend)?;

        let entries = self.selector.select(store, camera, &self.query);
        stats.visible_submeshes = entries.len() as u32;
        if entries.is_empty() {
            return Ok(stats);
        }

        let mut pass = TrackedEncoder::new(encoder);

        let scene_sets = self.resources.take_scene_sets(&mut *backend)?;
        for (handle, set, resources) in [
            (scene_sets[0], SET_SCENE, inputs.scene.buffers.as_slice()),
            (scene_sets[1], SET_SCENE_IMAGES, inputs.scene.images.as_slice()),
        ] {
            if let Some(handle) = handle {
                if !resources.is_empty() {
                    backend.update_binding_set(handle, resources)?;
                }
                pass.bind_binding_set(set, handle, &[]);
            }
        }
        if let Some(viewport) = inputs.viewport {
            pass.set_viewport(viewport);
        }

        let submeshes = store.submeshes();
        let metadata = store.slot_submesh_material_data(slot);
        let mut bound_object: Option<BoundObjectSet> = None;

        for sorted in entries {
            let (Some(submesh), Some(data)) = (
                submeshes.get(sorted.submesh_index as usize),
                metadata.get(sorted.bucket_index as usize),
            ) else {
                stats.skipped_draws += 1;
                continue;
            };

            let query = PsoQuery {
                shader: data.shader,
                render_hash: data.render_hash,
                material_type: data.material_type,
                material_flags: data.material_flags,
                submesh_flags: submesh.flags,
                lighting: inputs.lighting,
                camera: camera.flags,
                post_process: inputs.post_process_enabled,
                flip_winding: camera.flip_winding,
            };
            let Some(pso) = self.cache.get(&mut *backend, &query) else {
                stats.skipped_draws += 1;
                continue;
            };

            let custom_index = store.submesh_custom_resource_index(submesh);
            let custom_set = if pso.needs_custom_set {
                let prepared = self.custom_sets.prepare(
                    &*self.registry,
                    &mut self.resources,
                    &mut self.log_once,
                    slot,
                    store,
                    &mut *backend,
                    &pso,
                    custom_index,
                )?;
                match prepared {
                    Some(set) => Some(set),
                    None => {
                        stats.skipped_draws += 1;
                        continue;
                    }
                }
            } else {
                None
            };

            let Some(offsets) = dynamic_offsets(submesh) else {
                warn_once!(
                    self.log_once,
                    ("offset_overflow", sorted.submesh_index),
                    "Slot {slot}: dynamic offsets of submesh {} exceed u32",
                    sorted.submesh_index
                );
                stats.skipped_draws += 1;
                continue;
            };

            let object_set = match bound_object {
                Some(bound)
                    if bound.material_index == submesh.material_index
                        && bound.custom_index == custom_index =>
                {
                    bound.set
                }
                _ => {
                    let Some(material) = store.materials().get(submesh.material_index as usize)
                    else {
                        stats.skipped_draws += 1;
                        continue;
                    };
                    let Some(set) = self.resources.take_object_set(&mut *backend)? else {
                        warn_once!(
                            self.log_once,
                            ("object_sets_missing", slot),
                            "Slot {slot}: per-object binding sets are not allocated"
                        );
                        stats.skipped_draws += 1;
                        continue;
                    };
                    let bindings = object_set_bindings(&self.resources, material, &*backend);
                    backend.update_binding_set(set, &bindings)?;
                    stats.object_set_updates += 1;
                    bound_object = Some(BoundObjectSet {
                        material_index: submesh.material_index,
                        custom_index,
                        set,
                    });
                    set
                }
            };

            pass.bind_pipeline(pso.pipeline);
            pass.bind_binding_set(SET_OBJECT, object_set, &offsets);
            if let Some(set) = custom_set {
                pass.bind_binding_set(SET_CUSTOM, set, &[]);
                stats.custom_set_binds += 1;
            }

            let draws = record_draw(&mut pass, submesh);
            if draws == 0 {
                stats.skipped_draws += 1;
            }
            stats.draw_calls += draws;
        }

        stats.pipeline_binds = pass.stats().pipeline_binds;

        log::trace!(
            "Slot {slot}: {} draws, {} pipeline binds, {} object set updates",
            stats.draw_calls,
            stats.pipeline_binds,
            stats.object_set_updates
        );
        Ok(stats)
    }

    /// Drops cached pipelines, pools and log-once state.
    pub fn reset<B: RenderBackend + ?Sized>(&mut self, backend: &mut B) {
        self.cache.clear();
        self.resources.destroy(backend);
        self.sizer.reset();
        self.custom_sets = CustomSets::default();
        self.log_once.reset();
    }

    /// Re-reads the slot defaults after the shader setup changed. Pools are
    /// rebuilt on the next `pre_execute_frame`, since the default layout may
    /// have changed with them.
    pub fn reload_shaders<B: RenderBackend + ?Sized>(&mut self, backend: &mut B) {
        self.cache.set_default_shader_data();
        self.resources.destroy(backend);
        self.sizer.reset();
        self.custom_sets = CustomSets::default();
        self.log_once.reset();
    }

    fn upload_blocks<B: RenderBackend + ?Sized>(
        &mut self,
        store: &MaterialDataStore,
        backend: &mut B,
    ) -> Result<()> {
        let resources = &self.resources;
        let staging = &mut self.staging;

        write_blocks(
            backend,
            staging,
            resources.mesh_buffer(),
            MESH_STRIDE,
            store.meshes().iter().map(MeshData::uniforms),
        )?;
        write_blocks(
            backend,
            staging,
            resources.skin_buffer(),
            SKIN_STRIDE,
            store.skin_joint_blocks().iter().map(|block| {
                SkinUniforms::from_palettes(
                    store.joint_matrices(block.current),
                    store.joint_matrices(block.previous),
                )
            }),
        )?;
        write_blocks(
            backend,
            staging,
            resources.material_buffer(),
            MATERIAL_STRIDE,
            store.material_uniforms().iter().copied(),
        )?;

        let custom = store.custom_data_bytes();
        if !custom.is_empty() {
            backend.write_buffer(resources.custom_data_buffer(), 0, custom)?;
        }
        Ok(())
    }
}

impl CustomSets {
    /// Validates the draw's custom resources against the pipeline's custom
    /// set and returns a written set. `None` means the draw must be skipped.
    fn prepare<B: RenderBackend + ?Sized>(
        &mut self,
        registry: &dyn ShaderRegistry,
        resources: &mut SlotResources,
        log_once: &mut LogOnce,
        slot: RenderSlotId,
        store: &MaterialDataStore,
        backend: &mut B,
        pso: &PsoEntry,
        custom_index: Option<u32>,
    ) -> Result<Option<BindingSetHandle>> {
        let layout_id = pso.pipeline_layout;

        let Some(index) = custom_index else {
            warn_once!(
                log_once,
                ("custom_missing", layout_id),
                "Slot {slot}: pipeline layout {layout_id:?} needs custom resources but the draw has none"
            );
            return Ok(None);
        };
        if let Some(&set) = self.frame.get(&(layout_id, index)) {
            return Ok(Some(set));
        }

        let layout = self
            .layouts
            .entry(layout_id)
            .or_insert_with(|| {
                registry
                    .pipeline_layout(layout_id)
                    .and_then(|l| l.set(SET_CUSTOM).cloned())
            })
            .as_ref();
        let (Some(layout), Some(custom)) = (layout, store.custom_resources().get(index as usize))
        else {
            warn_once!(
                log_once,
                ("custom_layout", layout_id, index),
                "Slot {slot}: custom set of layout {layout_id:?} or resources {index} unavailable"
            );
            return Ok(None);
        };

        if let Err(err) = custom.validate(layout) {
            warn_once!(
                log_once,
                ("custom_invalid", layout_id, index),
                "Slot {slot}: custom resources {index} rejected by layout {layout_id:?}: {err}"
            );
            return Ok(None);
        }
        if let Some(binding) = custom.resources.iter().position(|r| !is_live(&*backend, r)) {
            warn_once!(
                log_once,
                ("custom_dead_handle", index, binding),
                "Slot {slot}: custom resources {index} binding {binding} refers to a dead handle"
            );
            return Ok(None);
        }

        let set = resources.acquire_custom_set(&mut *backend, layout_id, SET_CUSTOM)?;
        backend.update_binding_set(set, &custom.resources)?;
        self.frame.insert((layout_id, index), set);
        Ok(Some(set))
    }
}

/// `[mesh, skin, material]` offsets into the shared uniform blocks.
fn dynamic_offsets(submesh: &SubmeshData) -> Option<[u32; 3]> {
    let mesh = u64::from(submesh.mesh_index) * MESH_STRIDE;
    let skin = u64::from(submesh.skin_index.unwrap_or(0)) * SKIN_STRIDE;
    let material = u64::from(submesh.material_index) * MATERIAL_STRIDE;
    Some([
        u32::try_from(mesh).ok()?,
        u32::try_from(skin).ok()?,
        u32::try_from(material).ok()?,
    ])
}

/// Block bindings followed by an image/sampler pair per texture slot, with
/// invalid handles replaced by the provider defaults.
fn object_set_bindings<P: ResourceProvider + ?Sized>(
    resources: &SlotResources,
    material: &MaterialRecord,
    provider: &P,
) -> SmallVec<[BindingResource; OBJECT_SET_BINDING_COUNT]> {
    let mut bindings: SmallVec<[BindingResource; OBJECT_SET_BINDING_COUNT]> =
        SmallVec::from_slice(&resources.object_block_bindings());
    for ((_, &image), (_, &sampler)) in material
        .handles
        .images
        .iter()
        .zip(material.handles.samplers.iter())
    {
        let image = if provider.is_valid_image(image) {
            image
        } else {
            provider.default_image()
        };
        let sampler = sampler.valid().unwrap_or_else(|| provider.default_sampler());
        bindings.push(BindingResource::Image(image));
        bindings.push(BindingResource::Sampler(sampler));
    }
    bindings
}

fn is_live<P: ResourceProvider + ?Sized>(provider: &P, resource: &BindingResource) -> bool {
    match *resource {
        BindingResource::UniformBuffer { buffer, .. }
        | BindingResource::StorageBuffer { buffer, .. } => provider.is_valid_buffer(buffer),
        BindingResource::Image(image) => provider.is_valid_image(image),
        BindingResource::Sampler(sampler) => sampler.is_valid(),
    }
}

/// Packs `items` at `stride` intervals and uploads them in one write.
fn write_blocks<B, T>(
    backend: &mut B,
    staging: &mut Vec<u8>,
    buffer: BufferHandle,
    stride: u64,
    items: impl ExactSizeIterator<Item = T>,
) -> Result<()>
where
    B: ResourceProvider + ?Sized,
    T: Pod,
{
    if items.len() == 0 {
        return Ok(());
    }
    let stride = stride as usize;
    staging.clear();
    staging.resize(items.len() * stride, 0);
    for (i, item) in items.enumerate() {
        let bytes = bytemuck::bytes_of(&item);
        staging[i * stride..i * stride + bytes.len()].copy_from_slice(bytes);
    }
    backend.write_buffer(buffer, 0, staging)
}

/// Binds the submesh's geometry and issues its draw. Returns the number of
/// draw calls recorded.
fn record_draw<E: DrawEncoder + ?Sized>(encoder: &mut E, submesh: &SubmeshData) -> u32 {
    let buffers = &submesh.buffers;
    for (slot, vertex) in buffers.vertex.iter().enumerate() {
        encoder.bind_vertex_buffer(slot as u32, vertex.buffer, vertex.offset);
    }
    if let Some(index) = &buffers.index {
        encoder.bind_index_buffer(index.buffer, index.offset, index.format);
    }

    if let Some(indirect) = &buffers.indirect {
        for k in 0..indirect.draw_count {
            let offset = indirect.offset + u64::from(k) * u64::from(indirect.stride);
            if buffers.index.is_some() {
                encoder.draw_indexed_indirect(indirect.buffer, offset);
            } else {
                encoder.draw_indirect(indirect.buffer, offset);
            }
        }
        return indirect.draw_count;
    }

    let draw = &submesh.draw;
    if draw.element_count == 0 || draw.instance_count == 0 {
        return 0;
    }
    let elements = draw.first_element..draw.first_element + draw.element_count;
    let instances = draw.first_instance..draw.first_instance + draw.instance_count;
    if buffers.index.is_some() {
        encoder.draw_indexed(elements, draw.base_vertex, instances);
    } else {
        encoder.draw(elements, instances);
    }
    1
}
