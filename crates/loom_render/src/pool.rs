//! Per-slot resource pools.
//!
//! [`ResourcePoolSizer`] is the pure capacity policy: it tracks how many
//! meshes, submeshes, skins and materials the slot's GPU pools can hold and
//! decides when they must grow. [`SlotResources`] owns the actual handles and
//! rebuilds them when the sizer reports growth.
//!
//! Per-object data lives in three shared uniform buffers addressed with
//! dynamic offsets `index * stride`; strides are rounded up to
//! [`UNIFORM_OFFSET_ALIGNMENT`].

use loom_core::{BindingSetHandle, BufferHandle, PipelineLayoutId, Result};
use rustc_hash::FxHashMap;

use crate::provider::{
    BindingKind, BindingResource, BindingSetLayoutDesc, BufferDesc, PipelineLayoutDesc,
    RenderBackend,
};
use crate::slot::{SET_OBJECT, SET_SCENE, SET_SCENE_IMAGES};
use crate::store::{
    MAX_CUSTOM_DATA_SIZE, MaterialTextureSlot, MaterialUniforms, MeshUniforms, ObjectCounts,
    SkinUniforms,
};

/// Required alignment of dynamic uniform offsets.
pub const UNIFORM_OFFSET_ALIGNMENT: u64 = 256;

#[inline]
#[must_use]
pub const fn aligned_stride(size: usize) -> u64 {
    (size as u64).next_multiple_of(UNIFORM_OFFSET_ALIGNMENT)
}

pub const MESH_STRIDE: u64 = aligned_stride(size_of::<MeshUniforms>());
pub const SKIN_STRIDE: u64 = aligned_stride(size_of::<SkinUniforms>());
pub const MATERIAL_STRIDE: u64 = aligned_stride(size_of::<MaterialUniforms>());

/// Bindings of the per-object set: the three dynamic blocks, the custom data
/// storage buffer, then an image and a sampler per material texture slot.
pub const OBJECT_SET_BINDING_COUNT: usize = 4 + 2 * MaterialTextureSlot::COUNT;

/// Layout of the per-object binding set ([`SET_OBJECT`]).
#[must_use]
pub fn object_set_layout() -> BindingSetLayoutDesc {
    let blocks = [
        BindingKind::UniformBuffer { dynamic: true },
        BindingKind::UniformBuffer { dynamic: true },
        BindingKind::UniformBuffer { dynamic: true },
        BindingKind::StorageBuffer { dynamic: false },
    ];
    let textures = MaterialTextureSlot::ALL
        .iter()
        .flat_map(|_| [BindingKind::Image, BindingKind::Sampler]);
    BindingSetLayoutDesc::new(blocks.into_iter().chain(textures))
}

// ─── Capacity policy ──────────────────────────────────────────────────────────

/// Allocated capacity of a slot's pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PoolCapacity {
    pub mesh: u32,
    pub submesh: u32,
    pub skin: u32,
    pub material: u32,
}

impl PoolCapacity {
    #[must_use]
    pub fn covers(&self, counts: &ObjectCounts) -> bool {
        counts.mesh_count <= self.mesh
            && counts.submesh_count <= self.submesh
            && counts.skin_count <= self.skin
            && counts.material_count <= self.material
    }
}

/// Result of [`ResourcePoolSizer::ensure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolSizeChange {
    Unchanged,
    /// Pools must be rebuilt with the new capacity.
    Grown { capacity: PoolCapacity },
}

#[derive(Debug, Default)]
pub struct ResourcePoolSizer {
    capacity: PoolCapacity,
    grow_count: u32,
}

/// `requested + requested / 16` when `requested` exceeds `current`.
#[inline]
const fn grown(current: u32, requested: u32) -> u32 {
    if requested > current {
        requested.saturating_add(requested / 16)
    } else {
        current
    }
}

impl ResourcePoolSizer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Grows every component that `counts` exceeds. Never shrinks.
    pub fn ensure(&mut self, counts: ObjectCounts) -> PoolSizeChange {
        if self.capacity.covers(&counts) {
            return PoolSizeChange::Unchanged;
        }

        let capacity = PoolCapacity {
            mesh: grown(self.capacity.mesh, counts.mesh_count),
            submesh: grown(self.capacity.submesh, counts.submesh_count),
            skin: grown(self.capacity.skin, counts.skin_count),
            material: grown(self.capacity.material, counts.material_count),
        };
        log::info!(
            "Resource pool growing: {:?} -> {:?} (requested {:?})",
            self.capacity,
            capacity,
            counts
        );
        self.capacity = capacity;
        self.grow_count += 1;
        PoolSizeChange::Grown { capacity }
    }

    /// Forgets the capacity; the next `ensure` grows from zero.
    pub fn reset(&mut self) {
        self.capacity = PoolCapacity::default();
    }

    #[must_use]
    pub fn capacity(&self) -> PoolCapacity {
        self.capacity
    }

    /// Number of `ensure` calls that grew the pools.
    #[must_use]
    pub fn grow_count(&self) -> u32 {
        self.grow_count
    }
}

// ─── GPU handles ──────────────────────────────────────────────────────────────

/// Frame-local binding sets for custom resources, recycled per layout.
#[derive(Debug, Default)]
struct CustomSetPool {
    free: FxHashMap<PipelineLayoutId, Vec<BindingSetHandle>>,
    in_use: Vec<(PipelineLayoutId, BindingSetHandle)>,
}

/// Scene-wide sets of one view: `[SET_SCENE, SET_SCENE_IMAGES]`.
pub type SceneSets = [Option<BindingSetHandle>; 2];

/// GPU buffers and binding sets of one slot renderer.
///
/// Scene and per-object sets are handed out in order during a frame and
/// only recycled by [`begin_frame`](SlotResources::begin_frame), so every
/// view recorded into the same command list keeps its own bindings.
#[derive(Debug)]
pub struct SlotResources {
    capacity: PoolCapacity,
    layout: Option<PipelineLayoutId>,
    scene_set_kinds: [bool; 2],
    mesh_buffer: BufferHandle,
    skin_buffer: BufferHandle,
    material_buffer: BufferHandle,
    custom_data_buffer: BufferHandle,
    scene_sets: Vec<SceneSets>,
    next_scene: usize,
    object_sets: Vec<BindingSetHandle>,
    next_object: usize,
    custom_sets: CustomSetPool,
}

impl Default for SlotResources {
    fn default() -> Self {
        Self {
            capacity: PoolCapacity::default(),
            layout: None,
            scene_set_kinds: [false; 2],
            mesh_buffer: BufferHandle::INVALID,
            skin_buffer: BufferHandle::INVALID,
            material_buffer: BufferHandle::INVALID,
            custom_data_buffer: BufferHandle::INVALID,
            scene_sets: Vec::new(),
            next_scene: 0,
            object_sets: Vec::new(),
            next_object: 0,
            custom_sets: CustomSetPool::default(),
        }
    }
}

impl SlotResources {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Recreates every buffer and binding set for `capacity`. Scene-wide sets
    /// are created only for sets `layout_desc` declares.
    pub fn rebuild<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        layout: PipelineLayoutId,
        layout_desc: &PipelineLayoutDesc,
        capacity: PoolCapacity,
    ) -> Result<()> {
        self.destroy(backend);

        let uniform = wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST;
        self.mesh_buffer = backend.create_buffer(&BufferDesc {
            label: "loom_mesh_uniforms",
            size: u64::from(capacity.mesh) * MESH_STRIDE,
            usage: uniform,
        })?;
        self.skin_buffer = backend.create_buffer(&BufferDesc {
            label: "loom_skin_uniforms",
            size: u64::from(capacity.skin) * SKIN_STRIDE,
            usage: uniform,
        })?;
        self.material_buffer = backend.create_buffer(&BufferDesc {
            label: "loom_material_uniforms",
            size: u64::from(capacity.material) * MATERIAL_STRIDE,
            usage: uniform,
        })?;
        self.custom_data_buffer = backend.create_buffer(&BufferDesc {
            label: "loom_material_custom_data",
            size: u64::from(capacity.material) * MAX_CUSTOM_DATA_SIZE as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        })?;

        self.layout = Some(layout);
        self.scene_set_kinds = [
            layout_desc.has_set(SET_SCENE),
            layout_desc.has_set(SET_SCENE_IMAGES),
        ];
        let scene = create_scene_sets(backend, layout, self.scene_set_kinds)?;
        self.scene_sets.push(scene);

        self.object_sets.reserve(capacity.submesh as usize);
        for _ in 0..capacity.submesh {
            self.object_sets
                .push(backend.create_binding_set(layout, SET_OBJECT)?);
        }

        self.capacity = capacity;
        log::debug!(
            "Slot resources rebuilt: {} object sets, {} bytes of uniforms",
            self.object_sets.len(),
            u64::from(capacity.mesh) * MESH_STRIDE
                + u64::from(capacity.skin) * SKIN_STRIDE
                + u64::from(capacity.material) * MATERIAL_STRIDE
        );
        Ok(())
    }

    /// Releases every handle back to the backend.
    pub fn destroy<B: RenderBackend + ?Sized>(&mut self, backend: &mut B) {
        for buffer in [
            &mut self.mesh_buffer,
            &mut self.skin_buffer,
            &mut self.material_buffer,
            &mut self.custom_data_buffer,
        ] {
            if buffer.is_valid() {
                backend.destroy_buffer(*buffer);
            }
            *buffer = BufferHandle::INVALID;
        }
        for set in self.scene_sets.drain(..).flatten().flatten() {
            backend.destroy_binding_set(set);
        }
        for set in self.object_sets.drain(..) {
            backend.destroy_binding_set(set);
        }
        self.begin_frame();
        for set in self.custom_sets.free.drain().flat_map(|(_, sets)| sets) {
            backend.destroy_binding_set(set);
        }
        self.capacity = PoolCapacity::default();
        self.layout = None;
        self.scene_set_kinds = [false; 2];
    }

    #[must_use]
    pub fn capacity(&self) -> PoolCapacity {
        self.capacity
    }

    #[must_use]
    pub fn is_allocated(&self) -> bool {
        self.mesh_buffer.is_valid()
    }

    #[must_use]
    pub fn mesh_buffer(&self) -> BufferHandle {
        self.mesh_buffer
    }

    #[must_use]
    pub fn skin_buffer(&self) -> BufferHandle {
        self.skin_buffer
    }

    #[must_use]
    pub fn material_buffer(&self) -> BufferHandle {
        self.material_buffer
    }

    #[must_use]
    pub fn custom_data_buffer(&self) -> BufferHandle {
        self.custom_data_buffer
    }

    /// Binding set of [`SET_SCENE`] (`0`) or [`SET_SCENE_IMAGES`] (`1`) of
    /// the `view`th view of the frame.
    #[must_use]
    pub fn scene_set(&self, view: usize, set: u32) -> Option<BindingSetHandle> {
        self.scene_sets
            .get(view)
            .and_then(|sets| sets.get(set as usize))
            .copied()
            .flatten()
    }

    #[must_use]
    pub fn scene_set_count(&self) -> usize {
        self.scene_sets.len()
    }

    /// Per-object set `slot`; each draw that changes material takes the next.
    #[must_use]
    pub fn object_set(&self, slot: usize) -> Option<BindingSetHandle> {
        self.object_sets.get(slot).copied()
    }

    #[must_use]
    pub fn object_set_count(&self) -> usize {
        self.object_sets.len()
    }

    /// Per-object sets handed out since the last `begin_frame`.
    #[must_use]
    pub fn object_sets_in_use(&self) -> usize {
        self.next_object
    }

    /// Starts a frame: every scene, object and custom set becomes free again.
    pub fn begin_frame(&mut self) {
        self.next_scene = 0;
        self.next_object = 0;
        self.release_frame_sets();
    }

    /// The scene sets of the next view, created when every existing pair is
    /// already in use this frame.
    pub fn take_scene_sets<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
    ) -> Result<SceneSets> {
        let Some(layout) = self.layout else {
            return Ok([None; 2]);
        };
        if self.next_scene == self.scene_sets.len() {
            let sets = create_scene_sets(backend, layout, self.scene_set_kinds)?;
            self.scene_sets.push(sets);
            log::debug!("Scene sets grown to {} views", self.scene_sets.len());
        }
        let sets = self.scene_sets[self.next_scene];
        self.next_scene += 1;
        Ok(sets)
    }

    /// The next free per-object set, created when the pool built for
    /// `capacity.submesh` draws is exhausted. `None` before the first rebuild.
    pub fn take_object_set<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
    ) -> Result<Option<BindingSetHandle>> {
        let Some(layout) = self.layout else {
            return Ok(None);
        };
        if self.next_object == self.object_sets.len() {
            self.object_sets
                .push(backend.create_binding_set(layout, SET_OBJECT)?);
            log::debug!("Object sets grown to {}", self.object_sets.len());
        }
        let set = self.object_sets[self.next_object];
        self.next_object += 1;
        Ok(Some(set))
    }

    /// The leading per-object bindings: dynamic blocks plus custom data.
    #[must_use]
    pub fn object_block_bindings(&self) -> [BindingResource; 4] {
        [
            BindingResource::UniformBuffer {
                buffer: self.mesh_buffer,
                offset: 0,
                size: Some(MESH_STRIDE),
            },
            BindingResource::UniformBuffer {
                buffer: self.skin_buffer,
                offset: 0,
                size: Some(SKIN_STRIDE),
            },
            BindingResource::UniformBuffer {
                buffer: self.material_buffer,
                offset: 0,
                size: Some(MATERIAL_STRIDE),
            },
            BindingResource::StorageBuffer {
                buffer: self.custom_data_buffer,
                offset: 0,
                size: None,
            },
        ]
    }

    /// A custom binding set for `layout`, valid until
    /// [`begin_frame`](Self::begin_frame).
    pub fn acquire_custom_set<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        layout: PipelineLayoutId,
        set: u32,
    ) -> Result<BindingSetHandle> {
        let handle = match self.custom_sets.free.get_mut(&layout).and_then(Vec::pop) {
            Some(handle) => handle,
            None => backend.create_binding_set(layout, set)?,
        };
        self.custom_sets.in_use.push((layout, handle));
        Ok(handle)
    }

    /// Returns this frame's custom sets to the free lists.
    fn release_frame_sets(&mut self) {
        for (layout, handle) in self.custom_sets.in_use.drain(..) {
            self.custom_sets.free.entry(layout).or_default().push(handle);
        }
    }
}

fn create_scene_sets<B: RenderBackend + ?Sized>(
    backend: &mut B,
    layout: PipelineLayoutId,
    kinds: [bool; 2],
) -> Result<SceneSets> {
    let mut sets: SceneSets = [None; 2];
    for (slot, set) in [SET_SCENE, SET_SCENE_IMAGES].into_iter().enumerate() {
        if !kinds[slot] {
            continue;
        }
        match backend.create_binding_set(layout, set) {
            Ok(handle) => sets[slot] = Some(handle),
            Err(err) => {
                for created in sets.into_iter().flatten() {
                    backend.destroy_binding_set(created);
                }
                return Err(err);
            }
        }
    }
    Ok(sets)
}
