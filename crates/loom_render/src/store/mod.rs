//! Material Data Store
//!
//! Per-frame accumulation of everything the slot renderers draw. Producers add
//! meshes, materials, skins and submeshes; each submesh is routed into one or
//! more render-slot buckets together with the sort and pipeline metadata the
//! renderers need, so nothing about the material has to be re-derived during
//! the per-frame sort.
//!
//! All records are addressed by `u32` indices that stay stable for the frame.
//! [`MaterialDataStore::clear`] ends the frame.
//!
//! # Index validation
//!
//! Producer mistakes never abort a frame. Out-of-range mesh indices are
//! clamped to mesh 0, out-of-range material indices are redirected to a
//! default material created on demand, and out-of-range skin or custom
//! resource indices are dropped. Every correction is logged.

mod custom;
mod material;
mod mesh;
mod skin;
mod submesh;

use std::sync::Arc;

use glam::Mat4;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

pub use custom::CustomResources;
pub use material::{
    CustomDataRange, MaterialData, MaterialHandles, MaterialInput, MaterialRecord,
    MaterialTextureSlot, MaterialUniforms, MaterialUniformsInput, TextureSlots,
};
pub use mesh::{MeshData, MeshUniforms};
pub use skin::{JointMatrixArena, JointRange, MAX_JOINT_COUNT, SkinJointBlock, SkinUniforms};
pub use submesh::{
    DrawCommand, IndexBufferBinding, IndirectBufferBinding, SlotShaderOverride,
    SlotSubmeshMaterialData, SubmeshBuffers, SubmeshData, SubmeshInput, VertexBufferBinding,
};

use crate::flags::{RenderMaterialFlags, SubmeshFlags, render_hash};
use crate::provider::{ShaderData, ShaderRegistry};
use crate::settings::StoreSettings;
use crate::slot::RenderSlotId;

/// Largest custom byte blob kept per material.
pub const MAX_CUSTOM_DATA_SIZE: usize = 256;

/// Custom blobs start on this boundary inside the shared byte buffer.
const CUSTOM_DATA_ALIGNMENT: usize = 16;

/// Object counts used to size per-slot GPU pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ObjectCounts {
    pub mesh_count: u32,
    pub submesh_count: u32,
    pub skin_count: u32,
    pub material_count: u32,
}

impl ObjectCounts {
    /// Every count raised to at least one, so pools are never zero sized.
    #[must_use]
    pub fn at_least_one(self) -> Self {
        Self {
            mesh_count: self.mesh_count.max(1),
            submesh_count: self.submesh_count.max(1),
            skin_count: self.skin_count.max(1),
            material_count: self.material_count.max(1),
        }
    }
}

/// Submesh indices routed into one render slot, plus parallel metadata.
#[derive(Debug, Default)]
struct SlotBucket {
    submesh_indices: Vec<u32>,
    material_data: Vec<SlotSubmeshMaterialData>,
}

impl SlotBucket {
    fn push(&mut self, submesh_index: u32, data: SlotSubmeshMaterialData) {
        self.submesh_indices.push(submesh_index);
        self.material_data.push(data);
    }

    fn clear(&mut self) {
        self.submesh_indices.clear();
        self.material_data.clear();
    }
}

pub struct MaterialDataStore {
    registry: Arc<dyn ShaderRegistry>,
    settings: StoreSettings,

    meshes: Vec<MeshData>,

    materials: Vec<MaterialRecord>,
    material_uniforms: Vec<MaterialUniforms>,
    material_ids: FxHashMap<u64, u32>,
    default_material: Option<u32>,
    custom_data: Vec<u8>,

    skin_blocks: Vec<SkinJointBlock>,
    joints: JointMatrixArena,

    custom_resources: Vec<CustomResources>,

    submeshes: Vec<SubmeshData>,
    buckets: FxHashMap<RenderSlotId, SlotBucket>,
}

impl std::fmt::Debug for MaterialDataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaterialDataStore")
            .field("meshes", &self.meshes.len())
            .field("materials", &self.materials.len())
            .field("skins", &self.skin_blocks.len())
            .field("submeshes", &self.submeshes.len())
            .field("slots", &self.buckets.len())
            .finish_non_exhaustive()
    }
}

impl MaterialDataStore {
    #[must_use]
    pub fn new(registry: Arc<dyn ShaderRegistry>) -> Self {
        Self::with_settings(registry, StoreSettings::default())
    }

    #[must_use]
    pub fn with_settings(registry: Arc<dyn ShaderRegistry>, settings: StoreSettings) -> Self {
        Self {
            registry,
            settings,
            meshes: Vec::with_capacity(256),
            materials: Vec::with_capacity(64),
            material_uniforms: Vec::with_capacity(64),
            material_ids: FxHashMap::default(),
            default_material: None,
            custom_data: Vec::new(),
            skin_blocks: Vec::new(),
            joints: JointMatrixArena::new(),
            custom_resources: Vec::new(),
            submeshes: Vec::with_capacity(256),
            buckets: FxHashMap::default(),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<dyn ShaderRegistry> {
        &self.registry
    }

    /// Ends the frame: drops every record and bucket entry and recycles the
    /// joint arena. Bucket allocations are kept for the next frame.
    pub fn clear(&mut self) {
        self.meshes.clear();
        self.materials.clear();
        self.material_uniforms.clear();
        self.material_ids.clear();
        self.default_material = None;
        self.custom_data.clear();
        self.skin_blocks.clear();
        self.joints.reset();
        self.custom_resources.clear();
        self.submeshes.clear();
        for bucket in self.buckets.values_mut() {
            bucket.clear();
        }
    }

    // ── Meshes ───────────────────────────────────────────────────────────────

    pub fn add_mesh(&mut self, mesh: MeshData) -> u32 {
        let index = self.meshes.len() as u32;
        self.meshes.push(mesh);
        index
    }

    // ── Materials ────────────────────────────────────────────────────────────

    /// Adds a material with an automatic index.
    pub fn add_material(&mut self, input: MaterialInput<'_>) -> u32 {
        let custom_data = self.push_custom_data(input.custom_bytes);
        let index = self.materials.len() as u32;
        self.material_uniforms.push(MaterialUniforms::pack(
            &input.uniforms,
            &input.data,
            custom_data,
        ));
        self.materials.push(MaterialRecord {
            data: input.data,
            handles: input.handles,
            custom_data,
            custom_resource_index: None,
        });
        index
    }

    /// Adds a material under an external id. A repeated id returns the index
    /// of the first submission and leaves its data untouched.
    pub fn add_material_with_id(&mut self, id: u64, input: MaterialInput<'_>) -> u32 {
        if let Some(&index) = self.material_ids.get(&id) {
            return index;
        }
        let index = self.add_material(input);
        self.material_ids.insert(id, index);
        index
    }

    #[must_use]
    pub fn material_index(&self, id: u64) -> Option<u32> {
        self.material_ids.get(&id).copied()
    }

    fn push_custom_data(&mut self, bytes: &[u8]) -> CustomDataRange {
        if bytes.is_empty() {
            return CustomDataRange::default();
        }
        let bytes = if bytes.len() > MAX_CUSTOM_DATA_SIZE {
            log::warn!(
                "Material custom data of {} bytes truncated to {MAX_CUSTOM_DATA_SIZE}",
                bytes.len()
            );
            &bytes[..MAX_CUSTOM_DATA_SIZE]
        } else {
            bytes
        };

        let offset = self.custom_data.len();
        self.custom_data.extend_from_slice(bytes);
        let padded = self.custom_data.len().next_multiple_of(CUSTOM_DATA_ALIGNMENT);
        self.custom_data.resize(padded, 0);

        CustomDataRange {
            offset: offset as u32,
            size: bytes.len() as u32,
        }
    }

    /// Attaches user binding resources to a material. Returns the resource
    /// index, or `None` when `material_index` is out of range.
    pub fn add_material_custom_resources(
        &mut self,
        material_index: u32,
        resources: CustomResources,
    ) -> Option<u32> {
        let Some(material) = self.materials.get_mut(material_index as usize) else {
            log::warn!("Custom resources for unknown material {material_index} ignored");
            return None;
        };
        let index = self.custom_resources.len() as u32;
        self.custom_resources.push(resources);
        material.custom_resource_index = Some(index);
        Some(index)
    }

    fn default_material_index(&mut self) -> u32 {
        if let Some(index) = self.default_material {
            return index;
        }
        let index = self.add_material(MaterialInput::default());
        log::debug!("Created default material {index}");
        self.default_material = Some(index);
        index
    }

    // ── Skins ────────────────────────────────────────────────────────────────

    /// Copies a skin's joint palettes. `previous` falls back to `current`
    /// when its length differs.
    pub fn add_skin_joint_matrices(&mut self, current: &[Mat4], previous: &[Mat4]) -> u32 {
        let current = if current.len() > MAX_JOINT_COUNT {
            log::warn!(
                "Skin with {} joints truncated to {MAX_JOINT_COUNT}",
                current.len()
            );
            &current[..MAX_JOINT_COUNT]
        } else {
            current
        };
        let previous = match previous.get(..current.len()) {
            Some(previous) if previous.len() == current.len() && !previous.is_empty() => previous,
            _ => current,
        };

        let current_range = self.joints.allocate(current);
        let previous_range = self.joints.allocate(previous);
        let index = self.skin_blocks.len() as u32;
        self.skin_blocks.push(SkinJointBlock {
            current: current_range,
            previous: previous_range,
        });
        index
    }

    // ── Submeshes ────────────────────────────────────────────────────────────

    /// Adds a submesh and routes it into its material's slot, and into the
    /// depth slot for shadow casters.
    pub fn add_submesh(&mut self, input: SubmeshInput) -> u32 {
        let submesh = self.validate_submesh(input);
        let material = self.materials[submesh.material_index as usize].data;

        let primary = self.resolve_slot(&material.custom_shader, material.custom_render_slot);
        let mut routes: SmallVec<[(RenderSlotId, ShaderData); 2]> =
            smallvec::smallvec![(primary, material.custom_shader)];

        let depth = self.settings.depth_slot;
        if self.settings.route_shadow_casters
            && material.flags.contains(RenderMaterialFlags::SHADOW_CASTER)
            && primary != depth
        {
            let shader = self
                .registry
                .slot_variant(material.custom_shader.shader, depth)
                .unwrap_or_default();
            routes.push((depth, shader));
        }

        self.push_submesh(submesh, &routes)
    }

    /// Adds a submesh to explicitly listed slots. An override shader with
    /// invalid halves inherits them from the material shader.
    pub fn add_submesh_with_slots(
        &mut self,
        input: SubmeshInput,
        slots: &[SlotShaderOverride],
    ) -> u32 {
        let submesh = self.validate_submesh(input);
        let material = self.materials[submesh.material_index as usize].data;

        let routes: SmallVec<[(RenderSlotId, ShaderData); 2]> = slots
            .iter()
            .filter(|o| o.slot.is_valid())
            .map(|o| {
                let shader = ShaderData {
                    shader: o
                        .shader
                        .shader
                        .valid()
                        .unwrap_or(material.custom_shader.shader),
                    graphics_state: o
                        .shader
                        .graphics_state
                        .valid()
                        .unwrap_or(material.custom_shader.graphics_state),
                };
                (o.slot, shader)
            })
            .collect();
        if routes.is_empty() {
            log::warn!("Submesh added with no valid render slot; it will not be drawn");
        }

        self.push_submesh(submesh, &routes)
    }

    fn push_submesh(
        &mut self,
        submesh: SubmeshData,
        routes: &[(RenderSlotId, ShaderData)],
    ) -> u32 {
        let material = self.materials[submesh.material_index as usize].data;
        let index = self.submeshes.len() as u32;
        for &(slot, shader) in routes {
            self.buckets.entry(slot).or_default().push(
                index,
                SlotSubmeshMaterialData {
                    shader,
                    render_sort_word: submesh.render_sort_word,
                    render_hash: submesh.render_hash,
                    material_type: material.material_type,
                    material_flags: material.flags,
                    extra_flags: material.extra_flags,
                },
            );
        }
        self.submeshes.push(submesh);
        index
    }

    /// Material custom slot, then the graphics state's slot, then the
    /// shader's slot, then the configured default.
    fn resolve_slot(&self, shader: &ShaderData, custom_slot: Option<RenderSlotId>) -> RenderSlotId {
        custom_slot
            .filter(|s| s.is_valid())
            .or_else(|| {
                shader
                    .graphics_state
                    .valid()
                    .and_then(|gs| self.registry.graphics_state_render_slot(gs))
            })
            .or_else(|| {
                shader
                    .shader
                    .valid()
                    .and_then(|s| self.registry.shader_info(s))
                    .and_then(|info| info.render_slot)
            })
            .unwrap_or(self.settings.default_slot)
    }

    fn validate_submesh(&mut self, input: SubmeshInput) -> SubmeshData {
        if self.meshes.is_empty() {
            log::warn!("Submesh added before any mesh; creating a default mesh");
            self.add_mesh(MeshData::default());
        }
        let mesh_index = if (input.mesh_index as usize) < self.meshes.len() {
            input.mesh_index
        } else {
            log::warn!(
                "Submesh mesh index {} out of range ({} meshes); clamped to 0",
                input.mesh_index,
                self.meshes.len()
            );
            0
        };

        let material_index = if (input.material_index as usize) < self.materials.len() {
            input.material_index
        } else {
            log::warn!(
                "Submesh material index {} out of range ({} materials); using default material",
                input.material_index,
                self.materials.len()
            );
            self.default_material_index()
        };

        let mut flags = input.flags;
        let skin_index = match input.skin_index {
            Some(i) if (i as usize) < self.skin_blocks.len() => Some(i),
            Some(i) => {
                log::warn!("Submesh skin index {i} out of range; skinning disabled");
                flags.remove(SubmeshFlags::SKIN);
                None
            }
            None => {
                if flags.contains(SubmeshFlags::SKIN) {
                    log::warn!("Submesh flagged as skinned without a skin; skinning disabled");
                    flags.remove(SubmeshFlags::SKIN);
                }
                None
            }
        };

        let custom_resource_index = match input.custom_resource_index {
            Some(i) if (i as usize) < self.custom_resources.len() => Some(i),
            Some(i) => {
                log::warn!("Submesh custom resource index {i} out of range; dropped");
                None
            }
            None => None,
        };

        let material = &self.materials[material_index as usize].data;
        let sort = input.render_sort.unwrap_or(material.render_sort);

        SubmeshData {
            mesh_index,
            material_index,
            skin_index,
            custom_resource_index,
            flags,
            layer_mask: input.layer_mask,
            bounds: input.bounds,
            draw: input.draw,
            buffers: input.buffers,
            render_hash: render_hash(material.material_type, material.flags, flags),
            render_sort_word: sort.word(),
        }
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    #[must_use]
    pub fn meshes(&self) -> &[MeshData] {
        &self.meshes
    }

    #[must_use]
    pub fn materials(&self) -> &[MaterialRecord] {
        &self.materials
    }

    #[must_use]
    pub fn material_uniforms(&self) -> &[MaterialUniforms] {
        &self.material_uniforms
    }

    #[must_use]
    pub fn submeshes(&self) -> &[SubmeshData] {
        &self.submeshes
    }

    #[must_use]
    pub fn skin_joint_blocks(&self) -> &[SkinJointBlock] {
        &self.skin_blocks
    }

    /// Matrices of a joint range returned in a [`SkinJointBlock`].
    #[must_use]
    pub fn joint_matrices(&self, range: JointRange) -> &[Mat4] {
        self.joints.get(range)
    }

    #[must_use]
    pub fn custom_resources(&self) -> &[CustomResources] {
        &self.custom_resources
    }

    /// Shared byte buffer holding every material's custom data.
    #[must_use]
    pub fn custom_data_bytes(&self) -> &[u8] {
        &self.custom_data
    }

    /// Custom bytes of one material; empty when it has none.
    #[must_use]
    pub fn material_custom_data(&self, material_index: u32) -> &[u8] {
        self.materials
            .get(material_index as usize)
            .and_then(|m| {
                let start = m.custom_data.offset as usize;
                self.custom_data.get(start..start + m.custom_data.size as usize)
            })
            .unwrap_or(&[])
    }

    /// Custom resources used by a submesh: its own, else its material's.
    #[must_use]
    pub fn submesh_custom_resource_index(&self, submesh: &SubmeshData) -> Option<u32> {
        submesh.custom_resource_index.or_else(|| {
            self.materials
                .get(submesh.material_index as usize)
                .and_then(|m| m.custom_resource_index)
        })
    }

    #[must_use]
    pub fn slot_submesh_indices(&self, slot: RenderSlotId) -> &[u32] {
        self.buckets
            .get(&slot)
            .map_or(&[], |b| b.submesh_indices.as_slice())
    }

    #[must_use]
    pub fn slot_submesh_material_data(&self, slot: RenderSlotId) -> &[SlotSubmeshMaterialData] {
        self.buckets
            .get(&slot)
            .map_or(&[], |b| b.material_data.as_slice())
    }

    /// Counts a slot renderer must size its pools for. Meshes, skins and
    /// materials are addressed by global index, so those counts are global.
    #[must_use]
    pub fn slot_object_counts(&self, slot: RenderSlotId) -> ObjectCounts {
        ObjectCounts {
            submesh_count: self.slot_submesh_indices(slot).len() as u32,
            ..self.object_counts()
        }
    }

    #[must_use]
    pub fn object_counts(&self) -> ObjectCounts {
        ObjectCounts {
            mesh_count: self.meshes.len() as u32,
            submesh_count: self.submeshes.len() as u32,
            skin_count: self.skin_blocks.len() as u32,
            material_count: self.materials.len() as u32,
        }
    }
}
