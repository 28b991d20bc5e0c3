//! Pipeline Cache
//!
//! Per-slot owner of the composite-key → pipeline mapping. Lookups are a
//! single `FxHashMap` probe; pipeline objects are only created on a miss and
//! live until the slot's shader configuration is rebuilt.
//!
//! # Resolution on miss
//!
//! - **Shader**: the bucket's shader when it targets this slot (or no slot),
//!   else its slot variant, else the slot default.
//! - **Graphics state**: the bucket's state when it is not bound to another
//!   slot, else the variant's state, else the slot default.
//! - **Layout / vertex input**: the resolved shader's own, else the slot
//!   default. A shader whose layout disagrees with the slot default on the
//!   scene and object sets is replaced by the slot defaults.
//!
//! Failures (no slot defaults, factory errors) are logged once per cause and
//! yield `None`; nothing is cached for them so a later fix is picked up.

use std::sync::Arc;

use loom_core::{
    GraphicsStateId, LogOnce, PipelineHandle, PipelineLayoutId, ShaderId, VertexInputId, warn_once,
};
use rustc_hash::FxHashMap;

use super::key::PsoQuery;
use crate::provider::{
    DynamicStates, GraphicsState, PipelineDesc, PipelineFactory, PipelineLayoutDesc,
    RenderTargetDesc, ShaderRegistry, SlotShaderData,
};
use crate::settings::SlotRendererSettings;
use crate::slot::{RenderSlotId, SET_CUSTOM, SET_OBJECT};

/// Cached result of one pipeline resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PsoEntry {
    pub pipeline: PipelineHandle,
    pub graphics_state: GraphicsStateId,
    pub pipeline_layout: PipelineLayoutId,
    pub front_face_flipped: bool,
    /// The layout declares the custom set; the draw needs custom resources.
    pub needs_custom_set: bool,
}

#[derive(Debug, Clone, Copy)]
struct Resolved {
    shader: ShaderId,
    graphics_state: GraphicsStateId,
    pipeline_layout: PipelineLayoutId,
    vertex_input: VertexInputId,
}

pub struct PipelineCache {
    registry: Arc<dyn ShaderRegistry>,
    slot: RenderSlotId,
    targets: RenderTargetDesc,
    dynamic_states: DynamicStates,

    defaults: Option<SlotShaderData>,
    default_layout: Option<PipelineLayoutDesc>,

    entries: FxHashMap<u64, PsoEntry>,
    creation_count: u64,
    log_once: LogOnce,
}

impl std::fmt::Debug for PipelineCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineCache")
            .field("slot", &self.slot)
            .field("entries", &self.entries.len())
            .field("creation_count", &self.creation_count)
            .finish_non_exhaustive()
    }
}

impl PipelineCache {
    #[must_use]
    pub fn new(registry: Arc<dyn ShaderRegistry>, settings: &SlotRendererSettings) -> Self {
        let mut cache = Self {
            registry,
            slot: settings.slot,
            targets: settings.targets.clone(),
            dynamic_states: settings.dynamic_states,
            defaults: None,
            default_layout: None,
            entries: FxHashMap::default(),
            creation_count: 0,
            log_once: LogOnce::new(),
        };
        cache.set_default_shader_data();
        cache
    }

    /// Re-reads the slot defaults from the registry and drops every entry.
    /// Called when the slot's shaders are reconfigured (e.g. multiview).
    pub fn set_default_shader_data(&mut self) {
        self.defaults = self.registry.slot_defaults(self.slot);
        self.default_layout = self
            .defaults
            .and_then(|d| self.registry.pipeline_layout(d.pipeline_layout));
        if self.defaults.is_none() {
            log::warn!("Render slot {} has no default shader data", self.slot);
        }
        self.clear();
        self.log_once.reset();
        log::info!("Pipeline cache for slot {} rebuilt", self.slot);
    }

    /// Drops every cached entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn slot(&self) -> RenderSlotId {
        self.slot
    }

    #[must_use]
    pub fn defaults(&self) -> Option<&SlotShaderData> {
        self.defaults.as_ref()
    }

    /// Layout of the slot default shader; scene and object sets follow it.
    #[must_use]
    pub fn default_layout(&self) -> Option<&PipelineLayoutDesc> {
        self.default_layout.as_ref()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pipelines created since construction.
    #[must_use]
    pub fn creation_count(&self) -> u64 {
        self.creation_count
    }

    /// Returns the pipeline for `query`, creating it on a miss.
    pub fn get<F: PipelineFactory + ?Sized>(
        &mut self,
        factory: &mut F,
        query: &PsoQuery,
    ) -> Option<PsoEntry> {
        let key = query.key();
        if let Some(entry) = self.entries.get(&key) {
            return Some(*entry);
        }

        let resolved = self.resolve(query)?;
        let Some(layout) = self.registry.pipeline_layout(resolved.pipeline_layout) else {
            warn_once!(
                self.log_once,
                ("missing_layout", resolved.pipeline_layout),
                "Pipeline layout {:?} is not registered",
                resolved.pipeline_layout
            );
            return None;
        };

        let mut state = self.registry.graphics_state(resolved.graphics_state).unwrap_or_else(|| {
            warn_once!(
                self.log_once,
                ("missing_state", resolved.graphics_state),
                "Graphics state {:?} is not registered; using the fixed default",
                resolved.graphics_state
            );
            GraphicsState::default()
        });
        let flipped = query.inverted_winding();
        if flipped {
            state = state.with_flipped_winding();
        }

        let specialization = query.specialization();
        let desc = PipelineDesc {
            render_slot: self.slot,
            shader: resolved.shader,
            graphics_state: &state,
            pipeline_layout: resolved.pipeline_layout,
            vertex_input: resolved.vertex_input,
            specialization: &specialization,
            dynamic_states: self.dynamic_states,
            targets: &self.targets,
        };

        let pipeline = match factory.create_pipeline(&desc) {
            Ok(pipeline) => pipeline,
            Err(err) => {
                warn_once!(
                    self.log_once,
                    ("create_failed", key),
                    "Slot {}: pipeline for shader {:?} failed: {err}",
                    self.slot,
                    resolved.shader
                );
                return None;
            }
        };

        let entry = PsoEntry {
            pipeline,
            graphics_state: resolved.graphics_state,
            pipeline_layout: resolved.pipeline_layout,
            front_face_flipped: flipped,
            needs_custom_set: layout.has_set(SET_CUSTOM),
        };
        self.entries.insert(key, entry);
        self.creation_count += 1;
        log::debug!(
            "Slot {}: created pipeline {:?} (shader {:?}, state {:?}, flipped {flipped})",
            self.slot,
            pipeline,
            resolved.shader,
            resolved.graphics_state
        );
        Some(entry)
    }

    fn resolve(&mut self, query: &PsoQuery) -> Option<Resolved> {
        let Some(defaults) = self.defaults else {
            warn_once!(
                self.log_once,
                ("missing_defaults", self.slot),
                "Render slot {} has no default shader data; draws skipped",
                self.slot
            );
            return None;
        };
        let registry = Arc::clone(&self.registry);
        let slot = self.slot;

        // Shader: explicit, then slot variant, then default.
        let requested = query.shader;
        let explicit = requested
            .shader
            .valid()
            .and_then(|s| registry.shader_info(s).map(|info| (s, info)));
        let mut variant_state = GraphicsStateId::INVALID;
        let shader = match explicit {
            Some((s, info)) if info.render_slot.is_none_or(|r| r == slot) => Some((s, info)),
            Some((s, _)) => registry.slot_variant(s, slot).and_then(|variant| {
                variant_state = variant.graphics_state;
                registry
                    .shader_info(variant.shader)
                    .map(|info| (variant.shader, info))
            }),
            None => None,
        };

        // Graphics state: explicit when not bound elsewhere, then variant,
        // then default.
        let explicit_state = requested.graphics_state.valid().filter(|&gs| {
            registry
                .graphics_state_render_slot(gs)
                .is_none_or(|r| r == slot)
        });
        let graphics_state = explicit_state
            .or_else(|| variant_state.valid())
            .unwrap_or(defaults.graphics_state);

        let Some((shader, info)) = shader else {
            return Some(Resolved {
                graphics_state,
                ..Self::from_defaults(&defaults)
            });
        };
        if shader == defaults.shader {
            return Some(Resolved {
                graphics_state,
                ..Self::from_defaults(&defaults)
            });
        }

        let pipeline_layout = info
            .pipeline_layout
            .valid()
            .unwrap_or(defaults.pipeline_layout);
        let compatible = match (&self.default_layout, registry.pipeline_layout(pipeline_layout)) {
            (Some(default_layout), Some(layout)) => {
                layout.shares_sets_with(default_layout, SET_OBJECT + 1)
            }
            _ => false,
        };
        if !compatible {
            warn_once!(
                self.log_once,
                ("incompatible_layout", shader),
                "Slot {slot}: shader {shader:?} layout is incompatible with the slot layout; using slot defaults"
            );
            return Some(Self::from_defaults(&defaults));
        }

        Some(Resolved {
            shader,
            graphics_state,
            pipeline_layout,
            vertex_input: info.vertex_input.valid().unwrap_or(defaults.vertex_input),
        })
    }

    fn from_defaults(defaults: &SlotShaderData) -> Resolved {
        Resolved {
            shader: defaults.shader,
            graphics_state: defaults.graphics_state,
            pipeline_layout: defaults.pipeline_layout,
            vertex_input: defaults.vertex_input,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::{
        CameraShaderFlags, LightingFlags, MaterialType, RenderMaterialFlags, SubmeshFlags,
    };
    use crate::provider::ShaderData;
    use crate::testing::{RecordingBackend, StandardIds, standard_library};

    fn setup(settings: &SlotRendererSettings) -> (PipelineCache, RecordingBackend, StandardIds) {
        let (lib, ids) = standard_library();
        (
            PipelineCache::new(Arc::new(lib), settings),
            RecordingBackend::new(),
            ids,
        )
    }

    fn query(shader: ShaderData) -> PsoQuery {
        PsoQuery {
            shader,
            render_hash: 0,
            material_type: MaterialType::MetallicRoughness,
            material_flags: RenderMaterialFlags::empty(),
            submesh_flags: SubmeshFlags::empty(),
            lighting: LightingFlags::empty(),
            camera: CameraShaderFlags::empty(),
            post_process: false,
            flip_winding: false,
        }
    }

    #[test]
    fn identical_queries_create_once() {
        let (mut cache, mut backend, _) = setup(&SlotRendererSettings::opaque());
        let q = query(ShaderData::default());
        let a = cache.get(&mut backend, &q).expect("pipeline");
        let b = cache.get(&mut backend, &q).expect("pipeline");
        assert_eq!(a, b);
        assert_eq!(backend.pipeline_creations(), 1);
        assert_eq!(cache.creation_count(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn invalid_shader_uses_slot_defaults() {
        let (mut cache, mut backend, ids) = setup(&SlotRendererSettings::opaque());
        let entry = cache.get(&mut backend, &query(ShaderData::default())).expect("pipeline");
        assert_eq!(backend.pipelines[0].shader, ids.opaque_shader);
        assert_eq!(entry.graphics_state, ids.opaque_state);
        assert!(!entry.needs_custom_set);
    }

    #[test]
    fn unslotted_custom_shader_needs_custom_set() {
        let (mut cache, mut backend, ids) = setup(&SlotRendererSettings::opaque());
        let q = query(ShaderData::new(ids.custom_shader, GraphicsStateId::INVALID));
        let entry = cache.get(&mut backend, &q).expect("pipeline");
        assert_eq!(backend.pipelines[0].shader, ids.custom_shader);
        assert_eq!(entry.pipeline_layout, ids.custom_layout);
        assert!(entry.needs_custom_set);
    }

    #[test]
    fn shader_for_another_slot_uses_its_variant() {
        let (mut cache, mut backend, ids) = setup(&SlotRendererSettings::depth());
        let q = query(ShaderData::new(ids.custom_shader, GraphicsStateId::INVALID));
        // Unslotted shaders are used as-is; a slotted one is redirected.
        cache.get(&mut backend, &q).expect("pipeline");
        assert_eq!(backend.pipelines[0].shader, ids.custom_shader);

        let q = query(ShaderData::new(ids.translucent_shader, ids.blend_state));
        cache.get(&mut backend, &q).expect("pipeline");
        assert_eq!(backend.pipelines[1].shader, ids.depth_shader);
        assert_eq!(
            backend.pipelines[1].graphics_state.write_mask,
            wgpu::ColorWrites::empty()
        );
    }

    #[test]
    fn incompatible_layout_falls_back_to_defaults() {
        let (mut cache, mut backend, ids) = setup(&SlotRendererSettings::opaque());
        let q = query(ShaderData::new(ids.foreign_shader, GraphicsStateId::INVALID));
        let entry = cache.get(&mut backend, &q).expect("pipeline");
        assert_eq!(backend.pipelines[0].shader, ids.opaque_shader);
        assert_eq!(entry.pipeline_layout, ids.layout);
    }

    #[test]
    fn inverse_winding_flips_front_face() {
        let (mut cache, mut backend, _) = setup(&SlotRendererSettings::opaque());
        let mut q = query(ShaderData::default());
        q.submesh_flags = SubmeshFlags::INVERSE_WINDING;
        q.render_hash = crate::flags::render_hash(
            q.material_type,
            q.material_flags,
            q.submesh_flags,
        );
        let flipped = cache.get(&mut backend, &q).expect("pipeline");
        assert!(flipped.front_face_flipped);
        assert_eq!(backend.pipelines[0].graphics_state.front_face, wgpu::FrontFace::Cw);

        // Mirrored camera cancels the submesh flip.
        q.flip_winding = true;
        let cancelled = cache.get(&mut backend, &q).expect("pipeline");
        assert!(!cancelled.front_face_flipped);
        assert_eq!(backend.pipeline_creations(), 2);
    }

    #[test]
    fn missing_defaults_yield_none() {
        let settings = SlotRendererSettings {
            slot: RenderSlotId(42),
            ..SlotRendererSettings::opaque()
        };
        let (mut cache, mut backend, _) = setup(&settings);
        assert!(cache.get(&mut backend, &query(ShaderData::default())).is_none());
        assert_eq!(backend.pipeline_creations(), 0);
    }

    #[test]
    fn factory_failures_are_not_cached() {
        let (mut cache, mut backend, _) = setup(&SlotRendererSettings::opaque());
        backend.fail_pipelines = true;
        let q = query(ShaderData::default());
        assert!(cache.get(&mut backend, &q).is_none());
        assert!(cache.is_empty());
        backend.fail_pipelines = false;
        assert!(cache.get(&mut backend, &q).is_some());
    }

    #[test]
    fn reconfiguration_clears_entries() {
        let (mut cache, mut backend, _) = setup(&SlotRendererSettings::opaque());
        let q = query(ShaderData::default());
        cache.get(&mut backend, &q);
        cache.set_default_shader_data();
        assert!(cache.is_empty());
        cache.get(&mut backend, &q);
        assert_eq!(backend.pipeline_creations(), 2);
    }

    #[test]
    fn specialization_reflects_flags() {
        let (mut cache, mut backend, _) = setup(&SlotRendererSettings::opaque());
        let mut q = query(ShaderData::default());
        q.lighting = LightingFlags::SHADOWS | LightingFlags::POINT_LIGHTS;
        q.post_process = true;
        cache.get(&mut backend, &q);
        let spec = &backend.pipelines[0].specialization;
        assert_eq!(spec[3].value, q.lighting.bits());
        assert_eq!(spec[5].value, 1);
    }
}
