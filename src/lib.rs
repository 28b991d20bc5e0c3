//! Loom
//!
//! Per-frame submesh batching for render slots. Producers fill a
//! [`MaterialDataStore`] every frame; one [`SlotRenderer`] per slot selects,
//! sorts, resolves pipelines and records draws for it.
//!
//! This crate only re-exports [`loom_core`] and [`loom_render`].

pub use glam;
pub use loom_core;
pub use loom_render;

pub use loom_core::{
    BindingSetHandle, BoundingSphere, BufferHandle, Frustum, GraphicsStateId, ImageHandle,
    LoomError, PipelineHandle, PipelineLayoutId, Result, SamplerHandle, ShaderId,
};
pub use loom_render::{
    CameraView, CommandList, CullType, DrawEncoder, FrameInputs, MaterialDataStore,
    PipelineCache, RenderSlotId, RenderSortInfo, ResourcePoolSizer, ShaderLibrary,
    ShadowAtlasLayout, SlotQuery, SlotRenderer, SlotRendererSettings, SlotSubmeshSelector,
    SortType, StoreSettings, Viewport, WgpuBackend,
};
pub use loom_render::store::{MaterialData, MaterialInput, MeshData, SubmeshInput};
