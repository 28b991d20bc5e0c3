//! Loom Render
//!
//! Per-frame submesh batching for render slots:
//!
//! - [`store`]: the [`MaterialDataStore`] producers fill each frame
//! - [`select`]: layer-mask, discard and frustum filtering plus sorting
//! - [`pipeline`]: composite-key pipeline cache with slot-aware resolution
//! - [`pool`]: per-slot GPU pool sizing and binding-set ownership
//! - [`renderer`]: the [`SlotRenderer`] that ties them together
//! - [`command`]: the draw encoder abstraction and command recording
//! - [`backend`]: the `wgpu` implementation of the collaborator traits
//!
//! Collaborators (shader registry, pipeline factory, resource and binding
//! providers) are the traits in [`provider`].

pub mod backend;
pub mod command;
pub mod flags;
pub mod pipeline;
pub mod pool;
pub mod provider;
pub mod registry;
pub mod renderer;
pub mod select;
pub mod settings;
pub mod shadow;
pub mod slot;
pub mod store;
pub mod view;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use backend::WgpuBackend;
pub use command::{CommandList, DrawEncoder, RenderCommand};
pub use flags::{
    CameraShaderFlags, ExtraMaterialFlags, LightingFlags, MaterialType, RenderMaterialFlags,
    SubmeshFlags, render_hash,
};
pub use pipeline::{PipelineCache, PsoEntry, PsoQuery};
pub use pool::{PoolCapacity, PoolSizeChange, ResourcePoolSizer, SlotResources};
pub use provider::{
    BindingProvider, PipelineFactory, RenderBackend, ResourceProvider, ShaderData,
    ShaderRegistry,
};
pub use registry::ShaderLibrary;
pub use renderer::{SlotFrameStats, SlotRenderer, TrackedEncoder};
pub use select::{SlotQuery, SlotSubmeshSelector, SortedEntry};
pub use settings::{SlotRendererSettings, StoreSettings};
pub use shadow::ShadowAtlasLayout;
pub use slot::{CullType, RenderSlotId, RenderSortInfo, SortType};
pub use store::{MaterialDataStore, ObjectCounts};
pub use view::{CameraView, FrameInputs, SceneResources, Viewport};
