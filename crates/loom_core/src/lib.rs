//! Loom Core
//!
//! Foundational types shared by the render-slot engine:
//!
//! - [`errors`]: the [`LoomError`] type and [`Result`] alias
//! - [`handle`]: typed handles for shaders, pipelines, buffers and binding sets
//! - [`hash`]: the named hash-combine function used by cache keys
//! - [`math`]: bounding spheres and view frusta for culling
//! - [`packing`]: half-float packing of material factors and UV transforms
//! - [`diagnostics`]: log-once bookkeeping

pub mod diagnostics;
pub mod errors;
pub mod handle;
pub mod hash;
pub mod math;
pub mod packing;

#[doc(hidden)]
pub use log;

pub use diagnostics::LogOnce;
pub use errors::{LoomError, Result};
pub use handle::{
    BindingSetHandle, BufferHandle, GraphicsStateId, ImageHandle, PipelineHandle,
    PipelineLayoutId, SamplerHandle, ShaderId, VertexInputId,
};
pub use hash::{fx_hash_key, hash_combine};
pub use math::{BoundingSphere, Frustum};
pub use packing::{
    IDENTITY_PACKED_TRANSFORM, PackedFactor, PackedTransform, TextureTransform, pack_half2,
    pack_half4, pack_texture_transform, unpack_half2, unpack_half4,
};
