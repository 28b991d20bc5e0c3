//! Backend implementations of the collaborator traits.
//!
//! [`WgpuBackend`] creates real GPU objects through `wgpu`. Draws are recorded
//! into a [`CommandList`](crate::command::CommandList) by the slot renderer
//! and replayed into a `wgpu::RenderPass` with [`WgpuBackend::replay`].

mod gpu;

pub use gpu::{VertexBufferDesc, WgpuBackend, WgpuPassEncoder, binding_type};
