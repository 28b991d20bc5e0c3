//! Encoder wrapper that filters redundant state changes.
//!
//! Tracks the bound pipeline, binding sets (with their dynamic offsets),
//! vertex buffers and index buffer, and forwards a bind only when it differs
//! from what is already bound.

use std::ops::Range;

use loom_core::{BindingSetHandle, BufferHandle, PipelineHandle};

use crate::command::DrawEncoder;
use crate::view::Viewport;

const MAX_BINDING_SETS: usize = 4;
const MAX_VERTEX_BUFFERS: usize = 8;
const MAX_DYNAMIC_OFFSETS: usize = 8;

// Fixed array instead of a Vec to keep the hot path allocation free.
#[derive(Clone, Copy, PartialEq)]
struct BindingSetState {
    set: BindingSetHandle,
    offsets: [u32; MAX_DYNAMIC_OFFSETS],
    offset_count: u8,
}

impl BindingSetState {
    fn matches(&self, set: BindingSetHandle, offsets: &[u32]) -> bool {
        self.set == set
            && self.offset_count as usize == offsets.len()
            && &self.offsets[..offsets.len()] == offsets
    }
}

/// Counters of forwarded and filtered binds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackedStats {
    pub pipeline_binds: u32,
    pub binding_set_binds: u32,
    pub skipped_binds: u32,
}

pub struct TrackedEncoder<'a, E: DrawEncoder + ?Sized> {
    inner: &'a mut E,
    pipeline: Option<PipelineHandle>,
    binding_sets: [Option<BindingSetState>; MAX_BINDING_SETS],
    vertex_buffers: [Option<(BufferHandle, u64)>; MAX_VERTEX_BUFFERS],
    index_buffer: Option<(BufferHandle, u64, wgpu::IndexFormat)>,
    stats: TrackedStats,
}

impl<'a, E: DrawEncoder + ?Sized> TrackedEncoder<'a, E> {
    #[must_use]
    pub fn new(inner: &'a mut E) -> Self {
        Self {
            inner,
            pipeline: None,
            binding_sets: [None; MAX_BINDING_SETS],
            vertex_buffers: [None; MAX_VERTEX_BUFFERS],
            index_buffer: None,
            stats: TrackedStats::default(),
        }
    }

    #[must_use]
    pub fn stats(&self) -> TrackedStats {
        self.stats
    }

    #[must_use]
    pub fn current_pipeline(&self) -> Option<PipelineHandle> {
        self.pipeline
    }
}

impl<E: DrawEncoder + ?Sized> DrawEncoder for TrackedEncoder<'_, E> {
    fn bind_pipeline(&mut self, pipeline: PipelineHandle) {
        if self.pipeline == Some(pipeline) {
            self.stats.skipped_binds += 1;
            return;
        }
        self.inner.bind_pipeline(pipeline);
        self.pipeline = Some(pipeline);
        self.stats.pipeline_binds += 1;
    }

    fn bind_binding_set(&mut self, index: u32, set: BindingSetHandle, dynamic_offsets: &[u32]) {
        let slot = index as usize;
        let cached = self.binding_sets.get(slot).copied().flatten();
        if cached.is_some_and(|state| state.matches(set, dynamic_offsets)) {
            self.stats.skipped_binds += 1;
            return;
        }

        self.inner.bind_binding_set(index, set, dynamic_offsets);
        self.stats.binding_set_binds += 1;

        if let Some(entry) = self.binding_sets.get_mut(slot) {
            let mut state = BindingSetState {
                set,
                offsets: [0; MAX_DYNAMIC_OFFSETS],
                offset_count: dynamic_offsets.len() as u8,
            };
            if dynamic_offsets.len() <= MAX_DYNAMIC_OFFSETS {
                state.offsets[..dynamic_offsets.len()].copy_from_slice(dynamic_offsets);
                *entry = Some(state);
            } else {
                *entry = None;
            }
        }
    }

    fn bind_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle, offset: u64) {
        let index = slot as usize;
        if self.vertex_buffers.get(index).copied().flatten() == Some((buffer, offset)) {
            self.stats.skipped_binds += 1;
            return;
        }
        self.inner.bind_vertex_buffer(slot, buffer, offset);
        if let Some(entry) = self.vertex_buffers.get_mut(index) {
            *entry = Some((buffer, offset));
        }
    }

    fn bind_index_buffer(&mut self, buffer: BufferHandle, offset: u64, format: wgpu::IndexFormat) {
        if self.index_buffer == Some((buffer, offset, format)) {
            self.stats.skipped_binds += 1;
            return;
        }
        self.inner.bind_index_buffer(buffer, offset, format);
        self.index_buffer = Some((buffer, offset, format));
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.inner.set_viewport(viewport);
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        self.inner.draw(vertices, instances);
    }

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
        self.inner.draw_indexed(indices, base_vertex, instances);
    }

    fn draw_indirect(&mut self, buffer: BufferHandle, offset: u64) {
        self.inner.draw_indirect(buffer, offset);
    }

    fn draw_indexed_indirect(&mut self, buffer: BufferHandle, offset: u64) {
        self.inner.draw_indexed_indirect(buffer, offset);
    }
}
