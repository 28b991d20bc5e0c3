//! Draw-command encoding.
//!
//! [`DrawEncoder`] is the low-level command API the slot renderer records
//! into. [`CommandList`] implements it by storing [`RenderCommand`] values,
//! which a backend replays into its native pass afterwards.

use std::ops::Range;

use loom_core::{BindingSetHandle, BufferHandle, PipelineHandle};
use smallvec::SmallVec;

use crate::view::Viewport;

/// Dynamic offsets of one binding-set bind.
pub type DynamicOffsets = SmallVec<[u32; 4]>;

pub trait DrawEncoder {
    fn bind_pipeline(&mut self, pipeline: PipelineHandle);

    fn bind_binding_set(&mut self, index: u32, set: BindingSetHandle, dynamic_offsets: &[u32]);

    fn bind_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle, offset: u64);

    fn bind_index_buffer(&mut self, buffer: BufferHandle, offset: u64, format: wgpu::IndexFormat);

    fn set_viewport(&mut self, viewport: Viewport);

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>);

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>);

    fn draw_indirect(&mut self, buffer: BufferHandle, offset: u64);

    fn draw_indexed_indirect(&mut self, buffer: BufferHandle, offset: u64);
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderCommand {
    BindPipeline(PipelineHandle),
    BindBindingSet {
        index: u32,
        set: BindingSetHandle,
        dynamic_offsets: DynamicOffsets,
    },
    BindVertexBuffer {
        slot: u32,
        buffer: BufferHandle,
        offset: u64,
    },
    BindIndexBuffer {
        buffer: BufferHandle,
        offset: u64,
        format: wgpu::IndexFormat,
    },
    SetViewport(Viewport),
    Draw {
        vertices: Range<u32>,
        instances: Range<u32>,
    },
    DrawIndexed {
        indices: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
    },
    DrawIndirect {
        buffer: BufferHandle,
        offset: u64,
    },
    DrawIndexedIndirect {
        buffer: BufferHandle,
        offset: u64,
    },
}

impl RenderCommand {
    #[must_use]
    pub fn is_draw(&self) -> bool {
        matches!(
            self,
            Self::Draw { .. }
                | Self::DrawIndexed { .. }
                | Self::DrawIndirect { .. }
                | Self::DrawIndexedIndirect { .. }
        )
    }
}

/// Recorded command stream of one slot.
#[derive(Debug, Clone, Default)]
pub struct CommandList {
    commands: Vec<RenderCommand>,
}

impl CommandList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn commands(&self) -> &[RenderCommand] {
        &self.commands
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    #[must_use]
    pub fn draw_count(&self) -> usize {
        self.commands.iter().filter(|c| c.is_draw()).count()
    }

    /// Replays every command into another encoder.
    pub fn replay_into<E: DrawEncoder + ?Sized>(&self, encoder: &mut E) {
        for command in &self.commands {
            match command {
                RenderCommand::BindPipeline(p) => encoder.bind_pipeline(*p),
                RenderCommand::BindBindingSet {
                    index,
                    set,
                    dynamic_offsets,
                } => encoder.bind_binding_set(*index, *set, dynamic_offsets),
                RenderCommand::BindVertexBuffer {
                    slot,
                    buffer,
                    offset,
                } => encoder.bind_vertex_buffer(*slot, *buffer, *offset),
                RenderCommand::BindIndexBuffer {
                    buffer,
                    offset,
                    format,
                } => encoder.bind_index_buffer(*buffer, *offset, *format),
                RenderCommand::SetViewport(v) => encoder.set_viewport(*v),
                RenderCommand::Draw {
                    vertices,
                    instances,
                } => encoder.draw(vertices.clone(), instances.clone()),
                RenderCommand::DrawIndexed {
                    indices,
                    base_vertex,
                    instances,
                } => encoder.draw_indexed(indices.clone(), *base_vertex, instances.clone()),
                RenderCommand::DrawIndirect { buffer, offset } => {
                    encoder.draw_indirect(*buffer, *offset);
                }
                RenderCommand::DrawIndexedIndirect { buffer, offset } => {
                    encoder.draw_indexed_indirect(*buffer, *offset);
                }
            }
        }
    }
}

impl DrawEncoder for CommandList {
    fn bind_pipeline(&mut self, pipeline: PipelineHandle) {
        self.commands.push(RenderCommand::BindPipeline(pipeline));
    }

    fn bind_binding_set(&mut self, index: u32, set: BindingSetHandle, dynamic_offsets: &[u32]) {
        self.commands.push(RenderCommand::BindBindingSet {
            index,
            set,
            dynamic_offsets: SmallVec::from_slice(dynamic_offsets),
        });
    }

    fn bind_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle, offset: u64) {
        self.commands.push(RenderCommand::BindVertexBuffer {
            slot,
            buffer,
            offset,
        });
    }

    fn bind_index_buffer(&mut self, buffer: BufferHandle, offset: u64, format: wgpu::IndexFormat) {
        self.commands.push(RenderCommand::BindIndexBuffer {
            buffer,
            offset,
            format,
        });
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.commands.push(RenderCommand::SetViewport(viewport));
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        self.commands.push(RenderCommand::Draw {
            vertices,
            instances,
        });
    }

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
        self.commands.push(RenderCommand::DrawIndexed {
            indices,
            base_vertex,
            instances,
        });
    }

    fn draw_indirect(&mut self, buffer: BufferHandle, offset: u64) {
        self.commands
            .push(RenderCommand::DrawIndirect { buffer, offset });
    }

    fn draw_indexed_indirect(&mut self, buffer: BufferHandle, offset: u64) {
        self.commands
            .push(RenderCommand::DrawIndexedIndirect { buffer, offset });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_in_order_and_counts_draws() {
        let mut list = CommandList::new();
        list.bind_pipeline(PipelineHandle(1));
        list.bind_binding_set(2, BindingSetHandle(0), &[256, 0, 512]);
        list.draw(0..3, 0..1);
        list.draw_indirect(BufferHandle(4), 16);
        assert_eq!(list.len(), 4);
        assert_eq!(list.draw_count(), 2);
        assert_eq!(
            list.commands()[1],
            RenderCommand::BindBindingSet {
                index: 2,
                set: BindingSetHandle(0),
                dynamic_offsets: smallvec::smallvec![256, 0, 512],
            }
        );
    }

    #[test]
    fn replay_reproduces_the_stream() {
        let mut list = CommandList::new();
        list.set_viewport(Viewport::new(0.0, 0.0, 64.0, 64.0));
        list.bind_index_buffer(BufferHandle(2), 0, wgpu::IndexFormat::Uint16);
        list.draw_indexed(0..6, 0, 0..1);
        let mut copy = CommandList::new();
        list.replay_into(&mut copy);
        assert_eq!(copy.commands(), list.commands());
    }
}
