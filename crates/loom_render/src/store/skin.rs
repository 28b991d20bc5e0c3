//! Joint-matrix arena.
//!
//! Skin matrices are copied into large blocks and addressed by
//! [`JointRange`] indices. When a frame spills into more than one block, the
//! next reset replaces them with a single block twice their combined size, so
//! steady-state frames use exactly one allocation.

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

/// Maximum joints per skin. Larger skins are truncated.
pub const MAX_JOINT_COUNT: usize = 64;

/// Skins that fit in the first block.
const INITIAL_BLOCK_SKINS: usize = 16;

/// Matrices of one allocation inside the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct JointRange {
    pub block: u32,
    pub offset: u32,
    pub len: u32,
}

/// One skin of the frame: current and previous joint palettes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SkinJointBlock {
    pub current: JointRange,
    pub previous: JointRange,
}

impl SkinJointBlock {
    #[must_use]
    pub const fn joint_count(&self) -> u32 {
        self.current.len
    }
}

#[derive(Debug)]
struct Block {
    matrices: Vec<Mat4>,
    capacity: usize,
}

impl Block {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            matrices: Vec::with_capacity(capacity),
            capacity,
        }
    }

    fn remaining(&self) -> usize {
        self.capacity - self.matrices.len()
    }
}

#[derive(Debug)]
pub struct JointMatrixArena {
    blocks: Vec<Block>,
}

impl Default for JointMatrixArena {
    fn default() -> Self {
        Self::new()
    }
}

impl JointMatrixArena {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_BLOCK_SKINS * MAX_JOINT_COUNT * 2)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            blocks: vec![Block::with_capacity(capacity.max(MAX_JOINT_COUNT))],
        }
    }

    /// Copies `matrices` into the arena.
    pub fn allocate(&mut self, matrices: &[Mat4]) -> JointRange {
        let needs_block = self
            .blocks
            .last()
            .is_none_or(|b| b.remaining() < matrices.len());
        if needs_block {
            let size = self.block_size().max(matrices.len());
            log::debug!("Joint arena spilling into block {} ({size} matrices)", self.blocks.len());
            self.blocks.push(Block::with_capacity(size));
        }

        let block_index = self.blocks.len() - 1;
        let block = &mut self.blocks[block_index];
        let offset = block.matrices.len();
        block.matrices.extend_from_slice(matrices);
        JointRange {
            block: block_index as u32,
            offset: offset as u32,
            len: matrices.len() as u32,
        }
    }

    /// Matrices of `range`; empty for ranges from before the last reset.
    #[must_use]
    pub fn get(&self, range: JointRange) -> &[Mat4] {
        let start = range.offset as usize;
        let end = start + range.len as usize;
        self.blocks
            .get(range.block as usize)
            .and_then(|b| b.matrices.get(start..end))
            .unwrap_or(&[])
    }

    /// Frees all allocations, coalescing multiple blocks into one.
    pub fn reset(&mut self) {
        if self.blocks.len() > 1 {
            let total: usize = self.blocks.iter().map(|b| b.capacity).sum();
            log::info!(
                "Joint arena coalescing {} blocks into one of {} matrices",
                self.blocks.len(),
                total * 2
            );
            self.blocks = vec![Block::with_capacity(total * 2)];
        } else if let Some(block) = self.blocks.first_mut() {
            block.matrices.clear();
        }
    }

    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Combined capacity of all blocks, in matrices.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.blocks.iter().map(|b| b.capacity).sum()
    }

    fn block_size(&self) -> usize {
        self.blocks
            .first()
            .map_or(INITIAL_BLOCK_SKINS * MAX_JOINT_COUNT, |b| b.capacity)
    }
}

/// GPU layout of one skin: current then previous palettes, each padded to
/// [`MAX_JOINT_COUNT`].
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct SkinUniforms {
    pub current: [Mat4; MAX_JOINT_COUNT],
    pub previous: [Mat4; MAX_JOINT_COUNT],
}

impl Default for SkinUniforms {
    fn default() -> Self {
        Self {
            current: [Mat4::IDENTITY; MAX_JOINT_COUNT],
            previous: [Mat4::IDENTITY; MAX_JOINT_COUNT],
        }
    }
}

impl SkinUniforms {
    #[must_use]
    pub fn from_palettes(current: &[Mat4], previous: &[Mat4]) -> Self {
        let mut out = Self::default();
        let n = current.len().min(MAX_JOINT_COUNT);
        out.current[..n].copy_from_slice(&current[..n]);
        let p = previous.len().min(MAX_JOINT_COUNT);
        out.previous[..p].copy_from_slice(&previous[..p]);
        out
    }
}
