use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

/// Per-object transform record submitted by producers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshData {
    pub world: Mat4,
    /// Previous frame's world matrix, used for motion vectors.
    pub prev_world: Mat4,
    /// Opaque user id (picking, debugging).
    pub id: u64,
    pub custom: Vec4,
}

impl Default for MeshData {
    fn default() -> Self {
        Self {
            world: Mat4::IDENTITY,
            prev_world: Mat4::IDENTITY,
            id: 0,
            custom: Vec4::ZERO,
        }
    }
}

impl MeshData {
    #[must_use]
    pub fn new(world: Mat4) -> Self {
        Self {
            world,
            prev_world: world,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_prev_world(mut self, prev_world: Mat4) -> Self {
        self.prev_world = prev_world;
        self
    }

    #[must_use]
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }

    /// Packs the record into its GPU block.
    #[must_use]
    pub fn uniforms(&self) -> MeshUniforms {
        MeshUniforms {
            world: self.world,
            normal_world: normal_matrix(&self.world),
            prev_world: self.prev_world,
            id: [self.id as u32, (self.id >> 32) as u32, 0, 0],
            custom: self.custom,
        }
    }
}

/// Inverse-transpose of `world`; identity for singular matrices.
fn normal_matrix(world: &Mat4) -> Mat4 {
    if world.determinant().abs() <= f32::EPSILON {
        return Mat4::IDENTITY;
    }
    world.inverse().transpose()
}

/// GPU layout of a mesh record. Addressed with a dynamic offset of
/// `mesh_index * MESH_STRIDE`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MeshUniforms {
    pub world: Mat4,
    pub normal_world: Mat4,
    pub prev_world: Mat4,
    /// `[id_lo, id_hi, 0, 0]`
    pub id: [u32; 4],
    pub custom: Vec4,
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn uniforms_split_the_id() {
        let mesh = MeshData::default().with_id(0x0000_0001_0000_0002);
        assert_eq!(mesh.uniforms().id, [2, 1, 0, 0]);
    }

    #[test]
    fn normal_matrix_undoes_non_uniform_scale() {
        let world = Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        let n = MeshData::new(world).uniforms().normal_world;
        assert!((n.x_axis.x - 0.5).abs() < 1e-6);
        assert!((n.y_axis.y - 1.0).abs() < 1e-6);
    }

    #[test]
    fn singular_world_falls_back_to_identity_normal() {
        let n = MeshData::new(Mat4::ZERO).uniforms().normal_world;
        assert_eq!(n, Mat4::IDENTITY);
    }

    #[test]
    fn block_size() {
        assert_eq!(std::mem::size_of::<MeshUniforms>(), 224);
    }
}
