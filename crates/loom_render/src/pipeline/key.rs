//! Composite pipeline cache key.
//!
//! The key folds every input that can change the pipeline object into one
//! `u64`. The render hash already carries the material type and both flag
//! sets, so material and submesh state never need to be hashed separately.

use loom_core::hash_combine;

use crate::flags::{
    CameraShaderFlags, LightingFlags, MaterialType, RenderMaterialFlags, SubmeshFlags,
};
use crate::provider::{ShaderData, SpecializationConstant};

/// `shader << 32 | graphics_state`
#[inline]
#[must_use]
pub const fn shader_state_word(shader: &ShaderData) -> u64 {
    ((shader.shader.0 as u64) << 32) | shader.graphics_state.0 as u64
}

/// Folds the pipeline-relevant inputs of a draw into the cache key.
#[must_use]
pub const fn compose_pso_hash(
    shader_state: u64,
    render_hash: u32,
    lighting: LightingFlags,
    camera: CameraShaderFlags,
    post_process: bool,
    flip_winding: bool,
) -> u64 {
    let context = (post_process as u64) | ((flip_winding as u64) << 1);
    let mut hash = hash_combine(0, shader_state);
    hash = hash_combine(hash, render_hash as u64);
    hash = hash_combine(hash, lighting.bits() as u64);
    hash = hash_combine(hash, camera.bits() as u64);
    hash_combine(hash, context)
}

/// Everything the cache needs to resolve one draw's pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PsoQuery {
    /// Shader identity recorded in the slot bucket.
    pub shader: ShaderData,
    pub render_hash: u32,
    pub material_type: MaterialType,
    pub material_flags: RenderMaterialFlags,
    pub submesh_flags: SubmeshFlags,
    pub lighting: LightingFlags,
    pub camera: CameraShaderFlags,
    pub post_process: bool,
    /// Camera/scene mirroring; XORed with the submesh's inverse winding.
    pub flip_winding: bool,
}

impl PsoQuery {
    #[must_use]
    pub const fn key(&self) -> u64 {
        compose_pso_hash(
            shader_state_word(&self.shader),
            self.render_hash,
            self.lighting,
            self.camera,
            self.post_process,
            self.flip_winding,
        )
    }

    /// Winding actually needed by the draw.
    #[must_use]
    pub const fn inverted_winding(&self) -> bool {
        self.flip_winding ^ self.submesh_flags.contains(SubmeshFlags::INVERSE_WINDING)
    }

    /// Specialization constants derived from the draw's flags.
    #[must_use]
    pub fn specialization(&self) -> [SpecializationConstant; 6] {
        [
            SpecializationConstant {
                id: 0,
                value: self.submesh_flags.bits(),
            },
            SpecializationConstant {
                id: 1,
                value: self.material_flags.bits(),
            },
            SpecializationConstant {
                id: 2,
                value: self.material_type as u32,
            },
            SpecializationConstant {
                id: 3,
                value: self.lighting.bits(),
            },
            SpecializationConstant {
                id: 4,
                value: self.camera.bits(),
            },
            SpecializationConstant {
                id: 5,
                value: u32::from(self.post_process),
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use loom_core::{GraphicsStateId, ShaderId};

    use super::*;

    fn query() -> PsoQuery {
        PsoQuery {
            shader: ShaderData::new(ShaderId(3), GraphicsStateId(1)),
            render_hash: 0x55,
            material_type: MaterialType::MetallicRoughness,
            material_flags: RenderMaterialFlags::empty(),
            submesh_flags: SubmeshFlags::empty(),
            lighting: LightingFlags::SHADOWS,
            camera: CameraShaderFlags::empty(),
            post_process: false,
            flip_winding: false,
        }
    }

    #[test]
    fn every_component_changes_the_hash() {
        let base = query().key();
        let variants = [
            PsoQuery {
                shader: ShaderData::new(ShaderId(4), GraphicsStateId(1)),
                ..query()
            },
            PsoQuery {
                shader: ShaderData::new(ShaderId(3), GraphicsStateId(2)),
                ..query()
            },
            PsoQuery {
                render_hash: 0x56,
                ..query()
            },
            PsoQuery {
                lighting: LightingFlags::empty(),
                ..query()
            },
            PsoQuery {
                camera: CameraShaderFlags::FOG,
                ..query()
            },
            PsoQuery {
                post_process: true,
                ..query()
            },
            PsoQuery {
                flip_winding: true,
                ..query()
            },
        ];
        for v in variants {
            assert_ne!(v.key(), base, "{v:?}");
        }
    }

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(query().key(), query().key());
    }

    #[test]
    fn winding_is_xor_of_context_and_submesh() {
        let mut q = query();
        assert!(!q.inverted_winding());
        q.submesh_flags = SubmeshFlags::INVERSE_WINDING;
        assert!(q.inverted_winding());
        q.flip_winding = true;
        assert!(!q.inverted_winding());
    }

    #[test]
    fn shader_word_packs_both_ids() {
        let w = shader_state_word(&ShaderData::new(ShaderId(2), GraphicsStateId(5)));
        assert_eq!(w, (2 << 32) | 5);
    }
}
