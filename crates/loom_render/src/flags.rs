//! Material, submesh and frame-level flag sets, and the render hash.
//!
//! The render hash packs the material type and both flag sets into one `u32`
//! that is computed once per submission and reused for sort keys and the
//! pipeline cache key.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Rendering behaviour requested by a material.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct RenderMaterialFlags: u32 {
        const SHADOW_RECEIVER         = 1 << 0;
        const SHADOW_CASTER           = 1 << 1;
        const NORMAL_MAP              = 1 << 2;
        const PUNCTUAL_LIGHT_RECEIVER = 1 << 3;
        const INDIRECT_LIGHT_RECEIVER = 1 << 4;
        const BASIC                   = 1 << 5;
        const COMPLEX                 = 1 << 6;
        const OPAQUE                  = 1 << 7;
        const GPU_INSTANCING          = 1 << 8;
        const CUSTOM_DATA             = 1 << 9;
    }
}

bitflags! {
    /// Discard-related material bits, tested against a slot's discard mask.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ExtraMaterialFlags: u32 {
        /// Never rendered by slots that discard this bit.
        const DISCARD      = 1 << 0;
        /// Rendered only by transmission-aware slots.
        const TRANSMISSION = 1 << 1;
        /// Excluded from depth-only slots.
        const NO_DEPTH     = 1 << 2;
    }
}

bitflags! {
    /// Per-submesh vertex/geometry features.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct SubmeshFlags: u32 {
        const SKIN            = 1 << 0;
        const INVERSE_WINDING = 1 << 1;
        const VELOCITY        = 1 << 2;
        const SECOND_TEXCOORD = 1 << 3;
        const TANGENTS        = 1 << 4;
        const VERTEX_COLORS   = 1 << 5;
        const BLEND_SHAPES    = 1 << 6;
    }
}

bitflags! {
    /// Scene lighting features active for the frame.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct LightingFlags: u32 {
        const SHADOWS            = 1 << 0;
        const SOFT_SHADOWS       = 1 << 1;
        const DIRECTIONAL_LIGHTS = 1 << 2;
        const POINT_LIGHTS       = 1 << 3;
        const SPOT_LIGHTS        = 1 << 4;
        const INDIRECT_LIGHTING  = 1 << 5;
        const CLUSTERED          = 1 << 6;
    }
}

bitflags! {
    /// Camera features that change shader permutations.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct CameraShaderFlags: u32 {
        const MULTIVIEW = 1 << 0;
        const FOG       = 1 << 1;
        const HISTORY   = 1 << 2;
        const JITTER    = 1 << 3;
    }
}

/// Shading model of a material.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum MaterialType {
    #[default]
    MetallicRoughness = 0,
    SpecularGlossiness = 1,
    Unlit = 2,
    UnlitShadowAlpha = 3,
    Custom = 4,
    CustomComplex = 5,
}

const MATERIAL_FLAG_BITS: u32 = 20;
const SUBMESH_FLAG_BITS: u32 = 8;
const MATERIAL_TYPE_SHIFT: u32 = MATERIAL_FLAG_BITS + SUBMESH_FLAG_BITS;

const _: () = assert!(RenderMaterialFlags::all().bits() < (1 << MATERIAL_FLAG_BITS));
const _: () = assert!(SubmeshFlags::all().bits() < (1 << SUBMESH_FLAG_BITS));
const _: () = assert!((MaterialType::CustomComplex as u32) < (1 << (32 - MATERIAL_TYPE_SHIFT)));

/// Packs material type, submesh flags and material flags into one word:
/// `type:4 | submesh:8 | material:20`.
#[inline]
#[must_use]
pub const fn render_hash(
    material_type: MaterialType,
    material_flags: RenderMaterialFlags,
    submesh_flags: SubmeshFlags,
) -> u32 {
    ((material_type as u32) << MATERIAL_TYPE_SHIFT)
        | (submesh_flags.bits() << MATERIAL_FLAG_BITS)
        | material_flags.bits()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_hash_separates_fields() {
        let a = render_hash(
            MaterialType::Unlit,
            RenderMaterialFlags::empty(),
            SubmeshFlags::empty(),
        );
        let b = render_hash(
            MaterialType::MetallicRoughness,
            RenderMaterialFlags::empty(),
            SubmeshFlags::SKIN,
        );
        let c = render_hash(
            MaterialType::MetallicRoughness,
            RenderMaterialFlags::SHADOW_RECEIVER,
            SubmeshFlags::empty(),
        );
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_ne!(a, c);
    }

    #[test]
    fn render_hash_round_trips_material_type() {
        let h = render_hash(
            MaterialType::CustomComplex,
            RenderMaterialFlags::all(),
            SubmeshFlags::all(),
        );
        assert_eq!(h >> MATERIAL_TYPE_SHIFT, MaterialType::CustomComplex as u32);
        assert_eq!(h & ((1 << MATERIAL_FLAG_BITS) - 1), RenderMaterialFlags::all().bits());
    }
}
