//! Material records.
//!
//! Producers describe a material with three parts: shader-visible factors and
//! UV transforms ([`MaterialUniformsInput`]), image/sampler handles per texture
//! slot ([`MaterialHandles`]) and routing/state data ([`MaterialData`]). The
//! factors are packed into a [`MaterialUniforms`] block as soon as the material
//! is added.

use std::ops::{Index, IndexMut};

use bytemuck::{Pod, Zeroable};
use glam::Vec4;
use loom_core::{
    ImageHandle, PackedFactor, PackedTransform, SamplerHandle, TextureTransform, pack_half4,
    pack_texture_transform,
};
use serde::{Deserialize, Serialize};

use crate::flags::{ExtraMaterialFlags, MaterialType, RenderMaterialFlags};
use crate::provider::ShaderData;
use crate::slot::{RenderSlotId, RenderSortInfo};

// ─── Texture slots ────────────────────────────────────────────────────────────

/// Named texture slot of the material model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MaterialTextureSlot {
    BaseColor = 0,
    Normal,
    /// Metallic-roughness or specular-glossiness map, depending on the type.
    Material,
    Emissive,
    AmbientOcclusion,
    Clearcoat,
    ClearcoatRoughness,
    ClearcoatNormal,
    Sheen,
    Transmission,
    Specular,
}

impl MaterialTextureSlot {
    pub const COUNT: usize = 11;

    pub const ALL: [Self; Self::COUNT] = [
        Self::BaseColor,
        Self::Normal,
        Self::Material,
        Self::Emissive,
        Self::AmbientOcclusion,
        Self::Clearcoat,
        Self::ClearcoatRoughness,
        Self::ClearcoatNormal,
        Self::Sheen,
        Self::Transmission,
        Self::Specular,
    ];

    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Fixed array with one `T` per [`MaterialTextureSlot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureSlots<T>(pub [T; MaterialTextureSlot::COUNT]);

impl<T> TextureSlots<T> {
    pub fn from_fn(mut f: impl FnMut(MaterialTextureSlot) -> T) -> Self {
        Self(std::array::from_fn(|i| f(MaterialTextureSlot::ALL[i])))
    }

    pub fn iter(&self) -> impl Iterator<Item = (MaterialTextureSlot, &T)> {
        MaterialTextureSlot::ALL.iter().copied().zip(self.0.iter())
    }
}

impl<T: Copy> TextureSlots<T> {
    #[must_use]
    pub const fn splat(value: T) -> Self {
        Self([value; MaterialTextureSlot::COUNT])
    }
}

impl<T> Index<MaterialTextureSlot> for TextureSlots<T> {
    type Output = T;

    fn index(&self, slot: MaterialTextureSlot) -> &T {
        &self.0[slot.index()]
    }
}

impl<T> IndexMut<MaterialTextureSlot> for TextureSlots<T> {
    fn index_mut(&mut self, slot: MaterialTextureSlot) -> &mut T {
        &mut self.0[slot.index()]
    }
}

// ─── Inputs ───────────────────────────────────────────────────────────────────

/// Shader-visible material parameters before packing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialUniformsInput {
    /// Factor per texture slot (base color, emissive, ...).
    pub factors: TextureSlots<Vec4>,
    /// UV transform per texture slot; `None` is the identity.
    pub transforms: TextureSlots<Option<TextureTransform>>,
    pub alpha_cutoff: f32,
    pub ior: f32,
    pub emissive_strength: f32,
}

impl Default for MaterialUniformsInput {
    fn default() -> Self {
        let mut factors = TextureSlots::splat(Vec4::ONE);
        factors[MaterialTextureSlot::Emissive] = Vec4::ZERO;
        Self {
            factors,
            transforms: TextureSlots::splat(None),
            alpha_cutoff: 0.5,
            ior: 1.5,
            emissive_strength: 1.0,
        }
    }
}

/// Image and sampler bound at each texture slot. Invalid handles are replaced
/// by the provider's default image/sampler at bind time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterialHandles {
    pub images: TextureSlots<ImageHandle>,
    pub samplers: TextureSlots<SamplerHandle>,
}

impl Default for MaterialHandles {
    fn default() -> Self {
        Self {
            images: TextureSlots::splat(ImageHandle::INVALID),
            samplers: TextureSlots::splat(SamplerHandle::INVALID),
        }
    }
}

impl MaterialHandles {
    #[must_use]
    pub fn with_texture(
        mut self,
        slot: MaterialTextureSlot,
        image: ImageHandle,
        sampler: SamplerHandle,
    ) -> Self {
        self.images[slot] = image;
        self.samplers[slot] = sampler;
        self
    }
}

/// Routing and state description of a material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MaterialData {
    pub material_type: MaterialType,
    pub flags: RenderMaterialFlags,
    pub extra_flags: ExtraMaterialFlags,
    /// Overrides every other slot resolution rule when set.
    pub custom_render_slot: Option<RenderSlotId>,
    pub custom_shader: ShaderData,
    pub render_sort: RenderSortInfo,
}

/// Everything needed to add one material.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaterialInput<'a> {
    pub uniforms: MaterialUniformsInput,
    pub handles: MaterialHandles,
    pub data: MaterialData,
    /// Free-form bytes exposed to custom shaders. At most
    /// [`MAX_CUSTOM_DATA_SIZE`](super::MAX_CUSTOM_DATA_SIZE) bytes are kept.
    pub custom_bytes: &'a [u8],
}

// ─── Stored records ───────────────────────────────────────────────────────────

/// Location of a material's custom bytes inside the shared byte buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CustomDataRange {
    pub offset: u32,
    pub size: u32,
}

impl CustomDataRange {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }
}

/// A material as stored for the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterialRecord {
    pub data: MaterialData,
    pub handles: MaterialHandles,
    pub custom_data: CustomDataRange,
    /// Attached via `add_material_custom_resources`.
    pub custom_resource_index: Option<u32>,
}

/// GPU layout of a material, every factor and transform element an `f16`.
/// Addressed with a dynamic offset of `material_index * MATERIAL_STRIDE`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MaterialUniforms {
    pub factors: [PackedFactor; MaterialTextureSlot::COUNT],
    pub transforms: [PackedTransform; MaterialTextureSlot::COUNT],
    /// `(alpha_cutoff, ior, emissive_strength, 0)`
    pub params: [f32; 4],
    /// `(material flags, extra flags, custom data offset, custom data size)`
    pub ids: [u32; 4],
}

impl MaterialUniforms {
    #[must_use]
    pub fn pack(input: &MaterialUniformsInput, data: &MaterialData, custom: CustomDataRange) -> Self {
        Self {
            factors: input.factors.0.map(pack_half4),
            transforms: std::array::from_fn(|i| pack_texture_transform(input.transforms.0[i].as_ref())),
            params: [input.alpha_cutoff, input.ior, input.emissive_strength, 0.0],
            ids: [
                data.flags.bits(),
                data.extra_flags.bits(),
                custom.offset,
                custom.size,
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;
    use loom_core::{IDENTITY_PACKED_TRANSFORM, unpack_half4};

    #[test]
    fn texture_slots_index_by_name() {
        let mut slots = TextureSlots::splat(0u32);
        slots[MaterialTextureSlot::Sheen] = 7;
        assert_eq!(slots.0[8], 7);
        assert_eq!(slots.iter().filter(|(_, v)| **v == 7).count(), 1);
    }

    #[test]
    fn pack_uses_identity_for_missing_transforms() {
        let mut input = MaterialUniformsInput::default();
        input.transforms[MaterialTextureSlot::Normal] = Some(TextureTransform {
            scale: Vec2::splat(2.0),
            ..TextureTransform::IDENTITY
        });
        let packed = MaterialUniforms::pack(&input, &MaterialData::default(), CustomDataRange::default());
        assert_eq!(packed.transforms[MaterialTextureSlot::BaseColor.index()], IDENTITY_PACKED_TRANSFORM);
        assert_ne!(packed.transforms[MaterialTextureSlot::Normal.index()], IDENTITY_PACKED_TRANSFORM);
    }

    #[test]
    fn factors_are_packed_as_halves() {
        let mut input = MaterialUniformsInput::default();
        input.factors[MaterialTextureSlot::BaseColor] = Vec4::new(0.5, 0.25, 1.0, 0.75);
        input.factors[MaterialTextureSlot::Emissive] = Vec4::new(2.0, -1.0, 0.0, 1.0);
        let packed = MaterialUniforms::pack(&input, &MaterialData::default(), CustomDataRange::default());

        for (slot, factor) in input.factors.iter() {
            assert_eq!(unpack_half4(packed.factors[slot.index()]), *factor, "{slot:?}");
        }
        assert_eq!(size_of::<PackedFactor>(), 8);
    }

    #[test]
    fn pack_records_flags_and_custom_range() {
        let data = MaterialData {
            flags: RenderMaterialFlags::SHADOW_CASTER,
            extra_flags: ExtraMaterialFlags::DISCARD,
            ..MaterialData::default()
        };
        let packed = MaterialUniforms::pack(
            &MaterialUniformsInput::default(),
            &data,
            CustomDataRange { offset: 32, size: 12 },
        );
        assert_eq!(
            packed.ids,
            [
                RenderMaterialFlags::SHADOW_CASTER.bits(),
                ExtraMaterialFlags::DISCARD.bits(),
                32,
                12
            ]
        );
    }
}
