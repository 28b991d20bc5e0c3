//! Half-float packing of material factors and UV transforms.
//!
//! Factor vec4s become two `u32` words of two halves each.
//!
//! A texture transform (scale, rotation, translation) is stored on the GPU as
//! the 2x3 matrix it represents, with every element packed as an IEEE `f16`.
//! Three `u32` words carry the six halves; the fourth word is reserved.

use glam::{Vec2, Vec4};
use half::f16;
use serde::{Deserialize, Serialize};

/// Packed 2x3 UV transform: `[m00|m01, m10|m11, tx|ty, reserved]`.
pub type PackedTransform = [u32; 4];

const HALF_ONE: u32 = 0x3C00;

/// Packed identity transform. Emitted without any trig when a slot has no
/// transform.
pub const IDENTITY_PACKED_TRANSFORM: PackedTransform = [HALF_ONE, HALF_ONE << 16, 0, 0];

/// Packs two floats as halves: `a` in the low 16 bits, `b` in the high bits.
#[inline]
#[must_use]
pub fn pack_half2(a: f32, b: f32) -> u32 {
    u32::from(f16::from_f32(a).to_bits()) | (u32::from(f16::from_f32(b).to_bits()) << 16)
}

/// Inverse of [`pack_half2`].
#[inline]
#[must_use]
pub fn unpack_half2(packed: u32) -> (f32, f32) {
    (
        f16::from_bits((packed & 0xFFFF) as u16).to_f32(),
        f16::from_bits((packed >> 16) as u16).to_f32(),
    )
}

/// A vec4 packed as four halves: `[x|y, z|w]`.
pub type PackedFactor = [u32; 2];

#[inline]
#[must_use]
pub fn pack_half4(v: Vec4) -> PackedFactor {
    [pack_half2(v.x, v.y), pack_half2(v.z, v.w)]
}

/// Inverse of [`pack_half4`].
#[inline]
#[must_use]
pub fn unpack_half4(packed: PackedFactor) -> Vec4 {
    let (x, y) = unpack_half2(packed[0]);
    let (z, w) = unpack_half2(packed[1]);
    Vec4::new(x, y, z, w)
}

/// UV transform of one material texture slot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TextureTransform {
    pub translation: Vec2,
    /// Radians, counter-clockwise.
    pub rotation: f32,
    pub scale: Vec2,
}

impl Default for TextureTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl TextureTransform {
    pub const IDENTITY: Self = Self {
        translation: Vec2::ZERO,
        rotation: 0.0,
        scale: Vec2::ONE,
    };

    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.translation == Vec2::ZERO && self.rotation == 0.0 && self.scale == Vec2::ONE
    }

    /// Packs the transform, short-circuiting the identity case.
    #[must_use]
    pub fn pack(&self) -> PackedTransform {
        if self.is_identity() {
            return IDENTITY_PACKED_TRANSFORM;
        }
        let (sin, cos) = self.rotation.sin_cos();
        [
            pack_half2(cos * self.scale.x, sin * self.scale.x),
            pack_half2(-sin * self.scale.y, cos * self.scale.y),
            pack_half2(self.translation.x, self.translation.y),
            0,
        ]
    }
}

/// Packs an optional transform; `None` yields the identity constant.
#[inline]
#[must_use]
pub fn pack_texture_transform(transform: Option<&TextureTransform>) -> PackedTransform {
    transform.map_or(IDENTITY_PACKED_TRANSFORM, TextureTransform::pack)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_constant_matches_computed_identity() {
        let t = TextureTransform {
            rotation: 0.0,
            ..TextureTransform::IDENTITY
        };
        let (sin, cos) = t.rotation.sin_cos();
        let computed = [
            pack_half2(cos, sin),
            pack_half2(0.0, cos),
            pack_half2(0.0, 0.0),
            0,
        ];
        assert_eq!(computed, IDENTITY_PACKED_TRANSFORM);
    }

    #[test]
    fn none_packs_to_identity() {
        assert_eq!(pack_texture_transform(None), IDENTITY_PACKED_TRANSFORM);
    }

    #[test]
    fn scale_and_translation_survive_packing() {
        let t = TextureTransform {
            translation: Vec2::new(0.5, -0.25),
            rotation: 0.0,
            scale: Vec2::new(2.0, 4.0),
        };
        let packed = t.pack();
        assert_eq!(unpack_half2(packed[0]), (2.0, 0.0));
        assert_eq!(unpack_half2(packed[1]), (0.0, 4.0));
        assert_eq!(unpack_half2(packed[2]), (0.5, -0.25));
    }

    #[test]
    fn rotation_is_encoded_in_matrix_columns() {
        let t = TextureTransform {
            rotation: std::f32::consts::FRAC_PI_2,
            ..TextureTransform::IDENTITY
        };
        let (m00, m01) = unpack_half2(t.pack()[0]);
        assert!(m00.abs() < 1e-3);
        assert!((m01 - 1.0).abs() < 1e-3);
    }
}
