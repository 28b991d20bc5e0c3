//! Render slots, slot policies and the binding-set index convention.

use serde::{Deserialize, Serialize};

/// Identifier of a render slot (a pass category with its own bucket, sort
/// policy and default shader).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RenderSlotId(pub u32);

impl RenderSlotId {
    pub const OPAQUE: Self = Self(0);
    pub const TRANSLUCENT: Self = Self(1);
    pub const DEPTH: Self = Self(2);
    pub const DEPTH_VSM: Self = Self(3);
    pub const INVALID: Self = Self(u32::MAX);

    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != u32::MAX
    }
}

impl Default for RenderSlotId {
    fn default() -> Self {
        Self::OPAQUE
    }
}

impl std::fmt::Display for RenderSlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::OPAQUE => f.write_str("opaque"),
            Self::TRANSLUCENT => f.write_str("translucent"),
            Self::DEPTH => f.write_str("depth"),
            Self::DEPTH_VSM => f.write_str("depth_vsm"),
            Self(id) => write!(f, "slot#{id}"),
        }
    }
}

/// Ordering policy of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SortType {
    /// Bucket insertion order.
    #[default]
    None,
    FrontToBack,
    BackToFront,
    /// Groups by render hash inside coarse depth buckets.
    ByMaterial,
}

/// Culling policy of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CullType {
    #[default]
    None,
    ViewFrustum,
}

/// Author-assigned coarse ordering bucket plus an order inside the bucket.
///
/// Compared before any depth or material key, so submissions never reorder
/// across layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RenderSortInfo {
    pub layer: u8,
    pub order: u8,
}

impl RenderSortInfo {
    pub const DEFAULT_LAYER: u8 = 32;
    pub const MAX_LAYER: u8 = 63;

    #[must_use]
    pub const fn new(layer: u8, order: u8) -> Self {
        Self { layer, order }
    }

    /// `layer << 8 | order`, with the layer clamped to [`Self::MAX_LAYER`].
    #[inline]
    #[must_use]
    pub const fn word(self) -> u16 {
        let layer = if self.layer > Self::MAX_LAYER {
            Self::MAX_LAYER
        } else {
            self.layer
        };
        ((layer as u16) << 8) | self.order as u16
    }
}

impl Default for RenderSortInfo {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LAYER, 0)
    }
}

// ─── Binding-set convention ───────────────────────────────────────────────────

/// Scene-wide buffers (camera, lights). Bound once per slot per frame.
pub const SET_SCENE: u32 = 0;
/// Scene-wide images (shadow atlas, environment). Bound once per slot per frame.
pub const SET_SCENE_IMAGES: u32 = 1;
/// Per-object set: dynamic mesh/skin/material blocks plus material images.
pub const SET_OBJECT: u32 = 2;
/// Optional user set declared by custom shaders.
pub const SET_CUSTOM: u32 = 3;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_word_orders_layer_before_order() {
        assert!(RenderSortInfo::new(1, 255).word() < RenderSortInfo::new(2, 0).word());
        assert!(RenderSortInfo::new(2, 0).word() < RenderSortInfo::new(2, 1).word());
    }

    #[test]
    fn sort_word_clamps_layer() {
        assert_eq!(
            RenderSortInfo::new(200, 0).word(),
            RenderSortInfo::new(RenderSortInfo::MAX_LAYER, 0).word()
        );
    }
}
