//! Store and Slot Renderer Settings
//!
//! Plain configuration structs with `Default` and `serde` support so hosts can
//! load them from their own config files.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use loom_render::settings::SlotRendererSettings;
//!
//! // Transparent pass: back-to-front, frustum culled
//! let settings = SlotRendererSettings::translucent();
//!
//! // Opaque pass that skips transmissive materials
//! let settings = SlotRendererSettings {
//!     discard_flags: ExtraMaterialFlags::DISCARD | ExtraMaterialFlags::TRANSMISSION,
//!     ..SlotRendererSettings::opaque()
//! };
//! ```

use serde::{Deserialize, Serialize};

use crate::flags::ExtraMaterialFlags;
use crate::provider::{DynamicStates, RenderTargetDesc};
use crate::slot::{CullType, RenderSlotId, SortType};

// ---------------------------------------------------------------------------
// StoreSettings
// ---------------------------------------------------------------------------

/// Routing policy of the material data store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Also route shadow-casting materials into [`Self::depth_slot`].
    pub route_shadow_casters: bool,
    pub depth_slot: RenderSlotId,
    /// Slot used when neither the material nor its shader names one.
    pub default_slot: RenderSlotId,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            route_shadow_casters: true,
            depth_slot: RenderSlotId::DEPTH,
            default_slot: RenderSlotId::OPAQUE,
        }
    }
}

// ---------------------------------------------------------------------------
// SlotRendererSettings
// ---------------------------------------------------------------------------

/// Per-slot renderer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotRendererSettings {
    pub slot: RenderSlotId,
    pub sort: SortType,
    pub cull: CullType,
    /// Materials with any of these bits are skipped.
    pub discard_flags: ExtraMaterialFlags,
    pub targets: RenderTargetDesc,
    pub dynamic_states: DynamicStates,
}

impl Default for SlotRendererSettings {
    fn default() -> Self {
        Self::opaque()
    }
}

impl SlotRendererSettings {
    /// Opaque forward pass, batched by material.
    #[must_use]
    pub fn opaque() -> Self {
        Self {
            slot: RenderSlotId::OPAQUE,
            sort: SortType::ByMaterial,
            cull: CullType::ViewFrustum,
            discard_flags: ExtraMaterialFlags::DISCARD,
            targets: RenderTargetDesc::default(),
            dynamic_states: DynamicStates::VIEWPORT,
        }
    }

    /// Blended pass, painter's order.
    #[must_use]
    pub fn translucent() -> Self {
        Self {
            slot: RenderSlotId::TRANSLUCENT,
            sort: SortType::BackToFront,
            ..Self::opaque()
        }
    }

    /// Depth pre-pass.
    #[must_use]
    pub fn depth() -> Self {
        Self {
            slot: RenderSlotId::DEPTH,
            sort: SortType::FrontToBack,
            discard_flags: ExtraMaterialFlags::DISCARD | ExtraMaterialFlags::NO_DEPTH,
            targets: RenderTargetDesc::depth_only(wgpu::TextureFormat::Depth32Float),
            ..Self::opaque()
        }
    }

    /// Shadow atlas pass; one `execute_frame` per light with its atlas viewport.
    #[must_use]
    pub fn shadow(format: wgpu::TextureFormat) -> Self {
        Self {
            cull: CullType::None,
            targets: RenderTargetDesc::depth_only(format),
            ..Self::depth()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_pick_their_sort_direction() {
        assert_eq!(SlotRendererSettings::opaque().sort, SortType::ByMaterial);
        assert_eq!(SlotRendererSettings::translucent().sort, SortType::BackToFront);
        assert_eq!(SlotRendererSettings::translucent().slot, RenderSlotId::TRANSLUCENT);
        assert!(SlotRendererSettings::depth().targets.color_formats.is_empty());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: StoreSettings = serde_json::from_str(r#"{ "route_shadow_casters": false }"#)
            .expect("valid settings");
        assert!(!s.route_shadow_casters);
        assert_eq!(s.depth_slot, RenderSlotId::DEPTH);
    }
}
