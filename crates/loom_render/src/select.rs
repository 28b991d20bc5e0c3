//! Slot Submesh Selector
//!
//! Turns a slot bucket into the ordered draw list for one camera:
//!
//! 1. drop entries whose layer mask misses the camera or whose material
//!    carries a discarded flag;
//! 2. optionally frustum-cull against the world bounding sphere;
//! 3. build a 64-bit key from the quantized squared distance and the render
//!    hash;
//! 4. stable-sort on `(sort layer word, key)`.
//!
//! The sort layer word is always compared first, so explicit author layers
//! are never reordered by depth or material.

use crate::flags::ExtraMaterialFlags;
use crate::settings::SlotRendererSettings;
use crate::slot::{CullType, RenderSlotId, SortType};
use crate::store::MaterialDataStore;
use crate::view::CameraView;

/// Scale applied to squared distances before truncation to `u32`.
pub const DISTANCE_COEFFICIENT: f32 = 16.0;
/// Depth term of anything at or beyond the representable range.
pub const FAR_DEPTH_SENTINEL: u32 = u32::MAX;
/// Low depth bits moved below the render hash in by-material keys, so nearby
/// objects share a coarse bucket.
pub const BY_MATERIAL_DEPTH_SHIFT: u32 = 16;

#[inline]
#[must_use]
pub fn quantize_distance(dist_sq: f32) -> u32 {
    let scaled = dist_sq * DISTANCE_COEFFICIENT;
    // NaN fails the comparison and lands on the sentinel.
    if scaled < FAR_DEPTH_SENTINEL as f32 {
        scaled.max(0.0) as u32
    } else {
        FAR_DEPTH_SENTINEL
    }
}

/// 64-bit sort key.
///
/// Depth-ordered policies put the depth in the high word and the render hash
/// low. `ByMaterial` packs `coarse depth | render hash | fine depth`, so the
/// hash wins within a coarse bucket and the fine depth breaks ties.
#[inline]
#[must_use]
pub fn sort_key(sort: SortType, depth: u32, render_hash: u32) -> u64 {
    match sort {
        SortType::ByMaterial => {
            let coarse = u64::from(depth >> BY_MATERIAL_DEPTH_SHIFT);
            let fine = u64::from(depth & ((1 << BY_MATERIAL_DEPTH_SHIFT) - 1));
            (coarse << 48) | (u64::from(render_hash) << 16) | fine
        }
        _ => (u64::from(depth) << 32) | u64::from(render_hash),
    }
}

/// What one slot asks of the selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotQuery {
    pub slot: RenderSlotId,
    pub sort: SortType,
    pub cull: CullType,
    pub discard_flags: ExtraMaterialFlags,
}

impl SlotQuery {
    #[must_use]
    pub fn new(slot: RenderSlotId, sort: SortType) -> Self {
        Self {
            slot,
            sort,
            cull: CullType::None,
            discard_flags: ExtraMaterialFlags::empty(),
        }
    }
}

impl From<&SlotRendererSettings> for SlotQuery {
    fn from(settings: &SlotRendererSettings) -> Self {
        Self {
            slot: settings.slot,
            sort: settings.sort,
            cull: settings.cull,
            discard_flags: settings.discard_flags,
        }
    }
}

/// One surviving bucket entry, in draw order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortedEntry {
    pub submesh_index: u32,
    /// Position in the slot bucket, indexes `slot_submesh_material_data`.
    pub bucket_index: u32,
    pub layer: u16,
    pub sort_key: u64,
}

/// Reusable selection buffer; one per slot renderer.
#[derive(Debug, Default)]
pub struct SlotSubmeshSelector {
    entries: Vec<SortedEntry>,
}

impl SlotSubmeshSelector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the ordered draw list of `query.slot` as seen from `camera`.
    pub fn select(
        &mut self,
        store: &MaterialDataStore,
        camera: &CameraView,
        query: &SlotQuery,
    ) -> &[SortedEntry] {
        self.entries.clear();

        let indices = store.slot_submesh_indices(query.slot);
        let metadata = store.slot_submesh_material_data(query.slot);
        let submeshes = store.submeshes();
        let frustum = camera.frustum();

        for (bucket_index, (&submesh_index, data)) in indices.iter().zip(metadata).enumerate() {
            let Some(submesh) = submeshes.get(submesh_index as usize) else {
                continue;
            };
            if submesh.layer_mask & camera.layer_mask == 0
                || data.extra_flags.intersects(query.discard_flags)
            {
                continue;
            }
            let bounds = &submesh.bounds;
            if query.cull == CullType::ViewFrustum
                && !frustum.intersects_sphere(bounds.center, bounds.radius)
            {
                continue;
            }

            let depth = quantize_distance(bounds.center.distance_squared(camera.position));
            self.entries.push(SortedEntry {
                submesh_index,
                bucket_index: bucket_index as u32,
                layer: data.render_sort_word,
                sort_key: sort_key(query.sort, depth, data.render_hash),
            });
        }

        match query.sort {
            SortType::None => {}
            SortType::FrontToBack | SortType::ByMaterial => {
                self.entries.sort_by_key(|e| (e.layer, e.sort_key));
            }
            SortType::BackToFront => {
                self.entries
                    .sort_by(|a, b| (b.layer, b.sort_key).cmp(&(a.layer, a.sort_key)));
            }
        }

        log::trace!(
            "Slot {} selected {}/{} submeshes",
            query.slot,
            self.entries.len(),
            indices.len()
        );
        &self.entries
    }

    /// Result of the last [`select`](Self::select).
    #[must_use]
    pub fn entries(&self) -> &[SortedEntry] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use glam::Vec3;
    use loom_core::BoundingSphere;

    use super::*;
    use crate::flags::RenderMaterialFlags;
    use crate::slot::RenderSortInfo;
    use crate::store::{MaterialData, MaterialInput, MeshData, SubmeshInput};
    use crate::testing::standard_library;

    fn store() -> MaterialDataStore {
        let (lib, _) = standard_library();
        let mut store = MaterialDataStore::new(Arc::new(lib));
        store.add_mesh(MeshData::default());
        store
    }

    fn camera() -> CameraView {
        CameraView::look_at(Vec3::ZERO, Vec3::NEG_Z, 1.2, 1.0, 0.1, 1000.0)
    }

    fn add_at(store: &mut MaterialDataStore, material: u32, z: f32) -> u32 {
        store.add_submesh(SubmeshInput {
            material_index: material,
            bounds: BoundingSphere::new(Vec3::new(0.0, 0.0, -z), 0.5),
            ..SubmeshInput::default()
        })
    }

    fn order(entries: &[SortedEntry]) -> Vec<u32> {
        entries.iter().map(|e| e.submesh_index).collect()
    }

    #[test]
    fn distance_ordering_by_direction() {
        let mut store = store();
        let m = store.add_material(MaterialInput::default());
        for z in [1.0, 5.0, 2.0] {
            add_at(&mut store, m, z);
        }
        let mut selector = SlotSubmeshSelector::new();
        let ftb = SlotQuery::new(RenderSlotId::OPAQUE, SortType::FrontToBack);
        assert_eq!(order(selector.select(&store, &camera(), &ftb)), [0, 2, 1]);
        let btf = SlotQuery::new(RenderSlotId::OPAQUE, SortType::BackToFront);
        assert_eq!(order(selector.select(&store, &camera(), &btf)), [1, 2, 0]);
        let none = SlotQuery::new(RenderSlotId::OPAQUE, SortType::None);
        assert_eq!(order(selector.select(&store, &camera(), &none)), [0, 1, 2]);
    }

    #[test]
    fn layers_dominate_distance() {
        let mut store = store();
        let near_late = store.add_material(MaterialInput {
            data: MaterialData {
                render_sort: RenderSortInfo::new(40, 0),
                ..MaterialData::default()
            },
            ..MaterialInput::default()
        });
        let far_early = store.add_material(MaterialInput {
            data: MaterialData {
                render_sort: RenderSortInfo::new(10, 0),
                ..MaterialData::default()
            },
            ..MaterialInput::default()
        });
        add_at(&mut store, near_late, 1.0);
        add_at(&mut store, far_early, 50.0);

        let mut selector = SlotSubmeshSelector::new();
        for sort in [SortType::FrontToBack, SortType::ByMaterial] {
            let q = SlotQuery::new(RenderSlotId::OPAQUE, sort);
            assert_eq!(order(selector.select(&store, &camera(), &q)), [1, 0]);
        }
        let q = SlotQuery::new(RenderSlotId::OPAQUE, SortType::BackToFront);
        assert_eq!(order(selector.select(&store, &camera(), &q)), [0, 1]);
    }

    #[test]
    fn by_material_groups_nearby_hashes() {
        let mut store = store();
        let a = store.add_material(MaterialInput::default());
        let b = store.add_material(MaterialInput {
            data: MaterialData {
                flags: RenderMaterialFlags::NORMAL_MAP,
                ..MaterialData::default()
            },
            ..MaterialInput::default()
        });
        add_at(&mut store, b, 1.0);
        add_at(&mut store, a, 2.0);
        add_at(&mut store, b, 3.0);
        add_at(&mut store, a, 4.0);

        let q = SlotQuery::new(RenderSlotId::OPAQUE, SortType::ByMaterial);
        let mut selector = SlotSubmeshSelector::new();
        assert_eq!(order(selector.select(&store, &camera(), &q)), [1, 3, 0, 2]);
    }

    #[test]
    fn layer_mask_and_discard_filter() {
        let mut store = store();
        let plain = store.add_material(MaterialInput::default());
        let discarded = store.add_material(MaterialInput {
            data: MaterialData {
                extra_flags: ExtraMaterialFlags::DISCARD,
                ..MaterialData::default()
            },
            ..MaterialInput::default()
        });
        store.add_submesh(SubmeshInput {
            material_index: plain,
            layer_mask: 0b10,
            ..SubmeshInput::default()
        });
        store.add_submesh(SubmeshInput {
            material_index: discarded,
            ..SubmeshInput::default()
        });
        add_at(&mut store, plain, 3.0);

        let q = SlotQuery {
            discard_flags: ExtraMaterialFlags::DISCARD,
            ..SlotQuery::new(RenderSlotId::OPAQUE, SortType::None)
        };
        let cam = camera().with_layer_mask(0b01);
        let mut selector = SlotSubmeshSelector::new();
        assert_eq!(order(selector.select(&store, &cam, &q)), [2]);
    }

    #[test]
    fn frustum_culling_is_opt_in() {
        let mut store = store();
        let m = store.add_material(MaterialInput::default());
        add_at(&mut store, m, 5.0);
        add_at(&mut store, m, -5.0);

        let mut selector = SlotSubmeshSelector::new();
        let mut q = SlotQuery::new(RenderSlotId::OPAQUE, SortType::None);
        assert_eq!(selector.select(&store, &camera(), &q).len(), 2);
        q.cull = CullType::ViewFrustum;
        assert_eq!(order(selector.select(&store, &camera(), &q)), [0]);
    }

    #[test]
    fn quantization_saturates() {
        assert_eq!(quantize_distance(1.0), 16);
        assert_eq!(quantize_distance(f32::INFINITY), FAR_DEPTH_SENTINEL);
        assert_eq!(quantize_distance(f32::NAN), FAR_DEPTH_SENTINEL);
        assert_eq!(quantize_distance(-1.0), 0);
    }

    #[test]
    fn by_material_breaks_ties_by_depth() {
        let mut store = store();
        let m = store.add_material(MaterialInput::default());
        add_at(&mut store, m, 10.0);
        add_at(&mut store, m, 2.0);

        let q = SlotQuery::new(RenderSlotId::OPAQUE, SortType::ByMaterial);
        let mut selector = SlotSubmeshSelector::new();
        assert_eq!(order(selector.select(&store, &camera(), &q)), [1, 0]);
    }

    #[test]
    fn by_material_key_prefers_hash_within_coarse_depth() {
        let near = sort_key(SortType::ByMaterial, 100, 9);
        let far = sort_key(SortType::ByMaterial, 200, 3);
        assert!(far < near);
        assert!(sort_key(SortType::ByMaterial, 100, 9) < sort_key(SortType::ByMaterial, 200, 9));
        let next_bucket = 1 << BY_MATERIAL_DEPTH_SHIFT;
        assert!(
            sort_key(SortType::ByMaterial, 5, u32::MAX)
                < sort_key(SortType::ByMaterial, next_bucket, 0)
        );
        assert!(sort_key(SortType::FrontToBack, 100, 9) < sort_key(SortType::FrontToBack, 200, 3));
    }
}
