//! Submesh Selection Tests
//!
//! Tests for:
//! - Distance ordering for front-to-back and back-to-front queries
//! - Sort layers taking precedence over depth and material keys, in the
//!   direction of the sort
//! - Camera layer masks and discard flags
//! - Frustum culling against submesh bounds

use std::sync::Arc;

use glam::Vec3;
use loom::loom_render::flags::ExtraMaterialFlags;
use loom::loom_render::select::SortedEntry;
use loom::loom_render::store::{MaterialData, MaterialInput, SubmeshInput};
use loom::loom_render::testing::standard_library;
use loom::{
    BoundingSphere, CameraView, CullType, MaterialDataStore, RenderSlotId, RenderSortInfo,
    SlotQuery, SlotSubmeshSelector, SortType,
};

fn store() -> MaterialDataStore {
    let (lib, _) = standard_library();
    MaterialDataStore::new(Arc::new(lib))
}

/// Camera at the origin looking down -Z.
fn camera() -> CameraView {
    CameraView::look_at(Vec3::ZERO, Vec3::NEG_Z, 1.0, 1.0, 0.1, 500.0)
}

fn add_at(store: &mut MaterialDataStore, material: u32, distance: f32) -> u32 {
    store.add_submesh(SubmeshInput {
        material_index: material,
        bounds: BoundingSphere::new(Vec3::new(0.0, 0.0, -distance), 0.5),
        ..SubmeshInput::default()
    })
}

fn layered(store: &mut MaterialDataStore, layer: u8) -> u32 {
    store.add_material(MaterialInput {
        data: MaterialData {
            render_sort: RenderSortInfo::new(layer, 0),
            ..MaterialData::default()
        },
        ..MaterialInput::default()
    })
}

fn order(entries: &[SortedEntry]) -> Vec<u32> {
    entries.iter().map(|e| e.submesh_index).collect()
}

// ============================================================================
// Distance Ordering
// ============================================================================

#[test]
fn front_to_back_and_back_to_front() {
    let mut store = store();
    let m = store.add_material(MaterialInput::default());
    for distance in [1.0, 5.0, 2.0] {
        add_at(&mut store, m, distance);
    }

    let mut selector = SlotSubmeshSelector::new();
    let near_first = SlotQuery::new(RenderSlotId::OPAQUE, SortType::FrontToBack);
    assert_eq!(
        order(selector.select(&store, &camera(), &near_first)),
        [0, 2, 1],
        "front-to-back must draw the nearest first"
    );

    let far_first = SlotQuery::new(RenderSlotId::OPAQUE, SortType::BackToFront);
    assert_eq!(
        order(selector.select(&store, &camera(), &far_first)),
        [1, 2, 0],
        "back-to-front must draw the farthest first"
    );
}

#[test]
fn unsorted_query_keeps_submission_order() {
    let mut store = store();
    let m = store.add_material(MaterialInput::default());
    for distance in [9.0, 1.0, 4.0, 2.0] {
        add_at(&mut store, m, distance);
    }
    let q = SlotQuery::new(RenderSlotId::OPAQUE, SortType::None);
    let mut selector = SlotSubmeshSelector::new();
    assert_eq!(order(selector.select(&store, &camera(), &q)), [0, 1, 2, 3]);
}

#[test]
fn reselecting_reuses_the_selector() {
    let mut store = store();
    let m = store.add_material(MaterialInput::default());
    add_at(&mut store, m, 3.0);
    let q = SlotQuery::new(RenderSlotId::OPAQUE, SortType::FrontToBack);
    let mut selector = SlotSubmeshSelector::new();
    assert_eq!(selector.select(&store, &camera(), &q).len(), 1);

    add_at(&mut store, m, 1.0);
    assert_eq!(order(selector.select(&store, &camera(), &q)), [1, 0]);
    assert_eq!(selector.entries().len(), 2, "previous selection is replaced");
}

// ============================================================================
// Layers
// ============================================================================

fn layers(
    selector: &mut SlotSubmeshSelector,
    store: &MaterialDataStore,
    sort: SortType,
) -> Vec<u16> {
    let q = SlotQuery::new(RenderSlotId::OPAQUE, sort);
    selector
        .select(store, &camera(), &q)
        .iter()
        .map(|e| e.layer)
        .collect()
}

#[test]
fn layers_order_follows_sort_direction() {
    let mut store = store();
    let late = layered(&mut store, 50);
    let early = layered(&mut store, 5);
    let middle = layered(&mut store, RenderSortInfo::DEFAULT_LAYER);
    add_at(&mut store, late, 1.0);
    add_at(&mut store, early, 100.0);
    add_at(&mut store, middle, 10.0);

    let mut selector = SlotSubmeshSelector::new();
    for sort in [SortType::FrontToBack, SortType::ByMaterial] {
        let got = layers(&mut selector, &store, sort);
        let mut ascending = got.clone();
        ascending.sort_unstable();
        assert_eq!(got, ascending, "{sort:?} must draw lower layers first");
    }

    let got = layers(&mut selector, &store, SortType::BackToFront);
    let mut descending = got.clone();
    descending.sort_unstable_by(|a, b| b.cmp(a));
    assert_eq!(got, descending, "back-to-front reverses the layer order");
}

#[test]
fn layers_above_maximum_are_clamped() {
    assert_eq!(
        RenderSortInfo::new(200, 3).word(),
        RenderSortInfo::new(RenderSortInfo::MAX_LAYER, 3).word()
    );
}

// ============================================================================
// Filtering
// ============================================================================

#[test]
fn camera_layer_mask_filters_submeshes() {
    let mut store = store();
    let m = store.add_material(MaterialInput::default());
    store.add_submesh(SubmeshInput {
        material_index: m,
        layer_mask: 0b100,
        ..SubmeshInput::default()
    });
    store.add_submesh(SubmeshInput {
        material_index: m,
        layer_mask: 0b001,
        ..SubmeshInput::default()
    });

    let q = SlotQuery::new(RenderSlotId::OPAQUE, SortType::None);
    let mut selector = SlotSubmeshSelector::new();
    let cam = camera().with_layer_mask(0b101);
    assert_eq!(selector.select(&store, &cam, &q).len(), 2);
    let cam = camera().with_layer_mask(0b001);
    assert_eq!(order(selector.select(&store, &cam, &q)), [1]);
}

#[test]
fn discard_flags_drop_matching_materials() {
    let mut store = store();
    let kept = store.add_material(MaterialInput::default());
    let dropped = store.add_material(MaterialInput {
        data: MaterialData {
            extra_flags: ExtraMaterialFlags::NO_DEPTH,
            ..MaterialData::default()
        },
        ..MaterialInput::default()
    });
    add_at(&mut store, dropped, 1.0);
    add_at(&mut store, kept, 2.0);

    let q = SlotQuery {
        discard_flags: ExtraMaterialFlags::NO_DEPTH,
        ..SlotQuery::new(RenderSlotId::OPAQUE, SortType::FrontToBack)
    };
    let mut selector = SlotSubmeshSelector::new();
    assert_eq!(order(selector.select(&store, &camera(), &q)), [1]);
}

#[test]
fn frustum_culling_drops_submeshes_behind_the_camera() {
    let mut store = store();
    let m = store.add_material(MaterialInput::default());
    add_at(&mut store, m, 10.0);
    add_at(&mut store, m, -10.0);
    add_at(&mut store, m, 1000.0);

    let q = SlotQuery {
        cull: CullType::ViewFrustum,
        ..SlotQuery::new(RenderSlotId::OPAQUE, SortType::FrontToBack)
    };
    let mut selector = SlotSubmeshSelector::new();
    assert_eq!(order(selector.select(&store, &camera(), &q)), [0]);
}

#[test]
fn empty_slot_selects_nothing() {
    let store = store();
    let q = SlotQuery::new(RenderSlotId::TRANSLUCENT, SortType::BackToFront);
    let mut selector = SlotSubmeshSelector::new();
    assert!(selector.select(&store, &camera(), &q).is_empty());
}
