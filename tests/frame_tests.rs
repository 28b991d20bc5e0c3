//! Slot Frame Tests
//!
//! Tests for:
//! - A full `pre_execute_frame` / `execute_frame` cycle on the recording backend
//! - Pipeline cache stability across frames
//! - Monotonic pool growth
//! - Recovery after pipeline creation failures
//! - Rendering one shadow-atlas region per light through the depth slot
//! - Loading renderer settings from JSON

use std::sync::Arc;

use glam::{Mat4, Vec3};
use loom::loom_render::command::RenderCommand;
use loom::loom_render::flags::RenderMaterialFlags;
use loom::loom_render::pool::PoolSizeChange;
use loom::loom_render::provider::ShaderRegistry;
use loom::loom_render::store::{DrawCommand, MaterialData, MaterialInput, MeshData, SubmeshInput};
use loom::loom_render::testing::{RecordingBackend, standard_library};
use loom::loom_render::view::FrameInputs;
use loom::{
    BoundingSphere, CameraView, CommandList, MaterialDataStore, RenderSlotId, ShadowAtlasLayout,
    SlotRenderer, SlotRendererSettings, SortType, Viewport,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn registry() -> Arc<dyn ShaderRegistry> {
    let (lib, _) = standard_library();
    Arc::new(lib)
}

fn camera() -> CameraView {
    CameraView::look_at(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, 1.0, 1.0, 0.1, 100.0)
}

/// Fills `store` with `count` submeshes spread along -Z, cycling through
/// `materials` materials.
fn populate(
    store: &mut MaterialDataStore,
    count: u32,
    materials: u32,
    flags: RenderMaterialFlags,
) {
    let materials: Vec<u32> = (0..materials.max(1))
        .map(|_| {
            store.add_material(MaterialInput {
                data: MaterialData {
                    flags,
                    ..MaterialData::default()
                },
                ..MaterialInput::default()
            })
        })
        .collect();
    for i in 0..count {
        let z = -(i as f32) * 0.5;
        let mesh = store.add_mesh(MeshData::new(Mat4::from_translation(Vec3::new(0.0, 0.0, z))));
        store.add_submesh(SubmeshInput {
            mesh_index: mesh,
            material_index: materials[i as usize % materials.len()],
            bounds: BoundingSphere::new(Vec3::new(0.0, 0.0, z), 0.5),
            draw: DrawCommand::new(3),
            ..SubmeshInput::default()
        });
    }
}

fn draws(list: &CommandList) -> usize {
    list.commands().iter().filter(|c| c.is_draw()).count()
}

// ============================================================================
// Full Frame
// ============================================================================

#[test]
fn full_frame_records_one_draw_per_visible_submesh() -> anyhow::Result<()> {
    init_logger();
    let registry = registry();
    let mut store = MaterialDataStore::new(Arc::clone(&registry));
    populate(&mut store, 6, 2, RenderMaterialFlags::empty());

    let mut backend = RecordingBackend::new();
    let mut renderer = SlotRenderer::new(registry, SlotRendererSettings::opaque());
    let change = renderer.pre_execute_frame(&store, &mut backend)?;
    assert!(matches!(change, PoolSizeChange::Grown { .. }), "first frame allocates pools");

    let mut list = CommandList::new();
    let stats = renderer.execute_frame(
        &store,
        &camera(),
        &FrameInputs::default(),
        &mut backend,
        &mut list,
    )?;

    assert_eq!(stats.visible_submeshes, 6);
    assert_eq!(stats.draw_calls, 6);
    assert_eq!(stats.skipped_draws, 0);
    assert_eq!(draws(&list), 6);
    assert_eq!(stats.pipeline_binds, 1, "one material type, one pipeline");
    assert!(
        stats.object_set_updates <= 6,
        "object sets change at most once per draw"
    );
    Ok(())
}

#[test]
fn steady_frames_reuse_pipelines_and_pools() -> anyhow::Result<()> {
    init_logger();
    let registry = registry();
    let mut store = MaterialDataStore::new(Arc::clone(&registry));
    let mut backend = RecordingBackend::new();
    let mut renderer = SlotRenderer::new(registry, SlotRendererSettings::opaque());

    let mut run_frame = |store: &MaterialDataStore,
                         backend: &mut RecordingBackend|
     -> anyhow::Result<(PoolSizeChange, usize)> {
        let change = renderer.pre_execute_frame(store, backend)?;
        let mut list = CommandList::new();
        renderer.execute_frame(store, &camera(), &FrameInputs::default(), backend, &mut list)?;
        Ok((change, draws(&list)))
    };

    populate(&mut store, 4, 1, RenderMaterialFlags::empty());
    run_frame(&store, &mut backend)?;
    let pipelines = backend.pipeline_creations();
    let buffers = backend.live_buffers();
    assert_eq!(pipelines, 1);

    for _ in 0..3 {
        store.clear();
        populate(&mut store, 4, 1, RenderMaterialFlags::empty());
        let (change, drawn) = run_frame(&store, &mut backend)?;
        assert_eq!(change, PoolSizeChange::Unchanged);
        assert_eq!(drawn, 4);
    }
    assert_eq!(backend.pipeline_creations(), pipelines, "pipelines are cached");
    assert_eq!(backend.live_buffers(), buffers, "pools are not rebuilt");
    Ok(())
}

#[test]
fn pools_only_grow() -> anyhow::Result<()> {
    init_logger();
    let registry = registry();
    let mut store = MaterialDataStore::new(Arc::clone(&registry));
    let mut backend = RecordingBackend::new();
    let mut renderer = SlotRenderer::new(registry, SlotRendererSettings::opaque());

    let mut previous = renderer.pool_sizer().capacity();
    for count in [10, 2, 40, 5, 40] {
        store.clear();
        populate(&mut store, count, 3, RenderMaterialFlags::empty());
        renderer.pre_execute_frame(&store, &mut backend)?;

        let capacity = renderer.pool_sizer().capacity();
        assert!(capacity.covers(&store.slot_object_counts(RenderSlotId::OPAQUE)));
        assert!(capacity.submesh >= previous.submesh, "submesh pool shrank");
        assert!(capacity.mesh >= previous.mesh, "mesh pool shrank");
        assert!(capacity.material >= previous.material, "material pool shrank");
        previous = capacity;
    }
    assert_eq!(renderer.pool_sizer().grow_count(), 2, "only 10 and 40 grow");
    Ok(())
}

#[test]
fn failed_pipelines_skip_draws_and_recover() -> anyhow::Result<()> {
    init_logger();
    let registry = registry();
    let mut store = MaterialDataStore::new(Arc::clone(&registry));
    populate(&mut store, 3, 1, RenderMaterialFlags::empty());
    let mut backend = RecordingBackend::new();
    backend.fail_pipelines = true;
    let mut renderer = SlotRenderer::new(registry, SlotRendererSettings::opaque());

    renderer.pre_execute_frame(&store, &mut backend)?;
    let mut list = CommandList::new();
    let stats = renderer.execute_frame(
        &store,
        &camera(),
        &FrameInputs::default(),
        &mut backend,
        &mut list,
    )?;
    assert_eq!(stats.draw_calls, 0);
    assert_eq!(stats.skipped_draws, 3);
    assert!(renderer.pipeline_cache().is_empty(), "failures are not cached");

    backend.fail_pipelines = false;
    list.clear();
    let stats = renderer.execute_frame(
        &store,
        &camera(),
        &FrameInputs::default(),
        &mut backend,
        &mut list,
    )?;
    assert_eq!(stats.draw_calls, 3);
    assert_eq!(renderer.pipeline_cache().len(), 1);
    Ok(())
}

// ============================================================================
// Shadow Atlas
// ============================================================================

#[test]
fn depth_slot_renders_each_atlas_region() -> anyhow::Result<()> {
    init_logger();
    let registry = registry();
    let mut store = MaterialDataStore::new(Arc::clone(&registry));
    populate(&mut store, 2, 1, RenderMaterialFlags::SHADOW_CASTER);
    populate(&mut store, 3, 1, RenderMaterialFlags::empty());

    let atlas = ShadowAtlasLayout::new(3, 1024, 2048);
    assert_eq!(atlas.resolution(), 1024);

    let mut backend = RecordingBackend::new();
    let mut renderer = SlotRenderer::new(registry, SlotRendererSettings::depth());
    renderer.pre_execute_frame(&store, &mut backend)?;

    let mut list = CommandList::new();
    for light in 0..atlas.light_count() {
        let inputs = FrameInputs {
            viewport: atlas.region(light),
            ..FrameInputs::default()
        };
        let stats = renderer.execute_frame(&store, &camera(), &inputs, &mut backend, &mut list)?;
        assert_eq!(stats.draw_calls, 2, "only shadow casters reach the depth slot");
    }

    let viewports: Vec<Viewport> = list
        .commands()
        .iter()
        .filter_map(|c| match c {
            RenderCommand::SetViewport(v) => Some(*v),
            _ => None,
        })
        .collect();
    let expected: Vec<Viewport> = (0..3).filter_map(|i| atlas.region(i)).collect();
    assert_eq!(viewports, expected);
    assert_eq!(draws(&list), 6);
    Ok(())
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn settings_load_from_partial_json() -> anyhow::Result<()> {
    let settings: SlotRendererSettings =
        serde_json::from_str(r#"{ "slot": 1, "sort": "BackToFront" }"#)?;
    assert_eq!(settings.slot, RenderSlotId::TRANSLUCENT);
    assert_eq!(settings.sort, SortType::BackToFront);
    assert_eq!(
        settings.discard_flags,
        SlotRendererSettings::opaque().discard_flags,
        "missing fields take their defaults"
    );
    Ok(())
}
