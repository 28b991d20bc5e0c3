//! Per-frame read-only inputs: the camera a slot renders from and the
//! scene-wide state shared by every draw.

use glam::{Mat4, Vec3};
use loom_core::Frustum;
use smallvec::SmallVec;

use crate::flags::{CameraShaderFlags, LightingFlags};
use crate::provider::BindingResource;

/// Camera snapshot consumed by selection and pipeline resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraView {
    pub view_projection: Mat4,
    pub position: Vec3,
    /// Intersected with each submesh's layer mask.
    pub layer_mask: u64,
    pub flags: CameraShaderFlags,
    /// Mirrored views (reflections, negative-scale cameras) invert winding.
    pub flip_winding: bool,
    frustum: Frustum,
}

impl CameraView {
    #[must_use]
    pub fn new(view_projection: Mat4, position: Vec3) -> Self {
        Self {
            view_projection,
            position,
            layer_mask: u64::MAX,
            flags: CameraShaderFlags::empty(),
            flip_winding: false,
            frustum: Frustum::from_matrix(view_projection),
        }
    }

    /// Right-handed camera at `eye` looking at `target`.
    #[must_use]
    pub fn look_at(eye: Vec3, target: Vec3, fov_y: f32, aspect: f32, near: f32, far: f32) -> Self {
        let view = Mat4::look_at_rh(eye, target, Vec3::Y);
        let proj = Mat4::perspective_rh(fov_y, aspect, near, far);
        Self::new(proj * view, eye)
    }

    #[must_use]
    pub fn with_layer_mask(mut self, layer_mask: u64) -> Self {
        self.layer_mask = layer_mask;
        self
    }

    #[must_use]
    pub fn with_flags(mut self, flags: CameraShaderFlags) -> Self {
        self.flags = flags;
        self
    }

    #[must_use]
    pub fn with_flip_winding(mut self, flip_winding: bool) -> Self {
        self.flip_winding = flip_winding;
        self
    }

    #[must_use]
    pub fn frustum(&self) -> &Frustum {
        &self.frustum
    }
}

/// Viewport rectangle in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    #[must_use]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// Resources of the two scene-wide binding sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SceneResources {
    /// Camera, light and fog buffers.
    pub buffers: SmallVec<[BindingResource; 4]>,
    /// Shadow atlas, environment maps and their samplers.
    pub images: SmallVec<[BindingResource; 8]>,
}

/// Frame-level state passed to `SlotRenderer::execute_frame`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameInputs {
    pub lighting: LightingFlags,
    pub post_process_enabled: bool,
    pub scene: SceneResources,
    /// Set once per shadow-casting light when rendering an atlas.
    pub viewport: Option<Viewport>,
}
