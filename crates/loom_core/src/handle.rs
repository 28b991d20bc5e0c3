//! Strongly-typed resource handles.
//!
//! Thin `Copy` wrappers around a `u32` index handed out by the external
//! collaborators (shader registry, pipeline factory, resource and binding
//! providers). Distinct newtypes prevent accidentally mixing up, say, a
//! shader id with a graphics-state id inside the pipeline cache key.

use serde::{Deserialize, Serialize};

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl $name {
            /// Sentinel meaning "not set".
            pub const INVALID: Self = Self(u32::MAX);

            /// Human readable resource family, used in diagnostics.
            pub const KIND: &'static str = $kind;

            #[inline]
            #[must_use]
            pub const fn new(index: u32) -> Self {
                Self(index)
            }

            #[inline]
            #[must_use]
            pub const fn is_valid(self) -> bool {
                self.0 != u32::MAX
            }

            /// Raw index into the owner's storage array.
            #[inline]
            #[must_use]
            pub const fn index(self) -> usize {
                self.0 as usize
            }

            /// Returns `Some(self)` for valid handles.
            #[inline]
            #[must_use]
            pub const fn valid(self) -> Option<Self> {
                if self.is_valid() { Some(self) } else { None }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::INVALID
            }
        }
    };
}

define_handle!(
    /// Shader program registered with the shader registry.
    ShaderId,
    "shader"
);
define_handle!(
    /// Fixed-function graphics state registered with the shader registry.
    GraphicsStateId,
    "graphics state"
);
define_handle!(
    /// Pipeline layout (set of binding-set layouts).
    PipelineLayoutId,
    "pipeline layout"
);
define_handle!(
    /// Vertex input declaration.
    VertexInputId,
    "vertex input"
);
define_handle!(
    /// Fully resolved pipeline object created by the pipeline factory.
    PipelineHandle,
    "pipeline"
);
define_handle!(
    /// GPU buffer.
    BufferHandle,
    "buffer"
);
define_handle!(
    /// GPU image view.
    ImageHandle,
    "image"
);
define_handle!(
    /// GPU sampler.
    SamplerHandle,
    "sampler"
);
define_handle!(
    /// Binding set (descriptor set / bind group).
    BindingSetHandle,
    "binding set"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_handle_is_invalid() {
        assert!(!ShaderId::default().is_valid());
        assert_eq!(PipelineHandle::default(), PipelineHandle::INVALID);
        assert!(BufferHandle::new(0).is_valid());
    }

    #[test]
    fn valid_filters_sentinel() {
        assert_eq!(ImageHandle::INVALID.valid(), None);
        assert_eq!(ImageHandle::new(3).valid(), Some(ImageHandle(3)));
    }
}
