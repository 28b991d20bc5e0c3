use loom_core::{LoomError, Result};
use smallvec::SmallVec;

use crate::provider::{BindingResource, BindingSetLayoutDesc};

/// User resources bound at the custom binding set of custom shaders.
/// `resources[i]` is bound at binding `i`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CustomResources {
    pub resources: SmallVec<[BindingResource; 8]>,
}

impl CustomResources {
    #[must_use]
    pub fn new(resources: impl IntoIterator<Item = BindingResource>) -> Self {
        Self {
            resources: resources.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Checks binding count and kinds against `layout`.
    pub fn validate(&self, layout: &BindingSetLayoutDesc) -> Result<()> {
        if self.resources.len() != layout.bindings.len() {
            return Err(LoomError::BindingCountMismatch {
                expected: layout.bindings.len(),
                found: self.resources.len(),
            });
        }
        for (binding, (resource, kind)) in self.resources.iter().zip(&layout.bindings).enumerate() {
            if !resource.is_compatible(*kind) {
                return Err(LoomError::IncompatibleBinding {
                    binding: binding as u32,
                    expected: kind.name(),
                    found: resource.kind_name(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::BindingKind;
    use loom_core::{ImageHandle, SamplerHandle};

    fn layout() -> BindingSetLayoutDesc {
        BindingSetLayoutDesc::new([BindingKind::Image, BindingKind::Sampler])
    }

    #[test]
    fn matching_resources_validate() {
        let res = CustomResources::new([
            BindingResource::Image(ImageHandle(1)),
            BindingResource::Sampler(SamplerHandle(0)),
        ]);
        assert_eq!(res.validate(&layout()), Ok(()));
    }

    #[test]
    fn count_mismatch_is_reported() {
        let res = CustomResources::new([BindingResource::Image(ImageHandle(1))]);
        assert_eq!(
            res.validate(&layout()),
            Err(LoomError::BindingCountMismatch {
                expected: 2,
                found: 1
            })
        );
    }

    #[test]
    fn kind_mismatch_names_the_binding() {
        let res = CustomResources::new([
            BindingResource::Image(ImageHandle(1)),
            BindingResource::Image(ImageHandle(2)),
        ]);
        assert!(matches!(
            res.validate(&layout()),
            Err(LoomError::IncompatibleBinding { binding: 1, .. })
        ));
    }
}
