// Structure providers: where templates come from.
//
// The engine never knows the concrete origin of a structure. A host registers
// one `StructureProvider` per `StructureId` and asks it for a template when a
// preview session is opened. Providers must be idempotent and side-effect
// free, must not read or mutate world state to decide a template, and must be
// callable from any thread (`Send + Sync`). The optional world argument exists
// for providers that need read-only context; the bundled ones ignore it.
//
// Two implementations cover the common cases:
// - `StaticStructure`: one fixed template, built lazily on first request.
// - `VariantStructure`: a fixed list of selectable sizes, each built lazily on
//   first request for that size. Unknown sizes fall back to the first variant.
//
// Both cache the built template behind a `OnceLock`, so every request for the
// same variant returns the same `Arc` (and therefore the same AnyOf option
// lists, which compare by identity).
//
// See also: `template.rs` for the template itself, `sim.rs` which holds the
// provider registry.

use crate::template::StructureTemplate;
use crate::types::{StructureId, StructureSize};
use crate::world::WorldAccessor;
use std::sync::{Arc, OnceLock};

/// Supplies the template of one structure.
pub trait StructureProvider: Send + Sync {
    fn id(&self) -> &StructureId;

    /// Selectable size variants. Empty for fixed-size structures.
    fn size_variants(&self) -> &[StructureSize] {
        &[]
    }

    /// The template for `size` (or the default variant for `None`).
    fn template(
        &self,
        size: Option<StructureSize>,
        world: Option<&dyn WorldAccessor>,
    ) -> Arc<StructureTemplate>;
}

type Builder = Box<dyn Fn() -> StructureTemplate + Send + Sync>;
type SizedBuilder = Box<dyn Fn(StructureSize) -> StructureTemplate + Send + Sync>;

/// A fixed-size structure built on first use.
pub struct StaticStructure {
    id: StructureId,
    build: Option<Builder>,
    built: OnceLock<Arc<StructureTemplate>>,
}

impl StaticStructure {
    pub fn new(
        id: StructureId,
        build: impl Fn() -> StructureTemplate + Send + Sync + 'static,
    ) -> Self {
        Self {
            id,
            build: Some(Box::new(build)),
            built: OnceLock::new(),
        }
    }

    /// Wrap an already-built template.
    pub fn from_template(template: StructureTemplate) -> Self {
        let built = OnceLock::new();
        let id = template.id.clone();
        let _ = built.set(Arc::new(template));
        Self {
            id,
            build: None,
            built,
        }
    }

    pub fn is_built(&self) -> bool {
        self.built.get().is_some()
    }
}

impl StructureProvider for StaticStructure {
    fn id(&self) -> &StructureId {
        &self.id
    }

    fn template(
        &self,
        _size: Option<StructureSize>,
        _world: Option<&dyn WorldAccessor>,
    ) -> Arc<StructureTemplate> {
        Arc::clone(self.built.get_or_init(|| {
            let template = match &self.build {
                Some(build) => build(),
                None => StructureTemplate::new(self.id.clone(), []),
            };
            Arc::new(template)
        }))
    }
}

/// A structure with several selectable sizes.
pub struct VariantStructure {
    id: StructureId,
    sizes: Vec<StructureSize>,
    build: SizedBuilder,
    built: Vec<OnceLock<Arc<StructureTemplate>>>,
}

impl VariantStructure {
    /// `sizes` must be non-empty; the first entry is the default variant.
    pub fn new(
        id: StructureId,
        sizes: Vec<StructureSize>,
        build: impl Fn(StructureSize) -> StructureTemplate + Send + Sync + 'static,
    ) -> Option<Self> {
        if sizes.is_empty() {
            return None;
        }
        let built = sizes.iter().map(|_| OnceLock::new()).collect();
        Some(Self {
            id,
            sizes,
            build: Box::new(build),
            built,
        })
    }

    fn variant_index(&self, size: Option<StructureSize>) -> usize {
        size.and_then(|s| self.sizes.iter().position(|&v| v == s))
            .unwrap_or(0)
    }
}

impl StructureProvider for VariantStructure {
    fn id(&self) -> &StructureId {
        &self.id
    }

    fn size_variants(&self) -> &[StructureSize] {
        &self.sizes
    }

    fn template(
        &self,
        size: Option<StructureSize>,
        _world: Option<&dyn WorldAccessor>,
    ) -> Arc<StructureTemplate> {
        let index = self.variant_index(size);
        let size = self.sizes[index];
        Arc::clone(self.built[index].get_or_init(|| Arc::new((self.build)(size))))
    }
}
