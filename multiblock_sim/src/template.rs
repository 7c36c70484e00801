// Structure templates and per-cell requirements.
//
// A `StructureTemplate` is the immutable blueprint of a multiblock: a sparse
// list of template-relative cells, each with a `Requirement`, plus a bounding
// `StructureSize`. Cells are kept in insertion order because projections and
// previews traverse them in that order.
//
// `Requirement` is a closed set of kinds:
// - `Exact`: one concrete block state.
// - `AnyOf`: an ordered, non-empty list of acceptable states with a display
//   label. The preview cycles through the list over time; matching accepts
//   any listed block.
// - `Empty`: the cell must be air. Never placed, never charged for.
//
// AnyOf option lists are shared through `Arc` and compare by identity: two
// lists with equal contents are still distinct requirements. Nothing in the
// engine deduplicates requirements by value.
//
// Templates are built once per structure definition (see `provider.rs`) and
// never mutated afterwards.
//
// See also: `projection.rs` which layers a template under a transform,
// `transform.rs` for facing rotation used by `matches_oriented`.

use crate::error::TemplateError;
use crate::transform;
use crate::types::{BlockState, Rotation, StructureId, StructureSize, VoxelCoord};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Requirements
// ---------------------------------------------------------------------------

/// An ordered list of acceptable block states, shown under a single label.
#[derive(Debug, Serialize, Deserialize)]
pub struct AnyOfOptions {
    pub label: String,
    options: SmallVec<[BlockState; 4]>,
}

impl AnyOfOptions {
    /// Returns `None` if `options` is empty.
    pub fn new(label: impl Into<String>, options: impl IntoIterator<Item = BlockState>) -> Option<Self> {
        let options: SmallVec<[BlockState; 4]> = options.into_iter().collect();
        if options.is_empty() {
            return None;
        }
        Some(Self {
            label: label.into(),
            options,
        })
    }

    pub fn options(&self) -> &[BlockState] {
        &self.options
    }

    /// The option displayed at `tick`, advancing every `cycle_ticks`.
    pub fn displayed(&self, tick: u64, cycle_ticks: u64) -> BlockState {
        let bucket = tick / cycle_ticks.max(1);
        self.options[(bucket % self.options.len() as u64) as usize]
    }
}

/// The acceptance rule of one template cell.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Requirement {
    Exact(BlockState),
    AnyOf(Arc<AnyOfOptions>),
    Empty,
}

impl Requirement {
    pub fn any_of(
        label: impl Into<String>,
        options: impl IntoIterator<Item = BlockState>,
    ) -> Option<Self> {
        AnyOfOptions::new(label, options).map(|o| Requirement::AnyOf(Arc::new(o)))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Requirement::Empty)
    }

    /// The block state shown for this cell at `tick`, in template-local
    /// orientation. `None` for `Empty`.
    pub fn displayed(&self, tick: u64, cycle_ticks: u64) -> Option<BlockState> {
        match self {
            Requirement::Exact(state) => Some(*state),
            Requirement::AnyOf(options) => Some(options.displayed(tick, cycle_ticks)),
            Requirement::Empty => None,
        }
    }

    /// Whether `found` satisfies this requirement in template-local
    /// orientation.
    pub fn matches(&self, found: BlockState) -> bool {
        self.matches_oriented(found, Rotation::None, false)
    }

    /// Whether `found` (a world block) satisfies this requirement once the
    /// structure is placed with the given rotation and mirror. A required
    /// facing must match after being transformed; a requirement without a
    /// facing accepts any facing.
    pub fn matches_oriented(&self, found: BlockState, rotation: Rotation, mirrored: bool) -> bool {
        let accepts = |want: &BlockState| {
            want.id == found.id
                && match want.facing {
                    None => true,
                    Some(f) => found.facing == Some(transform::transform_facing(f, rotation, mirrored)),
                }
        };
        match self {
            Requirement::Exact(state) => accepts(state),
            Requirement::AnyOf(options) => options.options().iter().any(accepts),
            Requirement::Empty => found.is_air(),
        }
    }
}

impl PartialEq for Requirement {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Requirement::Exact(a), Requirement::Exact(b)) => a == b,
            (Requirement::AnyOf(a), Requirement::AnyOf(b)) => Arc::ptr_eq(a, b),
            (Requirement::Empty, Requirement::Empty) => true,
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Template
// ---------------------------------------------------------------------------

/// One populated template cell.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TemplateCell {
    pub cell: VoxelCoord,
    pub requirement: Requirement,
}

/// The immutable blueprint of a multiblock structure.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StructureTemplate {
    pub id: StructureId,
    cells: Vec<TemplateCell>,
    size: StructureSize,
}

impl StructureTemplate {
    /// Build a template whose size is derived from its populated cells.
    /// Cells with negative coordinates do not extend the size.
    pub fn new(id: StructureId, cells: impl IntoIterator<Item = (VoxelCoord, Requirement)>) -> Self {
        let cells: Vec<TemplateCell> = cells
            .into_iter()
            .map(|(cell, requirement)| TemplateCell { cell, requirement })
            .collect();
        let size = Self::extent(&cells);
        Self { id, cells, size }
    }

    /// Build a template with an explicit size, which must cover every cell.
    pub fn with_size(
        id: StructureId,
        cells: impl IntoIterator<Item = (VoxelCoord, Requirement)>,
        size: StructureSize,
    ) -> Result<Self, TemplateError> {
        let mut template = Self::new(id, cells);
        if let Some(outside) = template.cells.iter().find(|c| !size.contains(c.cell)) {
            return Err(TemplateError::CellOutsideSize {
                cell: outside.cell,
                size,
            });
        }
        template.size = size;
        Ok(template)
    }

    /// Build a template from text layers.
    ///
    /// `layers[y][z]` is a row string whose characters index x. Each char is
    /// looked up in `key`; a space leaves the cell unconstrained (absent from
    /// the template). Rows within a layer must share a width.
    pub fn from_pattern(
        id: StructureId,
        layers: &[&[&str]],
        key: &BTreeMap<char, Requirement>,
    ) -> Result<Self, TemplateError> {
        let mut cells = Vec::new();
        for (y, rows) in layers.iter().enumerate() {
            let expected = rows.first().map(|r| r.chars().count()).unwrap_or(0);
            for (z, row) in rows.iter().enumerate() {
                let found = row.chars().count();
                if found != expected {
                    return Err(TemplateError::RaggedPattern {
                        layer: y,
                        row: z,
                        expected,
                        found,
                    });
                }
                for (x, ch) in row.chars().enumerate() {
                    if ch == ' ' {
                        continue;
                    }
                    let requirement = key.get(&ch).ok_or(TemplateError::UnknownKey(ch))?;
                    cells.push((
                        VoxelCoord::new(x as i32, y as i32, z as i32),
                        requirement.clone(),
                    ));
                }
            }
        }
        Ok(Self::new(id, cells))
    }

    fn extent(cells: &[TemplateCell]) -> StructureSize {
        let mut size = StructureSize::default();
        for c in cells {
            size.x = size.x.max((c.cell.x + 1).max(0) as u32);
            size.y = size.y.max((c.cell.y + 1).max(0) as u32);
            size.z = size.z.max((c.cell.z + 1).max(0) as u32);
        }
        size
    }

    pub fn cells(&self) -> &[TemplateCell] {
        &self.cells
    }

    pub fn size(&self) -> StructureSize {
        self.size
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Number of cells that require a block (i.e. not `Empty`).
    pub fn block_count(&self) -> usize {
        self.cells.iter().filter(|c| !c.requirement.is_empty()).count()
    }
}
