// Layered projection of a structure template under an orientation.
//
// A `Projection` pairs a shared `StructureTemplate` with a rotation, a mirror
// flag and an optional size override (for structures with several selectable
// size variants). It groups the template's cells into layers keyed by their
// *untransformed* Y coordinate; since rotation and mirroring never touch Y,
// layer membership, cell count and block count are fixed at construction.
//
// The orientation-dependent part (each cell's transformed position and the
// alignment offset) lives behind `CachedOffset`, an explicit cached value with
// a validity flag and a generation counter. Changing rotation, mirror or size
// override invalidates it; the next traversal recomputes it from those three
// inputs alone. Recomputation is pure, so two projections with the same inputs
// always agree.
//
// Traversal:
// - `process_layer(y, visitor)` visits one layer in template insertion order.
// - `process_all(visitor)` visits every layer in ascending Y.
// Both stop as soon as the visitor returns `true` and report whether they
// stopped early.
//
// Equality compares structure id, rotation and mirror only. The size override
// is deliberately ignored, so two projections of different size variants of
// the same structure compare equal.
//
// See also: `transform.rs` for the algebra, `placement.rs` which turns a
// projection into world placements, `sim.rs` for preview sessions that own
// projections.

use crate::template::{Requirement, StructureTemplate};
use crate::transform;
use crate::types::{BlockState, Rotation, StructureSize, VoxelCoord};
use std::collections::BTreeMap;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Cached offset
// ---------------------------------------------------------------------------

/// Alignment offset cache. `value` is `None` while dirty.
#[derive(Clone, Debug, Default)]
pub struct CachedOffset {
    value: Option<VoxelCoord>,
    /// Incremented on every recomputation.
    generation: u64,
}

impl CachedOffset {
    pub fn is_valid(&self) -> bool {
        self.value.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn invalidate(&mut self) {
        self.value = None;
    }

    /// Return the cached offset, recomputing it first if dirty. The second
    /// element is true when a recomputation happened.
    fn get_or_compute(
        &mut self,
        size: StructureSize,
        rotation: Rotation,
        mirrored: bool,
    ) -> (VoxelCoord, bool) {
        match self.value {
            Some(offset) => (offset, false),
            None => {
                let offset = transform::compute_offset(size, rotation, mirrored);
                self.value = Some(offset);
                self.generation += 1;
                (offset, true)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Projection
// ---------------------------------------------------------------------------

/// One template cell inside a layer.
#[derive(Clone, Debug)]
struct LayerCell {
    /// Index into `StructureTemplate::cells()`.
    index: usize,
    original: VoxelCoord,
    /// Position after rotation/mirror and offset correction.
    position: VoxelCoord,
}

/// What a traversal visitor sees for each cell.
#[derive(Clone, Copy, Debug)]
pub struct CellInfo<'a> {
    /// Origin-relative position after rotation, mirror and alignment.
    pub position: VoxelCoord,
    /// Template-local cell.
    pub original: VoxelCoord,
    pub requirement: &'a Requirement,
    pub rotation: Rotation,
    pub mirrored: bool,
}

impl CellInfo<'_> {
    /// The displayed block at `tick`, with its facing turned to match the
    /// projection orientation. `None` for empty cells.
    pub fn display_state(&self, tick: u64, cycle_ticks: u64) -> Option<BlockState> {
        self.requirement
            .displayed(tick, cycle_ticks)
            .map(|state| self.orient(state))
    }

    /// Apply this cell's rotation/mirror to a template-local block state.
    pub fn orient(&self, state: BlockState) -> BlockState {
        BlockState {
            id: state.id,
            facing: state
                .facing
                .map(|f| transform::transform_facing(f, self.rotation, self.mirrored)),
        }
    }

    /// Whether a block found in the world satisfies this cell.
    pub fn matches(&self, found: BlockState) -> bool {
        self.requirement
            .matches_oriented(found, self.rotation, self.mirrored)
    }

    pub fn world_position(&self, origin: VoxelCoord) -> VoxelCoord {
        origin + self.position
    }
}

/// A template transformed into origin-relative, layer-indexed form.
#[derive(Clone, Debug)]
pub struct Projection {
    template: Arc<StructureTemplate>,
    rotation: Rotation,
    mirrored: bool,
    size_override: Option<StructureSize>,
    layers: BTreeMap<i32, Vec<LayerCell>>,
    cell_count: usize,
    block_count: usize,
    offset: CachedOffset,
}

impl Projection {
    pub fn build(
        template: Arc<StructureTemplate>,
        rotation: Rotation,
        mirrored: bool,
        size_override: Option<StructureSize>,
    ) -> Self {
        let mut layers: BTreeMap<i32, Vec<LayerCell>> = BTreeMap::new();
        for (index, cell) in template.cells().iter().enumerate() {
            layers.entry(cell.cell.y).or_default().push(LayerCell {
                index,
                original: cell.cell,
                position: cell.cell,
            });
        }
        let cell_count = template.len();
        let block_count = template.block_count();
        let mut projection = Self {
            template,
            rotation,
            mirrored,
            size_override,
            layers,
            cell_count,
            block_count,
            offset: CachedOffset::default(),
        };
        projection.refresh();
        projection
    }

    pub fn template(&self) -> &Arc<StructureTemplate> {
        &self.template
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn mirrored(&self) -> bool {
        self.mirrored
    }

    pub fn size_override(&self) -> Option<StructureSize> {
        self.size_override
    }

    /// The size the alignment is computed from: the override if set,
    /// otherwise the template's own size.
    pub fn effective_size(&self) -> StructureSize {
        self.size_override.unwrap_or_else(|| self.template.size())
    }

    /// Total cells including `Empty` requirements.
    pub fn cell_count(&self) -> usize {
        self.cell_count
    }

    /// Cells that require a block. Zero means nothing to preview or build.
    pub fn block_count(&self) -> usize {
        self.block_count
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Layer keys (untransformed Y) in ascending order.
    pub fn layer_keys(&self) -> impl Iterator<Item = i32> + '_ {
        self.layers.keys().copied()
    }

    pub fn layer_len(&self, layer: i32) -> usize {
        self.layers.get(&layer).map_or(0, Vec::len)
    }

    pub fn cache(&self) -> &CachedOffset {
        &self.offset
    }

    pub fn set_rotation(&mut self, rotation: Rotation) {
        if self.rotation != rotation {
            self.rotation = rotation;
            self.offset.invalidate();
        }
    }

    pub fn rotate_clockwise(&mut self) {
        self.set_rotation(self.rotation.clockwise());
    }

    pub fn set_mirrored(&mut self, mirrored: bool) {
        if self.mirrored != mirrored {
            self.mirrored = mirrored;
            self.offset.invalidate();
        }
    }

    pub fn toggle_mirror(&mut self) {
        self.set_mirrored(!self.mirrored);
    }

    pub fn set_size_override(&mut self, size: Option<StructureSize>) {
        if self.size_override != size {
            self.size_override = size;
            self.offset.invalidate();
        }
    }

    /// The current alignment offset, recomputed if dirty.
    pub fn offset(&mut self) -> VoxelCoord {
        self.refresh()
    }

    /// Recompute the offset and every cell position if the cache is dirty.
    fn refresh(&mut self) -> VoxelCoord {
        let (size, rotation, mirrored) = (self.effective_size(), self.rotation, self.mirrored);
        let (offset, recomputed) = self.offset.get_or_compute(size, rotation, mirrored);
        if recomputed {
            for cell in self.layers.values_mut().flatten() {
                cell.position = transform::place_cell(cell.original, rotation, mirrored, offset);
            }
        }
        offset
    }

    fn visit(&self, cells: &[LayerCell], visitor: &mut impl FnMut(&CellInfo<'_>) -> bool) -> bool {
        let template_cells = self.template.cells();
        for cell in cells {
            let info = CellInfo {
                position: cell.position,
                original: cell.original,
                requirement: &template_cells[cell.index].requirement,
                rotation: self.rotation,
                mirrored: self.mirrored,
            };
            if visitor(&info) {
                return true;
            }
        }
        false
    }

    /// Visit every cell of one layer. Returns true if the visitor asked to
    /// stop; false if the layer is absent/empty or the visitor never stopped.
    pub fn process_layer(
        &mut self,
        layer: i32,
        mut visitor: impl FnMut(&CellInfo<'_>) -> bool,
    ) -> bool {
        self.refresh();
        match self.layers.get(&layer) {
            Some(cells) => self.visit(cells, &mut visitor),
            None => false,
        }
    }

    /// Visit every cell of every layer in ascending layer order.
    pub fn process_all(&mut self, mut visitor: impl FnMut(&CellInfo<'_>) -> bool) -> bool {
        self.refresh();
        self.layers
            .values()
            .any(|cells| self.visit(cells, &mut visitor))
    }
}

impl PartialEq for Projection {
    fn eq(&self, other: &Self) -> bool {
        self.template.id == other.template.id
            && self.mirrored == other.mirrored
            && self.rotation == other.rotation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BlockId, Facing, StructureId};

    const STONE: BlockState = BlockState::of(BlockId(1));

    fn two_layer_template() -> Arc<StructureTemplate> {
        Arc::new(StructureTemplate::new(
            StructureId::new("tower"),
            [
                (VoxelCoord::new(0, 0, 0), Requirement::Exact(STONE)),
                (VoxelCoord::new(2, 0, 0), Requirement::Exact(STONE)),
                (VoxelCoord::new(1, 1, 1), Requirement::Empty),
                (
                    VoxelCoord::new(1, 0, 1),
                    Requirement::Exact(BlockState::facing(BlockId(5), Facing::North)),
                ),
            ],
        ))
    }

    fn collect(projection: &mut Projection) -> Vec<(VoxelCoord, VoxelCoord)> {
        let mut out = Vec::new();
        projection.process_all(|info| {
            out.push((info.original, info.position));
            false
        });
        out
    }

    #[test]
    fn layers_are_keyed_by_untransformed_y() {
        let mut p = Projection::build(two_layer_template(), Rotation::Clockwise90, true, None);
        assert_eq!(p.layer_count(), 2);
        assert_eq!(p.layer_keys().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(p.layer_len(0), 3);
        assert_eq!(p.layer_len(1), 1);
        assert_eq!(p.cell_count(), 4);
        assert_eq!(p.block_count(), 3);
        // Every cell appears once, in insertion order within ascending layers.
        let originals: Vec<_> = collect(&mut p).into_iter().map(|(o, _)| o).collect();
        assert_eq!(
            originals,
            vec![
                VoxelCoord::new(0, 0, 0),
                VoxelCoord::new(2, 0, 0),
                VoxelCoord::new(1, 0, 1),
                VoxelCoord::new(1, 1, 1),
            ]
        );
    }

    #[test]
    fn positions_follow_transform_and_offset() {
        let template = two_layer_template();
        let size = template.size();
        let mut p = Projection::build(template, Rotation::Clockwise180, false, None);
        let offset = transform::compute_offset(size, Rotation::Clockwise180, false);
        for (original, position) in collect(&mut p) {
            assert_eq!(
                position,
                transform::transform_cell(original, Rotation::Clockwise180, false) - offset
            );
            assert_eq!(position.y, original.y);
        }
    }

    #[test]
    fn offset_recomputes_only_when_dirty() {
        let mut p = Projection::build(two_layer_template(), Rotation::None, false, None);
        assert!(p.cache().is_valid());
        assert_eq!(p.cache().generation(), 1);

        p.process_all(|_| false);
        p.offset();
        assert_eq!(p.cache().generation(), 1);

        // Setting the same value does not dirty the cache.
        p.set_rotation(Rotation::None);
        assert!(p.cache().is_valid());

        p.rotate_clockwise();
        assert!(!p.cache().is_valid());
        p.process_layer(0, |_| false);
        assert_eq!(p.cache().generation(), 2);

        p.toggle_mirror();
        p.set_size_override(Some(StructureSize::new(5, 2, 5)));
        p.offset();
        assert_eq!(p.cache().generation(), 3);
        assert_eq!(
            p.offset(),
            transform::compute_offset(StructureSize::new(5, 2, 5), Rotation::Clockwise90, true)
        );
    }

    #[test]
    fn visitor_can_stop_early() {
        let mut p = Projection::build(two_layer_template(), Rotation::None, false, None);
        let mut seen = 0;
        let stopped = p.process_all(|_| {
            seen += 1;
            seen == 2
        });
        assert!(stopped);
        assert_eq!(seen, 2);

        assert!(!p.process_layer(1, |_| false));
        assert!(!p.process_layer(7, |_| true), "absent layer never stops");
    }

    #[test]
    fn display_state_rotates_facing() {
        let mut p = Projection::build(two_layer_template(), Rotation::Clockwise90, false, None);
        let mut facings = Vec::new();
        p.process_layer(0, |info| {
            if let Some(state) = info.display_state(0, 20) {
                facings.push(state.facing);
            }
            false
        });
        assert_eq!(facings, vec![None, None, Some(Facing::East)]);
    }

    #[test]
    fn empty_template_projects_to_nothing() {
        let empty = Arc::new(StructureTemplate::new(StructureId::new("void"), []));
        let mut p = Projection::build(empty, Rotation::Clockwise270, true, None);
        assert_eq!(p.block_count(), 0);
        assert_eq!(p.layer_count(), 0);
        assert!(!p.process_all(|_| true));
    }

    #[test]
    fn equality_ignores_size_override() {
        let template = two_layer_template();
        let a = Projection::build(template.clone(), Rotation::Clockwise90, false, None);
        let b = Projection::build(
            template.clone(),
            Rotation::Clockwise90,
            false,
            Some(StructureSize::new(9, 9, 9)),
        );
        let c = Projection::build(template, Rotation::Clockwise90, true, None);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
