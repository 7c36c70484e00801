// Placement resolution: projection + origin + tick -> ordered world writes.
//
// `resolve_placements` walks every layer of a projection, offsets each cell by
// the origin, and resolves its displayed block at the given tick (any-of
// requirements pick their time-bucketed option, exact requirements resolve to
// themselves, both with facing oriented to the projection). Empty
// requirements are skipped.
//
// The result is sorted by `(y, x, z)` so a build always proceeds bottom-up,
// one layer at a time, in a fixed order. Supporting blocks must exist before
// the blocks resting on them, so this ordering is part of the contract; tasks
// built from caller-supplied placement lists go through `sort_for_build`
// too.
//
// `check_structure` is the reverse direction: compare a projection against the
// world and list every cell that does not satisfy its requirement.
//
// See also: `task.rs` which executes placements, `resources.rs` which prices
// them.

use crate::projection::Projection;
use crate::types::{BlockState, VoxelCoord};
use crate::world::WorldAccessor;
use serde::{Deserialize, Serialize};

/// One block write: a world-absolute cell and the state to put there.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub pos: VoxelCoord,
    pub state: BlockState,
}

/// Sort placements into execution order: ascending y, then x, then z.
/// Stable, so duplicate cells keep their relative order.
pub fn sort_for_build(placements: &mut [Placement]) {
    placements.sort_by_key(|p| p.pos.build_order_key());
}

/// Resolve every non-empty cell of `projection` at `origin`, in build order.
pub fn resolve_placements(
    projection: &mut Projection,
    origin: VoxelCoord,
    tick: u64,
    cycle_ticks: u64,
) -> Vec<Placement> {
    let mut placements = Vec::with_capacity(projection.block_count());
    projection.process_all(|info| {
        if let Some(state) = info.display_state(tick, cycle_ticks) {
            placements.push(Placement {
                pos: info.world_position(origin),
                state,
            });
        }
        false
    });
    sort_for_build(&mut placements);
    placements
}

/// Like `resolve_placements`, but leaves out cells the world already
/// satisfies (e.g. a partially built structure).
pub fn resolve_missing_placements(
    projection: &mut Projection,
    origin: VoxelCoord,
    tick: u64,
    cycle_ticks: u64,
    world: &dyn WorldAccessor,
) -> Vec<Placement> {
    let mut placements = Vec::new();
    projection.process_all(|info| {
        let pos = info.world_position(origin);
        if info.matches(world.get_block(pos)) {
            return false;
        }
        if let Some(state) = info.display_state(tick, cycle_ticks) {
            placements.push(Placement { pos, state });
        }
        false
    });
    sort_for_build(&mut placements);
    placements
}

/// A cell whose world block does not satisfy its requirement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Mismatch {
    pub pos: VoxelCoord,
    pub found: BlockState,
}

/// Every cell of the projection at `origin` that the world does not satisfy.
/// Empty when the structure is complete.
pub fn check_structure(
    projection: &mut Projection,
    origin: VoxelCoord,
    world: &dyn WorldAccessor,
) -> Vec<Mismatch> {
    let mut mismatches = Vec::new();
    projection.process_all(|info| {
        let pos = info.world_position(origin);
        let found = world.get_block(pos);
        if !info.matches(found) {
            mismatches.push(Mismatch { pos, found });
        }
        false
    });
    mismatches
}

/// Whether the structure at `origin` is fully formed. Stops at the first
/// mismatch.
pub fn is_complete(projection: &mut Projection, origin: VoxelCoord, world: &dyn WorldAccessor) -> bool {
    !projection.process_all(|info| !info.matches(world.get_block(info.world_position(origin))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{Requirement, StructureTemplate};
    use crate::transform;
    use crate::types::{BlockId, Rotation, StructureId};
    use crate::world::VoxelWorld;
    use std::sync::Arc;

    const STONE: BlockState = BlockState::of(BlockId(1));
    const IRON: BlockState = BlockState::of(BlockId(2));
    const GOLD: BlockState = BlockState::of(BlockId(3));

    fn pillar() -> Projection {
        let template = StructureTemplate::new(
            StructureId::new("pillar"),
            [
                (VoxelCoord::new(0, 2, 0), Requirement::Exact(STONE)),
                (VoxelCoord::new(1, 0, 0), Requirement::any_of("rune", [IRON, GOLD]).unwrap()),
                (VoxelCoord::new(0, 1, 0), Requirement::Empty),
                (VoxelCoord::new(0, 0, 0), Requirement::Exact(STONE)),
            ],
        );
        Projection::build(Arc::new(template), Rotation::None, false, None)
    }

    #[test]
    fn resolves_in_bottom_up_order_and_skips_empty() {
        let mut p = pillar();
        let origin = VoxelCoord::new(10, 64, 10);
        let placements = resolve_placements(&mut p, origin, 0, 20);
        assert_eq!(placements.len(), 3);
        let ys: Vec<_> = placements.iter().map(|pl| pl.pos.y).collect();
        assert_eq!(ys, vec![64, 64, 66]);
        // Offset for a 2x3x1 footprint at 0°: (1, 0, 0).
        assert_eq!(placements[0].pos, VoxelCoord::new(9, 64, 10));
        assert_eq!(placements[1].pos, VoxelCoord::new(10, 64, 10));
        assert_eq!(placements[1].state, IRON);
    }

    #[test]
    fn any_of_resolution_depends_on_tick() {
        let mut p = pillar();
        let early = resolve_placements(&mut p, VoxelCoord::ZERO, 0, 20);
        let later = resolve_placements(&mut p, VoxelCoord::ZERO, 25, 20);
        assert_eq!(early[1].state, IRON);
        assert_eq!(later[1].state, GOLD);
    }

    #[test]
    fn sort_for_build_orders_arbitrary_lists() {
        let mut list = vec![
            Placement { pos: VoxelCoord::new(0, 5, 0), state: STONE },
            Placement { pos: VoxelCoord::new(3, 1, 9), state: STONE },
            Placement { pos: VoxelCoord::new(3, 1, 2), state: STONE },
            Placement { pos: VoxelCoord::new(1, 1, 7), state: STONE },
        ];
        sort_for_build(&mut list);
        let cells: Vec<_> = list.iter().map(|p| p.pos).collect();
        assert_eq!(
            cells,
            vec![
                VoxelCoord::new(1, 1, 7),
                VoxelCoord::new(3, 1, 2),
                VoxelCoord::new(3, 1, 9),
                VoxelCoord::new(0, 5, 0),
            ]
        );
    }

    #[test]
    fn check_structure_reports_missing_cells() {
        let mut p = pillar();
        let origin = VoxelCoord::new(4, 0, 4);
        let mut world = VoxelWorld::new(16, 16, 16, 16);
        assert_eq!(check_structure(&mut p, origin, &world).len(), 3);
        assert!(!is_complete(&mut p, origin, &world));

        for placement in resolve_placements(&mut p, origin, 0, 20) {
            world.set_block(placement.pos, placement.state);
        }
        assert!(check_structure(&mut p, origin, &world).is_empty());
        assert!(is_complete(&mut p, origin, &world));

        // Filling the required-empty cell breaks the structure.
        let offset = transform::compute_offset(p.effective_size(), Rotation::None, false);
        let hole = origin + VoxelCoord::new(0, 1, 0) - offset;
        world.set_block(hole, STONE);
        let mismatches = check_structure(&mut p, origin, &world);
        assert_eq!(mismatches, vec![Mismatch { pos: hole, found: STONE }]);
    }

    #[test]
    fn missing_placements_skip_satisfied_cells() {
        let mut p = pillar();
        let origin = VoxelCoord::new(4, 0, 4);
        let mut world = VoxelWorld::new(16, 16, 16, 16);
        let all = resolve_placements(&mut p, origin, 0, 20);
        world.set_block(all[0].pos, all[0].state);
        // A gold block satisfies the rune even though iron is displayed.
        world.set_block(all[1].pos, GOLD);
        let missing = resolve_missing_placements(&mut p, origin, 0, 20, &world);
        assert_eq!(missing, vec![all[2]]);
    }
}
