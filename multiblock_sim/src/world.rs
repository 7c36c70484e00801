// World access for the fabricator, plus a dense in-memory world.
//
// `WorldAccessor` is the capability the engine is handed to read and write
// blocks. The engine only calls `set_block` / `notify_neighbors` on cells
// that are in bounds, and never does a read-modify-write across calls.
// Incremental placement also requires the cell's region to be loaded; the
// instant drain (`FabricationTask::complete_instantly`) does not, and writes
// the rest of its queue into unloaded regions too.
//
// `VoxelWorld` is the host's implementation: a flat `Vec<BlockState>` indexed
// by `x + z * size_x + y * size_x * size_z`, giving O(1) access.
// Out-of-bounds reads return air; out-of-bounds writes are no-ops. The world
// is divided into square columns of `region_size` voxels ("regions") that can
// be marked unloaded to model chunks leaving memory.
//
// See also: `task.rs`, the only writer, and `sim.rs` which owns the world.
//
// **Critical constraint: single writer.** All world modifications happen on
// the tick thread through the fabrication task. No concurrent mutation.

use crate::types::{BlockState, DimensionId, VoxelCoord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The world capability consumed by fabrication tasks.
pub trait WorldAccessor {
    fn is_region_loaded(&self, cell: VoxelCoord) -> bool;
    fn in_bounds(&self, cell: VoxelCoord) -> bool;
    fn get_block(&self, cell: VoxelCoord) -> BlockState;
    fn set_block(&mut self, cell: VoxelCoord, state: BlockState);
    /// Tell blocks around `cell` that it changed to `state`.
    fn notify_neighbors(&mut self, cell: VoxelCoord, state: BlockState);
}

/// Region key `(rx, rz)` of the column containing `cell`.
pub fn region_of(cell: VoxelCoord, region_size: i32) -> (i32, i32) {
    let size = region_size.max(1);
    (cell.x.div_euclid(size), cell.z.div_euclid(size))
}

/// Dense 3D block grid.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct VoxelWorld {
    /// Flat storage: index = x + z * size_x + y * size_x * size_z.
    blocks: Vec<BlockState>,
    pub size_x: u32,
    pub size_y: u32,
    pub size_z: u32,
    pub dimension: DimensionId,
    pub region_size: i32,
    unloaded: BTreeSet<(i32, i32)>,
    /// Successful `set_block` calls since creation.
    writes: u64,
    /// `notify_neighbors` calls since creation.
    neighbor_updates: u64,
}

impl VoxelWorld {
    /// Create a new world filled with air, with every region loaded.
    pub fn new(size_x: u32, size_y: u32, size_z: u32, region_size: i32) -> Self {
        let total = (size_x as usize) * (size_y as usize) * (size_z as usize);
        Self {
            blocks: vec![BlockState::AIR; total],
            size_x,
            size_y,
            size_z,
            dimension: DimensionId::default(),
            region_size,
            unloaded: BTreeSet::new(),
            writes: 0,
            neighbor_updates: 0,
        }
    }

    pub fn with_dimension(mut self, dimension: DimensionId) -> Self {
        self.dimension = dimension;
        self
    }

    /// Convert a coordinate to a flat index. Returns `None` if out of bounds.
    fn index(&self, coord: VoxelCoord) -> Option<usize> {
        if self.in_bounds(coord) {
            let x = coord.x as usize;
            let y = coord.y as usize;
            let z = coord.z as usize;
            let sx = self.size_x as usize;
            let sz = self.size_z as usize;
            Some(x + z * sx + y * sx * sz)
        } else {
            None
        }
    }

    pub fn region_of(&self, cell: VoxelCoord) -> (i32, i32) {
        region_of(cell, self.region_size)
    }

    pub fn unload_region(&mut self, region: (i32, i32)) {
        self.unloaded.insert(region);
    }

    pub fn load_region(&mut self, region: (i32, i32)) {
        self.unloaded.remove(&region);
    }

    pub fn writes(&self) -> u64 {
        self.writes
    }

    pub fn neighbor_updates(&self) -> u64 {
        self.neighbor_updates
    }

    /// Number of non-air blocks (for tests and diagnostics).
    pub fn solid_count(&self) -> usize {
        self.blocks.iter().filter(|b| !b.is_air()).count()
    }
}

impl WorldAccessor for VoxelWorld {
    fn is_region_loaded(&self, cell: VoxelCoord) -> bool {
        !self.unloaded.contains(&self.region_of(cell))
    }

    fn in_bounds(&self, coord: VoxelCoord) -> bool {
        coord.x >= 0
            && coord.y >= 0
            && coord.z >= 0
            && (coord.x as u32) < self.size_x
            && (coord.y as u32) < self.size_y
            && (coord.z as u32) < self.size_z
    }

    fn get_block(&self, cell: VoxelCoord) -> BlockState {
        self.index(cell)
            .map(|i| self.blocks[i])
            .unwrap_or(BlockState::AIR)
    }

    fn set_block(&mut self, cell: VoxelCoord, state: BlockState) {
        if let Some(i) = self.index(cell) {
            self.blocks[i] = state;
            self.writes += 1;
        }
    }

    fn notify_neighbors(&mut self, _cell: VoxelCoord, _state: BlockState) {
        // The dense world has no block behaviors to wake; count the call so
        // callers can observe it.
        self.neighbor_updates += 1;
    }
}
