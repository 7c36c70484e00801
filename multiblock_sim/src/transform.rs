// Rotation / mirror algebra for placing a template in the world.
//
// A template cell `(x, y, z)` is placed in two steps:
//
// 1. `transform_cell` mirrors (negates x) when the mirror flag is set, then
//    rotates clockwise about the template origin:
//
//        0°:   ( x, z)
//        90°:  (-z, x)
//        180°: (-x,-z)
//        270°: ( z,-x)
//
//    Y is never touched.
//
// 2. The alignment offset from `compute_offset` is subtracted. The offset is
//    the minimum corner of the transformed footprint (so the footprint starts
//    at zero, whatever the orientation) plus half the transformed extent (so
//    the footprint is centred on the origin). With size `(sx, _, sz)`:
//
//        mirrored  rot   corner
//        no        0°    (0, 0)
//        no        90°   (1-sz, 0)
//        no        180°  (1-sx, 1-sz)
//        no        270°  (0, 1-sx)
//        yes       0°    (1-sx, 0)
//        yes       90°   (1-sz, 1-sx)
//        yes       180°  (0, 1-sz)
//        yes       270°  (0, 0)
//
//    Centering adds `(ex/2, ez/2)` where `(ex, ez)` is `(sx, sz)` for even
//    quadrants and `(sz, sx)` for odd ones.
//
// Everything here is a pure function of its inputs, with no world access, so
// results may be memoized by `(size, rotation, mirrored)` (see the cached
// offset in `projection.rs`).
//
// `transform_facing` applies the same rotation/mirror to orientation
// metadata carried by a block, independent of its position.

use crate::types::{Facing, Rotation, StructureSize, VoxelCoord};

/// Mirror (if set) then rotate a template-local cell about the origin.
pub fn transform_cell(cell: VoxelCoord, rotation: Rotation, mirrored: bool) -> VoxelCoord {
    let x = if mirrored { -cell.x } else { cell.x };
    let z = cell.z;
    let (tx, tz) = match rotation {
        Rotation::None => (x, z),
        Rotation::Clockwise90 => (-z, x),
        Rotation::Clockwise180 => (-x, -z),
        Rotation::Clockwise270 => (z, -x),
    };
    VoxelCoord::new(tx, cell.y, tz)
}

/// Minimum corner of the transformed footprint of a structure of `size`.
pub fn corner_offset(size: StructureSize, rotation: Rotation, mirrored: bool) -> VoxelCoord {
    let sx = size.x as i32;
    let sz = size.z as i32;
    let (dx, dz) = match (mirrored, rotation) {
        (false, Rotation::None) => (0, 0),
        (false, Rotation::Clockwise90) => (1 - sz, 0),
        (false, Rotation::Clockwise180) => (1 - sx, 1 - sz),
        (false, Rotation::Clockwise270) => (0, 1 - sx),
        (true, Rotation::None) => (1 - sx, 0),
        (true, Rotation::Clockwise90) => (1 - sz, 1 - sx),
        (true, Rotation::Clockwise180) => (0, 1 - sz),
        (true, Rotation::Clockwise270) => (0, 0),
    };
    VoxelCoord::new(dx, 0, dz)
}

/// Horizontal extent `(ex, ez)` of the footprint after rotation.
pub fn rotated_extent(size: StructureSize, rotation: Rotation) -> (u32, u32) {
    if rotation.swaps_axes() {
        (size.z, size.x)
    } else {
        (size.x, size.z)
    }
}

/// Alignment offset: corner correction plus centering. Subtract it from a
/// transformed cell to get the cell's position relative to the origin.
pub fn compute_offset(size: StructureSize, rotation: Rotation, mirrored: bool) -> VoxelCoord {
    let corner = corner_offset(size, rotation, mirrored);
    let (ex, ez) = rotated_extent(size, rotation);
    VoxelCoord::new(corner.x + (ex / 2) as i32, 0, corner.z + (ez / 2) as i32)
}

/// Final origin-relative position of a template cell under an orientation,
/// given a precomputed `offset` from `compute_offset`.
pub fn place_cell(
    cell: VoxelCoord,
    rotation: Rotation,
    mirrored: bool,
    offset: VoxelCoord,
) -> VoxelCoord {
    transform_cell(cell, rotation, mirrored) - offset
}

/// Rotate/mirror orientation metadata the same way `transform_cell` moves
/// positions. Vertical facings are unchanged.
pub fn transform_facing(facing: Facing, rotation: Rotation, mirrored: bool) -> Facing {
    let facing = if mirrored {
        match facing {
            Facing::East => Facing::West,
            Facing::West => Facing::East,
            other => other,
        }
    } else {
        facing
    };
    (0..rotation.quarter_turns()).fold(facing, |f, _| match f {
        Facing::North => Facing::East,
        Facing::East => Facing::South,
        Facing::South => Facing::West,
        Facing::West => Facing::North,
        vertical => vertical,
    })
}
