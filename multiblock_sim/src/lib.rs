// multiblock_sim: structure projection and incremental fabrication.
//
// This crate lets an actor preview a predefined multiblock structure in a
// voxel world under any of the 8 rotation/mirror orientations, and then build
// it block by block on a tick-driven schedule, with the build cost validated
// and reserved atomically before the first block is placed. It has no
// rendering, networking or inventory-UI dependencies and can be tested,
// benchmarked and run headless.
//
// Module overview:
// - `types.rs`:      VoxelCoord, StructureSize, Rotation, Facing, BlockId/BlockState, IDs.
// - `template.rs`:   StructureTemplate + Requirement (Exact / AnyOf / Empty), pattern builder.
// - `provider.rs`:   StructureProvider trait, static and size-variant providers.
// - `transform.rs`:  Rotation/mirror cell transform and alignment offset.
// - `projection.rs`: Layered, cached projection of a template under a transform.
// - `placement.rs`:  Placement resolution in build order, structure match checking.
// - `world.rs`:      WorldAccessor trait + dense VoxelWorld with region loading.
// - `task.rs`:       FabricationTask, the per-build state machine.
// - `manager.rs`:    FabricationManager: one live task per actor, per-tick scheduling.
// - `resources.rs`:  Cost model, energy/material sources, validation and reservation.
// - `event.rs`:      ProgressSink + FabricationEvent output.
// - `command.rs`:    FabricatorCommand / FabricatorAction, all host mutations.
// - `config.rs`:     FabricatorConfig, every tunable parameter.
// - `error.rs`:      Error taxonomy.
// - `sim.rs`:        FabricatorState, the host (world, actors, sessions, tick loop).
//
// **Critical constraint: determinism.** The host is a pure function
// `(state, commands) -> (new_state, events)`. No system time, no OS entropy,
// and `BTreeMap` for anything that is iterated.

pub mod command;
pub mod config;
pub mod error;
pub mod event;
pub mod manager;
pub mod placement;
pub mod projection;
pub mod provider;
pub mod resources;
pub mod sim;
pub mod task;
pub mod template;
pub mod transform;
pub mod types;
pub mod world;
