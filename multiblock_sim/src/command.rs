// Commands that drive the fabricator.
//
// Every external request (a tool click, a key press in the preview UI, an
// actor logging out) reaches the fabricator as a `FabricatorCommand`. The host
// is a function `(state, commands) -> (new_state, events)`; commands are the
// only input.
//
// A `FabricatorCommand` carries the issuing `actor`, the `tick` it applies on,
// and a `FabricatorAction`:
// - `SelectStructure`: open (or re-orient) a preview session at an origin.
// - `RotateSelection` / `ToggleMirror`: re-orient an open session.
// - `CancelSelection`: discard a session.
// - `RequestBuild`: validate, reserve resources and start a task from a
//   session (see `resources.rs`).
// - `LinkEnergy` / `LinkContainer`: bind or unbind the actor's tool links.
// - `Leave`: the actor disconnected; its live task is drained.
//
// Sessions are keyed by origin; an actor may only act on sessions it owns.
//
// See also: `sim.rs` for `apply_command()` which dispatches these,
// `event.rs` for what each command reports back.

use crate::resources::LinkedPosition;
use crate::types::{ActorId, Rotation, StructureId, StructureSize, VoxelCoord};
use serde::{Deserialize, Serialize};

/// An actor-issued command targeting a specific tick.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FabricatorCommand {
    pub actor: ActorId,
    pub tick: u64,
    pub action: FabricatorAction,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FabricatorAction {
    /// Preview `structure` at `origin`. `size` picks a size variant for
    /// structures that have several.
    SelectStructure {
        origin: VoxelCoord,
        structure: StructureId,
        rotation: Rotation,
        mirrored: bool,
        size: Option<StructureSize>,
    },
    /// Turn the session at `origin` a quarter turn clockwise.
    RotateSelection { origin: VoxelCoord },
    ToggleMirror { origin: VoxelCoord },
    CancelSelection { origin: VoxelCoord },
    /// Build the session at `origin`. With `skip_satisfied`, cells the world
    /// already satisfies are neither charged for nor placed.
    RequestBuild {
        origin: VoxelCoord,
        skip_satisfied: bool,
    },
    /// `None` clears the link.
    LinkEnergy { target: Option<LinkedPosition> },
    LinkContainer { target: Option<LinkedPosition> },
    Leave,
}
