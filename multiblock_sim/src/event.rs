// Fabrication events: the engine's user-visible output.
//
// Tasks and the manager report through a `ProgressSink`. Delivery is
// best-effort: the engine pushes each event once and never retries. The host
// implementation is a plain `Vec<FabricationEvent>` that `sim.rs` drains into
// its `StepResult`, mirroring how the sim returns narrative events.
//
// Per task the engine emits:
// - one `Progress` per placed block on the incremental path,
// - exactly one `BuildCompleted`, whether the queue ran out normally
//   (`drained == false`) or was flushed by instant completion
//   (`drained == true`).
//
// See also: `task.rs` for when each event fires, `sim.rs` for
// `BuildStarted` / `BuildRejected`.

use crate::types::{ActorId, StructureId, VoxelCoord};
use serde::{Deserialize, Serialize};

/// Receives progress notifications from fabrication tasks.
pub trait ProgressSink {
    fn emit(&mut self, kind: FabricationEventKind);
}

/// An event emitted by the fabricator for the UI / chat feedback.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FabricationEvent {
    pub tick: u64,
    pub kind: FabricationEventKind,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FabricationEventKind {
    /// A preview session was opened or re-oriented.
    SelectionChanged {
        actor: ActorId,
        origin: VoxelCoord,
        structure: StructureId,
    },
    /// A preview session was discarded.
    SelectionCleared { actor: ActorId, origin: VoxelCoord },
    /// Resources were reserved and a task was registered.
    BuildStarted {
        actor: ActorId,
        placements: usize,
        energy_cost: u64,
    },
    /// A build request was refused; nothing was consumed.
    BuildRejected { actor: ActorId, reason: String },
    /// One placement finished on the incremental path.
    Progress {
        actor: ActorId,
        current: usize,
        total: usize,
    },
    /// The task finished. `drained` is true when the remaining queue was
    /// written in one batch by instant completion.
    BuildCompleted { actor: ActorId, drained: bool },
}

/// Collects events tagged with the tick they were emitted on.
#[derive(Debug, Default)]
pub struct EventLog {
    pub tick: u64,
    pub events: Vec<FabricationEvent>,
}

impl EventLog {
    pub fn new(tick: u64) -> Self {
        Self {
            tick,
            events: Vec::new(),
        }
    }

    pub fn progress_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e.kind, FabricationEventKind::Progress { .. }))
            .count()
    }

    pub fn completions(&self) -> impl Iterator<Item = &FabricationEventKind> {
        self.events
            .iter()
            .map(|e| &e.kind)
            .filter(|k| matches!(k, FabricationEventKind::BuildCompleted { .. }))
    }
}

impl ProgressSink for EventLog {
    fn emit(&mut self, kind: FabricationEventKind) {
        self.events.push(FabricationEvent {
            tick: self.tick,
            kind,
        });
    }
}
