// Fabrication tasks: the incremental, tick-driven writer of one build.
//
// A `FabricationTask` owns an ordered placement queue (see `placement.rs` for
// the bottom-up ordering), a cursor into it, and a per-quantum counter. The
// manager calls `tick` once per world tick; every `ticks_per_placement`
// ticks the task writes the block under the cursor, notifies its neighbors,
// advances the cursor and emits a `Progress` event.
//
// ## Lifecycle
//
//   Pending ──tick──▶ Running ──cursor reaches end──▶ Completed
//                        │
//                        └──region unloaded / forced──▶ Completed (drained)
//
// There is no failed state. Any abnormal exit (the next cell's region is not
// loaded, the actor left, a newer build superseded this one) goes through
// `complete_instantly`, which writes every remaining placement in one batch
// without progress events. `completed` is checked first in every entry point
// and never reset, so a completed task never writes again and emits exactly
// one `BuildCompleted`.
//
// See also: `manager.rs` which owns and retires tasks, `world.rs` for the
// `WorldAccessor` capability, `event.rs` for `ProgressSink`.

use crate::placement::{self, Placement};
use crate::event::{FabricationEventKind, ProgressSink};
use crate::types::ActorId;
use crate::world::WorldAccessor;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Observable lifecycle state of a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    /// Constructed, never ticked.
    Pending,
    /// Ticked at least once, queue not exhausted.
    Running,
    /// Terminal.
    Completed,
}

/// Result of one `tick`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// The task is completed; the manager should retire it.
    Done,
    /// More placements remain.
    Continue,
}

/// An incremental build owned by one actor.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FabricationTask {
    pub actor: ActorId,
    queue: Vec<Placement>,
    cursor: usize,
    /// Ticks accumulated toward the next placement.
    quantum: u32,
    ticks_per_placement: u32,
    started: bool,
    completed: bool,
}

impl FabricationTask {
    /// Create a task from any placement list. The list is re-sorted into
    /// build order, so callers may resolve it however they like.
    pub fn new(
        actor: ActorId,
        mut placements: Vec<Placement>,
        ticks_per_placement: u32,
    ) -> Self {
        placement::sort_for_build(&mut placements);
        Self {
            actor,
            queue: placements,
            cursor: 0,
            quantum: 0,
            ticks_per_placement: ticks_per_placement.max(1),
            started: false,
            completed: false,
        }
    }

    pub fn state(&self) -> TaskState {
        if self.completed {
            TaskState::Completed
        } else if self.started {
            TaskState::Running
        } else {
            TaskState::Pending
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn remaining(&self) -> &[Placement] {
        &self.queue[self.cursor.min(self.queue.len())..]
    }

    pub fn placements(&self) -> &[Placement] {
        &self.queue
    }

    /// Advance by one scheduler tick.
    pub fn tick(&mut self, world: &mut dyn WorldAccessor, sink: &mut dyn ProgressSink) -> TickOutcome {
        if self.completed {
            return TickOutcome::Done;
        }
        self.started = true;
        let Some(&next) = self.queue.get(self.cursor) else {
            self.finish(false, sink);
            return TickOutcome::Done;
        };

        if !world.is_region_loaded(next.pos) {
            warn!(
                "{}: region at {} not loaded, completing build instantly ({} of {} placed)",
                self.actor,
                next.pos,
                self.cursor,
                self.queue.len()
            );
            self.complete_instantly(world, sink);
            return TickOutcome::Done;
        }

        self.quantum += 1;
        if self.quantum < self.ticks_per_placement {
            return TickOutcome::Continue;
        }
        self.quantum = 0;

        if world.in_bounds(next.pos) {
            world.set_block(next.pos, next.state);
            world.notify_neighbors(next.pos, next.state);
        }
        self.cursor += 1;
        sink.emit(FabricationEventKind::Progress {
            actor: self.actor,
            current: self.cursor,
            total: self.queue.len(),
        });

        if self.cursor >= self.queue.len() {
            self.finish(false, sink);
            TickOutcome::Done
        } else {
            TickOutcome::Continue
        }
    }

    /// Write every remaining placement at once and complete. Out-of-bounds
    /// cells are skipped. No progress events. No-op once completed.
    pub fn complete_instantly(&mut self, world: &mut dyn WorldAccessor, sink: &mut dyn ProgressSink) {
        if self.completed {
            return;
        }
        let start = self.cursor;
        for p in &self.queue[start..] {
            if world.in_bounds(p.pos) {
                world.set_block(p.pos, p.state);
            }
        }
        self.cursor = self.queue.len();
        debug!(
            "{}: drained {} placements instantly",
            self.actor,
            self.queue.len() - start
        );
        self.finish(true, sink);
    }

    fn finish(&mut self, drained: bool, sink: &mut dyn ProgressSink) {
        if self.completed {
            return;
        }
        self.completed = true;
        sink.emit(FabricationEventKind::BuildCompleted {
            actor: self.actor,
            drained,
        });
    }
}
