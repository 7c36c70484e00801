// Fabrication manager: one live task per actor, advanced once per tick.
//
// The manager owns the actor → task map and is the only code that mutates
// it. It is constructed with the host (see `sim.rs`) and cleared with
// `shutdown` when the host stops, rather than living in a global.
//
// Policies:
// - Supersede, don't queue: `add_task` for an actor with a live task first
//   completes the old task instantly, then registers the new one.
// - Departure drains: when an actor is no longer reachable (checked every tick
//   through `ActorRegistry`, or reported through `on_actor_departure`), its task
//   is completed instantly and removed. A structure is never left half-built
//   across a disconnect.
// - Completed tasks are retired on the next tick.
//
// Tasks are stored in a `BTreeMap` so iteration is deterministic, but callers
// must not rely on any cross-actor ordering. Only the order of placements
// within one task is guaranteed.
//
// See also: `task.rs` for the per-task state machine, `sim.rs` for the
// request path that validates resources before calling `add_task`.

use crate::event::ProgressSink;
use crate::task::{FabricationTask, TickOutcome};
use crate::types::ActorId;
use crate::world::WorldAccessor;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Resolves actor ids to live, reachable actors.
pub trait ActorRegistry {
    fn is_reachable(&self, actor: ActorId) -> bool;
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FabricationManager {
    tasks: BTreeMap<ActorId, FabricationTask>,
}

impl FabricationManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn task(&self, actor: ActorId) -> Option<&FabricationTask> {
        self.tasks.get(&actor)
    }

    /// True iff the actor has a task that has not completed.
    pub fn has_active_task(&self, actor: ActorId) -> bool {
        self.tasks.get(&actor).is_some_and(|t| !t.is_completed())
    }

    /// Register `task` for `actor`, first draining any live task it replaces.
    pub fn add_task(
        &mut self,
        actor: ActorId,
        task: FabricationTask,
        world: &mut dyn WorldAccessor,
        sink: &mut dyn ProgressSink,
    ) {
        if let Some(mut previous) = self.tasks.remove(&actor) {
            if !previous.is_completed() {
                debug!(
                    "{actor}: superseding build at {}/{} placements",
                    previous.cursor(),
                    previous.len()
                );
                previous.complete_instantly(world, sink);
            }
        }
        debug!("{actor}: registered build with {} placements", task.len());
        self.tasks.insert(actor, task);
    }

    /// Advance every live task by one tick and retire finished ones.
    pub fn on_tick(
        &mut self,
        world: &mut dyn WorldAccessor,
        actors: &dyn ActorRegistry,
        sink: &mut dyn ProgressSink,
    ) {
        if self.tasks.is_empty() {
            return;
        }
        self.tasks.retain(|&actor, task| {
            if task.is_completed() {
                return false;
            }
            if !actors.is_reachable(actor) {
                warn!("{actor}: unreachable with a live build, completing instantly");
                task.complete_instantly(world, sink);
                return false;
            }
            task.tick(world, sink) == TickOutcome::Continue
        });
    }

    /// Drain and remove the actor's task, if it has one.
    pub fn on_actor_departure(
        &mut self,
        actor: ActorId,
        world: &mut dyn WorldAccessor,
        sink: &mut dyn ProgressSink,
    ) {
        if let Some(mut task) = self.tasks.remove(&actor) {
            if !task.is_completed() {
                debug!("{actor}: departed, completing build instantly");
                task.complete_instantly(world, sink);
            }
        }
    }

    /// Drain every live task and clear the map (host shutdown).
    pub fn shutdown(&mut self, world: &mut dyn WorldAccessor, sink: &mut dyn ProgressSink) {
        for (_, mut task) in std::mem::take(&mut self.tasks) {
            task.complete_instantly(world, sink);
        }
    }
}
