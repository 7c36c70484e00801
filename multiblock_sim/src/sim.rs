// Fabricator host state and tick loop.
//
// `FabricatorState` is the single owner of everything the fabricator touches:
// the voxel world, the actors with their holdings and tool links, the linked
// energy stores and containers, the registered structure providers, the open
// preview sessions, and the `FabricationManager`. It is constructed when a
// session/server starts and dropped (after `shutdown`) when it stops; nothing
// lives in globals.
//
// The host is a pure function `(state, commands) -> (new_state, events)`.
// `step` advances one tick at a time up to the target tick. Within a tick:
//
//   1. Commands whose tick has been reached are applied in slice order.
//   2. The manager advances every live task once.
//   3. Completion events are settled: the owning actor leaves build mode.
//
// ## Preview sessions
//
// A preview session is a `Projection` pinned to an origin and owned by one
// actor. `SelectStructure` opens or replaces the actor's own session at an
// origin; an origin another actor is previewing is refused. A re-selection
// with the same template and orientation keeps the session and only updates
// its size override; a different size variant is a different template and
// replaces it. Rotating, mirroring, cancelling and building act only on a
// session the actor owns. A session ends when it is cancelled, when its build
// starts, or when the owner leaves.
//
// ## Build requests
//
// `request_build` refuses an actor that is not in the world's dimension or
// already has a live task. It then resolves the session's placements
// (optionally skipping cells the world already satisfies), prices them, and
// reserves energy and materials atomically through `resources::reserve`. Only then is the task constructed and handed
// to the manager. Any refusal is reported as a `BuildRejected` event and has
// no side effects.
//
// Energy comes from the linked energy store when the link resolves, and from
// the actor's internal reservoir otherwise. Materials come from the actor's
// holdings first, then the linked container.
//
// ## Save/load
//
// `FabricatorState` derives `Serialize`/`Deserialize`. Providers and preview
// sessions are `#[serde(skip)]`: providers must be re-registered after
// `from_json`, and open previews are not restored. Live tasks are kept, so a
// restored host continues each build from its cursor.
//
// See also: `command.rs` for `FabricatorCommand`, `manager.rs` for the
// scheduler, `resources.rs` for cost and reservation, `placement.rs` for
// resolution, `config.rs` for `FabricatorConfig`.
//
// **Critical constraint: determinism.** All state mutations flow through
// commands or the tick loop. Anything iterated is a `BTreeMap`; the preview
// map is only ever looked up by key.

use crate::command::{FabricatorAction, FabricatorCommand};
use crate::config::FabricatorConfig;
use crate::error::BuildError;
use crate::event::{EventLog, FabricationEvent, FabricationEventKind, ProgressSink};
use crate::manager::{ActorRegistry, FabricationManager};
use crate::placement::{self, Mismatch, Placement};
use crate::projection::Projection;
use crate::provider::StructureProvider;
use crate::resources::{
    self, EnergyCell, EnergySource, Inventory, LinkedPosition, MaterialSource, PendingCommitment,
    ResourceContext, ToolSettings,
};
use crate::task::FabricationTask;
use crate::types::{ActorId, DimensionId, Rotation, StructureId, StructureSize, VoxelCoord};
use crate::world::VoxelWorld;
use log::{debug, info, warn};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Per-actor state the fabricator needs.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ActorState {
    pub dimension: DimensionId,
    /// False once the actor has left; its tasks are drained.
    pub connected: bool,
    pub holdings: Inventory,
    /// The tool's internal energy reservoir, if it has one.
    pub reservoir: Option<EnergyCell>,
    pub settings: ToolSettings,
    /// Set while one of the actor's builds is running.
    pub building: bool,
}

impl ActorState {
    pub fn new(dimension: DimensionId) -> Self {
        Self {
            dimension,
            connected: true,
            ..Self::default()
        }
    }

    pub fn with_holdings(mut self, holdings: Inventory) -> Self {
        self.holdings = holdings;
        self
    }

    pub fn with_reservoir(mut self, reservoir: EnergyCell) -> Self {
        self.reservoir = Some(reservoir);
        self
    }
}

impl ActorRegistry for BTreeMap<ActorId, ActorState> {
    fn is_reachable(&self, actor: ActorId) -> bool {
        self.get(&actor).is_some_and(|a| a.connected)
    }
}

/// A projection pinned to an origin, owned by one actor.
#[derive(Clone, Debug)]
pub struct PreviewSession {
    pub owner: ActorId,
    pub projection: Projection,
}

/// The result of processing commands and advancing the host.
#[derive(Debug)]
pub struct StepResult {
    pub events: Vec<FabricationEvent>,
}

#[derive(Serialize, Deserialize)]
pub struct FabricatorState {
    /// Last tick processed.
    pub tick: u64,
    pub config: FabricatorConfig,
    pub world: VoxelWorld,
    pub actors: BTreeMap<ActorId, ActorState>,
    #[serde(with = "linked_map")]
    pub energy_stores: BTreeMap<LinkedPosition, EnergyCell>,
    #[serde(with = "linked_map")]
    pub containers: BTreeMap<LinkedPosition, Inventory>,
    pub manager: FabricationManager,
    #[serde(skip)]
    providers: BTreeMap<StructureId, Box<dyn StructureProvider>>,
    #[serde(skip)]
    previews: FxHashMap<VoxelCoord, PreviewSession>,
}

impl FabricatorState {
    pub fn new(config: FabricatorConfig) -> Self {
        let (sx, sy, sz) = config.world_size;
        let world = VoxelWorld::new(sx, sy, sz, config.region_size);
        Self {
            tick: 0,
            config,
            world,
            actors: BTreeMap::new(),
            energy_stores: BTreeMap::new(),
            containers: BTreeMap::new(),
            manager: FabricationManager::new(),
            providers: BTreeMap::new(),
            previews: FxHashMap::default(),
        }
    }

    pub fn register_provider(&mut self, provider: impl StructureProvider + 'static) {
        self.providers
            .insert(provider.id().clone(), Box::new(provider));
    }

    pub fn add_actor(&mut self, actor: ActorId, state: ActorState) {
        self.actors.insert(actor, state);
    }

    pub fn session(&self, origin: VoxelCoord) -> Option<&PreviewSession> {
        self.previews.get(&origin)
    }

    pub fn session_count(&self) -> usize {
        self.previews.len()
    }

    /// Apply `commands` and advance to `target_tick`, one tick at a time.
    ///
    /// Commands must be sorted by tick. A command applies on the first
    /// processed tick at or after its own tick; commands with tick >
    /// `target_tick` are left unapplied (caller error).
    pub fn step(&mut self, commands: &[FabricatorCommand], target_tick: u64) -> StepResult {
        let mut log = EventLog::new(self.tick);
        let mut cmd_idx = 0;

        while self.tick < target_tick {
            self.tick += 1;
            log.tick = self.tick;
            let start = log.events.len();

            while cmd_idx < commands.len() && commands[cmd_idx].tick <= self.tick {
                let cmd = &commands[cmd_idx];
                cmd_idx += 1;
                self.apply_command(cmd, &mut log);
            }

            self.manager.on_tick(&mut self.world, &self.actors, &mut log);
            self.settle(&log.events[start..]);
        }

        StepResult { events: log.events }
    }

    fn apply_command(&mut self, cmd: &FabricatorCommand, log: &mut EventLog) {
        let actor = cmd.actor;
        let outcome = match &cmd.action {
            FabricatorAction::SelectStructure {
                origin,
                structure,
                rotation,
                mirrored,
                size,
            } => self
                .select_structure(actor, *origin, structure, *rotation, *mirrored, *size)
                .map(Some),
            FabricatorAction::RotateSelection { origin } => self
                .reorient(actor, *origin, Projection::rotate_clockwise)
                .map(Some),
            FabricatorAction::ToggleMirror { origin } => self
                .reorient(actor, *origin, Projection::toggle_mirror)
                .map(Some),
            FabricatorAction::CancelSelection { origin } => {
                self.cancel_selection(actor, *origin).map(Some)
            }
            FabricatorAction::RequestBuild {
                origin,
                skip_satisfied,
            } => {
                let result = self.request_build(actor, *origin, *skip_satisfied, log);
                if let Err(err) = &result {
                    log.emit(FabricationEventKind::BuildRejected {
                        actor,
                        reason: err.user_message(self.config.max_reported_shortfall),
                    });
                }
                result.map(|()| None)
            }
            FabricatorAction::LinkEnergy { target } => self
                .update_settings(actor, |s| s.linked_energy = *target)
                .map(|()| None),
            FabricatorAction::LinkContainer { target } => self
                .update_settings(actor, |s| s.linked_container = *target)
                .map(|()| None),
            FabricatorAction::Leave => {
                self.actor_departed(actor, log);
                Ok(None)
            }
        };

        match outcome {
            Ok(Some(kind)) => log.emit(kind),
            Ok(None) => {}
            Err(err) => warn!("{actor}: command rejected: {err}"),
        }
    }

    // -----------------------------------------------------------------------
    // Preview sessions
    // -----------------------------------------------------------------------

    /// Open (or replace) the preview session at `origin`.
    pub fn select_structure(
        &mut self,
        actor: ActorId,
        origin: VoxelCoord,
        structure: &StructureId,
        rotation: Rotation,
        mirrored: bool,
        size: Option<StructureSize>,
    ) -> Result<FabricationEventKind, BuildError> {
        if !self.actors.contains_key(&actor) {
            return Err(BuildError::UnknownActor(actor));
        }
        let provider = self
            .providers
            .get(structure)
            .ok_or_else(|| BuildError::UnknownStructure(structure.clone()))?;
        let size = size.filter(|s| provider.size_variants().contains(s));
        let template = provider.template(size, Some(&self.world));
        let projection = Projection::build(template, rotation, mirrored, size);

        match self.previews.get_mut(&origin) {
            Some(session) if session.owner != actor => {
                return Err(BuildError::SelectionTaken(origin));
            }
            // Same template and orientation: keep the session and its cache.
            Some(session)
                if session.projection == projection
                    && Arc::ptr_eq(session.projection.template(), projection.template()) =>
            {
                session.projection.set_size_override(size);
            }
            _ => {
                debug!("{actor}: previewing '{structure}' at {origin}");
                self.previews.insert(
                    origin,
                    PreviewSession {
                        owner: actor,
                        projection,
                    },
                );
            }
        }
        Ok(FabricationEventKind::SelectionChanged {
            actor,
            origin,
            structure: structure.clone(),
        })
    }

    fn owned_session(
        &mut self,
        actor: ActorId,
        origin: VoxelCoord,
    ) -> Result<&mut PreviewSession, BuildError> {
        self.previews
            .get_mut(&origin)
            .filter(|s| s.owner == actor)
            .ok_or(BuildError::NoSelection(origin))
    }

    fn reorient(
        &mut self,
        actor: ActorId,
        origin: VoxelCoord,
        change: fn(&mut Projection),
    ) -> Result<FabricationEventKind, BuildError> {
        let session = self.owned_session(actor, origin)?;
        change(&mut session.projection);
        Ok(FabricationEventKind::SelectionChanged {
            actor,
            origin,
            structure: session.projection.template().id.clone(),
        })
    }

    pub fn cancel_selection(
        &mut self,
        actor: ActorId,
        origin: VoxelCoord,
    ) -> Result<FabricationEventKind, BuildError> {
        self.owned_session(actor, origin)?;
        self.previews.remove(&origin);
        Ok(FabricationEventKind::SelectionCleared { actor, origin })
    }

    /// Placements the session at `origin` displays at the current tick.
    pub fn preview_placements(&mut self, origin: VoxelCoord) -> Result<Vec<Placement>, BuildError> {
        let session = self
            .previews
            .get_mut(&origin)
            .ok_or(BuildError::NoSelection(origin))?;
        Ok(placement::resolve_placements(
            &mut session.projection,
            origin,
            self.tick,
            self.config.any_of_cycle_ticks,
        ))
    }

    /// Cells of the session at `origin` the world does not yet satisfy.
    pub fn check_selection(&mut self, origin: VoxelCoord) -> Result<Vec<Mismatch>, BuildError> {
        let session = self
            .previews
            .get_mut(&origin)
            .ok_or(BuildError::NoSelection(origin))?;
        Ok(placement::check_structure(
            &mut session.projection,
            origin,
            &self.world,
        ))
    }

    // -----------------------------------------------------------------------
    // Builds
    // -----------------------------------------------------------------------

    fn resolve_session(
        &mut self,
        actor: ActorId,
        origin: VoxelCoord,
        skip_satisfied: bool,
    ) -> Result<Vec<Placement>, BuildError> {
        let (tick, cycle_ticks) = (self.tick, self.config.any_of_cycle_ticks);
        let session = self
            .previews
            .get_mut(&origin)
            .filter(|s| s.owner == actor)
            .ok_or(BuildError::NoSelection(origin))?;
        let placements = if skip_satisfied {
            placement::resolve_missing_placements(
                &mut session.projection,
                origin,
                tick,
                cycle_ticks,
                &self.world,
            )
        } else {
            placement::resolve_placements(&mut session.projection, origin, tick, cycle_ticks)
        };
        if placements.is_empty() {
            return Err(BuildError::NothingToBuild);
        }
        Ok(placements)
    }

    /// The actor's state, if it is standing in the world this host builds in.
    fn actor_in_world(&self, actor: ActorId) -> Result<&ActorState, BuildError> {
        let state = self
            .actors
            .get(&actor)
            .ok_or(BuildError::UnknownActor(actor))?;
        if state.dimension != self.world.dimension {
            return Err(BuildError::WrongDimension {
                actor,
                actor_dimension: state.dimension,
                world_dimension: self.world.dimension,
            });
        }
        Ok(state)
    }

    /// Price the session at `origin` for `actor` and check it against the
    /// actor's sources without consuming anything.
    pub fn quote(
        &mut self,
        actor: ActorId,
        origin: VoxelCoord,
        skip_satisfied: bool,
    ) -> Result<PendingCommitment, BuildError> {
        self.actor_in_world(actor)?;
        let placements = self.resolve_session(actor, origin, skip_satisfied)?;
        let commitment = PendingCommitment::from_placements(&placements, &self.config);

        let state = self.actor_in_world(actor)?;
        let links = state.settings.resolve(state.dimension, &self.world);
        let linked_energy = links.energy.and_then(|p| self.energy_stores.get(&p));
        let energy: Option<&dyn EnergySource> = match linked_energy {
            Some(store) => Some(store as &dyn EnergySource),
            None => state.reservoir.as_ref().map(|r| r as &dyn EnergySource),
        };
        let container = links
            .container
            .and_then(|p| self.containers.get(&p))
            .map(|c| c as &dyn MaterialSource);
        resources::check(&commitment, energy, &state.holdings, container)?;
        Ok(commitment)
    }

    /// Validate, reserve and start a build of the session at `origin`.
    pub fn request_build(
        &mut self,
        actor: ActorId,
        origin: VoxelCoord,
        skip_satisfied: bool,
        sink: &mut dyn ProgressSink,
    ) -> Result<(), BuildError> {
        self.actor_in_world(actor)?;
        if self.manager.has_active_task(actor) {
            return Err(BuildError::AlreadyBuilding(actor));
        }

        let placements = self.resolve_session(actor, origin, skip_satisfied)?;
        let commitment = PendingCommitment::from_placements(&placements, &self.config);
        self.reserve(actor, &commitment)?;

        let count = placements.len();
        let task = FabricationTask::new(actor, placements, self.config.ticks_per_placement);
        sink.emit(FabricationEventKind::BuildStarted {
            actor,
            placements: count,
            energy_cost: commitment.energy_cost,
        });
        self.manager.add_task(actor, task, &mut self.world, sink);
        self.previews.remove(&origin);
        if let Some(state) = self.actors.get_mut(&actor) {
            state.building = true;
        }
        info!(
            "{actor}: building {count} blocks at {origin} for {} energy",
            commitment.energy_cost
        );
        Ok(())
    }

    fn reserve(&mut self, actor: ActorId, commitment: &PendingCommitment) -> Result<(), BuildError> {
        let Self {
            actors,
            energy_stores,
            containers,
            world,
            ..
        } = self;
        let state = actors
            .get_mut(&actor)
            .ok_or(BuildError::UnknownActor(actor))?;
        let links = state.settings.resolve(state.dimension, &*world);
        let ActorState {
            holdings,
            reservoir,
            ..
        } = state;

        let linked_energy = match links.energy {
            Some(pos) => energy_stores.get_mut(&pos),
            None => None,
        };
        let energy = match linked_energy {
            Some(store) => Some(store as &mut dyn EnergySource),
            None => reservoir.as_mut().map(|r| r as &mut dyn EnergySource),
        };
        let container = match links.container {
            Some(pos) => containers
                .get_mut(&pos)
                .map(|c| c as &mut dyn MaterialSource),
            None => None,
        };

        resources::reserve(
            commitment,
            ResourceContext {
                energy,
                holdings,
                container,
            },
        )?;
        Ok(())
    }

    fn update_settings(
        &mut self,
        actor: ActorId,
        update: impl FnOnce(&mut ToolSettings),
    ) -> Result<(), BuildError> {
        let state = self
            .actors
            .get_mut(&actor)
            .ok_or(BuildError::UnknownActor(actor))?;
        update(&mut state.settings);
        Ok(())
    }

    /// Clear build mode for every actor whose build completed in `events`.
    fn settle(&mut self, events: &[FabricationEvent]) {
        for event in events {
            if let FabricationEventKind::BuildCompleted { actor, drained } = event.kind {
                if let Some(state) = self.actors.get_mut(&actor) {
                    state.building = false;
                }
                info!(
                    "{actor}: build finished{}",
                    if drained { " (completed instantly)" } else { "" }
                );
            }
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// The actor disconnected: drain its task and discard its sessions.
    pub fn actor_departed(&mut self, actor: ActorId, sink: &mut dyn ProgressSink) {
        if let Some(state) = self.actors.get_mut(&actor) {
            state.connected = false;
        }
        self.manager.on_actor_departure(actor, &mut self.world, sink);
        self.previews.retain(|_, session| session.owner != actor);
        info!("{actor}: departed");
    }

    /// Host stop: drain every live task and drop every session.
    pub fn shutdown(&mut self) -> Vec<FabricationEvent> {
        let mut log = EventLog::new(self.tick);
        self.manager.shutdown(&mut self.world, &mut log);
        self.previews.clear();
        self.settle(&log.events);
        info!("fabricator shut down at tick {}", self.tick);
        log.events
    }

    /// Serialize to JSON. Providers and preview sessions are not included.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Restore from JSON. Providers must be registered again.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Linked stores are keyed by a struct, which JSON maps cannot express;
/// store them as a list of pairs.
mod linked_map {
    use crate::resources::LinkedPosition;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S, V>(map: &BTreeMap<LinkedPosition, V>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        V: Serialize,
    {
        serializer.collect_seq(map)
    }

    pub fn deserialize<'de, D, V>(deserializer: D) -> Result<BTreeMap<LinkedPosition, V>, D::Error>
    where
        D: Deserializer<'de>,
        V: Deserialize<'de>,
    {
        let pairs = Vec::<(LinkedPosition, V)>::deserialize(deserializer)?;
        Ok(pairs.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::provider::{StaticStructure, VariantStructure};
    use crate::template::{Requirement, StructureTemplate};
    use crate::types::{BlockId, BlockState};
    use crate::world::WorldAccessor;

    const STONE: BlockId = BlockId(1);
    const ALICE: ActorId = ActorId(1);
    const BOB: ActorId = ActorId(2);

    fn small_config() -> FabricatorConfig {
        FabricatorConfig {
            world_size: (32, 16, 32),
            region_size: 8,
            ..FabricatorConfig::default()
        }
    }

    /// A 2x2x1 stone slab.
    fn slab() -> StaticStructure {
        StaticStructure::new(StructureId::new("slab"), || {
            let cells = [(0, 0), (1, 0), (0, 1), (1, 1)]
                .map(|(x, z)| (VoxelCoord::new(x, 0, z), Requirement::Exact(BlockState::of(STONE))));
            StructureTemplate::new(StructureId::new("slab"), cells)
        })
    }

    fn host() -> FabricatorState {
        let mut state = FabricatorState::new(small_config());
        state.register_provider(slab());
        state.add_actor(
            ALICE,
            ActorState::new(DimensionId(0))
                .with_holdings(Inventory::new().with(STONE, 10))
                .with_reservoir(EnergyCell::new(10_000, 10_000)),
        );
        state
    }

    fn cmd(actor: ActorId, tick: u64, action: FabricatorAction) -> FabricatorCommand {
        FabricatorCommand {
            actor,
            tick,
            action,
        }
    }

    fn select(actor: ActorId, tick: u64, origin: VoxelCoord) -> FabricatorCommand {
        cmd(
            actor,
            tick,
            FabricatorAction::SelectStructure {
                origin,
                structure: StructureId::new("slab"),
                rotation: Rotation::None,
                mirrored: false,
                size: None,
            },
        )
    }

    fn build(actor: ActorId, tick: u64, origin: VoxelCoord) -> FabricatorCommand {
        cmd(
            actor,
            tick,
            FabricatorAction::RequestBuild {
                origin,
                skip_satisfied: false,
            },
        )
    }

    fn rejections(events: &[FabricationEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match &e.kind {
                FabricationEventKind::BuildRejected { reason, .. } => Some(reason.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn select_then_build_places_the_structure() {
        let mut state = host();
        let origin = VoxelCoord::new(4, 1, 4);
        let result = state.step(&[select(ALICE, 1, origin), build(ALICE, 2, origin)], 2);

        assert!(rejections(&result.events).is_empty());
        assert!(state.session(origin).is_none(), "build consumes the session");
        assert!(state.actors[&ALICE].building);
        assert_eq!(state.actors[&ALICE].holdings.count(STONE), 6);
        assert!(state.actors[&ALICE].reservoir.as_ref().unwrap().stored < 10_000);

        let result = state.step(&[], 10);
        let completions: Vec<_> = result
            .events
            .iter()
            .filter(|e| matches!(e.kind, FabricationEventKind::BuildCompleted { .. }))
            .collect();
        assert_eq!(completions.len(), 1);
        assert!(!state.actors[&ALICE].building);
        assert_eq!(state.world.solid_count(), 4);
        assert!(state.manager.is_empty());
    }

    #[test]
    fn insufficient_energy_is_rejected_without_side_effects() {
        let mut state = host();
        state.actors.get_mut(&ALICE).unwrap().reservoir = Some(EnergyCell::new(5, 100));
        let origin = VoxelCoord::new(4, 1, 4);
        let before = state.actors[&ALICE].clone();

        let result = state.step(&[select(ALICE, 1, origin), build(ALICE, 1, origin)], 3);
        let reasons = rejections(&result.events);
        assert_eq!(reasons.len(), 1);
        assert!(reasons[0].starts_with("not enough energy"), "{}", reasons[0]);
        assert_eq!(state.actors[&ALICE], before);
        assert!(state.session(origin).is_some(), "session survives a rejection");
        assert_eq!(state.world.writes(), 0);
    }

    #[test]
    fn second_build_while_running_is_rejected() {
        let mut state = host();
        let a = VoxelCoord::new(4, 1, 4);
        let b = VoxelCoord::new(12, 1, 4);
        state.step(&[select(ALICE, 1, a), select(ALICE, 1, b), build(ALICE, 1, a)], 1);
        let err = state
            .request_build(ALICE, b, false, &mut EventLog::new(1))
            .unwrap_err();
        assert_eq!(err, BuildError::AlreadyBuilding(ALICE));
    }

    #[test]
    fn sessions_are_owned() {
        let mut state = host();
        state.add_actor(BOB, ActorState::new(DimensionId(0)));
        let origin = VoxelCoord::new(4, 1, 4);
        state.step(&[select(ALICE, 1, origin)], 1);

        assert_eq!(
            state.cancel_selection(BOB, origin),
            Err(BuildError::NoSelection(origin))
        );
        let result = state.step(
            &[cmd(BOB, 2, FabricatorAction::RotateSelection { origin })],
            2,
        );
        assert!(result.events.is_empty());
        assert_eq!(state.session(origin).unwrap().projection.rotation(), Rotation::None);

        let result = state.step(
            &[cmd(ALICE, 3, FabricatorAction::RotateSelection { origin })],
            3,
        );
        assert_eq!(result.events.len(), 1);
        assert_eq!(
            state.session(origin).unwrap().projection.rotation(),
            Rotation::Clockwise90
        );
    }

    #[test]
    fn selecting_over_another_actors_session_is_refused() {
        let mut state = host();
        state.add_actor(BOB, ActorState::new(DimensionId(0)));
        let origin = VoxelCoord::new(4, 1, 4);
        state.step(&[select(ALICE, 1, origin)], 1);

        let err = state
            .select_structure(
                BOB,
                origin,
                &StructureId::new("slab"),
                Rotation::Clockwise180,
                false,
                None,
            )
            .unwrap_err();
        assert_eq!(err, BuildError::SelectionTaken(origin));
        let session = state.session(origin).unwrap();
        assert_eq!(session.owner, ALICE);
        assert_eq!(session.projection.rotation(), Rotation::None);
    }

    #[test]
    fn reselecting_another_size_variant_swaps_the_template() {
        let small = StructureSize::new(3, 1, 3);
        let large = StructureSize::new(5, 1, 5);
        let pad = VariantStructure::new(StructureId::new("pad"), vec![small, large], |size| {
            let cells = (0..size.x as i32).flat_map(|x| {
                (0..size.z as i32).map(move |z| {
                    (VoxelCoord::new(x, 0, z), Requirement::Exact(BlockState::of(STONE)))
                })
            });
            StructureTemplate::new(StructureId::new("pad"), cells)
        })
        .unwrap();
        let mut state = host();
        state.register_provider(pad);
        let origin = VoxelCoord::new(8, 1, 8);
        let pad_id = StructureId::new("pad");
        let pick = |state: &mut FabricatorState, size: StructureSize| {
            state
                .select_structure(ALICE, origin, &pad_id, Rotation::None, false, Some(size))
                .unwrap();
        };

        pick(&mut state, small);
        assert_eq!(state.preview_placements(origin).unwrap().len(), 9);
        pick(&mut state, large);
        assert_eq!(state.preview_placements(origin).unwrap().len(), 25);
        assert_eq!(state.session(origin).unwrap().projection.effective_size(), large);
        match state.quote(ALICE, origin, false) {
            Err(BuildError::Validation(ValidationError::MissingMaterials { shortfall })) => {
                assert_eq!(shortfall[0].required, 25);
            }
            other => panic!("unexpected quote: {other:?}"),
        }

        // Same variant again keeps the open session.
        let cached = Arc::as_ptr(state.session(origin).unwrap().projection.template());
        pick(&mut state, large);
        assert_eq!(
            Arc::as_ptr(state.session(origin).unwrap().projection.template()),
            cached
        );
        pick(&mut state, small);
        assert_eq!(state.preview_placements(origin).unwrap().len(), 9);
    }

    #[test]
    fn actor_outside_the_world_dimension_cannot_build() {
        let mut state = host();
        state.world = std::mem::take(&mut state.world).with_dimension(DimensionId(-1));
        let origin = VoxelCoord::new(4, 1, 4);
        state.step(&[select(ALICE, 1, origin)], 1);
        let wrong = BuildError::WrongDimension {
            actor: ALICE,
            actor_dimension: DimensionId(0),
            world_dimension: DimensionId(-1),
        };
        assert_eq!(state.quote(ALICE, origin, false).unwrap_err(), wrong);

        let before = state.actors[&ALICE].clone();
        let result = state.step(&[build(ALICE, 2, origin)], 2);
        assert_eq!(rejections(&result.events), vec![wrong.to_string()]);
        assert_eq!(state.actors[&ALICE], before);
        assert_eq!(state.world.writes(), 0);

        state.actors.get_mut(&ALICE).unwrap().dimension = DimensionId(-1);
        assert!(state.quote(ALICE, origin, false).is_ok());
    }

    #[test]
    fn unknown_structure_is_rejected() {
        let mut state = host();
        let err = state
            .select_structure(
                ALICE,
                VoxelCoord::ZERO,
                &StructureId::new("nope"),
                Rotation::None,
                false,
                None,
            )
            .unwrap_err();
        assert_eq!(err, BuildError::UnknownStructure(StructureId::new("nope")));
    }

    #[test]
    fn linked_energy_is_preferred_over_reservoir() {
        let mut state = host();
        let link = LinkedPosition {
            dimension: DimensionId(0),
            pos: VoxelCoord::new(30, 0, 30),
        };
        state.energy_stores.insert(link, EnergyCell::new(50_000, 50_000));
        let origin = VoxelCoord::new(4, 1, 4);
        state.step(
            &[
                cmd(ALICE, 1, FabricatorAction::LinkEnergy { target: Some(link) }),
                select(ALICE, 1, origin),
                build(ALICE, 1, origin),
            ],
            1,
        );
        assert!(state.energy_stores[&link].stored < 50_000);
        assert_eq!(state.actors[&ALICE].reservoir.as_ref().unwrap().stored, 10_000);
    }

    #[test]
    fn unloaded_link_falls_back_to_reservoir() {
        let mut state = host();
        let link = LinkedPosition {
            dimension: DimensionId(0),
            pos: VoxelCoord::new(30, 0, 30),
        };
        state.energy_stores.insert(link, EnergyCell::new(50_000, 50_000));
        state.actors.get_mut(&ALICE).unwrap().settings.linked_energy = Some(link);
        state.world.unload_region((3, 3));

        let origin = VoxelCoord::new(4, 1, 4);
        state.step(&[select(ALICE, 1, origin), build(ALICE, 1, origin)], 1);
        assert_eq!(state.energy_stores[&link].stored, 50_000);
        assert!(state.actors[&ALICE].reservoir.as_ref().unwrap().stored < 10_000);
    }

    #[test]
    fn no_energy_source_at_all() {
        let mut state = host();
        state.actors.get_mut(&ALICE).unwrap().reservoir = None;
        let origin = VoxelCoord::new(4, 1, 4);
        state.step(&[select(ALICE, 1, origin)], 1);
        assert_eq!(
            state.quote(ALICE, origin, false).unwrap_err(),
            BuildError::Validation(ValidationError::NoEnergySource)
        );
    }

    #[test]
    fn quote_prices_without_consuming() {
        let mut state = host();
        let origin = VoxelCoord::new(4, 1, 4);
        state.step(&[select(ALICE, 1, origin)], 1);
        let quote = state.quote(ALICE, origin, false).unwrap();
        assert_eq!(quote.block_count(), 4);
        assert_eq!(quote.energy_cost, (4.0 * 50.0 * (1.0 + 0.001 * 4.0_f64)).ceil() as u64);
        assert_eq!(state.actors[&ALICE].holdings.count(STONE), 10);
    }

    #[test]
    fn skip_satisfied_builds_only_missing_cells() {
        let mut state = host();
        let origin = VoxelCoord::new(4, 1, 4);
        state.step(&[select(ALICE, 1, origin)], 1);
        let first = state.preview_placements(origin).unwrap()[0];
        state.world.set_block(first.pos, first.state);
        assert_eq!(state.check_selection(origin).unwrap().len(), 3);

        let result = state.step(
            &[cmd(
                ALICE,
                2,
                FabricatorAction::RequestBuild {
                    origin,
                    skip_satisfied: true,
                },
            )],
            2,
        );
        let started = result.events.iter().find_map(|e| match e.kind {
            FabricationEventKind::BuildStarted { placements, .. } => Some(placements),
            _ => None,
        });
        assert_eq!(started, Some(3));
        assert_eq!(state.actors[&ALICE].holdings.count(STONE), 7);
    }

    #[test]
    fn leaving_drains_the_build_and_discards_sessions() {
        let mut state = host();
        let a = VoxelCoord::new(4, 1, 4);
        let b = VoxelCoord::new(12, 1, 4);
        state.step(&[select(ALICE, 1, a), select(ALICE, 1, b), build(ALICE, 1, a)], 1);
        assert_eq!(state.world.writes(), 1);

        state.step(&[cmd(ALICE, 2, FabricatorAction::Leave)], 2);
        assert_eq!(state.world.writes(), 4);
        assert_eq!(state.session_count(), 0);
        assert!(!state.actors[&ALICE].connected);
        assert!(!state.actors[&ALICE].building);
        assert!(state.manager.is_empty());
    }

    #[test]
    fn shutdown_drains_live_builds() {
        let mut state = host();
        let origin = VoxelCoord::new(4, 1, 4);
        state.step(&[select(ALICE, 1, origin), build(ALICE, 1, origin)], 1);
        let events = state.shutdown();
        assert_eq!(
            events.last().map(|e| &e.kind),
            Some(&FabricationEventKind::BuildCompleted {
                actor: ALICE,
                drained: true
            })
        );
        assert_eq!(state.world.solid_count(), 4);
    }

    #[test]
    fn json_roundtrip_resumes_a_live_build() {
        let mut state = host();
        let link = LinkedPosition {
            dimension: DimensionId(0),
            pos: VoxelCoord::new(1, 0, 1),
        };
        state.containers.insert(link, Inventory::new().with(STONE, 3));
        let origin = VoxelCoord::new(4, 1, 4);
        state.step(&[select(ALICE, 1, origin), build(ALICE, 1, origin)], 2);

        let json = state.to_json().unwrap();
        let mut restored = FabricatorState::from_json(&json).unwrap();
        assert_eq!(restored.tick, 2);
        assert_eq!(restored.containers[&link].count(STONE), 3);
        assert_eq!(restored.session_count(), 0);
        assert_eq!(restored.manager.task(ALICE).unwrap().cursor(), 2);

        restored.step(&[], 4);
        assert_eq!(restored.world.solid_count(), 4);
        assert!(restored.manager.is_empty());
    }
}
