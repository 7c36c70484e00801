// Build cost, resource validation and atomic reservation.
//
// Starting a build is all-or-nothing with respect to cost:
//
// 1. `PendingCommitment::from_placements` prices a resolved placement list:
//    the energy cost (see `total_cost`) and the number of blocks required per
//    block type. It is computed once and never stored past the request.
// 2. `check` compares it against the reachable sources without touching them:
//    an energy source must exist and hold enough; for each block type the
//    actor's own holdings plus the linked container (in that order) must hold
//    enough.
// 3. `reserve` runs `check`, and only if it passes extracts the energy and
//    consumes each block type, holdings first, container for the remainder.
//
// A failed check returns before any mutation, so nothing ever needs rolling
// back. Extraction after a passed check cannot come up short on a correct
// source; a short extraction is a defect and trips a `debug_assert!`.
//
// Linked sources (an external energy store, an external container) are
// recorded in `ToolSettings` as `LinkedPosition`s. A link resolves only if it
// is in the requester's dimension and its region is loaded.
//
// See also: `config.rs` for `CostParams` and the difficulty table, `sim.rs`
// which assembles a `ResourceContext` from an actor and its links.

use crate::config::FabricatorConfig;
use crate::error::{Shortfall, ValidationError};
use crate::placement::Placement;
use crate::types::{BlockId, DimensionId, VoxelCoord};
use crate::world::WorldAccessor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// Something that stores energy units.
pub trait EnergySource {
    fn stored(&self) -> u64;
    /// Remove up to `amount`; returns what was actually removed.
    fn extract(&mut self, amount: u64) -> u64;
}

/// Something that holds counted blocks.
pub trait MaterialSource {
    fn count(&self, block: BlockId) -> u32;
    /// Remove up to `amount` of `block`; returns what was actually removed.
    fn consume(&mut self, block: BlockId, amount: u32) -> u32;
}

/// A simple energy store (an actor's internal reservoir or a linked cell).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnergyCell {
    pub stored: u64,
    pub capacity: u64,
}

impl EnergyCell {
    pub fn new(stored: u64, capacity: u64) -> Self {
        Self {
            stored: stored.min(capacity),
            capacity,
        }
    }

    /// Add energy up to capacity; returns what was accepted.
    pub fn receive(&mut self, amount: u64) -> u64 {
        let accepted = amount.min(self.capacity.saturating_sub(self.stored));
        self.stored += accepted;
        accepted
    }
}

impl EnergySource for EnergyCell {
    fn stored(&self) -> u64 {
        self.stored
    }

    fn extract(&mut self, amount: u64) -> u64 {
        let taken = amount.min(self.stored);
        self.stored -= taken;
        taken
    }
}

/// Block counts held by an actor or a container.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    counts: BTreeMap<BlockId, u32>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, block: BlockId, amount: u32) {
        *self.counts.entry(block).or_insert(0) += amount;
    }

    pub fn with(mut self, block: BlockId, amount: u32) -> Self {
        self.insert(block, amount);
        self
    }

    pub fn total(&self) -> u64 {
        self.counts.values().map(|&c| u64::from(c)).sum()
    }
}

impl MaterialSource for Inventory {
    fn count(&self, block: BlockId) -> u32 {
        self.counts.get(&block).copied().unwrap_or(0)
    }

    fn consume(&mut self, block: BlockId, amount: u32) -> u32 {
        let Some(held) = self.counts.get_mut(&block) else {
            return 0;
        };
        let taken = amount.min(*held);
        *held -= taken;
        if *held == 0 {
            self.counts.remove(&block);
        }
        taken
    }
}

// ---------------------------------------------------------------------------
// Links
// ---------------------------------------------------------------------------

/// A position in a specific dimension, as stored by a link.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkedPosition {
    pub dimension: DimensionId,
    pub pos: VoxelCoord,
}

/// Links an actor's tool has been bound to.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSettings {
    pub linked_energy: Option<LinkedPosition>,
    pub linked_container: Option<LinkedPosition>,
}

/// Links that are usable right now.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResolvedLinks {
    pub energy: Option<LinkedPosition>,
    pub container: Option<LinkedPosition>,
}

impl ToolSettings {
    /// Resolve both links from the point of view of a requester in
    /// `dimension`. Links in another dimension or an unloaded region are
    /// unavailable.
    pub fn resolve(&self, dimension: DimensionId, world: &dyn WorldAccessor) -> ResolvedLinks {
        let usable = |link: &LinkedPosition| {
            link.dimension == dimension && world.is_region_loaded(link.pos)
        };
        ResolvedLinks {
            energy: self.linked_energy.filter(usable),
            container: self.linked_container.filter(usable),
        }
    }
}

// ---------------------------------------------------------------------------
// Cost
// ---------------------------------------------------------------------------

/// Energy cost of placing `placements`:
/// `ceil(base_rate * sum(difficulty) * (1 + density_coefficient * N))`
/// over the `N` non-air placements. Difficulty is floored at
/// `min_difficulty`.
pub fn total_cost(placements: &[Placement], config: &FabricatorConfig) -> u64 {
    let solid = placements.iter().filter(|p| !p.state.is_air());
    let n = solid.clone().count();
    if n == 0 {
        return 0;
    }
    let difficulty: f64 = solid.map(|p| config.difficulty(p.state.id)).sum();
    let scale = 1.0 + config.cost.density_coefficient * n as f64;
    (config.cost.base_rate * difficulty * scale).ceil() as u64
}

/// What a build will consume, computed once from its placement list.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PendingCommitment {
    pub energy_cost: u64,
    pub materials: BTreeMap<BlockId, u32>,
}

impl PendingCommitment {
    pub fn from_placements(placements: &[Placement], config: &FabricatorConfig) -> Self {
        let mut materials = BTreeMap::new();
        for p in placements.iter().filter(|p| !p.state.is_air()) {
            *materials.entry(p.state.id).or_insert(0) += 1;
        }
        Self {
            energy_cost: total_cost(placements, config),
            materials,
        }
    }

    pub fn block_count(&self) -> u32 {
        self.materials.values().sum()
    }
}

// ---------------------------------------------------------------------------
// Validation and reservation
// ---------------------------------------------------------------------------

/// Mutable access to every source a build may draw from.
pub struct ResourceContext<'a> {
    /// The chosen energy source, if any is reachable.
    pub energy: Option<&'a mut dyn EnergySource>,
    /// The requester's own holdings (drawn from first).
    pub holdings: &'a mut dyn MaterialSource,
    /// The linked container, if it resolved.
    pub container: Option<&'a mut dyn MaterialSource>,
}

/// Check a commitment against the sources without mutating anything.
pub fn check(
    commitment: &PendingCommitment,
    energy: Option<&dyn EnergySource>,
    holdings: &dyn MaterialSource,
    container: Option<&dyn MaterialSource>,
) -> Result<(), ValidationError> {
    let energy = energy.ok_or(ValidationError::NoEnergySource)?;
    let available = energy.stored();
    if available < commitment.energy_cost {
        return Err(ValidationError::InsufficientEnergy {
            required: commitment.energy_cost,
            available,
        });
    }

    let shortfall: Vec<Shortfall> = commitment
        .materials
        .iter()
        .filter_map(|(&block, &required)| {
            let available = holdings
                .count(block)
                .saturating_add(container.map_or(0, |c| c.count(block)));
            (available < required).then_some(Shortfall {
                block,
                required,
                available,
            })
        })
        .collect();
    if !shortfall.is_empty() {
        return Err(ValidationError::MissingMaterials { shortfall });
    }
    Ok(())
}

/// Check, then atomically extract energy and consume materials.
pub fn reserve(
    commitment: &PendingCommitment,
    ctx: ResourceContext<'_>,
) -> Result<(), ValidationError> {
    let ResourceContext {
        energy,
        holdings,
        mut container,
    } = ctx;
    let energy = energy.ok_or(ValidationError::NoEnergySource)?;
    check(commitment, Some(&*energy), &*holdings, container.as_deref())?;

    let extracted = energy.extract(commitment.energy_cost);
    debug_assert_eq!(extracted, commitment.energy_cost, "energy extraction came up short");

    for (&block, &required) in &commitment.materials {
        let mut taken = holdings.consume(block, required);
        if let Some(container) = container.as_mut() {
            taken += container.consume(block, required - taken);
        }
        debug_assert_eq!(taken, required, "material extraction came up short for {block}");
    }
    Ok(())
}
