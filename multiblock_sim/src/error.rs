// Error taxonomy for the fabrication engine.
//
// - `TemplateError`: a structure definition is malformed (explicit size too
//   small, ragged pattern rows, unknown pattern key).
// - `ValidationError`: a build request cannot be funded. Produced before any
//   resource is touched, so it never needs rollback.
// - `BuildError`: everything that rejects a build request, including
//   validation failures and the concurrent-build conflict.
// - `ConfigError`: the config JSON could not be parsed.
//
// Environmental degradation (unloaded region, actor departure) is not an
// error: the manager drains the task instead (see `manager.rs`).

use crate::types::{ActorId, BlockId, DimensionId, StructureId, StructureSize, VoxelCoord};
use std::fmt::Write as _;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("cell {cell} lies outside the declared size {size}")]
    CellOutsideSize { cell: VoxelCoord, size: StructureSize },

    #[error("pattern layer {layer} row {row} has width {found}, expected {expected}")]
    RaggedPattern {
        layer: usize,
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("pattern key '{0}' has no requirement")]
    UnknownKey(char),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("no energy source is reachable")]
    NoEnergySource,

    #[error("not enough energy: need {required}, have {available}")]
    InsufficientEnergy { required: u64, available: u64 },

    #[error("missing materials: {}", format_shortfall(.shortfall))]
    MissingMaterials { shortfall: Vec<Shortfall> },
}

/// One block type the requester is short of.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Shortfall {
    pub block: BlockId,
    pub required: u32,
    pub available: u32,
}

impl Shortfall {
    pub fn missing(&self) -> u32 {
        self.required.saturating_sub(self.available)
    }
}

fn format_shortfall(shortfall: &[Shortfall]) -> String {
    let mut out = String::new();
    for (i, s) in shortfall.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{} x{}", s.block, s.missing());
    }
    out
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("{0} already has a build in progress")]
    AlreadyBuilding(ActorId),

    #[error("{0} is not known to the fabricator")]
    UnknownActor(ActorId),

    #[error("structure '{0}' has no provider")]
    UnknownStructure(StructureId),

    #[error("no structure is selected at {0}")]
    NoSelection(VoxelCoord),

    #[error("another actor is previewing at {0}")]
    SelectionTaken(VoxelCoord),

    #[error("{actor} is in dimension {actor_dimension:?}, the world is {world_dimension:?}")]
    WrongDimension {
        actor: ActorId,
        actor_dimension: DimensionId,
        world_dimension: DimensionId,
    },

    #[error("nothing to build")]
    NothingToBuild,

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl BuildError {
    /// Rejection text for the requester. Shortfall lists longer than
    /// `max_shortfall` are cut off with a count of the omitted entries.
    pub fn user_message(&self, max_shortfall: usize) -> String {
        match self {
            BuildError::Validation(ValidationError::MissingMaterials { shortfall })
                if shortfall.len() > max_shortfall =>
            {
                let shown = format_shortfall(&shortfall[..max_shortfall]);
                let omitted = shortfall.len() - max_shortfall;
                format!("missing materials: {shown} and {omitted} more")
            }
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
}
