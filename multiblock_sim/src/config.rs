// Data-driven fabricator configuration.
//
// All tunable parameters live in `FabricatorConfig`, loadable from JSON at
// startup. Engine code never uses magic numbers for pacing or cost; it reads
// them from here. In multiplayer every peer must load an identical config,
// otherwise cost checks and build pacing diverge.
//
// Cost parameters are grouped into `CostParams`. Per-block destructive
// difficulty (the "hardness" feeding the cost formula) lives in the
// `materials` table keyed by `BlockId`; blocks missing from the table use
// `default_difficulty`.
//
// See also: `resources.rs` for the cost formula that reads `CostParams`,
// `task.rs` for `ticks_per_placement`, `template.rs` for `any_of_cycle_ticks`.

use crate::error::ConfigError;
use crate::types::BlockId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Parameters of the build cost formula:
/// `ceil(sum(base_rate * difficulty * (1 + density_coefficient * N)))`
/// where `N` is the number of non-air cells in the build.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CostParams {
    /// Energy units per unit of difficulty for a single block.
    pub base_rate: f64,
    /// Super-linear growth factor applied per non-air cell.
    pub density_coefficient: f64,
    /// Floor applied to every block's difficulty, so soft blocks are never free.
    pub min_difficulty: f64,
}

impl Default for CostParams {
    fn default() -> Self {
        Self {
            base_rate: 50.0,
            density_coefficient: 0.001,
            min_difficulty: 0.1,
        }
    }
}

/// Static per-block data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaterialData {
    pub name: String,
    /// Destructive difficulty; scales the block's share of the build cost.
    pub difficulty: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FabricatorConfig {
    /// Scheduler ticks between two successive placements of one task.
    pub ticks_per_placement: u32,

    /// Ticks each option of an any-of requirement stays displayed before the
    /// preview cycles to the next one.
    pub any_of_cycle_ticks: u64,

    /// Horizontal edge length of a loadable world region, in voxels.
    pub region_size: i32,

    /// World dimensions (x, y, z) of the host's voxel world.
    pub world_size: (u32, u32, u32),

    pub cost: CostParams,

    /// Difficulty used for blocks that have no `materials` entry.
    pub default_difficulty: f64,

    /// Per-block material data.
    #[serde(default)]
    pub materials: BTreeMap<BlockId, MaterialData>,

    /// Longest shortfall list included in a user-facing rejection message.
    pub max_reported_shortfall: usize,
}

impl FabricatorConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Difficulty of a block with the configured floor applied.
    pub fn difficulty(&self, block: BlockId) -> f64 {
        let raw = self
            .materials
            .get(&block)
            .map(|m| m.difficulty)
            .unwrap_or(self.default_difficulty);
        raw.max(self.cost.min_difficulty)
    }
}

impl Default for FabricatorConfig {
    fn default() -> Self {
        Self {
            ticks_per_placement: 1,
            any_of_cycle_ticks: 20,
            region_size: 16,
            world_size: (128, 64, 128),
            cost: CostParams::default(),
            default_difficulty: 1.0,
            materials: BTreeMap::new(),
            max_reported_shortfall: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let mut config = FabricatorConfig::default();
        config.materials.insert(
            BlockId(4),
            MaterialData {
                name: "obsidian".into(),
                difficulty: 50.0,
            },
        );
        let json = config.to_json().unwrap();
        let restored = FabricatorConfig::from_json(&json).unwrap();
        assert_eq!(config, restored);
        assert_eq!(restored.materials[&BlockId(4)].name, "obsidian");
    }

    #[test]
    fn config_loads_from_json_string() {
        let json = r#"{
            "ticks_per_placement": 4,
            "any_of_cycle_ticks": 10,
            "region_size": 32,
            "world_size": [64, 128, 64],
            "cost": {
                "base_rate": 10.0,
                "density_coefficient": 0.5,
                "min_difficulty": 0.25
            },
            "default_difficulty": 2.0,
            "max_reported_shortfall": 3
        }"#;
        let config = FabricatorConfig::from_json(json).unwrap();
        assert_eq!(config.ticks_per_placement, 4);
        assert_eq!(config.world_size, (64, 128, 64));
        assert_eq!(config.cost.density_coefficient, 0.5);
        assert!(config.materials.is_empty());
    }

    #[test]
    fn from_json_rejects_invalid_json() {
        assert!(FabricatorConfig::from_json("{ not json").is_err());
    }

    #[test]
    fn difficulty_uses_table_default_and_floor() {
        let mut config = FabricatorConfig::default();
        config.materials.insert(
            BlockId(1),
            MaterialData {
                name: "stone".into(),
                difficulty: 1.5,
            },
        );
        config.materials.insert(
            BlockId(2),
            MaterialData {
                name: "glass".into(),
                difficulty: 0.0,
            },
        );
        assert_eq!(config.difficulty(BlockId(1)), 1.5);
        assert_eq!(config.difficulty(BlockId(2)), config.cost.min_difficulty);
        assert_eq!(config.difficulty(BlockId(99)), config.default_difficulty);
    }
}
