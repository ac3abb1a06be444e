use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

/// Player attributes that requirements can gate on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stat {
    Insight,
    Rapport,
    Authority,
    Diplomacy,
    Cunning,
}

/// The slice of player state this engine needs to evaluate requirements.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Player {
    pub name: String,
    #[serde(default)]
    pub coins: i32,
    #[serde(default)]
    pub resolve: i32,
    #[serde(default)]
    pub stats: FxHashMap<Stat, i32>,
    #[serde(default)]
    pub completed_situations: u32,
    /// Total bond strength per NPC id.
    #[serde(default)]
    pub bonds: FxHashMap<String, i32>,
    #[serde(default)]
    pub items: FxHashSet<String>,
    #[serde(default)]
    pub states: FxHashSet<String>,
}

impl Player {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn stat(&self, stat: Stat) -> i32 {
        self.stats.get(&stat).copied().unwrap_or(0)
    }

    pub fn bond(&self, npc_id: &str) -> i32 {
        self.bonds.get(npc_id).copied().unwrap_or(0)
    }
}

/// A single gate within an OR path. One variant per requirement kind,
/// each carrying its own typed threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Requirement {
    Stat { stat: Stat, min: i32 },
    Coins(i32),
    Resolve(i32),
    CompletedSituations(u32),
    Bond { npc_id: String, min: i32 },
    Item(String),
    State(String),
}

impl Requirement {
    pub fn is_satisfied(&self, player: &Player) -> bool {
        match self {
            Self::Stat { stat, min } => player.stat(*stat) >= *min,
            Self::Coins(min) => player.coins >= *min,
            Self::Resolve(min) => player.resolve >= *min,
            Self::CompletedSituations(min) => player.completed_situations >= *min,
            Self::Bond { npc_id, min } => player.bond(npc_id) >= *min,
            Self::Item(item_id) => player.items.contains(item_id),
            Self::State(state) => player.states.contains(state),
        }
    }
}

/// A conjunction of requirements: every entry must hold.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OrPath {
    #[serde(default)]
    pub label: String,
    pub requirements: Vec<Requirement>,
}

impl OrPath {
    pub fn is_satisfied(&self, player: &Player) -> bool {
        self.requirements.iter().all(|r| r.is_satisfied(player))
    }
}

/// A disjunction of OR paths; satisfying any one path unlocks the choice.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RequirementFormula {
    #[serde(default)]
    pub or_paths: Vec<OrPath>,
}

impl RequirementFormula {
    /// A formula with no paths gates nothing.
    pub fn is_empty(&self) -> bool {
        self.or_paths.is_empty()
    }

    pub fn is_satisfied(&self, player: &Player) -> bool {
        self.is_empty() || self.or_paths.iter().any(|p| p.is_satisfied(player))
    }

    /// Labels of the paths the player currently satisfies.
    pub fn satisfied_paths<'a>(&'a self, player: &Player) -> Vec<&'a str> {
        self.or_paths
            .iter()
            .filter(|p| p.is_satisfied(player))
            .map(|p| p.label.as_str())
            .collect()
    }
}
